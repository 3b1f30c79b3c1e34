//! Controllers that keep replica-set topologies converged: the child-object
//! builder, platform detection, the event-driven reconciler and the
//! per-topology watchdogs.

pub mod builder;
pub mod error;
pub mod initiator;
pub mod platform;
pub mod reconciler;
pub mod status;
pub mod watchdog;

pub use error::Error;
pub use initiator::{MongoShellInitiator, ReplsetInitiator};
pub use platform::PlatformDetector;
pub use reconciler::{ReconcileReport, Reconciler};
