//! Access to the platform's object store: the `ObjectStore` seam, a typed
//! `Api<K>` view over it, an HTTP implementation with WebSocket pod exec, an
//! in-process implementation, and the topology watcher that feeds lifecycle
//! events to the controllers.

pub mod client;
pub mod error;
pub mod exec;
pub mod http;
pub mod memory;
pub mod tls;
pub mod watch;

pub use client::{Api, ExecOutput, ObjectStore, PodExecutor, StoreOp, VersionSource};
pub use error::StoreError;
pub use http::ApiClient;
pub use memory::MemoryStore;
pub use watch::TopologyWatcher;
