//! Data model shared by the operator crates: the topology custom resource,
//! the platform objects it owns, and the operator's own configuration.

pub mod config;
pub mod event;
pub mod kind;
pub mod meta;
pub mod platform;
pub mod pod;
pub mod psmdb;
pub mod quantity;
pub mod resources;
pub mod secret;
pub mod service;
pub mod statefulset;
pub mod validate;
