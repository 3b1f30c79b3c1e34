//! Centralized constants for the psmdb-operator project.
//!
//! All project-wide constant values live here.
//! Change a value in one place and it applies everywhere.

pub mod api;
pub mod controller;
pub mod labels;
pub mod mongod;
pub mod paths;
