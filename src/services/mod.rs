//! Service layer for pastoralist
//!
//! Services hold the run logic so the CLI stays a thin printing layer.

pub mod update_service;

pub use update_service::{update, Collaborators, UpdateOptions, UpdateReport};
