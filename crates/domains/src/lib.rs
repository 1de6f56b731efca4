//! # domains
//!
//! Entities, error taxonomy, and port traits for the campsite search and
//! review subsystem. Nothing in this crate performs I/O; adapters implement
//! the ports and services drive them.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::*;
pub use models::*;
pub use ports::*;
