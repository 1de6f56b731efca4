//! # storage-adapters
//!
//! Store implementations for the domain ports.

pub mod directory;
pub mod memory;

pub use directory::InMemoryDirectory;
pub use memory::{InMemoryStore, MemoryTransaction};
