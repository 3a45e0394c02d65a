//! Cluster store backends.

pub mod memory;

pub use memory::InMemoryClusterStore;
