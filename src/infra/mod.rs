//! Reference collaborator implementations.

pub mod filter;
pub mod store;

pub use filter::{AcceptAll, ProjectFilter};
pub use store::InMemoryClusterStore;
