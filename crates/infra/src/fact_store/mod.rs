//! Remote fact store boundary.
//!
//! The fact store holds every relationship fact and evaluates the policy
//! against them. This module defines the operations the engine consumes and
//! two backends: the HTTP client for the hosted store and an in-memory store
//! for tests/dev.

pub mod http;
pub mod in_memory;
pub mod r#trait;

pub use http::HttpFactStore;
pub use in_memory::{InMemoryFactStore, InMemoryPolicy};
pub use r#trait::{FactStore, StoreError};
