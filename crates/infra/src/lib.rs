//! Infrastructure layer: remote fact store, synchronization, resolution, config.

pub mod config;
pub mod db;
pub mod fact_store;
pub mod lifecycle;
pub mod reconcile;
pub mod resolver;
pub mod sync;

pub use config::{ConfigError, FactgateConfig};
pub use fact_store::{FactStore, HttpFactStore, InMemoryFactStore, InMemoryPolicy, StoreError};
pub use lifecycle::{FactSync, RoleChange};
pub use reconcile::Reconciler;
pub use resolver::{AuthorizationResolver, ResolveError, RoleGrant};
pub use sync::{BatchSynchronizer, ChunkOutcome, ReplaceReport, SyncConfig, SyncReport};
