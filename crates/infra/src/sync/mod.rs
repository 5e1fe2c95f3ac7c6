//! Batch synchronization of facts to the remote store.

mod batch;
mod report;

pub use batch::{BatchSynchronizer, DEFAULT_BATCH_SIZE, DEFAULT_MAX_IN_FLIGHT, SyncConfig, chunk_bounds};
pub use report::{ChunkOutcome, ChunkReport, ReplaceReport, SyncOperation, SyncReport};
