use chrono::{DateTime, Utc};
use serde::Serialize;

/// Which direction a sync run writes in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Insert,
    Delete,
    /// Deletions and insertions in one remote call.
    Atomic,
}

impl SyncOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOperation::Insert => "insert",
            SyncOperation::Delete => "delete",
            SyncOperation::Atomic => "atomic",
        }
    }
}

/// What happened to one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChunkOutcome {
    /// The store acknowledged the chunk.
    Applied,
    /// The store answered with an error; the chunk is known not applied.
    Failed { error: String },
    /// The call was sent but never answered (deadline or timeout); the store
    /// may still apply it.
    Unknown { reason: String },
    /// The call was never sent.
    NotSent,
}

impl ChunkOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ChunkOutcome::Applied)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkReport {
    pub index: usize,
    /// Half-open range of input positions covered by this chunk.
    pub start: usize,
    pub end: usize,
    pub outcome: ChunkOutcome,
}

impl ChunkReport {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Outcome of one synchronization run.
///
/// Partial application is reported here, not raised as an error. Elements
/// are counted once, in exactly one of `applied`, `failed`, `unknown` or
/// `not_sent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub operation: SyncOperation,
    pub total_requested: usize,
    pub total_applied: usize,
    pub total_failed: usize,
    pub total_unknown: usize,
    pub total_not_sent: usize,
    pub all_applied: bool,
    pub chunks: Vec<ChunkReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    pub fn from_chunks(
        operation: SyncOperation,
        total_requested: usize,
        chunks: Vec<ChunkReport>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let mut report = Self {
            operation,
            total_requested,
            total_applied: 0,
            total_failed: 0,
            total_unknown: 0,
            total_not_sent: 0,
            all_applied: false,
            chunks,
            started_at,
            finished_at: Utc::now(),
        };

        for chunk in &report.chunks {
            let n = chunk.len();
            match chunk.outcome {
                ChunkOutcome::Applied => report.total_applied += n,
                ChunkOutcome::Failed { .. } => report.total_failed += n,
                ChunkOutcome::Unknown { .. } => report.total_unknown += n,
                ChunkOutcome::NotSent => report.total_not_sent += n,
            }
        }
        report.all_applied = report.total_applied == report.total_requested;
        report
    }

    /// Number of remote calls that were actually issued.
    pub fn calls_sent(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| !matches!(c.outcome, ChunkOutcome::NotSent))
            .count()
    }

    pub fn failed_chunks(&self) -> impl Iterator<Item = &ChunkReport> {
        self.chunks.iter().filter(|c| !c.outcome.is_applied())
    }
}

/// Outcome of a delete-then-tell replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaceReport {
    pub deletions: SyncReport,
    pub insertions: SyncReport,
    /// Insertions were withheld because a deletion chunk was not applied.
    pub insertions_skipped: bool,
}

impl ReplaceReport {
    pub fn all_applied(&self) -> bool {
        self.deletions.all_applied && self.insertions.all_applied
    }
}
