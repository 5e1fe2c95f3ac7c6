//! Chunked fact synchronization.
//!
//! Input is split into consecutive chunks of at most `batch_size` facts; each
//! chunk is one `bulk` call. Up to `max_in_flight` chunk calls run at once.
//! A failed chunk never stops the run and is never retried here.
//!
//! ## Deadline
//!
//! When the caller's deadline passes, chunks still in flight are abandoned:
//! their tasks are detached, not aborted, and reported as `Unknown` because
//! the store may still apply them. Chunks not yet started are `NotSent`.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use factgate_auth::RequestContext;
use factgate_core::Fact;

use super::report::{ChunkOutcome, ChunkReport, ReplaceReport, SyncOperation, SyncReport};
use crate::fact_store::{FactStore, StoreError};

/// Default chunk size, the store's per-call payload limit.
pub const DEFAULT_BATCH_SIZE: NonZeroUsize = match NonZeroUsize::new(20) {
    Some(n) => n,
    None => unreachable!(),
};

pub const DEFAULT_MAX_IN_FLIGHT: NonZeroUsize = match NonZeroUsize::new(4) {
    Some(n) => n,
    None => unreachable!(),
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub batch_size: NonZeroUsize,
    pub max_in_flight: NonZeroUsize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl SyncConfig {
    pub fn with_batch_size(mut self, batch_size: NonZeroUsize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: NonZeroUsize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }
}

/// Consecutive half-open ranges of at most `batch` positions covering `0..len`.
pub fn chunk_bounds(len: usize, batch: NonZeroUsize) -> Vec<Range<usize>> {
    let batch = batch.get();
    (0..len)
        .step_by(batch)
        .map(|start| start..(start + batch).min(len))
        .collect()
}

fn outcome_of(result: Result<(), StoreError>) -> ChunkOutcome {
    match result {
        Ok(()) => ChunkOutcome::Applied,
        Err(e) if e.is_indeterminate() => ChunkOutcome::Unknown { reason: e.to_string() },
        Err(e) => ChunkOutcome::Failed { error: e.to_string() },
    }
}

/// Ships fact insertions and deletions to a [`FactStore`] in bounded chunks.
#[derive(Debug)]
pub struct BatchSynchronizer<S> {
    store: Arc<S>,
    config: SyncConfig,
}

impl<S> Clone for BatchSynchronizer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config,
        }
    }
}

impl<S> BatchSynchronizer<S>
where
    S: FactStore + 'static,
{
    pub fn new(store: Arc<S>, config: SyncConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> SyncConfig {
        self.config
    }

    pub async fn sync_insertions(&self, facts: &[Fact], ctx: &RequestContext) -> SyncReport {
        self.run(SyncOperation::Insert, facts, ctx).await
    }

    /// `patterns` may contain wildcard terms.
    pub async fn sync_deletions(&self, patterns: &[Fact], ctx: &RequestContext) -> SyncReport {
        self.run(SyncOperation::Delete, patterns, ctx).await
    }

    /// Delete-then-tell: insertions are issued only after every deletion chunk
    /// has been applied.
    pub async fn replace(&self, deletions: &[Fact], insertions: &[Fact], ctx: &RequestContext) -> ReplaceReport {
        let deletions = self.sync_deletions(deletions, ctx).await;
        if !deletions.all_applied {
            warn!(
                request_id = %ctx.request_id(),
                withheld = insertions.len(),
                "deletions not fully applied; insertions withheld"
            );
            let insertions = self.not_sent(SyncOperation::Insert, insertions.len());
            return ReplaceReport {
                deletions,
                insertions,
                insertions_skipped: true,
            };
        }

        let insertions = self.sync_insertions(insertions, ctx).await;
        ReplaceReport {
            deletions,
            insertions,
            insertions_skipped: false,
        }
    }

    /// Deletes `delete` and tells `tell` in a single remote call, unchunked.
    ///
    /// Used for small replacements that must not expose an intermediate state.
    pub async fn apply_atomic(&self, delete: &[Fact], tell: &[Fact], ctx: &RequestContext) -> SyncReport {
        let started_at = Utc::now();
        let total = delete.len() + tell.len();
        if total == 0 {
            return SyncReport::from_chunks(SyncOperation::Atomic, 0, Vec::new(), started_at);
        }

        let outcome = if ctx.is_expired() {
            ChunkOutcome::NotSent
        } else {
            let call = self.store.bulk(delete, tell);
            match ctx.deadline() {
                Some(deadline) => {
                    match tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), call).await {
                        Ok(result) => outcome_of(result),
                        Err(_) => ChunkOutcome::Unknown {
                            reason: "deadline exceeded".to_string(),
                        },
                    }
                }
                None => outcome_of(call.await),
            }
        };

        let chunks = vec![ChunkReport {
            index: 0,
            start: 0,
            end: total,
            outcome,
        }];
        let report = SyncReport::from_chunks(SyncOperation::Atomic, total, chunks, started_at);
        log_report(&report, ctx);
        report
    }

    fn not_sent(&self, operation: SyncOperation, len: usize) -> SyncReport {
        let chunks = chunk_bounds(len, self.config.batch_size)
            .into_iter()
            .enumerate()
            .map(|(index, range)| ChunkReport {
                index,
                start: range.start,
                end: range.end,
                outcome: ChunkOutcome::NotSent,
            })
            .collect();
        SyncReport::from_chunks(operation, len, chunks, Utc::now())
    }

    async fn run(&self, operation: SyncOperation, facts: &[Fact], ctx: &RequestContext) -> SyncReport {
        let started_at = Utc::now();
        let bounds = chunk_bounds(facts.len(), self.config.batch_size);
        let mut outcomes: Vec<Option<ChunkOutcome>> = vec![None; bounds.len()];

        if ctx.is_expired() {
            warn!(request_id = %ctx.request_id(), operation = operation.as_str(), "deadline already passed; nothing sent");
            return self.not_sent(operation, facts.len());
        }

        let deadline = ctx.deadline().map(tokio::time::Instant::from_std);
        let max_in_flight = self.config.max_in_flight.get();
        let mut pending = bounds.iter().cloned().enumerate();
        let mut in_flight = BTreeSet::new();
        let mut tasks = JoinSet::new();
        let mut expired = false;

        loop {
            while tasks.len() < max_in_flight {
                let Some((index, range)) = pending.next() else {
                    break;
                };
                let chunk = facts[range].to_vec();
                let store = Arc::clone(&self.store);
                in_flight.insert(index);
                tasks.spawn(async move {
                    let result = match operation {
                        SyncOperation::Delete => store.bulk_delete(&chunk).await,
                        _ => store.bulk_tell(&chunk).await,
                    };
                    (index, result)
                });
            }

            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        expired = true;
                        break;
                    }
                },
                None => tasks.join_next().await,
            };

            let Some(joined) = next else {
                break;
            };
            match joined {
                Ok((index, result)) => {
                    in_flight.remove(&index);
                    if let Err(err) = &result {
                        warn!(
                            request_id = %ctx.request_id(),
                            operation = operation.as_str(),
                            chunk = index,
                            error = %err,
                            "chunk not applied"
                        );
                    }
                    outcomes[index] = Some(outcome_of(result));
                }
                Err(err) => {
                    warn!(request_id = %ctx.request_id(), operation = operation.as_str(), error = %err, "chunk task did not complete");
                }
            }
        }

        if expired {
            warn!(
                request_id = %ctx.request_id(),
                operation = operation.as_str(),
                abandoned = in_flight.len(),
                "deadline exceeded; abandoning in-flight chunks"
            );
            tasks.detach_all();
        }

        let chunks = bounds
            .into_iter()
            .zip(outcomes)
            .enumerate()
            .map(|(index, (range, outcome))| {
                let outcome = match outcome {
                    Some(outcome) => outcome,
                    None if in_flight.contains(&index) => ChunkOutcome::Unknown {
                        reason: if expired {
                            "abandoned at deadline".to_string()
                        } else {
                            "chunk task did not complete".to_string()
                        },
                    },
                    None => ChunkOutcome::NotSent,
                };
                ChunkReport {
                    index,
                    start: range.start,
                    end: range.end,
                    outcome,
                }
            })
            .collect();

        let report = SyncReport::from_chunks(operation, facts.len(), chunks, started_at);
        log_report(&report, ctx);
        report
    }
}

fn log_report(report: &SyncReport, ctx: &RequestContext) {
    if report.all_applied {
        info!(
            request_id = %ctx.request_id(),
            operation = report.operation.as_str(),
            requested = report.total_requested,
            applied = report.total_applied,
            "fact sync applied"
        );
    } else {
        warn!(
            request_id = %ctx.request_id(),
            operation = report.operation.as_str(),
            requested = report.total_requested,
            applied = report.total_applied,
            failed = report.total_failed,
            unknown = report.total_unknown,
            not_sent = report.total_not_sent,
            "fact sync partially applied"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    use async_trait::async_trait;
    use factgate_core::{Action, EntityRef, FactEncoder, ResourceKind, Role, UserId, WireFact};
    use proptest::prelude::*;

    use crate::fact_store::InMemoryFactStore;

    fn test_facts(n: usize) -> Vec<Fact> {
        (0..n)
            .map(|i| {
                FactEncoder::role_assignment(&EntityRef::user(i), &Role::MEMBER, &EntityRef::organization(1)).unwrap()
            })
            .collect()
    }

    fn test_ctx() -> RequestContext {
        RequestContext::new(UserId::new(1))
    }

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    /// Rejects any chunk containing a poisoned fact; can also stall instead.
    struct FlakyStore {
        inner: InMemoryFactStore,
        poisoned: HashSet<Fact>,
        stall: bool,
    }

    impl FlakyStore {
        fn failing(poisoned: impl IntoIterator<Item = Fact>) -> Self {
            Self {
                inner: InMemoryFactStore::default(),
                poisoned: poisoned.into_iter().collect(),
                stall: false,
            }
        }

        fn stalling(poisoned: impl IntoIterator<Item = Fact>) -> Self {
            Self {
                stall: true,
                ..Self::failing(poisoned)
            }
        }
    }

    #[async_trait]
    impl FactStore for FlakyStore {
        async fn tell(&self, fact: &Fact) -> Result<(), StoreError> {
            self.bulk(&[], std::slice::from_ref(fact)).await
        }

        async fn bulk(&self, delete: &[Fact], tell: &[Fact]) -> Result<(), StoreError> {
            if delete.iter().chain(tell).any(|f| self.poisoned.contains(f)) {
                if self.stall {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                return Err(StoreError::Rejected {
                    status: 500,
                    message: "injected".to_string(),
                });
            }
            self.inner.bulk(delete, tell).await
        }

        async fn authorize(&self, actor: &EntityRef, action: &Action, resource: &EntityRef) -> Result<bool, StoreError> {
            self.inner.authorize(actor, action, resource).await
        }

        async fn actions(&self, actor: &EntityRef, resource: &EntityRef) -> Result<Vec<String>, StoreError> {
            self.inner.actions(actor, resource).await
        }

        async fn list(&self, actor: &EntityRef, action: &Action, kind: ResourceKind) -> Result<Vec<String>, StoreError> {
            self.inner.list(actor, action, kind).await
        }

        async fn get(&self, pattern: &Fact) -> Result<Vec<WireFact>, StoreError> {
            self.inner.get(pattern).await
        }
    }

    /// Records the facts of every `bulk` call.
    #[derive(Default)]
    struct RecordingStore {
        inner: InMemoryFactStore,
        calls: std::sync::Mutex<Vec<Vec<Fact>>>,
    }

    impl RecordingStore {
        fn calls(&self) -> Vec<Vec<Fact>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FactStore for RecordingStore {
        async fn tell(&self, fact: &Fact) -> Result<(), StoreError> {
            self.bulk(&[], std::slice::from_ref(fact)).await
        }

        async fn bulk(&self, delete: &[Fact], tell: &[Fact]) -> Result<(), StoreError> {
            self.calls
                .lock()
                .unwrap()
                .push(delete.iter().chain(tell).cloned().collect());
            self.inner.bulk(delete, tell).await
        }

        async fn authorize(&self, actor: &EntityRef, action: &Action, resource: &EntityRef) -> Result<bool, StoreError> {
            self.inner.authorize(actor, action, resource).await
        }

        async fn actions(&self, actor: &EntityRef, resource: &EntityRef) -> Result<Vec<String>, StoreError> {
            self.inner.actions(actor, resource).await
        }

        async fn list(&self, actor: &EntityRef, action: &Action, kind: ResourceKind) -> Result<Vec<String>, StoreError> {
            self.inner.list(actor, action, kind).await
        }

        async fn get(&self, pattern: &Fact) -> Result<Vec<WireFact>, StoreError> {
            self.inner.get(pattern).await
        }
    }

    #[tokio::test]
    async fn issues_one_call_per_chunk() {
        let store = Arc::new(InMemoryFactStore::default());
        let sync = BatchSynchronizer::new(Arc::clone(&store), SyncConfig::default());

        let report = sync.sync_insertions(&test_facts(45), &test_ctx()).await;

        assert_eq!(store.bulk_calls(), 3);
        assert_eq!(report.chunks.len(), 3);
        assert!(report.all_applied);
        assert_eq!(store.len(), 45);
    }

    #[tokio::test]
    async fn second_chunk_failure_leaves_twenty_five_applied() {
        let facts = test_facts(45);
        let store = Arc::new(FlakyStore::failing([facts[20].clone()]));
        let sync = BatchSynchronizer::new(store, SyncConfig::default());

        let report = sync.sync_insertions(&facts, &test_ctx()).await;

        assert_eq!(report.total_requested, 45);
        assert_eq!(report.total_applied, 25);
        assert_eq!(report.total_failed, 20);
        assert!(!report.all_applied);
        assert!(matches!(report.chunks[1].outcome, ChunkOutcome::Failed { .. }));
        assert!(report.chunks[2].outcome.is_applied());
    }

    #[tokio::test]
    async fn reinserting_is_idempotent() {
        let store = Arc::new(InMemoryFactStore::default());
        let sync = BatchSynchronizer::new(Arc::clone(&store), SyncConfig::default());
        let facts = test_facts(30);

        sync.sync_insertions(&facts, &test_ctx()).await;
        let before = store.facts();
        sync.sync_insertions(&facts, &test_ctx()).await;

        assert_eq!(store.facts(), before);
    }

    #[tokio::test]
    async fn in_flight_chunks_are_unknown_after_deadline() {
        let facts = test_facts(45);
        let store = Arc::new(FlakyStore::stalling([facts[25].clone()]));
        let sync = BatchSynchronizer::new(store, SyncConfig::default());
        let ctx = test_ctx().with_timeout(Duration::from_millis(200));

        let report = sync.sync_insertions(&facts, &ctx).await;

        assert_eq!(report.total_applied, 25);
        assert_eq!(report.total_unknown, 20);
        assert_eq!(report.total_failed, 0);
        assert!(matches!(report.chunks[1].outcome, ChunkOutcome::Unknown { .. }));
        assert!(!report.all_applied);
    }

    #[tokio::test]
    async fn queued_chunks_are_not_sent_after_deadline() {
        let facts = test_facts(60);
        let store = Arc::new(FlakyStore::stalling(facts.clone()));
        let config = SyncConfig::default().with_max_in_flight(nz(1));
        let sync = BatchSynchronizer::new(store, config);
        let ctx = test_ctx().with_timeout(Duration::from_millis(100));

        let report = sync.sync_insertions(&facts, &ctx).await;

        assert_eq!(report.total_unknown, 20);
        assert_eq!(report.total_not_sent, 40);
        assert_eq!(report.calls_sent(), 1);
    }

    #[tokio::test]
    async fn expired_context_sends_nothing() {
        let store = Arc::new(InMemoryFactStore::default());
        let sync = BatchSynchronizer::new(Arc::clone(&store), SyncConfig::default());
        let ctx = test_ctx().with_timeout(Duration::ZERO);

        let report = sync.sync_insertions(&test_facts(5), &ctx).await;

        assert_eq!(store.bulk_calls(), 0);
        assert_eq!(report.total_not_sent, 5);
    }

    #[tokio::test]
    async fn replace_withholds_insertions_after_failed_deletion() {
        let pattern = FactEncoder::role_pattern(&EntityRef::user(1), &EntityRef::organization(1)).unwrap();
        let store = Arc::new(FlakyStore::failing([pattern.clone()]));
        let sync = BatchSynchronizer::new(Arc::clone(&store), SyncConfig::default());

        let report = sync.replace(&[pattern], &test_facts(3), &test_ctx()).await;

        assert!(report.insertions_skipped);
        assert_eq!(report.insertions.total_not_sent, 3);
        assert!(store.inner.is_empty());
        assert!(!report.all_applied());
    }

    #[tokio::test]
    async fn replace_deletes_before_telling() {
        let store = Arc::new(InMemoryFactStore::default());
        let sync = BatchSynchronizer::new(Arc::clone(&store), SyncConfig::default());
        sync.sync_insertions(&test_facts(3), &test_ctx()).await;

        let wipe = FactEncoder::deletion_wildcards(factgate_core::Predicate::HasRole, 3).unwrap();
        let fresh = vec![
            FactEncoder::role_assignment(&EntityRef::user(9), &Role::ADMIN, &EntityRef::organization(1)).unwrap(),
        ];
        let report = sync.replace(&[wipe], &fresh, &test_ctx()).await;

        assert!(report.all_applied());
        assert_eq!(store.facts(), fresh);
    }

    #[tokio::test]
    async fn atomic_apply_is_a_single_call() {
        let store = Arc::new(InMemoryFactStore::default());
        let sync = BatchSynchronizer::new(Arc::clone(&store), SyncConfig::default());
        let org = EntityRef::organization(1);
        let old = FactEncoder::role_assignment(&EntityRef::user(1), &Role::MEMBER, &org).unwrap();
        sync.sync_insertions(&[old], &test_ctx()).await;

        let pattern = FactEncoder::role_pattern(&EntityRef::user(1), &org).unwrap();
        let new = FactEncoder::role_assignment(&EntityRef::user(1), &Role::ADMIN, &org).unwrap();
        let report = sync.apply_atomic(&[pattern], &[new.clone()], &test_ctx()).await;

        assert!(report.all_applied);
        assert_eq!(report.calls_sent(), 1);
        assert_eq!(store.facts(), vec![new]);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: ceil(n/b) chunks, each at most b, covering 0..n exactly once in order.
        #[test]
        fn chunks_cover_input_exactly_once(n in 0usize..500, b in 1usize..64) {
            let bounds = chunk_bounds(n, nz(b));

            prop_assert_eq!(bounds.len(), n.div_ceil(b));
            let mut next = 0;
            for range in &bounds {
                prop_assert_eq!(range.start, next);
                prop_assert!(range.end > range.start);
                prop_assert!(range.end - range.start <= b);
                next = range.end;
            }
            prop_assert_eq!(next, n);
        }

        /// Property: the store sees ceil(n/b) calls of at most b facts that together
        /// carry every input fact exactly once.
        #[test]
        fn synchronizer_calls_cover_input_exactly_once(n in 0usize..120, b in 1usize..25, in_flight in 1usize..6) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
            let facts = test_facts(n);
            let store = Arc::new(RecordingStore::default());
            let config = SyncConfig::default().with_batch_size(nz(b)).with_max_in_flight(nz(in_flight));
            let sync = BatchSynchronizer::new(Arc::clone(&store), config);

            let report = rt.block_on(sync.sync_insertions(&facts, &test_ctx()));
            let calls = store.calls();

            prop_assert!(report.all_applied);
            prop_assert_eq!(calls.len(), n.div_ceil(b));
            prop_assert!(calls.iter().all(|call| !call.is_empty() && call.len() <= b));

            let mut sent: Vec<Fact> = calls.into_iter().flatten().collect();
            let mut expected = facts.clone();
            sent.sort();
            expected.sort();
            prop_assert_eq!(sent, expected);
        }
    }
}
