//! Rebuilds the fact store from relational state.
//!
//! Used to reseed a development store and to repair drift after a crash left
//! the relational store and the fact store out of step. Deletion patterns are
//! typed, so facts of unrelated types survive a reset.

use tracing::{info, warn};

use factgate_auth::RequestContext;
use factgate_core::{DomainSnapshot, FactEncoder, FactResult};

use crate::fact_store::FactStore;
use crate::sync::{BatchSynchronizer, ReplaceReport};

#[derive(Debug, Clone)]
pub struct Reconciler<S> {
    sync: BatchSynchronizer<S>,
}

impl<S> Reconciler<S>
where
    S: FactStore + 'static,
{
    pub fn new(sync: BatchSynchronizer<S>) -> Self {
        Self { sync }
    }

    /// Replaces every domain-derived fact with the facts encoded from `snapshot`.
    ///
    /// Insertions are not sent unless all deletions were applied.
    pub async fn reset(&self, snapshot: &DomainSnapshot, ctx: &RequestContext) -> FactResult<ReplaceReport> {
        let encoded = FactEncoder::snapshot(snapshot)?;
        info!(
            request_id = %ctx.request_id(),
            deletions = encoded.deletions.len(),
            insertions = encoded.insertions.len(),
            "resetting fact store"
        );

        let report = self
            .sync
            .replace(&encoded.deletions, &encoded.insertions, ctx)
            .await;

        if report.all_applied() {
            info!(request_id = %ctx.request_id(), applied = report.insertions.total_applied, "reset complete");
        } else {
            warn!(
                request_id = %ctx.request_id(),
                insertions_skipped = report.insertions_skipped,
                "reset incomplete"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use factgate_core::{
        Action, EntityRef, Fact, OrgRole, OrganizationId, Predicate, RepoRole, Repository, RepositoryId, Role, Term,
        UserId,
    };

    use crate::fact_store::InMemoryFactStore;
    use crate::sync::SyncConfig;

    fn test_snapshot() -> DomainSnapshot {
        DomainSnapshot {
            repositories: (1..=3)
                .map(|i| Repository {
                    id: RepositoryId::new(i),
                    org_id: OrganizationId::new(1),
                    name: format!("repo-{i}"),
                    description: String::new(),
                    public: i == 3,
                    protected: false,
                })
                .collect(),
            org_roles: vec![OrgRole {
                user_id: UserId::new(1),
                org_id: OrganizationId::new(1),
                role: Role::MEMBER,
            }],
            repo_roles: vec![RepoRole {
                user_id: UserId::new(2),
                repo_id: RepositoryId::new(2),
                role: Role::new("maintainer"),
            }],
            ..Default::default()
        }
    }

    fn test_reconciler(store: &Arc<InMemoryFactStore>) -> Reconciler<InMemoryFactStore> {
        Reconciler::new(BatchSynchronizer::new(Arc::clone(store), SyncConfig::default()))
    }

    #[tokio::test]
    async fn reset_removes_stale_roles() {
        let store = Arc::new(InMemoryFactStore::default());
        let stale = Fact::new(
            Predicate::HasRole,
            vec![
                Term::entity(&EntityRef::user(9)),
                Term::string("admin"),
                Term::entity(&EntityRef::organization(1)),
            ],
        )
        .unwrap();
        store.tell(&stale).await.unwrap();

        let report = test_reconciler(&store)
            .reset(&test_snapshot(), &RequestContext::new(UserId::new(1)))
            .await
            .unwrap();

        assert!(report.all_applied());
        assert!(!store.contains(&stale));
        assert!(
            store
                .authorize(&EntityRef::user(1), &Action::READ, &EntityRef::repository(2))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn reset_twice_is_stable() {
        let store = Arc::new(InMemoryFactStore::default());
        let reconciler = test_reconciler(&store);
        let ctx = RequestContext::new(UserId::new(1));

        reconciler.reset(&test_snapshot(), &ctx).await.unwrap();
        let once = store.facts();
        reconciler.reset(&test_snapshot(), &ctx).await.unwrap();

        assert_eq!(store.facts(), once);
    }
}
