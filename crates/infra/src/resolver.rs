//! Authorization queries against the remote fact store.
//!
//! The resolver is the only place raw store answers are interpreted:
//! listing results go through [`AuthorizationDecision::from_listing`] so the
//! wildcard sentinel never reaches code that treats results as ids, and every
//! fact returned by `get` is checked against the schema table and the pattern
//! that was asked for.
//!
//! Nothing is cached; each call reads current facts.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, instrument};

use factgate_auth::{ActionSet, AuthorizationDecision, RequestContext, ResourceFilter};
use factgate_core::{Action, EntityRef, Fact, FactError, Predicate, ResourceKind, Role, Term, UserId};

use crate::fact_store::{FactStore, StoreError};

/// Resolution error.
///
/// Never mapped to allow or deny here; the caller picks fail-open or
/// fail-closed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The store could not be reached or did not answer in time.
    #[error("fact store unreachable: {0}")]
    Unreachable(String),

    #[error("fact store rejected query ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The store answered with something that does not fit the query.
    #[error("malformed result: {0}")]
    MalformedResult(String),

    /// The request deadline passed before an answer arrived.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The query itself could not be encoded.
    #[error(transparent)]
    Encoding(#[from] FactError),
}

impl From<StoreError> for ResolveError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unreachable(msg) | StoreError::TimedOut(msg) => ResolveError::Unreachable(msg),
            StoreError::Rejected { status, message } => ResolveError::Rejected { status, message },
            StoreError::Malformed(msg) => ResolveError::MalformedResult(msg),
        }
    }
}

/// One user's role on a resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RoleGrant {
    pub user_id: UserId,
    pub role: Role,
}

/// Answers authorization questions for the subject of a [`RequestContext`].
#[derive(Debug)]
pub struct AuthorizationResolver<S> {
    store: Arc<S>,
}

impl<S> Clone for AuthorizationResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: FactStore> AuthorizationResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Point check for the context's subject.
    #[instrument(skip_all, fields(request_id = %ctx.request_id(), action = %action, resource = %resource), err)]
    pub async fn authorize(&self, ctx: &RequestContext, action: &Action, resource: &EntityRef) -> Result<bool, ResolveError> {
        let allowed = bounded(ctx, self.store.authorize(ctx.subject(), action, resource)).await?;
        debug!(allowed, "authorize");
        Ok(allowed)
    }

    /// Every action the subject may perform on `resource`.
    #[instrument(skip_all, fields(request_id = %ctx.request_id(), resource = %resource), err)]
    pub async fn list_actions(&self, ctx: &RequestContext, resource: &EntityRef) -> Result<ActionSet, ResolveError> {
        let raw = bounded(ctx, self.store.actions(ctx.subject(), resource)).await?;
        if let Some(bad) = raw.iter().find(|a| a.is_empty()) {
            return Err(malformed(format!("empty action name in {bad:?}")));
        }
        Ok(raw.into_iter().map(Action::new).collect())
    }

    /// Which `kind` resources the subject may perform `action` on.
    #[instrument(skip_all, fields(request_id = %ctx.request_id(), action = %action, kind = %kind), err)]
    pub async fn list_authorized_resources(
        &self,
        ctx: &RequestContext,
        action: &Action,
        kind: ResourceKind,
    ) -> Result<AuthorizationDecision, ResolveError> {
        let raw = bounded(ctx, self.store.list(ctx.subject(), action, kind)).await?;
        // The sentinel wins over anything else in the listing.
        let decision = AuthorizationDecision::from_listing(raw);
        if decision.ids().is_some_and(|ids| ids.iter().any(String::is_empty)) {
            return Err(malformed("empty id in listing"));
        }
        debug!(unrestricted = decision.is_unrestricted(), "list");
        Ok(decision)
    }

    /// Members of `resource` with their role, ordered by user id.
    #[instrument(skip_all, fields(request_id = %ctx.request_id(), resource = %resource), err)]
    pub async fn role_assignments(&self, ctx: &RequestContext, resource: &EntityRef) -> Result<Vec<RoleGrant>, ResolveError> {
        let pattern = Fact::new(
            Predicate::HasRole,
            vec![Term::of_kind(ResourceKind::User), Term::any_string(), Term::entity(resource)],
        )?;

        let mut grants = Vec::new();
        for fact in self.fetch(ctx, &pattern).await? {
            let (Some(user), Some(role)) = (fact.args()[0].id(), fact.args()[1].id()) else {
                return Err(malformed(format!("role assignment without concrete user or role: {fact}")));
            };
            let user_id = user
                .parse::<UserId>()
                .map_err(|e| malformed(format!("{fact}: {e}")))?;
            grants.push(RoleGrant {
                user_id,
                role: Role::new(role.to_string()),
            });
        }
        grants.sort();
        Ok(grants)
    }

    /// Ids of users holding any role on `resource`.
    pub async fn assigned_users(&self, ctx: &RequestContext, resource: &EntityRef) -> Result<BTreeSet<UserId>, ResolveError> {
        Ok(self
            .role_assignments(ctx, resource)
            .await?
            .into_iter()
            .map(|g| g.user_id)
            .collect())
    }

    /// Filter selecting users that hold no role on `resource`.
    pub async fn unassigned_users(&self, ctx: &RequestContext, resource: &EntityRef) -> Result<ResourceFilter, ResolveError> {
        let assigned = self.assigned_users(ctx, resource).await?;
        Ok(ResourceFilter::excluding(assigned.iter().map(ToString::to_string)))
    }

    /// `kind` resources on which `user` holds some role directly.
    ///
    /// A role fact whose resource term carries no id grants the role on every
    /// resource of that type and yields `Unrestricted`.
    #[instrument(skip_all, fields(request_id = %ctx.request_id(), user = %user, kind = %kind), err)]
    pub async fn resources_with_role(
        &self,
        ctx: &RequestContext,
        user: &EntityRef,
        kind: ResourceKind,
    ) -> Result<AuthorizationDecision, ResolveError> {
        let pattern = Fact::new(
            Predicate::HasRole,
            vec![Term::entity(user), Term::any_string(), Term::of_kind(kind)],
        )?;

        let mut ids = BTreeSet::new();
        for fact in self.fetch(ctx, &pattern).await? {
            match fact.args()[2].id() {
                Some(id) => {
                    ids.insert(id.to_string());
                }
                None => return Ok(AuthorizationDecision::Unrestricted),
            }
        }
        Ok(AuthorizationDecision::ExplicitSet(ids))
    }

    /// Facts matching `pattern`, each validated against the schema and the pattern.
    async fn fetch(&self, ctx: &RequestContext, pattern: &Fact) -> Result<Vec<Fact>, ResolveError> {
        let raw = bounded(ctx, self.store.get(pattern)).await?;
        raw.into_iter()
            .map(|wire| {
                let fact = Fact::try_from(wire).map_err(|e| malformed(e.to_string()))?;
                if !pattern.matches(&fact) {
                    return Err(malformed(format!("{fact} does not match query {pattern}")));
                }
                Ok(fact)
            })
            .collect()
    }
}

fn malformed(msg: impl Into<String>) -> ResolveError {
    let msg = msg.into();
    error!(error = %msg, "malformed fact store result");
    ResolveError::MalformedResult(msg)
}

/// Runs one store call under the context's deadline.
async fn bounded<T, F>(ctx: &RequestContext, call: F) -> Result<T, ResolveError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    if ctx.is_expired() {
        return Err(ResolveError::DeadlineExceeded);
    }
    match ctx.deadline() {
        Some(deadline) => tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), call)
            .await
            .map_err(|_| ResolveError::DeadlineExceeded)?
            .map_err(ResolveError::from),
        None => call.await.map_err(ResolveError::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use factgate_core::{FactEncoder, WireFact, WireValue};

    use crate::fact_store::InMemoryFactStore;

    /// Answers every query with canned data.
    #[derive(Default)]
    struct CannedStore {
        listing: Vec<String>,
        facts: Vec<WireFact>,
        delay: Option<Duration>,
        down: bool,
    }

    impl CannedStore {
        async fn answer<T>(&self, value: T) -> Result<T, StoreError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.down {
                return Err(StoreError::Unreachable("connection refused".to_string()));
            }
            Ok(value)
        }
    }

    #[async_trait]
    impl FactStore for CannedStore {
        async fn tell(&self, _fact: &Fact) -> Result<(), StoreError> {
            self.answer(()).await
        }

        async fn bulk(&self, _delete: &[Fact], _tell: &[Fact]) -> Result<(), StoreError> {
            self.answer(()).await
        }

        async fn authorize(&self, _actor: &EntityRef, _action: &Action, _resource: &EntityRef) -> Result<bool, StoreError> {
            self.answer(true).await
        }

        async fn actions(&self, _actor: &EntityRef, _resource: &EntityRef) -> Result<Vec<String>, StoreError> {
            self.answer(self.listing.clone()).await
        }

        async fn list(&self, _actor: &EntityRef, _action: &Action, _kind: ResourceKind) -> Result<Vec<String>, StoreError> {
            self.answer(self.listing.clone()).await
        }

        async fn get(&self, _pattern: &Fact) -> Result<Vec<WireFact>, StoreError> {
            self.answer(self.facts.clone()).await
        }
    }

    fn wire(kind: &str, id: Option<&str>) -> WireValue {
        WireValue {
            kind: Some(kind.to_string()),
            id: id.map(str::to_string),
        }
    }

    fn role_wire(user: &str, role: &str, kind: &str, id: Option<&str>) -> WireFact {
        WireFact {
            predicate: "has_role".to_string(),
            args: vec![wire("User", Some(user)), wire("String", Some(role)), wire(kind, id)],
        }
    }

    fn resolver(store: CannedStore) -> AuthorizationResolver<CannedStore> {
        AuthorizationResolver::new(Arc::new(store))
    }

    fn test_ctx() -> RequestContext {
        RequestContext::new(UserId::new(1))
    }

    #[tokio::test]
    async fn sentinel_listing_is_unrestricted() {
        let r = resolver(CannedStore {
            listing: vec!["3".into(), "*".into()],
            ..Default::default()
        });
        let decision = r
            .list_authorized_resources(&test_ctx(), &Action::READ, ResourceKind::Repository)
            .await
            .unwrap();
        assert_eq!(decision, AuthorizationDecision::Unrestricted);
    }

    #[tokio::test]
    async fn sentinel_wins_over_blank_ids() {
        let r = resolver(CannedStore {
            listing: vec!["*".into(), "".into()],
            ..Default::default()
        });
        let decision = r
            .list_authorized_resources(&test_ctx(), &Action::READ, ResourceKind::Repository)
            .await
            .unwrap();
        assert_eq!(decision, AuthorizationDecision::Unrestricted);
    }

    #[tokio::test]
    async fn blank_id_without_sentinel_is_malformed() {
        let r = resolver(CannedStore {
            listing: vec!["3".into(), "".into()],
            ..Default::default()
        });
        let err = r
            .list_authorized_resources(&test_ctx(), &Action::READ, ResourceKind::Repository)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::MalformedResult(_)));
    }

    #[tokio::test]
    async fn empty_listing_is_an_empty_set() {
        let r = resolver(CannedStore::default());
        let decision = r
            .list_authorized_resources(&test_ctx(), &Action::READ, ResourceKind::Repository)
            .await
            .unwrap();
        assert_eq!(decision, AuthorizationDecision::none());
    }

    #[tokio::test]
    async fn outage_propagates_instead_of_denying() {
        let r = resolver(CannedStore {
            down: true,
            ..Default::default()
        });
        let err = r
            .authorize(&test_ctx(), &Action::READ, &EntityRef::repository(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Unreachable(_)));
    }

    #[tokio::test]
    async fn slow_store_hits_the_deadline() {
        let r = resolver(CannedStore {
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let ctx = test_ctx().with_timeout(Duration::from_millis(50));
        let err = r.authorize(&ctx, &Action::READ, &EntityRef::repository(1)).await.unwrap_err();
        assert_eq!(err, ResolveError::DeadlineExceeded);
    }

    #[tokio::test]
    async fn role_assignments_are_sorted_by_user() {
        let r = resolver(CannedStore {
            facts: vec![
                role_wire("12", "member", "Organization", Some("1")),
                role_wire("3", "admin", "Organization", Some("1")),
            ],
            ..Default::default()
        });
        let grants = r.role_assignments(&test_ctx(), &EntityRef::organization(1)).await.unwrap();
        let users: Vec<i64> = grants.iter().map(|g| g.user_id.get()).collect();
        assert_eq!(users, vec![3, 12]);
        assert_eq!(grants[0].role, Role::ADMIN);
    }

    #[tokio::test]
    async fn fact_for_another_resource_is_malformed() {
        let r = resolver(CannedStore {
            facts: vec![role_wire("3", "admin", "Organization", Some("2"))],
            ..Default::default()
        });
        let err = r.role_assignments(&test_ctx(), &EntityRef::organization(1)).await.unwrap_err();
        assert!(matches!(err, ResolveError::MalformedResult(_)));
    }

    #[tokio::test]
    async fn swapped_positions_are_malformed() {
        let swapped = WireFact {
            predicate: "has_role".to_string(),
            args: vec![
                wire("Organization", Some("1")),
                wire("String", Some("admin")),
                wire("User", Some("3")),
            ],
        };
        let r = resolver(CannedStore {
            facts: vec![swapped],
            ..Default::default()
        });
        let err = r.role_assignments(&test_ctx(), &EntityRef::organization(1)).await.unwrap_err();
        assert!(matches!(err, ResolveError::MalformedResult(_)));
    }

    #[tokio::test]
    async fn type_wide_role_is_unrestricted() {
        let r = resolver(CannedStore {
            facts: vec![
                role_wire("1", "admin", "Repository", Some("4")),
                role_wire("1", "admin", "Repository", None),
            ],
            ..Default::default()
        });
        let decision = r
            .resources_with_role(&test_ctx(), &EntityRef::user(1), ResourceKind::Repository)
            .await
            .unwrap();
        assert!(decision.is_unrestricted());
    }

    #[tokio::test]
    async fn unassigned_users_excludes_members() {
        let store = Arc::new(InMemoryFactStore::default());
        let org = EntityRef::organization(1);
        for user in [2, 5] {
            let fact = FactEncoder::role_assignment(&EntityRef::user(user), &Role::MEMBER, &org).unwrap();
            store.tell(&fact).await.unwrap();
        }
        let r = AuthorizationResolver::new(store);

        let filter = r.unassigned_users(&test_ctx(), &org).await.unwrap();
        assert_eq!(filter, ResourceFilter::excluding(["2", "5"]));
    }

    #[tokio::test]
    async fn action_set_comes_from_store() {
        let r = resolver(CannedStore {
            listing: vec!["read".into(), "manage_members".into()],
            ..Default::default()
        });
        let actions = r.list_actions(&test_ctx(), &EntityRef::repository(1)).await.unwrap();
        assert!(actions.require(&Action::READ, &Action::MANAGE_MEMBERS).is_ok());
    }
}
