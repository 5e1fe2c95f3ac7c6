use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use factgate_core::{Action, EntityRef, Fact, Predicate, ResourceKind, Term, WireFact};
use factgate_core::encoder::ORGANIZATION_RELATION;

use super::r#trait::{FactStore, StoreError};

/// Longest relation chain followed when deriving implied roles.
const MAX_RELATION_DEPTH: usize = 8;

/// Role-to-action table for the in-memory store.
///
/// This is a stand-in for the hosted policy, not a policy language: roles
/// grant fixed actions per resource type, roles on a parent imply roles on a
/// child through a named relation, and some actions are granted to everyone.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPolicy {
    role_actions: HashMap<(ResourceKind, String), BTreeSet<String>>,
    implied: HashMap<(ResourceKind, String, String), String>,
    public_actions: HashMap<ResourceKind, BTreeSet<String>>,
    everyone: HashMap<ResourceKind, BTreeSet<String>>,
}

impl InMemoryPolicy {
    pub fn empty() -> Self {
        Self::default()
    }

    /// `role` on a `kind` resource grants `actions`.
    pub fn grant(mut self, kind: ResourceKind, role: &str, actions: &[&str]) -> Self {
        self.role_actions
            .entry((kind, role.to_string()))
            .or_default()
            .extend(actions.iter().map(|a| a.to_string()));
        self
    }

    /// `parent_role` on the `label` parent of a `child` resource implies `child_role` on it.
    pub fn imply(mut self, child: ResourceKind, label: &str, parent_role: &str, child_role: &str) -> Self {
        self.implied.insert(
            (child, label.to_string(), parent_role.to_string()),
            child_role.to_string(),
        );
        self
    }

    /// Actions anyone may perform on a `kind` resource that has `is_public`.
    pub fn public(mut self, kind: ResourceKind, actions: &[&str]) -> Self {
        self.public_actions
            .entry(kind)
            .or_default()
            .extend(actions.iter().map(|a| a.to_string()));
        self
    }

    /// Actions anyone may perform on every `kind` resource.
    pub fn everyone(mut self, kind: ResourceKind, actions: &[&str]) -> Self {
        self.everyone
            .entry(kind)
            .or_default()
            .extend(actions.iter().map(|a| a.to_string()));
        self
    }

    /// The GitClub model: organizations with admins and members, repositories
    /// inheriting roles from their organization.
    pub fn gitclub() -> Self {
        use ResourceKind::{Organization, Repository, User};

        Self::empty()
            .grant(
                Organization,
                "admin",
                &["read", "create_repositories", "view_members", "manage_members", "delete"],
            )
            .grant(Organization, "member", &["read", "create_repositories", "view_members"])
            .grant(Repository, "reader", &["read"])
            .grant(Repository, "editor", &["read", "write"])
            .grant(Repository, "maintainer", &["read", "write", "view_members"])
            .grant(
                Repository,
                "admin",
                &["read", "write", "view_members", "manage_members", "delete"],
            )
            .imply(Repository, ORGANIZATION_RELATION, "admin", "admin")
            .imply(Repository, ORGANIZATION_RELATION, "member", "reader")
            .public(Repository, &["read"])
            .everyone(User, &["read", "read_profile"])
    }
}

/// In-memory fact store.
///
/// Intended for tests/dev. Facts are kept in a set, so telling the same fact
/// twice stores it once.
#[derive(Debug)]
pub struct InMemoryFactStore {
    facts: RwLock<BTreeSet<Fact>>,
    policy: InMemoryPolicy,
    bulk_calls: AtomicUsize,
}

impl Default for InMemoryFactStore {
    fn default() -> Self {
        Self::new(InMemoryPolicy::gitclub())
    }
}

impl InMemoryFactStore {
    pub fn new(policy: InMemoryPolicy) -> Self {
        Self {
            facts: RwLock::new(BTreeSet::new()),
            policy,
            bulk_calls: AtomicUsize::new(0),
        }
    }

    /// Number of `bulk` calls served so far.
    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    pub fn facts(&self) -> Vec<Fact> {
        self.read().map(|f| f.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn contains(&self, fact: &Fact) -> bool {
        self.read().map(|f| f.contains(fact)).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.read().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeSet<Fact>>, StoreError> {
        self.facts
            .read()
            .map_err(|_| StoreError::Unreachable("lock poisoned".to_string()))
    }

    fn roles_on(&self, facts: &BTreeSet<Fact>, actor: &EntityRef, resource: &EntityRef, depth: usize) -> BTreeSet<String> {
        let actor_term = Term::entity(actor);
        let resource_term = Term::entity(resource);
        let mut roles = BTreeSet::new();

        for fact in facts.iter().filter(|f| f.predicate() == Predicate::HasRole) {
            let args = fact.args();
            if args[0].matches(&actor_term) && args[2].matches(&resource_term) {
                if let Some(role) = args[1].id() {
                    roles.insert(role.to_string());
                }
            }
        }

        if depth >= MAX_RELATION_DEPTH {
            return roles;
        }

        for fact in facts.iter().filter(|f| f.predicate() == Predicate::HasRelation) {
            let args = fact.args();
            if args[0] != resource_term {
                continue;
            }
            let (Some(label), Some(parent)) = (args[1].id(), args[2].as_entity_ref()) else {
                continue;
            };
            for parent_role in self.roles_on(facts, actor, &parent, depth + 1) {
                let key = (resource.kind, label.to_string(), parent_role);
                if let Some(role) = self.policy.implied.get(&key) {
                    roles.insert(role.clone());
                }
            }
        }

        roles
    }

    fn actions_on(&self, facts: &BTreeSet<Fact>, actor: &EntityRef, resource: &EntityRef) -> BTreeSet<String> {
        let mut actions: BTreeSet<String> = self
            .policy
            .everyone
            .get(&resource.kind)
            .cloned()
            .unwrap_or_default();

        for role in self.roles_on(facts, actor, resource, 0) {
            if let Some(granted) = self.policy.role_actions.get(&(resource.kind, role)) {
                actions.extend(granted.iter().cloned());
            }
        }

        let public = Fact::new(Predicate::IsPublic, vec![Term::entity(resource)]);
        if public.is_ok_and(|p| facts.contains(&p)) {
            if let Some(granted) = self.policy.public_actions.get(&resource.kind) {
                actions.extend(granted.iter().cloned());
            }
        }

        actions
    }

    /// True when `actor` holds a role on every `kind` resource that grants `action`.
    fn has_type_wide_grant(&self, facts: &BTreeSet<Fact>, actor: &EntityRef, action: &Action, kind: ResourceKind) -> bool {
        if self
            .policy
            .everyone
            .get(&kind)
            .is_some_and(|a| a.contains(action.as_str()))
        {
            return true;
        }

        let actor_term = Term::entity(actor);
        let every = Term::of_kind(kind);
        facts
            .iter()
            .filter(|f| f.predicate() == Predicate::HasRole)
            .filter(|f| f.args()[0].matches(&actor_term) && f.args()[2] == every)
            .filter_map(|f| f.args()[1].id())
            .any(|role| {
                self.policy
                    .role_actions
                    .get(&(kind, role.to_string()))
                    .is_some_and(|a| a.contains(action.as_str()))
            })
    }
}

#[async_trait]
impl FactStore for InMemoryFactStore {
    async fn tell(&self, fact: &Fact) -> Result<(), StoreError> {
        self.bulk(&[], std::slice::from_ref(fact)).await
    }

    async fn bulk(&self, delete: &[Fact], tell: &[Fact]) -> Result<(), StoreError> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(bad) = tell.iter().find(|f| f.args().iter().any(|t| *t == Term::Any)) {
            return Err(StoreError::Rejected {
                status: 400,
                message: format!("cannot tell a fact with an untyped wildcard: {bad}"),
            });
        }

        let mut facts = self
            .facts
            .write()
            .map_err(|_| StoreError::Unreachable("lock poisoned".to_string()))?;

        if !delete.is_empty() {
            facts.retain(|fact| !delete.iter().any(|pattern| pattern.matches(fact)));
        }
        facts.extend(tell.iter().cloned());
        Ok(())
    }

    async fn authorize(&self, actor: &EntityRef, action: &Action, resource: &EntityRef) -> Result<bool, StoreError> {
        let facts = self.read()?;
        Ok(self.actions_on(&facts, actor, resource).contains(action.as_str()))
    }

    async fn actions(&self, actor: &EntityRef, resource: &EntityRef) -> Result<Vec<String>, StoreError> {
        let facts = self.read()?;
        Ok(self.actions_on(&facts, actor, resource).into_iter().collect())
    }

    async fn list(&self, actor: &EntityRef, action: &Action, kind: ResourceKind) -> Result<Vec<String>, StoreError> {
        let facts = self.read()?;
        if self.has_type_wide_grant(&facts, actor, action, kind) {
            return Ok(vec![factgate_auth::WILDCARD_SENTINEL.to_string()]);
        }

        let candidates: BTreeSet<EntityRef> = facts
            .iter()
            .flat_map(|f| f.args().iter())
            .filter_map(Term::as_entity_ref)
            .filter(|r| r.kind == kind)
            .collect();

        Ok(candidates
            .into_iter()
            .filter(|r| self.actions_on(&facts, actor, r).contains(action.as_str()))
            .map(|r| r.id)
            .collect())
    }

    async fn get(&self, pattern: &Fact) -> Result<Vec<WireFact>, StoreError> {
        let facts = self.read()?;
        Ok(facts
            .iter()
            .filter(|f| pattern.matches(f))
            .map(Fact::to_wire)
            .collect())
    }
}
