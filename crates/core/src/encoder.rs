//! Derives facts from relational domain state.
//!
//! The encoder is pure: it only builds [`Fact`] values, always through the
//! schema-checked constructor.

use std::collections::{HashMap, HashSet};

use crate::domain::{DomainSnapshot, OrgRole, RepoRole, Repository};
use crate::entity::{Entity, EntityRef, ResourceKind};
use crate::error::FactResult;
use crate::fact::{Fact, Term};
use crate::id::UserId;
use crate::role::Role;
use crate::schema::{BOOLEAN_TYPE, Predicate};

/// Relation label linking a repository to its owning organization.
pub const ORGANIZATION_RELATION: &str = "organization";

/// Boolean attributes of a resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Sparse: asserted only when true; no fact means not public.
    Public,
    /// Dense: always asserted with its boolean value.
    Protected,
}

impl Attribute {
    pub fn predicate(&self) -> Predicate {
        match self {
            Attribute::Public => Predicate::IsPublic,
            Attribute::Protected => Predicate::IsProtected,
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, Attribute::Public)
    }
}

/// Deletion patterns and insertions that together rebuild the fact store from
/// a [`DomainSnapshot`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotFacts {
    pub deletions: Vec<Fact>,
    pub insertions: Vec<Fact>,
}

/// Fact encoder for the GitClub domain.
#[derive(Debug, Default, Clone, Copy)]
pub struct FactEncoder;

impl FactEncoder {
    /// `has_relation(child, label, parent)`
    pub fn relation(child: &EntityRef, label: &str, parent: &EntityRef) -> FactResult<Fact> {
        Fact::new(
            Predicate::HasRelation,
            vec![Term::entity(child), Term::string(label), Term::entity(parent)],
        )
    }

    /// Attribute fact for `resource`, or `None` when a sparse attribute is false.
    pub fn attribute(resource: &EntityRef, attribute: Attribute, value: bool) -> FactResult<Option<Fact>> {
        match attribute {
            Attribute::Public if !value => Ok(None),
            Attribute::Public => Fact::new(Predicate::IsPublic, vec![Term::entity(resource)]).map(Some),
            Attribute::Protected => Fact::new(
                Predicate::IsProtected,
                vec![Term::entity(resource), Term::boolean(value)],
            )
            .map(Some),
        }
    }

    /// `has_role(subject, role, resource)`
    pub fn role_assignment(subject: &EntityRef, role: &Role, resource: &EntityRef) -> FactResult<Fact> {
        Fact::new(
            Predicate::HasRole,
            vec![Term::entity(subject), Term::string(role.as_str()), Term::entity(resource)],
        )
    }

    /// A pattern of `arity` full wildcards: matches every fact of `predicate`.
    pub fn deletion_wildcards(predicate: Predicate, arity: usize) -> FactResult<Fact> {
        predicate.check_arity(arity)?;
        Fact::new(predicate, vec![Term::Any; arity])
    }

    /// Matches whatever role `subject` holds on `resource`.
    pub fn role_pattern(subject: &EntityRef, resource: &EntityRef) -> FactResult<Fact> {
        Fact::new(
            Predicate::HasRole,
            vec![Term::entity(subject), Term::any_string(), Term::entity(resource)],
        )
    }

    /// Matches the current value of `attribute` on `resource`.
    pub fn attribute_pattern(resource: &EntityRef, attribute: Attribute) -> FactResult<Fact> {
        match attribute {
            Attribute::Public => Fact::new(Predicate::IsPublic, vec![Term::entity(resource)]),
            Attribute::Protected => Fact::new(
                Predicate::IsProtected,
                vec![Term::entity(resource), Term::wildcard(BOOLEAN_TYPE)],
            ),
        }
    }

    pub fn org_role(assignment: &OrgRole) -> FactResult<Fact> {
        Self::role_assignment(
            &EntityRef::user(assignment.user_id),
            &assignment.role,
            &EntityRef::organization(assignment.org_id),
        )
    }

    pub fn repo_role(assignment: &RepoRole) -> FactResult<Fact> {
        Self::role_assignment(
            &EntityRef::user(assignment.user_id),
            &assignment.role,
            &EntityRef::repository(assignment.repo_id),
        )
    }

    /// Every fact describing a repository row: its organization edge and its
    /// attributes.
    pub fn repository(repo: &Repository) -> FactResult<Vec<Fact>> {
        let this = repo.entity_ref();
        let mut facts = vec![Self::relation(
            &this,
            ORGANIZATION_RELATION,
            &EntityRef::organization(repo.org_id),
        )?];
        facts.extend(Self::attribute(&this, Attribute::Protected, repo.protected)?);
        facts.extend(Self::attribute(&this, Attribute::Public, repo.public)?);
        Ok(facts)
    }

    /// Facts for a freshly created repository; the creator becomes its admin.
    pub fn resource_created(repo: &Repository, creator: Option<UserId>) -> FactResult<Vec<Fact>> {
        let mut facts = Self::repository(repo)?;
        if let Some(creator) = creator {
            facts.push(Self::role_assignment(
                &EntityRef::user(creator),
                &Role::ADMIN,
                &repo.entity_ref(),
            )?);
        }
        Ok(facts)
    }

    /// Patterns removing every fact that mentions `resource`.
    pub fn resource_deletion_patterns(resource: &EntityRef) -> FactResult<Vec<Fact>> {
        let this = Term::entity(resource);
        let mut patterns = vec![
            Fact::new(Predicate::HasRole, vec![Term::Any, Term::Any, this.clone()])?,
            Fact::new(Predicate::HasRelation, vec![Term::Any, Term::Any, this.clone()])?,
            Fact::new(Predicate::HasRelation, vec![this.clone(), Term::Any, Term::Any])?,
        ];
        if resource.kind != ResourceKind::User {
            patterns.push(Fact::new(Predicate::IsPublic, vec![this.clone()])?);
            patterns.push(Fact::new(Predicate::IsProtected, vec![this, Term::Any])?);
        }
        Ok(patterns)
    }

    /// Typed deletion patterns plus the full insertion set for a snapshot.
    ///
    /// Role rows are collapsed to one role per (user, resource) pair; the last
    /// row for a pair wins.
    pub fn snapshot(snapshot: &DomainSnapshot) -> FactResult<SnapshotFacts> {
        let repo = || Term::of_kind(ResourceKind::Repository);
        let org = || Term::of_kind(ResourceKind::Organization);
        let user = || Term::of_kind(ResourceKind::User);

        let deletions = vec![
            Fact::new(
                Predicate::HasRelation,
                vec![repo(), Term::string(ORGANIZATION_RELATION), org()],
            )?,
            Fact::new(Predicate::IsProtected, vec![repo(), Term::wildcard(BOOLEAN_TYPE)])?,
            Fact::new(Predicate::IsPublic, vec![repo()])?,
            Fact::new(Predicate::HasRole, vec![user(), Term::any_string(), org()])?,
            Fact::new(Predicate::HasRole, vec![user(), Term::any_string(), repo()])?,
        ];

        let mut insertions = Vec::new();
        for repository in &snapshot.repositories {
            insertions.extend(Self::repository(repository)?);
        }

        let mut roles = RoleCollapse::default();
        for assignment in &snapshot.org_roles {
            roles.push(
                (assignment.user_id, EntityRef::organization(assignment.org_id)),
                Self::org_role(assignment)?,
            );
        }
        for assignment in &snapshot.repo_roles {
            roles.push(
                (assignment.user_id, EntityRef::repository(assignment.repo_id)),
                Self::repo_role(assignment)?,
            );
        }
        insertions.extend(roles.into_facts());

        let mut seen = HashSet::new();
        insertions.retain(|fact| seen.insert(fact.clone()));

        Ok(SnapshotFacts { deletions, insertions })
    }
}

/// Keeps one role fact per (user, resource), in first-seen order.
#[derive(Default)]
struct RoleCollapse {
    index: HashMap<(UserId, EntityRef), usize>,
    facts: Vec<Fact>,
}

impl RoleCollapse {
    fn push(&mut self, key: (UserId, EntityRef), fact: Fact) {
        match self.index.get(&key) {
            Some(&slot) => self.facts[slot] = fact,
            None => {
                self.index.insert(key, self.facts.len());
                self.facts.push(fact);
            }
        }
    }

    fn into_facts(self) -> Vec<Fact> {
        self.facts
    }
}
