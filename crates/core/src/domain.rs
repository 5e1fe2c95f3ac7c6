//! Relational domain entities that facts are derived from.
//!
//! Persistence of these rows lives outside this crate; they arrive here as
//! plain values read from the relational store.

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, ResourceKind};
use crate::id::{OrganizationId, RepositoryId, UserId};
use crate::role::Role;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub billing_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepositoryId,
    pub org_id: OrganizationId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub protected: bool,
}

/// A user's role within an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgRole {
    pub user_id: UserId,
    pub org_id: OrganizationId,
    pub role: Role,
}

/// A user's role on a single repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRole {
    pub user_id: UserId,
    pub repo_id: RepositoryId,
    pub role: Role,
}

/// Current relational state, read in one pass, from which the complete fact
/// set can be rebuilt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSnapshot {
    #[serde(default)]
    pub organizations: Vec<Organization>,
    #[serde(default)]
    pub repositories: Vec<Repository>,
    #[serde(default)]
    pub org_roles: Vec<OrgRole>,
    #[serde(default)]
    pub repo_roles: Vec<RepoRole>,
}

impl Entity for User {
    type Id = UserId;
    const KIND: ResourceKind = ResourceKind::User;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Entity for Organization {
    type Id = OrganizationId;
    const KIND: ResourceKind = ResourceKind::Organization;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Entity for Repository {
    type Id = RepositoryId;
    const KIND: ResourceKind = ResourceKind::Repository;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
