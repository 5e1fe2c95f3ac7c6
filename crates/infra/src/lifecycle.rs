//! Fact synchronization for individual domain mutations.
//!
//! Called after the relational write has committed. Each method encodes the
//! facts for one change and ships them through the [`BatchSynchronizer`];
//! the returned report says what the store actually applied.

use serde::{Deserialize, Serialize};
use tracing::info;

use factgate_auth::RequestContext;
use factgate_core::{Attribute, EntityRef, FactEncoder, FactResult, Repository, Role, UserId};

use crate::fact_store::FactStore;
use crate::sync::{BatchSynchronizer, SyncReport};

/// A change to one subject's role on one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum RoleChange {
    Grant {
        subject: EntityRef,
        role: Role,
        resource: EntityRef,
    },
    /// Replaces whatever role the subject holds on the resource.
    Update {
        subject: EntityRef,
        role: Role,
        resource: EntityRef,
    },
    Revoke {
        subject: EntityRef,
        resource: EntityRef,
    },
}

impl RoleChange {
    pub fn name(&self) -> &'static str {
        match self {
            RoleChange::Grant { .. } => "grant",
            RoleChange::Update { .. } => "update",
            RoleChange::Revoke { .. } => "revoke",
        }
    }
}

/// Keeps the fact store in step with domain mutations.
#[derive(Debug, Clone)]
pub struct FactSync<S> {
    sync: BatchSynchronizer<S>,
}

impl<S> FactSync<S>
where
    S: FactStore + 'static,
{
    pub fn new(sync: BatchSynchronizer<S>) -> Self {
        Self { sync }
    }

    pub fn synchronizer(&self) -> &BatchSynchronizer<S> {
        &self.sync
    }

    /// Grant and update both clear the pair's existing role in the same call
    /// that tells the new one, so a pair never holds two roles.
    pub async fn sync_role_change(&self, change: &RoleChange, ctx: &RequestContext) -> FactResult<SyncReport> {
        info!(request_id = %ctx.request_id(), change = change.name(), "syncing role change");
        let report = match change {
            RoleChange::Grant { subject, role, resource } | RoleChange::Update { subject, role, resource } => {
                let old = FactEncoder::role_pattern(subject, resource)?;
                let new = FactEncoder::role_assignment(subject, role, resource)?;
                self.sync.apply_atomic(&[old], &[new], ctx).await
            }
            RoleChange::Revoke { subject, resource } => {
                let old = FactEncoder::role_pattern(subject, resource)?;
                self.sync.sync_deletions(&[old], ctx).await
            }
        };
        Ok(report)
    }

    /// Relation, attributes and (optionally) the creator's admin role of a new repository.
    pub async fn sync_resource_created(
        &self,
        repo: &Repository,
        creator: Option<UserId>,
        ctx: &RequestContext,
    ) -> FactResult<SyncReport> {
        let facts = FactEncoder::resource_created(repo, creator)?;
        info!(request_id = %ctx.request_id(), repository = %repo.id, facts = facts.len(), "syncing created repository");
        Ok(self.sync.sync_insertions(&facts, ctx).await)
    }

    /// Removes every fact that mentions `resource`.
    pub async fn sync_resource_deleted(&self, resource: &EntityRef, ctx: &RequestContext) -> FactResult<SyncReport> {
        let patterns = FactEncoder::resource_deletion_patterns(resource)?;
        info!(request_id = %ctx.request_id(), resource = %resource, "syncing deleted resource");
        Ok(self.sync.sync_deletions(&patterns, ctx).await)
    }

    pub async fn sync_attribute_change(
        &self,
        resource: &EntityRef,
        attribute: Attribute,
        value: bool,
        ctx: &RequestContext,
    ) -> FactResult<SyncReport> {
        let old = FactEncoder::attribute_pattern(resource, attribute)?;
        let new: Vec<_> = FactEncoder::attribute(resource, attribute, value)?.into_iter().collect();
        Ok(self.sync.apply_atomic(&[old], &new, ctx).await)
    }
}
