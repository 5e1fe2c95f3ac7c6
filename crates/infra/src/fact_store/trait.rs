use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use factgate_core::{Action, EntityRef, Fact, ResourceKind, WireFact};

/// Fact store operation error.
///
/// These are **infrastructure errors** (transport, remote rejection, decoding)
/// as opposed to fact construction errors, which are caught before any call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached (connection refused, DNS, TLS, ...).
    #[error("fact store unreachable: {0}")]
    Unreachable(String),

    /// The request was sent but no answer arrived in time; the store may or
    /// may not have applied it.
    #[error("fact store timed out: {0}")]
    TimedOut(String),

    /// The store answered with a non-success status.
    #[error("fact store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("malformed fact store response: {0}")]
    Malformed(String),
}

impl StoreError {
    /// True when the outcome of a write is unknown rather than known-failed.
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, StoreError::TimedOut(_))
    }
}

/// Operations consumed from the remote fact store.
///
/// Every method is one remote call and a suspension point. Implementations do
/// not chunk; batching to the store's payload limit is the synchronizer's job.
///
/// `list` and `actions` return the store's raw answer: a listing may be the
/// wildcard sentinel, which only the resolver interprets.
#[async_trait]
pub trait FactStore: Send + Sync {
    /// Insert one fact.
    async fn tell(&self, fact: &Fact) -> Result<(), StoreError>;

    /// Delete every fact matched by `delete`, then insert `tell`, in one call.
    async fn bulk(&self, delete: &[Fact], tell: &[Fact]) -> Result<(), StoreError>;

    async fn bulk_tell(&self, facts: &[Fact]) -> Result<(), StoreError> {
        self.bulk(&[], facts).await
    }

    async fn bulk_delete(&self, patterns: &[Fact]) -> Result<(), StoreError> {
        self.bulk(patterns, &[]).await
    }

    async fn authorize(&self, actor: &EntityRef, action: &Action, resource: &EntityRef) -> Result<bool, StoreError>;

    async fn actions(&self, actor: &EntityRef, resource: &EntityRef) -> Result<Vec<String>, StoreError>;

    async fn list(&self, actor: &EntityRef, action: &Action, kind: ResourceKind) -> Result<Vec<String>, StoreError>;

    /// Facts matching `pattern`, undecoded.
    async fn get(&self, pattern: &Fact) -> Result<Vec<WireFact>, StoreError>;
}

#[async_trait]
impl<S> FactStore for Arc<S>
where
    S: FactStore + ?Sized,
{
    async fn tell(&self, fact: &Fact) -> Result<(), StoreError> {
        (**self).tell(fact).await
    }

    async fn bulk(&self, delete: &[Fact], tell: &[Fact]) -> Result<(), StoreError> {
        (**self).bulk(delete, tell).await
    }

    async fn authorize(&self, actor: &EntityRef, action: &Action, resource: &EntityRef) -> Result<bool, StoreError> {
        (**self).authorize(actor, action, resource).await
    }

    async fn actions(&self, actor: &EntityRef, resource: &EntityRef) -> Result<Vec<String>, StoreError> {
        (**self).actions(actor, resource).await
    }

    async fn list(&self, actor: &EntityRef, action: &Action, kind: ResourceKind) -> Result<Vec<String>, StoreError> {
        (**self).list(actor, action, kind).await
    }

    async fn get(&self, pattern: &Fact) -> Result<Vec<WireFact>, StoreError> {
        (**self).get(pattern).await
    }
}
