use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use factgate_core::Action;

/// Every action a subject may perform on one resource.
///
/// Attached to resource representations as their "permissions" metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionSet(BTreeSet<Action>);

/// Why an action set does not allow an operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessDenied {
    /// The resource is not visible at all; surfaced as "not found".
    #[error("not found")]
    NotVisible,

    #[error("forbidden: missing action '{0}'")]
    Forbidden(String),
}

impl ActionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, action: &Action) -> bool {
        self.0.contains(action)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Two-step check used by member-management endpoints: a subject that
    /// cannot see the resource must not learn that it exists.
    ///
    /// - No IO
    /// - No panics
    pub fn require(&self, visible: &Action, required: &Action) -> Result<(), AccessDenied> {
        if !self.contains(visible) {
            return Err(AccessDenied::NotVisible);
        }
        if !self.contains(required) {
            return Err(AccessDenied::Forbidden(required.as_str().to_string()));
        }
        Ok(())
    }
}

impl FromIterator<Action> for ActionSet {
    fn from_iter<T: IntoIterator<Item = Action>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ActionSet {
    type Item = Action;
    type IntoIter = std::collections::btree_set::IntoIter<Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
