//! Filter descriptions for list endpoints.
//!
//! A [`ResourceFilter`] is what the relational query layer applies: an
//! optional scope (e.g. "within this organization") and an id restriction
//! derived from an [`AuthorizationDecision`]. No I/O happens here.

use std::collections::BTreeSet;

use serde::Serialize;

use factgate_core::{Organization, Repository, User};

use crate::decision::AuthorizationDecision;

/// Scope field holding a repository's owning organization.
pub const ORG_SCOPE: &str = "org_id";

/// Restriction on row ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "ids", rename_all = "snake_case")]
pub enum IdRestriction {
    /// No id restriction.
    Any,
    /// Only these ids. Empty means no rows.
    Only(BTreeSet<String>),
    /// Every id except these.
    Excluding(BTreeSet<String>),
}

/// Equality constraint on one scope field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeConstraint {
    pub field: String,
    pub value: String,
}

/// Rows a list endpoint may return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceFilter {
    scope: Vec<ScopeConstraint>,
    ids: IdRestriction,
}

/// A row the filter can be evaluated against in memory.
pub trait Filterable {
    fn filter_id(&self) -> String;

    /// Value of a scope field, if the row has one.
    fn scope_value(&self, field: &str) -> Option<String>;
}

impl ResourceFilter {
    pub fn from_decision(decision: AuthorizationDecision) -> Self {
        let ids = match decision {
            AuthorizationDecision::Unrestricted => IdRestriction::Any,
            AuthorizationDecision::ExplicitSet(ids) => IdRestriction::Only(ids),
        };
        Self { scope: Vec::new(), ids }
    }

    pub fn unrestricted() -> Self {
        Self {
            scope: Vec::new(),
            ids: IdRestriction::Any,
        }
    }

    pub fn excluding<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scope: Vec::new(),
            ids: IdRestriction::Excluding(ids.into_iter().map(Into::into).collect()),
        }
    }

    /// Repositories of one organization visible under `decision`.
    pub fn for_organization(decision: AuthorizationDecision, org_id: impl core::fmt::Display) -> Self {
        Self::from_decision(decision).within(ORG_SCOPE, org_id)
    }

    /// Adds an equality constraint on `field`.
    pub fn within(mut self, field: impl Into<String>, value: impl core::fmt::Display) -> Self {
        self.scope.push(ScopeConstraint {
            field: field.into(),
            value: value.to_string(),
        });
        self
    }

    pub fn scope(&self) -> &[ScopeConstraint] {
        &self.scope
    }

    pub fn ids(&self) -> &IdRestriction {
        &self.ids
    }

    /// True when no row can match, whatever the scope.
    pub fn is_empty_result(&self) -> bool {
        matches!(&self.ids, IdRestriction::Only(ids) if ids.is_empty())
    }

    pub fn matches<R: Filterable + ?Sized>(&self, row: &R) -> bool {
        let in_scope = self
            .scope
            .iter()
            .all(|c| row.scope_value(&c.field).as_deref() == Some(c.value.as_str()));
        if !in_scope {
            return false;
        }
        match &self.ids {
            IdRestriction::Any => true,
            IdRestriction::Only(ids) => ids.contains(&row.filter_id()),
            IdRestriction::Excluding(ids) => !ids.contains(&row.filter_id()),
        }
    }

    pub fn apply<'a, R: Filterable>(&self, rows: impl IntoIterator<Item = &'a R>) -> Vec<&'a R> {
        rows.into_iter().filter(|r| self.matches(*r)).collect()
    }
}

impl Filterable for Repository {
    fn filter_id(&self) -> String {
        self.id.to_string()
    }

    fn scope_value(&self, field: &str) -> Option<String> {
        match field {
            ORG_SCOPE => Some(self.org_id.to_string()),
            _ => None,
        }
    }
}

impl Filterable for Organization {
    fn filter_id(&self) -> String {
        self.id.to_string()
    }

    fn scope_value(&self, _field: &str) -> Option<String> {
        None
    }
}

impl Filterable for User {
    fn filter_id(&self) -> String {
        self.id.to_string()
    }

    fn scope_value(&self, _field: &str) -> Option<String> {
        None
    }
}
