//! The fixed fact schema table.
//!
//! Every predicate has a fixed arity and a fixed type per position. Facts are
//! checked against this table when they are constructed, so a fact with
//! swapped positions cannot be built.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::entity::ResourceKind;
use crate::error::FactError;

/// Type name of string-valued arguments (roles, relation labels).
pub const STRING_TYPE: &str = "String";

/// Type name of boolean-valued arguments.
pub const BOOLEAN_TYPE: &str = "Boolean";

/// Predicates understood by the fact store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// `has_role(User, role: String, Resource)`
    HasRole,
    /// `has_relation(child: Resource, label: String, parent: Resource)`
    HasRelation,
    /// `is_public(Resource)`; sparse, only asserted when true.
    IsPublic,
    /// `is_protected(Resource, Boolean)`
    IsProtected,
}

/// Position type in the schema table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Slot {
    /// The acting subject (always a `User`).
    Actor,
    /// Any entity type known to [`ResourceKind`].
    Resource,
    /// A string literal.
    String,
    /// A boolean literal (`"true"` / `"false"`).
    Boolean,
}

impl Slot {
    /// Whether a term of `type_name` may occupy this position.
    pub fn accepts(&self, type_name: &str) -> bool {
        match self {
            Slot::Actor => type_name == ResourceKind::User.as_str(),
            Slot::Resource => type_name.parse::<ResourceKind>().is_ok(),
            Slot::String => type_name == STRING_TYPE,
            Slot::Boolean => type_name == BOOLEAN_TYPE,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Slot::Actor => "User",
            Slot::Resource => "Resource",
            Slot::String => STRING_TYPE,
            Slot::Boolean => BOOLEAN_TYPE,
        }
    }
}

impl Predicate {
    pub const ALL: [Predicate; 4] = [
        Predicate::HasRole,
        Predicate::HasRelation,
        Predicate::IsPublic,
        Predicate::IsProtected,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Predicate::HasRole => "has_role",
            Predicate::HasRelation => "has_relation",
            Predicate::IsPublic => "is_public",
            Predicate::IsProtected => "is_protected",
        }
    }

    pub fn slots(&self) -> &'static [Slot] {
        match self {
            Predicate::HasRole => &[Slot::Actor, Slot::String, Slot::Resource],
            Predicate::HasRelation => &[Slot::Resource, Slot::String, Slot::Resource],
            Predicate::IsPublic => &[Slot::Resource],
            Predicate::IsProtected => &[Slot::Resource, Slot::Boolean],
        }
    }

    pub fn arity(&self) -> usize {
        self.slots().len()
    }

    /// Fails with `InvalidArity` unless `found` matches the schema table.
    pub fn check_arity(&self, found: usize) -> Result<(), FactError> {
        if found != self.arity() {
            return Err(FactError::InvalidArity {
                predicate: self.name().to_string(),
                expected: self.arity(),
                found,
            });
        }
        Ok(())
    }
}

impl core::fmt::Display for Predicate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Predicate {
    type Err = FactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Predicate::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| FactError::UnknownPredicate(s.to_string()))
    }
}
