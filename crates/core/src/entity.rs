//! Entity trait and typed references to entities in the fact store.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::FactError;

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    /// The resource kind this entity is known as in the fact store.
    const KIND: ResourceKind;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Typed reference used when encoding facts about this entity.
    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(Self::KIND, self.id().to_string())
    }
}

/// Closed set of entity types the fact schema knows about.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    User,
    Organization,
    Repository,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::User => "User",
            ResourceKind::Organization => "Organization",
            ResourceKind::Repository => "Repository",
        }
    }
}

impl core::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = FactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "User" => Ok(ResourceKind::User),
            "Organization" => Ok(ResourceKind::Organization),
            "Repository" => Ok(ResourceKind::Repository),
            other => Err(FactError::invalid_term(format!("unknown resource type '{other}'"))),
        }
    }
}

/// Reference to one concrete entity (`{type, id}`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: ResourceKind,
    pub id: String,
}

impl EntityRef {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    pub fn user(id: impl core::fmt::Display) -> Self {
        Self::new(ResourceKind::User, id.to_string())
    }

    pub fn organization(id: impl core::fmt::Display) -> Self {
        Self::new(ResourceKind::Organization, id.to_string())
    }

    pub fn repository(id: impl core::fmt::Display) -> Self {
        Self::new(ResourceKind::Repository, id.to_string())
    }
}

impl core::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Parses the `Type:id` form used by operator tooling.
impl FromStr for EntityRef {
    type Err = FactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| FactError::invalid_term(format!("expected 'Type:id', got '{s}'")))?;
        if id.is_empty() {
            return Err(FactError::invalid_id(format!("empty id in '{s}'")));
        }
        Ok(Self::new(kind.parse()?, id))
    }
}
