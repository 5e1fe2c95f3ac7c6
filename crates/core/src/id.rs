//! Strongly-typed identifiers of the relational domain.
//!
//! The relational store keys rows by integer primary keys; the fact store only
//! ever sees their decimal string form.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::FactError;

/// Identifier of a user (actor identity).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

/// Identifier of an organization.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(i64);

/// Identifier of a repository.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryId(i64);

macro_rules! impl_key_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            pub fn new(key: i64) -> Self {
                Self(key)
            }

            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $t {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = FactError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let key = s
                    .parse::<i64>()
                    .map_err(|e| FactError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(key))
            }
        }
    };
}

impl_key_newtype!(UserId, "UserId");
impl_key_newtype!(OrganizationId, "OrganizationId");
impl_key_newtype!(RepositoryId, "RepositoryId");
