//! `factgate-core` — domain foundation for relationship-fact authorization.
//!
//! This crate contains **pure domain** primitives (no I/O): identifiers, the
//! relational entities facts are derived from, the fact model with its schema
//! table, and the encoder that turns domain state into facts.

pub mod action;
pub mod domain;
pub mod encoder;
pub mod entity;
pub mod error;
pub mod fact;
pub mod id;
pub mod role;
pub mod schema;
pub mod value_object;

pub use action::Action;
pub use domain::{DomainSnapshot, OrgRole, Organization, RepoRole, Repository, User};
pub use encoder::{Attribute, FactEncoder, SnapshotFacts};
pub use entity::{Entity, EntityRef, ResourceKind};
pub use error::{FactError, FactResult};
pub use fact::{Fact, Term, WireFact, WireValue};
pub use id::{OrganizationId, RepositoryId, UserId};
pub use role::Role;
pub use schema::{Predicate, Slot};
pub use value_object::ValueObject;
