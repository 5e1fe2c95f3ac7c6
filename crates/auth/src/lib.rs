//! `factgate-auth` — pure authorization boundary.
//!
//! This crate is intentionally decoupled from the fact store and from HTTP:
//! it holds the per-request context, the normalized decision types the
//! resolver produces, and the filter descriptions list endpoints consume.

pub mod action_set;
pub mod context;
pub mod decision;
pub mod filter;

pub use action_set::{AccessDenied, ActionSet};
pub use context::RequestContext;
pub use decision::{AuthorizationDecision, WILDCARD_SENTINEL};
pub use filter::{Filterable, IdRestriction, ResourceFilter, ScopeConstraint, ORG_SCOPE};
