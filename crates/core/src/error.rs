//! Fact construction error model.

use thiserror::Error;

/// Result type used across the fact model and encoder.
pub type FactResult<T> = Result<T, FactError>;

/// Fact construction error.
///
/// These are programmer errors (a predicate used with the wrong shape), not
/// runtime conditions. They are never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FactError {
    /// The argument count does not match the schema table.
    #[error("invalid arity for '{predicate}': expected {expected}, found {found}")]
    InvalidArity {
        predicate: String,
        expected: usize,
        found: usize,
    },

    /// An argument has the wrong type for its position.
    #[error("type mismatch for '{predicate}' at position {position}: expected {expected}, found {found}")]
    TypeMismatch {
        predicate: String,
        position: usize,
        expected: String,
        found: String,
    },

    /// The predicate name is not part of the schema table.
    #[error("unknown predicate '{0}'")]
    UnknownPredicate(String),

    /// A wire value could not be interpreted as a term.
    #[error("invalid term: {0}")]
    InvalidTerm(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl FactError {
    pub fn invalid_term(msg: impl Into<String>) -> Self {
        Self::InvalidTerm(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
