//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Facts and terms are value objects: immutable, compared structurally, and
/// freely cloned. Two facts with the same predicate and arguments are the same
/// fact, which is also how the remote store deduplicates them.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
