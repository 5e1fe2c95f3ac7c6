//! Normalized result of a listing query.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Marker the fact store returns instead of ids when every resource of the
/// queried type is visible.
pub const WILDCARD_SENTINEL: &str = "*";

/// Which resources of one type a subject may see.
///
/// `Unrestricted` must never be expanded into "all ids known right now":
/// resources created after the query are visible too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ids", rename_all = "snake_case")]
pub enum AuthorizationDecision {
    Unrestricted,
    ExplicitSet(BTreeSet<String>),
}

impl AuthorizationDecision {
    /// Interprets a raw listing result.
    ///
    /// The sentinel is checked before anything treats the result as ids: if it
    /// appears anywhere, the decision is `Unrestricted` regardless of the other
    /// entries.
    pub fn from_listing<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        if ids.iter().any(|id| id == WILDCARD_SENTINEL) {
            return AuthorizationDecision::Unrestricted;
        }
        AuthorizationDecision::ExplicitSet(ids.into_iter().collect())
    }

    pub fn explicit<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AuthorizationDecision::ExplicitSet(ids.into_iter().map(Into::into).collect())
    }

    pub fn none() -> Self {
        AuthorizationDecision::ExplicitSet(BTreeSet::new())
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, AuthorizationDecision::Unrestricted)
    }

    pub fn ids(&self) -> Option<&BTreeSet<String>> {
        match self {
            AuthorizationDecision::Unrestricted => None,
            AuthorizationDecision::ExplicitSet(ids) => Some(ids),
        }
    }

    pub fn permits(&self, id: &str) -> bool {
        match self {
            AuthorizationDecision::Unrestricted => true,
            AuthorizationDecision::ExplicitSet(ids) => ids.contains(id),
        }
    }

    /// Union of two decisions over the same resource type.
    pub fn union(self, other: AuthorizationDecision) -> AuthorizationDecision {
        match (self, other) {
            (AuthorizationDecision::ExplicitSet(mut a), AuthorizationDecision::ExplicitSet(b)) => {
                a.extend(b);
                AuthorizationDecision::ExplicitSet(a)
            }
            _ => AuthorizationDecision::Unrestricted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn sentinel_alone_is_unrestricted() {
        assert_eq!(
            AuthorizationDecision::from_listing(["*"]),
            AuthorizationDecision::Unrestricted
        );
    }

    #[test]
    fn empty_listing_is_an_empty_explicit_set() {
        let decision = AuthorizationDecision::from_listing(Vec::<String>::new());
        assert_eq!(decision, AuthorizationDecision::none());
        assert!(!decision.is_unrestricted());
        assert!(!decision.permits("1"));
    }

    #[test]
    fn explicit_set_permits_only_its_ids() {
        let decision = AuthorizationDecision::from_listing(["1", "3"]);
        assert!(decision.permits("1"));
        assert!(!decision.permits("2"));
    }

    #[test]
    fn union_with_unrestricted_is_unrestricted() {
        let merged = AuthorizationDecision::explicit(["1"]).union(AuthorizationDecision::Unrestricted);
        assert!(merged.is_unrestricted());
        let merged = AuthorizationDecision::explicit(["1"]).union(AuthorizationDecision::explicit(["2"]));
        assert_eq!(merged, AuthorizationDecision::explicit(["1", "2"]));
    }

    #[test]
    fn serializes_as_tagged_value() {
        assert_eq!(
            serde_json::to_value(AuthorizationDecision::Unrestricted).unwrap(),
            json!({"kind": "unrestricted"})
        );
        assert_eq!(
            serde_json::to_value(AuthorizationDecision::explicit(["2"])).unwrap(),
            json!({"kind": "explicit_set", "ids": ["2"]})
        );
    }

    proptest! {
        /// Property: the sentinel wins wherever it appears in the raw listing.
        #[test]
        fn sentinel_takes_precedence(
            ids in prop::collection::vec("[0-9]{1,4}", 0..20),
            position in any::<prop::sample::Index>()
        ) {
            let mut raw = ids.clone();
            let at = position.index(raw.len() + 1);
            raw.insert(at, WILDCARD_SENTINEL.to_string());
            prop_assert_eq!(AuthorizationDecision::from_listing(raw), AuthorizationDecision::Unrestricted);
        }

        /// Property: without the sentinel, the decision is exactly the listed ids.
        #[test]
        fn plain_listing_is_explicit(ids in prop::collection::vec("[0-9]{1,4}", 0..20)) {
            let decision = AuthorizationDecision::from_listing(ids.clone());
            let expected: BTreeSet<String> = ids.into_iter().collect();
            prop_assert_eq!(decision, AuthorizationDecision::ExplicitSet(expected));
        }
    }
}
