//! Fact model: a predicate applied to an ordered list of typed terms.
//!
//! Facts are value objects. Equality is structural, which matches how the
//! remote store treats two facts with identical predicate and arguments.

use serde::{Deserialize, Serialize};

use crate::entity::{EntityRef, ResourceKind};
use crate::error::{FactError, FactResult};
use crate::schema::{BOOLEAN_TYPE, Predicate, STRING_TYPE, Slot};
use crate::value_object::ValueObject;

/// One positional argument of a fact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "WireValue", try_from = "WireValue")]
pub enum Term {
    /// A concrete value: `{type, id}`.
    Concrete { kind: String, id: String },
    /// Type known, identity unconstrained.
    Wildcard { kind: String },
    /// Type and identity unconstrained. Only meaningful in patterns.
    Any,
}

impl Term {
    pub fn concrete(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Term::Concrete {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn entity(entity: &EntityRef) -> Self {
        Term::concrete(entity.kind.as_str(), entity.id.clone())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Term::concrete(STRING_TYPE, value)
    }

    pub fn boolean(value: bool) -> Self {
        Term::concrete(BOOLEAN_TYPE, if value { "true" } else { "false" })
    }

    pub fn wildcard(kind: impl Into<String>) -> Self {
        Term::Wildcard { kind: kind.into() }
    }

    pub fn of_kind(kind: ResourceKind) -> Self {
        Term::wildcard(kind.as_str())
    }

    pub fn any_string() -> Self {
        Term::wildcard(STRING_TYPE)
    }

    pub fn kind(&self) -> Option<&str> {
        match self {
            Term::Concrete { kind, .. } | Term::Wildcard { kind } => Some(kind),
            Term::Any => None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Term::Concrete { id, .. } => Some(id),
            _ => None,
        }
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self, Term::Concrete { .. })
    }

    /// Reads this term back as an entity reference, if it is one.
    pub fn as_entity_ref(&self) -> Option<EntityRef> {
        match self {
            Term::Concrete { kind, id } => kind.parse().ok().map(|k| EntityRef::new(k, id.clone())),
            _ => None,
        }
    }

    /// Pattern match: `self` is the pattern, `value` the stored term.
    pub fn matches(&self, value: &Term) -> bool {
        match (self, value) {
            (Term::Any, _) => true,
            (Term::Wildcard { kind }, Term::Concrete { kind: k, .. })
            | (Term::Wildcard { kind }, Term::Wildcard { kind: k }) => kind == k,
            (Term::Concrete { .. }, Term::Concrete { .. }) => self == value,
            _ => false,
        }
    }
}

impl core::fmt::Display for Term {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Term::Concrete { kind, id } => write!(f, "{kind}:{id}"),
            Term::Wildcard { kind } => write!(f, "{kind}:*"),
            Term::Any => f.write_str("_"),
        }
    }
}

impl ValueObject for Term {}

/// Wire representation of a term: `{"type": .., "id": ..}` with either key absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireValue {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl From<Term> for WireValue {
    fn from(term: Term) -> Self {
        match term {
            Term::Concrete { kind, id } => WireValue {
                kind: Some(kind),
                id: Some(id),
            },
            Term::Wildcard { kind } => WireValue {
                kind: Some(kind),
                id: None,
            },
            Term::Any => WireValue::default(),
        }
    }
}

impl TryFrom<WireValue> for Term {
    type Error = FactError;

    fn try_from(value: WireValue) -> Result<Self, Self::Error> {
        match (value.kind, value.id) {
            (Some(kind), Some(id)) => Ok(Term::Concrete { kind, id }),
            (Some(kind), None) => Ok(Term::Wildcard { kind }),
            (None, None) => Ok(Term::Any),
            (None, Some(id)) => Err(FactError::invalid_term(format!("id '{id}' without a type"))),
        }
    }
}

/// A schema-checked fact.
///
/// Construct through [`Fact::new`] (or the encoder); the arguments are
/// validated against the [`Predicate`] schema table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "WireFact", try_from = "WireFact")]
pub struct Fact {
    predicate: Predicate,
    args: Vec<Term>,
}

impl Fact {
    pub fn new(predicate: Predicate, args: Vec<Term>) -> FactResult<Self> {
        predicate.check_arity(args.len())?;
        for (position, (slot, term)) in predicate.slots().iter().zip(&args).enumerate() {
            check_slot(predicate, position, *slot, term)?;
        }
        Ok(Self { predicate, args })
    }

    pub fn predicate(&self) -> Predicate {
        self.predicate
    }

    pub fn args(&self) -> &[Term] {
        &self.args
    }

    pub fn arg(&self, position: usize) -> Option<&Term> {
        self.args.get(position)
    }

    /// True when every argument is concrete (a storable fact, not a pattern).
    pub fn is_ground(&self) -> bool {
        self.args.iter().all(Term::is_concrete)
    }

    /// Pattern match: `self` is the pattern, `fact` the stored fact.
    pub fn matches(&self, fact: &Fact) -> bool {
        self.predicate == fact.predicate
            && self.args.len() == fact.args.len()
            && self.args.iter().zip(&fact.args).all(|(p, v)| p.matches(v))
    }

    pub fn to_wire(&self) -> WireFact {
        WireFact::from(self.clone())
    }
}

fn check_slot(predicate: Predicate, position: usize, slot: Slot, term: &Term) -> FactResult<()> {
    let Some(kind) = term.kind() else {
        return Ok(());
    };
    if !slot.accepts(kind) {
        return Err(FactError::TypeMismatch {
            predicate: predicate.name().to_string(),
            position,
            expected: slot.describe().to_string(),
            found: kind.to_string(),
        });
    }
    if let (Slot::Boolean, Some(id)) = (slot, term.id()) {
        if id != "true" && id != "false" {
            return Err(FactError::invalid_term(format!("'{id}' is not a boolean")));
        }
    }
    Ok(())
}

impl core::fmt::Display for Fact {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}(", self.predicate)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

impl ValueObject for Fact {}

/// Wire representation of a fact: predicate name + ordered argument list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFact {
    #[serde(alias = "name")]
    pub predicate: String,
    pub args: Vec<WireValue>,
}

impl From<Fact> for WireFact {
    fn from(fact: Fact) -> Self {
        WireFact {
            predicate: fact.predicate.name().to_string(),
            args: fact.args.into_iter().map(WireValue::from).collect(),
        }
    }
}

impl TryFrom<WireFact> for Fact {
    type Error = FactError;

    fn try_from(wire: WireFact) -> Result<Self, Self::Error> {
        let predicate = wire.predicate.parse::<Predicate>()?;
        let args = wire
            .args
            .into_iter()
            .map(Term::try_from)
            .collect::<FactResult<Vec<_>>>()?;
        Fact::new(predicate, args)
    }
}
