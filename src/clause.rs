use crate::error::{Error, Result};
use crate::term::{Literal, Variable};
use indexmap::IndexSet;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Probability annotation of a clause head, always in `(0, 1]`
#[derive(Debug, Clone, Copy)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "f64", into = "f64")
)]
pub struct Probability(f64);

impl Probability {
    /// Probability of a certain (unannotated) clause
    pub const CERTAIN: Self = Self(1.0);

    /// Validate a probability annotation
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidProbability`] unless `0 < value <= 1`.
    pub fn new(value: f64) -> Result<Self> {
        if value > 0.0 && value <= 1.0 {
            Ok(Self(value))
        } else {
            Err(Error::InvalidProbability(value))
        }
    }

    /// The wrapped value
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }

    /// Whether the annotation is `1`
    #[must_use]
    pub fn is_certain(self) -> bool {
        self.0 >= 1.0
    }
}

impl Default for Probability {
    fn default() -> Self {
        Self::CERTAIN
    }
}

impl TryFrom<f64> for Probability {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Probability> for f64 {
    fn from(p: Probability) -> Self {
        p.0
    }
}

// Valid probabilities are never NaN, so bit equality is value equality.
impl PartialEq for Probability {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Probability {}

impl Hash for Probability {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for Probability {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Probability {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Probability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Identity of an asserted clause: its global insertion index in the
/// knowledge base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClauseId(pub usize);

impl fmt::Display for ClauseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A fact (empty body) or a rule (e.g. `path(X, Z) :- edge(X, Y), path(Y, Z)`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Clause {
    /// The conclusion of the clause
    pub head: Literal,
    /// Conjunction of conditions, left to right
    pub body: Vec<Literal>,
    /// Annotation of the head; `1` for certain clauses
    pub probability: Probability,
}

impl Clause {
    /// A certain fact
    #[must_use]
    pub fn fact(head: Literal) -> Self {
        Self {
            head,
            body: Vec::new(),
            probability: Probability::CERTAIN,
        }
    }

    /// A certain rule
    #[must_use]
    pub fn rule(head: Literal, body: impl IntoIterator<Item = Literal>) -> Self {
        Self {
            head,
            body: body.into_iter().collect(),
            probability: Probability::CERTAIN,
        }
    }

    /// Annotate the head with `probability`
    #[must_use]
    pub fn with_probability(mut self, probability: Probability) -> Self {
        self.probability = probability;
        self
    }

    /// Whether the body is empty
    #[must_use]
    pub fn is_fact(&self) -> bool {
        self.body.is_empty()
    }

    /// Whether the head carries a probability below `1`
    #[must_use]
    pub fn is_probabilistic(&self) -> bool {
        !self.probability.is_certain()
    }

    /// Move every variable of the clause to `scope`
    #[must_use]
    pub fn rescoped(&self, scope: u32) -> Self {
        Self {
            head: self.head.rescoped(scope),
            body: self.body.iter().map(|l| l.rescoped(scope)).collect(),
            probability: self.probability,
        }
    }

    /// Check the clause is well formed on its own.
    ///
    /// Heads must be positive, facts ground, and every head variable of a
    /// rule must occur in a positive body literal.
    ///
    /// # Errors
    ///
    /// [`Error::NegatedHead`], [`Error::NonGroundFact`] or
    /// [`Error::UnsafeVariable`].
    pub fn validate(&self) -> Result<()> {
        if self.head.negated {
            return Err(Error::NegatedHead {
                literal: self.head.clone(),
            });
        }

        if self.is_fact() {
            if !self.head.is_ground() {
                return Err(Error::NonGroundFact {
                    literal: self.head.clone(),
                });
            }
            return Ok(());
        }

        let body_vars: IndexSet<&Variable> = self
            .body
            .iter()
            .filter(|literal| !literal.negated)
            .flat_map(Literal::variables)
            .collect();

        match self.head.variables().find(|var| !body_vars.contains(var)) {
            Some(var) => Err(Error::UnsafeVariable {
                variable: var.clone(),
                clause: Box::new(self.clone()),
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_probabilistic() {
            write!(f, "{}::", self.probability)?;
        }
        write!(f, "{}", self.head)?;
        for (i, literal) in self.body.iter().enumerate() {
            write!(f, "{}{literal}", if i == 0 { " :- " } else { ", " })?;
        }
        write!(f, ".")
    }
}
