use crate::clause::{Clause, ClauseId, Probability};
use crate::term::Literal;
use std::collections::{btree_map, BTreeMap, BTreeSet};
use std::fmt;
use std::iter::Flatten;

/// One body literal of a ground clause instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Premise {
    /// A literal answered by the knowledge base, possibly negated
    Relational(Literal),
    /// A builtin call with its bindings applied; always holds in the proof
    Builtin(Literal),
}

impl Premise {
    /// The ground literal
    #[must_use]
    pub fn literal(&self) -> &Literal {
        match self {
            Premise::Relational(literal) | Premise::Builtin(literal) => literal,
        }
    }
}

/// A ground instance of one clause that derives `head`.
///
/// Fields are ordered so that sorting depends on content before the source
/// clause id; proof sets therefore iterate the same way whatever order the
/// clauses were asserted in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Proof {
    /// The derived ground fact
    pub head: Literal,
    /// The fully bound body, left to right
    pub body: Vec<Premise>,
    /// Annotation of the source clause
    pub probability: Probability,
    /// The source clause
    pub clause: ClauseId,
}

impl Proof {
    /// The ground clause this proof instantiates
    #[must_use]
    pub fn clause_instance(&self) -> Clause {
        Clause::rule(
            self.head.clone(),
            self.body.iter().map(|p| p.literal().clone()),
        )
        .with_probability(self.probability)
    }

    /// Whether the source clause is annotated with a probability below `1`
    #[must_use]
    pub fn is_probabilistic(&self) -> bool {
        !self.probability.is_certain()
    }

    /// Facts this proof relies on, negated ones in their positive form
    pub fn dependencies(&self) -> impl Iterator<Item = Literal> + '_ {
        self.body.iter().filter_map(|premise| match premise {
            Premise::Relational(literal) => Some(literal.positive()),
            Premise::Builtin(_) => None,
        })
    }
}

impl fmt::Display for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.clause_instance(), self.clause)
    }
}

/// Proofs grouped by the fact they derive.
///
/// Both levels are ordered, so iteration never depends on the order in which
/// the solver discovered proofs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProofSet {
    proofs: BTreeMap<Literal, BTreeSet<Proof>>,
}

impl ProofSet {
    /// An empty proof set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a proof; returns false when it was already present
    pub fn insert(&mut self, proof: Proof) -> bool {
        self.proofs
            .entry(proof.head.clone())
            .or_default()
            .insert(proof)
    }

    /// Proofs of `fact`
    #[must_use]
    pub fn get(&self, fact: &Literal) -> Option<&BTreeSet<Proof>> {
        self.proofs.get(fact)
    }

    /// The stored copy of `fact` together with its proofs
    #[must_use]
    pub fn get_key_value(&self, fact: &Literal) -> Option<(&Literal, &BTreeSet<Proof>)> {
        self.proofs.get_key_value(fact)
    }

    /// Whether `fact` has at least one proof
    #[must_use]
    pub fn contains(&self, fact: &Literal) -> bool {
        self.proofs.contains_key(fact)
    }

    /// Facts with proofs, in order
    pub fn facts(&self) -> impl Iterator<Item = &Literal> {
        self.proofs.keys()
    }

    /// Every proof, grouped by fact
    pub fn iter(&self) -> impl Iterator<Item = &Proof> {
        self.proofs.values().flatten()
    }

    /// Total number of proofs
    #[must_use]
    pub fn len(&self) -> usize {
        self.proofs.values().map(BTreeSet::len).sum()
    }

    /// Whether there is no proof at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proofs.is_empty()
    }
}

impl FromIterator<Proof> for ProofSet {
    fn from_iter<I: IntoIterator<Item = Proof>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl Extend<Proof> for ProofSet {
    fn extend<I: IntoIterator<Item = Proof>>(&mut self, iter: I) {
        for proof in iter {
            self.insert(proof);
        }
    }
}

impl<'a> IntoIterator for &'a ProofSet {
    type Item = &'a Proof;
    type IntoIter = Flatten<btree_map::Values<'a, Literal, BTreeSet<Proof>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.proofs.values().flatten()
    }
}
