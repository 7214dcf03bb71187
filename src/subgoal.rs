//! Tabling: memoized answers per call pattern.

use crate::error::Result;
use crate::proof::Proof;
use crate::term::{unify, Literal, Substitution, Term, Variable};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Call pattern of a literal: predicate, constants, and which argument
/// positions share a variable.
///
/// `path("a", X)` and `path("a", Y)` have the same signature; `p(X, X)` and
/// `p(X, Y)` do not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Signature(Literal);

impl Signature {
    /// Signature of the positive form of `literal`
    #[must_use]
    pub fn of(literal: &Literal) -> Self {
        let mut names: HashMap<&Variable, usize> = HashMap::new();
        let terms = literal.terms.iter().map(|term| match term {
            Term::Variable(var) => {
                let next = names.len();
                let index = *names.entry(var).or_insert(next);
                Term::var(format!("_{index}"))
            }
            Term::Constant(_) => term.clone(),
        });
        Self(Literal::new(literal.predicate.clone(), terms.collect::<Vec<_>>()))
    }

    /// The canonical pattern literal
    #[must_use]
    pub fn literal(&self) -> &Literal {
        &self.0
    }

    /// Whether `fact` is an instance of this pattern
    #[must_use]
    pub fn covers(&self, fact: &Literal) -> bool {
        unify(&self.0, &fact.positive(), &Substitution::new()).is_some()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, self.0.arity())
    }
}

/// Bookkeeping of one memoized call pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subgoal {
    /// The call pattern
    pub signature: Signature,
    /// Creation rank within the store
    pub id: usize,
    /// Distinct answers derived so far
    pub answers: usize,
    /// Distinct proofs recorded so far
    pub proofs: usize,
}

/// Storage of subgoal answers for the lifetime of one query.
///
/// Answer sets only grow. Implementations must agree on answers and proofs;
/// they only differ in where the data lives.
pub trait SubgoalStore: fmt::Debug {
    /// The subgoal for `signature`, created empty on first use
    ///
    /// # Errors
    ///
    /// Storage failures.
    fn get(&mut self, signature: &Signature) -> Result<Subgoal>;

    /// Whether a subgoal exists for `signature`
    fn contains(&self, signature: &Signature) -> bool;

    /// Record `fact` as an answer of `signature`, with the proofs that derive
    /// it. Returns whether the fact or any of the proofs was new.
    ///
    /// # Errors
    ///
    /// Storage failures.
    fn put(&mut self, signature: &Signature, fact: &Literal, proofs: &[Proof]) -> Result<bool>;

    /// Answers of `signature` in derivation order
    ///
    /// # Errors
    ///
    /// Storage failures.
    fn iterate(&self, signature: &Signature) -> Result<Vec<Literal>>;

    /// Proofs recorded for `fact` under `signature`
    ///
    /// # Errors
    ///
    /// Storage failures.
    fn proofs(&self, signature: &Signature, fact: &Literal) -> Result<Vec<Proof>>;

    /// Every proof recorded under `signature`, whatever its fact
    ///
    /// # Errors
    ///
    /// Storage failures.
    fn recorded(&self, signature: &Signature) -> Result<Vec<Proof>>;

    /// Every signature with a subgoal, in creation order
    fn signatures(&self) -> Vec<Signature>;

    /// Number of subgoals
    fn len(&self) -> usize;

    /// Whether no subgoal was created
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release the store's resources. The store is empty afterwards.
    ///
    /// # Errors
    ///
    /// Storage failures while releasing.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Fully resident subgoal store
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: IndexMap<Signature, IndexMap<Literal, IndexSet<Proof>>>,
}

impl MemoryStore {
    /// An empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SubgoalStore for MemoryStore {
    fn get(&mut self, signature: &Signature) -> Result<Subgoal> {
        let entry = self.tables.entry(signature.clone());
        let id = entry.index();
        let table = entry.or_default();
        Ok(Subgoal {
            signature: signature.clone(),
            id,
            answers: table.len(),
            proofs: table.values().map(IndexSet::len).sum(),
        })
    }

    fn contains(&self, signature: &Signature) -> bool {
        self.tables.contains_key(signature)
    }

    fn put(&mut self, signature: &Signature, fact: &Literal, proofs: &[Proof]) -> Result<bool> {
        let table = self.tables.entry(signature.clone()).or_default();
        let mut changed = !table.contains_key(fact);
        let known = table.entry(fact.clone()).or_default();
        for proof in proofs {
            changed |= known.insert(proof.clone());
        }
        Ok(changed)
    }

    fn iterate(&self, signature: &Signature) -> Result<Vec<Literal>> {
        Ok(self
            .tables
            .get(signature)
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn proofs(&self, signature: &Signature, fact: &Literal) -> Result<Vec<Proof>> {
        Ok(self
            .tables
            .get(signature)
            .and_then(|table| table.get(fact))
            .map(|proofs| proofs.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn recorded(&self, signature: &Signature) -> Result<Vec<Proof>> {
        Ok(self
            .tables
            .get(signature)
            .map(|table| table.values().flatten().cloned().collect())
            .unwrap_or_default())
    }

    fn signatures(&self) -> Vec<Signature> {
        self.tables.keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.tables.len()
    }

    fn close(&mut self) -> Result<()> {
        self.tables.clear();
        Ok(())
    }
}

/// Creates the subgoal store of each query
pub type StoreFactory = Arc<dyn Fn() -> Result<Box<dyn SubgoalStore>> + Send + Sync>;

/// Where subgoal answers are kept during a query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Storage {
    /// Keep everything in memory
    #[default]
    Memory,
    /// Spill answers to a scratch directory, created inside `directory` or
    /// the system temporary directory
    #[cfg(feature = "spill")]
    Disk {
        /// Parent of the scratch directory
        directory: Option<std::path::PathBuf>,
    },
}

impl Storage {
    /// Open a fresh, empty store
    ///
    /// # Errors
    ///
    /// Failure to create the scratch directory of a disk store.
    pub fn open(&self) -> Result<Box<dyn SubgoalStore>> {
        match self {
            Storage::Memory => Ok(Box::new(MemoryStore::new())),
            #[cfg(feature = "spill")]
            Storage::Disk { directory } => Ok(Box::new(match directory {
                Some(parent) => crate::spill::DiskStore::in_dir(parent)?,
                None => crate::spill::DiskStore::new()?,
            })),
        }
    }

    /// A factory opening this kind of store for every query
    #[must_use]
    pub fn factory(&self) -> StoreFactory {
        let storage = self.clone();
        Arc::new(move || storage.open())
    }
}
