use crate::clause::{Clause, ClauseId};
use crate::error::{Error, Result};
use crate::term::Literal;
use indexmap::IndexMap;

/// Facts and rules grouped by predicate signature.
///
/// Clauses are append-only: asserting the same clause twice stores it twice,
/// and each copy counts as an independent cause of its head. Once built, the
/// knowledge base is only read, so it can be shared by any number of
/// concurrent queries.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    /// Every clause, indexed by `ClauseId`
    clauses: Vec<Clause>,
    /// For each `(predicate, arity)`, clause ids in insertion order
    buckets: IndexMap<(String, usize), Vec<ClauseId>>,
    /// Arity fixed by the first use of each predicate name
    arities: IndexMap<String, usize>,
}

impl KnowledgeBase {
    /// Create an empty knowledge base
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a clause to the bucket of its head predicate.
    ///
    /// # Errors
    ///
    /// Fails without modifying the knowledge base when the clause is
    /// malformed (see [`Clause::validate`]) or when one of its literals uses a
    /// predicate name with a different arity than earlier clauses did.
    pub fn assert(&mut self, clause: Clause) -> Result<ClauseId> {
        clause.validate()?;

        let mut pending: IndexMap<&str, usize> = IndexMap::new();
        for literal in std::iter::once(&clause.head).chain(&clause.body) {
            let expected = self
                .arities
                .get(&literal.predicate)
                .or_else(|| pending.get(literal.predicate.as_str()))
                .copied();
            match expected {
                Some(expected) if expected != literal.arity() => {
                    return Err(Error::ArityMismatch {
                        literal: literal.clone(),
                        expected,
                    });
                }
                Some(_) => {}
                None => {
                    pending.insert(&literal.predicate, literal.arity());
                }
            }
        }
        let pending: Vec<(String, usize)> = pending
            .into_iter()
            .map(|(name, arity)| (name.to_string(), arity))
            .collect();
        self.arities.extend(pending);

        let id = ClauseId(self.clauses.len());
        self.buckets
            .entry((clause.head.predicate.clone(), clause.head.arity()))
            .or_default()
            .push(id);
        self.clauses.push(clause);
        Ok(id)
    }

    /// Assert every clause in order, stopping at the first error
    ///
    /// # Errors
    ///
    /// The first error reported by [`KnowledgeBase::assert`]. Clauses asserted
    /// before it are kept.
    pub fn assert_all(
        &mut self,
        clauses: impl IntoIterator<Item = Clause>,
    ) -> Result<Vec<ClauseId>> {
        clauses.into_iter().map(|clause| self.assert(clause)).collect()
    }

    /// Clauses whose head is `predicate/arity`, in insertion order.
    /// Unknown predicates have no clauses.
    pub fn clauses(
        &self,
        predicate: &str,
        arity: usize,
    ) -> impl Iterator<Item = (ClauseId, &Clause)> {
        self.buckets
            .get(&(predicate.to_string(), arity))
            .into_iter()
            .flatten()
            .map(|&id| (id, &self.clauses[id.0]))
    }

    /// Clauses whose head unifies in principle with `literal`
    pub fn candidates<'a>(
        &'a self,
        literal: &Literal,
    ) -> impl Iterator<Item = (ClauseId, &'a Clause)> {
        self.clauses(&literal.predicate, literal.arity())
    }

    /// Look up a clause by id
    #[must_use]
    pub fn clause(&self, id: ClauseId) -> Option<&Clause> {
        self.clauses.get(id.0)
    }

    /// Arity recorded for a predicate name
    #[must_use]
    pub fn arity(&self, predicate: &str) -> Option<usize> {
        self.arities.get(predicate).copied()
    }

    /// Every clause with its id, in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (ClauseId, &Clause)> {
        self.clauses
            .iter()
            .enumerate()
            .map(|(i, clause)| (ClauseId(i), clause))
    }

    /// Clauses with an empty body
    pub fn facts(&self) -> impl Iterator<Item = &Clause> {
        self.clauses.iter().filter(|c| c.is_fact())
    }

    /// Clauses with a non-empty body
    pub fn rules(&self) -> impl Iterator<Item = &Clause> {
        self.clauses.iter().filter(|c| !c.is_fact())
    }

    /// Defined `(predicate, arity)` pairs, in order of first definition
    pub fn predicates(&self) -> impl Iterator<Item = (&str, usize)> {
        self.buckets
            .keys()
            .map(|(name, arity)| (name.as_str(), *arity))
    }

    /// Number of clauses
    #[must_use]
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    /// Whether no clause was asserted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}
