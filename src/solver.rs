//! Tabled top-down resolution.
//!
//! Every call pattern gets one subgoal table. A query runs passes over the
//! call graph: within a pass each signature is expanded once against the
//! current contents of the tables it depends on, and passes repeat until no
//! table grows. Recursive calls read the in-progress table of their own
//! signature, so cyclic rules terminate.

use crate::builtins::{Builtin, BuiltinOutcome, BuiltinRegistry};
use crate::error::{Error, Result};
use crate::estimator;
use crate::knowledge_base::KnowledgeBase;
use crate::proof::{Premise, Proof, ProofSet};
use crate::subgoal::{MemoryStore, Signature, SubgoalStore};
use crate::term::{unify, Literal, Substitution};
use log::{debug, trace};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::mem;

/// Evaluation semantics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    /// Every derived fact is certain; no proofs are recorded
    Datalog,
    /// Clauses carry probabilities; proofs are recorded for the estimator
    #[default]
    ProbLog,
}

/// Counters describing the work done by a solver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolverStats {
    /// Subgoal tables created
    pub subgoals: usize,
    /// Fixpoint passes run, nested ones included
    pub passes: usize,
    /// Distinct answers stored over all tables
    pub answers: usize,
}

type Branch = (Substitution, Vec<Premise>);

/// Resolution state of one query evaluation.
///
/// Owns the subgoal tables; the knowledge base and builtins are only
/// borrowed, so independent solvers can share them across threads.
#[derive(Debug)]
pub struct Solver<'a> {
    kb: &'a KnowledgeBase,
    builtins: &'a BuiltinRegistry,
    mode: Mode,
    store: Box<dyn SubgoalStore + 'a>,
    /// Signatures expanded during the current pass
    expanded: HashSet<Signature>,
    /// Signatures whose tables reached their fixpoint
    complete: HashSet<Signature>,
    /// Positive literals whose negation is being decided
    negating: HashSet<Signature>,
    /// Bumped whenever a table gains a fact or a proof
    additions: usize,
    next_scope: u32,
    passes: usize,
}

impl<'a> Solver<'a> {
    /// Solver keeping its tables in memory
    #[must_use]
    pub fn new(kb: &'a KnowledgeBase, builtins: &'a BuiltinRegistry, mode: Mode) -> Self {
        Self::with_store(kb, builtins, mode, Box::new(MemoryStore::new()))
    }

    /// Solver keeping its tables in `store`, which should be empty
    #[must_use]
    pub fn with_store(
        kb: &'a KnowledgeBase,
        builtins: &'a BuiltinRegistry,
        mode: Mode,
        store: Box<dyn SubgoalStore + 'a>,
    ) -> Self {
        Self {
            kb,
            builtins,
            mode,
            store,
            expanded: HashSet::new(),
            complete: HashSet::new(),
            negating: HashSet::new(),
            additions: 0,
            next_scope: 0,
            passes: 0,
        }
    }

    /// The evaluation mode
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Ground facts matching `query`, in derivation order.
    ///
    /// A negated query must be ground and yields itself when the negation
    /// holds. A builtin query is evaluated directly.
    ///
    /// # Errors
    ///
    /// [`Error::Grounding`] for a negation that cannot be fully bound,
    /// [`Error::Unstratified`] for negation through recursion,
    /// [`Error::BuiltinType`] and [`Error::ArityMismatch`] from builtin calls,
    /// and storage failures.
    pub fn solve(&mut self, query: &Literal) -> Result<Vec<Literal>> {
        debug!("solving {query}");
        let answers = if query.negated {
            if !query.is_ground() {
                return Err(Error::Grounding {
                    literal: query.clone(),
                });
            }
            if self.negation_holds(query)? {
                vec![query.clone()]
            } else {
                Vec::new()
            }
        } else if let Some(builtin) = self.builtin(query)? {
            match builtin.evaluate(&query.terms)? {
                BuiltinOutcome::Reject => Vec::new(),
                BuiltinOutcome::Accept => vec![query.clone()],
                BuiltinOutcome::Bind(bindings) => vec![bindings.apply(query)],
            }
        } else {
            let signature = Signature::of(query);
            self.saturate(&signature)?;
            self.store
                .iterate(&signature)?
                .into_iter()
                .filter(|answer| unify(query, answer, &Substitution::new()).is_some())
                .collect()
        };
        debug!("solved {query}: {} answers", answers.len());
        Ok(answers)
    }

    /// Whether the ground `fact` is derivable
    ///
    /// # Errors
    ///
    /// See [`Solver::solve`].
    pub fn is_answer(&mut self, fact: &Literal) -> Result<bool> {
        Ok(self.solve(fact)?.contains(fact))
    }

    /// Marginal probability of the ground `fact`, negated facts included.
    ///
    /// In Datalog mode this is `1` for derivable facts and `0` otherwise.
    ///
    /// # Errors
    ///
    /// [`Error::Grounding`] when `fact` has variables, and everything
    /// [`Solver::solve`] reports.
    pub fn probability(&mut self, fact: &Literal) -> Result<f64> {
        if !fact.is_ground() {
            return Err(Error::Grounding {
                literal: fact.clone(),
            });
        }
        let positive = fact.positive();
        let relational = self.builtin(&positive)?.is_none();
        let p = if self.mode == Mode::ProbLog && relational {
            self.solve(&positive)?;
            estimator::probability(&positive, &self.justification(&positive)?)
        } else if self.is_answer(&positive)? {
            1.0
        } else {
            0.0
        };
        Ok(if fact.negated { 1.0 - p } else { p })
    }

    /// Ground clause instances justifying the answers of `query`
    ///
    /// # Errors
    ///
    /// See [`Solver::solve`].
    pub fn proofs(&mut self, query: &Literal) -> Result<ProofSet> {
        let mut proofs = ProofSet::new();
        for answer in self.solve(query)? {
            proofs.extend(self.justification(&answer)?.iter().cloned());
        }
        Ok(proofs)
    }

    /// The proofs taking part in some acyclic derivation of `fact`, collected
    /// from the tables solved so far.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub fn justification(&self, fact: &Literal) -> Result<ProofSet> {
        let signatures = self.store.signatures();
        // proofs of each table by head, read once per call
        let mut tables: HashMap<&Signature, HashMap<Literal, Vec<Proof>>> = HashMap::new();
        let mut closure = ProofSet::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([fact.positive()]);
        while let Some(next) = queue.pop_front() {
            if !seen.insert(next.clone()) {
                continue;
            }
            for signature in signatures.iter().filter(|signature| signature.covers(&next)) {
                let table = match tables.entry(signature) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => entry.insert(self.proofs_by_head(signature)?),
                };
                for proof in table.get(&next).into_iter().flatten() {
                    queue.extend(proof.dependencies());
                    closure.insert(proof.clone());
                }
            }
        }
        Ok(estimator::support(fact, &closure))
    }

    /// Work done so far
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub fn stats(&mut self) -> Result<SolverStats> {
        let mut answers = 0;
        for signature in self.store.signatures() {
            answers += self.store.get(&signature)?.answers;
        }
        Ok(SolverStats {
            subgoals: self.store.len(),
            passes: self.passes,
            answers,
        })
    }

    /// Release the subgoal store
    ///
    /// # Errors
    ///
    /// Storage failures while releasing.
    pub fn close(mut self) -> Result<()> {
        debug!("closing solver after {} passes", self.passes);
        self.store.close()
    }

    fn builtin(&self, literal: &Literal) -> Result<Option<&'a dyn Builtin>> {
        let builtins: &'a BuiltinRegistry = self.builtins;
        let Some(builtin) = builtins.get(&literal.predicate) else {
            return Ok(None);
        };
        if builtin.arity() != literal.arity() {
            return Err(Error::ArityMismatch {
                literal: literal.clone(),
                expected: builtin.arity(),
            });
        }
        Ok(Some(builtin))
    }

    fn fresh_scope(&mut self) -> u32 {
        self.next_scope = self.next_scope.wrapping_add(1).max(1);
        self.next_scope
    }

    /// Run passes from `signature` until no table grows
    fn saturate(&mut self, signature: &Signature) -> Result<()> {
        if self.complete.contains(signature) {
            return Ok(());
        }
        let outer = mem::take(&mut self.expanded);
        let result = self.fixpoint(signature);
        let reached = mem::replace(&mut self.expanded, outer);
        if result.is_ok() {
            self.complete.extend(reached);
        }
        result
    }

    fn fixpoint(&mut self, signature: &Signature) -> Result<()> {
        loop {
            let before = self.additions;
            self.expanded.clear();
            self.passes += 1;
            trace!("pass {} from {signature}", self.passes);
            self.expand(signature)?;
            if self.additions == before {
                return Ok(());
            }
        }
    }

    /// Resolve every candidate clause against the pattern of `signature`
    fn expand(&mut self, signature: &Signature) -> Result<()> {
        if self.complete.contains(signature) || !self.expanded.insert(signature.clone()) {
            return Ok(());
        }
        if !self.store.contains(signature) {
            let subgoal = self.store.get(signature)?;
            trace!("subgoal #{} for {signature}", subgoal.id);
        }

        let kb = self.kb;
        let goal = signature.literal();
        for (id, clause) in kb.candidates(goal) {
            let clause = clause.rescoped(self.fresh_scope());
            let Some(subst) = unify(&clause.head, goal, &Substitution::new()) else {
                continue;
            };
            for (subst, premises) in self.resolve_body(&clause.body, subst, Vec::new())? {
                let head = subst.apply(&clause.head);
                if !head.is_ground() {
                    trace!("skipping non-ground answer {head}");
                    continue;
                }
                let proofs = match self.mode {
                    Mode::Datalog => Vec::new(),
                    Mode::ProbLog => vec![Proof {
                        head: head.clone(),
                        body: premises,
                        probability: clause.probability,
                        clause: id,
                    }],
                };
                if self.store.put(signature, &head, &proofs)? {
                    self.additions += 1;
                }
            }
        }
        Ok(())
    }

    fn resolve_body(
        &mut self,
        body: &[Literal],
        subst: Substitution,
        premises: Vec<Premise>,
    ) -> Result<Vec<Branch>> {
        let Some((first, rest)) = body.split_first() else {
            return Ok(vec![(subst, premises)]);
        };
        let mut branches = Vec::new();
        for (next, premise) in self.resolve_literal(first, &subst)? {
            let mut premises = premises.clone();
            premises.push(premise);
            branches.extend(self.resolve_body(rest, next, premises)?);
        }
        Ok(branches)
    }

    fn resolve_literal(
        &mut self,
        literal: &Literal,
        subst: &Substitution,
    ) -> Result<Vec<(Substitution, Premise)>> {
        let applied = subst.apply(literal);

        if applied.negated {
            if !applied.is_ground() {
                return Err(Error::Grounding { literal: applied });
            }
            return Ok(if self.negation_holds(&applied)? {
                vec![(subst.clone(), Premise::Relational(applied))]
            } else {
                Vec::new()
            });
        }

        if let Some(builtin) = self.builtin(&applied)? {
            return Ok(match builtin.evaluate(&applied.terms)? {
                BuiltinOutcome::Reject => Vec::new(),
                BuiltinOutcome::Accept => vec![(subst.clone(), Premise::Builtin(applied))],
                BuiltinOutcome::Bind(bindings) => {
                    let mut next = subst.clone();
                    if next.extend(&bindings) {
                        let bound = next.apply(literal);
                        vec![(next, Premise::Builtin(bound))]
                    } else {
                        Vec::new()
                    }
                }
            });
        }

        let signature = Signature::of(&applied);
        self.expand(&signature)?;
        Ok(self
            .store
            .iterate(&signature)?
            .into_iter()
            .filter_map(|answer| {
                unify(&applied, &answer, subst).map(|next| (next, Premise::Relational(answer)))
            })
            .collect())
    }

    /// Decide the ground negated literal `negated`
    fn negation_holds(&mut self, negated: &Literal) -> Result<bool> {
        let positive = negated.positive();
        if let Some(builtin) = self.builtin(&positive)? {
            return Ok(matches!(
                builtin.evaluate(&positive.terms)?,
                BuiltinOutcome::Reject
            ));
        }

        let signature = Signature::of(&positive);
        if !self.negating.insert(signature.clone()) {
            return Err(Error::Unstratified {
                literal: negated.clone(),
            });
        }
        let saturated = self.saturate(&signature);
        self.negating.remove(&signature);
        saturated?;

        let answered = self.store.iterate(&signature)?.contains(&positive);
        let holds = !answered
            || match self.mode {
                Mode::Datalog => false,
                Mode::ProbLog => {
                    !estimator::is_certain(&positive, &self.justification(&positive)?)
                }
            };
        trace!("{negated} holds: {holds}");
        Ok(holds)
    }

    fn proofs_by_head(&self, signature: &Signature) -> Result<HashMap<Literal, Vec<Proof>>> {
        let mut by_head: HashMap<Literal, Vec<Proof>> = HashMap::new();
        for proof in self.store.recorded(signature)? {
            by_head.entry(proof.head.clone()).or_default().push(proof);
        }
        Ok(by_head)
    }
}
