//! # Probalog
//!
//! A tabled Datalog engine with ProbLog-style probabilistic clauses.
//!
//! ## Features
//!
//! - Top-down resolution with subgoal tabling, so recursive and mutually
//!   recursive rules terminate
//! - Stratified negation as failure
//! - Exact marginal probabilities over overlapping proofs
//! - Builtin comparisons, arithmetic and string functions
//! - Subgoal tables in memory or spilled to a scratch directory
//!
//! ## Example
//!
//! ```rust
//! use probalog::{Engine, Literal, Term};
//!
//! let mut engine = Engine::new();
//! let alarm = Literal::new("alarm", [Term::string("house")]);
//!
//! // two independent causes for the same fact
//! engine.add_probabilistic_fact(0.3, alarm.clone()).unwrap();
//! engine.add_probabilistic_fact(0.6, alarm.clone()).unwrap();
//!
//! let p = engine.probability(&alarm).unwrap();
//! assert!((p - 0.72).abs() < 1e-9);
//! ```

/// Evaluable predicates.
pub mod builtins;
/// Facts and rules.
pub mod clause;
/// Query facade.
pub mod engine;
/// Error types.
pub mod error;
/// Exact probability of a fact from its proofs.
pub mod estimator;
/// Clause storage.
pub mod knowledge_base;
/// Ground clause instances.
pub mod proof;
/// Tabled resolution.
pub mod solver;
#[cfg(feature = "spill")]
/// Disk-backed subgoal tables.
pub mod spill;
/// Subgoal tables.
pub mod subgoal;
/// Terms, literals and unification.
pub mod term;

pub use builtins::{Builtin, BuiltinOutcome, BuiltinRegistry, FnBuiltin};
pub use clause::{Clause, ClauseId, Probability};
pub use engine::{Engine, EngineConfig, QueryResult};
pub use error::{Error, Result};
pub use knowledge_base::KnowledgeBase;
pub use proof::{Premise, Proof, ProofSet};
pub use solver::{Mode, Solver, SolverStats};
#[cfg(feature = "spill")]
pub use spill::DiskStore;
pub use subgoal::{MemoryStore, Signature, Storage, StoreFactory, Subgoal, SubgoalStore};
pub use term::{unify, Constant, Literal, Number, Substitution, Term, Variable};
