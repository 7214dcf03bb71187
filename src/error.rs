use crate::clause::Clause;
use crate::term::{Literal, Term, Variable};
use std::io;
use thiserror::Error;

/// Fatal conditions raised while asserting clauses or solving a query.
///
/// Unification failures and unknown predicates are part of normal resolution
/// and never show up here.
#[derive(Debug, Error)]
pub enum Error {
    /// A negated literal could not be fully bound when it was selected.
    #[error("cannot negate non-ground literal `{literal}`")]
    Grounding {
        /// The offending negated literal, with the bindings known at the time.
        literal: Literal,
    },

    /// A predicate was used with a different number of arguments than before.
    #[error("arity mismatch for `{literal}`: `{}` expects {expected} arguments", .literal.predicate)]
    ArityMismatch {
        /// The literal with the unexpected arity.
        literal: Literal,
        /// The arity recorded for the predicate name.
        expected: usize,
    },

    /// A builtin received a bound argument of the wrong kind.
    #[error("builtin `{builtin}` expects a {expected} but got `{argument}`")]
    BuiltinType {
        /// Name of the builtin.
        builtin: String,
        /// The argument that was rejected.
        argument: Term,
        /// Kind the builtin expected.
        expected: &'static str,
    },

    /// A fact contained a variable.
    #[error("fact `{literal}` must be ground")]
    NonGroundFact {
        /// The non-ground fact head.
        literal: Literal,
    },

    /// A rule head variable does not occur in any positive body literal.
    #[error("variable `{variable}` in the head of `{clause}` does not occur in a positive body literal")]
    UnsafeVariable {
        /// The unrestricted variable.
        variable: Variable,
        /// The rejected clause.
        clause: Box<Clause>,
    },

    /// A clause head was negated.
    #[error("clause head `{literal}` cannot be negated")]
    NegatedHead {
        /// The negated head.
        literal: Literal,
    },

    /// A probability annotation outside of `(0, 1]`.
    #[error("probability {0} is outside of (0, 1]")]
    InvalidProbability(f64),

    /// A negated literal was re-entered while its own saturation was running.
    #[error("negation of `{literal}` depends on itself")]
    Unstratified {
        /// The negated literal that closed the cycle.
        literal: Literal,
    },

    /// The subgoal store failed to read or write its scratch storage.
    #[error("subgoal storage failed: {0}")]
    Storage(#[from] io::Error),

    /// A spilled subgoal record could not be encoded or decoded.
    #[cfg(feature = "serde")]
    #[error("subgoal record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
