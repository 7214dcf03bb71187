use indexmap::IndexMap;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A numeric constant.
///
/// Wraps an `f64` with bit-level equality and a total order so literals can
/// key hash maps and ordered sets. Serializes as a plain number when finite
/// and as its raw bits otherwise, so every value reads back unchanged.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(from = "NumberRepr", into = "NumberRepr")
)]
pub struct Number(f64);

#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
enum NumberRepr {
    Finite(f64),
    Bits { bits: u64 },
}

#[cfg(feature = "serde")]
impl From<Number> for NumberRepr {
    fn from(number: Number) -> Self {
        if number.0.is_finite() {
            Self::Finite(number.0)
        } else {
            Self::Bits {
                bits: number.0.to_bits(),
            }
        }
    }
}

#[cfg(feature = "serde")]
impl From<NumberRepr> for Number {
    fn from(repr: NumberRepr) -> Self {
        match repr {
            NumberRepr::Finite(value) => Self::new(value),
            NumberRepr::Bits { bits } => Self(f64::from_bits(bits)),
        }
    }
}

impl Number {
    /// Create a number
    #[must_use]
    pub fn new(value: f64) -> Self {
        // `-0.0 + 0.0` is `+0.0`
        Self(value + 0.0)
    }

    /// The wrapped value
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Number {}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl From<i32> for Number {
    fn from(value: i32) -> Self {
        Self::new(f64::from(value))
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A constant value. Constants of different kinds never unify, even when
/// their textual forms agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Constant {
    /// `true` or `false`
    Boolean(bool),
    /// A number such as `3` or `0.25`
    Number(Number),
    /// A quoted string such as `"alice"`
    String(String),
}

impl Constant {
    /// Name of the constant's kind, as understood by the `is` builtin
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Constant::Boolean(_) => "boolean",
            Constant::Number(_) => "number",
            Constant::String(_) => "string",
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Boolean(b) => write!(f, "{b}"),
            Constant::Number(n) => write!(f, "{n}"),
            Constant::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// A logic variable, scoped to one clause use.
///
/// Scope `0` belongs to the caller's query; the solver renames clause
/// variables apart by giving each clause use a fresh scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Variable {
    /// The variable's name, e.g. `X`
    pub name: String,
    /// Renaming scope
    pub scope: u32,
}

impl Variable {
    /// Create a query-scoped variable
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: 0,
        }
    }

    /// Same name, different scope
    #[must_use]
    pub fn rescoped(&self, scope: u32) -> Self {
        Self {
            name: self.name.clone(),
            scope,
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scope == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}_{}", self.name, self.scope)
        }
    }
}

/// A term: either a constant or a variable
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Term {
    /// A constant (e.g. `"alice"`, `42`, `true`)
    Constant(Constant),
    /// A variable that can be unified with constants (e.g. `X`)
    Variable(Variable),
}

impl Term {
    /// A query-scoped variable term
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Term::Variable(Variable::new(name))
    }

    /// A string constant term
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Term::Constant(Constant::String(value.into()))
    }

    /// A numeric constant term
    #[must_use]
    pub fn number(value: impl Into<Number>) -> Self {
        Term::Constant(Constant::Number(value.into()))
    }

    /// A boolean constant term
    #[must_use]
    pub fn boolean(value: bool) -> Self {
        Term::Constant(Constant::Boolean(value))
    }

    /// Whether the term is a constant
    #[must_use]
    pub fn is_ground(&self) -> bool {
        matches!(self, Term::Constant(_))
    }

    /// The constant, if the term is one
    #[must_use]
    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            Term::Constant(c) => Some(c),
            Term::Variable(_) => None,
        }
    }

    /// The variable, if the term is one
    #[must_use]
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Term::Variable(v) => Some(v),
            Term::Constant(_) => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Constant(c) => fmt::Display::fmt(c, f),
            Term::Variable(v) => fmt::Display::fmt(v, f),
        }
    }
}

/// Argument list of a literal
pub type Terms = SmallVec<[Term; 4]>;

/// A predicate applied to a list of terms, possibly negated (e.g. `~edge(X, "b")`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Literal {
    /// The name of the predicate (e.g., `"edge"`, `"path"`)
    pub predicate: String,
    /// The arguments of the predicate
    pub terms: Terms,
    /// Negation-as-failure flag
    pub negated: bool,
}

impl Literal {
    /// Create a positive literal
    #[must_use]
    pub fn new(predicate: impl Into<String>, terms: impl IntoIterator<Item = Term>) -> Self {
        Self {
            predicate: predicate.into(),
            terms: terms.into_iter().collect(),
            negated: false,
        }
    }

    /// The same literal with its negation flag flipped
    #[must_use]
    pub fn negate(&self) -> Self {
        Self {
            negated: !self.negated,
            ..self.clone()
        }
    }

    /// The same literal without negation
    #[must_use]
    pub fn positive(&self) -> Self {
        Self {
            negated: false,
            ..self.clone()
        }
    }

    /// Number of arguments
    #[must_use]
    pub fn arity(&self) -> usize {
        self.terms.len()
    }

    /// A literal is ground iff it contains no variable
    #[must_use]
    pub fn is_ground(&self) -> bool {
        self.terms.iter().all(Term::is_ground)
    }

    /// Variables in argument order, repeated ones included
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.terms.iter().filter_map(Term::as_variable)
    }

    /// Move every variable to `scope`
    #[must_use]
    pub fn rescoped(&self, scope: u32) -> Self {
        Self {
            predicate: self.predicate.clone(),
            terms: self
                .terms
                .iter()
                .map(|term| match term {
                    Term::Variable(v) => Term::Variable(v.rescoped(scope)),
                    Term::Constant(_) => term.clone(),
                })
                .collect(),
            negated: self.negated,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "~")?;
        }
        write!(f, "{}(", self.predicate)?;
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{term}")?;
        }
        write!(f, ")")
    }
}

/// A mapping from variables to terms
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitution {
    bindings: IndexMap<Variable, Term>,
}

impl Substitution {
    /// The empty substitution
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bound variables
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no variable is bound
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Direct binding of `var`, without following chains
    #[must_use]
    pub fn get(&self, var: &Variable) -> Option<&Term> {
        self.bindings.get(var)
    }

    /// Bind `var` to `term`. The caller guarantees `var` is unbound.
    pub fn bind(&mut self, var: Variable, term: Term) {
        self.bindings.insert(var, term);
    }

    /// Bindings in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Term)> {
        self.bindings.iter()
    }

    /// Follow variable-to-variable bindings until reaching a constant or an
    /// unbound variable
    #[must_use]
    pub fn resolve(&self, term: &Term) -> Term {
        let mut current = term;
        while let Term::Variable(v) = current {
            match self.bindings.get(v) {
                Some(next) => current = next,
                None => break,
            }
        }
        current.clone()
    }

    /// Replace every bound variable of `literal`
    #[must_use]
    pub fn apply(&self, literal: &Literal) -> Literal {
        Literal {
            predicate: literal.predicate.clone(),
            terms: literal.terms.iter().map(|t| self.resolve(t)).collect(),
            negated: literal.negated,
        }
    }

    /// Unify two terms under this substitution, extending it in place.
    /// Returns false on a clash; the substitution may then be partially extended.
    pub fn unify_terms(&mut self, left: &Term, right: &Term) -> bool {
        match (self.resolve(left), self.resolve(right)) {
            (Term::Constant(a), Term::Constant(b)) => a == b,
            (Term::Variable(a), Term::Variable(b)) if a == b => true,
            (Term::Variable(v), other) | (other, Term::Variable(v)) => {
                self.bind(v, other);
                true
            }
        }
    }

    /// Merge `other` into this substitution. Returns false when one of its
    /// bindings clashes with an existing one.
    pub fn extend(&mut self, other: &Substitution) -> bool {
        other
            .iter()
            .all(|(var, term)| self.unify_terms(&Term::Variable(var.clone()), term))
    }
}

/// Unify two literals, extending `base`.
///
/// Both literals must share predicate, arity, and polarity. Returns `None`
/// when they do not unify.
#[must_use]
pub fn unify(left: &Literal, right: &Literal, base: &Substitution) -> Option<Substitution> {
    if left.predicate != right.predicate
        || left.arity() != right.arity()
        || left.negated != right.negated
    {
        return None;
    }

    let mut subst = base.clone();
    left.terms
        .iter()
        .zip(&right.terms)
        .all(|(l, r)| subst.unify_terms(l, r))
        .then_some(subst)
}
