//! Evaluable predicates invoked during resolution instead of clause lookup.
//!
//! A builtin receives the literal's arguments with the caller's bindings
//! already applied. It either rejects, accepts, or accepts while binding some
//! of the still-unbound arguments. Unbound inputs reject, which prunes only
//! the current branch; a bound input of the wrong kind is a fatal error.

use crate::error::{Error, Result};
use crate::term::{Constant, Number, Substitution, Term};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::fmt;

/// What a builtin decided for one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltinOutcome {
    /// The branch fails
    Reject,
    /// The call holds with the current bindings
    Accept,
    /// The call holds once these bindings are added
    Bind(Substitution),
}

impl BuiltinOutcome {
    fn from_bool(accept: bool) -> Self {
        if accept {
            Self::Accept
        } else {
            Self::Reject
        }
    }
}

/// An evaluable predicate identified by name and arity
pub trait Builtin: fmt::Debug + Send + Sync {
    /// Predicate name used in clause bodies
    fn name(&self) -> &str;

    /// Fixed number of arguments
    fn arity(&self) -> usize;

    /// Evaluate the call. `args` has exactly [`Builtin::arity`] elements.
    ///
    /// # Errors
    ///
    /// [`Error::BuiltinType`] when a bound argument has the wrong kind.
    fn evaluate(&self, args: &[Term]) -> Result<BuiltinOutcome>;
}

/// Bind `target` to `value`, or compare when it is already bound
fn unify_result(target: &Term, value: Constant) -> BuiltinOutcome {
    match target {
        Term::Variable(var) => {
            let mut subst = Substitution::new();
            subst.bind(var.clone(), Term::Constant(value));
            BuiltinOutcome::Bind(subst)
        }
        Term::Constant(bound) => BuiltinOutcome::from_bool(*bound == value),
    }
}

fn number_arg(builtin: &str, term: &Term) -> Result<Option<f64>> {
    match term {
        Term::Variable(_) => Ok(None),
        Term::Constant(Constant::Number(n)) => Ok(Some(n.value())),
        Term::Constant(_) => Err(Error::BuiltinType {
            builtin: builtin.to_string(),
            argument: term.clone(),
            expected: "number",
        }),
    }
}

fn string_arg<'a>(builtin: &str, term: &'a Term) -> Result<Option<&'a str>> {
    match term {
        Term::Variable(_) => Ok(None),
        Term::Constant(Constant::String(s)) => Ok(Some(s)),
        Term::Constant(_) => Err(Error::BuiltinType {
            builtin: builtin.to_string(),
            argument: term.clone(),
            expected: "string",
        }),
    }
}

/// Relation tested by a [`Comparison`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    /// `<`
    Less,
    /// `>`
    Greater,
    /// `<=`
    LessOrEqual,
    /// `>=`
    GreaterOrEqual,
    /// `=`
    Equal,
    /// `!=` and `<>`
    NotEqual,
}

/// Binary comparison of two bound constants.
///
/// Numbers compare numerically and strings lexicographically. Constants of
/// different kinds are never equal and never ordered.
#[derive(Debug, Clone)]
pub struct Comparison {
    name: &'static str,
    op: ComparisonOp,
}

impl Comparison {
    /// Comparison registered under `name`
    #[must_use]
    pub fn new(name: &'static str, op: ComparisonOp) -> Self {
        Self { name, op }
    }
}

impl Builtin for Comparison {
    fn name(&self) -> &str {
        self.name
    }

    fn arity(&self) -> usize {
        2
    }

    fn evaluate(&self, args: &[Term]) -> Result<BuiltinOutcome> {
        let (Some(left), Some(right)) = (args[0].as_constant(), args[1].as_constant()) else {
            return Ok(BuiltinOutcome::Reject);
        };

        let ordering = match (left, right) {
            (Constant::Number(a), Constant::Number(b)) => a.value().partial_cmp(&b.value()),
            (Constant::String(a), Constant::String(b)) => Some(a.cmp(b)),
            _ => None,
        };

        let accept = match self.op {
            ComparisonOp::Equal => left == right,
            ComparisonOp::NotEqual => left != right,
            ComparisonOp::Less => ordering == Some(Ordering::Less),
            ComparisonOp::Greater => ordering == Some(Ordering::Greater),
            ComparisonOp::LessOrEqual => {
                matches!(ordering, Some(Ordering::Less | Ordering::Equal))
            }
            ComparisonOp::GreaterOrEqual => {
                matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
            }
        };
        Ok(BuiltinOutcome::from_bool(accept))
    }
}

/// Type predicate `is(Value, Type)`.
///
/// `Type` is one of `"string"`, `"number"` or `"boolean"`, and gets bound
/// when the call leaves it open.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeCheck;

impl Builtin for TypeCheck {
    fn name(&self) -> &str {
        "is"
    }

    fn arity(&self) -> usize {
        2
    }

    fn evaluate(&self, args: &[Term]) -> Result<BuiltinOutcome> {
        let Some(value) = args[0].as_constant() else {
            return Ok(BuiltinOutcome::Reject);
        };
        string_arg(self.name(), &args[1])?;
        Ok(unify_result(
            &args[1],
            Constant::String(value.kind().to_string()),
        ))
    }
}

/// Arithmetic function `fn_xxx(Result, Left, Right)`
#[derive(Clone)]
pub struct Arithmetic {
    name: &'static str,
    op: fn(f64, f64) -> Option<f64>,
}

impl Arithmetic {
    /// Function registered under `name`. `op` returns `None` when the result
    /// is undefined (e.g. division by zero), which rejects the call, as does
    /// an infinite or NaN result.
    #[must_use]
    pub fn new(name: &'static str, op: fn(f64, f64) -> Option<f64>) -> Self {
        Self { name, op }
    }
}

impl fmt::Debug for Arithmetic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arithmetic").field("name", &self.name).finish()
    }
}

impl Builtin for Arithmetic {
    fn name(&self) -> &str {
        self.name
    }

    fn arity(&self) -> usize {
        3
    }

    fn evaluate(&self, args: &[Term]) -> Result<BuiltinOutcome> {
        let left = number_arg(self.name, &args[1])?;
        let right = number_arg(self.name, &args[2])?;
        let (Some(left), Some(right)) = (left, right) else {
            return Ok(BuiltinOutcome::Reject);
        };
        Ok(match (self.op)(left, right) {
            Some(value) if value.is_finite() => {
                unify_result(&args[0], Constant::Number(Number::new(value)))
            }
            _ => BuiltinOutcome::Reject,
        })
    }
}

/// String function `fn_xxx(Result, Arg...)` over string arguments
#[derive(Clone)]
pub struct StringFunction {
    name: &'static str,
    inputs: usize,
    op: fn(&[&str]) -> Constant,
}

impl StringFunction {
    /// Function registered under `name`, taking `inputs` string arguments
    /// after the result
    #[must_use]
    pub fn new(name: &'static str, inputs: usize, op: fn(&[&str]) -> Constant) -> Self {
        Self { name, inputs, op }
    }
}

impl fmt::Debug for StringFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringFunction")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .finish()
    }
}

impl Builtin for StringFunction {
    fn name(&self) -> &str {
        self.name
    }

    fn arity(&self) -> usize {
        self.inputs + 1
    }

    fn evaluate(&self, args: &[Term]) -> Result<BuiltinOutcome> {
        let mut inputs = Vec::with_capacity(self.inputs);
        for term in &args[1..] {
            match string_arg(self.name, term)? {
                Some(s) => inputs.push(s),
                None => return Ok(BuiltinOutcome::Reject),
            }
        }
        Ok(unify_result(&args[0], (self.op)(&inputs)))
    }
}

/// A builtin backed by a closure
pub struct FnBuiltin<F> {
    name: String,
    arity: usize,
    f: F,
}

impl<F> FnBuiltin<F>
where
    F: Fn(&[Term]) -> Result<BuiltinOutcome> + Send + Sync,
{
    /// Wrap `f` as the builtin `name/arity`
    pub fn new(name: impl Into<String>, arity: usize, f: F) -> Self {
        Self {
            name: name.into(),
            arity,
            f,
        }
    }
}

impl<F> fmt::Debug for FnBuiltin<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnBuiltin")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

impl<F> Builtin for FnBuiltin<F>
where
    F: Fn(&[Term]) -> Result<BuiltinOutcome> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> usize {
        self.arity
    }

    fn evaluate(&self, args: &[Term]) -> Result<BuiltinOutcome> {
        (self.f)(args)
    }
}

#[allow(clippy::cast_precision_loss)]
fn char_count(s: &str) -> f64 {
    s.chars().count() as f64
}

/// Builtins available to the solver, keyed by name
#[derive(Debug, Default)]
pub struct BuiltinRegistry {
    builtins: IndexMap<String, Box<dyn Builtin>>,
}

impl BuiltinRegistry {
    /// A registry without any builtin
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Comparisons, the `is` type predicate, arithmetic and string functions
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for (name, op) in [
            ("<", ComparisonOp::Less),
            (">", ComparisonOp::Greater),
            ("<=", ComparisonOp::LessOrEqual),
            (">=", ComparisonOp::GreaterOrEqual),
            ("=", ComparisonOp::Equal),
            ("!=", ComparisonOp::NotEqual),
            ("<>", ComparisonOp::NotEqual),
        ] {
            registry.register(Comparison::new(name, op));
        }
        registry.register(TypeCheck);

        registry.register(Arithmetic::new("fn_add", |a, b| Some(a + b)));
        registry.register(Arithmetic::new("fn_sub", |a, b| Some(a - b)));
        registry.register(Arithmetic::new("fn_mul", |a, b| Some(a * b)));
        registry.register(Arithmetic::new("fn_div", |a, b| (b != 0.0).then(|| a / b)));
        registry.register(Arithmetic::new("fn_mod", |a, b| (b != 0.0).then(|| a.rem_euclid(b))));

        registry.register(StringFunction::new("fn_concat", 2, |args| {
            Constant::String(args.concat())
        }));
        registry.register(StringFunction::new("fn_lowercase", 1, |args| {
            Constant::String(args[0].to_lowercase())
        }));
        registry.register(StringFunction::new("fn_uppercase", 1, |args| {
            Constant::String(args[0].to_uppercase())
        }));
        registry.register(StringFunction::new("fn_strlen", 1, |args| {
            Constant::Number(Number::new(char_count(args[0])))
        }));
        registry
    }

    /// Add a builtin, returning the one it replaces
    pub fn register(&mut self, builtin: impl Builtin + 'static) -> Option<Box<dyn Builtin>> {
        self.builtins
            .insert(builtin.name().to_string(), Box::new(builtin))
    }

    /// Builtin registered under `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Builtin> {
        self.builtins.get(name).map(|builtin| &**builtin)
    }

    /// Whether `name` is a builtin
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    /// Registered names, in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.builtins.keys().map(String::as_str)
    }

    /// Number of registered builtins
    #[must_use]
    pub fn len(&self) -> usize {
        self.builtins.len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.builtins.is_empty()
    }
}
