//! Exact marginal probabilities over possibly overlapping proofs.
//!
//! Every probabilistic ground clause instance is an independent Boolean
//! variable. A fact's proofs are compiled into a disjunction of conjunctions
//! of signed variables (one conjunction per acyclic derivation), and that
//! formula is split on one variable at a time into two disjoint branches
//! until each branch is constant or made of variable-disjoint conjunctions.
//! A variable shared by several proofs is therefore counted exactly once.

use crate::proof::{Premise, Proof, ProofSet};
use crate::term::Literal;
use std::collections::{BTreeMap, BTreeSet, HashMap};

type Var = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Lit {
    var: Var,
    positive: bool,
}

type Cube = BTreeSet<Lit>;

/// Disjunction of conjunctions, kept free of contradictory and subsumed
/// conjunctions
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
struct Dnf {
    cubes: BTreeSet<Cube>,
}

impl Dnf {
    fn falsity() -> Self {
        Self::default()
    }

    fn truth() -> Self {
        Self {
            cubes: BTreeSet::from([Cube::new()]),
        }
    }

    fn lit(var: Var, positive: bool) -> Self {
        Self {
            cubes: BTreeSet::from([Cube::from([Lit { var, positive }])]),
        }
    }

    fn is_false(&self) -> bool {
        self.cubes.is_empty()
    }

    fn is_true(&self) -> bool {
        self.cubes.contains(&Cube::new())
    }

    /// Whether the formula holds under every assignment, decided by splitting
    /// on one variable at a time
    fn is_valid(&self) -> bool {
        if self.is_true() {
            return true;
        }
        let Some(var) = self.cubes.iter().flatten().map(|lit| lit.var).next() else {
            return false;
        };
        self.restrict(var, false).is_valid() && self.restrict(var, true).is_valid()
    }

    fn from_cubes(cubes: impl IntoIterator<Item = Cube>) -> Self {
        let mut sorted: Vec<Cube> = cubes.into_iter().collect();
        sorted.sort_by_key(BTreeSet::len);

        let mut kept: Vec<Cube> = Vec::with_capacity(sorted.len());
        for cube in sorted {
            if !kept.iter().any(|k| k.is_subset(&cube)) {
                kept.push(cube);
            }
        }
        Self {
            cubes: kept.into_iter().collect(),
        }
    }

    fn or(&self, other: &Self) -> Self {
        Self::from_cubes(self.cubes.iter().chain(&other.cubes).cloned())
    }

    fn and(&self, other: &Self) -> Self {
        let mut cubes = Vec::new();
        for a in &self.cubes {
            for b in &other.cubes {
                let consistent = b.iter().all(|lit| {
                    !a.contains(&Lit {
                        var: lit.var,
                        positive: !lit.positive,
                    })
                });
                if consistent {
                    cubes.push(a.union(b).copied().collect());
                }
            }
        }
        Self::from_cubes(cubes)
    }

    fn not(&self) -> Self {
        // ~(c1 | c2 | ...) = ~c1 & ~c2 & ..., and ~c is the disjunction of its negated literals
        self.cubes.iter().fold(Self::truth(), |acc, cube| {
            let negated = Self::from_cubes(cube.iter().map(|lit| {
                Cube::from([Lit {
                    var: lit.var,
                    positive: !lit.positive,
                }])
            }));
            acc.and(&negated)
        })
    }

    /// The formula with `var` fixed to `value`
    fn restrict(&self, var: Var, value: bool) -> Self {
        Self::from_cubes(self.cubes.iter().filter_map(|cube| {
            if cube.contains(&Lit {
                var,
                positive: !value,
            }) {
                None
            } else {
                let mut cube = cube.clone();
                cube.remove(&Lit {
                    var,
                    positive: value,
                });
                Some(cube)
            }
        }))
    }
}

/// Turns a fact's proofs into a [`Dnf`], one variable per probabilistic proof
struct Compiler<'a> {
    proofs: &'a ProofSet,
    vars: BTreeMap<&'a Proof, Var>,
    weights: Vec<f64>,
    memo: HashMap<(&'a Literal, Vec<&'a Literal>), Dnf>,
    support: BTreeSet<&'a Proof>,
}

impl<'a> Compiler<'a> {
    fn new(proofs: &'a ProofSet) -> Self {
        Self {
            proofs,
            vars: BTreeMap::new(),
            weights: Vec::new(),
            memo: HashMap::new(),
            support: BTreeSet::new(),
        }
    }

    fn var(&mut self, proof: &'a Proof) -> Var {
        let next = self.vars.len();
        *self.vars.entry(proof).or_insert_with(|| {
            self.weights.push(proof.probability.value());
            next
        })
    }

    /// Formula of any literal, negated ones included
    fn literal(&mut self, literal: &Literal) -> Dnf {
        let proofs = self.proofs;
        let positive = literal.positive();
        let dnf = match proofs.get_key_value(&positive) {
            Some((fact, _)) => self.fact(fact, &mut Vec::new()),
            None => Dnf::falsity(),
        };
        if literal.negated {
            dnf.not()
        } else {
            dnf
        }
    }

    /// Formula of a fact, cutting derivations that revisit a fact on `path`
    fn fact(&mut self, fact: &'a Literal, path: &mut Vec<&'a Literal>) -> Dnf {
        let mut key_path = path.clone();
        key_path.sort();
        let key = (fact, key_path);
        if let Some(dnf) = self.memo.get(&key) {
            return dnf.clone();
        }

        let proofs = self.proofs;
        let mut dnf = Dnf::falsity();
        path.push(fact);
        for proof in proofs.get(fact).into_iter().flatten() {
            let mut term = if proof.is_probabilistic() {
                Dnf::lit(self.var(proof), true)
            } else {
                Dnf::truth()
            };

            for premise in &proof.body {
                let condition = match premise {
                    Premise::Builtin(_) => continue,
                    Premise::Relational(literal) if literal.negated => self.literal(literal),
                    Premise::Relational(literal) => match proofs.get_key_value(literal) {
                        Some((dependency, _)) if !path.contains(&dependency) => {
                            self.fact(dependency, path)
                        }
                        _ => Dnf::falsity(),
                    },
                };
                term = term.and(&condition);
                if term.is_false() {
                    break;
                }
            }

            if !term.is_false() {
                self.support.insert(proof);
                dnf = dnf.or(&term);
            }
        }
        path.pop();

        self.memo.insert(key, dnf.clone());
        dnf
    }
}

/// Exact probability of a formula given independent variable weights
struct Evaluator<'w> {
    weights: &'w [f64],
    memo: HashMap<Dnf, f64>,
}

impl Evaluator<'_> {
    fn cube(&self, cube: &Cube) -> f64 {
        cube.iter()
            .map(|lit| {
                let w = self.weights[lit.var];
                if lit.positive {
                    w
                } else {
                    1.0 - w
                }
            })
            .product()
    }

    fn eval(&mut self, dnf: &Dnf) -> f64 {
        if dnf.is_false() {
            return 0.0;
        }
        if dnf.is_true() {
            return 1.0;
        }
        if let Some(&p) = self.memo.get(dnf) {
            return p;
        }

        let mut occurrences: BTreeMap<Var, usize> = BTreeMap::new();
        for lit in dnf.cubes.iter().flatten() {
            *occurrences.entry(lit.var).or_default() += 1;
        }

        let p = match occurrences
            .iter()
            .filter(|(_, count)| **count > 1)
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        {
            // no shared variable: the conjunctions are independent events
            None => {
                1.0 - dnf
                    .cubes
                    .iter()
                    .map(|cube| 1.0 - self.cube(cube))
                    .product::<f64>()
            }
            Some((&var, _)) => {
                let w = self.weights[var];
                w * self.eval(&dnf.restrict(var, true))
                    + (1.0 - w) * self.eval(&dnf.restrict(var, false))
            }
        };

        self.memo.insert(dnf.clone(), p);
        p
    }
}

/// Marginal probability of `fact` given its justification.
///
/// `fact` may be negated, in which case the complement is returned. The
/// result only depends on the content of `proofs`.
#[must_use]
pub fn probability(fact: &Literal, proofs: &ProofSet) -> f64 {
    let mut compiler = Compiler::new(proofs);
    let dnf = compiler.literal(fact);
    let mut evaluator = Evaluator {
        weights: &compiler.weights,
        memo: HashMap::new(),
    };
    evaluator.eval(&dnf).clamp(0.0, 1.0)
}

/// Whether `fact` holds in every possible world
#[must_use]
pub fn is_certain(fact: &Literal, proofs: &ProofSet) -> bool {
    Compiler::new(proofs).literal(fact).is_valid()
}

/// The proofs that take part in at least one acyclic derivation of `fact`
#[must_use]
pub fn support(fact: &Literal, proofs: &ProofSet) -> ProofSet {
    let mut compiler = Compiler::new(proofs);
    compiler.literal(fact);
    compiler.support.into_iter().cloned().collect()
}
