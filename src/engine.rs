use crate::builtins::{Builtin, BuiltinRegistry};
use crate::clause::{Clause, ClauseId, Probability};
use crate::error::Result;
use crate::knowledge_base::KnowledgeBase;
use crate::proof::ProofSet;
use crate::solver::{Mode, Solver};
use crate::subgoal::{Storage, StoreFactory};
use crate::term::{unify, Constant, Literal, Substitution, Term};
use indexmap::IndexMap;
use log::debug;
use std::fmt;

/// Settings applied to every query of an [`Engine`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    /// Datalog or ProbLog semantics
    pub mode: Mode,
    /// Backing of the subgoal tables
    pub storage: Storage,
    /// Round reported probabilities to this many decimal places. Beyond what
    /// an `f64` can scale to, probabilities are reported unrounded.
    pub precision: Option<u32>,
}

impl EngineConfig {
    /// Use `mode`
    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Use `storage` for subgoal tables
    #[must_use]
    pub fn with_storage(mut self, storage: Storage) -> Self {
        self.storage = storage;
        self
    }

    /// Round probabilities to `digits` decimal places
    #[must_use]
    pub fn with_precision(mut self, digits: u32) -> Self {
        self.precision = Some(digits);
        self
    }
}

/// One answer of a query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// The derived ground fact
    pub fact: Literal,
    /// Values of the query's variables, by name
    pub bindings: IndexMap<String, Constant>,
    /// Marginal probability of `fact`; `1` in Datalog mode
    pub probability: f64,
}

/// Knowledge base plus builtins, queried through a fresh solver each time.
///
/// Assertion takes `&mut self` and querying `&self`, so once the knowledge
/// base is built an engine can be shared by concurrent queries.
pub struct Engine {
    kb: KnowledgeBase,
    builtins: BuiltinRegistry,
    config: EngineConfig,
    factory: Option<StoreFactory>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("kb", &self.kb)
            .field("builtins", &self.builtins)
            .field("config", &self.config)
            .field("custom_store", &self.factory.is_some())
            .finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An empty ProbLog engine with the standard builtins
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// An empty engine using `config`
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            kb: KnowledgeBase::new(),
            builtins: BuiltinRegistry::standard(),
            config,
            factory: None,
        }
    }

    /// Assert a clause
    ///
    /// # Errors
    ///
    /// The validation errors of [`KnowledgeBase::assert`].
    pub fn assert(&mut self, clause: Clause) -> Result<ClauseId> {
        self.kb.assert(clause)
    }

    /// Assert a certain fact
    ///
    /// # Errors
    ///
    /// See [`Engine::assert`].
    pub fn add_fact(&mut self, fact: Literal) -> Result<ClauseId> {
        self.assert(Clause::fact(fact))
    }

    /// Assert a fact holding with `probability`
    ///
    /// # Errors
    ///
    /// [`crate::Error::InvalidProbability`] outside of `(0, 1]`, and see
    /// [`Engine::assert`].
    pub fn add_probabilistic_fact(&mut self, probability: f64, fact: Literal) -> Result<ClauseId> {
        let probability = Probability::new(probability)?;
        self.assert(Clause::fact(fact).with_probability(probability))
    }

    /// Assert a certain rule
    ///
    /// # Errors
    ///
    /// See [`Engine::assert`].
    pub fn add_rule(
        &mut self,
        head: Literal,
        body: impl IntoIterator<Item = Literal>,
    ) -> Result<ClauseId> {
        self.assert(Clause::rule(head, body))
    }

    /// Assert a rule whose conclusion holds with `probability`
    ///
    /// # Errors
    ///
    /// [`crate::Error::InvalidProbability`] outside of `(0, 1]`, and see
    /// [`Engine::assert`].
    pub fn add_probabilistic_rule(
        &mut self,
        probability: f64,
        head: Literal,
        body: impl IntoIterator<Item = Literal>,
    ) -> Result<ClauseId> {
        let probability = Probability::new(probability)?;
        self.assert(Clause::rule(head, body).with_probability(probability))
    }

    /// Add or replace a builtin
    pub fn register_builtin(&mut self, builtin: impl Builtin + 'static) {
        self.builtins.register(builtin);
    }

    /// Open subgoal stores with `factory` instead of the configured storage
    pub fn set_store_factory(&mut self, factory: StoreFactory) {
        self.factory = Some(factory);
    }

    /// The asserted clauses
    #[must_use]
    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    /// The registered builtins
    #[must_use]
    pub fn builtins(&self) -> &BuiltinRegistry {
        &self.builtins
    }

    /// The configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A solver over this engine with a fresh subgoal store
    ///
    /// # Errors
    ///
    /// The store cannot be opened.
    pub fn solver(&self) -> Result<Solver<'_>> {
        let store = match &self.factory {
            Some(factory) => factory()?,
            None => self.config.storage.open()?,
        };
        Ok(Solver::with_store(
            &self.kb,
            &self.builtins,
            self.config.mode,
            store,
        ))
    }

    /// Every answer of `query` with its bindings and probability
    ///
    /// # Errors
    ///
    /// The fatal conditions of [`Solver::solve`].
    pub fn query(&self, query: &Literal) -> Result<Vec<QueryResult>> {
        self.run(|solver| {
            let mut results = Vec::new();
            for fact in solver.solve(query)? {
                let probability = self.round(solver.probability(&fact)?);
                results.push(QueryResult {
                    bindings: bindings(query, &fact),
                    fact,
                    probability,
                });
            }
            debug!(
                "query {query} returned {} results ({:?})",
                results.len(),
                solver.stats()?
            );
            Ok(results)
        })
    }

    /// Whether `query` has at least one answer
    ///
    /// # Errors
    ///
    /// See [`Engine::query`].
    pub fn ask(&self, query: &Literal) -> Result<bool> {
        self.run(|solver| Ok(!solver.solve(query)?.is_empty()))
    }

    /// Marginal probability of the ground `fact`
    ///
    /// # Errors
    ///
    /// [`crate::Error::Grounding`] when `fact` has variables, and see
    /// [`Engine::query`].
    pub fn probability(&self, fact: &Literal) -> Result<f64> {
        self.run(|solver| solver.probability(fact).map(|p| self.round(p)))
    }

    /// Ground clause instances justifying the answers of `query`
    ///
    /// # Errors
    ///
    /// See [`Engine::query`].
    pub fn proofs(&self, query: &Literal) -> Result<ProofSet> {
        self.run(|solver| solver.proofs(query))
    }

    /// Run `f` on a fresh solver, releasing its store whatever `f` returns
    fn run<T>(&self, f: impl FnOnce(&mut Solver<'_>) -> Result<T>) -> Result<T> {
        let mut solver = self.solver()?;
        let result = f(&mut solver);
        let closed = solver.close();
        let value = result?;
        closed?;
        Ok(value)
    }

    fn round(&self, p: f64) -> f64 {
        match self.config.precision {
            Some(digits) => {
                let scale = 10f64.powf(f64::from(digits));
                if scale.is_finite() {
                    (p * scale).round() / scale
                } else {
                    p
                }
            }
            None => p,
        }
    }
}

/// Values bound to the query's variables by `fact`
fn bindings(query: &Literal, fact: &Literal) -> IndexMap<String, Constant> {
    let subst = unify(query, fact, &Substitution::new()).unwrap_or_default();
    query
        .variables()
        .filter_map(|var| match subst.resolve(&Term::Variable(var.clone())) {
            Term::Constant(value) => Some((var.name.clone(), value)),
            Term::Variable(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::{BuiltinOutcome, FnBuiltin};
    use crate::error::Error;
    use crate::subgoal::{MemoryStore, SubgoalStore};
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    const EPSILON: f64 = 1e-9;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn s(value: &str) -> Term {
        Term::string(value)
    }

    fn v(name: &str) -> Term {
        Term::var(name)
    }

    fn atom(predicate: &str) -> Literal {
        Literal::new(predicate, [])
    }

    fn edge(from: Term, to: Term) -> Literal {
        Literal::new("edge", [from, to])
    }

    fn path(from: Term, to: Term) -> Literal {
        Literal::new("path", [from, to])
    }

    /// `path(X, Y) :- edge(X, Y)` and `path(X, Y) :- edge(X, Z), path(Z, Y)`
    fn path_rules() -> Vec<Clause> {
        vec![
            Clause::rule(path(v("X"), v("Y")), [edge(v("X"), v("Y"))]),
            Clause::rule(
                path(v("X"), v("Y")),
                [edge(v("X"), v("Z")), path(v("Z"), v("Y"))],
            ),
        ]
    }

    /// Probabilistic graph from the ProbLog tutorial
    fn tutorial_graph() -> Vec<Clause> {
        let edges = [
            (0.6, 1, 2),
            (0.1, 1, 3),
            (0.4, 2, 5),
            (0.3, 2, 6),
            (0.3, 3, 4),
            (0.8, 4, 5),
            (0.2, 5, 6),
        ];
        let mut clauses: Vec<Clause> = edges
            .iter()
            .map(|&(p, from, to)| {
                Clause::fact(edge(Term::number(from), Term::number(to)))
                    .with_probability(Probability::new(p).unwrap())
            })
            .collect();
        clauses.extend(path_rules());
        clauses
    }

    fn engine_with(clauses: impl IntoIterator<Item = Clause>, config: EngineConfig) -> Engine {
        let mut engine = Engine::with_config(config);
        for clause in clauses {
            engine.assert(clause).unwrap();
        }
        engine
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < EPSILON,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_duplicate_facts_combine_as_noisy_or() {
        init_logging();
        let mut engine = Engine::new();
        engine.add_probabilistic_fact(0.3, atom("alarm")).unwrap();
        engine.add_probabilistic_fact(0.6, atom("alarm")).unwrap();

        assert_close(engine.probability(&atom("alarm")).unwrap(), 0.72);
    }

    #[test]
    fn test_negated_fact_is_the_complement() {
        let mut engine = Engine::new();
        engine.add_probabilistic_fact(0.4, atom("rain")).unwrap();
        engine
            .add_rule(atom("dry"), [atom("rain").negate()])
            .unwrap();

        assert_close(engine.probability(&atom("rain").negate()).unwrap(), 0.6);
        assert_close(engine.probability(&atom("dry")).unwrap(), 0.6);

        let results = engine.query(&atom("rain").negate()).unwrap();
        assert_eq!(results.len(), 1);
        assert_close(results[0].probability, 0.6);
    }

    #[test]
    fn test_conjunction_of_independent_facts() {
        let mut engine = Engine::new();
        engine.add_probabilistic_fact(0.5, atom("a")).unwrap();
        engine.add_probabilistic_fact(0.6, atom("b")).unwrap();
        engine.add_rule(atom("both"), [atom("a"), atom("b")]).unwrap();

        assert_close(engine.probability(&atom("both")).unwrap(), 0.3);
    }

    #[test]
    fn test_probabilistic_rule_scales_its_body() {
        let mut engine = Engine::new();
        engine.add_probabilistic_fact(0.5, atom("a")).unwrap();
        engine
            .add_probabilistic_rule(0.4, atom("b"), [atom("a")])
            .unwrap();

        assert_close(engine.probability(&atom("b")).unwrap(), 0.2);
    }

    #[test]
    fn test_overlapping_paths_in_tutorial_graph() {
        init_logging();
        let engine = engine_with(tutorial_graph(), EngineConfig::default());

        let one = Term::number(1);
        assert_close(
            engine
                .probability(&path(one.clone(), Term::number(6)))
                .unwrap(),
            0.216_729_6,
        );
        assert_close(
            engine
                .probability(&path(one.clone(), Term::number(5)))
                .unwrap(),
            0.258_24,
        );

        // every answer is reported with its own probability
        let results = engine.query(&path(one, v("Y"))).unwrap();
        let targets: HashSet<String> = results
            .iter()
            .map(|r| r.bindings["Y"].to_string())
            .collect();
        assert_eq!(
            targets,
            ["2", "3", "4", "5", "6"]
                .iter()
                .map(|t| t.to_string())
                .collect::<HashSet<String>>()
        );
        let to_six = results
            .iter()
            .find(|r| r.bindings["Y"] == Constant::Number(6.into()))
            .unwrap();
        assert_close(to_six.probability, 0.216_729_6);
    }

    #[test]
    fn test_cyclic_graph_counts_each_edge_once() {
        let mut engine = Engine::new();
        let edges = [(0.5, "a", "b"), (0.5, "b", "a"), (0.4, "b", "c"), (0.3, "a", "c")];
        for (p, from, to) in edges {
            engine.add_probabilistic_fact(p, edge(s(from), s(to))).unwrap();
        }
        for rule in path_rules() {
            engine.assert(rule).unwrap();
        }

        assert_close(engine.probability(&path(s("a"), s("c"))).unwrap(), 0.44);
        assert_close(engine.probability(&path(s("b"), s("c"))).unwrap(), 0.49);
        assert_close(engine.probability(&path(s("a"), s("a"))).unwrap(), 0.25);
    }

    #[test]
    fn test_left_recursive_closure_on_large_graph() {
        // Graph with shared suffixes and several routes to the same node
        let edges = vec![
            ("a", "b"),
            ("b", "c"),
            ("c", "d"),
            ("d", "e"),
            ("a", "f"),
            ("f", "g"),
            ("g", "d"),
            ("e", "h"),
            ("h", "i"),
            ("i", "j"),
            ("b", "k"),
            ("k", "l"),
            ("l", "m"),
        ];

        let mut engine = Engine::with_config(EngineConfig::default().with_mode(Mode::Datalog));
        for (from, to) in &edges {
            engine.add_fact(edge(s(from), s(to))).unwrap();
        }

        // reachable(x, z) <- reachable(x, y), edge(y, z)
        let reachable = |x: Term, y: Term| Literal::new("reachable", [x, y]);
        engine
            .add_rule(reachable(v("X"), v("Y")), [edge(v("X"), v("Y"))])
            .unwrap();
        engine
            .add_rule(
                reachable(v("X"), v("Z")),
                [reachable(v("X"), v("Y")), edge(v("Y"), v("Z"))],
            )
            .unwrap();

        let results = engine.query(&reachable(v("X"), v("Y"))).unwrap();
        assert!(
            results.len() > edges.len(),
            "Should derive more reachability facts than direct edges"
        );

        for (from, to) in [("a", "e"), ("a", "d"), ("b", "m"), ("f", "j")] {
            assert!(
                engine.ask(&reachable(s(from), s(to))).unwrap(),
                "Should be able to reach {to} from {from}"
            );
        }
        assert!(!engine.ask(&reachable(s("m"), s("a"))).unwrap());
        assert!(results.iter().all(|r| r.probability == 1.0));
    }

    #[test]
    fn test_query_bindings() {
        let mut engine = Engine::new();
        engine.add_fact(edge(s("a"), s("b"))).unwrap();
        engine.add_fact(edge(s("a"), s("c"))).unwrap();

        let results = engine.query(&edge(s("a"), v("To"))).unwrap();
        let bound: Vec<&Constant> = results.iter().map(|r| &r.bindings["To"]).collect();
        assert_eq!(
            bound,
            vec![
                &Constant::String("b".to_string()),
                &Constant::String("c".to_string())
            ]
        );
        assert!(results.iter().all(|r| r.bindings.len() == 1));
    }

    #[test]
    fn test_unknown_predicate_yields_no_results() {
        let engine = engine_with(tutorial_graph(), EngineConfig::default());
        let results = engine.query(&Literal::new("nonexistent", [v("X")])).unwrap();
        assert!(results.is_empty(), "Unknown predicate should have no answers");
        assert_eq!(
            engine
                .probability(&Literal::new("nonexistent", [s("a")]))
                .unwrap(),
            0.0
        );
    }

    #[test]
    fn test_negating_non_ground_literal_is_refused() {
        let mut engine = Engine::new();
        engine.add_probabilistic_fact(0.5, Literal::new("p", [s("a")])).unwrap();
        engine.add_fact(Literal::new("r", [s("b")])).unwrap();
        engine
            .add_rule(
                Literal::new("q", [v("X")]),
                [
                    Literal::new("r", [v("X")]),
                    Literal::new("p", [v("Y")]).negate(),
                ],
            )
            .unwrap();

        assert!(matches!(
            engine.query(&Literal::new("q", [v("X")])),
            Err(Error::Grounding { .. })
        ));
        let err = engine
            .query(&Literal::new("p", [v("X")]).negate())
            .unwrap_err();
        assert!(err.to_string().contains("~p(X)"), "{err}");
    }

    #[test]
    fn test_inconsistent_arity_is_rejected() {
        let mut engine = Engine::new();
        engine.add_fact(edge(s("a"), s("b"))).unwrap();
        let result = engine.add_fact(Literal::new("edge", [s("a")]));
        assert!(matches!(result, Err(Error::ArityMismatch { expected: 2, .. })));
        assert!(matches!(
            engine.add_probabilistic_fact(1.5, atom("x")),
            Err(Error::InvalidProbability(_))
        ));
    }

    #[test]
    fn test_datalog_mode_ignores_annotations() {
        let engine = engine_with(
            tutorial_graph(),
            EngineConfig::default().with_mode(Mode::Datalog),
        );
        let results = engine.query(&path(Term::number(1), v("Y"))).unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.probability == 1.0));
        assert!(engine.proofs(&path(Term::number(1), v("Y"))).unwrap().is_empty());
    }

    #[test]
    fn test_precision_rounds_probabilities() {
        let engine = engine_with(
            tutorial_graph(),
            EngineConfig::default().with_precision(3),
        );
        assert_eq!(
            engine
                .probability(&path(Term::number(1), Term::number(6)))
                .unwrap(),
            0.217
        );
    }

    #[test]
    fn test_excessive_precision_leaves_probabilities_unrounded() -> anyhow::Result<()> {
        let fact = path(Term::number(1), Term::number(6));
        let exact = engine_with(tutorial_graph(), EngineConfig::default()).probability(&fact)?;
        for digits in [308, 400, u32::MAX] {
            let engine = engine_with(
                tutorial_graph(),
                EngineConfig::default().with_precision(digits),
            );
            let p = engine.probability(&fact)?;
            assert!(!p.is_nan(), "precision {digits} gave NaN");
            assert_close(p, exact);
        }
        Ok(())
    }

    #[test]
    fn test_proofs_cover_only_the_answer() {
        let engine = engine_with(tutorial_graph(), EngineConfig::default());
        let proofs = engine.proofs(&path(Term::number(3), v("Y"))).unwrap();

        // edge(3,4), edge(4,5), edge(5,6) and the path instances built on them
        let edge_facts = proofs.facts().filter(|f| f.predicate == "edge").count();
        assert_eq!(edge_facts, 3);
        assert!(proofs
            .iter()
            .all(|proof| !proof.head.terms.contains(&Term::number(1))));
    }

    #[test]
    fn test_custom_builtin_in_rule() {
        let mut engine = Engine::new();
        engine.register_builtin(FnBuiltin::new("even", 1, |args: &[Term]| {
            Ok(match args[0].as_constant() {
                Some(Constant::Number(n)) if n.value() % 2.0 == 0.0 => BuiltinOutcome::Accept,
                _ => BuiltinOutcome::Reject,
            })
        }));
        for n in 1..=6 {
            engine
                .add_fact(Literal::new("n", [Term::number(n)]))
                .unwrap();
        }
        engine
            .add_rule(
                Literal::new("even_n", [v("X")]),
                [
                    Literal::new("n", [v("X")]),
                    Literal::new("even", [v("X")]),
                ],
            )
            .unwrap();

        let results = engine.query(&Literal::new("even_n", [v("X")])).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_store_factory_opens_one_store_per_query() {
        let opened = Arc::new(AtomicUsize::new(0));
        let mut engine = engine_with(tutorial_graph(), EngineConfig::default());
        let counter = Arc::clone(&opened);
        engine.set_store_factory(Arc::new(move || -> Result<Box<dyn SubgoalStore>> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MemoryStore::new()))
        }));

        engine.query(&path(Term::number(1), v("Y"))).unwrap();
        engine.ask(&path(Term::number(2), v("Y"))).unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_queries_share_the_knowledge_base() {
        let engine = engine_with(tutorial_graph(), EngineConfig::default());
        let expected = engine
            .probability(&path(Term::number(1), Term::number(6)))
            .unwrap();

        let results: Vec<f64> = thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        engine
                            .probability(&path(Term::number(1), Term::number(6)))
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(results.iter().all(|&p| p == expected));
    }

    #[cfg(feature = "spill")]
    #[test]
    fn test_disk_and_memory_stores_agree() {
        init_logging();
        let memory = engine_with(tutorial_graph(), EngineConfig::default());
        let disk = engine_with(
            tutorial_graph(),
            EngineConfig::default().with_storage(Storage::Disk { directory: None }),
        );

        let query = path(v("X"), v("Y"));
        let from_memory = memory.query(&query).unwrap();
        let from_disk = disk.query(&query).unwrap();
        assert_eq!(from_memory.len(), from_disk.len());
        for (m, d) in from_memory.iter().zip(&from_disk) {
            assert_eq!(m.fact, d.fact);
            assert_close(m.probability, d.probability);
        }
    }

    #[cfg(feature = "spill")]
    #[test]
    fn test_disk_and_memory_stores_agree_on_awkward_numbers() -> anyhow::Result<()> {
        init_logging();
        let tiny = 1.071_566_039_146_582_6e-75;
        let clauses = || {
            let mut clauses: Vec<Clause> = [1e308, tiny, 0.1 + 0.2]
                .into_iter()
                .map(|x| Clause::fact(Literal::new("n", [Term::number(x)])))
                .collect();
            // the product overflows for 1e308
            clauses.push(Clause::rule(
                Literal::new("scaled", [v("R")]),
                [
                    Literal::new("n", [v("X")]),
                    Literal::new("fn_mul", [v("R"), v("X"), Term::number(10)]),
                ],
            ));
            clauses
        };
        let memory = engine_with(clauses(), EngineConfig::default());
        let disk = engine_with(
            clauses(),
            EngineConfig::default().with_storage(Storage::Disk { directory: None }),
        );

        for query in [Literal::new("n", [v("X")]), Literal::new("scaled", [v("R")])] {
            let from_memory: Vec<Literal> =
                memory.query(&query)?.into_iter().map(|r| r.fact).collect();
            let from_disk: Vec<Literal> = disk.query(&query)?.into_iter().map(|r| r.fact).collect();
            assert_eq!(from_memory, from_disk);
        }
        assert_eq!(disk.query(&Literal::new("scaled", [v("R")]))?.len(), 2);

        let fact = Literal::new("n", [Term::number(tiny)]);
        assert!(memory.ask(&fact)?);
        assert!(disk.ask(&fact)?);
        assert_close(disk.probability(&fact)?, 1.0);
        Ok(())
    }

    #[cfg(feature = "spill")]
    #[test]
    fn test_disk_store_is_removed_after_failed_query() {
        let parent = tempfile::tempdir().unwrap();
        let mut engine = Engine::with_config(EngineConfig::default().with_storage(Storage::Disk {
            directory: Some(parent.path().to_path_buf()),
        }));
        engine.add_fact(Literal::new("r", [s("a")])).unwrap();
        engine
            .add_rule(
                Literal::new("q", [v("X")]),
                [
                    Literal::new("r", [v("X")]),
                    Literal::new("p", [v("Y")]).negate(),
                ],
            )
            .unwrap();

        assert!(engine.query(&Literal::new("q", [v("X")])).is_err());
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
    }

    /// Answers by repeated substitution until nothing new is derived
    fn naive_fixpoint(kb: &KnowledgeBase) -> HashSet<Literal> {
        fn join(
            body: &[Literal],
            subst: &Substitution,
            facts: &HashSet<Literal>,
            out: &mut Vec<Substitution>,
        ) {
            let Some((first, rest)) = body.split_first() else {
                out.push(subst.clone());
                return;
            };
            for fact in facts {
                if let Some(next) = unify(first, fact, subst) {
                    join(rest, &next, facts, out);
                }
            }
        }

        let mut facts: HashSet<Literal> = kb.facts().map(|c| c.head.clone()).collect();
        loop {
            let mut derived = Vec::new();
            for rule in kb.rules() {
                let mut substs = Vec::new();
                join(&rule.body, &Substitution::new(), &facts, &mut substs);
                derived.extend(substs.iter().map(|subst| subst.apply(&rule.head)));
            }
            let before = facts.len();
            facts.extend(derived);
            if facts.len() == before {
                return facts;
            }
        }
    }

    fn acyclic_edges() -> impl Strategy<Value = Vec<(u8, u8)>> {
        prop::collection::vec((0u8..6, 1u8..6), 0..12).prop_map(|pairs| {
            pairs
                .into_iter()
                .map(|(from, step)| (from, from.saturating_add(step)))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_answers_match_naive_fixpoint(edges in acyclic_edges()) {
            let mut engine = Engine::with_config(EngineConfig::default().with_mode(Mode::Datalog));
            for (from, to) in &edges {
                engine
                    .add_fact(edge(Term::number(i32::from(*from)), Term::number(i32::from(*to))))
                    .unwrap();
            }
            for rule in path_rules() {
                engine.assert(rule).unwrap();
            }
            engine
                .add_rule(
                    Literal::new("two_hop", [v("X"), v("Z")]),
                    [edge(v("X"), v("Y")), edge(v("Y"), v("Z"))],
                )
                .unwrap();

            let expected = naive_fixpoint(engine.knowledge_base());
            for predicate in ["edge", "path", "two_hop"] {
                let query = Literal::new(predicate, [v("A"), v("B")]);
                let solved: HashSet<Literal> = engine
                    .query(&query)
                    .unwrap()
                    .into_iter()
                    .map(|r| r.fact)
                    .collect();
                let oracle: HashSet<Literal> = expected
                    .iter()
                    .filter(|f| f.predicate == predicate)
                    .cloned()
                    .collect();
                prop_assert_eq!(solved, oracle);
            }
        }

        #[test]
        fn prop_assertion_order_does_not_change_probabilities(
            clauses in Just(tutorial_graph()).prop_shuffle()
        ) {
            let engine = engine_with(clauses, EngineConfig::default());
            let p = engine
                .probability(&path(Term::number(1), Term::number(6)))
                .unwrap();
            prop_assert!((p - 0.216_729_6).abs() < EPSILON);
        }
    }
}
