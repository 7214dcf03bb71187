#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use probalog::{Engine, EngineConfig, Literal, Storage, Term};

fn edge(from: Term, to: Term) -> Literal {
    Literal::new("edge", [from, to])
}

fn path(from: Term, to: Term) -> Literal {
    Literal::new("path", [from, to])
}

/// A 4x4 grid with probabilistic right and down edges
fn setup_grid(config: EngineConfig) -> Engine {
    let mut engine = Engine::with_config(config);
    let node = |row: i32, col: i32| Term::number(row * 4 + col);

    for row in 0..4 {
        for col in 0..4 {
            if col < 3 {
                engine
                    .add_probabilistic_fact(0.6, edge(node(row, col), node(row, col + 1)))
                    .unwrap();
            }
            if row < 3 {
                engine
                    .add_probabilistic_fact(0.7, edge(node(row, col), node(row + 1, col)))
                    .unwrap();
            }
        }
    }

    engine
        .add_rule(
            path(Term::var("X"), Term::var("Y")),
            [edge(Term::var("X"), Term::var("Y"))],
        )
        .unwrap();
    engine
        .add_rule(
            path(Term::var("X"), Term::var("Y")),
            [
                edge(Term::var("X"), Term::var("Z")),
                path(Term::var("Z"), Term::var("Y")),
            ],
        )
        .unwrap();
    engine
}

fn query_corner_probability(c: &mut Criterion) {
    let engine = setup_grid(EngineConfig::default());

    c.bench_function("query_corner_probability", |b| {
        b.iter(|| {
            black_box(
                engine
                    .probability(&path(Term::number(0), Term::number(15)))
                    .unwrap(),
            )
        });
    });
}

fn query_reachable_from_origin(c: &mut Criterion) {
    let engine = setup_grid(EngineConfig::default());

    c.bench_function("query_reachable_from_origin", |b| {
        b.iter(|| {
            black_box(
                engine
                    .query(&path(Term::number(0), Term::var("Y")))
                    .unwrap(),
            )
        });
    });
}

fn query_spilled_subgoals(c: &mut Criterion) {
    let engine = setup_grid(
        EngineConfig::default().with_storage(Storage::Disk { directory: None }),
    );

    c.bench_function("query_spilled_subgoals", |b| {
        b.iter(|| {
            black_box(
                engine
                    .query(&path(Term::number(5), Term::var("Y")))
                    .unwrap(),
            )
        });
    });
}

criterion_group!(
    benches,
    query_corner_probability,
    query_reachable_from_origin,
    query_spilled_subgoals
);
criterion_main!(benches);
