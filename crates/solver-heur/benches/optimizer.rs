use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sched_core::config::RulesConfig;
use sched_core::{testing, Catalog, RunControl, Scheduler};
use solver_heur::HeurSolver;
use types::{Algorithm, GenerationParams};

fn school() -> Catalog {
    let (term, parts) = testing::synthetic_school(8, 7);
    match Catalog::from_parts(term, parts, RulesConfig::default()) {
        Ok(c) => c,
        Err(e) => panic!("synthetic school is invalid: {e}"),
    }
}

fn bench_optimizer(c: &mut Criterion) {
    let catalog = school();
    let solver = HeurSolver::new();
    let control = RunControl::new();

    c.bench_function("greedy/8x35", |b| {
        let params = GenerationParams::default();
        b.iter(|| solver.generate(black_box(&catalog), Algorithm::Greedy, &params, &control))
    });

    let mut group = c.benchmark_group("genetic");
    group.sample_size(10);
    group.bench_function("8x35/pop20/gen20", |b| {
        let params = GenerationParams {
            population_size: 20,
            generations: 20,
            ..GenerationParams::default()
        };
        b.iter(|| solver.generate(black_box(&catalog), Algorithm::Genetic, &params, &control))
    });
    group.finish();
}

criterion_group!(benches, bench_optimizer);
criterion_main!(benches);
