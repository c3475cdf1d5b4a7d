//! Per-step cost of the planner and of TD(λ)
//!
//! The planner's cost per real transition should stay flat as the number of
//! states grows, since each step runs at most `maxcount` backups.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tabrl_agent::prelude::*;
use tabrl_agent::SweepingConfig;
use tabrl_env::MdpEnv;

/// Ring of `n` states; action `a` advances `a + 1` places, reaching state 0 pays 1.
fn ring(n: usize) -> Mdp {
    let next = Array2::from_shape_fn((4, n), |(a, s)| (s + a + 1) % n);
    let reward = next.mapv(|s1| if s1 == 0 { 1.0 } else { 0.0 });
    Mdp::deterministic(&next, reward, vec![false; n], vec![0]).expect("valid ring")
}

fn bench_planner_observe(c: &mut Criterion) {
    let mut group = c.benchmark_group("prioritized_sweeping_observe");
    for &n in &[16_usize, 256, 4096] {
        let mut planner = PrioritizedSweeping::new(SweepingConfig {
            num_states: n,
            num_actions: 4,
            maxcount: 3,
            ..SweepingConfig::default()
        })
        .expect("valid planner");
        let mut rng = StdRng::seed_from_u64(1);
        let mut state = 0;
        let mut step = |planner: &mut PrioritizedSweeping| {
            let action = rng.gen_range(0..4);
            let next = (state + action + 1) % n;
            let reward = if next == 0 { 1.0 } else { 0.0 };
            planner
                .observe(state, action, reward, Some(next))
                .expect("in range");
            state = next;
        };
        for _ in 0..10 * n {
            step(&mut planner);
        }
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| step(black_box(&mut planner)));
        });
    }
    group.finish();
}

fn bench_td_learning(c: &mut Criterion) {
    let mut group = c.benchmark_group("td_lambda_1000_steps");
    for traces in [TraceKind::None, TraceKind::Replacing, TraceKind::Accumulating] {
        group.bench_function(format!("{traces:?}"), |b| {
            b.iter(|| {
                let learner = TdLearner::new(TdConfig {
                    num_states: 64,
                    num_actions: 4,
                    traces,
                    ..TdConfig::default()
                })
                .expect("valid learner");
                let mut setup = RlSetup::new(
                    learner,
                    MdpEnv::new(ring(64), Some(3)),
                    ConstantNumberSteps::new(1_000),
                    SetupConfig {
                        seed: Some(5),
                        ..SetupConfig::default()
                    },
                )
                .expect("matching dimensions");
                learn(&mut setup).expect("learning runs");
                black_box(setup.learner().q().values().sum())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_planner_observe, bench_td_learning);
criterion_main!(benches);
