//! Example: TD(λ) and prioritized sweeping on a chain MDP
//!
//! Run with `RUST_LOG=tabrl_agent=debug` to see episode and evaluation
//! events.

use anyhow::Context;
use ndarray::Array2;
use tracing_subscriber::EnvFilter;

use tabrl_agent::prelude::*;
use tabrl_agent::{
    EvaluateGreedy, EvaluationPeriod, LinearDecreaseEpsilon, PolicyIterationConfig,
    SweepingConfig, TotalReward,
};
use tabrl_core::config::from_json_str;
use tabrl_core::TrackedEnvironment;
use tabrl_env::{MdpEnv, TimeLimit};

const CHAIN_LENGTH: usize = 8;

/// Walking right pays 10 at the end of the chain, any other move returns
/// to the start for a reward of 0.1.
fn chain() -> anyhow::Result<Mdp> {
    let n = CHAIN_LENGTH;
    let next = Array2::from_shape_fn((2, n), |(a, s)| match (a, s) {
        (_, s) if s + 1 == n => s,
        (0, s) => s + 1,
        _ => 0,
    });
    let reward = Array2::from_shape_fn((2, n), |(a, s)| match (a, s) {
        (0, s) if s + 2 == n => 10.0,
        (1, _) => 0.1,
        _ => 0.0,
    });
    let mut terminal = vec![false; n];
    terminal[n - 1] = true;
    Mdp::deterministic(&next, reward, terminal, vec![0]).context("building chain MDP")
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mdp = chain()?;
    let exact = PolicyIteration::solve(&mdp, PolicyIterationConfig::default())?;
    println!("Optimal values: {:.3}", exact.values());

    // TD(λ) with decreasing exploration
    let td_config: TdConfig = from_json_str(&format!(
        r#"{{ "num_states": {CHAIN_LENGTH}, "num_actions": 2, "alpha": 0.2, "traces": "replacing" }}"#
    ))?;
    let env = TimeLimit::new(MdpEnv::new(mdp.clone(), Some(42)), 100)?;
    let mut setup = RlSetup::new(
        TdLearner::new(td_config)?,
        TrackedEnvironment::new(env),
        ConstantNumberEpisodes::new(300),
        SetupConfig {
            seed: Some(42),
            ..SetupConfig::default()
        },
    )?
    .with_callback(LinearDecreaseEpsilon::new(0.5, 0.01, 5_000)?)
    .with_callback(EvaluateGreedy::new(
        TotalReward::default(),
        EvaluationPeriod::Episodes(50),
        1,
    ));
    learn(&mut setup)?;

    if let Some(evaluations) = setup.callback::<EvaluateGreedy<TotalReward>>() {
        for (i, reward) in evaluations.results.iter().enumerate() {
            println!("Greedy evaluation {}: total reward = {reward:.2}", i + 1);
        }
    }
    println!(
        "TD(λ): {} steps, {} episodes, Q(right, start) = {:.3}",
        setup.steps(),
        setup.episodes(),
        setup.learner().q().get(0, 0)
    );

    // Prioritized sweeping on the same problem
    let planner = PrioritizedSweeping::new(SweepingConfig {
        num_states: CHAIN_LENGTH,
        num_actions: 2,
        ..SweepingConfig::default()
    })?;
    let env = TimeLimit::new(MdpEnv::new(mdp, Some(7)), 100)?;
    let mut setup = RlSetup::new(
        planner,
        env,
        ConstantNumberSteps::new(2_000),
        SetupConfig {
            seed: Some(7),
            ..SetupConfig::default()
        },
    )?;
    learn(&mut setup)?;
    println!(
        "Prioritized sweeping: {} backups, V = {:.3}",
        setup.learner().backups(),
        setup.learner().values()
    );

    Ok(())
}
