//! Full setups driven against tabrl-env environments

use approx::assert_relative_eq;
use ndarray::array;

use tabrl_agent::prelude::*;
use tabrl_agent::{
    EvaluateGreedy, EvaluationPerEpisode, EvaluationPeriod, LoopState, MonteCarloConfig,
    PolicyGradientConfig, PolicyIterationConfig, SweepingConfig, TimeSteps, TotalReward,
};
use tabrl_core::{Learner, NoveltyMode, TrackedEnvironment};
use tabrl_env::{MdpEnv, TimeLimit};

/// State 0: action 0 pays 1 and ends the episode, action 1 stays for nothing.
fn two_state() -> Mdp {
    Mdp::deterministic(
        &array![[1, 1], [0, 1]],
        array![[1.0, 0.0], [0.0, 0.0]],
        vec![false, true],
        vec![0],
    )
    .unwrap()
}

/// Chain 0 → 1 → 2 → 3 → 4 (terminal) on action 0, paying 10 on the last
/// move; action 1 returns to 0 and pays 0.5.
fn chain() -> Mdp {
    Mdp::deterministic(
        &array![[1, 2, 3, 4, 4], [0, 0, 0, 0, 4]],
        array![[0.0, 0.0, 0.0, 10.0, 0.0], [0.5, 0.5, 0.5, 0.5, 0.0]],
        vec![false, false, false, false, true],
        vec![0],
    )
    .unwrap()
}

fn td(num_states: usize, traces: TraceKind) -> TdLearner {
    TdLearner::new(TdConfig {
        num_states,
        num_actions: 2,
        gamma: 0.9,
        alpha: 0.5,
        lambda: 0.0,
        traces,
        ..TdConfig::default()
    })
    .unwrap()
}

fn random_policy(seed: u64) -> SetupConfig {
    SetupConfig {
        seed: Some(seed),
        policy: PolicyConfig::EpsilonGreedy {
            epsilon: 1.0,
            mode: NoveltyMode::Pessimistic,
        },
    }
}

#[test]
fn golden_q_learning_episode() {
    let config = SetupConfig {
        seed: Some(0),
        policy: PolicyConfig::Forced {
            actions: vec![0, 1, 0],
        },
    };
    let mut setup = RlSetup::new(
        td(2, TraceKind::None),
        MdpEnv::new(two_state(), Some(0)),
        ConstantNumberSteps::new(3),
        config,
    )
    .unwrap();
    learn(&mut setup).unwrap();

    let q = setup.learner().q();
    assert_relative_eq!(q.get(0, 0), 0.75);
    assert_relative_eq!(q.get(1, 0), 0.225);
    assert_eq!(setup.steps(), 3);
    assert_eq!(setup.episodes(), 2);
    assert_eq!(setup.state(), LoopState::Stopped);
}

#[test]
fn no_traces_match_replacing_traces_without_decay() {
    let play = |traces| {
        let mut setup = RlSetup::new(
            td(5, traces),
            MdpEnv::new(chain(), Some(5)),
            ConstantNumberSteps::new(500),
            SetupConfig {
                seed: Some(9),
                policy: PolicyConfig::EpsilonGreedy {
                    epsilon: 0.3,
                    mode: NoveltyMode::VeryOptimistic,
                },
            },
        )
        .unwrap();
        learn(&mut setup).unwrap();
        setup.learner().q().values().clone()
    };
    assert_eq!(play(TraceKind::None), play(TraceKind::Replacing));
}

#[test]
fn sweeping_converges_to_policy_iteration() {
    let mdp = chain();
    let planner = PrioritizedSweeping::new(SweepingConfig {
        num_states: 5,
        num_actions: 2,
        gamma: 0.9,
        maxcount: 5,
        ..SweepingConfig::default()
    })
    .unwrap();
    let mut setup = RlSetup::new(
        planner,
        MdpEnv::new(mdp.clone(), Some(1)),
        ConstantNumberSteps::new(5_000),
        random_policy(2),
    )
    .unwrap();
    learn(&mut setup).unwrap();

    let planner = setup.learner_mut();
    planner.process_queue(1_000_000);
    assert!(planner.queue().is_empty());

    let exact = PolicyIteration::solve(&mdp, PolicyIterationConfig::default()).unwrap();
    for s in 0..4 {
        for a in 0..2 {
            assert!(planner.q().is_seen(a, s), "pair ({a}, {s}) never taken");
            assert_relative_eq!(
                planner.q().get(a, s),
                exact.q_values()[[a, s]],
                epsilon = 1e-6
            );
        }
        assert_relative_eq!(planner.values()[s], exact.values()[s], epsilon = 1e-6);
    }
    assert_eq!(&exact.policy()[..4], &[0, 0, 0, 0]);
}

#[test]
fn evaluation_phases_do_not_update_the_learner() {
    // greedy evaluation may loop between states 0 and 1
    let env = TimeLimit::new(MdpEnv::new(chain(), Some(3)), 50).unwrap();
    let mut setup = RlSetup::new(
        td(5, TraceKind::Replacing),
        env,
        ConstantNumberEpisodes::new(20),
        random_policy(4),
    )
    .unwrap()
    .with_callback(EvaluateGreedy::new(
        TotalReward::default(),
        EvaluationPeriod::Episodes(5),
        2,
    ));
    learn(&mut setup).unwrap();

    // one-step TD applies exactly one update per learning step
    assert_eq!(setup.learner().metrics().updates, setup.steps());
    let results = &setup
        .callback::<EvaluateGreedy<TotalReward>>()
        .unwrap()
        .results;
    assert_eq!(results.len(), 4);
}

#[test]
fn tracked_history_holds_only_played_episodes() {
    let env = TimeLimit::new(MdpEnv::new(two_state(), Some(12)), 10).unwrap();
    let mut setup = RlSetup::new(
        td(2, TraceKind::None),
        TrackedEnvironment::new(env),
        ConstantNumberEpisodes::new(4),
        random_policy(13),
    )
    .unwrap()
    .with_callback(EvaluateGreedy::new(
        TimeSteps::default(),
        EvaluationPeriod::Episodes(1),
        1,
    ));
    learn(&mut setup).unwrap();

    let history = setup.env().history();
    assert!(history.iter().all(|episode| episode.steps > 0));
    // four learning episodes, each followed by one greedy episode
    assert_eq!(history.len(), 8);
    let evaluated: usize = setup
        .callback::<EvaluateGreedy<TimeSteps>>()
        .unwrap()
        .results
        .iter()
        .map(|&steps| steps as usize)
        .sum();
    let played: usize = history.iter().map(|episode| episode.steps).sum();
    assert_eq!(played as u64, setup.steps() + evaluated as u64);
}

#[test]
fn run_mode_keeps_tables() {
    let mut setup = RlSetup::new(
        td(5, TraceKind::Accumulating),
        MdpEnv::new(chain(), Some(3)),
        ConstantNumberEpisodes::new(10),
        random_policy(4),
    )
    .unwrap();
    learn(&mut setup).unwrap();
    let learned = setup.learner().q().values().clone();

    setup.set_stopping_criterion(ConstantNumberSteps::new(200));
    run(&mut setup).unwrap();
    assert_eq!(setup.learner().q().values(), &learned);
    assert!(setup.episodes() >= 10);
}

#[test]
fn monte_carlo_learns_exact_averages() {
    let learner = MonteCarlo::new(MonteCarloConfig {
        num_states: 2,
        num_actions: 2,
        gamma: 0.5,
        ..MonteCarloConfig::default()
    })
    .unwrap();
    // action 1 loops, so a time limit keeps episodes finite
    let env = TimeLimit::new(MdpEnv::new(two_state(), Some(8)), 10).unwrap();
    let mut setup = RlSetup::new(learner, env, ConstantNumberEpisodes::new(100), random_policy(6))
        .unwrap()
        .with_callback(EvaluationPerEpisode::new(TotalReward::default()));
    learn(&mut setup).unwrap();

    assert_relative_eq!(setup.learner().q().get(0, 0), 1.0);
    assert_eq!(setup.learner().action_row(0).argmax(), vec![0]);
    let per_episode = &setup
        .callback::<EvaluationPerEpisode<TotalReward>>()
        .unwrap()
        .values;
    assert_eq!(per_episode.len(), 100);
    assert!(per_episode.iter().all(|&r| r == 0.0 || r == 1.0));
}

#[test]
fn policy_gradient_prefers_paying_action() {
    let bandit = Mdp::deterministic(
        &array![[1, 1], [1, 1]],
        array![[1.0, 0.0], [0.0, 0.0]],
        vec![false, true],
        vec![0],
    )
    .unwrap();
    let learner = PolicyGradient::new(PolicyGradientConfig {
        num_states: 2,
        num_actions: 2,
        ..PolicyGradientConfig::default()
    })
    .unwrap();
    let env = TrackedEnvironment::new(MdpEnv::new(bandit, Some(10)));
    let mut setup = RlSetup::new(
        learner,
        env,
        ConstantNumberEpisodes::new(500),
        SetupConfig {
            seed: Some(11),
            policy: PolicyConfig::Softmax { beta: 1.0 },
        },
    )
    .unwrap();
    learn(&mut setup).unwrap();
    assert!(setup.learner().action_probabilities(0)[0] > 0.9);
}
