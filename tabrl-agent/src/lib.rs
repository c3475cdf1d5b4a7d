//! Tabular learners and the loop that drives them
//!
//! This crate provides the learning algorithms built on `tabrl-core`:
//! - TD(λ) control: Q-learning and SARSA, one-step or n-step
//! - Every-visit Monte Carlo control
//! - Policy gradient with forward or backward (trace) updates
//! - Prioritized sweeping with small backups
//! - Exact policy iteration for known MDPs
//!
//! together with [`RlSetup`], which runs a learner against an environment
//! with stopping criteria, callbacks and evaluation phases.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

pub mod callbacks;
pub mod evaluation;
pub mod monte_carlo;
pub mod policy_gradient;
pub mod policy_iteration;
pub mod prioritized_sweeping;
pub mod setup;
pub mod stopping;
pub mod td;
pub mod utils;

// Re-export learners
pub use monte_carlo::{MonteCarlo, MonteCarloConfig};
pub use policy_gradient::{PgVariant, PolicyGradient, PolicyGradientConfig};
pub use policy_iteration::{PolicyIteration, PolicyIterationConfig};
pub use prioritized_sweeping::{PrioritizedSweeping, SweepingConfig};
pub use td::{TdConfig, TdLearner, TdMethod};

// Re-export the loop
pub use callbacks::{
    AllRewards, Callback, CallbackContext, EvaluateGreedy, Evaluation, EvaluationPerEpisode,
    EvaluationPerT, EvaluationPeriod, LinearDecreaseEpsilon, RecordAll, ReduceEpsilonPerEpisode,
    ReduceEpsilonPerT, Signal,
};
pub use evaluation::{MeanReward, Metric, TimeSteps, TotalReward};
pub use setup::{learn, run, LoopState, RlSetup, SetupConfig, StepRecord};
pub use stopping::{ConstantNumberEpisodes, ConstantNumberSteps, StoppingCriterion};

// Re-export utilities
pub use utils::{InverseSchedule, LinearSchedule, Schedule};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        learn, run, ConstantNumberEpisodes, ConstantNumberSteps, MonteCarlo, PolicyGradient,
        PolicyIteration, PrioritizedSweeping, RlSetup, SetupConfig, TdConfig, TdLearner,
    };
    pub use tabrl_core::prelude::*;
}
