//! Core tables, traces, models and contracts for tabular reinforcement learning
//!
//! This crate provides the data structures every tabular learner is built
//! from (value tables, eligibility traces, the learned transition model and
//! the planner's priority queue) together with the contracts the learning
//! loop relies on: [`Environment`], [`Learner`], [`Policy`] and [`Buffer`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

pub mod agent;
pub mod config;
pub mod environment;
pub mod error;
pub mod mdp;
pub mod model;
pub mod policy;
pub mod queue;
pub mod reward;
pub mod traces;
pub mod trajectory;
pub mod value;

// Re-export core traits and types
pub use agent::{Learner, LearnerMetrics};
pub use environment::{Environment, Episode, Step, TrackedEnvironment};
pub use error::{RLError, Result};
pub use mdp::{Distribution, Mdp};
pub use model::TransitionModel;
pub use policy::{EpsilonGreedy, ForcedPolicy, NoveltyMode, Policy, PolicyConfig, Softmax};
pub use queue::PriorityQueue;
pub use reward::{BiasCorrector, BiasCorrectorConfig, Reward};
pub use traces::{TraceKind, TraceMatrix, Traces};
pub use trajectory::{Buffer, BufferSpec, Transition};
pub use value::{ActionRow, ValueTable, VisitCounts};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ActionRow, Buffer, BufferSpec, Environment, Learner, Mdp, NoveltyMode, Policy,
        PolicyConfig, Result, Reward, Step, TraceKind, ValueTable,
    };
}
