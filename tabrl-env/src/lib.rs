//! Tabular environments for tabrl learners
//!
//! This crate provides:
//! - [`MdpEnv`], which samples a known [`Mdp`]
//! - [`ForcedEpisode`], which replays a recorded episode
//! - Wrappers limiting episode length and transforming rewards

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod forced;
pub mod mdp_env;
pub mod wrappers;

// Re-export environments
pub use forced::ForcedEpisode;
pub use mdp_env::MdpEnv;
pub use wrappers::{RewardWrapper, TimeLimit};

// Re-export core types
pub use tabrl_core::{Environment, Mdp, Reward, Step, TrackedEnvironment};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{ForcedEpisode, MdpEnv, RewardWrapper, TimeLimit};
    pub use tabrl_core::prelude::*;
}
