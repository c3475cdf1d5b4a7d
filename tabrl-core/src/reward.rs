//! Reward signals and reward bias correction

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::ensure_in_range;

/// Reward signal from the environment
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Reward(pub f64);

impl Reward {
    /// Create a new reward
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    /// Get the reward value
    #[must_use]
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl From<f64> for Reward {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl From<Reward> for f64 {
    fn from(reward: Reward) -> Self {
        reward.0
    }
}

impl std::ops::Add for Reward {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self(self.0 + other.0)
    }
}

impl std::ops::Mul<f64> for Reward {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self::Output {
        Self(self.0 * scalar)
    }
}

/// Serializable choice of bias corrector
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BiasCorrectorConfig {
    /// Use the reward as is
    #[default]
    None,
    /// Subtract a low-pass filtered running mean of the reward
    RewardLowpass {
        /// Filter factor in `[0, 1]`
        lambda: f64,
    },
    /// Use the TD error of a learned state-value critic
    Critic {
        /// Critic learning rate
        alpha: f64,
        /// Critic discount factor
        gamma: f64,
        /// Initial critic value
        init_value: f64,
    },
}

/// Turns raw rewards (or returns) into the effective signal that drives a
/// policy-gradient update.
#[derive(Debug, Clone)]
pub enum BiasCorrector {
    /// Reward used as is
    None,
    /// `rmean ← (1 − λ) rmean + λ r`, effective reward `r − rmean`
    RewardLowpass {
        /// Filter factor
        lambda: f64,
        /// Running mean
        rmean: f64,
    },
    /// TD(0) critic over states; the effective reward is the critic's TD error
    Critic {
        /// Critic learning rate
        alpha: f64,
        /// Critic discount factor
        gamma: f64,
        /// State values
        values: Array1<f64>,
    },
}

impl BiasCorrector {
    /// Instantiate a corrector for a problem with `num_states` states.
    pub fn from_config(config: BiasCorrectorConfig, num_states: usize) -> crate::Result<Self> {
        Ok(match config {
            BiasCorrectorConfig::None => Self::None,
            BiasCorrectorConfig::RewardLowpass { lambda } => {
                ensure_in_range("lambda", lambda, 0.0, 1.0)?;
                Self::RewardLowpass { lambda, rmean: 0.0 }
            }
            BiasCorrectorConfig::Critic {
                alpha,
                gamma,
                init_value,
            } => {
                ensure_in_range("critic alpha", alpha, 0.0, 1.0)?;
                ensure_in_range("critic gamma", gamma, 0.0, 1.0)?;
                if !init_value.is_finite() {
                    return Err(crate::RLError::config("critic init_value must be finite"));
                }
                Self::Critic {
                    alpha,
                    gamma,
                    values: Array1::from_elem(num_states, init_value),
                }
            }
        })
    }

    /// Effective signal for a transition `state → next_state` with `reward`.
    ///
    /// `next_state` is `None` when the transition ended the episode.
    pub fn correct(&mut self, reward: f64, state: usize, next_state: Option<usize>) -> f64 {
        match self {
            Self::None => reward,
            Self::RewardLowpass { lambda, rmean } => {
                *rmean = (1.0 - *lambda) * *rmean + *lambda * reward;
                reward - *rmean
            }
            Self::Critic {
                alpha,
                gamma,
                values,
            } => {
                let next = next_state.map_or(0.0, |s1| values[s1]);
                let delta = reward + *gamma * next - values[state];
                values[state] += *alpha * delta;
                delta
            }
        }
    }
}
