//! Action selection over one state's value (or preference) row
//!
//! Policies are a closed set selected at construction time. They never touch
//! learner state; the learner hands them an [`ActionRow`] and the driver
//! hands them its random number generator.

use ndarray::{Array1, ArrayView1};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};

use crate::error::{ensure_in_range, RLError};
use crate::value::ActionRow;

/// How an epsilon-greedy policy treats actions that were never tried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoveltyMode {
    /// Ignore novelty: plain epsilon-greedy over all actions
    Pessimistic,
    /// Treat novel actions as tied with the greedy ones
    Optimistic,
    /// Always try novel actions first
    #[default]
    VeryOptimistic,
}

/// Epsilon-greedy action selection with a novelty mode
#[derive(Debug, Clone)]
pub struct EpsilonGreedy {
    num_actions: usize,
    epsilon: f64,
    mode: NoveltyMode,
}

impl EpsilonGreedy {
    /// Create a new epsilon-greedy policy
    pub fn new(num_actions: usize, epsilon: f64, mode: NoveltyMode) -> crate::Result<Self> {
        check_actions(num_actions)?;
        ensure_in_range("epsilon", epsilon, 0.0, 1.0)?;
        Ok(Self {
            num_actions,
            epsilon,
            mode,
        })
    }

    /// Exploration rate
    #[must_use]
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Novelty handling
    #[must_use]
    pub fn mode(&self) -> NoveltyMode {
        self.mode
    }

    /// Candidates of the greedy branch and whether the epsilon branch applies.
    fn greedy_candidates(&self, row: &ActionRow<'_>) -> (Vec<usize>, bool) {
        let novel = row.novel_actions();
        match self.mode {
            NoveltyMode::VeryOptimistic if !novel.is_empty() => (novel, false),
            NoveltyMode::Optimistic if !novel.is_empty() => {
                let mut candidates = row.argmax_among((0..row.len()).filter(|a| !novel.contains(a)));
                candidates.extend(novel);
                candidates.sort_unstable();
                (candidates, true)
            }
            _ => (row.argmax(), true),
        }
    }

    fn select<R: Rng + ?Sized>(&self, row: &ActionRow<'_>, rng: &mut R) -> crate::Result<usize> {
        let (candidates, explores) = self.greedy_candidates(row);
        if explores && rng.gen::<f64>() < self.epsilon {
            return Ok(rng.gen_range(0..self.num_actions));
        }
        candidates
            .choose(rng)
            .copied()
            .ok_or_else(|| RLError::Computation("no greedy action in value row".into()))
    }

    fn probabilities(&self, row: &ActionRow<'_>) -> Array1<f64> {
        let (candidates, explores) = self.greedy_candidates(row);
        let n = self.num_actions as f64;
        let (base, greedy_mass) = if explores {
            (self.epsilon / n, 1.0 - self.epsilon)
        } else {
            (0.0, 1.0)
        };
        let mut probs = Array1::from_elem(self.num_actions, base);
        let share = greedy_mass / candidates.len() as f64;
        for a in candidates {
            probs[a] += share;
        }
        probs
    }
}

/// Boltzmann action selection; novel actions are tried first.
#[derive(Debug, Clone)]
pub struct Softmax {
    num_actions: usize,
    beta: f64,
}

impl Softmax {
    /// Create a softmax policy with inverse temperature `beta`
    pub fn new(num_actions: usize, beta: f64) -> crate::Result<Self> {
        check_actions(num_actions)?;
        if !beta.is_finite() {
            return Err(RLError::config(format!("beta must be finite, got {beta}")));
        }
        Ok(Self { num_actions, beta })
    }

    /// Inverse temperature
    #[must_use]
    pub fn beta(&self) -> f64 {
        self.beta
    }

    fn probabilities(&self, row: &ActionRow<'_>) -> Array1<f64> {
        let novel = row.novel_actions();
        if novel.is_empty() {
            softmax(row.values, self.beta)
        } else {
            let mut probs = Array1::zeros(self.num_actions);
            let share = 1.0 / novel.len() as f64;
            for a in novel {
                probs[a] = share;
            }
            probs
        }
    }
}

/// Replays a fixed action sequence, wrapping around at its end.
#[derive(Debug, Clone)]
pub struct ForcedPolicy {
    num_actions: usize,
    actions: Vec<usize>,
    t: usize,
}

impl ForcedPolicy {
    /// Replay `actions`, each of which must be below `num_actions`
    pub fn new(num_actions: usize, actions: Vec<usize>) -> crate::Result<Self> {
        check_actions(num_actions)?;
        if actions.is_empty() {
            return Err(RLError::config("forced policy needs at least one action"));
        }
        if let Some(&a) = actions.iter().find(|&&a| a >= num_actions) {
            return Err(RLError::InvalidAction(format!(
                "forced action {a} outside 0..{num_actions}"
            )));
        }
        Ok(Self {
            num_actions,
            actions,
            t: 0,
        })
    }

    /// Action the next call to select returns
    #[must_use]
    pub fn peek(&self) -> usize {
        self.actions[self.t % self.actions.len()]
    }

    fn next(&mut self) -> usize {
        let a = self.peek();
        self.t += 1;
        a
    }
}

/// Serializable policy choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyConfig {
    /// Epsilon-greedy
    EpsilonGreedy {
        /// Exploration rate
        epsilon: f64,
        /// Novelty handling
        #[serde(default)]
        mode: NoveltyMode,
    },
    /// Softmax
    Softmax {
        /// Inverse temperature
        beta: f64,
    },
    /// Fixed action sequence
    Forced {
        /// Actions to replay
        actions: Vec<usize>,
    },
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::EpsilonGreedy {
            epsilon: 0.1,
            mode: NoveltyMode::default(),
        }
    }
}

/// Action-selection policy
#[derive(Debug, Clone)]
pub enum Policy {
    /// Epsilon-greedy family
    EpsilonGreedy(EpsilonGreedy),
    /// Softmax over the row
    Softmax(Softmax),
    /// Fixed sequence
    Forced(ForcedPolicy),
}

impl Policy {
    /// Build a policy for `num_actions` actions
    pub fn from_config(config: &PolicyConfig, num_actions: usize) -> crate::Result<Self> {
        Ok(match config {
            PolicyConfig::EpsilonGreedy { epsilon, mode } => {
                Self::EpsilonGreedy(EpsilonGreedy::new(num_actions, *epsilon, *mode)?)
            }
            PolicyConfig::Softmax { beta } => Self::Softmax(Softmax::new(num_actions, *beta)?),
            PolicyConfig::Forced { actions } => {
                Self::Forced(ForcedPolicy::new(num_actions, actions.clone())?)
            }
        })
    }

    /// Pure argmax with uniform tie-breaking, ignoring novelty
    pub fn greedy(num_actions: usize) -> crate::Result<Self> {
        Ok(Self::EpsilonGreedy(EpsilonGreedy::new(
            num_actions,
            0.0,
            NoveltyMode::Pessimistic,
        )?))
    }

    /// Number of actions this policy chooses from
    #[must_use]
    pub fn num_actions(&self) -> usize {
        match self {
            Self::EpsilonGreedy(p) => p.num_actions,
            Self::Softmax(p) => p.num_actions,
            Self::Forced(p) => p.num_actions,
        }
    }

    /// Pick an action for the state described by `row`.
    pub fn select<R: Rng + ?Sized>(&mut self, row: ActionRow<'_>, rng: &mut R) -> crate::Result<usize> {
        self.check_row(&row)?;
        match self {
            Self::EpsilonGreedy(p) => p.select(&row, rng),
            Self::Softmax(p) => {
                let probs = p.probabilities(&row);
                let dist = WeightedIndex::new(probs.iter())
                    .map_err(|e| RLError::Computation(format!("softmax sampling failed: {e}")))?;
                Ok(dist.sample(rng))
            }
            Self::Forced(p) => Ok(p.next()),
        }
    }

    /// Distribution [`Policy::select`] samples from
    pub fn probabilities(&self, row: ActionRow<'_>) -> crate::Result<Array1<f64>> {
        self.check_row(&row)?;
        Ok(match self {
            Self::EpsilonGreedy(p) => p.probabilities(&row),
            Self::Softmax(p) => p.probabilities(&row),
            Self::Forced(p) => {
                let mut probs = Array1::zeros(row.len());
                probs[p.peek()] = 1.0;
                probs
            }
        })
    }

    /// Exploration rate, if the policy has one
    #[must_use]
    pub fn epsilon(&self) -> Option<f64> {
        match self {
            Self::EpsilonGreedy(p) => Some(p.epsilon),
            _ => None,
        }
    }

    /// Mutable exploration rate, if the policy has one
    pub fn epsilon_mut(&mut self) -> Option<&mut f64> {
        match self {
            Self::EpsilonGreedy(p) => Some(&mut p.epsilon),
            _ => None,
        }
    }

    fn check_row(&self, row: &ActionRow<'_>) -> crate::Result<()> {
        let n = self.num_actions();
        if n == row.len() {
            Ok(())
        } else {
            Err(RLError::DimensionMismatch {
                expected: n,
                actual: row.len(),
            })
        }
    }
}

/// Numerically stable `exp(β x_a) / Σ exp(β x_a')`.
#[must_use]
pub fn softmax(values: ArrayView1<'_, f64>, beta: f64) -> Array1<f64> {
    let scaled = values.mapv(|x| beta * x);
    let max = scaled.fold(f64::NEG_INFINITY, |m, &x| m.max(x));
    let exps = scaled.mapv(|x| (x - max).exp());
    let total = exps.sum();
    exps / total
}

fn check_actions(num_actions: usize) -> crate::Result<()> {
    if num_actions == 0 {
        Err(RLError::config("action set must not be empty"))
    } else {
        Ok(())
    }
}
