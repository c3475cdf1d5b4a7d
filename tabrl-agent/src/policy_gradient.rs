//! Tabular softmax policy gradient
//!
//! The policy in state `s` is `softmax(params[:, s])`, and
//! `∇ log π(a | s)` with respect to column `s` is `𝟙[· = a] − π(· | s)`.
//!
//! * [`PgVariant::Forward`] waits for (n-step truncated) returns and moves
//!   each pair along `α · corrected(G) · ∇ log π`. With `nsteps = None` this
//!   is episodic REINFORCE.
//! * [`PgVariant::Backward`] accumulates the log-policy gradients in a trace
//!   and applies the corrected reward to the whole trace every step. The
//!   trace lives for one episode.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tabrl_core::error::{ensure_in_range, ensure_positive_count};
use tabrl_core::policy::softmax;
use tabrl_core::traces::DEFAULT_MINIMAL_TRACE_VALUE;
use tabrl_core::{
    ActionRow, BiasCorrector, BiasCorrectorConfig, Buffer, BufferSpec, Learner, LearnerMetrics,
    Result, TraceMatrix, ValueTable, VisitCounts,
};

/// Gradient estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PgVariant {
    /// Monte Carlo returns
    #[default]
    Forward,
    /// Online updates through gradient traces
    Backward,
}

/// Policy gradient configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyGradientConfig {
    /// Number of states
    pub num_states: usize,
    /// Number of actions
    pub num_actions: usize,
    /// Discount factor
    pub gamma: f64,
    /// Learning rate
    pub alpha: f64,
    /// Initial preference
    pub init_value: f64,
    /// Estimator
    pub variant: PgVariant,
    /// Return horizon of the forward estimator; `None` waits for the episode end
    pub nsteps: Option<usize>,
    /// Trace decay of the backward estimator
    pub lambda: f64,
    /// Reward correction
    pub bias: BiasCorrectorConfig,
    /// Hand visit counts to the policy so untried actions come first
    pub explore_novel: bool,
}

impl Default for PolicyGradientConfig {
    fn default() -> Self {
        Self {
            num_states: 10,
            num_actions: 4,
            gamma: 0.9,
            alpha: 0.1,
            init_value: 0.0,
            variant: PgVariant::Forward,
            nsteps: None,
            lambda: 1.0,
            bias: BiasCorrectorConfig::None,
            explore_novel: false,
        }
    }
}

/// Tabular policy-gradient learner
#[derive(Debug, Clone)]
pub struct PolicyGradient {
    config: PolicyGradientConfig,
    params: ValueTable,
    visits: VisitCounts,
    bias: BiasCorrector,
    traces: Option<TraceMatrix>,
    metrics: LearnerMetrics,
}

impl PolicyGradient {
    /// Create a new learner
    pub fn new(config: PolicyGradientConfig) -> Result<Self> {
        ensure_in_range("gamma", config.gamma, 0.0, 1.0)?;
        ensure_in_range("alpha", config.alpha, 0.0, 1.0)?;
        ensure_in_range("lambda", config.lambda, 0.0, 1.0)?;
        if let Some(n) = config.nsteps {
            ensure_positive_count("nsteps", n)?;
        }
        let params = ValueTable::new(config.num_states, config.num_actions, config.init_value)?;
        let visits = VisitCounts::new(config.num_states, config.num_actions)?;
        let bias = BiasCorrector::from_config(config.bias, config.num_states)?;
        let traces = match config.variant {
            PgVariant::Forward => None,
            PgVariant::Backward => Some(TraceMatrix::new(
                config.num_states,
                config.num_actions,
                config.lambda,
                config.gamma,
                DEFAULT_MINIMAL_TRACE_VALUE,
            )?),
        };
        debug!(variant = ?config.variant, nsteps = ?config.nsteps, "created policy gradient learner");
        Ok(Self {
            config,
            params,
            visits,
            bias,
            traces,
            metrics: LearnerMetrics::default(),
        })
    }

    /// Preferences (log-probabilities up to a constant per state)
    #[must_use]
    pub fn params(&self) -> &ValueTable {
        &self.params
    }

    /// Current action distribution in `state`
    #[must_use]
    pub fn action_probabilities(&self, state: usize) -> Array1<f64> {
        softmax(self.params.column(state), 1.0)
    }

    /// Bias corrector state
    #[must_use]
    pub fn bias_corrector(&self) -> &BiasCorrector {
        &self.bias
    }

    /// `params[:, state] += scale · ∇ log π(action | state)`
    fn ascend(&mut self, state: usize, action: usize, scale: f64) {
        let probs = self.action_probabilities(state);
        for (b, p) in probs.iter().enumerate() {
            let grad = if b == action { 1.0 - p } else { -p };
            self.params.add(b, state, scale * grad);
        }
    }

    fn forward(&mut self, buffer: &Buffer, done: bool) {
        let gamma = self.config.gamma;
        let window_full = self.config.nsteps.is_some_and(|n| buffer.len() >= n);
        if done {
            let returns = buffer.discounted_returns(gamma);
            for (t, g) in buffer.transitions().zip(returns) {
                let g = self.bias.correct(g, t.state, None);
                self.ascend(t.state, t.action, self.config.alpha * g);
                self.metrics.last_error = Some(g);
            }
            self.metrics.updates += 1;
        } else if window_full {
            if let Some(oldest) = buffer.transition(0) {
                let g = buffer.discounted_return(0, gamma);
                let g = self.bias.correct(g, oldest.state, None);
                self.ascend(oldest.state, oldest.action, self.config.alpha * g);
                self.metrics.last_error = Some(g);
                self.metrics.updates += 1;
            }
        }
    }

    fn backward(&mut self, state: usize, action: usize, reward: f64, next_state: Option<usize>) {
        let r = self.bias.correct(reward, state, next_state);
        let probs = self.action_probabilities(state);
        let Some(traces) = self.traces.as_mut() else {
            return;
        };
        traces.decay();
        for (b, p) in probs.iter().enumerate() {
            let grad = if b == action { 1.0 - p } else { -p };
            traces.add(b, state, grad);
        }
        let step = self.config.alpha * r;
        let params = &mut self.params;
        traces.for_each_active(|a, s, e| params.add(a, s, step * e));
        if next_state.is_none() {
            traces.reset();
        }
        self.metrics.last_error = Some(r);
        self.metrics.updates += 1;
    }
}

impl Learner for PolicyGradient {
    fn num_states(&self) -> usize {
        self.config.num_states
    }

    fn num_actions(&self) -> usize {
        self.config.num_actions
    }

    fn buffer_spec(&self) -> BufferSpec {
        match self.config.variant {
            PgVariant::Forward => BufferSpec {
                capacity: self.config.nsteps,
            },
            PgVariant::Backward => BufferSpec { capacity: Some(1) },
        }
    }

    fn update(&mut self, buffer: &Buffer) -> Result<()> {
        let Some(newest) = buffer.last() else {
            return Ok(());
        };
        self.visits.record(newest.action, newest.state);
        match self.config.variant {
            PgVariant::Forward => self.forward(buffer, newest.done),
            PgVariant::Backward => {
                let next = (!newest.done).then_some(newest.next_state);
                self.backward(newest.state, newest.action, newest.reward, next);
            }
        }
        Ok(())
    }

    fn action_row(&self, state: usize) -> ActionRow<'_> {
        if self.config.explore_novel {
            ActionRow::new(self.params.column(state), self.visits.column(state))
        } else {
            ActionRow::values_only(self.params.column(state))
        }
    }

    fn metrics(&self) -> LearnerMetrics {
        self.metrics.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn config(variant: PgVariant) -> PolicyGradientConfig {
        PolicyGradientConfig {
            num_states: 2,
            num_actions: 2,
            alpha: 1.0,
            gamma: 0.5,
            variant,
            ..PolicyGradientConfig::default()
        }
    }

    fn step(learner: &mut PolicyGradient, buffer: &mut Buffer, r: f64, done: bool, next: (usize, usize)) {
        buffer.push_return(r, done);
        buffer.push_state_action(next.0, next.1);
        learner.update(buffer).unwrap();
    }

    #[test]
    fn forward_reinforces_rewarded_action() {
        let mut learner = PolicyGradient::new(config(PgVariant::Forward)).unwrap();
        let mut buffer = Buffer::new(learner.buffer_spec());
        buffer.push_state_action(0, 0);
        step(&mut learner, &mut buffer, 1.0, true, (0, 0));
        assert_relative_eq!(learner.params().get(0, 0), 0.5);
        assert_relative_eq!(learner.params().get(1, 0), -0.5);
        assert!(learner.action_probabilities(0)[0] > 0.5);
    }

    #[test]
    fn forward_waits_for_episode_end_without_horizon() {
        let mut learner = PolicyGradient::new(config(PgVariant::Forward)).unwrap();
        let mut buffer = Buffer::new(learner.buffer_spec());
        buffer.push_state_action(0, 1);
        step(&mut learner, &mut buffer, 0.0, false, (1, 0));
        assert_eq!(learner.metrics().updates, 0);
        step(&mut learner, &mut buffer, 2.0, true, (0, 0));
        // returns: 1.0 for (0, 1), 2.0 for (1, 0)
        assert_relative_eq!(learner.params().get(1, 0), 0.5);
        assert_relative_eq!(learner.params().get(0, 1), 1.0);
    }

    #[test]
    fn forward_truncates_at_horizon() {
        let mut learner = PolicyGradient::new(PolicyGradientConfig {
            nsteps: Some(1),
            ..config(PgVariant::Forward)
        })
        .unwrap();
        let mut buffer = Buffer::new(learner.buffer_spec());
        buffer.push_state_action(0, 1);
        step(&mut learner, &mut buffer, 2.0, false, (1, 0));
        assert_relative_eq!(learner.params().get(1, 0), 1.0);
        assert_relative_eq!(learner.params().get(0, 0), -1.0);
    }

    #[test]
    fn backward_credits_earlier_choices_through_traces() {
        let mut learner = PolicyGradient::new(config(PgVariant::Backward)).unwrap();
        let mut buffer = Buffer::new(learner.buffer_spec());
        buffer.push_state_action(0, 0);
        step(&mut learner, &mut buffer, 0.0, false, (1, 1));
        assert_relative_eq!(learner.params().get(0, 0), 0.0);

        step(&mut learner, &mut buffer, 1.0, true, (0, 0));
        // trace of (0, 0) decayed by γλ = 0.5
        assert_relative_eq!(learner.params().get(0, 0), 0.25);
        assert_relative_eq!(learner.params().get(1, 1), 0.5);
    }

    #[test]
    fn backward_traces_end_with_the_episode() {
        let mut learner = PolicyGradient::new(config(PgVariant::Backward)).unwrap();
        let mut buffer = Buffer::new(learner.buffer_spec());
        buffer.push_state_action(0, 0);
        step(&mut learner, &mut buffer, 0.0, true, (1, 1));
        step(&mut learner, &mut buffer, 1.0, true, (0, 0));
        assert_relative_eq!(learner.params().get(0, 0), 0.0);
        assert_relative_eq!(learner.params().get(1, 1), 0.5);
    }

    #[test]
    fn lowpass_corrector_removes_constant_rewards() {
        let mut learner = PolicyGradient::new(PolicyGradientConfig {
            bias: BiasCorrectorConfig::RewardLowpass { lambda: 1.0 },
            ..config(PgVariant::Backward)
        })
        .unwrap();
        let mut buffer = Buffer::new(learner.buffer_spec());
        buffer.push_state_action(0, 0);
        for _ in 0..5 {
            step(&mut learner, &mut buffer, 3.0, false, (0, 0));
        }
        assert_relative_eq!(learner.params().get(0, 0), 0.0);
        assert_eq!(learner.metrics().last_error, Some(0.0));
    }

    #[test]
    fn novelty_is_only_exposed_on_request() {
        let plain = PolicyGradient::new(config(PgVariant::Forward)).unwrap();
        assert!(plain.action_row(0).visits.is_none());
        let novel = PolicyGradient::new(PolicyGradientConfig {
            explore_novel: true,
            ..config(PgVariant::Forward)
        })
        .unwrap();
        assert!(novel.action_row(0).visits.is_some());
    }

    #[test]
    fn rejects_zero_horizon() {
        assert!(PolicyGradient::new(PolicyGradientConfig {
            nsteps: Some(0),
            ..PolicyGradientConfig::default()
        })
        .is_err());
    }
}
