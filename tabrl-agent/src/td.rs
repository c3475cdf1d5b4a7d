//! Temporal-difference control with eligibility traces
//!
//! Q-learning and SARSA, one-step or n-step, with no, accumulating or
//! replacing traces. Each call to [`TdLearner::update`] handles the newest
//! transition in the buffer:
//!
//! * while the episode runs and the window holds `nsteps` transitions, the
//!   oldest pair is updated towards `Σ γ^k r_k + γ^n · bootstrap`;
//! * when the newest transition ends the episode, every pair still in the
//!   window is updated towards its truncated return.
//!
//! Entries that were never written are read as `unseen_value`, both for the
//! pair being updated and for the bootstrapped successor.

use serde::{Deserialize, Serialize};
use tracing::debug;

use tabrl_core::error::{ensure_in_range, ensure_positive_count};
use tabrl_core::traces::DEFAULT_MINIMAL_TRACE_VALUE;
use tabrl_core::{
    ActionRow, Buffer, BufferSpec, Learner, LearnerMetrics, RLError, Result, TraceKind, Traces,
    ValueTable, VisitCounts,
};

/// Bootstrap rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TdMethod {
    /// `max_a Q[a, s1]`
    #[default]
    QLearning,
    /// `Q[a1, s1]` for the action actually chosen next
    Sarsa,
}

/// TD learner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TdConfig {
    /// Number of states
    pub num_states: usize,
    /// Number of actions
    pub num_actions: usize,
    /// Discount factor
    pub gamma: f64,
    /// Learning rate
    pub alpha: f64,
    /// Trace decay
    pub lambda: f64,
    /// Initial table value
    pub init_value: f64,
    /// Value assumed for entries that were never written
    pub unseen_value: f64,
    /// Trace variant
    pub traces: TraceKind,
    /// Bootstrap rule
    pub method: TdMethod,
    /// Transitions summed before bootstrapping
    pub nsteps: usize,
    /// Traces below this are dropped
    pub minimal_trace_value: f64,
}

impl Default for TdConfig {
    fn default() -> Self {
        Self {
            num_states: 10,
            num_actions: 4,
            gamma: 0.9,
            alpha: 0.1,
            lambda: 0.8,
            init_value: 0.0,
            unseen_value: 0.0,
            traces: TraceKind::Replacing,
            method: TdMethod::QLearning,
            nsteps: 1,
            minimal_trace_value: DEFAULT_MINIMAL_TRACE_VALUE,
        }
    }
}

/// Tabular TD(λ) control
#[derive(Debug, Clone)]
pub struct TdLearner {
    config: TdConfig,
    q: ValueTable,
    visits: VisitCounts,
    traces: Traces,
    metrics: LearnerMetrics,
}

impl TdLearner {
    /// Create a new learner
    pub fn new(config: TdConfig) -> Result<Self> {
        ensure_in_range("gamma", config.gamma, 0.0, 1.0)?;
        ensure_in_range("alpha", config.alpha, 0.0, 1.0)?;
        ensure_in_range("lambda", config.lambda, 0.0, 1.0)?;
        ensure_positive_count("nsteps", config.nsteps)?;
        if !config.unseen_value.is_finite() {
            return Err(RLError::config("unseen_value must be finite"));
        }
        let q = ValueTable::new(config.num_states, config.num_actions, config.init_value)?;
        let visits = VisitCounts::new(config.num_states, config.num_actions)?;
        let traces = Traces::new(
            config.traces,
            config.num_states,
            config.num_actions,
            config.lambda,
            config.gamma,
            config.minimal_trace_value,
        )?;
        debug!(
            method = ?config.method,
            traces = ?config.traces,
            nsteps = config.nsteps,
            "created TD learner"
        );
        Ok(Self {
            config,
            q,
            visits,
            traces,
            metrics: LearnerMetrics::default(),
        })
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &TdConfig {
        &self.config
    }

    /// Action values
    #[must_use]
    pub fn q(&self) -> &ValueTable {
        &self.q
    }

    /// Visit counts
    #[must_use]
    pub fn visits(&self) -> &VisitCounts {
        &self.visits
    }

    /// Eligibility traces
    #[must_use]
    pub fn traces(&self) -> &Traces {
        &self.traces
    }

    fn bootstrap(&self, state: usize, action: usize) -> f64 {
        let unseen = self.config.unseen_value;
        match self.config.method {
            TdMethod::QLearning => self.q.max_effective(state, unseen),
            TdMethod::Sarsa => self.q.effective(action, state, unseen),
        }
    }

    /// Move `(action, state)` and every eligible pair towards `target`.
    fn apply(&mut self, state: usize, action: usize, target: f64) {
        let unseen = self.config.unseen_value;
        let delta = target - self.q.effective(action, state, unseen);
        self.q.materialize(action, state, unseen);
        self.traces.update(action, state);

        let step = self.config.alpha * delta;
        let q = &mut self.q;
        self.traces
            .for_each_active((action, state), |a, s, e| q.add(a, s, step * e));

        self.metrics.updates += 1;
        self.metrics.last_error = Some(delta);
    }
}

impl Learner for TdLearner {
    fn num_states(&self) -> usize {
        self.config.num_states
    }

    fn num_actions(&self) -> usize {
        self.config.num_actions
    }

    fn buffer_spec(&self) -> BufferSpec {
        BufferSpec {
            capacity: Some(self.config.nsteps),
        }
    }

    fn update(&mut self, buffer: &Buffer) -> Result<()> {
        let Some(newest) = buffer.last() else {
            return Ok(());
        };
        self.visits.record(newest.action, newest.state);

        let gamma = self.config.gamma;
        let n = buffer.len();
        if newest.done {
            let returns = buffer.discounted_returns(gamma);
            for (t, target) in buffer.transitions().zip(returns) {
                self.apply(t.state, t.action, target);
            }
        } else if n >= self.config.nsteps {
            let Some(oldest) = buffer.transition(0) else {
                return Ok(());
            };
            let horizon = i32::try_from(n).unwrap_or(i32::MAX);
            let target = buffer.discounted_return(0, gamma)
                + gamma.powi(horizon) * self.bootstrap(newest.next_state, newest.next_action);
            self.apply(oldest.state, oldest.action, target);
        }
        Ok(())
    }

    fn action_row(&self, state: usize) -> ActionRow<'_> {
        ActionRow::new(self.q.column(state), self.visits.column(state))
    }

    fn metrics(&self) -> LearnerMetrics {
        self.metrics.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn config(traces: TraceKind, lambda: f64) -> TdConfig {
        TdConfig {
            num_states: 2,
            num_actions: 2,
            gamma: 0.9,
            alpha: 0.5,
            lambda,
            traces,
            ..TdConfig::default()
        }
    }

    /// Replays `(state, action, reward, done, next_state)` steps the way the
    /// learning loop does; the next action is always 0.
    fn replay(learner: &mut TdLearner, steps: &[(usize, usize, f64, bool, usize)]) {
        let mut buffer = Buffer::new(learner.buffer_spec());
        let (s0, a0, ..) = steps[0];
        buffer.push_state_action(s0, a0);
        for (i, &(_, _, r, done, s1)) in steps.iter().enumerate() {
            buffer.push_return(r, done);
            let next_action = steps.get(i + 1).map_or(0, |step| step.1);
            buffer.push_state_action(s1, next_action);
            learner.update(&buffer).unwrap();
        }
    }

    const GOLDEN: [(usize, usize, f64, bool, usize); 3] =
        [(0, 0, 1.0, true, 0), (0, 1, 0.0, false, 0), (0, 0, 1.0, true, 0)];

    #[test]
    fn golden_three_step_q_learning() {
        let mut learner = TdLearner::new(config(TraceKind::None, 0.0)).unwrap();
        replay(&mut learner, &GOLDEN);
        assert_relative_eq!(learner.q().get(0, 0), 0.75);
        assert_relative_eq!(learner.q().get(1, 0), 0.225);
        assert_eq!(learner.visits().get(0, 0), 2);
        assert_eq!(learner.metrics().updates, 3);
    }

    #[test]
    fn no_traces_equal_replacing_traces_without_decay() {
        let steps = [
            (0, 1, 0.0, false, 1),
            (1, 0, 0.5, false, 0),
            (0, 0, 1.0, false, 1),
            (1, 1, -1.0, true, 0),
            (0, 1, 0.0, false, 0),
            (0, 0, 2.0, true, 0),
        ];
        let mut plain = TdLearner::new(config(TraceKind::None, 0.0)).unwrap();
        let mut replacing = TdLearner::new(config(TraceKind::Replacing, 0.0)).unwrap();
        replay(&mut plain, &steps);
        replay(&mut replacing, &steps);
        assert_eq!(plain.q().values(), replacing.q().values());
    }

    #[test]
    fn unseen_successor_reads_unseen_value() {
        let mut learner = TdLearner::new(TdConfig {
            unseen_value: 10.0,
            init_value: -5.0,
            ..config(TraceKind::None, 0.0)
        })
        .unwrap();
        replay(&mut learner, &[(0, 1, 0.0, false, 1)]);
        // q0 = 10, target = 0 + 0.9 * 10, delta = -1
        assert_relative_eq!(learner.q().get(1, 0), 9.5);
        assert!(!learner.q().is_seen(0, 1));
        assert_eq!(learner.q().get(0, 1), -5.0);
    }

    #[test]
    fn sarsa_bootstraps_on_next_action() {
        let mut learner = TdLearner::new(TdConfig {
            method: TdMethod::Sarsa,
            ..config(TraceKind::None, 0.0)
        })
        .unwrap();
        // Q[1, 1] gets a value first, then SARSA bootstraps on action 0 in state 1.
        replay(&mut learner, &[(1, 1, 4.0, true, 0)]);
        replay(&mut learner, &[(0, 0, 0.0, false, 1)]);
        assert_relative_eq!(learner.q().get(0, 0), 0.0);

        let mut q_learner = TdLearner::new(config(TraceKind::None, 0.0)).unwrap();
        replay(&mut q_learner, &[(1, 1, 4.0, true, 0)]);
        replay(&mut q_learner, &[(0, 0, 0.0, false, 1)]);
        assert_relative_eq!(q_learner.q().get(0, 0), 0.5 * 0.9 * 2.0);
    }

    #[test]
    fn traces_spread_credit_backwards() {
        let mut learner = TdLearner::new(TdConfig {
            gamma: 1.0,
            alpha: 1.0,
            ..config(TraceKind::Accumulating, 0.5)
        })
        .unwrap();
        replay(&mut learner, &[(0, 0, 0.0, false, 1), (1, 1, 1.0, true, 0)]);
        // second delta is 1; the first pair still carries trace 0.5
        assert_relative_eq!(learner.q().get(1, 1), 1.0);
        assert_relative_eq!(learner.q().get(0, 0), 0.5);
    }

    #[test]
    fn nstep_waits_for_a_full_window() {
        let mut learner = TdLearner::new(TdConfig {
            nsteps: 2,
            alpha: 1.0,
            gamma: 0.5,
            ..config(TraceKind::None, 0.0)
        })
        .unwrap();
        let mut buffer = Buffer::new(learner.buffer_spec());
        buffer.push_state_action(0, 0);
        buffer.push_return(1.0, false);
        buffer.push_state_action(1, 0);
        learner.update(&buffer).unwrap();
        assert!(!learner.q().is_seen(0, 0));

        buffer.push_return(2.0, false);
        buffer.push_state_action(0, 1);
        learner.update(&buffer).unwrap();
        // 1 + 0.5 * 2 + 0.25 * max Q[., 0] (all unseen, 0)
        assert_relative_eq!(learner.q().get(0, 0), 2.0);
        assert!(!learner.q().is_seen(0, 1));

        buffer.push_return(4.0, true);
        buffer.push_state_action(0, 0);
        learner.update(&buffer).unwrap();
        // window now holds the transitions from state 1 and the terminal one
        assert_relative_eq!(learner.q().get(0, 1), 2.0 + 0.5 * 4.0);
        assert_relative_eq!(learner.q().get(1, 0), 4.0);
    }

    #[test]
    fn rejects_invalid_configuration() {
        assert!(TdLearner::new(TdConfig { nsteps: 0, ..TdConfig::default() }).is_err());
        assert!(TdLearner::new(TdConfig { lambda: -0.5, ..TdConfig::default() }).is_err());
        assert!(TdLearner::new(TdConfig { num_actions: 0, ..TdConfig::default() }).is_err());
        assert!(TdLearner::new(TdConfig {
            unseen_value: f64::INFINITY,
            ..TdConfig::default()
        })
        .is_err());
    }
}
