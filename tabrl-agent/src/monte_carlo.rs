//! Every-visit Monte Carlo control

use serde::{Deserialize, Serialize};
use tracing::trace;

use tabrl_core::error::ensure_in_range;
use tabrl_core::{
    ActionRow, Buffer, BufferSpec, Learner, LearnerMetrics, Result, ValueTable, VisitCounts,
};

/// Monte Carlo configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    /// Number of states
    pub num_states: usize,
    /// Number of actions
    pub num_actions: usize,
    /// Discount factor
    pub gamma: f64,
    /// Initial table value
    pub init_value: f64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            num_states: 10,
            num_actions: 4,
            gamma: 0.9,
            init_value: 0.0,
        }
    }
}

/// Averages complete-episode returns into action values.
///
/// Nothing is learned until an episode ends; then every stored pair moves
/// to the running mean of the returns observed from it.
#[derive(Debug, Clone)]
pub struct MonteCarlo {
    config: MonteCarloConfig,
    q: ValueTable,
    returns_seen: VisitCounts,
    visits: VisitCounts,
    metrics: LearnerMetrics,
}

impl MonteCarlo {
    /// Create a new learner
    pub fn new(config: MonteCarloConfig) -> Result<Self> {
        ensure_in_range("gamma", config.gamma, 0.0, 1.0)?;
        Ok(Self {
            q: ValueTable::new(config.num_states, config.num_actions, config.init_value)?,
            returns_seen: VisitCounts::new(config.num_states, config.num_actions)?,
            visits: VisitCounts::new(config.num_states, config.num_actions)?,
            metrics: LearnerMetrics::default(),
            config,
        })
    }

    /// Action values
    #[must_use]
    pub fn q(&self) -> &ValueTable {
        &self.q
    }

    /// Number of returns averaged into `(action, state)`
    #[must_use]
    pub fn returns_seen(&self, action: usize, state: usize) -> u64 {
        self.returns_seen.get(action, state)
    }
}

impl Learner for MonteCarlo {
    fn num_states(&self) -> usize {
        self.config.num_states
    }

    fn num_actions(&self) -> usize {
        self.config.num_actions
    }

    fn buffer_spec(&self) -> BufferSpec {
        BufferSpec::episode()
    }

    fn update(&mut self, buffer: &Buffer) -> Result<()> {
        let Some(newest) = buffer.last() else {
            return Ok(());
        };
        self.visits.record(newest.action, newest.state);
        if !newest.done {
            return Ok(());
        }

        let returns = buffer.discounted_returns(self.config.gamma);
        for (t, g) in buffer.transitions().zip(returns) {
            let n = self.returns_seen.record(t.action, t.state);
            let q = self.q.get(t.action, t.state);
            self.q.add(t.action, t.state, (g - q) / n as f64);
        }
        self.metrics.updates += 1;
        self.metrics.last_error = None;
        trace!(length = buffer.len(), "averaged episode returns");
        Ok(())
    }

    fn action_row(&self, state: usize) -> ActionRow<'_> {
        ActionRow::new(self.q.column(state), self.visits.column(state))
    }

    fn metrics(&self) -> LearnerMetrics {
        self.metrics.clone()
    }
}
