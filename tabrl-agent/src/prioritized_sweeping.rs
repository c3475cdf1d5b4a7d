//! Prioritized sweeping with small backups
//!
//! The planner keeps three value estimates:
//!
//! * `Q[a, s]`, always equal to `R̂[a, s] + γ Σ_{s1} (n(s, a → s1) / Nsa) · U[s1]`;
//! * `V[s] = max_a Q[a, s]` over the pairs that were ever taken;
//! * `U[s]`, the value of `s` that its predecessors' `Q` currently assume.
//!
//! A state whose `V` drifted away from its `U` has news for its predecessors
//! and is queued with priority `|V − U|`. A backup pops the most urgent
//! state, publishes `U ← V` and pushes the difference into every
//! predecessor's `Q` in proportion to the observed transition counts, which
//! may in turn queue those predecessors. At most `maxcount` backups run per
//! real transition, so the cost of a step does not depend on the number of
//! states.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use tabrl_core::error::{ensure_in_range, ensure_positive_count};
use tabrl_core::{
    ActionRow, Buffer, BufferSpec, Learner, LearnerMetrics, PriorityQueue, RLError, Result,
    TransitionModel, ValueTable,
};

/// Planner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepingConfig {
    /// Number of states
    pub num_states: usize,
    /// Number of actions
    pub num_actions: usize,
    /// Discount factor
    pub gamma: f64,
    /// Initial value of `Q`, `V` and `U`
    pub init_value: f64,
    /// Backups per real transition
    pub maxcount: usize,
    /// Priorities at or below this are not queued
    pub min_priority: f64,
}

impl Default for SweepingConfig {
    fn default() -> Self {
        Self {
            num_states: 10,
            num_actions: 4,
            gamma: 0.9,
            init_value: 0.0,
            maxcount: 3,
            min_priority: 1e-8,
        }
    }
}

/// Model-based learner with bounded prioritized backups
#[derive(Debug, Clone)]
pub struct PrioritizedSweeping {
    config: SweepingConfig,
    q: ValueTable,
    v: Array1<f64>,
    u: Array1<f64>,
    model: TransitionModel,
    queue: PriorityQueue,
    backups: u64,
    metrics: LearnerMetrics,
}

impl PrioritizedSweeping {
    /// Create a new planner
    pub fn new(config: SweepingConfig) -> Result<Self> {
        ensure_in_range("gamma", config.gamma, 0.0, 1.0)?;
        ensure_positive_count("maxcount", config.maxcount)?;
        let q = ValueTable::new(config.num_states, config.num_actions, config.init_value)?;
        let model = TransitionModel::new(config.num_states, config.num_actions)?;
        let queue = PriorityQueue::new(config.num_states, config.min_priority)?;
        debug!(
            num_states = config.num_states,
            maxcount = config.maxcount,
            "created prioritized sweeping planner"
        );
        Ok(Self {
            v: Array1::from_elem(config.num_states, config.init_value),
            u: Array1::from_elem(config.num_states, config.init_value),
            q,
            model,
            queue,
            backups: 0,
            metrics: LearnerMetrics::default(),
            config,
        })
    }

    /// Action values
    #[must_use]
    pub fn q(&self) -> &ValueTable {
        &self.q
    }

    /// State values `V`
    #[must_use]
    pub fn values(&self) -> &Array1<f64> {
        &self.v
    }

    /// State values already propagated to predecessors
    #[must_use]
    pub fn propagated_values(&self) -> &Array1<f64> {
        &self.u
    }

    /// Learned model
    #[must_use]
    pub fn model(&self) -> &TransitionModel {
        &self.model
    }

    /// Pending states
    #[must_use]
    pub fn queue(&self) -> &PriorityQueue {
        &self.queue
    }

    /// Backups performed so far
    #[must_use]
    pub fn backups(&self) -> u64 {
        self.backups
    }

    /// Learn from one real transition and run up to `maxcount` backups.
    ///
    /// `next_state` is `None` if the transition ended the episode.
    pub fn observe(
        &mut self,
        state: usize,
        action: usize,
        reward: f64,
        next_state: Option<usize>,
    ) -> Result<()> {
        let (ns, na) = (self.config.num_states, self.config.num_actions);
        if state >= ns || next_state.is_some_and(|s1| s1 >= ns) {
            return Err(RLError::InvalidState(format!(
                "transition {state} -> {next_state:?} outside 0..{ns}"
            )));
        }
        if action >= na {
            return Err(RLError::InvalidAction(format!("action {action} outside 0..{na}")));
        }

        let n = self.model.observe(state, action, reward, next_state);
        let target = reward + next_state.map_or(0.0, |s1| self.config.gamma * self.u[s1]);
        if self.q.is_seen(action, state) {
            let q = self.q.get(action, state);
            self.q.add(action, state, (target - q) / n as f64);
        } else {
            self.q.set(action, state, target);
        }
        self.refresh(state);

        let done = self.process_queue(self.config.maxcount);
        trace!(state, action, backups = done, queued = self.queue.len(), "sweep round");
        self.metrics.updates += 1;
        self.metrics.last_error = Some(target - self.u[state]);
        Ok(())
    }

    /// Pop and back up queued states until the queue is empty or `budget`
    /// backups ran. Returns the number of backups.
    pub fn process_queue(&mut self, budget: usize) -> usize {
        let mut done = 0;
        while done < budget {
            let Some((state, _)) = self.queue.pop() else {
                break;
            };
            self.backup(state);
            done += 1;
        }
        self.backups += done as u64;
        metrics::counter!("tabrl_planner_backups", done as u64);
        done
    }

    fn backup(&mut self, state: usize) {
        let delta = self.v[state] - self.u[state];
        self.u[state] = self.v[state];
        let gamma = self.config.gamma;
        for (&(ap, sp), &n) in self.model.predecessors(state) {
            let nsa = self.model.count(ap, sp);
            debug_assert!(nsa > 0 && self.q.is_seen(ap, sp), "backup of an unvisited pair");
            self.q.add(ap, sp, gamma * delta * n as f64 / nsa as f64);
            if let Some(v) = self.q.max_seen(sp) {
                self.v[sp] = v;
            }
            self.queue.push(sp, (self.v[sp] - self.u[sp]).abs());
        }
    }

    /// Recompute `V[state]` and queue the state if it changed enough.
    fn refresh(&mut self, state: usize) {
        if let Some(v) = self.q.max_seen(state) {
            self.v[state] = v;
        }
        self.queue.push(state, (self.v[state] - self.u[state]).abs());
    }
}

impl Learner for PrioritizedSweeping {
    fn num_states(&self) -> usize {
        self.config.num_states
    }

    fn num_actions(&self) -> usize {
        self.config.num_actions
    }

    fn buffer_spec(&self) -> BufferSpec {
        BufferSpec { capacity: Some(1) }
    }

    fn update(&mut self, buffer: &Buffer) -> Result<()> {
        match buffer.last() {
            Some(t) => {
                let next = (!t.done).then_some(t.next_state);
                self.observe(t.state, t.action, t.reward, next)
            }
            None => Ok(()),
        }
    }

    fn action_row(&self, state: usize) -> ActionRow<'_> {
        ActionRow::new(self.q.column(state), self.model.count_column(state))
    }

    fn metrics(&self) -> LearnerMetrics {
        self.metrics.clone().with("backups", self.backups)
    }
}
