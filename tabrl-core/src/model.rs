//! Learned transition model for model-based planning
//!
//! The model never stores successor distributions per (state, action).
//! Instead it keeps the reverse index `s1 → {(a0, s0) → n}`: how often taking
//! `a0` in `s0` led to `s1`. Together with the pair counts `Nsa` this is all a
//! backward-propagating planner needs. States are plain indices, so cycles in
//! the reverse graph carry no ownership.

use indexmap::IndexMap;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::RLError;

/// Predecessors of one state: `(action, state) → observed transition count`
pub type Predecessors = IndexMap<(usize, usize), u64>;

/// Incrementally learned model of an MDP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionModel {
    counts: Array2<u64>,
    rewards: Array2<f64>,
    predecessors: Vec<Predecessors>,
}

impl TransitionModel {
    /// Empty model over `num_states` states and `num_actions` actions
    pub fn new(num_states: usize, num_actions: usize) -> crate::Result<Self> {
        if num_actions == 0 || num_states == 0 {
            return Err(RLError::config("transition model needs at least one state and one action"));
        }
        Ok(Self {
            counts: Array2::zeros((num_actions, num_states)),
            rewards: Array2::zeros((num_actions, num_states)),
            predecessors: vec![Predecessors::new(); num_states],
        })
    }

    /// Record a real transition. `next_state` is `None` when the transition
    /// ended the episode; such transitions update counts and rewards but
    /// register no predecessor. Returns the new `Nsa` of the pair.
    pub fn observe(
        &mut self,
        state: usize,
        action: usize,
        reward: f64,
        next_state: Option<usize>,
    ) -> u64 {
        let n = {
            let count = &mut self.counts[[action, state]];
            *count += 1;
            *count
        };
        let mean = &mut self.rewards[[action, state]];
        *mean += (reward - *mean) / n as f64;
        if let Some(s1) = next_state {
            *self.predecessors[s1].entry((action, state)).or_insert(0) += 1;
        }
        n
    }

    /// How often `action` was taken in `state`
    #[must_use]
    pub fn count(&self, action: usize, state: usize) -> u64 {
        self.counts[[action, state]]
    }

    /// Counts of every action in `state`
    #[must_use]
    pub fn count_column(&self, state: usize) -> ArrayView1<'_, u64> {
        self.counts.column(state)
    }

    /// Mean observed reward of `(action, state)`; zero if never taken
    #[must_use]
    pub fn reward(&self, action: usize, state: usize) -> f64 {
        self.rewards[[action, state]]
    }

    /// Predecessors of `state` with their observed transition counts
    #[must_use]
    pub fn predecessors(&self, state: usize) -> &Predecessors {
        &self.predecessors[state]
    }

    /// Estimated probability that `action` in `state` leads to `next_state`.
    #[must_use]
    pub fn probability(&self, action: usize, state: usize, next_state: usize) -> f64 {
        let n = self.counts[[action, state]];
        if n == 0 {
            return 0.0;
        }
        let hits = self.predecessors[next_state]
            .get(&(action, state))
            .copied()
            .unwrap_or(0);
        hits as f64 / n as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn observe_tracks_counts_rewards_and_predecessors() {
        let mut model = TransitionModel::new(3, 2).unwrap();
        assert_eq!(model.observe(0, 1, 1.0, Some(2)), 1);
        assert_eq!(model.observe(0, 1, 3.0, Some(1)), 2);
        assert_eq!(model.observe(0, 1, 2.0, Some(2)), 3);

        assert_eq!(model.count(1, 0), 3);
        assert_relative_eq!(model.reward(1, 0), 2.0);
        assert_eq!(model.predecessors(2).get(&(1, 0)), Some(&2));
        assert_eq!(model.predecessors(1).get(&(1, 0)), Some(&1));
        assert_relative_eq!(model.probability(1, 0, 2), 2.0 / 3.0);
        assert_eq!(model.probability(0, 0, 2), 0.0);
    }

    #[test]
    fn terminal_transitions_register_no_predecessor() {
        let mut model = TransitionModel::new(2, 1).unwrap();
        model.observe(0, 0, 5.0, None);
        assert!(model.predecessors(0).is_empty());
        assert!(model.predecessors(1).is_empty());
        assert_eq!(model.count(0, 0), 1);
        assert_eq!(model.probability(0, 1, 0), 0.0);
    }
}
