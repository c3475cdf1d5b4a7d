//! Fully specified tabular Markov decision processes
//!
//! Taking action `a` in state `s` yields reward `r(a, s)` and moves to a
//! successor drawn from `P(· | s, a)`. Reaching a terminal state ends the
//! episode; terminal states have no outgoing transitions and value zero.
//!
//! Accessors take `(action, state)`, the layout of the reward table.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::RLError;

/// Sparse successor distribution: `(next_state, probability)` pairs
pub type Distribution = Vec<(usize, f64)>;

const PROBABILITY_TOLERANCE: f64 = 1e-9;

/// Tabular MDP with known dynamics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mdp {
    num_states: usize,
    num_actions: usize,
    transitions: Vec<Distribution>,
    reward: Array2<f64>,
    terminal: Vec<bool>,
    initial_states: Vec<usize>,
}

impl Mdp {
    /// Build an MDP from per-pair successor distributions.
    ///
    /// `transitions[a * num_states + s]` is the distribution of `(a, s)`;
    /// `reward` is `num_actions × num_states`. Distributions of terminal
    /// states are ignored and cleared.
    pub fn new(
        mut transitions: Vec<Distribution>,
        reward: Array2<f64>,
        terminal: Vec<bool>,
        initial_states: Vec<usize>,
    ) -> crate::Result<Self> {
        let (num_actions, num_states) = reward.dim();
        if num_actions == 0 || num_states == 0 {
            return Err(RLError::config("MDP needs at least one state and one action"));
        }
        if transitions.len() != num_actions * num_states {
            return Err(RLError::DimensionMismatch {
                expected: num_actions * num_states,
                actual: transitions.len(),
            });
        }
        if terminal.len() != num_states {
            return Err(RLError::DimensionMismatch {
                expected: num_states,
                actual: terminal.len(),
            });
        }
        if initial_states.is_empty() {
            return Err(RLError::config("MDP needs at least one initial state"));
        }
        if let Some(&s) = initial_states
            .iter()
            .find(|&&s| s >= num_states || terminal[s])
        {
            return Err(RLError::InvalidState(format!(
                "initial state {s} is out of range or terminal"
            )));
        }
        if reward.iter().any(|r| !r.is_finite()) {
            return Err(RLError::config("MDP rewards must be finite"));
        }

        for (index, dist) in transitions.iter_mut().enumerate() {
            let (a, s) = (index / num_states, index % num_states);
            if terminal[s] {
                dist.clear();
                continue;
            }
            let mut total = 0.0;
            for &(next, p) in dist.iter() {
                if next >= num_states {
                    return Err(RLError::InvalidState(format!(
                        "successor {next} of (action {a}, state {s}) is out of range"
                    )));
                }
                if !(p.is_finite() && p >= 0.0) {
                    return Err(RLError::config(format!(
                        "invalid probability {p} for (action {a}, state {s})"
                    )));
                }
                total += p;
            }
            if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
                return Err(RLError::config(format!(
                    "probabilities of (action {a}, state {s}) sum to {total}, not 1"
                )));
            }
        }

        Ok(Self {
            num_states,
            num_actions,
            transitions,
            reward,
            terminal,
            initial_states,
        })
    }

    /// Build a deterministic MDP: `next[[a, s]]` is the unique successor.
    pub fn deterministic(
        next: &Array2<usize>,
        reward: Array2<f64>,
        terminal: Vec<bool>,
        initial_states: Vec<usize>,
    ) -> crate::Result<Self> {
        if next.dim() != reward.dim() {
            return Err(RLError::DimensionMismatch {
                expected: reward.len(),
                actual: next.len(),
            });
        }
        let transitions = next
            .outer_iter()
            .flat_map(|row| row.iter().map(|&s1| vec![(s1, 1.0)]).collect::<Vec<_>>())
            .collect();
        Self::new(transitions, reward, terminal, initial_states)
    }

    /// Number of states
    #[must_use]
    pub fn num_states(&self) -> usize {
        self.num_states
    }

    /// Number of actions
    #[must_use]
    pub fn num_actions(&self) -> usize {
        self.num_actions
    }

    /// Successor distribution of `action` in `state` (empty for terminal states)
    #[must_use]
    pub fn transition(&self, action: usize, state: usize) -> &Distribution {
        &self.transitions[action * self.num_states + state]
    }

    /// Reward for taking `action` in `state`
    #[must_use]
    pub fn reward(&self, action: usize, state: usize) -> f64 {
        self.reward[[action, state]]
    }

    /// Whether `state` ends the episode
    #[must_use]
    pub fn is_terminal(&self, state: usize) -> bool {
        self.terminal[state]
    }

    /// States an episode may start from
    #[must_use]
    pub fn initial_states(&self) -> &[usize] {
        &self.initial_states
    }

    /// One-step lookahead `r(a, s) + γ Σ P(s1|s,a) V(s1)`.
    #[must_use]
    pub fn backup(&self, action: usize, state: usize, gamma: f64, values: &[f64]) -> f64 {
        let expected: f64 = self
            .transition(action, state)
            .iter()
            .map(|&(s1, p)| p * values[s1])
            .sum();
        self.reward(action, state) + gamma * expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_state() -> Mdp {
        Mdp::deterministic(
            &array![[1, 0], [0, 1]],
            array![[1.0, 0.0], [0.0, 0.0]],
            vec![false, true],
            vec![0],
        )
        .unwrap()
    }

    #[test]
    fn deterministic_layout() {
        let mdp = two_state();
        assert_eq!(mdp.transition(0, 0), &vec![(1, 1.0)]);
        assert_eq!(mdp.transition(1, 0), &vec![(0, 1.0)]);
        assert!(mdp.transition(0, 1).is_empty());
        assert_eq!(mdp.reward(0, 0), 1.0);
        assert_eq!(mdp.reward(1, 0), 0.0);
        assert!(mdp.is_terminal(1));
    }

    #[test]
    fn backup_uses_successor_values() {
        let mdp = two_state();
        assert_eq!(mdp.backup(1, 0, 0.5, &[2.0, 0.0]), 1.0);
        assert_eq!(mdp.backup(0, 0, 0.5, &[2.0, 0.0]), 1.0);
    }

    #[test]
    fn rejects_unnormalized_distribution() {
        let err = Mdp::new(
            vec![vec![(0, 0.5)], vec![]],
            array![[0.0, 0.0]],
            vec![false, true],
            vec![0],
        )
        .unwrap_err();
        assert!(matches!(err, RLError::Config(_)));
    }

    #[test]
    fn rejects_terminal_initial_state() {
        let err = Mdp::deterministic(
            &array![[1, 0]],
            array![[0.0, 0.0]],
            vec![false, true],
            vec![1],
        )
        .unwrap_err();
        assert!(matches!(err, RLError::InvalidState(_)));
    }
}
