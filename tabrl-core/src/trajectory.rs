//! Transition buffer shared by the learning loop and the learners

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::RLError;

/// How many transitions a learner needs to see at once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BufferSpec {
    /// Maximum number of stored transitions; `None` keeps the whole episode
    pub capacity: Option<usize>,
}

impl BufferSpec {
    /// Keep the current episode
    #[must_use]
    pub fn episode() -> Self {
        Self { capacity: None }
    }

    /// Keep the last `n` transitions
    pub fn window(n: usize) -> crate::Result<Self> {
        if n == 0 {
            return Err(RLError::config("buffer capacity must be at least 1"));
        }
        Ok(Self { capacity: Some(n) })
    }
}

/// Single transition read from a [`Buffer`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// State the action was taken in
    pub state: usize,
    /// Action taken
    pub action: usize,
    /// Reward received
    pub reward: f64,
    /// Whether the transition ended the episode
    pub done: bool,
    /// State the next action was chosen in. After a terminal transition this
    /// is the first state of the following episode.
    pub next_state: usize,
    /// Action chosen in `next_state`
    pub next_action: usize,
}

/// Sliding record of states, actions, rewards and episode ends.
///
/// The driver pushes a state/action pair, interacts, pushes the return, then
/// pushes the next state/action pair. Once that second pair is in, the
/// newest transition is complete. A buffer never straddles an episode
/// boundary: the first return pushed after a terminal transition drops
/// everything except the latest state/action pair.
#[derive(Debug, Clone)]
pub struct Buffer {
    spec: BufferSpec,
    states: VecDeque<usize>,
    actions: VecDeque<usize>,
    rewards: VecDeque<f64>,
    dones: VecDeque<bool>,
}

impl Buffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new(spec: BufferSpec) -> Self {
        let cap = spec.capacity.map_or(0, |n| n + 1);
        Self {
            spec,
            states: VecDeque::with_capacity(cap),
            actions: VecDeque::with_capacity(cap),
            rewards: VecDeque::with_capacity(cap),
            dones: VecDeque::with_capacity(cap),
        }
    }

    /// Capacity settings
    #[must_use]
    pub fn spec(&self) -> BufferSpec {
        self.spec
    }

    /// Record the state the agent is in and the action it chose there.
    pub fn push_state_action(&mut self, state: usize, action: usize) {
        self.states.push_back(state);
        self.actions.push_back(action);
    }

    /// Record the outcome of the last action.
    pub fn push_return(&mut self, reward: f64, done: bool) {
        if self.dones.back().copied().unwrap_or(false) {
            self.keep_last_pair();
        }
        self.rewards.push_back(reward);
        self.dones.push_back(done);
        if let Some(capacity) = self.spec.capacity {
            while self.rewards.len() > capacity {
                self.rewards.pop_front();
                self.dones.pop_front();
                self.states.pop_front();
                self.actions.pop_front();
            }
        }
    }

    fn keep_last_pair(&mut self) {
        let keep = self.states.len().saturating_sub(1);
        self.states.drain(..keep);
        self.actions.drain(..keep);
        self.rewards.clear();
        self.dones.clear();
    }

    /// Number of complete transitions
    #[must_use]
    pub fn len(&self) -> usize {
        self.rewards.len().min(self.states.len().saturating_sub(1))
    }

    /// True if no transition is complete
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if the buffer holds as many transitions as its capacity allows
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.spec.capacity.is_some_and(|n| self.len() >= n)
    }

    /// Transition `i`, oldest first
    #[must_use]
    pub fn transition(&self, i: usize) -> Option<Transition> {
        if i >= self.len() {
            return None;
        }
        Some(Transition {
            state: self.states[i],
            action: self.actions[i],
            reward: self.rewards[i],
            done: self.dones[i],
            next_state: self.states[i + 1],
            next_action: self.actions[i + 1],
        })
    }

    /// Newest complete transition
    #[must_use]
    pub fn last(&self) -> Option<Transition> {
        self.len().checked_sub(1).and_then(|i| self.transition(i))
    }

    /// All complete transitions, oldest first
    pub fn transitions(&self) -> impl Iterator<Item = Transition> + '_ {
        (0..self.len()).filter_map(move |i| self.transition(i))
    }

    /// `Σ_k γ^k r_{from+k}` over the stored rewards starting at `from`.
    #[must_use]
    pub fn discounted_return(&self, from: usize, gamma: f64) -> f64 {
        self.rewards
            .iter()
            .take(self.len())
            .skip(from)
            .rev()
            .fold(0.0, |g, &r| r + gamma * g)
    }

    /// Discounted return from every stored transition to the newest one
    #[must_use]
    pub fn discounted_returns(&self, gamma: f64) -> Vec<f64> {
        let mut returns = vec![0.0; self.len()];
        let mut running = 0.0;
        for i in (0..self.len()).rev() {
            running = self.rewards[i] + gamma * running;
            returns[i] = running;
        }
        returns
    }

    /// Sum of stored rewards
    #[must_use]
    pub fn total_reward(&self) -> f64 {
        self.rewards.iter().sum()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.states.clear();
        self.actions.clear();
        self.rewards.clear();
        self.dones.clear();
    }
}
