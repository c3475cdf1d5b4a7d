//! Environment contract and episode bookkeeping

use serde::{Deserialize, Serialize};

use crate::Reward;

/// Result of a single environment step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// State reached
    pub state: usize,
    /// Reward signal
    pub reward: Reward,
    /// Whether the episode is done
    pub done: bool,
    /// Whether the episode was cut short (e.g., time limit) rather than
    /// reaching a terminal state. Implies `done`.
    pub truncated: bool,
}

impl Step {
    /// Step that keeps the episode running
    #[must_use]
    pub fn running(state: usize, reward: f64) -> Self {
        Self {
            state,
            reward: Reward(reward),
            done: false,
            truncated: false,
        }
    }

    /// Step that enters a terminal state
    #[must_use]
    pub fn terminal(state: usize, reward: f64) -> Self {
        Self {
            state,
            reward: Reward(reward),
            done: true,
            truncated: false,
        }
    }
}

/// Episode information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    /// Episode ID
    pub id: String,
    /// Total reward
    pub total_reward: f64,
    /// Number of steps
    pub steps: usize,
    /// Whether episode was truncated
    pub truncated: bool,
    /// Start time
    pub start_time: chrono::DateTime<chrono::Utc>,
    /// End time
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl Episode {
    /// Start a fresh episode record
    #[must_use]
    pub fn start() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            total_reward: 0.0,
            steps: 0,
            truncated: false,
            start_time: chrono::Utc::now(),
            end_time: None,
        }
    }

    /// Whether the episode has ended
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }
}

/// Discrete environment driven by the learning loop.
///
/// States and actions are indices in `0..num_states()` and
/// `0..num_actions()`.
pub trait Environment {
    /// Number of states
    fn num_states(&self) -> usize;

    /// Number of actions
    fn num_actions(&self) -> usize;

    /// Take `action` in the current state
    fn interact(&mut self, action: usize) -> crate::Result<Step>;

    /// Start a new episode
    fn reset(&mut self) -> crate::Result<()>;

    /// Current state and whether the episode is over
    fn state(&self) -> (usize, bool);
}

impl<E: Environment + ?Sized> Environment for Box<E> {
    fn num_states(&self) -> usize {
        (**self).num_states()
    }

    fn num_actions(&self) -> usize {
        (**self).num_actions()
    }

    fn interact(&mut self, action: usize) -> crate::Result<Step> {
        (**self).interact(action)
    }

    fn reset(&mut self) -> crate::Result<()> {
        (**self).reset()
    }

    fn state(&self) -> (usize, bool) {
        (**self).state()
    }
}

/// Wrapper for environments that tracks episodes
///
/// Episodes that ended without a single step (a reset straight after a
/// reset) are not recorded.
#[derive(Debug, Clone)]
pub struct TrackedEnvironment<E> {
    /// Inner environment
    pub env: E,
    /// Current episode
    pub episode: Option<Episode>,
    /// Finished episodes, oldest first
    pub history: Vec<Episode>,
    history_limit: Option<usize>,
}

impl<E> TrackedEnvironment<E> {
    /// Create a new tracked environment.
    ///
    /// The history keeps every finished episode; use
    /// [`TrackedEnvironment::with_history_limit`] for long runs.
    pub fn new(env: E) -> Self {
        Self {
            env,
            episode: None,
            history: Vec::new(),
            history_limit: None,
        }
    }

    /// Keep only the `limit` most recent episodes in the history
    pub fn with_history_limit(env: E, limit: usize) -> crate::Result<Self> {
        crate::error::ensure_positive_count("history limit", limit)?;
        Ok(Self {
            history_limit: Some(limit),
            ..Self::new(env)
        })
    }

    /// Get current episode info
    #[must_use]
    pub fn episode_info(&self) -> Option<&Episode> {
        self.episode.as_ref()
    }

    /// Finished episodes, oldest first
    #[must_use]
    pub fn history(&self) -> &[Episode] {
        &self.history
    }

    fn finish_episode(&mut self) {
        if let Some(mut episode) = self.episode.take() {
            if episode.steps == 0 {
                return;
            }
            if episode.end_time.is_none() {
                episode.end_time = Some(chrono::Utc::now());
            }
            tracing::debug!(
                id = %episode.id,
                steps = episode.steps,
                total_reward = episode.total_reward,
                truncated = episode.truncated,
                "episode finished"
            );
            self.history.push(episode);
            if let Some(limit) = self.history_limit {
                let excess = self.history.len().saturating_sub(limit);
                self.history.drain(..excess);
            }
        }
    }
}

impl<E: Environment> Environment for TrackedEnvironment<E> {
    fn num_states(&self) -> usize {
        self.env.num_states()
    }

    fn num_actions(&self) -> usize {
        self.env.num_actions()
    }

    fn interact(&mut self, action: usize) -> crate::Result<Step> {
        let step = self.env.interact(action)?;
        let episode = self.episode.get_or_insert_with(Episode::start);
        episode.total_reward += step.reward.value();
        episode.steps += 1;
        if step.done {
            episode.truncated = step.truncated;
            episode.end_time = Some(chrono::Utc::now());
        }
        Ok(step)
    }

    fn reset(&mut self) -> crate::Result<()> {
        self.finish_episode();
        self.episode = Some(Episode::start());
        self.env.reset()
    }

    fn state(&self) -> (usize, bool) {
        self.env.state()
    }
}
