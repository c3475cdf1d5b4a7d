//! Environment wrappers for common transformations

use tabrl_core::{Environment, RLError, Result, Reward, Step};

/// Wrapper that modifies rewards
pub struct RewardWrapper<E, F> {
    /// Inner environment
    pub env: E,
    /// Reward transformation function
    pub reward_fn: F,
}

impl<E, F> RewardWrapper<E, F>
where
    E: Environment,
    F: Fn(Reward, &Step) -> Reward,
{
    /// Create a new reward wrapper
    pub fn new(env: E, reward_fn: F) -> Self {
        Self { env, reward_fn }
    }
}

impl<E, F> Environment for RewardWrapper<E, F>
where
    E: Environment,
    F: Fn(Reward, &Step) -> Reward,
{
    fn num_states(&self) -> usize {
        self.env.num_states()
    }

    fn num_actions(&self) -> usize {
        self.env.num_actions()
    }

    fn interact(&mut self, action: usize) -> Result<Step> {
        let mut step = self.env.interact(action)?;
        step.reward = (self.reward_fn)(step.reward, &step);
        Ok(step)
    }

    fn reset(&mut self) -> Result<()> {
        self.env.reset()
    }

    fn state(&self) -> (usize, bool) {
        self.env.state()
    }
}

/// Time limit wrapper
///
/// Ends the episode after `max_steps` steps by marking the step both done
/// and truncated.
pub struct TimeLimit<E> {
    /// Inner environment
    pub env: E,
    /// Maximum steps
    pub max_steps: usize,
    /// Current step count
    pub steps: usize,
    truncated: bool,
}

impl<E> TimeLimit<E> {
    /// Create a new time limit wrapper
    pub fn new(env: E, max_steps: usize) -> Result<Self> {
        if max_steps == 0 {
            return Err(RLError::config("time limit must allow at least one step"));
        }
        Ok(Self {
            env,
            max_steps,
            steps: 0,
            truncated: false,
        })
    }
}

impl<E: Environment> Environment for TimeLimit<E> {
    fn num_states(&self) -> usize {
        self.env.num_states()
    }

    fn num_actions(&self) -> usize {
        self.env.num_actions()
    }

    fn interact(&mut self, action: usize) -> Result<Step> {
        if self.truncated {
            return Err(RLError::Environment("time limit reached; reset first".into()));
        }
        self.steps += 1;
        let mut step = self.env.interact(action)?;

        if self.steps >= self.max_steps && !step.done {
            step.truncated = true;
            step.done = true;
            self.truncated = true;
        }

        Ok(step)
    }

    fn reset(&mut self) -> Result<()> {
        self.steps = 0;
        self.truncated = false;
        self.env.reset()
    }

    fn state(&self) -> (usize, bool) {
        let (state, done) = self.env.state();
        (state, done || self.truncated)
    }
}
