//! The learning loop
//!
//! An [`RlSetup`] owns a learner, an environment, the exploration policy,
//! the transition buffer, a stopping criterion, callbacks and the random
//! number generator. [`learn`] runs the loop with learner updates;
//! [`run`] runs the same loop without touching the learner or the buffer.
//!
//! Each step the driver interacts with the environment, records the
//! return, resets the environment if the episode ended, chooses the next
//! action, lets the learner update, invokes the callbacks and finally asks
//! the stopping criterion whether to continue.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use tabrl_core::{Buffer, Environment, Learner, Policy, PolicyConfig, RLError, Result};

use crate::callbacks::{Callback, CallbackContext, Evaluation, Signal};
use crate::stopping::StoppingCriterion;

/// What happened in one step, as seen by callbacks, metrics and stopping
/// criteria
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// State the action was taken in
    pub state: usize,
    /// Action taken
    pub action: usize,
    /// Reward received
    pub reward: f64,
    /// Whether the episode ended
    pub done: bool,
    /// State the environment moved to, before any reset
    pub next_state: usize,
    /// Steps taken so far, including this one
    pub step: u64,
    /// Episodes finished so far, including one ended by this step
    pub episode: u64,
}

/// Phase of the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoopState {
    /// Acting and, in [`learn`], updating
    #[default]
    Running,
    /// Measuring a policy for a callback; no learning
    LeftForEvaluation,
    /// The stopping criterion fired
    Stopped,
}

/// Driver configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupConfig {
    /// Seed of the driver's random number generator; entropy if absent
    pub seed: Option<u64>,
    /// Exploration policy
    pub policy: PolicyConfig,
}

/// Learner, environment and everything needed to run them together
pub struct RlSetup<L, E> {
    learner: L,
    env: E,
    policy: Policy,
    buffer: Buffer,
    stop: Box<dyn StoppingCriterion>,
    callbacks: Vec<Box<dyn Callback>>,
    rng: StdRng,
    steps: u64,
    episodes: u64,
    state: LoopState,
}

impl<L: Learner, E: Environment> RlSetup<L, E> {
    /// Combine `learner` and `env`, which must agree on the number of
    /// states and actions.
    pub fn new(
        learner: L,
        env: E,
        stop: impl StoppingCriterion + 'static,
        config: SetupConfig,
    ) -> Result<Self> {
        check_dimension(env.num_states(), learner.num_states())?;
        check_dimension(env.num_actions(), learner.num_actions())?;
        let policy = Policy::from_config(&config.policy, learner.num_actions())?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        debug!(
            num_states = learner.num_states(),
            num_actions = learner.num_actions(),
            seed = ?config.seed,
            "created setup"
        );
        Ok(Self {
            buffer: Buffer::new(learner.buffer_spec()),
            learner,
            env,
            policy,
            stop: Box::new(stop),
            callbacks: Vec::new(),
            rng,
            steps: 0,
            episodes: 0,
            state: LoopState::Running,
        })
    }

    /// Replace the exploration policy
    pub fn with_policy(mut self, policy: Policy) -> Result<Self> {
        check_dimension(self.learner.num_actions(), policy.num_actions())?;
        self.policy = policy;
        Ok(self)
    }

    /// Add a callback
    #[must_use]
    pub fn with_callback(mut self, callback: impl Callback) -> Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    /// Replace the stopping criterion, e.g. to continue a finished run
    pub fn set_stopping_criterion(&mut self, stop: impl StoppingCriterion + 'static) {
        self.stop = Box::new(stop);
    }

    /// The learner
    #[must_use]
    pub fn learner(&self) -> &L {
        &self.learner
    }

    /// Mutable access to the learner
    pub fn learner_mut(&mut self) -> &mut L {
        &mut self.learner
    }

    /// The environment
    #[must_use]
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Exploration policy
    #[must_use]
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Transition buffer
    #[must_use]
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Steps taken over all runs
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Episodes finished over all runs
    #[must_use]
    pub fn episodes(&self) -> u64 {
        self.episodes
    }

    /// Current phase
    #[must_use]
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// First callback of type `C`
    #[must_use]
    pub fn callback<C: Callback>(&self) -> Option<&C> {
        self.callbacks
            .iter()
            .find_map(|cb| cb.as_any().downcast_ref::<C>())
    }

    /// Into learner and environment
    pub fn into_parts(self) -> (L, E) {
        (self.learner, self.env)
    }

    fn select(&mut self, state: usize) -> Result<usize> {
        self.policy
            .select(self.learner.action_row(state), &mut self.rng)
    }

    /// Reset the environment and choose the first action of a new episode.
    fn start_episode(&mut self, fill_buffer: bool) -> Result<(usize, usize)> {
        self.env.reset()?;
        let (state, _) = self.env.state();
        let action = self.select(state)?;
        if fill_buffer {
            self.buffer.push_state_action(state, action);
        }
        Ok((state, action))
    }

    fn execute(&mut self, learning: bool) -> Result<()> {
        info!(
            learning,
            steps = self.steps,
            episodes = self.episodes,
            "starting loop"
        );
        self.stop.reset();
        self.state = LoopState::Running;
        self.buffer.clear();
        let (mut state, mut action) = self.start_episode(learning)?;

        loop {
            let step = self.env.interact(action)?;
            let reward = step.reward.value();
            self.steps += 1;
            metrics::increment_counter!("tabrl_env_steps");
            if learning {
                self.buffer.push_return(reward, step.done);
            }

            let mut next_state = step.state;
            if step.done {
                self.episodes += 1;
                metrics::increment_counter!("tabrl_episodes");
                debug!(
                    episode = self.episodes,
                    steps = self.steps,
                    truncated = step.truncated,
                    "episode finished"
                );
                self.env.reset()?;
                next_state = self.env.state().0;
            }

            let next_action = self.select(next_state)?;
            if learning {
                self.buffer.push_state_action(next_state, next_action);
                self.learner.update(&self.buffer)?;
            }

            let record = StepRecord {
                state,
                action,
                reward,
                done: step.done,
                next_state: step.state,
                step: self.steps,
                episode: self.episodes,
            };
            trace!(?record, "step");

            let requested = self.notify(&record);
            state = next_state;
            action = next_action;
            if !requested.is_empty() {
                for index in requested {
                    self.evaluate(index)?;
                }
                self.buffer.clear();
                (state, action) = self.start_episode(learning)?;
            }

            if self.stop.is_break(&record) {
                self.state = LoopState::Stopped;
                break;
            }
        }

        info!(
            steps = self.steps,
            episodes = self.episodes,
            metrics = ?self.learner.metrics(),
            "loop stopped"
        );
        Ok(())
    }

    /// Run all callbacks; returns the indices of those asking for evaluation.
    fn notify(&mut self, record: &StepRecord) -> Vec<usize> {
        let mut ctx = CallbackContext {
            policy: &mut self.policy,
            steps: self.steps,
            episodes: self.episodes,
        };
        self.callbacks
            .iter_mut()
            .enumerate()
            .filter_map(|(i, cb)| (cb.on_step(&mut ctx, record) == Signal::Evaluate).then_some(i))
            .collect()
    }

    /// Run the evaluation requested by callback `index` with learning off.
    fn evaluate(&mut self, index: usize) -> Result<()> {
        let num_actions = self.learner.num_actions();
        let Some(Evaluation {
            mut policy,
            mut stop,
            mut metric,
        }) = self.callbacks[index].evaluation(num_actions)?
        else {
            return Ok(());
        };
        check_dimension(num_actions, policy.num_actions())?;

        self.state = LoopState::LeftForEvaluation;
        debug!(callback = index, "leaving for evaluation");
        stop.reset();
        metric.reset();
        self.env.reset()?;
        let (mut state, _) = self.env.state();
        let (mut step_count, mut episode_count) = (0, 0);
        loop {
            let action = policy.select(self.learner.action_row(state), &mut self.rng)?;
            let step = self.env.interact(action)?;
            step_count += 1;
            let mut next_state = step.state;
            if step.done {
                episode_count += 1;
                self.env.reset()?;
                next_state = self.env.state().0;
            }
            let record = StepRecord {
                state,
                action,
                reward: step.reward.value(),
                done: step.done,
                next_state: step.state,
                step: step_count,
                episode: episode_count,
            };
            metric.observe(&record);
            if stop.is_break(&record) {
                break;
            }
            state = next_state;
        }

        let value = metric.value();
        debug!(callback = index, value, steps = step_count, "evaluation finished");
        self.callbacks[index].on_evaluation(value);
        self.state = LoopState::Running;
        Ok(())
    }
}

/// Run `setup` with learning until its stopping criterion fires.
pub fn learn<L: Learner, E: Environment>(setup: &mut RlSetup<L, E>) -> Result<()> {
    setup.execute(true)
}

/// Run `setup` without learning until its stopping criterion fires.
pub fn run<L: Learner, E: Environment>(setup: &mut RlSetup<L, E>) -> Result<()> {
    setup.execute(false)
}

fn check_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(RLError::DimensionMismatch { expected, actual })
    }
}
