//! Callbacks invoked by the learning loop after every step
//!
//! A callback sees each [`StepRecord`] together with a [`CallbackContext`]
//! through which it may adjust the exploration policy. Returning
//! [`Signal::Evaluate`] asks the driver to pause learning and run the
//! [`Evaluation`] the callback describes; the resulting metric value is
//! handed back through [`Callback::on_evaluation`].

use std::any::Any;

use serde::{Deserialize, Serialize};
use tracing::debug;

use tabrl_core::error::ensure_in_range;
use tabrl_core::{Policy, Result};

use crate::evaluation::Metric;
use crate::setup::StepRecord;
use crate::stopping::{ConstantNumberEpisodes, StoppingCriterion};
use crate::utils::{InverseSchedule, LinearSchedule, Schedule};

/// What a callback may touch while the loop runs
pub struct CallbackContext<'a> {
    /// Exploration policy of the setup
    pub policy: &'a mut Policy,
    /// Steps taken so far
    pub steps: u64,
    /// Episodes finished so far
    pub episodes: u64,
}

/// Request returned by [`Callback::on_step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Signal {
    /// Keep learning
    #[default]
    Continue,
    /// Run this callback's evaluation before the next step
    Evaluate,
}

/// Evaluation run requested by a callback
pub struct Evaluation {
    /// Policy acting during evaluation
    pub policy: Policy,
    /// When evaluation ends
    pub stop: Box<dyn StoppingCriterion>,
    /// What is measured
    pub metric: Box<dyn Metric>,
}

/// Hook into the learning loop
pub trait Callback: Any {
    /// Called once per step, after the learner update
    fn on_step(&mut self, ctx: &mut CallbackContext<'_>, record: &StepRecord) -> Signal;

    /// Evaluation to run after [`Signal::Evaluate`]
    fn evaluation(&mut self, _num_actions: usize) -> Result<Option<Evaluation>> {
        Ok(None)
    }

    /// Receives the metric value of a finished evaluation
    fn on_evaluation(&mut self, _value: f64) {}

    /// Upcast for [`crate::RlSetup::callback`]
    fn as_any(&self) -> &dyn Any;
}

/// Keeps every step record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordAll {
    /// Records in order
    pub records: Vec<StepRecord>,
}

impl Callback for RecordAll {
    fn on_step(&mut self, _ctx: &mut CallbackContext<'_>, record: &StepRecord) -> Signal {
        self.records.push(*record);
        Signal::Continue
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Keeps every reward
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllRewards {
    /// Rewards in order
    pub rewards: Vec<f64>,
}

impl Callback for AllRewards {
    fn on_step(&mut self, _ctx: &mut CallbackContext<'_>, record: &StepRecord) -> Signal {
        self.rewards.push(record.reward);
        Signal::Continue
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Value of a metric for each finished episode of the learning run
#[derive(Debug, Clone, Default)]
pub struct EvaluationPerEpisode<M> {
    metric: M,
    /// One value per episode
    pub values: Vec<f64>,
}

impl<M: Metric> EvaluationPerEpisode<M> {
    /// Track `metric`
    #[must_use]
    pub fn new(metric: M) -> Self {
        Self {
            metric,
            values: Vec::new(),
        }
    }
}

impl<M: Metric + 'static> Callback for EvaluationPerEpisode<M> {
    fn on_step(&mut self, _ctx: &mut CallbackContext<'_>, record: &StepRecord) -> Signal {
        self.metric.observe(record);
        if record.done {
            self.values.push(self.metric.value());
            self.metric.reset();
        }
        Signal::Continue
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Value of a metric for each block of `period` steps
#[derive(Debug, Clone)]
pub struct EvaluationPerT<M> {
    period: u64,
    counted: u64,
    metric: M,
    /// One value per block
    pub values: Vec<f64>,
}

impl<M: Metric> EvaluationPerT<M> {
    /// Track `metric` over blocks of `period` steps
    #[must_use]
    pub fn new(period: u64, metric: M) -> Self {
        Self {
            period: period.max(1),
            counted: 0,
            metric,
            values: Vec::new(),
        }
    }
}

impl<M: Metric + 'static> Callback for EvaluationPerT<M> {
    fn on_step(&mut self, _ctx: &mut CallbackContext<'_>, record: &StepRecord) -> Signal {
        self.metric.observe(record);
        self.counted += 1;
        if self.counted == self.period {
            self.values.push(self.metric.value());
            self.metric.reset();
            self.counted = 0;
        }
        Signal::Continue
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// When [`EvaluateGreedy`] interrupts learning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationPeriod {
    /// Every `n` finished episodes
    Episodes(u64),
    /// Every `n` steps
    Steps(u64),
}

/// Periodically measures the greedy policy of the learner without learning
#[derive(Debug, Clone)]
pub struct EvaluateGreedy<M> {
    period: EvaluationPeriod,
    episodes: u64,
    metric: M,
    /// Metric value of each evaluation
    pub results: Vec<f64>,
}

impl<M: Metric + Clone> EvaluateGreedy<M> {
    /// Evaluate for `episodes` episodes at every `period`
    #[must_use]
    pub fn new(metric: M, period: EvaluationPeriod, episodes: u64) -> Self {
        Self {
            period,
            episodes,
            metric,
            results: Vec::new(),
        }
    }
}

impl<M: Metric + Clone + 'static> Callback for EvaluateGreedy<M> {
    fn on_step(&mut self, ctx: &mut CallbackContext<'_>, record: &StepRecord) -> Signal {
        let due = match self.period {
            EvaluationPeriod::Episodes(n) => record.done && n > 0 && ctx.episodes % n == 0,
            EvaluationPeriod::Steps(n) => n > 0 && ctx.steps % n == 0,
        };
        if due {
            Signal::Evaluate
        } else {
            Signal::Continue
        }
    }

    fn evaluation(&mut self, num_actions: usize) -> Result<Option<Evaluation>> {
        let mut metric = self.metric.clone();
        metric.reset();
        Ok(Some(Evaluation {
            policy: Policy::greedy(num_actions)?,
            stop: Box::new(ConstantNumberEpisodes::new(self.episodes)),
            metric: Box::new(metric),
        }))
    }

    fn on_evaluation(&mut self, value: f64) {
        debug!(evaluation = self.results.len(), value, "greedy evaluation finished");
        self.results.push(value);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Moves epsilon linearly from `start` to `end` over a number of steps
#[derive(Debug, Clone)]
pub struct LinearDecreaseEpsilon {
    schedule: LinearSchedule,
    t: usize,
}

impl LinearDecreaseEpsilon {
    /// Decrease from `start` to `end` within `steps` steps.
    ///
    /// Both ends must be valid exploration rates in `[0, 1]`.
    pub fn new(start: f64, end: f64, steps: usize) -> Result<Self> {
        ensure_in_range("start", start, 0.0, 1.0)?;
        ensure_in_range("end", end, 0.0, 1.0)?;
        Ok(Self {
            schedule: LinearSchedule::new(start, end, steps),
            t: 0,
        })
    }
}

impl Callback for LinearDecreaseEpsilon {
    fn on_step(&mut self, ctx: &mut CallbackContext<'_>, _record: &StepRecord) -> Signal {
        self.t += 1;
        if let Some(epsilon) = ctx.policy.epsilon_mut() {
            *epsilon = self.schedule.value(self.t);
        }
        Signal::Continue
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// `ε = ε₀ / (k + 1)` after the `k`-th finished episode
#[derive(Debug, Clone, Default)]
pub struct ReduceEpsilonPerEpisode {
    schedule: Option<InverseSchedule>,
    episodes: usize,
}

impl Callback for ReduceEpsilonPerEpisode {
    fn on_step(&mut self, ctx: &mut CallbackContext<'_>, record: &StepRecord) -> Signal {
        if let Some(epsilon) = ctx.policy.epsilon_mut() {
            let schedule = self
                .schedule
                .get_or_insert_with(|| InverseSchedule::new(*epsilon));
            if record.done {
                self.episodes += 1;
                *epsilon = schedule.value(self.episodes);
            }
        }
        Signal::Continue
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// `ε = ε₀ / (k + 1)` after the `k`-th block of `period` steps
#[derive(Debug, Clone)]
pub struct ReduceEpsilonPerT {
    period: u64,
    schedule: Option<InverseSchedule>,
    t: u64,
}

impl ReduceEpsilonPerT {
    /// Reduce every `period` steps
    #[must_use]
    pub fn new(period: u64) -> Self {
        Self {
            period: period.max(1),
            schedule: None,
            t: 0,
        }
    }
}

impl Callback for ReduceEpsilonPerT {
    fn on_step(&mut self, ctx: &mut CallbackContext<'_>, _record: &StepRecord) -> Signal {
        if let Some(epsilon) = ctx.policy.epsilon_mut() {
            let schedule = self
                .schedule
                .get_or_insert_with(|| InverseSchedule::new(*epsilon));
            self.t += 1;
            if self.t % self.period == 0 {
                let blocks = usize::try_from(self.t / self.period).unwrap_or(usize::MAX);
                *epsilon = schedule.value(blocks);
            }
        }
        Signal::Continue
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{MeanReward, TotalReward};
    use approx::assert_relative_eq;
    use tabrl_core::{NoveltyMode, Policy, PolicyConfig};

    fn record(step: u64, reward: f64, done: bool) -> StepRecord {
        StepRecord {
            state: 0,
            action: 0,
            reward,
            done,
            next_state: 0,
            step,
            episode: 0,
        }
    }

    fn epsilon_greedy(epsilon: f64) -> Policy {
        Policy::from_config(
            &PolicyConfig::EpsilonGreedy {
                epsilon,
                mode: NoveltyMode::Pessimistic,
            },
            2,
        )
        .unwrap()
    }

    fn drive(callback: &mut dyn Callback, policy: &mut Policy, records: &[StepRecord]) -> Vec<Signal> {
        let mut episodes = 0;
        records
            .iter()
            .map(|r| {
                episodes += u64::from(r.done);
                let mut ctx = CallbackContext {
                    policy: &mut *policy,
                    steps: r.step,
                    episodes,
                };
                callback.on_step(&mut ctx, r)
            })
            .collect()
    }

    #[test]
    fn per_episode_metric_resets_on_done() {
        let mut cb = EvaluationPerEpisode::new(TotalReward::default());
        let mut policy = epsilon_greedy(0.1);
        let records = [
            record(1, 1.0, false),
            record(2, 2.0, true),
            record(3, 5.0, true),
        ];
        drive(&mut cb, &mut policy, &records);
        assert_eq!(cb.values, vec![3.0, 5.0]);
    }

    #[test]
    fn per_t_metric_uses_blocks() {
        let mut cb = EvaluationPerT::new(2, MeanReward::default());
        let mut policy = epsilon_greedy(0.1);
        let records: Vec<_> = (1..=5).map(|t| record(t, t as f64, false)).collect();
        drive(&mut cb, &mut policy, &records);
        assert_eq!(cb.values, vec![1.5, 3.5]);
    }

    #[test]
    fn greedy_evaluation_is_requested_per_episode_period() {
        let mut cb = EvaluateGreedy::new(TotalReward::default(), EvaluationPeriod::Episodes(2), 3);
        let mut policy = epsilon_greedy(0.1);
        let records = [
            record(1, 0.0, true),
            record(2, 0.0, false),
            record(3, 0.0, true),
        ];
        let signals = drive(&mut cb, &mut policy, &records);
        assert_eq!(signals, vec![Signal::Continue, Signal::Continue, Signal::Evaluate]);

        let evaluation = cb.evaluation(2).unwrap().unwrap();
        assert_eq!(evaluation.policy.epsilon(), Some(0.0));
        cb.on_evaluation(4.0);
        assert_eq!(cb.results, vec![4.0]);
    }

    #[test]
    fn linear_decrease_reaches_end_value() {
        let mut cb = LinearDecreaseEpsilon::new(1.0, 0.0, 4).unwrap();
        let mut policy = epsilon_greedy(1.0);
        let records: Vec<_> = (1..=2).map(|t| record(t, 0.0, false)).collect();
        drive(&mut cb, &mut policy, &records);
        assert_relative_eq!(policy.epsilon().unwrap(), 0.5);
        let records: Vec<_> = (3..=6).map(|t| record(t, 0.0, false)).collect();
        drive(&mut cb, &mut policy, &records);
        assert_relative_eq!(policy.epsilon().unwrap(), 0.0);
    }

    #[test]
    fn linear_decrease_rejects_invalid_rates() {
        assert!(LinearDecreaseEpsilon::new(1.5, 0.0, 4).is_err());
        assert!(LinearDecreaseEpsilon::new(0.5, -0.1, 4).is_err());
        assert!(LinearDecreaseEpsilon::new(0.0, 1.0, 4).is_ok());
    }

    #[test]
    fn epsilon_shrinks_per_episode_and_per_block() {
        let mut per_episode = ReduceEpsilonPerEpisode::default();
        let mut policy = epsilon_greedy(0.6);
        let records = [record(1, 0.0, false), record(2, 0.0, true), record(3, 0.0, true)];
        drive(&mut per_episode, &mut policy, &records);
        assert_relative_eq!(policy.epsilon().unwrap(), 0.2);

        let mut per_t = ReduceEpsilonPerT::new(2);
        let mut policy = epsilon_greedy(0.6);
        let records: Vec<_> = (1..=4).map(|t| record(t, 0.0, false)).collect();
        drive(&mut per_t, &mut policy, &records);
        assert_relative_eq!(policy.epsilon().unwrap(), 0.2);
    }

    #[test]
    fn schedules_ignore_policies_without_epsilon() {
        let mut cb = LinearDecreaseEpsilon::new(1.0, 0.0, 4).unwrap();
        let mut policy = Policy::from_config(&PolicyConfig::Softmax { beta: 1.0 }, 2).unwrap();
        drive(&mut cb, &mut policy, &[record(1, 0.0, false)]);
        assert_eq!(policy.epsilon(), None);
    }

    #[test]
    fn recorders_keep_everything() {
        let mut all = RecordAll::default();
        let mut rewards = AllRewards::default();
        let mut policy = epsilon_greedy(0.1);
        let records = [record(1, 1.0, false), record(2, -1.0, true)];
        drive(&mut all, &mut policy, &records);
        drive(&mut rewards, &mut policy, &records);
        assert_eq!(all.records, records.to_vec());
        assert_eq!(rewards.rewards, vec![1.0, -1.0]);
    }
}
