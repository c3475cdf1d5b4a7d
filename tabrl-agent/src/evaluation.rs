//! Metrics computed over a stretch of steps

use crate::setup::StepRecord;

/// Accumulates a scalar over the steps it observes.
pub trait Metric {
    /// Account for one step
    fn observe(&mut self, record: &StepRecord);

    /// Value accumulated since the last reset
    fn value(&self) -> f64;

    /// Forget everything observed
    fn reset(&mut self);
}

impl<M: Metric + ?Sized> Metric for Box<M> {
    fn observe(&mut self, record: &StepRecord) {
        (**self).observe(record);
    }

    fn value(&self) -> f64 {
        (**self).value()
    }

    fn reset(&mut self) {
        (**self).reset();
    }
}

/// Average reward per step
#[derive(Debug, Clone, Default)]
pub struct MeanReward {
    total: f64,
    steps: u64,
}

impl Metric for MeanReward {
    fn observe(&mut self, record: &StepRecord) {
        self.total += record.reward;
        self.steps += 1;
    }

    fn value(&self) -> f64 {
        if self.steps == 0 {
            0.0
        } else {
            self.total / self.steps as f64
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Sum of rewards
#[derive(Debug, Clone, Default)]
pub struct TotalReward {
    total: f64,
}

impl Metric for TotalReward {
    fn observe(&mut self, record: &StepRecord) {
        self.total += record.reward;
    }

    fn value(&self) -> f64 {
        self.total
    }

    fn reset(&mut self) {
        self.total = 0.0;
    }
}

/// Number of steps
#[derive(Debug, Clone, Default)]
pub struct TimeSteps {
    steps: u64,
}

impl Metric for TimeSteps {
    fn observe(&mut self, _record: &StepRecord) {
        self.steps += 1;
    }

    fn value(&self) -> f64 {
        self.steps as f64
    }

    fn reset(&mut self) {
        self.steps = 0;
    }
}
