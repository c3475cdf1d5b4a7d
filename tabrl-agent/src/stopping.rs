//! Stopping criteria for the learning loop

use serde::{Deserialize, Serialize};

use crate::setup::StepRecord;

/// Decides when a loop ends. Consulted once per step.
pub trait StoppingCriterion {
    /// True once the loop should stop after `record`
    fn is_break(&mut self, record: &StepRecord) -> bool;

    /// Start counting from scratch
    fn reset(&mut self);
}

impl<S: StoppingCriterion + ?Sized> StoppingCriterion for Box<S> {
    fn is_break(&mut self, record: &StepRecord) -> bool {
        (**self).is_break(record)
    }

    fn reset(&mut self) {
        (**self).reset();
    }
}

/// Stop after a fixed number of steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantNumberSteps {
    /// Steps to run
    pub steps: u64,
    counted: u64,
}

impl ConstantNumberSteps {
    /// Stop after `steps` steps
    #[must_use]
    pub fn new(steps: u64) -> Self {
        Self { steps, counted: 0 }
    }
}

impl StoppingCriterion for ConstantNumberSteps {
    fn is_break(&mut self, _record: &StepRecord) -> bool {
        self.counted += 1;
        self.counted >= self.steps
    }

    fn reset(&mut self) {
        self.counted = 0;
    }
}

/// Stop after a fixed number of finished episodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantNumberEpisodes {
    /// Episodes to run
    pub episodes: u64,
    counted: u64,
}

impl ConstantNumberEpisodes {
    /// Stop after `episodes` episodes
    #[must_use]
    pub fn new(episodes: u64) -> Self {
        Self { episodes, counted: 0 }
    }
}

impl StoppingCriterion for ConstantNumberEpisodes {
    fn is_break(&mut self, record: &StepRecord) -> bool {
        if record.done {
            self.counted += 1;
        }
        self.counted >= self.episodes
    }

    fn reset(&mut self) {
        self.counted = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(done: bool) -> StepRecord {
        StepRecord {
            state: 0,
            action: 0,
            reward: 0.0,
            done,
            next_state: 0,
            step: 0,
            episode: 0,
        }
    }

    #[test]
    fn steps_count_every_call() {
        let mut stop = ConstantNumberSteps::new(3);
        assert!(!stop.is_break(&record(false)));
        assert!(!stop.is_break(&record(true)));
        assert!(stop.is_break(&record(false)));
        stop.reset();
        assert!(!stop.is_break(&record(false)));
    }

    #[test]
    fn episodes_count_terminal_steps() {
        let mut stop: Box<dyn StoppingCriterion> = Box::new(ConstantNumberEpisodes::new(2));
        assert!(!stop.is_break(&record(false)));
        assert!(!stop.is_break(&record(true)));
        assert!(!stop.is_break(&record(false)));
        assert!(stop.is_break(&record(true)));
    }
}
