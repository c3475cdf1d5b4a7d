//! Environment replaying a recorded episode

use tabrl_core::{Environment, RLError, Result, Step};

/// Replays a fixed sequence of steps regardless of the actions taken.
///
/// Every reset starts the sequence over from `initial_state`. Interacting
/// past the end of the sequence, or after a terminal step, is an error.
#[derive(Debug, Clone)]
pub struct ForcedEpisode {
    num_states: usize,
    num_actions: usize,
    initial_state: usize,
    steps: Vec<Step>,
    t: usize,
}

impl ForcedEpisode {
    /// Replay `steps` starting from `initial_state`
    pub fn new(
        num_states: usize,
        num_actions: usize,
        initial_state: usize,
        steps: Vec<Step>,
    ) -> Result<Self> {
        if num_states == 0 || num_actions == 0 {
            return Err(RLError::config(
                "forced episode needs at least one state and one action",
            ));
        }
        if let Some(s) = std::iter::once(initial_state)
            .chain(steps.iter().map(|step| step.state))
            .find(|&s| s >= num_states)
        {
            return Err(RLError::InvalidState(format!(
                "state {s} outside 0..{num_states}"
            )));
        }
        Ok(Self {
            num_states,
            num_actions,
            initial_state,
            steps,
            t: 0,
        })
    }

    /// Steps still to be replayed
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.steps.len() - self.t
    }
}

impl Environment for ForcedEpisode {
    fn num_states(&self) -> usize {
        self.num_states
    }

    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn interact(&mut self, action: usize) -> Result<Step> {
        if action >= self.num_actions {
            return Err(RLError::InvalidAction(format!(
                "action {action} outside 0..{}",
                self.num_actions
            )));
        }
        if self.state().1 {
            return Err(RLError::Environment("recorded episode is over".into()));
        }
        let step = self
            .steps
            .get(self.t)
            .copied()
            .ok_or_else(|| RLError::Environment("recorded episode exhausted".into()))?;
        self.t += 1;
        Ok(step)
    }

    fn reset(&mut self) -> Result<()> {
        self.t = 0;
        Ok(())
    }

    fn state(&self) -> (usize, bool) {
        match self.t.checked_sub(1).and_then(|i| self.steps.get(i)) {
            Some(step) => (step.state, step.done),
            None => (self.initial_state, false),
        }
    }
}
