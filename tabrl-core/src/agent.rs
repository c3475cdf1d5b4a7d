//! Learner contract used by the learning loop

use serde::{Deserialize, Serialize};

use crate::trajectory::{Buffer, BufferSpec};
use crate::value::ActionRow;

/// Learner metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearnerMetrics {
    /// Calls to [`Learner::update`] that changed the learner
    pub updates: u64,
    /// Most recent error signal (TD error, effective reward, ...)
    pub last_error: Option<f64>,
    /// Additional metrics
    #[serde(flatten)]
    pub custom: serde_json::Map<String, serde_json::Value>,
}

impl LearnerMetrics {
    /// Attach a named value
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.custom.insert(key.to_owned(), value.into());
        self
    }
}

/// Tabular learner.
///
/// The driver owns the learner for the lifetime of a run. While learning, it
/// calls [`Learner::update`] once per environment step, after the next
/// action has been pushed, so the newest transition in the buffer is
/// complete. Between updates the driver only reads the learner through
/// [`Learner::action_row`].
pub trait Learner {
    /// Number of states
    fn num_states(&self) -> usize;

    /// Number of actions
    fn num_actions(&self) -> usize;

    /// Buffer the driver must keep for this learner
    fn buffer_spec(&self) -> BufferSpec;

    /// Learn from the newest transition in `buffer`
    fn update(&mut self, buffer: &Buffer) -> crate::Result<()>;

    /// Values (or preferences) of every action in `state`, with visit
    /// counts if the learner tracks novelty
    fn action_row(&self, state: usize) -> ActionRow<'_>;

    /// Diagnostics
    fn metrics(&self) -> LearnerMetrics {
        LearnerMetrics::default()
    }
}

impl<L: Learner + ?Sized> Learner for Box<L> {
    fn num_states(&self) -> usize {
        (**self).num_states()
    }

    fn num_actions(&self) -> usize {
        (**self).num_actions()
    }

    fn buffer_spec(&self) -> BufferSpec {
        (**self).buffer_spec()
    }

    fn update(&mut self, buffer: &Buffer) -> crate::Result<()> {
        (**self).update(buffer)
    }

    fn action_row(&self, state: usize) -> ActionRow<'_> {
        (**self).action_row(state)
    }

    fn metrics(&self) -> LearnerMetrics {
        (**self).metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_flatten_custom_fields() {
        let metrics = LearnerMetrics {
            updates: 3,
            ..LearnerMetrics::default()
        }
        .with("backups", 12_u64);
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["updates"], 3);
        assert_eq!(json["backups"], 12);
        assert!(json["last_error"].is_null());
    }
}
