//! Error types for the tabular RL core

use thiserror::Error;

/// Core error type for RL operations
#[derive(Error, Debug)]
pub enum RLError {
    /// Invalid configuration, raised at construction time
    #[error("Configuration error: {0}")]
    Config(String),

    /// Environment-related errors
    #[error("Environment error: {0}")]
    Environment(String),

    /// Invalid action
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl RLError {
    /// Shorthand for a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type alias for RL operations
pub type Result<T> = std::result::Result<T, RLError>;

/// Fails with a configuration error unless `value` lies in `[low, high]`.
pub fn ensure_in_range(name: &str, value: f64, low: f64, high: f64) -> Result<()> {
    if value.is_finite() && value >= low && value <= high {
        Ok(())
    } else {
        Err(RLError::Config(format!(
            "{name} must lie in [{low}, {high}], got {value}"
        )))
    }
}

/// Fails with a configuration error unless `value` is at least one.
pub fn ensure_positive_count(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        Err(RLError::Config(format!("{name} must be at least 1")))
    } else {
        Ok(())
    }
}
