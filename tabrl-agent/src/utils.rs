//! Schedules for exploration parameters

/// Trait for schedules (e.g., for epsilon decay)
pub trait Schedule {
    /// Get value at step t
    fn value(&self, t: usize) -> f64;
}

/// Linear schedule that decays from start to end over steps
#[derive(Debug, Clone)]
pub struct LinearSchedule {
    /// Starting value
    pub start: f64,
    /// Ending value
    pub end: f64,
    /// Number of steps for decay
    pub steps: usize,
}

impl LinearSchedule {
    /// Create a new linear schedule
    #[must_use]
    pub fn new(start: f64, end: f64, steps: usize) -> Self {
        Self { start, end, steps }
    }
}

impl Schedule for LinearSchedule {
    fn value(&self, t: usize) -> f64 {
        if t >= self.steps {
            self.end
        } else {
            let progress = t as f64 / self.steps as f64;
            self.start + (self.end - self.start) * progress
        }
    }
}

/// `start / (t + 1)`
#[derive(Debug, Clone)]
pub struct InverseSchedule {
    /// Value at `t = 0`
    pub start: f64,
}

impl InverseSchedule {
    /// Create a new inverse schedule
    #[must_use]
    pub fn new(start: f64) -> Self {
        Self { start }
    }
}

impl Schedule for InverseSchedule {
    fn value(&self, t: usize) -> f64 {
        self.start / (t as f64 + 1.0)
    }
}
