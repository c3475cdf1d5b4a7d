//! Action-value tables and visit counts for discrete state-action spaces
//!
//! Tables are laid out `num_actions × num_states`, so the values of every
//! action in one state form a column. Policies receive that column as an
//! [`ActionRow`].

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::RLError;

/// Dense table of action values with an explicit "seen" flag per entry.
///
/// An entry is *unseen* until a learner writes it for the first time. Unseen
/// entries keep `init_value`; learners that need a value for them in an
/// error computation substitute their configured unseen value through
/// [`ValueTable::effective`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueTable {
    values: Array2<f64>,
    seen: Array2<bool>,
    init_value: f64,
}

impl ValueTable {
    /// Create a table of `num_actions × num_states` entries set to `init_value`.
    pub fn new(num_states: usize, num_actions: usize, init_value: f64) -> crate::Result<Self> {
        check_dims(num_states, num_actions)?;
        if !init_value.is_finite() {
            return Err(RLError::config(format!(
                "init_value must be finite, got {init_value}; unvisited entries are tracked separately"
            )));
        }
        Ok(Self {
            values: Array2::from_elem((num_actions, num_states), init_value),
            seen: Array2::from_elem((num_actions, num_states), false),
            init_value,
        })
    }

    /// Number of states
    #[must_use]
    pub fn num_states(&self) -> usize {
        self.values.ncols()
    }

    /// Number of actions
    #[must_use]
    pub fn num_actions(&self) -> usize {
        self.values.nrows()
    }

    /// Value every entry started from
    #[must_use]
    pub fn init_value(&self) -> f64 {
        self.init_value
    }

    /// Stored value of `(action, state)`
    #[must_use]
    pub fn get(&self, action: usize, state: usize) -> f64 {
        self.values[[action, state]]
    }

    /// Whether `(action, state)` has ever been written by a learner
    #[must_use]
    pub fn is_seen(&self, action: usize, state: usize) -> bool {
        self.seen[[action, state]]
    }

    /// Stored value, or `unseen` if the entry was never written.
    #[must_use]
    pub fn effective(&self, action: usize, state: usize, unseen: f64) -> f64 {
        if self.seen[[action, state]] {
            self.values[[action, state]]
        } else {
            unseen
        }
    }

    /// Maximum over actions of [`ValueTable::effective`] in `state`.
    #[must_use]
    pub fn max_effective(&self, state: usize, unseen: f64) -> f64 {
        (0..self.num_actions())
            .map(|a| self.effective(a, state, unseen))
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Maximum over the seen entries of `state`, `None` if none was written.
    #[must_use]
    pub fn max_seen(&self, state: usize) -> Option<f64> {
        (0..self.num_actions())
            .filter(|&a| self.seen[[a, state]])
            .map(|a| self.values[[a, state]])
            .reduce(f64::max)
    }

    /// Overwrite an entry and mark it seen.
    pub fn set(&mut self, action: usize, state: usize, value: f64) {
        self.values[[action, state]] = value;
        self.seen[[action, state]] = true;
    }

    /// Add `delta` to an entry and mark it seen.
    pub fn add(&mut self, action: usize, state: usize, delta: f64) {
        self.values[[action, state]] += delta;
        self.seen[[action, state]] = true;
    }

    /// Make sure an entry holds a real value: unseen entries are set to
    /// `unseen` and marked seen. Returns the value afterwards.
    pub fn materialize(&mut self, action: usize, state: usize, unseen: f64) -> f64 {
        if !self.seen[[action, state]] {
            self.set(action, state, unseen);
        }
        self.values[[action, state]]
    }

    /// Values of every action in `state`
    #[must_use]
    pub fn column(&self, state: usize) -> ArrayView1<'_, f64> {
        self.values.column(state)
    }

    /// The whole table
    #[must_use]
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }
}

/// Count of how often each action was chosen in each state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitCounts {
    counts: Array2<u64>,
}

impl VisitCounts {
    /// Zero counts for `num_actions × num_states` pairs
    pub fn new(num_states: usize, num_actions: usize) -> crate::Result<Self> {
        check_dims(num_states, num_actions)?;
        Ok(Self {
            counts: Array2::zeros((num_actions, num_states)),
        })
    }

    /// Record one more choice of `action` in `state`, returning the new count.
    pub fn record(&mut self, action: usize, state: usize) -> u64 {
        let count = &mut self.counts[[action, state]];
        *count += 1;
        *count
    }

    /// Times `action` was chosen in `state`
    #[must_use]
    pub fn get(&self, action: usize, state: usize) -> u64 {
        self.counts[[action, state]]
    }

    /// True if `action` was never chosen in `state`
    #[must_use]
    pub fn is_novel(&self, action: usize, state: usize) -> bool {
        self.counts[[action, state]] == 0
    }

    /// Counts of every action in `state`
    #[must_use]
    pub fn column(&self, state: usize) -> ArrayView1<'_, u64> {
        self.counts.column(state)
    }
}

/// What a policy sees of one state: a value (or preference) per action and,
/// optionally, how often each action was tried.
#[derive(Debug, Clone, Copy)]
pub struct ActionRow<'a> {
    /// One value per action
    pub values: ArrayView1<'a, f64>,
    /// Visit count per action; `None` disables novelty handling
    pub visits: Option<ArrayView1<'a, u64>>,
}

impl<'a> ActionRow<'a> {
    /// Row with novelty information
    #[must_use]
    pub fn new(values: ArrayView1<'a, f64>, visits: ArrayView1<'a, u64>) -> Self {
        Self {
            values,
            visits: Some(visits),
        }
    }

    /// Row without novelty information
    #[must_use]
    pub fn values_only(values: ArrayView1<'a, f64>) -> Self {
        Self { values, visits: None }
    }

    /// Number of actions
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True for an empty action set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Actions that were never tried
    #[must_use]
    pub fn novel_actions(&self) -> Vec<usize> {
        match self.visits {
            Some(visits) => visits
                .iter()
                .enumerate()
                .filter(|(_, &n)| n == 0)
                .map(|(a, _)| a)
                .collect(),
            None => Vec::new(),
        }
    }

    /// All actions attaining the maximum value among `candidates`.
    #[must_use]
    pub fn argmax_among(&self, candidates: impl IntoIterator<Item = usize>) -> Vec<usize> {
        let mut best = f64::NEG_INFINITY;
        let mut winners = Vec::new();
        for a in candidates {
            let v = self.values[a];
            if v > best {
                best = v;
                winners.clear();
                winners.push(a);
            } else if v == best {
                winners.push(a);
            }
        }
        winners
    }

    /// All actions attaining the maximum value
    #[must_use]
    pub fn argmax(&self) -> Vec<usize> {
        self.argmax_among(0..self.len())
    }
}

fn check_dims(num_states: usize, num_actions: usize) -> crate::Result<()> {
    if num_actions == 0 {
        return Err(RLError::config("action set must not be empty"));
    }
    if num_states == 0 {
        return Err(RLError::config("state set must not be empty"));
    }
    Ok(())
}
