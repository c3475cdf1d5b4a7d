//! Max-priority queue over state indices with one entry per state

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::RLError;

#[derive(Debug, Clone, Copy)]
struct Entry {
    priority: f64,
    state: usize,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.state.cmp(&self.state))
    }
}

/// Deduplicated max-priority queue of states.
///
/// Pushing a state that is already queued keeps the higher of the two
/// priorities. Priorities not above `min_priority` are never queued.
/// Superseded heap entries are skipped lazily on pop.
#[derive(Debug, Clone)]
pub struct PriorityQueue {
    heap: BinaryHeap<Entry>,
    current: Vec<Option<f64>>,
    len: usize,
    min_priority: f64,
}

impl PriorityQueue {
    /// Empty queue over `num_states` states
    pub fn new(num_states: usize, min_priority: f64) -> crate::Result<Self> {
        if num_states == 0 {
            return Err(RLError::config("priority queue needs at least one state"));
        }
        if !(min_priority.is_finite() && min_priority >= 0.0) {
            return Err(RLError::config(format!(
                "min_priority must be finite and non-negative, got {min_priority}"
            )));
        }
        Ok(Self {
            heap: BinaryHeap::new(),
            current: vec![None; num_states],
            len: 0,
            min_priority,
        })
    }

    /// Queue `state` with `priority`. Returns true if the queue changed.
    pub fn push(&mut self, state: usize, priority: f64) -> bool {
        if priority.is_nan() || priority <= self.min_priority {
            return false;
        }
        match self.current[state] {
            Some(existing) if existing >= priority => false,
            existing => {
                if existing.is_none() {
                    self.len += 1;
                }
                self.current[state] = Some(priority);
                self.heap.push(Entry { priority, state });
                true
            }
        }
    }

    /// Remove and return the state with the highest priority.
    pub fn pop(&mut self) -> Option<(usize, f64)> {
        while let Some(entry) = self.heap.pop() {
            if self.current[entry.state] == Some(entry.priority) {
                self.current[entry.state] = None;
                self.len -= 1;
                return Some((entry.state, entry.priority));
            }
        }
        None
    }

    /// Current priority of `state`, if queued
    #[must_use]
    pub fn priority(&self, state: usize) -> Option<f64> {
        self.current[state]
    }

    /// Number of queued states
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if no state is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Smallest priority that is still rejected
    #[must_use]
    pub fn min_priority(&self) -> f64 {
        self.min_priority
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.current.iter_mut().for_each(|p| *p = None);
        self.len = 0;
    }
}
