//! Eligibility traces over (action, state) pairs
//!
//! Every step, all traces decay by `γλ`; traces that fall below
//! `minimal_trace_value` are snapped to zero so the set of active pairs stays
//! small. The pair just taken is then boosted: accumulating traces add one,
//! replacing traces are set to one. [`Traces::None`] gives one-step credit
//! assignment without allocating a matrix.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_in_range, RLError};

/// Default snap-to-zero threshold
pub const DEFAULT_MINIMAL_TRACE_VALUE: f64 = 1e-12;

/// Which trace variant a learner uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    /// Credit only the current pair
    None,
    /// `e += 1` on visit, unbounded
    Accumulating,
    /// `e = 1` on visit, bounded by one
    #[default]
    Replacing,
}

/// Dense trace matrix with a list of its non-zero entries.
#[derive(Debug, Clone)]
pub struct TraceMatrix {
    lambda: f64,
    gamma_lambda: f64,
    minimal_trace_value: f64,
    trace: Array2<f64>,
    listed: Array2<bool>,
    active: Vec<(usize, usize)>,
}

impl TraceMatrix {
    /// Zero traces for `num_actions × num_states` pairs decaying by `gamma * lambda`.
    pub fn new(
        num_states: usize,
        num_actions: usize,
        lambda: f64,
        gamma: f64,
        minimal_trace_value: f64,
    ) -> crate::Result<Self> {
        if num_actions == 0 || num_states == 0 {
            return Err(RLError::config("trace matrix needs at least one state and one action"));
        }
        ensure_in_range("lambda", lambda, 0.0, 1.0)?;
        ensure_in_range("gamma", gamma, 0.0, 1.0)?;
        if !(minimal_trace_value.is_finite() && minimal_trace_value > 0.0) {
            return Err(RLError::config(format!(
                "minimal_trace_value must be positive, got {minimal_trace_value}"
            )));
        }
        Ok(Self {
            lambda,
            gamma_lambda: gamma * lambda,
            minimal_trace_value,
            trace: Array2::zeros((num_actions, num_states)),
            listed: Array2::from_elem((num_actions, num_states), false),
            active: Vec::new(),
        })
    }

    /// Trace decay parameter λ
    #[must_use]
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Per-step decay factor γλ
    #[must_use]
    pub fn gamma_lambda(&self) -> f64 {
        self.gamma_lambda
    }

    /// Multiply every trace by γλ and snap small magnitudes to zero.
    pub fn decay(&mut self) {
        let factor = self.gamma_lambda;
        let floor = self.minimal_trace_value;
        let trace = &mut self.trace;
        let listed = &mut self.listed;
        self.active.retain(|&(a, s)| {
            let e = &mut trace[[a, s]];
            *e *= factor;
            if e.abs() < floor {
                *e = 0.0;
                listed[[a, s]] = false;
                false
            } else {
                true
            }
        });
    }

    /// Add `x` to the trace of `(action, state)`.
    pub fn add(&mut self, action: usize, state: usize, x: f64) {
        self.list(action, state);
        self.trace[[action, state]] += x;
    }

    /// Set the trace of `(action, state)` to `x`.
    pub fn set(&mut self, action: usize, state: usize, x: f64) {
        self.list(action, state);
        self.trace[[action, state]] = x;
    }

    fn list(&mut self, action: usize, state: usize) {
        if !self.listed[[action, state]] {
            self.listed[[action, state]] = true;
            self.active.push((action, state));
        }
    }

    /// Current trace of `(action, state)`
    #[must_use]
    pub fn get(&self, action: usize, state: usize) -> f64 {
        self.trace[[action, state]]
    }

    /// Visit every pair with a non-zero trace.
    pub fn for_each_active(&self, mut f: impl FnMut(usize, usize, f64)) {
        for &(a, s) in &self.active {
            let e = self.trace[[a, s]];
            if e != 0.0 {
                f(a, s, e);
            }
        }
    }

    /// Pairs currently carrying a trace
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Zero all traces.
    pub fn reset(&mut self) {
        for &(a, s) in &self.active {
            self.trace[[a, s]] = 0.0;
            self.listed[[a, s]] = false;
        }
        self.active.clear();
    }
}

/// Eligibility traces as used by TD learners.
#[derive(Debug, Clone)]
pub enum Traces {
    /// `e(a, s) = 1` for the current pair, zero elsewhere
    None,
    /// Accumulating traces
    Accumulating(TraceMatrix),
    /// Replacing traces
    Replacing(TraceMatrix),
}

impl Traces {
    /// Build the trace store for `kind`.
    pub fn new(
        kind: TraceKind,
        num_states: usize,
        num_actions: usize,
        lambda: f64,
        gamma: f64,
        minimal_trace_value: f64,
    ) -> crate::Result<Self> {
        Ok(match kind {
            TraceKind::None => Self::None,
            TraceKind::Accumulating => Self::Accumulating(TraceMatrix::new(
                num_states,
                num_actions,
                lambda,
                gamma,
                minimal_trace_value,
            )?),
            TraceKind::Replacing => Self::Replacing(TraceMatrix::new(
                num_states,
                num_actions,
                lambda,
                gamma,
                minimal_trace_value,
            )?),
        })
    }

    /// Decay all traces, then boost the pair just taken.
    pub fn update(&mut self, action: usize, state: usize) {
        match self {
            Self::None => {}
            Self::Accumulating(m) => {
                m.decay();
                m.add(action, state, 1.0);
            }
            Self::Replacing(m) => {
                m.decay();
                m.set(action, state, 1.0);
            }
        }
    }

    /// Visit every pair eligible for credit after the last [`Traces::update`].
    ///
    /// `current` is the pair passed to that update; it is the only eligible
    /// pair for [`Traces::None`].
    pub fn for_each_active(&self, current: (usize, usize), mut f: impl FnMut(usize, usize, f64)) {
        match self {
            Self::None => f(current.0, current.1, 1.0),
            Self::Accumulating(m) | Self::Replacing(m) => m.for_each_active(f),
        }
    }

    /// Trace of `(action, state)`; [`Traces::None`] keeps no history and reports zero.
    #[must_use]
    pub fn get(&self, action: usize, state: usize) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Accumulating(m) | Self::Replacing(m) => m.get(action, state),
        }
    }

    /// Zero all traces.
    pub fn reset(&mut self) {
        match self {
            Self::None => {}
            Self::Accumulating(m) | Self::Replacing(m) => m.reset(),
        }
    }
}
