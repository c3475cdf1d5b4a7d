//! Exact policy iteration on a fully specified MDP
//!
//! Alternates exact evaluation of the current deterministic policy, solving
//! `(I − γ P_π) V = R_π` by LU decomposition, with greedy improvement until
//! no state changes its action. Terminal states keep value zero. When the
//! linear system is singular (γ = 1 with a cycle) evaluation falls back to
//! iterating the Bellman operator.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use tabrl_core::error::{ensure_in_range, ensure_positive_count};
use tabrl_core::{ActionRow, Buffer, BufferSpec, Learner, Mdp, RLError, Result};

const IMPROVEMENT_THRESHOLD: f64 = 1e-12;

/// Solver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyIterationConfig {
    /// Discount factor
    pub gamma: f64,
    /// Convergence threshold of iterative evaluation
    pub tolerance: f64,
    /// Sweep limit of iterative evaluation
    pub max_sweeps: usize,
    /// Limit on evaluation/improvement rounds
    pub max_iterations: usize,
}

impl Default for PolicyIterationConfig {
    fn default() -> Self {
        Self {
            gamma: 0.9,
            tolerance: 1e-12,
            max_sweeps: 100_000,
            max_iterations: 1_000,
        }
    }
}

/// Optimal values and policy of an [`Mdp`]
#[derive(Debug, Clone)]
pub struct PolicyIteration {
    config: PolicyIterationConfig,
    values: Array1<f64>,
    policy: Vec<usize>,
    q: Array2<f64>,
    iterations: usize,
}

impl PolicyIteration {
    /// Solve `mdp`
    pub fn solve(mdp: &Mdp, config: PolicyIterationConfig) -> Result<Self> {
        ensure_in_range("gamma", config.gamma, 0.0, 1.0)?;
        ensure_positive_count("max_iterations", config.max_iterations)?;
        ensure_positive_count("max_sweeps", config.max_sweeps)?;

        let mut policy = vec![0; mdp.num_states()];
        for iteration in 1..=config.max_iterations {
            let values = evaluate(mdp, &policy, &config)?;
            let changed = improve(mdp, &mut policy, config.gamma, &values);
            debug!(iteration, changed, "policy iteration round");
            if changed == 0 {
                let q = q_values(mdp, config.gamma, &values);
                return Ok(Self {
                    config,
                    values: Array1::from(values),
                    policy,
                    q,
                    iterations: iteration,
                });
            }
        }
        Err(RLError::Computation(format!(
            "policy iteration did not stabilize within {} rounds",
            config.max_iterations
        )))
    }

    /// State values of the optimal policy
    #[must_use]
    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    /// Optimal action per state (0 for terminal states)
    #[must_use]
    pub fn policy(&self) -> &[usize] {
        &self.policy
    }

    /// `Q[a, s] = r(a, s) + γ Σ P(s1 | s, a) V[s1]`, laid out actions × states
    #[must_use]
    pub fn q_values(&self) -> &Array2<f64> {
        &self.q
    }

    /// Evaluation/improvement rounds used
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Discount factor the values refer to
    #[must_use]
    pub fn gamma(&self) -> f64 {
        self.config.gamma
    }
}

/// A solved MDP acts as a learner that already knows everything: updates
/// are ignored and action rows come from the optimal Q-values.
impl Learner for PolicyIteration {
    fn num_states(&self) -> usize {
        self.q.ncols()
    }

    fn num_actions(&self) -> usize {
        self.q.nrows()
    }

    fn buffer_spec(&self) -> BufferSpec {
        BufferSpec { capacity: Some(1) }
    }

    fn update(&mut self, _buffer: &Buffer) -> Result<()> {
        Ok(())
    }

    fn action_row(&self, state: usize) -> ActionRow<'_> {
        ActionRow::values_only(self.q.column(state))
    }
}

fn evaluate(mdp: &Mdp, policy: &[usize], config: &PolicyIterationConfig) -> Result<Vec<f64>> {
    let n = mdp.num_states();
    let gamma = config.gamma;
    let mut a = DMatrix::<f64>::identity(n, n);
    let mut b = DVector::<f64>::zeros(n);
    for s in (0..n).filter(|&s| !mdp.is_terminal(s)) {
        b[s] = mdp.reward(policy[s], s);
        for &(s1, p) in mdp.transition(policy[s], s) {
            a[(s, s1)] -= gamma * p;
        }
    }
    match a.lu().solve(&b) {
        Some(v) if v.iter().all(|x| x.is_finite()) => Ok(v.iter().copied().collect()),
        _ => {
            warn!("singular policy evaluation system, iterating instead");
            evaluate_iteratively(mdp, policy, config)
        }
    }
}

fn evaluate_iteratively(
    mdp: &Mdp,
    policy: &[usize],
    config: &PolicyIterationConfig,
) -> Result<Vec<f64>> {
    let mut values = vec![0.0; mdp.num_states()];
    for _ in 0..config.max_sweeps {
        let mut change: f64 = 0.0;
        for s in (0..mdp.num_states()).filter(|&s| !mdp.is_terminal(s)) {
            let v = mdp.backup(policy[s], s, config.gamma, &values);
            change = change.max((v - values[s]).abs());
            values[s] = v;
        }
        if change < config.tolerance {
            return Ok(values);
        }
    }
    Err(RLError::Computation(format!(
        "policy evaluation did not converge within {} sweeps",
        config.max_sweeps
    )))
}

/// Greedy improvement; an action only changes on a strict gain. Returns the
/// number of changed states.
fn improve(mdp: &Mdp, policy: &mut [usize], gamma: f64, values: &[f64]) -> usize {
    let mut changed = 0;
    for s in (0..mdp.num_states()).filter(|&s| !mdp.is_terminal(s)) {
        let mut best = policy[s];
        let mut best_value = mdp.backup(best, s, gamma, values);
        for a in 0..mdp.num_actions() {
            let q = mdp.backup(a, s, gamma, values);
            if q > best_value + IMPROVEMENT_THRESHOLD {
                best = a;
                best_value = q;
            }
        }
        if best != policy[s] {
            policy[s] = best;
            changed += 1;
        }
    }
    changed
}

fn q_values(mdp: &Mdp, gamma: f64, values: &[f64]) -> Array2<f64> {
    Array2::from_shape_fn((mdp.num_actions(), mdp.num_states()), |(a, s)| {
        if mdp.is_terminal(s) {
            0.0
        } else {
            mdp.backup(a, s, gamma, values)
        }
    })
}
