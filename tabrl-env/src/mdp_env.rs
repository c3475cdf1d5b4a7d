//! Environment that samples a known tabular MDP

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution as _, WeightedIndex};
use tracing::debug;

use tabrl_core::{Environment, Mdp, RLError, Result, Step};

/// Plays an [`Mdp`]: successors are drawn from its transition
/// distributions, episodes start in a uniformly chosen initial state.
#[derive(Debug, Clone)]
pub struct MdpEnv {
    mdp: Mdp,
    rng: StdRng,
    state: usize,
    done: bool,
}

impl MdpEnv {
    /// Create an environment over `mdp`; `seed` fixes the sampled
    /// trajectories
    #[must_use]
    pub fn new(mdp: Mdp, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let state = sample_initial(&mdp, &mut rng);
        debug!(
            num_states = mdp.num_states(),
            num_actions = mdp.num_actions(),
            "created MDP environment"
        );
        Self {
            mdp,
            rng,
            state,
            done: false,
        }
    }

    /// The underlying MDP
    #[must_use]
    pub fn mdp(&self) -> &Mdp {
        &self.mdp
    }
}

impl Environment for MdpEnv {
    fn num_states(&self) -> usize {
        self.mdp.num_states()
    }

    fn num_actions(&self) -> usize {
        self.mdp.num_actions()
    }

    fn interact(&mut self, action: usize) -> Result<Step> {
        if action >= self.mdp.num_actions() {
            return Err(RLError::InvalidAction(format!(
                "action {action} outside 0..{}",
                self.mdp.num_actions()
            )));
        }
        if self.done {
            return Err(RLError::Environment(
                "interact called on a finished episode; reset first".into(),
            ));
        }

        let dist = self.mdp.transition(action, self.state);
        let weights = WeightedIndex::new(dist.iter().map(|&(_, p)| p))
            .map_err(|e| RLError::Computation(format!("transition sampling failed: {e}")))?;
        let next = dist[weights.sample(&mut self.rng)].0;
        let reward = self.mdp.reward(action, self.state);

        self.state = next;
        self.done = self.mdp.is_terminal(next);
        Ok(if self.done {
            Step::terminal(next, reward)
        } else {
            Step::running(next, reward)
        })
    }

    fn reset(&mut self) -> Result<()> {
        self.state = sample_initial(&self.mdp, &mut self.rng);
        self.done = false;
        Ok(())
    }

    fn state(&self) -> (usize, bool) {
        (self.state, self.done)
    }
}

fn sample_initial<R: Rng>(mdp: &Mdp, rng: &mut R) -> usize {
    let initial = mdp.initial_states();
    initial[rng.gen_range(0..initial.len())]
}
