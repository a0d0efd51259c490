//! Neural actions: a softmax network advocating by argmax.

use std::io::{Read, Write};

use rand::Rng;

use crate::condition::MAX_COVER_RETRIES;
use crate::error::{XcsfError, XcsfResult};
use crate::neural::activation::Activation;
use crate::neural::args::LayerArgs;
use crate::neural::layer::LayerKind;
use crate::neural::net::Net;
use crate::params::Params;

#[derive(Clone, Debug)]
pub struct NeuralAction {
    net: Net,
}

/// Hidden layer, linear projection to the action count, softmax head.
fn templates(params: &Params) -> [LayerArgs; 3] {
    let hidden = LayerArgs {
        n_inputs: params.x_dim,
        n_init: params.cond.num_hidden.max(1),
        n_max: params.cond.max_hidden.max(params.cond.num_hidden.max(1)),
        max_neuron_grow: if params.cond.evolve_neurons { 1 } else { 0 },
        function: params.cond.activation,
        evolve_weights: params.cond.evolve_weights,
        evolve_neurons: params.cond.evolve_neurons,
        evolve_functions: params.cond.evolve_functions,
        ..LayerArgs::default()
    };
    let project = LayerArgs {
        n_init: params.n_actions.max(1),
        n_max: params.n_actions.max(1),
        function: Activation::Linear,
        evolve_weights: params.cond.evolve_weights,
        ..LayerArgs::default()
    };
    let head = LayerArgs {
        kind: LayerKind::Softmax,
        scale: 1.0,
        ..LayerArgs::default()
    };
    [hidden, project, head]
}

fn argmax(v: &[f64]) -> usize {
    let mut best = 0;
    for i in 1..v.len() {
        if v[i] > v[best] {
            best = i;
        }
    }
    best
}

impl NeuralAction {
    pub fn new(params: &Params, rng: &mut impl Rng) -> XcsfResult<Self> {
        let net = Net::from_args(&templates(params), params, rng)?;
        Ok(Self { net })
    }

    pub fn compute(&mut self, x: &[f64], rng: &mut impl Rng) -> usize {
        self.net.propagate(x, rng);
        argmax(self.net.output())
    }

    /// Re-randomises until the network advocates the requested action.
    pub fn cover(&mut self, x: &[f64], action: usize, rng: &mut impl Rng) -> XcsfResult<()> {
        for _ in 0..MAX_COVER_RETRIES {
            self.net.rand(rng);
            if self.compute(x, rng) == action {
                return Ok(());
            }
        }
        tracing::warn!("action covering exhausted its retry limit");
        Err(XcsfError::Covering {
            trials: MAX_COVER_RETRIES,
        })
    }

    pub fn mutate(&mut self, params: &Params, rng: &mut impl Rng) -> bool {
        self.net.mutate(params, rng)
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        self.net.save(w)
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        Ok(Self {
            net: Net::load(r)?,
        })
    }
}

impl std::fmt::Display for NeuralAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "neural: in={} actions={}",
            self.net.n_inputs(),
            self.net.n_outputs()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn action_params() -> Params {
        let mut params = Params::default();
        params.x_dim = 2;
        params.n_actions = 3;
        params
    }

    #[test]
    fn test_compute_is_in_range() {
        let params = action_params();
        let mut rng = StdRng::seed_from_u64(0);
        let mut act = NeuralAction::new(&params, &mut rng).unwrap();
        let a = act.compute(&[0.4, 0.6], &mut rng);
        assert!(a < 3);
    }

    #[test]
    fn test_cover_reaches_each_action() {
        let params = action_params();
        let mut rng = StdRng::seed_from_u64(1);
        let mut act = NeuralAction::new(&params, &mut rng).unwrap();
        let x = [0.4, 0.6];
        for target in 0..3 {
            act.cover(&x, target, &mut rng).unwrap();
            assert_eq!(act.compute(&x, &mut rng), target);
        }
    }
}
