//! Neural conditions: a small network whose single output gates matching.

use std::io::{Read, Write};

use rand::Rng;

use crate::condition::MAX_COVER_RETRIES;
use crate::error::{XcsfError, XcsfResult};
use crate::neural::activation::Activation;
use crate::neural::args::LayerArgs;
use crate::neural::net::Net;
use crate::params::Params;

#[derive(Clone, Debug)]
pub struct NeuralCond {
    net: Net,
}

/// Hidden layer plus a single logistic output neuron.
fn templates(params: &Params) -> [LayerArgs; 2] {
    let hidden = LayerArgs {
        n_inputs: params.x_dim,
        n_init: params.cond.num_hidden.max(1),
        n_max: params.cond.max_hidden.max(params.cond.num_hidden.max(1)),
        max_neuron_grow: if params.cond.evolve_neurons { 1 } else { 0 },
        function: params.cond.activation,
        eta: params.cond.eta,
        evolve_weights: params.cond.evolve_weights,
        evolve_neurons: params.cond.evolve_neurons,
        evolve_functions: params.cond.evolve_functions,
        ..LayerArgs::default()
    };
    let output = LayerArgs {
        n_init: 1,
        n_max: 1,
        function: Activation::Logistic,
        eta: params.cond.eta,
        evolve_weights: params.cond.evolve_weights,
        evolve_functions: false,
        ..LayerArgs::default()
    };
    [hidden, output]
}

impl NeuralCond {
    pub fn new(params: &Params, rng: &mut impl Rng) -> XcsfResult<Self> {
        let net = Net::from_args(&templates(params), params, rng)?;
        Ok(Self { net })
    }

    pub fn matches(&mut self, x: &[f64], rng: &mut impl Rng) -> bool {
        self.net.propagate(x, rng);
        self.net.output_value(0) > 0.5
    }

    /// Re-randomises the network until it matches the input.
    pub fn cover(&mut self, x: &[f64], rng: &mut impl Rng) -> XcsfResult<()> {
        for _ in 0..MAX_COVER_RETRIES {
            self.net.rand(rng);
            if self.matches(x, rng) {
                return Ok(());
            }
        }
        tracing::warn!("neural covering exhausted its retry limit");
        Err(XcsfError::Covering {
            trials: MAX_COVER_RETRIES,
        })
    }

    pub fn mutate(&mut self, params: &Params, rng: &mut impl Rng) -> bool {
        self.net.mutate(params, rng)
    }

    /// Enabled weight count.
    pub fn size(&self) -> usize {
        self.net.size()
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

impl std::fmt::Display for NeuralCond {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "neural: in={} hidden={}",
            self.net.n_inputs(),
            self.net.layer(0).n_outputs()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn neural_params() -> Params {
        let mut params = Params::default();
        params.x_dim = 4;
        params.cond.num_hidden = 5;
        params.cond.max_hidden = 5;
        params
    }

    #[test]
    fn test_cover_terminates_within_bounded_attempts() {
        // the logistic output straddles 0.5, so a match is always reachable
        let params = neural_params();
        let mut rng = StdRng::seed_from_u64(0);
        let mut cond = NeuralCond::new(&params, &mut rng).unwrap();
        let x = [0.2, 0.4, 0.6, 0.8];
        cond.cover(&x, &mut rng).unwrap();
        assert!(cond.matches(&x, &mut rng));
    }

    #[test]
    fn test_mutation_changes_network() {
        let mut params = neural_params();
        params.cond.evolve_weights = true;
        params.mutation.p = 1.0;
        params.sam.min = 1.0;
        let mut rng = StdRng::seed_from_u64(1);
        let mut cond = NeuralCond::new(&params, &mut rng).unwrap();
        assert!(cond.mutate(&params, &mut rng));
    }

    #[test]
    fn test_save_load_round_trip() {
        let params = neural_params();
        let mut rng = StdRng::seed_from_u64(2);
        let cond = NeuralCond::new(&params, &mut rng).unwrap();
        let mut buf = Vec::new();
        cond.save(&mut buf).unwrap();
        let loaded = NeuralCond::load(&mut buf.as_slice()).unwrap();
        let mut buf2 = Vec::new();
        loaded.save(&mut buf2).unwrap();
        assert_eq!(buf, buf2);
    }
}
