//! Neural predictions: a gradient-trained network per classifier.

use std::io::{Read, Write};

use rand::Rng;

use crate::error::XcsfResult;
use crate::neural::activation::Activation;
use crate::neural::args::LayerArgs;
use crate::neural::net::Net;
use crate::params::Params;

#[derive(Clone, Debug)]
pub struct NeuralPred {
    net: Net,
}

/// Hidden layer plus a linear output layer sized to the target.
fn templates(params: &Params) -> [LayerArgs; 2] {
    let hidden = LayerArgs {
        n_inputs: params.x_dim,
        n_init: params.pred.num_hidden.max(1),
        n_max: params.pred.max_hidden.max(params.pred.num_hidden.max(1)),
        max_neuron_grow: if params.pred.evolve_neurons { 1 } else { 0 },
        function: params.pred.activation,
        eta: params.pred.eta,
        eta_min: params.pred.eta / 10.0,
        momentum: params.pred.momentum,
        sgd_weights: params.pred.sgd_weights,
        evolve_weights: params.pred.evolve_weights,
        evolve_neurons: params.pred.evolve_neurons,
        evolve_functions: params.pred.evolve_functions,
        evolve_eta: params.pred.evolve_eta,
        ..LayerArgs::default()
    };
    let output = LayerArgs {
        n_init: params.y_dim,
        n_max: params.y_dim,
        function: Activation::Linear,
        eta: params.pred.eta,
        eta_min: params.pred.eta / 10.0,
        momentum: params.pred.momentum,
        sgd_weights: params.pred.sgd_weights,
        evolve_weights: params.pred.evolve_weights,
        evolve_eta: params.pred.evolve_eta,
        ..LayerArgs::default()
    };
    [hidden, output]
}

impl NeuralPred {
    pub fn new(params: &Params, rng: &mut impl Rng) -> XcsfResult<Self> {
        let net = Net::from_args(&templates(params), params, rng)?;
        Ok(Self { net })
    }

    pub fn compute(&mut self, x: &[f64], rng: &mut impl Rng) -> &[f64] {
        self.net.propagate(x, rng);
        self.net.output()
    }

    /// One gradient step toward the target, reusing the forward pass from
    /// [`NeuralPred::compute`].
    pub fn update(&mut self, x: &[f64], y: &[f64]) {
        self.net.learn(y, x);
    }

    pub fn mutate(&mut self, params: &Params, rng: &mut impl Rng) -> bool {
        self.net.mutate(params, rng)
    }

    pub fn pre(&self) -> &[f64] {
        self.net.output()
    }

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

impl std::fmt::Display for NeuralPred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "neural: in={} out={}",
            self.net.n_inputs(),
            self.net.n_outputs()
        )
    }
}
