//! Recurrent layer: a carried hidden state fed back through a self
//! connection, built from three connected sub-layers.

use std::io::{Read, Write};

use rand::Rng;

use crate::error::XcsfResult;
use crate::neural::activation::Activation;
use crate::neural::args::LayerArgs;
use crate::neural::connected::Connected;
use crate::neural::layer::{
    self, EVOLVE_ETA, EVOLVE_FUNCTIONS, EVOLVE_NEURONS, EVOLVE_WEIGHTS, MU_ETA, MU_FUNC,
    MU_NEURON, MU_WEIGHT,
};
use crate::params::Params;
use crate::sam;
use crate::serial;

#[derive(Clone, Debug)]
pub struct Recurrent {
    pub(crate) n_inputs: usize,
    pub(crate) n_outputs: usize,
    pub(crate) n_min: usize,
    pub(crate) n_max: usize,
    pub(crate) max_neuron_grow: usize,
    pub(crate) options: u32,
    pub(crate) eta: f64,
    pub(crate) eta_max: f64,
    pub(crate) eta_min: f64,
    /// `x -> h` projection
    pub(crate) input_layer: Connected,
    /// `h -> h` feedback
    pub(crate) self_layer: Connected,
    /// activation applied to the combined state
    pub(crate) output_layer: Connected,
    pub(crate) state: Vec<f64>,
    pub(crate) prev_state: Vec<f64>,
    delta_state: Vec<f64>,
    pub(crate) mu: Vec<f64>,
}

fn sub_args(n_inputs: usize, n: usize, function: Activation, args: &LayerArgs) -> LayerArgs {
    LayerArgs {
        kind: layer::LayerKind::Connected,
        n_inputs,
        n_init: n,
        n_max: n,
        function,
        eta: args.eta,
        eta_min: args.eta_min,
        momentum: args.momentum,
        decay: args.decay,
        sgd_weights: args.sgd_weights,
        ..LayerArgs::default()
    }
}

impl Recurrent {
    pub fn new(args: &LayerArgs, params: &Params, rng: &mut impl Rng) -> Self {
        let n = args.n_init;
        let options = args.opts();
        let input_layer = Connected::new(
            &sub_args(args.n_inputs, n, Activation::Linear, args),
            params,
            rng,
        );
        let self_layer = Connected::new(&sub_args(n, n, Activation::Linear, args), params, rng);
        let output_layer = Connected::new(&sub_args(n, n, args.function, args), params, rng);
        let eta = input_layer.eta;
        Self {
            n_inputs: args.n_inputs,
            n_outputs: n,
            n_min: args.n_init.max(1),
            n_max: args.n_max.max(args.n_init),
            max_neuron_grow: args.max_neuron_grow,
            options,
            eta,
            eta_max: args.eta.max(args.eta_min),
            eta_min: args.eta_min,
            input_layer,
            self_layer,
            output_layer,
            state: vec![0.0; n],
            prev_state: vec![0.0; n],
            delta_state: vec![0.0; n],
            mu: sam::init(&layer::base_rates(params), params.sam.min),
        }
    }

    pub fn output(&self) -> &[f64] {
        &self.output_layer.output
    }

    pub fn delta_mut(&mut self) -> &mut [f64] {
        &mut self.output_layer.delta
    }

    pub(crate) fn output_delta_mut(&mut self) -> (&[f64], &mut [f64]) {
        self.output_layer.output_delta_mut()
    }

    pub fn rand(&mut self, rng: &mut impl Rng) {
        self.input_layer.rand(rng);
        self.self_layer.rand(rng);
        self.output_layer.rand(rng);
    }

    pub fn forward(&mut self, input: &[f64]) {
        self.prev_state.copy_from_slice(&self.state);
        self.input_layer.forward(input);
        self.self_layer.forward(&self.prev_state);
        for i in 0..self.n_outputs {
            self.state[i] = self.input_layer.output[i] + self.self_layer.output[i];
        }
        self.output_layer.forward(&self.state);
    }

    pub fn backward(&mut self, input: &[f64], prev_delta: Option<&mut [f64]>) {
        self.delta_state.fill(0.0);
        self.output_layer
            .backward(&self.state, Some(&mut self.delta_state));
        self.self_layer.delta.copy_from_slice(&self.delta_state);
        self.input_layer.delta.copy_from_slice(&self.delta_state);
        self.self_layer.backward(&self.prev_state, None);
        self.input_layer.backward(input, prev_delta);
    }

    pub fn update(&mut self) {
        self.input_layer.update();
        self.self_layer.update();
        self.output_layer.update();
    }

    pub fn resize_inputs(&mut self, n_inputs: usize) {
        self.input_layer.resize_inputs(n_inputs);
        self.n_inputs = n_inputs;
    }

    fn set_neurons(&mut self, n: usize, rng: &mut impl Rng) {
        self.input_layer.set_neurons(n, rng);
        self.self_layer.set_neurons(n, rng);
        self.self_layer.resize_inputs(n);
        self.output_layer.set_neurons(n, rng);
        self.output_layer.resize_inputs(n);
        self.n_outputs = n;
        self.state = vec![0.0; n];
        self.prev_state = vec![0.0; n];
        self.delta_state = vec![0.0; n];
    }

    pub fn mutate(&mut self, params: &Params, rng: &mut impl Rng) -> bool {
        sam::adapt(&mut self.mu, params.sam.kind, params.sam.min, rng);
        let mut changed = false;
        if self.options & EVOLVE_ETA != 0
            && layer::mutate_eta(
                &mut self.eta,
                self.eta_min,
                self.eta_max,
                self.mu[MU_ETA],
                rng,
            )
        {
            self.input_layer.eta = self.eta;
            self.self_layer.eta = self.eta;
            self.output_layer.eta = self.eta;
            changed = true;
        }
        if self.options & EVOLVE_NEURONS != 0
            && self.max_neuron_grow > 0
            && rng.gen::<f64>() < self.mu[MU_NEURON]
        {
            let step = rng.gen_range(1..=self.max_neuron_grow) as isize;
            let step = if rng.gen_bool(0.5) { step } else { -step };
            let target = (self.n_outputs as isize + step)
                .clamp(self.n_min as isize, self.n_max as isize)
                as usize;
            if target != self.n_outputs {
                self.set_neurons(target, rng);
                changed = true;
            }
        }
        if self.options & EVOLVE_WEIGHTS != 0 {
            for sub in [
                &mut self.input_layer,
                &mut self.self_layer,
                &mut self.output_layer,
            ] {
                changed |=
                    layer::mutate_weights(&mut sub.weights, None, self.mu[MU_WEIGHT], rng);
                changed |= layer::mutate_weights(&mut sub.biases, None, self.mu[MU_WEIGHT], rng);
            }
        }
        if self.options & EVOLVE_FUNCTIONS != 0 && rng.gen::<f64>() < self.mu[MU_FUNC] {
            let new = Activation::uniform(rng);
            if new != self.output_layer.function {
                self.output_layer.function = new;
                changed = true;
            }
        }
        changed
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        serial::write_len(w, self.n_inputs)?;
        serial::write_len(w, self.n_outputs)?;
        serial::write_len(w, self.n_min)?;
        serial::write_len(w, self.n_max)?;
        serial::write_len(w, self.max_neuron_grow)?;
        serial::write_i32(w, self.options as i32)?;
        serial::write_f64(w, self.eta)?;
        serial::write_f64(w, self.eta_max)?;
        serial::write_f64(w, self.eta_min)?;
        self.input_layer.save(w)?;
        self.self_layer.save(w)?;
        self.output_layer.save(w)?;
        serial::write_f64_slice(w, &self.state)?;
        serial::write_f64_slice(w, &self.prev_state)?;
        serial::write_f64_slice(w, &self.mu)?;
        Ok(())
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        let n_inputs = serial::read_len(r)?;
        let n_outputs = serial::read_len(r)?;
        let n_min = serial::read_len(r)?;
        let n_max = serial::read_len(r)?;
        let max_neuron_grow = serial::read_len(r)?;
        let options = serial::read_i32(r)? as u32;
        let eta = serial::read_f64(r)?;
        let eta_max = serial::read_f64(r)?;
        let eta_min = serial::read_f64(r)?;
        let input_layer = Connected::load(r)?;
        let self_layer = Connected::load(r)?;
        let output_layer = Connected::load(r)?;
        let state = serial::read_f64_vec(r, n_outputs)?;
        let prev_state = serial::read_f64_vec(r, n_outputs)?;
        let mu = serial::read_f64_vec(r, layer::LAYER_N_MU)?;
        Ok(Self {
            n_inputs,
            n_outputs,
            n_min,
            n_max,
            max_neuron_grow,
            options,
            eta,
            eta_max,
            eta_min,
            input_layer,
            self_layer,
            output_layer,
            state,
            prev_state,
            delta_state: vec![0.0; n_outputs],
            mu,
        })
    }
}

impl std::fmt::Display for Recurrent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "recurrent: in={} out={} act={}",
            self.n_inputs, self.n_outputs, self.output_layer.function
        )
    }
}
