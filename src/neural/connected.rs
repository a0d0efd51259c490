//! # Connected Layer
//!
//! A fully-connected layer with a sparsity mask over its weights. The same
//! structure is reused as the building block of the recurrent and LSTM
//! layers.

use std::io::{Read, Write};

use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::XcsfResult;
use crate::neural::activation::Activation;
use crate::neural::args::LayerArgs;
use crate::neural::layer::{
    self, EVOLVE_CONNECT, EVOLVE_ETA, EVOLVE_FUNCTIONS, EVOLVE_NEURONS, EVOLVE_WEIGHTS,
    MU_CONNECT, MU_ETA, MU_FUNC, MU_NEURON, MU_WEIGHT, NEURON_MAX, NEURON_MIN, SGD_WEIGHTS,
    WEIGHT_SD,
};
use crate::params::Params;
use crate::sam;
use crate::serial;

/// A dense layer of neurons
#[derive(Clone, Debug)]
pub struct Connected {
    pub(crate) n_inputs: usize,
    pub(crate) n_outputs: usize,

    /// Lower bound when evolving the neuron count
    pub(crate) n_min: usize,

    /// Upper bound when evolving the neuron count
    pub(crate) n_max: usize,

    pub(crate) max_neuron_grow: usize,
    pub(crate) function: Activation,
    pub(crate) options: u32,
    pub(crate) eta: f64,
    pub(crate) eta_max: f64,
    pub(crate) eta_min: f64,
    pub(crate) momentum: f64,
    pub(crate) decay: f64,

    /// `n_outputs x n_inputs`, row-major
    pub(crate) weights: Vec<f64>,

    /// Sparsity mask over the weights
    pub(crate) active: Vec<bool>,

    /// Number of enabled weights
    pub(crate) n_active: usize,

    pub(crate) biases: Vec<f64>,
    pub(crate) weight_updates: Vec<f64>,
    pub(crate) bias_updates: Vec<f64>,

    /// Pre-activation state
    pub(crate) state: Vec<f64>,

    pub(crate) output: Vec<f64>,
    pub(crate) delta: Vec<f64>,

    /// Self-adaptive mutation rates
    pub(crate) mu: Vec<f64>,
}

impl Connected {
    pub fn new(args: &LayerArgs, params: &Params, rng: &mut impl Rng) -> Self {
        let n_inputs = args.n_inputs;
        let n_outputs = args.n_init;
        let n_weights = n_inputs * n_outputs;
        let options = args.opts();
        let eta = if options & EVOLVE_ETA != 0 {
            rng.gen_range(args.eta_min..=args.eta.max(args.eta_min))
        } else {
            args.eta
        };
        let mut l = Self {
            n_inputs,
            n_outputs,
            n_min: args.n_init.max(1),
            n_max: args.n_max.max(args.n_init),
            max_neuron_grow: args.max_neuron_grow,
            function: args.function,
            options,
            eta,
            eta_max: args.eta.max(args.eta_min),
            eta_min: args.eta_min,
            momentum: args.momentum,
            decay: args.decay,
            weights: vec![0.0; n_weights],
            active: vec![true; n_weights],
            n_active: n_weights,
            biases: vec![0.0; n_outputs],
            weight_updates: vec![0.0; n_weights],
            bias_updates: vec![0.0; n_outputs],
            state: vec![0.0; n_outputs],
            output: vec![0.0; n_outputs],
            delta: vec![0.0; n_outputs],
            mu: sam::init(&layer::base_rates(params), params.sam.min),
        };
        l.rand(rng);
        l
    }

    /// Re-draws every enabled weight and zeroes the biases.
    pub fn rand(&mut self, rng: &mut impl Rng) {
        for (w, &a) in self.weights.iter_mut().zip(&self.active) {
            let z: f64 = rng.sample(StandardNormal);
            *w = if a { z * WEIGHT_SD } else { 0.0 };
        }
        for b in &mut self.biases {
            *b = 0.0;
        }
    }

    pub fn forward(&mut self, input: &[f64]) {
        debug_assert_eq!(input.len(), self.n_inputs);
        for i in 0..self.n_outputs {
            let mut sum = self.biases[i];
            let row = i * self.n_inputs;
            for j in 0..self.n_inputs {
                sum += self.weights[row + j] * input[j];
            }
            self.state[i] = sum.clamp(NEURON_MIN, NEURON_MAX);
            self.output[i] = self.function.apply(self.state[i]);
        }
    }

    pub fn backward(&mut self, input: &[f64], prev_delta: Option<&mut [f64]>) {
        for i in 0..self.n_outputs {
            self.delta[i] *= self.function.gradient(self.state[i]);
            self.bias_updates[i] += self.delta[i];
            let row = i * self.n_inputs;
            for j in 0..self.n_inputs {
                self.weight_updates[row + j] += self.delta[i] * input[j];
            }
        }
        if let Some(prev_delta) = prev_delta {
            for i in 0..self.n_outputs {
                let row = i * self.n_inputs;
                for j in 0..self.n_inputs {
                    prev_delta[j] += self.delta[i] * self.weights[row + j];
                }
            }
        }
    }

    pub fn update(&mut self) {
        if self.options & SGD_WEIGHTS == 0 {
            return;
        }
        for i in 0..self.n_outputs {
            self.biases[i] += self.eta * self.bias_updates[i];
            self.bias_updates[i] *= self.momentum;
        }
        for k in 0..self.weights.len() {
            if self.active[k] {
                self.weight_updates[k] -= self.decay * self.weights[k];
                self.weights[k] =
                    layer::clamp_weight(self.weights[k] + self.eta * self.weight_updates[k]);
            }
            self.weight_updates[k] *= self.momentum;
        }
    }

    /// Adjusts `n_inputs` to the upstream layer's output count, keeping the
    /// weights of surviving input positions and zeroing new ones.
    pub fn resize_inputs(&mut self, n_inputs: usize) {
        let n_weights = n_inputs * self.n_outputs;
        let mut weights = vec![0.0; n_weights];
        let mut active = vec![true; n_weights];
        for i in 0..self.n_outputs {
            for j in 0..n_inputs.min(self.n_inputs) {
                weights[i * n_inputs + j] = self.weights[i * self.n_inputs + j];
                active[i * n_inputs + j] = self.active[i * self.n_inputs + j];
            }
        }
        self.n_inputs = n_inputs;
        self.weights = weights;
        self.active = active;
        self.weight_updates = vec![0.0; n_weights];
        self.recount_active();
    }

    /// Grows or shrinks the neuron count, preserving surviving neurons.
    pub fn set_neurons(&mut self, n_outputs: usize, rng: &mut impl Rng) {
        let n_weights = self.n_inputs * n_outputs;
        let mut weights = vec![0.0; n_weights];
        let mut active = vec![true; n_weights];
        let mut biases = vec![0.0; n_outputs];
        let keep = n_outputs.min(self.n_outputs);
        for i in 0..keep {
            for j in 0..self.n_inputs {
                weights[i * self.n_inputs + j] = self.weights[i * self.n_inputs + j];
                active[i * self.n_inputs + j] = self.active[i * self.n_inputs + j];
            }
            biases[i] = self.biases[i];
        }
        for i in keep..n_outputs {
            for j in 0..self.n_inputs {
                let z: f64 = rng.sample(StandardNormal);
                weights[i * self.n_inputs + j] = z * WEIGHT_SD;
            }
        }
        self.n_outputs = n_outputs;
        self.weights = weights;
        self.active = active;
        self.biases = biases;
        self.weight_updates = vec![0.0; n_weights];
        self.bias_updates = vec![0.0; n_outputs];
        self.state = vec![0.0; n_outputs];
        self.output = vec![0.0; n_outputs];
        self.delta = vec![0.0; n_outputs];
        self.recount_active();
    }

    pub fn mutate(&mut self, params: &Params, rng: &mut impl Rng) -> bool {
        sam::adapt(&mut self.mu, params.sam.kind, params.sam.min, rng);
        let mut changed = false;
        if self.options & EVOLVE_ETA != 0 {
            changed |= layer::mutate_eta(
                &mut self.eta,
                self.eta_min,
                self.eta_max,
                self.mu[MU_ETA],
                rng,
            );
        }
        if self.options & EVOLVE_NEURONS != 0 {
            changed |= self.mutate_neurons(rng);
        }
        if self.options & EVOLVE_WEIGHTS != 0 {
            changed |= layer::mutate_weights(
                &mut self.weights,
                Some(&self.active),
                self.mu[MU_WEIGHT],
                rng,
            );
            changed |= layer::mutate_weights(&mut self.biases, None, self.mu[MU_WEIGHT], rng);
        }
        if self.options & EVOLVE_CONNECT != 0 {
            changed |= self.mutate_connectivity(rng);
        }
        if self.options & EVOLVE_FUNCTIONS != 0 && rng.gen::<f64>() < self.mu[MU_FUNC] {
            let new = Activation::uniform(rng);
            if new != self.function {
                self.function = new;
                changed = true;
            }
        }
        changed
    }

    fn mutate_neurons(&mut self, rng: &mut impl Rng) -> bool {
        if self.max_neuron_grow < 1 || rng.gen::<f64>() >= self.mu[MU_NEURON] {
            return false;
        }
        let step = rng.gen_range(1..=self.max_neuron_grow) as isize;
        let step = if rng.gen_bool(0.5) { step } else { -step };
        let target = (self.n_outputs as isize + step)
            .clamp(self.n_min as isize, self.n_max as isize) as usize;
        if target == self.n_outputs {
            return false;
        }
        self.set_neurons(target, rng);
        true
    }

    fn mutate_connectivity(&mut self, rng: &mut impl Rng) -> bool {
        let mut changed = false;
        for i in 0..self.n_outputs {
            let row = i * self.n_inputs;
            for j in 0..self.n_inputs {
                if rng.gen::<f64>() >= self.mu[MU_CONNECT] {
                    continue;
                }
                let k = row + j;
                if self.active[k] {
                    // a neuron keeps at least one enabled input
                    let row_active = self.active[row..row + self.n_inputs]
                        .iter()
                        .filter(|&&a| a)
                        .count();
                    if row_active > 1 {
                        self.active[k] = false;
                        self.weights[k] = 0.0;
                        changed = true;
                    }
                } else {
                    self.active[k] = true;
                    let z: f64 = rng.sample(StandardNormal);
                    self.weights[k] = z * WEIGHT_SD;
                    changed = true;
                }
            }
        }
        if changed {
            self.recount_active();
        }
        changed
    }

    fn recount_active(&mut self) {
        self.n_active = self.active.iter().filter(|&&a| a).count();
    }

    pub(crate) fn output_delta_mut(&mut self) -> (&[f64], &mut [f64]) {
        (&self.output, &mut self.delta)
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        serial::write_len(w, self.n_inputs)?;
        serial::write_len(w, self.n_outputs)?;
        serial::write_len(w, self.n_min)?;
        serial::write_len(w, self.n_max)?;
        serial::write_len(w, self.max_neuron_grow)?;
        serial::write_i32(w, self.function.code())?;
        serial::write_i32(w, self.options as i32)?;
        serial::write_f64(w, self.eta)?;
        serial::write_f64(w, self.eta_max)?;
        serial::write_f64(w, self.eta_min)?;
        serial::write_f64(w, self.momentum)?;
        serial::write_f64(w, self.decay)?;
        serial::write_f64_slice(w, &self.weights)?;
        serial::write_bool_slice(w, &self.active)?;
        serial::write_f64_slice(w, &self.biases)?;
        serial::write_f64_slice(w, &self.weight_updates)?;
        serial::write_f64_slice(w, &self.bias_updates)?;
        serial::write_f64_slice(w, &self.mu)?;
        Ok(())
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        let n_inputs = serial::read_len(r)?;
        let n_outputs = serial::read_len(r)?;
        let n_min = serial::read_len(r)?;
        let n_max = serial::read_len(r)?;
        let max_neuron_grow = serial::read_len(r)?;
        let function = Activation::from_code(serial::read_i32(r)?)?;
        let options = serial::read_i32(r)? as u32;
        let eta = serial::read_f64(r)?;
        let eta_max = serial::read_f64(r)?;
        let eta_min = serial::read_f64(r)?;
        let momentum = serial::read_f64(r)?;
        let decay = serial::read_f64(r)?;
        let n_weights = n_inputs * n_outputs;
        let weights = serial::read_f64_vec(r, n_weights)?;
        let active = serial::read_bool_vec(r, n_weights)?;
        let biases = serial::read_f64_vec(r, n_outputs)?;
        let weight_updates = serial::read_f64_vec(r, n_weights)?;
        let bias_updates = serial::read_f64_vec(r, n_outputs)?;
        let mu = serial::read_f64_vec(r, layer::LAYER_N_MU)?;
        let n_active = active.iter().filter(|&&a| a).count();
        Ok(Self {
            n_inputs,
            n_outputs,
            n_min,
            n_max,
            max_neuron_grow,
            function,
            options,
            eta,
            eta_max,
            eta_min,
            momentum,
            decay,
            weights,
            active,
            n_active,
            biases,
            weight_updates,
            bias_updates,
            state: vec![0.0; n_outputs],
            output: vec![0.0; n_outputs],
            delta: vec![0.0; n_outputs],
            mu,
        })
    }
}

impl std::fmt::Display for Connected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "connected: in={} out={} act={} active={}/{} eta={:.5}",
            self.n_inputs,
            self.n_outputs,
            self.function,
            self.n_active,
            self.weights.len(),
            self.eta
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn layer_2_1() -> Connected {
        // 2 inputs, 1 output, identity activation, SGD enabled
        let mut rng = StdRng::seed_from_u64(0);
        let args = LayerArgs {
            n_inputs: 2,
            n_init: 1,
            n_max: 1,
            function: Activation::Linear,
            eta: 0.1,
            sgd_weights: true,
            ..LayerArgs::default()
        };
        let mut l = Connected::new(&args, &Params::default(), &mut rng);
        l.weights = vec![1.0, -1.0];
        l.biases = vec![0.0];
        l
    }

    #[test]
    fn test_forward_dot_product() {
        let mut l = layer_2_1();
        l.forward(&[0.5, 0.25]);
        assert!((l.output[0] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_single_sgd_step() {
        // truth 1.0 with eta 0.1: dw = eta*delta*x, db = eta*delta
        let mut l = layer_2_1();
        l.forward(&[0.5, 0.25]);
        l.delta[0] = 1.0 - l.output[0];
        l.backward(&[0.5, 0.25], None);
        l.update();
        assert!((l.weights[0] - 1.0375).abs() < 1e-12);
        assert!((l.weights[1] - -0.98125).abs() < 1e-12);
        assert!((l.biases[0] - 0.075).abs() < 1e-12);
    }

    #[test]
    fn test_momentum_scales_accumulators() {
        let mut l = layer_2_1();
        l.momentum = 0.5;
        l.forward(&[0.5, 0.25]);
        l.delta[0] = 0.75;
        l.backward(&[0.5, 0.25], None);
        l.update();
        assert!((l.bias_updates[0] - 0.375).abs() < 1e-12);
        // momentum 0 zeroes them
        let mut l = layer_2_1();
        l.forward(&[0.5, 0.25]);
        l.delta[0] = 0.75;
        l.backward(&[0.5, 0.25], None);
        l.update();
        assert_eq!(l.bias_updates[0], 0.0);
    }

    #[test]
    fn test_backward_accumulates_prev_delta() {
        let mut l = layer_2_1();
        l.forward(&[0.5, 0.25]);
        l.delta[0] = 2.0;
        let mut prev = vec![0.0; 2];
        l.backward(&[0.5, 0.25], Some(&mut prev));
        assert_eq!(prev, vec![2.0, -2.0]);
    }

    #[test]
    fn test_resize_preserves_surviving_weights() {
        let mut rng = StdRng::seed_from_u64(1);
        let args = LayerArgs {
            n_inputs: 3,
            n_init: 2,
            n_max: 2,
            ..LayerArgs::default()
        };
        let mut l = Connected::new(&args, &Params::default(), &mut rng);
        let before = l.weights.clone();
        l.resize_inputs(5);
        assert_eq!(l.n_inputs, 5);
        for i in 0..2 {
            for j in 0..3 {
                assert_eq!(l.weights[i * 5 + j], before[i * 3 + j]);
            }
            for j in 3..5 {
                assert_eq!(l.weights[i * 5 + j], 0.0);
            }
        }
    }

    #[test]
    fn test_set_neurons_keeps_prefix_rows() {
        let mut rng = StdRng::seed_from_u64(2);
        let args = LayerArgs {
            n_inputs: 4,
            n_init: 8,
            n_max: 12,
            ..LayerArgs::default()
        };
        let mut l = Connected::new(&args, &Params::default(), &mut rng);
        let before = l.weights.clone();
        l.set_neurons(12, &mut rng);
        assert_eq!(l.n_outputs, 12);
        assert_eq!(l.weights[..8 * 4], before[..]);
        l.set_neurons(8, &mut rng);
        assert_eq!(l.weights[..], before[..]);
    }

    #[test]
    fn test_mutate_respects_flags() {
        let mut rng = StdRng::seed_from_u64(3);
        let args = LayerArgs {
            n_inputs: 2,
            n_init: 2,
            n_max: 2,
            ..LayerArgs::default()
        };
        // no evolution flags at all: mutation can never report change
        let mut l = Connected::new(&args, &Params::default(), &mut rng);
        let mut params = Params::default();
        params.mutation.p = 1.0;
        params.sam.min = 1.0;
        for _ in 0..10 {
            assert!(!l.mutate(&params, &mut rng));
        }
    }

    #[test]
    fn test_mutate_weights_reports_change() {
        let mut rng = StdRng::seed_from_u64(4);
        let args = LayerArgs {
            n_inputs: 2,
            n_init: 2,
            n_max: 2,
            evolve_weights: true,
            ..LayerArgs::default()
        };
        let mut l = Connected::new(&args, &Params::default(), &mut rng);
        let mut params = Params::default();
        params.mutation.p = 1.0;
        params.sam.min = 1.0;
        let before = l.weights.clone();
        assert!(l.mutate(&params, &mut rng));
        assert_ne!(before, l.weights);
    }

    #[test]
    fn test_save_load_round_trip() {
        let mut rng = StdRng::seed_from_u64(5);
        let args = LayerArgs {
            n_inputs: 3,
            n_init: 4,
            n_max: 6,
            eta: 0.05,
            sgd_weights: true,
            evolve_weights: true,
            ..LayerArgs::default()
        };
        let l = Connected::new(&args, &Params::default(), &mut rng);
        let mut buf = Vec::new();
        l.save(&mut buf).unwrap();
        let loaded = Connected::load(&mut buf.as_slice()).unwrap();
        let mut buf2 = Vec::new();
        loaded.save(&mut buf2).unwrap();
        assert_eq!(buf, buf2);
    }
}
