//! 2-D convolutional layer with direct-loop propagation.

use std::io::{Read, Write};

use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::XcsfResult;
use crate::neural::activation::Activation;
use crate::neural::args::LayerArgs;
use crate::neural::layer::{
    self, EVOLVE_ETA, EVOLVE_FUNCTIONS, EVOLVE_WEIGHTS, MU_ETA, MU_FUNC, MU_WEIGHT, NEURON_MAX,
    NEURON_MIN, SGD_WEIGHTS, WEIGHT_SD,
};
use crate::params::Params;
use crate::sam;
use crate::serial;

#[derive(Clone, Debug)]
pub struct Convolutional {
    pub(crate) height: usize,
    pub(crate) width: usize,
    pub(crate) channels: usize,
    pub(crate) n_filters: usize,
    pub(crate) size: usize,
    pub(crate) stride: usize,
    pub(crate) pad: usize,
    pub(crate) out_h: usize,
    pub(crate) out_w: usize,
    pub(crate) function: Activation,
    pub(crate) options: u32,
    pub(crate) eta: f64,
    pub(crate) eta_max: f64,
    pub(crate) eta_min: f64,
    pub(crate) momentum: f64,
    pub(crate) decay: f64,
    /// `n_filters x (channels * size * size)`
    pub(crate) weights: Vec<f64>,
    pub(crate) biases: Vec<f64>,
    pub(crate) weight_updates: Vec<f64>,
    pub(crate) bias_updates: Vec<f64>,
    pub(crate) state: Vec<f64>,
    pub(crate) output: Vec<f64>,
    pub(crate) delta: Vec<f64>,
    pub(crate) mu: Vec<f64>,
}

fn conv_dim(dim: usize, size: usize, stride: usize, pad: usize) -> usize {
    (dim + 2 * pad - size) / stride + 1
}

impl Convolutional {
    pub fn new(args: &LayerArgs, params: &Params, rng: &mut impl Rng) -> Self {
        let n_filters = args.n_init;
        let out_h = conv_dim(args.height, args.size, args.stride, args.pad);
        let out_w = conv_dim(args.width, args.size, args.stride, args.pad);
        let n_weights = n_filters * args.channels * args.size * args.size;
        let n_outputs = n_filters * out_h * out_w;
        let options = args.opts();
        let eta = if options & EVOLVE_ETA != 0 {
            rng.gen_range(args.eta_min..=args.eta.max(args.eta_min))
        } else {
            args.eta
        };
        let mut l = Self {
            height: args.height,
            width: args.width,
            channels: args.channels,
            n_filters,
            size: args.size,
            stride: args.stride,
            pad: args.pad,
            out_h,
            out_w,
            function: args.function,
            options,
            eta,
            eta_max: args.eta.max(args.eta_min),
            eta_min: args.eta_min,
            momentum: args.momentum,
            decay: args.decay,
            weights: vec![0.0; n_weights],
            biases: vec![0.0; n_filters],
            weight_updates: vec![0.0; n_weights],
            bias_updates: vec![0.0; n_filters],
            state: vec![0.0; n_outputs],
            output: vec![0.0; n_outputs],
            delta: vec![0.0; n_outputs],
            mu: sam::init(&layer::base_rates(params), params.sam.min),
        };
        l.rand(rng);
        l
    }

    pub fn n_inputs(&self) -> usize {
        self.height * self.width * self.channels
    }

    pub fn n_outputs(&self) -> usize {
        self.n_filters * self.out_h * self.out_w
    }

    fn kernel_len(&self) -> usize {
        self.channels * self.size * self.size
    }

    pub fn rand(&mut self, rng: &mut impl Rng) {
        for w in &mut self.weights {
            let z: f64 = rng.sample(StandardNormal);
            *w = z * WEIGHT_SD;
        }
        for b in &mut self.biases {
            *b = 0.0;
        }
    }

    pub fn forward(&mut self, input: &[f64]) {
        debug_assert_eq!(input.len(), self.n_inputs());
        let area = self.height * self.width;
        let klen = self.kernel_len();
        for f in 0..self.n_filters {
            for oy in 0..self.out_h {
                for ox in 0..self.out_w {
                    let mut sum = self.biases[f];
                    for c in 0..self.channels {
                        for ky in 0..self.size {
                            for kx in 0..self.size {
                                let iy = (oy * self.stride + ky) as isize - self.pad as isize;
                                let ix = (ox * self.stride + kx) as isize - self.pad as isize;
                                if iy < 0
                                    || ix < 0
                                    || iy >= self.height as isize
                                    || ix >= self.width as isize
                                {
                                    continue;
                                }
                                let wi = f * klen + (c * self.size + ky) * self.size + kx;
                                let ii = c * area + iy as usize * self.width + ix as usize;
                                sum += self.weights[wi] * input[ii];
                            }
                        }
                    }
                    let o = (f * self.out_h + oy) * self.out_w + ox;
                    self.state[o] = sum.clamp(NEURON_MIN, NEURON_MAX);
                    self.output[o] = self.function.apply(self.state[o]);
                }
            }
        }
    }

    pub fn backward(&mut self, input: &[f64], mut prev_delta: Option<&mut [f64]>) {
        let area = self.height * self.width;
        let klen = self.kernel_len();
        for f in 0..self.n_filters {
            for oy in 0..self.out_h {
                for ox in 0..self.out_w {
                    let o = (f * self.out_h + oy) * self.out_w + ox;
                    self.delta[o] *= self.function.gradient(self.state[o]);
                    let d = self.delta[o];
                    self.bias_updates[f] += d;
                    for c in 0..self.channels {
                        for ky in 0..self.size {
                            for kx in 0..self.size {
                                let iy = (oy * self.stride + ky) as isize - self.pad as isize;
                                let ix = (ox * self.stride + kx) as isize - self.pad as isize;
                                if iy < 0
                                    || ix < 0
                                    || iy >= self.height as isize
                                    || ix >= self.width as isize
                                {
                                    continue;
                                }
                                let wi = f * klen + (c * self.size + ky) * self.size + kx;
                                let ii = c * area + iy as usize * self.width + ix as usize;
                                self.weight_updates[wi] += d * input[ii];
                                if let Some(prev_delta) = prev_delta.as_deref_mut() {
                                    prev_delta[ii] += d * self.weights[wi];
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    pub fn update(&mut self) {
        if self.options & SGD_WEIGHTS == 0 {
            return;
        }
        for f in 0..self.n_filters {
            self.biases[f] += self.eta * self.bias_updates[f];
            self.bias_updates[f] *= self.momentum;
        }
        for k in 0..self.weights.len() {
            self.weight_updates[k] -= self.decay * self.weights[k];
            self.weights[k] =
                layer::clamp_weight(self.weights[k] + self.eta * self.weight_updates[k]);
            self.weight_updates[k] *= self.momentum;
        }
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
        if self.options & EVOLVE_WEIGHTS != 0 {
            changed |= layer::mutate_weights(&mut self.weights, None, self.mu[MU_WEIGHT], rng);
            changed |= layer::mutate_weights(&mut self.biases, None, self.mu[MU_WEIGHT], rng);
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

    /// Rebuilds for a new input shape, preserving kernels of surviving
    /// channels.
    pub fn resize(&mut self, shape: (usize, usize, usize), rng: &mut impl Rng) {
        let (height, width, channels) = shape;
        let old_klen = self.kernel_len();
        let new_klen = channels * self.size * self.size;
        let mut weights = vec![0.0; self.n_filters * new_klen];
        for f in 0..self.n_filters {
            for c in 0..channels.min(self.channels) {
                for k in 0..self.size * self.size {
                    weights[f * new_klen + c * self.size * self.size + k] =
                        self.weights[f * old_klen + c * self.size * self.size + k];
                }
            }
            for c in self.channels..channels {
                for k in 0..self.size * self.size {
                    let z: f64 = rng.sample(StandardNormal);
                    weights[f * new_klen + c * self.size * self.size + k] = z * WEIGHT_SD;
                }
            }
        }
        self.height = height;
        self.width = width;
        self.channels = channels;
        self.out_h = conv_dim(height, self.size, self.stride, self.pad);
        self.out_w = conv_dim(width, self.size, self.stride, self.pad);
        self.weights = weights;
        self.weight_updates = vec![0.0; self.n_filters * new_klen];
        let n_outputs = self.n_outputs();
        self.state = vec![0.0; n_outputs];
        self.output = vec![0.0; n_outputs];
        self.delta = vec![0.0; n_outputs];
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        serial::write_len(w, self.height)?;
        serial::write_len(w, self.width)?;
        serial::write_len(w, self.channels)?;
        serial::write_len(w, self.n_filters)?;
        serial::write_len(w, self.size)?;
        serial::write_len(w, self.stride)?;
        serial::write_len(w, self.pad)?;
        serial::write_i32(w, self.function.code())?;
        serial::write_i32(w, self.options as i32)?;
        serial::write_f64(w, self.eta)?;
        serial::write_f64(w, self.eta_max)?;
        serial::write_f64(w, self.eta_min)?;
        serial::write_f64(w, self.momentum)?;
        serial::write_f64(w, self.decay)?;
        serial::write_f64_slice(w, &self.weights)?;
        serial::write_f64_slice(w, &self.biases)?;
        serial::write_f64_slice(w, &self.weight_updates)?;
        serial::write_f64_slice(w, &self.bias_updates)?;
        serial::write_f64_slice(w, &self.mu)?;
        Ok(())
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        let height = serial::read_len(r)?;
        let width = serial::read_len(r)?;
        let channels = serial::read_len(r)?;
        let n_filters = serial::read_len(r)?;
        let size = serial::read_len(r)?;
        let stride = serial::read_len(r)?;
        let pad = serial::read_len(r)?;
        let function = Activation::from_code(serial::read_i32(r)?)?;
        let options = serial::read_i32(r)? as u32;
        let eta = serial::read_f64(r)?;
        let eta_max = serial::read_f64(r)?;
        let eta_min = serial::read_f64(r)?;
        let momentum = serial::read_f64(r)?;
        let decay = serial::read_f64(r)?;
        let n_weights = n_filters * channels * size * size;
        let weights = serial::read_f64_vec(r, n_weights)?;
        let biases = serial::read_f64_vec(r, n_filters)?;
        let weight_updates = serial::read_f64_vec(r, n_weights)?;
        let bias_updates = serial::read_f64_vec(r, n_filters)?;
        let mu = serial::read_f64_vec(r, layer::LAYER_N_MU)?;
        let out_h = conv_dim(height, size, stride, pad);
        let out_w = conv_dim(width, size, stride, pad);
        let n_outputs = n_filters * out_h * out_w;
        Ok(Self {
            height,
            width,
            channels,
            n_filters,
            size,
            stride,
            pad,
            out_h,
            out_w,
            function,
            options,
            eta,
            eta_max,
            eta_min,
            momentum,
            decay,
            weights,
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

impl std::fmt::Display for Convolutional {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "conv: {}x{}x{} filters={} size={} stride={} pad={} act={}",
            self.height,
            self.width,
            self.channels,
            self.n_filters,
            self.size,
            self.stride,
            self.pad,
            self.function
        )
    }
}
