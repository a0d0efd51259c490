//! Additive Gaussian noise layer.

use std::io::{Read, Write};

use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::XcsfResult;
use crate::neural::args::LayerArgs;
use crate::serial;

#[derive(Clone, Debug)]
pub struct Noise {
    pub(crate) n_inputs: usize,
    /// Probability a unit is perturbed
    pub(crate) probability: f64,
    /// Standard deviation of the perturbation
    pub(crate) scale: f64,
    pub(crate) height: usize,
    pub(crate) width: usize,
    pub(crate) channels: usize,
    pub(crate) output: Vec<f64>,
    pub(crate) delta: Vec<f64>,
}

impl Noise {
    pub fn new(args: &LayerArgs) -> Self {
        let n = args.n_inputs;
        Self {
            n_inputs: n,
            probability: args.probability,
            scale: args.scale,
            height: args.height.max(1),
            width: args.width.max(1),
            channels: args.channels.max(1),
            output: vec![0.0; n],
            delta: vec![0.0; n],
        }
    }

    pub fn forward(&mut self, input: &[f64], rng: &mut impl Rng) {
        debug_assert_eq!(input.len(), self.n_inputs);
        for i in 0..self.n_inputs {
            self.output[i] = input[i];
            if rng.gen::<f64>() < self.probability {
                let z: f64 = rng.sample(StandardNormal);
                self.output[i] += z * self.scale;
            }
        }
    }

    pub fn backward(&mut self, prev_delta: Option<&mut [f64]>) {
        if let Some(prev_delta) = prev_delta {
            for i in 0..self.n_inputs {
                prev_delta[i] += self.delta[i];
            }
        }
    }

    pub fn resize(&mut self, n_inputs: usize, shape: (usize, usize, usize)) {
        self.n_inputs = n_inputs;
        (self.height, self.width, self.channels) = shape;
        self.output = vec![0.0; n_inputs];
        self.delta = vec![0.0; n_inputs];
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        serial::write_len(w, self.n_inputs)?;
        serial::write_f64(w, self.probability)?;
        serial::write_f64(w, self.scale)?;
        serial::write_len(w, self.height)?;
        serial::write_len(w, self.width)?;
        serial::write_len(w, self.channels)?;
        Ok(())
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        let n_inputs = serial::read_len(r)?;
        let probability = serial::read_f64(r)?;
        let scale = serial::read_f64(r)?;
        let height = serial::read_len(r)?;
        let width = serial::read_len(r)?;
        let channels = serial::read_len(r)?;
        Ok(Self {
            n_inputs,
            probability,
            scale,
            height,
            width,
            channels,
            output: vec![0.0; n_inputs],
            delta: vec![0.0; n_inputs],
        })
    }
}

impl std::fmt::Display for Noise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "noise: in={} p={} scale={}",
            self.n_inputs, self.probability, self.scale
        )
    }
}
