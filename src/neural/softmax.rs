//! Softmax layer with a temperature scale.

use std::io::{Read, Write};

use crate::error::XcsfResult;
use crate::neural::args::LayerArgs;
use crate::serial;

#[derive(Clone, Debug)]
pub struct Softmax {
    pub(crate) n_inputs: usize,
    pub(crate) scale: f64,
    pub(crate) output: Vec<f64>,
    pub(crate) delta: Vec<f64>,
}

impl Softmax {
    pub fn new(args: &LayerArgs) -> Self {
        Self {
            n_inputs: args.n_inputs,
            scale: args.scale,
            output: vec![0.0; args.n_inputs],
            delta: vec![0.0; args.n_inputs],
        }
    }

    pub fn forward(&mut self, input: &[f64]) {
        debug_assert_eq!(input.len(), self.n_inputs);
        let largest = input.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let mut sum = 0.0;
        for i in 0..self.n_inputs {
            let e = (self.scale * (input[i] - largest)).exp();
            self.output[i] = e;
            sum += e;
        }
        for o in &mut self.output {
            *o /= sum;
        }
    }

    pub fn backward(&mut self, prev_delta: Option<&mut [f64]>) {
        if let Some(prev_delta) = prev_delta {
            for i in 0..self.n_inputs {
                prev_delta[i] += self.delta[i];
            }
        }
    }

    pub fn resize(&mut self, n_inputs: usize) {
        self.n_inputs = n_inputs;
        self.output = vec![0.0; n_inputs];
        self.delta = vec![0.0; n_inputs];
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        serial::write_len(w, self.n_inputs)?;
        serial::write_f64(w, self.scale)?;
        Ok(())
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        let n_inputs = serial::read_len(r)?;
        let scale = serial::read_f64(r)?;
        Ok(Self {
            n_inputs,
            scale,
            output: vec![0.0; n_inputs],
            delta: vec![0.0; n_inputs],
        })
    }
}

impl std::fmt::Display for Softmax {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "softmax: in={} scale={}", self.n_inputs, self.scale)
    }
}
