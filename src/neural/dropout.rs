//! Dropout layer with inverted scaling.

use std::io::{Read, Write};

use rand::Rng;

use crate::error::XcsfResult;
use crate::neural::args::LayerArgs;
use crate::serial;

#[derive(Clone, Debug)]
pub struct Dropout {
    pub(crate) n_inputs: usize,
    pub(crate) probability: f64,
    /// Input image shape carried through for downstream image layers
    pub(crate) height: usize,
    pub(crate) width: usize,
    pub(crate) channels: usize,
    /// Scale applied to surviving units, sampled per forward pass
    pub(crate) mask: Vec<f64>,
    pub(crate) output: Vec<f64>,
    pub(crate) delta: Vec<f64>,
}

impl Dropout {
    pub fn new(args: &LayerArgs) -> Self {
        let n = args.n_inputs;
        Self {
            n_inputs: n,
            probability: args.probability,
            height: args.height.max(1),
            width: args.width.max(1),
            channels: args.channels.max(1),
            mask: vec![0.0; n],
            output: vec![0.0; n],
            delta: vec![0.0; n],
        }
    }

    pub fn forward(&mut self, input: &[f64], rng: &mut impl Rng) {
        debug_assert_eq!(input.len(), self.n_inputs);
        let scale = 1.0 / (1.0 - self.probability);
        for i in 0..self.n_inputs {
            self.mask[i] = if rng.gen::<f64>() < self.probability {
                0.0
            } else {
                scale
            };
            self.output[i] = input[i] * self.mask[i];
        }
    }

    pub fn backward(&mut self, prev_delta: Option<&mut [f64]>) {
        if let Some(prev_delta) = prev_delta {
            for i in 0..self.n_inputs {
                prev_delta[i] += self.delta[i] * self.mask[i];
            }
        }
    }

    pub fn resize(&mut self, n_inputs: usize, shape: (usize, usize, usize)) {
        self.n_inputs = n_inputs;
        (self.height, self.width, self.channels) = shape;
        self.mask = vec![0.0; n_inputs];
        self.output = vec![0.0; n_inputs];
        self.delta = vec![0.0; n_inputs];
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        serial::write_len(w, self.n_inputs)?;
        serial::write_f64(w, self.probability)?;
        serial::write_len(w, self.height)?;
        serial::write_len(w, self.width)?;
        serial::write_len(w, self.channels)?;
        Ok(())
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        let n_inputs = serial::read_len(r)?;
        let probability = serial::read_f64(r)?;
        let height = serial::read_len(r)?;
        let width = serial::read_len(r)?;
        let channels = serial::read_len(r)?;
        Ok(Self {
            n_inputs,
            probability,
            height,
            width,
            channels,
            mask: vec![0.0; n_inputs],
            output: vec![0.0; n_inputs],
            delta: vec![0.0; n_inputs],
        })
    }
}

impl std::fmt::Display for Dropout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dropout: in={} p={}", self.n_inputs, self.probability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_zero_probability_is_identity() {
        let args = LayerArgs {
            n_inputs: 4,
            probability: 0.0,
            ..LayerArgs::default()
        };
        let mut l = Dropout::new(&args);
        let mut rng = StdRng::seed_from_u64(0);
        l.forward(&[1.0, 2.0, 3.0, 4.0], &mut rng);
        assert_eq!(l.output, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_dropped_units_block_gradient() {
        let args = LayerArgs {
            n_inputs: 100,
            probability: 0.5,
            ..LayerArgs::default()
        };
        let mut l = Dropout::new(&args);
        let mut rng = StdRng::seed_from_u64(1);
        l.forward(&vec![1.0; 100], &mut rng);
        l.delta = vec![1.0; 100];
        let mut prev = vec![0.0; 100];
        l.backward(Some(&mut prev));
        for i in 0..100 {
            assert_eq!(prev[i], l.mask[i]);
        }
        assert!(l.output.iter().any(|&o| o == 0.0));
        assert!(l.output.iter().any(|&o| o == 2.0));
    }
}
