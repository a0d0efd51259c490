//! Global average-pooling layer: one output per channel.

use std::io::{Read, Write};

use crate::error::XcsfResult;
use crate::neural::args::LayerArgs;
use crate::serial;

#[derive(Clone, Debug)]
pub struct AvgPool {
    pub(crate) height: usize,
    pub(crate) width: usize,
    pub(crate) channels: usize,
    pub(crate) output: Vec<f64>,
    pub(crate) delta: Vec<f64>,
}

impl AvgPool {
    pub fn new(args: &LayerArgs) -> Self {
        Self {
            height: args.height,
            width: args.width,
            channels: args.channels,
            output: vec![0.0; args.channels],
            delta: vec![0.0; args.channels],
        }
    }

    pub fn n_inputs(&self) -> usize {
        self.height * self.width * self.channels
    }

    pub fn forward(&mut self, input: &[f64]) {
        let area = self.height * self.width;
        debug_assert_eq!(input.len(), area * self.channels);
        for k in 0..self.channels {
            let start = k * area;
            self.output[k] = input[start..start + area].iter().sum::<f64>() / area as f64;
        }
    }

    pub fn backward(&mut self, prev_delta: Option<&mut [f64]>) {
        if let Some(prev_delta) = prev_delta {
            let area = self.height * self.width;
            for k in 0..self.channels {
                let g = self.delta[k] / area as f64;
                for i in 0..area {
                    prev_delta[k * area + i] += g;
                }
            }
        }
    }

    pub fn resize(&mut self, shape: (usize, usize, usize)) {
        (self.height, self.width, self.channels) = shape;
        self.output = vec![0.0; self.channels];
        self.delta = vec![0.0; self.channels];
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        serial::write_len(w, self.height)?;
        serial::write_len(w, self.width)?;
        serial::write_len(w, self.channels)?;
        Ok(())
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        let height = serial::read_len(r)?;
        let width = serial::read_len(r)?;
        let channels = serial::read_len(r)?;
        Ok(Self {
            height,
            width,
            channels,
            output: vec![0.0; channels],
            delta: vec![0.0; channels],
        })
    }
}

impl std::fmt::Display for AvgPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "avgpool: {}x{}x{} -> {}",
            self.height, self.width, self.channels, self.channels
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_means() {
        let args = LayerArgs {
            height: 2,
            width: 2,
            channels: 2,
            ..LayerArgs::default()
        };
        let mut l = AvgPool::new(&args);
        l.forward(&[1.0, 2.0, 3.0, 4.0, 10.0, 10.0, 10.0, 10.0]);
        assert_eq!(l.output, vec![2.5, 10.0]);
    }

    #[test]
    fn test_backward_spreads_gradient() {
        let args = LayerArgs {
            height: 2,
            width: 2,
            channels: 1,
            ..LayerArgs::default()
        };
        let mut l = AvgPool::new(&args);
        l.delta = vec![4.0];
        let mut prev = vec![0.0; 4];
        l.backward(Some(&mut prev));
        assert_eq!(prev, vec![1.0; 4]);
    }
}
