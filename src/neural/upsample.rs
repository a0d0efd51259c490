//! Nearest-neighbour upsampling layer.

use std::io::{Read, Write};

use crate::error::XcsfResult;
use crate::neural::args::LayerArgs;
use crate::serial;

#[derive(Clone, Debug)]
pub struct Upsample {
    pub(crate) height: usize,
    pub(crate) width: usize,
    pub(crate) channels: usize,
    pub(crate) stride: usize,
    pub(crate) output: Vec<f64>,
    pub(crate) delta: Vec<f64>,
}

impl Upsample {
    pub fn new(args: &LayerArgs) -> Self {
        let stride = args.stride.max(1);
        let n_outputs = args.height * stride * args.width * stride * args.channels;
        Self {
            height: args.height,
            width: args.width,
            channels: args.channels,
            stride,
            output: vec![0.0; n_outputs],
            delta: vec![0.0; n_outputs],
        }
    }

    pub fn n_inputs(&self) -> usize {
        self.height * self.width * self.channels
    }

    pub fn n_outputs(&self) -> usize {
        self.height * self.stride * self.width * self.stride * self.channels
    }

    pub fn out_h(&self) -> usize {
        self.height * self.stride
    }

    pub fn out_w(&self) -> usize {
        self.width * self.stride
    }

    pub fn forward(&mut self, input: &[f64]) {
        debug_assert_eq!(input.len(), self.n_inputs());
        let (oh, ow) = (self.out_h(), self.out_w());
        for k in 0..self.channels {
            for y in 0..oh {
                for x in 0..ow {
                    let src = (k * self.height + y / self.stride) * self.width + x / self.stride;
                    self.output[(k * oh + y) * ow + x] = input[src];
                }
            }
        }
    }

    pub fn backward(&mut self, prev_delta: Option<&mut [f64]>) {
        if let Some(prev_delta) = prev_delta {
            let (oh, ow) = (self.out_h(), self.out_w());
            for k in 0..self.channels {
                for y in 0..oh {
                    for x in 0..ow {
                        let src =
                            (k * self.height + y / self.stride) * self.width + x / self.stride;
                        prev_delta[src] += self.delta[(k * oh + y) * ow + x];
                    }
                }
            }
        }
    }

    pub fn resize(&mut self, shape: (usize, usize, usize)) {
        (self.height, self.width, self.channels) = shape;
        let n_outputs = self.n_outputs();
        self.output = vec![0.0; n_outputs];
        self.delta = vec![0.0; n_outputs];
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        serial::write_len(w, self.height)?;
        serial::write_len(w, self.width)?;
        serial::write_len(w, self.channels)?;
        serial::write_len(w, self.stride)?;
        Ok(())
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        let args = LayerArgs {
            height: serial::read_len(r)?,
            width: serial::read_len(r)?,
            channels: serial::read_len(r)?,
            stride: serial::read_len(r)?,
            ..LayerArgs::default()
        };
        Ok(Self::new(&args))
    }
}

impl std::fmt::Display for Upsample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "upsample: {}x{}x{} stride={}",
            self.height, self.width, self.channels, self.stride
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_each_pixel() {
        let args = LayerArgs {
            height: 1,
            width: 2,
            channels: 1,
            stride: 2,
            ..LayerArgs::default()
        };
        let mut l = Upsample::new(&args);
        l.forward(&[1.0, 2.0]);
        assert_eq!(l.output, vec![1.0, 1.0, 2.0, 2.0, 1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_backward_sums_gradient() {
        let args = LayerArgs {
            height: 1,
            width: 1,
            channels: 1,
            stride: 2,
            ..LayerArgs::default()
        };
        let mut l = Upsample::new(&args);
        l.delta = vec![1.0, 2.0, 3.0, 4.0];
        let mut prev = vec![0.0];
        l.backward(Some(&mut prev));
        assert_eq!(prev, vec![10.0]);
    }
}
