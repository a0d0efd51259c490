//! # Layer Arguments
//!
//! Template records describing a network before it is instantiated: one
//! record per layer, validated once and then consumed by [`crate::neural::Net`].

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{XcsfError, XcsfResult};
use crate::neural::activation::Activation;
use crate::neural::layer::{
    LayerKind, EVOLVE_CONNECT, EVOLVE_ETA, EVOLVE_FUNCTIONS, EVOLVE_NEURONS, EVOLVE_WEIGHTS,
    SGD_WEIGHTS,
};
use crate::serial;

/// Construction parameters for a single layer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LayerArgs {
    pub kind: LayerKind,

    /// Flat input count (non-image layers)
    pub n_inputs: usize,

    /// Initial neuron / filter count
    pub n_init: usize,

    /// Maximum neuron count when evolving
    pub n_max: usize,

    /// Maximum neurons added or removed per mutation event
    pub max_neuron_grow: usize,

    pub function: Activation,
    pub recurrent_function: Activation,

    /// Input image shape
    pub height: usize,
    pub width: usize,
    pub channels: usize,

    /// Kernel size / pooling window
    pub size: usize,
    pub stride: usize,
    pub pad: usize,

    pub eta: f64,
    pub eta_min: f64,
    pub momentum: f64,
    pub decay: f64,

    /// Dropout / noise probability
    pub probability: f64,

    /// Softmax temperature or noise standard deviation
    pub scale: f64,

    pub evolve_weights: bool,
    pub evolve_neurons: bool,
    pub evolve_functions: bool,
    pub evolve_eta: bool,
    pub evolve_connect: bool,
    pub sgd_weights: bool,
}

impl Default for LayerArgs {
    fn default() -> Self {
        Self {
            kind: LayerKind::Connected,
            n_inputs: 0,
            n_init: 0,
            n_max: 0,
            max_neuron_grow: 0,
            function: Activation::Logistic,
            recurrent_function: Activation::Logistic,
            height: 0,
            width: 0,
            channels: 0,
            size: 0,
            stride: 0,
            pad: 0,
            eta: 0.0,
            eta_min: 0.0,
            momentum: 0.0,
            decay: 0.0,
            probability: 0.0,
            scale: 1.0,
            evolve_weights: false,
            evolve_neurons: false,
            evolve_functions: false,
            evolve_eta: false,
            evolve_connect: false,
            sgd_weights: false,
        }
    }
}

impl LayerArgs {
    /// Derives the layer option bitset.
    pub fn opts(&self) -> u32 {
        let mut o = 0;
        if self.evolve_weights {
            o |= EVOLVE_WEIGHTS;
        }
        if self.evolve_neurons {
            o |= EVOLVE_NEURONS;
        }
        if self.evolve_functions {
            o |= EVOLVE_FUNCTIONS;
        }
        if self.evolve_eta {
            o |= EVOLVE_ETA;
        }
        if self.evolve_connect {
            o |= EVOLVE_CONNECT;
        }
        if self.sgd_weights {
            o |= SGD_WEIGHTS;
        }
        o
    }

    /// Validates a template chain, applying the documented fix-ups.
    ///
    /// All structural problems are fatal configuration errors.
    pub fn validate(args: &mut [LayerArgs]) -> XcsfResult<()> {
        let first = args
            .first_mut()
            .ok_or_else(|| XcsfError::config("empty layer argument list"))?;
        if matches!(first.kind, LayerKind::Dropout | LayerKind::Noise) {
            if first.n_inputs < 1 {
                first.n_inputs = first.channels * first.height * first.width;
            } else if first.channels < 1 || first.height < 1 || first.width < 1 {
                first.channels = 1;
                first.height = 1;
                first.width = first.n_inputs;
            }
        }
        if first.kind.receives_images() {
            if first.channels < 1 {
                return Err(XcsfError::config("input channels < 1"));
            }
            if first.height < 1 {
                return Err(XcsfError::config("input height < 1"));
            }
            if first.width < 1 {
                return Err(XcsfError::config("input width < 1"));
            }
        } else if first.n_inputs < 1 {
            return Err(XcsfError::config("number of inputs < 1"));
        }
        for arg in args.iter_mut() {
            if arg.evolve_neurons && arg.max_neuron_grow < 1 {
                return Err(XcsfError::config(
                    "evolving neurons but max_neuron_grow < 1",
                ));
            }
            if arg.n_max < arg.n_init {
                arg.n_max = arg.n_init;
            }
        }
        Ok(())
    }

    /// Writes a template chain with an `i32` length prefix.
    pub fn save_list<W: Write>(args: &[LayerArgs], w: &mut W) -> XcsfResult<()> {
        serial::write_len(w, args.len())?;
        for a in args {
            serial::write_i32(w, a.kind.code())?;
            serial::write_len(w, a.n_inputs)?;
            serial::write_len(w, a.n_init)?;
            serial::write_len(w, a.n_max)?;
            serial::write_len(w, a.max_neuron_grow)?;
            serial::write_i32(w, a.function.code())?;
            serial::write_i32(w, a.recurrent_function.code())?;
            serial::write_len(w, a.height)?;
            serial::write_len(w, a.width)?;
            serial::write_len(w, a.channels)?;
            serial::write_len(w, a.size)?;
            serial::write_len(w, a.stride)?;
            serial::write_len(w, a.pad)?;
            serial::write_f64(w, a.eta)?;
            serial::write_f64(w, a.eta_min)?;
            serial::write_f64(w, a.momentum)?;
            serial::write_f64(w, a.decay)?;
            serial::write_f64(w, a.probability)?;
            serial::write_f64(w, a.scale)?;
            serial::write_bool(w, a.evolve_weights)?;
            serial::write_bool(w, a.evolve_neurons)?;
            serial::write_bool(w, a.evolve_functions)?;
            serial::write_bool(w, a.evolve_eta)?;
            serial::write_bool(w, a.evolve_connect)?;
            serial::write_bool(w, a.sgd_weights)?;
        }
        Ok(())
    }

    /// Mirror of [`LayerArgs::save_list`].
    pub fn load_list<R: Read>(r: &mut R) -> XcsfResult<Vec<LayerArgs>> {
        let n = serial::read_len(r)?;
        let mut args = Vec::with_capacity(n);
        for _ in 0..n {
            args.push(LayerArgs {
                kind: LayerKind::from_code(serial::read_i32(r)?)?,
                n_inputs: serial::read_len(r)?,
                n_init: serial::read_len(r)?,
                n_max: serial::read_len(r)?,
                max_neuron_grow: serial::read_len(r)?,
                function: Activation::from_code(serial::read_i32(r)?)?,
                recurrent_function: Activation::from_code(serial::read_i32(r)?)?,
                height: serial::read_len(r)?,
                width: serial::read_len(r)?,
                channels: serial::read_len(r)?,
                size: serial::read_len(r)?,
                stride: serial::read_len(r)?,
                pad: serial::read_len(r)?,
                eta: serial::read_f64(r)?,
                eta_min: serial::read_f64(r)?,
                momentum: serial::read_f64(r)?,
                decay: serial::read_f64(r)?,
                probability: serial::read_f64(r)?,
                scale: serial::read_f64(r)?,
                evolve_weights: serial::read_bool(r)?,
                evolve_neurons: serial::read_bool(r)?,
                evolve_functions: serial::read_bool(r)?,
                evolve_eta: serial::read_bool(r)?,
                evolve_connect: serial::read_bool(r)?,
                sgd_weights: serial::read_bool(r)?,
            });
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_is_fatal() {
        assert!(LayerArgs::validate(&mut []).is_err());
    }

    #[test]
    fn test_zero_inputs_is_fatal() {
        let mut args = vec![LayerArgs::default()];
        assert!(LayerArgs::validate(&mut args).is_err());
    }

    #[test]
    fn test_image_dims_required() {
        let mut args = vec![LayerArgs {
            kind: LayerKind::Convolutional,
            height: 8,
            width: 8,
            channels: 0,
            ..LayerArgs::default()
        }];
        assert!(LayerArgs::validate(&mut args).is_err());
    }

    #[test]
    fn test_neuron_grow_required_when_evolving() {
        let mut args = vec![LayerArgs {
            n_inputs: 4,
            n_init: 2,
            evolve_neurons: true,
            max_neuron_grow: 0,
            ..LayerArgs::default()
        }];
        assert!(LayerArgs::validate(&mut args).is_err());
    }

    #[test]
    fn test_n_max_raised_to_n_init() {
        let mut args = vec![LayerArgs {
            n_inputs: 4,
            n_init: 8,
            n_max: 2,
            ..LayerArgs::default()
        }];
        LayerArgs::validate(&mut args).unwrap();
        assert_eq!(args[0].n_max, 8);
    }

    #[test]
    fn test_dropout_flat_input_fixup() {
        let mut args = vec![LayerArgs {
            kind: LayerKind::Dropout,
            n_inputs: 10,
            ..LayerArgs::default()
        }];
        LayerArgs::validate(&mut args).unwrap();
        assert_eq!(
            (args[0].channels, args[0].height, args[0].width),
            (1, 1, 10)
        );
    }

    #[test]
    fn test_opts_bitset() {
        let args = LayerArgs {
            evolve_weights: true,
            evolve_eta: true,
            sgd_weights: true,
            ..LayerArgs::default()
        };
        let o = args.opts();
        assert_ne!(o & EVOLVE_WEIGHTS, 0);
        assert_ne!(o & EVOLVE_ETA, 0);
        assert_ne!(o & SGD_WEIGHTS, 0);
        assert_eq!(o & EVOLVE_NEURONS, 0);
    }

    #[test]
    fn test_list_round_trip() {
        let args = vec![
            LayerArgs {
                n_inputs: 4,
                n_init: 8,
                n_max: 16,
                eta: 0.01,
                sgd_weights: true,
                ..LayerArgs::default()
            },
            LayerArgs {
                kind: LayerKind::Softmax,
                n_inputs: 8,
                scale: 1.0,
                ..LayerArgs::default()
            },
        ];
        let mut buf = Vec::new();
        LayerArgs::save_list(&args, &mut buf).unwrap();
        let loaded = LayerArgs::load_list(&mut buf.as_slice()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].n_init, 8);
        assert_eq!(loaded[1].kind, LayerKind::Softmax);
        let mut buf2 = Vec::new();
        LayerArgs::save_list(&loaded, &mut buf2).unwrap();
        assert_eq!(buf, buf2);
    }
}
