//! # Layer Dispatch
//!
//! The layer sum type and the uniform operation set shared by every kind.
//! Variants own their substrate state; the kind tag doubles as the
//! persistence discriminant.

use std::io::{Read, Write};

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::error::{XcsfError, XcsfResult};
use crate::neural::args::LayerArgs;
use crate::neural::avgpool::AvgPool;
use crate::neural::connected::Connected;
use crate::neural::convolutional::Convolutional;
use crate::neural::dropout::Dropout;
use crate::neural::lstm::Lstm;
use crate::neural::maxpool::MaxPool;
use crate::neural::noise::Noise;
use crate::neural::recurrent::Recurrent;
use crate::neural::softmax::Softmax;
use crate::neural::upsample::Upsample;
use crate::params::Params;

/// Layer option bits
pub const EVOLVE_WEIGHTS: u32 = 1;
pub const EVOLVE_NEURONS: u32 = 1 << 1;
pub const EVOLVE_FUNCTIONS: u32 = 1 << 2;
pub const EVOLVE_ETA: u32 = 1 << 3;
pub const EVOLVE_CONNECT: u32 = 1 << 4;
pub const SGD_WEIGHTS: u32 = 1 << 5;

/// Pre-activation state bounds
pub(crate) const NEURON_MIN: f64 = -100.0;
pub(crate) const NEURON_MAX: f64 = 100.0;

/// Weight bounds
pub(crate) const WEIGHT_MIN: f64 = -10.0;
pub(crate) const WEIGHT_MAX: f64 = 10.0;

/// Standard deviation of weight initialisation and perturbation
pub(crate) const WEIGHT_SD: f64 = 0.1;

/// Indices into a layer's self-adaptive rate vector
pub(crate) const MU_WEIGHT: usize = 0;
pub(crate) const MU_NEURON: usize = 1;
pub(crate) const MU_FUNC: usize = 2;
pub(crate) const MU_ETA: usize = 3;
pub(crate) const MU_CONNECT: usize = 4;
pub(crate) const LAYER_N_MU: usize = 5;

/// Base rates seeding a layer's rate vector
pub(crate) fn base_rates(params: &Params) -> [f64; LAYER_N_MU] {
    [
        params.mutation.p,
        params.mutation.s,
        params.mutation.f,
        params.mutation.e,
        params.mutation.p,
    ]
}

pub(crate) fn clamp_weight(w: f64) -> f64 {
    w.clamp(WEIGHT_MIN, WEIGHT_MAX)
}

/// Gaussian perturbation of weights, each with the given probability.
///
/// When an activity mask is supplied only enabled weights are touched.
pub(crate) fn mutate_weights(
    weights: &mut [f64],
    active: Option<&[bool]>,
    rate: f64,
    rng: &mut impl Rng,
) -> bool {
    let mut changed = false;
    for (k, w) in weights.iter_mut().enumerate() {
        if let Some(active) = active {
            if !active[k] {
                continue;
            }
        }
        if rng.gen::<f64>() < rate {
            let z: f64 = rng.sample(StandardNormal);
            let new = clamp_weight(*w + z * WEIGHT_SD);
            if new != *w {
                *w = new;
                changed = true;
            }
        }
    }
    changed
}

/// Log-normal perturbation of a learning rate within `[min, max]`.
pub(crate) fn mutate_eta(
    eta: &mut f64,
    min: f64,
    max: f64,
    mu: f64,
    rng: &mut impl Rng,
) -> bool {
    let z: f64 = rng.sample(StandardNormal);
    let new = (*eta * (z * mu).exp()).clamp(min, max);
    if new != *eta {
        *eta = new;
        true
    } else {
        false
    }
}

/// Layer kind tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerKind {
    Connected,
    Recurrent,
    Lstm,
    Softmax,
    Dropout,
    Noise,
    AvgPool,
    MaxPool,
    Upsample,
    Convolutional,
}

const KINDS: [LayerKind; 10] = [
    LayerKind::Connected,
    LayerKind::Recurrent,
    LayerKind::Lstm,
    LayerKind::Softmax,
    LayerKind::Dropout,
    LayerKind::Noise,
    LayerKind::AvgPool,
    LayerKind::MaxPool,
    LayerKind::Upsample,
    LayerKind::Convolutional,
];

impl LayerKind {
    pub fn from_code(code: i32) -> XcsfResult<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|i| KINDS.get(i).copied())
            .ok_or_else(|| XcsfError::serialization(format!("invalid layer kind: {code}")))
    }

    pub fn code(self) -> i32 {
        KINDS.iter().position(|&k| k == self).unwrap_or(0) as i32
    }

    /// Whether this kind expects image-shaped input.
    pub fn receives_images(self) -> bool {
        matches!(
            self,
            Self::Convolutional | Self::MaxPool | Self::AvgPool | Self::Upsample
        )
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Recurrent => write!(f, "recurrent"),
            Self::Lstm => write!(f, "lstm"),
            Self::Softmax => write!(f, "softmax"),
            Self::Dropout => write!(f, "dropout"),
            Self::Noise => write!(f, "noise"),
            Self::AvgPool => write!(f, "avgpool"),
            Self::MaxPool => write!(f, "maxpool"),
            Self::Upsample => write!(f, "upsample"),
            Self::Convolutional => write!(f, "convolutional"),
        }
    }
}

/// A neural network layer
#[derive(Clone, Debug)]
pub enum Layer {
    Connected(Connected),
    Recurrent(Recurrent),
    Lstm(Lstm),
    Softmax(Softmax),
    Dropout(Dropout),
    Noise(Noise),
    AvgPool(AvgPool),
    MaxPool(MaxPool),
    Upsample(Upsample),
    Convolutional(Convolutional),
}

impl Layer {
    /// Instantiates a layer from its template record.
    pub fn from_args(args: &LayerArgs, params: &Params, rng: &mut impl Rng) -> Self {
        match args.kind {
            LayerKind::Connected => Self::Connected(Connected::new(args, params, rng)),
            LayerKind::Recurrent => Self::Recurrent(Recurrent::new(args, params, rng)),
            LayerKind::Lstm => Self::Lstm(Lstm::new(args, params, rng)),
            LayerKind::Softmax => Self::Softmax(Softmax::new(args)),
            LayerKind::Dropout => Self::Dropout(Dropout::new(args)),
            LayerKind::Noise => Self::Noise(Noise::new(args)),
            LayerKind::AvgPool => Self::AvgPool(AvgPool::new(args)),
            LayerKind::MaxPool => Self::MaxPool(MaxPool::new(args)),
            LayerKind::Upsample => Self::Upsample(Upsample::new(args)),
            LayerKind::Convolutional => {
                Self::Convolutional(Convolutional::new(args, params, rng))
            }
        }
    }

    pub fn kind(&self) -> LayerKind {
        match self {
            Self::Connected(_) => LayerKind::Connected,
            Self::Recurrent(_) => LayerKind::Recurrent,
            Self::Lstm(_) => LayerKind::Lstm,
            Self::Softmax(_) => LayerKind::Softmax,
            Self::Dropout(_) => LayerKind::Dropout,
            Self::Noise(_) => LayerKind::Noise,
            Self::AvgPool(_) => LayerKind::AvgPool,
            Self::MaxPool(_) => LayerKind::MaxPool,
            Self::Upsample(_) => LayerKind::Upsample,
            Self::Convolutional(_) => LayerKind::Convolutional,
        }
    }

    pub fn n_inputs(&self) -> usize {
        match self {
            Self::Connected(l) => l.n_inputs,
            Self::Recurrent(l) => l.n_inputs,
            Self::Lstm(l) => l.n_inputs,
            Self::Softmax(l) => l.n_inputs,
            Self::Dropout(l) => l.n_inputs,
            Self::Noise(l) => l.n_inputs,
            Self::AvgPool(l) => l.n_inputs(),
            Self::MaxPool(l) => l.n_inputs(),
            Self::Upsample(l) => l.n_inputs(),
            Self::Convolutional(l) => l.n_inputs(),
        }
    }

    pub fn n_outputs(&self) -> usize {
        match self {
            Self::Connected(l) => l.n_outputs,
            Self::Recurrent(l) => l.n_outputs,
            Self::Lstm(l) => l.n_outputs,
            Self::Softmax(l) => l.n_inputs,
            Self::Dropout(l) => l.n_inputs,
            Self::Noise(l) => l.n_inputs,
            Self::AvgPool(l) => l.channels,
            Self::MaxPool(l) => l.n_outputs(),
            Self::Upsample(l) => l.n_outputs(),
            Self::Convolutional(l) => l.n_outputs(),
        }
    }

    /// Output shape as `(height, width, channels)`.
    pub fn out_shape(&self) -> (usize, usize, usize) {
        match self {
            Self::Dropout(l) => (l.height, l.width, l.channels),
            Self::Noise(l) => (l.height, l.width, l.channels),
            Self::AvgPool(l) => (1, 1, l.channels),
            Self::MaxPool(l) => (l.out_h, l.out_w, l.channels),
            Self::Upsample(l) => (l.out_h(), l.out_w(), l.channels),
            Self::Convolutional(l) => (l.out_h, l.out_w, l.n_filters),
            _ => (1, 1, self.n_outputs()),
        }
    }

    pub fn output(&self) -> &[f64] {
        match self {
            Self::Connected(l) => &l.output,
            Self::Recurrent(l) => l.output(),
            Self::Lstm(l) => l.output(),
            Self::Softmax(l) => &l.output,
            Self::Dropout(l) => &l.output,
            Self::Noise(l) => &l.output,
            Self::AvgPool(l) => &l.output,
            Self::MaxPool(l) => &l.output,
            Self::Upsample(l) => &l.output,
            Self::Convolutional(l) => &l.output,
        }
    }

    pub fn delta_mut(&mut self) -> &mut [f64] {
        match self {
            Self::Connected(l) => &mut l.delta,
            Self::Recurrent(l) => l.delta_mut(),
            Self::Lstm(l) => l.delta_mut(),
            Self::Softmax(l) => &mut l.delta,
            Self::Dropout(l) => &mut l.delta,
            Self::Noise(l) => &mut l.delta,
            Self::AvgPool(l) => &mut l.delta,
            Self::MaxPool(l) => &mut l.delta,
            Self::Upsample(l) => &mut l.delta,
            Self::Convolutional(l) => &mut l.delta,
        }
    }

    /// Simultaneous read of the output and write access to the delta.
    pub(crate) fn output_delta_mut(&mut self) -> (&[f64], &mut [f64]) {
        match self {
            Self::Connected(l) => l.output_delta_mut(),
            Self::Recurrent(l) => l.output_delta_mut(),
            Self::Lstm(l) => l.output_delta_mut(),
            Self::Softmax(l) => (&l.output, &mut l.delta),
            Self::Dropout(l) => (&l.output, &mut l.delta),
            Self::Noise(l) => (&l.output, &mut l.delta),
            Self::AvgPool(l) => (&l.output, &mut l.delta),
            Self::MaxPool(l) => (&l.output, &mut l.delta),
            Self::Upsample(l) => (&l.output, &mut l.delta),
            Self::Convolutional(l) => (&l.output, &mut l.delta),
        }
    }

    /// Re-randomises any trainable parameters.
    pub fn rand(&mut self, rng: &mut impl Rng) {
        match self {
            Self::Connected(l) => l.rand(rng),
            Self::Recurrent(l) => l.rand(rng),
            Self::Lstm(l) => l.rand(rng),
            Self::Convolutional(l) => l.rand(rng),
            _ => {}
        }
    }

    pub fn forward(&mut self, input: &[f64], rng: &mut impl Rng) {
        match self {
            Self::Connected(l) => l.forward(input),
            Self::Recurrent(l) => l.forward(input),
            Self::Lstm(l) => l.forward(input),
            Self::Softmax(l) => l.forward(input),
            Self::Dropout(l) => l.forward(input, rng),
            Self::Noise(l) => l.forward(input, rng),
            Self::AvgPool(l) => l.forward(input),
            Self::MaxPool(l) => l.forward(input),
            Self::Upsample(l) => l.forward(input),
            Self::Convolutional(l) => l.forward(input),
        }
    }

    pub fn backward(&mut self, input: &[f64], prev_delta: Option<&mut [f64]>) {
        match self {
            Self::Connected(l) => l.backward(input, prev_delta),
            Self::Recurrent(l) => l.backward(input, prev_delta),
            Self::Lstm(l) => l.backward(input, prev_delta),
            Self::Softmax(l) => l.backward(prev_delta),
            Self::Dropout(l) => l.backward(prev_delta),
            Self::Noise(l) => l.backward(prev_delta),
            Self::AvgPool(l) => l.backward(prev_delta),
            Self::MaxPool(l) => l.backward(prev_delta),
            Self::Upsample(l) => l.backward(prev_delta),
            Self::Convolutional(l) => l.backward(input, prev_delta),
        }
    }

    /// Applies accumulated gradients; a no-op for layers without weights.
    pub fn update(&mut self) {
        match self {
            Self::Connected(l) => l.update(),
            Self::Recurrent(l) => l.update(),
            Self::Lstm(l) => l.update(),
            Self::Convolutional(l) => l.update(),
            _ => {}
        }
    }

    pub fn mutate(&mut self, params: &Params, rng: &mut impl Rng) -> bool {
        match self {
            Self::Connected(l) => l.mutate(params, rng),
            Self::Recurrent(l) => l.mutate(params, rng),
            Self::Lstm(l) => l.mutate(params, rng),
            Self::Convolutional(l) => l.mutate(params, rng),
            _ => false,
        }
    }

    /// Adjusts the input side to the upstream layer's output.
    pub fn resize(&mut self, prev: &Layer, rng: &mut impl Rng) {
        let n = prev.n_outputs();
        match self {
            Self::Connected(l) => l.resize_inputs(n),
            Self::Recurrent(l) => l.resize_inputs(n),
            Self::Lstm(l) => l.resize_inputs(n),
            Self::Softmax(l) => l.resize(n),
            Self::Dropout(l) => l.resize(n, prev.out_shape()),
            Self::Noise(l) => l.resize(n, prev.out_shape()),
            Self::AvgPool(l) => l.resize(prev.out_shape()),
            Self::MaxPool(l) => l.resize(prev.out_shape()),
            Self::Upsample(l) => l.resize(prev.out_shape()),
            Self::Convolutional(l) => l.resize(prev.out_shape(), rng),
        }
    }

    /// Writes the kind-specific payload; the kind tag itself is written by
    /// the owning network.
    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        match self {
            Self::Connected(l) => l.save(w),
            Self::Recurrent(l) => l.save(w),
            Self::Lstm(l) => l.save(w),
            Self::Softmax(l) => l.save(w),
            Self::Dropout(l) => l.save(w),
            Self::Noise(l) => l.save(w),
            Self::AvgPool(l) => l.save(w),
            Self::MaxPool(l) => l.save(w),
            Self::Upsample(l) => l.save(w),
            Self::Convolutional(l) => l.save(w),
        }
    }

    pub fn load<R: Read>(kind: LayerKind, r: &mut R) -> XcsfResult<Self> {
        Ok(match kind {
            LayerKind::Connected => Self::Connected(Connected::load(r)?),
            LayerKind::Recurrent => Self::Recurrent(Recurrent::load(r)?),
            LayerKind::Lstm => Self::Lstm(Lstm::load(r)?),
            LayerKind::Softmax => Self::Softmax(Softmax::load(r)?),
            LayerKind::Dropout => Self::Dropout(Dropout::load(r)?),
            LayerKind::Noise => Self::Noise(Noise::load(r)?),
            LayerKind::AvgPool => Self::AvgPool(AvgPool::load(r)?),
            LayerKind::MaxPool => Self::MaxPool(MaxPool::load(r)?),
            LayerKind::Upsample => Self::Upsample(Upsample::load(r)?),
            LayerKind::Convolutional => Self::Convolutional(Convolutional::load(r)?),
        })
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected(l) => l.fmt(f),
            Self::Recurrent(l) => l.fmt(f),
            Self::Lstm(l) => l.fmt(f),
            Self::Softmax(l) => l.fmt(f),
            Self::Dropout(l) => l.fmt(f),
            Self::Noise(l) => l.fmt(f),
            Self::AvgPool(l) => l.fmt(f),
            Self::MaxPool(l) => l.fmt(f),
            Self::Upsample(l) => l.fmt(f),
            Self::Convolutional(l) => l.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes_round_trip() {
        for kind in KINDS {
            assert_eq!(LayerKind::from_code(kind.code()).unwrap(), kind);
        }
        assert!(LayerKind::from_code(10).is_err());
    }

    #[test]
    fn test_option_bits_distinct() {
        let bits = [
            EVOLVE_WEIGHTS,
            EVOLVE_NEURONS,
            EVOLVE_FUNCTIONS,
            EVOLVE_ETA,
            EVOLVE_CONNECT,
            SGD_WEIGHTS,
        ];
        for (i, a) in bits.iter().enumerate() {
            for b in &bits[i + 1..] {
                assert_eq!(a & b, 0);
            }
        }
    }

    #[test]
    fn test_deep_clone() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;
        let mut rng = StdRng::seed_from_u64(0);
        let args = LayerArgs {
            n_inputs: 2,
            n_init: 2,
            n_max: 2,
            ..LayerArgs::default()
        };
        let original = Layer::from_args(&args, &Params::default(), &mut rng);
        let mut copy = original.clone();
        if let Layer::Connected(l) = &mut copy {
            l.weights[0] += 1.0;
        }
        let (orig_w, copy_w) = match (&original, &copy) {
            (Layer::Connected(a), Layer::Connected(b)) => (a.weights[0], b.weights[0]),
            _ => unreachable!(),
        };
        assert_ne!(orig_w, copy_w);
    }
}
