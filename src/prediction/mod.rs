//! # Predictions
//!
//! The payoff-estimation half of a classifier: a function from the input
//! to a prediction vector, fitted online as the classifier gains
//! experience.

use std::io::{Read, Write};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{XcsfError, XcsfResult};
use crate::params::Params;
use crate::serial;

pub mod constant;
pub mod neural;
pub mod nlms;
pub mod rls;

pub use constant::ConstantPred;
pub use neural::NeuralPred;
pub use nlms::NlmsPred;
pub use rls::RlsPred;

/// Learning-rate bounds for gradient-based predictions
pub(crate) const PRED_ETA_MIN: f64 = 1e-6;
pub(crate) const PRED_ETA_MAX: f64 = 1.0;

/// Prediction representation tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionKind {
    Constant,
    NlmsLinear,
    NlmsQuadratic,
    RlsLinear,
    RlsQuadratic,
    Neural,
}

const KINDS: [PredictionKind; 6] = [
    PredictionKind::Constant,
    PredictionKind::NlmsLinear,
    PredictionKind::NlmsQuadratic,
    PredictionKind::RlsLinear,
    PredictionKind::RlsQuadratic,
    PredictionKind::Neural,
];

impl PredictionKind {
    pub fn from_code(code: i32) -> XcsfResult<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|i| KINDS.get(i).copied())
            .ok_or_else(|| XcsfError::config(format!("invalid prediction type: {code}")))
    }

    pub fn code(self) -> i32 {
        KINDS.iter().position(|&k| k == self).unwrap_or(0) as i32
    }
}

impl std::fmt::Display for PredictionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constant => write!(f, "constant"),
            Self::NlmsLinear => write!(f, "nlms-linear"),
            Self::NlmsQuadratic => write!(f, "nlms-quadratic"),
            Self::RlsLinear => write!(f, "rls-linear"),
            Self::RlsQuadratic => write!(f, "rls-quadratic"),
            Self::Neural => write!(f, "neural"),
        }
    }
}

/// Length of the least-squares feature vector.
pub(crate) fn feature_len(x_dim: usize, quadratic: bool) -> usize {
    let mut n = 1 + x_dim;
    if quadratic {
        n += x_dim * (x_dim + 1) / 2;
    }
    n
}

/// Fills `tmp` with `[x0, x..., upper-triangular products]`.
pub(crate) fn build_features(params: &Params, x: &[f64], quadratic: bool, tmp: &mut [f64]) {
    tmp[0] = params.pred.x0;
    tmp[1..=x.len()].copy_from_slice(x);
    if quadratic {
        let mut k = 1 + x.len();
        for i in 0..x.len() {
            for j in i..x.len() {
                tmp[k] = x[i] * x[j];
                k += 1;
            }
        }
    }
}

/// A classifier prediction
#[derive(Clone, Debug)]
pub enum Prediction {
    Constant(ConstantPred),
    Nlms(NlmsPred),
    Rls(RlsPred),
    Neural(NeuralPred),
}

impl Prediction {
    pub fn new(params: &Params, rng: &mut impl Rng) -> XcsfResult<Self> {
        Ok(match params.pred.kind {
            PredictionKind::Constant => Self::Constant(ConstantPred::new(params)),
            PredictionKind::NlmsLinear => Self::Nlms(NlmsPred::new(params, false)),
            PredictionKind::NlmsQuadratic => Self::Nlms(NlmsPred::new(params, true)),
            PredictionKind::RlsLinear => Self::Rls(RlsPred::new(params, false)),
            PredictionKind::RlsQuadratic => Self::Rls(RlsPred::new(params, true)),
            PredictionKind::Neural => Self::Neural(NeuralPred::new(params, rng)?),
        })
    }

    pub fn kind(&self) -> PredictionKind {
        match self {
            Self::Constant(_) => PredictionKind::Constant,
            Self::Nlms(p) => {
                if p.quadratic() {
                    PredictionKind::NlmsQuadratic
                } else {
                    PredictionKind::NlmsLinear
                }
            }
            Self::Rls(p) => {
                if p.quadratic() {
                    PredictionKind::RlsQuadratic
                } else {
                    PredictionKind::RlsLinear
                }
            }
            Self::Neural(_) => PredictionKind::Neural,
        }
    }

    /// Computes and caches the prediction for an input.
    pub fn compute(&mut self, params: &Params, x: &[f64], rng: &mut impl Rng) -> &[f64] {
        match self {
            Self::Constant(p) => p.compute(),
            Self::Nlms(p) => p.compute(params, x),
            Self::Rls(p) => p.compute(params, x),
            Self::Neural(p) => p.compute(x, rng),
        }
    }

    /// Fits the prediction toward a target, assuming [`Prediction::compute`]
    /// ran on the same input.
    pub fn update(&mut self, params: &Params, x: &[f64], y: &[f64]) {
        match self {
            Self::Constant(p) => p.update(params, y),
            Self::Nlms(p) => p.update(params, x, y),
            Self::Rls(p) => p.update(params, x, y),
            Self::Neural(p) => p.update(x, y),
        }
    }

    pub fn mutate(&mut self, params: &Params, rng: &mut impl Rng) -> bool {
        match self {
            Self::Nlms(p) => p.mutate(params, rng),
            Self::Neural(p) => p.mutate(params, rng),
            _ => false,
        }
    }

    /// The last computed prediction vector.
    pub fn pre(&self) -> &[f64] {
        match self {
            Self::Constant(p) => p.pre(),
            Self::Nlms(p) => p.pre(),
            Self::Rls(p) => p.pre(),
            Self::Neural(p) => p.pre(),
        }
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        serial::write_i32(w, self.kind().code())?;
        match self {
            Self::Constant(p) => p.save(w),
            Self::Nlms(p) => p.save(w),
            Self::Rls(p) => p.save(w),
            Self::Neural(p) => p.save(w),
        }
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        let kind = PredictionKind::from_code(serial::read_i32(r)?)?;
        Ok(match kind {
            PredictionKind::Constant => Self::Constant(ConstantPred::load(r)?),
            PredictionKind::NlmsLinear | PredictionKind::NlmsQuadratic => {
                Self::Nlms(NlmsPred::load(r)?)
            }
            PredictionKind::RlsLinear | PredictionKind::RlsQuadratic => {
                Self::Rls(RlsPred::load(r)?)
            }
            PredictionKind::Neural => Self::Neural(NeuralPred::load(r)?),
        })
    }
}

impl std::fmt::Display for Prediction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constant(p) => p.fmt(f),
            Self::Nlms(p) => p.fmt(f),
            Self::Rls(p) => p.fmt(f),
            Self::Neural(p) => p.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_kind_codes_round_trip() {
        for kind in KINDS {
            assert_eq!(PredictionKind::from_code(kind.code()).unwrap(), kind);
        }
        assert!(PredictionKind::from_code(6).is_err());
    }

    #[test]
    fn test_feature_len() {
        assert_eq!(feature_len(2, false), 3);
        assert_eq!(feature_len(2, true), 6);
        assert_eq!(feature_len(3, true), 10);
    }

    #[test]
    fn test_build_features_quadratic() {
        let mut params = Params::default();
        params.x_dim = 2;
        params.pred.x0 = 1.0;
        let mut tmp = vec![0.0; 6];
        build_features(&params, &[2.0, 3.0], true, &mut tmp);
        assert_eq!(tmp, vec![1.0, 2.0, 3.0, 4.0, 6.0, 9.0]);
    }

    #[test]
    fn test_every_kind_constructs_and_persists() {
        let mut rng = StdRng::seed_from_u64(0);
        for kind in KINDS {
            let mut params = Params::default();
            params.x_dim = 2;
            params.y_dim = 1;
            params.pred.kind = kind;
            let pred = Prediction::new(&params, &mut rng).unwrap();
            assert_eq!(pred.kind(), kind);
            let mut buf = Vec::new();
            pred.save(&mut buf).unwrap();
            let loaded = Prediction::load(&mut buf.as_slice()).unwrap();
            let mut buf2 = Vec::new();
            loaded.save(&mut buf2).unwrap();
            assert_eq!(buf, buf2, "round trip failed for {kind}");
        }
    }
}
