//! # Activation Functions
//!
//! The activation table shared by all parametric layers. Functions are
//! identified by a stable integer code so they can be persisted and
//! re-drawn uniformly by the function-evolution operator.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{XcsfError, XcsfResult};

/// Neuron activation function
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Logistic,
    Relu,
    Tanh,
    Linear,
    Gaussian,
    Sin,
    Cos,
    SoftPlus,
    Leaky,
    Selu,
}

/// All selectable activations, indexed by code
pub const ACTIVATIONS: [Activation; 10] = [
    Activation::Logistic,
    Activation::Relu,
    Activation::Tanh,
    Activation::Linear,
    Activation::Gaussian,
    Activation::Sin,
    Activation::Cos,
    Activation::SoftPlus,
    Activation::Leaky,
    Activation::Selu,
];

const SELU_LAMBDA: f64 = 1.0507;
const SELU_ALPHA: f64 = 1.6733;

impl Activation {
    pub fn from_code(code: i32) -> XcsfResult<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|i| ACTIVATIONS.get(i).copied())
            .ok_or_else(|| XcsfError::config(format!("invalid activation: {code}")))
    }

    pub fn code(self) -> i32 {
        ACTIVATIONS.iter().position(|&a| a == self).unwrap_or(0) as i32
    }

    /// Draws an activation uniformly.
    pub fn uniform(rng: &mut impl Rng) -> Self {
        ACTIVATIONS[rng.gen_range(0..ACTIVATIONS.len())]
    }

    pub fn apply(self, x: f64) -> f64 {
        match self {
            Self::Logistic => 1.0 / (1.0 + (-x).exp()),
            Self::Relu => x.max(0.0),
            Self::Tanh => x.tanh(),
            Self::Linear => x,
            Self::Gaussian => (-x * x).exp(),
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
            Self::SoftPlus => (1.0 + x.exp()).ln(),
            Self::Leaky => {
                if x > 0.0 {
                    x
                } else {
                    0.1 * x
                }
            }
            Self::Selu => {
                if x > 0.0 {
                    SELU_LAMBDA * x
                } else {
                    SELU_LAMBDA * SELU_ALPHA * (x.exp() - 1.0)
                }
            }
        }
    }

    /// Derivative with respect to the pre-activation state.
    pub fn gradient(self, x: f64) -> f64 {
        match self {
            Self::Logistic => {
                let s = Self::Logistic.apply(x);
                s * (1.0 - s)
            }
            Self::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            Self::Linear => 1.0,
            Self::Gaussian => -2.0 * x * (-x * x).exp(),
            Self::Sin => x.cos(),
            Self::Cos => -x.sin(),
            Self::SoftPlus => Self::Logistic.apply(x),
            Self::Leaky => {
                if x > 0.0 {
                    1.0
                } else {
                    0.1
                }
            }
            Self::Selu => {
                if x > 0.0 {
                    SELU_LAMBDA
                } else {
                    SELU_LAMBDA * SELU_ALPHA * x.exp()
                }
            }
        }
    }
}

impl std::fmt::Display for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Logistic => write!(f, "logistic"),
            Self::Relu => write!(f, "relu"),
            Self::Tanh => write!(f, "tanh"),
            Self::Linear => write!(f, "linear"),
            Self::Gaussian => write!(f, "gaussian"),
            Self::Sin => write!(f, "sin"),
            Self::Cos => write!(f, "cos"),
            Self::SoftPlus => write!(f, "softplus"),
            Self::Leaky => write!(f, "leaky"),
            Self::Selu => write!(f, "selu"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for a in ACTIVATIONS {
            assert_eq!(Activation::from_code(a.code()).unwrap(), a);
        }
        assert!(Activation::from_code(-1).is_err());
        assert!(Activation::from_code(10).is_err());
    }

    #[test]
    fn test_logistic() {
        assert!((Activation::Logistic.apply(0.0) - 0.5).abs() < 1e-12);
        assert!((Activation::Logistic.gradient(0.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_linear_identity() {
        assert_eq!(Activation::Linear.apply(3.5), 3.5);
        assert_eq!(Activation::Linear.gradient(-2.0), 1.0);
    }

    #[test]
    fn test_relu_kink() {
        assert_eq!(Activation::Relu.apply(-1.0), 0.0);
        assert_eq!(Activation::Relu.gradient(2.0), 1.0);
        assert_eq!(Activation::Relu.gradient(-2.0), 0.0);
    }
}
