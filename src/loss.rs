//! # Loss Functions
//!
//! Scalar error measures applied to a classifier's prediction vector,
//! selected once at configuration time by the `LOSS_FUNC` id.

use serde::{Deserialize, Serialize};

use crate::error::{XcsfError, XcsfResult};

const LOG_EPS: f64 = 1e-15;

/// Error function applied between a prediction and the target
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Loss {
    /// Mean absolute error
    Mae,
    /// Mean squared error
    Mse,
    /// Root mean squared error
    Rmse,
    /// Log loss over a probability vector
    Log,
    /// Binary log loss
    BinaryLog,
    /// 0/1 loss on the argmax
    OneHot,
    /// Huber loss with unit transition point
    Huber,
}

impl Loss {
    pub fn from_code(code: i32) -> XcsfResult<Self> {
        match code {
            0 => Ok(Self::Mae),
            1 => Ok(Self::Mse),
            2 => Ok(Self::Rmse),
            3 => Ok(Self::Log),
            4 => Ok(Self::BinaryLog),
            5 => Ok(Self::OneHot),
            6 => Ok(Self::Huber),
            _ => Err(XcsfError::config(format!("invalid loss function: {code}"))),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Mae => 0,
            Self::Mse => 1,
            Self::Rmse => 2,
            Self::Log => 3,
            Self::BinaryLog => 4,
            Self::OneHot => 5,
            Self::Huber => 6,
        }
    }

    /// Computes the error between a prediction and the truth.
    ///
    /// Both slices must have the same non-zero length.
    pub fn compute(self, pred: &[f64], y: &[f64]) -> f64 {
        debug_assert_eq!(pred.len(), y.len());
        let n = y.len() as f64;
        match self {
            Self::Mae => {
                pred.iter().zip(y).map(|(p, t)| (t - p).abs()).sum::<f64>() / n
            }
            Self::Mse => {
                pred.iter().zip(y).map(|(p, t)| (t - p) * (t - p)).sum::<f64>() / n
            }
            Self::Rmse => Self::Mse.compute(pred, y).sqrt(),
            Self::Log => {
                -pred
                    .iter()
                    .zip(y)
                    .map(|(p, t)| t * p.max(LOG_EPS).ln())
                    .sum::<f64>()
                    / n
            }
            Self::BinaryLog => {
                -pred
                    .iter()
                    .zip(y)
                    .map(|(p, t)| {
                        t * p.max(LOG_EPS).ln() + (1.0 - t) * (1.0 - p).max(LOG_EPS).ln()
                    })
                    .sum::<f64>()
                    / n
            }
            Self::OneHot => {
                if argmax(pred) == argmax(y) {
                    0.0
                } else {
                    1.0
                }
            }
            Self::Huber => {
                pred.iter()
                    .zip(y)
                    .map(|(p, t)| {
                        let e = (t - p).abs();
                        if e <= 1.0 {
                            0.5 * e * e
                        } else {
                            e - 0.5
                        }
                    })
                    .sum::<f64>()
                    / n
            }
        }
    }
}

impl std::fmt::Display for Loss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mae => write!(f, "mae"),
            Self::Mse => write!(f, "mse"),
            Self::Rmse => write!(f, "rmse"),
            Self::Log => write!(f, "log"),
            Self::BinaryLog => write!(f, "binary-log"),
            Self::OneHot => write!(f, "onehot"),
            Self::Huber => write!(f, "huber"),
        }
    }
}

fn argmax(v: &[f64]) -> usize {
    let mut best = 0;
    for i in 1..v.len() {
        if v[i] > v[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mae_mse() {
        let pred = [0.5, 1.0];
        let y = [1.0, 0.0];
        assert!((Loss::Mae.compute(&pred, &y) - 0.75).abs() < 1e-12);
        assert!((Loss::Mse.compute(&pred, &y) - 0.625).abs() < 1e-12);
        assert!((Loss::Rmse.compute(&pred, &y) - 0.625f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_onehot() {
        assert_eq!(Loss::OneHot.compute(&[0.1, 0.9], &[0.0, 1.0]), 0.0);
        assert_eq!(Loss::OneHot.compute(&[0.9, 0.1], &[0.0, 1.0]), 1.0);
    }

    #[test]
    fn test_huber_quadratic_region() {
        let e = Loss::Huber.compute(&[0.5], &[1.0]);
        assert!((e - 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_code() {
        assert!(Loss::from_code(99).is_err());
    }
}
