//! # Self-Adaptive Mutation
//!
//! Every evolvable individual carries its own vector of mutation rates.
//! The rates themselves are perturbed before each use, so the pressure on
//! good rate settings travels with the genome rather than being tuned
//! globally.

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::error::{XcsfError, XcsfResult};

/// Discrete ladder of rates available to [`SamType::RateSelect`]
const LADDER: [f64; 10] = [
    0.0005, 0.001, 0.002, 0.003, 0.005, 0.01, 0.015, 0.02, 0.05, 0.1,
];

/// Probability of re-drawing a rate under the discrete operators
const P_REDRAW: f64 = 0.1;

/// Operator used to perturb mutation rates before use
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamType {
    /// Pick a new rate from a fixed ladder with probability 0.1
    RateSelect,
    /// Multiply by `exp(N(0,1))`
    LogNormal,
    /// Re-draw uniformly with probability 0.1
    Uniform,
}

impl SamType {
    pub fn from_code(code: i32) -> XcsfResult<Self> {
        match code {
            0 => Ok(Self::RateSelect),
            1 => Ok(Self::LogNormal),
            2 => Ok(Self::Uniform),
            _ => Err(XcsfError::config(format!("invalid SAM type: {code}"))),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::RateSelect => 0,
            Self::LogNormal => 1,
            Self::Uniform => 2,
        }
    }
}

/// Seeds a rate vector from base probabilities, clamped to `[min, 1]`.
pub fn init(base: &[f64], min: f64) -> Vec<f64> {
    base.iter().map(|r| r.clamp(min, 1.0)).collect()
}

/// Perturbs each rate in place with the configured operator.
///
/// Results are always clamped to `[min, 1]`.
pub fn adapt(mu: &mut [f64], ty: SamType, min: f64, rng: &mut impl Rng) {
    for m in mu {
        match ty {
            SamType::RateSelect => {
                if rng.gen::<f64>() < P_REDRAW {
                    *m = LADDER[rng.gen_range(0..LADDER.len())];
                }
            }
            SamType::LogNormal => {
                let z: f64 = rng.sample(StandardNormal);
                *m = (*m * z.exp()).clamp(min, 1.0);
            }
            SamType::Uniform => {
                if rng.gen::<f64>() < P_REDRAW {
                    *m = rng.gen_range(min..1.0);
                }
            }
        }
        *m = m.clamp(min, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_init_clamps() {
        let mu = init(&[0.0, 0.5, 2.0], 0.0001);
        assert_eq!(mu, vec![0.0001, 0.5, 1.0]);
    }

    #[test]
    fn test_log_normal_stays_bounded() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut mu = vec![0.01; 4];
        for _ in 0..1000 {
            adapt(&mut mu, SamType::LogNormal, 0.0001, &mut rng);
            for &m in &mu {
                assert!((0.0001..=1.0).contains(&m));
            }
        }
    }

    #[test]
    fn test_rate_select_lands_on_ladder() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut mu = vec![0.42];
        // adapt until the redraw fires
        for _ in 0..1000 {
            adapt(&mut mu, SamType::RateSelect, 0.0001, &mut rng);
        }
        assert!(LADDER.contains(&mu[0]));
    }

    #[test]
    fn test_invalid_code() {
        assert!(SamType::from_code(7).is_err());
    }
}
