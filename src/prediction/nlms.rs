//! Normalised least-mean-squares predictions over linear or quadratic
//! feature maps.

use std::io::{Read, Write};

use rand::Rng;

use crate::error::XcsfResult;
use crate::params::Params;
use crate::prediction::{build_features, feature_len, PRED_ETA_MAX, PRED_ETA_MIN};
use crate::sam;
use crate::serial;
use crate::neural::layer::mutate_eta;

const N_MU: usize = 1;

#[derive(Clone, Debug)]
pub struct NlmsPred {
    quadratic: bool,
    /// Feature length
    n: usize,
    /// `y_dim x n`
    weights: Vec<f64>,
    eta: f64,
    pre: Vec<f64>,
    tmp: Vec<f64>,
    mu: Vec<f64>,
}

impl NlmsPred {
    pub fn new(params: &Params, quadratic: bool) -> Self {
        let n = feature_len(params.x_dim, quadratic);
        Self {
            quadratic,
            n,
            weights: vec![0.0; params.y_dim * n],
            eta: params.pred.eta,
            pre: vec![0.0; params.y_dim],
            tmp: vec![0.0; n],
            mu: sam::init(&[params.mutation.e], params.sam.min),
        }
    }

    pub fn quadratic(&self) -> bool {
        self.quadratic
    }

    pub fn compute(&mut self, params: &Params, x: &[f64]) -> &[f64] {
        build_features(params, x, self.quadratic, &mut self.tmp);
        for v in 0..self.pre.len() {
            let row = v * self.n;
            self.pre[v] = (0..self.n)
                .map(|k| self.weights[row + k] * self.tmp[k])
                .sum();
        }
        &self.pre
    }

    /// Widrow-Hoff update with the rate normalised by the feature norm.
    pub fn update(&mut self, params: &Params, x: &[f64], y: &[f64]) {
        build_features(params, x, self.quadratic, &mut self.tmp);
        let norm: f64 = self.tmp.iter().map(|t| t * t).sum();
        let correction = self.eta / norm.max(f64::EPSILON);
        for v in 0..self.pre.len() {
            let error = y[v] - self.pre[v];
            let row = v * self.n;
            for k in 0..self.n {
                self.weights[row + k] += correction * error * self.tmp[k];
            }
        }
    }

    /// Self-adapts the learning rate when eta evolution is enabled.
    pub fn mutate(&mut self, params: &Params, rng: &mut impl Rng) -> bool {
        if !params.pred.evolve_eta {
            return false;
        }
        sam::adapt(&mut self.mu, params.sam.kind, params.sam.min, rng);
        mutate_eta(&mut self.eta, PRED_ETA_MIN, PRED_ETA_MAX, self.mu[0], rng)
    }

    pub fn pre(&self) -> &[f64] {
        &self.pre
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        serial::write_bool(w, self.quadratic)?;
        serial::write_len(w, self.n)?;
        serial::write_len(w, self.pre.len())?;
        serial::write_f64_slice(w, &self.weights)?;
        serial::write_f64(w, self.eta)?;
        serial::write_f64_slice(w, &self.pre)?;
        serial::write_f64_slice(w, &self.mu)?;
        Ok(())
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        let quadratic = serial::read_bool(r)?;
        let n = serial::read_len(r)?;
        let y_dim = serial::read_len(r)?;
        let weights = serial::read_f64_vec(r, y_dim * n)?;
        let eta = serial::read_f64(r)?;
        let pre = serial::read_f64_vec(r, y_dim)?;
        let mu = serial::read_f64_vec(r, N_MU)?;
        Ok(Self {
            quadratic,
            n,
            weights,
            eta,
            pre,
            tmp: vec![0.0; n],
            mu,
        })
    }
}

impl PartialEq for NlmsPred {
    fn eq(&self, other: &Self) -> bool {
        // tmp is scratch space
        self.quadratic == other.quadratic
            && self.n == other.n
            && self.weights == other.weights
            && self.eta == other.eta
            && self.pre == other.pre
            && self.mu == other.mu
    }
}

impl std::fmt::Display for NlmsPred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "nlms-{}: n={} eta={:.5}",
            if self.quadratic { "quadratic" } else { "linear" },
            self.n,
            self.eta
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn nlms_params() -> Params {
        let mut params = Params::default();
        params.x_dim = 1;
        params.y_dim = 1;
        params.pred.eta = 0.5;
        params.pred.x0 = 1.0;
        params
    }

    #[test]
    fn test_learns_linear_target() {
        // y = 2x + 1
        let params = nlms_params();
        let mut pred = NlmsPred::new(&params, false);
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..2000 {
            let x = [rng.gen::<f64>()];
            let y = [2.0 * x[0] + 1.0];
            pred.compute(&params, &x);
            pred.update(&params, &x, &y);
        }
        pred.compute(&params, &[0.5]);
        assert!((pred.pre()[0] - 2.0).abs() < 0.05);
    }

    #[test]
    fn test_update_reduces_error() {
        let params = nlms_params();
        let mut pred = NlmsPred::new(&params, false);
        let x = [0.4];
        let y = [1.8];
        pred.compute(&params, &x);
        let before = (y[0] - pred.pre()[0]).abs();
        pred.update(&params, &x, &y);
        pred.compute(&params, &x);
        let after = (y[0] - pred.pre()[0]).abs();
        assert!(after < before);
    }

    #[test]
    fn test_eta_mutation_requires_flag() {
        let mut params = nlms_params();
        params.sam.min = 1.0;
        let mut rng = StdRng::seed_from_u64(1);
        let mut pred = NlmsPred::new(&params, false);
        assert!(!pred.mutate(&params, &mut rng));
        params.pred.evolve_eta = true;
        let mut any = false;
        for _ in 0..10 {
            any |= pred.mutate(&params, &mut rng);
        }
        assert!(any);
    }

    #[test]
    fn test_save_load_round_trip() {
        let params = nlms_params();
        let mut pred = NlmsPred::new(&params, true);
        pred.compute(&params, &[0.3]);
        pred.update(&params, &[0.3], &[0.7]);
        let mut buf = Vec::new();
        pred.save(&mut buf).unwrap();
        assert_eq!(pred, NlmsPred::load(&mut buf.as_slice()).unwrap());
    }
}
