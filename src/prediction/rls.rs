//! Recursive least-squares predictions with a shared gain matrix.

use std::io::{Read, Write};

use crate::error::XcsfResult;
use crate::params::Params;
use crate::prediction::{build_features, feature_len};
use crate::serial;

#[derive(Clone, Debug)]
pub struct RlsPred {
    quadratic: bool,
    /// Feature length
    n: usize,
    /// `y_dim x n`
    weights: Vec<f64>,
    /// `n x n` inverse-covariance estimate
    matrix: Vec<f64>,
    pre: Vec<f64>,
    tmp: Vec<f64>,
    gain: Vec<f64>,
}

impl RlsPred {
    pub fn new(params: &Params, quadratic: bool) -> Self {
        let n = feature_len(params.x_dim, quadratic);
        let mut matrix = vec![0.0; n * n];
        for i in 0..n {
            matrix[i * n + i] = params.pred.rls_scale_factor;
        }
        Self {
            quadratic,
            n,
            weights: vec![0.0; params.y_dim * n],
            matrix,
            pre: vec![0.0; params.y_dim],
            tmp: vec![0.0; n],
            gain: vec![0.0; n],
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

    pub fn update(&mut self, params: &Params, x: &[f64], y: &[f64]) {
        build_features(params, x, self.quadratic, &mut self.tmp);
        let n = self.n;
        // gain = (J x) / (lambda + x' J x)
        for i in 0..n {
            self.gain[i] = (0..n)
                .map(|j| self.matrix[i * n + j] * self.tmp[j])
                .sum();
        }
        let denom: f64 = params.pred.rls_lambda
            + self
                .tmp
                .iter()
                .zip(&self.gain)
                .map(|(t, g)| t * g)
                .sum::<f64>();
        for g in &mut self.gain {
            *g /= denom;
        }
        for v in 0..self.pre.len() {
            let error = y[v] - self.pre[v];
            let row = v * self.n;
            for k in 0..n {
                self.weights[row + k] += error * self.gain[k];
            }
        }
        // J <- (J - gain (J x)') / lambda; J stays symmetric
        let jx: Vec<f64> = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| self.matrix[i * n + j] * self.tmp[j])
                    .sum()
            })
            .collect();
        for i in 0..n {
            for j in 0..n {
                self.matrix[i * n + j] =
                    (self.matrix[i * n + j] - self.gain[i] * jx[j]) / params.pred.rls_lambda;
            }
        }
    }

    pub fn pre(&self) -> &[f64] {
        &self.pre
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        serial::write_bool(w, self.quadratic)?;
        serial::write_len(w, self.n)?;
        serial::write_len(w, self.pre.len())?;
        serial::write_f64_slice(w, &self.weights)?;
        serial::write_f64_slice(w, &self.matrix)?;
        serial::write_f64_slice(w, &self.pre)?;
        Ok(())
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        let quadratic = serial::read_bool(r)?;
        let n = serial::read_len(r)?;
        let y_dim = serial::read_len(r)?;
        let weights = serial::read_f64_vec(r, y_dim * n)?;
        let matrix = serial::read_f64_vec(r, n * n)?;
        let pre = serial::read_f64_vec(r, y_dim)?;
        Ok(Self {
            quadratic,
            n,
            weights,
            matrix,
            pre,
            tmp: vec![0.0; n],
            gain: vec![0.0; n],
        })
    }
}

impl PartialEq for RlsPred {
    fn eq(&self, other: &Self) -> bool {
        // tmp and gain are scratch space
        self.quadratic == other.quadratic
            && self.n == other.n
            && self.weights == other.weights
            && self.matrix == other.matrix
            && self.pre == other.pre
    }
}

impl std::fmt::Display for RlsPred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rls-{}: n={}",
            if self.quadratic { "quadratic" } else { "linear" },
            self.n
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rls_params() -> Params {
        let mut params = Params::default();
        params.x_dim = 1;
        params.y_dim = 1;
        params.pred.rls_lambda = 1.0;
        params.pred.rls_scale_factor = 1000.0;
        params.pred.x0 = 1.0;
        params
    }

    #[test]
    fn test_fits_linear_target_quickly() {
        // y = 3x - 0.5 is exactly representable
        let params = rls_params();
        let mut pred = RlsPred::new(&params, false);
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..20 {
            let x = [rng.gen::<f64>()];
            let y = [3.0 * x[0] - 0.5];
            pred.compute(&params, &x);
            pred.update(&params, &x, &y);
        }
        pred.compute(&params, &[0.25]);
        assert!((pred.pre()[0] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_quadratic_fits_square() {
        let mut params = rls_params();
        params.x_dim = 1;
        let mut pred = RlsPred::new(&params, true);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let x = [rng.gen::<f64>() * 2.0 - 1.0];
            let y = [x[0] * x[0]];
            pred.compute(&params, &x);
            pred.update(&params, &x, &y);
        }
        pred.compute(&params, &[0.5]);
        assert!((pred.pre()[0] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_save_load_round_trip() {
        let params = rls_params();
        let mut pred = RlsPred::new(&params, false);
        pred.compute(&params, &[0.3]);
        pred.update(&params, &[0.3], &[0.9]);
        let mut buf = Vec::new();
        pred.save(&mut buf).unwrap();
        assert_eq!(pred, RlsPred::load(&mut buf.as_slice()).unwrap());
    }
}
