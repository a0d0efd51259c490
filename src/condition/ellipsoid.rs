//! Hyperellipsoid conditions: normalised squared distance below one.

use std::io::{Read, Write};

use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::{XcsfError, XcsfResult};
use crate::params::Params;
use crate::sam;
use crate::serial;

const N_MU: usize = 1;

const MUTATION_SD: f64 = 0.1;

#[derive(Clone, Debug, PartialEq)]
pub struct EllipsoidCond {
    pub(crate) center: Vec<f64>,
    pub(crate) spread: Vec<f64>,
    mu: Vec<f64>,
}

fn random_spread(params: &Params, rng: &mut impl Rng) -> f64 {
    let range = (params.cond.max - params.cond.min - params.cond.smin).max(0.0);
    params.cond.smin + rng.gen::<f64>() * range
}

impl EllipsoidCond {
    pub fn new(params: &Params, rng: &mut impl Rng) -> Self {
        let center = (0..params.x_dim)
            .map(|_| rng.gen_range(params.cond.min..params.cond.max))
            .collect();
        let spread = (0..params.x_dim).map(|_| random_spread(params, rng)).collect();
        Self {
            center,
            spread,
            mu: sam::init(&[params.mutation.p], params.sam.min),
        }
    }

    pub fn matches(&self, x: &[f64]) -> bool {
        let dist: f64 = self
            .center
            .iter()
            .zip(&self.spread)
            .zip(x)
            .map(|((c, s), v)| {
                let d = (v - c) / s;
                d * d
            })
            .sum();
        dist < 1.0
    }

    pub fn cover(&mut self, params: &Params, x: &[f64], rng: &mut impl Rng) {
        for i in 0..self.center.len() {
            self.center[i] = x[i];
            self.spread[i] = random_spread(params, rng);
        }
    }

    pub fn crossover(
        &mut self,
        other: &mut EllipsoidCond,
        params: &Params,
        rng: &mut impl Rng,
    ) -> bool {
        let mut changed = false;
        if rng.gen::<f64>() < params.ea.p_crossover {
            for i in 0..self.center.len() {
                if rng.gen::<f64>() < 0.5 && self.center[i] != other.center[i] {
                    std::mem::swap(&mut self.center[i], &mut other.center[i]);
                    changed = true;
                }
                if rng.gen::<f64>() < 0.5 && self.spread[i] != other.spread[i] {
                    std::mem::swap(&mut self.spread[i], &mut other.spread[i]);
                    changed = true;
                }
            }
        }
        changed
    }

    pub fn mutate(&mut self, params: &Params, rng: &mut impl Rng) -> bool {
        sam::adapt(&mut self.mu, params.sam.kind, params.sam.min, rng);
        let range = params.cond.max - params.cond.min;
        let mut changed = false;
        for i in 0..self.center.len() {
            if rng.gen::<f64>() < self.mu[0] {
                let z: f64 = rng.sample(StandardNormal);
                let new = (self.center[i] + z * MUTATION_SD * range)
                    .clamp(params.cond.min, params.cond.max);
                if new != self.center[i] {
                    self.center[i] = new;
                    changed = true;
                }
            }
            if rng.gen::<f64>() < self.mu[0] {
                let z: f64 = rng.sample(StandardNormal);
                let new = (self.spread[i] + z * MUTATION_SD * range)
                    .clamp(params.cond.smin, range);
                if new != self.spread[i] {
                    self.spread[i] = new;
                    changed = true;
                }
            }
        }
        changed
    }

    /// Bounding-interval enclosure along every axis.
    pub fn general(&self, other: &EllipsoidCond) -> bool {
        for i in 0..self.center.len() {
            let (l1, u1) = (self.center[i] - self.spread[i], self.center[i] + self.spread[i]);
            let (l2, u2) = (
                other.center[i] - other.spread[i],
                other.center[i] + other.spread[i],
            );
            if l1 > l2 || u1 < u2 {
                return false;
            }
        }
        true
    }

    pub fn size(&self) -> usize {
        self.center.len()
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        serial::write_len(w, self.center.len())?;
        serial::write_f64_slice(w, &self.center)?;
        serial::write_f64_slice(w, &self.spread)?;
        serial::write_f64_slice(w, &self.mu)?;
        Ok(())
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        let n = serial::read_len(r)?;
        if n < 1 {
            return Err(XcsfError::serialization("empty ellipsoid condition"));
        }
        Ok(Self {
            center: serial::read_f64_vec(r, n)?,
            spread: serial::read_f64_vec(r, n)?,
            mu: serial::read_f64_vec(r, N_MU)?,
        })
    }
}

impl std::fmt::Display for EllipsoidCond {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ellipsoid:")?;
        for (c, s) in self.center.iter().zip(&self.spread) {
            write!(f, " ({c:.5}, {s:.5})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ellipsoid_params() -> Params {
        let mut params = Params::default();
        params.x_dim = 2;
        params
    }

    #[test]
    fn test_matches_inside_ellipsoid() {
        let params = ellipsoid_params();
        let mut rng = StdRng::seed_from_u64(0);
        let mut cond = EllipsoidCond::new(&params, &mut rng);
        cond.center = vec![0.5, 0.5];
        cond.spread = vec![0.2, 0.2];
        assert!(cond.matches(&[0.5, 0.5]));
        assert!(cond.matches(&[0.6, 0.5]));
        // inside the bounding box but outside the ellipsoid
        assert!(!cond.matches(&[0.68, 0.68]));
    }

    #[test]
    fn test_cover_always_matches() {
        let params = ellipsoid_params();
        let mut rng = StdRng::seed_from_u64(1);
        let mut cond = EllipsoidCond::new(&params, &mut rng);
        for _ in 0..50 {
            let x = [rng.gen::<f64>(), rng.gen::<f64>()];
            cond.cover(&params, &x, &mut rng);
            assert!(cond.matches(&x));
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let params = ellipsoid_params();
        let mut rng = StdRng::seed_from_u64(2);
        let cond = EllipsoidCond::new(&params, &mut rng);
        let mut buf = Vec::new();
        cond.save(&mut buf).unwrap();
        assert_eq!(cond, EllipsoidCond::load(&mut buf.as_slice()).unwrap());
    }
}
