//! Constant predictions: a running payoff average, input-independent.

use std::io::{Read, Write};

use crate::error::XcsfResult;
use crate::params::Params;
use crate::serial;

#[derive(Clone, Debug, PartialEq)]
pub struct ConstantPred {
    pre: Vec<f64>,
    /// Updates absorbed so far
    n: f64,
}

impl ConstantPred {
    pub fn new(params: &Params) -> Self {
        Self {
            pre: vec![0.0; params.y_dim],
            n: 0.0,
        }
    }

    pub fn compute(&mut self) -> &[f64] {
        &self.pre
    }

    /// Moyenne-adaptive-modifiee: arithmetic mean while young, Widrow-Hoff
    /// with rate beta thereafter.
    pub fn update(&mut self, params: &Params, y: &[f64]) {
        self.n += 1.0;
        for (p, t) in self.pre.iter_mut().zip(y) {
            if self.n * params.ea.beta < 1.0 {
                *p = (*p * (self.n - 1.0) + t) / self.n;
            } else {
                *p += params.ea.beta * (t - *p);
            }
        }
    }

    pub fn pre(&self) -> &[f64] {
        &self.pre
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        serial::write_len(w, self.pre.len())?;
        serial::write_f64_slice(w, &self.pre)?;
        serial::write_f64(w, self.n)?;
        Ok(())
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        let y_dim = serial::read_len(r)?;
        Ok(Self {
            pre: serial::read_f64_vec(r, y_dim)?,
            n: serial::read_f64(r)?,
        })
    }
}

impl std::fmt::Display for ConstantPred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "constant: {:?}", self.pre)
    }
}
