//! Integer actions: a single discrete choice.

use std::io::{Read, Write};

use rand::Rng;

use crate::error::{XcsfError, XcsfResult};
use crate::params::Params;
use crate::sam;
use crate::serial;

const N_MU: usize = 1;

#[derive(Clone, Debug, PartialEq)]
pub struct IntegerAction {
    action: usize,
    n_actions: usize,
    mu: Vec<f64>,
}

impl IntegerAction {
    pub fn new(params: &Params, rng: &mut impl Rng) -> Self {
        Self {
            action: rng.gen_range(0..params.n_actions.max(1)),
            n_actions: params.n_actions.max(1),
            mu: sam::init(&[params.mutation.p], params.sam.min),
        }
    }

    pub fn compute(&self) -> usize {
        self.action
    }

    /// Adopts the requested action directly.
    pub fn cover(&mut self, action: usize) {
        self.action = action;
    }

    pub fn mutate(&mut self, params: &Params, rng: &mut impl Rng) -> bool {
        sam::adapt(&mut self.mu, params.sam.kind, params.sam.min, rng);
        if self.n_actions > 1 && rng.gen::<f64>() < self.mu[0] {
            let new = rng.gen_range(0..self.n_actions);
            if new != self.action {
                self.action = new;
                return true;
            }
        }
        false
    }

    pub fn general(&self, other: &IntegerAction) -> bool {
        self.action == other.action
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        serial::write_len(w, self.action)?;
        serial::write_len(w, self.n_actions)?;
        serial::write_f64_slice(w, &self.mu)?;
        Ok(())
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        let action = serial::read_len(r)?;
        let n_actions = serial::read_len(r)?;
        if n_actions < 1 || action >= n_actions {
            return Err(XcsfError::serialization(format!(
                "invalid action: {action} of {n_actions}"
            )));
        }
        let mu = serial::read_f64_vec(r, N_MU)?;
        Ok(Self {
            action,
            n_actions,
            mu,
        })
    }
}

impl std::fmt::Display for IntegerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "integer: {}", self.action)
    }
}
