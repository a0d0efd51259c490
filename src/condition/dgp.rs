//! Dynamical GP graph conditions.

use std::io::{Read, Write};

use rand::Rng;

use crate::condition::MAX_COVER_RETRIES;
use crate::dgp::Graph;
use crate::error::{XcsfError, XcsfResult};
use crate::params::Params;

#[derive(Clone, Debug, PartialEq)]
pub struct DgpCond {
    graph: Graph,
}

impl DgpCond {
    pub fn new(params: &Params, rng: &mut impl Rng) -> Self {
        Self {
            graph: Graph::new(params, rng),
        }
    }

    /// Runs the graph from its initial states and thresholds node zero.
    pub fn matches(&mut self, x: &[f64]) -> bool {
        self.graph.update(x, true);
        self.graph.output(0) > 0.5
    }

    pub fn cover(&mut self, x: &[f64], rng: &mut impl Rng) -> XcsfResult<()> {
        for _ in 0..MAX_COVER_RETRIES {
            self.graph.rand(rng);
            if self.matches(x) {
                return Ok(());
            }
        }
        tracing::warn!("dgp covering exhausted its retry limit");
        Err(XcsfError::Covering {
            trials: MAX_COVER_RETRIES,
        })
    }

    pub fn mutate(&mut self, params: &Params, rng: &mut impl Rng) -> bool {
        self.graph.mutate(params, rng)
    }

    pub fn size(&self) -> usize {
        self.graph.size()
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        self.graph.save(w)
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        Ok(Self {
            graph: Graph::load(r)?,
        })
    }
}

impl std::fmt::Display for DgpCond {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.graph)
    }
}
