//! # Dynamical GP Graphs
//!
//! A fixed-size graph of fuzzy-logic nodes updated synchronously for a
//! small number of cycles. Each node owns a function and two connection
//! genes; a connection either reads another node's state or one of the
//! external inputs. Node states live in `[0, 1]`.

use std::io::{Read, Write};

use rand::Rng;

use crate::error::{XcsfError, XcsfResult};
use crate::params::Params;
use crate::sam;
use crate::serial;

/// Connections per node
const K: usize = 2;

/// Maximum number of synchronous update cycles
const MAX_T: usize = 10;

/// Rates: connectivity, function, cycle count
const N_MU: usize = 3;

/// Fuzzy node function (CFMQVS variants)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DgpFunction {
    /// `1 - a`
    FuzzyNot,
    /// `a * b`
    FuzzyAnd,
    /// `min(1, a + b)`
    FuzzyOr,
}

const FUNCTIONS: [DgpFunction; 3] = [
    DgpFunction::FuzzyNot,
    DgpFunction::FuzzyAnd,
    DgpFunction::FuzzyOr,
];

impl DgpFunction {
    fn from_code(code: i32) -> XcsfResult<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|i| FUNCTIONS.get(i).copied())
            .ok_or_else(|| XcsfError::serialization(format!("invalid node function: {code}")))
    }

    fn code(self) -> i32 {
        FUNCTIONS.iter().position(|&f| f == self).unwrap_or(0) as i32
    }

    fn eval(self, a: f64, b: f64) -> f64 {
        match self {
            Self::FuzzyNot => 1.0 - a,
            Self::FuzzyAnd => a * b,
            Self::FuzzyOr => (a + b).min(1.0),
        }
    }
}

impl std::fmt::Display for DgpFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FuzzyNot => write!(f, "not"),
            Self::FuzzyAnd => write!(f, "and"),
            Self::FuzzyOr => write!(f, "or"),
        }
    }
}

/// A dynamical GP graph
#[derive(Clone, Debug)]
pub struct Graph {
    n: usize,
    n_inputs: usize,
    /// Synchronous update cycles per evaluation
    t: usize,
    function: Vec<DgpFunction>,
    /// `n * K` genes; values below `n` read a node, the rest read an input
    connectivity: Vec<i32>,
    initial_state: Vec<f64>,
    state: Vec<f64>,
    tmp: Vec<f64>,
    mu: Vec<f64>,
}

impl Graph {
    pub fn new(params: &Params, rng: &mut impl Rng) -> Self {
        let n = params.cond.dgp_nodes;
        let mut graph = Self {
            n,
            n_inputs: params.x_dim,
            t: 1,
            function: vec![DgpFunction::FuzzyNot; n],
            connectivity: vec![0; n * K],
            initial_state: vec![0.0; n],
            state: vec![0.0; n],
            tmp: vec![0.0; n],
            mu: sam::init(
                &[params.mutation.p, params.mutation.f, params.mutation.s],
                params.sam.min,
            ),
        };
        graph.rand(rng);
        graph
    }

    /// Re-randomises every gene and the initial states.
    pub fn rand(&mut self, rng: &mut impl Rng) {
        let conn_max = (self.n + self.n_inputs) as i32;
        for f in &mut self.function {
            *f = FUNCTIONS[rng.gen_range(0..FUNCTIONS.len())];
        }
        for c in &mut self.connectivity {
            *c = rng.gen_range(0..conn_max);
        }
        for s in &mut self.initial_state {
            *s = rng.gen::<f64>();
        }
        self.t = rng.gen_range(1..=MAX_T);
    }

    /// Runs `t` synchronous update cycles on the input.
    pub fn update(&mut self, x: &[f64], reset: bool) {
        if reset {
            self.state.copy_from_slice(&self.initial_state);
        }
        for _ in 0..self.t {
            for i in 0..self.n {
                let a = self.read(self.connectivity[i * K], x);
                let b = self.read(self.connectivity[i * K + 1], x);
                self.tmp[i] = self.function[i].eval(a, b).clamp(0.0, 1.0);
            }
            std::mem::swap(&mut self.state, &mut self.tmp);
        }
    }

    fn read(&self, conn: i32, x: &[f64]) -> f64 {
        let conn = conn as usize;
        if conn < self.n {
            self.state[conn]
        } else {
            x[conn - self.n]
        }
    }

    /// State of the i-th node after the last update.
    pub fn output(&self, i: usize) -> f64 {
        self.state[i]
    }

    /// Number of nodes.
    pub fn size(&self) -> usize {
        self.n
    }

    /// Mutates functions, connectivity and the cycle count with the
    /// self-adapted rates.
    pub fn mutate(&mut self, params: &Params, rng: &mut impl Rng) -> bool {
        sam::adapt(&mut self.mu, params.sam.kind, params.sam.min, rng);
        let mut changed = false;
        let conn_max = (self.n + self.n_inputs) as i32;
        for c in &mut self.connectivity {
            if rng.gen::<f64>() < self.mu[0] {
                let new = rng.gen_range(0..conn_max);
                if new != *c {
                    *c = new;
                    changed = true;
                }
            }
        }
        for f in &mut self.function {
            if rng.gen::<f64>() < self.mu[1] {
                let new = FUNCTIONS[rng.gen_range(0..FUNCTIONS.len())];
                if new != *f {
                    *f = new;
                    changed = true;
                }
            }
        }
        if rng.gen::<f64>() < self.mu[2] {
            let new = rng.gen_range(1..=MAX_T);
            if new != self.t {
                self.t = new;
                changed = true;
            }
        }
        changed
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        serial::write_len(w, self.n)?;
        serial::write_len(w, self.n_inputs)?;
        serial::write_len(w, self.t)?;
        for f in &self.function {
            serial::write_i32(w, f.code())?;
        }
        serial::write_i32_slice(w, &self.connectivity)?;
        serial::write_f64_slice(w, &self.initial_state)?;
        serial::write_f64_slice(w, &self.state)?;
        serial::write_f64_slice(w, &self.mu)?;
        Ok(())
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        let n = serial::read_len(r)?;
        if n < 1 {
            return Err(XcsfError::serialization("empty graph"));
        }
        let n_inputs = serial::read_len(r)?;
        let t = serial::read_len(r)?;
        let mut function = Vec::with_capacity(n);
        for _ in 0..n {
            function.push(DgpFunction::from_code(serial::read_i32(r)?)?);
        }
        let connectivity = serial::read_i32_vec(r, n * K)?;
        let initial_state = serial::read_f64_vec(r, n)?;
        let state = serial::read_f64_vec(r, n)?;
        let mu = serial::read_f64_vec(r, N_MU)?;
        Ok(Self {
            n,
            n_inputs,
            t,
            function,
            connectivity,
            initial_state,
            state,
            tmp: vec![0.0; n],
            mu,
        })
    }
}

impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        // tmp is scratch space, not part of the genome
        self.n == other.n
            && self.n_inputs == other.n_inputs
            && self.t == other.t
            && self.function == other.function
            && self.connectivity == other.connectivity
            && self.initial_state == other.initial_state
            && self.state == other.state
            && self.mu == other.mu
    }
}

impl std::fmt::Display for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dgp: n={} t={} [", self.n, self.t)?;
        for i in 0..self.n {
            write!(
                f,
                "{}({},{}) ",
                self.function[i],
                self.connectivity[i * K],
                self.connectivity[i * K + 1]
            )?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn graph_params() -> Params {
        let mut params = Params::default();
        params.x_dim = 2;
        params.cond.dgp_nodes = 8;
        params
    }

    #[test]
    fn test_update_is_deterministic_with_reset() {
        let params = graph_params();
        let mut rng = StdRng::seed_from_u64(5);
        let mut graph = Graph::new(&params, &mut rng);
        let x = [0.3, 0.7];
        graph.update(&x, true);
        let first: Vec<f64> = (0..graph.size()).map(|i| graph.output(i)).collect();
        graph.update(&x, true);
        let second: Vec<f64> = (0..graph.size()).map(|i| graph.output(i)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_states_stay_in_unit_interval() {
        let params = graph_params();
        let mut rng = StdRng::seed_from_u64(6);
        let mut graph = Graph::new(&params, &mut rng);
        graph.update(&[1.0, 1.0], true);
        for i in 0..graph.size() {
            let s = graph.output(i);
            assert!((0.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn test_mutate_reports_change() {
        let mut params = graph_params();
        params.mutation.p = 1.0;
        params.mutation.f = 1.0;
        params.mutation.s = 1.0;
        params.sam.min = 1.0;
        let mut rng = StdRng::seed_from_u64(8);
        let mut graph = Graph::new(&params, &mut rng);
        let before = graph.clone();
        let changed = graph.mutate(&params, &mut rng);
        let differs = graph.connectivity != before.connectivity
            || graph.function != before.function
            || graph.t != before.t;
        assert_eq!(changed, differs);
    }

    #[test]
    fn test_save_load_round_trip() {
        let params = graph_params();
        let mut rng = StdRng::seed_from_u64(9);
        let mut graph = Graph::new(&params, &mut rng);
        graph.update(&[0.1, 0.9], true);
        let mut buf = Vec::new();
        graph.save(&mut buf).unwrap();
        let loaded = Graph::load(&mut buf.as_slice()).unwrap();
        assert_eq!(graph, loaded);
        let mut buf2 = Vec::new();
        loaded.save(&mut buf2).unwrap();
        assert_eq!(buf, buf2);
    }
}
