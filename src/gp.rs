//! # GP Trees
//!
//! Genetic-programming expressions stored as a flat prefix sequence of node
//! codes. All four functions are binary, so every sub-tree occupies a
//! contiguous range and crossover is a pure splice of two such ranges.
//!
//! Node encoding: codes below [`N_FUNC`] are arithmetic functions, the next
//! `num_cons` codes index the shared constants, and everything above that
//! indexes an input variable.

use std::io::{Read, Write};

use rand::Rng;

use crate::error::{XcsfError, XcsfResult};
use crate::params::Params;
use crate::sam;
use crate::serial;

/// Maximum length of a tree
pub const GP_MAX_LEN: usize = 10_000;

/// Number of selectable functions
const N_FUNC: i32 = 4;

const ADD: i32 = 0;
const SUB: i32 = 1;
const MUL: i32 = 2;
const DIV: i32 = 3;

/// Number of self-adaptive rates carried by a tree
const N_MU: usize = 1;

/// Constants shared among all GP trees.
///
/// Drawn once at system initialisation, uniformly in
/// `[cond.min, cond.max]`, and immutable thereafter.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeConstants {
    cons: Vec<f64>,
}

impl TreeConstants {
    pub fn new(params: &Params, rng: &mut impl Rng) -> Self {
        let cons = (0..params.gp.num_cons)
            .map(|_| rng.gen_range(params.cond.min..params.cond.max))
            .collect();
        Self { cons }
    }

    pub fn len(&self) -> usize {
        self.cons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cons.is_empty()
    }

    pub fn get(&self, i: usize) -> f64 {
        self.cons[i]
    }
}

/// A genetic-programming expression tree
#[derive(Clone, Debug, PartialEq)]
pub struct Tree {
    code: Vec<i32>,
    mu: Vec<f64>,
}

impl Tree {
    /// Grows a random tree.
    ///
    /// The root is always a function; if growth overflows [`GP_MAX_LEN`]
    /// the whole tree is discarded and regrown.
    pub fn random(params: &Params, rng: &mut impl Rng) -> Self {
        let mut code = Vec::new();
        loop {
            code.clear();
            if grow(
                &mut code,
                GP_MAX_LEN,
                params.gp.init_depth,
                params.gp.num_cons,
                params.x_dim,
                rng,
            ) {
                break;
            }
        }
        Self {
            code,
            mu: sam::init(&[params.mutation.p], params.sam.min),
        }
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Returns the position just past the sub-tree rooted at `p`.
    pub fn traverse(&self, p: usize) -> usize {
        if self.code[p] >= N_FUNC {
            return p + 1;
        }
        self.traverse(self.traverse(p + 1))
    }

    /// Evaluates the tree on an input vector.
    ///
    /// Division is protected: a zero denominator yields the numerator.
    pub fn eval(&self, cons: &TreeConstants, x: &[f64]) -> f64 {
        self.eval_at(0, cons, x).0
    }

    fn eval_at(&self, p: usize, cons: &TreeConstants, x: &[f64]) -> (f64, usize) {
        let node = self.code[p];
        let n_cons = cons.len() as i32;
        if node >= N_FUNC + n_cons {
            return (x[(node - N_FUNC - n_cons) as usize], p + 1);
        }
        if node >= N_FUNC {
            return (cons.get((node - N_FUNC) as usize), p + 1);
        }
        let (a, next) = self.eval_at(p + 1, cons, x);
        let (b, next) = self.eval_at(next, cons, x);
        let v = match node {
            ADD => a + b,
            SUB => a - b,
            MUL => a * b,
            _ => {
                if b == 0.0 {
                    a
                } else {
                    a / b
                }
            }
        };
        (v, next)
    }

    /// Splices a random sub-tree of each parent into the other.
    ///
    /// Returns false, leaving both parents untouched, when either result
    /// would exceed [`GP_MAX_LEN`].
    pub fn crossover(&mut self, other: &mut Tree, rng: &mut impl Rng) -> bool {
        let len1 = self.code.len();
        let len2 = other.code.len();
        let start1 = rng.gen_range(0..len1);
        let end1 = self.traverse(start1);
        let start2 = rng.gen_range(0..len2);
        let end2 = other.traverse(start2);
        let nlen1 = start1 + (end2 - start2) + (len1 - end1);
        let nlen2 = start2 + (end1 - start1) + (len2 - end2);
        if nlen1 > GP_MAX_LEN || nlen2 > GP_MAX_LEN {
            return false;
        }
        let mut new1 = Vec::with_capacity(nlen1);
        new1.extend_from_slice(&self.code[..start1]);
        new1.extend_from_slice(&other.code[start2..end2]);
        new1.extend_from_slice(&self.code[end1..]);
        let mut new2 = Vec::with_capacity(nlen2);
        new2.extend_from_slice(&other.code[..start2]);
        new2.extend_from_slice(&self.code[start1..end1]);
        new2.extend_from_slice(&other.code[end2..]);
        self.code = new1;
        other.code = new2;
        true
    }

    /// Point mutation: functions are replaced by functions and terminals by
    /// terminals, each node independently with the self-adapted rate.
    pub fn mutate(&mut self, params: &Params, rng: &mut impl Rng) -> bool {
        sam::adapt(&mut self.mu, params.sam.kind, params.sam.min, rng);
        let terminal_max = N_FUNC + (params.gp.num_cons + params.x_dim) as i32;
        let mut changed = false;
        for node in &mut self.code {
            if rng.gen::<f64>() < self.mu[0] {
                let new = if *node >= N_FUNC {
                    rng.gen_range(N_FUNC..terminal_max)
                } else {
                    rng.gen_range(0..N_FUNC)
                };
                if new != *node {
                    *node = new;
                    changed = true;
                }
            }
        }
        changed
    }

    /// Self-adaptive mutation rates carried by this tree.
    pub fn mu(&self) -> &[f64] {
        &self.mu
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        serial::write_len(w, self.code.len())?;
        serial::write_i32_slice(w, &self.code)?;
        serial::write_f64_slice(w, &self.mu)?;
        Ok(())
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        let len = serial::read_len(r)?;
        if len < 1 || len > GP_MAX_LEN {
            return Err(XcsfError::serialization(format!(
                "invalid tree length: {len}"
            )));
        }
        let code = serial::read_i32_vec(r, len)?;
        let mu = serial::read_f64_vec(r, N_MU)?;
        Ok(Self { code, mu })
    }

    /// Renders the expression in infix form.
    pub fn to_infix(&self, cons: &TreeConstants) -> String {
        let mut out = String::new();
        self.infix_at(0, cons, &mut out);
        out
    }

    fn infix_at(&self, p: usize, cons: &TreeConstants, out: &mut String) -> usize {
        let node = self.code[p];
        let n_cons = cons.len() as i32;
        if node >= N_FUNC + n_cons {
            out.push_str(&format!("IN:{}", node - N_FUNC - n_cons));
            return p + 1;
        }
        if node >= N_FUNC {
            out.push_str(&format!("{}", cons.get((node - N_FUNC) as usize)));
            return p + 1;
        }
        out.push('(');
        let next = self.infix_at(p + 1, cons, out);
        out.push_str(match node {
            ADD => " + ",
            SUB => " - ",
            MUL => " * ",
            _ => " / ",
        });
        let next = self.infix_at(next, cons, out);
        out.push(')');
        next
    }

    #[cfg(test)]
    pub(crate) fn from_code(code: Vec<i32>) -> Self {
        Self {
            code,
            mu: vec![0.01],
        }
    }
}

/// Recursive growth of a random prefix expression.
///
/// Returns false when `max` was exceeded and the buffer contents must be
/// discarded.
fn grow(
    buffer: &mut Vec<i32>,
    max: usize,
    depth: usize,
    num_cons: usize,
    x_dim: usize,
    rng: &mut impl Rng,
) -> bool {
    if buffer.len() >= max {
        return false;
    }
    let terminal = buffer.is_empty() || depth == 0 || rng.gen_range(0..2) == 0;
    // the root must be a function
    if terminal && !buffer.is_empty() {
        let t = rng.gen_range(N_FUNC..N_FUNC + (num_cons + x_dim) as i32);
        buffer.push(t);
        return true;
    }
    buffer.push(rng.gen_range(0..N_FUNC));
    let child_depth = depth.saturating_sub(1);
    grow(buffer, max, child_depth, num_cons, x_dim, rng)
        && grow(buffer, max, child_depth, num_cons, x_dim, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_params() -> Params {
        let mut params = Params::default();
        params.x_dim = 2;
        params.gp.num_cons = 10;
        params.gp.init_depth = 4;
        params
    }

    fn constants(params: &Params) -> TreeConstants {
        let mut rng = StdRng::seed_from_u64(0);
        TreeConstants::new(params, &mut rng)
    }

    #[test]
    fn test_protected_division() {
        // DIV(IN:0, SUB(IN:0, IN:0)) on x = [3.0] yields the numerator
        let params = small_params();
        let cons = constants(&params);
        let n = cons.len() as i32;
        let tree = Tree::from_code(vec![DIV, N_FUNC + n, SUB, N_FUNC + n, N_FUNC + n]);
        assert_eq!(tree.eval(&cons, &[3.0]), 3.0);
    }

    #[test]
    fn test_eval_arithmetic() {
        let params = small_params();
        let cons = constants(&params);
        let n = cons.len() as i32;
        // ADD(MUL(IN:0, IN:1), IN:0) = x0*x1 + x0
        let tree = Tree::from_code(vec![
            ADD,
            MUL,
            N_FUNC + n,
            N_FUNC + n + 1,
            N_FUNC + n,
        ]);
        assert_eq!(tree.eval(&cons, &[2.0, 5.0]), 12.0);
    }

    #[test]
    fn test_random_tree_is_valid() {
        let params = small_params();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let tree = Tree::random(&params, &mut rng);
            assert!(!tree.is_empty());
            assert!(tree.len() <= GP_MAX_LEN);
            // the root is forced to a function
            assert!(tree.code[0] < N_FUNC);
            assert_eq!(tree.traverse(0), tree.len());
        }
    }

    #[test]
    fn test_crossover_preserves_validity() {
        let params = small_params();
        let cons = constants(&params);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let mut a = Tree::random(&params, &mut rng);
            let mut b = Tree::random(&params, &mut rng);
            a.crossover(&mut b, &mut rng);
            assert!(a.len() <= GP_MAX_LEN);
            assert!(b.len() <= GP_MAX_LEN);
            assert_eq!(a.traverse(0), a.len());
            assert_eq!(b.traverse(0), b.len());
            // both remain evaluable
            a.eval(&cons, &[0.5, 0.25]);
            b.eval(&cons, &[0.5, 0.25]);
        }
    }

    #[test]
    fn test_mutate_reports_change() {
        let mut params = small_params();
        params.mutation.p = 1.0;
        params.sam.min = 1.0; // pin the rate at 1 so every node is resampled
        let mut rng = StdRng::seed_from_u64(7);
        let mut tree = Tree::random(&params, &mut rng);
        let before = tree.clone();
        let changed = tree.mutate(&params, &mut rng);
        assert_eq!(changed, tree.code != before.code);
    }

    #[test]
    fn test_mutate_keeps_node_classes() {
        let mut params = small_params();
        params.mutation.p = 1.0;
        params.sam.min = 1.0;
        let mut rng = StdRng::seed_from_u64(11);
        let mut tree = Tree::random(&params, &mut rng);
        let before = tree.clone();
        tree.mutate(&params, &mut rng);
        for (old, new) in before.code.iter().zip(&tree.code) {
            assert_eq!(*old >= N_FUNC, *new >= N_FUNC);
        }
        assert_eq!(tree.traverse(0), tree.len());
    }

    #[test]
    fn test_save_load_round_trip() {
        let params = small_params();
        let mut rng = StdRng::seed_from_u64(13);
        let tree = Tree::random(&params, &mut rng);
        let mut buf = Vec::new();
        tree.save(&mut buf).unwrap();
        let loaded = Tree::load(&mut buf.as_slice()).unwrap();
        assert_eq!(tree, loaded);
        let mut buf2 = Vec::new();
        loaded.save(&mut buf2).unwrap();
        assert_eq!(buf, buf2);
    }

    #[test]
    fn test_load_rejects_bad_length() {
        let mut buf = Vec::new();
        serial::write_i32(&mut buf, 0).unwrap();
        assert!(Tree::load(&mut buf.as_slice()).is_err());
    }

    #[test]
    fn test_infix_rendering() {
        let params = small_params();
        let cons = constants(&params);
        let n = cons.len() as i32;
        let tree = Tree::from_code(vec![ADD, N_FUNC + n, N_FUNC + n + 1]);
        assert_eq!(tree.to_infix(&cons), "(IN:0 + IN:1)");
    }
}
