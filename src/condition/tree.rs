//! GP-tree conditions: the expression value thresholded at one half.

use std::io::{Read, Write};

use rand::Rng;

use crate::condition::MAX_COVER_RETRIES;
use crate::error::{XcsfError, XcsfResult};
use crate::gp::{Tree, TreeConstants};
use crate::params::Params;

#[derive(Clone, Debug, PartialEq)]
pub struct TreeCond {
    tree: Tree,
}

impl TreeCond {
    pub fn new(params: &Params, rng: &mut impl Rng) -> Self {
        Self {
            tree: Tree::random(params, rng),
        }
    }

    pub fn matches(&self, cons: &TreeConstants, x: &[f64]) -> bool {
        self.tree.eval(cons, x) > 0.5
    }

    /// Regrows until the tree matches the input.
    pub fn cover(
        &mut self,
        params: &Params,
        cons: &TreeConstants,
        x: &[f64],
        rng: &mut impl Rng,
    ) -> XcsfResult<()> {
        for _ in 0..MAX_COVER_RETRIES {
            self.tree = Tree::random(params, rng);
            if self.matches(cons, x) {
                return Ok(());
            }
        }
        tracing::warn!("tree covering exhausted its retry limit");
        Err(XcsfError::Covering {
            trials: MAX_COVER_RETRIES,
        })
    }

    pub fn mutate(&mut self, params: &Params, rng: &mut impl Rng) -> bool {
        self.tree.mutate(params, rng)
    }

    pub fn crossover(&mut self, other: &mut TreeCond, rng: &mut impl Rng) -> bool {
        self.tree.crossover(&mut other.tree, rng)
    }

    pub fn size(&self) -> usize {
        self.tree.len()
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        self.tree.save(w)
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        Ok(Self {
            tree: Tree::load(r)?,
        })
    }
}

impl std::fmt::Display for TreeCond {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tree: len={}", self.tree.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tree_params() -> Params {
        let mut params = Params::default();
        params.x_dim = 2;
        params.gp.num_cons = 10;
        params.gp.init_depth = 4;
        params
    }

    #[test]
    fn test_cover_terminates_and_matches() {
        let params = tree_params();
        let mut rng = StdRng::seed_from_u64(0);
        let cons = TreeConstants::new(&params, &mut rng);
        let mut cond = TreeCond::new(&params, &mut rng);
        let x = [0.25, 0.75];
        cond.cover(&params, &cons, &x, &mut rng).unwrap();
        assert!(cond.matches(&cons, &x));
    }

    #[test]
    fn test_crossover_produces_valid_trees() {
        let params = tree_params();
        let mut rng = StdRng::seed_from_u64(1);
        let cons = TreeConstants::new(&params, &mut rng);
        let mut a = TreeCond::new(&params, &mut rng);
        let mut b = TreeCond::new(&params, &mut rng);
        a.crossover(&mut b, &mut rng);
        // both remain evaluable predicates
        a.matches(&cons, &[0.5, 0.5]);
        b.matches(&cons, &[0.5, 0.5]);
    }

    #[test]
    fn test_save_load_round_trip() {
        let params = tree_params();
        let mut rng = StdRng::seed_from_u64(2);
        let cond = TreeCond::new(&params, &mut rng);
        let mut buf = Vec::new();
        cond.save(&mut buf).unwrap();
        assert_eq!(cond, TreeCond::load(&mut buf.as_slice()).unwrap());
    }
}
