//! # Conditions
//!
//! The matching half of a classifier: a predicate over the input space.
//! Each representation is an arm of [`Condition`]; the kind is chosen once
//! at classifier creation from `COND_TYPE` and the embedding loop only ever
//! talks to the sum type.

use std::io::{Read, Write};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{XcsfError, XcsfResult};
use crate::gp::TreeConstants;
use crate::params::Params;
use crate::serial;

pub mod dgp;
pub mod ellipsoid;
pub mod neural;
pub mod rectangle;
pub mod ternary;
pub mod tree;

pub use dgp::DgpCond;
pub use ellipsoid::EllipsoidCond;
pub use neural::NeuralCond;
pub use rectangle::RectangleCond;
pub use ternary::TernaryCond;
pub use tree::TreeCond;

/// Attempts before covering is abandoned as a configuration error
pub(crate) const MAX_COVER_RETRIES: usize = 100_000;

/// Condition representation tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionKind {
    Ternary,
    Rectangle,
    Ellipsoid,
    Neural,
    Tree,
    Dgp,
}

const KINDS: [ConditionKind; 6] = [
    ConditionKind::Ternary,
    ConditionKind::Rectangle,
    ConditionKind::Ellipsoid,
    ConditionKind::Neural,
    ConditionKind::Tree,
    ConditionKind::Dgp,
];

impl ConditionKind {
    pub fn from_code(code: i32) -> XcsfResult<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|i| KINDS.get(i).copied())
            .ok_or_else(|| XcsfError::config(format!("invalid condition type: {code}")))
    }

    pub fn code(self) -> i32 {
        KINDS.iter().position(|&k| k == self).unwrap_or(0) as i32
    }
}

impl std::fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ternary => write!(f, "ternary"),
            Self::Rectangle => write!(f, "rectangle"),
            Self::Ellipsoid => write!(f, "ellipsoid"),
            Self::Neural => write!(f, "neural"),
            Self::Tree => write!(f, "tree"),
            Self::Dgp => write!(f, "dgp"),
        }
    }
}

/// A classifier condition
#[derive(Clone, Debug)]
pub enum Condition {
    Ternary(TernaryCond),
    Rectangle(RectangleCond),
    Ellipsoid(EllipsoidCond),
    Neural(NeuralCond),
    Tree(TreeCond),
    Dgp(DgpCond),
}

impl Condition {
    /// Creates a randomly-initialised condition of the configured kind.
    pub fn new(params: &Params, rng: &mut impl Rng) -> XcsfResult<Self> {
        Ok(match params.cond.kind {
            ConditionKind::Ternary => Self::Ternary(TernaryCond::new(params, rng)),
            ConditionKind::Rectangle => Self::Rectangle(RectangleCond::new(params, rng)),
            ConditionKind::Ellipsoid => Self::Ellipsoid(EllipsoidCond::new(params, rng)),
            ConditionKind::Neural => Self::Neural(NeuralCond::new(params, rng)?),
            ConditionKind::Tree => Self::Tree(TreeCond::new(params, rng)),
            ConditionKind::Dgp => Self::Dgp(DgpCond::new(params, rng)),
        })
    }

    pub fn kind(&self) -> ConditionKind {
        match self {
            Self::Ternary(_) => ConditionKind::Ternary,
            Self::Rectangle(_) => ConditionKind::Rectangle,
            Self::Ellipsoid(_) => ConditionKind::Ellipsoid,
            Self::Neural(_) => ConditionKind::Neural,
            Self::Tree(_) => ConditionKind::Tree,
            Self::Dgp(_) => ConditionKind::Dgp,
        }
    }

    /// Whether the condition matches an input.
    pub fn matches(
        &mut self,
        params: &Params,
        cons: &TreeConstants,
        x: &[f64],
        rng: &mut impl Rng,
    ) -> bool {
        match self {
            Self::Ternary(c) => c.matches(params, x),
            Self::Rectangle(c) => c.matches(x),
            Self::Ellipsoid(c) => c.matches(x),
            Self::Neural(c) => c.matches(x, rng),
            Self::Tree(c) => c.matches(cons, x),
            Self::Dgp(c) => c.matches(x),
        }
    }

    /// Mutates the condition until it matches `x`.
    ///
    /// Bounded by [`MAX_COVER_RETRIES`]; exhaustion signals an unsatisfiable
    /// configuration.
    pub fn cover(
        &mut self,
        params: &Params,
        cons: &TreeConstants,
        x: &[f64],
        rng: &mut impl Rng,
    ) -> XcsfResult<()> {
        match self {
            Self::Ternary(c) => {
                c.cover(params, x, rng);
                Ok(())
            }
            Self::Rectangle(c) => {
                c.cover(params, x, rng);
                Ok(())
            }
            Self::Ellipsoid(c) => {
                c.cover(params, x, rng);
                Ok(())
            }
            Self::Neural(c) => c.cover(x, rng),
            Self::Tree(c) => c.cover(params, cons, x, rng),
            Self::Dgp(c) => c.cover(x, rng),
        }
    }

    /// Conditions are not fitted to targets; present for interface
    /// completeness.
    pub fn update(&mut self, _params: &Params, _x: &[f64], _y: &[f64]) {}

    pub fn mutate(&mut self, params: &Params, rng: &mut impl Rng) -> bool {
        match self {
            Self::Ternary(c) => c.mutate(params, rng),
            Self::Rectangle(c) => c.mutate(params, rng),
            Self::Ellipsoid(c) => c.mutate(params, rng),
            Self::Neural(c) => c.mutate(params, rng),
            Self::Tree(c) => c.mutate(params, rng),
            Self::Dgp(c) => c.mutate(params, rng),
        }
    }

    /// Crossover between two conditions of the same representation.
    ///
    /// Mismatched or non-recombining representations return false.
    pub fn crossover(
        &mut self,
        other: &mut Condition,
        params: &Params,
        rng: &mut impl Rng,
    ) -> bool {
        match (self, other) {
            (Self::Ternary(a), Self::Ternary(b)) => a.crossover(b, params, rng),
            (Self::Rectangle(a), Self::Rectangle(b)) => a.crossover(b, params, rng),
            (Self::Ellipsoid(a), Self::Ellipsoid(b)) => a.crossover(b, params, rng),
            (Self::Tree(a), Self::Tree(b)) => a.crossover(b, rng),
            _ => false,
        }
    }

    /// Whether this condition is more general than (subsumes) another.
    pub fn general(&self, other: &Condition) -> bool {
        match (self, other) {
            (Self::Ternary(a), Self::Ternary(b)) => a.general(b),
            (Self::Rectangle(a), Self::Rectangle(b)) => a.general(b),
            (Self::Ellipsoid(a), Self::Ellipsoid(b)) => a.general(b),
            _ => false,
        }
    }

    /// Representation size: interval count, tree length, graph nodes or
    /// enabled weights.
    pub fn size(&self) -> usize {
        match self {
            Self::Ternary(c) => c.size(),
            Self::Rectangle(c) => c.size(),
            Self::Ellipsoid(c) => c.size(),
            Self::Neural(c) => c.size(),
            Self::Tree(c) => c.size(),
            Self::Dgp(c) => c.size(),
        }
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        serial::write_i32(w, self.kind().code())?;
        match self {
            Self::Ternary(c) => c.save(w),
            Self::Rectangle(c) => c.save(w),
            Self::Ellipsoid(c) => c.save(w),
            Self::Neural(c) => c.save(w),
            Self::Tree(c) => c.save(w),
            Self::Dgp(c) => c.save(w),
        }
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        let kind = ConditionKind::from_code(serial::read_i32(r)?)?;
        Ok(match kind {
            ConditionKind::Ternary => Self::Ternary(TernaryCond::load(r)?),
            ConditionKind::Rectangle => Self::Rectangle(RectangleCond::load(r)?),
            ConditionKind::Ellipsoid => Self::Ellipsoid(EllipsoidCond::load(r)?),
            ConditionKind::Neural => Self::Neural(NeuralCond::load(r)?),
            ConditionKind::Tree => Self::Tree(TreeCond::load(r)?),
            ConditionKind::Dgp => Self::Dgp(DgpCond::load(r)?),
        })
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ternary(c) => c.fmt(f),
            Self::Rectangle(c) => c.fmt(f),
            Self::Ellipsoid(c) => c.fmt(f),
            Self::Neural(c) => c.fmt(f),
            Self::Tree(c) => c.fmt(f),
            Self::Dgp(c) => c.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_kind_codes_round_trip() {
        for kind in KINDS {
            assert_eq!(ConditionKind::from_code(kind.code()).unwrap(), kind);
        }
        assert!(ConditionKind::from_code(6).is_err());
    }

    #[test]
    fn test_every_kind_constructs_and_persists() {
        let mut rng = StdRng::seed_from_u64(0);
        for kind in KINDS {
            let mut params = Params::default();
            params.x_dim = 2;
            params.cond.kind = kind;
            let cond = Condition::new(&params, &mut rng).unwrap();
            assert_eq!(cond.kind(), kind);
            let mut buf = Vec::new();
            cond.save(&mut buf).unwrap();
            let loaded = Condition::load(&mut buf.as_slice()).unwrap();
            let mut buf2 = Vec::new();
            loaded.save(&mut buf2).unwrap();
            assert_eq!(buf, buf2, "round trip failed for {kind}");
        }
    }

    #[test]
    fn test_mismatched_crossover_is_refused() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut params = Params::default();
        params.x_dim = 2;
        params.cond.kind = ConditionKind::Rectangle;
        let mut a = Condition::new(&params, &mut rng).unwrap();
        params.cond.kind = ConditionKind::Ternary;
        let mut b = Condition::new(&params, &mut rng).unwrap();
        assert!(!a.crossover(&mut b, &params, &mut rng));
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut params = Params::default();
        params.x_dim = 3;
        params.cond.kind = ConditionKind::Rectangle;
        params.mutation.p = 1.0;
        params.sam.min = 1.0;
        let original = Condition::new(&params, &mut rng).unwrap();
        let mut copy = original.clone();
        assert!(copy.mutate(&params, &mut rng));
        let (a, b) = match (&original, &copy) {
            (Condition::Rectangle(x), Condition::Rectangle(y)) => (x, y),
            _ => unreachable!(),
        };
        assert_ne!(a.center, b.center);
    }
}
