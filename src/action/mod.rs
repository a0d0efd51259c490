//! # Actions
//!
//! The advocacy half of a classifier: which discrete action it proposes
//! for a matched input.

use std::io::{Read, Write};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{XcsfError, XcsfResult};
use crate::params::Params;
use crate::serial;

pub mod integer;
pub mod neural;

pub use integer::IntegerAction;
pub use neural::NeuralAction;

/// Action representation tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Integer,
    Neural,
}

const KINDS: [ActionKind; 2] = [ActionKind::Integer, ActionKind::Neural];

impl ActionKind {
    pub fn from_code(code: i32) -> XcsfResult<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|i| KINDS.get(i).copied())
            .ok_or_else(|| XcsfError::config(format!("invalid action type: {code}")))
    }

    pub fn code(self) -> i32 {
        KINDS.iter().position(|&k| k == self).unwrap_or(0) as i32
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::Neural => write!(f, "neural"),
        }
    }
}

/// A classifier action
#[derive(Clone, Debug)]
pub enum Action {
    Integer(IntegerAction),
    Neural(NeuralAction),
}

impl Action {
    pub fn new(params: &Params, rng: &mut impl Rng) -> XcsfResult<Self> {
        Ok(match params.act.kind {
            ActionKind::Integer => Self::Integer(IntegerAction::new(params, rng)),
            ActionKind::Neural => Self::Neural(NeuralAction::new(params, rng)?),
        })
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Integer(_) => ActionKind::Integer,
            Self::Neural(_) => ActionKind::Neural,
        }
    }

    /// The action advocated for an input.
    pub fn compute(&mut self, x: &[f64], rng: &mut impl Rng) -> usize {
        match self {
            Self::Integer(a) => a.compute(),
            Self::Neural(a) => a.compute(x, rng),
        }
    }

    /// Adjusts the representation until it advocates `action` on `x`.
    pub fn cover(&mut self, x: &[f64], action: usize, rng: &mut impl Rng) -> XcsfResult<()> {
        match self {
            Self::Integer(a) => {
                a.cover(action);
                Ok(())
            }
            Self::Neural(a) => a.cover(x, action, rng),
        }
    }

    pub fn mutate(&mut self, params: &Params, rng: &mut impl Rng) -> bool {
        match self {
            Self::Integer(a) => a.mutate(params, rng),
            Self::Neural(a) => a.mutate(params, rng),
        }
    }

    pub fn crossover(&mut self, _other: &mut Action, _params: &Params, _rng: &mut impl Rng) -> bool {
        false
    }

    /// Whether two actions advocate identically.
    pub fn general(&self, other: &Action) -> bool {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a.general(b),
            _ => false,
        }
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        serial::write_i32(w, self.kind().code())?;
        match self {
            Self::Integer(a) => a.save(w),
            Self::Neural(a) => a.save(w),
        }
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        let kind = ActionKind::from_code(serial::read_i32(r)?)?;
        Ok(match kind {
            ActionKind::Integer => Self::Integer(IntegerAction::load(r)?),
            ActionKind::Neural => Self::Neural(NeuralAction::load(r)?),
        })
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(a) => a.fmt(f),
            Self::Neural(a) => a.fmt(f),
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
            assert_eq!(ActionKind::from_code(kind.code()).unwrap(), kind);
        }
        assert!(ActionKind::from_code(2).is_err());
    }

    #[test]
    fn test_every_kind_constructs_and_persists() {
        let mut rng = StdRng::seed_from_u64(0);
        for kind in KINDS {
            let mut params = Params::default();
            params.x_dim = 2;
            params.n_actions = 4;
            params.act.kind = kind;
            let act = Action::new(&params, &mut rng).unwrap();
            assert_eq!(act.kind(), kind);
            let mut buf = Vec::new();
            act.save(&mut buf).unwrap();
            let loaded = Action::load(&mut buf.as_slice()).unwrap();
            let mut buf2 = Vec::new();
            loaded.save(&mut buf2).unwrap();
            assert_eq!(buf, buf2, "round trip failed for {kind}");
        }
    }
}
