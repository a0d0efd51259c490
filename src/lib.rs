//! # XCSF Core
//!
//! The representation layer of an XCSF learning classifier system: the
//! pluggable condition, prediction and action substrates that a population
//! of rules is built from, together with the engines behind them.
//!
//! - **Neural engine**: multilayer networks with online gradient descent
//!   and an evolvable topology ([`neural`])
//! - **GP trees**: prefix-encoded arithmetic expressions with sub-tree
//!   crossover and self-adaptive point mutation ([`gp`])
//! - **Dynamical GP graphs**: fuzzy-logic graphs updated synchronously
//!   ([`dgp`])
//! - **Classifier parts**: the tagged condition/prediction/action sum
//!   types and the rule bookkeeping around them ([`condition`],
//!   [`prediction`], [`action`], [`classifier`])
//!
//! The embedding evolutionary loop owns selection, subsumption and
//! deletion; this crate owns what a single rule can express, be trained
//! on, mutate into and serialize as.
//!
//! ## Design
//!
//! Shared read-only state (the [`params::Params`] bundle, the
//! [`gp::TreeConstants`]) is threaded through construction explicitly, as
//! are random-number generators, so distinct classifiers can be evaluated
//! concurrently by the embedding loop without coordination. Persistence is
//! an explicit little-endian byte format with load-equals-save field
//! order.

pub mod action;
pub mod classifier;
pub mod condition;
pub mod dgp;
pub mod error;
pub mod gp;
pub mod loss;
pub mod neural;
pub mod params;
pub mod prediction;
pub mod sam;
pub mod serial;

pub use action::{Action, ActionKind};
pub use classifier::Classifier;
pub use condition::{Condition, ConditionKind};
pub use error::{XcsfError, XcsfResult};
pub use gp::{Tree, TreeConstants};
pub use loss::Loss;
pub use neural::{Activation, Layer, LayerArgs, LayerKind, Net};
pub use params::Params;
pub use prediction::{Prediction, PredictionKind};
pub use sam::SamType;
