//! # Classifier
//!
//! One rule of the population: a condition, a prediction and an action,
//! plus the accuracy bookkeeping the evolutionary loop steers by. The
//! three slots are instantiated once from the configured type tags and
//! everything afterwards flows through their sum-type interfaces.

use std::io::{Read, Write};

use rand::Rng;

use crate::action::Action;
use crate::condition::Condition;
use crate::error::XcsfResult;
use crate::gp::TreeConstants;
use crate::params::Params;
use crate::prediction::Prediction;
use crate::serial;

/// A single classifier rule
#[derive(Clone, Debug)]
pub struct Classifier {
    pub condition: Condition,
    pub prediction: Prediction,
    pub action: Action,

    /// Estimated prediction error
    pub error: f64,

    /// Relative accuracy share
    pub fitness: f64,

    /// Copies this rule represents
    pub numerosity: u32,

    /// Updates received
    pub experience: u32,

    /// Estimated action-set size
    pub set_size: f64,

    /// Creation timestamp in trials
    pub time: u32,

    /// Whether the last match test succeeded
    pub matched: bool,
}

impl Classifier {
    /// Creates a classifier with randomly-initialised substrates.
    pub fn new(
        params: &Params,
        set_size: f64,
        time: u32,
        rng: &mut impl Rng,
    ) -> XcsfResult<Self> {
        Ok(Self {
            condition: Condition::new(params, rng)?,
            prediction: Prediction::new(params, rng)?,
            action: Action::new(params, rng)?,
            error: params.ea.init_error,
            fitness: params.ea.init_fitness,
            numerosity: 1,
            experience: 0,
            set_size,
            time,
            matched: false,
        })
    }

    /// Tests the condition against an input, caching the outcome.
    pub fn matches(
        &mut self,
        params: &Params,
        cons: &TreeConstants,
        x: &[f64],
        rng: &mut impl Rng,
    ) -> bool {
        self.matched = self.condition.matches(params, cons, x, rng);
        self.matched
    }

    /// Outcome of the last match test.
    pub fn matched(&self) -> bool {
        self.matched
    }

    /// Computes the payoff prediction for an input.
    pub fn predict(&mut self, params: &Params, x: &[f64], rng: &mut impl Rng) -> &[f64] {
        self.prediction.compute(params, x, rng)
    }

    /// Advocated action for an input.
    pub fn act(&mut self, x: &[f64], rng: &mut impl Rng) -> usize {
        self.action.compute(x, rng)
    }

    /// Covers an unmatched input: the condition is adjusted to match and
    /// the action to advocate `action`.
    pub fn cover(
        &mut self,
        params: &Params,
        cons: &TreeConstants,
        x: &[f64],
        action: usize,
        rng: &mut impl Rng,
    ) -> XcsfResult<()> {
        self.condition.cover(params, cons, x, rng)?;
        self.action.cover(x, action, rng)
    }

    /// Absorbs one payoff observation.
    ///
    /// The prediction is assumed current for `x` (i.e. [`Classifier::predict`]
    /// ran). Error and set-size estimates use the arithmetic mean while the
    /// classifier is young and Widrow-Hoff tracking thereafter.
    pub fn update(&mut self, params: &Params, x: &[f64], y: &[f64], set_num: f64) {
        self.experience += 1;
        let exp = f64::from(self.experience);
        let beta = params.ea.beta;
        let loss = params.loss.compute(self.prediction.pre(), y);
        if exp < 1.0 / beta {
            self.error = (self.error * (exp - 1.0) + loss) / exp;
            self.set_size = (self.set_size * (exp - 1.0) + set_num) / exp;
        } else {
            self.error += beta * (loss - self.error);
            self.set_size += beta * (set_num - self.set_size);
        }
        self.prediction.update(params, x, y);
        self.condition.update(params, x, y);
    }

    /// Accuracy from the error power law.
    pub fn accuracy(&self, params: &Params) -> f64 {
        if self.error <= params.ea.eps_0 {
            1.0
        } else {
            params.ea.alpha * (self.error / params.ea.eps_0).powf(-params.ea.nu)
        }
    }

    /// Moves fitness toward this classifier's share of the set accuracy.
    pub fn update_fitness(&mut self, params: &Params, acc_sum: f64, acc: f64) {
        self.fitness +=
            params.ea.beta * ((acc * f64::from(self.numerosity)) / acc_sum - self.fitness);
    }

    /// Whether this classifier may subsume others.
    pub fn subsumer(&self, params: &Params) -> bool {
        self.experience as usize > params.ea.theta_sub && self.error < params.ea.eps_0
    }

    /// Whether this classifier subsumes another.
    pub fn subsumes(&self, params: &Params, other: &Classifier) -> bool {
        self.subsumer(params) && self.condition.general(&other.condition)
    }

    /// Roulette weight for deletion from the population.
    pub fn deletion_vote(&self, params: &Params, avg_fitness: f64) -> f64 {
        let num = f64::from(self.numerosity);
        let vote = self.set_size * num;
        if self.fitness / num >= params.ea.delta * avg_fitness
            || (self.experience as usize) < params.ea.theta_del
        {
            vote
        } else {
            vote * avg_fitness / (self.fitness / num)
        }
    }

    /// Whether this classifier's condition is more general than another's.
    pub fn general(&self, other: &Classifier) -> bool {
        self.condition.general(&other.condition)
    }

    pub fn mutate(&mut self, params: &Params, rng: &mut impl Rng) -> bool {
        let c = self.condition.mutate(params, rng);
        let p = self.prediction.mutate(params, rng);
        let a = self.action.mutate(params, rng);
        c || p || a
    }

    pub fn crossover(&mut self, other: &mut Classifier, params: &Params, rng: &mut impl Rng) -> bool {
        let c = self.condition.crossover(&mut other.condition, params, rng);
        let a = self.action.crossover(&mut other.action, params, rng);
        c || a
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        self.condition.save(w)?;
        self.prediction.save(w)?;
        self.action.save(w)?;
        serial::write_f64(w, self.error)?;
        serial::write_f64(w, self.fitness)?;
        serial::write_i32(w, self.numerosity as i32)?;
        serial::write_i32(w, self.experience as i32)?;
        serial::write_f64(w, self.set_size)?;
        serial::write_i32(w, self.time as i32)?;
        Ok(())
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        let condition = Condition::load(r)?;
        let prediction = Prediction::load(r)?;
        let action = Action::load(r)?;
        let error = serial::read_f64(r)?;
        let fitness = serial::read_f64(r)?;
        let numerosity = serial::read_i32(r)? as u32;
        let experience = serial::read_i32(r)? as u32;
        let set_size = serial::read_f64(r)?;
        let time = serial::read_i32(r)? as u32;
        Ok(Self {
            condition,
            prediction,
            action,
            error,
            fitness,
            numerosity,
            experience,
            set_size,
            time,
            matched: false,
        })
    }
}

impl std::fmt::Display for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} | {} | {} | err={:.5} fit={:.5} num={} exp={} size={:.2} time={}",
            self.condition,
            self.prediction,
            self.action,
            self.error,
            self.fitness,
            self.numerosity,
            self.experience,
            self.set_size,
            self.time
        )
    }
}
