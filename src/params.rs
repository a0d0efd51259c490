//! # Hyperparameters
//!
//! The immutable tuning bundle referenced read-only by every substrate.
//! Parameters are grouped the way they are consumed: evolutionary loop,
//! reinforcement glue, self-adaptation, GP, and the per-slot substrate
//! settings.
//!
//! A bundle is built either programmatically (`Params::default()` plus
//! field edits) or from a plain-text `KEY=value` file in which `#` starts a
//! comment, surrounding whitespace is ignored and every recognized key must
//! be present.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::action::ActionKind;
use crate::condition::ConditionKind;
use crate::error::{XcsfError, XcsfResult};
use crate::loss::Loss;
use crate::neural::activation::Activation;
use crate::prediction::PredictionKind;
use crate::sam::SamType;

/// Master parameter bundle
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Params {
    /// Input dimensionality of the problem
    pub x_dim: usize,

    /// Output dimensionality of the problem
    pub y_dim: usize,

    /// Number of discrete actions
    pub n_actions: usize,

    /// Evolutionary-loop parameters
    pub ea: EaParams,

    /// Reinforcement-learning glue
    pub rl: RlParams,

    /// Self-adaptive mutation controls
    pub sam: SamParams,

    /// GP-tree controls
    pub gp: GpParams,

    /// Condition substrate settings
    pub cond: CondParams,

    /// Prediction substrate settings
    pub pred: PredParams,

    /// Action substrate settings
    pub act: ActParams,

    /// Base mutation probabilities seeding the self-adaptive rates
    pub mutation: MutationParams,

    /// Error function applied to predictions
    pub loss: Loss,

    /// Thread budget advertised to the embedding loop
    pub omp_num_threads: usize,
}

/// Evolutionary-loop parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EaParams {
    pub pop_size: usize,
    pub max_trials: usize,
    pub theta_ea: f64,
    pub theta_del: usize,
    pub theta_sub: usize,
    pub beta: f64,
    pub alpha: f64,
    pub nu: f64,
    pub delta: f64,
    pub eps_0: f64,
    pub err_reduc: f64,
    pub fit_reduc: f64,
    pub init_error: f64,
    pub init_fitness: f64,
    pub select_type: i32,
    pub select_size: f64,
    pub subsumption: bool,
    pub set_subsumption: bool,
    pub p_crossover: f64,
    pub lambda: usize,
}

impl Default for EaParams {
    fn default() -> Self {
        Self {
            pop_size: 2000,
            max_trials: 100_000,
            theta_ea: 50.0,
            theta_del: 20,
            theta_sub: 100,
            beta: 0.1,
            alpha: 0.1,
            nu: 5.0,
            delta: 0.1,
            eps_0: 0.01,
            err_reduc: 1.0,
            fit_reduc: 0.1,
            init_error: 0.0,
            init_fitness: 0.01,
            select_type: 0,
            select_size: 0.4,
            subsumption: false,
            set_subsumption: false,
            p_crossover: 0.8,
            lambda: 2,
        }
    }
}

/// Reinforcement-learning glue
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RlParams {
    pub gamma: f64,
    pub p_explore: f64,
    pub teletransportation: usize,
    pub max_t: usize,
    pub max_k: usize,
    pub perf_avg_trials: usize,
}

impl Default for RlParams {
    fn default() -> Self {
        Self {
            gamma: 0.95,
            p_explore: 0.9,
            teletransportation: 50,
            max_t: 50,
            max_k: 1,
            perf_avg_trials: 1000,
        }
    }
}

/// Self-adaptive mutation controls
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SamParams {
    pub kind: SamType,
    pub num: usize,
    pub min: f64,
}

impl Default for SamParams {
    fn default() -> Self {
        Self {
            kind: SamType::RateSelect,
            num: 1,
            min: 0.0001,
        }
    }
}

/// GP-tree controls
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GpParams {
    pub num_cons: usize,
    pub init_depth: usize,
}

impl Default for GpParams {
    fn default() -> Self {
        Self {
            num_cons: 100,
            init_depth: 5,
        }
    }
}

/// Condition substrate settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CondParams {
    pub kind: ConditionKind,

    /// Lower bound of the input/interval space
    pub min: f64,

    /// Upper bound of the input/interval space
    pub max: f64,

    /// Minimum interval spread
    pub smin: f64,

    /// Gradient rate for condition networks
    pub eta: f64,

    pub evolve_weights: bool,
    pub evolve_neurons: bool,
    pub evolve_functions: bool,
    pub num_hidden: usize,
    pub max_hidden: usize,
    pub activation: Activation,

    /// Bits per input for ternary binarisation
    pub bits: usize,

    /// Node count for dynamical GP graphs
    pub dgp_nodes: usize,
}

impl Default for CondParams {
    fn default() -> Self {
        Self {
            kind: ConditionKind::Rectangle,
            min: 0.0,
            max: 1.0,
            smin: 0.1,
            eta: 0.0,
            evolve_weights: true,
            evolve_neurons: false,
            evolve_functions: false,
            num_hidden: 5,
            max_hidden: 10,
            activation: Activation::Logistic,
            bits: 2,
            dgp_nodes: 20,
        }
    }
}

/// Prediction substrate settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PredParams {
    pub kind: PredictionKind,
    pub eta: f64,
    pub momentum: f64,
    pub rls_lambda: f64,
    pub rls_scale_factor: f64,
    pub x0: f64,
    pub sgd_weights: bool,
    pub evolve_eta: bool,
    pub reset: bool,
    pub evolve_weights: bool,
    pub evolve_neurons: bool,
    pub evolve_functions: bool,
    pub num_hidden: usize,
    pub max_hidden: usize,
    pub activation: Activation,
}

impl Default for PredParams {
    fn default() -> Self {
        Self {
            kind: PredictionKind::NlmsLinear,
            eta: 0.1,
            momentum: 0.9,
            rls_lambda: 1.0,
            rls_scale_factor: 1000.0,
            x0: 1.0,
            sgd_weights: false,
            evolve_eta: false,
            reset: false,
            evolve_weights: true,
            evolve_neurons: false,
            evolve_functions: false,
            num_hidden: 5,
            max_hidden: 10,
            activation: Activation::Logistic,
        }
    }
}

/// Action substrate settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActParams {
    pub kind: ActionKind,
}

impl Default for ActParams {
    fn default() -> Self {
        Self {
            kind: ActionKind::Integer,
        }
    }
}

/// Base mutation probabilities
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MutationParams {
    /// Weight / allele perturbation probability
    pub p: f64,

    /// Activation-function redraw probability
    pub f: f64,

    /// Neuron growth probability
    pub s: f64,

    /// Learning-rate perturbation spread
    pub e: f64,
}

impl Default for MutationParams {
    fn default() -> Self {
        Self {
            p: 0.04,
            f: 0.1,
            s: 0.1,
            e: 0.01,
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            x_dim: 1,
            y_dim: 1,
            n_actions: 1,
            ea: EaParams::default(),
            rl: RlParams::default(),
            sam: SamParams::default(),
            gp: GpParams::default(),
            cond: CondParams::default(),
            pred: PredParams::default(),
            act: ActParams::default(),
            mutation: MutationParams::default(),
            loss: Loss::Mae,
            omp_num_threads: 8,
        }
    }
}

impl Params {
    /// Reads a parameter bundle from a `KEY=value` configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> XcsfResult<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let params = Self::from_config(&text)?;
        tracing::info!(path = %path.as_ref().display(), "loaded configuration");
        Ok(params)
    }

    /// Parses a parameter bundle from configuration text.
    ///
    /// Every recognized key must be present; an absent key is a
    /// configuration error.
    pub fn from_config(text: &str) -> XcsfResult<Self> {
        let map = parse_pairs(text)?;
        let params = Self {
            x_dim: 1,
            y_dim: 1,
            n_actions: 1,
            ea: EaParams {
                pop_size: get_int(&map, "POP_SIZE")?,
                max_trials: get_int(&map, "MAX_TRIALS")?,
                theta_ea: get_real(&map, "THETA_EA")?,
                theta_del: get_int(&map, "THETA_DEL")?,
                theta_sub: get_int(&map, "THETA_SUB")?,
                beta: get_real(&map, "BETA")?,
                alpha: get_real(&map, "ALPHA")?,
                nu: get_real(&map, "NU")?,
                delta: get_real(&map, "DELTA")?,
                eps_0: get_real(&map, "EPS_0")?,
                err_reduc: get_real(&map, "ERR_REDUC")?,
                fit_reduc: get_real(&map, "FIT_REDUC")?,
                init_error: get_real(&map, "INIT_ERROR")?,
                init_fitness: get_real(&map, "INIT_FITNESS")?,
                select_type: get_int(&map, "EA_SELECT_TYPE")? as i32,
                select_size: get_real(&map, "EA_SELECT_SIZE")?,
                subsumption: get_bool(&map, "EA_SUBSUMPTION")?,
                set_subsumption: get_bool(&map, "SET_SUBSUMPTION")?,
                p_crossover: get_real(&map, "P_CROSSOVER")?,
                lambda: get_int(&map, "LAMBDA")?,
            },
            rl: RlParams {
                gamma: get_real(&map, "GAMMA")?,
                p_explore: get_real(&map, "P_EXPLORE")?,
                teletransportation: get_int(&map, "TELETRANSPORTATION")?,
                max_t: get_int(&map, "MAX_T")?,
                max_k: get_int(&map, "MAX_K")?,
                perf_avg_trials: get_int(&map, "PERF_AVG_TRIALS")?,
            },
            sam: SamParams {
                kind: SamType::from_code(get_int(&map, "SAM_TYPE")? as i32)?,
                num: get_int(&map, "SAM_NUM")?,
                min: get_real(&map, "SAM_MIN")?,
            },
            gp: GpParams {
                num_cons: get_int(&map, "GP_NUM_CONS")?,
                init_depth: get_int(&map, "GP_INIT_DEPTH")?,
            },
            cond: CondParams {
                kind: ConditionKind::from_code(get_int(&map, "COND_TYPE")? as i32)?,
                min: get_real(&map, "COND_MIN")?,
                max: get_real(&map, "COND_MAX")?,
                smin: get_real(&map, "COND_SMIN")?,
                eta: get_real(&map, "COND_ETA")?,
                evolve_weights: get_bool(&map, "COND_EVOLVE_WEIGHTS")?,
                evolve_neurons: get_bool(&map, "COND_EVOLVE_NEURONS")?,
                evolve_functions: get_bool(&map, "COND_EVOLVE_FUNCTIONS")?,
                num_hidden: get_int(&map, "COND_NUM_HIDDEN_NEURONS")?,
                max_hidden: get_int(&map, "COND_MAX_HIDDEN_NEURONS")?,
                activation: Activation::from_code(
                    get_int(&map, "COND_HIDDEN_NEURON_ACTIVATION")? as i32,
                )?,
                bits: get_int_or(&map, "COND_BITS", 2)?,
                dgp_nodes: get_int_or(&map, "DGP_NUM_NODES", 20)?,
            },
            pred: PredParams {
                kind: PredictionKind::from_code(get_int(&map, "PRED_TYPE")? as i32)?,
                eta: get_real(&map, "PRED_ETA")?,
                momentum: get_real(&map, "PRED_MOMENTUM")?,
                rls_lambda: get_real(&map, "PRED_RLS_LAMBDA")?,
                rls_scale_factor: get_real(&map, "PRED_RLS_SCALE_FACTOR")?,
                x0: get_real(&map, "PRED_X0")?,
                sgd_weights: get_bool(&map, "PRED_SGD_WEIGHTS")?,
                evolve_eta: get_bool(&map, "PRED_EVOLVE_ETA")?,
                reset: get_bool(&map, "PRED_RESET")?,
                evolve_weights: get_bool(&map, "PRED_EVOLVE_WEIGHTS")?,
                evolve_neurons: get_bool(&map, "PRED_EVOLVE_NEURONS")?,
                evolve_functions: get_bool(&map, "PRED_EVOLVE_FUNCTIONS")?,
                num_hidden: get_int(&map, "PRED_NUM_HIDDEN_NEURONS")?,
                max_hidden: get_int(&map, "PRED_MAX_HIDDEN_NEURONS")?,
                activation: Activation::from_code(
                    get_int(&map, "PRED_HIDDEN_NEURON_ACTIVATION")? as i32,
                )?,
            },
            act: ActParams {
                kind: ActionKind::from_code(get_int(&map, "ACT_TYPE")? as i32)?,
            },
            mutation: MutationParams {
                p: get_real(&map, "P_MUTATION")?,
                f: get_real(&map, "F_MUTATION")?,
                s: get_real(&map, "S_MUTATION")?,
                e: get_real(&map, "E_MUTATION")?,
            },
            loss: Loss::from_code(get_int(&map, "LOSS_FUNC")? as i32)?,
            omp_num_threads: get_int(&map, "OMP_NUM_THREADS")?,
        };
        Ok(params)
    }

    /// Sets the problem dimensions before any substrate is instantiated.
    pub fn set_problem(&mut self, x_dim: usize, y_dim: usize, n_actions: usize) {
        self.x_dim = x_dim;
        self.y_dim = y_dim;
        self.n_actions = n_actions;
    }
}

/// Splits configuration text into name/value pairs.
///
/// Empty and all-whitespace lines are silently ignored, as is anything
/// after a `#`.
fn parse_pairs(text: &str) -> XcsfResult<HashMap<String, String>> {
    let mut map = HashMap::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = match line.find('#') {
            Some(i) => line[..i].trim_end(),
            None => line,
        };
        let (name, value) = line
            .split_once('=')
            .ok_or_else(|| XcsfError::config(format!("no '=' found: {line}")))?;
        map.insert(name.trim().to_string(), value.trim().to_string());
    }
    Ok(map)
}

fn get_str<'a>(map: &'a HashMap<String, String>, key: &str) -> XcsfResult<&'a str> {
    map.get(key)
        .map(String::as_str)
        .ok_or_else(|| XcsfError::config(format!("missing parameter: {key}")))
}

fn get_int(map: &HashMap<String, String>, key: &str) -> XcsfResult<usize> {
    let s = get_str(map, key)?;
    s.parse::<usize>()
        .map_err(|_| XcsfError::config(format!("invalid integer for {key}: {s}")))
}

fn get_int_or(map: &HashMap<String, String>, key: &str, default: usize) -> XcsfResult<usize> {
    match map.get(key) {
        Some(s) => s
            .parse::<usize>()
            .map_err(|_| XcsfError::config(format!("invalid integer for {key}: {s}"))),
        None => Ok(default),
    }
}

fn get_real(map: &HashMap<String, String>, key: &str) -> XcsfResult<f64> {
    let s = get_str(map, key)?;
    s.parse::<f64>()
        .map_err(|_| XcsfError::config(format!("invalid real for {key}: {s}")))
}

/// Booleans are the literal string `true`; anything else is false.
fn get_bool(map: &HashMap<String, String>, key: &str) -> XcsfResult<bool> {
    Ok(get_str(map, key)? == "true")
}

#[cfg(test)]
pub(crate) fn example_config() -> String {
    // every required key, in no particular order
    let pairs = [
        ("POP_SIZE", "500"),
        ("MAX_TRIALS", "10000"),
        ("THETA_EA", "25"),
        ("THETA_DEL", "20"),
        ("THETA_SUB", "100"),
        ("BETA", "0.1"),
        ("ALPHA", "0.1"),
        ("NU", "5"),
        ("DELTA", "0.1"),
        ("EPS_0", "0.01"),
        ("ERR_REDUC", "1.0"),
        ("FIT_REDUC", "0.1"),
        ("INIT_ERROR", "0"),
        ("INIT_FITNESS", "0.01"),
        ("EA_SELECT_TYPE", "0"),
        ("EA_SELECT_SIZE", "0.4"),
        ("EA_SUBSUMPTION", "false"),
        ("SET_SUBSUMPTION", "false"),
        ("P_CROSSOVER", "0.8"),
        ("LAMBDA", "2"),
        ("GAMMA", "0.95"),
        ("P_EXPLORE", "0.9"),
        ("TELETRANSPORTATION", "50"),
        ("MAX_T", "50"),
        ("MAX_K", "1"),
        ("PERF_AVG_TRIALS", "1000"),
        ("COND_TYPE", "1"),
        ("PRED_TYPE", "1"),
        ("ACT_TYPE", "0"),
        ("SAM_TYPE", "0"),
        ("SAM_NUM", "1"),
        ("SAM_MIN", "0.0001"),
        ("GP_NUM_CONS", "50"),
        ("GP_INIT_DEPTH", "5"),
        ("COND_NUM_HIDDEN_NEURONS", "5"),
        ("COND_MAX_HIDDEN_NEURONS", "10"),
        ("COND_HIDDEN_NEURON_ACTIVATION", "0"),
        ("PRED_NUM_HIDDEN_NEURONS", "5"),
        ("PRED_MAX_HIDDEN_NEURONS", "10"),
        ("PRED_HIDDEN_NEURON_ACTIVATION", "0"),
        ("PRED_ETA", "0.1"),
        ("PRED_MOMENTUM", "0.9"),
        ("PRED_RLS_LAMBDA", "1.0"),
        ("PRED_RLS_SCALE_FACTOR", "1000"),
        ("PRED_X0", "1.0"),
        ("PRED_SGD_WEIGHTS", "true"),
        ("PRED_EVOLVE_ETA", "false"),
        ("PRED_RESET", "false"),
        ("COND_MIN", "0"),
        ("COND_MAX", "1"),
        ("COND_SMIN", "0.1"),
        ("COND_ETA", "0"),
        ("COND_EVOLVE_WEIGHTS", "true"),
        ("COND_EVOLVE_NEURONS", "false"),
        ("COND_EVOLVE_FUNCTIONS", "false"),
        ("PRED_EVOLVE_WEIGHTS", "false"),
        ("PRED_EVOLVE_NEURONS", "false"),
        ("PRED_EVOLVE_FUNCTIONS", "false"),
        ("P_MUTATION", "0.04"),
        ("F_MUTATION", "0.1"),
        ("S_MUTATION", "0.1"),
        ("E_MUTATION", "0.01"),
        ("LOSS_FUNC", "0"),
        ("OMP_NUM_THREADS", "8"),
    ];
    let mut text = String::from("# example configuration\n\n");
    for (k, v) in pairs {
        text.push_str(&format!("{k} = {v}\n"));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parses() {
        let params = Params::from_config(&example_config()).unwrap();
        assert_eq!(params.ea.pop_size, 500);
        assert_eq!(params.cond.kind, ConditionKind::Rectangle);
        assert_eq!(params.pred.kind, PredictionKind::NlmsLinear);
        assert_eq!(params.act.kind, ActionKind::Integer);
        assert!(params.pred.sgd_weights);
        assert_eq!(params.loss, Loss::Mae);
        assert!((params.ea.theta_ea - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_key_is_fatal() {
        let text = example_config().replace("POP_SIZE = 500\n", "");
        let err = Params::from_config(&text).unwrap_err();
        assert!(err.to_string().contains("POP_SIZE"));
    }

    #[test]
    fn test_comments_and_blank_lines_ignored() {
        let mut text = example_config();
        text.push_str("\n   \n# trailing comment\nOMP_NUM_THREADS = 4 # inline\n");
        let params = Params::from_config(&text).unwrap();
        assert_eq!(params.omp_num_threads, 4);
    }

    #[test]
    fn test_non_true_bool_is_false() {
        let text = example_config().replace("PRED_SGD_WEIGHTS = true", "PRED_SGD_WEIGHTS = yes");
        let params = Params::from_config(&text).unwrap();
        assert!(!params.pred.sgd_weights);
    }

    #[test]
    fn test_line_without_equals_is_error() {
        let mut text = example_config();
        text.push_str("BROKEN LINE\n");
        assert!(Params::from_config(&text).is_err());
    }

    #[test]
    fn test_set_problem() {
        let mut params = Params::default();
        params.set_problem(4, 2, 3);
        assert_eq!((params.x_dim, params.y_dim, params.n_actions), (4, 2, 3));
    }
}
