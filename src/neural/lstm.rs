//! LSTM layer built from eight connected gate projections, trained with a
//! single-step truncated gradient.

use std::io::{Read, Write};

use rand::Rng;

use crate::error::XcsfResult;
use crate::neural::activation::Activation;
use crate::neural::args::LayerArgs;
use crate::neural::connected::Connected;
use crate::neural::layer::{
    self, EVOLVE_ETA, EVOLVE_FUNCTIONS, EVOLVE_NEURONS, EVOLVE_WEIGHTS, MU_ETA, MU_FUNC,
    MU_NEURON, MU_WEIGHT,
};
use crate::params::Params;
use crate::sam;
use crate::serial;

#[derive(Clone, Debug)]
pub struct Lstm {
    pub(crate) n_inputs: usize,
    pub(crate) n_outputs: usize,
    pub(crate) n_min: usize,
    pub(crate) n_max: usize,
    pub(crate) max_neuron_grow: usize,
    pub(crate) options: u32,
    pub(crate) eta: f64,
    pub(crate) eta_max: f64,
    pub(crate) eta_min: f64,

    /// Candidate activation
    pub(crate) function: Activation,

    /// Gate activation
    pub(crate) recurrent_function: Activation,

    // input projections x -> n
    uf: Connected,
    ui: Connected,
    ug: Connected,
    uo: Connected,
    // hidden projections h -> n
    wf: Connected,
    wi: Connected,
    wg: Connected,
    wo: Connected,

    /// Cell state
    pub(crate) cell: Vec<f64>,
    prev_cell: Vec<f64>,

    /// Hidden state (the layer output)
    pub(crate) hidden: Vec<f64>,
    prev_hidden: Vec<f64>,

    // gate pre-activations and activations for the backward pass
    fs: Vec<f64>,
    is: Vec<f64>,
    gs: Vec<f64>,
    os: Vec<f64>,
    fa: Vec<f64>,
    ia: Vec<f64>,
    ga: Vec<f64>,
    oa: Vec<f64>,

    pub(crate) delta: Vec<f64>,
    pub(crate) mu: Vec<f64>,
}

fn gate_args(n_inputs: usize, n: usize, args: &LayerArgs) -> LayerArgs {
    LayerArgs {
        kind: layer::LayerKind::Connected,
        n_inputs,
        n_init: n,
        n_max: n,
        function: Activation::Linear,
        eta: args.eta,
        eta_min: args.eta_min,
        momentum: args.momentum,
        decay: args.decay,
        sgd_weights: args.sgd_weights,
        ..LayerArgs::default()
    }
}

impl Lstm {
    pub fn new(args: &LayerArgs, params: &Params, rng: &mut impl Rng) -> Self {
        let n = args.n_init;
        let xin = gate_args(args.n_inputs, n, args);
        let hin = gate_args(n, n, args);
        let uf = Connected::new(&xin, params, rng);
        let eta = uf.eta;
        Self {
            n_inputs: args.n_inputs,
            n_outputs: n,
            n_min: args.n_init.max(1),
            n_max: args.n_max.max(args.n_init),
            max_neuron_grow: args.max_neuron_grow,
            options: args.opts(),
            eta,
            eta_max: args.eta.max(args.eta_min),
            eta_min: args.eta_min,
            function: args.function,
            recurrent_function: args.recurrent_function,
            uf,
            ui: Connected::new(&xin, params, rng),
            ug: Connected::new(&xin, params, rng),
            uo: Connected::new(&xin, params, rng),
            wf: Connected::new(&hin, params, rng),
            wi: Connected::new(&hin, params, rng),
            wg: Connected::new(&hin, params, rng),
            wo: Connected::new(&hin, params, rng),
            cell: vec![0.0; n],
            prev_cell: vec![0.0; n],
            hidden: vec![0.0; n],
            prev_hidden: vec![0.0; n],
            fs: vec![0.0; n],
            is: vec![0.0; n],
            gs: vec![0.0; n],
            os: vec![0.0; n],
            fa: vec![0.0; n],
            ia: vec![0.0; n],
            ga: vec![0.0; n],
            oa: vec![0.0; n],
            delta: vec![0.0; n],
            mu: sam::init(&layer::base_rates(params), params.sam.min),
        }
    }

    pub fn output(&self) -> &[f64] {
        &self.hidden
    }

    pub fn delta_mut(&mut self) -> &mut [f64] {
        &mut self.delta
    }

    pub(crate) fn output_delta_mut(&mut self) -> (&[f64], &mut [f64]) {
        (&self.hidden, &mut self.delta)
    }

    fn sub_layers_mut(&mut self) -> [&mut Connected; 8] {
        [
            &mut self.uf,
            &mut self.ui,
            &mut self.ug,
            &mut self.uo,
            &mut self.wf,
            &mut self.wi,
            &mut self.wg,
            &mut self.wo,
        ]
    }

    pub fn rand(&mut self, rng: &mut impl Rng) {
        for sub in self.sub_layers_mut() {
            sub.rand(rng);
        }
    }

    pub fn forward(&mut self, input: &[f64]) {
        self.prev_cell.copy_from_slice(&self.cell);
        self.prev_hidden.copy_from_slice(&self.hidden);
        self.uf.forward(input);
        self.ui.forward(input);
        self.ug.forward(input);
        self.uo.forward(input);
        self.wf.forward(&self.prev_hidden);
        self.wi.forward(&self.prev_hidden);
        self.wg.forward(&self.prev_hidden);
        self.wo.forward(&self.prev_hidden);
        for j in 0..self.n_outputs {
            self.fs[j] = self.uf.output[j] + self.wf.output[j];
            self.is[j] = self.ui.output[j] + self.wi.output[j];
            self.gs[j] = self.ug.output[j] + self.wg.output[j];
            self.os[j] = self.uo.output[j] + self.wo.output[j];
            self.fa[j] = self.recurrent_function.apply(self.fs[j]);
            self.ia[j] = self.recurrent_function.apply(self.is[j]);
            self.ga[j] = self.function.apply(self.gs[j]);
            self.oa[j] = self.recurrent_function.apply(self.os[j]);
            self.cell[j] = self.fa[j] * self.prev_cell[j] + self.ia[j] * self.ga[j];
            self.hidden[j] = self.oa[j] * self.function.apply(self.cell[j]);
        }
    }

    pub fn backward(&mut self, input: &[f64], mut prev_delta: Option<&mut [f64]>) {
        for j in 0..self.n_outputs {
            let dh = self.delta[j];
            let cell_act = self.function.apply(self.cell[j]);
            let d_o = dh * cell_act * self.recurrent_function.gradient(self.os[j]);
            let dc = dh * self.oa[j] * self.function.gradient(self.cell[j]);
            let d_f = dc * self.prev_cell[j] * self.recurrent_function.gradient(self.fs[j]);
            let d_i = dc * self.ga[j] * self.recurrent_function.gradient(self.is[j]);
            let d_g = dc * self.ia[j] * self.function.gradient(self.gs[j]);
            self.uo.delta[j] = d_o;
            self.wo.delta[j] = d_o;
            self.uf.delta[j] = d_f;
            self.wf.delta[j] = d_f;
            self.ui.delta[j] = d_i;
            self.wi.delta[j] = d_i;
            self.ug.delta[j] = d_g;
            self.wg.delta[j] = d_g;
        }
        self.uf.backward(input, prev_delta.as_deref_mut());
        self.ui.backward(input, prev_delta.as_deref_mut());
        self.ug.backward(input, prev_delta.as_deref_mut());
        self.uo.backward(input, prev_delta.as_deref_mut());
        // gradients do not flow to the previous hidden state
        self.wf.backward(&self.prev_hidden, None);
        self.wi.backward(&self.prev_hidden, None);
        self.wg.backward(&self.prev_hidden, None);
        self.wo.backward(&self.prev_hidden, None);
    }

    pub fn update(&mut self) {
        for sub in self.sub_layers_mut() {
            sub.update();
        }
    }

    pub fn resize_inputs(&mut self, n_inputs: usize) {
        self.uf.resize_inputs(n_inputs);
        self.ui.resize_inputs(n_inputs);
        self.ug.resize_inputs(n_inputs);
        self.uo.resize_inputs(n_inputs);
        self.n_inputs = n_inputs;
    }

    fn set_neurons(&mut self, n: usize, rng: &mut impl Rng) {
        for sub in [&mut self.uf, &mut self.ui, &mut self.ug, &mut self.uo] {
            sub.set_neurons(n, rng);
        }
        for sub in [&mut self.wf, &mut self.wi, &mut self.wg, &mut self.wo] {
            sub.set_neurons(n, rng);
            sub.resize_inputs(n);
        }
        self.n_outputs = n;
        self.cell = vec![0.0; n];
        self.prev_cell = vec![0.0; n];
        self.hidden = vec![0.0; n];
        self.prev_hidden = vec![0.0; n];
        self.fs = vec![0.0; n];
        self.is = vec![0.0; n];
        self.gs = vec![0.0; n];
        self.os = vec![0.0; n];
        self.fa = vec![0.0; n];
        self.ia = vec![0.0; n];
        self.ga = vec![0.0; n];
        self.oa = vec![0.0; n];
        self.delta = vec![0.0; n];
    }

    pub fn mutate(&mut self, params: &Params, rng: &mut impl Rng) -> bool {
        sam::adapt(&mut self.mu, params.sam.kind, params.sam.min, rng);
        let mut changed = false;
        if self.options & EVOLVE_ETA != 0 {
            let mut eta = self.eta;
            if layer::mutate_eta(&mut eta, self.eta_min, self.eta_max, self.mu[MU_ETA], rng) {
                self.eta = eta;
                for sub in self.sub_layers_mut() {
                    sub.eta = eta;
                }
                changed = true;
            }
        }
        if self.options & EVOLVE_NEURONS != 0
            && self.max_neuron_grow > 0
            && rng.gen::<f64>() < self.mu[MU_NEURON]
        {
            let step = rng.gen_range(1..=self.max_neuron_grow) as isize;
            let step = if rng.gen_bool(0.5) { step } else { -step };
            let target = (self.n_outputs as isize + step)
                .clamp(self.n_min as isize, self.n_max as isize)
                as usize;
            if target != self.n_outputs {
                self.set_neurons(target, rng);
                changed = true;
            }
        }
        if self.options & EVOLVE_WEIGHTS != 0 {
            let rate = self.mu[MU_WEIGHT];
            for sub in self.sub_layers_mut() {
                changed |= layer::mutate_weights(&mut sub.weights, None, rate, rng);
                changed |= layer::mutate_weights(&mut sub.biases, None, rate, rng);
            }
        }
        if self.options & EVOLVE_FUNCTIONS != 0 && rng.gen::<f64>() < self.mu[MU_FUNC] {
            let new = Activation::uniform(rng);
            if new != self.function {
                self.function = new;
                changed = true;
            }
        }
        changed
    }

    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        serial::write_len(w, self.n_inputs)?;
        serial::write_len(w, self.n_outputs)?;
        serial::write_len(w, self.n_min)?;
        serial::write_len(w, self.n_max)?;
        serial::write_len(w, self.max_neuron_grow)?;
        serial::write_i32(w, self.options as i32)?;
        serial::write_f64(w, self.eta)?;
        serial::write_f64(w, self.eta_max)?;
        serial::write_f64(w, self.eta_min)?;
        serial::write_i32(w, self.function.code())?;
        serial::write_i32(w, self.recurrent_function.code())?;
        self.uf.save(w)?;
        self.ui.save(w)?;
        self.ug.save(w)?;
        self.uo.save(w)?;
        self.wf.save(w)?;
        self.wi.save(w)?;
        self.wg.save(w)?;
        self.wo.save(w)?;
        serial::write_f64_slice(w, &self.cell)?;
        serial::write_f64_slice(w, &self.hidden)?;
        serial::write_f64_slice(w, &self.mu)?;
        Ok(())
    }

    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        let n_inputs = serial::read_len(r)?;
        let n_outputs = serial::read_len(r)?;
        let n_min = serial::read_len(r)?;
        let n_max = serial::read_len(r)?;
        let max_neuron_grow = serial::read_len(r)?;
        let options = serial::read_i32(r)? as u32;
        let eta = serial::read_f64(r)?;
        let eta_max = serial::read_f64(r)?;
        let eta_min = serial::read_f64(r)?;
        let function = Activation::from_code(serial::read_i32(r)?)?;
        let recurrent_function = Activation::from_code(serial::read_i32(r)?)?;
        let uf = Connected::load(r)?;
        let ui = Connected::load(r)?;
        let ug = Connected::load(r)?;
        let uo = Connected::load(r)?;
        let wf = Connected::load(r)?;
        let wi = Connected::load(r)?;
        let wg = Connected::load(r)?;
        let wo = Connected::load(r)?;
        let cell = serial::read_f64_vec(r, n_outputs)?;
        let hidden = serial::read_f64_vec(r, n_outputs)?;
        let mu = serial::read_f64_vec(r, layer::LAYER_N_MU)?;
        Ok(Self {
            n_inputs,
            n_outputs,
            n_min,
            n_max,
            max_neuron_grow,
            options,
            eta,
            eta_max,
            eta_min,
            function,
            recurrent_function,
            uf,
            ui,
            ug,
            uo,
            wf,
            wi,
            wg,
            wo,
            cell,
            prev_cell: vec![0.0; n_outputs],
            hidden,
            prev_hidden: vec![0.0; n_outputs],
            fs: vec![0.0; n_outputs],
            is: vec![0.0; n_outputs],
            gs: vec![0.0; n_outputs],
            os: vec![0.0; n_outputs],
            fa: vec![0.0; n_outputs],
            ia: vec![0.0; n_outputs],
            ga: vec![0.0; n_outputs],
            oa: vec![0.0; n_outputs],
            delta: vec![0.0; n_outputs],
            mu,
        })
    }
}

impl std::fmt::Display for Lstm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "lstm: in={} out={} act={} gate={}",
            self.n_inputs, self.n_outputs, self.function, self.recurrent_function
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn lstm_args() -> LayerArgs {
        LayerArgs {
            kind: layer::LayerKind::Lstm,
            n_inputs: 2,
            n_init: 3,
            n_max: 3,
            function: Activation::Tanh,
            recurrent_function: Activation::Logistic,
            eta: 0.01,
            sgd_weights: true,
            ..LayerArgs::default()
        }
    }

    #[test]
    fn test_hidden_state_evolves() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut l = Lstm::new(&lstm_args(), &Params::default(), &mut rng);
        let x = [0.5, -0.5];
        l.forward(&x);
        let first = l.output().to_vec();
        l.forward(&x);
        assert_ne!(first, l.output());
    }

    #[test]
    fn test_backward_reaches_inputs() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut l = Lstm::new(&lstm_args(), &Params::default(), &mut rng);
        let x = [0.5, -0.5];
        l.forward(&x);
        for d in l.delta_mut() {
            *d = 1.0;
        }
        let mut prev = vec![0.0; 2];
        l.backward(&x, Some(&mut prev));
        l.update();
        assert!(prev.iter().any(|&d| d != 0.0));
    }

    #[test]
    fn test_save_load_round_trip() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut l = Lstm::new(&lstm_args(), &Params::default(), &mut rng);
        l.forward(&[0.1, 0.9]);
        let mut buf = Vec::new();
        l.save(&mut buf).unwrap();
        let loaded = Lstm::load(&mut buf.as_slice()).unwrap();
        let mut buf2 = Vec::new();
        loaded.save(&mut buf2).unwrap();
        assert_eq!(buf, buf2);
    }
}
