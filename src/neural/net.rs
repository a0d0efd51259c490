//! # Net
//!
//! An ordered stack of layers. Index 0 is the tail (input-facing) layer
//! and the last index is the head (output-facing) layer; `push` and `pop`
//! operate at the head. Cached input/output counts track the tail and head
//! respectively.

use std::io::{Read, Write};

use rand::Rng;

use crate::error::{XcsfError, XcsfResult};
use crate::neural::args::LayerArgs;
use crate::neural::layer::{Layer, LayerKind};
use crate::params::Params;
use crate::serial;

/// A neural network
#[derive(Clone, Debug, Default)]
pub struct Net {
    layers: Vec<Layer>,
    n_inputs: usize,
    n_outputs: usize,
}

impl Net {
    /// An empty network; layers are added with [`Net::push`] or
    /// [`Net::insert`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a network from a validated template chain, threading each
    /// layer's output shape into the next layer's input.
    pub fn from_args(templates: &[LayerArgs], params: &Params, rng: &mut impl Rng) -> XcsfResult<Self> {
        let mut templates = templates.to_vec();
        LayerArgs::validate(&mut templates)?;
        let mut net = Net::new();
        let mut prev: Option<(usize, (usize, usize, usize))> = None;
        for template in &templates {
            let mut args = template.clone();
            if let Some((n, (h, w, c))) = prev {
                args.n_inputs = n;
                args.height = h;
                args.width = w;
                args.channels = c;
            }
            let layer = Layer::from_args(&args, params, rng);
            prev = Some((layer.n_outputs(), layer.out_shape()));
            net.push(layer);
        }
        tracing::debug!(n_layers = net.n_layers(), "built network");
        Ok(net)
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn n_inputs(&self) -> usize {
        self.n_inputs
    }

    pub fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    pub fn layer(&self, i: usize) -> &Layer {
        &self.layers[i]
    }

    pub(crate) fn layer_mut(&mut self, i: usize) -> &mut Layer {
        &mut self.layers[i]
    }

    fn refresh_cache(&mut self) {
        self.n_inputs = self.layers.first().map_or(0, Layer::n_inputs);
        self.n_outputs = self.layers.last().map_or(0, Layer::n_outputs);
    }

    /// Inserts a layer; position 0 is the head, `n_layers` the tail.
    pub fn insert(&mut self, layer: Layer, position: usize) {
        let idx = self.layers.len().saturating_sub(position);
        self.layers.insert(idx, layer);
        self.refresh_cache();
    }

    /// Removes a layer; position 0 is the head.
    ///
    /// Removing the sole remaining layer is a contract violation.
    pub fn remove(&mut self, position: usize) -> XcsfResult<()> {
        if self.layers.len() < 2 {
            return Err(XcsfError::contract(
                "attempted to remove the only layer",
            ));
        }
        if position >= self.layers.len() {
            return Err(XcsfError::contract(format!(
                "no layer at position {position}"
            )));
        }
        let idx = self.layers.len() - 1 - position;
        self.layers.remove(idx);
        self.refresh_cache();
        Ok(())
    }

    /// Adds a layer at the head.
    pub fn push(&mut self, layer: Layer) {
        self.insert(layer, 0);
    }

    /// Removes the head layer.
    pub fn pop(&mut self) -> XcsfResult<()> {
        self.remove(0)
    }

    /// Re-randomises every layer.
    pub fn rand(&mut self, rng: &mut impl Rng) {
        for layer in &mut self.layers {
            layer.rand(rng);
        }
    }

    /// Forward-propagates an input tail to head.
    pub fn propagate(&mut self, input: &[f64], rng: &mut impl Rng) {
        assert!(!self.layers.is_empty(), "propagate on an empty network");
        for i in 0..self.layers.len() {
            let (done, rest) = self.layers.split_at_mut(i);
            let x = match done.last() {
                Some(prev) => prev.output(),
                None => input,
            };
            rest[0].forward(x, rng);
        }
    }

    /// One gradient-descent step against a target vector.
    ///
    /// Assumes the outputs are current for `input`, i.e. that
    /// [`Net::propagate`] ran on it. Deltas are zeroed, the head is seeded
    /// with the output error, the backward pass walks head to tail, and
    /// updates are applied tail to head.
    pub fn learn(&mut self, truth: &[f64], input: &[f64]) {
        assert!(!self.layers.is_empty(), "learn on an empty network");
        assert_eq!(truth.len(), self.n_outputs, "truth length mismatch");
        for layer in &mut self.layers {
            layer.delta_mut().fill(0.0);
        }
        let head = self.layers.last_mut().map(Layer::output_delta_mut);
        if let Some((output, delta)) = head {
            for i in 0..truth.len() {
                delta[i] = truth[i] - output[i];
            }
        }
        for i in (0..self.layers.len()).rev() {
            if i == 0 {
                self.layers[0].backward(input, None);
            } else {
                let (upstream, current) = self.layers.split_at_mut(i);
                let (up_output, up_delta) = upstream[i - 1].output_delta_mut();
                current[0].backward(up_output, Some(up_delta));
            }
        }
        for layer in &mut self.layers {
            layer.update();
        }
    }

    /// Mutates every layer tail to head, resizing a layer whenever its
    /// upstream neighbour changed output size.
    pub fn mutate(&mut self, params: &Params, rng: &mut impl Rng) -> bool {
        let mut changed = false;
        let mut do_resize = false;
        for i in 0..self.layers.len() {
            if do_resize {
                let (upstream, current) = self.layers.split_at_mut(i);
                current[0].resize(&upstream[i - 1], rng);
                do_resize = false;
            }
            let orig_outputs = self.layers[i].n_outputs();
            if self.layers[i].mutate(params, rng) {
                changed = true;
            }
            if self.layers[i].n_outputs() != orig_outputs {
                do_resize = true;
            }
        }
        self.refresh_cache();
        changed
    }

    /// Repairs any adjacent size mismatches without mutating.
    pub fn resize(&mut self, rng: &mut impl Rng) {
        for i in 1..self.layers.len() {
            let (upstream, current) = self.layers.split_at_mut(i);
            if current[0].n_inputs() != upstream[i - 1].n_outputs() {
                current[0].resize(&upstream[i - 1], rng);
            }
        }
        self.refresh_cache();
    }

    /// Output vector of the head layer.
    pub fn output(&self) -> &[f64] {
        self.layers.last().map_or(&[], Layer::output)
    }

    /// Output of a single head neuron.
    pub fn output_value(&self, idx: usize) -> f64 {
        assert!(idx < self.n_outputs, "output index {idx} out of range");
        self.output()[idx]
    }

    /// Total number of enabled weights in the parametric layers.
    pub fn size(&self) -> usize {
        self.layers
            .iter()
            .map(|l| match l {
                Layer::Connected(c) => c.n_active,
                Layer::Recurrent(r) => {
                    r.input_layer.n_active + r.self_layer.n_active + r.output_layer.n_active
                }
                Layer::Lstm(l) => l.n_outputs * (l.n_inputs + l.n_outputs) * 4,
                Layer::Convolutional(c) => c.weights.len(),
                _ => 0,
            })
            .sum()
    }

    /// Writes `(n_layers, n_inputs, n_outputs)` then each layer tail to
    /// head as a kind tag followed by its payload.
    pub fn save<W: Write>(&self, w: &mut W) -> XcsfResult<()> {
        serial::write_len(w, self.layers.len())?;
        serial::write_len(w, self.n_inputs)?;
        serial::write_len(w, self.n_outputs)?;
        for layer in &self.layers {
            serial::write_i32(w, layer.kind().code())?;
            layer.save(w)?;
        }
        Ok(())
    }

    /// Mirror of [`Net::save`]; rebuilds the stack through [`Net::push`].
    pub fn load<R: Read>(r: &mut R) -> XcsfResult<Self> {
        let n_layers = serial::read_len(r)?;
        let _n_inputs = serial::read_len(r)?;
        let _n_outputs = serial::read_len(r)?;
        let mut net = Net::new();
        for _ in 0..n_layers {
            let kind = LayerKind::from_code(serial::read_i32(r)?)?;
            net.push(Layer::load(kind, r)?);
        }
        Ok(net)
    }
}

impl std::fmt::Display for Net {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, layer) in self.layers.iter().enumerate() {
            writeln!(f, "layer ({i}) {layer}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::activation::Activation;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn connected_args(n_inputs: usize, n_init: usize) -> LayerArgs {
        LayerArgs {
            n_inputs,
            n_init,
            n_max: n_init,
            function: Activation::Logistic,
            ..LayerArgs::default()
        }
    }

    fn cache_invariant(net: &Net) {
        assert_eq!(net.n_inputs(), net.layer(0).n_inputs());
        assert_eq!(
            net.n_outputs(),
            net.layer(net.n_layers() - 1).n_outputs()
        );
        assert_eq!(
            net.output().len(),
            net.layer(net.n_layers() - 1).n_outputs()
        );
    }

    #[test]
    fn test_insert_remove_cache_invariant() {
        let params = Params::default();
        let mut rng = StdRng::seed_from_u64(0);
        let mut net = Net::new();
        net.push(Layer::from_args(
            &connected_args(3, 5),
            &params,
            &mut rng,
        ));
        cache_invariant(&net);
        net.push(Layer::from_args(
            &connected_args(5, 2),
            &params,
            &mut rng,
        ));
        cache_invariant(&net);
        assert_eq!((net.n_inputs(), net.n_outputs()), (3, 2));
        // insert a new tail
        net.insert(
            Layer::from_args(&connected_args(7, 3), &params, &mut rng),
            net.n_layers(),
        );
        cache_invariant(&net);
        assert_eq!(net.n_inputs(), 7);
        // remove the head
        net.remove(0).unwrap();
        cache_invariant(&net);
        assert_eq!(net.n_outputs(), 5);
    }

    #[test]
    fn test_sole_layer_removal_refused() {
        let params = Params::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut net = Net::new();
        net.push(Layer::from_args(
            &connected_args(2, 2),
            &params,
            &mut rng,
        ));
        assert!(net.pop().is_err());
        assert_eq!(net.n_layers(), 1);
    }

    #[test]
    fn test_single_layer_learn_step() {
        // identity net: output 0.25, one step toward truth 1.0
        let params = Params::default();
        let mut rng = StdRng::seed_from_u64(2);
        let args = LayerArgs {
            n_inputs: 2,
            n_init: 1,
            n_max: 1,
            function: Activation::Linear,
            eta: 0.1,
            sgd_weights: true,
            ..LayerArgs::default()
        };
        let mut net = Net::from_args(&[args], &params, &mut rng).unwrap();
        if let Layer::Connected(l) = net.layer_mut(0) {
            l.weights = vec![1.0, -1.0];
            l.biases = vec![0.0];
        }
        let input = [0.5, 0.25];
        net.propagate(&input, &mut rng);
        assert!((net.output_value(0) - 0.25).abs() < 1e-12);
        net.learn(&[1.0], &input);
        if let Layer::Connected(l) = net.layer(0) {
            assert!((l.weights[0] - 1.0375).abs() < 1e-12);
            assert!((l.weights[1] - -0.98125).abs() < 1e-12);
            assert!((l.biases[0] - 0.075).abs() < 1e-12);
        } else {
            unreachable!();
        }
    }

    #[test]
    fn test_two_layer_learning_reduces_error() {
        let params = Params::default();
        let mut rng = StdRng::seed_from_u64(3);
        let hidden = LayerArgs {
            n_inputs: 2,
            n_init: 8,
            n_max: 8,
            function: Activation::Logistic,
            eta: 0.5,
            sgd_weights: true,
            ..LayerArgs::default()
        };
        let output = LayerArgs {
            n_inputs: 8,
            n_init: 1,
            n_max: 1,
            function: Activation::Linear,
            eta: 0.5,
            sgd_weights: true,
            ..LayerArgs::default()
        };
        let mut net = Net::from_args(&[hidden, output], &params, &mut rng).unwrap();
        let input = [0.3, 0.7];
        let truth = [0.9];
        net.propagate(&input, &mut rng);
        let initial = (truth[0] - net.output_value(0)).abs();
        for _ in 0..100 {
            net.propagate(&input, &mut rng);
            net.learn(&truth, &input);
        }
        net.propagate(&input, &mut rng);
        let trained = (truth[0] - net.output_value(0)).abs();
        assert!(trained < initial);
        assert!(trained < 0.05);
    }

    #[test]
    fn test_save_load_round_trip() {
        // connected -> dropout -> connected -> softmax
        let params = Params::default();
        let mut rng = StdRng::seed_from_u64(4);
        let templates = [
            LayerArgs {
                n_inputs: 4,
                n_init: 8,
                n_max: 8,
                ..LayerArgs::default()
            },
            LayerArgs {
                kind: LayerKind::Dropout,
                probability: 0.25,
                ..LayerArgs::default()
            },
            LayerArgs {
                n_inputs: 8,
                n_init: 3,
                n_max: 3,
                function: Activation::Linear,
                ..LayerArgs::default()
            },
            LayerArgs {
                kind: LayerKind::Softmax,
                scale: 1.0,
                ..LayerArgs::default()
            },
        ];
        let mut net = Net::from_args(&templates, &params, &mut rng).unwrap();
        let mut buf = Vec::new();
        net.save(&mut buf).unwrap();
        let mut loaded = Net::load(&mut buf.as_slice()).unwrap();
        assert_eq!(loaded.n_layers(), 4);
        assert_eq!((loaded.n_inputs(), loaded.n_outputs()), (4, 3));
        let mut buf2 = Vec::new();
        loaded.save(&mut buf2).unwrap();
        assert_eq!(buf, buf2);
        // identical propagation under identically seeded dropout
        let input = [0.1, 0.2, 0.3, 0.4];
        let mut rng_a = StdRng::seed_from_u64(99);
        let mut rng_b = StdRng::seed_from_u64(99);
        net.propagate(&input, &mut rng_a);
        loaded.propagate(&input, &mut rng_b);
        assert_eq!(net.output(), loaded.output());
    }

    #[test]
    fn test_resize_repairs_adjacency() {
        let params = Params::default();
        let mut rng = StdRng::seed_from_u64(5);
        let templates = [
            connected_args(4, 8),
            connected_args(8, 8),
            connected_args(8, 3),
        ];
        let mut net = Net::from_args(&templates, &params, &mut rng).unwrap();
        // force the middle layer to grow from 8 to 12 neurons
        let before = match net.layer(2) {
            Layer::Connected(l) => l.weights.clone(),
            _ => unreachable!(),
        };
        if let Layer::Connected(l) = net.layer_mut(1) {
            l.set_neurons(12, &mut rng);
        }
        net.resize(&mut rng);
        for i in 1..net.n_layers() {
            assert_eq!(net.layer(i).n_inputs(), net.layer(i - 1).n_outputs());
        }
        // surviving input positions of the downstream layer are untouched
        if let Layer::Connected(l) = net.layer(2) {
            assert_eq!(l.n_inputs, 12);
            for i in 0..l.n_outputs {
                for j in 0..8 {
                    assert_eq!(l.weights[i * 12 + j], before[i * 8 + j]);
                }
                for j in 8..12 {
                    assert_eq!(l.weights[i * 12 + j], 0.0);
                }
            }
        } else {
            unreachable!();
        }
        cache_invariant(&net);
    }

    #[test]
    fn test_mutate_resizes_downstream() {
        let mut params = Params::default();
        params.mutation.s = 1.0;
        params.sam.min = 1.0; // force neuron mutation every call
        let mut rng = StdRng::seed_from_u64(6);
        let templates = [
            LayerArgs {
                n_inputs: 4,
                n_init: 8,
                n_max: 16,
                max_neuron_grow: 4,
                evolve_neurons: true,
                ..LayerArgs::default()
            },
            connected_args(8, 3),
        ];
        let mut net = Net::from_args(&templates, &params, &mut rng).unwrap();
        let mut changed = false;
        for _ in 0..20 {
            changed |= net.mutate(&params, &mut rng);
        }
        assert!(changed);
        assert_eq!(net.layer(1).n_inputs(), net.layer(0).n_outputs());
        cache_invariant(&net);
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let params = Params::default();
        let mut rng = StdRng::seed_from_u64(7);
        let net = Net::from_args(&[connected_args(3, 2)], &params, &mut rng).unwrap();
        let mut copy = net.clone();
        if let Layer::Connected(l) = copy.layer_mut(0) {
            l.weights[0] += 5.0;
        }
        let (a, b) = match (net.layer(0), copy.layer(0)) {
            (Layer::Connected(x), Layer::Connected(y)) => (x.weights[0], y.weights[0]),
            _ => unreachable!(),
        };
        assert_ne!(a, b);
    }
}
