//! Building blocks for feed-forward neural networks

use std::sync::atomic::{self, AtomicUsize};

use rand_distr::{Distribution, Normal};
use thiserror::Error;

use crate::autograd::Var;
use crate::checkpoint::{CheckpointError, ParamTensor, lookup};

/// Errors for the neural network building blocks
#[derive(Debug, Error)]
pub enum NnError {
    #[error("input size mismatch: expected {expected}, got {got}")]
    InputSizeMismatch { expected: usize, got: usize },
}

/// Anything that maps an input vector to an output vector and owns
/// trainable parameters. Modeled on torch.nn.Module.
pub trait Module {
    fn zero_grad(&mut self) {
        for p in self.parameters().iter_mut() {
            p.zero_grad();
        }
    }

    fn parameters(&self) -> Vec<Var>;
    fn forward(&self, inputs: &[Var]) -> Result<Vec<Var>, NnError>;
}

/// A single unit of a fully-connected layer
pub struct Neuron {
    pub weights: Vec<Var>,
    pub bias: Var,
}

impl Neuron {
    fn new(n_inputs: usize) -> Self {
        // He initialization keeps activation variance roughly constant layer
        // to layer; large initial weights make softmax overflow to NaN
        let std = (2.0 / n_inputs as f32).sqrt();
        let normal = Normal::new(0.0, std).unwrap();
        let weights = (0..n_inputs)
            .map(|_| Var::new(normal.sample(&mut rand::rng())))
            .collect();
        Self {
            weights,
            bias: Var::new(normal.sample(&mut rand::rng())),
        }
    }

    // Deterministic unit for tests
    #[cfg(test)]
    fn new_ones(n_inputs: usize) -> Self {
        Self {
            weights: (0..n_inputs).map(|_| Var::new(1.0)).collect(),
            bias: Var::new(1.0),
        }
    }

    pub fn parameters(&self) -> Vec<Var> {
        self.weights
            .iter()
            .chain(std::iter::once(&self.bias))
            .cloned()
            .collect()
    }

    pub fn forward(&self, inputs: &[Var]) -> Result<Var, NnError> {
        if inputs.len() != self.weights.len() {
            return Err(NnError::InputSizeMismatch {
                expected: self.weights.len(),
                got: inputs.len(),
            });
        }
        let weighted = self
            .weights
            .iter()
            .zip(inputs.iter())
            .map(|(w, x)| w * x)
            .sum::<Var>();
        Ok(&weighted + &self.bias)
    }
}

/// A fully-connected layer, `y = W x + b`
pub struct Linear {
    neurons: Vec<Neuron>,
    in_features: usize,
    n_output_nans: AtomicUsize,
}

impl Linear {
    pub fn new(in_features: usize, out_features: usize) -> Self {
        let neurons = (0..out_features).map(|_| Neuron::new(in_features)).collect();
        Self {
            neurons,
            in_features,
            n_output_nans: AtomicUsize::new(0),
        }
    }

    #[cfg(test)]
    fn new_ones(in_features: usize, out_features: usize) -> Self {
        let neurons = (0..out_features)
            .map(|_| Neuron::new_ones(in_features))
            .collect();
        Self {
            neurons,
            in_features,
            n_output_nans: AtomicUsize::new(0),
        }
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.neurons.len()
    }

    pub fn parameters(&self) -> Vec<Var> {
        self.neurons.iter().flat_map(|n| n.parameters()).collect()
    }

    pub fn forward(&self, inputs: &[Var]) -> Result<Vec<Var>, NnError> {
        let outputs = self
            .neurons
            .iter()
            .map(|n| n.forward(inputs))
            .collect::<Result<Vec<_>, _>>()?;
        let n_output_nans = outputs.iter().filter(|v| v.data().is_nan()).count();
        self.n_output_nans
            .store(n_output_nans, atomic::Ordering::Relaxed);
        if n_output_nans > 0 {
            log::debug!("linear layer produced {} NaN outputs", n_output_nans);
        }
        Ok(outputs)
    }

    /// Exports the layer as `{prefix}.weight` (shape `[out, in]`, row major)
    /// and `{prefix}.bias` (shape `[out]`)
    pub fn state_dict(&self, prefix: &str) -> Vec<ParamTensor> {
        let weight = self
            .neurons
            .iter()
            .flat_map(|n| n.weights.iter().map(Var::data))
            .collect();
        let bias = self.neurons.iter().map(|n| n.bias.data()).collect();
        vec![
            ParamTensor::new(
                format!("{prefix}.weight"),
                vec![self.out_features(), self.in_features],
                weight,
            ),
            ParamTensor::new(format!("{prefix}.bias"), vec![self.out_features()], bias),
        ]
    }

    /// Restores the layer from a state dict, validating tensor shapes
    pub fn load_state_dict(
        &mut self,
        tensors: &[ParamTensor],
        prefix: &str,
    ) -> Result<(), CheckpointError> {
        let out = self.out_features();
        let weight = lookup(
            tensors,
            &format!("{prefix}.weight"),
            &[out, self.in_features],
        )?;
        let bias = lookup(tensors, &format!("{prefix}.bias"), &[out])?;
        for (i, neuron) in self.neurons.iter_mut().enumerate() {
            for (j, w) in neuron.weights.iter_mut().enumerate() {
                w.set_data(weight.data[i * self.in_features + j]);
            }
            neuron.bias.set_data(bias.data[i]);
        }
        Ok(())
    }
}

/// Element-wise ReLU over a vector of values
#[derive(Default)]
pub struct ReLU {
    n_dead_units: AtomicUsize,
}

impl ReLU {
    pub fn new() -> Self {
        Self {
            n_dead_units: AtomicUsize::new(0),
        }
    }

    pub fn forward(&self, inputs: &[Var]) -> Vec<Var> {
        let n_dead_units = inputs.iter().filter(|v| v.data() <= 0.0).count();
        self.n_dead_units
            .store(n_dead_units, atomic::Ordering::Relaxed);
        inputs.iter().map(|v| v.relu()).collect()
    }

    /// Number of units that output zero in the last forward pass
    pub fn n_dead_units(&self) -> usize {
        self.n_dead_units.load(atomic::Ordering::Relaxed)
    }
}

/// Element-wise sigmoid over a vector of values
#[derive(Default)]
pub struct Sigmoid {}

impl Sigmoid {
    pub fn new() -> Self {
        Self {}
    }

    pub fn forward(&self, inputs: &[Var]) -> Vec<Var> {
        inputs.iter().map(|v| v.sigmoid()).collect()
    }
}

/// Softmax over a vector of values
#[derive(Default)]
pub struct Softmax {}

impl Softmax {
    pub fn new() -> Self {
        Self {}
    }

    pub fn forward(&self, inputs: &[Var]) -> Vec<Var> {
        let exp_sum = inputs.iter().map(|v| v.exp()).sum::<Var>();
        // Large inputs overflow exp() and poison the whole vector with NaN,
        // which is why layer weights must start small
        inputs.iter().map(|v| v.exp() / exp_sum.clone()).collect()
    }
}

/// Log-softmax over a vector of values, `x_i - ln(sum_j exp(x_j))`
#[derive(Default)]
pub struct LogSoftmax {}

impl LogSoftmax {
    pub fn new() -> Self {
        Self {}
    }

    pub fn forward(&self, inputs: &[Var]) -> Vec<Var> {
        let log_sum = inputs.iter().map(|v| v.exp()).sum::<Var>().ln();
        inputs.iter().map(|v| v - &log_sum).collect()
    }
}

/// Index of the largest output, i.e. the predicted class
pub fn argmax(outputs: &[Var]) -> usize {
    outputs
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            a.data()
                .partial_cmp(&b.data())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// A one-hidden-layer classifier: Linear -> ReLU -> Linear -> LogSoftmax.
///
/// Outputs are log-probabilities, to be paired with [`crate::loss::NllLoss`].
pub struct Mlp {
    l1: Linear,
    relu: ReLU,
    l2: Linear,
    log_softmax: LogSoftmax,
}

impl Mlp {
    pub fn new(in_features: usize, hidden_units: usize, n_classes: usize) -> Self {
        Self {
            l1: Linear::new(in_features, hidden_units),
            relu: ReLU::new(),
            l2: Linear::new(hidden_units, n_classes),
            log_softmax: LogSoftmax::new(),
        }
    }

    /// Number of hidden units that were inactive in the last forward pass
    pub fn n_dead_units(&self) -> usize {
        self.relu.n_dead_units()
    }

    /// Predicted class for a single input
    pub fn predict(&self, inputs: &[Var]) -> Result<usize, NnError> {
        let log_probs = self.forward(inputs)?;
        Ok(argmax(&log_probs))
    }

    pub fn state_dict(&self) -> Vec<ParamTensor> {
        let mut tensors = self.l1.state_dict("l1");
        tensors.extend(self.l2.state_dict("l2"));
        tensors
    }

    pub fn load_state_dict(&mut self, tensors: &[ParamTensor]) -> Result<(), CheckpointError> {
        self.l1.load_state_dict(tensors, "l1")?;
        self.l2.load_state_dict(tensors, "l2")?;
        Ok(())
    }
}

impl Module for Mlp {
    fn parameters(&self) -> Vec<Var> {
        self.l1
            .parameters()
            .into_iter()
            .chain(self.l2.parameters())
            .collect()
    }

    fn forward(&self, inputs: &[Var]) -> Result<Vec<Var>, NnError> {
        let hidden = self.relu.forward(&self.l1.forward(inputs)?);
        Ok(self.log_softmax.forward(&self.l2.forward(&hidden)?))
    }
}

#[cfg(test)]
mod tests {
    use crate::assert_eq_float;

    use super::*;

    #[test]
    fn test_linear_forward() {
        let layer = Linear::new_ones(2, 3);
        let inputs = vec![Var::new(1.0), Var::new(2.0)];
        let outputs = layer.forward(&inputs).unwrap();
        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[0].data(), 4.0);
        assert_eq!(outputs[1].data(), 4.0);
        assert_eq!(outputs[2].data(), 4.0);
    }

    #[test]
    fn test_dim_mismatch() {
        let layer = Linear::new_ones(2, 3);
        let inputs = vec![Var::new(1.0)];
        let err = layer.forward(&inputs).unwrap_err();
        assert!(matches!(
            err,
            NnError::InputSizeMismatch {
                expected: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn test_softmax() {
        let softmax = Softmax::new();
        let inputs = vec![Var::new(1.0), Var::new(2.0)];
        let mut outputs = softmax.forward(&inputs);
        assert_eq!(outputs.len(), 2);
        assert_eq_float!(outputs[0].data(), 0.2689414);
        assert_eq_float!(outputs[1].data(), 0.7310585);

        // Softmax(x1, x2) = (exp(x1) / (exp(x1) + exp(x2)), exp(x2) / (exp(x1) + exp(x2)))
        // Let s1, s2 be the two outputs
        // d s1 / dx1 = s1 * (1 - s1)
        // d s1 / dx2 = -s1 * s2
        outputs[0].backward();
        let s1 = outputs[0].data();
        let s2 = outputs[1].data();
        assert_eq_float!(inputs[0].grad(), s1 * (1.0 - s1));
        assert_eq_float!(inputs[1].grad(), -s1 * s2);

        // Zeroing only the leaves would leave stale gradients in the many
        // intermediate nodes, so zero from the output
        outputs[0].zero_grad();
        outputs[1].backward();
        assert_eq_float!(inputs[0].grad(), -s1 * s2);
        assert_eq_float!(inputs[1].grad(), s2 * (1.0 - s2));
    }

    #[test]
    fn test_log_softmax_matches_softmax_log() {
        let inputs = vec![Var::new(0.5), Var::new(-1.0), Var::new(2.0)];
        let log_probs = LogSoftmax::new().forward(&inputs);
        let probs = Softmax::new().forward(&inputs);
        for (lp, p) in log_probs.iter().zip(probs.iter()) {
            assert_eq_float!(lp.data(), p.data().ln());
        }
        // probabilities sum to one
        let total: f32 = log_probs.iter().map(|lp| lp.data().exp()).sum();
        assert_eq_float!(total, 1.0);
    }

    #[test]
    fn test_sigmoid_layer() {
        let inputs = vec![Var::new(0.0), Var::new(100.0)];
        let outputs = Sigmoid::new().forward(&inputs);
        assert_eq_float!(outputs[0].data(), 0.5);
        assert_eq_float!(outputs[1].data(), 1.0);
    }

    #[test]
    fn test_argmax() {
        let outputs = vec![Var::new(-1.0), Var::new(3.0), Var::new(2.0)];
        assert_eq!(argmax(&outputs), 1);
    }

    #[test]
    fn test_mlp_state_dict_roundtrip() {
        let src = Mlp::new(4, 3, 2);
        let mut dst = Mlp::new(4, 3, 2);
        dst.load_state_dict(&src.state_dict()).unwrap();

        let inputs: Vec<Var> = (0..4).map(|i| Var::new(i as f32 * 0.25)).collect();
        let out_src = src.forward(&inputs).unwrap();
        let out_dst = dst.forward(&inputs).unwrap();
        for (a, b) in out_src.iter().zip(out_dst.iter()) {
            assert_eq_float!(a.data(), b.data());
        }
    }

    #[test]
    fn test_mlp_load_incompatible_architecture() {
        let src = Mlp::new(4, 3, 2);
        // different hidden width than the checkpoint
        let mut dst = Mlp::new(4, 8, 2);
        let err = dst.load_state_dict(&src.state_dict()).unwrap_err();
        assert!(matches!(
            err,
            crate::checkpoint::CheckpointError::ShapeMismatch { name, .. } if name == "l1.weight"
        ));
    }
}
