//! A single logistic unit trained with a hand-derived gradient step
//!
//! This is the one place gradients are written out by hand instead of using
//! the autograd engine: for a sigmoid output trained with cross-entropy, the
//! gradient of the loss with respect to the weights reduces to the error
//! term `(y - output)` times the input, so the update is simply
//! `w += lr * mean((y - output) * x)`.

use rand_distr::{Distribution, Normal};
use thiserror::Error;

/// Errors for the perceptron
#[derive(Debug, Error)]
pub enum PerceptronError {
    #[error("feature size mismatch: expected {expected}, got {got}")]
    FeatureSizeMismatch { expected: usize, got: usize },
    #[error("labels must have the same length as the data: {label_len} labels, {data_len} rows")]
    LabelLengthMismatch { label_len: usize, data_len: usize },
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// A single-unit logistic classifier over f32 feature vectors
pub struct Perceptron {
    pub weights: Vec<f32>,
    pub bias: f32,
}

impl Perceptron {
    /// Weights start at Normal(0, 1/sqrt(n_features)) so the initial
    /// pre-activations stay in sigmoid's responsive range
    pub fn new(n_features: usize) -> Self {
        let std = 1.0 / (n_features as f32).sqrt();
        let normal = Normal::new(0.0, std).unwrap();
        let weights = (0..n_features)
            .map(|_| normal.sample(&mut rand::rng()))
            .collect();
        Self { weights, bias: 0.0 }
    }

    /// `sigmoid(w . x + b)`, the probability of the positive class
    pub fn output(&self, features: &[f32]) -> Result<f32, PerceptronError> {
        if features.len() != self.weights.len() {
            return Err(PerceptronError::FeatureSizeMismatch {
                expected: self.weights.len(),
                got: features.len(),
            });
        }
        let weighted: f32 = self
            .weights
            .iter()
            .zip(features.iter())
            .map(|(w, x)| w * x)
            .sum();
        Ok(sigmoid(weighted + self.bias))
    }

    pub fn predict(&self, features: &[f32]) -> Result<bool, PerceptronError> {
        Ok(self.output(features)? > 0.5)
    }

    /// Full-batch gradient descent for `epochs` passes over the data.
    ///
    /// Returns the per-epoch mean log loss. Logs a warning when the loss
    /// goes up between reporting intervals, the classic sign that the
    /// learning rate is too high.
    pub fn fit(
        &mut self,
        data: &[Vec<f32>],
        targets: &[f32],
        epochs: usize,
        lr: f32,
    ) -> Result<Vec<f32>, PerceptronError> {
        if data.len() != targets.len() {
            return Err(PerceptronError::LabelLengthMismatch {
                label_len: targets.len(),
                data_len: data.len(),
            });
        }
        let n_records = data.len() as f32;
        let report_every = (epochs / 10).max(1);
        let mut losses = Vec::with_capacity(epochs);
        let mut last_reported_loss = f32::INFINITY;

        for epoch in 0..epochs {
            let mut delta_w = vec![0.0; self.weights.len()];
            let mut delta_b = 0.0;
            for (features, &y) in data.iter().zip(targets.iter()) {
                let output = self.output(features)?;
                // the hand-derived error term
                let error = y - output;
                for (dw, x) in delta_w.iter_mut().zip(features.iter()) {
                    *dw += error * x;
                }
                delta_b += error;
            }
            for (w, dw) in self.weights.iter_mut().zip(delta_w.iter()) {
                *w += lr * dw / n_records;
            }
            self.bias += lr * delta_b / n_records;

            let loss = self.log_loss(data, targets)?;
            losses.push(loss);
            if epoch % report_every == 0 || epoch == epochs - 1 {
                if loss > last_reported_loss {
                    log::warn!("epoch {}: loss increasing, now {:.6}", epoch + 1, loss);
                } else {
                    log::info!("epoch {}: loss {:.6}", epoch + 1, loss);
                }
                last_reported_loss = loss;
            }
        }
        Ok(losses)
    }

    /// Mean binary cross-entropy of the current weights on a dataset
    pub fn log_loss(&self, data: &[Vec<f32>], targets: &[f32]) -> Result<f32, PerceptronError> {
        let mut total = 0.0;
        for (features, &y) in data.iter().zip(targets.iter()) {
            // clamp away from 0 and 1 so ln stays finite
            let p = self.output(features)?.clamp(1e-7, 1.0 - 1e-7);
            total -= y * p.ln() + (1.0 - y) * (1.0 - p).ln();
        }
        Ok(total / data.len() as f32)
    }

    /// Fraction of records classified correctly at the 0.5 threshold
    pub fn accuracy(&self, data: &[Vec<f32>], targets: &[f32]) -> Result<f32, PerceptronError> {
        let mut correct = 0;
        for (features, &y) in data.iter().zip(targets.iter()) {
            if self.predict(features)? == (y > 0.5) {
                correct += 1;
            }
        }
        Ok(correct as f32 / data.len() as f32)
    }
}
