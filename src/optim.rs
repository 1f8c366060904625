//! Optimizers

use crate::autograd::Var;

/// Common interface for optimizers, analogous to torch.optim.Optimizer
pub trait Optim {
    /// Performs a single update step with the accumulated gradients
    fn step(&mut self);
    /// Zeros gradients for all parameters
    fn zero_grad(&mut self);
}

/// Stochastic gradient descent with momentum
pub struct Sgd {
    params: Vec<Var>,
    lr: f32,
    momentum: f32,
    // velocity per parameter
    velocity: Vec<f32>,
}

impl Sgd {
    pub fn new(params: Vec<Var>, lr: f32, momentum: f32) -> Self {
        let velocity = vec![0.0; params.len()];
        Self {
            params,
            lr,
            momentum,
            velocity,
        }
    }

    #[cfg(test)]
    fn velocities(&self) -> &[f32] {
        &self.velocity
    }
}

impl Optim for Sgd {
    fn step(&mut self) {
        for (idx, param) in self.params.iter_mut().enumerate() {
            let velocity = self.momentum * self.velocity[idx] - self.lr * param.grad();
            let new_val = param.data() + velocity;
            self.velocity[idx] = velocity;
            param.set_data(new_val);
        }
    }

    fn zero_grad(&mut self) {
        for param in self.params.iter_mut() {
            param.zero_grad();
        }
    }
}

const ADAM_EPSILON: f32 = 1e-8;

/// Adam optimizer with bias-corrected first and second moment estimates
pub struct Adam {
    params: Vec<Var>,
    lr: f32,
    beta1: f32,
    beta2: f32,
    // update count, used for bias correction
    t: i32,
    m: Vec<f32>,
    v: Vec<f32>,
}

impl Adam {
    /// Adam with the customary defaults beta1 = 0.9, beta2 = 0.999
    pub fn new(params: Vec<Var>, lr: f32) -> Self {
        Self::with_betas(params, lr, 0.9, 0.999)
    }

    pub fn with_betas(params: Vec<Var>, lr: f32, beta1: f32, beta2: f32) -> Self {
        let n = params.len();
        Self {
            params,
            lr,
            beta1,
            beta2,
            t: 0,
            m: vec![0.0; n],
            v: vec![0.0; n],
        }
    }
}

impl Optim for Adam {
    fn step(&mut self) {
        self.t += 1;
        for (idx, param) in self.params.iter_mut().enumerate() {
            let grad = param.grad();
            self.m[idx] = self.beta1 * self.m[idx] + (1.0 - self.beta1) * grad;
            self.v[idx] = self.beta2 * self.v[idx] + (1.0 - self.beta2) * grad * grad;
            let m_hat = self.m[idx] / (1.0 - self.beta1.powi(self.t));
            let v_hat = self.v[idx] / (1.0 - self.beta2.powi(self.t));
            let new_val = param.data() - self.lr * m_hat / (v_hat.sqrt() + ADAM_EPSILON);
            param.set_data(new_val);
        }
    }

    fn zero_grad(&mut self) {
        for param in self.params.iter_mut() {
            param.zero_grad();
        }
    }
}
