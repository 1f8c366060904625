//! Per-operation gradient rules for the backward pass
//!
//! Each rule takes the operand node(s) and the output node of one operation
//! in the computation graph and accumulates the operands' gradients from the
//! output's gradient.

use crate::autograd::Var;

/// The operation that produced a node in the computation graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradFn {
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    Pow,
    Exp,
    Ln,
    Relu,
    Sigmoid,
}

impl GradFn {
    pub fn n_operands(&self) -> usize {
        match self {
            GradFn::Add | GradFn::Sub | GradFn::Mul | GradFn::Div | GradFn::Pow => 2,
            GradFn::Neg | GradFn::Exp | GradFn::Ln | GradFn::Relu | GradFn::Sigmoid => 1,
        }
    }
}

// The rules below copy operand data out before taking any mutable borrow:
// both operands may be the same node (e.g. `a * a`), and mixing borrows of
// one RefCell in a single statement panics at runtime.

/// Backprop for `in1 + in2 = out`
fn add(in1: &Var, in2: &Var, out: &Var) {
    let grad = out.0.borrow().grad;
    in1.0.borrow_mut().grad += grad;
    in2.0.borrow_mut().grad += grad;
}

/// Backprop for `in1 - in2 = out`
fn sub(in1: &Var, in2: &Var, out: &Var) {
    let grad = out.0.borrow().grad;
    in1.0.borrow_mut().grad += grad;
    in2.0.borrow_mut().grad += -grad;
}

/// Backprop for `in1 * in2 = out`
fn mul(in1: &Var, in2: &Var, out: &Var) {
    let grad = out.0.borrow().grad;
    let in1_data = in1.0.borrow().data;
    let in2_data = in2.0.borrow().data;
    in1.0.borrow_mut().grad += in2_data * grad;
    in2.0.borrow_mut().grad += in1_data * grad;
}

/// Backprop for `in1 / in2 = out`
fn div(in1: &Var, in2: &Var, out: &Var) {
    let grad = out.0.borrow().grad;
    let in1_data = in1.0.borrow().data;
    let in2_data = in2.0.borrow().data;
    in1.0.borrow_mut().grad += grad / in2_data;
    in2.0.borrow_mut().grad += -in1_data * grad / in2_data.powf(2.0);
}

/// Backprop for `-in1 = out`
fn neg(in1: &Var, out: &Var) {
    let grad = out.0.borrow().grad;
    in1.0.borrow_mut().grad += -grad;
}

/// Backprop for `in1^in2 = out`
///
/// Only the base receives gradient: d(a^b)/db = a^b * ln(a) is undefined for
/// non-positive bases, and exponents here are always constants.
fn pow(in1: &Var, in2: &Var, out: &Var) {
    let grad = out.0.borrow().grad;
    let in1_data = in1.0.borrow().data;
    let in2_data = in2.0.borrow().data;
    in1.0.borrow_mut().grad += in2_data * in1_data.powf(in2_data - 1.0) * grad;
}

/// Backprop for `exp(in1) = out`
fn exp(in1: &Var, out: &Var) {
    let grad = out.0.borrow().grad;
    // exp(in1) was already computed in the forward pass
    let out_data = out.0.borrow().data;
    in1.0.borrow_mut().grad += out_data * grad;
}

/// Backprop for `ln(in1) = out`
fn ln(in1: &Var, out: &Var) {
    let grad = out.0.borrow().grad;
    let in1_data = in1.0.borrow().data;
    in1.0.borrow_mut().grad += grad / in1_data;
}

/// Backprop for `relu(in1) = out`
fn relu(in1: &Var, out: &Var) {
    let in1_data = in1.0.borrow().data;
    let grad = out.0.borrow().grad;
    in1.0.borrow_mut().grad += if in1_data > 0.0 { grad } else { 0.0 };
}

/// Backprop for `sigmoid(in1) = out`, using the saved output:
/// d sigmoid(x) / dx = sigmoid(x) * (1 - sigmoid(x))
fn sigmoid(in1: &Var, out: &Var) {
    let grad = out.0.borrow().grad;
    let out_data = out.0.borrow().data;
    in1.0.borrow_mut().grad += out_data * (1.0 - out_data) * grad;
}

/// Dispatches the gradient rule for two-operand operations
pub fn apply_binary(in1: &Var, in2: &Var, out: &Var) {
    let grad_fn = { out.0.borrow().grad_fn };
    match grad_fn {
        Some(GradFn::Add) => add(in1, in2, out),
        Some(GradFn::Sub) => sub(in1, in2, out),
        Some(GradFn::Mul) => mul(in1, in2, out),
        Some(GradFn::Div) => div(in1, in2, out),
        Some(GradFn::Pow) => pow(in1, in2, out),
        None => {}
        _ => panic!("not a two-operand grad fn: {:?}", grad_fn),
    }
}

/// Dispatches the gradient rule for one-operand operations
pub fn apply_unary(in1: &Var, out: &Var) {
    let grad_fn = { out.0.borrow().grad_fn };
    match grad_fn {
        Some(GradFn::Neg) => neg(in1, out),
        Some(GradFn::Exp) => exp(in1, out),
        Some(GradFn::Ln) => ln(in1, out),
        Some(GradFn::Relu) => relu(in1, out),
        Some(GradFn::Sigmoid) => sigmoid(in1, out),
        None => {}
        _ => panic!("not a one-operand grad fn: {:?}", grad_fn),
    }
}
