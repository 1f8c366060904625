//! Scalar reverse-mode automatic differentiation
//!
//! Every intermediate result of a forward pass is a [`Var`] node in a
//! computation graph. Calling [`Var::backward`] on the final output walks the
//! graph in reverse topological order and accumulates `d(output)/d(node)`
//! into each node's gradient.

use std::{
    cell::RefCell,
    collections::HashSet,
    iter::Sum,
    ops::{Add, Div, Mul, Neg, Sub},
    rc::Rc,
};

use rand::Rng;

use crate::grad_fns::{GradFn, apply_binary, apply_unary};

type SharedNode = Rc<RefCell<Node>>;

/// A shared scalar node in the computation graph
#[derive(Debug, Clone)]
pub struct Var(pub(crate) SharedNode);

impl Var {
    /// Create a leaf node, not derived from any other values
    pub fn new(data: f32) -> Self {
        Self(Rc::new(RefCell::new(Node::new(data, None))))
    }

    /// Create a node derived from an operation on other nodes
    fn derived(data: f32, grad_fn: GradFn) -> Self {
        Self(Rc::new(RefCell::new(Node::new(data, Some(grad_fn)))))
    }

    fn add_input(&self, input: &Var) {
        self.0.borrow_mut().inputs.push(input.0.clone());
    }

    pub fn data(&self) -> f32 {
        self.0.borrow().data
    }

    pub fn grad(&self) -> f32 {
        self.0.borrow().grad
    }

    // &mut is not strictly required behind the Rc<RefCell<..>>, but signals
    // that the caller should hold exclusive ownership of the update
    pub fn set_data(&mut self, data: f32) {
        self.0.borrow_mut().data = data;
    }

    /// Zeros the gradient of this node and of every node reachable from it.
    ///
    /// Zeroing only the leaves is not enough: intermediate nodes kept alive
    /// by outstanding clones would keep their stale gradients and corrupt the
    /// next backward pass.
    pub fn zero_grad(&mut self) {
        self.0.borrow_mut().grad = 0.0;

        let mut order = vec![];
        let mut visited: HashSet<u64> = HashSet::new();
        self.collect_post_order(&mut order, &mut visited);
        for var in order {
            var.0.borrow_mut().grad = 0.0;
        }
    }

    /// Backpropagates gradients from this node to every node that produced it
    pub fn backward(&self) {
        // d out / d out = 1
        self.0.borrow_mut().grad = 1.0;

        let mut order = vec![];
        let mut visited: HashSet<u64> = HashSet::new();
        self.collect_post_order(&mut order, &mut visited);

        // reversed post order puts the output first
        for var in order.into_iter().rev() {
            let n_inputs = var.0.borrow().inputs.len();
            if let Some(f) = var.0.borrow().grad_fn {
                debug_assert_eq!(f.n_operands(), n_inputs);
            }
            match n_inputs {
                0 => {}
                1 => {
                    let in1 = Var(var.0.borrow().inputs[0].clone());
                    apply_unary(&in1, &var);
                }
                2 => {
                    let in1 = Var(var.0.borrow().inputs[0].clone());
                    let in2 = Var(var.0.borrow().inputs[1].clone());
                    apply_binary(&in1, &in2, &var);
                }
                n => panic!("unsupported number of operands: {}", n),
            }
        }
    }

    fn collect_post_order(&self, order: &mut Vec<Var>, visited: &mut HashSet<u64>) {
        for input in self.0.borrow().inputs.iter() {
            if visited.contains(&input.borrow().id) {
                continue;
            }
            visited.insert(input.borrow().id);
            Var(input.clone()).collect_post_order(order, visited);
        }
        order.push(self.clone());
    }
}

// Non-operator operations
impl Var {
    pub fn pow(&self, exponent: &Var) -> Var {
        let result = Var::derived(
            self.0.borrow().data.powf(exponent.0.borrow().data),
            GradFn::Pow,
        );
        result.add_input(self);
        result.add_input(exponent);
        result
    }

    pub fn exp(&self) -> Var {
        let result = Var::derived(self.0.borrow().data.exp(), GradFn::Exp);
        result.add_input(self);
        result
    }

    /// Natural logarithm. The data is NaN for negative inputs and `-inf` at
    /// zero, mirroring `f32::ln`; callers clamp when that matters.
    pub fn ln(&self) -> Var {
        let result = Var::derived(self.0.borrow().data.ln(), GradFn::Ln);
        result.add_input(self);
        result
    }

    pub fn relu(&self) -> Var {
        let result = Var::derived(self.0.borrow().data.max(0.0), GradFn::Relu);
        result.add_input(self);
        result
    }

    pub fn sigmoid(&self) -> Var {
        let data = 1.0 / (1.0 + (-self.0.borrow().data).exp());
        let result = Var::derived(data, GradFn::Sigmoid);
        result.add_input(self);
        result
    }
}

impl Add for &Var {
    type Output = Var;

    fn add(self, other: &Var) -> Var {
        let result = Var::derived(self.0.borrow().data + other.0.borrow().data, GradFn::Add);
        result.add_input(self);
        result.add_input(other);
        result
    }
}

impl Sub for &Var {
    type Output = Var;

    fn sub(self, other: &Var) -> Var {
        let result = Var::derived(self.0.borrow().data - other.0.borrow().data, GradFn::Sub);
        result.add_input(self);
        result.add_input(other);
        result
    }
}

impl Mul for &Var {
    type Output = Var;

    fn mul(self, other: &Var) -> Var {
        let result = Var::derived(self.0.borrow().data * other.0.borrow().data, GradFn::Mul);
        result.add_input(self);
        result.add_input(other);
        result
    }
}

impl Div for &Var {
    type Output = Var;

    fn div(self, other: &Var) -> Var {
        let result = Var::derived(self.0.borrow().data / other.0.borrow().data, GradFn::Div);
        result.add_input(self);
        result.add_input(other);
        result
    }
}

impl Neg for &Var {
    type Output = Var;

    fn neg(self) -> Var {
        let result = Var::derived(-self.0.borrow().data, GradFn::Neg);
        result.add_input(self);
        result
    }
}

impl Sum for Var {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Var::new(0.0), |acc, v| acc + v)
    }
}

/// Implements an owned-operand operator in terms of the reference operator
macro_rules! impl_owned_op(
    ($trait:ident, $method:ident, $operator:tt) => {
        impl $trait for Var {
            type Output = Self;

            fn $method(self, other: Self) -> Self {
                &self $operator &other
            }
        }
    }
);
impl_owned_op!(Add, add, +);
impl_owned_op!(Sub, sub, -);
impl_owned_op!(Mul, mul, *);
impl_owned_op!(Div, div, /);

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.0.borrow().data == other.0.borrow().data
    }
}

impl Eq for Var {}

// no blanket AsRef<T> for T in std
// <https://doc.rust-lang.org/std/convert/trait.AsRef.html#reflexivity>
impl AsRef<Var> for Var {
    fn as_ref(&self) -> &Var {
        self
    }
}

#[derive(Debug)]
pub(crate) struct Node {
    // 32 bit floats throughout, roughly 7 decimal digits of precision
    pub(crate) data: f32,
    /// Gradient of the graph output with respect to this node
    pub(crate) grad: f32,
    /// Operands of the operation that produced this node; these are the
    /// nodes that receive gradient during the backward pass
    inputs: Vec<SharedNode>,
    /// Unique identifier, used to deduplicate graph traversal
    id: u64,
    /// The operation that produced this node, `None` for leaves
    pub(crate) grad_fn: Option<GradFn>,
}

impl Node {
    fn new(data: f32, grad_fn: Option<GradFn>) -> Self {
        Self {
            data,
            grad: 0.0,
            inputs: vec![],
            id: rand::rng().random(),
            grad_fn,
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[macro_export]
    macro_rules! assert_eq_float {
        ($a:expr, $b:expr) => {
            assert!(
                (($a) - ($b)).abs() < 1e-6,
                "{} != {} within 1e-6",
                $a,
                $b
            );
        };
    }

    #[test]
    fn test_add() {
        let a = Var::new(2.0);
        let b = Var::new(3.0);

        let c = &a + &b;
        assert_eq!(c.data(), 5.0);
        c.backward();

        // dc/da = 1
        // dc/db = 1
        assert_eq!(a.grad(), 1.0);
        assert_eq!(b.grad(), 1.0);
    }

    #[test]
    fn test_mul() {
        let a = Var::new(2.0);
        let b = Var::new(3.0);

        let c = &a * &b;
        assert_eq!(c.data(), 6.0);

        c.backward();

        // dc/da = b
        // dc/db = a
        assert_eq!(a.grad(), 3.0);
        assert_eq!(b.grad(), 2.0);
    }

    #[test]
    fn test_neg() {
        let a = Var::new(2.0);
        let b = -&a;
        assert_eq!(b.data(), -2.0);

        b.backward();

        assert_eq!(a.grad(), -1.0);
    }

    #[test]
    fn test_sub() {
        let a = Var::new(2.0);
        let b = Var::new(3.0);

        let c = &a - &b;
        assert_eq!(c.data(), -1.0);

        c.backward();

        // dc/da = 1
        // dc/db = -1
        assert_eq!(a.grad(), 1.0);
        assert_eq!(b.grad(), -1.0);
    }

    #[test]
    fn test_div() {
        let a = Var::new(2.0);
        let b = Var::new(3.0);

        let c = &a / &b;
        assert_eq_float!(c.data(), 2.0 / 3.0);

        c.backward();

        // dc/da = 1/b
        // dc/db = -a/b^2
        assert_eq_float!(a.grad(), 1.0 / 3.0);
        assert_eq_float!(b.grad(), -2.0 / 9.0);
    }

    #[test]
    fn test_pow() {
        let a = Var::new(2.0);
        let b = Var::new(3.0);
        let c = a.pow(&b);
        assert_eq_float!(c.data(), 8.0);

        c.backward();

        // dc/da = b * a^(b-1)
        assert_eq_float!(a.grad(), 12.0);
    }

    #[test]
    fn test_exp() {
        let a = Var::new(1.5);
        let b = a.exp();
        assert_eq_float!(b.data(), 1.5f32.exp());

        b.backward();

        // db/da = exp(a)
        assert_eq_float!(a.grad(), 1.5f32.exp());
    }

    #[test]
    fn test_ln() {
        let a = Var::new(2.0);
        let b = a.ln();
        assert_eq_float!(b.data(), 2.0f32.ln());

        b.backward();

        // db/da = 1/a
        assert_eq_float!(a.grad(), 0.5);
    }

    #[test]
    fn test_relu() {
        let a = Var::new(1.0);
        let b = Var::new(2.0);
        let c = &a * &b;
        let z = c.relu();
        assert_eq_float!(z.data(), 2.0);

        z.backward();

        // dz/dc = 1
        // dc/da = b
        // dc/db = a
        assert_eq_float!(a.grad(), 2.0);
        assert_eq_float!(b.grad(), 1.0);
        assert_eq_float!(c.grad(), 1.0);
    }

    #[test]
    fn test_relu_negative_input() {
        let a = Var::new(-3.0);
        let z = a.relu();
        assert_eq!(z.data(), 0.0);

        z.backward();
        assert_eq!(a.grad(), 0.0);
    }

    #[test]
    fn test_sigmoid() {
        let a = Var::new(0.0);
        let s = a.sigmoid();
        assert_eq_float!(s.data(), 0.5);

        s.backward();

        // ds/da = s * (1 - s)
        assert_eq_float!(a.grad(), 0.25);
    }

    #[test]
    fn test_gradient_accumulates_on_reuse() {
        // a is used twice: c = a*a, dc/da = 2a
        let a = Var::new(3.0);
        let c = &a * &a;
        c.backward();
        assert_eq_float!(a.grad(), 6.0);
    }

    #[test]
    fn test_zero_grad_clears_intermediates() {
        let a = Var::new(2.0);
        let b = Var::new(3.0);
        let c = &a * &b;
        let mut d = c.exp();
        d.backward();
        assert!(a.grad() != 0.0);
        assert!(c.grad() != 0.0);

        d.zero_grad();
        assert_eq!(a.grad(), 0.0);
        assert_eq!(b.grad(), 0.0);
        assert_eq!(c.grad(), 0.0);
    }
}
