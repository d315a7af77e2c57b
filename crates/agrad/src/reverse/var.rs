//! Reverse-mode scalar handle.

use std::cmp::Ordering;
use std::fmt::{Debug, Display};
use std::iter::Sum;
use std::marker::PhantomData;
use std::ops::{
    Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, RemAssign, Sub, SubAssign,
};

use super::backward::backward;
use super::node::{BinaryOp, Node, Op, UnaryOp};
use super::ops;
use super::tape::{NodeId, Tape, try_with_tape, with_tape};
use crate::scalar::Real;

/// Handle to a node on the thread-local tape.
///
/// `Var` is `Copy` and confined to the thread that created it. A handle is
/// valid until the tape is recovered past its node; using it afterwards is a
/// caller error that debug builds detect through the tape epoch.
///
/// # Example
///
/// ```
/// use agrad::{Real, Var};
///
/// let x = Var::new(2.0);
/// let y = x * x.sin();
/// y.grad();
/// assert!((x.adj() - (2.0f64.sin() + 2.0 * 2.0f64.cos())).abs() < 1e-12);
/// agrad::reverse::recover_all();
/// ```
#[derive(Clone, Copy)]
pub struct Var {
    id: NodeId,
    epoch: u32,
    _local: PhantomData<*const ()>,
}

impl Var {
    /// Create an independent variable (a leaf node).
    pub fn new(value: f64) -> Self {
        with_tape(|t| t.push(value, Op::Leaf))
    }

    /// Get the node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Value computed at construction.
    pub fn value(&self) -> f64 {
        with_tape(|t| t.get(*self).value)
    }

    /// Adjoint accumulated by the last reverse sweep.
    pub fn adj(&self) -> f64 {
        with_tape(|t| t.get(*self).adjoint)
    }

    /// Check if this handle refers to a leaf node.
    pub fn is_leaf(&self) -> bool {
        with_tape(|t| t.get(*self).is_leaf())
    }

    /// Seed this variable's adjoint with one and sweep the whole tape.
    ///
    /// Adjoints are not reset first; call
    /// [`set_zero_all_adjoints`](super::set_zero_all_adjoints) between
    /// independent sweeps over the same nodes.
    pub fn grad(&self) {
        backward(self);
    }

    pub(crate) fn unary(self, kind: UnaryOp) -> Self {
        with_tape(|t| {
            let x = t.get(self).value;
            t.push(kind.eval(x), Op::Unary { kind, a: self.id })
        })
    }

    pub(crate) fn binary(self, kind: BinaryOp, other: Self) -> Self {
        with_tape(|t| {
            let x = t.get(self).value;
            let y = t.get(other).value;
            t.push(
                kind.eval(x, y),
                Op::Binary {
                    kind,
                    a: self.id,
                    b: other.id,
                },
            )
        })
    }

    /// Node with this variable as sole operand; `f` maps the operand value
    /// to the result value and its partial.
    pub(crate) fn scaled(self, f: impl FnOnce(f64) -> (f64, f64)) -> Self {
        with_tape(|t| {
            let (value, da) = f(t.get(self).value);
            t.push(value, Op::Scaled { a: self.id, da })
        })
    }
}

impl Tape {
    /// Append a node and return a handle to it.
    pub(crate) fn push(&mut self, value: f64, op: Op) -> Var {
        let id = self.alloc(value, op);
        Var {
            id,
            epoch: self.epoch(),
            _local: PhantomData,
        }
    }

    /// Resolve a handle.
    ///
    /// # Panics
    ///
    /// Panics if the node lies beyond the end of the tape. In debug builds,
    /// also panics if the node was released and its slot reused.
    pub(crate) fn get(&self, var: Var) -> &Node {
        let node = self.node(var.id);
        debug_assert_eq!(
            node.epoch(),
            var.epoch,
            "Var {} used after the tape was recovered past it",
            var.id.index()
        );
        node
    }
}

impl From<f64> for Var {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl Debug for Var {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = try_with_tape(|t| {
            t.nodes()
                .get(self.id.index())
                .filter(|node| node.epoch() == self.epoch)
                .map(Node::value)
        })
        .flatten();
        let mut s = f.debug_struct("Var");
        s.field("id", &self.id.index());
        if let Some(value) = value {
            s.field("value", &value);
        }
        s.finish()
    }
}

impl Display for Var {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.value(), f)
    }
}

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
    }
}

impl PartialOrd for Var {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.value().partial_cmp(&other.value())
    }
}

macro_rules! impl_binary_op {
    (
        $trait:ident, $method:ident, $assign_trait:ident, $assign_method:ident,
        $kind:expr, var_const: $var_const:expr, const_var: $const_var:expr
    ) => {
        impl $trait for Var {
            type Output = Var;

            fn $method(self, rhs: Var) -> Var {
                self.binary($kind, rhs)
            }
        }

        impl $trait<f64> for Var {
            type Output = Var;

            fn $method(self, rhs: f64) -> Var {
                let rule: fn(f64, f64) -> (f64, f64) = $var_const;
                self.scaled(|x| rule(x, rhs))
            }
        }

        impl $trait<Var> for f64 {
            type Output = Var;

            fn $method(self, rhs: Var) -> Var {
                let rule: fn(f64, f64) -> (f64, f64) = $const_var;
                rhs.scaled(|x| rule(self, x))
            }
        }

        impl $assign_trait for Var {
            fn $assign_method(&mut self, rhs: Var) {
                *self = $trait::$method(*self, rhs);
            }
        }

        impl $assign_trait<f64> for Var {
            fn $assign_method(&mut self, rhs: f64) {
                *self = $trait::$method(*self, rhs);
            }
        }
    };
}

impl_binary_op!(
    Add, add, AddAssign, add_assign, BinaryOp::Add,
    var_const: |x, c| (x + c, 1.0),
    const_var: |c, x| (c + x, 1.0)
);
impl_binary_op!(
    Sub, sub, SubAssign, sub_assign, BinaryOp::Sub,
    var_const: |x, c| (x - c, 1.0),
    const_var: |c, x| (c - x, -1.0)
);
impl_binary_op!(
    Mul, mul, MulAssign, mul_assign, BinaryOp::Mul,
    var_const: |x, c| (x * c, c),
    const_var: |c, x| (c * x, c)
);
impl_binary_op!(
    Div, div, DivAssign, div_assign, BinaryOp::Div,
    var_const: |x, c| (x / c, 1.0 / c),
    const_var: |c, x| (c / x, -c / (x * x))
);
impl_binary_op!(
    Rem, rem, RemAssign, rem_assign, BinaryOp::Rem,
    var_const: |x, c| (x % c, 1.0),
    const_var: |c, x| (c % x, -(c / x).trunc())
);

impl Neg for Var {
    type Output = Var;

    fn neg(self) -> Var {
        self.unary(UnaryOp::Neg)
    }
}

impl Sum for Var {
    fn sum<I: Iterator<Item = Var>>(iter: I) -> Self {
        let terms: Vec<Var> = iter.collect();
        ops::sum(&terms)
    }
}

impl<'a> Sum<&'a Var> for Var {
    fn sum<I: Iterator<Item = &'a Var>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl Real for Var {
    fn constant(x: f64) -> Self {
        Self::new(x)
    }

    fn value(&self) -> f64 {
        Var::value(self)
    }

    fn exp(self) -> Self {
        self.unary(UnaryOp::Exp)
    }

    fn exp2(self) -> Self {
        self.unary(UnaryOp::Exp2)
    }

    fn exp_m1(self) -> Self {
        self.unary(UnaryOp::ExpM1)
    }

    fn ln(self) -> Self {
        self.unary(UnaryOp::Ln)
    }

    fn log2(self) -> Self {
        self.unary(UnaryOp::Log2)
    }

    fn log10(self) -> Self {
        self.unary(UnaryOp::Log10)
    }

    fn ln_1p(self) -> Self {
        self.unary(UnaryOp::Ln1p)
    }

    fn sqrt(self) -> Self {
        self.unary(UnaryOp::Sqrt)
    }

    fn cbrt(self) -> Self {
        self.unary(UnaryOp::Cbrt)
    }

    fn square(self) -> Self {
        self.unary(UnaryOp::Square)
    }

    fn recip(self) -> Self {
        self.unary(UnaryOp::Recip)
    }

    fn sin(self) -> Self {
        self.unary(UnaryOp::Sin)
    }

    fn cos(self) -> Self {
        self.unary(UnaryOp::Cos)
    }

    fn tan(self) -> Self {
        self.unary(UnaryOp::Tan)
    }

    fn asin(self) -> Self {
        self.unary(UnaryOp::Asin)
    }

    fn acos(self) -> Self {
        self.unary(UnaryOp::Acos)
    }

    fn atan(self) -> Self {
        self.unary(UnaryOp::Atan)
    }

    fn sinh(self) -> Self {
        self.unary(UnaryOp::Sinh)
    }

    fn cosh(self) -> Self {
        self.unary(UnaryOp::Cosh)
    }

    fn tanh(self) -> Self {
        self.unary(UnaryOp::Tanh)
    }

    fn asinh(self) -> Self {
        self.unary(UnaryOp::Asinh)
    }

    fn acosh(self) -> Self {
        self.unary(UnaryOp::Acosh)
    }

    fn atanh(self) -> Self {
        self.unary(UnaryOp::Atanh)
    }

    fn abs(self) -> Self {
        self.unary(UnaryOp::Abs)
    }

    fn floor(self) -> Self {
        self.unary(UnaryOp::Floor)
    }

    fn ceil(self) -> Self {
        self.unary(UnaryOp::Ceil)
    }

    fn round(self) -> Self {
        self.unary(UnaryOp::Round)
    }

    fn trunc(self) -> Self {
        self.unary(UnaryOp::Trunc)
    }

    fn powi(self, n: i32) -> Self {
        self.unary(UnaryOp::Powi(n))
    }

    fn powd(self, e: f64) -> Self {
        ops::pow(self, e)
    }

    fn powf(self, e: Self) -> Self {
        self.binary(BinaryOp::Pow, e)
    }

    fn atan2(self, other: Self) -> Self {
        self.binary(BinaryOp::Atan2, other)
    }

    fn hypot(self, other: Self) -> Self {
        self.binary(BinaryOp::Hypot, other)
    }

    fn fdim(self, other: Self) -> Self {
        self.binary(BinaryOp::Fdim, other)
    }

    fn fmin(self, other: Self) -> Self {
        let (x, y) = (self.value(), other.value());
        if y.is_nan() || (!x.is_nan() && x <= y) {
            self
        } else {
            other
        }
    }

    fn fmax(self, other: Self) -> Self {
        let (x, y) = (self.value(), other.value());
        if y.is_nan() || (!x.is_nan() && x >= y) {
            self
        } else {
            other
        }
    }
}
