//! Node records and their local chain rules.
//!
//! Every node on the tape is plain `Copy` data: a value computed eagerly at
//! construction, an adjoint accumulator, and an [`Op`] describing how the
//! adjoint is distributed to operands. Operands are referenced by
//! [`NodeId`], always pointing at a node allocated earlier on the same tape.

use std::f64::consts::{LN_2, LN_10};
use std::ops::Range;

use super::batched::Batched;
use super::tape::NodeId;

/// Contiguous range of auxiliary `f64` slots on the tape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValueRange {
    pub(crate) start: u32,
    pub(crate) len: u32,
}

/// Contiguous range of auxiliary node references on the tape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdRange {
    pub(crate) start: u32,
    pub(crate) len: u32,
}

macro_rules! impl_aux_range {
    ($ty:ty) => {
        impl $ty {
            /// Number of slots in the range.
            pub fn len(&self) -> usize {
                self.len as usize
            }

            /// Check if the range is empty.
            pub fn is_empty(&self) -> bool {
                self.len == 0
            }

            pub(crate) fn as_range(&self) -> Range<usize> {
                let start = self.start as usize;
                start..start + self.len as usize
            }
        }
    };
}

impl_aux_range!(ValueRange);
impl_aux_range!(IdRange);

/// One-operand primitives whose partial is recomputed from cached values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Exp,
    Exp2,
    ExpM1,
    Ln,
    Log2,
    Log10,
    Ln1p,
    Sqrt,
    Cbrt,
    Square,
    Recip,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Asinh,
    Acosh,
    Atanh,
    /// Partial is the sign of the operand, zero at zero.
    Abs,
    /// Rounding functions have zero partial everywhere.
    Floor,
    Ceil,
    Round,
    Trunc,
    Powi(i32),
}

impl UnaryOp {
    /// Forward value.
    pub fn eval(self, x: f64) -> f64 {
        match self {
            Self::Neg => -x,
            Self::Exp => x.exp(),
            Self::Exp2 => x.exp2(),
            Self::ExpM1 => x.exp_m1(),
            Self::Ln => x.ln(),
            Self::Log2 => x.log2(),
            Self::Log10 => x.log10(),
            Self::Ln1p => x.ln_1p(),
            Self::Sqrt => x.sqrt(),
            Self::Cbrt => x.cbrt(),
            Self::Square => x * x,
            Self::Recip => x.recip(),
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
            Self::Tan => x.tan(),
            Self::Asin => x.asin(),
            Self::Acos => x.acos(),
            Self::Atan => x.atan(),
            Self::Sinh => x.sinh(),
            Self::Cosh => x.cosh(),
            Self::Tanh => x.tanh(),
            Self::Asinh => x.asinh(),
            Self::Acosh => x.acosh(),
            Self::Atanh => x.atanh(),
            Self::Abs => x.abs(),
            Self::Floor => x.floor(),
            Self::Ceil => x.ceil(),
            Self::Round => x.round(),
            Self::Trunc => x.trunc(),
            Self::Powi(n) => x.powi(n),
        }
    }

    /// Local partial `dy/dx` given operand value `x` and result `y`.
    pub fn partial(self, x: f64, y: f64) -> f64 {
        match self {
            Self::Neg => -1.0,
            Self::Exp => y,
            Self::Exp2 => y * LN_2,
            Self::ExpM1 => y + 1.0,
            Self::Ln => 1.0 / x,
            Self::Log2 => 1.0 / (x * LN_2),
            Self::Log10 => 1.0 / (x * LN_10),
            Self::Ln1p => 1.0 / (1.0 + x),
            Self::Sqrt => 0.5 / y,
            Self::Cbrt => 1.0 / (3.0 * y * y),
            Self::Square => 2.0 * x,
            Self::Recip => -y * y,
            Self::Sin => x.cos(),
            Self::Cos => -x.sin(),
            Self::Tan => 1.0 + y * y,
            Self::Asin => 1.0 / (1.0 - x * x).sqrt(),
            Self::Acos => -1.0 / (1.0 - x * x).sqrt(),
            Self::Atan => 1.0 / (1.0 + x * x),
            Self::Sinh => x.cosh(),
            Self::Cosh => x.sinh(),
            Self::Tanh => 1.0 - y * y,
            Self::Asinh => 1.0 / (x * x + 1.0).sqrt(),
            Self::Acosh => 1.0 / (x * x - 1.0).sqrt(),
            Self::Atanh => 1.0 / (1.0 - x * x),
            Self::Abs => sign(x),
            Self::Floor | Self::Ceil | Self::Round | Self::Trunc => 0.0,
            Self::Powi(0) => 0.0,
            Self::Powi(n) => f64::from(n) * x.powi(n - 1),
        }
    }
}

/// Two-operand primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    /// Floating-point remainder with the sign of the dividend (C `fmod`).
    Rem,
    /// Partials are zero when the base is exactly zero.
    Pow,
    Atan2,
    Hypot,
    Fdim,
}

impl BinaryOp {
    /// Forward value.
    pub fn eval(self, x: f64, y: f64) -> f64 {
        match self {
            Self::Add => x + y,
            Self::Sub => x - y,
            Self::Mul => x * y,
            Self::Div => x / y,
            Self::Rem => x % y,
            Self::Pow => x.powf(y),
            Self::Atan2 => x.atan2(y),
            Self::Hypot => x.hypot(y),
            Self::Fdim => {
                if x.is_nan() || y.is_nan() {
                    f64::NAN
                } else if x > y {
                    x - y
                } else {
                    0.0
                }
            }
        }
    }

    /// Local partials `(dz/dx, dz/dy)` given operands and result `z`.
    pub fn partials(self, x: f64, y: f64, z: f64) -> (f64, f64) {
        match self {
            Self::Add => (1.0, 1.0),
            Self::Sub => (1.0, -1.0),
            Self::Mul => (y, x),
            Self::Div => (1.0 / y, -x / (y * y)),
            Self::Rem => (1.0, -(x / y).trunc()),
            Self::Pow => {
                if x == 0.0 {
                    (0.0, 0.0)
                } else {
                    (y * z / x, x.ln() * z)
                }
            }
            Self::Atan2 => {
                let denom = x * x + y * y;
                (y / denom, -x / denom)
            }
            Self::Hypot => (x / z, y / z),
            Self::Fdim => {
                if x.is_nan() || y.is_nan() {
                    (f64::NAN, f64::NAN)
                } else if x > y {
                    (1.0, -1.0)
                } else {
                    (0.0, 0.0)
                }
            }
        }
    }
}

/// The back-propagation rule of a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    /// True input or constant: terminus of back-propagation.
    Leaf,
    Unary { kind: UnaryOp, a: NodeId },
    Binary { kind: BinaryOp, a: NodeId, b: NodeId },
    /// One differentiated operand with a partial fixed at construction.
    ///
    /// Every `Var`/`f64` mixed primitive lands here: the constant side
    /// gets neither a node nor an adjoint slot.
    Scaled { a: NodeId, da: f64 },
    /// Sum of operands, partial one each.
    Sum { operands: IdRange },
    /// N-ary node with partials fixed at construction.
    Precomputed {
        operands: IdRange,
        partials: ValueRange,
    },
    /// Linear-algebra node performing one combined adjoint update.
    Batched { index: u32 },
}

/// A node on the tape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    pub(crate) value: f64,
    pub(crate) adjoint: f64,
    pub(crate) op: Op,
    pub(crate) epoch: u32,
}

impl Node {
    pub(crate) fn new(value: f64, op: Op, epoch: u32) -> Self {
        Self {
            value,
            adjoint: 0.0,
            op,
            epoch,
        }
    }

    /// Value computed at construction.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Accumulated upstream sensitivity.
    pub fn adjoint(&self) -> f64 {
        self.adjoint
    }

    /// Back-propagation rule.
    pub fn op(&self) -> Op {
        self.op
    }

    /// Tape epoch at which the node was allocated.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Check if this is a leaf node.
    pub fn is_leaf(&self) -> bool {
        matches!(self.op, Op::Leaf)
    }
}

/// Apply the chain rule for node `index`, accumulating into its operands.
///
/// Every node accumulates `adjoint * partial`, including zero adjoints, so
/// an infinite partial on an unused branch yields `0 * inf = NaN` in the
/// inputs.
pub(crate) fn chain(
    index: usize,
    nodes: &mut [Node],
    values: &[f64],
    ids: &[NodeId],
    batched: &[Batched],
) {
    let Node {
        value, adjoint, op, ..
    } = nodes[index];
    match op {
        Op::Leaf => {}
        Op::Batched { index } => batched[index as usize].chain(adjoint, nodes, values, ids),
        Op::Unary { kind, a } => {
            let x = nodes[a.index()].value;
            nodes[a.index()].adjoint += adjoint * kind.partial(x, value);
        }
        Op::Binary { kind, a, b } => {
            let (x, y) = (nodes[a.index()].value, nodes[b.index()].value);
            let (dx, dy) = kind.partials(x, y, value);
            nodes[a.index()].adjoint += adjoint * dx;
            nodes[b.index()].adjoint += adjoint * dy;
        }
        Op::Scaled { a, da } => {
            nodes[a.index()].adjoint += adjoint * da;
        }
        Op::Sum { operands } => {
            for id in &ids[operands.as_range()] {
                nodes[id.index()].adjoint += adjoint;
            }
        }
        Op::Precomputed { operands, partials } => {
            let operands = &ids[operands.as_range()];
            let partials = &values[partials.as_range()];
            for (id, &partial) in operands.iter().zip(partials) {
                nodes[id.index()].adjoint += adjoint * partial;
            }
        }
    }
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else if x == 0.0 {
        0.0
    } else {
        f64::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const UNARY: &[(UnaryOp, f64)] = &[
        (UnaryOp::Exp, 0.3),
        (UnaryOp::Exp2, 0.3),
        (UnaryOp::ExpM1, 0.3),
        (UnaryOp::Ln, 1.7),
        (UnaryOp::Log2, 1.7),
        (UnaryOp::Log10, 1.7),
        (UnaryOp::Ln1p, 0.4),
        (UnaryOp::Sqrt, 2.5),
        (UnaryOp::Cbrt, 2.5),
        (UnaryOp::Square, -1.2),
        (UnaryOp::Recip, 0.8),
        (UnaryOp::Sin, 0.9),
        (UnaryOp::Cos, 0.9),
        (UnaryOp::Tan, 0.9),
        (UnaryOp::Asin, 0.4),
        (UnaryOp::Acos, 0.4),
        (UnaryOp::Atan, 1.4),
        (UnaryOp::Sinh, 0.6),
        (UnaryOp::Cosh, 0.6),
        (UnaryOp::Tanh, 0.6),
        (UnaryOp::Asinh, 0.6),
        (UnaryOp::Acosh, 1.6),
        (UnaryOp::Atanh, 0.6),
        (UnaryOp::Abs, -2.0),
        (UnaryOp::Powi(3), 1.3),
        (UnaryOp::Powi(-2), 1.3),
    ];

    #[test]
    fn test_unary_partials_match_central_difference() {
        let eps = 1e-6;
        for &(op, x) in UNARY {
            let numerical = (op.eval(x + eps) - op.eval(x - eps)) / (2.0 * eps);
            let analytical = op.partial(x, op.eval(x));
            assert_relative_eq!(analytical, numerical, epsilon = 1e-6, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_binary_partials_match_central_difference() {
        let eps = 1e-6;
        let cases = [
            (BinaryOp::Add, 1.5, -0.5),
            (BinaryOp::Sub, 1.5, -0.5),
            (BinaryOp::Mul, 1.5, -0.5),
            (BinaryOp::Div, 1.5, -0.5),
            (BinaryOp::Rem, 7.3, 2.1),
            (BinaryOp::Pow, 1.5, 2.5),
            (BinaryOp::Atan2, 1.5, -0.5),
            (BinaryOp::Hypot, 1.5, -0.5),
            (BinaryOp::Fdim, 1.5, -0.5),
        ];
        for (op, x, y) in cases {
            let (dx, dy) = op.partials(x, y, op.eval(x, y));
            let num_dx = (op.eval(x + eps, y) - op.eval(x - eps, y)) / (2.0 * eps);
            let num_dy = (op.eval(x, y + eps) - op.eval(x, y - eps)) / (2.0 * eps);
            assert_relative_eq!(dx, num_dx, epsilon = 1e-6, max_relative = 1e-6);
            assert_relative_eq!(dy, num_dy, epsilon = 1e-6, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_edge_conventions() {
        assert_eq!(UnaryOp::Abs.partial(0.0, 0.0), 0.0);
        assert!(UnaryOp::Abs.partial(f64::NAN, f64::NAN).is_nan());
        assert_eq!(UnaryOp::Floor.partial(2.5, 2.0), 0.0);
        assert_eq!(UnaryOp::Powi(0).partial(0.0, 1.0), 0.0);
        assert_eq!(UnaryOp::Ln.partial(0.0, f64::NEG_INFINITY), f64::INFINITY);
        assert_eq!(UnaryOp::Sqrt.partial(0.0, 0.0), f64::INFINITY);
        assert_eq!(BinaryOp::Pow.partials(0.0, 2.0, 0.0), (0.0, 0.0));
        assert_eq!(BinaryOp::Fdim.partials(1.0, 3.0, 0.0), (0.0, 0.0));
        let (da, db) = BinaryOp::Div.partials(1.0, 0.0, f64::INFINITY);
        assert_eq!(da, f64::INFINITY);
        assert_eq!(db, f64::NEG_INFINITY);
    }

    #[test]
    fn test_chain_accumulates_into_operands() {
        let mut nodes = vec![
            Node::new(2.0, Op::Leaf, 0),
            Node::new(3.0, Op::Leaf, 0),
            Node::new(
                6.0,
                Op::Binary {
                    kind: BinaryOp::Mul,
                    a: NodeId::from_index(0),
                    b: NodeId::from_index(1),
                },
                0,
            ),
        ];
        nodes[0].adjoint = 0.5;
        nodes[2].adjoint = 1.0;
        chain(2, &mut nodes, &[], &[], &[]);
        assert_eq!(nodes[0].adjoint, 3.5);
        assert_eq!(nodes[1].adjoint, 2.0);
    }

    #[test]
    fn test_chain_zero_adjoint_times_infinite_partial() {
        let mut nodes = vec![
            Node::new(0.0, Op::Leaf, 0),
            Node::new(
                f64::NEG_INFINITY,
                Op::Unary {
                    kind: UnaryOp::Ln,
                    a: NodeId::from_index(0),
                },
                0,
            ),
        ];
        chain(1, &mut nodes, &[], &[], &[]);
        assert!(nodes[0].adjoint.is_nan());
    }
}
