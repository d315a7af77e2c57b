//! Two-argument scalar primitives over any mix of `Var` and `f64`.

use crate::reverse::Var;
use crate::reverse::node::{BinaryOp, Op};
use crate::reverse::partials::Operand;
use crate::reverse::tape::with_tape;

fn binary<A: Operand, B: Operand>(kind: BinaryOp, a: A, b: B) -> Var {
    with_tape(|t| {
        let (x, y) = (a.primal_in(t), b.primal_in(t));
        let z = kind.eval(x, y);
        match (a.node_in(t), b.node_in(t)) {
            (Some(a), Some(b)) => t.push(z, Op::Binary { kind, a, b }),
            (Some(a), None) => {
                let (da, _) = kind.partials(x, y, z);
                t.push(z, Op::Scaled { a, da })
            }
            (None, Some(b)) => {
                let (_, db) = kind.partials(x, y, z);
                t.push(z, Op::Scaled { a: b, da: db })
            }
            (None, None) => t.push(z, Op::Leaf),
        }
    })
}

/// `base^exponent`. Both partials are zero when the base is exactly zero.
///
/// # Example
///
/// ```
/// use agrad::Var;
/// use agrad::reverse::{grad, ops, start_nested};
///
/// let _scope = start_nested();
/// let x = Var::new(3.0);
/// let y = ops::pow(2.0, x);
/// assert_eq!(y.value(), 8.0);
/// let g = grad(&y, &[x]);
/// assert!((g[0] - 8.0 * 2.0f64.ln()).abs() < 1e-12);
/// ```
pub fn pow<A: Operand, B: Operand>(base: A, exponent: B) -> Var {
    binary(BinaryOp::Pow, base, exponent)
}

pub fn atan2<A: Operand, B: Operand>(y: A, x: B) -> Var {
    binary(BinaryOp::Atan2, y, x)
}

pub fn hypot<A: Operand, B: Operand>(a: A, b: B) -> Var {
    binary(BinaryOp::Hypot, a, b)
}

/// Floating-point remainder; partials `1` and `-trunc(a / b)`.
pub fn fmod<A: Operand, B: Operand>(a: A, b: B) -> Var {
    binary(BinaryOp::Rem, a, b)
}

/// Positive difference.
pub fn fdim<A: Operand, B: Operand>(a: A, b: B) -> Var {
    binary(BinaryOp::Fdim, a, b)
}
