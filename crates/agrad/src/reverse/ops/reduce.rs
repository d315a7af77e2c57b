//! Reductions over slices.

use super::{alloc_block, primals};
use crate::error::AdError;
use crate::reverse::Var;
use crate::reverse::batched::Batched;
use crate::reverse::node::Op;
use crate::reverse::partials::{Operand, OperandsAndPartials};
use crate::reverse::tape::with_tape;

/// Sum of `xs` as a single node. The empty sum is a zero leaf.
pub fn sum(xs: &[Var]) -> Var {
    with_tape(|t| {
        let value: f64 = xs.iter().map(|x| x.primal_in(t)).sum();
        if xs.is_empty() {
            return t.push(value, Op::Leaf);
        }
        let operands = t.alloc_ids(xs.iter().map(Var::id));
        t.push(value, Op::Sum { operands })
    })
}

/// Inner product as one batched node.
///
/// # Errors
///
/// Returns [`AdError::DimensionMismatch`] if the lengths differ.
pub fn dot_product<A: Operand, B: Operand>(a: &[A], b: &[B]) -> Result<Var, AdError> {
    AdError::check_len("dot_product", a.len(), b.len())?;
    Ok(with_tape(|t| {
        let (a_values, b_values) = (primals(t, a), primals(t, b));
        let value = a_values.iter().zip(&b_values).map(|(x, y)| x * y).sum();
        if a.is_empty() || !(A::DIFFERENTIABLE || B::DIFFERENTIABLE) {
            return t.push(value, Op::Leaf);
        }
        let lhs = alloc_block(t, a, &a_values);
        let rhs = alloc_block(t, b, &b_values);
        let index = t.alloc_batched(Batched::Dot { lhs, rhs });
        t.push(value, Op::Batched { index })
    }))
}

/// Sum of squares.
pub fn squared_norm(xs: &[Var]) -> Var {
    with_tape(|t| {
        let values = primals(t, xs);
        let mut builder = OperandsAndPartials::new();
        builder.add_slice(xs, |i| 2.0 * values[i]);
        builder.build_in(t, values.iter().map(|v| v * v).sum())
    })
}

/// `ln(sum(exp(xs)))`, evaluated with the maximum shifted out.
///
/// The partials are the softmax of `xs`. When the maximum is infinite the
/// value is that maximum and the partials are split evenly over the
/// entries attaining it.
///
/// # Errors
///
/// Returns [`AdError::EmptyInput`] for an empty slice.
pub fn log_sum_exp(xs: &[Var]) -> Result<Var, AdError> {
    if xs.is_empty() {
        return Err(AdError::EmptyInput {
            what: "log_sum_exp",
        });
    }
    Ok(with_tape(|t| {
        let values = primals(t, xs);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut builder = OperandsAndPartials::new();
        if max.is_infinite() {
            let ties = values.iter().filter(|&&v| v == max).count() as f64;
            builder.add_slice(xs, |i| if values[i] == max { 1.0 / ties } else { 0.0 });
            return builder.build_in(t, max);
        }
        let sum_exp: f64 = values.iter().map(|v| (v - max).exp()).sum();
        let value = max + sum_exp.ln();
        builder.add_slice(xs, |i| (values[i] - value).exp());
        builder.build_in(t, value)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reverse::{grad, start_nested};
    use approx::assert_relative_eq;

    fn vars(values: &[f64]) -> Vec<Var> {
        values.iter().map(|&v| Var::new(v)).collect()
    }

    #[test]
    fn test_sum_single_node() {
        let scope = start_nested();
        let xs = vars(&[1.0, 2.0, 3.0]);
        let s = sum(&xs);
        assert_eq!(s.value(), 6.0);
        assert_eq!(scope.len(), 4);
        assert_eq!(grad(&s, &xs), vec![1.0; 3]);
    }

    #[test]
    fn test_dot_product_mixed() {
        let scope = start_nested();
        let xs = vars(&[1.0, 2.0, 3.0]);
        let d = dot_product(&xs, &[4.0, 5.0, 6.0]).unwrap();
        assert_eq!(d.value(), 32.0);
        assert_eq!(scope.len(), 4);
        assert_eq!(grad(&d, &xs), vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_dot_product_both_vars() {
        let _scope = start_nested();
        let xs = vars(&[1.0, 2.0]);
        let ys = vars(&[3.0, -1.0]);
        let d = dot_product(&xs, &ys).unwrap();
        let g = grad(&d, &[xs[0], xs[1], ys[0], ys[1]]);
        assert_eq!(g, vec![3.0, -1.0, 1.0, 2.0]);
    }

    #[test]
    fn test_dot_product_length_mismatch() {
        let _scope = start_nested();
        let xs = vars(&[1.0, 2.0]);
        let err = dot_product(&xs, &[1.0]).unwrap_err();
        assert!(matches!(err, AdError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_squared_norm() {
        let _scope = start_nested();
        let xs = vars(&[1.0, -2.0]);
        let n = squared_norm(&xs);
        assert_eq!(n.value(), 5.0);
        assert_eq!(grad(&n, &xs), vec![2.0, -4.0]);
    }

    #[test]
    fn test_log_sum_exp_softmax() {
        let _scope = start_nested();
        let xs = vars(&[1000.0, 1000.0]);
        let l = log_sum_exp(&xs).unwrap();
        assert_relative_eq!(l.value(), 1000.0 + 2f64.ln(), epsilon = 1e-12);
        let g = grad(&l, &xs);
        assert_relative_eq!(g[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(g[1], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_log_sum_exp_all_negative_infinity() {
        let _scope = start_nested();
        let xs = vars(&[f64::NEG_INFINITY, f64::NEG_INFINITY]);
        let l = log_sum_exp(&xs).unwrap();
        assert_eq!(l.value(), f64::NEG_INFINITY);
        assert_eq!(grad(&l, &xs), vec![0.5, 0.5]);
    }

    #[test]
    fn test_log_sum_exp_empty() {
        assert_eq!(
            log_sum_exp(&[]).unwrap_err(),
            AdError::EmptyInput {
                what: "log_sum_exp"
            }
        );
    }
}
