//! Dense matrix primitives as batched nodes.
//!
//! Matrices are column-major slices with an explicit `(rows, cols)` shape,
//! the layout faer's [`MatRef::from_column_major_slice`] reads directly.

use faer::linalg::matmul::matmul;
use faer::linalg::solvers::Solve;
use faer::{Accum, Mat, MatRef, Par};
use tracing::trace;

use super::{alloc_block, primals};
use crate::error::AdError;
use crate::reverse::Var;
use crate::reverse::batched::Batched;
use crate::reverse::node::Op;
use crate::reverse::partials::Operand;
use crate::reverse::tape::{Tape, aux_offset, with_tape};

fn check_square(shape: (usize, usize)) -> Result<usize, AdError> {
    let (rows, cols) = shape;
    if rows == cols {
        Ok(rows)
    } else {
        Err(AdError::NotSquare { rows, cols })
    }
}

fn push_outputs(t: &mut Tape, values: MatRef<'_, f64>) -> Vec<Var> {
    let mut outputs = Vec::with_capacity(values.nrows() * values.ncols());
    for j in 0..values.ncols() {
        for i in 0..values.nrows() {
            outputs.push(t.push(values[(i, j)], Op::Leaf));
        }
    }
    outputs
}

/// Matrix product `A B`.
///
/// Returns the column-major entries of the `a_shape.0` by `b_shape.1`
/// result. The reverse pass costs two matrix products, independent of how
/// many outputs are used.
///
/// # Errors
///
/// Returns [`AdError::DimensionMismatch`] if a slice does not match its
/// shape or the inner dimensions differ.
///
/// # Example
///
/// ```
/// use agrad::Var;
/// use agrad::reverse::{grad, ops, start_nested};
///
/// let _scope = start_nested();
/// let a: Vec<Var> = [1.0, 3.0, 2.0, 4.0].into_iter().map(Var::new).collect();
/// let c = ops::multiply(&a, (2, 2), &[1.0, 1.0], (2, 1)).unwrap();
/// assert_eq!(c[0].value(), 3.0);
/// assert_eq!(c[1].value(), 7.0);
/// assert_eq!(grad(&c[0], &a), vec![1.0, 0.0, 1.0, 0.0]);
/// ```
pub fn multiply<A: Operand, B: Operand>(
    a: &[A],
    a_shape: (usize, usize),
    b: &[B],
    b_shape: (usize, usize),
) -> Result<Vec<Var>, AdError> {
    let ((m, k), (k2, n)) = (a_shape, b_shape);
    AdError::check_len("multiply lhs", m * k, a.len())?;
    AdError::check_len("multiply rhs", k2 * n, b.len())?;
    AdError::check_len("multiply inner dimension", k, k2)?;

    Ok(with_tape(|t| {
        let (a_values, b_values) = (primals(t, a), primals(t, b));
        let mut c = Mat::<f64>::zeros(m, n);
        matmul(
            c.as_mut(),
            Accum::Replace,
            MatRef::from_column_major_slice(&a_values, m, k),
            MatRef::from_column_major_slice(&b_values, k, n),
            1.0,
            Par::Seq,
        );
        let outputs = push_outputs(t, c.as_ref());
        if outputs.is_empty() || !(A::DIFFERENTIABLE || B::DIFFERENTIABLE) {
            return outputs;
        }

        let a_block = alloc_block(t, a, &a_values);
        let b_block = alloc_block(t, b, &b_values);
        let out = t.alloc_ids(outputs.iter().map(Var::id));
        let index = t.alloc_batched(Batched::MatMul {
            a: a_block,
            b: b_block,
            rows: aux_offset(m),
            inner: aux_offset(k),
            cols: aux_offset(n),
            out,
        });
        t.alloc(0.0, Op::Batched { index });
        trace!(rows = m, inner = k, cols = n, "batched matrix product");
        outputs
    }))
}

/// Solve `A X = B` for `X` with a partially pivoted LU factorization.
///
/// Returns the column-major entries of `X`, shaped like `B`. A singular
/// `A` yields non-finite entries rather than an error.
///
/// # Errors
///
/// Returns [`AdError::NotSquare`] if `A` is not square and
/// [`AdError::DimensionMismatch`] if the slices do not match their shapes.
pub fn mdivide_left<A: Operand, B: Operand>(
    a: &[A],
    a_shape: (usize, usize),
    b: &[B],
    b_shape: (usize, usize),
) -> Result<Vec<Var>, AdError> {
    let n = check_square(a_shape)?;
    let (b_rows, cols) = b_shape;
    AdError::check_len("mdivide_left lhs", n * n, a.len())?;
    AdError::check_len("mdivide_left rhs", b_rows * cols, b.len())?;
    AdError::check_len("mdivide_left rows", n, b_rows)?;

    Ok(with_tape(|t| {
        let (a_values, b_values) = (primals(t, a), primals(t, b));
        let a_mat = MatRef::from_column_major_slice(&a_values, n, n);
        let mut x = MatRef::from_column_major_slice(&b_values, n, cols).to_owned();
        if n > 0 {
            let lu = a_mat.partial_piv_lu();
            lu.solve_in_place(&mut x);
        }
        let outputs = push_outputs(t, x.as_ref());
        if outputs.is_empty() || !(A::DIFFERENTIABLE || B::DIFFERENTIABLE) {
            return outputs;
        }

        let a_block = alloc_block(t, a, &a_values);
        let b_block = alloc_block(t, b, &b_values);
        let out = t.alloc_ids(outputs.iter().map(Var::id));
        let index = t.alloc_batched(Batched::Solve {
            a: a_block,
            b: b_block,
            n: aux_offset(n),
            cols: aux_offset(cols),
            out,
        });
        t.alloc(0.0, Op::Batched { index });
        trace!(n, cols, "batched linear solve");
        outputs
    }))
}

/// Quadratic form `x^T A x`.
///
/// # Errors
///
/// Returns [`AdError::NotSquare`] if `A` is not square and
/// [`AdError::DimensionMismatch`] if the slices do not match the shape.
pub fn quad_form<A: Operand, X: Operand>(
    a: &[A],
    a_shape: (usize, usize),
    x: &[X],
) -> Result<Var, AdError> {
    let n = check_square(a_shape)?;
    AdError::check_len("quad_form matrix", n * n, a.len())?;
    AdError::check_len("quad_form vector", n, x.len())?;

    Ok(with_tape(|t| {
        let (a_values, x_values) = (primals(t, a), primals(t, x));
        let a_mat = MatRef::from_column_major_slice(&a_values, n, n);
        let mut value = 0.0;
        for j in 0..n {
            for i in 0..n {
                value += x_values[i] * a_mat[(i, j)] * x_values[j];
            }
        }
        if n == 0 || !(A::DIFFERENTIABLE || X::DIFFERENTIABLE) {
            return t.push(value, Op::Leaf);
        }
        let a_block = alloc_block(t, a, &a_values);
        let x_block = alloc_block(t, x, &x_values);
        let index = t.alloc_batched(Batched::QuadForm {
            a: a_block,
            x: x_block,
            n: aux_offset(n),
        });
        t.push(value, Op::Batched { index })
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
    fn test_multiply_value() {
        let _scope = start_nested();
        // A = [[1, 2, 3], [4, 5, 6]], B = [[1, 0], [0, 1], [1, 1]]
        let a = vars(&[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        let b = [1.0, 0.0, 1.0, 0.0, 1.0, 1.0];
        let c = multiply(&a, (2, 3), &b, (3, 2)).unwrap();
        let values: Vec<f64> = c.iter().map(Var::value).collect();
        assert_eq!(values, vec![4.0, 10.0, 5.0, 11.0]);
    }

    #[test]
    fn test_multiply_grad_trace() {
        let _scope = start_nested();
        let a = vars(&[1.0, 2.0, 3.0, 4.0]);
        let b = vars(&[5.0, 6.0, 7.0, 8.0]);
        let c = multiply(&a, (2, 2), &b, (2, 2)).unwrap();
        // d tr(AB) / dA = B^T, d tr(AB) / dB = A^T
        let tr = c[0] + c[3];
        let g = grad(&tr, &[a.as_slice(), b.as_slice()].concat());
        assert_eq!(g, vec![5.0, 7.0, 6.0, 8.0, 1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_multiply_shape_errors() {
        let _scope = start_nested();
        let a = vars(&[1.0, 2.0]);
        assert!(matches!(
            multiply(&a, (1, 2), &[1.0, 2.0, 3.0], (3, 1)),
            Err(AdError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            multiply(&a, (2, 2), &[1.0], (1, 1)),
            Err(AdError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_mdivide_left_identity_gradient() {
        let _scope = start_nested();
        // A = [[2, 1], [1, 3]], b = [3, 5] -> x = [0.8, 1.4]
        let a = vars(&[2.0, 1.0, 1.0, 3.0]);
        let b = vars(&[3.0, 5.0]);
        let x = mdivide_left(&a, (2, 2), &b, (2, 1)).unwrap();
        assert_relative_eq!(x[0].value(), 0.8, epsilon = 1e-12);
        assert_relative_eq!(x[1].value(), 1.4, epsilon = 1e-12);

        // d x0 / d b = first row of A^-1; d x0 / d A = -A^-T e0 x^T
        let inputs = [a.as_slice(), b.as_slice()].concat();
        let g = grad(&x[0], &inputs);
        let inv_row0 = [0.6, -0.2];
        assert_relative_eq!(g[4], inv_row0[0], epsilon = 1e-12);
        assert_relative_eq!(g[5], inv_row0[1], epsilon = 1e-12);
        let xs = [0.8, 1.4];
        for j in 0..2 {
            for i in 0..2 {
                assert_relative_eq!(g[i + 2 * j], -inv_row0[i] * xs[j], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_mdivide_left_not_square() {
        let _scope = start_nested();
        let a = vars(&[1.0, 2.0]);
        assert_eq!(
            mdivide_left(&a, (1, 2), &[1.0], (1, 1)).unwrap_err(),
            AdError::NotSquare { rows: 1, cols: 2 }
        );
    }

    #[test]
    fn test_quad_form_gradient() {
        let _scope = start_nested();
        let a = vars(&[2.0, 1.0, 0.0, 3.0]);
        let x = vars(&[1.0, -1.0]);
        let q = quad_form(&a, (2, 2), &x).unwrap();
        // x^T A x = 2 - 1 + 3
        assert_eq!(q.value(), 4.0);
        let g = grad(&q, &[a.as_slice(), x.as_slice()].concat());
        assert_eq!(&g[..4], &[1.0, -1.0, -1.0, 1.0]);
        // (A + A^T) x = [[4, 1], [1, 6]] [1, -1]
        assert_eq!(&g[4..], &[3.0, -5.0]);
    }

    #[test]
    fn test_constant_matrices_fold() {
        let scope = start_nested();
        let c = multiply(&[1.0, 2.0], (1, 2), &[3.0, 4.0], (2, 1)).unwrap();
        assert_eq!(c[0].value(), 11.0);
        assert!(c[0].is_leaf());
        assert_eq!(scope.len(), 1);
    }
}
