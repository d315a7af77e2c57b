//! Generic dense linear algebra over any [`Real`].
//!
//! These are written once against the scalar trait, so they work for
//! `f64`, dual numbers at any nesting depth, and `Var`. For pure reverse
//! mode, the batched versions in [`reverse::ops`](crate::reverse::ops) record
//! a single node instead of one per scalar operation.
//!
//! Matrices are column-major slices with an explicit `(rows, cols)` shape.

use crate::error::AdError;
use crate::scalar::Real;

fn check_square(shape: (usize, usize)) -> Result<usize, AdError> {
    let (rows, cols) = shape;
    if rows == cols {
        Ok(rows)
    } else {
        Err(AdError::NotSquare { rows, cols })
    }
}

/// Sum of `xs`; zero for an empty slice.
pub fn sum<T: Real>(xs: &[T]) -> T {
    match xs.split_first() {
        Some((&first, rest)) => rest.iter().fold(first, |acc, &x| acc + x),
        None => T::zero(),
    }
}

/// Inner product.
///
/// # Errors
///
/// Returns [`AdError::DimensionMismatch`] if the lengths differ.
pub fn dot_product<T: Real>(a: &[T], b: &[T]) -> Result<T, AdError> {
    AdError::check_len("dot_product", a.len(), b.len())?;
    let mut terms = a.iter().zip(b).map(|(&x, &y)| x * y);
    Ok(match terms.next() {
        Some(first) => terms.fold(first, |acc, t| acc + t),
        None => T::zero(),
    })
}

/// Sum of squares.
pub fn squared_norm<T: Real>(xs: &[T]) -> T {
    let squares: Vec<T> = xs.iter().map(|&x| x.square()).collect();
    sum(&squares)
}

/// `ln(sum(exp(xs)))` with the maximum shifted out.
///
/// When the maximum is infinite the result is the mean of the entries
/// attaining it, which has that value and splits the derivative evenly.
///
/// # Errors
///
/// Returns [`AdError::EmptyInput`] for an empty slice.
pub fn log_sum_exp<T: Real>(xs: &[T]) -> Result<T, AdError> {
    if xs.is_empty() {
        return Err(AdError::EmptyInput {
            what: "log_sum_exp",
        });
    }
    let max = xs
        .iter()
        .map(Real::value)
        .fold(f64::NEG_INFINITY, f64::max);
    if max.is_infinite() {
        let ties: Vec<T> = xs.iter().copied().filter(|x| x.value() == max).collect();
        return Ok(sum(&ties) / ties.len() as f64);
    }
    let shifted: Vec<T> = xs.iter().map(|&x| (x - max).exp()).collect();
    Ok(sum(&shifted).ln() + max)
}

/// Matrix product `A B`, returned column-major.
///
/// # Errors
///
/// Returns [`AdError::DimensionMismatch`] if a slice does not match its
/// shape or the inner dimensions differ.
pub fn multiply<T: Real>(
    a: &[T],
    a_shape: (usize, usize),
    b: &[T],
    b_shape: (usize, usize),
) -> Result<Vec<T>, AdError> {
    let ((m, k), (k2, n)) = (a_shape, b_shape);
    AdError::check_len("multiply lhs", m * k, a.len())?;
    AdError::check_len("multiply rhs", k2 * n, b.len())?;
    AdError::check_len("multiply inner dimension", k, k2)?;

    let mut c = Vec::with_capacity(m * n);
    for j in 0..n {
        for i in 0..m {
            let row: Vec<T> = (0..k).map(|l| a[i + l * m]).collect();
            let col = &b[j * k..(j + 1) * k];
            c.push(dot_product(&row, col)?);
        }
    }
    Ok(c)
}

/// Solve `A X = B` by Gaussian elimination with partial pivoting.
///
/// Pivots are chosen by the magnitude of the innermost value. A singular
/// `A` yields non-finite entries rather than an error.
///
/// # Errors
///
/// Returns [`AdError::NotSquare`] if `A` is not square and
/// [`AdError::DimensionMismatch`] if the slices do not match their shapes.
pub fn mdivide_left<T: Real>(
    a: &[T],
    a_shape: (usize, usize),
    b: &[T],
    b_shape: (usize, usize),
) -> Result<Vec<T>, AdError> {
    let n = check_square(a_shape)?;
    let (b_rows, cols) = b_shape;
    AdError::check_len("mdivide_left lhs", n * n, a.len())?;
    AdError::check_len("mdivide_left rhs", b_rows * cols, b.len())?;
    AdError::check_len("mdivide_left rows", n, b_rows)?;

    let mut lu = a.to_vec();
    let mut x = b.to_vec();
    for k in 0..n {
        let pivot_row = (k..n)
            .max_by(|&i, &j| {
                let (pi, pj) = (lu[i + k * n].value().abs(), lu[j + k * n].value().abs());
                pi.total_cmp(&pj)
            })
            .unwrap_or(k);
        if pivot_row != k {
            for j in 0..n {
                lu.swap(k + j * n, pivot_row + j * n);
            }
            for c in 0..cols {
                x.swap(k + c * n, pivot_row + c * n);
            }
        }

        let pivot = lu[k + k * n];
        for i in k + 1..n {
            let factor = lu[i + k * n] / pivot;
            for j in k + 1..n {
                lu[i + j * n] = lu[i + j * n] - factor * lu[k + j * n];
            }
            for c in 0..cols {
                x[i + c * n] = x[i + c * n] - factor * x[k + c * n];
            }
        }
    }

    for c in 0..cols {
        for i in (0..n).rev() {
            let mut s = x[i + c * n];
            for j in i + 1..n {
                s = s - lu[i + j * n] * x[j + c * n];
            }
            x[i + c * n] = s / lu[i + i * n];
        }
    }
    Ok(x)
}

/// Quadratic form `x^T A x`.
///
/// # Errors
///
/// Returns [`AdError::NotSquare`] if `A` is not square and
/// [`AdError::DimensionMismatch`] if the slices do not match the shape.
pub fn quad_form<T: Real>(a: &[T], a_shape: (usize, usize), x: &[T]) -> Result<T, AdError> {
    let n = check_square(a_shape)?;
    AdError::check_len("quad_form matrix", n * n, a.len())?;
    AdError::check_len("quad_form vector", n, x.len())?;
    let ax = multiply(a, a_shape, x, (n, 1))?;
    dot_product(x, &ax)
}
