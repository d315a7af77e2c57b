//! Forward-mode drivers.
//!
//! Generic over the inner scalar where a single pass suffices, so the same
//! driver serves plain `f64` and nested types such as `Dual<Var>`.

use faer::Mat;
use tracing::debug;

use crate::error::AdError;
use crate::forward::Dual;
use crate::scalar::Real;

fn delta(i: usize, j: usize) -> f64 {
    if i == j { 1.0 } else { 0.0 }
}

fn seeded<T: Real>(x: &[T], direction: usize) -> Vec<Dual<T>> {
    x.iter()
        .enumerate()
        .map(|(k, &xk)| Dual::with_tangent(xk, T::constant(delta(k, direction))))
        .collect()
}

/// Value and derivative of a univariate function.
///
/// # Example
///
/// ```
/// use agrad::functional::derivative;
/// use agrad::Real;
///
/// let (fx, dfx) = derivative(|x| x.powi(3), 2.0);
/// assert_eq!((fx, dfx), (8.0, 12.0));
/// ```
pub fn derivative<T, F>(f: F, x: T) -> (T, T)
where
    T: Real,
    F: FnOnce(Dual<T>) -> Dual<T>,
{
    f(Dual::with_tangent(x, T::one())).into_parts()
}

/// Value and partial derivative with respect to input `n`.
///
/// # Errors
///
/// Returns [`AdError::IndexOutOfRange`] if `n >= x.len()`.
pub fn partial_derivative<T, F>(f: F, x: &[T], n: usize) -> Result<(T, T), AdError>
where
    T: Real,
    F: FnOnce(&[Dual<T>]) -> Dual<T>,
{
    if n >= x.len() {
        return Err(AdError::IndexOutOfRange {
            index: n,
            len: x.len(),
        });
    }
    Ok(f(&seeded(x, n)).into_parts())
}

/// Value and directional derivative `grad f(x) . v` in one pass.
///
/// # Errors
///
/// Returns [`AdError::DimensionMismatch`] if `x` and `v` differ in length.
pub fn gradient_dot_vector<T, F>(f: F, x: &[T], v: &[f64]) -> Result<(T, T), AdError>
where
    T: Real,
    F: FnOnce(&[Dual<T>]) -> Dual<T>,
{
    AdError::check_len("gradient_dot_vector direction", x.len(), v.len())?;
    let x_fvar: Vec<Dual<T>> = x
        .iter()
        .zip(v)
        .map(|(&xi, &vi)| Dual::with_tangent(xi, T::constant(vi)))
        .collect();
    Ok(f(&x_fvar).into_parts())
}

/// Value and gradient with one forward pass per input.
pub fn fwd_gradient<F>(mut f: F, x: &[f64]) -> (f64, Vec<f64>)
where
    F: FnMut(&[Dual<f64>]) -> Dual<f64>,
{
    if x.is_empty() {
        return (f(&[]).primal(), Vec::new());
    }
    let mut value = 0.0;
    let mut grad = vec![0.0; x.len()];
    for (i, g) in grad.iter_mut().enumerate() {
        let (fx, dfx) = f(&seeded(x, i)).into_parts();
        value = fx;
        *g = dfx;
    }
    debug!(inputs = x.len(), passes = x.len(), "fwd_gradient");
    (value, grad)
}

/// Values and Jacobian with one forward pass per input.
///
/// Column `i` of the Jacobian is the tangent of every output under the
/// seed `e_i`; rows are outputs, as in the reverse-mode
/// [`jacobian`](super::jacobian).
///
/// # Errors
///
/// Returns [`AdError::DimensionMismatch`] if `f` returns a different number
/// of outputs on different passes.
pub fn fwd_jacobian<F>(mut f: F, x: &[f64]) -> Result<(Vec<f64>, Mat<f64>), AdError>
where
    F: FnMut(&[Dual<f64>]) -> Vec<Dual<f64>>,
{
    if x.is_empty() {
        let values: Vec<f64> = f(&[]).iter().map(Dual::primal).collect();
        let jac = Mat::zeros(values.len(), 0);
        return Ok((values, jac));
    }
    let mut values = Vec::new();
    let mut jac = Mat::<f64>::zeros(0, 0);
    for i in 0..x.len() {
        let fx = f(&seeded(x, i));
        if i == 0 {
            values = fx.iter().map(Dual::primal).collect();
            jac = Mat::zeros(fx.len(), x.len());
        }
        AdError::check_len("fwd_jacobian outputs", values.len(), fx.len())?;
        for (r, y) in fx.iter().enumerate() {
            jac[(r, i)] = y.tangent();
        }
    }
    debug!(inputs = x.len(), outputs = values.len(), "fwd_jacobian");
    Ok((values, jac))
}

/// Value, gradient and Hessian from second-order duals.
///
/// Evaluates the upper triangle, one pass per pair `i <= j`, and mirrors
/// it. The outer tangent seeds direction `i` and the inner tangent
/// direction `j`, so the tangent-of-tangent is `d2f / dx_i dx_j`.
pub fn fwd_hessian<F>(mut f: F, x: &[f64]) -> (f64, Vec<f64>, Mat<f64>)
where
    F: FnMut(&[Dual<Dual<f64>>]) -> Dual<Dual<f64>>,
{
    let n = x.len();
    if n == 0 {
        return (f(&[]).primal().primal(), Vec::new(), Mat::zeros(0, 0));
    }
    let mut value = 0.0;
    let mut grad = vec![0.0; n];
    let mut hess = Mat::<f64>::zeros(n, n);
    for i in 0..n {
        for j in i..n {
            let x_fvar: Vec<Dual<Dual<f64>>> = x
                .iter()
                .enumerate()
                .map(|(k, &xk)| {
                    Dual::with_tangent(
                        Dual::with_tangent(xk, delta(j, k)),
                        Dual::with_tangent(delta(i, k), 0.0),
                    )
                })
                .collect();
            let fx = f(&x_fvar);
            value = fx.primal().primal();
            if i == j {
                grad[i] = fx.tangent().primal();
            }
            let h = fx.tangent().tangent();
            hess[(i, j)] = h;
            hess[(j, i)] = h;
        }
    }
    debug!(inputs = n, passes = n * (n + 1) / 2, "fwd_hessian");
    (value, grad, hess)
}
