//! Second-order drivers: forward mode over reverse mode.
//!
//! Each driver runs the function on `Dual<Var>` (or `Dual<Dual<Var>>`)
//! inputs inside a nested tape scope, then sweeps a tangent backwards so
//! the primal adjoints hold one row of second derivatives.

use faer::{Mat, MatRef};
use tracing::debug;

use super::forward::gradient_dot_vector;
use super::reverse::leaves;
use crate::error::AdError;
use crate::forward::Dual;
use crate::reverse::{Var, backward_to, ops, start_nested};

fn unit_tangents(x_var: &[Var], direction: usize) -> Vec<Dual<Var>> {
    x_var
        .iter()
        .enumerate()
        .map(|(k, &xk)| {
            let seed = if k == direction { 1.0 } else { 0.0 };
            Dual::with_tangent(xk, Var::new(seed))
        })
        .collect()
}

/// Value, gradient and Hessian, one forward and one reverse pass per
/// input.
///
/// Row `i` seeds the tangent of input `i`; the output tangent is then
/// `df/dx_i`, and sweeping it leaves row `i` of the Hessian in the
/// adjoints of the inputs.
///
/// # Example
///
/// ```
/// use agrad::functional::hessian;
///
/// let (fx, grad, hess) = hessian(|x| x[0] * x[0] * x[1], &[2.0, 3.0]);
/// assert_eq!(fx, 12.0);
/// assert_eq!(grad, vec![12.0, 4.0]);
/// assert_eq!(hess[(0, 0)], 6.0);
/// assert_eq!(hess[(0, 1)], 4.0);
/// assert_eq!(hess[(1, 1)], 0.0);
/// ```
pub fn hessian<F>(mut f: F, x: &[f64]) -> (f64, Vec<f64>, Mat<f64>)
where
    F: FnMut(&[Dual<Var>]) -> Dual<Var>,
{
    let n = x.len();
    if n == 0 {
        let _scope = start_nested();
        let fx = f(&[]);
        return (fx.primal().value(), Vec::new(), Mat::zeros(0, 0));
    }
    let mut value = 0.0;
    let mut grad = vec![0.0; n];
    let mut hess = Mat::<f64>::zeros(n, n);
    for i in 0..n {
        let scope = start_nested();
        let x_var = leaves(x);
        let fx = f(&unit_tangents(&x_var, i));
        value = fx.primal().value();
        grad[i] = fx.tangent().value();
        backward_to(&fx.tangent(), scope.mark());
        for (j, xj) in x_var.iter().enumerate() {
            hess[(i, j)] = xj.adj();
        }
    }
    debug!(inputs = n, passes = n, "hessian");
    (value, grad, hess)
}

/// Value and Hessian-vector product `H v` without forming `H`.
///
/// One forward pass with tangent `v` gives `grad f . v`; sweeping it
/// backwards gives its gradient, which is `H v`.
///
/// # Errors
///
/// Returns [`AdError::DimensionMismatch`] if `x` and `v` differ in length.
pub fn hessian_times_vector<F>(f: F, x: &[f64], v: &[f64]) -> Result<(f64, Vec<f64>), AdError>
where
    F: FnOnce(&[Dual<Var>]) -> Dual<Var>,
{
    AdError::check_len("hessian_times_vector direction", x.len(), v.len())?;
    let scope = start_nested();
    let x_var = leaves(x);
    let (fx, grad_dot_v) = gradient_dot_vector(f, &x_var, v)?;
    let value = fx.value();
    backward_to(&grad_dot_v, scope.mark());
    let hv = x_var.iter().map(Var::adj).collect();
    debug!(inputs = x.len(), nodes = scope.len(), "hessian_times_vector");
    Ok((value, hv))
}

/// Value, Hessian and the gradient of every Hessian entry.
///
/// Runs the function on `Dual<Dual<Var>>`, one forward pass per pair
/// `i <= j` with the outer tangent seeding direction `i` and the inner one
/// direction `j`. Sweeping the tangent-of-tangent leaves
/// `d3f / dx_i dx_j dx_k` in the adjoint of input `k`. Entry `k` of the
/// returned vector is the matrix `dH / dx_k`.
///
/// # Example
///
/// ```
/// use agrad::functional::grad_hessian;
/// use agrad::Real;
///
/// // f = x0^2 x1, H = [[2 x1, 2 x0], [2 x0, 0]]
/// let (fx, hess, grad_hess) = grad_hessian(|x| x[0].square() * x[1], &[3.0, 2.0]);
/// assert_eq!(fx, 18.0);
/// assert_eq!(hess[(0, 1)], 6.0);
/// assert_eq!(grad_hess[0][(0, 1)], 2.0);
/// assert_eq!(grad_hess[1][(0, 0)], 2.0);
/// ```
pub fn grad_hessian<F>(mut f: F, x: &[f64]) -> (f64, Mat<f64>, Vec<Mat<f64>>)
where
    F: FnMut(&[Dual<Dual<Var>>]) -> Dual<Dual<Var>>,
{
    let n = x.len();
    if n == 0 {
        let _scope = start_nested();
        let fx = f(&[]);
        return (fx.primal().primal().value(), Mat::zeros(0, 0), Vec::new());
    }
    let mut value = 0.0;
    let mut hess = Mat::<f64>::zeros(n, n);
    let mut grad_hess = vec![Mat::<f64>::zeros(n, n); n];
    for i in 0..n {
        for j in i..n {
            let scope = start_nested();
            let x_var = leaves(x);
            let x_ffvar: Vec<Dual<Dual<Var>>> = x_var
                .iter()
                .enumerate()
                .map(|(k, &xk)| {
                    let seed = |d: usize| Var::new(if k == d { 1.0 } else { 0.0 });
                    Dual::with_tangent(
                        Dual::with_tangent(xk, seed(i)),
                        Dual::with_tangent(seed(j), Var::new(0.0)),
                    )
                })
                .collect();
            let fx = f(&x_ffvar);
            value = fx.primal().primal().value();
            let h = fx.tangent().tangent();
            hess[(i, j)] = h.value();
            hess[(j, i)] = h.value();
            backward_to(&h, scope.mark());
            for (k, xk) in x_var.iter().enumerate() {
                grad_hess[k][(i, j)] = xk.adj();
                grad_hess[k][(j, i)] = xk.adj();
            }
        }
    }
    debug!(inputs = n, passes = n * (n + 1) / 2, "grad_hessian");
    (value, hess, grad_hess)
}

/// Gradient of `tr(M H(x))` with respect to `x`, for a constant `M`.
///
/// Needs third derivatives: the function runs on `Dual<Dual<Var>>`, one
/// forward pass per row of `M`, followed by a single reverse sweep over
/// the summed diagonal terms.
///
/// # Errors
///
/// Returns [`AdError::NotSquare`] if `M` is not square and
/// [`AdError::DimensionMismatch`] if its size differs from `x`.
pub fn grad_tr_mat_times_hessian<F>(
    f: F,
    x: &[f64],
    m: MatRef<'_, f64>,
) -> Result<Vec<f64>, AdError>
where
    F: Fn(&[Dual<Dual<Var>>]) -> Dual<Dual<Var>>,
{
    if m.nrows() != m.ncols() {
        return Err(AdError::NotSquare {
            rows: m.nrows(),
            cols: m.ncols(),
        });
    }
    let n = x.len();
    AdError::check_len("grad_tr_mat_times_hessian matrix", n, m.nrows())?;

    let scope = start_nested();
    let x_var = leaves(x);
    let mut terms = Vec::with_capacity(n);
    for row in 0..n {
        let m_row: Vec<f64> = (0..n).map(|k| m[(row, k)]).collect();
        let (_, grad_dot_m) = gradient_dot_vector(&f, &unit_tangents(&x_var, row), &m_row)?;
        terms.push(grad_dot_m.tangent());
    }
    let trace = ops::sum(&terms);
    backward_to(&trace, scope.mark());
    let grad = x_var.iter().map(Var::adj).collect();
    debug!(inputs = n, nodes = scope.len(), "grad_tr_mat_times_hessian");
    Ok(grad)
}
