//! Reverse-mode drivers.

use faer::Mat;
use tracing::debug;

use crate::reverse::{Var, backward_to, start_nested};

pub(crate) fn leaves(x: &[f64]) -> Vec<Var> {
    x.iter().map(|&xi| Var::new(xi)).collect()
}

/// Value and gradient of a scalar function, in one forward and one
/// reverse pass.
///
/// The function runs in a nested tape scope that is recovered on return,
/// so `gradient` can be called repeatedly without growing the tape.
///
/// # Example
///
/// ```
/// use agrad::functional::gradient;
/// use agrad::Real;
///
/// let (fx, grad) = gradient(|x| x[0] * x[1].exp(), &[2.0, 0.0]);
/// assert_eq!(fx, 2.0);
/// assert_eq!(grad, vec![1.0, 2.0]);
/// ```
pub fn gradient<F>(f: F, x: &[f64]) -> (f64, Vec<f64>)
where
    F: FnOnce(&[Var]) -> Var,
{
    let scope = start_nested();
    let x_var = leaves(x);
    let fx = f(&x_var);
    let value = fx.value();
    backward_to(&fx, scope.mark());
    let grad = x_var.iter().map(Var::adj).collect();
    debug!(inputs = x.len(), nodes = scope.len(), "gradient");
    (value, grad)
}

/// Like [`gradient`] for functions that can fail.
///
/// The nested scope is recovered on the error path as well.
///
/// # Errors
///
/// Returns whatever error `f` returns.
pub fn try_gradient<F, E>(f: F, x: &[f64]) -> Result<(f64, Vec<f64>), E>
where
    F: FnOnce(&[Var]) -> Result<Var, E>,
{
    let scope = start_nested();
    let x_var = leaves(x);
    let fx = f(&x_var)?;
    let value = fx.value();
    backward_to(&fx, scope.mark());
    let grad = x_var.iter().map(Var::adj).collect();
    debug!(inputs = x.len(), nodes = scope.len(), "try_gradient");
    Ok((value, grad))
}

/// Values and Jacobian of a vector function.
///
/// One reverse pass per output, zeroing the scope's adjoints in between.
/// The Jacobian has one row per output and one column per input.
pub fn jacobian<F>(f: F, x: &[f64]) -> (Vec<f64>, Mat<f64>)
where
    F: FnOnce(&[Var]) -> Vec<Var>,
{
    let scope = start_nested();
    let x_var = leaves(x);
    let fx = f(&x_var);
    let values: Vec<f64> = fx.iter().map(Var::value).collect();
    let mut jac = Mat::<f64>::zeros(fx.len(), x.len());
    for (i, output) in fx.iter().enumerate() {
        if i > 0 {
            scope.zero_adjoints();
        }
        backward_to(output, scope.mark());
        for (j, xj) in x_var.iter().enumerate() {
            jac[(i, j)] = xj.adj();
        }
    }
    debug!(
        inputs = x.len(),
        outputs = fx.len(),
        nodes = scope.len(),
        "jacobian"
    );
    (values, jac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reverse::len;
    use crate::scalar::Real;
    use approx::assert_relative_eq;

    #[test]
    fn test_gradient_recovers_scope() {
        let before = len();
        let (fx, grad) = gradient(|x| (x[0] * x[1]).sin(), &[1.0, 2.0]);
        assert_relative_eq!(fx, 2f64.sin());
        assert_relative_eq!(grad[0], 2.0 * 2f64.cos());
        assert_relative_eq!(grad[1], 2f64.cos());
        assert_eq!(len(), before);
    }

    #[test]
    fn test_try_gradient_error_recovers() {
        let before = len();
        let result: Result<_, &str> = try_gradient(
            |x| {
                let y = x[0].ln();
                if y.value().is_nan() {
                    Err("log of negative")
                } else {
                    Ok(y)
                }
            },
            &[-1.0],
        );
        assert_eq!(result, Err("log of negative"));
        assert_eq!(len(), before);

        let (fx, grad) = try_gradient::<_, &str>(|x| Ok(x[0].ln()), &[2.0]).unwrap();
        assert_relative_eq!(fx, 2f64.ln());
        assert_relative_eq!(grad[0], 0.5);
    }

    #[test]
    fn test_jacobian_rows_are_outputs() {
        let (values, jac) = jacobian(
            |x| vec![x[0] * x[1], x[0] + x[1] * 3.0, x[1].square()],
            &[2.0, 5.0],
        );
        assert_eq!(values, vec![10.0, 17.0, 25.0]);
        assert_eq!((jac.nrows(), jac.ncols()), (3, 2));
        let expected = [[5.0, 2.0], [1.0, 3.0], [0.0, 10.0]];
        for (i, row) in expected.iter().enumerate() {
            for (j, &value) in row.iter().enumerate() {
                assert_eq!(jac[(i, j)], value);
            }
        }
    }
}
