//! Reverse sweep over the tape.
//!
//! Allocation order is already a topological order, so no sort is needed:
//! the sweep seeds the output adjoint and calls the chain rule of every node
//! from the end of the tape down to the start (or to a checkpoint).

use tracing::trace;

use super::tape::{Checkpoint, with_tape};
use super::var::Var;

/// Seed `output` with adjoint one and sweep the whole tape.
///
/// Adjoints accumulate: sweeping twice without
/// [`set_zero_all_adjoints`](super::set_zero_all_adjoints) doubles every
/// adjoint except the output's, which is reset to one.
///
/// Returns the number of nodes whose chain rule was applied.
pub fn backward(output: &Var) -> usize {
    backward_to(output, Checkpoint::default())
}

/// Seed `output` with adjoint one and sweep down to `stop`.
///
/// Nodes allocated before `stop` are not visited: their adjoints receive
/// contributions from nodes inside the swept region but do not propagate
/// them further. Used by nested scopes to differentiate a sub-computation
/// whose inputs are leaves created inside the scope.
pub fn backward_to(output: &Var, stop: Checkpoint) -> usize {
    with_tape(|t| {
        t.get(*output);
        t.node_mut(output.id()).adjoint = 1.0;
        let from = t.len();
        let chained = t.sweep(stop.nodes());
        trace!(chained, from, to = stop.nodes(), "reverse sweep");
        chained
    })
}

/// Sweep from `output` and collect the adjoints of `inputs`.
///
/// # Example
///
/// ```
/// use agrad::Var;
/// use agrad::reverse::{grad, start_nested};
///
/// let _scope = start_nested();
/// let x = Var::new(3.0);
/// let y = Var::new(4.0);
/// let g = grad(&(x * y + x), &[x, y]);
/// assert_eq!(g, vec![5.0, 3.0]);
/// ```
pub fn grad(output: &Var, inputs: &[Var]) -> Vec<f64> {
    backward(output);
    inputs.iter().map(Var::adj).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reverse::{len, start_nested};
    use crate::scalar::Real;
    use approx::assert_relative_eq;

    #[test]
    fn test_chain_count_covers_tape() {
        let scope = start_nested();
        let x = Var::new(0.5);
        let y = Var::new(1.5);
        let f = (x * y).exp() + y.ln() - x.powi(3);
        let expected = len() - scope.mark().nodes();
        assert_eq!(backward_to(&f, scope.mark()), expected);
    }

    #[test]
    fn test_unused_infinite_partial_gives_nan() {
        // 0 * (1 / 0) on the unused ln branch
        let _scope = start_nested();
        let x = Var::new(0.0);
        let _unused = x.ln();
        let f = x * 2.0;
        assert!(grad(&f, &[x])[0].is_nan());
    }

    #[test]
    fn test_zero_adjoint_times_infinite_partial_is_nan() {
        let _scope = start_nested();
        let x = Var::new(0.0);
        let f = x.ln() * 0.0;
        assert!(grad(&f, &[x])[0].is_nan());
    }

    #[test]
    fn test_backward_to_stops_at_checkpoint() {
        let _outer = start_nested();
        let a = Var::new(2.0);
        let b = a * 3.0;
        let inner = start_nested();
        let c = b * b;
        let chained = backward_to(&c, inner.mark());
        assert_eq!(chained, 1);
        assert_relative_eq!(b.adj(), 12.0);
        assert_eq!(a.adj(), 0.0);
    }
}
