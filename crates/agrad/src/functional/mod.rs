//! Functional drivers: pass a closure and a point, get derivatives back.
//!
//! Reverse-mode drivers run inside a nested tape scope, so the tape is
//! back to its previous length when they return (or unwind).
//!
//! | driver | mode | passes |
//! |---|---|---|
//! | [`gradient`], [`try_gradient`] | reverse | 1 |
//! | [`jacobian`] | reverse | one sweep per output |
//! | [`hessian`] | forward over reverse | one per input |
//! | [`hessian_times_vector`] | forward over reverse | 1 |
//! | [`grad_hessian`] | forward over forward over reverse | `n (n + 1) / 2` |
//! | [`grad_tr_mat_times_hessian`] | forward over forward over reverse | one per input |
//! | [`derivative`], [`partial_derivative`], [`gradient_dot_vector`] | forward | 1 |
//! | [`fwd_gradient`], [`fwd_jacobian`] | forward | one per input |
//! | [`fwd_hessian`] | forward over forward | `n (n + 1) / 2` |

mod forward;
mod mixed;
mod reverse;

pub use forward::{
    derivative, fwd_gradient, fwd_hessian, fwd_jacobian, gradient_dot_vector, partial_derivative,
};
pub use mixed::{grad_hessian, grad_tr_mat_times_hessian, hessian, hessian_times_vector};
pub use reverse::{gradient, jacobian, try_gradient};
