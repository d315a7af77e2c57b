//! Reverse-mode primitives beyond the operator overloads.
//!
//! Every function here is generic over [`Operand`](super::Operand), so any
//! mix of `Var` and `f64` arguments works and constant arguments never
//! reach the tape.

mod matrix;
mod reduce;
mod scalar;

pub use matrix::{mdivide_left, multiply, quad_form};
pub use reduce::{dot_product, log_sum_exp, squared_norm, sum};
pub use scalar::{atan2, fdim, fmod, hypot, pow};

use super::batched::Block;
use super::partials::Operand;
use super::tape::{NodeId, Tape};

/// Cache a dense operand on the tape.
fn alloc_block<O: Operand>(t: &mut Tape, operands: &[O], values: &[f64]) -> Block {
    let values = t.alloc_values(values.iter().copied());
    let ids = if O::DIFFERENTIABLE {
        let ids: Vec<NodeId> = operands.iter().filter_map(|x| x.node_in(t)).collect();
        Some(t.alloc_ids(ids))
    } else {
        None
    };
    Block { values, ids }
}

fn primals<O: Operand>(t: &Tape, operands: &[O]) -> Vec<f64> {
    operands.iter().map(|x| x.primal_in(t)).collect()
}
