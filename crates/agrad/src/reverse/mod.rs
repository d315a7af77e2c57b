//! Reverse-mode automatic differentiation.
//!
//! Operations on [`Var`] record nodes on a thread-local arena [`Tape`].
//! A reverse sweep seeds an output adjoint with one and applies each
//! node's chain rule from the end of the tape backwards, leaving
//! `d output / d node` in every adjoint.
//!
//! # Memory
//!
//! Nodes are never freed one by one. Mark the tape, compute, and recover:
//!
//! ```
//! use agrad::{Real, Var};
//! use agrad::reverse::{backward, mark, recover};
//!
//! let checkpoint = mark();
//! let x = Var::new(0.5);
//! let y = x.exp() * x;
//! backward(&y);
//! assert!((x.adj() - 1.5 * 0.5f64.exp()).abs() < 1e-12);
//! recover(checkpoint);
//! ```
//!
//! [`start_nested`] wraps the same pattern in a guard that also recovers
//! when the computation panics.

mod backward;
mod batched;
pub mod node;
pub mod ops;
mod partials;
mod tape;
mod var;

#[cfg(feature = "inspect")]
pub mod inspect;

pub use backward::{backward, backward_to, grad};
pub use partials::{Operand, OperandsAndPartials};
pub use tape::{
    Checkpoint, NestedScope, NodeId, Tape, TapeStats, configure, free_all, len, mark, recover,
    recover_all, set_zero_all_adjoints, start_nested, stats, with_tape,
};
pub use var::Var;
