//! Forward-mode automatic differentiation with dual numbers.

mod dual;
mod functions;

pub use dual::Dual;
