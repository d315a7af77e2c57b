//! agrad - automatic differentiation on an arena tape
//!
//! This crate provides reverse-mode AD over a thread-local tape, forward-mode
//! AD with dual numbers, and drivers that nest the two for Hessians and
//! higher-order products.
//!
//! # Architecture
//!
//! ```text
//! Level 1: Drivers (functional module)
//!     → gradient, jacobian, hessian, hessian_times_vector, fwd_* ...
//!
//! Level 2: Scalar types
//!     → Var (reverse, a handle into the tape)
//!     → Dual<T> (forward, generic over any Real, including Var)
//!
//! Level 3: Tape (reverse module)
//!     → arena of nodes, mark / recover, nested scopes, reverse sweep
//!     → batched nodes for dot products, matrix products and solves
//! ```
//!
//! Models are written once against the [`Real`] trait and evaluated with
//! `f64`, `Var`, `Dual<f64>`, `Dual<Var>` or any deeper nesting.
//!
//! # Example
//!
//! ```
//! use agrad::{Dual, Real, Var};
//! use agrad::functional::{gradient, hessian};
//!
//! fn model<T: Real>(x: &[T]) -> T {
//!     x[0].square() * x[1] + x[1].exp()
//! }
//!
//! let (fx, grad) = gradient(|x| model(x), &[1.0, 0.0]);
//! assert_eq!(fx, 1.0);
//! assert_eq!(grad, vec![0.0, 2.0]);
//!
//! let (_, _, hess) = hessian(|x: &[Dual<Var>]| model(x), &[1.0, 0.0]);
//! assert_eq!(hess[(0, 1)], 2.0);
//! assert_eq!(hess[(1, 1)], 1.0);
//! ```

pub mod config;
pub mod error;
pub mod forward;
pub mod functional;
pub mod linalg;
pub mod reverse;
pub mod scalar;

pub use config::TapeConfig;
pub use error::AdError;
pub use forward::Dual;
pub use functional::{gradient, hessian, jacobian};
pub use reverse::Var;
pub use scalar::Real;
