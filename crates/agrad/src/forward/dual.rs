//! Dual numbers for forward-mode automatic differentiation.
//!
//! A [`Dual`] carries a primal value and a tangent: the directional
//! derivative of the primal along a chosen input direction. Every operation
//! propagates both, so one evaluation yields `f(x)` and `J_f(x) v`.
//!
//! The component type is any [`Real`], which makes duals nest:
//!
//! - `Dual<f64>`: first derivatives
//! - `Dual<Dual<f64>>`: second derivatives, forward over forward
//! - `Dual<Var>`: second derivatives, forward over reverse
//! - `Dual<Dual<Var>>`: third derivatives
//!
//! # Example
//!
//! ```
//! use agrad::{Dual, Real};
//!
//! let x = Dual::with_tangent(2.0, 1.0);
//! let y = x * x.sin();
//! assert_eq!(y.primal(), 2.0 * 2.0f64.sin());
//! assert_eq!(y.tangent(), 2.0f64.sin() + 2.0 * 2.0f64.cos());
//! ```

use std::cmp::Ordering;
use std::fmt::Display;
use std::ops::{
    Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, RemAssign, Sub, SubAssign,
};

use crate::scalar::Real;

/// A value with a tangent for forward-mode AD.
#[derive(Debug, Clone, Copy)]
pub struct Dual<T> {
    /// The primal (function value).
    primal: T,
    /// The tangent (directional derivative).
    tangent: T,
}

impl<T: Real> Dual<T> {
    /// Create a dual with zero tangent (constant).
    pub fn new(primal: T) -> Self {
        Self {
            primal,
            tangent: T::zero(),
        }
    }

    /// Create a dual with an explicit tangent.
    pub fn with_tangent(primal: T, tangent: T) -> Self {
        Self { primal, tangent }
    }

    /// Get the primal value.
    pub fn primal(&self) -> T {
        self.primal
    }

    /// Get the tangent.
    pub fn tangent(&self) -> T {
        self.tangent
    }

    /// Consume and return primal and tangent.
    pub fn into_parts(self) -> (T, T) {
        (self.primal, self.tangent)
    }
}

impl<T: Real> From<T> for Dual<T> {
    fn from(primal: T) -> Self {
        Self::new(primal)
    }
}

impl<T: Real> PartialEq for Dual<T> {
    fn eq(&self, other: &Self) -> bool {
        self.primal == other.primal
    }
}

impl<T: Real> PartialOrd for Dual<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.primal.partial_cmp(&other.primal)
    }
}

impl<T: Real> Display for Dual<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} + {}ε", self.primal.value(), self.tangent.value())
    }
}

impl<T: Real> Add for Dual<T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::with_tangent(self.primal + rhs.primal, self.tangent + rhs.tangent)
    }
}

impl<T: Real> Sub for Dual<T> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::with_tangent(self.primal - rhs.primal, self.tangent - rhs.tangent)
    }
}

impl<T: Real> Mul for Dual<T> {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::with_tangent(
            self.primal * rhs.primal,
            self.tangent * rhs.primal + self.primal * rhs.tangent,
        )
    }
}

impl<T: Real> Div for Dual<T> {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        let quotient = self.primal / rhs.primal;
        Self::with_tangent(quotient, (self.tangent - quotient * rhs.tangent) / rhs.primal)
    }
}

impl<T: Real> Rem for Dual<T> {
    type Output = Self;

    fn rem(self, rhs: Self) -> Self {
        let q = (self.primal.value() / rhs.primal.value()).trunc();
        Self::with_tangent(self.primal % rhs.primal, self.tangent - rhs.tangent * q)
    }
}

impl<T: Real> Neg for Dual<T> {
    type Output = Self;

    fn neg(self) -> Self {
        Self::with_tangent(-self.primal, -self.tangent)
    }
}

impl<T: Real> Add<f64> for Dual<T> {
    type Output = Self;

    fn add(self, rhs: f64) -> Self {
        Self::with_tangent(self.primal + rhs, self.tangent)
    }
}

impl<T: Real> Sub<f64> for Dual<T> {
    type Output = Self;

    fn sub(self, rhs: f64) -> Self {
        Self::with_tangent(self.primal - rhs, self.tangent)
    }
}

impl<T: Real> Mul<f64> for Dual<T> {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::with_tangent(self.primal * rhs, self.tangent * rhs)
    }
}

impl<T: Real> Div<f64> for Dual<T> {
    type Output = Self;

    fn div(self, rhs: f64) -> Self {
        Self::with_tangent(self.primal / rhs, self.tangent / rhs)
    }
}

impl<T: Real> Rem<f64> for Dual<T> {
    type Output = Self;

    fn rem(self, rhs: f64) -> Self {
        Self::with_tangent(self.primal % rhs, self.tangent)
    }
}

impl<T: Real> Add<Dual<T>> for f64 {
    type Output = Dual<T>;

    fn add(self, rhs: Dual<T>) -> Dual<T> {
        rhs + self
    }
}

impl<T: Real> Sub<Dual<T>> for f64 {
    type Output = Dual<T>;

    fn sub(self, rhs: Dual<T>) -> Dual<T> {
        -(rhs - self)
    }
}

impl<T: Real> Mul<Dual<T>> for f64 {
    type Output = Dual<T>;

    fn mul(self, rhs: Dual<T>) -> Dual<T> {
        rhs * self
    }
}

impl<T: Real> Div<Dual<T>> for f64 {
    type Output = Dual<T>;

    fn div(self, rhs: Dual<T>) -> Dual<T> {
        let recip = rhs.primal.recip();
        Dual::with_tangent(recip * self, -(rhs.tangent * recip * recip * self))
    }
}

impl<T: Real> Rem<Dual<T>> for f64 {
    type Output = Dual<T>;

    fn rem(self, rhs: Dual<T>) -> Dual<T> {
        let q = (self / rhs.primal.value()).trunc();
        Dual::with_tangent(T::constant(self) % rhs.primal, -(rhs.tangent * q))
    }
}

macro_rules! impl_assign_op {
    ($assign_trait:ident, $assign_method:ident, $trait:ident, $method:ident) => {
        impl<T: Real> $assign_trait for Dual<T> {
            fn $assign_method(&mut self, rhs: Self) {
                *self = $trait::$method(*self, rhs);
            }
        }

        impl<T: Real> $assign_trait<f64> for Dual<T> {
            fn $assign_method(&mut self, rhs: f64) {
                *self = $trait::$method(*self, rhs);
            }
        }
    };
}

impl_assign_op!(AddAssign, add_assign, Add, add);
impl_assign_op!(SubAssign, sub_assign, Sub, sub);
impl_assign_op!(MulAssign, mul_assign, Mul, mul);
impl_assign_op!(DivAssign, div_assign, Div, div);
impl_assign_op!(RemAssign, rem_assign, Rem, rem);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_new_is_constant() {
        let c = Dual::new(3.0);
        assert_eq!(c.primal(), 3.0);
        assert_eq!(c.tangent(), 0.0);
        assert_eq!(c.into_parts(), (3.0, 0.0));
    }

    #[test]
    fn test_product_and_quotient_rules() {
        let x = Dual::with_tangent(3.0, 1.0);
        let y = Dual::with_tangent(2.0, 0.5);
        let p = x * y;
        assert_eq!(p.into_parts(), (6.0, 2.0 + 1.5));
        let q = x / y;
        assert_relative_eq!(q.primal(), 1.5);
        assert_relative_eq!(q.tangent(), (1.0 * 2.0 - 3.0 * 0.5) / 4.0);
    }

    #[test]
    fn test_mixed_with_constants() {
        let x = Dual::with_tangent(4.0, 1.0);
        assert_eq!((1.0 - x).into_parts(), (-3.0, -1.0));
        assert_eq!((2.0 * x).into_parts(), (8.0, 2.0));
        assert_eq!((2.0 / x).into_parts(), (0.5, -2.0 / 16.0));
        assert_eq!((x % 3.0).into_parts(), (1.0, 1.0));
        assert_eq!((9.0 % x).into_parts(), (1.0, -2.0));
    }

    #[test]
    fn test_assign_ops() {
        let mut acc = Dual::with_tangent(1.0, 1.0);
        acc += 2.0;
        acc *= Dual::with_tangent(2.0, 0.0);
        acc -= Dual::with_tangent(1.0, 1.0);
        acc /= 5.0;
        assert_eq!(acc.into_parts(), (1.0, 0.2));
    }

    #[test]
    fn test_comparison_uses_primal() {
        let a = Dual::with_tangent(1.0, 100.0);
        let b = Dual::with_tangent(1.0, -5.0);
        assert_eq!(a, b);
        assert!(Dual::new(0.5) < a);
    }

    #[test]
    fn test_display() {
        assert_eq!(Dual::with_tangent(1.5, -2.0).to_string(), "1.5 + -2ε");
    }
}
