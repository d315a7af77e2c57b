//! Real trait for differentiable scalar types.
//!
//! `Real` is the numeric surface shared by plain `f64`, the reverse-mode
//! handle [`Var`](crate::Var) and the forward-mode [`Dual`](crate::Dual).
//! A model written once as `fn f<T: Real>(x: &[T]) -> T` can be evaluated
//! plainly, differentiated in either mode, or in any nesting of the two.

use std::fmt::Debug;
use std::ops::{
    Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, Sub, SubAssign,
};

/// Trait for scalar types supported by agrad.
///
/// Method names follow `f64` where an inherent method exists, so generic
/// code reads the same as plain floating-point code.
pub trait Real:
    Copy
    + Debug
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Rem<Output = Self>
    + Neg<Output = Self>
    + Add<f64, Output = Self>
    + Sub<f64, Output = Self>
    + Mul<f64, Output = Self>
    + Div<f64, Output = Self>
    + Rem<f64, Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
{
    /// Lift a plain number. For `Var` this allocates a leaf node.
    fn constant(x: f64) -> Self;

    /// Returns the additive identity (zero).
    fn zero() -> Self {
        Self::constant(0.0)
    }

    /// Returns the multiplicative identity (one).
    fn one() -> Self {
        Self::constant(1.0)
    }

    /// The innermost primal value, with every derivative layer stripped.
    fn value(&self) -> f64;

    fn exp(self) -> Self;
    fn exp2(self) -> Self;
    fn exp_m1(self) -> Self;
    fn ln(self) -> Self;
    fn log2(self) -> Self;
    fn log10(self) -> Self;
    fn ln_1p(self) -> Self;
    fn sqrt(self) -> Self;
    fn cbrt(self) -> Self;

    fn square(self) -> Self {
        self * self
    }

    fn recip(self) -> Self {
        Self::one() / self
    }

    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn tan(self) -> Self;
    fn asin(self) -> Self;
    fn acos(self) -> Self;
    fn atan(self) -> Self;
    fn sinh(self) -> Self;
    fn cosh(self) -> Self;
    fn tanh(self) -> Self;
    fn asinh(self) -> Self;
    fn acosh(self) -> Self;
    fn atanh(self) -> Self;

    /// Absolute value. The derivative at exactly zero is taken to be zero.
    fn abs(self) -> Self;
    /// Rounding functions are piecewise constant: zero derivative.
    fn floor(self) -> Self;
    fn ceil(self) -> Self;
    fn round(self) -> Self;
    fn trunc(self) -> Self;

    /// Integer power.
    fn powi(self, n: i32) -> Self;
    /// Power with a constant exponent.
    fn powd(self, e: f64) -> Self;
    /// Power with a differentiable exponent.
    fn powf(self, e: Self) -> Self;
    fn atan2(self, other: Self) -> Self;
    fn hypot(self, other: Self) -> Self;

    /// Positive difference: `self - other` if positive, zero otherwise.
    fn fdim(self, other: Self) -> Self;
    /// Minimum ignoring `NaN`, as `f64::min`.
    fn fmin(self, other: Self) -> Self;
    /// Maximum ignoring `NaN`, as `f64::max`.
    fn fmax(self, other: Self) -> Self;
}

impl Real for f64 {
    fn constant(x: f64) -> Self {
        x
    }

    fn value(&self) -> f64 {
        *self
    }

    fn exp(self) -> Self {
        f64::exp(self)
    }

    fn exp2(self) -> Self {
        f64::exp2(self)
    }

    fn exp_m1(self) -> Self {
        f64::exp_m1(self)
    }

    fn ln(self) -> Self {
        f64::ln(self)
    }

    fn log2(self) -> Self {
        f64::log2(self)
    }

    fn log10(self) -> Self {
        f64::log10(self)
    }

    fn ln_1p(self) -> Self {
        f64::ln_1p(self)
    }

    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    fn cbrt(self) -> Self {
        f64::cbrt(self)
    }

    fn recip(self) -> Self {
        f64::recip(self)
    }

    fn sin(self) -> Self {
        f64::sin(self)
    }

    fn cos(self) -> Self {
        f64::cos(self)
    }

    fn tan(self) -> Self {
        f64::tan(self)
    }

    fn asin(self) -> Self {
        f64::asin(self)
    }

    fn acos(self) -> Self {
        f64::acos(self)
    }

    fn atan(self) -> Self {
        f64::atan(self)
    }

    fn sinh(self) -> Self {
        f64::sinh(self)
    }

    fn cosh(self) -> Self {
        f64::cosh(self)
    }

    fn tanh(self) -> Self {
        f64::tanh(self)
    }

    fn asinh(self) -> Self {
        f64::asinh(self)
    }

    fn acosh(self) -> Self {
        f64::acosh(self)
    }

    fn atanh(self) -> Self {
        f64::atanh(self)
    }

    fn abs(self) -> Self {
        f64::abs(self)
    }

    fn floor(self) -> Self {
        f64::floor(self)
    }

    fn ceil(self) -> Self {
        f64::ceil(self)
    }

    fn round(self) -> Self {
        f64::round(self)
    }

    fn trunc(self) -> Self {
        f64::trunc(self)
    }

    fn powi(self, n: i32) -> Self {
        f64::powi(self, n)
    }

    fn powd(self, e: f64) -> Self {
        f64::powf(self, e)
    }

    fn powf(self, e: Self) -> Self {
        f64::powf(self, e)
    }

    fn atan2(self, other: Self) -> Self {
        f64::atan2(self, other)
    }

    fn hypot(self, other: Self) -> Self {
        f64::hypot(self, other)
    }

    fn fdim(self, other: Self) -> Self {
        if self.is_nan() || other.is_nan() {
            f64::NAN
        } else if self > other {
            self - other
        } else {
            0.0
        }
    }

    fn fmin(self, other: Self) -> Self {
        f64::min(self, other)
    }

    fn fmax(self, other: Self) -> Self {
        f64::max(self, other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poly<T: Real>(x: T) -> T {
        x.square() * 3.0 + x.powi(3) - x.recip()
    }

    #[test]
    fn test_zero_one() {
        assert_eq!(<f64 as Real>::zero(), 0.0);
        assert_eq!(<f64 as Real>::one(), 1.0);
        assert_eq!(2.5f64.value(), 2.5);
    }

    #[test]
    fn test_generic_f64_evaluation() {
        assert_eq!(poly(2.0), 12.0 + 8.0 - 0.5);
    }

    #[test]
    fn test_fdim() {
        assert_eq!(3.0f64.fdim(1.0), 2.0);
        assert_eq!(1.0f64.fdim(3.0), 0.0);
        assert!(f64::NAN.fdim(1.0).is_nan());
    }

    #[test]
    fn test_fmin_fmax_ignore_nan() {
        assert_eq!(f64::NAN.fmin(1.0), 1.0);
        assert_eq!(2.0f64.fmax(f64::NAN), 2.0);
    }
}
