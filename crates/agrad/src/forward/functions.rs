//! Elementary functions on dual numbers.
//!
//! Each function applies the chain rule once: `f(a + b ε) = f(a) + f'(a) b ε`.
//! Since the component type is itself [`Real`], the same rules compose for
//! nested duals and for duals over reverse-mode variables.

use std::f64::consts::{LN_2, LN_10};

use super::dual::Dual;
use crate::scalar::Real;

/// Sign of the innermost value, zero at zero.
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else if x == 0.0 {
        0.0
    } else {
        f64::NAN
    }
}

impl<T: Real> Real for Dual<T> {
    fn constant(x: f64) -> Self {
        Self::new(T::constant(x))
    }

    fn value(&self) -> f64 {
        self.primal().value()
    }

    fn exp(self) -> Self {
        let (p, t) = self.into_parts();
        let e = p.exp();
        Self::with_tangent(e, t * e)
    }

    fn exp2(self) -> Self {
        let (p, t) = self.into_parts();
        let e = p.exp2();
        Self::with_tangent(e, t * e * LN_2)
    }

    fn exp_m1(self) -> Self {
        let (p, t) = self.into_parts();
        Self::with_tangent(p.exp_m1(), t * p.exp())
    }

    fn ln(self) -> Self {
        let (p, t) = self.into_parts();
        Self::with_tangent(p.ln(), t / p)
    }

    fn log2(self) -> Self {
        let (p, t) = self.into_parts();
        Self::with_tangent(p.log2(), t / (p * LN_2))
    }

    fn log10(self) -> Self {
        let (p, t) = self.into_parts();
        Self::with_tangent(p.log10(), t / (p * LN_10))
    }

    fn ln_1p(self) -> Self {
        let (p, t) = self.into_parts();
        Self::with_tangent(p.ln_1p(), t / (p + 1.0))
    }

    fn sqrt(self) -> Self {
        let (p, t) = self.into_parts();
        let s = p.sqrt();
        Self::with_tangent(s, t / (s * 2.0))
    }

    fn cbrt(self) -> Self {
        let (p, t) = self.into_parts();
        let c = p.cbrt();
        Self::with_tangent(c, t / (c.square() * 3.0))
    }

    fn square(self) -> Self {
        let (p, t) = self.into_parts();
        Self::with_tangent(p.square(), t * p * 2.0)
    }

    fn recip(self) -> Self {
        let (p, t) = self.into_parts();
        let r = p.recip();
        Self::with_tangent(r, -(t * r.square()))
    }

    fn sin(self) -> Self {
        let (p, t) = self.into_parts();
        Self::with_tangent(p.sin(), t * p.cos())
    }

    fn cos(self) -> Self {
        let (p, t) = self.into_parts();
        Self::with_tangent(p.cos(), -(t * p.sin()))
    }

    fn tan(self) -> Self {
        let (p, t) = self.into_parts();
        let y = p.tan();
        Self::with_tangent(y, t * (y.square() + 1.0))
    }

    fn asin(self) -> Self {
        let (p, t) = self.into_parts();
        Self::with_tangent(p.asin(), t / (-p.square() + 1.0).sqrt())
    }

    fn acos(self) -> Self {
        let (p, t) = self.into_parts();
        Self::with_tangent(p.acos(), -(t / (-p.square() + 1.0).sqrt()))
    }

    fn atan(self) -> Self {
        let (p, t) = self.into_parts();
        Self::with_tangent(p.atan(), t / (p.square() + 1.0))
    }

    fn sinh(self) -> Self {
        let (p, t) = self.into_parts();
        Self::with_tangent(p.sinh(), t * p.cosh())
    }

    fn cosh(self) -> Self {
        let (p, t) = self.into_parts();
        Self::with_tangent(p.cosh(), t * p.sinh())
    }

    fn tanh(self) -> Self {
        let (p, t) = self.into_parts();
        let y = p.tanh();
        Self::with_tangent(y, t * (-y.square() + 1.0))
    }

    fn asinh(self) -> Self {
        let (p, t) = self.into_parts();
        Self::with_tangent(p.asinh(), t / (p.square() + 1.0).sqrt())
    }

    fn acosh(self) -> Self {
        let (p, t) = self.into_parts();
        Self::with_tangent(p.acosh(), t / (p.square() - 1.0).sqrt())
    }

    fn atanh(self) -> Self {
        let (p, t) = self.into_parts();
        Self::with_tangent(p.atanh(), t / (-p.square() + 1.0))
    }

    fn abs(self) -> Self {
        let (p, t) = self.into_parts();
        Self::with_tangent(p.abs(), t * sign(p.value()))
    }

    fn floor(self) -> Self {
        let (p, t) = self.into_parts();
        Self::with_tangent(p.floor(), t * 0.0)
    }

    fn ceil(self) -> Self {
        let (p, t) = self.into_parts();
        Self::with_tangent(p.ceil(), t * 0.0)
    }

    fn round(self) -> Self {
        let (p, t) = self.into_parts();
        Self::with_tangent(p.round(), t * 0.0)
    }

    fn trunc(self) -> Self {
        let (p, t) = self.into_parts();
        Self::with_tangent(p.trunc(), t * 0.0)
    }

    fn powi(self, n: i32) -> Self {
        let (p, t) = self.into_parts();
        if n == 0 {
            return Self::with_tangent(p.powi(0), t * 0.0);
        }
        Self::with_tangent(p.powi(n), t * p.powi(n - 1) * f64::from(n))
    }

    fn powd(self, e: f64) -> Self {
        let (p, t) = self.into_parts();
        if p.value() == 0.0 {
            return Self::with_tangent(p.powd(e), t * 0.0);
        }
        Self::with_tangent(p.powd(e), t * p.powd(e - 1.0) * e)
    }

    fn powf(self, e: Self) -> Self {
        let (p, t) = self.into_parts();
        let (q, u) = e.into_parts();
        let y = p.powf(q);
        if p.value() == 0.0 {
            return Self::with_tangent(y, t * 0.0 + u * 0.0);
        }
        Self::with_tangent(y, (t * q / p + u * p.ln()) * y)
    }

    fn atan2(self, other: Self) -> Self {
        let (p, t) = self.into_parts();
        let (q, u) = other.into_parts();
        let denom = p.square() + q.square();
        Self::with_tangent(p.atan2(q), (t * q - u * p) / denom)
    }

    fn hypot(self, other: Self) -> Self {
        let (p, t) = self.into_parts();
        let (q, u) = other.into_parts();
        let h = p.hypot(q);
        Self::with_tangent(h, (t * p + u * q) / h)
    }

    fn fdim(self, other: Self) -> Self {
        let (x, y) = (self.value(), other.value());
        if x.is_nan() || y.is_nan() {
            let (p, t) = self.into_parts();
            let (q, u) = other.into_parts();
            return Self::with_tangent(p.fdim(q), (t - u) * f64::NAN);
        }
        if x > y {
            self - other
        } else {
            let (p, t) = self.into_parts();
            let (q, u) = other.into_parts();
            Self::with_tangent(p.fdim(q), (t - u) * 0.0)
        }
    }

    fn fmin(self, other: Self) -> Self {
        let (x, y) = (self.value(), other.value());
        if y.is_nan() || (!x.is_nan() && x <= y) {
            self
        } else {
            other
        }
    }

    fn fmax(self, other: Self) -> Self {
        let (x, y) = (self.value(), other.value());
        if y.is_nan() || (!x.is_nan() && x >= y) {
            self
        } else {
            other
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    type Unary = fn(Dual<f64>) -> Dual<f64>;

    fn check(f: Unary, g: fn(f64) -> f64, x: f64) {
        let eps = 1e-6;
        let y = f(Dual::with_tangent(x, 1.0));
        let numerical = (g(x + eps) - g(x - eps)) / (2.0 * eps);
        assert_relative_eq!(y.primal(), g(x), epsilon = 1e-12);
        assert_relative_eq!(y.tangent(), numerical, epsilon = 1e-6, max_relative = 1e-6);
    }

    #[test]
    fn test_elementary_derivatives() {
        check(Real::exp, f64::exp, 0.3);
        check(Real::exp2, f64::exp2, 0.3);
        check(Real::exp_m1, f64::exp_m1, 0.3);
        check(Real::ln, f64::ln, 1.7);
        check(Real::log2, f64::log2, 1.7);
        check(Real::log10, f64::log10, 1.7);
        check(Real::ln_1p, f64::ln_1p, 0.4);
        check(Real::sqrt, f64::sqrt, 2.5);
        check(Real::cbrt, f64::cbrt, 2.5);
        check(Real::square, |x| x * x, -1.2);
        check(Real::recip, f64::recip, 0.8);
        check(Real::sin, f64::sin, 0.9);
        check(Real::cos, f64::cos, 0.9);
        check(Real::tan, f64::tan, 0.9);
        check(Real::asin, f64::asin, 0.4);
        check(Real::acos, f64::acos, 0.4);
        check(Real::atan, f64::atan, 1.4);
        check(Real::sinh, f64::sinh, 0.6);
        check(Real::cosh, f64::cosh, 0.6);
        check(Real::tanh, f64::tanh, 0.6);
        check(Real::asinh, f64::asinh, 0.6);
        check(Real::acosh, f64::acosh, 1.6);
        check(Real::atanh, f64::atanh, 0.6);
        check(Real::abs, f64::abs, -2.0);
        check(|x| x.powi(3), |x| x.powi(3), 1.3);
        check(|x| x.powd(2.5), |x| x.powf(2.5), 1.3);
    }

    #[test]
    fn test_binary_derivatives() {
        let x = Dual::with_tangent(1.5, 1.0);
        let y = Dual::with_tangent(-0.5, 0.0);
        let z = x.atan2(y);
        assert_relative_eq!(z.tangent(), -0.5 / (1.5 * 1.5 + 0.25));
        let h = x.hypot(y);
        assert_relative_eq!(h.tangent(), 1.5 / h.primal());
        let p = x.powf(Dual::with_tangent(2.0, 1.0));
        assert_relative_eq!(p.tangent(), (2.0 / 1.5 + 1.5f64.ln()) * 2.25);
    }

    #[test]
    fn test_edge_conventions() {
        let zero = Dual::with_tangent(0.0, 1.0);
        assert_eq!(zero.abs().tangent(), 0.0);
        assert_eq!(zero.powd(2.0).tangent(), 0.0);
        assert_eq!(Dual::with_tangent(2.7, 1.0).floor().into_parts(), (2.0, 0.0));
        assert_eq!(zero.ln().into_parts(), (f64::NEG_INFINITY, f64::INFINITY));
        let below = Dual::with_tangent(1.0, 1.0).fdim(Dual::new(3.0));
        assert_eq!(below.into_parts(), (0.0, 0.0));
    }

    #[test]
    fn test_nested_second_derivative() {
        // d2/dx2 x^3 = 6x
        let x = Dual::with_tangent(Dual::with_tangent(2.0, 1.0), Dual::with_tangent(1.0, 0.0));
        let y = x.powi(3);
        assert_eq!(y.primal().primal(), 8.0);
        assert_eq!(y.primal().tangent(), 12.0);
        assert_eq!(y.tangent().primal(), 12.0);
        assert_eq!(y.tangent().tangent(), 12.0);
    }

    #[test]
    fn test_constant_is_nested_zero() {
        let c = <Dual<Dual<f64>> as Real>::constant(4.0);
        assert_eq!(c.primal().into_parts(), (4.0, 0.0));
        assert_eq!(c.tangent().into_parts(), (0.0, 0.0));
        assert_eq!(c.value(), 4.0);
    }
}
