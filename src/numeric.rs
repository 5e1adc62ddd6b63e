//! Floating point helpers built on the approx crate. Used by the curve fitting in
//! `policy::extrapolation` and by the `assert_almost_eq!` macro.

use approx::AbsDiffEq;

/// Relative precision used to decide when an iterative fit has converged.
pub const ACC: f64 = 10e-11;

/// Compares if two floats are close via `approx::abs_diff_eq` using a maximum absolute difference
/// (epsilon) of `acc`.
#[must_use]
pub fn almost_eq(a: f64, b: f64, acc: f64) -> bool {
    if a.is_infinite() && b.is_infinite() {
        return a == b;
    }
    a.abs_diff_eq(&b, acc)
}

/// Compares `x` and `x_new` with `ACC` relative precision and stores `x_new` in `x`.
#[must_use]
pub fn convergence(x: &mut f64, x_new: f64) -> bool {
    let res = approx::relative_eq!(*x, x_new, max_relative = ACC);
    *x = x_new;
    res
}

/// Asserts that two `f64` values differ by less than the given precision.
#[macro_export]
macro_rules! assert_almost_eq {
    ($a:expr, $b:expr, $prec:expr $(,)?) => {
        if !$crate::numeric::almost_eq($a, $b, $prec) {
            panic!(
                "assertion failed: `abs(left - right) < {:e}`, (left: `{}`, right: `{}`)",
                $prec, $a, $b
            );
        }
    };
}

/// Clamps a value into the closed unit interval. NaN maps to zero.
#[must_use]
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}
