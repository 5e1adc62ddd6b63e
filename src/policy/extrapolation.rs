//! Extrapolation of a weekly restriction series beyond the last observed week.
//!
//! The trailing points are treated as values at `x = 0..n`; predictions are made for
//! `x = n, n + 1, ...` and clamped into `[0, 1]`.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::numeric::{clamp_unit, convergence};

/// Number of weekly values produced beyond the data.
pub const HORIZON: usize = 25;

/// Number of trailing weekly values the extrapolation is fitted to.
pub const TRAILING_POINTS: usize = 8;

const MAX_ITERATIONS: usize = 500;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExtrapolationMode {
    #[default]
    None,
    HoldLast,
    Linear,
    Exponential,
}

/// Extrapolates `trend` for `steps` further points.
#[must_use]
pub fn extrapolate(trend: &[f64], steps: usize, mode: ExtrapolationMode) -> Vec<f64> {
    let Some(&last) = trend.last() else {
        return Vec::new();
    };
    let hold_last = || vec![clamp_unit(last); steps];

    #[allow(clippy::cast_precision_loss)]
    let n = trend.len() as f64;
    #[allow(clippy::cast_precision_loss)]
    let xs = |offset: f64| (0..steps).map(move |step| offset + step as f64);

    match mode {
        ExtrapolationMode::None => Vec::new(),
        ExtrapolationMode::HoldLast => hold_last(),
        ExtrapolationMode::Linear => match linear_fit(trend) {
            Some((intercept, slope)) => xs(n).map(|x| clamp_unit(intercept + slope * x)).collect(),
            None => hold_last(),
        },
        ExtrapolationMode::Exponential if is_flat(trend) => hold_last(),
        ExtrapolationMode::Exponential => match exponential_fit(trend) {
            Some(fit) => xs(n).map(|x| clamp_unit(fit.value(x))).collect(),
            None => {
                debug!("exponential fit did not converge, holding the last value");
                hold_last()
            }
        },
    }
}

fn is_flat(ys: &[f64]) -> bool {
    ys.windows(2).all(|w| (w[0] - w[1]).abs() < 1e-12)
}

/// Ordinary least squares on `x = 0..n`. Returns `(intercept, slope)`.
fn linear_fit(ys: &[f64]) -> Option<(f64, f64)> {
    if ys.len() < 2 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = ys.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = ys.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (i, y) in ys.iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let dx = i as f64 - mean_x;
        sxy += dx * (y - mean_y);
        sxx += dx * dx;
    }
    let slope = sxy / sxx;
    Some((mean_y - slope * mean_x, slope))
}

/// The saturating curve `1 - a * exp(-x / b)`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Exponential {
    pub a: f64,
    pub b: f64,
}

impl Exponential {
    #[must_use]
    pub fn value(&self, x: f64) -> f64 {
        1.0 - self.a * (-x / self.b).exp()
    }

    /// Partial derivatives by `a` and `b`.
    fn gradient(&self, x: f64) -> (f64, f64) {
        let exb = (-x / self.b).exp();
        (-exb, -self.a * x * exb / (self.b * self.b))
    }

    fn cost(&self, ys: &[f64]) -> f64 {
        ys.iter()
            .enumerate()
            .map(|(i, y)| {
                #[allow(clippy::cast_precision_loss)]
                let r = y - self.value(i as f64);
                r * r
            })
            .sum()
    }
}

/// Fits `1 - a * exp(-x / b)` to the points `(i, ys[i])` with Levenberg-Marquardt.
/// Returns `None` unless the fit converges to finite parameters.
#[must_use]
pub fn exponential_fit(ys: &[f64]) -> Option<Exponential> {
    if ys.len() < 2 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let mut fit = Exponential {
        a: 1.0 - ys[0],
        b: ys.len() as f64,
    };
    let mut cost = fit.cost(ys);
    let mut lambda = 1e-3;

    for _ in 0..MAX_ITERATIONS {
        if cost < 1e-24 {
            return Some(fit);
        }

        // Normal equations (J^T J + lambda * diag(J^T J)) delta = J^T r
        let (mut jaa, mut jab, mut jbb, mut ga, mut gb) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for (i, y) in ys.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let x = i as f64;
            let (da, db) = fit.gradient(x);
            let r = y - fit.value(x);
            jaa += da * da;
            jab += da * db;
            jbb += db * db;
            ga += da * r;
            gb += db * r;
        }
        let (maa, mbb) = (jaa * (1.0 + lambda), jbb * (1.0 + lambda));
        let det = maa * mbb - jab * jab;
        if !det.is_normal() {
            break;
        }
        let candidate = Exponential {
            a: fit.a + (mbb * ga - jab * gb) / det,
            b: fit.b + (maa * gb - jab * ga) / det,
        };
        let candidate_cost = candidate.cost(ys);

        if candidate_cost.is_finite() && candidate_cost <= cost {
            fit = candidate;
            lambda /= 10.0;
            if convergence(&mut cost, candidate_cost) {
                break;
            }
        } else {
            lambda *= 10.0;
            if lambda > 1e16 {
                break;
            }
        }
    }

    let finite = fit.a.is_finite() && fit.b.is_finite() && fit.b.abs() > f64::EPSILON;
    (finite && cost.is_finite()).then_some(fit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_almost_eq;

    #[test]
    fn none_and_empty() {
        assert!(extrapolate(&[0.5, 0.6], HORIZON, ExtrapolationMode::None).is_empty());
        assert!(extrapolate(&[], HORIZON, ExtrapolationMode::Linear).is_empty());
    }

    #[test]
    fn hold_last() {
        let values = extrapolate(&[0.2, 0.4, 0.7], HORIZON, ExtrapolationMode::HoldLast);
        assert_eq!(values.len(), HORIZON);
        assert!(values.iter().all(|v| *v == 0.7));
    }

    #[test]
    fn linear_trend_is_continued_and_clamped() {
        let values = extrapolate(&[0.5, 0.6, 0.7], 5, ExtrapolationMode::Linear);
        assert_almost_eq!(values[0], 0.8, 1e-12);
        assert_almost_eq!(values[1], 0.9, 1e-12);
        assert_almost_eq!(values[2], 1.0, 1e-12);
        assert_eq!(values[4], 1.0);

        let falling = extrapolate(&[0.5, 0.3, 0.1], 3, ExtrapolationMode::Linear);
        assert_eq!(falling, vec![0.0; 3]);
    }

    #[test]
    fn single_point_holds_last() {
        assert_eq!(
            extrapolate(&[0.4], 2, ExtrapolationMode::Linear),
            vec![0.4, 0.4]
        );
        assert_eq!(
            extrapolate(&[0.4], 2, ExtrapolationMode::Exponential),
            vec![0.4, 0.4]
        );
    }

    #[test]
    fn fits_saturating_exponential() {
        let truth = Exponential { a: 0.6, b: 3.0 };
        #[allow(clippy::cast_precision_loss)]
        let ys: Vec<f64> = (0..8).map(|x| truth.value(x as f64)).collect();
        let fit = exponential_fit(&ys).unwrap();
        assert_almost_eq!(fit.a, 0.6, 1e-6);
        assert_almost_eq!(fit.b, 3.0, 1e-6);

        let values = extrapolate(&ys, HORIZON, ExtrapolationMode::Exponential);
        assert_almost_eq!(values[0], truth.value(8.0), 1e-6);
        assert!(values.windows(2).all(|w| w[0] <= w[1] + 1e-12));
        assert!(values.iter().all(|v| *v <= 1.0));
    }

    #[test]
    fn flat_series_stays_flat() {
        let values = extrapolate(&[0.8; 8], HORIZON, ExtrapolationMode::Exponential);
        assert!(values.iter().all(|v| (v - 0.8).abs() < 1e-9));
    }
}
