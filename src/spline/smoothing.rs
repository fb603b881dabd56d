// Cubic smoothing splines in Reinsch form.
//
// For knots t_0 < .. < t_{n-1} and data y, the spline g minimising
//     sum (y_i - g(t_i))^2 + lambda * integral g''(t)^2 dt
// is natural cubic. Its second derivatives gamma at the interior knots solve the banded
// system (R + lambda Q'Q) gamma = Q'y, and its knot values are g = y - lambda Q gamma.

use itertools::Itertools;

/// A natural cubic spline stored as its values and second derivatives at each knot.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct CubicSpline {
    knots: Vec<f64>,
    values: Vec<f64>,
    second_derivs: Vec<f64>,
}

impl CubicSpline {
    /// Fit with a fixed penalty. `lambda == 0.0` interpolates `ys` exactly.
    ///
    /// `knots` must be strictly increasing and at least three long.
    pub fn fit(knots: &[f64], ys: &[f64], lambda: f64) -> Self {
        debug_assert!(knots.len() == ys.len() && knots.len() >= 3);

        let h = knots.iter().tuple_windows().map(|(a, b)| b - a).collect::<Vec<_>>();
        let m = knots.len() - 2;

        // Column j of Q has entries at rows j, j+1, j+2.
        let q0 = (0..m).map(|j| 1.0 / h[j]).collect::<Vec<_>>();
        let q2 = (0..m).map(|j| 1.0 / h[j + 1]).collect::<Vec<_>>();
        let q1 = (0..m).map(|j| -q0[j] - q2[j]).collect::<Vec<_>>();

        let mut band = BandedSpd::with_size(m);
        for j in 0..m {
            band.diag[j] = (h[j] + h[j + 1]) / 3.0
                + lambda * (q0[j].powi(2) + q1[j].powi(2) + q2[j].powi(2));
            if j + 1 < m {
                band.off1[j] = h[j + 1] / 6.0 + lambda * (q1[j] * q0[j + 1] + q2[j] * q1[j + 1]);
            }
            if j + 2 < m {
                band.off2[j] = lambda * q2[j] * q0[j + 2];
            }
        }

        let rhs = (0..m)
            .map(|j| q0[j] * ys[j] + q1[j] * ys[j + 1] + q2[j] * ys[j + 2])
            .collect::<Vec<_>>();
        let gamma = band.solve(rhs);

        let mut values = ys.to_vec();
        for (j, g) in gamma.iter().enumerate() {
            values[j] -= lambda * q0[j] * g;
            values[j + 1] -= lambda * q1[j] * g;
            values[j + 2] -= lambda * q2[j] * g;
        }

        let mut second_derivs = Vec::with_capacity(m + 2);
        second_derivs.push(0.0);
        second_derivs.extend(gamma);
        second_derivs.push(0.0);

        Self {
            knots: knots.to_vec(),
            values,
            second_derivs,
        }
    }

    /// Evaluate at `t`. Outside the knot range the end segments are extended.
    pub fn eval(&self, t: f64) -> f64 {
        let last_seg = self.knots.len() - 2;
        let seg = self.knots.partition_point(|&k| k <= t).saturating_sub(1).min(last_seg);

        let (t0, t1) = (self.knots[seg], self.knots[seg + 1]);
        let (g0, g1) = (self.values[seg], self.values[seg + 1]);
        let (c0, c1) = (self.second_derivs[seg], self.second_derivs[seg + 1]);

        let h = t1 - t0;
        let a = t - t0;
        let b = t1 - t;

        (a * g1 + b * g0) / h - a * b / 6.0 * ((1.0 + a / h) * c1 + (1.0 + b / h) * c0)
    }

    /// Residual sum of squares against the data the spline was fit to.
    pub fn residual(&self, ys: &[f64]) -> f64 {
        self.values.iter().zip(ys).map(|(g, y)| (g - y).powi(2)).sum()
    }
}

/// Fit `xs` and `ys` against the shared parameter `knots` with a common penalty, chosen so
/// that the combined residual sum of squares is as close to `smoothing` as possible without
/// exceeding it. If even a straight line fits within `smoothing`, the stiffest fit is used.
pub(super) fn fit_parametric(
    knots: &[f64],
    xs: &[f64],
    ys: &[f64],
    smoothing: f64,
) -> (CubicSpline, CubicSpline) {
    let fit_both = |lambda: f64| {
        let fx = CubicSpline::fit(knots, xs, lambda);
        let fy = CubicSpline::fit(knots, ys, lambda);
        let rss = fx.residual(xs) + fy.residual(ys);
        (fx, fy, rss)
    };

    if smoothing <= 0.0 {
        let (fx, fy, _) = fit_both(0.0);
        return (fx, fy);
    }

    // Penalties are searched relative to the cube of the mean knot spacing, where the two
    // terms of the objective are of comparable size.
    let mean_h = (knots[knots.len() - 1] - knots[0]) / (knots.len() - 1) as f64;
    let scale = mean_h.powi(3);
    let lambda_at = |exponent: f64| scale * 10f64.powf(exponent);

    let (mut lo, mut hi) = (-12.0, 12.0);

    let stiffest = fit_both(lambda_at(hi));
    if stiffest.2 <= smoothing {
        return (stiffest.0, stiffest.1);
    }

    let mut best = fit_both(0.0);
    for _ in 0..60 {
        let mid = (lo + hi) / 2.0;
        let candidate = fit_both(lambda_at(mid));
        if candidate.2 > smoothing {
            hi = mid;
        } else {
            lo = mid;
            best = candidate;
        }
    }

    (best.0, best.1)
}

// Symmetric positive definite matrix with two off-diagonals, solved by Cholesky.
struct BandedSpd {
    diag: Vec<f64>,
    off1: Vec<f64>,
    off2: Vec<f64>,
}

impl BandedSpd {
    fn with_size(n: usize) -> Self {
        Self {
            diag: vec![0.0; n],
            off1: vec![0.0; n.saturating_sub(1)],
            off2: vec![0.0; n.saturating_sub(2)],
        }
    }

    fn solve(&self, mut rhs: Vec<f64>) -> Vec<f64> {
        let n = self.diag.len();

        // l0[i] = L[i][i], l1[i] = L[i][i-1], l2[i] = L[i][i-2]
        let mut l0 = vec![0.0; n];
        let mut l1 = vec![0.0; n];
        let mut l2 = vec![0.0; n];
        for i in 0..n {
            if i >= 2 {
                l2[i] = self.off2[i - 2] / l0[i - 2];
            }
            if i >= 1 {
                let above = if i >= 2 { l2[i] * l1[i - 1] } else { 0.0 };
                l1[i] = (self.off1[i - 1] - above) / l0[i - 1];
            }
            let pivot = self.diag[i] - l1[i].powi(2) - l2[i].powi(2);
            //rounding can only push this marginally below zero.
            l0[i] = pivot.max(f64::MIN_POSITIVE).sqrt();
        }

        for i in 0..n {
            let mut acc = rhs[i];
            if i >= 1 {
                acc -= l1[i] * rhs[i - 1];
            }
            if i >= 2 {
                acc -= l2[i] * rhs[i - 2];
            }
            rhs[i] = acc / l0[i];
        }

        for i in (0..n).rev() {
            let mut acc = rhs[i];
            if i + 1 < n {
                acc -= l1[i + 1] * rhs[i + 1];
            }
            if i + 2 < n {
                acc -= l2[i + 2] * rhs[i + 2];
            }
            rhs[i] = acc / l0[i];
        }

        rhs
    }
}
