//! Natural cubic spline interpolation for tabulated radial kernels.
//!
//! The smooth (far-field) part of the Ewald-split RPY kernel is expensive to
//! evaluate exactly, so it is sampled once per splitting parameter and
//! interpolated inside the pairwise near-field loop.

/// A natural cubic spline interpolator for real-valued data.
///
/// Given $n$ data points $(x_i, y_i)$, constructs piecewise cubic polynomials
/// with continuous first and second derivatives. Equally spaced knots are
/// detected at construction and located in O(1).
#[derive(Debug, Clone)]
pub struct CubicSpline {
    /// Sorted x values (knots).
    xs: Vec<f64>,
    /// Corresponding y values.
    ys: Vec<f64>,
    /// Second derivatives at each knot (computed during construction).
    y2s: Vec<f64>,
    /// Knot spacing when the knots are uniform.
    uniform_step: Option<f64>,
}

impl CubicSpline {
    /// Construct a natural cubic spline from data points.
    ///
    /// # Panics
    /// Panics if `xs` and `ys` have different lengths, if `xs` is not
    /// strictly increasing, or if fewer than 2 points are provided.
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Self {
        assert_eq!(xs.len(), ys.len(), "xs and ys must have equal length");
        assert!(xs.len() >= 2, "Need at least 2 data points");
        for i in 1..xs.len() {
            assert!(
                xs[i] > xs[i - 1],
                "xs must be strictly increasing at index {}",
                i
            );
        }

        let n = xs.len();
        let mut y2s = vec![0.0; n];
        let mut u = vec![0.0; n - 1];

        // Tridiagonal sweep with y'' = 0 at both ends.
        for i in 1..n - 1 {
            let sig = (xs[i] - xs[i - 1]) / (xs[i + 1] - xs[i - 1]);
            let p = sig * y2s[i - 1] + 2.0;
            y2s[i] = (sig - 1.0) / p;
            u[i] = (ys[i + 1] - ys[i]) / (xs[i + 1] - xs[i])
                - (ys[i] - ys[i - 1]) / (xs[i] - xs[i - 1]);
            u[i] = (6.0 * u[i] / (xs[i + 1] - xs[i - 1]) - sig * u[i - 1]) / p;
        }
        for k in (0..n - 2).rev() {
            y2s[k + 1] = y2s[k + 1] * y2s[k + 2] + u[k + 1];
        }

        let step = (xs[n - 1] - xs[0]) / (n - 1) as f64;
        let uniform = xs
            .iter()
            .enumerate()
            .all(|(i, &x)| (x - (xs[0] + i as f64 * step)).abs() <= 1e-12 * step.max(1.0));

        Self {
            xs,
            ys,
            y2s,
            uniform_step: uniform.then_some(step),
        }
    }

    /// Spline through `f` sampled at `n` equally spaced points on `[lo, hi]`.
    #[cfg(test)]
    fn from_fn<F: FnMut(f64) -> f64>(lo: f64, hi: f64, n: usize, mut f: F) -> Self {
        let n = n.max(2);
        let step = (hi - lo) / (n - 1) as f64;
        let xs: Vec<f64> = (0..n).map(|i| lo + i as f64 * step).collect();
        let ys = xs.iter().map(|&x| f(x)).collect();
        Self::new(xs, ys)
    }

    fn interval(&self, x: f64) -> usize {
        let n = self.xs.len();
        if let Some(step) = self.uniform_step {
            let i = ((x - self.xs[0]) / step).floor();
            return if i <= 0.0 { 0 } else { (i as usize).min(n - 2) };
        }
        let mut lo = 0;
        let mut hi = n - 1;
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if self.xs[mid] > x {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        lo
    }

    /// Evaluate the spline at a given x value.
    ///
    /// Extrapolation beyond the data range uses the boundary polynomial.
    pub fn evaluate(&self, x: f64) -> f64 {
        let lo = self.interval(x);
        let hi = lo + 1;

        let h = self.xs[hi] - self.xs[lo];
        let a = (self.xs[hi] - x) / h;
        let b = (x - self.xs[lo]) / h;

        a * self.ys[lo]
            + b * self.ys[hi]
            + ((a * a * a - a) * self.y2s[lo] + (b * b * b - b) * self.y2s[hi]) * h * h / 6.0
    }
}
