//! Gauss-Legendre quadrature on intervals.
//!
//! Nodes and weights on $[-1, 1]$ are computed once by Newton iteration on
//! the Legendre polynomial $P_n$; composite rules split an interval into
//! equal panels and apply the same rule on each.

/// An $n$-point Gauss-Legendre rule on $[-1, 1]$.
#[derive(Debug, Clone)]
pub struct GaussLegendre {
    nodes: Vec<f64>,
    weights: Vec<f64>,
}

impl GaussLegendre {
    /// Build the $n$-point rule (exact for polynomials of degree $2n-1$).
    ///
    /// # Panics
    /// Panics if `n == 0`.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "Gauss-Legendre rule needs at least one node");
        let mut nodes = vec![0.0; n];
        let mut weights = vec![0.0; n];
        let m = (n + 1) / 2;
        for i in 0..m {
            // Tricomi initial guess for the i-th root.
            let mut x = (std::f64::consts::PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
            for _ in 0..100 {
                let (p, d) = legendre_with_derivative(n, x);
                let dx = p / d;
                x -= dx;
                if dx.abs() < 1e-15 {
                    break;
                }
            }
            let (_, dp) = legendre_with_derivative(n, x);
            let w = 2.0 / ((1.0 - x * x) * dp * dp);
            nodes[i] = -x;
            nodes[n - 1 - i] = x;
            weights[i] = w;
            weights[n - 1 - i] = w;
        }
        Self { nodes, weights }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Integrate `f` over `[a, b]` split into `panels` equal pieces.
    pub fn integrate_composite<F>(&self, a: f64, b: f64, panels: usize, mut f: F) -> f64
    where
        F: FnMut(f64) -> f64,
    {
        let panels = panels.max(1);
        let width = (b - a) / panels as f64;
        let half = 0.5 * width;
        let mut total = 0.0;
        for p in 0..panels {
            let mid = a + (p as f64 + 0.5) * width;
            let mut sum = 0.0;
            for (x, w) in self.nodes.iter().zip(&self.weights) {
                sum += w * f(mid + half * x);
            }
            total += half * sum;
        }
        total
    }

    /// Like [`integrate_composite`](Self::integrate_composite) but for a
    /// pair of integrands sharing the same expensive setup per node.
    pub fn integrate_composite_pair<F>(&self, a: f64, b: f64, panels: usize, mut f: F) -> (f64, f64)
    where
        F: FnMut(f64) -> (f64, f64),
    {
        let panels = panels.max(1);
        let width = (b - a) / panels as f64;
        let half = 0.5 * width;
        let (mut t0, mut t1) = (0.0, 0.0);
        for p in 0..panels {
            let mid = a + (p as f64 + 0.5) * width;
            let (mut s0, mut s1) = (0.0, 0.0);
            for (x, w) in self.nodes.iter().zip(&self.weights) {
                let (v0, v1) = f(mid + half * x);
                s0 += w * v0;
                s1 += w * v1;
            }
            t0 += half * s0;
            t1 += half * s1;
        }
        (t0, t1)
    }
}

/// $P_n(x)$ and $P_n'(x)$ by the three-term recurrence.
fn legendre_with_derivative(n: usize, x: f64) -> (f64, f64) {
    let mut p0 = 1.0;
    let mut p1 = x;
    if n == 0 {
        return (1.0, 0.0);
    }
    for k in 2..=n {
        let kf = k as f64;
        let p2 = ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf;
        p0 = p1;
        p1 = p2;
    }
    let dp = n as f64 * (x * p1 - p0) / (x * x - 1.0);
    (p1, dp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_three_point_rule_matches_closed_form() {
        let gl = GaussLegendre::new(3);
        let r = (3.0_f64 / 5.0).sqrt();
        assert_abs_diff_eq!(gl.nodes[0], -r, epsilon = 1e-14);
        assert_abs_diff_eq!(gl.nodes[1], 0.0, epsilon = 1e-14);
        assert_abs_diff_eq!(gl.nodes[2], r, epsilon = 1e-14);
        assert_abs_diff_eq!(gl.weights[0], 5.0 / 9.0, epsilon = 1e-14);
        assert_abs_diff_eq!(gl.weights[1], 8.0 / 9.0, epsilon = 1e-14);
    }

    #[test]
    fn test_weights_sum_to_two() {
        for n in [1, 2, 5, 8, 16] {
            let gl = GaussLegendre::new(n);
            let s: f64 = gl.weights.iter().sum();
            assert_abs_diff_eq!(s, 2.0, epsilon = 1e-13);
        }
    }

    #[test]
    fn test_exact_for_high_degree_polynomial() {
        let gl = GaussLegendre::new(8);
        // ∫_0^2 x^15 dx = 2^16 / 16
        let v = gl.integrate_composite(0.0, 2.0, 1, |x| x.powi(15));
        assert_abs_diff_eq!(v, 65536.0 / 16.0, epsilon = 1e-8);
    }

    #[test]
    fn test_composite_oscillatory_integral() {
        let gl = GaussLegendre::new(8);
        // ∫_0^{20π} sin²(x) dx = 10π
        let v = gl.integrate_composite(0.0, 20.0 * std::f64::consts::PI, 40, |x| x.sin().powi(2));
        assert_abs_diff_eq!(v, 10.0 * std::f64::consts::PI, epsilon = 1e-10);
    }

    #[test]
    fn test_pair_integration() {
        let gl = GaussLegendre::new(6);
        let (a, b) = gl.integrate_composite_pair(0.0, 1.0, 4, |x| (x, x * x));
        assert_abs_diff_eq!(a, 0.5, epsilon = 1e-14);
        assert_abs_diff_eq!(b, 1.0 / 3.0, epsilon = 1e-14);
    }
}
