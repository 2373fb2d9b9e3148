//! Tolerances and small vector helpers shared by the solver loop.

use num_traits::Float;

/// Parameters controlling termination of the interior-point loop.
#[derive(Debug, Clone)]
pub struct ConvergenceParams<F> {
    /// Maximum number of Newton iterations across all barrier stages
    /// (default: 300).
    pub max_iter: usize,
    /// KKT error tolerance for declaring optimality (default: 1e-8).
    pub tol: F,
    /// Step norm below which the solve stops at a tiny step
    /// (default: 1e-14).
    pub step_tol: F,
    /// Iterate magnitude treated as divergence (default: 1e19).
    pub diverging_threshold: F,
}

impl Default for ConvergenceParams<f64> {
    fn default() -> Self {
        ConvergenceParams {
            max_iter: 300,
            tol: 1e-8,
            step_tol: 1e-14,
            diverging_threshold: 1e19,
        }
    }
}

/// Max-norm of a vector.
pub fn norm_inf<F: Float>(v: &[F]) -> F {
    v.iter().fold(F::zero(), |a, &x| a.max(x.abs()))
}

/// One-norm of a vector.
pub fn norm_one<F: Float>(v: &[F]) -> F {
    v.iter().fold(F::zero(), |a, &x| a + x.abs())
}

/// Dot product.
pub fn dot<F: Float>(a: &[F], b: &[F]) -> F {
    debug_assert_eq!(a.len(), b.len());
    let mut s = F::zero();
    for i in 0..a.len() {
        s = s + a[i] * b[i];
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn norms() {
        let v = [3.0, -4.0, 1.0];
        assert_eq!(norm_inf(&v), 4.0);
        assert_eq!(norm_one(&v), 8.0);
        assert_eq!(dot(&v, &v), 26.0);
    }
}
