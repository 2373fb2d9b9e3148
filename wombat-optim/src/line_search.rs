//! Backtracking line search on the merit function.

use num_traits::Float;

/// Parameters for the backtracking Armijo search.
#[derive(Debug, Clone)]
pub struct ArmijoParams<F> {
    /// Sufficient decrease parameter (default: 1e-4).
    pub c: F,
    /// Backtracking factor (default: 0.5).
    pub rho: F,
    /// Minimum step size before declaring failure (default: 1e-12).
    pub alpha_min: F,
}

impl Default for ArmijoParams<f64> {
    fn default() -> Self {
        ArmijoParams {
            c: 1e-4,
            rho: 0.5,
            alpha_min: 1e-12,
        }
    }
}

/// Accepted step.
#[derive(Debug)]
pub struct LineSearchResult<F> {
    pub alpha: F,
    /// Merit value at the accepted point.
    pub merit: F,
    /// Number of merit evaluations used.
    pub evals: usize,
}

/// Backtrack from `alpha_max` until the Armijo condition
/// `merit(alpha) <= merit0 + c * alpha * slope` holds.
///
/// `merit` returns the merit value at a trial step, or `None` when the
/// trial point cannot be evaluated (the trial is then rejected like an
/// insufficient decrease). `slope` must be negative; a descent direction
/// is the caller's responsibility. Returns `None` once alpha falls below
/// `alpha_min`.
pub fn backtracking_armijo<F: Float>(
    merit0: F,
    slope: F,
    alpha_max: F,
    mut merit: impl FnMut(F) -> Option<F>,
    params: &ArmijoParams<F>,
) -> Option<LineSearchResult<F>> {
    debug_assert!(slope < F::zero(), "line search needs a descent direction");
    let mut alpha = alpha_max;
    let mut evals = 0;
    loop {
        if alpha < params.alpha_min {
            return None;
        }
        if let Some(m) = merit(alpha) {
            evals += 1;
            if m <= merit0 + params.c * alpha * slope {
                return Some(LineSearchResult {
                    alpha,
                    merit: m,
                    evals,
                });
            }
        } else {
            evals += 1;
        }
        alpha = alpha * params.rho;
    }
}
