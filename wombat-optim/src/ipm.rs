//! Primal barrier interior-point solver.
//!
//! Inequality rows get slack variables bounded by the constraint range;
//! finite variable and slack bounds contribute logarithmic barrier terms.
//! Each iteration takes one Newton step on the equality-constrained
//! barrier problem
//!
//! ```text
//!   min  f(x) - mu * sum(ln(distance to each finite bound))
//!   s.t. g_E(x) = c_E,   g_I(x) - s = 0
//! ```
//!
//! with inertia regularization (a growing `delta * I` on the primal block
//! until the step is a descent direction for the merit function), a
//! fraction-to-boundary cap, backtracking on an l1 merit function, and a
//! monotone barrier reduction once the stage KKT error is small.

use tracing::{debug, info};

use crate::convergence::{dot, norm_inf, norm_one, ConvergenceParams};
use crate::line_search::{backtracking_armijo, ArmijoParams};
use crate::linalg::{lu_solve, DenseMatrix};
use crate::nlp::NlpProblem;
use crate::status::SolveStatus;

/// Bound magnitudes at or above this threshold are treated as infinite.
pub const BOUND_INF_THRESHOLD: f64 = 1.0e19;

/// Tuning knobs for the interior-point loop.
#[derive(Debug, Clone)]
pub struct IpmConfig {
    pub convergence: ConvergenceParams<f64>,
    pub line_search: ArmijoParams<f64>,
    /// Initial barrier parameter (default: 0.1).
    pub mu_init: f64,
    /// Fraction-to-boundary factor (default: 0.995).
    pub tau: f64,
    /// A barrier stage ends when the KKT error drops below
    /// `kappa_epsilon * mu` (default: 10).
    pub kappa_epsilon: f64,
    /// Relative push of the starting point off its bounds (default: 1e-2).
    pub bound_push: f64,
}

impl Default for IpmConfig {
    fn default() -> Self {
        IpmConfig {
            convergence: ConvergenceParams::default(),
            line_search: ArmijoParams::default(),
            mu_init: 0.1,
            tau: 0.995,
            kappa_epsilon: 10.0,
            bound_push: 1e-2,
        }
    }
}

fn finite_lb(b: f64) -> bool {
    b > -BOUND_INF_THRESHOLD
}

fn finite_ub(b: f64) -> bool {
    b < BOUND_INF_THRESHOLD
}

/// Push `v` strictly inside `[lb, ub]` by a relative margin.
fn interior(v: f64, lb: f64, ub: f64, push: f64) -> f64 {
    let lo = if finite_lb(lb) {
        lb + push * f64::max(1.0, lb.abs())
    } else {
        -f64::INFINITY
    };
    let hi = if finite_ub(ub) {
        ub - push * f64::max(1.0, ub.abs())
    } else {
        f64::INFINITY
    };
    if lo > hi {
        return 0.5 * (lb + ub);
    }
    v.clamp(lo, hi)
}

struct Workspace {
    n: usize,
    m: usize,
    /// Slack position per row; `usize::MAX` marks an equality row.
    slack_of: Vec<usize>,
    ns: usize,
    xl: Vec<f64>,
    xu: Vec<f64>,
    gl: Vec<f64>,
    gu: Vec<f64>,
    jrows: Vec<usize>,
    jcols: Vec<usize>,
    hrows: Vec<usize>,
    hcols: Vec<usize>,
}

impl Workspace {
    fn is_eq(&self, row: usize) -> bool {
        self.slack_of[row] == usize::MAX
    }

    fn barrier_active(&self) -> bool {
        let var_bounds = (0..self.n).any(|j| finite_lb(self.xl[j]) || finite_ub(self.xu[j]));
        let slack_bounds = (0..self.m).any(|i| {
            !self.is_eq(i) && (finite_lb(self.gl[i]) || finite_ub(self.gu[i]))
        });
        var_bounds || slack_bounds
    }

    /// Barrier objective at `(f, x, s)`; `None` outside the open domain.
    fn barrier_value(&self, f: f64, mu: f64, x: &[f64], s: &[f64]) -> Option<f64> {
        let mut phi = f;
        for j in 0..self.n {
            if finite_lb(self.xl[j]) {
                let d = x[j] - self.xl[j];
                if d <= 0.0 {
                    return None;
                }
                phi -= mu * d.ln();
            }
            if finite_ub(self.xu[j]) {
                let d = self.xu[j] - x[j];
                if d <= 0.0 {
                    return None;
                }
                phi -= mu * d.ln();
            }
        }
        for i in 0..self.m {
            let k = self.slack_of[i];
            if k == usize::MAX {
                continue;
            }
            if finite_lb(self.gl[i]) {
                let d = s[k] - self.gl[i];
                if d <= 0.0 {
                    return None;
                }
                phi -= mu * d.ln();
            }
            if finite_ub(self.gu[i]) {
                let d = self.gu[i] - s[k];
                if d <= 0.0 {
                    return None;
                }
                phi -= mu * d.ln();
            }
        }
        Some(phi)
    }

    /// Equality residuals `c`: `g_E - target` and `g_I - s`.
    fn residual(&self, g: &[f64], s: &[f64]) -> Vec<f64> {
        (0..self.m)
            .map(|i| {
                let k = self.slack_of[i];
                if k == usize::MAX {
                    g[i] - self.gl[i]
                } else {
                    g[i] - s[k]
                }
            })
            .collect()
    }

    /// Gradient of the barrier objective over `(x, s)`.
    fn barrier_gradient(&self, grad_f: &[f64], mu: f64, x: &[f64], s: &[f64]) -> Vec<f64> {
        let mut gphi = vec![0.0; self.n + self.ns];
        gphi[..self.n].copy_from_slice(grad_f);
        for j in 0..self.n {
            if finite_lb(self.xl[j]) {
                gphi[j] -= mu / (x[j] - self.xl[j]);
            }
            if finite_ub(self.xu[j]) {
                gphi[j] += mu / (self.xu[j] - x[j]);
            }
        }
        for i in 0..self.m {
            let k = self.slack_of[i];
            if k == usize::MAX {
                continue;
            }
            if finite_lb(self.gl[i]) {
                gphi[self.n + k] -= mu / (s[k] - self.gl[i]);
            }
            if finite_ub(self.gu[i]) {
                gphi[self.n + k] += mu / (self.gu[i] - s[k]);
            }
        }
        gphi
    }

    /// Largest step fraction keeping `(x, s)` strictly inside the bounds.
    fn fraction_to_boundary(
        &self,
        tau: f64,
        x: &[f64],
        s: &[f64],
        dx: &[f64],
        ds: &[f64],
    ) -> f64 {
        let mut alpha: f64 = 1.0;
        for j in 0..self.n {
            if dx[j] < 0.0 && finite_lb(self.xl[j]) {
                alpha = alpha.min(tau * (x[j] - self.xl[j]) / -dx[j]);
            }
            if dx[j] > 0.0 && finite_ub(self.xu[j]) {
                alpha = alpha.min(tau * (self.xu[j] - x[j]) / dx[j]);
            }
        }
        for i in 0..self.m {
            let k = self.slack_of[i];
            if k == usize::MAX {
                continue;
            }
            if ds[k] < 0.0 && finite_lb(self.gl[i]) {
                alpha = alpha.min(tau * (s[k] - self.gl[i]) / -ds[k]);
            }
            if ds[k] > 0.0 && finite_ub(self.gu[i]) {
                alpha = alpha.min(tau * (self.gu[i] - s[k]) / ds[k]);
            }
        }
        alpha
    }
}

fn has_nan(v: &[f64]) -> bool {
    v.iter().any(|x| !x.is_finite())
}

/// Run the interior-point loop on `problem` and finalize the solution.
pub fn solve_problem<P: NlpProblem>(problem: &mut P, config: &IpmConfig) -> SolveStatus {
    let status = run(problem, config);
    info!(status = %status, "solve finished");
    status
}

fn run<P: NlpProblem>(problem: &mut P, config: &IpmConfig) -> SolveStatus {
    let info = problem.nlp_info();
    let (n, m) = (info.num_vars, info.num_cons);

    let mut xl = vec![0.0; n];
    let mut xu = vec![0.0; n];
    let mut gl = vec![0.0; m];
    let mut gu = vec![0.0; m];
    if !problem.bounds(&mut xl, &mut xu, &mut gl, &mut gu) {
        return finalize(problem, SolveStatus::InternalError, &vec![0.0; n], &[], None, m);
    }

    // Slack layout: one slack per non-equality row.
    let mut slack_of = vec![usize::MAX; m];
    let mut ns = 0;
    for i in 0..m {
        if gl[i] != gu[i] {
            slack_of[i] = ns;
            ns += 1;
        }
    }

    let mut jrows = vec![0usize; info.nnz_jacobian];
    let mut jcols = vec![0usize; info.nnz_jacobian];
    let mut hrows = vec![0usize; info.nnz_hessian];
    let mut hcols = vec![0usize; info.nnz_hessian];
    if !problem.jacobian_indices(&mut jrows, &mut jcols)
        || !problem.hessian_indices(&mut hrows, &mut hcols)
    {
        return finalize(problem, SolveStatus::InternalError, &vec![0.0; n], &[], None, m);
    }

    let ws = Workspace {
        n,
        m,
        slack_of,
        ns,
        xl,
        xu,
        gl,
        gu,
        jrows,
        jcols,
        hrows,
        hcols,
    };

    let mut x = vec![0.0; n];
    let mut lambda = vec![0.0; m];
    problem.starting_point(Some(&mut x), None, Some(&mut lambda));
    for j in 0..n {
        x[j] = interior(x[j], ws.xl[j], ws.xu[j], config.bound_push);
    }

    // Slacks start at the constraint values, pushed into the range.
    let mut g = vec![0.0; m];
    if !problem.eval_g(&x, true, &mut g) || has_nan(&g) {
        return finalize(problem, SolveStatus::InvalidNumberDetected, &x, &lambda, None, m);
    }
    let mut s = vec![0.0; ns];
    for i in 0..m {
        let k = ws.slack_of[i];
        if k != usize::MAX {
            s[k] = interior(g[i], ws.gl[i], ws.gu[i], config.bound_push);
        }
    }

    let barrier_active = ws.barrier_active();
    let tol = config.convergence.tol;
    let mu_min = tol / 10.0;
    let mut mu = if barrier_active { config.mu_init } else { 0.0 };
    let mut nu = 1.0;

    let mut f = 0.0;
    let mut grad_f = vec![0.0; n];
    let mut jvals = vec![0.0; ws.jrows.len()];
    let mut hvals = vec![0.0; ws.hrows.len()];

    let mut status = SolveStatus::MaxIterExceeded;

    for iter in 0..config.convergence.max_iter {
        if norm_inf(&x) > config.convergence.diverging_threshold {
            status = SolveStatus::DivergingIterates;
            break;
        }

        let ok = problem.eval_f(&x, true, &mut f)
            && problem.eval_grad_f(&x, false, &mut grad_f)
            && problem.eval_g(&x, false, &mut g)
            && problem.eval_jac_g(&x, false, &mut jvals)
            && problem.eval_h(&x, false, 1.0, &lambda, true, &mut hvals);
        if !ok
            || !f.is_finite()
            || has_nan(&grad_f)
            || has_nan(&g)
            || has_nan(&jvals)
            || has_nan(&hvals)
        {
            status = SolveStatus::InvalidNumberDetected;
            break;
        }

        let c = ws.residual(&g, &s);
        let gphi = ws.barrier_gradient(&grad_f, mu, &x, &s);

        // Dual residual: grad(phi) + A^T lambda.
        let mut dual = gphi.clone();
        for k in 0..ws.jrows.len() {
            dual[ws.jcols[k]] += jvals[k] * lambda[ws.jrows[k]];
        }
        for i in 0..m {
            let k = ws.slack_of[i];
            if k != usize::MAX {
                dual[n + k] -= lambda[i];
            }
        }

        let err = f64::max(norm_inf(&dual), norm_inf(&c));
        debug!(iter, mu, err, f, "ipm iteration");

        if err <= tol && (!barrier_active || mu <= mu_min) {
            status = SolveStatus::Success;
            break;
        }

        // Stage converged: tighten the barrier and re-enter.
        if barrier_active && mu > mu_min && err <= config.kappa_epsilon * mu {
            mu = f64::max(mu_min, f64::min(0.2 * mu, mu.powf(1.5)));
            continue;
        }

        // Newton step on the barrier KKT system, regularizing the primal
        // block until the direction is usable.
        let dim = n + ns + m;
        let mut delta = 0.0;
        let mut step: Option<(Vec<f64>, Vec<f64>, f64)> = None;
        loop {
            let mut kkt = DenseMatrix::zeros(dim);
            for k in 0..ws.hrows.len() {
                let (r, cidx) = (ws.hrows[k], ws.hcols[k]);
                kkt.add_to(r, cidx, hvals[k]);
                if r != cidx {
                    kkt.add_to(cidx, r, hvals[k]);
                }
            }
            for j in 0..n {
                let mut d = delta;
                if finite_lb(ws.xl[j]) {
                    let t = x[j] - ws.xl[j];
                    d += mu / (t * t);
                }
                if finite_ub(ws.xu[j]) {
                    let t = ws.xu[j] - x[j];
                    d += mu / (t * t);
                }
                kkt.add_to(j, j, d);
            }
            for i in 0..m {
                let k = ws.slack_of[i];
                if k == usize::MAX {
                    continue;
                }
                let mut d = delta;
                if finite_lb(ws.gl[i]) {
                    let t = s[k] - ws.gl[i];
                    d += mu / (t * t);
                }
                if finite_ub(ws.gu[i]) {
                    let t = ws.gu[i] - s[k];
                    d += mu / (t * t);
                }
                kkt.add_to(n + k, n + k, d);
            }
            for k in 0..ws.jrows.len() {
                let (i, j) = (ws.jrows[k], ws.jcols[k]);
                kkt.add_to(n + ns + i, j, jvals[k]);
                kkt.add_to(j, n + ns + i, jvals[k]);
            }
            for i in 0..m {
                let k = ws.slack_of[i];
                if k != usize::MAX {
                    kkt.add_to(n + ns + i, n + k, -1.0);
                    kkt.add_to(n + k, n + ns + i, -1.0);
                }
            }

            let mut rhs = vec![0.0; dim];
            for j in 0..n + ns {
                rhs[j] = -gphi[j];
            }
            for i in 0..m {
                rhs[n + ns + i] = -c[i];
            }

            if let Some(sol) = lu_solve(&kkt, &rhs) {
                let d_primal = sol[..n + ns].to_vec();
                let lambda_plus = sol[n + ns..].to_vec();
                let slope = dot(&gphi, &d_primal);
                let infeas = norm_one(&c);
                if infeas > 1e-12 || slope < 0.0 {
                    step = Some((d_primal, lambda_plus, slope));
                    break;
                }
            }
            delta = if delta == 0.0 { 1e-8 } else { delta * 10.0 };
            if delta > 1e10 {
                break;
            }
        }

        let Some((d_primal, lambda_plus, slope)) = step else {
            status = SolveStatus::ErrorInStepComputation;
            break;
        };

        let infeas = norm_one(&c);
        if infeas > 1e-12 && slope > 0.0 {
            // Merit penalty large enough that the step is a descent
            // direction of the l1 merit function.
            nu = f64::max(nu, 2.0 * slope / infeas + 1.0);
        }
        let d_merit = slope - nu * infeas;

        let dx = &d_primal[..n];
        let ds = &d_primal[n..];
        let alpha_max = ws.fraction_to_boundary(config.tau, &x, &s, dx, ds);

        let merit0 = match ws.barrier_value(f, mu, &x, &s) {
            Some(phi0) => phi0 + nu * infeas,
            None => {
                status = SolveStatus::InternalError;
                break;
            }
        };

        let ls = backtracking_armijo(
            merit0,
            d_merit,
            alpha_max,
            |alpha| {
                let xt: Vec<f64> = (0..n).map(|j| x[j] + alpha * dx[j]).collect();
                let st: Vec<f64> = (0..ns).map(|k| s[k] + alpha * ds[k]).collect();
                let mut ft = 0.0;
                let mut gt = vec![0.0; m];
                if !problem.eval_f(&xt, true, &mut ft) || !problem.eval_g(&xt, false, &mut gt)
                {
                    return None;
                }
                if !ft.is_finite() || has_nan(&gt) {
                    return None;
                }
                let phi = ws.barrier_value(ft, mu, &xt, &st)?;
                Some(phi + nu * norm_one(&ws.residual(&gt, &st)))
            },
            &config.line_search,
        );

        let Some(ls) = ls else {
            if barrier_active && mu > mu_min {
                mu = f64::max(mu_min, 0.2 * mu);
                continue;
            }
            status = SolveStatus::StopAtTinyStep;
            break;
        };

        let alpha = ls.alpha;
        for j in 0..n {
            x[j] += alpha * dx[j];
        }
        for k in 0..ns {
            s[k] += alpha * ds[k];
        }
        for i in 0..m {
            lambda[i] += alpha * (lambda_plus[i] - lambda[i]);
        }

        debug!(iter, alpha, step_norm = norm_inf(&d_primal), "accepted step");

        if alpha * norm_inf(&d_primal) < config.convergence.step_tol {
            status = SolveStatus::StopAtTinyStep;
            break;
        }
    }

    finalize(problem, status, &x, &lambda, Some((&ws, mu, &s)), m)
}

/// Write the final point back through the contract.
fn finalize<P: NlpProblem>(
    problem: &mut P,
    status: SolveStatus,
    x: &[f64],
    lambda: &[f64],
    bounds_ctx: Option<(&Workspace, f64, &[f64])>,
    m: usize,
) -> SolveStatus {
    let n = x.len();
    let mut z_l = vec![0.0; n];
    let mut z_u = vec![0.0; n];
    if let Some((ws, mu, _s)) = bounds_ctx {
        for j in 0..n {
            if finite_lb(ws.xl[j]) {
                z_l[j] = mu / (x[j] - ws.xl[j]);
            }
            if finite_ub(ws.xu[j]) {
                z_u[j] = mu / (ws.xu[j] - x[j]);
            }
        }
    }
    let mut g = vec![0.0; m];
    let mut f = 0.0;
    let _ = problem.eval_f(x, true, &mut f);
    let _ = problem.eval_g(x, false, &mut g);
    let lambda_full;
    let lambda = if lambda.len() == m {
        lambda
    } else {
        lambda_full = vec![0.0; m];
        &lambda_full
    };
    problem.finalize_solution(status, x, &z_l, &z_u, &g, lambda, f);
    status
}
