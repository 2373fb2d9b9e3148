//! The callback contract between a model and the NLP solver.
//!
//! This is the safe-Rust form of the classic interior-point callback
//! interface: sizes and sparsity counts up front, bounds and a starting
//! point, then value/gradient/Jacobian/Hessian evaluations during the
//! iteration, and a finalization call that hands the solution back.
//! Pattern and value queries for the Jacobian and Hessian are split into
//! separate methods (the raw interface distinguishes them by a null values
//! pointer); both must emit the same entry sequence.
//!
//! Every evaluation callback returns `bool`: `false` signals that the
//! problem cannot be evaluated at the requested point.

use crate::status::SolveStatus;

/// Index base for sparsity patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexStyle {
    /// C-style, 0-based indices.
    #[default]
    ZeroBased,
    /// Fortran-style, 1-based indices.
    OneBased,
}

/// Problem sizes declared once before the solve.
#[derive(Debug, Clone, Copy)]
pub struct NlpInfo {
    /// Number of decision variables.
    pub num_vars: usize,
    /// Number of constraint rows.
    pub num_cons: usize,
    /// Non-zeros of the constraint Jacobian.
    pub nnz_jacobian: usize,
    /// Non-zeros of the Lagrangian Hessian (lower triangle).
    pub nnz_hessian: usize,
    pub index_style: IndexStyle,
}

/// A nonlinear program of the form
/// `min f(x)  s.t.  g_l <= g(x) <= g_u,  x_l <= x <= x_u`.
///
/// When `new_x` is true the point changed since the previous callback and
/// any cached evaluations must be refreshed; when false, the values from
/// the preceding evaluation are still current.
pub trait NlpProblem {
    fn nlp_info(&self) -> NlpInfo;

    /// Fill variable and constraint bounds. Magnitudes of `1e20` and above
    /// are unbounded sentinels and pass through unchanged.
    fn bounds(
        &self,
        x_l: &mut [f64],
        x_u: &mut [f64],
        g_l: &mut [f64],
        g_u: &mut [f64],
    ) -> bool;

    /// Fill the requested parts of the starting point: primal values,
    /// bound multipliers, and constraint multipliers.
    fn starting_point(
        &self,
        x: Option<&mut [f64]>,
        z: Option<(&mut [f64], &mut [f64])>,
        lambda: Option<&mut [f64]>,
    ) -> bool;

    /// Objective value.
    fn eval_f(&self, x: &[f64], new_x: bool, obj: &mut f64) -> bool;

    /// Constraint values, one per row.
    fn eval_g(&self, x: &[f64], new_x: bool, g: &mut [f64]) -> bool;

    /// Objective gradient, dense over all variables.
    fn eval_grad_f(&self, x: &[f64], new_x: bool, grad: &mut [f64]) -> bool;

    /// Jacobian pattern: `(row, col)` per non-zero, in emission order.
    fn jacobian_indices(&self, rows: &mut [usize], cols: &mut [usize]) -> bool;

    /// Jacobian values in exactly the pattern's order.
    fn eval_jac_g(&self, x: &[f64], new_x: bool, values: &mut [f64]) -> bool;

    /// Hessian pattern, lower triangle, in emission order.
    fn hessian_indices(&self, rows: &mut [usize], cols: &mut [usize]) -> bool;

    /// Lagrangian Hessian values in the pattern's order:
    /// `obj_factor * ∇²f + Σ lambda_i ∇²g_i`. `new_lambda` signals that
    /// the multipliers changed since the last Hessian evaluation.
    #[allow(clippy::too_many_arguments)]
    fn eval_h(
        &self,
        x: &[f64],
        new_x: bool,
        obj_factor: f64,
        lambda: &[f64],
        new_lambda: bool,
        values: &mut [f64],
    ) -> bool;

    /// Receive the final point: primals, bound duals, constraint values,
    /// constraint duals, and the named status.
    #[allow(clippy::too_many_arguments)]
    fn finalize_solution(
        &mut self,
        status: SolveStatus,
        x: &[f64],
        z_l: &[f64],
        z_u: &[f64],
        g: &[f64],
        lambda: &[f64],
        obj_value: f64,
    );
}
