//! The solver against a hand-written callback implementation, without the
//! modeling layer in between.

use wombat_optim::nlp::{IndexStyle, NlpInfo, NlpProblem};
use wombat_optim::{solve_problem, IpmConfig, SolveStatus};

/// minimize (x0 - 1)^2 + (x1 + 2)^2  subject to  x1 >= 0
struct ShiftedQuadratic {
    solution: Vec<f64>,
    status: Option<SolveStatus>,
}

impl NlpProblem for ShiftedQuadratic {
    fn nlp_info(&self) -> NlpInfo {
        NlpInfo {
            num_vars: 2,
            num_cons: 0,
            nnz_jacobian: 0,
            nnz_hessian: 2,
            index_style: IndexStyle::ZeroBased,
        }
    }

    fn bounds(
        &self,
        x_l: &mut [f64],
        x_u: &mut [f64],
        _g_l: &mut [f64],
        _g_u: &mut [f64],
    ) -> bool {
        x_l.copy_from_slice(&[-1.0e20, 0.0]);
        x_u.copy_from_slice(&[1.0e20, 1.0e20]);
        true
    }

    fn starting_point(
        &self,
        x: Option<&mut [f64]>,
        _z: Option<(&mut [f64], &mut [f64])>,
        _lambda: Option<&mut [f64]>,
    ) -> bool {
        if let Some(x) = x {
            x.copy_from_slice(&[5.0, 5.0]);
        }
        true
    }

    fn eval_f(&self, x: &[f64], _new_x: bool, obj: &mut f64) -> bool {
        *obj = (x[0] - 1.0).powi(2) + (x[1] + 2.0).powi(2);
        true
    }

    fn eval_g(&self, _x: &[f64], _new_x: bool, _g: &mut [f64]) -> bool {
        true
    }

    fn eval_grad_f(&self, x: &[f64], _new_x: bool, grad: &mut [f64]) -> bool {
        grad[0] = 2.0 * (x[0] - 1.0);
        grad[1] = 2.0 * (x[1] + 2.0);
        true
    }

    fn jacobian_indices(&self, _rows: &mut [usize], _cols: &mut [usize]) -> bool {
        true
    }

    fn eval_jac_g(&self, _x: &[f64], _new_x: bool, _values: &mut [f64]) -> bool {
        true
    }

    fn hessian_indices(&self, rows: &mut [usize], cols: &mut [usize]) -> bool {
        rows.copy_from_slice(&[0, 1]);
        cols.copy_from_slice(&[0, 1]);
        true
    }

    fn eval_h(
        &self,
        _x: &[f64],
        _new_x: bool,
        obj_factor: f64,
        _lambda: &[f64],
        _new_lambda: bool,
        values: &mut [f64],
    ) -> bool {
        values[0] = 2.0 * obj_factor;
        values[1] = 2.0 * obj_factor;
        true
    }

    fn finalize_solution(
        &mut self,
        status: SolveStatus,
        x: &[f64],
        _z_l: &[f64],
        _z_u: &[f64],
        _g: &[f64],
        _lambda: &[f64],
        _obj_value: f64,
    ) {
        self.solution = x.to_vec();
        self.status = Some(status);
    }
}

#[test]
fn bound_clips_the_unconstrained_minimizer() {
    let mut problem = ShiftedQuadratic {
        solution: Vec::new(),
        status: None,
    };
    let status = solve_problem(&mut problem, &IpmConfig::default());
    assert_eq!(status, SolveStatus::Success);
    assert_eq!(problem.status, Some(SolveStatus::Success));
    // x0 is free, x1 stops at its lower bound.
    assert!((problem.solution[0] - 1.0).abs() < 1e-6);
    assert!(problem.solution[1].abs() < 1e-6, "x1 = {}", problem.solution[1]);
}
