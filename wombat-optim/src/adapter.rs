//! Adapter exposing a [`wombat::Model`] through the NLP callback contract.
//!
//! On `new_x` the solver's iterate is copied into every variable and the
//! objective and all constraints are re-evaluated, so cached component
//! values are current before any derivative query. Jacobian pattern and
//! value callbacks walk constraints in row order and each constraint's
//! variables in index order; the Hessian walks the model's map in key
//! order. Pattern and value sequences are identical by construction.

use tracing::warn;

use wombat::Model;

use crate::ipm::{solve_problem, IpmConfig};
use crate::nlp::{IndexStyle, NlpInfo, NlpProblem};
use crate::status::SolveStatus;

/// Borrows a model for the duration of a solve.
pub struct ModelProblem<'a> {
    model: &'a mut Model,
}

impl<'a> ModelProblem<'a> {
    pub fn new(model: &'a mut Model) -> Self {
        ModelProblem { model }
    }

    fn refresh(&self, x: &[f64]) {
        for v in self.model.vars() {
            v.set_value(x[v.index()]);
        }
        if let Some(obj) = self.model.objective() {
            obj.evaluate();
        }
        for c in self.model.constraints() {
            c.evaluate();
        }
    }
}

impl NlpProblem for ModelProblem<'_> {
    fn nlp_info(&self) -> NlpInfo {
        NlpInfo {
            num_vars: self.model.num_vars(),
            num_cons: self.model.num_constraints(),
            nnz_jacobian: self.model.jacobian_nnz(),
            nnz_hessian: self.model.hessian_nnz(),
            index_style: IndexStyle::ZeroBased,
        }
    }

    fn bounds(
        &self,
        x_l: &mut [f64],
        x_u: &mut [f64],
        g_l: &mut [f64],
        g_u: &mut [f64],
    ) -> bool {
        for (i, v) in self.model.vars().iter().enumerate() {
            x_l[i] = v.lb();
            x_u[i] = v.ub();
        }
        for (i, c) in self.model.constraints().iter().enumerate() {
            g_l[i] = c.lb();
            g_u[i] = c.ub();
        }
        true
    }

    fn starting_point(
        &self,
        x: Option<&mut [f64]>,
        z: Option<(&mut [f64], &mut [f64])>,
        lambda: Option<&mut [f64]>,
    ) -> bool {
        if let Some(x) = x {
            for (i, v) in self.model.vars().iter().enumerate() {
                x[i] = v.value();
            }
        }
        if let Some((z_l, z_u)) = z {
            for (i, v) in self.model.vars().iter().enumerate() {
                z_l[i] = v.lb_dual();
                z_u[i] = v.ub_dual();
            }
        }
        if let Some(lambda) = lambda {
            for (i, c) in self.model.constraints().iter().enumerate() {
                lambda[i] = c.dual();
            }
        }
        true
    }

    fn eval_f(&self, x: &[f64], new_x: bool, obj: &mut f64) -> bool {
        if new_x {
            self.refresh(x);
        }
        *obj = self.model.objective().map_or(0.0, |o| o.value());
        true
    }

    fn eval_g(&self, x: &[f64], new_x: bool, g: &mut [f64]) -> bool {
        if new_x {
            self.refresh(x);
        }
        for (i, c) in self.model.constraints().iter().enumerate() {
            g[i] = c.value();
        }
        true
    }

    fn eval_grad_f(&self, x: &[f64], new_x: bool, grad: &mut [f64]) -> bool {
        if new_x {
            self.refresh(x);
        }
        grad.fill(0.0);
        if let Some(obj) = self.model.objective() {
            for v in obj.vars() {
                grad[v.index()] = obj.ad(&v, false);
            }
        }
        true
    }

    fn jacobian_indices(&self, rows: &mut [usize], cols: &mut [usize]) -> bool {
        let mut k = 0;
        for c in self.model.constraints() {
            for v in c.vars() {
                rows[k] = c.index();
                cols[k] = v.index();
                k += 1;
            }
        }
        k == rows.len()
    }

    fn eval_jac_g(&self, x: &[f64], new_x: bool, values: &mut [f64]) -> bool {
        if new_x {
            self.refresh(x);
        }
        let mut k = 0;
        for c in self.model.constraints() {
            for v in c.vars() {
                values[k] = c.ad(&v, false);
                k += 1;
            }
        }
        k == values.len()
    }

    fn hessian_indices(&self, rows: &mut [usize], cols: &mut [usize]) -> bool {
        for (k, (&(r, c), _)) in self.model.hessian_entries().enumerate() {
            rows[k] = r;
            cols[k] = c;
        }
        true
    }

    fn eval_h(
        &self,
        x: &[f64],
        new_x: bool,
        obj_factor: f64,
        lambda: &[f64],
        new_lambda: bool,
        values: &mut [f64],
    ) -> bool {
        if new_x {
            self.refresh(x);
        }
        if new_lambda {
            for c in self.model.constraints() {
                c.set_dual(lambda[c.index()]);
            }
        }
        let vars = self.model.vars();
        for (k, (&(r, c), entry)) in self.model.hessian_entries().enumerate() {
            let (v1, v2) = (&vars[r], &vars[c]);
            let mut acc = 0.0;
            if let Some(obj) = self.model.objective() {
                if entry.obj.contains(&obj.id()) {
                    acc += obj_factor * obj.ad2(v1, v2, false);
                }
            }
            for cid in &entry.cons {
                match self.model.constraint_by_id(*cid) {
                    Some(con) => {
                        acc += lambda[con.index()] * con.ad2(v1, v2, false);
                    }
                    None => return false,
                }
            }
            values[k] = acc;
        }
        true
    }

    fn finalize_solution(
        &mut self,
        status: SolveStatus,
        x: &[f64],
        z_l: &[f64],
        z_u: &[f64],
        _g: &[f64],
        lambda: &[f64],
        _obj_value: f64,
    ) {
        if !status.is_success() {
            warn!(status = %status, "solver finished without an optimal point");
        }
        for v in self.model.vars() {
            v.set_value(x[v.index()]);
            v.set_lb_dual(z_l[v.index()]);
            v.set_ub_dual(z_u[v.index()]);
        }
        for c in self.model.constraints() {
            c.set_dual(lambda[c.index()]);
        }
        self.model.solver_status = Some(status.to_string());
    }
}

/// Solve a model with default settings. Writes the solution and status
/// back into the model and returns the status.
pub fn solve(model: &mut Model) -> SolveStatus {
    solve_with(model, &IpmConfig::default())
}

/// Solve a model with explicit solver settings.
pub fn solve_with(model: &mut Model, config: &IpmConfig) -> SolveStatus {
    let mut problem = ModelProblem::new(model);
    solve_problem(&mut problem, config)
}
