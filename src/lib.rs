//! Algebraic modeling layer for constrained nonlinear optimization.
//!
//! Build symbolic expressions over decision [`Var`]s and [`Param`]s,
//! assemble them into an [`Objective`] and [`Constraint`]s on a [`Model`],
//! and differentiate them to first and second order with live Jacobian and
//! Hessian sparsity. A second operating mode compiles constraints into
//! stack-machine programs ([`rpn::Evaluator`]) that produce residuals and a
//! CSR Jacobian for an external Newton-type solver.
//!
//! The companion crate `wombat-optim` exposes a model through the NLP
//! callback contract of an interior-point solver and solves it.

pub mod component;
pub mod error;
pub mod expr;
pub mod leaf;
pub mod model;
pub mod rpn;

pub use component::{
    AnyConstraint, CompId, ConditionalConstraint, Constraint, Objective, CON_UNBOUNDED,
};
pub use error::StructureError;
pub use expr::{Expr, NumOps};
pub use leaf::{LeafId, Param, Var, UNBOUNDED};
pub use model::{HessEntry, Model};
