//! Interior-point solver and NLP callback contract for the `wombat`
//! modeling layer.
//!
//! [`solve`] takes a [`wombat::Model`], exposes it through the
//! [`NlpProblem`] callback contract, runs the primal barrier
//! interior-point method, and writes primals, duals, and the named
//! [`SolveStatus`] back into the model.

pub mod adapter;
pub mod convergence;
pub mod ipm;
pub mod line_search;
pub mod linalg;
pub mod nlp;
pub mod status;

pub use adapter::{solve, solve_with, ModelProblem};
pub use convergence::ConvergenceParams;
pub use ipm::{solve_problem, IpmConfig};
pub use line_search::ArmijoParams;
pub use nlp::{IndexStyle, NlpInfo, NlpProblem};
pub use status::SolveStatus;
