//! Symbolic differentiation.
//!
//! `diff` produces the derivative as a new expression, routed through the
//! same simplifying builders as user-built expressions, so constant factors
//! fold and vanishing terms drop out. The compiled evaluator uses this to
//! emit one Jacobian program per (constraint, variable) pair.

use super::{BinOp, Expr, NumOps, UnOp};
use crate::leaf::Var;

impl Expr {
    /// The symbolic partial derivative of this expression with respect to `v`.
    pub fn diff(&self, v: &Var) -> Expr {
        match self {
            Expr::Var(w) => Expr::Const(if w == v { 1.0 } else { 0.0 }),
            Expr::Param(_) | Expr::Const(_) => Expr::Const(0.0),
            Expr::Sum(s) => {
                let mut acc = Expr::Const(0.0);
                if let Some(row) = s.sparsity_of(v) {
                    for &i in row {
                        let t = &s.terms()[i];
                        acc = acc + t.coef * t.expr.diff(v);
                    }
                }
                acc
            }
            Expr::Binary(b) => {
                let (l, r) = (b.lhs.clone(), b.rhs.clone());
                match b.op {
                    BinOp::Mul => b.lhs.diff(v) * r + l * b.rhs.diff(v),
                    BinOp::Div => {
                        b.lhs.diff(v) / r.clone() - l * b.rhs.diff(v) / (r.clone() * r)
                    }
                    BinOp::Pow => match b.rhs.as_const() {
                        Some(p) => p * l.clone().pow(p - 1.0) * b.lhs.diff(v),
                        None => {
                            // d(a^b) = a^b (b' ln a + b a'/a)
                            l.clone().pow(r.clone())
                                * (b.rhs.diff(v) * l.clone().ln()
                                    + r * b.lhs.diff(v) / l)
                        }
                    },
                }
            }
            Expr::Unary(u) => {
                let a = u.arg.clone();
                let da = u.arg.diff(v);
                match u.op {
                    UnOp::Abs => a.sign() * da,
                    UnOp::Sign => Expr::Const(0.0),
                    UnOp::Exp => a.exp() * da,
                    UnOp::Ln => da / a,
                    UnOp::Sin => a.cos() * da,
                    UnOp::Cos => -(a.sin() * da),
                    UnOp::Tan => {
                        let c = a.cos();
                        da / (c.clone() * c)
                    }
                    UnOp::Asin => da / (1.0 - a.clone() * a).pow(0.5),
                    UnOp::Acos => -(da / (1.0 - a.clone() * a).pow(0.5)),
                    UnOp::Atan => da / (1.0 + a.clone() * a),
                }
            }
        }
    }
}
