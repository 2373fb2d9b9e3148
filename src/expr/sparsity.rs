//! Boolean shadows of the derivative recursions.
//!
//! `has_ad` and `has_ad2` mirror the numeric formulas with OR for addition
//! and AND for multiplication. They are purely structural: no leaf value
//! is read, which is what lets the model enumerate the Hessian non-zero
//! pattern without picking an evaluation point.

use std::collections::BTreeMap;

use super::{BinOp, Expr, UnOp};
use crate::leaf::{LeafId, Var};

impl Expr {
    /// Whether the first partial with respect to `v` can be non-zero.
    pub fn has_ad(&self, v: &Var) -> bool {
        match self {
            Expr::Var(w) => w == v,
            Expr::Param(_) | Expr::Const(_) => false,
            Expr::Sum(s) => s.depends_on(v),
            Expr::Binary(b) => b.lhs.has_ad(v) || b.rhs.has_ad(v),
            Expr::Unary(u) => match u.op {
                // The sign function is piecewise constant.
                UnOp::Sign => false,
                _ => u.arg.has_ad(v),
            },
        }
    }

    /// Whether the second partial with respect to `(v1, v2)` can be
    /// non-zero. Mirrors the term structure of the `ad2` formulas.
    pub fn has_ad2(&self, v1: &Var, v2: &Var) -> bool {
        match self {
            Expr::Var(_) | Expr::Param(_) | Expr::Const(_) => false,
            Expr::Sum(s) => s.terms().iter().any(|t| t.expr.has_ad2(v1, v2)),
            Expr::Binary(b) => {
                let (l, r) = (&b.lhs, &b.rhs);
                match b.op {
                    BinOp::Mul => {
                        l.has_ad2(v1, v2)
                            || r.has_ad2(v1, v2)
                            || (l.has_ad(v1) && r.has_ad(v2))
                            || (l.has_ad(v2) && r.has_ad(v1))
                    }
                    BinOp::Div => {
                        // a_xy/b, (a_x b_y + a_y b_x + a b_xy)/b², a b_x b_y/b³
                        l.has_ad2(v1, v2)
                            || r.has_ad2(v1, v2)
                            || (l.has_ad(v1) && r.has_ad(v2))
                            || (l.has_ad(v2) && r.has_ad(v1))
                            || (r.has_ad(v1) && r.has_ad(v2))
                    }
                    BinOp::Pow => {
                        // Exponents 0 and 1 fold at build time, so a power
                        // node is always nonlinear in its base.
                        let h1 = l.has_ad(v1) || r.has_ad(v1);
                        let h2 = l.has_ad(v2) || r.has_ad(v2);
                        l.has_ad2(v1, v2) || r.has_ad2(v1, v2) || (h1 && h2)
                    }
                }
            }
            Expr::Unary(u) => match u.op {
                UnOp::Sign => false,
                // |a| is linear in a away from the kink.
                UnOp::Abs => u.arg.has_ad2(v1, v2),
                _ => {
                    u.arg.has_ad2(v1, v2) || (u.arg.has_ad(v1) && u.arg.has_ad(v2))
                }
            },
        }
    }

    /// The distinct variables in this expression, in creation order.
    pub fn vars(&self) -> Vec<Var> {
        let mut set = BTreeMap::new();
        self.collect_vars(&mut set);
        set.into_values().collect()
    }

    pub(crate) fn collect_vars(&self, into: &mut BTreeMap<LeafId, Var>) {
        match self {
            Expr::Var(v) => {
                into.entry(v.id()).or_insert_with(|| v.clone());
            }
            Expr::Param(_) | Expr::Const(_) => {}
            Expr::Sum(s) => {
                for v in s.sparse_vars() {
                    into.entry(v.id()).or_insert_with(|| v.clone());
                }
            }
            Expr::Binary(b) => {
                b.lhs.collect_vars(into);
                b.rhs.collect_vars(into);
            }
            Expr::Unary(u) => u.arg.collect_vars(into),
        }
    }
}
