//! Forward evaluation and forward-accumulation derivatives.
//!
//! Derivatives come back as tuples: `(f, f_x)` from [`Expr::value_deriv`]
//! and `(f, f_x, f_y, f_xy)` from [`Expr::value_deriv2`], so a single
//! recursion produces the value together with the partials it needs.
//! Operands that are structurally constant (a `Const` or a `Param`) take
//! collapsed match arms: their partials are known to be zero, so the
//! product/quotient/power rules shrink to their cheap forms.

use super::{BinOp, Expr, SumNode, UnOp};
use crate::leaf::Var;

/// Structurally constant factor: a folded constant or a parameter value.
fn const_factor(e: &Expr) -> Option<f64> {
    match e {
        Expr::Const(c) => Some(*c),
        Expr::Param(p) => Some(p.value()),
        _ => None,
    }
}

fn sign_of(v: f64) -> f64 {
    if v >= 0.0 {
        1.0
    } else {
        -1.0
    }
}

impl Expr {
    /// Forward pass: the value of this expression at the current leaf values.
    pub fn evaluate(&self) -> f64 {
        match self {
            Expr::Var(v) => v.value(),
            Expr::Param(p) => p.value(),
            Expr::Const(c) => *c,
            Expr::Sum(s) => {
                let mut acc = s.constant();
                for t in s.terms() {
                    acc += t.coef * t.expr.evaluate();
                }
                acc
            }
            Expr::Binary(b) => {
                let lv = b.lhs.evaluate();
                let rv = b.rhs.evaluate();
                match b.op {
                    BinOp::Mul => lv * rv,
                    BinOp::Div => lv / rv,
                    BinOp::Pow => lv.powf(rv),
                }
            }
            Expr::Unary(u) => {
                let a = u.arg.evaluate();
                match u.op {
                    UnOp::Abs => a.abs(),
                    UnOp::Sign => sign_of(a),
                    UnOp::Exp => a.exp(),
                    UnOp::Ln => a.ln(),
                    UnOp::Sin => a.sin(),
                    UnOp::Cos => a.cos(),
                    UnOp::Tan => a.tan(),
                    UnOp::Asin => a.asin(),
                    UnOp::Acos => a.acos(),
                    UnOp::Atan => a.atan(),
                }
            }
        }
    }

    /// First partial with respect to `v`.
    pub fn ad(&self, v: &Var) -> f64 {
        self.value_deriv(v).1
    }

    /// Second partial with respect to the pair `(v1, v2)`.
    pub fn ad2(&self, v1: &Var, v2: &Var) -> f64 {
        self.value_deriv2(v1, v2).3
    }

    /// `(f, ∂f/∂v)` in one recursion.
    pub(crate) fn value_deriv(&self, v: &Var) -> (f64, f64) {
        match self {
            Expr::Var(w) => (w.value(), if w == v { 1.0 } else { 0.0 }),
            Expr::Param(p) => (p.value(), 0.0),
            Expr::Const(c) => (*c, 0.0),
            Expr::Sum(s) => sum_deriv(s, v),
            Expr::Binary(b) => match b.op {
                BinOp::Mul => {
                    if let Some(c) = const_factor(&b.lhs) {
                        let (rv, rd) = b.rhs.value_deriv(v);
                        (c * rv, c * rd)
                    } else if let Some(c) = const_factor(&b.rhs) {
                        let (lv, ld) = b.lhs.value_deriv(v);
                        (lv * c, ld * c)
                    } else {
                        let (lv, ld) = b.lhs.value_deriv(v);
                        let (rv, rd) = b.rhs.value_deriv(v);
                        (lv * rv, lv * rd + rv * ld)
                    }
                }
                BinOp::Div => {
                    if let Some(c) = const_factor(&b.rhs) {
                        let (lv, ld) = b.lhs.value_deriv(v);
                        (lv / c, ld / c)
                    } else if let Some(c) = const_factor(&b.lhs) {
                        let (rv, rd) = b.rhs.value_deriv(v);
                        let f = c / rv;
                        (f, -c * rd / (rv * rv))
                    } else {
                        let (lv, ld) = b.lhs.value_deriv(v);
                        let (rv, rd) = b.rhs.value_deriv(v);
                        (lv / rv, ld / rv - lv * rd / (rv * rv))
                    }
                }
                BinOp::Pow => {
                    if let Some(p) = const_factor(&b.rhs) {
                        let (lv, ld) = b.lhs.value_deriv(v);
                        (lv.powf(p), p * lv.powf(p - 1.0) * ld)
                    } else {
                        let (lv, ld) = b.lhs.value_deriv(v);
                        let (rv, rd) = b.rhs.value_deriv(v);
                        let f = lv.powf(rv);
                        // ln(base) only enters when the exponent moves
                        let ln_l = if rd == 0.0 { 0.0 } else { lv.ln() };
                        (f, f * (rd * ln_l + rv * ld / lv))
                    }
                }
            },
            Expr::Unary(u) => {
                let (a, ad) = u.arg.value_deriv(v);
                match u.op {
                    UnOp::Abs => (a.abs(), sign_of(a) * ad),
                    UnOp::Sign => (sign_of(a), 0.0),
                    UnOp::Exp => {
                        let f = a.exp();
                        (f, f * ad)
                    }
                    UnOp::Ln => (a.ln(), ad / a),
                    UnOp::Sin => (a.sin(), a.cos() * ad),
                    UnOp::Cos => (a.cos(), -a.sin() * ad),
                    UnOp::Tan => {
                        let c = a.cos();
                        (a.tan(), ad / (c * c))
                    }
                    UnOp::Asin => (a.asin(), ad / (1.0 - a * a).sqrt()),
                    UnOp::Acos => (a.acos(), -ad / (1.0 - a * a).sqrt()),
                    UnOp::Atan => (a.atan(), ad / (1.0 + a * a)),
                }
            }
        }
    }

    /// `(f, ∂f/∂v1, ∂f/∂v2, ∂²f/∂v1∂v2)` in one recursion.
    pub(crate) fn value_deriv2(&self, v1: &Var, v2: &Var) -> (f64, f64, f64, f64) {
        match self {
            Expr::Var(w) => (
                w.value(),
                if w == v1 { 1.0 } else { 0.0 },
                if w == v2 { 1.0 } else { 0.0 },
                0.0,
            ),
            Expr::Param(p) => (p.value(), 0.0, 0.0, 0.0),
            Expr::Const(c) => (*c, 0.0, 0.0, 0.0),
            Expr::Sum(s) => sum_deriv2(s, v1, v2),
            Expr::Binary(b) => match b.op {
                BinOp::Mul => {
                    if let Some(c) = const_factor(&b.lhs) {
                        let (rv, rx, ry, rxy) = b.rhs.value_deriv2(v1, v2);
                        (c * rv, c * rx, c * ry, c * rxy)
                    } else if let Some(c) = const_factor(&b.rhs) {
                        let (lv, lx, ly, lxy) = b.lhs.value_deriv2(v1, v2);
                        (lv * c, lx * c, ly * c, lxy * c)
                    } else {
                        let (lv, lx, ly, lxy) = b.lhs.value_deriv2(v1, v2);
                        let (rv, rx, ry, rxy) = b.rhs.value_deriv2(v1, v2);
                        (
                            lv * rv,
                            lx * rv + lv * rx,
                            ly * rv + lv * ry,
                            lxy * rv + lx * ry + ly * rx + lv * rxy,
                        )
                    }
                }
                BinOp::Div => {
                    if let Some(c) = const_factor(&b.rhs) {
                        let (lv, lx, ly, lxy) = b.lhs.value_deriv2(v1, v2);
                        (lv / c, lx / c, ly / c, lxy / c)
                    } else {
                        let (lv, lx, ly, lxy) = b.lhs.value_deriv2(v1, v2);
                        let (rv, rx, ry, rxy) = b.rhs.value_deriv2(v1, v2);
                        let r2 = rv * rv;
                        let r3 = r2 * rv;
                        (
                            lv / rv,
                            lx / rv - lv * rx / r2,
                            ly / rv - lv * ry / r2,
                            lxy / rv - (lx * ry + ly * rx + lv * rxy) / r2
                                + 2.0 * lv * rx * ry / r3,
                        )
                    }
                }
                BinOp::Pow => {
                    if let Some(p) = const_factor(&b.rhs) {
                        let (lv, lx, ly, lxy) = b.lhs.value_deriv2(v1, v2);
                        let fpm1 = lv.powf(p - 1.0);
                        let fpm2 = lv.powf(p - 2.0);
                        (
                            lv.powf(p),
                            p * fpm1 * lx,
                            p * fpm1 * ly,
                            p * (p - 1.0) * fpm2 * lx * ly + p * fpm1 * lxy,
                        )
                    } else {
                        let (lv, lx, ly, lxy) = b.lhs.value_deriv2(v1, v2);
                        let (rv, rx, ry, rxy) = b.rhs.value_deriv2(v1, v2);
                        let f = lv.powf(rv);
                        // ln(base) only enters when the exponent moves
                        let ln_l = if rx == 0.0 && ry == 0.0 && rxy == 0.0 {
                            0.0
                        } else {
                            lv.ln()
                        };
                        let gx = rx * ln_l + rv * lx / lv;
                        let gy = ry * ln_l + rv * ly / lv;
                        let gxy = rxy * ln_l + rx * ly / lv + ry * lx / lv + rv * lxy / lv
                            - rv * lx * ly / (lv * lv);
                        (f, f * gx, f * gy, f * (gxy + gx * gy))
                    }
                }
            },
            Expr::Unary(u) => {
                let (a, ax, ay, axy) = u.arg.value_deriv2(v1, v2);
                match u.op {
                    UnOp::Abs => {
                        let s = sign_of(a);
                        (a.abs(), s * ax, s * ay, s * axy)
                    }
                    UnOp::Sign => (sign_of(a), 0.0, 0.0, 0.0),
                    UnOp::Exp => {
                        let f = a.exp();
                        (f, f * ax, f * ay, f * (ax * ay + axy))
                    }
                    UnOp::Ln => (a.ln(), ax / a, ay / a, axy / a - ax * ay / (a * a)),
                    UnOp::Sin => {
                        let (s, c) = (a.sin(), a.cos());
                        (s, c * ax, c * ay, -s * ax * ay + c * axy)
                    }
                    UnOp::Cos => {
                        let (s, c) = (a.sin(), a.cos());
                        (c, -s * ax, -s * ay, -c * ax * ay - s * axy)
                    }
                    UnOp::Tan => {
                        let c = a.cos();
                        let sec2 = 1.0 / (c * c);
                        let t = a.tan();
                        (
                            t,
                            sec2 * ax,
                            sec2 * ay,
                            2.0 * sec2 * t * ax * ay + sec2 * axy,
                        )
                    }
                    UnOp::Asin => {
                        let w = 1.0 - a * a;
                        let root = w.sqrt();
                        (
                            a.asin(),
                            ax / root,
                            ay / root,
                            axy / root + a * ax * ay / (w * root),
                        )
                    }
                    UnOp::Acos => {
                        let w = 1.0 - a * a;
                        let root = w.sqrt();
                        (
                            a.acos(),
                            -ax / root,
                            -ay / root,
                            -axy / root - a * ax * ay / (w * root),
                        )
                    }
                    UnOp::Atan => {
                        let w = 1.0 + a * a;
                        (
                            a.atan(),
                            ax / w,
                            ay / w,
                            axy / w - 2.0 * a * ax * ay / (w * w),
                        )
                    }
                }
            }
        }
    }
}

/// Summation first derivative: only terms listed in the sparsity row of `v`
/// are differentiated; the rest contribute value only.
fn sum_deriv(s: &SumNode, v: &Var) -> (f64, f64) {
    let row = s.sparsity_of(v).unwrap_or(&[]);
    let mut next = row.iter().peekable();
    let mut val = s.constant();
    let mut der = 0.0;
    for (i, t) in s.terms().iter().enumerate() {
        if next.peek() == Some(&&i) {
            next.next();
            let (tv, td) = t.expr.value_deriv(v);
            val += t.coef * tv;
            der += t.coef * td;
        } else {
            val += t.coef * t.expr.evaluate();
        }
    }
    (val, der)
}

/// Summation second derivative: terms in the union of the two sparsity rows
/// carry partials, the rest contribute value only.
fn sum_deriv2(s: &SumNode, v1: &Var, v2: &Var) -> (f64, f64, f64, f64) {
    let row1 = s.sparsity_of(v1).unwrap_or(&[]);
    let row2 = s.sparsity_of(v2).unwrap_or(&[]);
    let mut n1 = row1.iter().peekable();
    let mut n2 = row2.iter().peekable();
    let mut out = (s.constant(), 0.0, 0.0, 0.0);
    for (i, t) in s.terms().iter().enumerate() {
        let in1 = n1.peek() == Some(&&i);
        let in2 = n2.peek() == Some(&&i);
        if in1 {
            n1.next();
        }
        if in2 {
            n2.next();
        }
        if in1 || in2 {
            let (tv, tx, ty, txy) = t.expr.value_deriv2(v1, v2);
            out.0 += t.coef * tv;
            out.1 += t.coef * tx;
            out.2 += t.coef * ty;
            out.3 += t.coef * txy;
        } else {
            out.0 += t.coef * t.expr.evaluate();
        }
    }
    out
}
