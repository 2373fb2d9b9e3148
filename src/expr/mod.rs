//! Expression graph with build-time algebraic simplification.
//!
//! Expressions form a DAG: subtrees are shared through `Rc`, so cloning is
//! cheap and anonymous constants are released with the last expression that
//! refers to them. Additive structure is kept flat in a [`SumNode`], an
//! n-ary affine combination `constant + Σ cᵢ · childᵢ` with a per-variable
//! index of the terms that depend on it. Multiplicative, divisive, power,
//! and unary structure lives in dedicated operator nodes.
//!
//! The arithmetic operators fold as they build:
//! `0 + e → e`, `e ± 0 → e`, `0 · e → 0`, `1 · e → e`, `e^0 → 1`,
//! `e^1 → e`, constants combine, and scalar factors are absorbed into
//! summation coefficients. Division by a constant zero and a constant
//! `0^0` are rejected at build time.

mod ad;
mod deriv;
mod display;
mod sparsity;

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::leaf::{LeafId, Param, Var};

/// A node of the expression graph.
///
/// `Binary` covers `*`, `/`, and `^`; additive structure always goes
/// through `Sum`.
#[derive(Debug, Clone)]
pub enum Expr {
    Var(Var),
    Param(Param),
    /// Anonymous numeric constant, typically produced by folding.
    Const(f64),
    Binary(Rc<BinaryNode>),
    Unary(Rc<UnaryNode>),
    Sum(Rc<SumNode>),
}

/// Binary operator tags. Addition and subtraction do not appear here; they
/// are normalized into [`SumNode`]s at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Mul,
    Div,
    Pow,
}

/// Unary function tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Abs,
    Sign,
    Exp,
    Ln,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
}

#[derive(Debug)]
pub struct BinaryNode {
    pub op: BinOp,
    pub lhs: Expr,
    pub rhs: Expr,
}

#[derive(Debug)]
pub struct UnaryNode {
    pub op: UnOp,
    pub arg: Expr,
}

/// One scaled child of a summation.
#[derive(Debug, Clone)]
pub struct SumTerm {
    pub coef: f64,
    pub expr: Expr,
}

#[derive(Debug, Clone)]
struct SumVarEntry {
    var: Var,
    terms: Vec<usize>,
}

/// Flat affine combination: `constant + Σ coefᵢ · termᵢ`.
///
/// The sparsity index maps each variable to the ordered positions of the
/// terms whose subgraph contains it, with no duplicates per term.
#[derive(Debug, Clone, Default)]
pub struct SumNode {
    constant: f64,
    terms: Vec<SumTerm>,
    sparsity: BTreeMap<LeafId, SumVarEntry>,
}

impl SumNode {
    fn new(constant: f64) -> Self {
        SumNode {
            constant,
            terms: Vec::new(),
            sparsity: BTreeMap::new(),
        }
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    pub fn terms(&self) -> &[SumTerm] {
        &self.terms
    }

    /// Term positions that depend on `v`, if any.
    pub fn sparsity_of(&self, v: &Var) -> Option<&[usize]> {
        self.sparsity.get(&v.id()).map(|e| e.terms.as_slice())
    }

    pub(crate) fn sparse_vars(&self) -> impl Iterator<Item = &Var> {
        self.sparsity.values().map(|e| &e.var)
    }

    pub(crate) fn depends_on(&self, v: &Var) -> bool {
        self.sparsity.contains_key(&v.id())
    }

    fn push(&mut self, coef: f64, expr: Expr) {
        let idx = self.terms.len();
        let mut vars = BTreeMap::new();
        expr.collect_vars(&mut vars);
        for (id, var) in vars {
            self.sparsity
                .entry(id)
                .or_insert_with(|| SumVarEntry {
                    var,
                    terms: Vec::new(),
                })
                .terms
                .push(idx);
        }
        self.terms.push(SumTerm { coef, expr });
    }

    /// Concatenate another summation, scaling its terms and constant by
    /// `sign`, and merge its sparsity rows with shifted term positions.
    fn merge(&mut self, other: &SumNode, sign: f64) {
        let offset = self.terms.len();
        for t in &other.terms {
            self.terms.push(SumTerm {
                coef: sign * t.coef,
                expr: t.expr.clone(),
            });
        }
        for (id, entry) in &other.sparsity {
            let row = self
                .sparsity
                .entry(*id)
                .or_insert_with(|| SumVarEntry {
                    var: entry.var.clone(),
                    terms: Vec::new(),
                });
            row.terms.extend(entry.terms.iter().map(|i| i + offset));
        }
        self.constant += sign * other.constant;
    }

    fn scale(&mut self, k: f64) {
        self.constant *= k;
        for t in &mut self.terms {
            t.coef *= k;
        }
    }
}

impl Expr {
    pub fn is_const(&self) -> bool {
        matches!(self, Expr::Const(_))
    }

    pub fn as_const(&self) -> Option<f64> {
        match self {
            Expr::Const(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_sum(&self) -> Option<&SumNode> {
        match self {
            Expr::Sum(s) => Some(s),
            _ => None,
        }
    }
}

// ── Builders ──

/// Additive builder: `lhs + sign · rhs`, keeping affine layers flat.
fn add_signed(lhs: Expr, rhs: Expr, sign: f64) -> Expr {
    use Expr::*;
    match (lhs, rhs) {
        (Const(a), Const(b)) => Const(a + sign * b),
        (Const(a), rhs) if a == 0.0 => scale(rhs, sign),
        (lhs, Const(b)) if b == 0.0 => lhs,
        (Sum(mut s), Sum(o)) => {
            Rc::make_mut(&mut s).merge(&o, sign);
            Sum(s)
        }
        (Sum(mut s), rhs) => {
            let node = Rc::make_mut(&mut s);
            match rhs {
                Const(c) => node.constant += sign * c,
                rhs => node.push(sign, rhs),
            }
            Sum(s)
        }
        (lhs, Sum(mut s)) => {
            // Flatten under subtraction: the summation absorbs the sign,
            // then the left operand joins with coefficient one.
            let node = Rc::make_mut(&mut s);
            if sign != 1.0 {
                node.scale(sign);
            }
            match lhs {
                Const(c) => node.constant += c,
                lhs => node.push(1.0, lhs),
            }
            Sum(s)
        }
        (Const(a), rhs) => {
            let mut node = SumNode::new(a);
            node.push(sign, rhs);
            Sum(Rc::new(node))
        }
        (lhs, Const(b)) => {
            let mut node = SumNode::new(sign * b);
            node.push(1.0, lhs);
            Sum(Rc::new(node))
        }
        (lhs, rhs) => {
            let mut node = SumNode::new(0.0);
            node.push(1.0, lhs);
            node.push(sign, rhs);
            Sum(Rc::new(node))
        }
    }
}

/// Scalar multiple `k · e`, absorbed into affine structure.
fn scale(e: Expr, k: f64) -> Expr {
    if k == 0.0 {
        return Expr::Const(0.0);
    }
    match e {
        Expr::Const(c) => Expr::Const(k * c),
        e if k == 1.0 => e,
        Expr::Sum(mut s) => {
            Rc::make_mut(&mut s).scale(k);
            Expr::Sum(s)
        }
        e => {
            let mut node = SumNode::new(0.0);
            node.push(k, e);
            Expr::Sum(Rc::new(node))
        }
    }
}

fn mul_expr(lhs: Expr, rhs: Expr) -> Expr {
    use Expr::*;
    match (lhs, rhs) {
        (Const(a), rhs) => scale(rhs, a),
        (lhs, Const(b)) => scale(lhs, b),
        (lhs, rhs) => Binary(Rc::new(BinaryNode {
            op: BinOp::Mul,
            lhs,
            rhs,
        })),
    }
}

fn div_expr(lhs: Expr, rhs: Expr) -> Expr {
    use Expr::*;
    match (lhs, rhs) {
        (_, Const(b)) if b == 0.0 => {
            panic!("expression build: division by a constant zero")
        }
        (lhs, Const(b)) => scale(lhs, 1.0 / b),
        (Const(a), _) if a == 0.0 => Const(0.0),
        (lhs, rhs) => Binary(Rc::new(BinaryNode {
            op: BinOp::Div,
            lhs,
            rhs,
        })),
    }
}

fn pow_expr(lhs: Expr, rhs: Expr) -> Expr {
    use Expr::*;
    match (lhs, rhs) {
        (Const(a), Const(b)) if a == 0.0 && b == 0.0 => {
            panic!("expression build: 0^0 is undefined")
        }
        (Const(a), Const(b)) => Const(a.powf(b)),
        (_, Const(b)) if b == 0.0 => Const(1.0),
        (lhs, Const(b)) if b == 1.0 => lhs,
        (lhs, rhs) => Binary(Rc::new(BinaryNode {
            op: BinOp::Pow,
            lhs,
            rhs,
        })),
    }
}

fn unary_expr(op: UnOp, arg: Expr) -> Expr {
    Expr::Unary(Rc::new(UnaryNode { op, arg }))
}

// ── Conversions ──

impl From<&Expr> for Expr {
    fn from(e: &Expr) -> Expr {
        e.clone()
    }
}

impl From<Var> for Expr {
    fn from(v: Var) -> Expr {
        Expr::Var(v)
    }
}

impl From<&Var> for Expr {
    fn from(v: &Var) -> Expr {
        Expr::Var(v.clone())
    }
}

impl From<Param> for Expr {
    fn from(p: Param) -> Expr {
        Expr::Param(p)
    }
}

impl From<&Param> for Expr {
    fn from(p: &Param) -> Expr {
        Expr::Param(p.clone())
    }
}

impl From<f64> for Expr {
    fn from(c: f64) -> Expr {
        Expr::Const(c)
    }
}

impl From<i32> for Expr {
    fn from(c: i32) -> Expr {
        Expr::Const(f64::from(c))
    }
}

// ── Operator overloading ──
//
// Each expression-like left operand gets a generic impl over anything
// convertible to Expr; scalar left operands need concrete impls per
// right-hand type.

macro_rules! expr_lhs_ops {
    ( $( $T:ty ),* ) => { $(
        impl<R: Into<Expr>> std::ops::Add<R> for $T {
            type Output = Expr;
            fn add(self, rhs: R) -> Expr {
                add_signed(self.into(), rhs.into(), 1.0)
            }
        }

        impl<R: Into<Expr>> std::ops::Sub<R> for $T {
            type Output = Expr;
            fn sub(self, rhs: R) -> Expr {
                add_signed(self.into(), rhs.into(), -1.0)
            }
        }

        impl<R: Into<Expr>> std::ops::Mul<R> for $T {
            type Output = Expr;
            fn mul(self, rhs: R) -> Expr {
                mul_expr(self.into(), rhs.into())
            }
        }

        impl<R: Into<Expr>> std::ops::Div<R> for $T {
            type Output = Expr;
            fn div(self, rhs: R) -> Expr {
                div_expr(self.into(), rhs.into())
            }
        }

        impl std::ops::Neg for $T {
            type Output = Expr;
            fn neg(self) -> Expr {
                scale(self.into(), -1.0)
            }
        }
    )* };
}

expr_lhs_ops!(Expr, &Expr, Var, &Var, Param, &Param);

macro_rules! scalar_lhs_ops {
    ( $S:ty => $( $T:ty ),* ) => { $(
        impl std::ops::Add<$T> for $S {
            type Output = Expr;
            fn add(self, rhs: $T) -> Expr {
                add_signed(Expr::from(self), rhs.into(), 1.0)
            }
        }

        impl std::ops::Sub<$T> for $S {
            type Output = Expr;
            fn sub(self, rhs: $T) -> Expr {
                add_signed(Expr::from(self), rhs.into(), -1.0)
            }
        }

        impl std::ops::Mul<$T> for $S {
            type Output = Expr;
            fn mul(self, rhs: $T) -> Expr {
                mul_expr(Expr::from(self), rhs.into())
            }
        }

        impl std::ops::Div<$T> for $S {
            type Output = Expr;
            fn div(self, rhs: $T) -> Expr {
                div_expr(Expr::from(self), rhs.into())
            }
        }
    )* };
}

scalar_lhs_ops!(f64 => Expr, &Expr, Var, &Var, Param, &Param);
scalar_lhs_ops!(i32 => Expr, &Expr, Var, &Var, Param, &Param);

/// Power and elementary functions on anything expression-like.
///
/// Inherent methods on primitive floats shadow these, so `2.0.sin()` stays
/// numeric; wrap constants with `Expr::from` to build a node instead.
pub trait NumOps: Into<Expr> + Sized {
    fn pow<E: Into<Expr>>(self, exp: E) -> Expr {
        pow_expr(self.into(), exp.into())
    }

    fn abs(self) -> Expr {
        unary_expr(UnOp::Abs, self.into())
    }

    /// Sign of the argument: `1.0` for non-negative values, `-1.0` otherwise.
    fn sign(self) -> Expr {
        unary_expr(UnOp::Sign, self.into())
    }

    fn exp(self) -> Expr {
        unary_expr(UnOp::Exp, self.into())
    }

    fn ln(self) -> Expr {
        unary_expr(UnOp::Ln, self.into())
    }

    fn sin(self) -> Expr {
        unary_expr(UnOp::Sin, self.into())
    }

    fn cos(self) -> Expr {
        unary_expr(UnOp::Cos, self.into())
    }

    fn tan(self) -> Expr {
        unary_expr(UnOp::Tan, self.into())
    }

    fn asin(self) -> Expr {
        unary_expr(UnOp::Asin, self.into())
    }

    fn acos(self) -> Expr {
        unary_expr(UnOp::Acos, self.into())
    }

    fn atan(self) -> Expr {
        unary_expr(UnOp::Atan, self.into())
    }
}

impl<T: Into<Expr>> NumOps for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_plus_leaf_builds_a_two_term_summation() {
        let x = Var::new(1.0);
        let y = Var::new(2.0);
        let e = &x + &y;
        let s = e.as_sum().expect("additive result should be a summation");
        assert_eq!(s.constant(), 0.0);
        assert_eq!(s.terms().len(), 2);
        assert_eq!(s.terms()[0].coef, 1.0);
        assert_eq!(s.terms()[1].coef, 1.0);
        assert_eq!(s.sparsity_of(&x), Some(&[0][..]));
        assert_eq!(s.sparsity_of(&y), Some(&[1][..]));
    }

    #[test]
    fn subtraction_scales_the_right_operand() {
        let x = Var::new(1.0);
        let y = Var::new(2.0);
        let s = (&x - &y).as_sum().unwrap().clone();
        assert_eq!(s.terms()[1].coef, -1.0);
    }

    #[test]
    fn leaf_minus_summation_flattens() {
        let x = Var::new(1.0);
        let y = Var::new(2.0);
        let z = Var::new(3.0);
        // z - (x + y) = -x - y + z, one flat layer
        let e = &z - (&x + &y);
        let s = e.as_sum().unwrap();
        assert_eq!(s.terms().len(), 3);
        let coefs: Vec<f64> = s.terms().iter().map(|t| t.coef).collect();
        assert_eq!(coefs, vec![-1.0, -1.0, 1.0]);
    }

    #[test]
    fn summation_merge_shifts_sparsity_rows() {
        let x = Var::new(1.0);
        let y = Var::new(2.0);
        let e = (&x + 1.0) + (&x + &y);
        let s = e.as_sum().unwrap();
        assert_eq!(s.sparsity_of(&x), Some(&[0, 1][..]));
        assert_eq!(s.sparsity_of(&y), Some(&[2][..]));
    }

    #[test]
    fn scalar_multiple_becomes_a_coefficient() {
        let x = Var::new(3.0);
        let e = 5.0 * &x;
        let s = e.as_sum().unwrap();
        assert_eq!(s.terms().len(), 1);
        assert_eq!(s.terms()[0].coef, 5.0);
        assert_eq!(s.constant(), 0.0);
    }

    #[test]
    fn negation_is_a_minus_one_coefficient() {
        let x = Var::new(3.0);
        let s = (-&x).as_sum().unwrap().clone();
        assert_eq!(s.terms()[0].coef, -1.0);
    }

    #[test]
    fn constant_folds() {
        let x = Var::new(3.0);
        assert_eq!((Expr::from(2.0) + 3.0).as_const(), Some(5.0));
        assert!((&x + 0.0).as_sum().is_none());
        assert_eq!((0.0 * &x).as_const(), Some(0.0));
        assert_eq!(Expr::from(&x).pow(0.0).as_const(), Some(1.0));
        assert!(matches!(Expr::from(&x).pow(1.0), Expr::Var(_)));
    }

    #[test]
    #[should_panic(expected = "division by a constant zero")]
    fn division_by_constant_zero_is_fatal() {
        let x = Var::new(1.0);
        let _ = &x / 0.0;
    }

    #[test]
    #[should_panic(expected = "0^0")]
    fn zero_to_the_zero_is_fatal() {
        let _ = Expr::from(0.0).pow(0.0);
    }

    #[test]
    fn shared_summation_is_cloned_before_extension() {
        let x = Var::new(1.0);
        let y = Var::new(2.0);
        let base = &x + &y;
        let extended = &base + &x;
        assert_eq!(base.as_sum().unwrap().terms().len(), 2);
        assert_eq!(extended.as_sum().unwrap().terms().len(), 3);
    }
}
