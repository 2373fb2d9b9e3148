//! Model components: objectives and (conditional) constraints.
//!
//! A component wraps an expression with bounds and a dual, caches the last
//! evaluated value, and answers derivative and sparsity queries. Like
//! leaves, components are cloneable handles with identity: a component
//! added to a model and the caller's handle are the same object, so duals
//! written back by the solver are visible through either.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::expr::Expr;
use crate::leaf::Var;

/// Sentinel magnitude for unbounded constraint sides.
pub const CON_UNBOUNDED: f64 = 1.0e20;

static NEXT_COMP_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique component identifier; ordered by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompId(u64);

fn fresh_id() -> CompId {
    CompId(NEXT_COMP_ID.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug)]
struct ObjectiveInner {
    id: CompId,
    expr: Expr,
    value: Cell<f64>,
    name: RefCell<Option<String>>,
}

/// The function being minimized.
#[derive(Debug, Clone)]
pub struct Objective(Rc<ObjectiveInner>);

impl Objective {
    pub fn new(expr: Expr) -> Self {
        Objective(Rc::new(ObjectiveInner {
            id: fresh_id(),
            expr,
            value: Cell::new(0.0),
            name: RefCell::new(None),
        }))
    }

    pub fn named(self, name: impl Into<String>) -> Self {
        *self.0.name.borrow_mut() = Some(name.into());
        self
    }

    pub fn id(&self) -> CompId {
        self.0.id
    }

    pub fn expr(&self) -> &Expr {
        &self.0.expr
    }

    pub fn name(&self) -> Option<String> {
        self.0.name.borrow().clone()
    }

    /// Last value computed by [`evaluate`](Self::evaluate).
    pub fn value(&self) -> f64 {
        self.0.value.get()
    }

    pub fn evaluate(&self) -> f64 {
        let v = self.0.expr.evaluate();
        self.0.value.set(v);
        v
    }

    pub fn ad(&self, v: &Var, new_eval: bool) -> f64 {
        if new_eval {
            self.evaluate();
        }
        self.0.expr.ad(v)
    }

    pub fn ad2(&self, v1: &Var, v2: &Var, new_eval: bool) -> f64 {
        if new_eval {
            self.evaluate();
        }
        self.0.expr.ad2(v1, v2)
    }

    pub fn has_ad2(&self, v1: &Var, v2: &Var) -> bool {
        self.0.expr.has_ad2(v1, v2)
    }

    /// Variables referenced by the objective, sorted by registration index.
    pub fn vars(&self) -> Vec<Var> {
        sorted_by_index(self.0.expr.vars())
    }
}

impl PartialEq for Objective {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Objective {}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.expr)
    }
}

#[derive(Debug)]
struct ConstraintInner {
    id: CompId,
    expr: Expr,
    lb: Cell<f64>,
    ub: Cell<f64>,
    dual: Cell<f64>,
    value: Cell<f64>,
    index: Cell<usize>,
    name: RefCell<Option<String>>,
}

/// A bounded constraint `lb <= expr <= ub`; `lb == ub` is an equality.
#[derive(Debug, Clone)]
pub struct Constraint(Rc<ConstraintInner>);

impl Constraint {
    pub fn new(expr: Expr, lb: f64, ub: f64) -> Self {
        Constraint(Rc::new(ConstraintInner {
            id: fresh_id(),
            expr,
            lb: Cell::new(lb),
            ub: Cell::new(ub),
            dual: Cell::new(0.0),
            value: Cell::new(0.0),
            index: Cell::new(0),
            name: RefCell::new(None),
        }))
    }

    /// Constraint with both sides at the unbounded sentinel.
    pub fn unbounded(expr: Expr) -> Self {
        Self::new(expr, -CON_UNBOUNDED, CON_UNBOUNDED)
    }

    /// Equality constraint `expr == rhs`.
    pub fn equality(expr: Expr, rhs: f64) -> Self {
        Self::new(expr, rhs, rhs)
    }

    pub fn named(self, name: impl Into<String>) -> Self {
        *self.0.name.borrow_mut() = Some(name.into());
        self
    }

    pub fn id(&self) -> CompId {
        self.0.id
    }

    pub fn name(&self) -> Option<String> {
        self.0.name.borrow().clone()
    }

    pub fn expr(&self) -> &Expr {
        &self.0.expr
    }

    pub fn lb(&self) -> f64 {
        self.0.lb.get()
    }

    pub fn ub(&self) -> f64 {
        self.0.ub.get()
    }

    pub fn dual(&self) -> f64 {
        self.0.dual.get()
    }

    pub fn set_dual(&self, dual: f64) {
        self.0.dual.set(dual);
    }

    /// Position of this constraint in its model, assigned on registration.
    pub fn index(&self) -> usize {
        self.0.index.get()
    }

    pub(crate) fn set_index(&self, index: usize) {
        self.0.index.set(index);
    }

    /// Last value computed by [`evaluate`](Self::evaluate).
    pub fn value(&self) -> f64 {
        self.0.value.get()
    }

    pub fn evaluate(&self) -> f64 {
        let v = self.0.expr.evaluate();
        self.0.value.set(v);
        v
    }

    pub fn ad(&self, v: &Var, new_eval: bool) -> f64 {
        if new_eval {
            self.evaluate();
        }
        self.0.expr.ad(v)
    }

    pub fn ad2(&self, v1: &Var, v2: &Var, new_eval: bool) -> f64 {
        if new_eval {
            self.evaluate();
        }
        self.0.expr.ad2(v1, v2)
    }

    pub fn has_ad2(&self, v1: &Var, v2: &Var) -> bool {
        self.0.expr.has_ad2(v1, v2)
    }

    pub fn vars(&self) -> Vec<Var> {
        sorted_by_index(self.0.expr.vars())
    }
}

impl PartialEq for Constraint {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Constraint {}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.expr)
    }
}

#[derive(Debug)]
struct ConditionalInner {
    id: CompId,
    conditions: Vec<Expr>,
    branches: Vec<Expr>,
    lb: Cell<f64>,
    ub: Cell<f64>,
    dual: Cell<f64>,
    value: Cell<f64>,
    index: Cell<usize>,
}

/// A piecewise constraint: an `if/elif/else` ladder of expressions.
///
/// Evaluation picks the first branch whose condition evaluates to `<= 0`,
/// falling back to the trailing else branch, and the active branch supplies
/// all derivatives. `has_ad2` ORs across every branch so the Hessian
/// pattern does not move when the active branch switches; entries from an
/// inactive branch may evaluate to zero.
#[derive(Debug, Clone)]
pub struct ConditionalConstraint(Rc<ConditionalInner>);

impl ConditionalConstraint {
    /// Build a ladder. `branches` must hold exactly one more expression than
    /// `conditions`; the last branch is the `else`.
    pub fn new(conditions: Vec<Expr>, branches: Vec<Expr>, lb: f64, ub: f64) -> Self {
        assert_eq!(
            branches.len(),
            conditions.len() + 1,
            "a conditional constraint needs one branch per condition plus an else branch",
        );
        ConditionalConstraint(Rc::new(ConditionalInner {
            id: fresh_id(),
            conditions,
            branches,
            lb: Cell::new(lb),
            ub: Cell::new(ub),
            dual: Cell::new(0.0),
            value: Cell::new(0.0),
            index: Cell::new(0),
        }))
    }

    pub fn id(&self) -> CompId {
        self.0.id
    }

    pub fn conditions(&self) -> &[Expr] {
        &self.0.conditions
    }

    pub fn branches(&self) -> &[Expr] {
        &self.0.branches
    }

    pub fn lb(&self) -> f64 {
        self.0.lb.get()
    }

    pub fn ub(&self) -> f64 {
        self.0.ub.get()
    }

    pub fn dual(&self) -> f64 {
        self.0.dual.get()
    }

    pub fn set_dual(&self, dual: f64) {
        self.0.dual.set(dual);
    }

    pub fn index(&self) -> usize {
        self.0.index.get()
    }

    pub(crate) fn set_index(&self, index: usize) {
        self.0.index.set(index);
    }

    pub fn value(&self) -> f64 {
        self.0.value.get()
    }

    /// The branch currently selected by the condition ladder.
    pub fn active_branch(&self) -> &Expr {
        for (cond, branch) in self.0.conditions.iter().zip(&self.0.branches) {
            if cond.evaluate() <= 0.0 {
                return branch;
            }
        }
        self.0.branches.last().expect("ladder has an else branch")
    }

    pub fn evaluate(&self) -> f64 {
        let v = self.active_branch().evaluate();
        self.0.value.set(v);
        v
    }

    pub fn ad(&self, v: &Var, new_eval: bool) -> f64 {
        if new_eval {
            self.evaluate();
        }
        self.active_branch().ad(v)
    }

    pub fn ad2(&self, v1: &Var, v2: &Var, new_eval: bool) -> f64 {
        if new_eval {
            self.evaluate();
        }
        self.active_branch().ad2(v1, v2)
    }

    /// OR across all branches, keeping the Hessian pattern branch-stable.
    pub fn has_ad2(&self, v1: &Var, v2: &Var) -> bool {
        self.0.branches.iter().any(|b| b.has_ad2(v1, v2))
    }

    /// Union of the branch variable sets, sorted by registration index.
    /// Condition expressions do not contribute Jacobian columns.
    pub fn vars(&self) -> Vec<Var> {
        let mut set = BTreeMap::new();
        for b in &self.0.branches {
            b.collect_vars(&mut set);
        }
        sorted_by_index(set.into_values().collect())
    }
}

impl PartialEq for ConditionalConstraint {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for ConditionalConstraint {}

impl fmt::Display for ConditionalConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (cond, branch)) in self.0.conditions.iter().zip(&self.0.branches).enumerate() {
            let kw = if i == 0 { "if" } else { "elif" };
            writeln!(f, "{} {} <= 0:", kw, cond)?;
            writeln!(f, "\t{}", branch)?;
        }
        writeln!(f, "else: ")?;
        writeln!(f, "\t{}", self.0.branches.last().unwrap())
    }
}

/// A constraint of either kind, as stored by models and evaluators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyConstraint {
    Std(Constraint),
    Cond(ConditionalConstraint),
}

impl AnyConstraint {
    pub fn id(&self) -> CompId {
        match self {
            AnyConstraint::Std(c) => c.id(),
            AnyConstraint::Cond(c) => c.id(),
        }
    }

    pub fn lb(&self) -> f64 {
        match self {
            AnyConstraint::Std(c) => c.lb(),
            AnyConstraint::Cond(c) => c.lb(),
        }
    }

    pub fn ub(&self) -> f64 {
        match self {
            AnyConstraint::Std(c) => c.ub(),
            AnyConstraint::Cond(c) => c.ub(),
        }
    }

    pub fn dual(&self) -> f64 {
        match self {
            AnyConstraint::Std(c) => c.dual(),
            AnyConstraint::Cond(c) => c.dual(),
        }
    }

    pub fn set_dual(&self, dual: f64) {
        match self {
            AnyConstraint::Std(c) => c.set_dual(dual),
            AnyConstraint::Cond(c) => c.set_dual(dual),
        }
    }

    pub fn index(&self) -> usize {
        match self {
            AnyConstraint::Std(c) => c.index(),
            AnyConstraint::Cond(c) => c.index(),
        }
    }

    pub(crate) fn set_index(&self, index: usize) {
        match self {
            AnyConstraint::Std(c) => c.set_index(index),
            AnyConstraint::Cond(c) => c.set_index(index),
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            AnyConstraint::Std(c) => c.value(),
            AnyConstraint::Cond(c) => c.value(),
        }
    }

    pub fn evaluate(&self) -> f64 {
        match self {
            AnyConstraint::Std(c) => c.evaluate(),
            AnyConstraint::Cond(c) => c.evaluate(),
        }
    }

    pub fn ad(&self, v: &Var, new_eval: bool) -> f64 {
        match self {
            AnyConstraint::Std(c) => c.ad(v, new_eval),
            AnyConstraint::Cond(c) => c.ad(v, new_eval),
        }
    }

    pub fn ad2(&self, v1: &Var, v2: &Var, new_eval: bool) -> f64 {
        match self {
            AnyConstraint::Std(c) => c.ad2(v1, v2, new_eval),
            AnyConstraint::Cond(c) => c.ad2(v1, v2, new_eval),
        }
    }

    pub fn has_ad2(&self, v1: &Var, v2: &Var) -> bool {
        match self {
            AnyConstraint::Std(c) => c.has_ad2(v1, v2),
            AnyConstraint::Cond(c) => c.has_ad2(v1, v2),
        }
    }

    pub fn vars(&self) -> Vec<Var> {
        match self {
            AnyConstraint::Std(c) => c.vars(),
            AnyConstraint::Cond(c) => c.vars(),
        }
    }
}

impl From<Constraint> for AnyConstraint {
    fn from(c: Constraint) -> Self {
        AnyConstraint::Std(c)
    }
}

impl From<&Constraint> for AnyConstraint {
    fn from(c: &Constraint) -> Self {
        AnyConstraint::Std(c.clone())
    }
}

impl From<ConditionalConstraint> for AnyConstraint {
    fn from(c: ConditionalConstraint) -> Self {
        AnyConstraint::Cond(c)
    }
}

impl From<&ConditionalConstraint> for AnyConstraint {
    fn from(c: &ConditionalConstraint) -> Self {
        AnyConstraint::Cond(c.clone())
    }
}

impl fmt::Display for AnyConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyConstraint::Std(c) => write!(f, "{}", c),
            AnyConstraint::Cond(c) => write!(f, "{}", c),
        }
    }
}

fn sorted_by_index(mut vars: Vec<Var>) -> Vec<Var> {
    vars.sort_by_key(|v| v.index());
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::NumOps;

    #[test]
    fn conditional_picks_first_nonpositive_condition() {
        let x = Var::new(0.0);
        let y = Var::new(3.0);
        let ladder = ConditionalConstraint::new(
            vec![&x - 1.0],
            vec![Expr::from(&x).pow(2.0), Expr::from(&y).pow(2.0)],
            0.0,
            0.0,
        );
        assert_eq!(ladder.evaluate(), 0.0); // x = 0: first branch, x^2
        x.set_value(2.0);
        assert_eq!(ladder.evaluate(), 9.0); // x = 2: else branch, y^2
    }

    #[test]
    #[should_panic(expected = "one branch per condition")]
    fn conditional_cardinality_is_checked() {
        let x = Var::new(0.0);
        let _ = ConditionalConstraint::new(
            vec![Expr::from(&x)],
            vec![Expr::from(&x)],
            0.0,
            0.0,
        );
    }

    #[test]
    fn conditional_print_format() {
        let x = Var::new(0.0).named("x");
        let y = Var::new(0.0).named("y");
        let ladder = ConditionalConstraint::new(
            vec![&x - 1.0],
            vec![Expr::from(&x).pow(2.0), Expr::from(&y).pow(2.0)],
            0.0,
            0.0,
        );
        let printed = ladder.to_string();
        assert_eq!(printed, "if -1 + x <= 0:\n\tx**2\nelse: \n\ty**2\n");
    }

    #[test]
    fn unbounded_constraint_uses_the_sentinels() {
        let x = Var::new(0.0);
        let c = Constraint::unbounded(Expr::from(&x)).named("free");
        assert_eq!(c.lb(), -CON_UNBOUNDED);
        assert_eq!(c.ub(), CON_UNBOUNDED);
        assert_eq!(c.name().as_deref(), Some("free"));
    }

    #[test]
    fn dual_is_visible_through_clones() {
        let x = Var::new(0.0);
        let c = Constraint::new(Expr::from(&x), 0.0, 1.0);
        let c2 = c.clone();
        c.set_dual(0.25);
        assert_eq!(c2.dual(), 0.25);
        assert_eq!(c, c2);
    }
}
