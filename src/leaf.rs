//! Leaf nodes of the expression graph: decision variables and parameters.
//!
//! `Var` and `Param` are cheap cloneable handles; two handles compare equal
//! exactly when they refer to the same underlying leaf. Identity comes from
//! a process-unique [`LeafId`], never from the stored value, so two
//! variables that happen to hold the same number stay distinct.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sentinel magnitude treated as "unbounded" on variables.
pub const UNBOUNDED: f64 = 1.0e100;

static NEXT_LEAF_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique identifier of a leaf. Ordered by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LeafId(u64);

fn fresh_id() -> LeafId {
    LeafId(NEXT_LEAF_ID.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug)]
struct VarData {
    value: f64,
    lb: f64,
    ub: f64,
    lb_dual: f64,
    ub_dual: f64,
    index: usize,
    name: Option<String>,
}

#[derive(Debug)]
struct VarInner {
    id: LeafId,
    data: RefCell<VarData>,
}

/// A decision variable: a mutable value with bounds and bound duals.
///
/// Handles are reference-counted; cloning a `Var` aliases the same leaf.
/// The `index` field is assigned when the variable is registered with a
/// model or a compiled evaluator and is meaningless before that.
#[derive(Debug, Clone)]
pub struct Var(Rc<VarInner>);

impl Var {
    /// Create an unbounded variable with the given starting value.
    pub fn new(value: f64) -> Self {
        Self::with_bounds(value, -UNBOUNDED, UNBOUNDED)
    }

    /// Create a variable with explicit bounds.
    pub fn with_bounds(value: f64, lb: f64, ub: f64) -> Self {
        Var(Rc::new(VarInner {
            id: fresh_id(),
            data: RefCell::new(VarData {
                value,
                lb,
                ub,
                lb_dual: 0.0,
                ub_dual: 0.0,
                index: 0,
                name: None,
            }),
        }))
    }

    /// Attach a display name.
    pub fn named(self, name: impl Into<String>) -> Self {
        self.0.data.borrow_mut().name = Some(name.into());
        self
    }

    pub fn id(&self) -> LeafId {
        self.0.id
    }

    pub fn value(&self) -> f64 {
        self.0.data.borrow().value
    }

    pub fn set_value(&self, value: f64) {
        self.0.data.borrow_mut().value = value;
    }

    pub fn lb(&self) -> f64 {
        self.0.data.borrow().lb
    }

    pub fn set_lb(&self, lb: f64) {
        self.0.data.borrow_mut().lb = lb;
    }

    pub fn ub(&self) -> f64 {
        self.0.data.borrow().ub
    }

    pub fn set_ub(&self, ub: f64) {
        self.0.data.borrow_mut().ub = ub;
    }

    pub fn lb_dual(&self) -> f64 {
        self.0.data.borrow().lb_dual
    }

    pub fn set_lb_dual(&self, z: f64) {
        self.0.data.borrow_mut().lb_dual = z;
    }

    pub fn ub_dual(&self) -> f64 {
        self.0.data.borrow().ub_dual
    }

    pub fn set_ub_dual(&self, z: f64) {
        self.0.data.borrow_mut().ub_dual = z;
    }

    /// Position of this variable in its model, assigned on registration.
    pub fn index(&self) -> usize {
        self.0.data.borrow().index
    }

    pub(crate) fn set_index(&self, index: usize) {
        self.0.data.borrow_mut().index = index;
    }

    pub fn name(&self) -> Option<String> {
        self.0.data.borrow().name.clone()
    }
}

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Var {}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.data.borrow().name {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "v{}", self.0.id.0),
        }
    }
}

#[derive(Debug)]
struct ParamInner {
    id: LeafId,
    value: RefCell<f64>,
    name: RefCell<Option<String>>,
}

/// A named constant: participates in differentiation with derivative zero,
/// but its value may be changed between evaluations.
#[derive(Debug, Clone)]
pub struct Param(Rc<ParamInner>);

impl Param {
    pub fn new(value: f64) -> Self {
        Param(Rc::new(ParamInner {
            id: fresh_id(),
            value: RefCell::new(value),
            name: RefCell::new(None),
        }))
    }

    /// Attach a display name.
    pub fn named(self, name: impl Into<String>) -> Self {
        *self.0.name.borrow_mut() = Some(name.into());
        self
    }

    pub fn id(&self) -> LeafId {
        self.0.id
    }

    pub fn value(&self) -> f64 {
        *self.0.value.borrow()
    }

    pub fn set_value(&self, value: f64) {
        *self.0.value.borrow_mut() = value;
    }
}

impl PartialEq for Param {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Param {}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0.name.borrow() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "p{}", self.0.id.0),
        }
    }
}
