//! Model registry: variables, constraints, one objective, and a live
//! lower-triangular Hessian sparsity map.
//!
//! The Hessian map is keyed by `(v1.index, v2.index)` with
//! `v2.index <= v1.index` and records, per pair, which components
//! contribute a structurally non-zero second partial. It is edited
//! transactionally on every `set_objective` / `add_constraint` /
//! `remove_constraint`: outgoing contributions are removed first, incoming
//! ones installed after, and entries whose contributor sets empty out are
//! pruned. Iterating the map therefore *is* the Hessian pattern, already in
//! row-major lower-triangular order.

use std::collections::{BTreeMap, BTreeSet};

use crate::component::{AnyConstraint, CompId, Objective};
use crate::leaf::Var;

/// Contributors to one Hessian entry.
#[derive(Debug, Clone, Default)]
pub struct HessEntry {
    /// Objectives with a non-zero second partial at this pair.
    pub obj: BTreeSet<CompId>,
    /// Constraints with a non-zero second partial at this pair.
    pub cons: BTreeSet<CompId>,
}

impl HessEntry {
    fn is_empty(&self) -> bool {
        self.obj.is_empty() && self.cons.is_empty()
    }
}

/// An algebraic model: decision variables, constraints, and an objective,
/// with incrementally maintained Jacobian and Hessian sparsity.
#[derive(Debug, Default)]
pub struct Model {
    vars: Vec<Var>,
    cons: Vec<AnyConstraint>,
    obj: Option<Objective>,
    hess: BTreeMap<(usize, usize), HessEntry>,
    /// Named status written back by the solver adapter after a solve.
    pub solver_status: Option<String>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Variables ──

    /// Register a variable, assigning the next index.
    pub fn add_var(&mut self, v: &Var) {
        v.set_index(self.vars.len());
        self.vars.push(v.clone());
    }

    /// Unregister a variable.
    ///
    /// The variable must not be referenced by any live component; trailing
    /// variables are renumbered and Hessian keys shifted accordingly.
    pub fn remove_var(&mut self, v: &Var) {
        let pos = v.index();
        debug_assert!(self.vars.get(pos).is_some_and(|w| w == v));
        self.vars.remove(pos);
        for w in &self.vars[pos..] {
            w.set_index(w.index() - 1);
        }
        if !self.hess.is_empty() {
            let shift = |i: usize| if i > pos { i - 1 } else { i };
            self.hess = std::mem::take(&mut self.hess)
                .into_iter()
                .map(|((r, c), e)| ((shift(r), shift(c)), e))
                .collect();
        }
    }

    pub fn vars(&self) -> &[Var] {
        &self.vars
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    // ── Objective ──

    /// Install `obj` as the objective, replacing any previous one and
    /// updating the Hessian map on both sides of the swap.
    pub fn set_objective(&mut self, obj: &Objective) {
        if let Some(old) = self.obj.take() {
            let id = old.id();
            self.walk_pairs(&old.vars(), |this, key| {
                if old.has_ad2(&this.vars[key.0], &this.vars[key.1]) {
                    this.remove_contribution(key, id, true);
                }
            });
        }
        self.obj = Some(obj.clone());
        let id = obj.id();
        self.walk_pairs(&obj.vars(), |this, key| {
            if obj.has_ad2(&this.vars[key.0], &this.vars[key.1]) {
                this.hess.entry(key).or_default().obj.insert(id);
            }
        });
    }

    pub fn objective(&self) -> Option<&Objective> {
        self.obj.as_ref()
    }

    // ── Constraints ──

    /// Register a constraint (standard or conditional), assigning the next
    /// row index and installing its Hessian contributions.
    pub fn add_constraint<C: Into<AnyConstraint>>(&mut self, con: C) {
        let con = con.into();
        con.set_index(self.cons.len());
        let id = con.id();
        self.walk_pairs(&con.vars(), |this, key| {
            if con.has_ad2(&this.vars[key.0], &this.vars[key.1]) {
                this.hess.entry(key).or_default().cons.insert(id);
            }
        });
        self.cons.push(con);
    }

    /// Unregister a constraint, renumbering the rows after it and removing
    /// its Hessian contributions.
    pub fn remove_constraint<C: Into<AnyConstraint>>(&mut self, con: C) {
        let con = con.into();
        let pos = con.index();
        debug_assert!(self.cons.get(pos).is_some_and(|c| c.id() == con.id()));
        self.cons.remove(pos);
        for c in &self.cons[pos..] {
            c.set_index(c.index() - 1);
        }
        let id = con.id();
        self.walk_pairs(&con.vars(), |this, key| {
            if con.has_ad2(&this.vars[key.0], &this.vars[key.1]) {
                this.remove_contribution(key, id, false);
            }
        });
    }

    pub fn constraints(&self) -> &[AnyConstraint] {
        &self.cons
    }

    pub fn num_constraints(&self) -> usize {
        self.cons.len()
    }

    pub fn constraint_by_id(&self, id: CompId) -> Option<&AnyConstraint> {
        self.cons.iter().find(|c| c.id() == id)
    }

    // ── Sparsity ──

    /// Jacobian non-zero count: one per (constraint, referenced variable).
    pub fn jacobian_nnz(&self) -> usize {
        self.cons.iter().map(|c| c.vars().len()).sum()
    }

    /// Hessian non-zero count (lower triangle).
    pub fn hessian_nnz(&self) -> usize {
        self.hess.len()
    }

    /// The Hessian map, iterated in row-major lower-triangular order.
    pub fn hessian_entries(
        &self,
    ) -> impl Iterator<Item = (&(usize, usize), &HessEntry)> {
        self.hess.iter()
    }

    pub fn hessian_entry(&self, row: usize, col: usize) -> Option<&HessEntry> {
        self.hess.get(&(row, col))
    }

    // ── Internals ──

    /// Visit every lower-triangular index pair drawn from `vars`.
    fn walk_pairs<F>(&mut self, vars: &[Var], mut f: F)
    where
        F: FnMut(&mut Self, (usize, usize)),
    {
        for v1 in vars {
            for v2 in vars {
                let (i1, i2) = (v1.index(), v2.index());
                if i2 <= i1 {
                    f(&mut *self, (i1, i2));
                }
            }
        }
    }

    fn remove_contribution(&mut self, key: (usize, usize), id: CompId, obj: bool) {
        if let Some(entry) = self.hess.get_mut(&key) {
            if obj {
                entry.obj.remove(&id);
            } else {
                entry.cons.remove(&id);
            }
            if entry.is_empty() {
                self.hess.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Constraint;
    use crate::expr::{Expr, NumOps};

    #[test]
    fn hessian_keys_stay_lower_triangular() {
        let mut m = Model::new();
        let x = Var::new(0.0);
        let y = Var::new(0.0);
        m.add_var(&x);
        m.add_var(&y);
        m.set_objective(&Objective::new(Expr::from(&x) * &y));
        let keys: Vec<_> = m.hessian_entries().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![(1, 0)]);
    }

    #[test]
    fn replacing_the_objective_swaps_contributions() {
        let mut m = Model::new();
        let x = Var::new(0.0);
        let y = Var::new(0.0);
        m.add_var(&x);
        m.add_var(&y);
        m.set_objective(&Objective::new(Expr::from(&x).pow(2.0)));
        assert_eq!(m.hessian_nnz(), 1);
        m.set_objective(&Objective::new(Expr::from(&y).pow(2.0)));
        let keys: Vec<_> = m.hessian_entries().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![(1, 1)]);
    }

    #[test]
    fn remove_var_renumbers_and_remaps() {
        let mut m = Model::new();
        let x = Var::new(0.0);
        let y = Var::new(0.0);
        let z = Var::new(0.0);
        m.add_var(&x);
        m.add_var(&y);
        m.add_var(&z);
        let c = Constraint::equality(Expr::from(&x) * &z, 1.0);
        m.add_constraint(&c);
        assert_eq!(m.hessian_entries().next().unwrap().0, &(2, 0));
        m.remove_var(&y); // unreferenced, allowed
        assert_eq!(z.index(), 1);
        assert_eq!(m.hessian_entries().next().unwrap().0, &(1, 0));
    }

    #[test]
    fn linear_constraints_contribute_nothing() {
        let mut m = Model::new();
        let x = Var::new(0.0);
        let y = Var::new(0.0);
        m.add_var(&x);
        m.add_var(&y);
        m.add_constraint(Constraint::new(&x + &y, -1.0e20, 1.0));
        assert_eq!(m.hessian_nnz(), 0);
        assert_eq!(m.jacobian_nnz(), 2);
    }
}
