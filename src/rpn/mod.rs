//! Compiled stack-machine evaluator.
//!
//! The second operating mode of the crate: constraints are compiled into
//! reverse-Polish programs over per-constraint leaf tables, and evaluated
//! on a flat stack to produce residual values and a CSR Jacobian for an
//! external Newton-type solver. Conditional constraints compile to an
//! `if/elif/else` ladder of condition programs scanned at run time.
//!
//! Programs are plain `Vec<i32>` in the wire format: non-negative entries
//! index the leaf table, negative entries are [`OpCode`]s.

mod compile;
mod interp;

#[cfg(feature = "parallel")]
mod parallel;

use std::collections::{BTreeMap, BTreeSet};

use crate::component::{AnyConstraint, CompId};
use crate::error::StructureError;
use crate::leaf::{LeafId, Param, Var};

pub use interp::run_program;

/// Stack-machine operation codes, with their stable wire values.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OpCode {
    Add = -1,
    Sub = -2,
    Mul = -3,
    Div = -4,
    Pow = -5,
    Abs = -6,
    Sign = -7,
    /// Ternary select: pops else-value, then-value, and a flag; yields the
    /// then-value when the flag equals one.
    IfElse = -8,
    /// Ternary range test: pops upper, lower, and a value; yields one when
    /// `lower <= value <= upper`, else zero.
    Inequality = -9,
    Exp = -10,
    Log = -11,
    Neg = -12,
    Sin = -13,
    Cos = -14,
    Tan = -15,
    Asin = -16,
    Acos = -17,
    Atan = -18,
}

impl OpCode {
    /// The wire value of this opcode.
    pub fn wire(self) -> i32 {
        self as i32
    }

    /// Decode a wire value.
    pub fn from_wire(raw: i32) -> Option<OpCode> {
        Some(match raw {
            -1 => OpCode::Add,
            -2 => OpCode::Sub,
            -3 => OpCode::Mul,
            -4 => OpCode::Div,
            -5 => OpCode::Pow,
            -6 => OpCode::Abs,
            -7 => OpCode::Sign,
            -8 => OpCode::IfElse,
            -9 => OpCode::Inequality,
            -10 => OpCode::Exp,
            -11 => OpCode::Log,
            -12 => OpCode::Neg,
            -13 => OpCode::Sin,
            -14 => OpCode::Cos,
            -15 => OpCode::Tan,
            -16 => OpCode::Asin,
            -17 => OpCode::Acos,
            -18 => OpCode::Atan,
            _ => return None,
        })
    }
}

/// A leaf slot in a compiled constraint's table.
#[derive(Debug, Clone)]
pub(crate) enum LeafRef {
    Var(Var),
    Param(Param),
    Const(f64),
}

impl LeafRef {
    fn value(&self) -> f64 {
        match self {
            LeafRef::Var(v) => v.value(),
            LeafRef::Param(p) => p.value(),
            LeafRef::Const(c) => *c,
        }
    }
}

/// Compiled programs for one constraint row. Only plain data, so the
/// programs can be shared across worker threads.
#[derive(Debug)]
pub(crate) enum RowKind {
    Std {
        fn_rpn: Vec<i32>,
        /// One Jacobian program per entry of the row's column list.
        jac_rpn: Vec<Vec<i32>>,
    },
    Cond {
        /// One condition program per non-else branch.
        condition_rpn: Vec<Vec<i32>>,
        /// One value program per branch (else last).
        fn_rpn: Vec<Vec<i32>>,
        /// `jac_rpn[branch][k]` differentiates branch `branch` by the row's
        /// `k`-th column.
        jac_rpn: Vec<Vec<Vec<i32>>>,
    },
}

#[derive(Debug)]
pub(crate) struct RowProgram {
    pub(crate) leaves: Vec<LeafRef>,
    /// Columns this row's Jacobian touches, ascending.
    pub(crate) cols: Vec<usize>,
    pub(crate) kind: RowKind,
}

impl RowProgram {
    pub(crate) fn leaf_values(&self) -> Vec<f64> {
        self.leaves.iter().map(LeafRef::value).collect()
    }
}

#[derive(Debug)]
pub(crate) struct Structure {
    pub(crate) var_vector: Vec<Var>,
    pub(crate) rows: Vec<RowProgram>,
    pub(crate) row_nnz: Vec<usize>,
    pub(crate) col_ndx: Vec<usize>,
    pub(crate) stack_size: usize,
}

/// Registry and compiler for the stack-machine mode.
///
/// Register variables, parameters, and constraints, then call
/// [`set_structure`](Self::set_structure) to compile. Any mutation of the
/// registry drops the compiled structure; evaluation entry points fail with
/// a [`StructureError`] until it is rebuilt.
#[derive(Debug, Default)]
pub struct Evaluator {
    vars: Vec<Var>,
    var_ids: BTreeSet<LeafId>,
    params: Vec<Param>,
    param_ids: BTreeSet<LeafId>,
    cons: Vec<AnyConstraint>,
    con_ids: BTreeSet<CompId>,
    structure: Option<Structure>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable. Its column is assigned at `set_structure` time,
    /// in registration order.
    pub fn add_var(&mut self, v: &Var) {
        self.release_structure();
        if self.var_ids.insert(v.id()) {
            self.vars.push(v.clone());
        }
    }

    pub fn remove_var(&mut self, v: &Var) {
        self.release_structure();
        if self.var_ids.remove(&v.id()) {
            self.vars.retain(|w| w != v);
        }
    }

    /// Register a parameter referenced by some constraint.
    pub fn add_param(&mut self, p: &Param) {
        self.release_structure();
        if self.param_ids.insert(p.id()) {
            self.params.push(p.clone());
        }
    }

    pub fn remove_param(&mut self, p: &Param) {
        self.release_structure();
        if self.param_ids.remove(&p.id()) {
            self.params.retain(|q| q != p);
        }
    }

    /// Register a constraint (standard or conditional). Row order is
    /// registration order.
    pub fn add_constraint<C: Into<AnyConstraint>>(&mut self, con: C) {
        self.release_structure();
        let con = con.into();
        if self.con_ids.insert(con.id()) {
            self.cons.push(con);
        }
    }

    pub fn remove_constraint<C: Into<AnyConstraint>>(&mut self, con: C) {
        self.release_structure();
        let con = con.into();
        if self.con_ids.remove(&con.id()) {
            self.cons.retain(|c| c.id() != con.id());
        }
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.cons.len()
    }

    pub fn is_structure_set(&self) -> bool {
        self.structure.is_some()
    }

    /// Compile all registered constraints: assign variable columns, emit
    /// value/Jacobian/condition programs, build the CSR index arrays, and
    /// size the evaluation stack.
    pub fn set_structure(&mut self) -> Result<(), StructureError> {
        self.release_structure();

        let mut columns = BTreeMap::new();
        for (col, v) in self.vars.iter().enumerate() {
            v.set_index(col);
            columns.insert(v.id(), col);
        }

        let mut rows = Vec::with_capacity(self.cons.len());
        for (i, con) in self.cons.iter().enumerate() {
            con.set_index(i);
            rows.push(compile::compile_row(con, &columns)?);
        }

        let mut row_nnz = Vec::with_capacity(rows.len() + 1);
        row_nnz.push(0);
        let mut col_ndx = Vec::new();
        for row in &rows {
            col_ndx.extend_from_slice(&row.cols);
            row_nnz.push(col_ndx.len());
        }

        let stack_size = rows.iter().map(max_program_len).max().unwrap_or(0);

        self.structure = Some(Structure {
            var_vector: self.vars.clone(),
            rows,
            row_nnz,
            col_ndx,
            stack_size,
        });
        Ok(())
    }

    /// Tear down the compiled tables. Required before mutating the
    /// registry; mutation entry points also call this themselves.
    pub fn release_structure(&mut self) {
        self.structure = None;
    }

    fn structure(&self) -> Result<&Structure, StructureError> {
        self.structure.as_ref().ok_or(StructureError::StructureNotSet)
    }

    /// Total Jacobian non-zeros.
    pub fn nnz(&self) -> Result<usize, StructureError> {
        Ok(*self.structure()?.row_nnz.last().unwrap_or(&0))
    }

    /// Copy the current variable values out in column order.
    pub fn get_x(&self, out: &mut [f64]) -> Result<(), StructureError> {
        let s = self.structure()?;
        for (o, v) in out.iter_mut().zip(&s.var_vector) {
            *o = v.value();
        }
        Ok(())
    }

    /// Write solver iterates back into the variables, in column order.
    pub fn load_var_values(&self, x: &[f64]) -> Result<(), StructureError> {
        let s = self.structure()?;
        for (xi, v) in x.iter().zip(&s.var_vector) {
            v.set_value(*xi);
        }
        Ok(())
    }

    /// Evaluate every constraint into `out` (one value per row).
    pub fn evaluate(&self, out: &mut [f64]) -> Result<(), StructureError> {
        let s = self.structure()?;
        assert_eq!(out.len(), s.rows.len(), "output length must equal row count");
        let mut stack = Vec::with_capacity(s.stack_size);
        for (o, row) in out.iter_mut().zip(&s.rows) {
            let values = row.leaf_values();
            *o = interp::eval_row(&row.kind, &values, &mut stack)?;
        }
        Ok(())
    }

    /// Evaluate the Jacobian in CSR form.
    ///
    /// `row_nnz` must hold `m + 1` entries, `values` and `col_ndx` one per
    /// non-zero. Values land in row-major order matching the index arrays;
    /// conditional rows differentiate their active branch.
    pub fn evaluate_csr_jacobian(
        &self,
        values: &mut [f64],
        col_ndx: &mut [usize],
        row_nnz: &mut [usize],
    ) -> Result<(), StructureError> {
        let s = self.structure()?;
        assert_eq!(row_nnz.len(), s.row_nnz.len(), "row_nnz length must be m + 1");
        assert_eq!(values.len(), s.col_ndx.len(), "values length must equal nnz");
        assert_eq!(col_ndx.len(), s.col_ndx.len(), "col_ndx length must equal nnz");
        row_nnz.copy_from_slice(&s.row_nnz);
        col_ndx.copy_from_slice(&s.col_ndx);

        let mut stack = Vec::with_capacity(s.stack_size);
        for (i, row) in s.rows.iter().enumerate() {
            let leaf_values = row.leaf_values();
            let out = &mut values[s.row_nnz[i]..s.row_nnz[i + 1]];
            interp::jac_row(&row.kind, &leaf_values, out, &mut stack)?;
        }
        Ok(())
    }
}

fn max_program_len(row: &RowProgram) -> usize {
    match &row.kind {
        RowKind::Std { fn_rpn, jac_rpn } => jac_rpn
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(fn_rpn.len()))
            .max()
            .unwrap_or(0),
        RowKind::Cond {
            condition_rpn,
            fn_rpn,
            jac_rpn,
        } => condition_rpn
            .iter()
            .chain(fn_rpn.iter())
            .map(Vec::len)
            .chain(jac_rpn.iter().flatten().map(Vec::len))
            .max()
            .unwrap_or(0),
    }
}
