//! Expression → reverse-Polish compiler.
//!
//! Each constraint gets its own leaf table; programs reference leaves by
//! table position. Jacobian programs are symbolic derivatives of the
//! constraint expression, emitted through the same simplifying builders as
//! user expressions, so vanished terms never reach the wire.

use std::collections::{BTreeMap, HashMap};

use super::{LeafRef, OpCode, RowKind, RowProgram};
use crate::component::AnyConstraint;
use crate::error::StructureError;
use crate::expr::{BinOp, Expr, UnOp};
use crate::leaf::{LeafId, Var};

/// Sentinel used as the open lower end of a compiled condition test.
const COND_LOWER: f64 = -1.0e100;

#[derive(Default)]
struct LeafTable {
    leaves: Vec<LeafRef>,
    by_id: HashMap<LeafId, usize>,
    consts: HashMap<u64, usize>,
}

impl LeafTable {
    fn slot(&mut self, leaf: LeafRef, id: Option<LeafId>) -> i32 {
        if let Some(id) = id {
            if let Some(&i) = self.by_id.get(&id) {
                return i as i32;
            }
            let i = self.leaves.len();
            self.by_id.insert(id, i);
            self.leaves.push(leaf);
            return i as i32;
        }
        let bits = match &leaf {
            LeafRef::Const(c) => c.to_bits(),
            _ => unreachable!("anonymous slots are constants"),
        };
        if let Some(&i) = self.consts.get(&bits) {
            return i as i32;
        }
        let i = self.leaves.len();
        self.consts.insert(bits, i);
        self.leaves.push(leaf);
        i as i32
    }

    fn slot_const(&mut self, c: f64) -> i32 {
        self.slot(LeafRef::Const(c), None)
    }
}

/// Emit `expr` onto `out` in postorder.
fn emit(expr: &Expr, table: &mut LeafTable, out: &mut Vec<i32>) {
    match expr {
        Expr::Var(v) => out.push(table.slot(LeafRef::Var(v.clone()), Some(v.id()))),
        Expr::Param(p) => out.push(table.slot(LeafRef::Param(p.clone()), Some(p.id()))),
        Expr::Const(c) => out.push(table.slot_const(*c)),
        Expr::Sum(s) => {
            let mut have_acc = s.constant() != 0.0 || s.terms().is_empty();
            if have_acc {
                out.push(table.slot_const(s.constant()));
            }
            for t in s.terms() {
                if have_acc {
                    if t.coef == 1.0 {
                        emit(&t.expr, table, out);
                        out.push(OpCode::Add.wire());
                    } else if t.coef == -1.0 {
                        emit(&t.expr, table, out);
                        out.push(OpCode::Sub.wire());
                    } else {
                        out.push(table.slot_const(t.coef));
                        emit(&t.expr, table, out);
                        out.push(OpCode::Mul.wire());
                        out.push(OpCode::Add.wire());
                    }
                } else {
                    if t.coef == 1.0 {
                        emit(&t.expr, table, out);
                    } else if t.coef == -1.0 {
                        emit(&t.expr, table, out);
                        out.push(OpCode::Neg.wire());
                    } else {
                        out.push(table.slot_const(t.coef));
                        emit(&t.expr, table, out);
                        out.push(OpCode::Mul.wire());
                    }
                    have_acc = true;
                }
            }
        }
        Expr::Binary(b) => {
            emit(&b.lhs, table, out);
            emit(&b.rhs, table, out);
            out.push(
                match b.op {
                    BinOp::Mul => OpCode::Mul,
                    BinOp::Div => OpCode::Div,
                    BinOp::Pow => OpCode::Pow,
                }
                .wire(),
            );
        }
        Expr::Unary(u) => {
            emit(&u.arg, table, out);
            out.push(
                match u.op {
                    UnOp::Abs => OpCode::Abs,
                    UnOp::Sign => OpCode::Sign,
                    UnOp::Exp => OpCode::Exp,
                    UnOp::Ln => OpCode::Log,
                    UnOp::Sin => OpCode::Sin,
                    UnOp::Cos => OpCode::Cos,
                    UnOp::Tan => OpCode::Tan,
                    UnOp::Asin => OpCode::Asin,
                    UnOp::Acos => OpCode::Acos,
                    UnOp::Atan => OpCode::Atan,
                }
                .wire(),
            );
        }
    }
}

fn program(expr: &Expr, table: &mut LeafTable) -> Vec<i32> {
    let mut out = Vec::new();
    emit(expr, table, &mut out);
    out
}

/// Compile `cond <= 0` into a range test yielding one when satisfied.
fn condition_program(cond: &Expr, table: &mut LeafTable) -> Vec<i32> {
    let mut out = Vec::new();
    emit(cond, table, &mut out);
    out.push(table.slot_const(COND_LOWER));
    out.push(table.slot_const(0.0));
    out.push(OpCode::Inequality.wire());
    out
}

/// The row's variables as (column, var) pairs, ascending by column.
fn row_columns(exprs: &[&Expr], columns: &BTreeMap<LeafId, usize>) -> Vec<(usize, Var)> {
    let mut vars = BTreeMap::new();
    for e in exprs {
        e.collect_vars(&mut vars);
    }
    let mut out: Vec<(usize, Var)> = vars
        .into_values()
        .map(|v| {
            let col = *columns.get(&v.id()).unwrap_or_else(|| {
                panic!("constraint references a variable not registered with the evaluator")
            });
            (col, v)
        })
        .collect();
    out.sort_by_key(|(col, _)| *col);
    out
}

pub(crate) fn compile_row(
    con: &AnyConstraint,
    columns: &BTreeMap<LeafId, usize>,
) -> Result<RowProgram, StructureError> {
    let mut table = LeafTable::default();
    match con {
        AnyConstraint::Std(c) => {
            let cols = row_columns(&[c.expr()], columns);
            let fn_rpn = program(c.expr(), &mut table);
            let jac_rpn = cols
                .iter()
                .map(|(_, v)| program(&c.expr().diff(v), &mut table))
                .collect();
            Ok(RowProgram {
                leaves: table.leaves,
                cols: cols.into_iter().map(|(col, _)| col).collect(),
                kind: RowKind::Std { fn_rpn, jac_rpn },
            })
        }
        AnyConstraint::Cond(c) => {
            if c.branches().len() != c.conditions().len() + 1 {
                return Err(StructureError::ConditionalCardinality {
                    conditions: c.conditions().len(),
                    branches: c.branches().len(),
                });
            }
            let branch_refs: Vec<&Expr> = c.branches().iter().collect();
            let cols = row_columns(&branch_refs, columns);
            let condition_rpn = c
                .conditions()
                .iter()
                .map(|cond| condition_program(cond, &mut table))
                .collect();
            let fn_rpn = c
                .branches()
                .iter()
                .map(|b| program(b, &mut table))
                .collect();
            let jac_rpn = c
                .branches()
                .iter()
                .map(|b| {
                    cols.iter()
                        .map(|(_, v)| program(&b.diff(v), &mut table))
                        .collect()
                })
                .collect();
            Ok(RowProgram {
                leaves: table.leaves,
                cols: cols.into_iter().map(|(col, _)| col).collect(),
                kind: RowKind::Cond {
                    condition_rpn,
                    fn_rpn,
                    jac_rpn,
                },
            })
        }
    }
}
