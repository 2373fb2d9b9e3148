//! Stack interpreter for compiled programs.

use super::{OpCode, RowKind};
use crate::error::StructureError;

fn sign_of(v: f64) -> f64 {
    if v >= 0.0 {
        1.0
    } else {
        -1.0
    }
}

/// Run one reverse-Polish program against a leaf value table.
///
/// Non-negative program entries push `leaf_values[entry]`; negative entries
/// apply the corresponding [`OpCode`]. The scratch stack is cleared on
/// entry and reused across calls.
pub fn run_program(
    rpn: &[i32],
    leaf_values: &[f64],
    stack: &mut Vec<f64>,
) -> Result<f64, StructureError> {
    stack.clear();
    for &entry in rpn {
        if entry >= 0 {
            stack.push(leaf_values[entry as usize]);
            continue;
        }
        let op = OpCode::from_wire(entry).ok_or(StructureError::UnknownOpcode(entry))?;
        let res = match op {
            OpCode::Add => {
                let b = stack.pop().unwrap();
                let a = stack.pop().unwrap();
                a + b
            }
            OpCode::Sub => {
                let b = stack.pop().unwrap();
                let a = stack.pop().unwrap();
                a - b
            }
            OpCode::Mul => {
                let b = stack.pop().unwrap();
                let a = stack.pop().unwrap();
                a * b
            }
            OpCode::Div => {
                let b = stack.pop().unwrap();
                let a = stack.pop().unwrap();
                a / b
            }
            OpCode::Pow => {
                let b = stack.pop().unwrap();
                let a = stack.pop().unwrap();
                a.powf(b)
            }
            OpCode::IfElse => {
                let otherwise = stack.pop().unwrap();
                let then = stack.pop().unwrap();
                let flag = stack.pop().unwrap();
                if flag == 1.0 {
                    then
                } else {
                    otherwise
                }
            }
            OpCode::Inequality => {
                let ub = stack.pop().unwrap();
                let lb = stack.pop().unwrap();
                let val = stack.pop().unwrap();
                if val >= lb && val <= ub {
                    1.0
                } else {
                    0.0
                }
            }
            OpCode::Abs => stack.pop().unwrap().abs(),
            OpCode::Sign => sign_of(stack.pop().unwrap()),
            OpCode::Exp => stack.pop().unwrap().exp(),
            OpCode::Log => stack.pop().unwrap().ln(),
            OpCode::Neg => -stack.pop().unwrap(),
            OpCode::Sin => stack.pop().unwrap().sin(),
            OpCode::Cos => stack.pop().unwrap().cos(),
            OpCode::Tan => stack.pop().unwrap().tan(),
            OpCode::Asin => stack.pop().unwrap().asin(),
            OpCode::Acos => stack.pop().unwrap().acos(),
            OpCode::Atan => stack.pop().unwrap().atan(),
        };
        stack.push(res);
    }
    Ok(stack.pop().expect("program left no result on the stack"))
}

/// Index of the active branch: the first condition program that evaluates
/// to one, or the trailing else branch.
fn active_branch(
    condition_rpn: &[Vec<i32>],
    leaf_values: &[f64],
    stack: &mut Vec<f64>,
) -> Result<usize, StructureError> {
    for (i, cond) in condition_rpn.iter().enumerate() {
        if run_program(cond, leaf_values, stack)? == 1.0 {
            return Ok(i);
        }
    }
    Ok(condition_rpn.len())
}

/// Evaluate one row's value.
pub(crate) fn eval_row(
    kind: &RowKind,
    leaf_values: &[f64],
    stack: &mut Vec<f64>,
) -> Result<f64, StructureError> {
    match kind {
        RowKind::Std { fn_rpn, .. } => run_program(fn_rpn, leaf_values, stack),
        RowKind::Cond {
            condition_rpn,
            fn_rpn,
            ..
        } => {
            let branch = active_branch(condition_rpn, leaf_values, stack)?;
            run_program(&fn_rpn[branch], leaf_values, stack)
        }
    }
}

/// Evaluate one row's Jacobian entries into `out` (one per row column).
pub(crate) fn jac_row(
    kind: &RowKind,
    leaf_values: &[f64],
    out: &mut [f64],
    stack: &mut Vec<f64>,
) -> Result<(), StructureError> {
    match kind {
        RowKind::Std { jac_rpn, .. } => {
            for (o, rpn) in out.iter_mut().zip(jac_rpn) {
                *o = run_program(rpn, leaf_values, stack)?;
            }
        }
        RowKind::Cond {
            condition_rpn,
            jac_rpn,
            ..
        } => {
            let branch = active_branch(condition_rpn, leaf_values, stack)?;
            for (o, rpn) in out.iter_mut().zip(&jac_rpn[branch]) {
                *o = run_program(rpn, leaf_values, stack)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn if_else_selects_on_flag() {
        // flag, then, else, IF_ELSE
        let program = [0, 1, 2, OpCode::IfElse.wire()];
        let mut stack = Vec::new();
        assert_eq!(
            run_program(&program, &[1.0, 10.0, 20.0], &mut stack).unwrap(),
            10.0
        );
        assert_eq!(
            run_program(&program, &[0.0, 10.0, 20.0], &mut stack).unwrap(),
            20.0
        );
    }

    #[test]
    fn inequality_is_a_closed_range_test() {
        // value, lb, ub, INEQUALITY
        let program = [0, 1, 2, OpCode::Inequality.wire()];
        let mut stack = Vec::new();
        assert_eq!(
            run_program(&program, &[0.5, 0.0, 1.0], &mut stack).unwrap(),
            1.0
        );
        assert_eq!(
            run_program(&program, &[1.5, 0.0, 1.0], &mut stack).unwrap(),
            0.0
        );
        assert_eq!(
            run_program(&program, &[1.0, 0.0, 1.0], &mut stack).unwrap(),
            1.0
        );
    }

    #[test]
    fn unknown_opcode_is_a_structure_error() {
        let program = [0, -99];
        let mut stack = Vec::new();
        let err = run_program(&program, &[1.0], &mut stack).unwrap_err();
        assert_eq!(err, StructureError::UnknownOpcode(-99));
    }

    #[test]
    fn arithmetic_chain() {
        // (a + b) * c - d
        let program = [
            0,
            1,
            OpCode::Add.wire(),
            2,
            OpCode::Mul.wire(),
            3,
            OpCode::Sub.wire(),
        ];
        let mut stack = Vec::new();
        assert_eq!(
            run_program(&program, &[1.0, 2.0, 4.0, 5.0], &mut stack).unwrap(),
            7.0
        );
    }

    #[test]
    fn sign_of_negative_is_minus_one() {
        let program = [0, OpCode::Sign.wire()];
        let mut stack = Vec::new();
        assert_eq!(run_program(&program, &[-0.5], &mut stack).unwrap(), -1.0);
        assert_eq!(run_program(&program, &[0.0], &mut stack).unwrap(), 1.0);
    }
}
