//! Text form of expressions, for debugging and constraint printing.

use std::fmt;

use super::{BinOp, Expr, UnOp};

fn needs_parens(e: &Expr) -> bool {
    matches!(e, Expr::Sum(_) | Expr::Binary(_))
}

fn write_operand(f: &mut fmt::Formatter<'_>, e: &Expr) -> fmt::Result {
    if needs_parens(e) {
        write!(f, "({})", e)
    } else {
        write!(f, "{}", e)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Var(v) => write!(f, "{}", v),
            Expr::Param(p) => write!(f, "{}", p),
            Expr::Const(c) => write!(f, "{}", c),
            Expr::Sum(s) => {
                let mut lead = false;
                if s.constant() != 0.0 || s.terms().is_empty() {
                    write!(f, "{}", s.constant())?;
                    lead = true;
                }
                for t in s.terms() {
                    let (sign, mag) = if t.coef < 0.0 {
                        ("-", -t.coef)
                    } else {
                        ("+", t.coef)
                    };
                    if lead {
                        write!(f, " {} ", sign)?;
                    } else {
                        if sign == "-" {
                            write!(f, "-")?;
                        }
                        lead = true;
                    }
                    if mag != 1.0 {
                        write!(f, "{}*", mag)?;
                    }
                    write_operand(f, &t.expr)?;
                }
                Ok(())
            }
            Expr::Binary(b) => {
                let sym = match b.op {
                    BinOp::Mul => "*",
                    BinOp::Div => "/",
                    BinOp::Pow => "**",
                };
                write_operand(f, &b.lhs)?;
                write!(f, "{}", sym)?;
                write_operand(f, &b.rhs)
            }
            Expr::Unary(u) => {
                let name = match u.op {
                    UnOp::Abs => "abs",
                    UnOp::Sign => "sign",
                    UnOp::Exp => "exp",
                    UnOp::Ln => "log",
                    UnOp::Sin => "sin",
                    UnOp::Cos => "cos",
                    UnOp::Tan => "tan",
                    UnOp::Asin => "asin",
                    UnOp::Acos => "acos",
                    UnOp::Atan => "atan",
                };
                write!(f, "{}({})", name, u.arg)
            }
        }
    }
}
