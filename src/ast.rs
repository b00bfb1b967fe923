use crate::registry::{BinaryOp, Function, UnaryOp};
use rust_decimal::Decimal;

/// A validated formula expression. Only the node kinds on the whitelist can
/// exist: literals, variable references, unary and binary operators, and
/// calls to registered functions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Decimal),
    Variable(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Maximum node depth, walked with an explicit stack so measuring a deep
    /// tree cannot itself overflow the call stack.
    pub fn depth(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(self, 1usize)];

        while let Some((node, depth)) = stack.pop() {
            if depth > max {
                max = depth;
            }

            match node {
                Expr::Literal(_) | Expr::Variable(_) => {}
                Expr::Unary { operand, .. } => stack.push((operand, depth + 1)),
                Expr::Binary { left, right, .. } => {
                    stack.push((left, depth + 1));
                    stack.push((right, depth + 1));
                }
                Expr::Call { args, .. } => {
                    for arg in args {
                        stack.push((arg, depth + 1));
                    }
                }
            }
        }

        max
    }
}
