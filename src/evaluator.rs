//! Tree-walking evaluation of validated formula expressions.
//!
//! The evaluator trusts that the parser ran first and does not re-check
//! safety. Evaluation is deterministic and side-effect free: the same tree
//! and bindings always yield the same decimal.

use crate::ast::Expr;
use crate::context::Context;
use crate::error::CalculationError;
use crate::registry::{BinaryOp, Function, UnaryOp};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};

pub fn evaluate(
    expr: &Expr,
    context: &Context,
    strict: bool,
) -> Result<Decimal, CalculationError> {
    match expr {
        Expr::Literal(value) => Ok(*value),
        Expr::Variable(name) => {
            context
                .get(name)
                .ok_or_else(|| CalculationError::UndefinedVariable {
                    name: name.clone(),
                    available: context.variable_names(),
                })
        }
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, context, strict)?;
            Ok(match op {
                UnaryOp::Plus => value,
                UnaryOp::Neg => -value,
            })
        }
        Expr::Binary { op, left, right } => {
            let left = evaluate(left, context, strict)?;
            let right = evaluate(right, context, strict)?;
            apply_binary(*op, left, right, strict)
        }
        Expr::Call { function, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(evaluate(arg, context, strict)?);
            }
            apply_function(*function, &values)
        }
    }
}

fn apply_binary(
    op: BinaryOp,
    left: Decimal,
    right: Decimal,
    strict: bool,
) -> Result<Decimal, CalculationError> {
    let overflow =
        |op: BinaryOp| CalculationError::Overflow(format!("{} {} {}", left, op.symbol(), right));

    match op {
        BinaryOp::Add => left.checked_add(right).ok_or_else(|| overflow(op)),
        BinaryOp::Sub => left.checked_sub(right).ok_or_else(|| overflow(op)),
        BinaryOp::Mul => left.checked_mul(right).ok_or_else(|| overflow(op)),
        BinaryOp::Div => {
            if right.is_zero() {
                zero_division(op, left, strict)
            } else {
                left.checked_div(right).ok_or_else(|| overflow(op))
            }
        }
        BinaryOp::FloorDiv => {
            if right.is_zero() {
                zero_division(op, left, strict)
            } else {
                left.checked_div(right)
                    .map(|quotient| quotient.floor())
                    .ok_or_else(|| overflow(op))
            }
        }
        BinaryOp::Mod => {
            if right.is_zero() {
                zero_division(op, left, strict)
            } else {
                floored_rem(left, right).ok_or_else(|| overflow(op))
            }
        }
        BinaryOp::Pow => power(left, right).ok_or_else(|| overflow(op)),
        BinaryOp::Gt => Ok(bool_decimal(left > right)),
        BinaryOp::Ge => Ok(bool_decimal(left >= right)),
        BinaryOp::Lt => Ok(bool_decimal(left < right)),
        BinaryOp::Le => Ok(bool_decimal(left <= right)),
        BinaryOp::Eq => Ok(bool_decimal(left == right)),
        BinaryOp::Ne => Ok(bool_decimal(left != right)),
    }
}

fn zero_division(
    op: BinaryOp,
    left: Decimal,
    strict: bool,
) -> Result<Decimal, CalculationError> {
    if strict {
        Err(CalculationError::DivisionByZero(format!(
            "{} {} 0",
            left,
            op.symbol()
        )))
    } else {
        Ok(Decimal::ZERO)
    }
}

// Floored remainder, so `%` shares the sign convention of `//`:
// -10 % 4 is 2 and -10 // 4 is -3.
fn floored_rem(left: Decimal, right: Decimal) -> Option<Decimal> {
    let quotient = left.checked_div(right)?.floor();
    left.checked_sub(quotient.checked_mul(right)?)
}

fn power(base: Decimal, exponent: Decimal) -> Option<Decimal> {
    if exponent.fract().is_zero() {
        base.checked_powi(exponent.to_i64()?)
    } else if base.is_sign_negative() {
        // Fractional power of a negative base has no real result.
        None
    } else {
        base.checked_powd(exponent)
    }
}

fn bool_decimal(value: bool) -> Decimal {
    if value {
        Decimal::ONE
    } else {
        Decimal::ZERO
    }
}

fn apply_function(function: Function, args: &[Decimal]) -> Result<Decimal, CalculationError> {
    match function {
        Function::Min => Ok(args.iter().copied().fold(args[0], |a, b| a.min(b))),
        Function::Max => Ok(args.iter().copied().fold(args[0], |a, b| a.max(b))),
        Function::Abs => Ok(args[0].abs()),
        Function::Round => {
            let digits = if args.len() == 2 {
                let digits = args[1];
                if !digits.fract().is_zero()
                    || digits < Decimal::ZERO
                    || digits > Decimal::TEN
                {
                    return Err(CalculationError::InvalidRound(digits.to_string()));
                }
                digits.to_u32().unwrap_or(0)
            } else {
                0
            };
            Ok(args[0].round_dp_with_strategy(digits, RoundingStrategy::MidpointAwayFromZero))
        }
    }
}
