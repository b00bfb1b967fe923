use crate::context::Context;
use crate::decimal::to_decimal;
use crate::error::CalculationError;
use rust_decimal::Decimal;
use serde::Serialize;
use valu3::prelude::*;
use valu3::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Operator {
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Equal,
    NotEqual,
}

impl Operator {
    pub fn try_from_value(value: &Value) -> Result<Self, CalculationError> {
        // as_str panics on non-string values, so guard on the variant first.
        let symbol = match value {
            Value::String(_) => value.as_str(),
            other => return Err(CalculationError::InvalidOperator(other.to_string())),
        };

        match symbol {
            ">" | "greater_than" => Ok(Operator::GreaterThan),
            ">=" | "greater_than_or_equal" => Ok(Operator::GreaterThanOrEqual),
            "<" | "less_than" => Ok(Operator::LessThan),
            "<=" | "less_than_or_equal" => Ok(Operator::LessThanOrEqual),
            "==" | "equal" => Ok(Operator::Equal),
            "!=" | "not_equal" => Ok(Operator::NotEqual),
            other => Err(CalculationError::InvalidOperator(other.to_string())),
        }
    }

    pub fn apply(&self, left: Decimal, right: Decimal) -> bool {
        match self {
            Operator::GreaterThan => left > right,
            Operator::GreaterThanOrEqual => left >= right,
            Operator::LessThan => left < right,
            Operator::LessThanOrEqual => left <= right,
            Operator::Equal => left == right,
            Operator::NotEqual => left != right,
        }
    }
}

/// A `{left, operator, right}` comparison from a conditional step. Operands
/// are resolved against the bindings table at evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub(crate) left: Value,
    pub(crate) operator: Operator,
    pub(crate) right: Value,
}

impl Condition {
    pub fn try_from_value(value: &Value) -> Result<Self, CalculationError> {
        let object = match value.as_object() {
            Some(object) => object,
            None => return Err(CalculationError::ConditionNotObject(value.to_string())),
        };

        let left = match object.get("left") {
            Some(left) => left.clone(),
            None => return Err(CalculationError::LeftInvalid("does not exist".to_string())),
        };

        let right = match object.get("right") {
            Some(right) => right.clone(),
            None => return Err(CalculationError::RightInvalid("does not exist".to_string())),
        };

        let operator = match object.get("operator") {
            Some(operator) => Operator::try_from_value(operator)?,
            None => {
                return Err(CalculationError::InvalidOperator(
                    "does not exist".to_string(),
                ))
            }
        };

        Ok(Self {
            left,
            operator,
            right,
        })
    }

    pub fn evaluate(&self, context: &Context) -> Result<bool, CalculationError> {
        let left = resolve_operand(&self.left, context)?;
        let right = resolve_operand(&self.right, context)?;
        Ok(self.operator.apply(left, right))
    }
}

/// A string naming a bound variable resolves to its value; anything else is
/// converted as a literal.
pub(crate) fn resolve_operand(
    value: &Value,
    context: &Context,
) -> Result<Decimal, CalculationError> {
    if let Value::String(_) = value {
        if let Some(bound) = context.get(value.as_str()) {
            return Ok(bound);
        }
    }

    to_decimal(value).map_err(|err| CalculationError::NotDecimal(err.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;
    use valu3::json;

    fn dec(text: &str) -> Decimal {
        Decimal::from_str_exact(text).unwrap()
    }

    #[test]
    fn test_condition_with_variable_operand() {
        let mut context = Context::new();
        context.bind("salary", dec("5000"));

        let condition = Condition::try_from_value(&json!({
            "left": "salary",
            "operator": ">",
            "right": 3000
        }))
        .unwrap();

        assert!(condition.evaluate(&context).unwrap());
    }

    #[test]
    fn test_condition_with_literal_operands() {
        let context = Context::new();

        let condition = Condition::try_from_value(&json!({
            "left": 10,
            "operator": "<=",
            "right": 20
        }))
        .unwrap();

        assert!(condition.evaluate(&context).unwrap());
    }

    #[test]
    fn test_unbound_string_operand_is_parsed_as_literal() {
        let context = Context::new();

        let condition = Condition::try_from_value(&json!({
            "left": "100",
            "operator": "==",
            "right": 100
        }))
        .unwrap();

        assert!(condition.evaluate(&context).unwrap());
    }

    #[test]
    fn test_word_operators_accepted() {
        let context = Context::new();

        let condition = Condition::try_from_value(&json!({
            "left": 1,
            "operator": "not_equal",
            "right": 2
        }))
        .unwrap();

        assert!(condition.evaluate(&context).unwrap());
    }

    #[test]
    fn test_invalid_operator_rejected() {
        match Condition::try_from_value(&json!({
            "left": 1,
            "operator": "===",
            "right": 2
        })) {
            Err(CalculationError::InvalidOperator(op)) => assert_eq!(op, "==="),
            other => panic!("expected invalid operator, got {:?}", other),
        }
    }

    #[test]
    fn test_non_string_operator_rejected() {
        match Condition::try_from_value(&json!({
            "left": 1,
            "operator": 5,
            "right": 2
        })) {
            Err(CalculationError::InvalidOperator(op)) => assert_eq!(op, "5"),
            other => panic!("expected invalid operator, got {:?}", other),
        }
    }

    #[test]
    fn test_non_object_condition_rejected() {
        assert!(matches!(
            Condition::try_from_value(&"salary > 3000".to_value()),
            Err(CalculationError::ConditionNotObject(_))
        ));
    }

    #[test]
    fn test_missing_left_rejected() {
        assert!(matches!(
            Condition::try_from_value(&json!({"operator": ">", "right": 1})),
            Err(CalculationError::LeftInvalid(_))
        ));
    }
}
