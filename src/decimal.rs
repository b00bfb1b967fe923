use crate::error::ValidationError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use valu3::prelude::*;
use valu3::value::Value;

/// Fractional digits kept at the result boundary.
pub const MONEY_SCALE: u32 = 2;

/// Canonicalize any schema or input value into an exact decimal.
///
/// Numbers travel through their string form, never through binary floats.
/// Booleans must be checked before numbers.
pub fn to_decimal(value: &Value) -> Result<Decimal, ValidationError> {
    match value {
        Value::Null => Ok(Decimal::ZERO),
        Value::Boolean(true) => Ok(Decimal::ONE),
        Value::Boolean(false) => Ok(Decimal::ZERO),
        Value::Number(_) => parse_decimal(&value.to_string()),
        Value::String(_) => parse_decimal(value.as_str().trim()),
        other => Err(ValidationError::NotDecimal(other.to_string())),
    }
}

fn parse_decimal(text: &str) -> Result<Decimal, ValidationError> {
    Decimal::from_str_exact(text).map_err(|_| ValidationError::NotDecimal(text.to_string()))
}

/// Division that yields zero for a zero denominator, mirroring the
/// evaluator's non-strict zero-division policy.
pub fn safe_divide(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        numerator
            .checked_div(denominator)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Round to two fractional digits, half away from zero. The result always
/// carries scale 2 so money values display as `11000.00`, not `11000.0`.
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// Boundary conversion: rounded plain number for the JSON result document.
pub fn decimal_to_value(value: Decimal) -> Value {
    Value::from(round_money(value).to_f64().unwrap_or(0.0))
}

#[cfg(test)]
mod test {
    use super::*;
    use valu3::json;
    use valu3::traits::ToValueBehavior;

    fn dec(text: &str) -> Decimal {
        Decimal::from_str_exact(text).unwrap()
    }

    #[test]
    fn test_null_is_zero() {
        assert_eq!(to_decimal(&Value::Null).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_booleans_before_numbers() {
        assert_eq!(to_decimal(&true.to_value()).unwrap(), Decimal::ONE);
        assert_eq!(to_decimal(&false.to_value()).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_numbers_convert_exactly() {
        assert_eq!(to_decimal(&json!(10000)).unwrap(), dec("10000"));
        assert_eq!(to_decimal(&json!(0.15)).unwrap(), dec("0.15"));
        assert_eq!(to_decimal(&json!(-3.5)).unwrap(), dec("-3.5"));
    }

    #[test]
    fn test_numeric_strings_convert() {
        assert_eq!(to_decimal(&"123.45".to_value()).unwrap(), dec("123.45"));
        assert_eq!(to_decimal(&" 7 ".to_value()).unwrap(), dec("7"));
    }

    #[test]
    fn test_idempotent_through_string_form() {
        let first = to_decimal(&json!(1234.567)).unwrap();
        let again = to_decimal(&first.to_string().to_value()).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_rejects_non_numeric_values() {
        assert!(to_decimal(&"salary".to_value()).is_err());
        assert!(to_decimal(&json!([1, 2])).is_err());
        assert!(to_decimal(&json!({"a": 1})).is_err());
    }

    #[test]
    fn test_safe_divide_zero_denominator() {
        assert_eq!(safe_divide(dec("10"), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(safe_divide(dec("10"), dec("4")), dec("2.5"));
    }

    #[test]
    fn test_round_money_half_up() {
        assert_eq!(round_money(dec("2.005")), dec("2.01"));
        assert_eq!(round_money(dec("2.004")), dec("2.00"));
        assert_eq!(round_money(dec("-2.005")), dec("-2.01"));
    }

    #[test]
    fn test_round_money_always_two_digits() {
        assert_eq!(round_money(dec("11000")).to_string(), "11000.00");
        assert_eq!(round_money(dec("0.5")).to_string(), "0.50");
    }
}
