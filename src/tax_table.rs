//! Progressive tax bracket tables: parsing, structural validation and lookup.
//!
//! Validation runs once, when the engine is constructed. Lookups trust the
//! table and keep only a fail-soft zero default as a second line of defense.

use crate::decimal::{decimal_to_value, round_money, to_decimal};
use crate::error::ValidationError;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use valu3::prelude::*;
use valu3::value::Value;

/// One row of a progressive table. `max == None` denotes the trailing
/// open-ended bracket.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxBracket {
    pub min: Decimal,
    pub max: Option<Decimal>,
    pub rate: Decimal,
    pub fixed: Decimal,
    pub over: Decimal,
}

/// The record a tax lookup step stores in the execution results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BracketResult {
    pub tax: Decimal,
    pub rate: Decimal,
    pub fixed: Decimal,
    pub over: Decimal,
}

impl BracketResult {
    pub fn zero() -> Self {
        Self {
            tax: Decimal::ZERO,
            rate: Decimal::ZERO,
            fixed: Decimal::ZERO,
            over: Decimal::ZERO,
        }
    }
}

impl ToValueBehavior for BracketResult {
    fn to_value(&self) -> Value {
        let mut map = HashMap::new();
        map.insert("tax".to_string(), decimal_to_value(self.tax));
        map.insert("rate".to_string(), decimal_to_value(self.rate));
        map.insert("fixed".to_string(), decimal_to_value(self.fixed));
        map.insert("over".to_string(), decimal_to_value(self.over));
        map.to_value()
    }
}

#[derive(Debug, Clone)]
pub struct TaxTable {
    name: String,
    brackets: Vec<TaxBracket>,
}

impl TaxTable {
    /// Parse and validate one named bracket list. Structural problems raise
    /// `ValidationError`; gaps between consecutive brackets beyond the 0.01
    /// tolerance are returned as warnings for the caller to log or escalate.
    pub fn try_from_value(
        name: &str,
        value: &Value,
    ) -> Result<(Self, Vec<String>), ValidationError> {
        let items = match value {
            Value::Array(items) => items,
            _ => return Err(ValidationError::TaxTableNotArray(name.to_string())),
        };

        let mut brackets: Vec<TaxBracket> = Vec::new();
        let mut warnings = Vec::new();
        let gap_tolerance = Decimal::new(1, 2);

        for (index, item) in items.into_iter().enumerate() {
            let entry = match item {
                Value::Object(_) => item,
                _ => {
                    return Err(ValidationError::BracketNotObject {
                        table: name.to_string(),
                        index,
                    })
                }
            };

            let min = match entry.get("min") {
                Some(min) => field_decimal(name, index, "min", min)?,
                None => {
                    return Err(ValidationError::BracketMissingMin {
                        table: name.to_string(),
                        index,
                    })
                }
            };

            let max = match entry.get("max") {
                Some(Value::Null) | None => None,
                Some(max) => Some(field_decimal(name, index, "max", max)?),
            };

            let rate = optional_field(name, index, "rate", entry.get("rate"))?;
            let fixed = optional_field(name, index, "fixed", entry.get("fixed"))?;
            let over = optional_field(name, index, "over", entry.get("over"))?;

            if let Some(max) = max {
                if max < min {
                    return Err(ValidationError::BracketInvalid {
                        table: name.to_string(),
                        index,
                        detail: format!("'max' {} is less than 'min' {}", max, min),
                    });
                }
            }
            if fixed < Decimal::ZERO {
                return Err(ValidationError::BracketInvalid {
                    table: name.to_string(),
                    index,
                    detail: format!("'fixed' {} is negative", fixed),
                });
            }
            if over < Decimal::ZERO {
                return Err(ValidationError::BracketInvalid {
                    table: name.to_string(),
                    index,
                    detail: format!("'over' {} is negative", over),
                });
            }
            if over > min {
                return Err(ValidationError::BracketInvalid {
                    table: name.to_string(),
                    index,
                    detail: format!("'over' {} exceeds 'min' {}", over, min),
                });
            }

            if let Some(previous) = brackets.last() {
                if previous.max.is_none() {
                    return Err(ValidationError::OpenBracketNotLast {
                        table: name.to_string(),
                        index: index - 1,
                    });
                }
                if min < previous.min {
                    return Err(ValidationError::BracketOrder {
                        table: name.to_string(),
                        index,
                    });
                }
                if let Some(previous_max) = previous.max {
                    if min <= previous_max {
                        return Err(ValidationError::BracketOverlap {
                            table: name.to_string(),
                            index,
                        });
                    }
                    if min - previous_max > gap_tolerance {
                        warnings.push(format!(
                            "Tax table '{}': gap between bracket {} (max {}) and bracket {} (min {})",
                            name,
                            index - 1,
                            previous_max,
                            index,
                            min
                        ));
                    }
                }
            }

            brackets.push(TaxBracket {
                min,
                max,
                rate,
                fixed,
                over,
            });
        }

        if brackets.is_empty() {
            return Err(ValidationError::EmptyTaxTable(name.to_string()));
        }

        Ok((
            Self {
                name: name.to_string(),
                brackets,
            },
            warnings,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Find the bracket containing `amount` and compute
    /// `fixed + max(amount - over, 0) * rate`, rounded half-up to 2 digits.
    ///
    /// No matching bracket (an amount below the first `min`) yields the
    /// all-zero record: lookup fails soft, unlike schema validation.
    pub fn lookup(&self, amount: Decimal) -> BracketResult {
        for bracket in &self.brackets {
            let matches = match bracket.max {
                Some(max) => amount >= bracket.min && amount <= max,
                None => amount >= bracket.min,
            };
            if matches {
                let excess = (amount - bracket.over).max(Decimal::ZERO);
                return BracketResult {
                    tax: round_money(bracket.fixed + excess * bracket.rate),
                    rate: bracket.rate,
                    fixed: bracket.fixed,
                    over: bracket.over,
                };
            }
        }

        BracketResult::zero()
    }
}

fn field_decimal(
    table: &str,
    index: usize,
    field: &str,
    value: &Value,
) -> Result<Decimal, ValidationError> {
    to_decimal(value).map_err(|_| ValidationError::BracketInvalid {
        table: table.to_string(),
        index,
        detail: format!("'{}' is not a decimal: {}", field, value),
    })
}

fn optional_field(
    table: &str,
    index: usize,
    field: &str,
    value: Option<&Value>,
) -> Result<Decimal, ValidationError> {
    match value {
        Some(value) => field_decimal(table, index, field, value),
        None => Ok(Decimal::ZERO),
    }
}
