//! The four step kinds and their execution.
//!
//! A schema's `type` string is mapped to a `StepKind` variant at load time.
//! Each step reads the current bindings and produces one new named value.

use crate::condition::{resolve_operand, Condition};
use crate::context::{Context, StepResult};
use crate::error::{CalculationError, ValidationError};
use crate::evaluator::evaluate;
use crate::parser::validate_and_parse;
use crate::tax_table::TaxTable;
use rust_decimal::Decimal;
use std::collections::HashMap;
use valu3::prelude::*;
use valu3::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    Calculation {
        formula: String,
    },
    /// Selects between two already-known branch formulas; it never alters
    /// the instruction pointer.
    Conditional {
        condition: Value,
        if_true: String,
        if_false: String,
    },
    TaxLookup {
        table: String,
        input: String,
    },
    Assignment {
        value: Value,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepWorker {
    pub(crate) name: String,
    pub(crate) kind: StepKind,
}

impl StepWorker {
    /// Map one schema step definition to its variant.
    pub fn try_from_value(index: usize, value: &Value) -> Result<Self, ValidationError> {
        let object = match value.as_object() {
            Some(object) => object,
            None => return Err(ValidationError::StepNotObject(index)),
        };

        let name = match object.get("name") {
            Some(name @ Value::String(_)) => name.as_str().to_string(),
            _ => return Err(ValidationError::StepMissingName(index)),
        };

        let kind_name = match object.get("type") {
            Some(kind @ Value::String(_)) => kind.as_str().to_string(),
            _ => return Err(ValidationError::StepMissingType(name)),
        };

        let kind = match kind_name.as_str() {
            "calculation" => StepKind::Calculation {
                formula: string_field(object.get("formula")),
            },
            "conditional" => StepKind::Conditional {
                condition: object.get("condition").cloned().unwrap_or(Value::Null),
                if_true: string_field(object.get("if_true")),
                if_false: string_field(object.get("if_false")),
            },
            "tax_lookup" => StepKind::TaxLookup {
                table: string_field(object.get("table")),
                input: string_field(object.get("input")),
            },
            "assignment" => StepKind::Assignment {
                value: object.get("value").cloned().unwrap_or(Value::Null),
            },
            other => {
                return Err(ValidationError::UnknownStepType {
                    step: name,
                    kind: other.to_string(),
                })
            }
        };

        Ok(Self { name, kind })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            StepKind::Calculation { .. } => "calculation",
            StepKind::Conditional { .. } => "conditional",
            StepKind::TaxLookup { .. } => "tax_lookup",
            StepKind::Assignment { .. } => "assignment",
        }
    }

    /// Execute against the current bindings, adding this step's value under
    /// its name. Formulas are parsed here so that a bad formula surfaces as a
    /// step-attributed calculation failure, not a construction failure.
    pub fn execute(
        &self,
        context: &mut Context,
        tax_tables: &HashMap<String, TaxTable>,
        strict: bool,
    ) -> Result<(), CalculationError> {
        match &self.kind {
            StepKind::Calculation { formula } => {
                let expr = validate_and_parse(formula)?;
                let value = evaluate(&expr, context, strict)?;
                self.produce(context, value);
            }
            StepKind::Conditional {
                condition,
                if_true,
                if_false,
            } => {
                let condition = Condition::try_from_value(condition)?;
                let branch = if condition.evaluate(context)? {
                    if_true
                } else {
                    if_false
                };

                log::debug!("[step {}] condition selected branch '{}'", self.name, branch);

                let expr = validate_and_parse(branch)?;
                let value = evaluate(&expr, context, strict)?;
                self.produce(context, value);
            }
            StepKind::TaxLookup { table, input } => {
                let table = tax_tables
                    .get(table)
                    .ok_or_else(|| CalculationError::UnknownTable(table.clone()))?;

                let amount = match context.get(input) {
                    Some(amount) => amount,
                    None if strict => {
                        return Err(CalculationError::MissingLookupInput {
                            input: input.clone(),
                            available: context.variable_names(),
                        })
                    }
                    None => {
                        log::warn!(
                            "[step {}] lookup input '{}' is not bound, using 0",
                            self.name,
                            input
                        );
                        Decimal::ZERO
                    }
                };

                let result = table.lookup(amount);
                context.bind(&self.name, result.tax);
                context.record_result(&self.name, StepResult::Bracket(result));
            }
            StepKind::Assignment { value } => {
                let value = resolve_operand(value, context)?;
                self.produce(context, value);
            }
        }

        Ok(())
    }

    fn produce(&self, context: &mut Context, value: Decimal) {
        context.bind(&self.name, value);
        context.record_result(&self.name, StepResult::Number(value));
    }
}

fn string_field(value: Option<&Value>) -> String {
    match value {
        Some(value @ Value::String(_)) => value.as_str().to_string(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
