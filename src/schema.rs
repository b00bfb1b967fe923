//! Rule schema parsing and validation.
//!
//! `validate_shape` checks the document structure; `validate_deep` also runs
//! every formula through the expression validator for authoring tools.

use crate::error::ValidationError;
use crate::parser::validate_and_parse;
use crate::step_worker::{StepKind, StepWorker};
use crate::tax_table::TaxTable;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use valu3::prelude::*;
use valu3::value::Value;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex"));

#[derive(Debug, Clone, PartialEq)]
pub struct InputDef {
    pub name: String,
    pub default: Value,
}

/// A parsed, validated rule schema. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Schema {
    pub(crate) meta: Value,
    pub(crate) inputs: Vec<InputDef>,
    pub(crate) steps: Vec<StepWorker>,
    pub(crate) tax_tables: HashMap<String, TaxTable>,
    pub(crate) output: String,
    pub(crate) warnings: Vec<String>,
}

impl Schema {
    pub fn try_from_value(value: &Value) -> Result<Self, ValidationError> {
        validate_shape(value)?;

        let meta = value.get("meta").cloned().unwrap_or(Value::Null);

        let mut inputs = Vec::new();
        if let Some(Value::Array(declared)) = value.get("inputs") {
            for input in declared.into_iter() {
                let name = match input.get("name") {
                    Some(name @ Value::String(_)) => name.as_str().to_string(),
                    _ => continue,
                };
                if !IDENTIFIER.is_match(&name) {
                    log::warn!(
                        "input '{}' is not a plain identifier and cannot be referenced from formulas",
                        name
                    );
                }
                let default = input.get("default").cloned().unwrap_or(Value::Null);
                inputs.push(InputDef { name, default });
            }
        }

        let mut steps = Vec::new();
        if let Some(Value::Array(declared)) = value.get("steps") {
            for (index, step) in declared.into_iter().enumerate() {
                steps.push(StepWorker::try_from_value(index, step)?);
            }
        }

        let mut tax_tables = HashMap::new();
        let mut warnings = Vec::new();
        match value.get("tax_tables") {
            Some(Value::Object(tables)) => {
                for (name, brackets) in tables.iter() {
                    let (table, table_warnings) =
                        TaxTable::try_from_value(&name.to_string(), brackets)?;
                    warnings.extend(table_warnings);
                    tax_tables.insert(name.to_string(), table);
                }
            }
            Some(Value::Null) | None => {}
            Some(_) => return Err(ValidationError::TaxTablesNotObject),
        }

        let output = match value.get("output") {
            Some(output @ Value::String(_)) => output.as_str().to_string(),
            _ => String::new(),
        };

        Ok(Self {
            meta,
            inputs,
            steps,
            tax_tables,
            output,
            warnings,
        })
    }

    pub fn meta(&self) -> &Value {
        &self.meta
    }
}

/// Structural check only: object, `steps` present, each step an object with
/// `name` and `type`.
pub fn validate_shape(value: &Value) -> Result<(), ValidationError> {
    let object = match value.as_object() {
        Some(object) => object,
        None => return Err(ValidationError::SchemaNotObject),
    };

    let steps = match object.get("steps") {
        Some(Value::Array(steps)) => steps,
        _ => return Err(ValidationError::MissingSteps),
    };

    for (index, step) in steps.into_iter().enumerate() {
        let step = match step.as_object() {
            Some(step) => step,
            None => return Err(ValidationError::StepNotObject(index)),
        };

        let name = match step.get("name") {
            Some(name @ Value::String(_)) => name.as_str().to_string(),
            _ => return Err(ValidationError::StepMissingName(index)),
        };

        match step.get("type") {
            Some(Value::String(_)) => {}
            _ => return Err(ValidationError::StepMissingType(name)),
        }
    }

    Ok(())
}

/// The deeper authoring-time pass: shape, known step types, and every formula
/// accepted by the expression validator.
pub fn validate_deep(value: &Value) -> Result<(), ValidationError> {
    validate_shape(value)?;

    if let Some(Value::Array(steps)) = value.get("steps") {
        for (index, step) in steps.into_iter().enumerate() {
            let worker = StepWorker::try_from_value(index, step)?;

            let check = |formula: &str| -> Result<(), ValidationError> {
                validate_and_parse(formula).map(|_| ()).map_err(|err| {
                    ValidationError::UnsafeFormula {
                        step: worker.name().to_string(),
                        detail: err.to_string(),
                    }
                })
            };

            match &worker.kind {
                StepKind::Calculation { formula } => check(formula)?,
                StepKind::Conditional {
                    if_true, if_false, ..
                } => {
                    check(if_true)?;
                    check(if_false)?;
                }
                StepKind::TaxLookup { .. } | StepKind::Assignment { .. } => {}
            }
        }
    }

    Ok(())
}
