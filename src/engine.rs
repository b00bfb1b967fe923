//! The formula engine orchestrator.
//!
//! Construction validates the schema and every tax table; a schema that
//! fails validation never executes. Each `execute()` call owns its own
//! bindings table, so one engine instance can serve concurrent callers.

use crate::context::{Context, StepResult};
use crate::decimal::{decimal_to_value, round_money, to_decimal};
use crate::error::{CalculationError, ValidationError};
use crate::schema::{validate_deep, Schema};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use valu3::prelude::*;
use valu3::value::Value;

#[derive(Debug, Clone)]
pub struct FormulaEngine {
    schema: Schema,
    strict: bool,
}

impl FormulaEngine {
    /// Build an engine from a schema document. In strict mode, tax-table gap
    /// warnings become construction errors; otherwise they are logged.
    pub fn try_from_value(value: &Value, strict: bool) -> Result<Self, ValidationError> {
        let schema = Schema::try_from_value(value)?;

        if !schema.warnings.is_empty() {
            if strict {
                return Err(ValidationError::TaxTableGaps(schema.warnings.clone()));
            }
            for warning in &schema.warnings {
                log::warn!("{}", warning);
            }
        }

        Ok(Self { schema, strict })
    }

    /// The authoring-time validation pass: structural checks plus formula
    /// safety, without constructing an engine.
    pub fn validate_schema(value: &Value) -> Result<(), ValidationError> {
        validate_deep(value)
    }

    pub fn meta(&self) -> &Value {
        self.schema.meta()
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    /// Run the schema's steps against the supplied inputs.
    ///
    /// Declared inputs are seeded from `inputs` (or their defaults); keys the
    /// schema never declared are ignored. Steps run strictly in declared
    /// order and execution halts at the first failing step, which is
    /// re-raised with its name, kind and the currently bound variable names.
    pub fn execute(&self, inputs: &Value) -> Result<ExecutionResult, CalculationError> {
        let mut context = Context::new();

        for input in &self.schema.inputs {
            let value = match inputs.get(input.name.as_str()) {
                Some(provided) => provided.clone(),
                None => input.default.clone(),
            };
            let seeded =
                to_decimal(&value).map_err(|err| CalculationError::NotDecimal(err.to_string()))?;
            context.bind(&input.name, seeded);
        }

        for step in &self.schema.steps {
            let span = tracing::info_span!(
                "step",
                step.name = %step.name(),
                step.kind = step.kind_name(),
            );
            let _guard = span.enter();

            log::debug!("[step {}] executing ({})", step.name(), step.kind_name());

            step.execute(&mut context, &self.schema.tax_tables, self.strict)
                .map_err(|source| CalculationError::Step {
                    name: step.name().to_string(),
                    kind: step.kind_name().to_string(),
                    available: context.variable_names(),
                    source: Box::new(source),
                })?;
        }

        Ok(ExecutionResult::from_context(context, &self.schema.output))
    }
}

/// Everything one run produced: all bindings, all step results and the
/// declared output, rounded to two digits at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub variables: HashMap<String, Decimal>,
    pub results: HashMap<String, StepResult>,
    pub output: Decimal,
}

impl ExecutionResult {
    fn from_context(context: Context, output: &str) -> Self {
        let output = context.get(output).map(round_money).unwrap_or(Decimal::ZERO);

        let variables = context
            .variables()
            .iter()
            .map(|(name, value)| (name.clone(), round_money(*value)))
            .collect();

        let results = context
            .results()
            .iter()
            .map(|(name, result)| {
                let rounded = match result {
                    StepResult::Number(value) => StepResult::Number(round_money(*value)),
                    StepResult::Bracket(bracket) => StepResult::Bracket(bracket.clone()),
                };
                (name.clone(), rounded)
            })
            .collect();

        Self {
            variables,
            results,
            output,
        }
    }
}

impl ToValueBehavior for ExecutionResult {
    fn to_value(&self) -> Value {
        let variables: HashMap<String, Value> = self
            .variables
            .iter()
            .map(|(name, value)| (name.clone(), decimal_to_value(*value)))
            .collect();

        let results: HashMap<String, Value> = self
            .results
            .iter()
            .map(|(name, result)| {
                let value = match result {
                    StepResult::Number(value) => decimal_to_value(*value),
                    StepResult::Bracket(bracket) => bracket.to_value(),
                };
                (name.clone(), value)
            })
            .collect();

        let mut map = HashMap::new();
        map.insert("variables".to_string(), variables.to_value());
        map.insert("results".to_string(), results.to_value());
        map.insert("output".to_string(), decimal_to_value(self.output));
        map.to_value()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use valu3::json;

    fn dec(text: &str) -> Decimal {
        Decimal::from_str_exact(text).unwrap()
    }

    fn no_inputs() -> Value {
        HashMap::<String, Value>::new().to_value()
    }

    fn bonus_schema() -> Value {
        json!({
            "meta": {"description": "bonus and gross"},
            "inputs": [{"name": "base_salary", "default": 0}],
            "steps": [
                {"name": "bonus", "type": "calculation", "formula": "base_salary * 0.1"},
                {"name": "gross", "type": "calculation", "formula": "base_salary + bonus"}
            ],
            "output": "gross"
        })
    }

    #[test]
    fn test_sequential_steps_thread_bindings() {
        let engine = FormulaEngine::try_from_value(&bonus_schema(), false).unwrap();
        let result = engine.execute(&json!({"base_salary": 10000})).unwrap();

        assert_eq!(result.output, dec("11000.00"));
        assert_eq!(result.variables.get("bonus"), Some(&dec("1000.00")));
        assert_eq!(result.variables.get("gross"), Some(&dec("11000.00")));
    }

    #[test]
    fn test_missing_input_uses_default() {
        let engine = FormulaEngine::try_from_value(&bonus_schema(), false).unwrap();
        let result = engine.execute(&no_inputs()).unwrap();
        assert_eq!(result.output, Decimal::ZERO);
    }

    #[test]
    fn test_extra_inputs_ignored() {
        let engine = FormulaEngine::try_from_value(&bonus_schema(), false).unwrap();
        let result = engine
            .execute(&json!({"base_salary": 10000, "unrelated": "x"}))
            .unwrap();
        assert_eq!(result.output, dec("11000.00"));
    }

    #[test]
    fn test_conditional_schema() {
        let schema = json!({
            "inputs": [{"name": "salary", "default": 0}],
            "steps": [{
                "name": "premium",
                "type": "conditional",
                "condition": {"left": "salary", "operator": ">", "right": 3000},
                "if_true": "salary * 0.1",
                "if_false": "0"
            }],
            "output": "premium"
        });
        let engine = FormulaEngine::try_from_value(&schema, false).unwrap();

        assert_eq!(
            engine.execute(&json!({"salary": 2000})).unwrap().output,
            dec("0.00")
        );
        assert_eq!(
            engine.execute(&json!({"salary": 5000})).unwrap().output,
            dec("500.00")
        );
    }

    #[test]
    fn test_tax_lookup_schema() {
        let schema = json!({
            "inputs": [{"name": "taxable", "default": 0}],
            "steps": [
                {"name": "isr", "type": "tax_lookup", "table": "isr", "input": "taxable"}
            ],
            "tax_tables": {
                "isr": [
                    {"min": 0, "max": 100000, "rate": 0, "fixed": 0, "over": 0},
                    {"min": 100001, "max": null, "rate": 0.15, "fixed": 0, "over": 100000}
                ]
            },
            "output": "isr"
        });
        let engine = FormulaEngine::try_from_value(&schema, false).unwrap();
        let result = engine.execute(&json!({"taxable": 150000})).unwrap();

        assert_eq!(result.output, dec("7500.00"));
        match result.results.get("isr") {
            Some(StepResult::Bracket(bracket)) => assert_eq!(bracket.rate, dec("0.15")),
            other => panic!("expected bracket result, got {:?}", other),
        }
    }

    #[test]
    fn test_overlapping_table_fails_at_construction() {
        let schema = json!({
            "steps": [
                {"name": "isr", "type": "tax_lookup", "table": "isr", "input": "taxable"}
            ],
            "tax_tables": {
                "isr": [
                    {"min": 0, "max": 150000, "rate": 0.1},
                    {"min": 100000, "max": 200000, "rate": 0.2}
                ]
            },
            "output": "isr"
        });

        match FormulaEngine::try_from_value(&schema, false) {
            Err(err) => assert!(err.to_string().contains("overlap")),
            Ok(_) => panic!("expected construction to fail"),
        }
    }

    #[test]
    fn test_failing_step_is_attributed() {
        let schema = json!({
            "steps": [
                {"name": "bad", "type": "calculation", "formula": "undefined_var * 2"}
            ],
            "output": "bad"
        });
        let engine = FormulaEngine::try_from_value(&schema, false).unwrap();

        match engine.execute(&no_inputs()) {
            Err(err @ CalculationError::Step { .. }) => {
                let message = err.to_string();
                assert!(message.contains("bad"));
                assert!(message.contains("calculation"));
                assert!(message.contains("Undefined variable"));
            }
            other => panic!("expected step error, got {:?}", other),
        }
    }

    #[test]
    fn test_validated_schema_constructs_repeatedly() {
        let schema = bonus_schema();
        FormulaEngine::try_from_value(&schema, false).unwrap();
        // The same schema object must never fail validation on a later
        // construction.
        FormulaEngine::try_from_value(&schema, false).unwrap();
        FormulaEngine::try_from_value(&schema, true).unwrap();
    }

    #[test]
    fn test_strict_mode_escalates_gap_warnings() {
        let schema = json!({
            "steps": [
                {"name": "isr", "type": "tax_lookup", "table": "isr", "input": "taxable"}
            ],
            "tax_tables": {
                "isr": [
                    {"min": 0, "max": 1000, "rate": 0.1},
                    {"min": 5000, "max": null, "rate": 0.2}
                ]
            },
            "output": "isr"
        });

        assert!(FormulaEngine::try_from_value(&schema, false).is_ok());
        match FormulaEngine::try_from_value(&schema, true) {
            Err(ValidationError::TaxTableGaps(gaps)) => assert_eq!(gaps.len(), 1),
            other => panic!("expected gap escalation, got {:?}", other),
        }
    }

    #[test]
    fn test_unbound_output_name_is_zero() {
        let schema = json!({
            "steps": [
                {"name": "x", "type": "assignment", "value": 1}
            ],
            "output": "never_bound"
        });
        let engine = FormulaEngine::try_from_value(&schema, false).unwrap();
        assert_eq!(engine.execute(&no_inputs()).unwrap().output, Decimal::ZERO);
    }

    #[test]
    fn test_strict_division_by_zero_fails_step() {
        let schema = json!({
            "inputs": [{"name": "hours", "default": 0}],
            "steps": [
                {"name": "rate", "type": "calculation", "formula": "1000 / hours"}
            ],
            "output": "rate"
        });

        let lenient = FormulaEngine::try_from_value(&schema, false).unwrap();
        assert_eq!(lenient.execute(&no_inputs()).unwrap().output, Decimal::ZERO);

        let strict = FormulaEngine::try_from_value(&schema, true).unwrap();
        assert!(strict.execute(&no_inputs()).is_err());
    }

    #[test]
    fn test_later_step_shadows_earlier_name() {
        let schema = json!({
            "steps": [
                {"name": "x", "type": "assignment", "value": 1},
                {"name": "x", "type": "assignment", "value": 2}
            ],
            "output": "x"
        });
        let engine = FormulaEngine::try_from_value(&schema, false).unwrap();
        assert_eq!(engine.execute(&no_inputs()).unwrap().output, dec("2.00"));
    }

    #[test]
    fn test_result_document_shape() {
        let engine = FormulaEngine::try_from_value(&bonus_schema(), false).unwrap();
        let result = engine.execute(&json!({"base_salary": 10000})).unwrap();
        let document = result.to_value();

        assert_eq!(
            document.get("output").cloned(),
            Some(Value::from(11000.0f64))
        );
        assert!(document.get("variables").is_some());
        assert!(document.get("results").is_some());
    }

    #[test]
    fn test_result_types_are_serializable() {
        fn assert_serialize<T: Serialize>() {}
        assert_serialize::<ExecutionResult>();
        assert_serialize::<StepResult>();
        assert_serialize::<crate::tax_table::BracketResult>();
    }

    #[test]
    fn test_meta_passthrough() {
        let engine = FormulaEngine::try_from_value(&bonus_schema(), false).unwrap();
        assert_eq!(
            engine.meta().get("description").cloned(),
            Some("bonus and gross".to_value())
        );
    }
}
