//! # payrule-engine - A Sandboxed Payroll Formula Engine
//!
//! `payrule-engine` evaluates JSON-defined payroll rules: named inputs, a
//! linear pipeline of `calculation`, `conditional`, `tax_lookup` and
//! `assignment` steps, progressive tax bracket tables, and one declared
//! output. Formulas are parsed by a whitelisting recursive-descent parser
//! that fails closed on anything outside its grammar, and all arithmetic
//! uses [`rust_decimal`] with half-up rounding to 2 digits at the boundary.
//!
//! ## Example
//!
//! ```rust
//! use payrule_engine::FormulaEngine;
//! use valu3::json;
//! use valu3::prelude::*;
//!
//! let schema = json!({
//!     "meta": {"description": "monthly bonus"},
//!     "inputs": [{"name": "base_salary", "default": 0}],
//!     "steps": [
//!         {"name": "bonus", "type": "calculation", "formula": "base_salary * 0.1"},
//!         {"name": "gross", "type": "calculation", "formula": "base_salary + bonus"}
//!     ],
//!     "output": "gross"
//! });
//!
//! let engine = FormulaEngine::try_from_value(&schema, false).unwrap();
//! let result = engine.execute(&json!({"base_salary": 10000})).unwrap();
//!
//! assert_eq!(result.output.to_string(), "11000.00");
//! ```
//!
//! ## Error model
//!
//! [`ValidationError`] covers schema and tax-table problems raised at
//! construction. [`CalculationError`] covers execution failures, always
//! attributed to the failing step. [`EngineError`] wraps both.
//!
//! By default division by zero yields `0` and a tax lookup matching no
//! bracket yields an all-zero record; constructing with `strict = true`
//! turns zero-division and tax-table gap warnings into hard errors.
//!
//! Execution is synchronous and side-effect free. Each `execute()` call owns
//! its bindings table, so one [`FormulaEngine`] can be shared across threads.

pub mod ast;
pub mod condition;
pub mod context;
pub mod decimal;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod parser;
pub mod registry;
pub mod schema;
pub mod step_worker;
pub mod tax_table;

pub use context::{Context, StepResult};
pub use decimal::{safe_divide, to_decimal};
pub use engine::{ExecutionResult, FormulaEngine};
pub use error::{CalculationError, EngineError, ValidationError};
pub use parser::validate_and_parse;
pub use schema::Schema;
pub use tax_table::{BracketResult, TaxBracket, TaxTable};
