use crate::tax_table::BracketResult;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

/// What one step produced: a plain number, or the full bracket record of a
/// tax lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StepResult {
    Number(Decimal),
    Bracket(BracketResult),
}

/// The variable bindings table for one execution.
///
/// Inputs seed it, each step adds one named value, and later steps see
/// everything bound before them. Owned by a single `execute()` call; there is
/// no cross-run state.
#[derive(Debug, Clone, Default)]
pub struct Context {
    variables: HashMap<String, Decimal>,
    results: HashMap<String, StepResult>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a name. Rebinding an existing name is permitted (a later step may
    /// shadow an earlier one) but logged, since it usually means a typo'd
    /// step name.
    pub fn bind(&mut self, name: &str, value: Decimal) {
        if self.variables.contains_key(name) {
            log::warn!("variable '{}' is being overwritten", name);
        }
        self.variables.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<Decimal> {
        self.variables.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Sorted bound names, for deterministic error messages.
    pub fn variable_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.variables.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn record_result(&mut self, name: &str, result: StepResult) {
        self.results.insert(name.to_string(), result);
    }

    pub fn variables(&self) -> &HashMap<String, Decimal> {
        &self.variables
    }

    pub fn results(&self) -> &HashMap<String, StepResult> {
        &self.results
    }
}
