use std::fmt::Display;

/// Schema, tax-table or input shape problems. Raised at engine construction
/// or from the explicit validation entry points, never mid-execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    SchemaNotObject,
    MissingSteps,
    StepNotObject(usize),
    StepMissingName(usize),
    StepMissingType(String),
    UnknownStepType { step: String, kind: String },
    UnsafeFormula { step: String, detail: String },
    NotDecimal(String),
    EmptyTaxTable(String),
    TaxTablesNotObject,
    TaxTableNotArray(String),
    BracketNotObject { table: String, index: usize },
    BracketMissingMin { table: String, index: usize },
    BracketInvalid { table: String, index: usize, detail: String },
    BracketOrder { table: String, index: usize },
    BracketOverlap { table: String, index: usize },
    OpenBracketNotLast { table: String, index: usize },
    TaxTableGaps(Vec<String>),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::SchemaNotObject => write!(f, "Schema must be an object"),
            ValidationError::MissingSteps => write!(f, "Schema has no 'steps' list"),
            ValidationError::StepNotObject(index) => {
                write!(f, "Step {} is not an object", index)
            }
            ValidationError::StepMissingName(index) => {
                write!(f, "Step {} has no 'name'", index)
            }
            ValidationError::StepMissingType(step) => {
                write!(f, "Step '{}' has no 'type'", step)
            }
            ValidationError::UnknownStepType { step, kind } => {
                write!(f, "Step '{}' has unknown type '{}'", step, kind)
            }
            ValidationError::UnsafeFormula { step, detail } => {
                write!(f, "Step '{}' has an invalid formula: {}", step, detail)
            }
            ValidationError::NotDecimal(value) => {
                write!(f, "Value '{}' is not convertible to a decimal", value)
            }
            ValidationError::EmptyTaxTable(table) => {
                write!(f, "Tax table '{}' is empty", table)
            }
            ValidationError::TaxTablesNotObject => {
                write!(f, "'tax_tables' must be an object mapping names to bracket lists")
            }
            ValidationError::TaxTableNotArray(table) => {
                write!(f, "Tax table '{}' must be a list of brackets", table)
            }
            ValidationError::BracketNotObject { table, index } => {
                write!(f, "Tax table '{}' bracket {} is not an object", table, index)
            }
            ValidationError::BracketMissingMin { table, index } => {
                write!(f, "Tax table '{}' bracket {} has no 'min'", table, index)
            }
            ValidationError::BracketInvalid {
                table,
                index,
                detail,
            } => {
                write!(f, "Tax table '{}' bracket {}: {}", table, index, detail)
            }
            ValidationError::BracketOrder { table, index } => {
                write!(
                    f,
                    "Tax table '{}' bracket {} is out of order: 'min' values must be non-decreasing",
                    table, index
                )
            }
            ValidationError::BracketOverlap { table, index } => {
                write!(
                    f,
                    "Tax table '{}' bracket {} overlaps the previous bracket",
                    table, index
                )
            }
            ValidationError::OpenBracketNotLast { table, index } => {
                write!(
                    f,
                    "Tax table '{}' bracket {} is open-ended but not last",
                    table, index
                )
            }
            ValidationError::TaxTableGaps(gaps) => {
                write!(f, "Tax table gaps not allowed in strict mode: {}", gaps.join("; "))
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Failures while evaluating a formula or executing a specific step. Always
/// carries enough context for a rule author to locate the mistake.
#[derive(Debug, Clone, PartialEq)]
pub enum CalculationError {
    ExpressionTooLong { length: usize, max: usize },
    Syntax(String),
    ForbiddenSyntax(String),
    UnknownFunction(String),
    CallShape(String),
    DepthExceeded { depth: usize, max: usize },
    UndefinedVariable { name: String, available: Vec<String> },
    DivisionByZero(String),
    Overflow(String),
    InvalidRound(String),
    NotDecimal(String),
    InvalidOperator(String),
    ConditionNotObject(String),
    LeftInvalid(String),
    RightInvalid(String),
    UnknownTable(String),
    MissingLookupInput { input: String, available: Vec<String> },
    Step {
        name: String,
        kind: String,
        available: Vec<String>,
        source: Box<CalculationError>,
    },
}

impl Display for CalculationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalculationError::ExpressionTooLong { length, max } => {
                write!(f, "Expression is {} characters long, maximum is {}", length, max)
            }
            CalculationError::Syntax(detail) => write!(f, "Syntax error: {}", detail),
            CalculationError::ForbiddenSyntax(detail) => {
                write!(f, "Forbidden syntax: {}", detail)
            }
            CalculationError::UnknownFunction(name) => {
                write!(f, "Function '{}' is not allowed", name)
            }
            CalculationError::CallShape(detail) => write!(f, "Invalid call: {}", detail),
            CalculationError::DepthExceeded { depth, max } => {
                write!(f, "Expression depth {} exceeds maximum {}", depth, max)
            }
            CalculationError::UndefinedVariable { name, available } => {
                write!(
                    f,
                    "Undefined variable '{}'. Available variables: {}",
                    name,
                    available.join(", ")
                )
            }
            CalculationError::DivisionByZero(expression) => {
                write!(f, "Division by zero in '{}'", expression)
            }
            CalculationError::Overflow(detail) => {
                write!(f, "Arithmetic overflow: {}", detail)
            }
            CalculationError::InvalidRound(detail) => {
                write!(
                    f,
                    "round() precision must be an integer between 0 and 10, got {}",
                    detail
                )
            }
            CalculationError::NotDecimal(detail) => {
                write!(f, "Not convertible to a decimal: {}", detail)
            }
            CalculationError::InvalidOperator(operator) => {
                write!(f, "Invalid operator: {}", operator)
            }
            CalculationError::ConditionNotObject(detail) => {
                write!(f, "Condition must be an object: {}", detail)
            }
            CalculationError::LeftInvalid(detail) => write!(f, "Left invalid: {}", detail),
            CalculationError::RightInvalid(detail) => write!(f, "Right invalid: {}", detail),
            CalculationError::UnknownTable(table) => {
                write!(f, "Tax table '{}' does not exist", table)
            }
            CalculationError::MissingLookupInput { input, available } => {
                write!(
                    f,
                    "Lookup input variable '{}' is not bound. Available variables: {}",
                    input,
                    available.join(", ")
                )
            }
            CalculationError::Step {
                name,
                kind,
                available,
                source,
            } => {
                write!(
                    f,
                    "Step '{}' ({}) failed: {}. Available variables: {}",
                    name,
                    kind,
                    source,
                    available.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for CalculationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CalculationError::Step { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Common base so callers can catch broadly or narrowly.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    Validation(ValidationError),
    Calculation(CalculationError),
}

impl Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(err) => write!(f, "Validation error: {}", err),
            EngineError::Calculation(err) => write!(f, "Calculation error: {}", err),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Validation(err) => Some(err),
            EngineError::Calculation(err) => Some(err),
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Validation(err)
    }
}

impl From<CalculationError> for EngineError {
    fn from(err: CalculationError) -> Self {
        EngineError::Calculation(err)
    }
}
