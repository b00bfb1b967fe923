//! The fixed whitelist of operators and callable functions permitted inside a
//! formula. Extending any table here is a deliberate, audited code change,
//! never something driven by rule data.

use serde::Serialize;

/// Longest accepted formula source, in characters.
pub const MAX_EXPRESSION_LENGTH: usize = 1000;

/// Deepest accepted expression tree.
pub const MAX_AST_DEPTH: usize = 50;

/// Host-language keywords that must never appear in a formula. Seeing one is
/// a whitelist violation, not merely an undefined variable.
pub const FORBIDDEN_WORDS: &[&str] = &[
    "lambda", "import", "for", "while", "if", "else", "in", "not", "and", "or", "def", "class",
    "return", "yield",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Eq | BinaryOp::Ne
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Plus,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Function {
    Min,
    Max,
    Abs,
    Round,
}

impl Function {
    /// The single whitelist gate for callables: any name this does not
    /// recognize is rejected at parse time.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "min" => Some(Function::Min),
            "max" => Some(Function::Max),
            "abs" => Some(Function::Abs),
            "round" => Some(Function::Round),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Min => "min",
            Function::Max => "max",
            Function::Abs => "abs",
            Function::Round => "round",
        }
    }

    pub fn arity_ok(&self, argc: usize) -> bool {
        match self {
            Function::Min | Function::Max => argc >= 1,
            Function::Abs => argc == 1,
            Function::Round => argc == 1 || argc == 2,
        }
    }
}
