//! Formula parsing and safety validation.
//!
//! Formulas are untrusted rule data. The grammar accepts numbers, variables,
//! arithmetic, comparisons, whitelisted calls and parentheses; everything
//! outside it fails closed with a named error.

use crate::ast::Expr;
use crate::error::CalculationError;
use crate::registry::{
    BinaryOp, Function, UnaryOp, FORBIDDEN_WORDS, MAX_AST_DEPTH, MAX_EXPRESSION_LENGTH,
};
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Decimal),
    Ident(String),
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Gt,
    Ge,
    Lt,
    Le,
    EqEq,
    Ne,
    LParen,
    RParen,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(value) => value.to_string(),
            Token::Ident(name) => name.clone(),
            Token::Plus => "+".to_string(),
            Token::Minus => "-".to_string(),
            Token::Star => "*".to_string(),
            Token::DoubleStar => "**".to_string(),
            Token::Slash => "/".to_string(),
            Token::DoubleSlash => "//".to_string(),
            Token::Percent => "%".to_string(),
            Token::Gt => ">".to_string(),
            Token::Ge => ">=".to_string(),
            Token::Lt => "<".to_string(),
            Token::Le => "<=".to_string(),
            Token::EqEq => "==".to_string(),
            Token::Ne => "!=".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
            Token::Comma => ",".to_string(),
        }
    }
}

/// Parse and validate a formula source string.
///
/// Empty or whitespace-only input yields the literal `0` (a convenience for
/// optional formula fields, not an error). Everything else either produces a
/// tree made exclusively of whitelisted node kinds, or a `CalculationError`
/// naming the rejected construct.
pub fn validate_and_parse(source: &str) -> Result<Expr, CalculationError> {
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return Ok(Expr::Literal(Decimal::ZERO));
    }

    if source.len() > MAX_EXPRESSION_LENGTH {
        return Err(CalculationError::ExpressionTooLong {
            length: source.len(),
            max: MAX_EXPRESSION_LENGTH,
        });
    }

    let tokens = tokenize(trimmed)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        nesting: 0,
    };

    let expr = parser.parse_comparison()?;
    if let Some(token) = parser.peek() {
        return Err(CalculationError::Syntax(format!(
            "unexpected token '{}'",
            token.describe()
        )));
    }

    let depth = expr.depth();
    if depth > MAX_AST_DEPTH {
        return Err(CalculationError::DepthExceeded {
            depth,
            max: MAX_AST_DEPTH,
        });
    }

    Ok(expr)
}

fn tokenize(source: &str) -> Result<Vec<Token>, CalculationError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' if peek(&chars, i + 1) == Some('*') => {
                tokens.push(Token::DoubleStar);
                i += 2;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' if peek(&chars, i + 1) == Some('/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '>' if peek(&chars, i + 1) == Some('=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '<' if peek(&chars, i + 1) == Some('=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '=' if peek(&chars, i + 1) == Some('=') => {
                tokens.push(Token::EqEq);
                i += 2;
            }
            '=' => {
                return Err(CalculationError::ForbiddenSyntax(
                    "assignment and keyword arguments are not allowed".to_string(),
                ));
            }
            '!' if peek(&chars, i + 1) == Some('=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '[' | ']' => {
                return Err(CalculationError::ForbiddenSyntax(
                    "subscripts, lists and comprehensions are not allowed".to_string(),
                ));
            }
            '{' | '}' => {
                return Err(CalculationError::ForbiddenSyntax(
                    "dict and set literals are not allowed".to_string(),
                ));
            }
            '"' | '\'' => {
                return Err(CalculationError::ForbiddenSyntax(
                    "string literals are not allowed".to_string(),
                ));
            }
            '.' => {
                let starts_number = peek(&chars, i + 1).is_some_and(|n| n.is_ascii_digit())
                    && !matches!(
                        tokens.last(),
                        Some(Token::Ident(_) | Token::Number(_) | Token::RParen)
                    );
                if starts_number {
                    let (token, next) = lex_number(&chars, i)?;
                    tokens.push(token);
                    i = next;
                } else {
                    return Err(CalculationError::ForbiddenSyntax(
                        "attribute access is not allowed".to_string(),
                    ));
                }
            }
            c if c.is_ascii_digit() => {
                let (token, next) = lex_number(&chars, i)?;
                tokens.push(token);
                i = next;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                if FORBIDDEN_WORDS.contains(&name.as_str()) {
                    return Err(CalculationError::ForbiddenSyntax(format!(
                        "keyword '{}' is not allowed",
                        name
                    )));
                }
                tokens.push(Token::Ident(name));
            }
            other => {
                return Err(CalculationError::Syntax(format!(
                    "unexpected character '{}'",
                    other
                )));
            }
        }
    }

    Ok(tokens)
}

fn lex_number(chars: &[char], start: usize) -> Result<(Token, usize), CalculationError> {
    let mut i = start;
    let mut seen_dot = false;

    while i < chars.len() {
        match chars[i] {
            '0'..='9' => i += 1,
            '.' if !seen_dot => {
                seen_dot = true;
                i += 1;
            }
            _ => break,
        }
    }

    let text: String = chars[start..i].iter().collect();

    // A trailing letter, underscore or second dot means a malformed literal
    // like `1.2.3` or `10abc`.
    if i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
        return Err(CalculationError::Syntax(format!(
            "invalid number starting at '{}'",
            text
        )));
    }

    let value = Decimal::from_str_exact(&text)
        .map_err(|_| CalculationError::Syntax(format!("invalid number '{}'", text)))?;

    Ok((Token::Number(value), i))
}

fn peek(chars: &[char], index: usize) -> Option<char> {
    chars.get(index).copied()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    nesting: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn enter(&mut self) -> Result<(), CalculationError> {
        self.nesting += 1;
        if self.nesting > MAX_AST_DEPTH {
            return Err(CalculationError::DepthExceeded {
                depth: self.nesting,
                max: MAX_AST_DEPTH,
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting -= 1;
    }

    fn parse_comparison(&mut self) -> Result<Expr, CalculationError> {
        let mut left = self.parse_additive()?;

        while let Some(op) = match self.peek() {
            Some(Token::Gt) => Some(BinaryOp::Gt),
            Some(Token::Ge) => Some(BinaryOp::Ge),
            Some(Token::Lt) => Some(BinaryOp::Lt),
            Some(Token::Le) => Some(BinaryOp::Le),
            Some(Token::EqEq) => Some(BinaryOp::Eq),
            Some(Token::Ne) => Some(BinaryOp::Ne),
            _ => None,
        } {
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, CalculationError> {
        let mut left = self.parse_term()?;

        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some(BinaryOp::Add),
            Some(Token::Minus) => Some(BinaryOp::Sub),
            _ => None,
        } {
            self.advance();
            let right = self.parse_term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, CalculationError> {
        let mut left = self.parse_factor()?;

        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some(BinaryOp::Mul),
            Some(Token::Slash) => Some(BinaryOp::Div),
            Some(Token::DoubleSlash) => Some(BinaryOp::FloorDiv),
            Some(Token::Percent) => Some(BinaryOp::Mod),
            _ => None,
        } {
            self.advance();
            let right = self.parse_factor()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, CalculationError> {
        let op = match self.peek() {
            Some(Token::Plus) => Some(UnaryOp::Plus),
            Some(Token::Minus) => Some(UnaryOp::Neg),
            _ => None,
        };

        if let Some(op) = op {
            self.advance();
            self.enter()?;
            let operand = self.parse_factor()?;
            self.leave();
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }

        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, CalculationError> {
        let base = self.parse_primary()?;

        if self.peek() == Some(&Token::DoubleStar) {
            self.advance();
            self.enter()?;
            // Right-associative; the exponent may carry its own sign.
            let exponent = self.parse_factor()?;
            self.leave();
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }

        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, CalculationError> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(Expr::Literal(value)),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.advance();
                    self.parse_call(&name)
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(Token::LParen) => {
                self.enter()?;
                let expr = self.parse_comparison()?;
                self.leave();
                match self.advance() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err(CalculationError::Syntax("missing ')'".to_string())),
                }
            }
            Some(other) => Err(CalculationError::Syntax(format!(
                "unexpected token '{}'",
                other.describe()
            ))),
            None => Err(CalculationError::Syntax(
                "unexpected end of expression".to_string(),
            )),
        }
    }

    fn parse_call(&mut self, name: &str) -> Result<Expr, CalculationError> {
        let function = Function::from_name(name)
            .ok_or_else(|| CalculationError::UnknownFunction(name.to_string()))?;

        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                self.enter()?;
                let arg = self.parse_comparison()?;
                self.leave();
                args.push(arg);

                match self.peek() {
                    Some(Token::Comma) => {
                        self.advance();
                    }
                    _ => break,
                }
            }
        }

        match self.advance() {
            Some(Token::RParen) => {}
            _ => {
                return Err(CalculationError::Syntax(format!(
                    "missing ')' in call to '{}'",
                    name
                )))
            }
        }

        if !function.arity_ok(args.len()) {
            return Err(CalculationError::CallShape(format!(
                "'{}' does not accept {} arguments",
                function.name(),
                args.len()
            )));
        }

        Ok(Expr::Call { function, args })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registry::BinaryOp;

    fn dec(text: &str) -> Decimal {
        Decimal::from_str_exact(text).unwrap()
    }

    #[test]
    fn test_empty_source_is_zero_literal() {
        assert_eq!(validate_and_parse("").unwrap(), Expr::Literal(Decimal::ZERO));
        assert_eq!(
            validate_and_parse("   \t ").unwrap(),
            Expr::Literal(Decimal::ZERO)
        );
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let expr = validate_and_parse("2 + 3 * 4").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Add,
                left: Box::new(Expr::Literal(dec("2"))),
                right: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    left: Box::new(Expr::Literal(dec("3"))),
                    right: Box::new(Expr::Literal(dec("4"))),
                }),
            }
        );
    }

    #[test]
    fn test_power_is_right_associative() {
        let expr = validate_and_parse("2 ** 3 ** 2").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(Expr::Literal(dec("2"))),
                right: Box::new(Expr::Binary {
                    op: BinaryOp::Pow,
                    left: Box::new(Expr::Literal(dec("3"))),
                    right: Box::new(Expr::Literal(dec("2"))),
                }),
            }
        );
    }

    #[test]
    fn test_variables_and_calls() {
        let expr = validate_and_parse("min(base_salary * 0.1, cap)").unwrap();
        match expr {
            Expr::Call { function, args } => {
                assert_eq!(function, Function::Min);
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_leading_dot_number() {
        assert_eq!(validate_and_parse(".5").unwrap(), Expr::Literal(dec("0.5")));
    }

    #[test]
    fn test_expression_length_bound() {
        let source = "1+".repeat(600) + "1";
        match validate_and_parse(&source) {
            Err(CalculationError::ExpressionTooLong { .. }) => {}
            other => panic!("expected length error, got {:?}", other),
        }
    }

    #[test]
    fn test_depth_bound() {
        let source = format!("{}1{}", "(".repeat(60), ")".repeat(60));
        match validate_and_parse(&source) {
            Err(CalculationError::DepthExceeded { .. }) => {}
            other => panic!("expected depth error, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_attribute_access() {
        match validate_and_parse("employee.base_salary * 2") {
            Err(CalculationError::ForbiddenSyntax(detail)) => {
                assert!(detail.contains("attribute access"));
            }
            other => panic!("expected forbidden syntax, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_subscript() {
        assert!(matches!(
            validate_and_parse("rates[0]"),
            Err(CalculationError::ForbiddenSyntax(_))
        ));
    }

    #[test]
    fn test_rejects_comprehension() {
        assert!(matches!(
            validate_and_parse("[x for x in y]"),
            Err(CalculationError::ForbiddenSyntax(_))
        ));
    }

    #[test]
    fn test_rejects_lambda() {
        assert!(matches!(
            validate_and_parse("lambda x: x"),
            Err(CalculationError::ForbiddenSyntax(_))
        ));
    }

    #[test]
    fn test_rejects_import() {
        assert!(matches!(
            validate_and_parse("import os"),
            Err(CalculationError::ForbiddenSyntax(_))
        ));
    }

    #[test]
    fn test_rejects_string_literals() {
        assert!(matches!(
            validate_and_parse("'payload'"),
            Err(CalculationError::ForbiddenSyntax(_))
        ));
    }

    #[test]
    fn test_rejects_keyword_arguments() {
        assert!(matches!(
            validate_and_parse("round(x, digits=2)"),
            Err(CalculationError::ForbiddenSyntax(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_function() {
        match validate_and_parse("eval(1)") {
            Err(CalculationError::UnknownFunction(name)) => assert_eq!(name, "eval"),
            other => panic!("expected unknown function, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_arity() {
        assert!(matches!(
            validate_and_parse("abs(1, 2)"),
            Err(CalculationError::CallShape(_))
        ));
        assert!(matches!(
            validate_and_parse("round(1, 2, 3)"),
            Err(CalculationError::CallShape(_))
        ));
    }

    #[test]
    fn test_rejects_trailing_garbage() {
        assert!(matches!(
            validate_and_parse("1 2"),
            Err(CalculationError::Syntax(_))
        ));
    }

    #[test]
    fn test_rejects_malformed_number() {
        assert!(matches!(
            validate_and_parse("1.2.3"),
            Err(CalculationError::Syntax(_))
        ));
    }
}
