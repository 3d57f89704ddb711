// converge-lang/src/expression.rs
// ============================================================================
// Module: Boolean Expressions
// Description: Lexer, parser, and evaluator for policy criteria expressions.
// Purpose: Compile criteria strings once and evaluate them against labels and
//          contextual objects.
// Dependencies: serde_json, thiserror, crate::labels
// ============================================================================

//! ## Overview
//! Criteria, rules, and contexts are gated by small boolean expressions such
//! as `tier == 'prod' && in(region, 'eu', 'us')` or
//! `service.Labels.team == 'storage'`.
//!
//! ### Grammar (informal)
//! - **Literals**: `'text'`, `"text"`, `42`, `1.5`, `true`, `false`
//! - **Variables**: `name`, `object.Field.nested`
//! - **Operators** (lowest to highest): `||`, `&&`, `== !=`, `> >= < <=`,
//!   `+ -`, `* / %`, unary `! -`
//! - **Functions**: `in(needle, candidate, ...)`
//! - **Grouping**: `( ... )`
//!
//! ### Evaluation
//! Parameters are a JSON object. Label values are coerced when parameters are
//! built: integer-like strings become numbers and bool-like strings become
//! booleans, so `replicas > 2` works on a label value of `"3"`.
//!
//! Referencing a variable that is not present makes the whole expression
//! evaluate to `false`. That is not an error: criteria are routinely written
//! against labels that only some consumers carry. Type mismatches in ordering
//! or arithmetic, and a non-boolean final value, are errors.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde_json::Map;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::labels::LabelSet;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Default maximum expression size in bytes.
pub const DEFAULT_MAX_EXPRESSION_BYTES: usize = 64 * 1024;
/// Maximum supported nesting depth for grouped or function expressions.
const MAX_EXPRESSION_NESTING: usize = 32;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Structured syntax errors raised while compiling an expression.
///
/// # Invariants
/// - Positions are byte offsets into the original source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    /// Input was empty or contained only whitespace.
    EmptyInput,
    /// Input exceeded the configured size limit.
    InputTooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual input length in bytes.
        actual_bytes: usize,
    },
    /// Input exceeded the nesting limit.
    NestingTooDeep {
        /// Maximum allowed depth.
        max_depth: usize,
        /// Byte offset in the source.
        position: usize,
    },
    /// Unexpected token encountered during parsing.
    UnexpectedToken {
        /// Human-friendly expectation summary.
        expected: &'static str,
        /// The token that was actually seen.
        found: String,
        /// Byte offset in the source.
        position: usize,
    },
    /// String literal without a closing quote.
    UnterminatedString {
        /// Byte offset of the opening quote.
        position: usize,
    },
    /// Numeric literal failed to parse.
    InvalidNumber {
        /// The raw numeric text.
        raw: String,
        /// Byte offset in the source.
        position: usize,
    },
    /// Function name was not recognized.
    UnknownFunction {
        /// The unknown function identifier.
        name: String,
        /// Byte offset in the source.
        position: usize,
    },
    /// Input continued after a complete expression.
    TrailingInput {
        /// Byte offset where unexpected input begins.
        position: usize,
    },
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInput => write!(f, "expression is empty"),
            Self::InputTooLarge {
                max_bytes,
                actual_bytes,
            } => {
                write!(f, "expression exceeds size limit: {actual_bytes} bytes (max {max_bytes})")
            }
            Self::NestingTooDeep {
                max_depth,
                position,
            } => write!(f, "expression nesting exceeds limit of {max_depth} at {position}"),
            Self::UnexpectedToken {
                expected,
                found,
                position,
            } => {
                write!(f, "unexpected token `{found}` at {position}, expected {expected}")
            }
            Self::UnterminatedString {
                position,
            } => write!(f, "unterminated string literal starting at {position}"),
            Self::InvalidNumber {
                raw,
                position,
            } => write!(f, "invalid number `{raw}` at {position}"),
            Self::UnknownFunction {
                name,
                position,
            } => write!(f, "unknown function `{name}` at {position}"),
            Self::TrailingInput {
                position,
            } => write!(f, "unexpected trailing input at {position}"),
        }
    }
}

impl std::error::Error for SyntaxError {}

/// Errors raised while compiling or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    /// Expression text is malformed.
    #[error("unable to compile expression `{expression}`: {reason}")]
    Compile {
        /// Expression source text.
        expression: String,
        /// Syntax failure.
        reason: SyntaxError,
    },
    /// Evaluation failed on a type mismatch or invalid operation.
    #[error("unable to evaluate expression `{expression}`: {message}")]
    Eval {
        /// Expression source text.
        expression: String,
        /// Failure description.
        message: String,
    },
    /// Evaluation produced a value that is not a boolean.
    #[error("expression `{expression}` evaluated to {found}, expected a boolean")]
    NotBoolean {
        /// Expression source text.
        expression: String,
        /// Description of the produced value.
        found: String,
    },
}

impl ExpressionError {
    /// Returns true for compile-time failures.
    #[must_use]
    pub const fn is_compile_error(&self) -> bool {
        matches!(self, Self::Compile { .. })
    }
}

// ============================================================================
// SECTION: Parameters
// ============================================================================

/// Variables visible to an expression.
///
/// # Invariants
/// - Label values are coerced to numbers or booleans when they parse as such.
/// - Objects inserted after labels shadow labels with the same name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionParams {
    /// Top-level variables.
    values: Map<String, JsonValue>,
}

impl ExpressionParams {
    /// Builds parameters from labels plus named contextual objects.
    #[must_use]
    pub fn new(labels: &LabelSet, objects: BTreeMap<String, JsonValue>) -> Self {
        let mut values = Map::new();
        for (key, value) in labels.iter() {
            values.insert(key.to_string(), coerce_label(value));
        }
        for (key, value) in objects {
            values.insert(key, value);
        }
        Self {
            values,
        }
    }

    /// Builds parameters from labels only.
    #[must_use]
    pub fn from_labels(labels: &LabelSet) -> Self {
        Self::new(labels, BTreeMap::new())
    }

    /// Returns the top-level variable named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.values.get(name)
    }
}

/// Converts a label string into a number or boolean when it parses as one.
fn coerce_label(value: &str) -> JsonValue {
    if let Ok(number) = value.parse::<i64>() {
        return JsonValue::from(number);
    }
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => JsonValue::Bool(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => JsonValue::Bool(false),
        _ => JsonValue::String(value.to_string()),
    }
}

// ============================================================================
// SECTION: Compiled Expression
// ============================================================================

/// A compiled boolean expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    /// Original source text.
    source: String,
    /// Parsed syntax tree.
    root: Node,
}

impl Expression {
    /// Compiles `source` with the default size limit.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError::Compile`] when the source is malformed.
    pub fn compile(source: &str) -> Result<Self, ExpressionError> {
        Self::compile_with_limit(source, DEFAULT_MAX_EXPRESSION_BYTES)
    }

    /// Compiles `source`, rejecting inputs larger than `max_bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError::Compile`] when the source is malformed or
    /// too large.
    pub fn compile_with_limit(source: &str, max_bytes: usize) -> Result<Self, ExpressionError> {
        parse(source, max_bytes)
            .map(|root| Self {
                source: source.to_string(),
                root,
            })
            .map_err(|reason| ExpressionError::Compile {
                expression: source.to_string(),
                reason,
            })
    }

    /// Returns the source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the expression to a boolean.
    ///
    /// Undefined variables make the result `false`.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError::Eval`] on invalid operations and
    /// [`ExpressionError::NotBoolean`] when the result is not a boolean.
    pub fn evaluate_bool(&self, params: &ExpressionParams) -> Result<bool, ExpressionError> {
        match eval(&self.root, params) {
            Ok(Value::Bool(result)) => Ok(result),
            Ok(other) => Err(ExpressionError::NotBoolean {
                expression: self.source.clone(),
                found: other.describe(),
            }),
            Err(Fault::Undefined) => Ok(false),
            Err(Fault::Invalid(message)) => Err(ExpressionError::Eval {
                expression: self.source.clone(),
                message,
            }),
        }
    }
}

// ============================================================================
// SECTION: Syntax Tree
// ============================================================================

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnaryOp {
    /// Logical negation.
    Not,
    /// Numeric negation.
    Negate,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    /// Logical OR.
    Or,
    /// Logical AND.
    And,
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Addition or string concatenation.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Remainder.
    Rem,
}

impl BinaryOp {
    /// Returns the operator symbol.
    const fn symbol(self) -> &'static str {
        match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
        }
    }
}

/// Expression syntax tree node.
#[derive(Debug, Clone, PartialEq)]
enum Node {
    /// Constant value.
    Literal(Value),
    /// Variable reference with dotted field access.
    Variable(Vec<String>),
    /// Unary operation.
    Unary(UnaryOp, Box<Node>),
    /// Binary operation.
    Binary(BinaryOp, Box<Node>, Box<Node>),
    /// Membership test `in(needle, candidates...)`.
    In(Vec<Node>),
}

// ============================================================================
// SECTION: Lexer
// ============================================================================

/// Lexer token produced from the expression source.
#[derive(Debug, Clone, PartialEq)]
enum Token<'a> {
    /// Identifier token.
    Ident(&'a str),
    /// Numeric literal token.
    Number(f64),
    /// String literal token.
    Str(String),
    /// Binary operator token.
    Op(BinaryOp),
    /// Logical NOT.
    Not,
    /// Field access dot.
    Dot,
    /// Left parenthesis.
    LParen,
    /// Right parenthesis.
    RParen,
    /// Comma separator.
    Comma,
    /// End-of-input marker.
    Eof,
}

/// Token paired with its byte offset.
#[derive(Debug, Clone)]
struct SpannedToken<'a> {
    /// Token value.
    token: Token<'a>,
    /// Byte offset into the input.
    position: usize,
}

/// Lexer for the expression language.
struct Lexer<'a> {
    /// Source input being tokenized.
    input: &'a str,
    /// Current byte offset into the input.
    offset: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    const fn new(input: &'a str) -> Self {
        Self {
            input,
            offset: 0,
        }
    }

    /// Lexes the input into a sequence of tokens.
    fn lex(&mut self) -> Result<Vec<SpannedToken<'a>>, SyntaxError> {
        let mut tokens = Vec::new();
        let bytes = self.input.as_bytes();

        while let Some(&ch) = bytes.get(self.offset) {
            let start = self.offset;
            let token = match ch {
                b' ' | b'\t' | b'\n' | b'\r' => {
                    self.offset += 1;
                    continue;
                }
                b'(' => self.single(Token::LParen),
                b')' => self.single(Token::RParen),
                b',' => self.single(Token::Comma),
                b'.' => self.single(Token::Dot),
                b'+' => self.single(Token::Op(BinaryOp::Add)),
                b'-' => self.single(Token::Op(BinaryOp::Sub)),
                b'*' => self.single(Token::Op(BinaryOp::Mul)),
                b'/' => self.single(Token::Op(BinaryOp::Div)),
                b'%' => self.single(Token::Op(BinaryOp::Rem)),
                b'!' => self.with_equals(Token::Op(BinaryOp::Ne), Token::Not),
                b'>' => self.with_equals(Token::Op(BinaryOp::Ge), Token::Op(BinaryOp::Gt)),
                b'<' => self.with_equals(Token::Op(BinaryOp::Le), Token::Op(BinaryOp::Lt)),
                b'=' => self.pair(b'=', Token::Op(BinaryOp::Eq), "==")?,
                b'&' => self.pair(b'&', Token::Op(BinaryOp::And), "&&")?,
                b'|' => self.pair(b'|', Token::Op(BinaryOp::Or), "||")?,
                b'\'' | b'"' => self.string(ch)?,
                b'0' ..= b'9' => self.number()?,
                b'a' ..= b'z' | b'A' ..= b'Z' | b'_' => {
                    self.consume_while(|b| b.is_ascii_alphanumeric() || b == b'_');
                    Token::Ident(&self.input[start .. self.offset])
                }
                _ => {
                    return Err(SyntaxError::UnexpectedToken {
                        expected: "identifier, literal, or operator",
                        found: self.input[start ..].chars().next().unwrap_or('?').to_string(),
                        position: start,
                    });
                }
            };
            tokens.push(SpannedToken {
                token,
                position: start,
            });
        }

        if tokens.is_empty() {
            return Err(SyntaxError::EmptyInput);
        }

        tokens.push(SpannedToken {
            token: Token::Eof,
            position: self.offset,
        });
        Ok(tokens)
    }

    /// Consumes one byte and returns `token`.
    const fn single(&mut self, token: Token<'a>) -> Token<'a> {
        self.offset += 1;
        token
    }

    /// Returns `with` when the next byte is `=`, else `without`.
    fn with_equals(&mut self, with: Token<'a>, without: Token<'a>) -> Token<'a> {
        if self.input.as_bytes().get(self.offset + 1) == Some(&b'=') {
            self.offset += 2;
            with
        } else {
            self.offset += 1;
            without
        }
    }

    /// Consumes a doubled operator such as `&&`.
    fn pair(
        &mut self,
        second: u8,
        token: Token<'a>,
        expected: &'static str,
    ) -> Result<Token<'a>, SyntaxError> {
        if self.input.as_bytes().get(self.offset + 1) == Some(&second) {
            self.offset += 2;
            Ok(token)
        } else {
            Err(SyntaxError::UnexpectedToken {
                expected,
                found: self.input[self.offset ..].chars().take(2).collect(),
                position: self.offset,
            })
        }
    }

    /// Lexes a quoted string literal with backslash escapes.
    fn string(&mut self, quote: u8) -> Result<Token<'a>, SyntaxError> {
        let start = self.offset;
        self.offset += 1;
        let mut text = String::new();
        let mut chars = self.input[self.offset ..].char_indices();
        while let Some((index, ch)) = chars.next() {
            if ch == char::from(quote) {
                self.offset += index + 1;
                return Ok(Token::Str(text));
            }
            if ch == '\\' {
                match chars.next() {
                    Some((_, escaped)) => text.push(escaped),
                    None => break,
                }
            } else {
                text.push(ch);
            }
        }
        Err(SyntaxError::UnterminatedString {
            position: start,
        })
    }

    /// Lexes an integer or decimal literal.
    fn number(&mut self) -> Result<Token<'a>, SyntaxError> {
        let start = self.offset;
        self.consume_while(|b| b.is_ascii_digit());
        let bytes = self.input.as_bytes();
        if bytes.get(self.offset) == Some(&b'.')
            && bytes.get(self.offset + 1).is_some_and(u8::is_ascii_digit)
        {
            self.offset += 1;
            self.consume_while(|b| b.is_ascii_digit());
        }
        let raw = &self.input[start .. self.offset];
        raw.parse::<f64>().map(Token::Number).map_err(|_| SyntaxError::InvalidNumber {
            raw: raw.to_string(),
            position: start,
        })
    }

    /// Advances while the condition matches the current byte.
    fn consume_while<F>(&mut self, condition: F)
    where
        F: Fn(u8) -> bool,
    {
        while let Some(&b) = self.input.as_bytes().get(self.offset) {
            if condition(b) {
                self.offset += 1;
            } else {
                break;
            }
        }
    }
}

// ============================================================================
// SECTION: Parser
// ============================================================================

/// Lexes and parses `input` into a syntax tree.
fn parse(input: &str, max_bytes: usize) -> Result<Node, SyntaxError> {
    if input.len() > max_bytes {
        return Err(SyntaxError::InputTooLarge {
            max_bytes,
            actual_bytes: input.len(),
        });
    }
    let tokens = Lexer::new(input).lex()?;
    let mut parser = Parser::new(tokens);
    let root = parser.parse_expression()?;
    parser.expect_eof()?;
    Ok(root)
}

/// Recursive-descent parser for the expression language.
struct Parser<'a> {
    /// Token stream with source positions.
    tokens: Vec<SpannedToken<'a>>,
    /// Current token index.
    index: usize,
    /// Current nesting depth for grouped or function expressions.
    nesting: usize,
}

impl<'a> Parser<'a> {
    /// Creates a parser over the token stream.
    const fn new(tokens: Vec<SpannedToken<'a>>) -> Self {
        Self {
            tokens,
            index: 0,
            nesting: 0,
        }
    }

    /// Parses a full expression.
    fn parse_expression(&mut self) -> Result<Node, SyntaxError> {
        self.parse_binary(0)
    }

    /// Parses binary operators at `level` and above.
    fn parse_binary(&mut self, level: usize) -> Result<Node, SyntaxError> {
        /// Operators grouped by ascending precedence.
        const LEVELS: [&[BinaryOp]; 6] = [
            &[BinaryOp::Or],
            &[BinaryOp::And],
            &[BinaryOp::Eq, BinaryOp::Ne],
            &[BinaryOp::Gt, BinaryOp::Ge, BinaryOp::Lt, BinaryOp::Le],
            &[BinaryOp::Add, BinaryOp::Sub],
            &[BinaryOp::Mul, BinaryOp::Div, BinaryOp::Rem],
        ];
        let Some(operators) = LEVELS.get(level) else {
            return self.parse_unary();
        };

        let mut lhs = self.parse_binary(level + 1)?;
        loop {
            let op = match self.current().token {
                Token::Op(op) if operators.contains(&op) => op,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_binary(level + 1)?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// Parses unary expressions.
    fn parse_unary(&mut self) -> Result<Node, SyntaxError> {
        let position = self.current().position;
        if self.matches(&Token::Not) {
            let operand = self.with_nesting(position, Self::parse_unary)?;
            return Ok(Node::Unary(UnaryOp::Not, Box::new(operand)));
        }
        if self.matches(&Token::Op(BinaryOp::Sub)) {
            let operand = self.with_nesting(position, Self::parse_unary)?;
            return Ok(Node::Unary(UnaryOp::Negate, Box::new(operand)));
        }
        self.parse_primary()
    }

    /// Parses a primary expression.
    fn parse_primary(&mut self) -> Result<Node, SyntaxError> {
        let SpannedToken {
            token,
            position,
        } = self.current().clone();
        match token {
            Token::Number(value) => {
                self.advance();
                Ok(Node::Literal(Value::Num(value)))
            }
            Token::Str(text) => {
                self.advance();
                Ok(Node::Literal(Value::Str(text)))
            }
            Token::Ident("true") => {
                self.advance();
                Ok(Node::Literal(Value::Bool(true)))
            }
            Token::Ident("false") => {
                self.advance();
                Ok(Node::Literal(Value::Bool(false)))
            }
            Token::Ident(name) => {
                self.advance();
                if self.matches(&Token::LParen) {
                    return self.parse_function(name, position);
                }
                let mut path = vec![name.to_string()];
                while self.matches(&Token::Dot) {
                    match self.current().token {
                        Token::Ident(field) => {
                            path.push(field.to_string());
                            self.advance();
                        }
                        _ => {
                            return Err(self.unexpected("field name after `.`"));
                        }
                    }
                }
                Ok(Node::Variable(path))
            }
            Token::LParen => {
                self.advance();
                self.with_nesting(position, |parser| {
                    let expr = parser.parse_expression()?;
                    parser.expect(&Token::RParen, "`)`")?;
                    Ok(expr)
                })
            }
            Token::Op(_)
            | Token::Not
            | Token::Dot
            | Token::RParen
            | Token::Comma
            | Token::Eof => Err(self.unexpected("literal, variable, or `(`")),
        }
    }

    /// Parses a function call after its opening parenthesis.
    fn parse_function(&mut self, name: &str, position: usize) -> Result<Node, SyntaxError> {
        if name != "in" {
            return Err(SyntaxError::UnknownFunction {
                name: name.to_string(),
                position,
            });
        }
        self.with_nesting(position, |parser| {
            let mut args = Vec::new();
            if parser.matches(&Token::RParen) {
                return Ok(Node::In(args));
            }
            loop {
                args.push(parser.parse_expression()?);
                if parser.matches(&Token::Comma) {
                    continue;
                }
                parser.expect(&Token::RParen, "`)` after arguments")?;
                break;
            }
            Ok(Node::In(args))
        })
    }

    /// Runs a parser step while enforcing the nesting limit.
    fn with_nesting<T>(
        &mut self,
        position: usize,
        f: impl FnOnce(&mut Self) -> Result<T, SyntaxError>,
    ) -> Result<T, SyntaxError> {
        let next_depth = self.nesting + 1;
        if next_depth > MAX_EXPRESSION_NESTING {
            return Err(SyntaxError::NestingTooDeep {
                max_depth: MAX_EXPRESSION_NESTING,
                position,
            });
        }
        self.nesting = next_depth;
        let result = f(self);
        self.nesting = self.nesting.saturating_sub(1);
        result
    }

    /// Consumes the expected token or returns an error.
    fn expect(&mut self, token: &Token<'_>, expected: &'static str) -> Result<(), SyntaxError> {
        if self.matches(token) { Ok(()) } else { Err(self.unexpected(expected)) }
    }

    /// Ensures the parser is at end-of-input.
    fn expect_eof(&self) -> Result<(), SyntaxError> {
        if matches!(self.current().token, Token::Eof) {
            Ok(())
        } else {
            Err(SyntaxError::TrailingInput {
                position: self.current().position,
            })
        }
    }

    /// Consumes the token if it has the same kind as `kind`.
    fn matches(&mut self, kind: &Token<'_>) -> bool {
        let same = match (&self.current().token, kind) {
            (Token::Op(current), Token::Op(wanted)) => current == wanted,
            (current, wanted) => std::mem::discriminant(current) == std::mem::discriminant(wanted),
        };
        if same {
            self.advance();
        }
        same
    }

    /// Builds an unexpected-token error at the current position.
    fn unexpected(&self, expected: &'static str) -> SyntaxError {
        SyntaxError::UnexpectedToken {
            expected,
            found: self.describe_current(),
            position: self.current().position,
        }
    }

    /// Returns the current token.
    fn current(&self) -> &SpannedToken<'a> {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.index.min(last)]
    }

    /// Advances to the next token.
    const fn advance(&mut self) {
        if self.index + 1 < self.tokens.len() {
            self.index += 1;
        }
    }

    /// Formats the current token for diagnostics.
    fn describe_current(&self) -> String {
        match &self.current().token {
            Token::Ident(name) => (*name).to_string(),
            Token::Number(value) => value.to_string(),
            Token::Str(text) => format!("'{text}'"),
            Token::Op(op) => op.symbol().to_string(),
            Token::Not => "!".to_string(),
            Token::Dot => ".".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
            Token::Comma => ",".to_string(),
            Token::Eof => "end of input".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Runtime value produced during evaluation.
#[derive(Debug, Clone, PartialEq)]
enum Value {
    /// String value.
    Str(String),
    /// Numeric value.
    Num(f64),
    /// Boolean value.
    Bool(bool),
    /// Structured value (object or array) compared by equality only.
    Other(JsonValue),
}

impl Value {
    /// Converts a JSON value into an evaluation value. `null` is undefined.
    fn from_json(value: &JsonValue) -> Result<Self, Fault> {
        match value {
            JsonValue::Null => Err(Fault::Undefined),
            JsonValue::Bool(flag) => Ok(Self::Bool(*flag)),
            JsonValue::Number(number) => {
                Ok(number.as_f64().map_or_else(|| Self::Other(value.clone()), Self::Num))
            }
            JsonValue::String(text) => Ok(Self::Str(text.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => Ok(Self::Other(value.clone())),
        }
    }

    /// Describes the value for diagnostics.
    fn describe(&self) -> String {
        match self {
            Self::Str(text) => format!("string '{text}'"),
            Self::Num(value) => format!("number {value}"),
            Self::Bool(flag) => format!("bool {flag}"),
            Self::Other(value) => format!("value {value}"),
        }
    }

    /// Renders the value for string concatenation.
    fn render(&self) -> String {
        match self {
            Self::Str(text) => text.clone(),
            Self::Num(value) => value.to_string(),
            Self::Bool(flag) => flag.to_string(),
            Self::Other(value) => value.to_string(),
        }
    }

    /// Loose equality: values of different types are never equal.
    fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Num(lhs), Self::Num(rhs)) => lhs.partial_cmp(rhs) == Some(Ordering::Equal),
            (Self::Str(lhs), Self::Str(rhs)) => lhs == rhs,
            (Self::Bool(lhs), Self::Bool(rhs)) => lhs == rhs,
            (Self::Other(lhs), Self::Other(rhs)) => lhs == rhs,
            _ => false,
        }
    }
}

/// Evaluation failure kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Fault {
    /// A referenced variable does not exist.
    Undefined,
    /// An operation was applied to unsupported operands.
    Invalid(String),
}

/// Evaluates a syntax tree node.
fn eval(node: &Node, params: &ExpressionParams) -> Result<Value, Fault> {
    match node {
        Node::Literal(value) => Ok(value.clone()),
        Node::Variable(path) => lookup(path, params),
        Node::Unary(op, operand) => {
            let value = eval(operand, params)?;
            match (op, value) {
                (UnaryOp::Not, Value::Bool(flag)) => Ok(Value::Bool(!flag)),
                (UnaryOp::Negate, Value::Num(number)) => Ok(Value::Num(-number)),
                (UnaryOp::Not, other) => {
                    Err(Fault::Invalid(format!("cannot apply `!` to {}", other.describe())))
                }
                (UnaryOp::Negate, other) => {
                    Err(Fault::Invalid(format!("cannot negate {}", other.describe())))
                }
            }
        }
        Node::Binary(BinaryOp::And, lhs, rhs) => {
            if expect_bool(BinaryOp::And, eval(lhs, params)?)? {
                Ok(Value::Bool(expect_bool(BinaryOp::And, eval(rhs, params)?)?))
            } else {
                Ok(Value::Bool(false))
            }
        }
        Node::Binary(BinaryOp::Or, lhs, rhs) => {
            if expect_bool(BinaryOp::Or, eval(lhs, params)?)? {
                Ok(Value::Bool(true))
            } else {
                Ok(Value::Bool(expect_bool(BinaryOp::Or, eval(rhs, params)?)?))
            }
        }
        Node::Binary(op, lhs, rhs) => {
            let lhs = eval(lhs, params)?;
            let rhs = eval(rhs, params)?;
            apply_binary(*op, &lhs, &rhs)
        }
        Node::In(args) => {
            let Some((needle, candidates)) = args.split_first() else {
                return Err(Fault::Invalid("function `in` requires at least one argument".into()));
            };
            let needle = eval(needle, params)?;
            for candidate in candidates {
                if needle.loose_eq(&eval(candidate, params)?) {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
    }
}

/// Resolves a dotted variable path against the parameters.
fn lookup(path: &[String], params: &ExpressionParams) -> Result<Value, Fault> {
    let Some((head, rest)) = path.split_first() else {
        return Err(Fault::Undefined);
    };
    let mut current = params.get(head).ok_or(Fault::Undefined)?;
    for field in rest {
        current = current.as_object().and_then(|object| object.get(field)).ok_or(Fault::Undefined)?;
    }
    Value::from_json(current)
}

/// Requires a boolean operand for a logical operator.
fn expect_bool(op: BinaryOp, value: Value) -> Result<bool, Fault> {
    match value {
        Value::Bool(flag) => Ok(flag),
        other => Err(Fault::Invalid(format!(
            "operator `{}` requires booleans, found {}",
            op.symbol(),
            other.describe()
        ))),
    }
}

/// Applies a non-logical binary operator.
fn apply_binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, Fault> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(lhs.loose_eq(rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!lhs.loose_eq(rhs))),
        BinaryOp::Add => match (lhs, rhs) {
            (Value::Num(a), Value::Num(b)) => Ok(Value::Num(a + b)),
            (Value::Str(_), _) | (_, Value::Str(_)) => {
                Ok(Value::Str(format!("{}{}", lhs.render(), rhs.render())))
            }
            _ => Err(mismatch(op, lhs, rhs)),
        },
        BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le => {
            let (Value::Num(a), Value::Num(b)) = (lhs, rhs) else {
                return Err(mismatch(op, lhs, rhs));
            };
            let ordering = a.partial_cmp(b);
            let result = match op {
                BinaryOp::Gt => ordering == Some(Ordering::Greater),
                BinaryOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
                BinaryOp::Lt => ordering == Some(Ordering::Less),
                _ => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let (Value::Num(a), Value::Num(b)) = (lhs, rhs) else {
                return Err(mismatch(op, lhs, rhs));
            };
            let zero_divisor = b.partial_cmp(&0.0) == Some(Ordering::Equal);
            if matches!(op, BinaryOp::Div | BinaryOp::Rem) && zero_divisor {
                return Err(Fault::Invalid("division by zero".to_string()));
            }
            Ok(Value::Num(match op {
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            }))
        }
        BinaryOp::And | BinaryOp::Or => {
            Ok(Value::Bool(expect_bool(op, lhs.clone())? && expect_bool(op, rhs.clone())?))
        }
    }
}

/// Builds a type-mismatch fault.
fn mismatch(op: BinaryOp, lhs: &Value, rhs: &Value) -> Fault {
    Fault::Invalid(format!(
        "operator `{}` is not defined for {} and {}",
        op.symbol(),
        lhs.describe(),
        rhs.describe()
    ))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
