//! Error types for mathexpr
//!
//! Every problem the engine detects becomes a [`MathError`]. Errors never
//! abort evaluation: the interpreter appends them to an [`ErrorLog`] and
//! carries on with an `Invalid` value.

use crate::token::Span;
use std::fmt;
use thiserror::Error;

/// Broad classification of an error, following the pipeline stage that
/// detected it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Lexical,
    Syntax,
    Semantic,
    Compile,
    Runtime,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Lexical => "lexical",
            ErrorCategory::Syntax => "syntax",
            ErrorCategory::Semantic => "semantic",
            ErrorCategory::Compile => "compile",
            ErrorCategory::Runtime => "runtime",
        };
        write!(f, "{}", name)
    }
}

/// Error kinds in mathexpr
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    // Lexer errors
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),
    #[error("unterminated string")]
    UnterminatedString,
    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    // Parser errors
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("expected {expected}, got '{found}'")]
    ExpectedToken { expected: String, found: String },
    #[error("matrix row {row} has {found} elements, expected {expected}")]
    MatrixRowLength { row: usize, expected: usize, found: usize },
    #[error("{name}() does not accept {found} arguments")]
    SpecialFormArity { name: String, found: usize },
    #[error("{0}(): the loop variable must be a plain name")]
    LoopVariableNotName(String),
    #[error("function '{0}': parameters must be plain names")]
    InvalidParameter(String),
    #[error("expression nested deeper than {0} levels")]
    NestingTooDeep(usize),

    // Semantic errors
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),
    #[error("undefined function '{0}'")]
    UndefinedFunction(String),
    #[error("operator '{op}' is not defined for {lhs} and {rhs}")]
    OperatorType { op: &'static str, lhs: &'static str, rhs: &'static str },
    #[error("operator '{op}' is not defined for {operand}")]
    UnaryOperatorType { op: &'static str, operand: &'static str },
    #[error("operator '{op}': operand lengths differ ({lhs} vs {rhs})")]
    LengthMismatch { op: &'static str, lhs: usize, rhs: usize },
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: f64, len: usize },
    #[error("cannot index {target} with {index}")]
    InvalidIndex { target: &'static str, index: &'static str },
    #[error("{name}() expects {expected} arguments, got {found}")]
    WrongArgumentCount { name: String, expected: usize, found: usize },
    #[error("condition must be a bool, got {0}")]
    NonBooleanCondition(&'static str),
    #[error("{0} has no members")]
    NotAStruct(&'static str),
    #[error("no member named '{0}'")]
    NoSuchMember(String),
    #[error("range bounds must be numbers, got {0}")]
    RangeBound(&'static str),
    #[error("cannot iterate over {0}")]
    NotIterable(&'static str),
    #[error("cannot build a vector from {0}")]
    VectorElement(&'static str),
    #[error("cannot assign {found} to host variable '{name}' of type {expected}")]
    HostTypeMismatch { name: String, expected: &'static str, found: &'static str },
    #[error("maximum call depth {0} exceeded")]
    CallDepth(usize),
    #[error("vector would exceed {limit} elements")]
    VectorTooLong { limit: usize },
    #[error("{0}")]
    Function(String),

    // Bytecode compile errors
    #[error("cannot compile {0} to bytecode")]
    UnsupportedNode(&'static str),
    #[error("variable '{0}' is not a top-level variable")]
    NonTopLevelVariable(String),
    #[error("variable '{0}' is not numeric")]
    NonNumericVariable(String),
    #[error("recursive call of '{0}' cannot be compiled")]
    RecursiveCall(String),

    // VM errors
    #[error("stack underflow")]
    StackUnderflow,
    #[error("stack overflow")]
    StackOverflow,
    #[error("jump outside program at instruction {0}")]
    InvalidJump(usize),
    #[error("function '{name}' returned {found}, expected a number")]
    FunctionResultType { name: String, found: &'static str },
    #[error("program left no result")]
    EmptyResult,
}

impl ErrorKind {
    pub fn category(&self) -> ErrorCategory {
        use ErrorKind::*;
        match self {
            UnexpectedCharacter(_) | UnterminatedString | InvalidNumber(_) => {
                ErrorCategory::Lexical
            }
            UnexpectedToken(_)
            | UnexpectedEnd
            | ExpectedToken { .. }
            | MatrixRowLength { .. }
            | SpecialFormArity { .. }
            | LoopVariableNotName(_)
            | InvalidParameter(_)
            | NestingTooDeep(_) => ErrorCategory::Syntax,
            UnsupportedNode(_)
            | NonTopLevelVariable(_)
            | NonNumericVariable(_)
            | RecursiveCall(_) => ErrorCategory::Compile,
            StackUnderflow
            | StackOverflow
            | InvalidJump(_)
            | FunctionResultType { .. }
            | EmptyResult => ErrorCategory::Runtime,
            _ => ErrorCategory::Semantic,
        }
    }
}

/// A mathexpr error with optional location information
#[derive(Debug, Clone, PartialEq)]
pub struct MathError {
    pub kind: ErrorKind,
    pub span: Option<Span>,
}

impl MathError {
    pub fn new(kind: ErrorKind, span: Option<Span>) -> Self {
        Self { kind, span }
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }
}

impl From<ErrorKind> for MathError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind, None)
    }
}

impl fmt::Display for MathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(span) = &self.span {
            write!(f, "[line {}:{}] Error: {}", span.line, span.column, self.kind)
        } else {
            write!(f, "Error: {}", self.kind)
        }
    }
}

impl std::error::Error for MathError {}

/// Result type for mathexpr operations
pub type Result<T> = std::result::Result<T, MathError>;

/// Ordered log of every error reported by one interpreter.
#[derive(Debug, Default, Clone)]
pub struct ErrorLog {
    entries: Vec<MathError>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: MathError) {
        tracing::warn!(category = %error.category(), "{}", error);
        self.entries.push(error);
    }

    pub fn first(&self) -> Option<&MathError> {
        self.entries.first()
    }

    pub fn last(&self) -> Option<&MathError> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MathError> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_span() {
        let err = MathError::new(ErrorKind::UnexpectedCharacter('#'), Some(Span::new(3, 4, 1, 4)));
        assert_eq!(err.to_string(), "[line 1:4] Error: unexpected character '#'");
    }

    #[test]
    fn test_categories() {
        assert_eq!(ErrorKind::UnterminatedString.category(), ErrorCategory::Lexical);
        assert_eq!(ErrorKind::UnexpectedEnd.category(), ErrorCategory::Syntax);
        assert_eq!(ErrorKind::UndefinedVariable("x".into()).category(), ErrorCategory::Semantic);
        assert_eq!(ErrorKind::RecursiveCall("f".into()).category(), ErrorCategory::Compile);
        assert_eq!(ErrorKind::StackUnderflow.category(), ErrorCategory::Runtime);
    }

    #[test]
    fn test_log_order() {
        let mut log = ErrorLog::new();
        log.push(ErrorKind::UnexpectedEnd.into());
        log.push(ErrorKind::StackOverflow.into());
        assert_eq!(log.len(), 2);
        assert_eq!(log.first().unwrap().kind, ErrorKind::UnexpectedEnd);
        assert_eq!(log.last().unwrap().kind, ErrorKind::StackOverflow);
        log.clear();
        assert!(log.is_empty());
    }
}
