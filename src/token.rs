//! Token definitions for mathexpr
//!
//! Tokens represent the atomic units of a formula.

use std::fmt;

/// Location in source code for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self { start, end, line, column }
    }
}

/// Token types in mathexpr
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Number(f64),
    String(String),
    Name(String),
    True,
    False,

    // Arithmetic
    Plus,       // +
    Minus,      // -
    Mul,        // *
    Div,        // /
    Modulo,     // %
    Power,      // ^
    BinaryAnd,  // & or band
    BinaryOr,   // | or bor
    Tilde,      // ~

    // Comparison
    Assign,       // =
    Equal,        // ==
    NotEqual,     // !=
    Less,         // <
    LessEqual,    // <=
    Greater,      // >
    GreaterEqual, // >=

    // Logical
    LogicAnd,   // && or and
    LogicOr,    // || or or
    LogicXor,   // xor
    LogicNor,   // nor
    LogicNand,  // nand
    LogicNot,   // not
    Bang,       // ! (prefix logical not)

    // Delimiters
    LeftParen,    // (
    RightParen,   // )
    LeftBracket,  // [
    RightBracket, // ]
    LeftBrace,    // {
    RightBrace,   // }
    Comma,        // ,
    Semicolon,    // ;
    Colon,        // :
    Dot,          // .

    End,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "{}", n),
            TokenKind::String(s) => write!(f, "\"{}\"", s),
            TokenKind::Name(s) => write!(f, "{}", s),
            TokenKind::True => write!(f, "true"),
            TokenKind::False => write!(f, "false"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Mul => write!(f, "*"),
            TokenKind::Div => write!(f, "/"),
            TokenKind::Modulo => write!(f, "%"),
            TokenKind::Power => write!(f, "^"),
            TokenKind::BinaryAnd => write!(f, "&"),
            TokenKind::BinaryOr => write!(f, "|"),
            TokenKind::Tilde => write!(f, "~"),
            TokenKind::Assign => write!(f, "="),
            TokenKind::Equal => write!(f, "=="),
            TokenKind::NotEqual => write!(f, "!="),
            TokenKind::Less => write!(f, "<"),
            TokenKind::LessEqual => write!(f, "<="),
            TokenKind::Greater => write!(f, ">"),
            TokenKind::GreaterEqual => write!(f, ">="),
            TokenKind::LogicAnd => write!(f, "and"),
            TokenKind::LogicOr => write!(f, "or"),
            TokenKind::LogicXor => write!(f, "xor"),
            TokenKind::LogicNor => write!(f, "nor"),
            TokenKind::LogicNand => write!(f, "nand"),
            TokenKind::LogicNot => write!(f, "not"),
            TokenKind::Bang => write!(f, "!"),
            TokenKind::LeftParen => write!(f, "("),
            TokenKind::RightParen => write!(f, ")"),
            TokenKind::LeftBracket => write!(f, "["),
            TokenKind::RightBracket => write!(f, "]"),
            TokenKind::LeftBrace => write!(f, "{{"),
            TokenKind::RightBrace => write!(f, "}}"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Dot => write!(f, "."),
            TokenKind::End => write!(f, "end of input"),
        }
    }
}

/// A token with its kind and location
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Check if a name is a keyword and return the corresponding token kind.
/// Keywords are case-sensitive.
pub fn lookup_keyword(ident: &str) -> Option<TokenKind> {
    match ident {
        "true" => Some(TokenKind::True),
        "false" => Some(TokenKind::False),
        "and" => Some(TokenKind::LogicAnd),
        "or" => Some(TokenKind::LogicOr),
        "xor" => Some(TokenKind::LogicXor),
        "not" => Some(TokenKind::LogicNot),
        "nor" => Some(TokenKind::LogicNor),
        "nand" => Some(TokenKind::LogicNand),
        "band" => Some(TokenKind::BinaryAnd),
        "bor" => Some(TokenKind::BinaryOr),
        _ => None,
    }
}

/// Names that lex as floating point constants, compared case-insensitively.
pub fn lookup_number_name(ident: &str) -> Option<f64> {
    if ident.eq_ignore_ascii_case("nan") {
        Some(f64::NAN)
    } else if ident.eq_ignore_ascii_case("inf") {
        Some(f64::INFINITY)
    } else if ident.eq_ignore_ascii_case("ninf") {
        Some(f64::NEG_INFINITY)
    } else {
        None
    }
}
