//! Lexer for mathexpr
//!
//! Converts formula text into tokens, one at a time. The parser pulls tokens
//! on demand; [`Lexer::tokenize`] collects them all for tooling and tests.

use crate::error::{ErrorKind, MathError, Result};
use crate::token::{lookup_keyword, lookup_number_name, Span, Token, TokenKind};

/// The lexer state
pub struct Lexer<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer from source code
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            current_pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the entire source, stopping at the first lexical error.
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::End;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    /// Get the next token. After an error the offending characters have been
    /// consumed, so calling again continues with the rest of the input.
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments();

        let start_line = self.line;
        let start_column = self.column;
        let Some(&(start_pos, ch)) = self.chars.peek() else {
            return Ok(Token::new(
                TokenKind::End,
                Span::new(self.current_pos, self.current_pos, start_line, start_column),
            ));
        };

        let kind = match ch {
            '(' => { self.advance(); TokenKind::LeftParen }
            ')' => { self.advance(); TokenKind::RightParen }
            '[' => { self.advance(); TokenKind::LeftBracket }
            ']' => { self.advance(); TokenKind::RightBracket }
            '{' => { self.advance(); TokenKind::LeftBrace }
            '}' => { self.advance(); TokenKind::RightBrace }
            ',' => { self.advance(); TokenKind::Comma }
            ';' => { self.advance(); TokenKind::Semicolon }
            ':' => { self.advance(); TokenKind::Colon }
            '+' => { self.advance(); TokenKind::Plus }
            '-' => { self.advance(); TokenKind::Minus }
            '*' => { self.advance(); TokenKind::Mul }
            '/' => { self.advance(); TokenKind::Div }
            '%' => { self.advance(); TokenKind::Modulo }
            '^' => { self.advance(); TokenKind::Power }
            '~' => { self.advance(); TokenKind::Tilde }

            // Potentially two-character tokens
            '&' => self.one_or_two('&', TokenKind::LogicAnd, TokenKind::BinaryAnd),
            '|' => self.one_or_two('|', TokenKind::LogicOr, TokenKind::BinaryOr),
            '=' => self.one_or_two('=', TokenKind::Equal, TokenKind::Assign),
            '!' => self.one_or_two('=', TokenKind::NotEqual, TokenKind::Bang),
            '<' => self.one_or_two('=', TokenKind::LessEqual, TokenKind::Less),
            '>' => self.one_or_two('=', TokenKind::GreaterEqual, TokenKind::Greater),

            '.' if self.next_is_digit(1) => self.scan_number()?,
            '.' => { self.advance(); TokenKind::Dot }

            '"' => self.scan_string()?,

            c if c.is_ascii_digit() => self.scan_number()?,

            c if c.is_ascii_alphabetic() || c == '_' => self.scan_identifier(),

            _ => {
                self.advance();
                return Err(MathError::new(
                    ErrorKind::UnexpectedCharacter(ch),
                    Some(Span::new(start_pos, self.current_pos, start_line, start_column)),
                ));
            }
        };

        Ok(Token::new(
            kind,
            Span::new(start_pos, self.current_pos, start_line, start_column),
        ))
    }

    /// Consume one character, then a second one if it equals `second`.
    fn one_or_two(&mut self, second: char, double: TokenKind, single: TokenKind) -> TokenKind {
        self.advance();
        if self.peek_char() == Some(second) {
            self.advance();
            double
        } else {
            single
        }
    }

    /// Advance and return the current character
    fn advance(&mut self) -> Option<char> {
        let (pos, ch) = self.chars.next()?;
        self.current_pos = pos + ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    /// Peek at the next character without advancing
    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, ch)| ch)
    }

    /// Character `offset` positions past the next unread one.
    fn char_at(&self, offset: usize) -> Option<char> {
        self.source[self.current_pos..].chars().nth(offset)
    }

    fn next_is_digit(&self, offset: usize) -> bool {
        self.char_at(offset).map_or(false, |c| c.is_ascii_digit())
    }

    /// Skip whitespace, `//` line comments and `/* */` block comments
    fn skip_whitespace_and_comments(&mut self) {
        while let Some(ch) = self.peek_char() {
            let rest = &self.source[self.current_pos..];
            if ch.is_whitespace() {
                self.advance();
            } else if rest.starts_with("//") {
                while let Some(c) = self.peek_char() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else if rest.starts_with("/*") {
                self.advance();
                self.advance();
                while self.peek_char().is_some() {
                    if self.source[self.current_pos..].starts_with("*/") {
                        self.advance();
                        self.advance();
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    /// Scan a `"`-delimited string literal.
    ///
    /// A doubled delimiter stands for one literal quote; unknown backslash
    /// sequences are kept verbatim.
    fn scan_string(&mut self) -> Result<TokenKind> {
        let start_line = self.line;
        let start_column = self.column;
        let start_pos = self.current_pos;

        self.advance();
        let mut value = String::new();

        loop {
            match self.peek_char() {
                Some('"') => {
                    self.advance();
                    if self.peek_char() == Some('"') {
                        self.advance();
                        value.push('"');
                    } else {
                        return Ok(TokenKind::String(value));
                    }
                }
                Some('\\') => {
                    self.advance();
                    match self.peek_char() {
                        Some('"') => { self.advance(); value.push('"'); }
                        Some('\'') => { self.advance(); value.push('\''); }
                        Some('t') => { self.advance(); value.push('\t'); }
                        Some('n') => { self.advance(); value.push('\n'); }
                        Some('r') => { self.advance(); value.push('\r'); }
                        Some('\\') => { self.advance(); value.push('\\'); }
                        Some('/') => { self.advance(); value.push('/'); }
                        Some(c) => { self.advance(); value.push('\\'); value.push(c); }
                        None => break,
                    }
                }
                Some(c) => {
                    self.advance();
                    value.push(c);
                }
                None => break,
            }
        }

        Err(MathError::new(
            ErrorKind::UnterminatedString,
            Some(Span::new(start_pos, self.current_pos, start_line, start_column)),
        ))
    }

    /// Scan a number literal
    fn scan_number(&mut self) -> Result<TokenKind> {
        let start = self.current_pos;
        let start_line = self.line;
        let start_column = self.column;

        if self.peek_char() == Some('0') {
            let radix = match self.char_at(1) {
                Some('x') | Some('X') => Some(16),
                Some('o') | Some('O') => Some(8),
                Some('b') | Some('B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.advance();
                self.advance();
                let digits_start = self.current_pos;
                while let Some(c) = self.peek_char() {
                    if c.is_digit(radix) {
                        self.advance();
                    } else {
                        break;
                    }
                }
                let digits = &self.source[digits_start..self.current_pos];
                return u64::from_str_radix(digits, radix)
                    .map(|v| TokenKind::Number(v as f64))
                    .map_err(|_| {
                        MathError::new(
                            ErrorKind::InvalidNumber(
                                self.source[start..self.current_pos].to_string(),
                            ),
                            Some(Span::new(start, self.current_pos, start_line, start_column)),
                        )
                    });
            }
        }

        let mut seen_dot = false;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.advance();
            } else if c == '.' && !seen_dot {
                seen_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        // Exponent, only when digits follow (optionally after one sign)
        if matches!(self.peek_char(), Some('e') | Some('E')) {
            let signed = matches!(self.char_at(1), Some('+') | Some('-'));
            let digit_offset = if signed { 2 } else { 1 };
            if self.next_is_digit(digit_offset) {
                for _ in 0..digit_offset {
                    self.advance();
                }
                while let Some(c) = self.peek_char() {
                    if c.is_ascii_digit() {
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
        }

        let text = &self.source[start..self.current_pos];
        text.parse::<f64>().map(TokenKind::Number).map_err(|_| {
            MathError::new(
                ErrorKind::InvalidNumber(text.to_string()),
                Some(Span::new(start, self.current_pos, start_line, start_column)),
            )
        })
    }

    /// Scan an identifier, keyword or named floating point constant
    fn scan_identifier(&mut self) -> TokenKind {
        let start = self.current_pos;

        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let text = &self.source[start..self.current_pos];
        if let Some(keyword) = lookup_keyword(text) {
            keyword
        } else if let Some(value) = lookup_number_name(text) {
            TokenKind::Number(value)
        } else {
            TokenKind::Name(text.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source);
        lexer
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .filter(|k| !matches!(k, TokenKind::End))
            .collect()
    }

    fn number(source: &str) -> f64 {
        match tokenize(source).as_slice() {
            [TokenKind::Number(n)] => *n,
            other => panic!("expected a single number, got {:?}", other),
        }
    }

    #[test]
    fn test_keywords() {
        let tokens = tokenize("true false and or xor not nor nand band bor");
        assert_eq!(tokens, vec![
            TokenKind::True,
            TokenKind::False,
            TokenKind::LogicAnd,
            TokenKind::LogicOr,
            TokenKind::LogicXor,
            TokenKind::LogicNot,
            TokenKind::LogicNor,
            TokenKind::LogicNand,
            TokenKind::BinaryAnd,
            TokenKind::BinaryOr,
        ]);
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        assert_eq!(tokenize("AND"), vec![TokenKind::Name("AND".to_string())]);
    }

    #[test]
    fn test_operators() {
        let tokens = tokenize("+ - * / % ^ = == != < <= > >= && || & | ! ~");
        assert_eq!(tokens, vec![
            TokenKind::Plus,
            TokenKind::Minus,
            TokenKind::Mul,
            TokenKind::Div,
            TokenKind::Modulo,
            TokenKind::Power,
            TokenKind::Assign,
            TokenKind::Equal,
            TokenKind::NotEqual,
            TokenKind::Less,
            TokenKind::LessEqual,
            TokenKind::Greater,
            TokenKind::GreaterEqual,
            TokenKind::LogicAnd,
            TokenKind::LogicOr,
            TokenKind::BinaryAnd,
            TokenKind::BinaryOr,
            TokenKind::Bang,
            TokenKind::Tilde,
        ]);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(number("42"), 42.0);
        assert_eq!(number("3.25"), 3.25);
        assert_eq!(number("1.5e-3"), 0.0015);
        assert_eq!(number("2E+2"), 200.0);
        assert_eq!(number(".5"), 0.5);
        assert_eq!(number("0x1F"), 31.0);
        assert_eq!(number("0o17"), 15.0);
        assert_eq!(number("0b101"), 5.0);
    }

    #[test]
    fn test_named_numbers() {
        assert!(number("nan").is_nan());
        assert!(number("NaN").is_nan());
        assert_eq!(number("INF"), f64::INFINITY);
        assert_eq!(number("ninf"), f64::NEG_INFINITY);
    }

    #[test]
    fn test_second_dot_stops_number() {
        assert_eq!(tokenize("1.2.3"), vec![TokenKind::Number(1.2), TokenKind::Number(0.3)]);
    }

    #[test]
    fn test_exponent_without_digits() {
        assert_eq!(
            tokenize("2e"),
            vec![TokenKind::Number(2.0), TokenKind::Name("e".to_string())]
        );
    }

    #[test]
    fn test_strings() {
        let tokens = tokenize(r#""hello" "a\tb" "say ""hi""" "\q""#);
        assert_eq!(tokens, vec![
            TokenKind::String("hello".to_string()),
            TokenKind::String("a\tb".to_string()),
            TokenKind::String("say \"hi\"".to_string()),
            TokenKind::String("\\q".to_string()),
        ]);
    }

    #[test]
    fn test_comments() {
        let tokens = tokenize("1 // line\n + /* block\n comment */ 2");
        assert_eq!(tokens, vec![TokenKind::Number(1.0), TokenKind::Plus, TokenKind::Number(2.0)]);
    }

    #[test]
    fn test_struct_access_dot() {
        let tokens = tokenize("s.name");
        assert_eq!(tokens, vec![
            TokenKind::Name("s".to_string()),
            TokenKind::Dot,
            TokenKind::Name("name".to_string()),
        ]);
    }

    #[test]
    fn test_unknown_character_continues() {
        let mut lexer = Lexer::new("1 # 2");
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Number(1.0));
        let err = lexer.next_token().unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedCharacter('#'));
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Number(2.0));
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::End);
    }

    #[test]
    fn test_unterminated_string() {
        let mut lexer = Lexer::new("\"abc");
        assert_eq!(lexer.next_token().unwrap_err().kind, ErrorKind::UnterminatedString);
    }

    #[test]
    fn test_spans() {
        let mut lexer = Lexer::new("a +\n  b");
        let tokens = lexer.tokenize().unwrap();
        assert_eq!((tokens[0].span.line, tokens[0].span.column), (1, 1));
        assert_eq!((tokens[2].span.line, tokens[2].span.column), (2, 3));
    }
}
