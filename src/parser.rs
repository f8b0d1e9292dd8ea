//! Parser for mathexpr
//!
//! A recursive descent parser that pulls tokens from the lexer on demand and
//! builds the AST. Syntax errors are recorded and replaced by
//! [`Node::Invalid`]; parsing always runs to the end of the input. Only the
//! first error of a statement is reported, the rest of that statement is
//! skipped up to the next `;`.
//!
//! Precedence, loosest first:
//!
//! ```text
//! logical_expr   or || xor nor
//! logical_term   and && nand
//! comparison     == != < > <= >=
//! math_expr      + - | bor
//! math_term      * / % & band
//! unary          - + ! not ~
//! vector_primary a:b a:d:b
//! primary_op     ^ [index] .member   (left to right)
//! primary
//! ```
//!
//! The depth of the tree is bounded. Every nested expression, prefix
//! operator and link of an operator chain counts one level; past the limit
//! the statement fails with [`ErrorKind::NestingTooDeep`].

use std::rc::Rc;

use crate::ast::{BinaryOp, CompareOp, LogicalOp, LoopKind, LoopSource, Node, UnaryOp};
use crate::error::{ErrorKind, MathError};
use crate::lexer::Lexer;
use crate::stack::ensure_sufficient_stack;
use crate::token::{Span, Token, TokenKind};

/// Tree depth accepted by [`parse`]
pub const DEFAULT_MAX_DEPTH: usize = 1000;

/// Parses `source`, returning the tree and every error found.
pub fn parse(source: &str) -> (Node, Vec<MathError>) {
    let mut parser = Parser::new(source);
    let node = parser.parse();
    (node, parser.take_errors())
}

/// The parser state
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    errors: Vec<MathError>,
    /// Set after the first error of a statement; silences follow-up errors
    panicking: bool,
    depth: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::with_max_depth(source, DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(source: &'a str, max_depth: usize) -> Self {
        let mut parser = Self {
            lexer: Lexer::new(source),
            current: Token::new(TokenKind::End, Span::default()),
            errors: Vec::new(),
            panicking: false,
            depth: 0,
            max_depth,
        };
        parser.advance();
        parser
    }

    pub fn errors(&self) -> &[MathError] {
        &self.errors
    }

    pub fn take_errors(&mut self) -> Vec<MathError> {
        std::mem::take(&mut self.errors)
    }

    /// Parses `;`-separated statements up to the end of input. Returns the
    /// single statement, or a [`Node::NodeList`] for zero or several.
    pub fn parse(&mut self) -> Node {
        let mut statements = Vec::new();

        loop {
            self.panicking = false;
            match self.current.kind {
                TokenKind::End => break,
                TokenKind::Semicolon => {
                    self.advance();
                    continue;
                }
                _ => {}
            }

            let node = self.logical_expr();
            statements.push(node);

            match self.current.kind {
                TokenKind::Semicolon => {
                    self.panicking = false;
                    self.advance();
                }
                TokenKind::End => break,
                _ => {
                    self.unexpected();
                    if let Some(last) = statements.last_mut() {
                        *last = Node::Invalid;
                    }
                    self.synchronize();
                }
            }
        }

        tracing::debug!(
            statements = statements.len(),
            errors = self.errors.len(),
            "parsed formula"
        );

        if statements.len() == 1 {
            statements.pop().unwrap_or(Node::Invalid)
        } else {
            Node::NodeList(statements)
        }
    }

    // ==================== Operators ====================

    /// Entry for every nested expression
    fn logical_expr(&mut self) -> Node {
        let base = self.depth;
        let node = if self.descend() {
            ensure_sufficient_stack(|| self.logical_or())
        } else {
            Node::Invalid
        };
        self.depth = base;
        node
    }

    fn logical_or(&mut self) -> Node {
        let base = self.depth;
        let mut left = self.logical_term();
        loop {
            let op = match self.current.kind {
                TokenKind::LogicOr => LogicalOp::Or,
                TokenKind::LogicXor => LogicalOp::Xor,
                TokenKind::LogicNor => LogicalOp::Nor,
                _ => break,
            };
            if !self.descend() {
                left = Node::Invalid;
                break;
            }
            self.advance();
            let right = self.logical_term();
            left = Node::Logical { op, left: Box::new(left), right: Box::new(right) };
        }
        self.depth = base;
        left
    }

    fn logical_term(&mut self) -> Node {
        let base = self.depth;
        let mut left = self.comparison();
        loop {
            let op = match self.current.kind {
                TokenKind::LogicAnd => LogicalOp::And,
                TokenKind::LogicNand => LogicalOp::Nand,
                _ => break,
            };
            if !self.descend() {
                left = Node::Invalid;
                break;
            }
            self.advance();
            let right = self.comparison();
            left = Node::Logical { op, left: Box::new(left), right: Box::new(right) };
        }
        self.depth = base;
        left
    }

    fn comparison(&mut self) -> Node {
        let base = self.depth;
        let mut left = self.math_expr();
        loop {
            let op = match self.current.kind {
                TokenKind::Equal => CompareOp::Eq,
                TokenKind::NotEqual => CompareOp::Ne,
                TokenKind::Less => CompareOp::Lt,
                TokenKind::LessEqual => CompareOp::Le,
                TokenKind::Greater => CompareOp::Gt,
                TokenKind::GreaterEqual => CompareOp::Ge,
                _ => break,
            };
            if !self.descend() {
                left = Node::Invalid;
                break;
            }
            self.advance();
            let right = self.math_expr();
            left = Node::Compare { op, left: Box::new(left), right: Box::new(right) };
        }
        self.depth = base;
        left
    }

    fn math_expr(&mut self) -> Node {
        let base = self.depth;
        let mut left = self.math_term();
        loop {
            let op = match self.current.kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                TokenKind::BinaryOr => BinaryOp::BitOr,
                _ => break,
            };
            if !self.descend() {
                left = Node::Invalid;
                break;
            }
            self.advance();
            let right = self.math_term();
            left = Node::binary(op, left, right);
        }
        self.depth = base;
        left
    }

    fn math_term(&mut self) -> Node {
        let base = self.depth;
        let mut left = self.unary();
        loop {
            let op = match self.current.kind {
                TokenKind::Mul => BinaryOp::Mul,
                TokenKind::Div => BinaryOp::Div,
                TokenKind::Modulo => BinaryOp::Mod,
                TokenKind::BinaryAnd => BinaryOp::BitAnd,
                _ => break,
            };
            if !self.descend() {
                left = Node::Invalid;
                break;
            }
            self.advance();
            let right = self.unary();
            left = Node::binary(op, left, right);
        }
        self.depth = base;
        left
    }

    fn unary(&mut self) -> Node {
        let op = match self.current.kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => None,
            TokenKind::Bang | TokenKind::LogicNot => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            _ => return self.vector_primary(false),
        };
        self.advance();

        // `-1:3` negates the start, `-(1:3)` the whole range
        if op == Some(UnaryOp::Neg) && !self.at_prefix_operator() {
            return self.vector_primary(true);
        }

        let base = self.depth;
        let node = if self.descend() {
            let operand = ensure_sufficient_stack(|| self.unary());
            match op {
                Some(op) => Node::unary(op, operand),
                None => operand,
            }
        } else {
            Node::Invalid
        };
        self.depth = base;
        node
    }

    fn at_prefix_operator(&self) -> bool {
        matches!(
            self.current.kind,
            TokenKind::Minus
                | TokenKind::Plus
                | TokenKind::Bang
                | TokenKind::LogicNot
                | TokenKind::Tilde
        )
    }

    fn vector_primary(&mut self, negate_start: bool) -> Node {
        let mut start = self.primary_op();
        if negate_start {
            start = Node::unary(UnaryOp::Neg, start);
        }
        if self.current.kind != TokenKind::Colon {
            return start;
        }
        self.advance();
        let second = self.signed_operand(Self::primary_op);
        if self.current.kind != TokenKind::Colon {
            return Node::VectorConstruction {
                start: Box::new(start),
                delta: None,
                end: Box::new(second),
            };
        }
        self.advance();
        let end = self.signed_operand(Self::primary_op);
        Node::VectorConstruction {
            start: Box::new(start),
            delta: Some(Box::new(second)),
            end: Box::new(end),
        }
    }

    fn primary_op(&mut self) -> Node {
        let base = self.depth;
        let node = self.postfix_chain();
        self.depth = base;
        node
    }

    /// `^`, `[index]` and `.member` applied left to right
    fn postfix_chain(&mut self) -> Node {
        let mut node = self.primary();
        loop {
            let postfix = matches!(
                self.current.kind,
                TokenKind::Power | TokenKind::LeftBracket | TokenKind::Dot
            );
            if postfix && !self.descend() {
                return Node::Invalid;
            }
            match self.current.kind {
                TokenKind::Power => {
                    self.advance();
                    let exponent = self.signed_operand(Self::primary);
                    node = Node::binary(BinaryOp::Pow, node, exponent);
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let index = self.logical_expr();
                    if !self.expect(TokenKind::RightBracket, "']'") {
                        return Node::Invalid;
                    }
                    node = Node::VectorAccess { target: Box::new(node), index: Box::new(index) };
                }
                TokenKind::Dot => {
                    self.advance();
                    let TokenKind::Name(member) = &self.current.kind else {
                        self.expected("member name");
                        return Node::Invalid;
                    };
                    let member = member.clone();
                    self.advance();
                    node = Node::StructAccess { target: Box::new(node), member };
                }
                _ => return node,
            }
        }
    }

    /// Operand that may carry a leading sign: `2^-1`, `1:-1:-3`
    fn signed_operand(&mut self, operand: fn(&mut Self) -> Node) -> Node {
        match self.current.kind {
            TokenKind::Minus => {
                self.advance();
                Node::unary(UnaryOp::Neg, operand(self))
            }
            TokenKind::Plus => {
                self.advance();
                operand(self)
            }
            _ => operand(self),
        }
    }

    // ==================== Primaries ====================

    fn primary(&mut self) -> Node {
        match &self.current.kind {
            TokenKind::Number(n) => {
                let n = *n;
                self.advance();
                Node::constant(n)
            }
            TokenKind::String(s) => {
                let s = s.clone();
                self.advance();
                Node::constant(s)
            }
            TokenKind::True => {
                self.advance();
                Node::constant(true)
            }
            TokenKind::False => {
                self.advance();
                Node::constant(false)
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.logical_expr();
                if self.expect(TokenKind::RightParen, "')'") {
                    expr
                } else {
                    Node::Invalid
                }
            }
            TokenKind::LeftBracket => self.vector_literal(),
            TokenKind::LeftBrace => self.list_literal(),
            TokenKind::Name(name) => {
                let name = name.clone();
                let span = self.current.span;
                self.advance();
                self.name_form(name, span)
            }
            _ => {
                self.unexpected();
                Node::Invalid
            }
        }
    }

    /// `[a, b, c]` or `[a, b; c, d]`
    fn vector_literal(&mut self) -> Node {
        let open = self.current.span;
        self.advance();

        if self.current.kind == TokenKind::RightBracket {
            self.advance();
            return Node::VectorMatrix { rows: Vec::new(), matrix: false };
        }

        let mut rows: Vec<Vec<Node>> = vec![Vec::new()];
        let mut matrix = false;
        loop {
            let item = self.logical_expr();
            if let Some(row) = rows.last_mut() {
                row.push(item);
            }
            match self.current.kind {
                TokenKind::Comma => self.advance(),
                TokenKind::Semicolon => {
                    self.advance();
                    matrix = true;
                    rows.push(Vec::new());
                }
                TokenKind::RightBracket => {
                    self.advance();
                    break;
                }
                _ => {
                    self.expected("',', ';' or ']'");
                    return Node::Invalid;
                }
            }
        }

        if matrix {
            let expected = rows[0].len();
            let ragged = rows.iter().map(Vec::len).enumerate().find(|(_, len)| *len != expected);
            if let Some((row, found)) = ragged {
                self.report(ErrorKind::MatrixRowLength { row, expected, found }, open);
                return Node::Invalid;
            }
        }

        Node::VectorMatrix { rows, matrix }
    }

    /// `{a, b, c}`
    fn list_literal(&mut self) -> Node {
        self.advance();
        let mut items = Vec::new();
        if self.current.kind == TokenKind::RightBrace {
            self.advance();
            return Node::ListConstruction(items);
        }
        loop {
            items.push(self.logical_expr());
            match self.current.kind {
                TokenKind::Comma => self.advance(),
                TokenKind::RightBrace => {
                    self.advance();
                    return Node::ListConstruction(items);
                }
                _ => {
                    self.expected("',' or '}'");
                    return Node::Invalid;
                }
            }
        }
    }

    /// Everything that starts with a name
    fn name_form(&mut self, name: String, span: Span) -> Node {
        match self.current.kind {
            TokenKind::Assign => {
                self.advance();
                let value = self.logical_expr();
                Node::Assign { name, value: Box::new(value) }
            }
            TokenKind::LeftBracket => {
                self.advance();
                let index = self.logical_expr();
                if !self.expect(TokenKind::RightBracket, "']'") {
                    return Node::Invalid;
                }
                if self.current.kind == TokenKind::Assign {
                    self.advance();
                    let value = self.logical_expr();
                    Node::VectorElementAssign {
                        name,
                        index: Box::new(index),
                        value: Box::new(value),
                    }
                } else {
                    Node::VariableVectorAccess { name, index: Box::new(index) }
                }
            }
            TokenKind::LeftParen => self.call_form(name, span),
            _ => Node::Variable(name),
        }
    }

    /// `name(args)`, `name(params) = body` and the special forms
    fn call_form(&mut self, name: String, span: Span) -> Node {
        self.advance();
        let mut args = Vec::new();
        if self.current.kind == TokenKind::RightParen {
            self.advance();
        } else {
            loop {
                args.push(self.logical_expr());
                match self.current.kind {
                    TokenKind::Comma => self.advance(),
                    TokenKind::RightParen => {
                        self.advance();
                        break;
                    }
                    _ => {
                        self.expected("',' or ')'");
                        return Node::Invalid;
                    }
                }
            }
        }

        if self.current.kind == TokenKind::Assign {
            self.advance();
            let body = self.logical_expr();
            let mut params = Vec::with_capacity(args.len());
            for arg in args {
                match arg {
                    Node::Variable(param) => params.push(param),
                    _ => {
                        self.report(ErrorKind::InvalidParameter(name), span);
                        return Node::Invalid;
                    }
                }
            }
            return Node::FunctionAssign { name, params, body: Rc::new(body) };
        }

        match name.as_str() {
            "if" => self.if_form(name, args, span),
            "cases" => self.cases_form(name, args, span),
            _ => match LoopKind::from_name(&name) {
                Some(kind) => self.loop_form(kind, name, args, span),
                None => Node::FunctionCall { name, args },
            },
        }
    }

    fn if_form(&mut self, name: String, args: Vec<Node>, span: Span) -> Node {
        let found = args.len();
        match <[Node; 3]>::try_from(args) {
            Ok([cond, then, otherwise]) => Node::Cases {
                branches: vec![(cond, then)],
                otherwise: Some(Box::new(otherwise)),
            },
            Err(_) => {
                self.report(ErrorKind::SpecialFormArity { name, found }, span);
                Node::Invalid
            }
        }
    }

    fn cases_form(&mut self, name: String, mut args: Vec<Node>, span: Span) -> Node {
        if args.len() < 2 {
            self.report(ErrorKind::SpecialFormArity { name, found: args.len() }, span);
            return Node::Invalid;
        }
        let otherwise = if args.len() % 2 == 1 { args.pop().map(Box::new) } else { None };
        let mut branches = Vec::with_capacity(args.len() / 2);
        let mut args = args.into_iter();
        while let (Some(cond), Some(value)) = (args.next(), args.next()) {
            branches.push((cond, value));
        }
        Node::Cases { branches, otherwise }
    }

    /// `kind(var, items, body)`, `kind(var, start, end, body)` or
    /// `kind(var, start, delta, end, body)`, plus a trailing default for
    /// `defaultfor`.
    fn loop_form(&mut self, kind: LoopKind, name: String, mut args: Vec<Node>, span: Span) -> Node {
        let found = args.len();
        // sum(v) and friends are plain reductions over a vector
        if kind.is_reduction() && found < 3 {
            return Node::FunctionCall { name, args };
        }
        let extra = usize::from(kind.takes_default());
        if found < 3 + extra || found > 5 + extra {
            self.report(ErrorKind::SpecialFormArity { name, found }, span);
            return Node::Invalid;
        }

        let default = if kind.takes_default() { args.pop().map(Box::new) } else { None };
        let Some(body) = args.pop() else {
            self.report(ErrorKind::SpecialFormArity { name, found }, span);
            return Node::Invalid;
        };

        let mut args = args.into_iter();
        let var = match args.next() {
            Some(Node::Variable(var)) => var,
            _ => {
                self.report(ErrorKind::LoopVariableNotName(name), span);
                return Node::Invalid;
            }
        };

        let source = match (args.next(), args.next(), args.next()) {
            (Some(items), None, None) => LoopSource::Items(Box::new(items)),
            (Some(start), Some(end), None) => LoopSource::Range {
                start: Box::new(start),
                delta: None,
                end: Box::new(end),
            },
            (Some(start), Some(delta), Some(end)) => LoopSource::Range {
                start: Box::new(start),
                delta: Some(Box::new(delta)),
                end: Box::new(end),
            },
            _ => {
                self.report(ErrorKind::SpecialFormArity { name, found }, span);
                return Node::Invalid;
            }
        };

        Node::VectorOperation { kind, var, source, body: Box::new(body), default }
    }

    // ==================== Helpers ====================

    /// Moves to the next token. Lexical errors are reported and skipped.
    fn advance(&mut self) {
        loop {
            match self.lexer.next_token() {
                Ok(token) => {
                    self.current = token;
                    return;
                }
                Err(error) => self.push_error(error),
            }
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> bool {
        if self.current.kind == kind {
            self.advance();
            true
        } else {
            self.expected(what);
            false
        }
    }

    fn expected(&mut self, what: &str) {
        let kind = ErrorKind::ExpectedToken {
            expected: what.to_string(),
            found: self.current.kind.to_string(),
        };
        self.report(kind, self.current.span);
    }

    fn unexpected(&mut self) {
        let kind = match &self.current.kind {
            TokenKind::End => ErrorKind::UnexpectedEnd,
            other => ErrorKind::UnexpectedToken(other.to_string()),
        };
        self.report(kind, self.current.span);
    }

    /// Enters one level of tree depth; past the limit reports and returns false.
    fn descend(&mut self) -> bool {
        if self.depth >= self.max_depth {
            self.report(ErrorKind::NestingTooDeep(self.max_depth), self.current.span);
            return false;
        }
        self.depth += 1;
        true
    }

    fn report(&mut self, kind: ErrorKind, span: Span) {
        self.push_error(MathError::new(kind, Some(span)));
    }

    fn push_error(&mut self, error: MathError) {
        if self.panicking {
            return;
        }
        self.panicking = true;
        self.errors.push(error);
    }

    /// Skips to the next statement separator
    fn synchronize(&mut self) {
        while !matches!(self.current.kind, TokenKind::Semicolon | TokenKind::End) {
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn parse_ok(source: &str) -> Node {
        let (node, errors) = parse(source);
        assert!(errors.is_empty(), "unexpected errors for {:?}: {:?}", source, errors);
        node
    }

    fn errors(source: &str) -> Vec<ErrorKind> {
        parse(source).1.into_iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(parse_ok("2 + 3 * 4").to_string(), "2 + (3 * 4)");
        assert_eq!(
            parse_ok("1 < 2 and 3 > 2 or false").to_string(),
            "((1 < 2) and (3 > 2)) or false"
        );
        assert_eq!(parse_ok("a - b - c").to_string(), "(a - b) - c");
    }

    #[test]
    fn test_power_chain() {
        assert_eq!(parse_ok("2^3^2").to_string(), "(2 ^ 3) ^ 2");
        assert_eq!(parse_ok("-2^2").to_string(), "-(2 ^ 2)");
        assert_eq!(parse_ok("2^-1").to_string(), "2 ^ (-1)");
    }

    #[test]
    fn test_ranges() {
        assert_eq!(parse_ok("1:2:7").to_string(), "1:2:7");
        assert_eq!(parse_ok("1:-1:-3").to_string(), "1:(-1):(-3)");
        assert_eq!(parse_ok("-1:3").to_string(), "(-1):3");
        assert_eq!(parse_ok("-x:3").to_string(), "(-x):3");
        assert_eq!(parse_ok("-(1:3)").to_string(), "-(1:3)");
        assert_eq!(parse_ok("--1:3").to_string(), "-((-1):3)");
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(5000), ")".repeat(5000));
        assert_eq!(errors(&deep), vec![ErrorKind::NestingTooDeep(DEFAULT_MAX_DEPTH)]);

        let chain = format!("1{}", " + 1".repeat(2 * DEFAULT_MAX_DEPTH));
        assert_eq!(errors(&chain), vec![ErrorKind::NestingTooDeep(DEFAULT_MAX_DEPTH)]);

        let prefix = format!("{}1", "-".repeat(5000));
        assert_eq!(errors(&prefix), vec![ErrorKind::NestingTooDeep(DEFAULT_MAX_DEPTH)]);

        let power = format!("2{}", "^1".repeat(5000));
        assert_eq!(errors(&power), vec![ErrorKind::NestingTooDeep(DEFAULT_MAX_DEPTH)]);
    }

    #[test]
    fn test_custom_depth() {
        let mut parser = Parser::with_max_depth("((1)); 2", 3);
        parser.parse();
        assert!(parser.errors().is_empty());

        let mut parser = Parser::with_max_depth("(((1))); 2 + 3", 3);
        match parser.parse() {
            Node::NodeList(nodes) => {
                assert!(nodes[0].is_invalid());
                assert_eq!(nodes[1].to_string(), "2 + 3");
            }
            other => panic!("expected statement list, got {:?}", other),
        }
        assert_eq!(parser.take_errors().len(), 1);
    }

    #[test]
    fn test_unary_forms() {
        assert_eq!(parse_ok("!a").to_string(), "not a");
        assert_eq!(parse_ok("not a").to_string(), "not a");
        assert_eq!(parse_ok("~5").to_string(), "~5");
        assert_eq!(parse_ok("+5").to_string(), "5");
    }

    #[test]
    fn test_assignments() {
        assert!(matches!(parse_ok("x = 1 + 2"), Node::Assign { .. }));
        assert!(matches!(parse_ok("v[2] = 5"), Node::VectorElementAssign { .. }));
        assert!(matches!(parse_ok("v[2]"), Node::VariableVectorAccess { .. }));
        match parse_ok("f(x, y) = x * y") {
            Node::FunctionAssign { name, params, .. } => {
                assert_eq!(name, "f");
                assert_eq!(params, vec!["x".to_string(), "y".to_string()]);
            }
            other => panic!("expected function definition, got {:?}", other),
        }
    }

    #[test]
    fn test_member_and_index_chain() {
        assert_eq!(parse_ok("s.a.b").to_string(), "((s).a).b");
        assert_eq!(parse_ok("v[1][0]").to_string(), "(v[1])[0]");
    }

    #[test]
    fn test_special_forms() {
        assert!(matches!(parse_ok("if(a, 1, 2)"), Node::Cases { otherwise: Some(_), .. }));
        match parse_ok("cases(a, 1, b, 2)") {
            Node::Cases { branches, otherwise } => {
                assert_eq!(branches.len(), 2);
                assert!(otherwise.is_none());
            }
            other => panic!("expected cases, got {:?}", other),
        }
        match parse_ok("sum(i, 1, 10, i)") {
            Node::VectorOperation { kind, var, source, .. } => {
                assert_eq!(kind, LoopKind::Sum);
                assert_eq!(var, "i");
                assert!(matches!(source, LoopSource::Range { delta: None, .. }));
            }
            other => panic!("expected loop, got {:?}", other),
        }
        match parse_ok("defaultfor(x, v, x, 0)") {
            Node::VectorOperation { default, source, .. } => {
                assert!(default.is_some());
                assert!(matches!(source, LoopSource::Items(_)));
            }
            other => panic!("expected loop, got {:?}", other),
        }
    }

    #[test]
    fn test_reduction_call() {
        match parse_ok("sum(v)") {
            Node::FunctionCall { name, args } => {
                assert_eq!(name, "sum");
                assert_eq!(args.len(), 1);
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_literals() {
        match parse_ok("[1, 2; 3, 4]") {
            Node::VectorMatrix { rows, matrix } => {
                assert!(matrix);
                assert_eq!(rows.len(), 2);
            }
            other => panic!("expected matrix, got {:?}", other),
        }
        assert!(matches!(
            parse_ok("[]"),
            Node::VectorMatrix { ref rows, matrix: false } if rows.is_empty()
        ));
        assert!(matches!(
            parse_ok("{1, \"a\"}"),
            Node::ListConstruction(ref items) if items.len() == 2
        ));
        assert!(matches!(parse_ok("\"hi\""), Node::Constant(Value::String(_))));
    }

    #[test]
    fn test_statement_list() {
        match parse_ok("a = 1; ; b = 2;") {
            Node::NodeList(nodes) => assert_eq!(nodes.len(), 2),
            other => panic!("expected statement list, got {:?}", other),
        }
        assert!(matches!(parse_ok(""), Node::NodeList(ref nodes) if nodes.is_empty()));
    }

    #[test]
    fn test_one_error_per_problem() {
        assert_eq!(errors("1 + "), vec![ErrorKind::UnexpectedEnd]);
        assert_eq!(errors("(1+2").len(), 1);
        assert_eq!(
            errors("[1,2;3]"),
            vec![ErrorKind::MatrixRowLength { row: 1, expected: 2, found: 1 }]
        );
        assert_eq!(errors("(1 +"), vec![ErrorKind::UnexpectedEnd]);
        assert_eq!(errors("1 2; 3 +").len(), 2);
    }

    #[test]
    fn test_special_form_errors() {
        assert_eq!(
            errors("if(a, 1)"),
            vec![ErrorKind::SpecialFormArity { name: "if".into(), found: 2 }]
        );
        assert_eq!(errors("for(1, v, 2)"), vec![ErrorKind::LoopVariableNotName("for".into())]);
        assert_eq!(errors("f(1) = 2"), vec![ErrorKind::InvalidParameter("f".into())]);
        assert_eq!(
            errors("for(x, v)"),
            vec![ErrorKind::SpecialFormArity { name: "for".into(), found: 2 }]
        );
    }

    #[test]
    fn test_recovers_after_error() {
        let (node, errs) = parse("1 +; 2 * 3");
        assert_eq!(errs.len(), 1);
        match node {
            Node::NodeList(nodes) => {
                assert!(nodes[0].is_invalid() || matches!(nodes[0], Node::Binary { .. }));
                assert_eq!(nodes[1].to_string(), "2 * 3");
            }
            other => panic!("expected statement list, got {:?}", other),
        }
    }

    #[test]
    fn test_lexical_error_reported_once() {
        assert_eq!(errors("1 + #"), vec![ErrorKind::UnexpectedCharacter('#')]);
    }
}
