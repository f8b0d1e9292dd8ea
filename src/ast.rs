//! Abstract Syntax Tree definitions for mathexpr
//!
//! A parsed formula is a tree of [`Node`]s. Every node owns its children.
//! `Display` prints a node back as formula text that parses to an equivalent
//! tree (fully parenthesized, not byte-identical to the input).

use std::fmt;
use std::rc::Rc;

use crate::value::Value;

/// Arithmetic and bitwise binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,    // +
    Sub,    // -
    Mul,    // *
    Div,    // /
    Mod,    // %
    Pow,    // ^
    BitAnd, // &
    BitOr,  // |
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq, // ==
    Ne, // !=
    Lt, // <
    Le, // <=
    Gt, // >
    Ge, // >=
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Logical operators. Both operands are always evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Xor,
    Nor,
    Nand,
}

impl LogicalOp {
    pub fn symbol(self) -> &'static str {
        match self {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
            LogicalOp::Xor => "xor",
            LogicalOp::Nor => "nor",
            LogicalOp::Nand => "nand",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,    // -
    Not,    // ! or not
    BitNot, // ~
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

/// The loop forms `sum(x, ...)`, `for(x, ...)` and friends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    Sum,
    Prod,
    CumSum,
    CumProd,
    For,
    SaveFor,
    DefaultFor,
    FilterFor,
    SaveFilterFor,
}

impl LoopKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sum" => Some(LoopKind::Sum),
            "prod" => Some(LoopKind::Prod),
            "cumsum" => Some(LoopKind::CumSum),
            "cumprod" => Some(LoopKind::CumProd),
            "for" => Some(LoopKind::For),
            "savefor" => Some(LoopKind::SaveFor),
            "defaultfor" => Some(LoopKind::DefaultFor),
            "filterfor" => Some(LoopKind::FilterFor),
            "savefilterfor" => Some(LoopKind::SaveFilterFor),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LoopKind::Sum => "sum",
            LoopKind::Prod => "prod",
            LoopKind::CumSum => "cumsum",
            LoopKind::CumProd => "cumprod",
            LoopKind::For => "for",
            LoopKind::SaveFor => "savefor",
            LoopKind::DefaultFor => "defaultfor",
            LoopKind::FilterFor => "filterfor",
            LoopKind::SaveFilterFor => "savefilterfor",
        }
    }

    /// Reductions that are also available as one-argument catalog functions.
    pub fn is_reduction(self) -> bool {
        matches!(self, LoopKind::Sum | LoopKind::Prod | LoopKind::CumSum | LoopKind::CumProd)
    }

    pub fn takes_default(self) -> bool {
        self == LoopKind::DefaultFor
    }
}

/// Where a loop form takes its items from
#[derive(Debug, Clone)]
pub enum LoopSource {
    /// `for(x, items, body)`
    Items(Box<Node>),
    /// `for(x, start, end, body)` or `for(x, start, delta, end, body)`
    Range {
        start: Box<Node>,
        delta: Option<Box<Node>>,
        end: Box<Node>,
    },
}

/// Expression nodes
#[derive(Debug, Clone)]
pub enum Node {
    /// Literal: 42, true, "text"
    Constant(Value),

    /// Variable read: x
    Variable(String),

    /// -x, !x, ~x
    Unary { op: UnaryOp, operand: Box<Node> },

    /// a + b, a & b, a ^ b
    Binary { op: BinaryOp, left: Box<Node>, right: Box<Node> },

    /// a == b, a < b
    Compare { op: CompareOp, left: Box<Node>, right: Box<Node> },

    /// a and b, a xor b
    Logical { op: LogicalOp, left: Box<Node>, right: Box<Node> },

    /// x = value
    Assign { name: String, value: Box<Node> },

    /// x[index] = value
    VectorElementAssign { name: String, index: Box<Node>, value: Box<Node> },

    /// x[index]
    VariableVectorAccess { name: String, index: Box<Node> },

    /// (expr)[index]
    VectorAccess { target: Box<Node>, index: Box<Node> },

    /// expr.name
    StructAccess { target: Box<Node>, member: String },

    /// f(a, b); arguments stay unevaluated until the call is dispatched
    FunctionCall { name: String, args: Vec<Node> },

    /// f(a, b) = body
    FunctionAssign { name: String, params: Vec<String>, body: Rc<Node> },

    /// if(c, t, f) and cases(c1, v1, c2, v2, ..., else)
    Cases { branches: Vec<(Node, Node)>, otherwise: Option<Box<Node>> },

    /// start:end and start:delta:end
    VectorConstruction { start: Box<Node>, delta: Option<Box<Node>>, end: Box<Node> },

    /// sum(x, ...), for(x, ...), ...
    VectorOperation {
        kind: LoopKind,
        var: String,
        source: LoopSource,
        body: Box<Node>,
        default: Option<Box<Node>>,
    },

    /// [a, b, c] (one row) or [a, b; c, d] (matrix)
    VectorMatrix { rows: Vec<Vec<Node>>, matrix: bool },

    /// {a, b, c}
    ListConstruction(Vec<Node>),

    /// a; b; c
    NodeList(Vec<Node>),

    /// Placeholder left behind by a syntax error
    Invalid,
}

impl Node {
    pub fn constant(value: impl Into<Value>) -> Self {
        Node::Constant(value.into())
    }

    pub fn binary(op: BinaryOp, left: Node, right: Node) -> Self {
        Node::Binary { op, left: Box::new(left), right: Box::new(right) }
    }

    pub fn unary(op: UnaryOp, operand: Node) -> Self {
        Node::Unary { op, operand: Box::new(operand) }
    }

    /// Human readable node kind, used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Constant(_) => "constant",
            Node::Variable(_) => "variable",
            Node::Unary { .. } => "unary operator",
            Node::Binary { .. } => "binary operator",
            Node::Compare { .. } => "comparison",
            Node::Logical { .. } => "logical operator",
            Node::Assign { .. } => "assignment",
            Node::VectorElementAssign { .. } => "vector element assignment",
            Node::VariableVectorAccess { .. } => "vector element access",
            Node::VectorAccess { .. } => "vector access",
            Node::StructAccess { .. } => "struct access",
            Node::FunctionCall { .. } => "function call",
            Node::FunctionAssign { .. } => "function definition",
            Node::Cases { .. } => "cases",
            Node::VectorConstruction { .. } => "range construction",
            Node::VectorOperation { .. } => "loop",
            Node::VectorMatrix { .. } => "vector literal",
            Node::ListConstruction(_) => "list literal",
            Node::NodeList(_) => "statement list",
            Node::Invalid => "invalid node",
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Node::Invalid)
    }

    /// True for nodes that print without surrounding parentheses.
    fn is_atomic(&self) -> bool {
        match self {
            Node::Constant(Value::Double(d)) => d.is_finite() && *d >= 0.0 && !is_negative_zero(*d),
            Node::Constant(_)
            | Node::Variable(_)
            | Node::VariableVectorAccess { .. }
            | Node::FunctionCall { .. }
            | Node::VectorMatrix { .. }
            | Node::ListConstruction(_)
            | Node::VectorOperation { .. } => true,
            _ => false,
        }
    }
}

fn is_negative_zero(d: f64) -> bool {
    d == 0.0 && d.is_sign_negative()
}

/// Prints `node`, parenthesized unless it is atomic.
struct Operand<'a>(&'a Node);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_atomic() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "({})", self.0)
        }
    }
}

fn write_separated(f: &mut fmt::Formatter<'_>, nodes: &[Node], sep: &str) -> fmt::Result {
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", node)?;
    }
    Ok(())
}

fn write_constant(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Double(d) if d.is_nan() => write!(f, "nan"),
        Value::Double(d) if d.is_infinite() => {
            write!(f, "{}", if *d > 0.0 { "inf" } else { "ninf" })
        }
        Value::Double(d) if is_negative_zero(*d) => write!(f, "-0"),
        Value::Double(d) => write!(f, "{}", d),
        Value::Bool(b) => write!(f, "{}", b),
        Value::String(s) => {
            write!(f, "\"")?;
            for c in s.chars() {
                match c {
                    '"' => write!(f, "\\\"")?,
                    '\\' => write!(f, "\\\\")?,
                    '\n' => write!(f, "\\n")?,
                    '\t' => write!(f, "\\t")?,
                    '\r' => write!(f, "\\r")?,
                    c => write!(f, "{}", c)?,
                }
            }
            write!(f, "\"")
        }
        // Only the parser's literals reach the printer
        other => write!(f, "{}", other),
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Constant(value) => write_constant(f, value),
            Node::Variable(name) => write!(f, "{}", name),
            Node::Unary { op, operand } => {
                let sym = if *op == UnaryOp::Not { "not " } else { op.symbol() };
                write!(f, "{}{}", sym, Operand(operand))
            }
            Node::Binary { op, left, right } => {
                write!(f, "{} {} {}", Operand(left), op.symbol(), Operand(right))
            }
            Node::Compare { op, left, right } => {
                write!(f, "{} {} {}", Operand(left), op.symbol(), Operand(right))
            }
            Node::Logical { op, left, right } => {
                write!(f, "{} {} {}", Operand(left), op.symbol(), Operand(right))
            }
            Node::Assign { name, value } => write!(f, "{} = {}", name, value),
            Node::VectorElementAssign { name, index, value } => {
                write!(f, "{}[{}] = {}", name, index, value)
            }
            Node::VariableVectorAccess { name, index } => write!(f, "{}[{}]", name, index),
            Node::VectorAccess { target, index } => write!(f, "({})[{}]", target, index),
            Node::StructAccess { target, member } => write!(f, "({}).{}", target, member),
            Node::FunctionCall { name, args } => {
                write!(f, "{}(", name)?;
                write_separated(f, args, ", ")?;
                write!(f, ")")
            }
            Node::FunctionAssign { name, params, body } => {
                write!(f, "{}({}) = {}", name, params.join(", "), body)
            }
            Node::Cases { branches, otherwise } => {
                if branches.len() == 1 && otherwise.is_some() {
                    write!(f, "if(")?;
                } else {
                    write!(f, "cases(")?;
                }
                for (i, (cond, value)) in branches.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}, {}", cond, value)?;
                }
                if let Some(otherwise) = otherwise {
                    write!(f, ", {}", otherwise)?;
                }
                write!(f, ")")
            }
            Node::VectorConstruction { start, delta, end } => match delta {
                Some(delta) => write!(f, "{}:{}:{}", Operand(start), Operand(delta), Operand(end)),
                None => write!(f, "{}:{}", Operand(start), Operand(end)),
            },
            Node::VectorOperation { kind, var, source, body, default } => {
                write!(f, "{}({}, ", kind.name(), var)?;
                match source {
                    LoopSource::Items(items) => write!(f, "{}", items)?,
                    LoopSource::Range { start, delta: Some(delta), end } => {
                        write!(f, "{}, {}, {}", start, delta, end)?
                    }
                    LoopSource::Range { start, delta: None, end } => {
                        write!(f, "{}, {}", start, end)?
                    }
                }
                write!(f, ", {}", body)?;
                if let Some(default) = default {
                    write!(f, ", {}", default)?;
                }
                write!(f, ")")
            }
            Node::VectorMatrix { rows, .. } => {
                write!(f, "[")?;
                for (i, row) in rows.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write_separated(f, row, ", ")?;
                }
                write!(f, "]")
            }
            Node::ListConstruction(items) => {
                write!(f, "{{")?;
                write_separated(f, items, ", ")?;
                write!(f, "}}")
            }
            Node::NodeList(nodes) => write_separated(f, nodes, "; "),
            Node::Invalid => write!(f, "<invalid>"),
        }
    }
}
