//! Runtime values for mathexpr
//!
//! [`Value`] is the dynamically typed result of evaluating a node. The
//! combinators in this module implement every operator of the language.
//! They never panic: an `Invalid` operand yields `Invalid`, and an operation
//! that is undefined for its operands returns an [`ErrorKind`] which the
//! interpreter records before continuing with `Invalid`.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use crate::ast::{BinaryOp, CompareOp, LogicalOp, UnaryOp};
use crate::error::ErrorKind;

/// Longest vector an element write or a range may produce
pub const MAX_VECTOR_LEN: usize = 1 << 24;

/// Outcome of a value operation
pub type OpResult = std::result::Result<Value, ErrorKind>;

/// Runtime values in mathexpr
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value, e.g. the result of a function definition
    #[default]
    Void,
    /// Result of a failed operation; absorbs every further operation
    Invalid,
    Bool(bool),
    Double(f64),
    String(String),
    BoolVector(Vec<bool>),
    DoubleVector(Vec<f64>),
    StringVector(Vec<String>),
    /// Row-major data; `data.len()` is a multiple of `columns`
    BoolMatrix { data: Vec<bool>, columns: usize },
    /// Row-major data; `data.len()` is a multiple of `columns`
    DoubleMatrix { data: Vec<f64>, columns: usize },
    List(Vec<Value>),
    Struct(BTreeMap<String, Value>),
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<f64>> for Value {
    fn from(value: Vec<f64>) -> Self {
        Value::DoubleVector(value)
    }
}

impl From<Vec<bool>> for Value {
    fn from(value: Vec<bool>) -> Self {
        Value::BoolVector(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::StringVector(value)
    }
}

impl Value {
    /// Builds a number matrix, or `None` if `columns` does not divide the data.
    pub fn double_matrix(data: Vec<f64>, columns: usize) -> Option<Value> {
        shape_ok(data.len(), columns).then_some(Value::DoubleMatrix { data, columns })
    }

    /// Builds a bool matrix, or `None` if `columns` does not divide the data.
    pub fn bool_matrix(data: Vec<bool>, columns: usize) -> Option<Value> {
        shape_ok(data.len(), columns).then_some(Value::BoolMatrix { data, columns })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Invalid => "invalid",
            Value::Bool(_) => "bool",
            Value::Double(_) => "number",
            Value::String(_) => "string",
            Value::BoolVector(_) => "bool vector",
            Value::DoubleVector(_) => "number vector",
            Value::StringVector(_) => "string vector",
            Value::BoolMatrix { .. } => "bool matrix",
            Value::DoubleMatrix { .. } => "number matrix",
            Value::List(_) => "list",
            Value::Struct(_) => "struct",
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Value::Invalid)
    }

    pub fn is_valid(&self) -> bool {
        !self.is_invalid()
    }

    /// Number of elements. Scalars count as one, void and invalid as zero.
    pub fn len(&self) -> usize {
        match self {
            Value::Void | Value::Invalid => 0,
            Value::Bool(_) | Value::Double(_) => 1,
            Value::String(s) => s.chars().count(),
            Value::BoolVector(v) => v.len(),
            Value::DoubleVector(v) => v.len(),
            Value::StringVector(v) => v.len(),
            Value::BoolMatrix { data, .. } => data.len(),
            Value::DoubleMatrix { data, .. } => data.len(),
            Value::List(items) => items.len(),
            Value::Struct(members) => members.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(rows, columns)` for matrices
    pub fn shape(&self) -> Option<(usize, usize)> {
        match self {
            Value::BoolMatrix { data, columns } => Some((rows(data.len(), *columns), *columns)),
            Value::DoubleMatrix { data, columns } => Some((rows(data.len(), *columns), *columns)),
            _ => None,
        }
    }

    /// Numeric view of a scalar; bools count as 0 and 1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Truth value of a scalar; numbers are true when non-zero.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Double(d) => Some(*d != 0.0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The elements a loop iterates over. Scalars are a single item.
    pub fn items(&self) -> Option<Vec<Value>> {
        match self {
            Value::Bool(_) | Value::Double(_) | Value::String(_) => Some(vec![self.clone()]),
            Value::BoolVector(v) | Value::BoolMatrix { data: v, .. } => {
                Some(v.iter().copied().map(Value::Bool).collect())
            }
            Value::DoubleVector(v) | Value::DoubleMatrix { data: v, .. } => {
                Some(v.iter().copied().map(Value::Double).collect())
            }
            Value::StringVector(v) => Some(v.iter().cloned().map(Value::String).collect()),
            Value::List(items) => Some(items.clone()),
            Value::Void | Value::Invalid | Value::Struct(_) => None,
        }
    }

    // ==================== Operators ====================

    pub fn binary(&self, op: BinaryOp, rhs: &Value) -> OpResult {
        if self.is_invalid() || rhs.is_invalid() {
            return Ok(Value::Invalid);
        }
        let sym = op.symbol();
        match op {
            BinaryOp::Add => {
                if let Some(result) = concat_strings(self, rhs)? {
                    return Ok(result);
                }
                arithmetic(sym, self, rhs, |a, b| a + b)
            }
            BinaryOp::Sub => arithmetic(sym, self, rhs, |a, b| a - b),
            BinaryOp::Mul => arithmetic(sym, self, rhs, |a, b| a * b),
            BinaryOp::Div => arithmetic(sym, self, rhs, |a, b| a / b),
            BinaryOp::Pow => arithmetic(sym, self, rhs, f64::powf),
            BinaryOp::Mod => arithmetic(sym, self, rhs, int_mod),
            BinaryOp::BitAnd => arithmetic(sym, self, rhs, bit_and),
            BinaryOp::BitOr => arithmetic(sym, self, rhs, bit_or),
        }
    }

    pub fn compare(&self, op: CompareOp, rhs: &Value) -> OpResult {
        if self.is_invalid() || rhs.is_invalid() {
            return Ok(Value::Invalid);
        }
        let sym = op.symbol();
        if let (Some(a), Some(b)) = (numbers(self), numbers(rhs)) {
            let cmp = compare_fn::<f64>(op);
            return zip_with(sym, a, b, cmp).map(Shaped::into_bool_value);
        }
        if let (Some(a), Some(b)) = (strings(self), strings(rhs)) {
            let cmp = compare_fn::<&str>(op);
            return zip_with(sym, a, b, |x, y| cmp(x, y)).map(Shaped::into_bool_value);
        }
        match op {
            CompareOp::Eq | CompareOp::Ne => {
                if let (Some(a), Some(b)) = (bools_strict(self), bools_strict(rhs)) {
                    let cmp = compare_fn::<bool>(op);
                    return zip_with(sym, a, b, cmp).map(Shaped::into_bool_value);
                }
                if self.type_name() == rhs.type_name() {
                    let equal = self == rhs;
                    return Ok(Value::Bool(if op == CompareOp::Eq { equal } else { !equal }));
                }
                Err(type_error(sym, self, rhs))
            }
            _ => Err(type_error(sym, self, rhs)),
        }
    }

    pub fn logical(&self, op: LogicalOp, rhs: &Value) -> OpResult {
        if self.is_invalid() || rhs.is_invalid() {
            return Ok(Value::Invalid);
        }
        let (Some(a), Some(b)) = (bools(self), bools(rhs)) else {
            return Err(type_error(op.symbol(), self, rhs));
        };
        let f: fn(bool, bool) -> bool = match op {
            LogicalOp::And => |a, b| a && b,
            LogicalOp::Or => |a, b| a || b,
            LogicalOp::Xor => |a, b| a != b,
            LogicalOp::Nor => |a, b| !(a || b),
            LogicalOp::Nand => |a, b| !(a && b),
        };
        zip_with(op.symbol(), a, b, f).map(Shaped::into_bool_value)
    }

    pub fn unary(&self, op: UnaryOp) -> OpResult {
        if self.is_invalid() {
            return Ok(Value::Invalid);
        }
        let error = || ErrorKind::UnaryOperatorType { op: op.symbol(), operand: self.type_name() };
        match op {
            UnaryOp::Neg => {
                numbers(self).map(|n| n.map(|x| -x).into_double_value()).ok_or_else(error)
            }
            UnaryOp::BitNot => {
                numbers(self).map(|n| n.map(bit_not).into_double_value()).ok_or_else(error)
            }
            UnaryOp::Not => bools(self).map(|b| b.map(|x| !x).into_bool_value()).ok_or_else(error),
        }
    }

    /// Applies `f` to every number; `None` for non-numeric values.
    pub fn map_numbers(&self, f: impl Fn(f64) -> f64) -> Option<Value> {
        numbers(self).map(|n| n.map(f).into_double_value())
    }

    /// Two-operand numeric function with the same broadcasting as `+`.
    pub fn zip_numbers(
        &self,
        name: &'static str,
        rhs: &Value,
        f: impl Fn(f64, f64) -> f64,
    ) -> OpResult {
        if self.is_invalid() || rhs.is_invalid() {
            return Ok(Value::Invalid);
        }
        arithmetic(name, self, rhs, f)
    }

    // ==================== Element access ====================

    /// `self[index]`. Numbers select one element, number vectors gather,
    /// bool vectors of matching length act as a mask. Indices are 0-based.
    pub fn index(&self, index: &Value) -> OpResult {
        if self.is_invalid() || index.is_invalid() {
            return Ok(Value::Invalid);
        }
        let invalid_index =
            || ErrorKind::InvalidIndex { target: self.type_name(), index: index.type_name() };
        let len = self.indexable_len().ok_or_else(invalid_index)?;
        match index {
            Value::Double(i) => {
                let k = to_index(*i, len)?;
                self.element(k).ok_or_else(invalid_index)
            }
            Value::DoubleVector(_) | Value::BoolVector(_) => {
                let positions = index_positions(index, len)?;
                for &k in &positions {
                    if k >= len {
                        return Err(ErrorKind::IndexOutOfRange { index: k as f64, len });
                    }
                }
                self.select(&positions).ok_or_else(invalid_index)
            }
            _ => Err(invalid_index()),
        }
    }

    /// `self[index] = value`. Writing past the end grows a vector; matrices
    /// keep their shape.
    pub fn set_elements(
        &mut self,
        index: &Value,
        value: &Value,
    ) -> std::result::Result<(), ErrorKind> {
        let invalid_index =
            ErrorKind::InvalidIndex { target: self.type_name(), index: index.type_name() };
        let len = self.indexable_len().ok_or(invalid_index.clone())?;
        let positions = match index {
            Value::Double(_) | Value::DoubleVector(_) | Value::BoolVector(_) => {
                index_positions(index, len)?
            }
            _ => return Err(invalid_index),
        };

        match self {
            Value::Double(d) => *self = Value::DoubleVector(vec![*d]),
            Value::Bool(b) => *self = Value::BoolVector(vec![*b]),
            _ => {}
        }

        let element_error = || ErrorKind::VectorElement(value.type_name());
        match self {
            Value::DoubleVector(data) => {
                let values = match value {
                    Value::Double(d) => vec![*d],
                    Value::DoubleVector(v) => v.clone(),
                    _ => return Err(element_error()),
                };
                assign_into(data, &positions, &values, f64::NAN, true)
            }
            Value::BoolVector(data) => {
                let values = match value {
                    Value::Bool(b) => vec![*b],
                    Value::BoolVector(v) => v.clone(),
                    _ => return Err(element_error()),
                };
                assign_into(data, &positions, &values, false, true)
            }
            Value::StringVector(data) => {
                let values = match value {
                    Value::String(s) => vec![s.clone()],
                    Value::StringVector(v) => v.clone(),
                    _ => return Err(element_error()),
                };
                assign_into(data, &positions, &values, String::new(), true)
            }
            Value::List(items) => {
                let values = if positions.len() > 1 {
                    value.items().ok_or_else(element_error)?
                } else {
                    vec![value.clone()]
                };
                assign_into(items, &positions, &values, Value::Void, true)
            }
            Value::DoubleMatrix { data, .. } => {
                let values = match value {
                    Value::Double(d) => vec![*d],
                    Value::DoubleVector(v) => v.clone(),
                    _ => return Err(element_error()),
                };
                assign_into(data, &positions, &values, f64::NAN, false)
            }
            Value::BoolMatrix { data, .. } => {
                let values = match value {
                    Value::Bool(b) => vec![*b],
                    Value::BoolVector(v) => v.clone(),
                    _ => return Err(element_error()),
                };
                assign_into(data, &positions, &values, false, false)
            }
            _ => Err(invalid_index),
        }
    }

    /// `self.name` on a struct
    pub fn member(&self, name: &str) -> OpResult {
        match self {
            Value::Invalid => Ok(Value::Invalid),
            Value::Struct(members) => members
                .get(name)
                .cloned()
                .ok_or_else(|| ErrorKind::NoSuchMember(name.to_string())),
            other => Err(ErrorKind::NotAStruct(other.type_name())),
        }
    }

    fn indexable_len(&self) -> Option<usize> {
        match self {
            Value::Void | Value::Invalid | Value::Struct(_) => None,
            other => Some(other.len()),
        }
    }

    fn element(&self, k: usize) -> Option<Value> {
        match self {
            Value::Bool(_) | Value::Double(_) if k == 0 => Some(self.clone()),
            Value::String(s) => s.chars().nth(k).map(|c| Value::String(c.to_string())),
            Value::BoolVector(v) | Value::BoolMatrix { data: v, .. } => {
                v.get(k).copied().map(Value::Bool)
            }
            Value::DoubleVector(v) | Value::DoubleMatrix { data: v, .. } => {
                v.get(k).copied().map(Value::Double)
            }
            Value::StringVector(v) => v.get(k).cloned().map(Value::String),
            Value::List(items) => items.get(k).cloned(),
            _ => None,
        }
    }

    fn select(&self, positions: &[usize]) -> Option<Value> {
        Some(match self {
            Value::Bool(b) => Value::BoolVector(vec![*b; positions.len()]),
            Value::Double(d) => Value::DoubleVector(vec![*d; positions.len()]),
            Value::String(s) => {
                let chars: Vec<char> = s.chars().collect();
                Value::String(positions.iter().map(|&k| chars[k]).collect())
            }
            Value::BoolVector(v) | Value::BoolMatrix { data: v, .. } => {
                Value::BoolVector(positions.iter().map(|&k| v[k]).collect())
            }
            Value::DoubleVector(v) | Value::DoubleMatrix { data: v, .. } => {
                Value::DoubleVector(positions.iter().map(|&k| v[k]).collect())
            }
            Value::StringVector(v) => {
                Value::StringVector(positions.iter().map(|&k| v[k].clone()).collect())
            }
            Value::List(items) => {
                Value::List(positions.iter().map(|&k| items[k].clone()).collect())
            }
            _ => return None,
        })
    }

    // ==================== Construction ====================

    /// Concatenates the items of a `[...]` literal, flattening nested vectors.
    /// Bools are promoted to numbers when mixed with numbers.
    pub fn concat_vector(items: Vec<Value>) -> OpResult {
        if items.iter().any(Value::is_invalid) {
            return Ok(Value::Invalid);
        }
        let all_strings = !items.is_empty()
            && items.iter().all(|v| matches!(v, Value::String(_) | Value::StringVector(_)));
        if all_strings {
            let mut out = Vec::new();
            for item in items {
                match item {
                    Value::String(s) => out.push(s),
                    Value::StringVector(v) => out.extend(v),
                    _ => unreachable!("checked above"),
                }
            }
            return Ok(Value::StringVector(out));
        }

        let all_bools = !items.is_empty()
            && items.iter().all(|v| {
                matches!(v, Value::Bool(_) | Value::BoolVector(_) | Value::BoolMatrix { .. })
            });
        if all_bools {
            let mut out = Vec::new();
            for item in items {
                match item {
                    Value::Bool(b) => out.push(b),
                    Value::BoolVector(v) | Value::BoolMatrix { data: v, .. } => out.extend(v),
                    _ => unreachable!("checked above"),
                }
            }
            return Ok(Value::BoolVector(out));
        }

        let mut out = Vec::new();
        for item in &items {
            match item {
                Value::Double(d) => out.push(*d),
                Value::Bool(b) => out.push(if *b { 1.0 } else { 0.0 }),
                Value::DoubleVector(v) | Value::DoubleMatrix { data: v, .. } => {
                    out.extend_from_slice(v)
                }
                Value::BoolVector(v) | Value::BoolMatrix { data: v, .. } => {
                    out.extend(v.iter().map(|b| if *b { 1.0 } else { 0.0 }))
                }
                other => return Err(ErrorKind::VectorElement(other.type_name())),
            }
        }
        Ok(Value::DoubleVector(out))
    }

    /// Builds a matrix from the rows of a `[a, b; c, d]` literal.
    pub fn matrix_from_rows(rows: Vec<Vec<Value>>) -> OpResult {
        let mut flat_rows = Vec::with_capacity(rows.len());
        for row in rows {
            let row = Value::concat_vector(row)?;
            if row.is_invalid() {
                return Ok(Value::Invalid);
            }
            flat_rows.push(row);
        }
        let columns = flat_rows.first().map_or(0, Value::len);
        for row in &flat_rows {
            if row.len() != columns {
                return Err(ErrorKind::LengthMismatch { op: "[;]", lhs: columns, rhs: row.len() });
            }
        }

        if flat_rows.iter().all(|r| matches!(r, Value::BoolVector(_))) {
            let mut data = Vec::with_capacity(columns * flat_rows.len());
            for row in flat_rows {
                if let Value::BoolVector(v) = row {
                    data.extend(v);
                }
            }
            return Ok(Value::BoolMatrix { data, columns });
        }

        let mut data = Vec::with_capacity(columns * flat_rows.len());
        for row in &flat_rows {
            match row {
                Value::DoubleVector(v) => data.extend_from_slice(v),
                Value::BoolVector(v) => data.extend(v.iter().map(|b| if *b { 1.0 } else { 0.0 })),
                other => return Err(ErrorKind::VectorElement(other.type_name())),
            }
        }
        Ok(Value::DoubleMatrix { data, columns })
    }

    /// Packs loop results: uniform scalars become a typed vector, anything
    /// else a list. No items gives an empty number vector.
    pub fn collect_items(items: Vec<Value>) -> Value {
        if items.iter().all(|v| matches!(v, Value::Double(_))) {
            return Value::DoubleVector(items.iter().filter_map(Value::as_f64).collect());
        }
        if items.iter().all(|v| matches!(v, Value::Bool(_))) {
            return Value::BoolVector(items.iter().filter_map(Value::as_bool).collect());
        }
        if items.iter().all(|v| matches!(v, Value::String(_))) {
            return Value::StringVector(
                items.into_iter().filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                }).collect(),
            );
        }
        Value::List(items)
    }
}

// ==================== Display ====================

fn fmt_number(f: &mut fmt::Formatter<'_>, d: f64) -> fmt::Result {
    if d.is_nan() {
        write!(f, "nan")
    } else if d.is_infinite() {
        write!(f, "{}", if d > 0.0 { "inf" } else { "-inf" })
    } else {
        write!(f, "{}", d)
    }
}

fn fmt_rows<T>(
    f: &mut fmt::Formatter<'_>,
    data: &[T],
    columns: usize,
    mut item: impl FnMut(&mut fmt::Formatter<'_>, &T) -> fmt::Result,
) -> fmt::Result {
    write!(f, "[")?;
    for (i, x) in data.iter().enumerate() {
        if i > 0 {
            if columns > 0 && i % columns == 0 {
                write!(f, "; ")?;
            } else {
                write!(f, ", ")?;
            }
        }
        item(f, x)?;
    }
    write!(f, "]")
}

/// Lists and structs quote their string members.
fn fmt_nested(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::String(s) => write!(f, "\"{}\"", s),
        other => write!(f, "{}", other),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Invalid => write!(f, "invalid"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Double(d) => fmt_number(f, *d),
            Value::String(s) => write!(f, "{}", s),
            Value::BoolVector(v) => fmt_rows(f, v, 0, |f, b| write!(f, "{}", b)),
            Value::DoubleVector(v) => fmt_rows(f, v, 0, |f, d| fmt_number(f, *d)),
            Value::StringVector(v) => fmt_rows(f, v, 0, |f, s| write!(f, "\"{}\"", s)),
            Value::BoolMatrix { data, columns } => {
                fmt_rows(f, data, *columns, |f, b| write!(f, "{}", b))
            }
            Value::DoubleMatrix { data, columns } => {
                fmt_rows(f, data, *columns, |f, d| fmt_number(f, *d))
            }
            Value::List(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    fmt_nested(f, item)?;
                }
                write!(f, "}}")
            }
            Value::Struct(members) => {
                write!(f, "{{")?;
                for (i, (name, item)) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: ", name)?;
                    fmt_nested(f, item)?;
                }
                write!(f, "}}")
            }
        }
    }
}

// ==================== Scalar kernels ====================
// Shared with the bytecode VM so both backends agree bit for bit.

/// Saturating conversion used by the integer operators (NaN becomes 0).
pub fn to_i32(x: f64) -> i32 {
    x as i32
}

/// `%` on truncated 32-bit integers; modulo zero is NaN.
pub fn int_mod(a: f64, b: f64) -> f64 {
    let (a, b) = (to_i32(a), to_i32(b));
    if b == 0 {
        f64::NAN
    } else {
        a.wrapping_rem(b) as f64
    }
}

pub fn bit_and(a: f64, b: f64) -> f64 {
    (to_i32(a) & to_i32(b)) as f64
}

pub fn bit_or(a: f64, b: f64) -> f64 {
    (to_i32(a) | to_i32(b)) as f64
}

pub fn bit_not(a: f64) -> f64 {
    (!to_i32(a)) as f64
}

// ==================== Broadcasting ====================

/// A scalar, vector or matrix operand, borrowed when possible.
enum Operand<'a, T: Clone> {
    Scalar(T),
    Vector(Cow<'a, [T]>),
    Matrix(Cow<'a, [T]>, usize),
}

/// Result shape of an elementwise operation
enum Shaped<T> {
    Scalar(T),
    Vector(Vec<T>),
    Matrix(Vec<T>, usize),
}

impl<T> Shaped<T> {
    fn map<U>(self, f: impl Fn(T) -> U) -> Shaped<U> {
        match self {
            Shaped::Scalar(x) => Shaped::Scalar(f(x)),
            Shaped::Vector(v) => Shaped::Vector(v.into_iter().map(f).collect()),
            Shaped::Matrix(v, c) => Shaped::Matrix(v.into_iter().map(f).collect(), c),
        }
    }
}

impl Shaped<f64> {
    fn into_double_value(self) -> Value {
        match self {
            Shaped::Scalar(x) => Value::Double(x),
            Shaped::Vector(v) => Value::DoubleVector(v),
            Shaped::Matrix(data, columns) => Value::DoubleMatrix { data, columns },
        }
    }
}

impl Shaped<bool> {
    fn into_bool_value(self) -> Value {
        match self {
            Shaped::Scalar(x) => Value::Bool(x),
            Shaped::Vector(v) => Value::BoolVector(v),
            Shaped::Matrix(data, columns) => Value::BoolMatrix { data, columns },
        }
    }
}

impl<T: Clone> Operand<'_, T> {
    fn into_shaped(self) -> Shaped<T> {
        match self {
            Operand::Scalar(x) => Shaped::Scalar(x),
            Operand::Vector(v) => Shaped::Vector(v.into_owned()),
            Operand::Matrix(v, c) => Shaped::Matrix(v.into_owned(), c),
        }
    }

    fn map<U>(self, f: impl Fn(T) -> U) -> Shaped<U> {
        self.into_shaped().map(f)
    }

    fn len(&self) -> usize {
        match self {
            Operand::Scalar(_) => 1,
            Operand::Vector(v) | Operand::Matrix(v, _) => v.len(),
        }
    }
}

fn numbers(value: &Value) -> Option<Operand<'_, f64>> {
    match value {
        Value::Double(d) => Some(Operand::Scalar(*d)),
        Value::DoubleVector(v) => Some(Operand::Vector(Cow::Borrowed(v))),
        Value::DoubleMatrix { data, columns } => {
            Some(Operand::Matrix(Cow::Borrowed(data), *columns))
        }
        _ => None,
    }
}

/// Bool operands for logic operators; numbers count as true when non-zero.
fn bools(value: &Value) -> Option<Operand<'_, bool>> {
    match value {
        Value::Double(d) => Some(Operand::Scalar(*d != 0.0)),
        Value::DoubleVector(v) => {
            Some(Operand::Vector(Cow::Owned(v.iter().map(|d| *d != 0.0).collect())))
        }
        Value::DoubleMatrix { data, columns } => Some(Operand::Matrix(
            Cow::Owned(data.iter().map(|d| *d != 0.0).collect()),
            *columns,
        )),
        other => bools_strict(other),
    }
}

fn bools_strict(value: &Value) -> Option<Operand<'_, bool>> {
    match value {
        Value::Bool(b) => Some(Operand::Scalar(*b)),
        Value::BoolVector(v) => Some(Operand::Vector(Cow::Borrowed(v))),
        Value::BoolMatrix { data, columns } => Some(Operand::Matrix(Cow::Borrowed(data), *columns)),
        _ => None,
    }
}

fn strings(value: &Value) -> Option<Operand<'_, &str>> {
    match value {
        Value::String(s) => Some(Operand::Scalar(s.as_str())),
        Value::StringVector(v) => {
            Some(Operand::Vector(Cow::Owned(v.iter().map(String::as_str).collect())))
        }
        _ => None,
    }
}

/// Applies `f` elementwise, broadcasting scalars over vectors and matrices.
fn zip_with<T: Clone, U>(
    op: &'static str,
    a: Operand<'_, T>,
    b: Operand<'_, T>,
    f: impl Fn(T, T) -> U,
) -> std::result::Result<Shaped<U>, ErrorKind> {
    let mismatch = |a: usize, b: usize| ErrorKind::LengthMismatch { op, lhs: a, rhs: b };
    let (la, lb) = (a.len(), b.len());
    Ok(match (a, b) {
        (Operand::Scalar(x), Operand::Scalar(y)) => Shaped::Scalar(f(x, y)),
        (Operand::Scalar(x), other) => other.map(|y| f(x.clone(), y)),
        (other, Operand::Scalar(y)) => other.map(|x| f(x, y.clone())),
        (Operand::Vector(x), Operand::Vector(y)) => {
            if la != lb {
                return Err(mismatch(la, lb));
            }
            Shaped::Vector(x.iter().cloned().zip(y.iter().cloned()).map(|(x, y)| f(x, y)).collect())
        }
        (Operand::Matrix(x, cx), Operand::Matrix(y, cy)) => {
            if la != lb || cx != cy {
                return Err(mismatch(la, lb));
            }
            let data = x.iter().cloned().zip(y.iter().cloned()).map(|(x, y)| f(x, y)).collect();
            Shaped::Matrix(data, cx)
        }
        _ => return Err(mismatch(la, lb)),
    })
}

fn arithmetic(op: &'static str, lhs: &Value, rhs: &Value, f: impl Fn(f64, f64) -> f64) -> OpResult {
    match (numbers(lhs), numbers(rhs)) {
        (Some(a), Some(b)) => zip_with(op, a, b, f).map(Shaped::into_double_value),
        _ => Err(type_error(op, lhs, rhs)),
    }
}

/// String `+`: concatenation, elementwise for string vectors.
fn concat_strings(lhs: &Value, rhs: &Value) -> std::result::Result<Option<Value>, ErrorKind> {
    let (Some(a), Some(b)) = (strings(lhs), strings(rhs)) else {
        return Ok(None);
    };
    let joined = zip_with("+", a, b, |x, y| format!("{}{}", x, y))?;
    Ok(Some(match joined {
        Shaped::Scalar(s) => Value::String(s),
        Shaped::Vector(v) | Shaped::Matrix(v, _) => Value::StringVector(v),
    }))
}

fn compare_fn<T: PartialOrd>(op: CompareOp) -> fn(T, T) -> bool {
    match op {
        CompareOp::Eq => |a, b| a == b,
        CompareOp::Ne => |a, b| a != b,
        CompareOp::Lt => |a, b| a < b,
        CompareOp::Le => |a, b| a <= b,
        CompareOp::Gt => |a, b| a > b,
        CompareOp::Ge => |a, b| a >= b,
    }
}

fn type_error(op: &'static str, lhs: &Value, rhs: &Value) -> ErrorKind {
    ErrorKind::OperatorType { op, lhs: lhs.type_name(), rhs: rhs.type_name() }
}

fn rows(len: usize, columns: usize) -> usize {
    len.checked_div(columns).unwrap_or(0)
}

fn shape_ok(len: usize, columns: usize) -> bool {
    if columns == 0 {
        len == 0
    } else {
        len % columns == 0
    }
}

// ==================== Index helpers ====================

fn to_index(i: f64, len: usize) -> std::result::Result<usize, ErrorKind> {
    if i.is_nan() || i < 0.0 || i.trunc() >= len as f64 {
        Err(ErrorKind::IndexOutOfRange { index: i, len })
    } else {
        Ok(i as usize)
    }
}

/// Positions addressed by an index value. Bounds are checked by the caller,
/// except for negative or non-finite indices which are always rejected.
fn index_positions(index: &Value, len: usize) -> std::result::Result<Vec<usize>, ErrorKind> {
    let position = |i: f64| {
        if !i.is_finite() || i < 0.0 {
            Err(ErrorKind::IndexOutOfRange { index: i, len })
        } else {
            Ok(i as usize)
        }
    };
    match index {
        Value::Double(i) => Ok(vec![position(*i)?]),
        Value::DoubleVector(v) => v.iter().map(|i| position(*i)).collect(),
        Value::BoolVector(mask) => {
            if mask.len() != len {
                return Err(ErrorKind::LengthMismatch { op: "[]", lhs: len, rhs: mask.len() });
            }
            Ok(mask.iter().enumerate().filter(|(_, m)| **m).map(|(k, _)| k).collect())
        }
        other => Err(ErrorKind::InvalidIndex { target: "vector", index: other.type_name() }),
    }
}

fn assign_into<T: Clone>(
    data: &mut Vec<T>,
    positions: &[usize],
    values: &[T],
    fill: T,
    grow: bool,
) -> std::result::Result<(), ErrorKind> {
    if values.len() != 1 && values.len() != positions.len() {
        return Err(ErrorKind::LengthMismatch {
            op: "[]=",
            lhs: positions.len(),
            rhs: values.len(),
        });
    }
    for (n, &k) in positions.iter().enumerate() {
        if k >= data.len() {
            if !grow || k >= MAX_VECTOR_LEN {
                return Err(ErrorKind::IndexOutOfRange { index: k as f64, len: data.len() });
            }
            data.resize(k + 1, fill.clone());
        }
        let v = if values.len() == 1 { &values[0] } else { &values[n] };
        data[k] = v.clone();
    }
    Ok(())
}
