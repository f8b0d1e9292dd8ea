//! Variable and function environment for mathexpr
//!
//! Both tables are level scoped. Entering a block raises the level, adding a
//! name at the current level either replaces the binding already made at
//! that level or shadows an outer one, and leaving a block drops everything
//! bound at the level being left. Registrations made by the host at level 0
//! therefore live as long as the environment.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::Node;
use crate::error::ErrorKind;
use crate::interpreter::Interpreter;
use crate::value::Value;

// ==================== Scoped table ====================

#[derive(Debug, Clone)]
struct Entry<T> {
    name: String,
    level: usize,
    value: T,
    /// Index of the binding this entry shadows
    shadowed: Option<usize>,
}

/// Arena of bindings with a name to innermost-entry index.
#[derive(Debug, Clone)]
pub struct ScopedTable<T> {
    entries: Vec<Entry<T>>,
    index: HashMap<String, usize>,
}

impl<T> Default for ScopedTable<T> {
    fn default() -> Self {
        Self { entries: Vec::new(), index: HashMap::new() }
    }
}

impl<T> ScopedTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.index.get(name).map(|&i| &self.entries[i].value)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        let i = *self.index.get(name)?;
        Some(&mut self.entries[i].value)
    }

    /// Innermost binding together with the level it was made at
    pub fn get_with_level(&self, name: &str) -> Option<(&T, usize)> {
        self.index.get(name).map(|&i| (&self.entries[i].value, self.entries[i].level))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn add(&mut self, name: &str, value: T, level: usize) {
        let shadowed = self.index.get(name).copied();
        if let Some(i) = shadowed {
            if self.entries[i].level == level {
                self.entries[i].value = value;
                return;
            }
        }
        self.entries.push(Entry { name: name.to_string(), level, value, shadowed });
        self.index.insert(name.to_string(), self.entries.len() - 1);
    }

    /// Drops every binding made at `level` or above.
    pub fn pop_level(&mut self, level: usize) {
        while self.entries.last().is_some_and(|e| e.level >= level) {
            if let Some(entry) = self.entries.pop() {
                match entry.shadowed {
                    Some(i) => self.index.insert(entry.name, i),
                    None => self.index.remove(&entry.name),
                };
            }
        }
    }

    /// Visible bindings, innermost only, in no particular order
    pub fn visible(&self) -> impl Iterator<Item = (&str, &T)> {
        self.index.iter().map(|(name, &i)| (name.as_str(), &self.entries[i].value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}

// ==================== Variables ====================

/// Storage owned by the environment. Numbers live in a shared cell so
/// compiled programs can read and write them in place.
#[derive(Debug, Clone)]
pub enum Slot {
    Double(Rc<Cell<f64>>),
    Value(Value),
}

/// A host-owned variable. The host keeps its own handle and sees every
/// assignment made by formulas.
#[derive(Debug, Clone)]
pub enum HostVar {
    Double(Rc<Cell<f64>>),
    Bool(Rc<Cell<bool>>),
    Value(Rc<RefCell<Value>>),
}

#[derive(Debug, Clone)]
pub enum Variable {
    Owned(Slot),
    Borrowed(HostVar),
}

impl Variable {
    pub fn owned(value: Value) -> Self {
        match value {
            Value::Double(d) => Variable::Owned(Slot::Double(Rc::new(Cell::new(d)))),
            other => Variable::Owned(Slot::Value(other)),
        }
    }

    pub fn get(&self) -> Value {
        match self {
            Variable::Owned(Slot::Double(cell)) | Variable::Borrowed(HostVar::Double(cell)) => {
                Value::Double(cell.get())
            }
            Variable::Owned(Slot::Value(value)) => value.clone(),
            Variable::Borrowed(HostVar::Bool(cell)) => Value::Bool(cell.get()),
            Variable::Borrowed(HostVar::Value(cell)) => cell.borrow().clone(),
        }
    }

    /// Stores `value`. An owned variable changing type gets a new slot; a
    /// typed host cell rejects values of another type.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), ErrorKind> {
        let mismatch = |expected: &'static str, found: &Value| ErrorKind::HostTypeMismatch {
            name: name.to_string(),
            expected,
            found: found.type_name(),
        };
        match self {
            Variable::Owned(Slot::Double(cell)) => match value {
                Value::Double(d) => cell.set(d),
                other => *self = Variable::owned(other),
            },
            Variable::Owned(Slot::Value(_)) => *self = Variable::owned(value),
            Variable::Borrowed(HostVar::Double(cell)) => match value {
                Value::Double(d) => cell.set(d),
                other => return Err(mismatch("number", &other)),
            },
            Variable::Borrowed(HostVar::Bool(cell)) => match value {
                Value::Bool(b) => cell.set(b),
                other => return Err(mismatch("bool", &other)),
            },
            Variable::Borrowed(HostVar::Value(cell)) => *cell.borrow_mut() = value,
        }
        Ok(())
    }

    /// The shared cell behind a numeric variable
    pub fn numeric_cell(&self) -> Option<Rc<Cell<f64>>> {
        match self {
            Variable::Owned(Slot::Double(cell)) | Variable::Borrowed(HostVar::Double(cell)) => {
                Some(Rc::clone(cell))
            }
            _ => None,
        }
    }

    pub fn is_borrowed(&self) -> bool {
        matches!(self, Variable::Borrowed(_))
    }
}

// ==================== Functions ====================

/// Native function over evaluated arguments
pub type NativeFn = fn(&[Value], &mut Interpreter) -> Value;

/// Native function writing its result into an out parameter
pub type NativeRefFn = fn(&mut Value, &[Value], &mut Interpreter);

/// Native function receiving the unevaluated argument nodes
pub type NodeFn = fn(&[Node], &mut Interpreter) -> Value;

/// Plain numeric fast path used by compiled programs
#[derive(Clone, Copy)]
pub enum SimpleFn {
    F0(fn() -> f64),
    F1(fn(f64) -> f64),
    F2(fn(f64, f64) -> f64),
    F3(fn(f64, f64, f64) -> f64),
}

impl SimpleFn {
    pub fn arity(self) -> usize {
        match self {
            SimpleFn::F0(_) => 0,
            SimpleFn::F1(_) => 1,
            SimpleFn::F2(_) => 2,
            SimpleFn::F3(_) => 3,
        }
    }

    /// `args.len()` must equal the arity.
    pub fn call(self, args: &[f64]) -> f64 {
        match (self, args) {
            (SimpleFn::F0(f), []) => f(),
            (SimpleFn::F1(f), [a]) => f(*a),
            (SimpleFn::F2(f), [a, b]) => f(*a, *b),
            (SimpleFn::F3(f), [a, b, c]) => f(*a, *b, *c),
            _ => f64::NAN,
        }
    }
}

/// Numeric fast path that also receives the interpreter
#[derive(Clone, Copy)]
pub enum SimpleCtxFn {
    C0(fn(&mut Interpreter) -> f64),
    C1(fn(&mut Interpreter, f64) -> f64),
    C2(fn(&mut Interpreter, f64, f64) -> f64),
    C3(fn(&mut Interpreter, f64, f64, f64) -> f64),
}

impl SimpleCtxFn {
    pub fn arity(self) -> usize {
        match self {
            SimpleCtxFn::C0(_) => 0,
            SimpleCtxFn::C1(_) => 1,
            SimpleCtxFn::C2(_) => 2,
            SimpleCtxFn::C3(_) => 3,
        }
    }

    pub fn call(self, interp: &mut Interpreter, args: &[f64]) -> f64 {
        match (self, args) {
            (SimpleCtxFn::C0(f), []) => f(interp),
            (SimpleCtxFn::C1(f), [a]) => f(interp, *a),
            (SimpleCtxFn::C2(f), [a, b]) => f(interp, *a, *b),
            (SimpleCtxFn::C3(f), [a, b, c]) => f(interp, *a, *b, *c),
            _ => f64::NAN,
        }
    }
}

impl fmt::Debug for SimpleFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<simple fn/{}>", self.arity())
    }
}

impl fmt::Debug for SimpleCtxFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<simple ctx fn/{}>", self.arity())
    }
}

/// Fast-path pointers of a function, at most one per arity and kind
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleFns {
    plain: [Option<SimpleFn>; 4],
    ctx: [Option<SimpleCtxFn>; 4],
}

impl SimpleFns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, f: SimpleFn) -> Self {
        self.plain[f.arity()] = Some(f);
        self
    }

    pub fn with_ctx(mut self, f: SimpleCtxFn) -> Self {
        self.ctx[f.arity()] = Some(f);
        self
    }

    pub fn get(&self, arity: usize) -> Option<SimpleFn> {
        self.plain.get(arity).copied().flatten()
    }

    pub fn get_ctx(&self, arity: usize) -> Option<SimpleCtxFn> {
        self.ctx.get(arity).copied().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.plain.iter().all(Option::is_none) && self.ctx.iter().all(Option::is_none)
    }
}

#[derive(Clone)]
pub enum FunctionKind {
    Native(NativeFn),
    NativeRef(NativeRefFn),
    Node(NodeFn),
    User { params: Vec<String>, body: Rc<Node> },
}

impl fmt::Debug for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionKind::Native(_) => write!(f, "<native fn>"),
            FunctionKind::NativeRef(_) => write!(f, "<native ref fn>"),
            FunctionKind::Node(_) => write!(f, "<node fn>"),
            FunctionKind::User { params, body } => {
                write!(f, "<fn({}) = {}>", params.join(", "), body)
            }
        }
    }
}

/// A callable registered in the environment
#[derive(Debug, Clone)]
pub struct FunctionDescriptor {
    pub kind: FunctionKind,
    /// Expected argument count; `None` accepts any
    pub arity: Option<usize>,
    pub simple: SimpleFns,
}

impl FunctionDescriptor {
    pub fn native(f: NativeFn, arity: Option<usize>) -> Self {
        Self { kind: FunctionKind::Native(f), arity, simple: SimpleFns::new() }
    }

    pub fn native_ref(f: NativeRefFn, arity: Option<usize>) -> Self {
        Self { kind: FunctionKind::NativeRef(f), arity, simple: SimpleFns::new() }
    }

    pub fn node(f: NodeFn) -> Self {
        Self { kind: FunctionKind::Node(f), arity: None, simple: SimpleFns::new() }
    }

    pub fn user(params: Vec<String>, body: Rc<Node>) -> Self {
        let arity = Some(params.len());
        Self { kind: FunctionKind::User { params, body }, arity, simple: SimpleFns::new() }
    }

    pub fn with_simple(mut self, simple: SimpleFns) -> Self {
        self.simple = simple;
        self
    }
}

// ==================== Environment ====================

/// Variable and function tables of one interpreter
#[derive(Debug, Clone, Default)]
pub struct Environment {
    variables: ScopedTable<Variable>,
    functions: ScopedTable<FunctionDescriptor>,
    level: usize,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn enter_block(&mut self) {
        self.level += 1;
    }

    /// Leaves the current block. Level 0 is never left.
    pub fn leave_block(&mut self) {
        if self.level == 0 {
            return;
        }
        self.variables.pop_level(self.level);
        self.functions.pop_level(self.level);
        self.level -= 1;
    }

    /// Binds an owned variable at the current level.
    pub fn add_variable(&mut self, name: &str, value: Value) {
        self.variables.add(name, Variable::owned(value), self.level);
    }

    /// Binds a host-owned variable at the current level.
    pub fn add_host_variable(&mut self, name: &str, var: HostVar) {
        self.variables.add(name, Variable::Borrowed(var), self.level);
    }

    /// Assigns to the innermost binding of `name`, or binds a new variable at
    /// the current level.
    pub fn set_variable(&mut self, name: &str, value: Value) -> Result<(), ErrorKind> {
        match self.variables.get_mut(name) {
            Some(var) => var.set(name, value),
            None => {
                self.add_variable(name, value);
                Ok(())
            }
        }
    }

    pub fn get_variable(&self, name: &str) -> Option<Value> {
        self.variables.get(name).map(Variable::get)
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn variable_with_level(&self, name: &str) -> Option<(&Variable, usize)> {
        self.variables.get_with_level(name)
    }

    pub fn variable_exists(&self, name: &str) -> bool {
        self.variables.contains(name)
    }

    /// Visible variables sorted by name
    pub fn variables(&self) -> Vec<(String, Value)> {
        let mut vars: Vec<_> = self
            .variables
            .visible()
            .map(|(name, var)| (name.to_string(), var.get()))
            .collect();
        vars.sort_by(|a, b| a.0.cmp(&b.0));
        vars
    }

    pub fn add_function(&mut self, name: &str, function: FunctionDescriptor) {
        self.functions.add(name, function, self.level);
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDescriptor> {
        self.functions.get(name)
    }

    pub fn function_exists(&self, name: &str) -> bool {
        self.functions.contains(name)
    }

    /// Removes every variable and function and returns to level 0.
    pub fn clear(&mut self) {
        self.variables.clear();
        self.functions.clear();
        self.level = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadow_and_leave() {
        let mut env = Environment::new();
        env.add_variable("x", Value::Double(1.0));
        env.enter_block();
        env.add_variable("x", Value::Double(2.0));
        assert_eq!(env.get_variable("x"), Some(Value::Double(2.0)));
        env.leave_block();
        assert_eq!(env.get_variable("x"), Some(Value::Double(1.0)));
    }

    #[test]
    fn test_same_level_replaces() {
        let mut table = ScopedTable::new();
        table.add("a", 1, 0);
        table.add("a", 2, 0);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("a"), Some(&2));
    }

    #[test]
    fn test_block_locals_disappear() {
        let mut env = Environment::new();
        env.enter_block();
        env.add_variable("tmp", Value::Bool(true));
        env.enter_block();
        env.add_variable("inner", Value::Double(3.0));
        env.leave_block();
        assert!(!env.variable_exists("inner"));
        assert!(env.variable_exists("tmp"));
        env.leave_block();
        assert!(!env.variable_exists("tmp"));
        env.leave_block();
        assert_eq!(env.level(), 0);
    }

    #[test]
    fn test_set_variable_targets_innermost() {
        let mut env = Environment::new();
        env.add_variable("x", Value::Double(1.0));
        env.enter_block();
        env.set_variable("x", Value::Double(5.0)).unwrap();
        env.set_variable("y", Value::Double(6.0)).unwrap();
        env.leave_block();
        assert_eq!(env.get_variable("x"), Some(Value::Double(5.0)));
        assert!(!env.variable_exists("y"));
    }

    #[test]
    fn test_owned_slot_changes_type() {
        let mut env = Environment::new();
        env.add_variable("x", Value::Double(1.0));
        let cell = env.variable("x").and_then(Variable::numeric_cell).unwrap();
        env.set_variable("x", Value::Double(4.0)).unwrap();
        assert_eq!(cell.get(), 4.0);
        env.set_variable("x", Value::from("text")).unwrap();
        assert_eq!(env.get_variable("x"), Some(Value::from("text")));
        assert!(env.variable("x").and_then(Variable::numeric_cell).is_none());
    }

    #[test]
    fn test_host_variables() {
        let mut env = Environment::new();
        let cell = Rc::new(Cell::new(2.0));
        env.add_host_variable("h", HostVar::Double(Rc::clone(&cell)));
        env.set_variable("h", Value::Double(9.0)).unwrap();
        assert_eq!(cell.get(), 9.0);
        let err = env.set_variable("h", Value::Bool(true)).unwrap_err();
        assert_eq!(
            err,
            ErrorKind::HostTypeMismatch { name: "h".into(), expected: "number", found: "bool" }
        );

        let shared = Rc::new(RefCell::new(Value::Void));
        env.add_host_variable("v", HostVar::Value(Rc::clone(&shared)));
        env.set_variable("v", Value::DoubleVector(vec![1.0])).unwrap();
        assert_eq!(*shared.borrow(), Value::DoubleVector(vec![1.0]));
    }

    #[test]
    fn test_simple_fns() {
        fn twice(x: f64) -> f64 {
            x * 2.0
        }
        let simple = SimpleFns::new().with(SimpleFn::F1(twice));
        assert!(simple.get(0).is_none());
        assert_eq!(simple.get(1).map(|f| f.call(&[4.0])), Some(8.0));
        assert!(simple.get(7).is_none());
        assert!(!simple.is_empty());
        assert!(SimpleFns::new().is_empty());
    }
}
