//! Tree-walking interpreter for mathexpr
//!
//! [`Interpreter`] is the host-facing entry point. It owns the environment,
//! the error log and the configuration, evaluates parsed formulas directly
//! and hands the numeric subset to the bytecode compiler and VM.
//!
//! Evaluation never aborts. Every problem is appended to the error log and
//! the offending expression evaluates to [`Value::Invalid`], which then
//! propagates silently through every enclosing operation.

use std::rc::Rc;

use crate::ast::{BinaryOp, LoopKind, LoopSource, Node};
use crate::builtins;
use crate::bytecode::Program;
use crate::compiler::Compiler;
use crate::config::Config;
use crate::environment::{
    Environment, FunctionDescriptor, FunctionKind, HostVar, NativeFn, NativeRefFn, NodeFn,
    SimpleFns,
};
use crate::error::{ErrorKind, ErrorLog, MathError, Result};
use crate::parser::Parser;
use crate::stack::ensure_sufficient_stack;
use crate::value::{OpResult, Value, MAX_VECTOR_LEN};
use crate::vm::Vm;

/// Whether a range loop at `t` runs another iteration. `previous` is the
/// value of the last iteration, NaN before the first one. The compiled loop
/// head tests the same condition.
///
/// Zero and NaN deltas never run, non-finite positions and ends stop the
/// range, and so does a step too small to change `t`.
pub fn range_continues(t: f64, previous: f64, delta: f64, end: f64) -> bool {
    t.is_finite() && end.is_finite() && t != previous && delta != 0.0 && (end - t) * delta >= 0.0
}

/// Positions of the range `start:delta:end`, produced lazily.
#[derive(Debug, Clone)]
pub struct RangeIter {
    t: f64,
    previous: f64,
    delta: f64,
    end: f64,
}

impl RangeIter {
    pub fn new(start: f64, delta: f64, end: f64) -> Self {
        Self { t: start, previous: f64::NAN, delta, end }
    }
}

impl Iterator for RangeIter {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if !range_continues(self.t, self.previous, self.delta, self.end) {
            return None;
        }
        let t = self.t;
        self.previous = t;
        self.t = t + self.delta;
        Some(t)
    }
}

/// Values of the range `start:delta:end` as a vector of at most
/// [`MAX_VECTOR_LEN`] elements.
pub fn range_values(start: f64, delta: f64, end: f64) -> std::result::Result<Vec<f64>, ErrorKind> {
    let too_long = ErrorKind::VectorTooLong { limit: MAX_VECTOR_LEN };
    let estimate = ((end - start) / delta).floor();
    if estimate.is_finite() && estimate >= MAX_VECTOR_LEN as f64 {
        return Err(too_long);
    }
    let mut values = Vec::new();
    for t in RangeIter::new(start, delta, end) {
        if values.len() == MAX_VECTOR_LEN {
            return Err(too_long);
        }
        values.push(t);
    }
    Ok(values)
}

/// Items a loop iterates over
enum LoopItems {
    Values(std::vec::IntoIter<Value>),
    Range(RangeIter),
}

impl Iterator for LoopItems {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            LoopItems::Values(values) => values.next(),
            LoopItems::Range(range) => range.next().map(Value::Double),
        }
    }
}

/// The expression engine
pub struct Interpreter {
    env: Environment,
    errors: ErrorLog,
    config: Config,
    depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Creates an interpreter with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let mut interp =
            Self { env: Environment::new(), errors: ErrorLog::new(), config, depth: 0 };
        if interp.config.register_builtins {
            builtins::register(&mut interp);
        }
        interp
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    // ==================== Registration ====================

    /// Registers a native function over evaluated arguments. `arity` of
    /// `None` accepts any number of arguments.
    pub fn add_function(&mut self, name: &str, f: NativeFn, arity: Option<usize>) {
        self.env.add_function(name, FunctionDescriptor::native(f, arity));
    }

    /// Like [`add_function`](Self::add_function), plus numeric fast paths the
    /// bytecode compiler calls directly.
    pub fn add_function_with_simple(
        &mut self,
        name: &str,
        f: NativeFn,
        arity: Option<usize>,
        simple: SimpleFns,
    ) {
        self.env.add_function(name, FunctionDescriptor::native(f, arity).with_simple(simple));
    }

    pub fn add_ref_function(&mut self, name: &str, f: NativeRefFn, arity: Option<usize>) {
        self.env.add_function(name, FunctionDescriptor::native_ref(f, arity));
    }

    /// Registers a function that receives its arguments unevaluated.
    pub fn add_node_function(&mut self, name: &str, f: NodeFn) {
        self.env.add_function(name, FunctionDescriptor::node(f));
    }

    pub fn add_variable(&mut self, name: &str, value: impl Into<Value>) {
        self.env.add_variable(name, value.into());
    }

    /// Binds a variable whose storage the host keeps a handle to.
    pub fn add_host_variable(&mut self, name: &str, var: HostVar) {
        self.env.add_host_variable(name, var);
    }

    pub fn function_exists(&self, name: &str) -> bool {
        self.env.function_exists(name)
    }

    pub fn variable_exists(&self, name: &str) -> bool {
        self.env.variable_exists(name)
    }

    pub fn has_default_functions(&self) -> bool {
        self.env.function_exists("sin")
    }

    pub fn has_default_variables(&self) -> bool {
        self.env.variable_exists("pi")
    }

    pub fn get_variable(&self, name: &str) -> Option<Value> {
        self.env.get_variable(name)
    }

    /// Drops every variable and function. The default catalog is registered
    /// again when the configuration asks for it.
    pub fn clear_environment(&mut self) {
        self.env.clear();
        if self.config.register_builtins {
            builtins::register(self);
        }
    }

    // ==================== Errors ====================

    /// Records an error. Native functions use this to report failures.
    pub fn report(&mut self, kind: ErrorKind) {
        self.errors.push(kind.into());
    }

    pub fn report_error(&mut self, error: MathError) {
        self.errors.push(error);
    }

    pub fn last_error(&self) -> Option<&MathError> {
        self.errors.last()
    }

    pub fn first_error(&self) -> Option<&MathError> {
        self.errors.first()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    pub fn reset_errors(&mut self) {
        self.errors.clear();
    }

    pub fn has_error_occurred(&self) -> bool {
        !self.errors.is_empty()
    }

    fn fail(&mut self, kind: ErrorKind) -> Value {
        self.report(kind);
        Value::Invalid
    }

    /// Unwraps an operator result, recording the error and giving `Invalid` on failure.
    pub fn check_result(&mut self, result: OpResult) -> Value {
        match result {
            Ok(value) => value,
            Err(kind) => self.fail(kind),
        }
    }

    // ==================== Entry points ====================

    /// Parses `text`, recording syntax errors.
    pub fn parse(&mut self, text: &str) -> Node {
        let mut parser = Parser::with_max_depth(text, self.config.max_parse_depth);
        let node = parser.parse();
        for error in parser.take_errors() {
            self.errors.push(error);
        }
        node
    }

    /// Parses and evaluates `text`. A formula with syntax errors is not
    /// evaluated and yields `Invalid`.
    pub fn evaluate(&mut self, text: &str) -> Value {
        let before = self.errors.len();
        let node = self.parse(text);
        if self.errors.len() > before {
            return Value::Invalid;
        }
        let value = self.evaluate_node(&node);
        tracing::debug!(formula = text, result = %value, "evaluated");
        value
    }

    /// Compiles the numeric subset of `node` to bytecode. Failures are also
    /// recorded in the error log.
    pub fn compile(&mut self, node: &Node) -> Result<Program> {
        Compiler::new(&self.env).compile(node).inspect_err(|error| self.errors.push(error.clone()))
    }

    /// Runs a compiled program. Runtime errors are recorded and give NaN.
    pub fn run(&mut self, program: &Program) -> f64 {
        let mut vm = Vm::new(&self.config);
        match vm.run(program, self) {
            Ok(result) => result,
            Err(error) => {
                self.errors.push(error);
                f64::NAN
            }
        }
    }

    /// Calls a registered function with already evaluated arguments.
    pub fn call_function(&mut self, name: &str, args: Vec<Value>) -> Value {
        let Some(function) = self.env.function(name).cloned() else {
            return self.fail(ErrorKind::UndefinedFunction(name.to_string()));
        };
        self.invoke(name, &function, args)
    }

    // ==================== Evaluation ====================

    pub fn evaluate_node(&mut self, node: &Node) -> Value {
        ensure_sufficient_stack(|| self.eval(node))
    }

    fn eval(&mut self, node: &Node) -> Value {
        match node {
            Node::Constant(value) => value.clone(),
            Node::Variable(name) => match self.env.get_variable(name) {
                Some(value) => value,
                None => self.fail(ErrorKind::UndefinedVariable(name.clone())),
            },
            Node::Unary { op, operand } => {
                let operand = self.evaluate_node(operand);
                self.check_result(operand.unary(*op))
            }
            Node::Binary { op, left, right } => {
                let left = self.evaluate_node(left);
                let right = self.evaluate_node(right);
                self.check_result(left.binary(*op, &right))
            }
            Node::Compare { op, left, right } => {
                let left = self.evaluate_node(left);
                let right = self.evaluate_node(right);
                self.check_result(left.compare(*op, &right))
            }
            Node::Logical { op, left, right } => {
                let left = self.evaluate_node(left);
                let right = self.evaluate_node(right);
                self.check_result(left.logical(*op, &right))
            }
            Node::Assign { name, value } => {
                let value = self.evaluate_node(value);
                if value.is_invalid() {
                    return Value::Invalid;
                }
                match self.env.set_variable(name, value.clone()) {
                    Ok(()) => value,
                    Err(kind) => self.fail(kind),
                }
            }
            Node::VectorElementAssign { name, index, value } => {
                self.assign_element(name, index, value)
            }
            Node::VariableVectorAccess { name, index } => {
                let index = self.evaluate_node(index);
                match self.env.get_variable(name) {
                    Some(target) => self.check_result(target.index(&index)),
                    None => self.fail(ErrorKind::UndefinedVariable(name.clone())),
                }
            }
            Node::VectorAccess { target, index } => {
                let target = self.evaluate_node(target);
                let index = self.evaluate_node(index);
                self.check_result(target.index(&index))
            }
            Node::StructAccess { target, member } => {
                let target = self.evaluate_node(target);
                self.check_result(target.member(member))
            }
            Node::FunctionCall { name, args } => self.call_node(name, args),
            Node::FunctionAssign { name, params, body } => {
                let function = FunctionDescriptor::user(params.clone(), Rc::clone(body));
                self.env.add_function(name, function);
                Value::Void
            }
            Node::Cases { branches, otherwise } => self.eval_cases(branches, otherwise.as_deref()),
            Node::VectorConstruction { start, delta, end } => {
                match self.range_bounds(start, delta.as_deref(), end) {
                    Some((start, delta, end)) => match range_values(start, delta, end) {
                        Ok(values) => Value::DoubleVector(values),
                        Err(kind) => self.fail(kind),
                    },
                    None => Value::Invalid,
                }
            }
            Node::VectorOperation { kind, var, source, body, default } => {
                self.eval_loop(*kind, var, source, body, default.as_deref())
            }
            Node::VectorMatrix { rows, matrix } => {
                let mut evaluated = Vec::with_capacity(rows.len());
                for row in rows {
                    let values: Vec<Value> =
                        row.iter().map(|item| self.evaluate_node(item)).collect();
                    evaluated.push(values);
                }
                if *matrix {
                    self.check_result(Value::matrix_from_rows(evaluated))
                } else {
                    let items = evaluated.into_iter().next().unwrap_or_default();
                    self.check_result(Value::concat_vector(items))
                }
            }
            Node::ListConstruction(items) => {
                let values: Vec<Value> =
                    items.iter().map(|item| self.evaluate_node(item)).collect();
                if values.iter().any(Value::is_invalid) {
                    Value::Invalid
                } else {
                    Value::List(values)
                }
            }
            Node::NodeList(nodes) => {
                let mut last = Value::Void;
                for node in nodes {
                    last = self.evaluate_node(node);
                }
                last
            }
            Node::Invalid => Value::Invalid,
        }
    }

    fn assign_element(&mut self, name: &str, index: &Node, value: &Node) -> Value {
        let index = self.evaluate_node(index);
        let value = self.evaluate_node(value);
        if index.is_invalid() || value.is_invalid() {
            return Value::Invalid;
        }
        let Some(mut target) = self.env.get_variable(name) else {
            return self.fail(ErrorKind::UndefinedVariable(name.to_string()));
        };
        if let Err(kind) = target.set_elements(&index, &value) {
            return self.fail(kind);
        }
        match self.env.set_variable(name, target.clone()) {
            Ok(()) => target,
            Err(kind) => self.fail(kind),
        }
    }

    fn eval_cases(&mut self, branches: &[(Node, Node)], otherwise: Option<&Node>) -> Value {
        for (cond, value) in branches {
            match self.evaluate_node(cond) {
                Value::Bool(true) => return self.evaluate_node(value),
                Value::Bool(false) => {}
                Value::Invalid => return Value::Invalid,
                other => return self.fail(ErrorKind::NonBooleanCondition(other.type_name())),
            }
        }
        match otherwise {
            Some(node) => self.evaluate_node(node),
            None => Value::Invalid,
        }
    }

    /// Evaluates numeric range bounds; `None` once an error was recorded or a
    /// bound is invalid. A missing delta is 1.
    fn range_bounds(
        &mut self,
        start: &Node,
        delta: Option<&Node>,
        end: &Node,
    ) -> Option<(f64, f64, f64)> {
        let start = self.evaluate_node(start);
        let delta = match delta {
            Some(node) => self.evaluate_node(node),
            None => Value::Double(1.0),
        };
        let end = self.evaluate_node(end);
        let mut bounds = [0.0; 3];
        for (slot, value) in bounds.iter_mut().zip([&start, &delta, &end]) {
            match value {
                Value::Double(d) => *slot = *d,
                Value::Invalid => return None,
                other => {
                    self.report(ErrorKind::RangeBound(other.type_name()));
                    return None;
                }
            }
        }
        Some((bounds[0], bounds[1], bounds[2]))
    }

    fn eval_loop(
        &mut self,
        kind: LoopKind,
        var: &str,
        source: &LoopSource,
        body: &Node,
        default: Option<&Node>,
    ) -> Value {
        let items = match source {
            LoopSource::Items(node) => {
                let value = self.evaluate_node(node);
                if value.is_invalid() {
                    return Value::Invalid;
                }
                match value.items() {
                    Some(items) => LoopItems::Values(items.into_iter()),
                    None => return self.fail(ErrorKind::NotIterable(value.type_name())),
                }
            }
            LoopSource::Range { start, delta, end } => {
                match self.range_bounds(start, delta.as_deref(), end) {
                    Some((start, delta, end)) => {
                        LoopItems::Range(RangeIter::new(start, delta, end))
                    }
                    None => return Value::Invalid,
                }
            }
        };

        let mut items = items.peekable();
        if items.peek().is_none() {
            if let Some(default) = default {
                return self.evaluate_node(default);
            }
        }

        self.env.enter_block();
        let result = self.run_loop(kind, var, items, body);
        self.env.leave_block();
        result
    }

    fn run_loop(
        &mut self,
        kind: LoopKind,
        var: &str,
        items: impl Iterator<Item = Value>,
        body: &Node,
    ) -> Value {
        match kind {
            LoopKind::Sum | LoopKind::Prod | LoopKind::CumSum | LoopKind::CumProd => {
                let (op, empty) = match kind {
                    LoopKind::Sum | LoopKind::CumSum => (BinaryOp::Add, 0.0),
                    _ => (BinaryOp::Mul, 1.0),
                };
                let running = matches!(kind, LoopKind::CumSum | LoopKind::CumProd);
                let mut acc: Option<Value> = None;
                let mut steps = Vec::new();
                for item in items {
                    self.env.add_variable(var, item);
                    let value = self.evaluate_node(body);
                    let next = match acc.take() {
                        None => value,
                        Some(acc) => {
                            let folded = acc.binary(op, &value);
                            self.check_result(folded)
                        }
                    };
                    if next.is_invalid() {
                        return Value::Invalid;
                    }
                    if running && !self.collect(&mut steps, next.clone()) {
                        return Value::Invalid;
                    }
                    acc = Some(next);
                }
                if running {
                    Value::collect_items(steps)
                } else {
                    acc.unwrap_or(Value::Double(empty))
                }
            }
            LoopKind::For | LoopKind::DefaultFor | LoopKind::SaveFor => {
                let keep_invalid = kind != LoopKind::SaveFor;
                let mut results = Vec::new();
                for item in items {
                    self.env.add_variable(var, item);
                    let value = self.evaluate_node(body);
                    if value.is_invalid() {
                        if keep_invalid {
                            return Value::Invalid;
                        }
                        continue;
                    }
                    if !self.collect(&mut results, value) {
                        return Value::Invalid;
                    }
                }
                Value::collect_items(results)
            }
            LoopKind::FilterFor | LoopKind::SaveFilterFor => {
                let strict = kind == LoopKind::FilterFor;
                let mut kept = Vec::new();
                for item in items {
                    self.env.add_variable(var, item.clone());
                    match self.evaluate_node(body) {
                        Value::Bool(true) => {
                            if !self.collect(&mut kept, item) {
                                return Value::Invalid;
                            }
                        }
                        Value::Bool(false) => {}
                        _ if !strict => {}
                        Value::Invalid => return Value::Invalid,
                        other => {
                            return self.fail(ErrorKind::NonBooleanCondition(other.type_name()))
                        }
                    }
                }
                Value::collect_items(kept)
            }
        }
    }

    /// Appends a loop result; false once the result would outgrow a vector.
    fn collect(&mut self, out: &mut Vec<Value>, value: Value) -> bool {
        if out.len() == MAX_VECTOR_LEN {
            self.report(ErrorKind::VectorTooLong { limit: MAX_VECTOR_LEN });
            return false;
        }
        out.push(value);
        true
    }

    // ==================== Calls ====================

    fn call_node(&mut self, name: &str, args: &[Node]) -> Value {
        let Some(function) = self.env.function(name).cloned() else {
            return self.fail(ErrorKind::UndefinedFunction(name.to_string()));
        };
        if let FunctionKind::Node(f) = function.kind {
            return self.with_depth(|interp| f(args, interp));
        }
        let values: Vec<Value> = args.iter().map(|arg| self.evaluate_node(arg)).collect();
        self.invoke(name, &function, values)
    }

    fn invoke(&mut self, name: &str, function: &FunctionDescriptor, args: Vec<Value>) -> Value {
        if args.iter().any(Value::is_invalid) {
            return Value::Invalid;
        }
        if let Some(expected) = function.arity {
            if expected != args.len() {
                return self.fail(ErrorKind::WrongArgumentCount {
                    name: name.to_string(),
                    expected,
                    found: args.len(),
                });
            }
        }
        tracing::trace!(function = name, args = args.len(), "call");
        self.with_depth(|interp| match &function.kind {
            FunctionKind::Native(f) => f(&args, interp),
            FunctionKind::NativeRef(f) => {
                let mut out = Value::Void;
                f(&mut out, &args, interp);
                out
            }
            FunctionKind::Node(f) => {
                let nodes: Vec<Node> = args.into_iter().map(Node::Constant).collect();
                f(&nodes, interp)
            }
            FunctionKind::User { params, body } => interp.call_user(params, body, args),
        })
    }

    /// Binds parameters in a fresh block; parameterless functions run in the
    /// caller's block.
    fn call_user(&mut self, params: &[String], body: &Node, args: Vec<Value>) -> Value {
        if params.is_empty() {
            return self.evaluate_node(body);
        }
        self.env.enter_block();
        for (param, arg) in params.iter().zip(args) {
            self.env.add_variable(param, arg);
        }
        let result = self.evaluate_node(body);
        self.env.leave_block();
        result
    }

    fn with_depth(&mut self, call: impl FnOnce(&mut Self) -> Value) -> Value {
        if self.depth >= self.config.max_call_depth {
            return self.fail(ErrorKind::CallDepth(self.config.max_call_depth));
        }
        self.depth += 1;
        let result = call(self);
        self.depth -= 1;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    fn eval(source: &str) -> Value {
        let mut interp = Interpreter::new();
        let value = interp.evaluate(source);
        let errors: Vec<_> = interp.errors().iter().collect();
        assert_eq!(interp.error_count(), 0, "errors for {:?}: {:?}", source, errors);
        value
    }

    fn eval_err(source: &str) -> (Value, Vec<ErrorKind>) {
        let mut interp = Interpreter::new();
        let value = interp.evaluate(source);
        (value, interp.errors().iter().map(|e| e.kind.clone()).collect())
    }

    fn dv(v: &[f64]) -> Value {
        Value::DoubleVector(v.to_vec())
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("2 + 3 * 4"), Value::Double(14.0));
        assert_eq!(eval("2^3^2"), Value::Double(64.0));
        assert_eq!(eval("-2^2"), Value::Double(-4.0));
        assert_eq!(eval("7 % 3"), Value::Double(1.0));
        assert_eq!(eval("1 / 0"), Value::Double(f64::INFINITY));
    }

    #[test]
    fn test_variables() {
        let mut interp = Interpreter::new();
        assert_eq!(interp.evaluate("x = 3"), Value::Double(3.0));
        assert_eq!(interp.evaluate("x * 2"), Value::Double(6.0));
        assert_eq!(interp.evaluate("y"), Value::Invalid);
        assert_eq!(
            interp.last_error().map(|e| e.kind.clone()),
            Some(ErrorKind::UndefinedVariable("y".into()))
        );
    }

    #[test]
    fn test_invalid_rhs_is_not_assigned() {
        let mut interp = Interpreter::new();
        interp.evaluate("x = 1");
        assert_eq!(interp.evaluate("x = nosuch + 1"), Value::Invalid);
        assert_eq!(interp.get_variable("x"), Some(Value::Double(1.0)));
        assert_eq!(interp.error_count(), 1);
    }

    #[test]
    fn test_cases() {
        assert_eq!(eval("if(1 < 2, 10, 20)"), Value::Double(10.0));
        assert_eq!(eval("cases(false, 1, true, 2)"), Value::Double(2.0));
        assert_eq!(eval("cases(false, 1, false, 2, 3)"), Value::Double(3.0));
        assert_eq!(eval("cases(false, 1)"), Value::Invalid);
        let (value, errors) = eval_err("if(1, 2, 3)");
        assert_eq!(value, Value::Invalid);
        assert_eq!(errors, vec![ErrorKind::NonBooleanCondition("number")]);
    }

    #[test]
    fn test_ranges() {
        assert_eq!(eval("1:2:7"), dv(&[1.0, 3.0, 5.0, 7.0]));
        assert_eq!(eval("3:-1:1"), dv(&[3.0, 2.0, 1.0]));
        assert_eq!(eval("1:0:5"), dv(&[]));
        assert_eq!(eval("5:1"), dv(&[]));
        assert_eq!(eval("-1:1"), dv(&[-1.0, 0.0, 1.0]));
    }

    #[test]
    fn test_reductions() {
        assert_eq!(eval("sum(x, [1,2,3], x^2)"), Value::Double(14.0));
        assert_eq!(eval("prod(i, 1, 5, i)"), Value::Double(120.0));
        assert_eq!(eval("sum(i, 5, 1, i)"), Value::Double(0.0));
        assert_eq!(eval("prod(i, 5, 1, i)"), Value::Double(1.0));
        assert_eq!(eval("cumsum(i, 1, 4, i)"), dv(&[1.0, 3.0, 6.0, 10.0]));
        assert_eq!(eval("cumprod(i, 1, 2, 5, i)"), dv(&[1.0, 3.0, 15.0]));
        assert_eq!(eval("sum(s, {\"a\", \"b\"}, s)"), Value::from("ab"));
    }

    #[test]
    fn test_for_forms() {
        assert_eq!(eval("for(x, 1, 3, x * 10)"), dv(&[10.0, 20.0, 30.0]));
        assert_eq!(eval("for(x, [1, 2], x > 1)"), Value::BoolVector(vec![false, true]));
        assert_eq!(
            eval("for(x, 1, 2, if(x == 1, \"one\", 2))"),
            Value::List(vec![Value::from("one"), Value::Double(2.0)])
        );
        assert_eq!(eval("for(x, 1, 0, x)"), dv(&[]));
        assert_eq!(eval("defaultfor(x, 1, 0, x, -1)"), Value::Double(-1.0));
        assert_eq!(eval("defaultfor(x, [4], x, -1)"), dv(&[4.0]));
        assert_eq!(eval("filterfor(x, 1, 6, x % 2 == 0)"), dv(&[2.0, 4.0, 6.0]));
        assert_eq!(eval("savefilterfor(x, [1, 2, 3], if(x == 2, 0, x > 1))"), dv(&[3.0]));
    }

    #[test]
    fn test_for_invalid_results() {
        let (value, errors) = eval_err("for(x, [0, 1], [1, 2][x * 5])");
        assert_eq!(value, Value::Invalid);
        assert_eq!(errors.len(), 1);
        let (value, errors) = eval_err("savefor(x, [0, 1], [1, 2][x * 5])");
        assert_eq!(value, dv(&[1.0]));
        assert_eq!(errors.len(), 1);
        let (value, errors) = eval_err("filterfor(x, [1, 2], x)");
        assert_eq!(value, Value::Invalid);
        assert_eq!(errors, vec![ErrorKind::NonBooleanCondition("number")]);
    }

    #[test]
    fn test_loop_variable_is_local() {
        let mut interp = Interpreter::new();
        interp.evaluate("x = 100");
        assert_eq!(interp.evaluate("sum(x, 1, 3, x)"), Value::Double(6.0));
        assert_eq!(interp.get_variable("x"), Some(Value::Double(100.0)));
        interp.evaluate("for(i, 1, 2, tmp = i)");
        assert!(!interp.variable_exists("i"));
        assert!(!interp.variable_exists("tmp"));
    }

    #[test]
    fn test_vectors_and_indexing() {
        assert_eq!(eval("[1, 2, 3][1]"), Value::Double(2.0));
        assert_eq!(eval("v = [10, 20, 30]; v[[0, 2]]"), dv(&[10.0, 30.0]));
        assert_eq!(eval("v = [10, 20, 30]; v[v > 15]"), dv(&[20.0, 30.0]));
        assert_eq!(eval("v = [1]; v[2] = 3; v[2]"), Value::Double(3.0));
        assert_eq!(eval("v = [1, 2]; v[0] = 5"), dv(&[5.0, 2.0]));
        assert_eq!(eval("\"hello\"[1]"), Value::from("e"));
        assert_eq!(eval("{1, \"x\"}[1]"), Value::from("x"));
        let m = eval("[1, 2; 3, 4]");
        assert_eq!(m.shape(), Some((2, 2)));
    }

    #[test]
    fn test_structs() {
        assert_eq!(eval("s = struct(\"a\", 1, \"b\", [2, 3]); s.b[1]"), Value::Double(3.0));
        let (value, errors) = eval_err("s = struct(\"a\", 1); s.c");
        assert_eq!(value, Value::Invalid);
        assert_eq!(errors, vec![ErrorKind::NoSuchMember("c".into())]);
    }

    #[test]
    fn test_user_functions() {
        let mut interp = Interpreter::new();
        assert_eq!(interp.evaluate("f(x, y) = x * y + z"), Value::Void);
        interp.evaluate("z = 1");
        assert_eq!(interp.evaluate("f(2, 3)"), Value::Double(7.0));
        assert!(!interp.variable_exists("x"));
        assert_eq!(
            interp.evaluate("g() = counter = counter + 1; counter = 0; g(); g()"),
            Value::Double(2.0)
        );
        assert_eq!(interp.get_variable("counter"), Some(Value::Double(2.0)));
    }

    #[test]
    fn test_wrong_argument_count() {
        let (value, errors) = eval_err("f(x) = x; f(1, 2)");
        assert_eq!(value, Value::Invalid);
        assert_eq!(
            errors,
            vec![ErrorKind::WrongArgumentCount { name: "f".into(), expected: 1, found: 2 }]
        );
    }

    #[test]
    fn test_call_depth_limit() {
        let config = Config { max_call_depth: 16, ..Config::default() };
        let mut interp = Interpreter::with_config(config);
        interp.evaluate("f(n) = f(n + 1)");
        assert_eq!(interp.evaluate("f(0)"), Value::Invalid);
        let depth_errors = interp.errors().iter().filter(|e| e.kind == ErrorKind::CallDepth(16));
        assert_eq!(depth_errors.count(), 1);
    }

    #[test]
    fn test_recursion_up_to_default_depth() {
        let depth = Config::default().max_call_depth;
        let mut interp = Interpreter::new();
        interp.evaluate("f(n) = if(n <= 0, 0, n + f(n - 1))");
        let deepest = (depth - 1) as f64;
        let expected = deepest * (deepest + 1.0) / 2.0;
        assert_eq!(interp.evaluate(&format!("f({})", depth - 1)), Value::Double(expected));
        assert_eq!(interp.error_count(), 0);

        assert_eq!(interp.evaluate(&format!("f({})", depth)), Value::Invalid);
        let kinds: Vec<ErrorKind> = interp.errors().iter().map(|e| e.kind.clone()).collect();
        assert_eq!(kinds, vec![ErrorKind::CallDepth(depth)]);
    }

    #[test]
    fn test_deep_call_limit_reports_instead_of_overflowing() {
        let config = Config { max_call_depth: 5000, ..Config::default() };
        let mut interp = Interpreter::with_config(config);
        interp.evaluate("g(n) = if(n <= 0, 0, 1 + g(n - 1))");
        assert_eq!(interp.evaluate("g(4000)"), Value::Double(4000.0));
        assert_eq!(interp.evaluate("g(6000)"), Value::Invalid);
        assert_eq!(interp.last_error().map(|e| &e.kind), Some(&ErrorKind::CallDepth(5000)));
    }

    #[test]
    fn test_recursion() {
        let mut interp = Interpreter::new();
        interp.evaluate("fact(n) = if(n <= 1, 1, n * fact(n - 1))");
        assert_eq!(interp.evaluate("fact(5)"), Value::Double(120.0));
    }

    #[test]
    fn test_invalid_argument_short_circuits() {
        let (value, errors) = eval_err("sqrt(nosuch)");
        assert_eq!(value, Value::Invalid);
        assert_eq!(errors, vec![ErrorKind::UndefinedVariable("nosuch".into())]);
    }

    #[test]
    fn test_native_registration() {
        fn add_all(args: &[Value], _: &mut Interpreter) -> Value {
            Value::Double(args.iter().filter_map(Value::as_f64).sum())
        }
        fn fill(out: &mut Value, args: &[Value], _: &mut Interpreter) {
            let x = args.first().and_then(Value::as_f64).unwrap_or(0.0);
            *out = Value::DoubleVector(vec![x; 2]);
        }
        fn count_args(args: &[Node], _: &mut Interpreter) -> Value {
            Value::Double(args.len() as f64)
        }

        let mut interp = Interpreter::new();
        interp.add_function("addall", add_all, None);
        interp.add_ref_function("fill", fill, Some(1));
        interp.add_node_function("nargs", count_args);
        assert_eq!(interp.evaluate("addall(1, 2, 3)"), Value::Double(6.0));
        assert_eq!(interp.evaluate("fill(7)"), dv(&[7.0, 7.0]));
        assert_eq!(interp.evaluate("nargs(undefined1, undefined2)"), Value::Double(2.0));
        assert_eq!(interp.error_count(), 0);
        assert_eq!(
            interp.call_function("addall", vec![Value::Double(2.0), Value::Double(5.0)]),
            Value::Double(7.0)
        );
    }

    #[test]
    fn test_host_variables() {
        let mut interp = Interpreter::new();
        let speed = Rc::new(Cell::new(2.0));
        let flag = Rc::new(Cell::new(false));
        let data = Rc::new(RefCell::new(Value::Void));
        interp.add_host_variable("speed", HostVar::Double(Rc::clone(&speed)));
        interp.add_host_variable("flag", HostVar::Bool(Rc::clone(&flag)));
        interp.add_host_variable("data", HostVar::Value(Rc::clone(&data)));

        interp.evaluate("speed = speed * 3; flag = speed > 5; data = [speed]");
        assert_eq!(speed.get(), 6.0);
        assert!(flag.get());
        assert_eq!(*data.borrow(), dv(&[6.0]));

        assert_eq!(interp.evaluate("speed = \"fast\""), Value::Invalid);
        assert_eq!(speed.get(), 6.0);
        assert!(matches!(
            interp.last_error().map(|e| &e.kind),
            Some(ErrorKind::HostTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_syntax_error_is_not_evaluated() {
        let mut interp = Interpreter::new();
        assert_eq!(interp.evaluate("x = 1; 2 +"), Value::Invalid);
        assert_eq!(interp.error_count(), 1);
        assert!(!interp.variable_exists("x"));
    }

    #[test]
    fn test_error_api() {
        let mut interp = Interpreter::new();
        interp.evaluate("a");
        interp.evaluate("b");
        assert!(interp.has_error_occurred());
        assert_eq!(interp.error_count(), 2);
        assert_eq!(
            interp.first_error().map(|e| e.kind.clone()),
            Some(ErrorKind::UndefinedVariable("a".into()))
        );
        assert_eq!(
            interp.last_error().map(|e| e.kind.clone()),
            Some(ErrorKind::UndefinedVariable("b".into()))
        );
        interp.reset_errors();
        assert!(!interp.has_error_occurred());
    }

    #[test]
    fn test_clear_environment() {
        let mut interp = Interpreter::new();
        interp.evaluate("x = 5; f(a) = a");
        interp.clear_environment();
        assert!(!interp.variable_exists("x"));
        assert!(!interp.function_exists("f"));
        assert!(interp.has_default_functions());
        assert!(interp.has_default_variables());

        let mut bare =
            Interpreter::with_config(Config { register_builtins: false, ..Config::default() });
        assert!(!bare.has_default_functions());
        bare.clear_environment();
        assert!(!bare.has_default_variables());
    }

    #[test]
    fn test_range_values() {
        assert_eq!(range_values(0.0, 0.5, 1.0), Ok(vec![0.0, 0.5, 1.0]));
        assert_eq!(range_values(0.0, f64::NAN, 1.0), Ok(vec![]));
        assert_eq!(range_values(0.0, 1.0, f64::INFINITY), Ok(vec![]));
        assert_eq!(range_values(1e16, 1.0, 1e16 + 4.0), Ok(vec![1e16]));
        assert_eq!(
            range_values(1.0, 1.0, 1e12),
            Err(ErrorKind::VectorTooLong { limit: MAX_VECTOR_LEN })
        );
    }

    #[test]
    fn test_range_iter_is_lazy() {
        let mut range = RangeIter::new(1.0, 1.0, 1e15);
        assert_eq!(range.next(), Some(1.0));
        assert_eq!(range.nth(2), Some(4.0));
    }

    #[test]
    fn test_long_ranges() {
        let (value, errors) = eval_err("1:1e12");
        assert_eq!(value, Value::Invalid);
        assert_eq!(errors, vec![ErrorKind::VectorTooLong { limit: MAX_VECTOR_LEN }]);
        assert_eq!(eval("sum(i, 1e16, 1e16 + 4, i)"), Value::Double(1e16));
        assert_eq!(eval("for(i, 1e16, 1e16 + 4, i)"), dv(&[1e16]));
    }
}
