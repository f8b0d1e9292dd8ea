//! Default function and constant catalog
//!
//! Registered on every interpreter unless `register_builtins` is off. The
//! scalar math functions carry a simple fast path so compiled programs call
//! them without boxing their arguments.

use std::collections::BTreeMap;
use std::f64::consts;

use crate::ast::{BinaryOp, Node};
use crate::environment::{SimpleFn, SimpleFns};
use crate::error::ErrorKind;
use crate::interpreter::Interpreter;
use crate::value::Value;

/// Registers a one-argument numeric function, elementwise over vectors and
/// matrices, plus its `F1` fast path.
macro_rules! unary_math {
    ($interp:expr, $( $name:literal => $f:expr ),* $(,)?) => {
        $({
            fn native(args: &[Value], interp: &mut Interpreter) -> Value {
                match args {
                    [x] => elementwise($name, x, $f, interp),
                    _ => Value::Invalid,
                }
            }
            let simple = SimpleFns::new().with(SimpleFn::F1($f));
            $interp.add_function_with_simple($name, native, Some(1), simple);
        })*
    };
}

/// Same for two-argument functions with an `F2` fast path.
macro_rules! binary_math {
    ($interp:expr, $( $name:literal => $f:expr ),* $(,)?) => {
        $({
            fn native(args: &[Value], interp: &mut Interpreter) -> Value {
                match args {
                    [a, b] => {
                        let result = a.zip_numbers($name, b, $f);
                        interp.check_result(result)
                    }
                    _ => Value::Invalid,
                }
            }
            let simple = SimpleFns::new().with(SimpleFn::F2($f));
            $interp.add_function_with_simple($name, native, Some(2), simple);
        })*
    };
}

pub fn register(interp: &mut Interpreter) {
    unary_math!(interp,
        "sin" => f64::sin,
        "cos" => f64::cos,
        "tan" => f64::tan,
        "asin" => f64::asin,
        "acos" => f64::acos,
        "atan" => f64::atan,
        "exp" => f64::exp,
        "log" => f64::ln,
        "log10" => f64::log10,
        "sqrt" => f64::sqrt,
        "abs" => f64::abs,
        "floor" => f64::floor,
        "ceil" => f64::ceil,
        "round" => f64::round,
        "trunc" => f64::trunc,
    );
    binary_math!(interp,
        "atan2" => f64::atan2,
        "min" => f64::min,
        "max" => f64::max,
    );

    interp.add_function("length", length, Some(1));
    interp.add_function("sum", sum, Some(1));
    interp.add_function("prod", prod, Some(1));
    interp.add_function("cumsum", cumsum, Some(1));
    interp.add_function("cumprod", cumprod, Some(1));
    interp.add_function("typeof", type_of, Some(1));
    interp.add_function("tostring", to_string, Some(1));
    interp.add_function("struct", make_struct, None);
    interp.add_node_function("varname", varname);

    interp.add_variable("pi", consts::PI);
    interp.add_variable("e", consts::E);
}

fn elementwise(name: &str, x: &Value, f: fn(f64) -> f64, interp: &mut Interpreter) -> Value {
    if x.is_invalid() {
        return Value::Invalid;
    }
    match x.map_numbers(f) {
        Some(value) => value,
        None => {
            let message = format!("{}() expects numbers, got {}", name, x.type_name());
            interp.report(ErrorKind::Function(message));
            Value::Invalid
        }
    }
}

fn length(args: &[Value], _: &mut Interpreter) -> Value {
    Value::Double(args.first().map_or(0, Value::len) as f64)
}

// ==================== Reductions ====================

/// Folds the items of `v` with `op`, optionally keeping every partial result.
fn fold(
    name: &str,
    args: &[Value],
    op: BinaryOp,
    empty: f64,
    running: bool,
    interp: &mut Interpreter,
) -> Value {
    let Some(v) = args.first() else {
        return Value::Invalid;
    };
    let Some(items) = v.items() else {
        interp.report(ErrorKind::Function(format!("{}() cannot reduce {}", name, v.type_name())));
        return Value::Invalid;
    };

    let mut acc: Option<Value> = None;
    let mut steps = Vec::new();
    for item in items {
        let next = match acc.take() {
            None => item,
            Some(acc) => {
                let folded = acc.binary(op, &item);
                interp.check_result(folded)
            }
        };
        if next.is_invalid() {
            return Value::Invalid;
        }
        if running {
            steps.push(next.clone());
        }
        acc = Some(next);
    }

    if running {
        Value::collect_items(steps)
    } else {
        acc.unwrap_or(Value::Double(empty))
    }
}

fn sum(args: &[Value], interp: &mut Interpreter) -> Value {
    fold("sum", args, BinaryOp::Add, 0.0, false, interp)
}

fn prod(args: &[Value], interp: &mut Interpreter) -> Value {
    fold("prod", args, BinaryOp::Mul, 1.0, false, interp)
}

fn cumsum(args: &[Value], interp: &mut Interpreter) -> Value {
    fold("cumsum", args, BinaryOp::Add, 0.0, true, interp)
}

fn cumprod(args: &[Value], interp: &mut Interpreter) -> Value {
    fold("cumprod", args, BinaryOp::Mul, 1.0, true, interp)
}

// ==================== Introspection ====================

fn type_of(args: &[Value], _: &mut Interpreter) -> Value {
    Value::from(args.first().map_or("void", Value::type_name))
}

fn to_string(args: &[Value], _: &mut Interpreter) -> Value {
    Value::String(args.first().map(ToString::to_string).unwrap_or_default())
}

/// `struct("a", 1, "b", 2)`
fn make_struct(args: &[Value], interp: &mut Interpreter) -> Value {
    if args.len() % 2 != 0 {
        interp.report(ErrorKind::Function("struct() expects name/value pairs".to_string()));
        return Value::Invalid;
    }
    let mut members = BTreeMap::new();
    for pair in args.chunks(2) {
        let [name, value] = pair else { continue };
        let Some(name) = name.as_str() else {
            let message =
                format!("struct() member names must be strings, got {}", name.type_name());
            interp.report(ErrorKind::Function(message));
            return Value::Invalid;
        };
        members.insert(name.to_string(), value.clone());
    }
    Value::Struct(members)
}

/// The name of a variable argument, without evaluating it
fn varname(args: &[Node], interp: &mut Interpreter) -> Value {
    match args {
        [Node::Variable(name)] => Value::String(name.clone()),
        _ => {
            interp.report(ErrorKind::Function("varname() expects a single variable".to_string()));
            Value::Invalid
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn eval(source: &str) -> Value {
        let mut interp = Interpreter::new();
        let value = interp.evaluate(source);
        assert_eq!(interp.error_count(), 0, "errors for {:?}", source);
        value
    }

    #[test]
    fn test_unary_math() {
        assert_eq!(eval("sqrt(16)"), Value::Double(4.0));
        assert_eq!(eval("abs(-2.5)"), Value::Double(2.5));
        assert_eq!(eval("floor(2.7) + ceil(2.1)"), Value::Double(5.0));
        assert_eq!(eval("round(-2.5)"), Value::Double(-3.0));
        assert_eq!(eval("log(exp(0))"), Value::Double(0.0));
        assert_eq!(eval("sqrt([4, 9])"), Value::DoubleVector(vec![2.0, 3.0]));
        assert_eq!(eval("abs([-1, 2; -3, 4])").shape(), Some((2, 2)));
    }

    #[test]
    fn test_binary_math() {
        assert_eq!(eval("min(3, 4)"), Value::Double(3.0));
        assert_eq!(eval("max([1, 5], 3)"), Value::DoubleVector(vec![3.0, 5.0]));
        assert_eq!(eval("atan2(0, 1)"), Value::Double(0.0));
    }

    #[test]
    fn test_reductions() {
        assert_eq!(eval("sum([1, 2, 3])"), Value::Double(6.0));
        assert_eq!(eval("prod([2, 3, 4])"), Value::Double(24.0));
        assert_eq!(eval("sum([])"), Value::Double(0.0));
        assert_eq!(eval("prod([])"), Value::Double(1.0));
        assert_eq!(eval("cumsum([1, 2, 3])"), Value::DoubleVector(vec![1.0, 3.0, 6.0]));
        assert_eq!(eval("cumprod(1:4)"), Value::DoubleVector(vec![1.0, 2.0, 6.0, 24.0]));
    }

    #[test]
    fn test_introspection() {
        assert_eq!(eval("length([1, 2, 3])"), Value::Double(3.0));
        assert_eq!(eval("length(\"abcd\")"), Value::Double(4.0));
        assert_eq!(eval("typeof(1)"), Value::from("number"));
        assert_eq!(eval("typeof({1})"), Value::from("list"));
        assert_eq!(eval("tostring([1, 2])"), Value::from("[1, 2]"));
        assert_eq!(eval("varname(anything)"), Value::from("anything"));
        assert_eq!(eval("struct(\"b\", 2, \"a\", 1)").to_string(), "{a: 1, b: 2}");
    }

    #[test]
    fn test_constants() {
        assert_eq!(eval("pi"), Value::Double(consts::PI));
        assert_eq!(eval("e"), Value::Double(consts::E));
    }

    #[test]
    fn test_builtin_errors() {
        let mut interp = Interpreter::new();
        assert_eq!(interp.evaluate("sqrt(\"x\")"), Value::Invalid);
        assert_eq!(interp.evaluate("struct(\"a\")"), Value::Invalid);
        assert_eq!(interp.evaluate("struct(1, 2)"), Value::Invalid);
        assert_eq!(interp.evaluate("varname(1 + 2)"), Value::Invalid);
        assert_eq!(interp.evaluate("min([1, 2], [1, 2, 3])"), Value::Invalid);
        assert_eq!(interp.error_count(), 5);
    }

    #[test]
    fn test_fast_paths_registered() {
        let interp = Interpreter::new();
        let sin = interp.environment().function("sin").unwrap();
        assert!(sin.simple.get(1).is_some());
        let max = interp.environment().function("max").unwrap();
        assert!(max.simple.get(2).is_some());
        let length = interp.environment().function("length").unwrap();
        assert!(length.simple.is_empty());
    }
}
