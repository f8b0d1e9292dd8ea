use mathexpr::{evaluate, ErrorKind, Interpreter, Value};
use pretty_assertions::assert_eq;

fn run(source: &str) -> Value {
    evaluate(source).unwrap_or_else(|e| panic!("{} failed: {}", source, e))
}

fn dv(v: &[f64]) -> Value {
    Value::DoubleVector(v.to_vec())
}

#[test]
fn test_number_literals() {
    assert_eq!(run("0x1F"), Value::Double(31.0));
    assert_eq!(run("0b101"), Value::Double(5.0));
    assert_eq!(run("0o17"), Value::Double(15.0));
    assert_eq!(run("1.5e-3"), Value::Double(0.0015));
    assert_eq!(run("nan == nan"), Value::Bool(false));
    assert_eq!(run("nan != nan"), Value::Bool(true));
    assert_eq!(run("ninf < -1e308"), Value::Bool(true));
}

#[test]
fn test_precedence() {
    assert_eq!(run("2 + 3 * 4"), Value::Double(14.0));
    assert_eq!(run("(2 + 3) * 4"), Value::Double(20.0));
    assert_eq!(run("2 ^ 3 ^ 2"), Value::Double(64.0));
    assert_eq!(run("1 + 2 < 4 and 3 > 2"), Value::Bool(true));
    assert_eq!(run("10 - 4 - 3"), Value::Double(3.0));
}

#[test]
fn test_strings() {
    assert_eq!(run("\"ab\" + \"cd\""), Value::from("abcd"));
    assert_eq!(run("\"a\\tb\""), Value::from("a\tb"));
    assert_eq!(run("\"abc\" < \"abd\""), Value::Bool(true));
    assert_eq!(run("length(\"hello\")"), Value::Double(5.0));
}

#[test]
fn test_vectors_and_matrices() {
    assert_eq!(run("1:2:7"), dv(&[1.0, 3.0, 5.0, 7.0]));
    assert_eq!(run("-1:1"), dv(&[-1.0, 0.0, 1.0]));
    assert_eq!(run("-(1:3)"), dv(&[-1.0, -2.0, -3.0]));
    assert_eq!(run("[1, 2] + [10, 20]"), dv(&[11.0, 22.0]));
    assert_eq!(run("[1, 2] * 2"), dv(&[2.0, 4.0]));
    assert_eq!(run("[1:3, 9]"), dv(&[1.0, 2.0, 3.0, 9.0]));
    assert_eq!(run("[1, 2; 3, 4]").shape(), Some((2, 2)));
    assert_eq!(run("([1, 2; 3, 4] * 10)[3]"), Value::Double(40.0));
    assert_eq!(run("[1, 2, 3] > 1"), Value::BoolVector(vec![false, true, true]));
}

#[test]
fn test_matrix_row_mismatch_is_syntax_error() {
    let err = evaluate("[1, 2; 3]").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MatrixRowLength { row: 1, expected: 2, found: 1 }));
}

#[test]
fn test_loops() {
    assert_eq!(run("sum(x, [1, 2, 3], x^2)"), Value::Double(14.0));
    assert_eq!(run("prod(k, 1, 4, k)"), Value::Double(24.0));
    assert_eq!(run("for(k, 1, 3, k * k)"), dv(&[1.0, 4.0, 9.0]));
    assert_eq!(run("filterfor(k, 1:10, k % 3 == 0)"), dv(&[3.0, 6.0, 9.0]));
    assert_eq!(run("defaultfor(k, [], k, 42)"), Value::Double(42.0));
    assert_eq!(run("cumsum(k, [1, 1, 1], k)"), dv(&[1.0, 2.0, 3.0]));
}

#[test]
fn test_functions() {
    assert_eq!(run("sq(x) = x * x; sq(7)"), Value::Double(49.0));
    assert_eq!(run("fib(n) = if(n < 2, n, fib(n - 1) + fib(n - 2)); fib(10)"), Value::Double(55.0));
    assert_eq!(run("sqrt(abs(-16))"), Value::Double(4.0));
    assert_eq!(run("typeof(struct(\"a\", 1))"), Value::from("struct"));
}

#[test]
fn test_lists_and_structs() {
    assert_eq!(run("{1, \"two\", [3]}[2]"), dv(&[3.0]));
    assert_eq!(run("p = struct(\"x\", 3, \"y\", 4); sqrt(p.x^2 + p.y^2)"), Value::Double(5.0));
    assert_eq!(run("tostring({1, \"a\"})"), Value::from("{1, \"a\"}"));
}

#[test]
fn test_element_assignment() {
    assert_eq!(run("v = [1, 2, 3]; v[1] = 20; v"), dv(&[1.0, 20.0, 3.0]));
    assert_eq!(run("v = [1, 2, 3]; v[v > 1] = 0; v"), dv(&[1.0, 0.0, 0.0]));
    let err = evaluate("w[0] = 1").unwrap_err();
    assert_eq!(err.kind, ErrorKind::UndefinedVariable("w".into()));
}

#[test]
fn test_element_assignment_far_out_of_range() {
    for index in ["1e300", "inf", "1e12"] {
        let mut interp = Interpreter::new();
        let value = interp.evaluate(&format!("v = [1]; v[{}] = 2", index));
        assert_eq!(value, Value::Invalid, "{}", index);
        let kind = interp.last_error().map(|e| &e.kind);
        assert!(matches!(kind, Some(ErrorKind::IndexOutOfRange { .. })), "{}: {:?}", index, kind);
        assert_eq!(interp.get_variable("v"), Some(dv(&[1.0])));
    }
}

#[test]
fn test_deterministic_evaluation() {
    let mut interp = Interpreter::new();
    let source = "sum(k, 1, 20, sin(k) * k) + [1, 2][1]";
    let first = interp.evaluate(source);
    let second = interp.evaluate(source);
    assert_eq!(first, second);
    assert_eq!(interp.error_count(), 0);
}

#[test]
fn test_invalid_is_sticky() {
    let mut interp = Interpreter::new();
    assert_eq!(interp.evaluate("1 + [1, 2][5] * 3 - 2"), Value::Invalid);
    assert_eq!(interp.error_count(), 1);
}

#[test]
fn test_type_errors() {
    let mut interp = Interpreter::new();
    assert_eq!(interp.evaluate("\"a\" - 1"), Value::Invalid);
    assert!(matches!(
        interp.last_error().map(|e| &e.kind),
        Some(ErrorKind::OperatorType { op: "-", .. })
    ));
    assert_eq!(interp.evaluate("[1, 2] + [1, 2, 3]"), Value::Invalid);
    assert!(matches!(interp.last_error().map(|e| &e.kind), Some(ErrorKind::LengthMismatch { .. })));
}
