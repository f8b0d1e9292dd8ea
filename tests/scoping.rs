use std::cell::Cell;
use std::rc::Rc;

use mathexpr::{Config, HostVar, Interpreter, Value};

#[test]
fn test_loop_variable_shadows_and_disappears() {
    let mut interp = Interpreter::new();
    interp.evaluate("k = -1");
    assert_eq!(interp.evaluate("sum(k, 1, 3, k)"), Value::Double(6.0));
    assert_eq!(interp.get_variable("k"), Some(Value::Double(-1.0)));
    interp.evaluate("for(j, 1, 3, j)");
    assert!(!interp.variable_exists("j"));
}

#[test]
fn test_parameters_are_local() {
    let mut interp = Interpreter::new();
    interp.evaluate("a = 10; f(a) = a * 2");
    assert_eq!(interp.evaluate("f(3)"), Value::Double(6.0));
    assert_eq!(interp.get_variable("a"), Some(Value::Double(10.0)));
}

#[test]
fn test_assignment_in_loop_body_updates_outer() {
    let mut interp = Interpreter::new();
    interp.evaluate("total = 0");
    interp.evaluate("for(k, 1, 4, total = total + k)");
    assert_eq!(interp.get_variable("total"), Some(Value::Double(10.0)));
}

#[test]
fn test_nested_loops_see_outer_variable() {
    let mut interp = Interpreter::new();
    assert_eq!(interp.evaluate("sum(i, 1, 3, sum(j, 1, i, j))"), Value::Double(10.0));
    assert_eq!(interp.error_count(), 0);
}

#[test]
fn test_functions_see_caller_variables() {
    let mut interp = Interpreter::new();
    interp.evaluate("g(x) = x + offset");
    assert_eq!(interp.evaluate("sum(offset, 1, 2, g(0))"), Value::Double(3.0));
    assert!(!interp.variable_exists("offset"));
}

#[test]
fn test_redefinition_replaces() {
    let mut interp = Interpreter::new();
    interp.evaluate("f(x) = x + 1");
    interp.evaluate("f(x) = x + 2");
    assert_eq!(interp.evaluate("f(1)"), Value::Double(3.0));
    interp.evaluate("pi = 3");
    assert_eq!(interp.get_variable("pi"), Some(Value::Double(3.0)));
}

#[test]
fn test_host_variable_visible_to_both_backends() {
    let mut interp = Interpreter::new();
    let gain = Rc::new(Cell::new(1.5));
    interp.add_host_variable("gain", HostVar::Double(Rc::clone(&gain)));

    assert_eq!(interp.evaluate("gain * 2"), Value::Double(3.0));

    let node = interp.parse("gain = gain * 4");
    let program = interp.compile(&node).unwrap();
    assert_eq!(interp.run(&program), 6.0);
    assert_eq!(gain.get(), 6.0);

    gain.set(0.5);
    assert_eq!(interp.run(&program), 2.0);
    assert_eq!(interp.evaluate("gain"), Value::Double(2.0));
}

#[test]
fn test_without_builtins() {
    let mut interp =
        Interpreter::with_config(Config { register_builtins: false, ..Config::default() });
    assert_eq!(interp.evaluate("sin(0)"), Value::Invalid);
    assert_eq!(interp.evaluate("pi"), Value::Invalid);
    assert_eq!(interp.error_count(), 2);
}
