//! Compiler: AST → Bytecode
//!
//! Lowers the numeric subset of the language to a [`Program`]. Supported
//! are number and bool constants, operators, assignments, `if`/`cases`,
//! `sum`/`prod` over ranges, statement lists and calls. Function definitions
//! inside the compiled formula are inlined at their call sites; everything
//! else is called through the interpreter.

use std::cell::Cell;
use std::rc::Rc;

use crate::ast::{BinaryOp, CompareOp, LogicalOp, LoopKind, LoopSource, Node, UnaryOp};
use crate::bytecode::{ByteCodeEnvironment, ColocatedFunction, Instruction, Program};
use crate::environment::Environment;
use crate::error::{ErrorKind, Result};
use crate::stack::ensure_sufficient_stack;
use crate::value::Value;

/// Where a pending jump should land
#[derive(Debug, Clone, Copy)]
enum JumpTarget {
    Case(usize),
    Else,
    End,
}

/// The bytecode compiler
pub struct Compiler<'env> {
    env: &'env Environment,
    locals: ByteCodeEnvironment,
    program: Program,
}

impl<'env> Compiler<'env> {
    pub fn new(env: &'env Environment) -> Self {
        Self { env, locals: ByteCodeEnvironment::new(), program: Program::new() }
    }

    /// Compiles `node`. The program leaves exactly one number on the stack.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn compile(mut self, node: &Node) -> Result<Program> {
        self.compile_node(node)?;
        self.program.heap_size = self.locals.heap_size();
        tracing::debug!(
            instructions = self.program.len(),
            heap = self.program.heap_size,
            "compiled"
        );
        Ok(self.program)
    }

    fn emit(&mut self, instruction: Instruction) -> usize {
        self.program.emit(instruction)
    }

    fn compile_node(&mut self, node: &Node) -> Result<()> {
        ensure_sufficient_stack(|| self.lower(node))
    }

    fn lower(&mut self, node: &Node) -> Result<()> {
        match node {
            Node::Constant(Value::Double(d)) => {
                self.emit(Instruction::Constant(*d));
            }
            Node::Constant(Value::Bool(b)) => {
                self.emit(Instruction::Constant(if *b { 1.0 } else { 0.0 }));
            }
            Node::Variable(name) => self.compile_read(name)?,
            Node::Unary { op, operand } => {
                self.compile_node(operand)?;
                self.emit(match op {
                    UnaryOp::Neg => Instruction::Neg,
                    UnaryOp::Not => Instruction::Not,
                    UnaryOp::BitNot => Instruction::BitNot,
                });
            }
            Node::Binary { op, left, right } => {
                self.compile_node(left)?;
                self.compile_node(right)?;
                self.emit(match op {
                    BinaryOp::Add => Instruction::Add,
                    BinaryOp::Sub => Instruction::Sub,
                    BinaryOp::Mul => Instruction::Mul,
                    BinaryOp::Div => Instruction::Div,
                    BinaryOp::Mod => Instruction::Mod,
                    BinaryOp::Pow => Instruction::Pow,
                    BinaryOp::BitAnd => Instruction::BitAnd,
                    BinaryOp::BitOr => Instruction::BitOr,
                });
            }
            Node::Compare { op, left, right } => {
                self.compile_node(left)?;
                self.compile_node(right)?;
                self.emit(match op {
                    CompareOp::Eq => Instruction::Eq,
                    CompareOp::Ne => Instruction::Ne,
                    CompareOp::Lt => Instruction::Lt,
                    CompareOp::Le => Instruction::Le,
                    CompareOp::Gt => Instruction::Gt,
                    CompareOp::Ge => Instruction::Ge,
                });
            }
            Node::Logical { op, left, right } => {
                self.compile_node(left)?;
                self.compile_node(right)?;
                self.emit(match op {
                    LogicalOp::And => Instruction::And,
                    LogicalOp::Or => Instruction::Or,
                    LogicalOp::Xor => Instruction::Xor,
                    LogicalOp::Nor => Instruction::Nor,
                    LogicalOp::Nand => Instruction::Nand,
                });
            }
            Node::Assign { name, value } => {
                self.compile_node(value)?;
                self.emit(Instruction::Dup);
                self.compile_write(name)?;
            }
            Node::Cases { branches, otherwise } => {
                self.compile_cases(branches, otherwise.as_deref())?
            }
            Node::VectorOperation {
                kind: kind @ (LoopKind::Sum | LoopKind::Prod),
                var,
                source: LoopSource::Range { start, delta, end },
                body,
                ..
            } => self.compile_loop(*kind, var, start, delta.as_deref(), end, body)?,
            Node::NodeList(nodes) => {
                if nodes.is_empty() {
                    self.emit(Instruction::Constant(f64::NAN));
                }
                for (i, node) in nodes.iter().enumerate() {
                    if i > 0 {
                        self.emit(Instruction::Pop);
                    }
                    self.compile_node(node)?;
                }
            }
            Node::FunctionAssign { name, params, body } => {
                self.locals.define_function(name, params.clone(), Rc::clone(body));
                self.emit(Instruction::Constant(f64::NAN));
            }
            Node::FunctionCall { name, args } => self.compile_call(name, args)?,
            other => return Err(ErrorKind::UnsupportedNode(other.kind_name()).into()),
        }
        Ok(())
    }

    // ==================== Variables ====================

    fn compile_read(&mut self, name: &str) -> Result<()> {
        if let Some(slot) = self.locals.lookup(name) {
            self.emit(Instruction::HeapRead(slot));
            return Ok(());
        }
        let cell = self.global_cell(name)?;
        self.emit(Instruction::VarRead(cell));
        Ok(())
    }

    fn compile_write(&mut self, name: &str) -> Result<()> {
        if let Some(slot) = self.locals.lookup(name) {
            self.emit(Instruction::HeapWrite(slot));
            return Ok(());
        }
        if !self.env.variable_exists(name) {
            let slot = self.locals.temporary(name);
            self.emit(Instruction::HeapWrite(slot));
            return Ok(());
        }
        let cell = self.global_cell(name)?;
        self.emit(Instruction::VarWrite(cell));
        Ok(())
    }

    /// The shared cell of a top-level numeric variable
    fn global_cell(&self, name: &str) -> Result<Rc<Cell<f64>>> {
        match self.env.variable_with_level(name) {
            None => Err(ErrorKind::UndefinedVariable(name.to_string()).into()),
            Some((_, level)) if level != 0 => {
                Err(ErrorKind::NonTopLevelVariable(name.to_string()).into())
            }
            Some((var, _)) => var
                .numeric_cell()
                .ok_or_else(|| ErrorKind::NonNumericVariable(name.to_string()).into()),
        }
    }

    // ==================== Control flow ====================

    /// `cond; NOT; JUMP_COND_REL next; value; JUMP_REL end` per case, then
    /// the else value or NaN.
    fn compile_cases(&mut self, branches: &[(Node, Node)], otherwise: Option<&Node>) -> Result<()> {
        let mut fixups: Vec<(usize, JumpTarget)> = Vec::new();
        let mut case_starts = Vec::with_capacity(branches.len());

        for (i, (cond, value)) in branches.iter().enumerate() {
            case_starts.push(self.program.len());
            self.compile_node(cond)?;
            self.emit(Instruction::Not);
            let skip = self.emit(Instruction::JumpCondRel(0));
            let next =
                if i + 1 < branches.len() { JumpTarget::Case(i + 1) } else { JumpTarget::Else };
            fixups.push((skip, next));
            self.compile_node(value)?;
            let done = self.emit(Instruction::JumpRel(0));
            fixups.push((done, JumpTarget::End));
        }

        let else_start = self.program.len();
        match otherwise {
            Some(node) => self.compile_node(node)?,
            None => {
                self.emit(Instruction::Constant(f64::NAN));
            }
        }
        let end = self.program.len();

        for (at, target) in fixups {
            let address = match target {
                JumpTarget::Case(i) => case_starts[i],
                JumpTarget::Else => else_start,
                JumpTarget::End => end,
            };
            self.program.patch_jump(at, address);
        }
        Ok(())
    }

    /// `sum`/`prod` over `start:delta:end`. The accumulator stays on the
    /// stack; bounds and the loop variable live in heap slots.
    fn compile_loop(
        &mut self,
        kind: LoopKind,
        var: &str,
        start: &Node,
        delta: Option<&Node>,
        end: &Node,
        body: &Node,
    ) -> Result<()> {
        let (seed, fold) = match kind {
            LoopKind::Prod => (1.0, Instruction::Mul),
            _ => (0.0, Instruction::Add),
        };
        self.emit(Instruction::Constant(seed));

        let stop = self.locals.anonymous();
        self.compile_node(end)?;
        self.emit(Instruction::HeapWrite(stop));

        let step = self.locals.anonymous();
        match delta {
            Some(node) => self.compile_node(node)?,
            None => {
                self.emit(Instruction::Constant(1.0));
            }
        }
        self.emit(Instruction::HeapWrite(step));

        self.compile_node(start)?;
        let run = self.locals.push_var(var);
        self.emit(Instruction::HeapWrite(run));

        // Nested loops run again, so the previous position is reset here
        let previous = self.locals.anonymous();
        self.emit(Instruction::Constant(f64::NAN));
        self.emit(Instruction::HeapWrite(previous));

        // Same condition as `range_continues`:
        // finite(t) && finite(end) && t != previous && delta != 0 && (end - t) * delta >= 0
        let head = self.program.len();
        self.emit_finite(run);
        self.emit_finite(stop);
        self.emit(Instruction::And);
        self.emit(Instruction::HeapRead(run));
        self.emit(Instruction::HeapRead(previous));
        self.emit(Instruction::Ne);
        self.emit(Instruction::And);
        self.emit(Instruction::HeapRead(step));
        self.emit(Instruction::Constant(0.0));
        self.emit(Instruction::Ne);
        self.emit(Instruction::And);
        self.emit(Instruction::HeapRead(stop));
        self.emit(Instruction::HeapRead(run));
        self.emit(Instruction::Sub);
        self.emit(Instruction::HeapRead(step));
        self.emit(Instruction::Mul);
        self.emit(Instruction::Constant(0.0));
        self.emit(Instruction::Ge);
        self.emit(Instruction::And);
        self.emit(Instruction::Not);
        let exit = self.emit(Instruction::JumpCondRel(0));

        let body_result = self.compile_node(body);
        self.locals.pop_var();
        body_result?;
        self.emit(fold);

        self.emit(Instruction::HeapRead(run));
        self.emit(Instruction::HeapWrite(previous));
        self.emit(Instruction::HeapRead(run));
        self.emit(Instruction::HeapRead(step));
        self.emit(Instruction::Add);
        self.emit(Instruction::HeapWrite(run));
        let back = self.emit(Instruction::JumpRel(0));
        self.program.patch_jump(back, head);
        self.program.patch_jump(exit, self.program.len());
        Ok(())
    }

    /// Pushes 1 when the slot holds a finite number: `x - x` is 0 only then.
    fn emit_finite(&mut self, slot: usize) {
        self.emit(Instruction::HeapRead(slot));
        self.emit(Instruction::HeapRead(slot));
        self.emit(Instruction::Sub);
        self.emit(Instruction::Constant(0.0));
        self.emit(Instruction::Eq);
    }

    // ==================== Calls ====================

    fn compile_call(&mut self, name: &str, args: &[Node]) -> Result<()> {
        if let Some(function) = self.locals.function(name).cloned() {
            if !self.locals.begin_call(name) {
                return Err(ErrorKind::RecursiveCall(name.to_string()).into());
            }
            let result = self.inline_call(name, &function, args);
            self.locals.end_call();
            return result;
        }

        let env = self.env;
        let Some(function) = env.function(name) else {
            return Err(ErrorKind::UndefinedFunction(name.to_string()).into());
        };
        if let Some(expected) = function.arity {
            if expected != args.len() {
                return Err(ErrorKind::WrongArgumentCount {
                    name: name.to_string(),
                    expected,
                    found: args.len(),
                }
                .into());
            }
        }

        for arg in args {
            self.compile_node(arg)?;
        }
        if let Some(f) = function.simple.get(args.len()) {
            self.emit(Instruction::CallSimple(f));
        } else if let Some(f) = function.simple.get_ctx(args.len()) {
            self.emit(Instruction::CallSimpleCtx(f));
        } else {
            self.emit(Instruction::CallResult { name: name.to_string(), arity: args.len() });
        }
        Ok(())
    }

    /// Arguments are evaluated before any parameter is bound, then written
    /// to fresh slots in reverse order.
    fn inline_call(
        &mut self,
        name: &str,
        function: &ColocatedFunction,
        args: &[Node],
    ) -> Result<()> {
        if function.params.len() != args.len() {
            return Err(ErrorKind::WrongArgumentCount {
                name: name.to_string(),
                expected: function.params.len(),
                found: args.len(),
            }
            .into());
        }
        for arg in args {
            self.compile_node(arg)?;
        }
        let slots: Vec<usize> = function.params.iter().map(|p| self.locals.push_var(p)).collect();
        for &slot in slots.iter().rev() {
            self.emit(Instruction::HeapWrite(slot));
        }
        let result = self.compile_node(&function.body);
        for _ in &slots {
            self.locals.pop_var();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn compile_with(env: &Environment, source: &str) -> Result<Program> {
        let (node, errors) = parse(source);
        assert!(errors.is_empty(), "syntax errors: {:?}", errors);
        Compiler::new(env).compile(&node)
    }

    fn compile(source: &str) -> Result<Program> {
        compile_with(&Environment::new(), source)
    }

    fn compile_error(source: &str) -> ErrorKind {
        match compile(source) {
            Ok(program) => panic!("expected compile error, got {}", program),
            Err(error) => error.kind,
        }
    }

    #[test]
    fn test_compile_binary_op() {
        let program = compile("1 + 2 * 3").unwrap();
        assert!(matches!(
            program.code.as_slice(),
            [
                Instruction::Constant(_),
                Instruction::Constant(_),
                Instruction::Constant(_),
                Instruction::Mul,
                Instruction::Add
            ]
        ));
    }

    #[test]
    fn test_assignment_uses_temporary() {
        let program = compile("t = 4; t * t").unwrap();
        assert_eq!(program.heap_size, 1);
        assert!(matches!(
            program.code.as_slice(),
            [
                Instruction::Constant(_),
                Instruction::Dup,
                Instruction::HeapWrite(0),
                Instruction::Pop,
                Instruction::HeapRead(0),
                Instruction::HeapRead(0),
                Instruction::Mul
            ]
        ));
    }

    #[test]
    fn test_global_variables() {
        let mut env = Environment::new();
        env.add_variable("x", Value::Double(2.0));
        env.add_variable("name", Value::from("text"));
        let program = compile_with(&env, "x = x + 1").unwrap();
        assert!(matches!(program.code[0], Instruction::VarRead(_)));
        assert!(matches!(program.code.last(), Some(Instruction::VarWrite(_))));

        let err = compile_with(&env, "name + 1").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NonNumericVariable("name".into()));

        env.enter_block();
        env.add_variable("local", Value::Double(1.0));
        let err = compile_with(&env, "local").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NonTopLevelVariable("local".into()));
    }

    #[test]
    fn test_cases_jumps() {
        let program = compile("if(true, 1, 2)").unwrap();
        // CONSTANT, NOT, JUMP_COND_REL, CONSTANT, JUMP_REL, CONSTANT
        assert!(matches!(program.code[2], Instruction::JumpCondRel(3)));
        assert!(matches!(program.code[4], Instruction::JumpRel(2)));
    }

    #[test]
    fn test_loop_slots() {
        let program = compile("sum(i, 1, 10, i)").unwrap();
        // stop, delta, loop variable, previous position
        assert_eq!(program.heap_size, 4);
        assert!(matches!(program.code.last(), Some(Instruction::JumpRel(o)) if *o < 0));
    }

    #[test]
    fn test_inline_function() {
        let program = compile("sq(x) = x * x; sq(3)").unwrap();
        assert!(!program.code.iter().any(|i| matches!(i, Instruction::CallResult { .. })));
        assert_eq!(program.heap_size, 1);
    }

    #[test]
    fn test_compile_errors() {
        assert_eq!(compile_error("\"text\""), ErrorKind::UnsupportedNode("constant"));
        assert_eq!(compile_error("[1, 2]"), ErrorKind::UnsupportedNode("vector literal"));
        assert_eq!(compile_error("for(i, 1, 3, i)"), ErrorKind::UnsupportedNode("loop"));
        assert_eq!(compile_error("nosuch + 1"), ErrorKind::UndefinedVariable("nosuch".into()));
        assert_eq!(compile_error("nosuch(1)"), ErrorKind::UndefinedFunction("nosuch".into()));
        assert_eq!(compile_error("f(x) = f(x); f(1)"), ErrorKind::RecursiveCall("f".into()));
        assert_eq!(
            compile_error("f(x) = x; f(1, 2)"),
            ErrorKind::WrongArgumentCount { name: "f".into(), expected: 1, found: 2 }
        );
    }

    #[test]
    fn test_loop_variable_not_visible_after() {
        assert_eq!(compile_error("sum(i, 1, 3, i) + i"), ErrorKind::UndefinedVariable("i".into()));
    }
}
