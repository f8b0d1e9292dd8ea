//! Stack-based virtual machine for compiled formulas
//!
//! Executes a [`Program`] over an `f64` stack and a heap of numbered slots.
//! Bools are 1 and 0; any non-zero value counts as true. The integer and
//! modulo operators share their kernels with [`Value`](crate::Value) so both
//! backends give the same numbers.

use crate::bytecode::{Instruction, Program};
use crate::config::Config;
use crate::error::{ErrorKind, MathError, Result};
use crate::interpreter::Interpreter;
use crate::value::{bit_and, bit_not, bit_or, int_mod, Value};

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

fn truthy(x: f64) -> bool {
    x != 0.0
}

/// The virtual machine. One instance can run many programs.
pub struct Vm {
    stack: Vec<f64>,
    heap: Vec<f64>,
    stack_limit: usize,
    initial_heap: usize,
}

impl Vm {
    pub fn new(config: &Config) -> Self {
        Self {
            stack: Vec::with_capacity(config.vm_stack_limit.min(256)),
            heap: Vec::new(),
            stack_limit: config.vm_stack_limit,
            initial_heap: config.vm_initial_heap,
        }
    }

    /// Runs `program` and returns the number left on top of the stack.
    /// `interp` serves calls that need full dispatch.
    pub fn run(&mut self, program: &Program, interp: &mut Interpreter) -> Result<f64> {
        self.stack.clear();
        self.heap.clear();
        self.heap.resize(program.heap_size.max(self.initial_heap), f64::NAN);

        self.execute(program, interp)?;
        self.stack.last().copied().ok_or_else(|| ErrorKind::EmptyResult.into())
    }

    fn execute(&mut self, program: &Program, interp: &mut Interpreter) -> Result<()> {
        let code = &program.code;
        let mut pc = 0;

        while pc < code.len() {
            let instruction = &code[pc];
            tracing::trace!(pc, ?instruction, depth = self.stack.len(), "step");

            match instruction {
                Instruction::Constant(value) => self.push(*value)?,

                Instruction::VarRead(cell) => self.push(cell.get())?,
                Instruction::VarWrite(cell) => {
                    let value = self.pop()?;
                    cell.set(value);
                }
                Instruction::HeapRead(slot) => {
                    let value = self.heap.get(*slot).copied().unwrap_or(f64::NAN);
                    self.push(value)?;
                }
                Instruction::HeapWrite(slot) => {
                    let value = self.pop()?;
                    if *slot >= self.heap.len() {
                        self.heap.resize(*slot + 1, f64::NAN);
                    }
                    self.heap[*slot] = value;
                }

                Instruction::Add => self.binary_op(|a, b| a + b)?,
                Instruction::Sub => self.binary_op(|a, b| a - b)?,
                Instruction::Mul => self.binary_op(|a, b| a * b)?,
                Instruction::Div => self.binary_op(|a, b| a / b)?,
                Instruction::Mod => self.binary_op(int_mod)?,
                Instruction::Pow => self.binary_op(f64::powf)?,
                Instruction::BitAnd => self.binary_op(bit_and)?,
                Instruction::BitOr => self.binary_op(bit_or)?,
                Instruction::BitNot => self.unary_op(bit_not)?,
                Instruction::Neg => self.unary_op(|a| -a)?,

                Instruction::Not => self.unary_op(|a| flag(!truthy(a)))?,
                Instruction::And => self.logical_op(|a, b| a && b)?,
                Instruction::Or => self.logical_op(|a, b| a || b)?,
                Instruction::Xor => self.logical_op(|a, b| a != b)?,
                Instruction::Nor => self.logical_op(|a, b| !(a || b))?,
                Instruction::Nand => self.logical_op(|a, b| !(a && b))?,
                Instruction::Eq => self.comparison_op(|a, b| a == b)?,
                Instruction::Ne => self.comparison_op(|a, b| a != b)?,
                Instruction::Lt => self.comparison_op(|a, b| a < b)?,
                Instruction::Gt => self.comparison_op(|a, b| a > b)?,
                Instruction::Le => self.comparison_op(|a, b| a <= b)?,
                Instruction::Ge => self.comparison_op(|a, b| a >= b)?,

                Instruction::Dup => {
                    let top = self.peek()?;
                    self.push(top)?;
                }
                Instruction::Pop => {
                    self.pop()?;
                }

                Instruction::JumpRel(offset) => {
                    pc = jump_target(pc, *offset, code.len())?;
                    continue;
                }
                Instruction::JumpCondRel(offset) => {
                    if truthy(self.pop()?) {
                        pc = jump_target(pc, *offset, code.len())?;
                        continue;
                    }
                }

                Instruction::CallSimple(f) => {
                    let args = self.pop_args(f.arity())?;
                    self.push(f.call(&args))?;
                }
                Instruction::CallSimpleCtx(f) => {
                    let args = self.pop_args(f.arity())?;
                    let result = f.call(interp, &args);
                    self.push(result)?;
                }
                Instruction::CallResult { name, arity } => {
                    let args = self.pop_args(*arity)?.into_iter().map(Value::Double).collect();
                    let result = match interp.call_function(name, args) {
                        Value::Double(d) => d,
                        Value::Bool(b) => flag(b),
                        other => {
                            return Err(ErrorKind::FunctionResultType {
                                name: name.clone(),
                                found: other.type_name(),
                            }
                            .into())
                        }
                    };
                    self.push(result)?;
                }
            }

            pc += 1;
        }

        Ok(())
    }

    fn binary_op(&mut self, op: impl Fn(f64, f64) -> f64) -> Result<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(op(a, b))
    }

    fn unary_op(&mut self, op: impl Fn(f64) -> f64) -> Result<()> {
        let a = self.pop()?;
        self.push(op(a))
    }

    fn logical_op(&mut self, op: impl Fn(bool, bool) -> bool) -> Result<()> {
        self.binary_op(|a, b| flag(op(truthy(a), truthy(b))))
    }

    fn comparison_op(&mut self, op: impl Fn(f64, f64) -> bool) -> Result<()> {
        self.binary_op(|a, b| flag(op(a, b)))
    }

    // ==================== Helpers ====================

    fn push(&mut self, value: f64) -> Result<()> {
        if self.stack.len() >= self.stack_limit {
            return Err(ErrorKind::StackOverflow.into());
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<f64> {
        self.stack.pop().ok_or_else(|| MathError::from(ErrorKind::StackUnderflow))
    }

    fn peek(&self) -> Result<f64> {
        self.stack.last().copied().ok_or_else(|| MathError::from(ErrorKind::StackUnderflow))
    }

    /// The top `n` values, deepest first
    fn pop_args(&mut self, n: usize) -> Result<Vec<f64>> {
        if self.stack.len() < n {
            return Err(ErrorKind::StackUnderflow.into());
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }
}

/// Landing address of a jump at `pc`. The end of the program is a valid
/// target.
fn jump_target(pc: usize, offset: isize, len: usize) -> Result<usize> {
    pc.checked_add_signed(offset)
        .filter(|&target| target <= len)
        .ok_or_else(|| ErrorKind::InvalidJump(pc).into())
}
