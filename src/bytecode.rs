//! Bytecode instructions for the mathexpr VM
//!
//! A [`Program`] is a flat list of [`Instruction`]s over an `f64` stack plus
//! a heap of numbered `f64` slots. Jump offsets are relative to the jump
//! instruction itself.

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::Node;
use crate::environment::{SimpleCtxFn, SimpleFn};

/// VM instructions. Each carries at most one payload.
#[derive(Debug, Clone)]
pub enum Instruction {
    /// Push a literal
    Constant(f64),

    // Variables
    /// Push a host or environment number
    VarRead(Rc<Cell<f64>>),
    /// Pop into a host or environment number
    VarWrite(Rc<Cell<f64>>),
    /// Push a heap slot; slots never written read as NaN
    HeapRead(usize),
    /// Pop into a heap slot
    HeapWrite(usize),

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitNot,
    Neg,

    // Logic, pushing 1 or 0
    Not,
    And,
    Or,
    Xor,
    Nor,
    Nand,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    // Stack
    Dup,
    Pop,

    // Control flow
    JumpRel(isize),
    /// Pop; jump when the value is non-zero
    JumpCondRel(isize),

    // Calls
    CallSimple(SimpleFn),
    CallSimpleCtx(SimpleCtxFn),
    /// Call through full dispatch with `arity` arguments from the stack
    CallResult { name: String, arity: usize },
}

impl Instruction {
    fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Constant(_) => "CONSTANT",
            Instruction::VarRead(_) => "VAR_READ",
            Instruction::VarWrite(_) => "VAR_WRITE",
            Instruction::HeapRead(_) => "HEAP_READ",
            Instruction::HeapWrite(_) => "HEAP_WRITE",
            Instruction::Add => "ADD",
            Instruction::Sub => "SUB",
            Instruction::Mul => "MUL",
            Instruction::Div => "DIV",
            Instruction::Mod => "MOD",
            Instruction::Pow => "POW",
            Instruction::BitAnd => "BIT_AND",
            Instruction::BitOr => "BIT_OR",
            Instruction::BitNot => "BIT_NOT",
            Instruction::Neg => "NEG",
            Instruction::Not => "NOT",
            Instruction::And => "AND",
            Instruction::Or => "OR",
            Instruction::Xor => "XOR",
            Instruction::Nor => "NOR",
            Instruction::Nand => "NAND",
            Instruction::Eq => "EQ",
            Instruction::Ne => "NE",
            Instruction::Lt => "LT",
            Instruction::Gt => "GT",
            Instruction::Le => "LE",
            Instruction::Ge => "GE",
            Instruction::Dup => "DUP",
            Instruction::Pop => "POP",
            Instruction::JumpRel(_) => "JUMP_REL",
            Instruction::JumpCondRel(_) => "JUMP_COND_REL",
            Instruction::CallSimple(_) => "CALL_SIMPLE",
            Instruction::CallSimpleCtx(_) => "CALL_SIMPLE_CTX",
            Instruction::CallResult { .. } => "CALL_RESULT",
        }
    }
}

/// A compiled formula
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub code: Vec<Instruction>,
    /// Heap slots the compiler allocated
    pub heap_size: usize,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an instruction and returns its address.
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        self.code.push(instruction);
        self.code.len() - 1
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Points the jump at `at` to the absolute address `target`.
    pub fn patch_jump(&mut self, at: usize, target: usize) {
        let offset = target as isize - at as isize;
        match &mut self.code[at] {
            Instruction::JumpRel(o) | Instruction::JumpCondRel(o) => *o = offset,
            other => debug_assert!(false, "patching non-jump {:?}", other),
        }
    }

    /// Human readable listing, one instruction per line
    pub fn disassemble(&self, name: &str) -> String {
        let mut result = format!("== {} ==\n", name);
        for (offset, instruction) in self.code.iter().enumerate() {
            result.push_str(&self.disassemble_instruction(offset, instruction));
            result.push('\n');
        }
        if self.heap_size > 0 {
            result.push_str(&format!("heap slots: {}\n", self.heap_size));
        }
        result
    }

    fn disassemble_instruction(&self, offset: usize, instruction: &Instruction) -> String {
        let op = instruction.mnemonic();
        let text = match instruction {
            Instruction::Constant(value) => format!("{:<16} {}", op, value),
            Instruction::VarRead(cell) | Instruction::VarWrite(cell) => {
                format!("{:<16} <cell {}>", op, cell.get())
            }
            Instruction::HeapRead(slot) | Instruction::HeapWrite(slot) => {
                format!("{:<16} {:04}", op, slot)
            }
            Instruction::JumpRel(o) | Instruction::JumpCondRel(o) => {
                format!("{:<16} {:+} -> {:04}", op, o, offset as isize + o)
            }
            Instruction::CallSimple(f) => format!("{:<16} arity {}", op, f.arity()),
            Instruction::CallSimpleCtx(f) => format!("{:<16} arity {}", op, f.arity()),
            Instruction::CallResult { name, arity } => format!("{:<16} {}/{}", op, name, arity),
            _ => op.to_string(),
        };
        format!("{:04} {}", offset, text)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.disassemble("program"))
    }
}

// ==================== Compile-time environment ====================

/// A function defined inside the program being compiled
#[derive(Debug, Clone)]
pub struct ColocatedFunction {
    pub params: Vec<String>,
    pub body: Rc<Node>,
}

/// Heap slot allocation and local definitions for one compilation.
///
/// Named slots follow stack discipline: `push_var` binds a name to a fresh
/// slot and `pop_var` unbinds the most recent one. Slots are never reused,
/// so the high-water mark is the program's heap size.
#[derive(Debug, Default)]
pub struct ByteCodeEnvironment {
    scope: Vec<(String, usize)>,
    temporaries: HashMap<String, usize>,
    heap_size: usize,
    functions: HashMap<String, ColocatedFunction>,
    in_progress: Vec<String>,
}

impl ByteCodeEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> usize {
        self.heap_size += 1;
        self.heap_size - 1
    }

    /// Binds `name` to a fresh slot, shadowing earlier bindings.
    pub fn push_var(&mut self, name: &str) -> usize {
        let slot = self.allocate();
        self.scope.push((name.to_string(), slot));
        slot
    }

    pub fn pop_var(&mut self) {
        self.scope.pop();
    }

    /// A slot with no name, for loop bookkeeping
    pub fn anonymous(&mut self) -> usize {
        self.allocate()
    }

    /// Slot for an assignment to a name nothing else defines. It stays
    /// visible until the end of the program.
    pub fn temporary(&mut self, name: &str) -> usize {
        if let Some(&slot) = self.temporaries.get(name) {
            return slot;
        }
        let slot = self.allocate();
        self.temporaries.insert(name.to_string(), slot);
        slot
    }

    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.scope
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, slot)| *slot)
            .or_else(|| self.temporaries.get(name).copied())
    }

    pub fn heap_size(&self) -> usize {
        self.heap_size
    }

    pub fn define_function(&mut self, name: &str, params: Vec<String>, body: Rc<Node>) {
        self.functions.insert(name.to_string(), ColocatedFunction { params, body });
    }

    pub fn function(&self, name: &str) -> Option<&ColocatedFunction> {
        self.functions.get(name)
    }

    /// Marks `name` as being inlined; false if it already is.
    pub fn begin_call(&mut self, name: &str) -> bool {
        if self.in_progress.iter().any(|n| n == name) {
            return false;
        }
        self.in_progress.push(name.to_string());
        true
    }

    pub fn end_call(&mut self) {
        self.in_progress.pop();
    }
}
