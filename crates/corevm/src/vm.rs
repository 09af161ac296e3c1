//! The stack virtual machine: operand stack, return stack, linear memory,
//! program counter, and typed error state.
//!
//! Every opcode that can fail checks its preconditions before mutating any
//! state, sets the first applicable [`VmError`], clears the running flag,
//! and returns without touching anything further.

use std::io::Write;

use crate::codegen::BytecodeProgram;
use crate::gc::Heap;
use crate::opcode::Opcode;

/// Maximum operand stack depth.
pub const STACK_SIZE: usize = 1024;
/// Number of addressable linear-memory slots.
pub const MEMORY_SIZE: usize = 1024;
/// Maximum return-stack depth.
pub const RETURN_STACK_SIZE: usize = 256;

/// A VM execution failure. Exactly one kind is recorded at a time; the VM
/// stops running as soon as one occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VmError {
    #[error("Stack overflow")]
    StackOverflow,
    #[error("Stack underflow")]
    StackUnderflow,
    #[error("Invalid opcode")]
    InvalidOpcode,
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Memory access out of bounds")]
    MemoryBounds,
    #[error("Code access out of bounds")]
    CodeBounds,
    #[error("Return stack overflow")]
    ReturnStackOverflow,
    #[error("Return stack underflow")]
    ReturnStackUnderflow,
    #[error("File I/O error")]
    FileIo,
}

/// The virtual machine. Fields are declared in teardown order (heap last),
/// so that default `Drop` order releases the object heap only after the
/// stacks and memory it might reference are gone.
pub struct Vm<W: Write = std::io::Stdout> {
    code: Vec<u8>,
    stack: Vec<i32>,
    return_stack: Vec<i32>,
    memory: Vec<i32>,
    pc: usize,
    running: bool,
    error: Option<VmError>,
    heap: Heap,
    out: W,
}

impl Vm<std::io::Stdout> {
    /// Creates a VM that prints `PRINT` output to standard output.
    pub fn new() -> Self {
        Self::with_writer(std::io::stdout())
    }
}

impl Default for Vm<std::io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> Vm<W> {
    /// Creates a VM that writes `PRINT` output to an arbitrary sink —
    /// tests use an in-memory buffer instead of stdout.
    pub fn with_writer(out: W) -> Self {
        Self {
            code: Vec::new(),
            stack: Vec::with_capacity(STACK_SIZE),
            return_stack: Vec::with_capacity(RETURN_STACK_SIZE),
            memory: vec![0; MEMORY_SIZE],
            pc: 0,
            running: false,
            error: None,
            heap: Heap::new(),
            out,
        }
    }

    /// Loads a compiled program, resetting all execution state (but not
    /// the heap — the heap persists across loads within one VM instance).
    pub fn load_program(&mut self, program: &BytecodeProgram) {
        self.code = program.code().to_vec();
        self.pc = 0;
        self.stack.clear();
        self.return_stack.clear();
        self.running = false;
        self.error = None;
        for slot in &mut self.memory {
            *slot = 0;
        }
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn sp(&self) -> usize {
        self.stack.len()
    }

    pub fn rsp(&self) -> usize {
        self.return_stack.len()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn error(&self) -> Option<VmError> {
        self.error
    }

    pub fn code_len(&self) -> usize {
        self.code.len()
    }

    pub fn stack(&self) -> &[i32] {
        &self.stack
    }

    pub fn return_stack(&self) -> &[i32] {
        &self.return_stack
    }

    pub fn memory(&self) -> &[i32] {
        &self.memory
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    fn stack_push(&mut self, value: i32) -> Result<(), VmError> {
        if self.stack.len() >= STACK_SIZE {
            self.error = Some(VmError::StackOverflow);
            return Err(VmError::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    fn stack_pop(&mut self) -> Result<i32, VmError> {
        self.stack.pop().ok_or_else(|| {
            self.error = Some(VmError::StackUnderflow);
            VmError::StackUnderflow
        })
    }

    fn stack_peek(&mut self) -> Result<i32, VmError> {
        match self.stack.last().copied() {
            Some(v) => Ok(v),
            None => {
                self.error = Some(VmError::StackUnderflow);
                Err(VmError::StackUnderflow)
            }
        }
    }

    fn return_stack_push(&mut self, value: i32) -> Result<(), VmError> {
        if self.return_stack.len() >= RETURN_STACK_SIZE {
            self.error = Some(VmError::ReturnStackOverflow);
            return Err(VmError::ReturnStackOverflow);
        }
        self.return_stack.push(value);
        Ok(())
    }

    fn return_stack_pop(&mut self) -> Result<i32, VmError> {
        self.return_stack.pop().ok_or_else(|| {
            self.error = Some(VmError::ReturnStackUnderflow);
            VmError::ReturnStackUnderflow
        })
    }

    fn read_i32(&mut self) -> Result<i32, VmError> {
        if self.pc + 4 > self.code.len() {
            self.error = Some(VmError::CodeBounds);
            return Err(VmError::CodeBounds);
        }
        let bytes = [
            self.code[self.pc],
            self.code[self.pc + 1],
            self.code[self.pc + 2],
            self.code[self.pc + 3],
        ];
        self.pc += 4;
        Ok(i32::from_le_bytes(bytes))
    }

    fn jump_target_in_bounds(&mut self, target: i32) -> Result<usize, VmError> {
        if target < 0 || target as usize > self.code.len() {
            self.error = Some(VmError::CodeBounds);
            return Err(VmError::CodeBounds);
        }
        Ok(target as usize)
    }

    /// Stricter than [`Self::jump_target_in_bounds`]: a call target equal to
    /// `code.len()` has nowhere to return execution to, so it is rejected
    /// rather than accepted the way a trailing `JMP`/`JZ`/`JNZ` is.
    fn call_target_in_bounds(&mut self, target: i32) -> Result<usize, VmError> {
        if target < 0 || target as usize >= self.code.len() {
            self.error = Some(VmError::CodeBounds);
            return Err(VmError::CodeBounds);
        }
        Ok(target as usize)
    }

    fn binop(&mut self, f: impl FnOnce(i32, i32) -> i32) {
        let b = match self.stack_pop() {
            Ok(v) => v,
            Err(_) => {
                self.running = false;
                return;
            }
        };
        let a = match self.stack_pop() {
            Ok(v) => v,
            Err(_) => {
                self.running = false;
                return;
            }
        };
        if self.stack_push(f(a, b)).is_err() {
            self.running = false;
        }
    }

    fn cmp(&mut self, f: impl FnOnce(i32, i32) -> bool) {
        self.binop(|a, b| i32::from(f(a, b)));
    }

    fn execute_instruction(&mut self) {
        if self.pc >= self.code.len() {
            self.error = Some(VmError::CodeBounds);
            self.running = false;
            return;
        }

        let byte = self.code[self.pc];
        self.pc += 1;

        let op = match Opcode::from_byte(byte) {
            Some(op) => op,
            None => {
                self.error = Some(VmError::InvalidOpcode);
                self.running = false;
                return;
            }
        };

        match op {
            Opcode::Push => {
                let value = match self.read_i32() {
                    Ok(v) => v,
                    Err(_) => {
                        self.running = false;
                        return;
                    }
                };
                if self.stack_push(value).is_err() {
                    self.running = false;
                }
            }

            Opcode::Pop => {
                if self.stack_pop().is_err() {
                    self.running = false;
                }
            }

            Opcode::Dup => {
                let value = match self.stack_peek() {
                    Ok(v) => v,
                    Err(_) => {
                        self.running = false;
                        return;
                    }
                };
                if self.stack_push(value).is_err() {
                    self.running = false;
                }
            }

            Opcode::Add => self.binop(|a, b| a.wrapping_add(b)),
            Opcode::Sub => self.binop(|a, b| a.wrapping_sub(b)),
            Opcode::Mul => self.binop(|a, b| a.wrapping_mul(b)),

            Opcode::Div => {
                let b = match self.stack_pop() {
                    Ok(v) => v,
                    Err(_) => {
                        self.running = false;
                        return;
                    }
                };
                if b == 0 {
                    self.error = Some(VmError::DivisionByZero);
                    self.running = false;
                    return;
                }
                let a = match self.stack_pop() {
                    Ok(v) => v,
                    Err(_) => {
                        self.running = false;
                        return;
                    }
                };
                if self.stack_push(a.wrapping_div(b)).is_err() {
                    self.running = false;
                }
            }

            Opcode::Cmp => self.cmp(|a, b| a < b),
            Opcode::CmpEq => self.cmp(|a, b| a == b),
            Opcode::CmpNe => self.cmp(|a, b| a != b),
            Opcode::CmpGt => self.cmp(|a, b| a > b),
            Opcode::CmpLe => self.cmp(|a, b| a <= b),
            Opcode::CmpGe => self.cmp(|a, b| a >= b),

            Opcode::Jmp => {
                let target = match self.read_i32() {
                    Ok(v) => v,
                    Err(_) => {
                        self.running = false;
                        return;
                    }
                };
                match self.jump_target_in_bounds(target) {
                    Ok(pc) => self.pc = pc,
                    Err(_) => self.running = false,
                }
            }

            Opcode::Jz | Opcode::Jnz => {
                let target = match self.read_i32() {
                    Ok(v) => v,
                    Err(_) => {
                        self.running = false;
                        return;
                    }
                };
                let value = match self.stack_pop() {
                    Ok(v) => v,
                    Err(_) => {
                        self.running = false;
                        return;
                    }
                };
                let should_jump = if op == Opcode::Jz { value == 0 } else { value != 0 };
                if should_jump {
                    match self.jump_target_in_bounds(target) {
                        Ok(pc) => self.pc = pc,
                        Err(_) => self.running = false,
                    }
                }
            }

            Opcode::Store => {
                let index = match self.read_i32() {
                    Ok(v) => v,
                    Err(_) => {
                        self.running = false;
                        return;
                    }
                };
                if index < 0 || index as usize >= MEMORY_SIZE {
                    self.error = Some(VmError::MemoryBounds);
                    self.running = false;
                    return;
                }
                let value = match self.stack_pop() {
                    Ok(v) => v,
                    Err(_) => {
                        self.running = false;
                        return;
                    }
                };
                self.memory[index as usize] = value;
            }

            Opcode::Load => {
                let index = match self.read_i32() {
                    Ok(v) => v,
                    Err(_) => {
                        self.running = false;
                        return;
                    }
                };
                if index < 0 || index as usize >= MEMORY_SIZE {
                    self.error = Some(VmError::MemoryBounds);
                    self.running = false;
                    return;
                }
                let value = self.memory[index as usize];
                if self.stack_push(value).is_err() {
                    self.running = false;
                }
            }

            Opcode::Call => {
                let target = match self.read_i32() {
                    Ok(v) => v,
                    Err(_) => {
                        self.running = false;
                        return;
                    }
                };
                let call_pc = match self.call_target_in_bounds(target) {
                    Ok(pc) => pc,
                    Err(_) => {
                        self.running = false;
                        return;
                    }
                };
                let return_pc = self.pc as i32;
                if self.return_stack_push(return_pc).is_err() {
                    self.running = false;
                    return;
                }
                self.pc = call_pc;
            }

            Opcode::Ret => match self.return_stack_pop() {
                Ok(addr) => self.pc = addr as usize,
                Err(_) => self.running = false,
            },

            Opcode::Print => {
                let value = match self.stack_pop() {
                    Ok(v) => v,
                    Err(_) => {
                        self.running = false;
                        return;
                    }
                };
                if writeln!(self.out, "{value}").is_err() {
                    self.error = Some(VmError::FileIo);
                    self.running = false;
                }
            }

            Opcode::Halt => {
                self.running = false;
            }
        }
    }

    /// Runs to completion: HALT, an error, or (never, by construction) the
    /// heat death of the universe.
    pub fn run(&mut self) -> Option<VmError> {
        self.running = true;
        self.error = None;
        while self.running && self.error.is_none() {
            self.execute_instruction();
        }
        self.error
    }

    /// Unconditionally marks the VM running with a clear error, without
    /// executing anything. Used by the debugger's own auto-start gate,
    /// which (unlike `step`) only wants to flip this bit when the program
    /// counter is still in bounds.
    pub fn start(&mut self) {
        self.running = true;
        self.error = None;
    }

    /// Executes exactly one instruction. If the VM was not running, it is
    /// auto-started first — even if `pc` is out of bounds, in which case
    /// the single step that follows immediately raises a code-bounds error.
    pub fn step(&mut self) -> Option<VmError> {
        if !self.running {
            self.running = true;
            self.error = None;
        }
        if self.running && self.error.is_none() {
            self.execute_instruction();
        }
        self.error
    }

    /// A human-readable snapshot of VM state: program counter, stack
    /// depths, running flag, error, stack/return-stack contents, a summary
    /// of non-zero memory, and the live object count.
    pub fn dump_state(&self) -> String {
        let mut out = String::new();
        out.push_str("=== VM State ===\n");
        out.push_str(&format!("PC: {}\n", self.pc));
        out.push_str(&format!("SP: {}, RSP: {}\n", self.sp(), self.rsp()));
        out.push_str(&format!("Running: {}\n", if self.running { "yes" } else { "no" }));
        out.push_str(&format!(
            "Error: {}\n",
            self.error.map(|e| e.to_string()).unwrap_or_else(|| "OK".to_string())
        ));

        let stack_str: Vec<String> = self.stack.iter().map(i32::to_string).collect();
        out.push_str(&format!("Stack: [{}]\n", stack_str.join(", ")));
        if let Some(top) = self.stack.last() {
            out.push_str(&format!("Top of stack: {top}\n"));
        }

        let rstack_str: Vec<String> = self.return_stack.iter().map(i32::to_string).collect();
        out.push_str(&format!("Return Stack: [{}]\n", rstack_str.join(", ")));

        let nonzero: Vec<String> = self
            .memory
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0)
            .take(5)
            .map(|(i, v)| format!("M[{i}]={v}"))
            .collect();
        if nonzero.is_empty() {
            out.push_str("Memory: [all zeros]\n");
        } else {
            out.push_str(&format!("Memory: [{}]\n", nonzero.join(", ")));
        }

        out.push_str(&format!(
            "GC Objects: {}/{}\n",
            self.heap.num_objects(),
            self.heap.max_objects()
        ));
        out.push_str("================\n");
        out
    }
}
