//! Drives a [`Vm`] one step at a time, resolving source lines through a
//! [`BytecodeProgram`]'s source map.
//!
//! The interactive prompt loop itself (reading stdin, the `dbg>` banner)
//! lives in `corevm-cli`'s shell; everything here is pure command logic
//! that returns the text to print, so it can be unit tested without a
//! terminal.

use std::io::Write;

use crate::codegen::BytecodeProgram;
use crate::vm::Vm;

/// Maximum number of simultaneous line breakpoints.
pub const MAX_BREAKPOINTS: usize = 32;

/// A debugger bound to one VM and the program it is executing. Breakpoints
/// and `last_line` are the debugger's own state; the VM and program are
/// borrowed for the debugger's lifetime.
pub struct Debugger<'a, W: Write> {
    vm: &'a mut Vm<W>,
    program: &'a BytecodeProgram,
    breakpoints: Vec<u32>,
    last_line: u32,
}

impl<'a, W: Write> Debugger<'a, W> {
    pub fn new(vm: &'a mut Vm<W>, program: &'a BytecodeProgram) -> Self {
        Self {
            vm,
            program,
            breakpoints: Vec::new(),
            last_line: 0,
        }
    }

    pub fn breakpoints(&self) -> &[u32] {
        &self.breakpoints
    }

    pub fn last_line(&self) -> u32 {
        self.last_line
    }

    /// Starts the debugging session: marks the VM running and seeds
    /// `last_line` from the instruction at pc 0. Returns the banner to
    /// print before the first prompt.
    pub fn start_session(&mut self) -> String {
        self.vm.start();
        self.last_line = self.program.line_for_pc(0);
        format!(
            "Debugger ready. Type 'help' for commands.\nProgram loaded: {} bytes, {} variables",
            self.vm.code_len(),
            self.program.var_count()
        )
    }

    pub fn add_breakpoint(&mut self, line: u32) -> String {
        if self.breakpoints.len() >= MAX_BREAKPOINTS {
            return "Max breakpoints reached".to_string();
        }
        if self.breakpoints.contains(&line) {
            return format!("Breakpoint already set at line {line}");
        }
        match self.program.pc_for_line(line) {
            Some(pc) => {
                self.breakpoints.push(line);
                format!("Breakpoint set at line {line} (pc={pc})")
            }
            None => format!("No code at line {line}"),
        }
    }

    pub fn remove_breakpoint(&mut self, line: u32) -> String {
        match self.breakpoints.iter().position(|&l| l == line) {
            Some(pos) => {
                self.breakpoints.swap_remove(pos);
                format!("Breakpoint removed at line {line}")
            }
            None => format!("No breakpoint at line {line}"),
        }
    }

    pub fn list_breakpoints(&self) -> String {
        if self.breakpoints.is_empty() {
            return "No breakpoints set".to_string();
        }
        let mut out = String::from("Breakpoints:");
        for line in &self.breakpoints {
            out.push_str(&format!("\n  line {line}"));
        }
        out
    }

    fn is_breakpoint(&self, line: u32) -> bool {
        self.breakpoints.contains(&line)
    }

    /// Executes a single instruction, auto-starting the VM only if it is
    /// halted and `pc` is still within the code.
    pub fn step_instruction(&mut self) -> String {
        if !self.vm.is_running() && self.vm.pc() < self.vm.code_len() {
            self.vm.start();
        }
        if self.vm.is_running() {
            self.vm.step();
            let line = self.program.line_for_pc(self.vm.pc());
            if line > 0 {
                self.last_line = line;
            }
            format!("  PC={} (line {})", self.vm.pc(), self.last_line)
        } else {
            "Program has halted".to_string()
        }
    }

    /// Steps until the mapped line differs from the line at entry and is
    /// non-zero, or the program halts.
    pub fn step_line(&mut self) -> String {
        if !self.vm.is_running() && self.vm.pc() < self.vm.code_len() {
            self.vm.start();
        }
        let start_line = self.program.line_for_pc(self.vm.pc());
        while self.vm.is_running() {
            self.vm.step();
            let cur_line = self.program.line_for_pc(self.vm.pc());
            if cur_line != start_line && cur_line > 0 {
                self.last_line = cur_line;
                break;
            }
        }
        if !self.vm.is_running() {
            format!("Program halted at PC={}", self.vm.pc())
        } else {
            format!("  Stopped at line {} (PC={})", self.last_line, self.vm.pc())
        }
    }

    /// Steps past the current position once, then runs until a breakpoint
    /// line other than `last_line` is reached, or the program halts.
    pub fn cont(&mut self) -> String {
        if !self.vm.is_running() && self.vm.pc() < self.vm.code_len() {
            self.vm.start();
        }
        if self.vm.is_running() {
            self.vm.step();
        }
        while self.vm.is_running() {
            let line = self.program.line_for_pc(self.vm.pc());
            if line > 0 && self.is_breakpoint(line) && line != self.last_line {
                self.last_line = line;
                return format!("Hit breakpoint at line {line} (PC={})", self.vm.pc());
            }
            if line > 0 {
                self.last_line = line;
            }
            self.vm.step();
        }
        "Program finished".to_string()
    }

    pub fn regs(&self) -> String {
        let line = self.program.line_for_pc(self.vm.pc());
        format!(
            "PC:  {}\nSP:  {}\nRSP: {}\nLine: {}\nRunning: {}",
            self.vm.pc(),
            self.vm.sp(),
            self.vm.rsp(),
            line,
            if self.vm.is_running() { "yes" } else { "no" }
        )
    }

    pub fn stack(&self) -> String {
        if self.vm.sp() == 0 {
            return "Stack is empty".to_string();
        }
        let mut out = String::from("Stack (top first):");
        for (i, value) in self.vm.stack().iter().enumerate().rev() {
            out.push_str(&format!("\n  [{i}] = {value}"));
        }
        out
    }

    pub fn vars(&self) -> String {
        if self.program.var_count() == 0 {
            return "No variables".to_string();
        }
        let mut out = String::from("Variables:");
        for slot in 0..self.program.var_count() {
            let name = self.program.var_name(slot).unwrap_or("?");
            let value = self.vm.memory()[slot];
            out.push_str(&format!("\n  {name} = {value} (slot {slot})"));
        }
        out
    }

    pub fn memstat(&self) -> String {
        format!(
            "GC Objects: {}\nGC Threshold: {}\nAuto GC: {}",
            self.vm.heap().num_objects(),
            self.vm.heap().max_objects(),
            if self.vm.heap().auto_gc() { "enabled" } else { "disabled" }
        )
    }
}

/// The fixed command reference, matching `debugger_interactive`'s `help`
/// output wording. Kept here since it is command vocabulary, not I/O.
pub const HELP_TEXT: &str = "Commands:\n\
  break <line>   - set breakpoint at source line\n\
  delete <line>  - remove breakpoint\n\
  list           - list breakpoints\n\
  step           - step one instruction\n\
  next           - step one source line\n\
  continue       - run until breakpoint or end\n\
  regs           - show PC, SP, RSP\n\
  stack          - show stack contents\n\
  vars           - show variable values\n\
  memstat        - show GC statistics\n\
  quit           - exit debugger";
