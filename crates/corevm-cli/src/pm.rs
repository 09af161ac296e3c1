//! The program manager: multiplexes several submitted programs, each
//! identified by a pid, through submission, execution, pause-for-debug,
//! completion, and termination.
//!
//! This core has no parser, so `submit` takes a bundled example name (see
//! `crate::ast_examples`) in place of a source file path.

use corevm::{compile, BytecodeProgram, Debugger, Vm};

use crate::ast_examples;

/// Maximum number of simultaneously tracked programs.
pub const MAX_PROGRAMS: usize = 64;

/// Lifecycle state of one submitted program. Transitions:
/// `SUBMITTED -> RUNNING -> (FINISHED | ERROR)`;
/// `SUBMITTED/FINISHED/ERROR -> PAUSED -> FINISHED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramState {
    Submitted,
    Running,
    Paused,
    Finished,
    Error,
}

impl ProgramState {
    fn as_str(self) -> &'static str {
        match self {
            ProgramState::Submitted => "SUBMITTED",
            ProgramState::Running => "RUNNING",
            ProgramState::Paused => "PAUSED",
            ProgramState::Finished => "FINISHED",
            ProgramState::Error => "ERROR",
        }
    }
}

/// One tracked program: its name, compiled bytecode, lifecycle state, and
/// (once run or debugged at least once) the VM executing it.
struct ProgramEntry {
    pid: u32,
    name: String,
    state: ProgramState,
    bytecode: BytecodeProgram,
    vm: Option<Vm>,
}

/// Holds every program submitted this session. Executes at most one VM at a
/// time, despite holding several simultaneously: the manager is not itself
/// concurrent.
#[derive(Default)]
pub struct ProgramManager {
    programs: Vec<ProgramEntry>,
    next_pid: u32,
}

impl ProgramManager {
    pub fn new() -> Self {
        Self {
            programs: Vec::new(),
            next_pid: 1,
        }
    }

    fn find(&self, pid: u32) -> Option<usize> {
        self.programs.iter().position(|e| e.pid == pid)
    }

    /// The current lifecycle state of `pid`, or `None` if no such program
    /// was ever submitted.
    pub fn state(&self, pid: u32) -> Option<ProgramState> {
        self.find(pid).map(|idx| self.programs[idx].state)
    }

    /// Builds the named bundled example, compiles it, and assigns it a
    /// fresh pid. Mirrors `pm_submit`'s parse-then-compile pipeline, with
    /// the AST builder standing in for the parser.
    pub fn submit(&mut self, name: &str) -> Result<u32, String> {
        if self.programs.len() >= MAX_PROGRAMS {
            return Err("max programs reached".to_string());
        }
        let tree = ast_examples::lookup(name)
            .ok_or_else(|| format!("unknown example '{name}'"))?;
        let bytecode = compile(&tree).map_err(|e| format!("codegen failed: {e}"))?;

        let pid = self.next_pid;
        self.next_pid += 1;
        let code_len = bytecode.code().len();
        let var_count = bytecode.var_count();
        self.programs.push(ProgramEntry {
            pid,
            name: name.to_string(),
            state: ProgramState::Submitted,
            bytecode,
            vm: None,
        });
        println!(
            "Program '{name}' submitted as PID {pid} ({code_len} bytes bytecode, {var_count} vars)"
        );
        Ok(pid)
    }

    /// Runs a newly submitted program to completion.
    pub fn run(&mut self, pid: u32) -> Result<(), String> {
        let idx = self.find(pid).ok_or_else(|| format!("PID {pid} not found"))?;
        if self.programs[idx].state != ProgramState::Submitted {
            return Err(format!(
                "PID {pid} is {} (must be SUBMITTED)",
                self.programs[idx].state.as_str()
            ));
        }

        let mut vm = Vm::new();
        vm.load_program(&self.programs[idx].bytecode);
        println!("Running PID {pid}...");
        let error = vm.run();
        self.programs[idx].vm = Some(vm);

        if let Some(err) = error {
            self.programs[idx].state = ProgramState::Error;
            eprintln!("PID {pid} error: {err}");
        } else {
            self.programs[idx].state = ProgramState::Finished;
            println!("PID {pid} finished successfully");
        }
        Ok(())
    }

    /// Loads a fresh VM for this program and marks it PAUSED. Valid from
    /// SUBMITTED, FINISHED, or ERROR. Used internally by [`Self::debug`],
    /// which binds a [`Debugger`] to the loaded VM and runs the caller's
    /// session.
    pub fn begin_debug(&mut self, pid: u32) -> Result<(), String> {
        let idx = self.find(pid).ok_or_else(|| format!("PID {pid} not found"))?;
        let state = self.programs[idx].state;
        if !matches!(
            state,
            ProgramState::Submitted | ProgramState::Finished | ProgramState::Error
        ) {
            return Err(format!("PID {pid} is {}", state.as_str()));
        }
        let mut vm = Vm::new();
        vm.load_program(&self.programs[idx].bytecode);
        self.programs[idx].vm = Some(vm);
        self.programs[idx].state = ProgramState::Paused;
        Ok(())
    }

    /// Runs the interactive debugger loop for `pid` to completion, then
    /// marks the program FINISHED once the VM is no longer running.
    pub fn debug(&mut self, pid: u32, run_session: impl FnOnce(&mut Debugger<'_, std::io::Stdout>)) -> Result<(), String> {
        self.begin_debug(pid)?;
        let idx = self.find(pid).unwrap();
        {
            let entry = &mut self.programs[idx];
            let vm = entry.vm.as_mut().unwrap();
            let mut dbg = Debugger::new(vm, &entry.bytecode);
            run_session(&mut dbg);
        }
        let still_running = self.programs[idx].vm.as_ref().unwrap().is_running();
        if !still_running {
            self.programs[idx].state = ProgramState::Finished;
        }
        Ok(())
    }

    /// Tears down a program's VM (if any) and unconditionally marks it
    /// FINISHED, regardless of its prior state.
    pub fn kill(&mut self, pid: u32) -> Result<(), String> {
        let idx = self.find(pid).ok_or_else(|| format!("PID {pid} not found"))?;
        self.programs[idx].vm = None;
        self.programs[idx].state = ProgramState::Finished;
        println!("PID {pid} killed");
        Ok(())
    }

    pub fn memstat(&self, pid: u32) -> Result<String, String> {
        let idx = self.find(pid).ok_or_else(|| format!("PID {pid} not found"))?;
        let vm = self.programs[idx]
            .vm
            .as_ref()
            .ok_or_else(|| format!("PID {pid} has no VM instance"))?;
        Ok(format!(
            "=== Memory Stats for PID {pid} ===\n\
             GC Objects:    {}\n\
             GC Threshold:  {}\n\
             Auto GC:       {}\n\
             Stack Depth:   {}\n\
             Memory Slots:  {} used",
            vm.heap().num_objects(),
            vm.heap().max_objects(),
            if vm.heap().auto_gc() { "enabled" } else { "disabled" },
            vm.sp(),
            self.programs[idx].bytecode.var_count(),
        ))
    }

    pub fn gc(&mut self, pid: u32) -> Result<(), String> {
        let idx = self.find(pid).ok_or_else(|| format!("PID {pid} not found"))?;
        let vm = self.programs[idx]
            .vm
            .as_mut()
            .ok_or_else(|| format!("PID {pid} has no VM instance"))?;
        println!("Forcing GC on PID {pid}...");
        vm.heap_mut().collect();
        Ok(())
    }

    /// Lists up to 10 live heap objects with a "... and N more" tail.
    pub fn leaks(&self, pid: u32) -> Result<String, String> {
        let idx = self.find(pid).ok_or_else(|| format!("PID {pid} not found"))?;
        let vm = self.programs[idx]
            .vm
            .as_ref()
            .ok_or_else(|| format!("PID {pid} has no VM instance"))?;
        let objects = vm.heap().objects();
        if objects.is_empty() {
            return Ok(format!("PID {pid}: No leaks detected (0 objects on heap)"));
        }
        let mut out = format!("PID {pid}: {} objects still on heap\n", objects.len());
        for (i, obj) in objects.iter().take(10).enumerate() {
            out.push_str(&format!(
                "  [{i}] type={} marked={}\n",
                obj.tag.as_str(),
                if obj.marked { "yes" } else { "no" }
            ));
        }
        if objects.len() > 10 {
            out.push_str(&format!("  ... and {} more\n", objects.len() - 10));
        }
        Ok(out.trim_end().to_string())
    }

    /// Tabular listing of every submitted program.
    pub fn list(&self) -> String {
        if self.programs.is_empty() {
            return "No programs submitted".to_string();
        }
        let mut out = String::from("PID  State       File\n---  ----------  ----");
        for entry in &self.programs {
            out.push_str(&format!(
                "\n{:<4} {:<10}  {}",
                entry.pid,
                entry.state.as_str(),
                entry.name
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_then_run_reaches_finished() {
        let mut pm = ProgramManager::new();
        let pid = pm.submit("add").unwrap();
        pm.run(pid).unwrap();
        assert_eq!(pm.state(pid).unwrap(), ProgramState::Finished);
    }

    #[test]
    fn running_a_pid_twice_is_rejected() {
        let mut pm = ProgramManager::new();
        let pid = pm.submit("add").unwrap();
        pm.run(pid).unwrap();
        let err = pm.run(pid).unwrap_err();
        assert!(err.contains("must be SUBMITTED"));
    }

    #[test]
    fn run_after_divide_by_zero_reaches_error() {
        let mut pm = ProgramManager::new();
        let pid = pm.submit("divzero").unwrap();
        pm.run(pid).unwrap();
        assert_eq!(pm.state(pid).unwrap(), ProgramState::Error);
    }

    #[test]
    fn unknown_pid_is_rejected_everywhere() {
        let mut pm = ProgramManager::new();
        assert!(pm.run(999).is_err());
        assert!(pm.kill(999).is_err());
        assert!(pm.memstat(999).is_err());
        assert!(pm.gc(999).is_err());
        assert!(pm.leaks(999).is_err());
    }

    #[test]
    fn kill_forces_finished_regardless_of_prior_state() {
        let mut pm = ProgramManager::new();
        let pid = pm.submit("add").unwrap();
        pm.kill(pid).unwrap();
        assert_eq!(pm.state(pid).unwrap(), ProgramState::Finished);
    }

    #[test]
    fn memstat_after_a_clean_run_reports_zero_objects() {
        let mut pm = ProgramManager::new();
        let pid = pm.submit("add").unwrap();
        pm.run(pid).unwrap();
        let report = pm.memstat(pid).unwrap();
        assert!(report.contains("GC Objects:    0"));
    }

    #[test]
    fn leaks_reports_no_leaks_on_an_empty_heap() {
        let mut pm = ProgramManager::new();
        let pid = pm.submit("add").unwrap();
        pm.run(pid).unwrap();
        assert_eq!(pm.leaks(pid).unwrap(), "PID 1: No leaks detected (0 objects on heap)");
    }

    #[test]
    fn list_is_empty_until_something_is_submitted() {
        let pm = ProgramManager::new();
        assert_eq!(pm.list(), "No programs submitted");
    }

    #[test]
    fn debug_then_finish_marks_the_program_finished() {
        let mut pm = ProgramManager::new();
        let pid = pm.submit("add").unwrap();
        pm.debug(pid, |dbg| {
            dbg.start_session();
            loop {
                let report = dbg.step_instruction();
                if report == "Program has halted" {
                    break;
                }
            }
        })
        .unwrap();
        assert_eq!(pm.state(pid).unwrap(), ProgramState::Finished);
    }
}
