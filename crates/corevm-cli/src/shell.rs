//! The interactive program-manager shell: reads one command per line and
//! dispatches to a [`ProgramManager`], handing off to the debugger's own
//! loop for `debug <pid>`.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use corevm::debugger::HELP_TEXT;
use corevm::Debugger;

use crate::ast_examples;
use crate::pm::ProgramManager;

const SHELL_HELP: &str = "Commands:\n\
  submit <name>  - compile a bundled example program, printing its PID\n\
  run <pid>      - run a submitted program to completion\n\
  debug <pid>    - enter the interactive debugger for a program\n\
  kill <pid>     - tear down a program's VM and mark it finished\n\
  memstat <pid>  - show memory/GC statistics for a program\n\
  gc <pid>       - force a GC pass on a program\n\
  leaks <pid>    - list live heap objects for a program\n\
  list           - list every submitted program\n\
  examples       - list the bundled example program names\n\
  help           - show this message\n\
  quit           - exit the shell";

/// Runs the program-manager shell to completion (EOF or `quit`/`exit`).
pub fn run(pm: &mut ProgramManager) -> anyhow::Result<()> {
    let mut editor = DefaultEditor::new()?;
    println!("corevm shell. Type 'help' for commands, 'examples' to list programs.");

    loop {
        match editor.readline("corevm> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(trimmed);
                if dispatch(pm, &mut editor, trimmed) {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("readline error: {err}");
                break;
            }
        }
    }
    Ok(())
}

/// Dispatches one shell command. Returns `true` if the shell should exit.
fn dispatch(pm: &mut ProgramManager, editor: &mut DefaultEditor, line: &str) -> bool {
    let (cmd, rest) = match line.split_once(' ') {
        Some((c, r)) => (c, r.trim()),
        None => (line, ""),
    };

    match cmd {
        "submit" => match pm.submit(rest) {
            Ok(_pid) => {}
            Err(err) => eprintln!("Error: {err}"),
        },
        "run" => match parse_pid(rest) {
            Some(pid) => {
                if let Err(err) = pm.run(pid) {
                    eprintln!("Error: {err}");
                }
            }
            None => eprintln!("Error: invalid pid"),
        },
        "debug" => match parse_pid(rest) {
            Some(pid) => run_debug_session(pm, editor, pid),
            None => eprintln!("Error: invalid pid"),
        },
        "kill" => match parse_pid(rest) {
            Some(pid) => {
                if let Err(err) = pm.kill(pid) {
                    eprintln!("Error: {err}");
                }
            }
            None => eprintln!("Error: invalid pid"),
        },
        "memstat" => match parse_pid(rest) {
            Some(pid) => match pm.memstat(pid) {
                Ok(report) => println!("{report}"),
                Err(err) => eprintln!("Error: {err}"),
            },
            None => eprintln!("Error: invalid pid"),
        },
        "gc" => match parse_pid(rest) {
            Some(pid) => {
                if let Err(err) = pm.gc(pid) {
                    eprintln!("Error: {err}");
                }
            }
            None => eprintln!("Error: invalid pid"),
        },
        "leaks" => match parse_pid(rest) {
            Some(pid) => match pm.leaks(pid) {
                Ok(report) => println!("{report}"),
                Err(err) => eprintln!("Error: {err}"),
            },
            None => eprintln!("Error: invalid pid"),
        },
        "list" => println!("{}", pm.list()),
        "examples" => {
            println!("Bundled examples: {}", ast_examples::NAMES.join(", "))
        }
        "help" => println!("{SHELL_HELP}"),
        "quit" | "exit" => return true,
        other => println!("Unknown command: {other} (type 'help')"),
    }
    false
}

/// Invalid numbers parse as zero, surfacing as "PID 0 not found".
fn parse_pid(s: &str) -> Option<u32> {
    Some(s.parse::<u32>().unwrap_or(0))
}

/// Runs the interactive debugger loop for one pid, reusing the shell's own
/// line editor so history and interrupt handling are consistent between
/// the two loops.
pub(crate) fn run_debug_session(pm: &mut ProgramManager, editor: &mut DefaultEditor, pid: u32) {
    let result = pm.debug(pid, |dbg| {
        print_banner(dbg);
        loop {
            match editor.readline("dbg> ") {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let _ = editor.add_history_entry(trimmed);
                    if dispatch_debug_command(dbg, trimmed) {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("readline error: {err}");
                    break;
                }
            }
        }
    });
    if let Err(err) = result {
        eprintln!("Error: {err}");
    }
}

fn print_banner<W: std::io::Write>(dbg: &mut Debugger<'_, W>) {
    println!("{}", dbg.start_session());
}

/// Dispatches one debugger command. Returns `true` if the debugger session
/// should end (`quit`/`q`).
fn dispatch_debug_command<W: std::io::Write>(dbg: &mut Debugger<'_, W>, line: &str) -> bool {
    let (cmd, rest) = match line.split_once(' ') {
        Some((c, r)) => (c, r.trim()),
        None => (line, ""),
    };

    match cmd {
        "break" => println!("{}", dbg.add_breakpoint(parse_line(rest))),
        "delete" => println!("{}", dbg.remove_breakpoint(parse_line(rest))),
        "list" => println!("{}", dbg.list_breakpoints()),
        "step" | "s" => println!("{}", dbg.step_instruction()),
        "next" | "n" => println!("{}", dbg.step_line()),
        "continue" | "c" => println!("{}", dbg.cont()),
        "regs" => println!("{}", dbg.regs()),
        "stack" => println!("{}", dbg.stack()),
        "vars" => println!("{}", dbg.vars()),
        "memstat" => println!("{}", dbg.memstat()),
        "help" => println!("{HELP_TEXT}"),
        "quit" | "q" => {
            println!("Exiting debugger");
            return true;
        }
        other => println!("Unknown command: {other} (type 'help')"),
    }
    false
}

/// Invalid numbers parse as zero, surfacing as "no code at line 0".
fn parse_line(s: &str) -> u32 {
    s.parse::<u32>().unwrap_or(0)
}
