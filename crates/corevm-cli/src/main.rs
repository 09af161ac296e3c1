//! `corevm`: submits, runs, and debugs the bundled example programs through
//! a [`pm::ProgramManager`], either as one-shot subcommands or as an
//! interactive shell.

use clap::{Parser, Subcommand};
use rustyline::DefaultEditor;

use corevm_cli::pm::ProgramManager;
use corevm_cli::{ast_examples, shell};

#[derive(Parser)]
#[command(name = "corevm")]
#[command(about = "Program manager and debugger for the corevm toy VM")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Compile one of the bundled example programs and print its PID.
    Submit { name: String },
    /// Run a submitted program to completion.
    Run { pid: u32 },
    /// Enter the interactive debugger for a submitted program.
    Debug { pid: u32 },
    /// List the bundled example program names.
    Examples,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut pm = ProgramManager::new();

    match cli.command {
        Some(Command::Submit { name }) => {
            pm.submit(&name).map_err(|e| anyhow::anyhow!(e))?;
        }
        Some(Command::Run { pid }) => {
            pm.run(pid).map_err(|e| anyhow::anyhow!(e))?;
        }
        Some(Command::Debug { pid }) => {
            let mut editor = DefaultEditor::new()?;
            shell::run_debug_session(&mut pm, &mut editor, pid);
        }
        Some(Command::Examples) => {
            println!("Bundled examples: {}", ast_examples::NAMES.join(", "));
        }
        None => shell::run(&mut pm)?,
    }

    Ok(())
}
