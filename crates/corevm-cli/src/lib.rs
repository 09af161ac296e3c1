//! Library half of the `corevm` binary: the program manager, the bundled
//! example ASTs it submits, and the interactive shell. Split out from
//! `main.rs` so integration tests can drive [`pm::ProgramManager`] directly.

pub mod ast_examples;
pub mod pm;
pub mod shell;
