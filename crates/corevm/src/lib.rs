//! `corevm`: an AST, a code generator, a stack virtual machine, and a
//! source-level debugger for a small imperative toy language.
//!
//! This crate is the core described by the accompanying design documents:
//! given a [`ast::Node`] tree, [`codegen::compile`] lowers it to a
//! [`codegen::BytecodeProgram`], which a [`vm::Vm`] executes and a
//! [`debugger::Debugger`] can single-step through. Submitting, running, and
//! killing named programs is a concern of the `corevm-cli` binary, not this
//! library.

pub mod ast;
pub mod codegen;
pub mod debugger;
pub mod gc;
pub mod opcode;
pub mod vm;

pub use ast::{BinOp, Node};
pub use codegen::{compile, BytecodeProgram, CodegenError};
pub use debugger::Debugger;
pub use opcode::Opcode;
pub use vm::{Vm, VmError};
