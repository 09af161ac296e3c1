//! Lowers an [`Node`](crate::ast::Node) tree into a [`BytecodeProgram`]: a
//! flat byte stream, an ordered variable symbol table, and a source map.

use crate::ast::{BinOp, Node};
use crate::opcode::Opcode;

/// Maximum size, in bytes, of a compiled code buffer.
pub const MAX_CODE_SIZE: usize = 4096;
/// Maximum number of distinct variable slots a program may use.
pub const MAX_VARS: usize = 128;
/// Maximum number of source-map entries a program may carry.
pub const MAX_SOURCE_MAP: usize = 1024;

/// Fatal compilation failures. These are returned rather than aborting the
/// process, so the caller decides how to report them.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodegenError {
    #[error("codegen: code buffer overflow")]
    CodeBufferOverflow,
    #[error("codegen: too many variables")]
    TooManyVariables,
}

/// One (bytecode offset, source line) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SourceMapEntry {
    pub offset: u32,
    pub line: u32,
}

/// The output of [`compile`]: code, symbol table, and source map together,
/// since all three are produced by a single pass and consumed together by
/// the VM and debugger.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BytecodeProgram {
    code: Vec<u8>,
    var_names: Vec<String>,
    source_map: Vec<SourceMapEntry>,
}

impl BytecodeProgram {
    /// The compiled instruction stream, terminated by `HALT`.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn var_count(&self) -> usize {
        self.var_names.len()
    }

    /// The variable name occupying a given slot, in definition order.
    pub fn var_name(&self, slot: usize) -> Option<&str> {
        self.var_names.get(slot).map(String::as_str)
    }

    pub fn var_names(&self) -> &[String] {
        &self.var_names
    }

    /// The slot assigned to `name`, if it was ever declared, assigned, or
    /// read.
    pub fn var_slot(&self, name: &str) -> Option<usize> {
        self.var_names.iter().position(|n| n == name)
    }

    pub fn source_map(&self) -> &[SourceMapEntry] {
        &self.source_map
    }

    /// The line mapped to `pc`: the line of the highest-offset entry whose
    /// offset is `<= pc`, or `0` if none. A linear scan is plenty at the
    /// scale of a few thousand entries; an offset-indexed structure would
    /// work too, as long as it preserves this exact answer.
    pub fn line_for_pc(&self, pc: usize) -> u32 {
        let mut best_line = 0;
        for entry in &self.source_map {
            if entry.offset as usize <= pc {
                best_line = entry.line;
            }
        }
        best_line
    }

    /// The offset of the *first* source-map entry for `line`, or `None` if
    /// no instruction maps to it. Deliberately not the last entry: a line
    /// can carry many entries, and callers that want "stop at the earliest
    /// instruction for this line" depend on that choice.
    pub fn pc_for_line(&self, line: u32) -> Option<usize> {
        self.source_map
            .iter()
            .find(|entry| entry.line == line)
            .map(|entry| entry.offset as usize)
    }

    /// Serializes the code, symbol table, and source map to the canonical
    /// JSON form, for persisting a compiled program between process runs.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Reconstructs a `BytecodeProgram` from JSON produced by [`Self::to_json`].
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

struct Builder {
    code: Vec<u8>,
    var_names: Vec<String>,
    source_map: Vec<SourceMapEntry>,
}

impl Builder {
    fn new() -> Self {
        Self {
            code: Vec::new(),
            var_names: Vec::new(),
            source_map: Vec::new(),
        }
    }

    fn current_offset(&self) -> u32 {
        self.code.len() as u32
    }

    fn emit_byte(&mut self, byte: u8) -> Result<(), CodegenError> {
        if self.code.len() >= MAX_CODE_SIZE {
            return Err(CodegenError::CodeBufferOverflow);
        }
        self.code.push(byte);
        Ok(())
    }

    fn emit_op(&mut self, op: Opcode) -> Result<(), CodegenError> {
        self.emit_byte(op as u8)
    }

    fn emit_i32(&mut self, value: i32) -> Result<(), CodegenError> {
        for byte in value.to_le_bytes() {
            self.emit_byte(byte)?;
        }
        Ok(())
    }

    fn patch_i32(&mut self, offset: u32, value: i32) {
        let bytes = value.to_le_bytes();
        let at = offset as usize;
        self.code[at..at + 4].copy_from_slice(&bytes);
    }

    fn add_source_map(&mut self, line: u32) {
        if self.source_map.len() >= MAX_SOURCE_MAP {
            return;
        }
        self.source_map.push(SourceMapEntry {
            offset: self.current_offset(),
            line,
        });
    }

    fn slot_for(&mut self, name: &str) -> Result<u32, CodegenError> {
        if let Some(pos) = self.var_names.iter().position(|n| n == name) {
            return Ok(pos as u32);
        }
        if self.var_names.len() >= MAX_VARS {
            return Err(CodegenError::TooManyVariables);
        }
        self.var_names.push(name.to_string());
        Ok((self.var_names.len() - 1) as u32)
    }
}

fn opcode_for_binop(op: BinOp) -> Opcode {
    match op {
        BinOp::Add => Opcode::Add,
        BinOp::Sub => Opcode::Sub,
        BinOp::Mul => Opcode::Mul,
        BinOp::Div => Opcode::Div,
        BinOp::Lt => Opcode::Cmp,
        BinOp::Gt => Opcode::CmpGt,
        BinOp::Le => Opcode::CmpLe,
        BinOp::Ge => Opcode::CmpGe,
        BinOp::Eq => Opcode::CmpEq,
        BinOp::Neq => Opcode::CmpNe,
    }
}

fn lower(node: &Node, b: &mut Builder) -> Result<(), CodegenError> {
    if node.line() > 0 {
        b.add_source_map(node.line());
    }

    match node {
        Node::Int { value, .. } => {
            b.emit_op(Opcode::Push)?;
            b.emit_i32(*value)?;
        }

        Node::Var { name, .. } => {
            let slot = b.slot_for(name)?;
            b.emit_op(Opcode::Load)?;
            b.emit_i32(slot as i32)?;
        }

        Node::BinOp { op, left, right, .. } => {
            lower(left, b)?;
            lower(right, b)?;
            b.emit_op(opcode_for_binop(*op))?;
        }

        Node::Decl { name, init, .. } => {
            let slot = b.slot_for(name)?;
            match init {
                Some(expr) => lower(expr, b)?,
                None => {
                    b.emit_op(Opcode::Push)?;
                    b.emit_i32(0)?;
                }
            }
            b.emit_op(Opcode::Store)?;
            b.emit_i32(slot as i32)?;
        }

        Node::Assign { name, value, .. } => {
            let slot = b.slot_for(name)?;
            lower(value, b)?;
            b.emit_op(Opcode::Store)?;
            b.emit_i32(slot as i32)?;
        }

        Node::Print { value, .. } => {
            lower(value, b)?;
            b.emit_op(Opcode::Print)?;
        }

        Node::If {
            cond,
            then_branch,
            else_branch,
            ..
        } => {
            lower(cond, b)?;
            b.emit_op(Opcode::Jz)?;
            let jz_patch = b.current_offset();
            b.emit_i32(0)?;

            lower(then_branch, b)?;

            match else_branch {
                Some(else_node) => {
                    b.emit_op(Opcode::Jmp)?;
                    let jmp_patch = b.current_offset();
                    b.emit_i32(0)?;

                    let after_then = b.current_offset();
                    b.patch_i32(jz_patch, after_then as i32);

                    lower(else_node, b)?;

                    let after_else = b.current_offset();
                    b.patch_i32(jmp_patch, after_else as i32);
                }
                None => {
                    let after_then = b.current_offset();
                    b.patch_i32(jz_patch, after_then as i32);
                }
            }
        }

        Node::While { cond, body, .. } => {
            let loop_start = b.current_offset();
            lower(cond, b)?;
            b.emit_op(Opcode::Jz)?;
            let jz_patch = b.current_offset();
            b.emit_i32(0)?;

            lower(body, b)?;
            b.emit_op(Opcode::Jmp)?;
            b.emit_i32(loop_start as i32)?;

            let after_loop = b.current_offset();
            b.patch_i32(jz_patch, after_loop as i32);
        }

        Node::Seq { first, second, .. } => {
            lower(first, b)?;
            lower(second, b)?;
        }
    }

    Ok(())
}

/// Compiles an AST into a bytecode program. The emitted stream always ends
/// in `HALT`.
pub fn compile(root: &Node) -> Result<BytecodeProgram, CodegenError> {
    let mut builder = Builder::new();
    lower(root, &mut builder)?;
    builder.emit_op(Opcode::Halt)?;
    Ok(BytecodeProgram {
        code: builder.code,
        var_names: builder.var_names,
        source_map: builder.source_map,
    })
}
