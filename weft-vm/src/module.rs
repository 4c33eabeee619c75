//! Parsed module sections consumed by the compiler.
//!
//! The binary module parser is an external collaborator; this module only
//! defines the shape of its output. `bytes` keeps the whole module image
//! because IEEE-754 constants are stored in expression nodes as file offsets
//! and read back at emission time.

use std::collections::HashMap;

use weft_asm::ValType;

use crate::error::{CompileError, CompileResult};

/// A function signature from the type section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuncType {
    /// Parameter types, in order.
    pub params: Vec<ValType>,
    /// Result types, in order.
    pub results: Vec<ValType>,
}

/// One entry of the code section: local declarations plus the byte range of
/// the body's instruction stream within the module image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncBody {
    /// Run-length encoded local declarations, as `(count, type)` groups.
    pub locals: Vec<(u32, ValType)>,
    /// Offset of the first instruction byte.
    pub code_start: usize,
    /// Offset one past the terminating `end` opcode.
    pub code_end: usize,
}

/// The sections of a parsed module that function compilation consumes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleInfo {
    /// The raw module image.
    pub bytes: Vec<u8>,
    /// The type section.
    pub types: Vec<FuncType>,
    /// The function section: function index to type index.
    pub functions: Vec<u32>,
    /// The code section, parallel to `functions`.
    pub bodies: Vec<FuncBody>,
    /// Debug names from the name section, keyed by function index.
    pub names: HashMap<u32, String>,
}

impl ModuleInfo {
    /// Signature of the function at `func`.
    pub fn func_type(&self, func: u32) -> CompileResult<&FuncType> {
        let type_index = *self
            .functions
            .get(func as usize)
            .ok_or(CompileError::Internal("function index out of range"))?;
        self.type_at(type_index)
    }

    /// Entry of the type section at `type_index`.
    pub fn type_at(&self, type_index: u32) -> CompileResult<&FuncType> {
        self.types
            .get(type_index as usize)
            .ok_or(CompileError::Internal("type index out of range"))
    }

    /// Body of the function at `func`.
    pub fn body(&self, func: u32) -> CompileResult<&FuncBody> {
        self.bodies
            .get(func as usize)
            .ok_or(CompileError::Internal("code index out of range"))
    }

    /// The name the compiled callable is bound under: `wasm:<name>` when the
    /// name section has an entry, `wasm:function[<codeIndex>]` otherwise.
    pub fn public_name(&self, func: u32) -> String {
        match self.names.get(&func) {
            Some(name) => format!("wasm:{name}"),
            None => format!("wasm:function[{func}]"),
        }
    }
}
