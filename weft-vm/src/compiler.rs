//! The per-function compilation pipeline.
//!
//! One function compiles in a single pass: the decoder streams the body,
//! maintaining a virtual operand stack of numbered slots and accumulating
//! packed expression nodes per basic block; at every block boundary the
//! per-block optimizer inlines producers into consumers and the emitter
//! lowers the surviving nodes to target statements, interleaved with the
//! control-flow lowerer's labels and branches.

pub(crate) mod ast;
pub(crate) mod control;
mod decode;
mod emit;
mod opt;

use crate::consts::{AST_CAPACITY, BLOCK_DEPTH_LIMIT};
use crate::error::CompileResult;
use crate::module::ModuleInfo;
use crate::target::Proc;

/// Tunables for one compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerParams {
    /// Block nesting depth past which branch lowering switches to the
    /// dispatch loop.
    pub block_depth_limit: usize,
    /// Capacity of the expression arena, in 32-bit words.
    pub ast_capacity: usize,
}

impl Default for CompilerParams {
    fn default() -> Self {
        Self {
            block_depth_limit: BLOCK_DEPTH_LIMIT,
            ast_capacity: AST_CAPACITY,
        }
    }
}

/// Compile the function at `func_index` into a callable procedure.
///
/// The compilation is deterministic: compiling the same function twice
/// yields identical procedures. On error the partial output is discarded.
#[tracing::instrument(name = "compile", skip(module, params))]
pub fn compile_function(
    module: &ModuleInfo,
    params: &CompilerParams,
    func_index: u32,
) -> CompileResult<Proc> {
    let proc = decode::FuncCompiler::new(module, params, func_index)?.run()?;
    tracing::debug!(
        name = %proc.name,
        slots = proc.slot_count,
        "function compiled"
    );
    Ok(proc)
}
