//! The instance context and execution backend.
//!
//! [`Instance`] is what the linker hands back: the compiled-function cache,
//! the funcref table, the globals, and linear memory. Functions compile
//! lazily on their first invocation; the compiled procedure is cached so a
//! second call pays nothing. Execution is single-threaded and synchronous.

pub(crate) mod exec;
pub mod library;
mod memory;

use std::sync::Arc;

use weft_asm::ValType;

use crate::compiler::{compile_function, CompilerParams};
use crate::error::{Trap, VmError};
use crate::module::ModuleInfo;
use crate::target::Proc;

pub use memory::LinearMemory;

/// A runtime value of one of the four number types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// 32-bit integer.
    I32(i32),
    /// 64-bit integer.
    I64(i64),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
}

impl Value {
    /// The value's type.
    pub fn ty(self) -> ValType {
        match self {
            Self::I32(_) => ValType::I32,
            Self::I64(_) => ValType::I64,
            Self::F32(_) => ValType::F32,
            Self::F64(_) => ValType::F64,
        }
    }

    /// The zero of `ty`, used to initialize declared locals.
    pub fn zero(ty: ValType) -> Self {
        match ty {
            ValType::I32 => Self::I32(0),
            ValType::I64 => Self::I64(0),
            ValType::F32 => Self::F32(0.0),
            ValType::F64 => Self::F64(0.0),
        }
    }

    pub(crate) fn as_i32(self) -> Result<i32, Trap> {
        match self {
            Self::I32(v) => Ok(v),
            _ => Err(Trap::ValueTypeMismatch),
        }
    }

    pub(crate) fn as_i64(self) -> Result<i64, Trap> {
        match self {
            Self::I64(v) => Ok(v),
            _ => Err(Trap::ValueTypeMismatch),
        }
    }

    pub(crate) fn as_f32(self) -> Result<f32, Trap> {
        match self {
            Self::F32(v) => Ok(v),
            _ => Err(Trap::ValueTypeMismatch),
        }
    }

    pub(crate) fn as_f64(self) -> Result<f64, Trap> {
        match self {
            Self::F64(v) => Ok(v),
            _ => Err(Trap::ValueTypeMismatch),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

/// An instantiated module: compiled-function cache plus the mutable state
/// the emitted code touches.
#[derive(Debug)]
pub struct Instance {
    module: ModuleInfo,
    params: CompilerParams,
    procs: Vec<Option<Arc<Proc>>>,
    /// The funcref table for indirect calls; `None` entries trap.
    pub table: Vec<Option<u32>>,
    /// Module globals, indexed by the emitted code.
    pub globals: Vec<Value>,
    /// Linear memory zero.
    pub memory: LinearMemory,
}

impl Instance {
    /// Instance over `module` with no memory, table or globals.
    pub fn new(module: ModuleInfo) -> Self {
        let function_count = module.bodies.len();
        Self {
            module,
            params: CompilerParams::default(),
            procs: vec![None; function_count],
            table: Vec::new(),
            globals: Vec::new(),
            memory: LinearMemory::new(0, 0),
        }
    }

    /// Replace the compiler parameters.
    pub fn with_params(mut self, params: CompilerParams) -> Self {
        self.params = params;
        self
    }

    /// Attach linear memory with `initial` pages, growable to `max_pages`.
    pub fn with_memory(mut self, initial: u32, max_pages: u32) -> Self {
        self.memory = LinearMemory::new(initial, max_pages);
        self
    }

    /// Attach the funcref table.
    pub fn with_table(mut self, entries: Vec<Option<u32>>) -> Self {
        self.table = entries;
        self
    }

    /// Attach the globals.
    pub fn with_globals(mut self, values: Vec<Value>) -> Self {
        self.globals = values;
        self
    }

    /// The parsed sections this instance runs.
    pub fn module(&self) -> &ModuleInfo {
        &self.module
    }

    /// The compiled procedure for `func`, compiling it now if this is the
    /// first time it is needed. A failed compilation caches nothing.
    pub fn proc(&mut self, func: u32) -> Result<Arc<Proc>, VmError> {
        match self.procs.get(func as usize) {
            None => return Err(Trap::IndexOutOfRange.into()),
            Some(Some(compiled)) => return Ok(Arc::clone(compiled)),
            Some(None) => {}
        }
        tracing::debug!(func, "compiling on first invocation");
        let compiled = Arc::new(compile_function(&self.module, &self.params, func)?);
        self.procs[func as usize] = Some(Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Invoke the function at `func` with `args`.
    pub fn invoke(&mut self, func: u32, args: &[Value]) -> Result<Vec<Value>, VmError> {
        let proc = self.proc(func)?;
        exec::run(self, &proc, args)
    }

    /// Invoke by public name (`wasm:<name>` or `wasm:function[<index>]`).
    pub fn invoke_named(&mut self, name: &str, args: &[Value]) -> Result<Vec<Value>, VmError> {
        let func = (0..self.module.bodies.len() as u32)
            .find(|&i| self.module.public_name(i) == name)
            .ok_or(Trap::IndexOutOfRange)?;
        self.invoke(func, args)
    }
}
