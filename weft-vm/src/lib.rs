//! Weft: a lazy per-function WebAssembly compiler.
//!
//! The compiler lowers the stack-based bytecode of one function at a time
//! into a register-based intermediate representation (basic blocks of packed
//! expression trees), applies intra-block optimizations, and emits a
//! [`target::Proc`] that the bundled tree-walking backend executes against
//! an [`runtime::Instance`]. Functions compile on their first invocation.
//!
//! The crate consumes already-parsed module sections ([`module::ModuleInfo`])
//! and produces callable procedures; binary module parsing and import
//! resolution live outside it.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

pub mod compiler;
pub mod consts;
pub mod error;
pub mod module;
pub mod runtime;
pub mod target;
pub mod util;

pub mod prelude {
    //! Convenience re-exports for embedding the compiler.
    #[doc(no_inline)]
    pub use weft_asm::{Opcode, ValType};

    pub use crate::{
        compiler::{compile_function, CompilerParams},
        error::{CompileError, Trap, VmError},
        module::{FuncBody, FuncType, ModuleInfo},
        runtime::{Instance, Value},
        target::Proc,
    };
}
