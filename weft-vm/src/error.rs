//! Compilation and execution error types.

use weft_asm::{InvalidOpcode, ReadError};

use crate::consts::STACK_SLOT_LIMIT;

/// Result alias for compilation-time operations.
pub type CompileResult<T> = Result<T, CompileError>;

/// Failure while compiling one function. Every variant aborts the function's
/// compilation; partial output is discarded and nothing is cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// The opcode byte (or `0xFC` sub-opcode) is outside the modeled subset.
    #[error("unsupported instruction 0x{0:02x}")]
    UnsupportedInstruction(u8),
    /// A bulk-memory or memory-size operation addressed a non-zero memory.
    #[error("only memory index zero is supported")]
    UnsupportedMemoryIndex,
    /// An indirect call addressed a non-zero table.
    #[error("only table index zero is supported")]
    UnsupportedTableIndex,
    /// More than [`STACK_SLOT_LIMIT`] operand slots were live at one point.
    #[error("more than {STACK_SLOT_LIMIT} operand stack slots are live")]
    DeepStack,
    /// The bytecode stream ended or mis-encoded an immediate.
    #[error("malformed function body: {0}")]
    MalformedBody(#[from] ReadError),
    /// One basic block's expression forest outgrew the arena.
    #[error("expression arena capacity exhausted")]
    AstCapacity,
    /// An invariant the decoder establishes did not hold at emission.
    /// This never fires for well-formed input.
    #[error("internal invariant violated: {0}")]
    Internal(&'static str),
}

impl From<InvalidOpcode> for CompileError {
    fn from(err: InvalidOpcode) -> Self {
        Self::UnsupportedInstruction(err.0)
    }
}

/// Run-time fault raised by the execution backend. The compiler does not
/// model precise WebAssembly trapping beyond what the backend naturally
/// produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Trap {
    /// An `unreachable` instruction was executed.
    #[error("unreachable executed")]
    Unreachable,
    /// A linear memory access fell outside the current memory size.
    #[error("out of bounds memory access")]
    OutOfBoundsMemoryAccess,
    /// Integer division or remainder by zero.
    #[error("integer divide by zero")]
    IntegerDivideByZero,
    /// `i32.div_s`/`i64.div_s` overflow (minimum value divided by -1).
    #[error("integer overflow")]
    IntegerOverflow,
    /// An indirect call went through an uninitialized table slot.
    #[error("undefined table element")]
    UndefinedTableEntry,
    /// An indirect call target's signature did not match the expected type.
    #[error("indirect call type mismatch")]
    IndirectCallTypeMismatch,
    /// A value of the wrong type reached an operation or an invocation.
    #[error("value type mismatch")]
    ValueTypeMismatch,
    /// The referenced function, table, global or type index does not exist.
    #[error("index out of range")]
    IndexOutOfRange,
}

/// Either side of the instance surface: a compilation failure on the first
/// invocation of a function, or a trap while running it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmError {
    /// Lazy compilation of the invoked (or a transitively called) function
    /// failed.
    #[error("compilation failed: {0}")]
    Compile(#[from] CompileError),
    /// The compiled code trapped.
    #[error("trap: {0}")]
    Trap(#[from] Trap),
}
