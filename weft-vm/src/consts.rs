//! Compiler parameters and structural limits.

/// Highest virtual stack slot a function may keep live at once. The slot is
/// stored in the top 8 bits of a packed node header, so this bound is
/// structural; exceeding it fails compilation with
/// [`CompileError::DeepStack`](crate::error::CompileError::DeepStack).
pub const STACK_SLOT_LIMIT: usize = 255;

/// Default block nesting depth past which branch lowering switches from
/// nested labeled scopes to a single dispatch loop.
pub const BLOCK_DEPTH_LIMIT: usize = 256;

/// Default capacity, in 32-bit words, of the per-compilation expression
/// arena. A single basic block whose expression forest outgrows it fails
/// compilation.
pub const AST_CAPACITY: usize = 1 << 16;

/// Size of one linear memory page, in bytes.
pub const PAGE_SIZE: usize = 65536;

static_assertions::const_assert!(STACK_SLOT_LIMIT <= 0xFF);
static_assertions::const_assert!(AST_CAPACITY <= i32::MAX as usize);
