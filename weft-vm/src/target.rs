//! The emission target: a compiled procedure as a typed statement tree.
//!
//! The emitter lowers finalized expression nodes into this representation
//! instead of concatenating host source text; the bundled backend in
//! [`crate::runtime::exec`] walks it directly. The control constructs mirror
//! the two branch lowering modes: labeled blocks and loops with labeled
//! break/continue below the depth limit, and a [`Stmt::Dispatch`] loop with
//! interleaved [`Stmt::CaseLabel`] markers and [`Stmt::Jump`] transfers past
//! it.

use weft_asm::{Opcode, ValType};

/// A target expression, produced for every value-yielding node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// 32-bit integer literal.
    I32Const(i32),
    /// 64-bit integer literal, resolved from the block's constant sidecar.
    I64Const(i64),
    /// 32-bit float literal, read back from the module image.
    F32Const(f32),
    /// 64-bit float literal, read back from the module image.
    F64Const(f64),
    /// Read of a numbered operand stack slot.
    Slot(u8),
    /// Read of an argument or declared local.
    Local(u32),
    /// Read of a module global.
    Global(u32),
    /// A one-operand operation, tagged with its source opcode.
    Unary(Opcode, Box<Expr>),
    /// A two-operand operation, tagged with its source opcode.
    Binary(Opcode, Box<Expr>, Box<Expr>),
    /// `select`: both value operands evaluate before the condition picks one.
    Select {
        /// The `i32` condition.
        cond: Box<Expr>,
        /// Value produced when the condition is non-zero.
        if_true: Box<Expr>,
        /// Value produced when the condition is zero.
        if_false: Box<Expr>,
    },
    /// A linear memory load; the opcode selects width and extension.
    Load {
        /// The load opcode (including the direct byte-index variants).
        op: Opcode,
        /// Dynamic address operand, interpreted unsigned.
        addr: Box<Expr>,
        /// Static offset added to the address.
        offset: u32,
    },
    /// Current page count of linear memory.
    MemorySize,
    /// Grow linear memory, yielding the previous page count or -1.
    MemoryGrow(Box<Expr>),
    /// A direct call to a single-result function, usable inline.
    Call {
        /// Target function index.
        func: u32,
        /// Argument expressions, in order.
        args: Vec<Expr>,
    },
    /// An indirect call to a single-result function through the table.
    CallIndirect {
        /// Expected signature's type index.
        type_index: u32,
        /// Dynamic table element index.
        func: Box<Expr>,
        /// Argument expressions, in order.
        args: Vec<Expr>,
    },
}

/// Target of a statement-level call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
    /// Direct call to a function index.
    Direct(u32),
    /// Indirect call through the table against an expected type index.
    Indirect {
        /// Expected signature's type index.
        type_index: u32,
        /// Dynamic table element index.
        func: Expr,
    },
}

/// A target statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Assign an expression's value to a stack slot.
    Assign {
        /// Destination slot (1-based).
        slot: u8,
        /// The value.
        value: Expr,
    },
    /// Assign to an argument or declared local.
    SetLocal {
        /// Local index (arguments first).
        local: u32,
        /// The value.
        value: Expr,
    },
    /// Assign to a module global.
    SetGlobal {
        /// Global index.
        global: u32,
        /// The value.
        value: Expr,
    },
    /// A linear memory store; the opcode selects width.
    Store {
        /// The store opcode.
        op: Opcode,
        /// Dynamic address operand, interpreted unsigned.
        addr: Expr,
        /// Stored value.
        value: Expr,
        /// Static offset added to the address.
        offset: u32,
    },
    /// `memory.copy`; operands evaluate in destination, source, length order.
    MemoryCopy {
        /// Destination address.
        dst: Expr,
        /// Source address.
        src: Expr,
        /// Byte count.
        len: Expr,
    },
    /// `memory.fill`; operands evaluate in destination, value, length order.
    MemoryFill {
        /// Destination address.
        dst: Expr,
        /// Fill byte (low 8 bits of an `i32`).
        value: Expr,
        /// Byte count.
        len: Expr,
    },
    /// A call whose results (zero, or two and more, destructured into
    /// consecutive slots) keep it at statement level.
    Call {
        /// Direct or indirect callee.
        target: CallTarget,
        /// Argument expressions, in order.
        args: Vec<Expr>,
        /// `(first_slot, count)` destination for multi-value results.
        results: Option<(u8, u8)>,
    },
    /// Evaluate an expression for its effects and discard the value.
    Expr(Expr),
    /// A labeled scope; `Break` with the same label exits past it.
    Block {
        /// Label value (the block's nesting depth).
        label: u32,
        /// Scope body.
        body: Vec<Stmt>,
    },
    /// A labeled loop; `Continue` with the same label restarts it. Falling
    /// off the end exits (back-edges are always explicit).
    Loop {
        /// Label value (the loop's nesting depth).
        label: u32,
        /// Loop body.
        body: Vec<Stmt>,
    },
    /// Two-armed conditional.
    If {
        /// `i32` condition; non-zero selects the first arm.
        cond: Expr,
        /// Taken when the condition is non-zero.
        then_body: Vec<Stmt>,
        /// Taken when the condition is zero.
        else_body: Vec<Stmt>,
    },
    /// Exit the enclosing `Block` (or `Dispatch` region) with this label.
    Break(u32),
    /// Restart the enclosing `Loop` with this label.
    Continue(u32),
    /// The shared dispatch loop opened at the block depth limit. Executes
    /// `body` top to bottom; a `Jump` re-enters at the matching `CaseLabel`
    /// and falls through from there.
    Dispatch {
        /// Flattened statements of every block past the depth limit.
        body: Vec<Stmt>,
    },
    /// A dispatch case marker; inert when reached by fallthrough.
    CaseLabel(u32),
    /// Transfer to a dispatch case label.
    Jump(u32),
    /// `br_table`: index selects a branch arm, out-of-range takes `fallback`.
    Table {
        /// The `i32` selector.
        index: Expr,
        /// One arm (result copies plus a transfer) per table entry.
        targets: Vec<Vec<Stmt>>,
        /// The default arm.
        fallback: Vec<Stmt>,
    },
    /// Return from the procedure with the given values.
    Return(Vec<Expr>),
    /// Hard trap (`unreachable`).
    Trap,
}

/// A compiled function: the callable the compiler produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Proc {
    /// Public binding name (`wasm:<name>` or `wasm:function[<codeIndex>]`).
    pub name: String,
    /// Parameter types.
    pub params: Vec<ValType>,
    /// Declared locals, expanded from their run-length groups; each is
    /// zero-initialized in its own type.
    pub locals: Vec<ValType>,
    /// High-water mark of operand stack slots; the backend allocates
    /// `s1..=s<slot_count>`.
    pub slot_count: usize,
    /// Number of results.
    pub result_count: usize,
    /// The function body.
    pub body: Vec<Stmt>,
}
