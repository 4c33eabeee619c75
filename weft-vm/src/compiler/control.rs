//! Block frames and branch lowering.
//!
//! Each structured control region gets a frame on the compile-time block
//! stack. Frames opened at or below the depth limit lower to labeled target
//! scopes; past it, every frame joins the single dispatch region opened at
//! the boundary and branches become case transfers. A branch consults the
//! *target* frame's own label fields, so branches between the two modes
//! compose.

use crate::error::{CompileError, CompileResult};
use crate::target::{Expr, Stmt};

/// Kind of a structured control region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// `block` (and the implicit outer region).
    Normal,
    /// `loop`.
    Loop,
    /// `if`/`else`.
    IfElse,
}

/// Marker for "this frame uses a native nested label".
pub const NATIVE: i32 = -1;

/// One entry of the compile-time block stack.
#[derive(Debug)]
pub struct BlockFrame {
    /// What the region is.
    pub kind: BlockKind,
    /// Parameter count of the block type.
    pub arg_count: usize,
    /// Result count of the block type.
    pub return_count: usize,
    /// Stack depth just before the block's arguments were pushed.
    pub parent_stack_top: usize,
    /// True after an unconditional transfer until `else`/`end`.
    pub is_dead: bool,
    /// True when the frame was opened inside dead code; such frames only
    /// track nesting and never emit.
    pub born_dead: bool,
    /// [`NATIVE`], or the dispatch case value breaks transfer to.
    pub label_break: i32,
    /// [`NATIVE`], or the dispatch case value of the loop header / else arm.
    pub label_continue_or_else: i32,
    /// The frame that opened the dispatch region closes it at its `end`.
    pub is_dispatch_root: bool,
    /// Native label value: the frame's nesting depth.
    pub native_label: u32,
    /// Emitted statements (the then-arm, for an `if` frame).
    pub stmts: Vec<Stmt>,
    /// The else-arm of a native `if` frame.
    pub else_stmts: Vec<Stmt>,
    /// Whether statements currently land in the else arm.
    pub in_else: bool,
    /// Condition of a native `if` frame, captured at `if`.
    pub if_cond: Option<Expr>,
}

impl BlockFrame {
    /// A native-label frame at nesting depth `depth`.
    pub fn native(
        kind: BlockKind,
        arg_count: usize,
        return_count: usize,
        parent_stack_top: usize,
        depth: u32,
    ) -> Self {
        Self {
            kind,
            arg_count,
            return_count,
            parent_stack_top,
            is_dead: false,
            born_dead: false,
            label_break: NATIVE,
            label_continue_or_else: NATIVE,
            is_dispatch_root: false,
            native_label: depth,
            stmts: Vec::new(),
            else_stmts: Vec::new(),
            in_else: false,
            if_cond: None,
        }
    }

    /// The statement sink instructions currently append to. Only a native
    /// `if` frame has a separate else arm; dispatch frames stay flat and
    /// mark the arm boundary with a case label instead.
    pub fn sink(&mut self) -> &mut Vec<Stmt> {
        if self.in_else && !self.is_dispatch() {
            &mut self.else_stmts
        } else {
            &mut self.stmts
        }
    }

    /// Whether the frame lowers through the dispatch region.
    pub fn is_dispatch(&self) -> bool {
        self.label_break != NATIVE || self.label_continue_or_else != NATIVE
    }
}

/// Emit result/argument slot copies for a branch: values at the current
/// stack top move into the target frame's landing slots. Copies whose
/// source and destination coincide are elided.
fn copy_into(target: &BlockFrame, stack_top: usize, count: usize, out: &mut Vec<Stmt>) {
    let src_base = stack_top - count;
    let dst_base = target.parent_stack_top;
    if src_base == dst_base {
        return;
    }
    for i in 1..=count {
        let src = (src_base + i) as u8;
        let dst = (dst_base + i) as u8;
        out.push(Stmt::Assign {
            slot: dst,
            value: Expr::Slot(src),
        });
    }
}

/// Lower a branch to relative `depth` into `out`: slot copies followed by
/// the transfer the target frame's labels call for. Depth equal to the
/// whole stack (the implicit outer block) lowers to a return.
pub fn jump(
    blocks: &[BlockFrame],
    stack_top: usize,
    depth: usize,
    out: &mut Vec<Stmt>,
) -> CompileResult<()> {
    let target_index = blocks
        .len()
        .checked_sub(depth + 1)
        .ok_or(CompileError::Internal("branch depth exceeds block stack"))?;
    if target_index == 0 {
        out.push(function_return(blocks, stack_top));
        return Ok(());
    }
    let target = &blocks[target_index];
    match target.kind {
        BlockKind::Loop => {
            copy_into(target, stack_top, target.arg_count, out);
            match target.label_continue_or_else {
                NATIVE => out.push(Stmt::Continue(target.native_label)),
                case => out.push(Stmt::Jump(case as u32)),
            }
        }
        BlockKind::Normal | BlockKind::IfElse => {
            copy_into(target, stack_top, target.return_count, out);
            match target.label_break {
                NATIVE => out.push(Stmt::Break(target.native_label)),
                case => out.push(Stmt::Jump(case as u32)),
            }
        }
    }
    Ok(())
}

/// Lower a return: arity 0 yields nothing, arity 1 the top slot, arity 2+
/// the top slots as an ordered group.
pub fn function_return(blocks: &[BlockFrame], stack_top: usize) -> Stmt {
    let arity = blocks[0].return_count;
    let values = (0..arity)
        .map(|i| Expr::Slot((stack_top - arity + 1 + i) as u8))
        .collect();
    Stmt::Return(values)
}
