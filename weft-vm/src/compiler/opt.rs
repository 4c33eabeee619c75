//! The per-block optimizer.
//!
//! Runs when a basic block closes: single-byte loads are rewritten to their
//! direct-index variants, producers are inlined into consumers by a reverse
//! scan over the block's top-level nodes, and expressions fold constants and
//! algebraic identities as the emitter builds them.

use weft_asm::Opcode;

use super::ast::{AstStore, NodePtr};
use super::emit;
use crate::error::CompileResult;
use crate::target::{Expr, Stmt};

/// Close a basic block: optimize its node list, emit the surviving nodes as
/// statements, and reset the arena and sidecars.
///
/// With `extract`, the top-of-stack producer comes back as a free-standing
/// expression instead of an assignment when it is the block's final live
/// node, so a control condition needs no temporary. The caller owns the
/// matching `stack_top` decrement.
pub(crate) fn finalize_block(
    store: &mut AstStore,
    ast_ptrs: &mut Vec<Option<NodePtr>>,
    consts64: &mut Vec<i64>,
    bytes: &[u8],
    extract: bool,
    stack_top: usize,
) -> CompileResult<(Vec<Stmt>, Option<Expr>)> {
    rewrite_byte_loads(store, ast_ptrs)?;
    inline_pass(store, ast_ptrs)?;

    let mut extracted: Option<(usize, Expr)> = None;
    if extract {
        if let Some(i) = ast_ptrs.iter().rposition(|p| p.is_some()) {
            if let Some(ptr) = ast_ptrs[i] {
                // tee carries a local write, so it must stay a statement;
                // the caller reads the condition from its slot instead
                if store.out_slot(ptr) == stack_top && store.opcode(ptr)? != Opcode::LocalTee {
                    extracted = Some((i, emit::expr_for_node(store, consts64, bytes, ptr)?));
                }
            }
        }
    }
    let skip_index = extracted.as_ref().map(|(i, _)| *i);

    let mut stmts = Vec::new();
    for (i, entry) in ast_ptrs.iter().enumerate() {
        if Some(i) == skip_index {
            continue;
        }
        if let Some(ptr) = *entry {
            stmts.push(emit::stmt_for_node(store, consts64, bytes, ptr)?);
        }
    }

    tracing::debug!(
        nodes = ast_ptrs.len(),
        statements = stmts.len(),
        "basic block finalized"
    );

    ast_ptrs.clear();
    store.reset();
    consts64.clear();
    Ok((stmts, extracted.map(|(_, e)| e)))
}

/// Single-byte unsigned loads index the byte view directly instead of going
/// through the data view.
fn rewrite_byte_loads(store: &mut AstStore, ast_ptrs: &[Option<NodePtr>]) -> CompileResult<()> {
    for &entry in ast_ptrs {
        let Some(ptr) = entry else { continue };
        match store.opcode(ptr)? {
            Opcode::I32Load8U => store.set_opcode(ptr, Opcode::U32Load),
            Opcode::I64Load8U => store.set_opcode(ptr, Opcode::S64Load),
            _ => {}
        }
    }
    Ok(())
}

/// Producers that may be inlined past a memory-touching consumer. Growing
/// memory between operand evaluation and the access would otherwise be
/// reordered against the access itself.
fn crosses_memory_barrier(op: Opcode) -> bool {
    matches!(op, Opcode::I32Const | Opcode::I64Const | Opcode::LocalGet)
}

/// Reverse scan over the block's top-level nodes, folding each producer
/// into its (unique) consumer where the move is order-safe.
fn inline_pass(store: &mut AstStore, ast_ptrs: &mut [Option<NodePtr>]) -> CompileResult<()> {
    for i in (0..ast_ptrs.len()).rev() {
        let Some(parent) = ast_ptrs[i] else { continue };
        inline_children(store, ast_ptrs, parent, i)?;
    }
    Ok(())
}

/// For each slot-referencing child of `parent`, the nearest earlier live
/// node writing that slot is the producer. The backward search skips
/// entries already inlined and the in-place sign-coercion nodes (their slot
/// is overwritten where it stands); any other intervening live node carries
/// an ordering obligation and halts the search. Children scan right to left
/// so that a consumer's own operands are folded away before they can halt a
/// sibling's search, and an inlined producer's children continue the fold
/// from its own position.
fn inline_children(
    store: &mut AstStore,
    ast_ptrs: &mut [Option<NodePtr>],
    parent: NodePtr,
    position: usize,
) -> CompileResult<()> {
    let parent_op = store.opcode(parent)?;
    if parent_op == Opcode::LocalTee {
        // tee assigns its own slot in place; its operand must stay put
        return Ok(());
    }
    let barrier = parent_op.touches_memory();
    for c in (0..store.child_count(parent)).rev() {
        let word = store.child(parent, c);
        if word >= 0 {
            continue;
        }
        let slot = word.unsigned_abs() as usize;
        for j in (0..position).rev() {
            let Some(producer) = ast_ptrs[j] else { continue };
            let producer_op = store.opcode(producer)?;
            if store.out_slot(producer) == slot {
                let blocked = (barrier && !crosses_memory_barrier(producer_op))
                    || producer_op == Opcode::LocalTee;
                if !blocked {
                    store.set_child(parent, c, producer as i32);
                    ast_ptrs[j] = None;
                    inline_children(store, ast_ptrs, producer, j)?;
                }
                break;
            }
            if matches!(producer_op, Opcode::ToU32 | Opcode::ToS64) {
                continue;
            }
            break;
        }
    }
    Ok(())
}

fn is_boolean(expr: &Expr) -> bool {
    let op = match expr {
        Expr::Unary(op, _) => *op,
        Expr::Binary(op, _, _) => *op,
        _ => return false,
    };
    // comparison range plus the boolean pseudo-ops
    (0x45..=0x66).contains(&op.to_u8())
        || matches!(op, Opcode::Bool | Opcode::BoolNot | Opcode::BoolToInt)
}

/// Local expression rewriting, applied bottom-up as the emitter builds each
/// expression. Every rule preserves the observable result.
pub(crate) fn fold(expr: Expr) -> Expr {
    match expr {
        Expr::Unary(op, inner) => fold_unary(op, *inner),
        Expr::Binary(op, a, b) => fold_binary(op, *a, *b),
        other => other,
    }
}

fn fold_unary(op: Opcode, inner: Expr) -> Expr {
    use Opcode::*;
    if let Some(folded) = fold_unary_const(op, &inner) {
        return folded;
    }
    match op {
        // a comparison is already a widened 0/1 value
        Bool | BoolToInt if is_boolean(&inner) => inner,
        // reinterpretation pseudo-ops are transparent over literals
        ToU32 if matches!(inner, Expr::I32Const(_)) => inner,
        ToS64 if matches!(inner, Expr::I64Const(_)) => inner,
        _ => Expr::Unary(op, Box::new(inner)),
    }
}

fn fold_unary_const(op: Opcode, inner: &Expr) -> Option<Expr> {
    use Opcode::*;
    let folded = match (op, inner) {
        (I32Eqz, Expr::I32Const(v)) => Expr::I32Const(i32::from(*v == 0)),
        (I64Eqz, Expr::I64Const(v)) => Expr::I32Const(i32::from(*v == 0)),
        (I32WrapI64, Expr::I64Const(v)) => Expr::I32Const(*v as i32),
        (I64ExtendI32S, Expr::I32Const(v)) => Expr::I64Const(i64::from(*v)),
        (I64ExtendI32U, Expr::I32Const(v)) => Expr::I64Const(i64::from(*v as u32)),
        (I32Extend8S, Expr::I32Const(v)) => Expr::I32Const(*v as i8 as i32),
        (I32Extend16S, Expr::I32Const(v)) => Expr::I32Const(*v as i16 as i32),
        (I64Extend8S, Expr::I64Const(v)) => Expr::I64Const(*v as i8 as i64),
        (I64Extend16S, Expr::I64Const(v)) => Expr::I64Const(*v as i16 as i64),
        (I64Extend32S, Expr::I64Const(v)) => Expr::I64Const(*v as i32 as i64),
        (Bool | BoolToInt, Expr::I32Const(v)) => Expr::I32Const(i32::from(*v != 0)),
        (BoolNot, Expr::I32Const(v)) => Expr::I32Const(i32::from(*v == 0)),
        _ => return None,
    };
    Some(folded)
}

fn fold_binary(op: Opcode, a: Expr, b: Expr) -> Expr {
    use Opcode::*;

    if let (Expr::I32Const(x), Expr::I32Const(y)) = (&a, &b) {
        let (x, y) = (*x, *y);
        let folded = match op {
            I32Add => Some(x.wrapping_add(y)),
            I32Sub => Some(x.wrapping_sub(y)),
            I32Mul => Some(x.wrapping_mul(y)),
            I32And => Some(x & y),
            I32Or => Some(x | y),
            I32Xor => Some(x ^ y),
            I32Shl => Some(x.wrapping_shl(y as u32)),
            I32ShrS => Some(x.wrapping_shr(y as u32)),
            I32ShrU => Some(((x as u32).wrapping_shr(y as u32)) as i32),
            I32Eq => Some(i32::from(x == y)),
            I32Ne => Some(i32::from(x != y)),
            I32LtS => Some(i32::from(x < y)),
            I32GtS => Some(i32::from(x > y)),
            I32LeS => Some(i32::from(x <= y)),
            I32GeS => Some(i32::from(x >= y)),
            // division folds would have to reproduce trapping; leave them
            _ => None,
        };
        if let Some(v) = folded {
            return Expr::I32Const(v);
        }
    }

    if let (Expr::I64Const(x), Expr::I64Const(y)) = (&a, &b) {
        let (x, y) = (*x, *y);
        let folded = match op {
            I64Add => Some(Expr::I64Const(x.wrapping_add(y))),
            I64Sub => Some(Expr::I64Const(x.wrapping_sub(y))),
            I64Mul => Some(Expr::I64Const(x.wrapping_mul(y))),
            I64And => Some(Expr::I64Const(x & y)),
            I64Or => Some(Expr::I64Const(x | y)),
            I64Xor => Some(Expr::I64Const(x ^ y)),
            I64Shl => Some(Expr::I64Const(x.wrapping_shl(y as u32))),
            I64ShrS => Some(Expr::I64Const(x.wrapping_shr(y as u32))),
            I64ShrU => Some(Expr::I64Const(((x as u64).wrapping_shr(y as u32)) as i64)),
            I64Eq => Some(Expr::I32Const(i32::from(x == y))),
            I64Ne => Some(Expr::I32Const(i32::from(x != y))),
            _ => None,
        };
        if let Some(e) = folded {
            return e;
        }
    }

    // identities: only the constant operand is eliminated
    match (op, &b) {
        (
            I32Add | I32Sub | I32Or | I32Xor | I32Shl | I32ShrS | I32ShrU | I32Rotl | I32Rotr,
            Expr::I32Const(0),
        ) => return a,
        (I32Mul, Expr::I32Const(1)) => return a,
        (
            I64Add | I64Sub | I64Or | I64Xor | I64Shl | I64ShrS | I64ShrU | I64Rotl | I64Rotr,
            Expr::I64Const(0),
        ) => return a,
        (I64Mul, Expr::I64Const(1)) => return a,
        _ => {}
    }
    match (op, &a) {
        (I32Add | I32Or | I32Xor, Expr::I32Const(0)) => return b,
        (I32Mul, Expr::I32Const(1)) => return b,
        (I64Add | I64Or | I64Xor, Expr::I64Const(0)) => return b,
        (I64Mul, Expr::I64Const(1)) => return b,
        _ => {}
    }

    Expr::Binary(op, Box::new(a), Box::new(b))
}
