//! Node-to-target emission.
//!
//! Every finalized expression node lowers to one target construct. Nodes
//! with a result slot become assignments (or free-standing expressions when
//! the optimizer extracts a control condition); the rest become statements.
//! 64-bit integer literals resolve through the block's constant sidecar and
//! IEEE-754 literals are read back from the module image here, at emission
//! time.

use weft_asm::{read_f32, read_f64, Opcode};

use super::ast::{AstStore, NodePtr};
use super::opt;
use crate::error::{CompileError, CompileResult};
use crate::target::{CallTarget, Expr, Stmt};

fn child_expr(
    store: &AstStore,
    consts64: &[i64],
    bytes: &[u8],
    ptr: NodePtr,
    i: usize,
) -> CompileResult<Expr> {
    let word = store.child(ptr, i);
    if word < 0 {
        let slot = word.unsigned_abs();
        u8::try_from(slot)
            .map(Expr::Slot)
            .map_err(|_| CompileError::Internal("slot reference exceeds the slot limit"))
    } else {
        expr_for_node(store, consts64, bytes, word as usize)
    }
}

fn extra_u32(store: &AstStore, ptr: NodePtr, i: usize) -> u32 {
    store.extra(ptr, i) as u32
}

/// Lower a value-yielding node to a target expression.
pub(crate) fn expr_for_node(
    store: &AstStore,
    consts64: &[i64],
    bytes: &[u8],
    ptr: NodePtr,
) -> CompileResult<Expr> {
    use Opcode::*;

    let op = store.opcode(ptr)?;
    let expr = match op {
        I32Const => Expr::I32Const(store.extra(ptr, 0)),
        I64Const => {
            let index = extra_u32(store, ptr, 0) as usize;
            let value = *consts64
                .get(index)
                .ok_or(CompileError::Internal("constant sidecar index out of range"))?;
            Expr::I64Const(value)
        }
        F32Const => {
            let offset = extra_u32(store, ptr, 0) as usize;
            Expr::F32Const(
                read_f32(bytes, offset)
                    .ok_or(CompileError::Internal("float constant offset out of range"))?,
            )
        }
        F64Const => {
            let offset = extra_u32(store, ptr, 0) as usize;
            Expr::F64Const(
                read_f64(bytes, offset)
                    .ok_or(CompileError::Internal("float constant offset out of range"))?,
            )
        }
        LocalGet => Expr::Local(extra_u32(store, ptr, 0)),
        GlobalGet => Expr::Global(extra_u32(store, ptr, 0)),
        I32Load | I64Load | F32Load | F64Load | I32Load8S | I32Load8U | I32Load16S
        | I32Load16U | I64Load8S | I64Load8U | I64Load16S | I64Load16U | I64Load32S
        | I64Load32U | U32Load | S64Load => Expr::Load {
            op,
            addr: Box::new(child_expr(store, consts64, bytes, ptr, 0)?),
            offset: extra_u32(store, ptr, 0),
        },
        MemorySize => Expr::MemorySize,
        MemoryGrow => Expr::MemoryGrow(Box::new(child_expr(store, consts64, bytes, ptr, 0)?)),
        Select => Expr::Select {
            cond: Box::new(child_expr(store, consts64, bytes, ptr, 0)?),
            if_true: Box::new(child_expr(store, consts64, bytes, ptr, 1)?),
            if_false: Box::new(child_expr(store, consts64, bytes, ptr, 2)?),
        },
        Call => Expr::Call {
            func: extra_u32(store, ptr, 0),
            args: arg_exprs(store, consts64, bytes, ptr, store.child_count(ptr))?,
        },
        CallIndirect => {
            let argc = store.child_count(ptr) - 1;
            Expr::CallIndirect {
                type_index: extra_u32(store, ptr, 0),
                func: Box::new(child_expr(store, consts64, bytes, ptr, argc)?),
                args: arg_exprs(store, consts64, bytes, ptr, argc)?,
            }
        }
        // tee writes a local as it passes its value through; dropping that
        // write would be silent miscompilation, so it never lowers to an
        // expression
        LocalTee => {
            return Err(CompileError::Internal("local.tee in expression position"))
        }
        _ => match store.child_count(ptr) {
            1 => Expr::Unary(op, Box::new(child_expr(store, consts64, bytes, ptr, 0)?)),
            2 => Expr::Binary(
                op,
                Box::new(child_expr(store, consts64, bytes, ptr, 0)?),
                Box::new(child_expr(store, consts64, bytes, ptr, 1)?),
            ),
            _ => return Err(CompileError::Internal("unknown node opcode during emission")),
        },
    };
    Ok(opt::fold(expr))
}

fn arg_exprs(
    store: &AstStore,
    consts64: &[i64],
    bytes: &[u8],
    ptr: NodePtr,
    count: usize,
) -> CompileResult<Vec<Expr>> {
    (0..count)
        .map(|i| child_expr(store, consts64, bytes, ptr, i))
        .collect()
}

fn call_results(store: &AstStore, ptr: NodePtr) -> CompileResult<Option<(u8, u8)>> {
    let count = extra_u32(store, ptr, 1);
    if count < 2 {
        return Ok(None);
    }
    let first = extra_u32(store, ptr, 2);
    match (u8::try_from(first), u8::try_from(count)) {
        (Ok(first), Ok(count)) => Ok(Some((first, count))),
        _ => Err(CompileError::Internal("multi-value landing slots out of range")),
    }
}

/// Lower a finalized top-level node to a target statement.
pub(crate) fn stmt_for_node(
    store: &AstStore,
    consts64: &[i64],
    bytes: &[u8],
    ptr: NodePtr,
) -> CompileResult<Stmt> {
    use Opcode::*;

    let op = store.opcode(ptr)?;
    let stmt = match op {
        LocalSet => Stmt::SetLocal {
            local: extra_u32(store, ptr, 0),
            value: child_expr(store, consts64, bytes, ptr, 0)?,
        },
        // tee keeps its slot; only the local is written
        LocalTee => Stmt::SetLocal {
            local: extra_u32(store, ptr, 0),
            value: child_expr(store, consts64, bytes, ptr, 0)?,
        },
        GlobalSet => Stmt::SetGlobal {
            global: extra_u32(store, ptr, 0),
            value: child_expr(store, consts64, bytes, ptr, 0)?,
        },
        I32Store | I64Store | F32Store | F64Store | I32Store8 | I32Store16 | I64Store8
        | I64Store16 | I64Store32 => Stmt::Store {
            op,
            addr: child_expr(store, consts64, bytes, ptr, 0)?,
            value: child_expr(store, consts64, bytes, ptr, 1)?,
            offset: extra_u32(store, ptr, 0),
        },
        MemoryCopy => Stmt::MemoryCopy {
            dst: child_expr(store, consts64, bytes, ptr, 0)?,
            src: child_expr(store, consts64, bytes, ptr, 1)?,
            len: child_expr(store, consts64, bytes, ptr, 2)?,
        },
        MemoryFill => Stmt::MemoryFill {
            dst: child_expr(store, consts64, bytes, ptr, 0)?,
            value: child_expr(store, consts64, bytes, ptr, 1)?,
            len: child_expr(store, consts64, bytes, ptr, 2)?,
        },
        Call if store.out_slot(ptr) == 0 => Stmt::Call {
            target: CallTarget::Direct(extra_u32(store, ptr, 0)),
            args: arg_exprs(store, consts64, bytes, ptr, store.child_count(ptr))?,
            results: call_results(store, ptr)?,
        },
        CallIndirect if store.out_slot(ptr) == 0 => {
            let argc = store.child_count(ptr) - 1;
            Stmt::Call {
                target: CallTarget::Indirect {
                    type_index: extra_u32(store, ptr, 0),
                    func: child_expr(store, consts64, bytes, ptr, argc)?,
                },
                args: arg_exprs(store, consts64, bytes, ptr, argc)?,
                results: call_results(store, ptr)?,
            }
        }
        _ => {
            let value = expr_for_node(store, consts64, bytes, ptr)?;
            match u8::try_from(store.out_slot(ptr)) {
                Ok(0) => Stmt::Expr(value),
                Ok(slot) => Stmt::Assign { slot, value },
                Err(_) => {
                    return Err(CompileError::Internal("result slot exceeds the slot limit"))
                }
            }
        }
    };
    Ok(stmt)
}
