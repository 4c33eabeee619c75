//! Structural checks on emitted procedures: inlining decisions, the memory
//! barrier, and load rewriting.

use weft_asm::{Opcode, ValType};
use weft_vm::compiler::{compile_function, CompilerParams};
use weft_vm::target::{Expr, Stmt};
use weft_vm::util::test_helpers::{BodyBuilder, ModuleBuilder};

#[test]
fn trivial_producers_inline_into_memory_consumers() {
    let mut module = ModuleBuilder::new();
    let ty = module.ty(&[ValType::I32], &[ValType::I32]);
    let body = BodyBuilder::new()
        .local_get(0)
        .op(0x28) // i32.load
        .op(0x02)
        .u32v(4)
        .end();
    let f = module.func(ty, &[], body);
    let module = module.build();

    let proc = compile_function(&module, &CompilerParams::default(), f).unwrap();
    assert_eq!(proc.body.len(), 1);
    match &proc.body[0] {
        Stmt::Assign { slot: 1, value } => match value {
            Expr::Load { op, addr, offset } => {
                assert_eq!(*op, Opcode::I32Load);
                assert_eq!(*offset, 4);
                assert_eq!(**addr, Expr::Local(0));
            }
            other => panic!("expected a load, got {other:?}"),
        },
        other => panic!("expected an assignment, got {other:?}"),
    }
}

#[test]
fn grow_results_do_not_inline_into_memory_accesses() {
    let mut module = ModuleBuilder::new();
    let ty = module.ty(&[ValType::I32], &[ValType::I32]);
    let body = BodyBuilder::new()
        .local_get(0)
        .op(0x40) // memory.grow
        .op(0x00)
        .op(0x28) // i32.load of the grow result
        .op(0x02)
        .u32v(0)
        .end();
    let f = module.func(ty, &[], body);
    let module = module.build();

    let proc = compile_function(&module, &CompilerParams::default(), f).unwrap();
    // the grow stays a prior statement; the load reads its slot
    assert_eq!(proc.body.len(), 2);
    assert!(matches!(
        &proc.body[0],
        Stmt::Assign {
            slot: 1,
            value: Expr::MemoryGrow(_)
        }
    ));
    match &proc.body[1] {
        Stmt::Assign { slot: 1, value: Expr::Load { addr, .. } } => {
            assert_eq!(**addr, Expr::Slot(1));
        }
        other => panic!("expected a slot-addressed load, got {other:?}"),
    }
}

#[test]
fn producers_do_not_move_across_intervening_stores() {
    let mut module = ModuleBuilder::new();
    let nullary = module.ty(&[], &[ValType::I32]);
    let seven = module.func(nullary, &[], BodyBuilder::new().i32_const(7).end());

    let unary = module.ty(&[], &[]);
    // s1 = seven(); store(0, 5); local0 = s1
    let body = BodyBuilder::new()
        .op(0x10) // call seven
        .u32v(seven)
        .i32_const(0)
        .i32_const(5)
        .op(0x36) // i32.store
        .op(0x02)
        .u32v(0)
        .op(0x21) // local.set 0
        .u32v(0)
        .end();
    let f = module.func(unary, &[(1, ValType::I32)], body);
    let module = module.build();

    let proc = compile_function(&module, &CompilerParams::default(), f).unwrap();
    assert_eq!(proc.body.len(), 3);
    assert!(matches!(
        &proc.body[0],
        Stmt::Assign {
            slot: 1,
            value: Expr::Call { .. }
        }
    ));
    assert!(matches!(&proc.body[1], Stmt::Store { .. }));
    // the call result must still be read from its slot, not re-evaluated
    assert_eq!(
        proc.body[2],
        Stmt::SetLocal {
            local: 0,
            value: Expr::Slot(1)
        }
    );
}

#[test]
fn single_byte_loads_rewrite_to_direct_indexing() {
    let mut module = ModuleBuilder::new();
    let ty = module.ty(&[ValType::I32], &[ValType::I32]);
    let body = BodyBuilder::new()
        .local_get(0)
        .op(0x2D) // i32.load8_u
        .op(0x00)
        .u32v(0)
        .end();
    let f = module.func(ty, &[], body);
    let module = module.build();

    let proc = compile_function(&module, &CompilerParams::default(), f).unwrap();
    match &proc.body[0] {
        Stmt::Assign {
            value: Expr::Load { op, .. },
            ..
        } => assert_eq!(*op, Opcode::U32Load),
        other => panic!("expected a rewritten load, got {other:?}"),
    }

    // the signed variant keeps its data-view form
    let mut module = ModuleBuilder::new();
    let ty = module.ty(&[ValType::I32], &[ValType::I32]);
    let body = BodyBuilder::new()
        .local_get(0)
        .op(0x2C) // i32.load8_s
        .op(0x00)
        .u32v(0)
        .end();
    let f = module.func(ty, &[], body);
    let module = module.build();
    let proc = compile_function(&module, &CompilerParams::default(), f).unwrap();
    match &proc.body[0] {
        Stmt::Assign {
            value: Expr::Load { op, .. },
            ..
        } => assert_eq!(*op, Opcode::I32Load8S),
        other => panic!("expected a load, got {other:?}"),
    }
}

#[test]
fn constants_fold_during_emission() {
    let mut module = ModuleBuilder::new();
    let ty = module.ty(&[], &[ValType::I32]);
    let body = BodyBuilder::new()
        .i32_const(6)
        .i32_const(7)
        .op(0x6C) // i32.mul
        .end();
    let f = module.func(ty, &[], body);
    let module = module.build();

    let proc = compile_function(&module, &CompilerParams::default(), f).unwrap();
    assert_eq!(
        proc.body,
        vec![Stmt::Assign {
            slot: 1,
            value: Expr::I32Const(42)
        }]
    );
}

#[test]
fn conditions_extract_without_a_temporary() {
    let mut module = ModuleBuilder::new();
    let ty = module.ty(&[ValType::I32], &[ValType::I32]);
    // if (local0 < 5) { 1 } else { 0 }
    let body = BodyBuilder::new()
        .local_get(0)
        .i32_const(5)
        .op(0x48) // i32.lt_s
        .op(0x04) // if (result i32)
        .op(0x7F)
        .i32_const(1)
        .op(0x05)
        .i32_const(0)
        .op(0x0B)
        .end();
    let f = module.func(ty, &[], body);
    let module = module.build();

    let proc = compile_function(&module, &CompilerParams::default(), f).unwrap();
    // the comparison feeds the if directly: no assignment precedes it
    assert_eq!(proc.body.len(), 1);
    match &proc.body[0] {
        Stmt::Block { body, .. } => match &body[0] {
            Stmt::If { cond, .. } => {
                assert_eq!(
                    *cond,
                    Expr::Binary(
                        Opcode::I32LtS,
                        Box::new(Expr::Local(0)),
                        Box::new(Expr::I32Const(5))
                    )
                );
            }
            other => panic!("expected an if, got {other:?}"),
        },
        other => panic!("expected a labeled block, got {other:?}"),
    }
}

#[test]
fn tee_conditions_stay_statements_and_branch_on_the_slot() {
    let mut module = ModuleBuilder::new();
    let ty = module.ty(&[ValType::I32], &[]);
    // block { local.get 0; local.tee 1; br_if 0 }
    let body = BodyBuilder::new()
        .op(0x02) // block
        .op(0x40)
        .local_get(0)
        .op(0x22) // local.tee 1
        .u32v(1)
        .op(0x0D) // br_if 0
        .u32v(0)
        .op(0x0B)
        .end();
    let f = module.func(ty, &[(1, ValType::I32)], body);
    let module = module.build();

    let proc = compile_function(&module, &CompilerParams::default(), f).unwrap();
    match &proc.body[0] {
        Stmt::Block { body, .. } => {
            // the tee keeps its local write as a statement; the branch reads
            // the condition back from the tee's slot
            assert_eq!(
                body[..2],
                [
                    Stmt::Assign {
                        slot: 1,
                        value: Expr::Local(0)
                    },
                    Stmt::SetLocal {
                        local: 1,
                        value: Expr::Slot(1)
                    }
                ]
            );
            match &body[2] {
                Stmt::If { cond, .. } => assert_eq!(*cond, Expr::Slot(1)),
                other => panic!("expected a conditional branch, got {other:?}"),
            }
        }
        other => panic!("expected a labeled block, got {other:?}"),
    }
}

#[test]
fn wide_shift_counts_carry_a_mask() {
    let mut module = ModuleBuilder::new();
    let ty = module.ty(&[ValType::I64, ValType::I64], &[ValType::I64]);
    let body = BodyBuilder::new()
        .local_get(0)
        .local_get(1)
        .op(0x86) // i64.shl
        .end();
    let f = module.func(ty, &[], body);
    let module = module.build();

    let proc = compile_function(&module, &CompilerParams::default(), f).unwrap();
    assert_eq!(
        proc.body,
        vec![Stmt::Assign {
            slot: 1,
            value: Expr::Binary(
                Opcode::I64Shl,
                Box::new(Expr::Local(0)),
                Box::new(Expr::Binary(
                    Opcode::I64And,
                    Box::new(Expr::Local(1)),
                    Box::new(Expr::I64Const(63))
                ))
            )
        }]
    );
}
