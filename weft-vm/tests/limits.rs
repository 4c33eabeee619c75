//! Boundary behavior: stack slot and block depth limits, determinism.

use weft_asm::ValType;
use weft_vm::compiler::{compile_function, CompilerParams};
use weft_vm::error::CompileError;
use weft_vm::runtime::Value;
use weft_vm::target::Stmt;
use weft_vm::util::test_helpers::{BodyBuilder, ModuleBuilder};

/// Sum `n` constants through a chain of adds; the peak live-slot count is
/// `n`.
fn const_chain(n: usize) -> Vec<u8> {
    let mut body = BodyBuilder::new();
    for _ in 0..n {
        body = body.i32_const(1);
    }
    for _ in 1..n {
        body = body.op(0x6A);
    }
    body.end()
}

fn count_dispatches(stmts: &[Stmt]) -> usize {
    stmts
        .iter()
        .map(|stmt| match stmt {
            Stmt::Dispatch { body } => 1 + count_dispatches(body),
            Stmt::Block { body, .. } | Stmt::Loop { body, .. } => count_dispatches(body),
            Stmt::If {
                then_body,
                else_body,
                ..
            } => count_dispatches(then_body) + count_dispatches(else_body),
            Stmt::Table {
                targets, fallback, ..
            } => {
                targets.iter().map(|t| count_dispatches(t)).sum::<usize>()
                    + count_dispatches(fallback)
            }
            _ => 0,
        })
        .sum()
}

#[test]
fn a_function_with_255_live_slots_compiles() {
    let mut module = ModuleBuilder::new();
    let ty = module.ty(&[], &[ValType::I32]);
    let f = module.func(ty, &[], const_chain(255));
    let module = module.build();

    let proc = compile_function(&module, &CompilerParams::default(), f).unwrap();
    assert_eq!(proc.slot_count, 255);

    let mut instance = weft_vm::runtime::Instance::new(module);
    assert_eq!(instance.invoke(f, &[]).unwrap(), vec![Value::I32(255)]);
}

#[test]
fn a_256th_live_slot_is_a_deep_stack_error() {
    let mut module = ModuleBuilder::new();
    let ty = module.ty(&[], &[ValType::I32]);
    let f = module.func(ty, &[], const_chain(256));
    let module = module.build();

    assert_eq!(
        compile_function(&module, &CompilerParams::default(), f),
        Err(CompileError::DeepStack)
    );
}

/// `n` nested empty blocks.
fn nested_blocks(n: usize) -> Vec<u8> {
    let mut body = BodyBuilder::new();
    for _ in 0..n {
        body = body.op(0x02).op(0x40);
    }
    for _ in 0..n {
        body = body.op(0x0B);
    }
    body.end()
}

#[test]
fn nesting_at_the_depth_limit_stays_in_labeled_form() {
    let mut module = ModuleBuilder::new();
    let ty = module.ty(&[], &[]);
    let f = module.func(ty, &[], nested_blocks(256));
    let module = module.build();

    let proc = compile_function(&module, &CompilerParams::default(), f).unwrap();
    assert_eq!(count_dispatches(&proc.body), 0);
}

#[test]
fn nesting_one_past_the_limit_opens_one_dispatch_region() {
    let mut module = ModuleBuilder::new();
    let ty = module.ty(&[], &[]);
    let f = module.func(ty, &[], nested_blocks(257));
    let module = module.build();

    let proc = compile_function(&module, &CompilerParams::default(), f).unwrap();
    assert_eq!(count_dispatches(&proc.body), 1);
}

#[test]
fn thousand_deep_nesting_compiles_and_runs() {
    let mut module = ModuleBuilder::new();
    let ty = module.ty(&[], &[]);
    let f = module.func(ty, &[], nested_blocks(1000));
    let mut instance = module.instance();

    assert_eq!(count_dispatches(&instance.proc(f).unwrap().body), 1);
    instance.invoke(f, &[]).unwrap();
}

#[test]
fn conditional_breaks_to_all_300_targets() {
    let mut module = ModuleBuilder::new();
    let ty = module.ty(&[ValType::I32], &[]);
    let mut body = BodyBuilder::new();
    for _ in 0..300 {
        body = body.op(0x02).op(0x40);
    }
    // one conditional break per enclosing block, outermost target first, so
    // a taken branch crosses from dispatch code into a labeled scope
    for depth in (0..300u32).rev() {
        body = body.local_get(0).op(0x0D).u32v(depth);
    }
    let mut stream = body;
    for _ in 0..300 {
        stream = stream.op(0x0B);
    }
    let f = module.func(ty, &[], stream.end());
    let mut instance = module.instance();

    instance.invoke(f, &[Value::I32(0)]).unwrap();
    instance.invoke(f, &[Value::I32(1)]).unwrap();
}

#[test]
fn the_depth_limit_is_configurable() {
    let mut module = ModuleBuilder::new();
    let ty = module.ty(&[], &[]);
    let f = module.func(ty, &[], nested_blocks(10));
    let module = module.build();

    let params = CompilerParams {
        block_depth_limit: 4,
        ..CompilerParams::default()
    };
    let proc = compile_function(&module, &params, f).unwrap();
    assert_eq!(count_dispatches(&proc.body), 1);
}

#[test]
fn compilation_is_deterministic() {
    let mut module = ModuleBuilder::new();
    let ty = module.ty(&[ValType::I32], &[ValType::F64]);
    let body = BodyBuilder::new()
        .op(0x44)
        .f64v(1.5)
        .local_get(0)
        .op(0xB7) // f64.convert_i32_s
        .op(0xA0) // f64.add
        .end();
    let f = module.func(ty, &[], body);
    let module = module.build();

    let params = CompilerParams::default();
    let first = compile_function(&module, &params, f).unwrap();
    let second = compile_function(&module, &params, f).unwrap();
    assert_eq!(first, second);
    assert_eq!(format!("{first:?}"), format!("{second:?}"));
}

#[test]
fn slot_high_water_drives_the_slot_count() {
    let mut module = ModuleBuilder::new();
    let ty = module.ty(&[ValType::I32], &[ValType::I32]);
    // peak of three live slots
    let body = BodyBuilder::new()
        .local_get(0)
        .local_get(0)
        .local_get(0)
        .op(0x6A)
        .op(0x6A)
        .end();
    let f = module.func(ty, &[], body);
    let module = module.build();

    let proc = compile_function(&module, &CompilerParams::default(), f).unwrap();
    assert_eq!(proc.slot_count, 3);
    assert_eq!(proc.result_count, 1);
}
