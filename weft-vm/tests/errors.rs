//! Compilation error surfaces and lazy-compilation behavior.

use weft_asm::{ReadError, ValType};
use weft_vm::compiler::{compile_function, CompilerParams};
use weft_vm::error::{CompileError, Trap, VmError};
use weft_vm::runtime::Value;
use weft_vm::util::test_helpers::{BodyBuilder, ModuleBuilder};

fn compile_single(body: Vec<u8>) -> Result<(), CompileError> {
    let mut module = ModuleBuilder::new();
    let ty = module.ty(&[], &[]);
    let f = module.func(ty, &[], body);
    let module = module.build();
    compile_function(&module, &CompilerParams::default(), f).map(|_| ())
}

#[test]
fn unknown_opcodes_are_unsupported_instructions() {
    assert_eq!(
        compile_single(BodyBuilder::new().op(0x06).end()),
        Err(CompileError::UnsupportedInstruction(0x06))
    );
    // memory.init is outside the modeled subset
    assert_eq!(
        compile_single(BodyBuilder::new().op(0xFC).u32v(0x08).end()),
        Err(CompileError::UnsupportedInstruction(0x08))
    );
}

#[test]
fn non_zero_memory_indices_are_rejected() {
    assert_eq!(
        compile_single(BodyBuilder::new().op(0x3F).op(0x01).op(0x1A).end()),
        Err(CompileError::UnsupportedMemoryIndex)
    );
    assert_eq!(
        compile_single(
            BodyBuilder::new()
                .i32_const(0)
                .i32_const(0)
                .i32_const(0)
                .op(0xFC)
                .u32v(0x0A)
                .op(0x01)
                .op(0x00)
                .end()
        ),
        Err(CompileError::UnsupportedMemoryIndex)
    );
}

#[test]
fn non_zero_table_indices_are_rejected() {
    let mut module = ModuleBuilder::new();
    let ty = module.ty(&[], &[]);
    let body = BodyBuilder::new()
        .i32_const(0)
        .op(0x11)
        .u32v(ty)
        .op(0x01) // table index 1
        .end();
    let f = module.func(ty, &[], body);
    let module = module.build();
    assert_eq!(
        compile_function(&module, &CompilerParams::default(), f),
        Err(CompileError::UnsupportedTableIndex)
    );
}

#[test]
fn truncated_bodies_are_malformed() {
    // i32.const with no immediate and no end
    assert_eq!(
        compile_single(vec![0x41]),
        Err(CompileError::MalformedBody(ReadError::UnexpectedEof))
    );
}

#[test]
fn functions_compile_lazily_and_cache() {
    let mut module = ModuleBuilder::new();
    let ty = module.ty(&[], &[ValType::I32]);
    let good = module.func(ty, &[], BodyBuilder::new().i32_const(1).end());
    // decodes to an unknown opcode, but only when actually invoked
    let bad = module.func(ty, &[], BodyBuilder::new().op(0x06).end());
    let mut instance = module.instance();

    assert_eq!(instance.invoke(good, &[]).unwrap(), vec![Value::I32(1)]);

    let first = instance.proc(good).unwrap();
    let second = instance.proc(good).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));

    assert_eq!(
        instance.invoke(bad, &[]),
        Err(VmError::Compile(CompileError::UnsupportedInstruction(0x06)))
    );
}

#[test]
fn invocation_checks_argument_conformance() {
    let mut module = ModuleBuilder::new();
    let ty = module.ty(&[ValType::I32], &[ValType::I32]);
    let f = module.func(ty, &[], BodyBuilder::new().local_get(0).end());
    let mut instance = module.instance();

    assert_eq!(
        instance.invoke(f, &[]),
        Err(VmError::Trap(Trap::ValueTypeMismatch))
    );
    assert_eq!(
        instance.invoke(f, &[Value::F64(1.0)]),
        Err(VmError::Trap(Trap::ValueTypeMismatch))
    );
    assert_eq!(
        instance.invoke_named("wasm:function[99]", &[]),
        Err(VmError::Trap(Trap::IndexOutOfRange))
    );
}

#[test]
fn out_of_bounds_access_traps_at_run_time() {
    let mut module = ModuleBuilder::new();
    let ty = module.ty(&[ValType::I32], &[ValType::I32]);
    let body = BodyBuilder::new()
        .local_get(0)
        .op(0x28) // i32.load
        .op(0x02)
        .u32v(0)
        .end();
    let f = module.func(ty, &[], body);
    let mut instance = module.instance().with_memory(1, 1);

    assert_eq!(
        instance.invoke(f, &[Value::I32(0)]).unwrap(),
        vec![Value::I32(0)]
    );
    assert_eq!(
        instance.invoke(f, &[Value::I32(65533)]),
        Err(VmError::Trap(Trap::OutOfBoundsMemoryAccess))
    );
    // negative addresses are huge unsigned addresses
    assert_eq!(
        instance.invoke(f, &[Value::I32(-4)]),
        Err(VmError::Trap(Trap::OutOfBoundsMemoryAccess))
    );
}
