//! The streaming function decoder.
//!
//! One pass over the body: regular opcodes go through the metadata table,
//! control, call, constant and bulk-memory opcodes dispatch explicitly.
//! The virtual operand stack maps WebAssembly stack positions onto numbered
//! target slots; packed expression nodes accumulate per basic block and are
//! flushed through the optimizer at every block boundary. Inside dead code
//! (after an unconditional transfer, until the region closes) immediates
//! are still consumed but nothing is emitted and the stack does not move.

use weft_asm::{lookup, ByteReader, OpFlags, Opcode, ValType};

use super::ast::AstStore;
use super::control::{self, BlockFrame, BlockKind};
use super::{opt, CompilerParams};
use crate::consts::STACK_SLOT_LIMIT;
use crate::error::{CompileError, CompileResult};
use crate::module::{FuncType, ModuleInfo};
use crate::target::{Expr, Proc, Stmt};

pub(super) struct FuncCompiler<'m> {
    module: &'m ModuleInfo,
    params: &'m CompilerParams,
    func_index: u32,
    reader: ByteReader<'m>,
    store: AstStore,
    ast_ptrs: Vec<Option<usize>>,
    consts64: Vec<i64>,
    stack_top: usize,
    stack_limit: usize,
    blocks: Vec<BlockFrame>,
    next_case: u32,
    func_type: FuncType,
    locals: Vec<ValType>,
}

impl<'m> FuncCompiler<'m> {
    pub(super) fn new(
        module: &'m ModuleInfo,
        params: &'m CompilerParams,
        func_index: u32,
    ) -> CompileResult<Self> {
        let func_type = module.func_type(func_index)?.clone();
        let body = module.body(func_index)?;
        let locals = body
            .locals
            .iter()
            .flat_map(|&(count, ty)| std::iter::repeat(ty).take(count as usize))
            .collect();

        let mut blocks = Vec::new();
        blocks.push(BlockFrame::native(
            BlockKind::Normal,
            0,
            func_type.results.len(),
            0,
            0,
        ));

        Ok(Self {
            module,
            params,
            func_index,
            reader: ByteReader::new(&module.bytes, body.code_start),
            store: AstStore::new(params.ast_capacity),
            ast_ptrs: Vec::new(),
            consts64: Vec::new(),
            stack_top: 0,
            stack_limit: 0,
            blocks,
            next_case: 1,
            func_type,
            locals,
        })
    }

    pub(super) fn run(mut self) -> CompileResult<Proc> {
        let mut finished = None;
        while !self.blocks.is_empty() {
            let b = self.reader.byte()?;
            tracing::trace!(opcode = b, "decode");
            let meta = lookup(b);
            if !meta.is_special() {
                self.simple(b)?;
                continue;
            }
            match b {
                0x00 => self.op_unreachable()?,
                0x02 => self.op_block(BlockKind::Normal)?,
                0x03 => self.op_block(BlockKind::Loop)?,
                0x04 => self.op_if()?,
                0x05 => self.op_else()?,
                0x0B => finished = self.op_end()?,
                0x0C => self.op_br()?,
                0x0D => self.op_br_if()?,
                0x0E => self.op_br_table()?,
                0x0F => self.op_return()?,
                0x10 => self.op_call()?,
                0x11 => self.op_call_indirect()?,
                0x1B => self.op_select()?,
                0x3F => self.op_memory_size()?,
                0x40 => self.op_memory_grow()?,
                0x41..=0x44 => self.op_const(b)?,
                weft_asm::PREFIX_FC => self.op_prefixed()?,
                other => return Err(CompileError::UnsupportedInstruction(other)),
            }
        }
        let body = finished.ok_or(CompileError::Internal("outer block never closed"))?;
        Ok(Proc {
            name: self.module.public_name(self.func_index),
            params: self.func_type.params,
            locals: self.locals,
            slot_count: self.stack_limit,
            result_count: self.func_type.results.len(),
            body,
        })
    }

    fn dead(&self) -> bool {
        self.blocks.last().map_or(false, |f| f.is_dead)
    }

    fn frame_mut(&mut self) -> CompileResult<&mut BlockFrame> {
        self.blocks
            .last_mut()
            .ok_or(CompileError::Internal("block stack underflow"))
    }

    fn sink(&mut self) -> CompileResult<&mut Vec<Stmt>> {
        Ok(self.frame_mut()?.sink())
    }

    fn push_slot(&mut self) -> CompileResult<usize> {
        self.stack_top += 1;
        if self.stack_top > STACK_SLOT_LIMIT {
            return Err(CompileError::DeepStack);
        }
        if self.stack_top > self.stack_limit {
            self.stack_limit = self.stack_top;
        }
        Ok(self.stack_top)
    }

    fn pop_slots(&mut self, count: usize) -> CompileResult<usize> {
        let base = self
            .stack_top
            .checked_sub(count)
            .ok_or(CompileError::Internal("operand stack underflow"))?;
        self.stack_top = base;
        Ok(base)
    }

    /// Flush the open basic block into the current statement sink. With
    /// `extract` the condition producer comes back as an expression and the
    /// condition slot is popped.
    fn finalize(&mut self, extract: bool) -> CompileResult<Option<Expr>> {
        let (stmts, expr) = opt::finalize_block(
            &mut self.store,
            &mut self.ast_ptrs,
            &mut self.consts64,
            &self.module.bytes,
            extract,
            self.stack_top,
        )?;
        self.sink()?.extend(stmts);
        if !extract {
            return Ok(None);
        }
        let slot = self.stack_top;
        self.pop_slots(1)?;
        match expr {
            Some(e) => Ok(Some(e)),
            None => Ok(Some(Expr::Slot(u8::try_from(slot).map_err(|_| {
                CompileError::Internal("slot reference exceeds the slot limit")
            })?))),
        }
    }

    /// Emit an in-place coercion pseudo-node over `slot`.
    fn coercion(&mut self, op: Opcode, slot: usize) -> CompileResult<()> {
        let ptr = self.store.alloc(op, slot, &[-(slot as i32)])?;
        self.ast_ptrs.push(Some(ptr));
        Ok(())
    }

    /// The table-driven path for regular opcodes.
    fn simple(&mut self, b: u8) -> CompileResult<()> {
        let meta = lookup(b);
        let flags = meta.flags();
        if self.dead() {
            if flags.contains(OpFlags::ALIGN) {
                self.reader.byte()?;
            }
            if flags.contains(OpFlags::IMM_INDEX) {
                self.reader.u32_leb()?;
            }
            return Ok(());
        }
        if flags.contains(OpFlags::ALIGN) {
            self.reader.byte()?;
        }

        let pops = meta.pops();
        let base = self
            .stack_top
            .checked_sub(pops)
            .ok_or(CompileError::Internal("operand stack underflow"))?;

        if flags.contains(OpFlags::COERCE_U32) {
            for slot in base + 1..=self.stack_top {
                self.coercion(Opcode::ToU32, slot)?;
            }
        }
        if flags.contains(OpFlags::COERCE_S64) {
            for slot in base + 1..=self.stack_top {
                self.coercion(Opcode::ToS64, slot)?;
            }
        }
        if flags.contains(OpFlags::MASK63) {
            // wide shift counts reduce modulo 64 before emission
            let slot = self.stack_top;
            let index = self.consts64.len();
            self.consts64.push(63);
            let mask = self.store.alloc(Opcode::I64Const, 0, &[])?;
            self.store.push_extra(index as i32)?;
            let and = self
                .store
                .alloc(Opcode::I64And, slot, &[-(slot as i32), mask as i32])?;
            self.ast_ptrs.push(Some(and));
        }

        if flags.contains(OpFlags::OMIT) {
            self.pop_slots(pops)?;
            if flags.contains(OpFlags::IMM_INDEX) {
                self.reader.u32_leb()?;
            }
            return Ok(());
        }

        let op = Opcode::try_from(b)?;
        let children: Vec<i32> = (1..=pops).map(|i| -((base + i) as i32)).collect();
        self.pop_slots(pops)?;
        let out = if flags.contains(OpFlags::PUSH) {
            self.push_slot()?
        } else {
            0
        };
        let ptr = self.store.alloc(op, out, &children)?;
        if flags.contains(OpFlags::IMM_INDEX) {
            let imm = self.reader.u32_leb()?;
            self.store.push_extra(imm as i32)?;
        }
        self.ast_ptrs.push(Some(ptr));
        if flags.contains(OpFlags::BOOL_RESULT) {
            self.coercion(Opcode::BoolToInt, out)?;
        }
        Ok(())
    }

    /// Read a block type immediate: empty, one shorthand value type, or a
    /// function type index carrying parameters and results.
    fn block_type(&mut self) -> CompileResult<(usize, usize)> {
        let v = self.reader.s33_leb()?;
        match v {
            -64 => Ok((0, 0)),
            -4..=-1 => Ok((0, 1)),
            _ if v >= 0 => {
                let ty = self.module.type_at(v as u32)?;
                Ok((ty.params.len(), ty.results.len()))
            }
            _ => Err(CompileError::Internal("invalid block type immediate")),
        }
    }

    fn alloc_case(&mut self) -> i32 {
        let case = self.next_case;
        self.next_case += 1;
        case as i32
    }

    /// Open a frame past the depth limit: labels become dispatch case
    /// values, and the frame that crosses the boundary owns the region.
    fn dispatch_frame(
        &mut self,
        kind: BlockKind,
        arg_count: usize,
        return_count: usize,
        parent_stack_top: usize,
        depth: usize,
    ) -> BlockFrame {
        let mut frame = BlockFrame::native(
            kind,
            arg_count,
            return_count,
            parent_stack_top,
            depth as u32,
        );
        frame.is_dispatch_root = depth == self.params.block_depth_limit + 1;
        match kind {
            BlockKind::Loop => {
                frame.label_continue_or_else = self.alloc_case();
                frame
                    .stmts
                    .push(Stmt::CaseLabel(frame.label_continue_or_else as u32));
            }
            BlockKind::Normal => {
                frame.label_break = self.alloc_case();
            }
            BlockKind::IfElse => {
                frame.label_continue_or_else = self.alloc_case();
                frame.label_break = self.alloc_case();
            }
        }
        frame
    }

    fn push_dead_frame(&mut self, kind: BlockKind) -> CompileResult<()> {
        let depth = self.blocks.len();
        let mut frame = BlockFrame::native(kind, 0, 0, self.stack_top, depth as u32);
        frame.is_dead = true;
        frame.born_dead = true;
        self.blocks.push(frame);
        Ok(())
    }

    fn op_block(&mut self, kind: BlockKind) -> CompileResult<()> {
        if self.dead() {
            self.block_type()?;
            return self.push_dead_frame(kind);
        }
        self.finalize(false)?;
        let (arg_count, return_count) = self.block_type()?;
        let parent_stack_top = self
            .stack_top
            .checked_sub(arg_count)
            .ok_or(CompileError::Internal("block arguments exceed the stack"))?;
        let depth = self.blocks.len();
        let frame = if depth > self.params.block_depth_limit {
            self.dispatch_frame(kind, arg_count, return_count, parent_stack_top, depth)
        } else {
            BlockFrame::native(kind, arg_count, return_count, parent_stack_top, depth as u32)
        };
        self.blocks.push(frame);
        Ok(())
    }

    fn op_if(&mut self) -> CompileResult<()> {
        if self.dead() {
            self.block_type()?;
            return self.push_dead_frame(BlockKind::IfElse);
        }
        let cond = self
            .finalize(true)?
            .ok_or(CompileError::Internal("missing extracted condition"))?;
        let (arg_count, return_count) = self.block_type()?;
        let parent_stack_top = self
            .stack_top
            .checked_sub(arg_count)
            .ok_or(CompileError::Internal("block arguments exceed the stack"))?;
        let depth = self.blocks.len();
        if depth > self.params.block_depth_limit {
            let mut frame = self.dispatch_frame(
                BlockKind::IfElse,
                arg_count,
                return_count,
                parent_stack_top,
                depth,
            );
            let else_case = frame.label_continue_or_else as u32;
            frame.stmts.push(Stmt::If {
                cond: opt::fold(Expr::Unary(Opcode::BoolNot, Box::new(cond))),
                then_body: vec![Stmt::Jump(else_case)],
                else_body: Vec::new(),
            });
            self.blocks.push(frame);
        } else {
            let mut frame = BlockFrame::native(
                BlockKind::IfElse,
                arg_count,
                return_count,
                parent_stack_top,
                depth as u32,
            );
            frame.if_cond = Some(cond);
            self.blocks.push(frame);
        }
        Ok(())
    }

    fn op_else(&mut self) -> CompileResult<()> {
        if !self.dead() {
            self.finalize(false)?;
        }
        let frame = self.frame_mut()?;
        if frame.kind != BlockKind::IfElse {
            return Err(CompileError::Internal("else outside an if region"));
        }
        if frame.born_dead {
            return Ok(());
        }
        if frame.is_dispatch() {
            let break_case = frame.label_break as u32;
            let else_case = frame.label_continue_or_else as u32;
            if !frame.is_dead {
                frame.stmts.push(Stmt::Jump(break_case));
            }
            frame.stmts.push(Stmt::CaseLabel(else_case));
        }
        frame.in_else = true;
        frame.is_dead = false;
        let reset = frame.parent_stack_top + frame.arg_count;
        self.stack_top = reset;
        Ok(())
    }

    fn op_end(&mut self) -> CompileResult<Option<Vec<Stmt>>> {
        if !self.dead() {
            self.finalize(false)?;
        }
        let frame = self
            .blocks
            .pop()
            .ok_or(CompileError::Internal("block stack underflow"))?;
        if frame.born_dead {
            return Ok(None);
        }
        self.stack_top = frame.parent_stack_top + frame.return_count;

        if frame.is_dispatch() {
            let mut body = frame.stmts;
            match frame.kind {
                BlockKind::Normal => body.push(Stmt::CaseLabel(frame.label_break as u32)),
                BlockKind::Loop => {}
                BlockKind::IfElse => {
                    if !frame.in_else {
                        body.push(Stmt::CaseLabel(frame.label_continue_or_else as u32));
                    }
                    body.push(Stmt::CaseLabel(frame.label_break as u32));
                }
            }
            if frame.is_dispatch_root {
                self.sink()?.push(Stmt::Dispatch { body });
            } else {
                self.sink()?.extend(body);
            }
            return Ok(None);
        }

        let stmt = match frame.kind {
            BlockKind::Normal => Stmt::Block {
                label: frame.native_label,
                body: frame.stmts,
            },
            BlockKind::Loop => Stmt::Loop {
                label: frame.native_label,
                body: frame.stmts,
            },
            BlockKind::IfElse => Stmt::Block {
                label: frame.native_label,
                body: vec![Stmt::If {
                    cond: frame
                        .if_cond
                        .ok_or(CompileError::Internal("if region lost its condition"))?,
                    then_body: frame.stmts,
                    else_body: frame.else_stmts,
                }],
            },
        };
        if self.blocks.is_empty() {
            // the implicit outer block closed: this is the function body
            return match stmt {
                Stmt::Block { body, .. } => Ok(Some(body)),
                _ => Err(CompileError::Internal("outer block closed as a non-block")),
            };
        }
        self.sink()?.push(stmt);
        Ok(None)
    }

    fn op_unreachable(&mut self) -> CompileResult<()> {
        if self.dead() {
            return Ok(());
        }
        self.finalize(false)?;
        self.sink()?.push(Stmt::Trap);
        self.frame_mut()?.is_dead = true;
        Ok(())
    }

    fn op_br(&mut self) -> CompileResult<()> {
        let depth = self.reader.u32_leb()? as usize;
        if self.dead() {
            return Ok(());
        }
        self.finalize(false)?;
        let mut out = Vec::new();
        control::jump(&self.blocks, self.stack_top, depth, &mut out)?;
        self.sink()?.extend(out);
        self.frame_mut()?.is_dead = true;
        Ok(())
    }

    fn op_br_if(&mut self) -> CompileResult<()> {
        let depth = self.reader.u32_leb()? as usize;
        if self.dead() {
            return Ok(());
        }
        let cond = self
            .finalize(true)?
            .ok_or(CompileError::Internal("missing extracted condition"))?;
        let mut taken = Vec::new();
        control::jump(&self.blocks, self.stack_top, depth, &mut taken)?;
        self.sink()?.push(Stmt::If {
            cond,
            then_body: taken,
            else_body: Vec::new(),
        });
        Ok(())
    }

    fn op_br_table(&mut self) -> CompileResult<()> {
        let count = self.reader.u32_leb()?;
        let mut depths = Vec::with_capacity(count as usize);
        for _ in 0..count {
            depths.push(self.reader.u32_leb()? as usize);
        }
        let fallback_depth = self.reader.u32_leb()? as usize;
        if self.dead() {
            return Ok(());
        }
        let index = self
            .finalize(true)?
            .ok_or(CompileError::Internal("missing extracted condition"))?;
        let mut targets = Vec::with_capacity(depths.len());
        for depth in depths {
            let mut arm = Vec::new();
            control::jump(&self.blocks, self.stack_top, depth, &mut arm)?;
            targets.push(arm);
        }
        let mut fallback = Vec::new();
        control::jump(&self.blocks, self.stack_top, fallback_depth, &mut fallback)?;
        self.sink()?.push(Stmt::Table {
            index,
            targets,
            fallback,
        });
        self.frame_mut()?.is_dead = true;
        Ok(())
    }

    fn op_return(&mut self) -> CompileResult<()> {
        if self.dead() {
            return Ok(());
        }
        self.finalize(false)?;
        let stmt = control::function_return(&self.blocks, self.stack_top);
        self.sink()?.push(stmt);
        self.frame_mut()?.is_dead = true;
        Ok(())
    }

    fn op_call(&mut self) -> CompileResult<()> {
        let func = self.reader.u32_leb()?;
        if self.dead() {
            return Ok(());
        }
        let callee = self.module.func_type(func)?;
        let (arg_count, result_count) = (callee.params.len(), callee.results.len());
        self.call_node(Opcode::Call, func, arg_count, result_count, false)
    }

    fn op_call_indirect(&mut self) -> CompileResult<()> {
        let type_index = self.reader.u32_leb()?;
        let table = self.reader.byte()?;
        if self.dead() {
            return Ok(());
        }
        if table != 0 {
            return Err(CompileError::UnsupportedTableIndex);
        }
        let callee = self.module.type_at(type_index)?;
        let (arg_count, result_count) = (callee.params.len(), callee.results.len());
        self.call_node(
            Opcode::CallIndirect,
            type_index,
            arg_count,
            result_count,
            true,
        )
    }

    /// Shared call lowering: pop the arguments (plus the table element index
    /// for indirect calls), then place the node. A single result makes the
    /// call an ordinary producer; two or more land in consecutive slots
    /// recorded after the result count.
    fn call_node(
        &mut self,
        op: Opcode,
        payload: u32,
        arg_count: usize,
        result_count: usize,
        indirect: bool,
    ) -> CompileResult<()> {
        let popped = arg_count + usize::from(indirect);
        let base = self
            .stack_top
            .checked_sub(popped)
            .ok_or(CompileError::Internal("operand stack underflow"))?;
        let children: Vec<i32> = (1..=popped).map(|i| -((base + i) as i32)).collect();
        self.pop_slots(popped)?;
        let out = if result_count == 1 { self.push_slot()? } else { 0 };
        let ptr = self.store.alloc(op, out, &children)?;
        self.store.push_extra(payload as i32)?;
        self.store.push_extra(result_count as i32)?;
        if result_count >= 2 {
            let first = self.stack_top + 1;
            self.store.push_extra(first as i32)?;
            for _ in 0..result_count {
                self.push_slot()?;
            }
        }
        self.ast_ptrs.push(Some(ptr));
        Ok(())
    }

    fn op_select(&mut self) -> CompileResult<()> {
        if self.dead() {
            return Ok(());
        }
        self.coercion(Opcode::Bool, self.stack_top)?;
        let base = self
            .stack_top
            .checked_sub(3)
            .ok_or(CompileError::Internal("operand stack underflow"))?;
        // condition leads; the value operands follow in push order
        let children = [
            -((base + 3) as i32),
            -((base + 1) as i32),
            -((base + 2) as i32),
        ];
        self.pop_slots(3)?;
        let out = self.push_slot()?;
        let ptr = self.store.alloc(Opcode::Select, out, &children)?;
        self.ast_ptrs.push(Some(ptr));
        Ok(())
    }

    fn op_memory_size(&mut self) -> CompileResult<()> {
        let memory = self.reader.byte()?;
        if self.dead() {
            return Ok(());
        }
        if memory != 0 {
            return Err(CompileError::UnsupportedMemoryIndex);
        }
        let out = self.push_slot()?;
        let ptr = self.store.alloc(Opcode::MemorySize, out, &[])?;
        self.ast_ptrs.push(Some(ptr));
        Ok(())
    }

    fn op_memory_grow(&mut self) -> CompileResult<()> {
        let memory = self.reader.byte()?;
        if self.dead() {
            return Ok(());
        }
        if memory != 0 {
            return Err(CompileError::UnsupportedMemoryIndex);
        }
        let child = -(self.stack_top as i32);
        self.pop_slots(1)?;
        let out = self.push_slot()?;
        let ptr = self.store.alloc(Opcode::MemoryGrow, out, &[child])?;
        self.ast_ptrs.push(Some(ptr));
        Ok(())
    }

    fn op_const(&mut self, b: u8) -> CompileResult<()> {
        match b {
            0x41 => {
                let v = self.reader.i32_leb()?;
                if self.dead() {
                    return Ok(());
                }
                let out = self.push_slot()?;
                let ptr = self.store.alloc(Opcode::I32Const, out, &[])?;
                self.store.push_extra(v)?;
                self.ast_ptrs.push(Some(ptr));
            }
            0x42 => {
                let v = self.reader.i64_leb()?;
                if self.dead() {
                    return Ok(());
                }
                let out = self.push_slot()?;
                let index = self.consts64.len();
                self.consts64.push(v);
                let ptr = self.store.alloc(Opcode::I64Const, out, &[])?;
                self.store.push_extra(index as i32)?;
                self.ast_ptrs.push(Some(ptr));
            }
            0x43 | 0x44 => {
                // the raw IEEE bytes stay in the module image; the node
                // carries their file offset and the emitter reads them back
                let offset = self.reader.pos();
                let (op, width) = if b == 0x43 {
                    (Opcode::F32Const, 4)
                } else {
                    (Opcode::F64Const, 8)
                };
                self.reader.skip(width)?;
                if self.dead() {
                    return Ok(());
                }
                let out = self.push_slot()?;
                let ptr = self.store.alloc(op, out, &[])?;
                self.store.push_extra(offset as i32)?;
                self.ast_ptrs.push(Some(ptr));
            }
            other => return Err(CompileError::UnsupportedInstruction(other)),
        }
        Ok(())
    }

    fn op_prefixed(&mut self) -> CompileResult<()> {
        let sub = self.reader.u32_leb()?;
        let op = Opcode::from_fc(sub)?;
        match op {
            Opcode::MemoryCopy => {
                let dst_memory = self.reader.byte()?;
                let src_memory = self.reader.byte()?;
                if self.dead() {
                    return Ok(());
                }
                if dst_memory != 0 || src_memory != 0 {
                    return Err(CompileError::UnsupportedMemoryIndex);
                }
                self.bulk_node(op)
            }
            Opcode::MemoryFill => {
                let memory = self.reader.byte()?;
                if self.dead() {
                    return Ok(());
                }
                if memory != 0 {
                    return Err(CompileError::UnsupportedMemoryIndex);
                }
                self.bulk_node(op)
            }
            // the saturating truncations decode like regular unary ops
            _ => self.simple(op.to_u8()),
        }
    }

    fn bulk_node(&mut self, op: Opcode) -> CompileResult<()> {
        let base = self
            .stack_top
            .checked_sub(3)
            .ok_or(CompileError::Internal("operand stack underflow"))?;
        let children = [
            -((base + 1) as i32),
            -((base + 2) as i32),
            -((base + 3) as i32),
        ];
        self.pop_slots(3)?;
        let ptr = self.store.alloc(op, 0, &children)?;
        self.ast_ptrs.push(Some(ptr));
        Ok(())
    }
}
