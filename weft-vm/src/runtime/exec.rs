//! The tree-walking execution backend.
//!
//! Walks a compiled procedure against the instance context. Structured
//! control is driven by a small flow signal; the dispatch loop re-enters
//! its body at the case label a `Jump` names and falls through from there,
//! matching the lowering's switch encoding.

use weft_asm::Opcode;

use super::{library, Instance, Value};
use crate::error::{CompileError, Trap, VmError};
use crate::target::{CallTarget, Expr, Proc, Stmt};

/// Control signal propagating out of a statement.
enum Flow {
    Next,
    Break(u32),
    Continue(u32),
    Jump(u32),
    Return(Vec<Value>),
}

/// Run `proc` with `args`, returning its results.
pub(crate) fn run(
    inst: &mut Instance,
    proc: &Proc,
    args: &[Value],
) -> Result<Vec<Value>, VmError> {
    if args.len() != proc.params.len() {
        return Err(Trap::ValueTypeMismatch.into());
    }
    for (arg, ty) in args.iter().zip(&proc.params) {
        if arg.ty() != *ty {
            return Err(Trap::ValueTypeMismatch.into());
        }
    }
    let mut locals = args.to_vec();
    locals.extend(proc.locals.iter().map(|&ty| Value::zero(ty)));
    let mut machine = Machine {
        inst,
        locals,
        slots: vec![Value::I32(0); proc.slot_count + 1],
    };
    match machine.exec_seq(&proc.body)? {
        Flow::Return(values) => Ok(values),
        Flow::Next => (1..=proc.result_count)
            .map(|slot| {
                machine
                    .slots
                    .get(slot)
                    .copied()
                    .ok_or_else(|| CompileError::Internal("result slot out of range").into())
            })
            .collect(),
        _ => Err(CompileError::Internal("control transfer escaped the function").into()),
    }
}

struct Machine<'a> {
    inst: &'a mut Instance,
    locals: Vec<Value>,
    slots: Vec<Value>,
}

impl Machine<'_> {
    fn exec_seq(&mut self, stmts: &[Stmt]) -> Result<Flow, VmError> {
        for stmt in stmts {
            match self.exec_stmt(stmt)? {
                Flow::Next => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Next)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow, VmError> {
        match stmt {
            Stmt::Assign { slot, value } => {
                let v = self.eval(value)?;
                self.set_slot(*slot, v)?;
            }
            Stmt::SetLocal { local, value } => {
                let v = self.eval(value)?;
                let dst = self
                    .locals
                    .get_mut(*local as usize)
                    .ok_or(Trap::IndexOutOfRange)?;
                *dst = v;
            }
            Stmt::SetGlobal { global, value } => {
                let v = self.eval(value)?;
                let dst = self
                    .inst
                    .globals
                    .get_mut(*global as usize)
                    .ok_or(Trap::IndexOutOfRange)?;
                *dst = v;
            }
            Stmt::Store {
                op,
                addr,
                value,
                offset,
            } => {
                let ea = self.effective_address(addr, *offset)?;
                let v = self.eval(value)?;
                self.store(*op, ea, v)?;
            }
            Stmt::MemoryCopy { dst, src, len } => {
                let dst = u64::from(self.eval(dst)?.as_i32()? as u32);
                let src = u64::from(self.eval(src)?.as_i32()? as u32);
                let len = u64::from(self.eval(len)?.as_i32()? as u32);
                self.inst.memory.copy(dst, src, len)?;
            }
            Stmt::MemoryFill { dst, value, len } => {
                let dst = u64::from(self.eval(dst)?.as_i32()? as u32);
                let value = self.eval(value)?.as_i32()? as u8;
                let len = u64::from(self.eval(len)?.as_i32()? as u32);
                self.inst.memory.fill(dst, value, len)?;
            }
            Stmt::Call {
                target,
                args,
                results,
            } => {
                let values = match target {
                    CallTarget::Direct(func) => self.invoke_direct(*func, args)?,
                    CallTarget::Indirect { type_index, func } => {
                        self.invoke_indirect(*type_index, func, args)?
                    }
                };
                match results {
                    None => {
                        if !values.is_empty() {
                            return Err(
                                CompileError::Internal("unexpected call results").into()
                            );
                        }
                    }
                    Some((first, count)) => {
                        if values.len() != usize::from(*count) {
                            return Err(
                                CompileError::Internal("call result arity mismatch").into()
                            );
                        }
                        for (i, v) in values.into_iter().enumerate() {
                            self.set_slot(first + i as u8, v)?;
                        }
                    }
                }
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
            }
            Stmt::Block { label, body } => match self.exec_seq(body)? {
                Flow::Break(l) if l == *label => {}
                Flow::Next => {}
                other => return Ok(other),
            },
            Stmt::Loop { label, body } => loop {
                match self.exec_seq(body)? {
                    Flow::Continue(l) if l == *label => {}
                    Flow::Break(l) if l == *label => break,
                    Flow::Next => break,
                    other => return Ok(other),
                }
            },
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let taken = self.eval(cond)?.as_i32()? != 0;
                let arm = if taken { then_body } else { else_body };
                return self.exec_seq(arm);
            }
            Stmt::Break(label) => return Ok(Flow::Break(*label)),
            Stmt::Continue(label) => return Ok(Flow::Continue(*label)),
            Stmt::Jump(case) => return Ok(Flow::Jump(*case)),
            Stmt::Dispatch { body } => return self.exec_dispatch(body),
            Stmt::CaseLabel(_) => {}
            Stmt::Table {
                index,
                targets,
                fallback,
            } => {
                let i = self.eval(index)?.as_i32()?;
                let arm = usize::try_from(i)
                    .ok()
                    .and_then(|i| targets.get(i))
                    .unwrap_or(fallback);
                return self.exec_seq(arm);
            }
            Stmt::Return(exprs) => {
                let mut values = Vec::with_capacity(exprs.len());
                for e in exprs {
                    values.push(self.eval(e)?);
                }
                return Ok(Flow::Return(values));
            }
            Stmt::Trap => return Err(Trap::Unreachable.into()),
        }
        Ok(Flow::Next)
    }

    fn exec_dispatch(&mut self, body: &[Stmt]) -> Result<Flow, VmError> {
        let mut target: Option<u32> = None;
        'restart: loop {
            let mut skipping = target;
            for stmt in body {
                if let Some(case) = skipping {
                    if let Stmt::CaseLabel(label) = stmt {
                        if *label == case {
                            skipping = None;
                        }
                    }
                    continue;
                }
                match self.exec_stmt(stmt)? {
                    Flow::Next => {}
                    Flow::Jump(case) => {
                        target = Some(case);
                        continue 'restart;
                    }
                    other => return Ok(other),
                }
            }
            if skipping.is_some() {
                return Err(CompileError::Internal("dispatch case label missing").into());
            }
            return Ok(Flow::Next);
        }
    }

    fn slot(&self, slot: u8) -> Result<Value, VmError> {
        self.slots
            .get(usize::from(slot))
            .copied()
            .ok_or_else(|| CompileError::Internal("slot read out of range").into())
    }

    fn set_slot(&mut self, slot: u8, value: Value) -> Result<(), VmError> {
        let dst = self
            .slots
            .get_mut(usize::from(slot))
            .ok_or(CompileError::Internal("slot write out of range"))?;
        *dst = value;
        Ok(())
    }

    fn effective_address(&mut self, addr: &Expr, offset: u32) -> Result<u64, VmError> {
        let base = self.eval(addr)?.as_i32()? as u32;
        Ok(u64::from(base) + u64::from(offset))
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, VmError> {
        let value = match expr {
            Expr::I32Const(v) => Value::I32(*v),
            Expr::I64Const(v) => Value::I64(*v),
            Expr::F32Const(v) => Value::F32(*v),
            Expr::F64Const(v) => Value::F64(*v),
            Expr::Slot(slot) => self.slot(*slot)?,
            Expr::Local(local) => self
                .locals
                .get(*local as usize)
                .copied()
                .ok_or(Trap::IndexOutOfRange)?,
            Expr::Global(global) => self
                .inst
                .globals
                .get(*global as usize)
                .copied()
                .ok_or(Trap::IndexOutOfRange)?,
            Expr::Unary(op, inner) => {
                let v = self.eval(inner)?;
                apply_unary(*op, v)?
            }
            Expr::Binary(op, a, b) => {
                let x = self.eval(a)?;
                let y = self.eval(b)?;
                apply_binary(*op, x, y)?
            }
            Expr::Select {
                cond,
                if_true,
                if_false,
            } => {
                // both values evaluate before the condition picks one
                let t = self.eval(if_true)?;
                let f = self.eval(if_false)?;
                if self.eval(cond)?.as_i32()? != 0 {
                    t
                } else {
                    f
                }
            }
            Expr::Load { op, addr, offset } => {
                let ea = self.effective_address(addr, *offset)?;
                self.load(*op, ea)?
            }
            Expr::MemorySize => Value::I32(self.inst.memory.page_count() as i32),
            Expr::MemoryGrow(delta) => {
                let delta = self.eval(delta)?.as_i32()? as u32;
                Value::I32(self.inst.memory.grow(delta))
            }
            Expr::Call { func, args } => {
                expect_single(self.invoke_direct(*func, args)?)?
            }
            Expr::CallIndirect {
                type_index,
                func,
                args,
            } => expect_single(self.invoke_indirect(*type_index, func, args)?)?,
        };
        Ok(value)
    }

    fn invoke_direct(&mut self, func: u32, args: &[Expr]) -> Result<Vec<Value>, VmError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg)?);
        }
        self.inst.invoke(func, &values)
    }

    fn invoke_indirect(
        &mut self,
        type_index: u32,
        func: &Expr,
        args: &[Expr],
    ) -> Result<Vec<Value>, VmError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg)?);
        }
        let element = self.eval(func)?.as_i32()? as u32;
        let func = self
            .inst
            .table
            .get(element as usize)
            .copied()
            .flatten()
            .ok_or(Trap::UndefinedTableEntry)?;
        {
            let module = self.inst.module();
            if module.func_type(func)? != module.type_at(type_index)? {
                return Err(Trap::IndirectCallTypeMismatch.into());
            }
        }
        self.inst.invoke(func, &values)
    }

    fn load(&mut self, op: Opcode, ea: u64) -> Result<Value, VmError> {
        let memory = &self.inst.memory;
        let value = match op {
            Opcode::I32Load => Value::I32(i32::from_le_bytes(memory.load(ea)?)),
            Opcode::I64Load => Value::I64(i64::from_le_bytes(memory.load(ea)?)),
            Opcode::F32Load => {
                Value::F32(f32::from_bits(u32::from_le_bytes(memory.load(ea)?)))
            }
            Opcode::F64Load => {
                Value::F64(f64::from_bits(u64::from_le_bytes(memory.load(ea)?)))
            }
            Opcode::I32Load8S => Value::I32(i32::from(memory.load::<1>(ea)?[0] as i8)),
            // the direct byte-view variants index the unsigned view
            Opcode::I32Load8U | Opcode::U32Load => {
                Value::I32(i32::from(memory.load::<1>(ea)?[0]))
            }
            Opcode::I32Load16S => Value::I32(i32::from(i16::from_le_bytes(memory.load(ea)?))),
            Opcode::I32Load16U => Value::I32(i32::from(u16::from_le_bytes(memory.load(ea)?))),
            Opcode::I64Load8S => Value::I64(i64::from(memory.load::<1>(ea)?[0] as i8)),
            Opcode::I64Load8U | Opcode::S64Load => {
                Value::I64(i64::from(memory.load::<1>(ea)?[0]))
            }
            Opcode::I64Load16S => Value::I64(i64::from(i16::from_le_bytes(memory.load(ea)?))),
            Opcode::I64Load16U => Value::I64(i64::from(u16::from_le_bytes(memory.load(ea)?))),
            Opcode::I64Load32S => Value::I64(i64::from(i32::from_le_bytes(memory.load(ea)?))),
            Opcode::I64Load32U => Value::I64(i64::from(u32::from_le_bytes(memory.load(ea)?))),
            _ => return Err(CompileError::Internal("unknown load opcode").into()),
        };
        Ok(value)
    }

    fn store(&mut self, op: Opcode, ea: u64, value: Value) -> Result<(), VmError> {
        let memory = &mut self.inst.memory;
        match op {
            Opcode::I32Store => memory.store(ea, value.as_i32()?.to_le_bytes())?,
            Opcode::I64Store => memory.store(ea, value.as_i64()?.to_le_bytes())?,
            Opcode::F32Store => memory.store(ea, value.as_f32()?.to_bits().to_le_bytes())?,
            Opcode::F64Store => memory.store(ea, value.as_f64()?.to_bits().to_le_bytes())?,
            Opcode::I32Store8 => memory.store(ea, [value.as_i32()? as u8])?,
            Opcode::I32Store16 => memory.store(ea, (value.as_i32()? as u16).to_le_bytes())?,
            Opcode::I64Store8 => memory.store(ea, [value.as_i64()? as u8])?,
            Opcode::I64Store16 => memory.store(ea, (value.as_i64()? as u16).to_le_bytes())?,
            Opcode::I64Store32 => memory.store(ea, (value.as_i64()? as u32).to_le_bytes())?,
            _ => return Err(CompileError::Internal("unknown store opcode").into()),
        }
        Ok(())
    }
}

fn expect_single(values: Vec<Value>) -> Result<Value, VmError> {
    if values.len() == 1 {
        Ok(values[0])
    } else {
        Err(CompileError::Internal("expected a single call result").into())
    }
}

fn apply_unary(op: Opcode, v: Value) -> Result<Value, VmError> {
    use Opcode::*;
    let value = match op {
        // boolean and reinterpretation pseudo-ops
        Bool | BoolToInt => Value::I32(i32::from(v.as_i32()? != 0)),
        BoolNot => Value::I32(i32::from(v.as_i32()? == 0)),
        ToU32 => Value::I32(v.as_i32()?),
        ToS64 => Value::I64(v.as_i64()?),

        I32Eqz => Value::I32(i32::from(v.as_i32()? == 0)),
        I64Eqz => Value::I32(i32::from(v.as_i64()? == 0)),
        I32Clz => Value::I32(library::i32_clz(v.as_i32()?)),
        I32Ctz => Value::I32(library::i32_ctz(v.as_i32()?)),
        I32Popcnt => Value::I32(library::i32_popcnt(v.as_i32()?)),
        I64Clz => Value::I64(library::i64_clz(v.as_i64()?)),
        I64Ctz => Value::I64(library::i64_ctz(v.as_i64()?)),
        I64Popcnt => Value::I64(library::i64_popcnt(v.as_i64()?)),

        F32Abs => Value::F32(v.as_f32()?.abs()),
        F32Neg => Value::F32(-v.as_f32()?),
        F32Ceil => Value::F32(v.as_f32()?.ceil()),
        F32Floor => Value::F32(v.as_f32()?.floor()),
        F32Trunc => Value::F32(v.as_f32()?.trunc()),
        F32Nearest => Value::F32(library::nearest32(v.as_f32()?)),
        F32Sqrt => Value::F32(v.as_f32()?.sqrt()),
        F64Abs => Value::F64(v.as_f64()?.abs()),
        F64Neg => Value::F64(-v.as_f64()?),
        F64Ceil => Value::F64(v.as_f64()?.ceil()),
        F64Floor => Value::F64(v.as_f64()?.floor()),
        F64Trunc => Value::F64(v.as_f64()?.trunc()),
        F64Nearest => Value::F64(library::nearest64(v.as_f64()?)),
        F64Sqrt => Value::F64(v.as_f64()?.sqrt()),

        I32WrapI64 => Value::I32(v.as_i64()? as i32),
        I32TruncF32S => Value::I32(v.as_f32()? as i32),
        I32TruncF32U => Value::I32((v.as_f32()? as u32) as i32),
        I32TruncF64S => Value::I32(v.as_f64()? as i32),
        I32TruncF64U => Value::I32((v.as_f64()? as u32) as i32),
        I64ExtendI32S => Value::I64(i64::from(v.as_i32()?)),
        I64ExtendI32U => Value::I64(i64::from(v.as_i32()? as u32)),
        I64TruncF32S => Value::I64(v.as_f32()? as i64),
        I64TruncF32U => Value::I64((v.as_f32()? as u64) as i64),
        I64TruncF64S => Value::I64(v.as_f64()? as i64),
        I64TruncF64U => Value::I64((v.as_f64()? as u64) as i64),
        F32ConvertI32S => Value::F32(v.as_i32()? as f32),
        F32ConvertI32U => Value::F32((v.as_i32()? as u32) as f32),
        F32ConvertI64S => Value::F32(v.as_i64()? as f32),
        F32ConvertI64U => Value::F32((v.as_i64()? as u64) as f32),
        F32DemoteF64 => Value::F32(v.as_f64()? as f32),
        F64ConvertI32S => Value::F64(f64::from(v.as_i32()?)),
        F64ConvertI32U => Value::F64(f64::from(v.as_i32()? as u32)),
        F64ConvertI64S => Value::F64(v.as_i64()? as f64),
        F64ConvertI64U => Value::F64((v.as_i64()? as u64) as f64),
        F64PromoteF32 => Value::F64(f64::from(v.as_f32()?)),

        I32ReinterpretF32 => Value::I32(library::i32_reinterpret_f32(v.as_f32()?)),
        I64ReinterpretF64 => Value::I64(library::i64_reinterpret_f64(v.as_f64()?)),
        F32ReinterpretI32 => Value::F32(library::f32_reinterpret_i32(v.as_i32()?)),
        F64ReinterpretI64 => Value::F64(library::f64_reinterpret_i64(v.as_i64()?)),

        I32Extend8S => Value::I32(v.as_i32()? as i8 as i32),
        I32Extend16S => Value::I32(v.as_i32()? as i16 as i32),
        I64Extend8S => Value::I64(library::i64_extend8_s(v.as_i64()?)),
        I64Extend16S => Value::I64(library::i64_extend16_s(v.as_i64()?)),
        I64Extend32S => Value::I64(library::i64_extend32_s(v.as_i64()?)),

        I32TruncSatF32S => Value::I32(library::i32_trunc_sat_f32_s(v.as_f32()?)),
        I32TruncSatF32U => Value::I32(library::i32_trunc_sat_f32_u(v.as_f32()?)),
        I32TruncSatF64S => Value::I32(library::i32_trunc_sat_f64_s(v.as_f64()?)),
        I32TruncSatF64U => Value::I32(library::i32_trunc_sat_f64_u(v.as_f64()?)),
        I64TruncSatF32S => Value::I64(library::i64_trunc_sat_f32_s(v.as_f32()?)),
        I64TruncSatF32U => Value::I64(library::i64_trunc_sat_f32_u(v.as_f32()?)),
        I64TruncSatF64S => Value::I64(library::i64_trunc_sat_f64_s(v.as_f64()?)),
        I64TruncSatF64U => Value::I64(library::i64_trunc_sat_f64_u(v.as_f64()?)),

        _ => return Err(CompileError::Internal("unknown unary operation").into()),
    };
    Ok(value)
}

fn apply_binary(op: Opcode, x: Value, y: Value) -> Result<Value, VmError> {
    use Opcode::*;
    let value = match op {
        I32Add => Value::I32(x.as_i32()?.wrapping_add(y.as_i32()?)),
        I32Sub => Value::I32(x.as_i32()?.wrapping_sub(y.as_i32()?)),
        I32Mul => Value::I32(x.as_i32()?.wrapping_mul(y.as_i32()?)),
        I32DivS => {
            let (x, y) = (x.as_i32()?, y.as_i32()?);
            if y == 0 {
                return Err(Trap::IntegerDivideByZero.into());
            }
            if x == i32::MIN && y == -1 {
                return Err(Trap::IntegerOverflow.into());
            }
            Value::I32(x.wrapping_div(y))
        }
        I32DivU => {
            let (x, y) = (x.as_i32()? as u32, y.as_i32()? as u32);
            if y == 0 {
                return Err(Trap::IntegerDivideByZero.into());
            }
            Value::I32((x / y) as i32)
        }
        I32RemS => {
            let (x, y) = (x.as_i32()?, y.as_i32()?);
            if y == 0 {
                return Err(Trap::IntegerDivideByZero.into());
            }
            Value::I32(x.wrapping_rem(y))
        }
        I32RemU => {
            let (x, y) = (x.as_i32()? as u32, y.as_i32()? as u32);
            if y == 0 {
                return Err(Trap::IntegerDivideByZero.into());
            }
            Value::I32((x % y) as i32)
        }
        I32And => Value::I32(x.as_i32()? & y.as_i32()?),
        I32Or => Value::I32(x.as_i32()? | y.as_i32()?),
        I32Xor => Value::I32(x.as_i32()? ^ y.as_i32()?),
        I32Shl => Value::I32(x.as_i32()?.wrapping_shl(y.as_i32()? as u32)),
        I32ShrS => Value::I32(x.as_i32()?.wrapping_shr(y.as_i32()? as u32)),
        I32ShrU => Value::I32((x.as_i32()? as u32).wrapping_shr(y.as_i32()? as u32) as i32),
        I32Rotl => Value::I32(library::i32_rotl(x.as_i32()?, y.as_i32()?)),
        I32Rotr => Value::I32(library::i32_rotr(x.as_i32()?, y.as_i32()?)),

        I32Eq => Value::I32(i32::from(x.as_i32()? == y.as_i32()?)),
        I32Ne => Value::I32(i32::from(x.as_i32()? != y.as_i32()?)),
        I32LtS => Value::I32(i32::from(x.as_i32()? < y.as_i32()?)),
        I32LtU => Value::I32(i32::from((x.as_i32()? as u32) < (y.as_i32()? as u32))),
        I32GtS => Value::I32(i32::from(x.as_i32()? > y.as_i32()?)),
        I32GtU => Value::I32(i32::from((x.as_i32()? as u32) > (y.as_i32()? as u32))),
        I32LeS => Value::I32(i32::from(x.as_i32()? <= y.as_i32()?)),
        I32LeU => Value::I32(i32::from((x.as_i32()? as u32) <= (y.as_i32()? as u32))),
        I32GeS => Value::I32(i32::from(x.as_i32()? >= y.as_i32()?)),
        I32GeU => Value::I32(i32::from((x.as_i32()? as u32) >= (y.as_i32()? as u32))),

        I64Add => Value::I64(x.as_i64()?.wrapping_add(y.as_i64()?)),
        I64Sub => Value::I64(x.as_i64()?.wrapping_sub(y.as_i64()?)),
        I64Mul => Value::I64(x.as_i64()?.wrapping_mul(y.as_i64()?)),
        I64DivS => {
            let (x, y) = (x.as_i64()?, y.as_i64()?);
            if y == 0 {
                return Err(Trap::IntegerDivideByZero.into());
            }
            if x == i64::MIN && y == -1 {
                return Err(Trap::IntegerOverflow.into());
            }
            Value::I64(x.wrapping_div(y))
        }
        I64DivU => {
            let (x, y) = (x.as_i64()? as u64, y.as_i64()? as u64);
            if y == 0 {
                return Err(Trap::IntegerDivideByZero.into());
            }
            Value::I64((x / y) as i64)
        }
        I64RemS => {
            let (x, y) = (x.as_i64()?, y.as_i64()?);
            if y == 0 {
                return Err(Trap::IntegerDivideByZero.into());
            }
            Value::I64(x.wrapping_rem(y))
        }
        I64RemU => {
            let (x, y) = (x.as_i64()? as u64, y.as_i64()? as u64);
            if y == 0 {
                return Err(Trap::IntegerDivideByZero.into());
            }
            Value::I64((x % y) as i64)
        }
        I64And => Value::I64(x.as_i64()? & y.as_i64()?),
        I64Or => Value::I64(x.as_i64()? | y.as_i64()?),
        I64Xor => Value::I64(x.as_i64()? ^ y.as_i64()?),
        I64Shl => Value::I64(x.as_i64()?.wrapping_shl(y.as_i64()? as u32)),
        I64ShrS => Value::I64(x.as_i64()?.wrapping_shr(y.as_i64()? as u32)),
        I64ShrU => Value::I64((x.as_i64()? as u64).wrapping_shr(y.as_i64()? as u32) as i64),
        I64Rotl => Value::I64(library::i64_rotl(x.as_i64()?, y.as_i64()?)),
        I64Rotr => Value::I64(library::i64_rotr(x.as_i64()?, y.as_i64()?)),

        I64Eq => Value::I32(i32::from(x.as_i64()? == y.as_i64()?)),
        I64Ne => Value::I32(i32::from(x.as_i64()? != y.as_i64()?)),
        I64LtS => Value::I32(i32::from(x.as_i64()? < y.as_i64()?)),
        I64LtU => Value::I32(i32::from((x.as_i64()? as u64) < (y.as_i64()? as u64))),
        I64GtS => Value::I32(i32::from(x.as_i64()? > y.as_i64()?)),
        I64GtU => Value::I32(i32::from((x.as_i64()? as u64) > (y.as_i64()? as u64))),
        I64LeS => Value::I32(i32::from(x.as_i64()? <= y.as_i64()?)),
        I64LeU => Value::I32(i32::from((x.as_i64()? as u64) <= (y.as_i64()? as u64))),
        I64GeS => Value::I32(i32::from(x.as_i64()? >= y.as_i64()?)),
        I64GeU => Value::I32(i32::from((x.as_i64()? as u64) >= (y.as_i64()? as u64))),

        F32Add => Value::F32(x.as_f32()? + y.as_f32()?),
        F32Sub => Value::F32(x.as_f32()? - y.as_f32()?),
        F32Mul => Value::F32(x.as_f32()? * y.as_f32()?),
        F32Div => Value::F32(x.as_f32()? / y.as_f32()?),
        F32Min => Value::F32(library::fmin32(x.as_f32()?, y.as_f32()?)),
        F32Max => Value::F32(library::fmax32(x.as_f32()?, y.as_f32()?)),
        F32Copysign => Value::F32(library::copysign32(x.as_f32()?, y.as_f32()?)),
        F64Add => Value::F64(x.as_f64()? + y.as_f64()?),
        F64Sub => Value::F64(x.as_f64()? - y.as_f64()?),
        F64Mul => Value::F64(x.as_f64()? * y.as_f64()?),
        F64Div => Value::F64(x.as_f64()? / y.as_f64()?),
        F64Min => Value::F64(library::fmin64(x.as_f64()?, y.as_f64()?)),
        F64Max => Value::F64(library::fmax64(x.as_f64()?, y.as_f64()?)),
        F64Copysign => Value::F64(library::copysign64(x.as_f64()?, y.as_f64()?)),

        F32Eq => Value::I32(i32::from(x.as_f32()? == y.as_f32()?)),
        F32Ne => Value::I32(i32::from(x.as_f32()? != y.as_f32()?)),
        F32Lt => Value::I32(i32::from(x.as_f32()? < y.as_f32()?)),
        F32Gt => Value::I32(i32::from(x.as_f32()? > y.as_f32()?)),
        F32Le => Value::I32(i32::from(x.as_f32()? <= y.as_f32()?)),
        F32Ge => Value::I32(i32::from(x.as_f32()? >= y.as_f32()?)),
        F64Eq => Value::I32(i32::from(x.as_f64()? == y.as_f64()?)),
        F64Ne => Value::I32(i32::from(x.as_f64()? != y.as_f64()?)),
        F64Lt => Value::I32(i32::from(x.as_f64()? < y.as_f64()?)),
        F64Gt => Value::I32(i32::from(x.as_f64()? > y.as_f64()?)),
        F64Le => Value::I32(i32::from(x.as_f64()? <= y.as_f64()?)),
        F64Ge => Value::I32(i32::from(x.as_f64()? >= y.as_f64()?)),

        _ => return Err(CompileError::Internal("unknown binary operation").into()),
    };
    Ok(value)
}
