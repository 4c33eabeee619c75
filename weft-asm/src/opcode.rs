use core::fmt;

/// The byte could not be mapped to a known [`Opcode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid opcode byte 0x{0:02x}")]
pub struct InvalidOpcode(pub u8);

macro_rules! impl_opcodes {
    ($( $(#[$attr:meta])* $name:ident = $value:literal, )*) => {
        /// Instruction tag for one decoded operation.
        ///
        /// Most variants correspond one-to-one to a WebAssembly opcode byte.
        /// The `0xFC`-prefixed operations the compiler supports are folded
        /// into the unassigned `0xCC..=0xD5` range so that every operation
        /// fits the single header byte of a packed expression node. The
        /// `0xC5..=0xCB` range holds the internal pseudo-ops the decoder
        /// inserts to bridge typed stack semantics and the emission target.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
        #[repr(u8)]
        pub enum Opcode {
            $( $(#[$attr])* $name = $value, )*
        }

        impl Opcode {
            /// The raw byte value of this operation.
            pub const fn to_u8(self) -> u8 {
                self as u8
            }
        }

        impl TryFrom<u8> for Opcode {
            type Error = InvalidOpcode;

            fn try_from(b: u8) -> Result<Self, Self::Error> {
                match b {
                    $( $value => Ok(Self::$name), )*
                    _ => Err(InvalidOpcode(b)),
                }
            }
        }
    };
}

impl_opcodes! {
    /// `unreachable`
    Unreachable = 0x00,
    /// `nop`
    Nop = 0x01,
    /// `block`
    Block = 0x02,
    /// `loop`
    Loop = 0x03,
    /// `if`
    If = 0x04,
    /// `else`
    Else = 0x05,
    /// `end`
    End = 0x0B,
    /// `br`
    Br = 0x0C,
    /// `br_if`
    BrIf = 0x0D,
    /// `br_table`
    BrTable = 0x0E,
    /// `return`
    Return = 0x0F,
    /// `call`
    Call = 0x10,
    /// `call_indirect`
    CallIndirect = 0x11,
    /// `drop`
    Drop = 0x1A,
    /// `select`
    Select = 0x1B,
    /// `local.get`
    LocalGet = 0x20,
    /// `local.set`
    LocalSet = 0x21,
    /// `local.tee`
    LocalTee = 0x22,
    /// `global.get`
    GlobalGet = 0x23,
    /// `global.set`
    GlobalSet = 0x24,
    /// `i32.load`
    I32Load = 0x28,
    /// `i64.load`
    I64Load = 0x29,
    /// `f32.load`
    F32Load = 0x2A,
    /// `f64.load`
    F64Load = 0x2B,
    /// `i32.load8_s`
    I32Load8S = 0x2C,
    /// `i32.load8_u`
    I32Load8U = 0x2D,
    /// `i32.load16_s`
    I32Load16S = 0x2E,
    /// `i32.load16_u`
    I32Load16U = 0x2F,
    /// `i64.load8_s`
    I64Load8S = 0x30,
    /// `i64.load8_u`
    I64Load8U = 0x31,
    /// `i64.load16_s`
    I64Load16S = 0x32,
    /// `i64.load16_u`
    I64Load16U = 0x33,
    /// `i64.load32_s`
    I64Load32S = 0x34,
    /// `i64.load32_u`
    I64Load32U = 0x35,
    /// `i32.store`
    I32Store = 0x36,
    /// `i64.store`
    I64Store = 0x37,
    /// `f32.store`
    F32Store = 0x38,
    /// `f64.store`
    F64Store = 0x39,
    /// `i32.store8`
    I32Store8 = 0x3A,
    /// `i32.store16`
    I32Store16 = 0x3B,
    /// `i64.store8`
    I64Store8 = 0x3C,
    /// `i64.store16`
    I64Store16 = 0x3D,
    /// `i64.store32`
    I64Store32 = 0x3E,
    /// `memory.size`
    MemorySize = 0x3F,
    /// `memory.grow`
    MemoryGrow = 0x40,
    /// `i32.const`
    I32Const = 0x41,
    /// `i64.const`
    I64Const = 0x42,
    /// `f32.const`
    F32Const = 0x43,
    /// `f64.const`
    F64Const = 0x44,
    /// `i32.eqz`
    I32Eqz = 0x45,
    /// `i32.eq`
    I32Eq = 0x46,
    /// `i32.ne`
    I32Ne = 0x47,
    /// `i32.lt_s`
    I32LtS = 0x48,
    /// `i32.lt_u`
    I32LtU = 0x49,
    /// `i32.gt_s`
    I32GtS = 0x4A,
    /// `i32.gt_u`
    I32GtU = 0x4B,
    /// `i32.le_s`
    I32LeS = 0x4C,
    /// `i32.le_u`
    I32LeU = 0x4D,
    /// `i32.ge_s`
    I32GeS = 0x4E,
    /// `i32.ge_u`
    I32GeU = 0x4F,
    /// `i64.eqz`
    I64Eqz = 0x50,
    /// `i64.eq`
    I64Eq = 0x51,
    /// `i64.ne`
    I64Ne = 0x52,
    /// `i64.lt_s`
    I64LtS = 0x53,
    /// `i64.lt_u`
    I64LtU = 0x54,
    /// `i64.gt_s`
    I64GtS = 0x55,
    /// `i64.gt_u`
    I64GtU = 0x56,
    /// `i64.le_s`
    I64LeS = 0x57,
    /// `i64.le_u`
    I64LeU = 0x58,
    /// `i64.ge_s`
    I64GeS = 0x59,
    /// `i64.ge_u`
    I64GeU = 0x5A,
    /// `f32.eq`
    F32Eq = 0x5B,
    /// `f32.ne`
    F32Ne = 0x5C,
    /// `f32.lt`
    F32Lt = 0x5D,
    /// `f32.gt`
    F32Gt = 0x5E,
    /// `f32.le`
    F32Le = 0x5F,
    /// `f32.ge`
    F32Ge = 0x60,
    /// `f64.eq`
    F64Eq = 0x61,
    /// `f64.ne`
    F64Ne = 0x62,
    /// `f64.lt`
    F64Lt = 0x63,
    /// `f64.gt`
    F64Gt = 0x64,
    /// `f64.le`
    F64Le = 0x65,
    /// `f64.ge`
    F64Ge = 0x66,
    /// `i32.clz`
    I32Clz = 0x67,
    /// `i32.ctz`
    I32Ctz = 0x68,
    /// `i32.popcnt`
    I32Popcnt = 0x69,
    /// `i32.add`
    I32Add = 0x6A,
    /// `i32.sub`
    I32Sub = 0x6B,
    /// `i32.mul`
    I32Mul = 0x6C,
    /// `i32.div_s`
    I32DivS = 0x6D,
    /// `i32.div_u`
    I32DivU = 0x6E,
    /// `i32.rem_s`
    I32RemS = 0x6F,
    /// `i32.rem_u`
    I32RemU = 0x70,
    /// `i32.and`
    I32And = 0x71,
    /// `i32.or`
    I32Or = 0x72,
    /// `i32.xor`
    I32Xor = 0x73,
    /// `i32.shl`
    I32Shl = 0x74,
    /// `i32.shr_s`
    I32ShrS = 0x75,
    /// `i32.shr_u`
    I32ShrU = 0x76,
    /// `i32.rotl`
    I32Rotl = 0x77,
    /// `i32.rotr`
    I32Rotr = 0x78,
    /// `i64.clz`
    I64Clz = 0x79,
    /// `i64.ctz`
    I64Ctz = 0x7A,
    /// `i64.popcnt`
    I64Popcnt = 0x7B,
    /// `i64.add`
    I64Add = 0x7C,
    /// `i64.sub`
    I64Sub = 0x7D,
    /// `i64.mul`
    I64Mul = 0x7E,
    /// `i64.div_s`
    I64DivS = 0x7F,
    /// `i64.div_u`
    I64DivU = 0x80,
    /// `i64.rem_s`
    I64RemS = 0x81,
    /// `i64.rem_u`
    I64RemU = 0x82,
    /// `i64.and`
    I64And = 0x83,
    /// `i64.or`
    I64Or = 0x84,
    /// `i64.xor`
    I64Xor = 0x85,
    /// `i64.shl`
    I64Shl = 0x86,
    /// `i64.shr_s`
    I64ShrS = 0x87,
    /// `i64.shr_u`
    I64ShrU = 0x88,
    /// `i64.rotl`
    I64Rotl = 0x89,
    /// `i64.rotr`
    I64Rotr = 0x8A,
    /// `f32.abs`
    F32Abs = 0x8B,
    /// `f32.neg`
    F32Neg = 0x8C,
    /// `f32.ceil`
    F32Ceil = 0x8D,
    /// `f32.floor`
    F32Floor = 0x8E,
    /// `f32.trunc`
    F32Trunc = 0x8F,
    /// `f32.nearest`
    F32Nearest = 0x90,
    /// `f32.sqrt`
    F32Sqrt = 0x91,
    /// `f32.add`
    F32Add = 0x92,
    /// `f32.sub`
    F32Sub = 0x93,
    /// `f32.mul`
    F32Mul = 0x94,
    /// `f32.div`
    F32Div = 0x95,
    /// `f32.min`
    F32Min = 0x96,
    /// `f32.max`
    F32Max = 0x97,
    /// `f32.copysign`
    F32Copysign = 0x98,
    /// `f64.abs`
    F64Abs = 0x99,
    /// `f64.neg`
    F64Neg = 0x9A,
    /// `f64.ceil`
    F64Ceil = 0x9B,
    /// `f64.floor`
    F64Floor = 0x9C,
    /// `f64.trunc`
    F64Trunc = 0x9D,
    /// `f64.nearest`
    F64Nearest = 0x9E,
    /// `f64.sqrt`
    F64Sqrt = 0x9F,
    /// `f64.add`
    F64Add = 0xA0,
    /// `f64.sub`
    F64Sub = 0xA1,
    /// `f64.mul`
    F64Mul = 0xA2,
    /// `f64.div`
    F64Div = 0xA3,
    /// `f64.min`
    F64Min = 0xA4,
    /// `f64.max`
    F64Max = 0xA5,
    /// `f64.copysign`
    F64Copysign = 0xA6,
    /// `i32.wrap_i64`
    I32WrapI64 = 0xA7,
    /// `i32.trunc_f32_s`
    I32TruncF32S = 0xA8,
    /// `i32.trunc_f32_u`
    I32TruncF32U = 0xA9,
    /// `i32.trunc_f64_s`
    I32TruncF64S = 0xAA,
    /// `i32.trunc_f64_u`
    I32TruncF64U = 0xAB,
    /// `i64.extend_i32_s`
    I64ExtendI32S = 0xAC,
    /// `i64.extend_i32_u`
    I64ExtendI32U = 0xAD,
    /// `i64.trunc_f32_s`
    I64TruncF32S = 0xAE,
    /// `i64.trunc_f32_u`
    I64TruncF32U = 0xAF,
    /// `i64.trunc_f64_s`
    I64TruncF64S = 0xB0,
    /// `i64.trunc_f64_u`
    I64TruncF64U = 0xB1,
    /// `f32.convert_i32_s`
    F32ConvertI32S = 0xB2,
    /// `f32.convert_i32_u`
    F32ConvertI32U = 0xB3,
    /// `f32.convert_i64_s`
    F32ConvertI64S = 0xB4,
    /// `f32.convert_i64_u`
    F32ConvertI64U = 0xB5,
    /// `f32.demote_f64`
    F32DemoteF64 = 0xB6,
    /// `f64.convert_i32_s`
    F64ConvertI32S = 0xB7,
    /// `f64.convert_i32_u`
    F64ConvertI32U = 0xB8,
    /// `f64.convert_i64_s`
    F64ConvertI64S = 0xB9,
    /// `f64.convert_i64_u`
    F64ConvertI64U = 0xBA,
    /// `f64.promote_f32`
    F64PromoteF32 = 0xBB,
    /// `i32.reinterpret_f32`
    I32ReinterpretF32 = 0xBC,
    /// `i64.reinterpret_f64`
    I64ReinterpretF64 = 0xBD,
    /// `f32.reinterpret_i32`
    F32ReinterpretI32 = 0xBE,
    /// `f64.reinterpret_i64`
    F64ReinterpretI64 = 0xBF,
    /// `i32.extend8_s`
    I32Extend8S = 0xC0,
    /// `i32.extend16_s`
    I32Extend16S = 0xC1,
    /// `i64.extend8_s`
    I64Extend8S = 0xC2,
    /// `i64.extend16_s`
    I64Extend16S = 0xC3,
    /// `i64.extend32_s`
    I64Extend32S = 0xC4,
    /// Pseudo-op: coerce the operand to a branch condition.
    Bool = 0xC5,
    /// Pseudo-op: coerce the operand to an inverted branch condition.
    BoolNot = 0xC6,
    /// Pseudo-op: widen a comparison result to an `i32` value.
    BoolToInt = 0xC7,
    /// Pseudo-op: reinterpret the low 32 bits of the operand as unsigned.
    ToU32 = 0xC8,
    /// Pseudo-op: reinterpret a 64-bit operand as signed.
    ToS64 = 0xC9,
    /// Pseudo-op: single-byte unsigned load by direct byte-view indexing.
    U32Load = 0xCA,
    /// Pseudo-op: single-byte load widened to `i64` by direct indexing.
    S64Load = 0xCB,
    /// `i32.trunc_sat_f32_s` (`0xFC 0x00`)
    I32TruncSatF32S = 0xCC,
    /// `i32.trunc_sat_f32_u` (`0xFC 0x01`)
    I32TruncSatF32U = 0xCD,
    /// `i32.trunc_sat_f64_s` (`0xFC 0x02`)
    I32TruncSatF64S = 0xCE,
    /// `i32.trunc_sat_f64_u` (`0xFC 0x03`)
    I32TruncSatF64U = 0xCF,
    /// `i64.trunc_sat_f32_s` (`0xFC 0x04`)
    I64TruncSatF32S = 0xD0,
    /// `i64.trunc_sat_f32_u` (`0xFC 0x05`)
    I64TruncSatF32U = 0xD1,
    /// `i64.trunc_sat_f64_s` (`0xFC 0x06`)
    I64TruncSatF64S = 0xD2,
    /// `i64.trunc_sat_f64_u` (`0xFC 0x07`)
    I64TruncSatF64U = 0xD3,
    /// `memory.copy` (`0xFC 0x0A`)
    MemoryCopy = 0xD4,
    /// `memory.fill` (`0xFC 0x0B`)
    MemoryFill = 0xD5,
}

/// The `0xFC` opcode prefix byte.
pub const PREFIX_FC: u8 = 0xFC;

impl Opcode {
    /// Map a `0xFC`-prefixed sub-opcode to its internal single-byte tag.
    pub fn from_fc(sub: u32) -> Result<Self, InvalidOpcode> {
        match sub {
            0x00 => Ok(Self::I32TruncSatF32S),
            0x01 => Ok(Self::I32TruncSatF32U),
            0x02 => Ok(Self::I32TruncSatF64S),
            0x03 => Ok(Self::I32TruncSatF64U),
            0x04 => Ok(Self::I64TruncSatF32S),
            0x05 => Ok(Self::I64TruncSatF32U),
            0x06 => Ok(Self::I64TruncSatF64S),
            0x07 => Ok(Self::I64TruncSatF64U),
            0x0A => Ok(Self::MemoryCopy),
            0x0B => Ok(Self::MemoryFill),
            // The sub-opcode space is open-ended; saturate unknown values
            // onto the prefix byte for the error report.
            _ => Err(InvalidOpcode(u8::try_from(sub).unwrap_or(PREFIX_FC))),
        }
    }

    /// Whether the operation reads or writes linear memory through the
    /// instance context. Drives the expression-inlining barrier.
    pub const fn touches_memory(self) -> bool {
        matches!(
            self,
            Self::I32Load
                | Self::I64Load
                | Self::F32Load
                | Self::F64Load
                | Self::I32Load8S
                | Self::I32Load8U
                | Self::I32Load16S
                | Self::I32Load16U
                | Self::I64Load8S
                | Self::I64Load8U
                | Self::I64Load16S
                | Self::I64Load16U
                | Self::I64Load32S
                | Self::I64Load32U
                | Self::I32Store
                | Self::I64Store
                | Self::F32Store
                | Self::F64Store
                | Self::I32Store8
                | Self::I32Store16
                | Self::I64Store8
                | Self::I64Store16
                | Self::I64Store32
                | Self::U32Load
                | Self::S64Load
                | Self::MemoryCopy
                | Self::MemoryFill
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn opcode_byte_round_trip() {
        for op in Opcode::iter() {
            let b = op.to_u8();
            assert_eq!(Opcode::try_from(b).unwrap(), op);
        }
    }

    #[test]
    fn unassigned_bytes_are_rejected() {
        for b in [0x06u8, 0x12, 0x1C, 0x25, 0x27, 0xD6, 0xFF] {
            assert_eq!(Opcode::try_from(b), Err(InvalidOpcode(b)));
        }
    }

    #[test]
    fn fc_prefix_mapping() {
        assert_eq!(Opcode::from_fc(0x00).unwrap(), Opcode::I32TruncSatF32S);
        assert_eq!(Opcode::from_fc(0x07).unwrap(), Opcode::I64TruncSatF64U);
        assert_eq!(Opcode::from_fc(0x0A).unwrap(), Opcode::MemoryCopy);
        assert_eq!(Opcode::from_fc(0x0B).unwrap(), Opcode::MemoryFill);
        // memory.init / data.drop are outside the modeled subset
        assert!(Opcode::from_fc(0x08).is_err());
        assert!(Opcode::from_fc(0x09).is_err());
    }

    #[test]
    fn memory_barrier_classification() {
        assert!(Opcode::I32Load.touches_memory());
        assert!(Opcode::I64Store32.touches_memory());
        assert!(Opcode::MemoryFill.touches_memory());
        assert!(!Opcode::MemoryGrow.touches_memory());
        assert!(!Opcode::I32Add.touches_memory());
        assert!(!Opcode::Call.touches_memory());
    }
}
