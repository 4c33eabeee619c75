//! Per-opcode decode metadata.
//!
//! One 16-bit word per opcode byte drives the table-based decode path for
//! roughly 150 of the ~180 supported operations; control, call, constant
//! and bulk-memory opcodes carry a zero word and are dispatched explicitly.

use bitflags::bitflags;

bitflags! {
    /// Boolean decode properties of an opcode. The low two bits of the
    /// containing [`OpMeta`] word hold the operand pop count and are not
    /// part of this set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpFlags: u16 {
        /// The operation pushes one result slot.
        const PUSH = 1 << 2;
        /// Fully handled by the table-driven decode path.
        const SIMPLE = 1 << 3;
        /// A trailing unsigned-LEB index immediate follows.
        const IMM_INDEX = 1 << 4;
        /// An alignment byte precedes the index immediate and is skipped.
        const ALIGN = 1 << 5;
        /// The result is a boolean; widen it through `BoolToInt`.
        const BOOL_RESULT = 1 << 6;
        /// Coerce popped operands through `ToU32` first.
        const COERCE_U32 = 1 << 7;
        /// Coerce popped operands through `ToS64` first.
        const COERCE_S64 = 1 << 8;
        /// Emit no node: the operation only adjusts the virtual stack.
        const OMIT = 1 << 9;
        /// Mask the second operand with 63 (64-bit shift/rotate counts).
        const MASK63 = 1 << 10;
    }
}

/// Packed metadata word for one opcode byte: a 2-bit pop count in the low
/// bits plus [`OpFlags`] above them. A zero word marks an opcode that the
/// decoder must handle explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpMeta(u16);

impl OpMeta {
    /// Marker for explicitly-dispatched opcodes.
    pub const SPECIAL: Self = Self(0);

    const fn new(pops: u16, flags: u16) -> Self {
        Self(pops | flags)
    }

    /// Whether the opcode needs explicit dispatch.
    pub const fn is_special(self) -> bool {
        self.0 == 0
    }

    /// Number of operand slots popped (0..=3).
    pub const fn pops(self) -> usize {
        (self.0 & 0b11) as usize
    }

    /// The boolean properties of the opcode.
    pub const fn flags(self) -> OpFlags {
        OpFlags::from_bits_truncate(self.0)
    }

    /// Shorthand for a single flag test.
    pub const fn has(self, flag: OpFlags) -> bool {
        self.flags().contains(flag)
    }
}

const P: u16 = OpFlags::PUSH.bits();
const S: u16 = OpFlags::SIMPLE.bits();
const IDX: u16 = OpFlags::IMM_INDEX.bits();
const AL: u16 = OpFlags::ALIGN.bits();
const B: u16 = OpFlags::BOOL_RESULT.bits();
const U32: u16 = OpFlags::COERCE_U32.bits();
const S64: u16 = OpFlags::COERCE_S64.bits();
const OM: u16 = OpFlags::OMIT.bits();
const M63: u16 = OpFlags::MASK63.bits();

const fn build_table() -> [OpMeta; 256] {
    let mut t = [OpMeta::SPECIAL; 256];

    t[0x01] = OpMeta::new(0, S | OM); // nop
    t[0x1A] = OpMeta::new(1, S | OM); // drop

    t[0x20] = OpMeta::new(0, S | P | IDX); // local.get
    t[0x21] = OpMeta::new(1, S | IDX); // local.set
    t[0x22] = OpMeta::new(1, S | P | IDX); // local.tee
    t[0x23] = OpMeta::new(0, S | P | IDX); // global.get
    t[0x24] = OpMeta::new(1, S | IDX); // global.set

    // loads 0x28..=0x35
    let mut b = 0x28;
    while b <= 0x35 {
        t[b] = OpMeta::new(1, S | P | AL | IDX);
        b += 1;
    }
    // stores 0x36..=0x3E
    let mut b = 0x36;
    while b <= 0x3E {
        t[b] = OpMeta::new(2, S | AL | IDX);
        b += 1;
    }

    t[0x45] = OpMeta::new(1, S | P | B); // i32.eqz
    // i32 comparisons 0x46..=0x4F; _u forms coerce through ToU32
    let mut b = 0x46;
    while b <= 0x4F {
        t[b] = OpMeta::new(2, S | P | B);
        b += 1;
    }
    t[0x49] = OpMeta::new(2, S | P | B | U32); // i32.lt_u
    t[0x4B] = OpMeta::new(2, S | P | B | U32); // i32.gt_u
    t[0x4D] = OpMeta::new(2, S | P | B | U32); // i32.le_u
    t[0x4F] = OpMeta::new(2, S | P | B | U32); // i32.ge_u

    t[0x50] = OpMeta::new(1, S | P | B); // i64.eqz
    // i64 comparisons 0x51..=0x5A; _s forms coerce through ToS64
    let mut b = 0x51;
    while b <= 0x5A {
        t[b] = OpMeta::new(2, S | P | B);
        b += 1;
    }
    t[0x53] = OpMeta::new(2, S | P | B | S64); // i64.lt_s
    t[0x55] = OpMeta::new(2, S | P | B | S64); // i64.gt_s
    t[0x57] = OpMeta::new(2, S | P | B | S64); // i64.le_s
    t[0x59] = OpMeta::new(2, S | P | B | S64); // i64.ge_s

    // float comparisons 0x5B..=0x66
    let mut b = 0x5B;
    while b <= 0x66 {
        t[b] = OpMeta::new(2, S | P | B);
        b += 1;
    }

    // i32 unary 0x67..=0x69, binary 0x6A..=0x78
    let mut b = 0x67;
    while b <= 0x69 {
        t[b] = OpMeta::new(1, S | P);
        b += 1;
    }
    let mut b = 0x6A;
    while b <= 0x78 {
        t[b] = OpMeta::new(2, S | P);
        b += 1;
    }
    t[0x6E] = OpMeta::new(2, S | P | U32); // i32.div_u
    t[0x70] = OpMeta::new(2, S | P | U32); // i32.rem_u

    // i64 unary 0x79..=0x7B, binary 0x7C..=0x8A
    let mut b = 0x79;
    while b <= 0x7B {
        t[b] = OpMeta::new(1, S | P);
        b += 1;
    }
    let mut b = 0x7C;
    while b <= 0x8A {
        t[b] = OpMeta::new(2, S | P);
        b += 1;
    }
    t[0x7F] = OpMeta::new(2, S | P | S64); // i64.div_s
    t[0x81] = OpMeta::new(2, S | P | S64); // i64.rem_s
    t[0x86] = OpMeta::new(2, S | P | M63); // i64.shl
    t[0x87] = OpMeta::new(2, S | P | S64 | M63); // i64.shr_s
    t[0x88] = OpMeta::new(2, S | P | M63); // i64.shr_u
    t[0x89] = OpMeta::new(2, S | P | M63); // i64.rotl
    t[0x8A] = OpMeta::new(2, S | P | M63); // i64.rotr

    // f32 unary 0x8B..=0x91, binary 0x92..=0x98
    let mut b = 0x8B;
    while b <= 0x91 {
        t[b] = OpMeta::new(1, S | P);
        b += 1;
    }
    let mut b = 0x92;
    while b <= 0x98 {
        t[b] = OpMeta::new(2, S | P);
        b += 1;
    }

    // f64 unary 0x99..=0x9F, binary 0xA0..=0xA6
    let mut b = 0x99;
    while b <= 0x9F {
        t[b] = OpMeta::new(1, S | P);
        b += 1;
    }
    let mut b = 0xA0;
    while b <= 0xA6 {
        t[b] = OpMeta::new(2, S | P);
        b += 1;
    }

    // conversions 0xA7..=0xC4
    let mut b = 0xA7;
    while b <= 0xC4 {
        t[b] = OpMeta::new(1, S | P);
        b += 1;
    }
    t[0xB3] = OpMeta::new(1, S | P | U32); // f32.convert_i32_u
    t[0xB4] = OpMeta::new(1, S | P | S64); // f32.convert_i64_s
    t[0xB8] = OpMeta::new(1, S | P | U32); // f64.convert_i32_u
    t[0xB9] = OpMeta::new(1, S | P | S64); // f64.convert_i64_s

    // saturating truncations (0xFC-folded range)
    let mut b = 0xCC;
    while b <= 0xD3 {
        t[b] = OpMeta::new(1, S | P);
        b += 1;
    }

    t
}

static META: [OpMeta; 256] = build_table();

/// Look up the decode metadata for an opcode byte.
pub fn lookup(op: u8) -> OpMeta {
    META[op as usize]
}
