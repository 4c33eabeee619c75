//! Atomic ISA types for the Weft WebAssembly compiler.
//!
//! This crate carries no compilation logic. It defines the opcode space the
//! compiler operates on (including the internal pseudo-ops the decoder
//! inserts), the per-opcode metadata table that drives the table-based
//! decode path, the value types, and the LEB128 immediate readers.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

mod leb128;
mod meta;
mod opcode;
mod types;

pub use leb128::{read_f32, read_f64, ByteReader, ReadError};
pub use meta::{lookup, OpFlags, OpMeta};
pub use opcode::{InvalidOpcode, Opcode, PREFIX_FC};
pub use types::{InvalidValType, ValType};
