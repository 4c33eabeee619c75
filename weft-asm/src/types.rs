/// The byte could not be mapped to a known [`ValType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid value type byte 0x{0:02x}")]
pub struct InvalidValType(pub u8);

/// A WebAssembly number type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
pub enum ValType {
    /// 32-bit integer.
    I32 = 0x7F,
    /// 64-bit integer.
    I64 = 0x7E,
    /// 32-bit float.
    F32 = 0x7D,
    /// 64-bit float.
    F64 = 0x7C,
}

impl TryFrom<u8> for ValType {
    type Error = InvalidValType;

    fn try_from(b: u8) -> Result<Self, Self::Error> {
        match b {
            0x7F => Ok(Self::I32),
            0x7E => Ok(Self::I64),
            0x7D => Ok(Self::F32),
            0x7C => Ok(Self::F64),
            _ => Err(InvalidValType(b)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn byte_round_trip() {
        for ty in ValType::iter() {
            assert_eq!(ValType::try_from(ty as u8).unwrap(), ty);
        }
        assert!(ValType::try_from(0x70).is_err());
    }
}
