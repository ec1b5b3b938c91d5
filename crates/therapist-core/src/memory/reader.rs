use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use super::{Address, ByteBuffer};
use crate::error::{MemoryError, MemoryResult};

/// Primitive width of a field in foreign memory (always little-endian).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Width {
    U8,
    I16,
    U16,
    I32,
    U32,
    U64,
}

impl Width {
    pub fn size(self) -> usize {
        match self {
            Width::U8 => 1,
            Width::I16 | Width::U16 => 2,
            Width::I32 | Width::U32 => 4,
            Width::U64 => 8,
        }
    }

    /// Width of a pointer for a process with the given pointer size.
    pub fn pointer(pointer_size: u8) -> Self {
        if pointer_size == 8 { Width::U64 } else { Width::U32 }
    }

    /// Decode a value of this width from the start of `bytes`.
    pub fn decode(self, bytes: &[u8]) -> Option<i64> {
        let buf = ByteBuffer::new(bytes);
        match self {
            Width::U8 => buf.u8_at(0).map(i64::from),
            Width::I16 => buf.i16_at(0).map(i64::from),
            Width::U16 => buf.u16_at(0).map(i64::from),
            Width::I32 => buf.i32_at(0).map(i64::from),
            Width::U32 => buf.u32_at(0).map(i64::from),
            Width::U64 => buf.u64_at(0).map(|v| v as i64),
        }
    }

    /// Encode `value` into this width, or `None` if it does not fit.
    pub fn encode(self, value: i64) -> Option<Vec<u8>> {
        let bytes = match self {
            Width::U8 => u8::try_from(value).ok()?.to_le_bytes().to_vec(),
            Width::I16 => i16::try_from(value).ok()?.to_le_bytes().to_vec(),
            Width::U16 => u16::try_from(value).ok()?.to_le_bytes().to_vec(),
            Width::I32 => i32::try_from(value).ok()?.to_le_bytes().to_vec(),
            Width::U32 => u32::try_from(value).ok()?.to_le_bytes().to_vec(),
            Width::U64 => u64::try_from(value).ok()?.to_le_bytes().to_vec(),
        };
        Some(bytes)
    }
}

/// Read access to a foreign address space.
pub trait ReadMemory {
    fn read_bytes(&self, address: Address, size: usize) -> MemoryResult<Vec<u8>>;

    /// Base address of the main module.
    fn base_address(&self) -> Address;

    /// `false` once the foreign process has exited or access was revoked.
    fn is_valid(&self) -> bool {
        true
    }

    /// Whether `address` lies in committed, readable memory.
    fn is_mapped(&self, address: Address) -> bool {
        address != 0 && self.read_bytes(address, 1).is_ok()
    }

    fn read_width(&self, address: Address, width: Width) -> MemoryResult<i64> {
        let bytes = self.read_bytes(address, width.size())?;
        width.decode(&bytes).ok_or(MemoryError::AddressOutOfRange {
            address,
            size: width.size(),
        })
    }

    fn read_u8(&self, address: Address) -> MemoryResult<u8> {
        Ok(self.read_width(address, Width::U8)? as u8)
    }

    fn read_i16(&self, address: Address) -> MemoryResult<i16> {
        Ok(self.read_width(address, Width::I16)? as i16)
    }

    fn read_i32(&self, address: Address) -> MemoryResult<i32> {
        Ok(self.read_width(address, Width::I32)? as i32)
    }

    fn read_u32(&self, address: Address) -> MemoryResult<u32> {
        Ok(self.read_width(address, Width::U32)? as u32)
    }

    fn read_u64(&self, address: Address) -> MemoryResult<u64> {
        Ok(self.read_width(address, Width::U64)? as u64)
    }

    /// Read a pointer of the given size (4 or 8 bytes).
    fn read_ptr(&self, address: Address, pointer_size: u8) -> MemoryResult<Address> {
        let value = self.read_width(address, Width::pointer(pointer_size))?;
        Ok(value as u64)
    }
}

/// Write access to a foreign address space.
pub trait WriteMemory: ReadMemory {
    fn write_bytes(&self, address: Address, bytes: &[u8]) -> MemoryResult<()>;

    fn write_width(&self, address: Address, width: Width, value: i64) -> MemoryResult<()> {
        let bytes = width.encode(value).ok_or(MemoryError::WriteFailed {
            address,
            message: format!("value {} does not fit {}", value, width),
        })?;
        self.write_bytes(address, &bytes)
    }
}

impl<T: ReadMemory + ?Sized> ReadMemory for std::sync::Arc<T> {
    fn read_bytes(&self, address: Address, size: usize) -> MemoryResult<Vec<u8>> {
        (**self).read_bytes(address, size)
    }

    fn base_address(&self) -> Address {
        (**self).base_address()
    }

    fn is_valid(&self) -> bool {
        (**self).is_valid()
    }

    fn is_mapped(&self, address: Address) -> bool {
        (**self).is_mapped(address)
    }
}

impl<T: WriteMemory + ?Sized> WriteMemory for std::sync::Arc<T> {
    fn write_bytes(&self, address: Address, bytes: &[u8]) -> MemoryResult<()> {
        (**self).write_bytes(address, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_encode_rejects_overflow() {
        assert_eq!(Width::U8.encode(255), Some(vec![0xFF]));
        assert_eq!(Width::U8.encode(256), None);
        assert_eq!(Width::I16.encode(-1), Some(vec![0xFF, 0xFF]));
        assert_eq!(Width::U16.encode(-1), None);
    }

    #[test]
    fn test_width_decode_sign() {
        assert_eq!(Width::I16.decode(&[0xFF, 0xFF]), Some(-1));
        assert_eq!(Width::U16.decode(&[0xFF, 0xFF]), Some(0xFFFF));
        assert_eq!(Width::U32.decode(&[0x01, 0x02]), None);
    }

    #[test]
    fn test_width_from_str() {
        assert_eq!("i16".parse::<Width>().unwrap(), Width::I16);
        assert_eq!(Width::pointer(4), Width::U32);
        assert_eq!(Width::pointer(8), Width::U64);
    }
}
