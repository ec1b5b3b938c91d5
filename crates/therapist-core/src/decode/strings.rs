use encoding_rs::WINDOWS_1252;

use crate::config::decode::{MAX_STRING_LENGTH, SSO_CAPACITY};
use crate::error::{DecodeError, LayoutError};
use crate::layout::{Field, MemoryLayout};
use crate::memory::{Address, ByteBuffer, ReadMemory};

/// Offsets inside an MSVC `std::string`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringLayout {
    pub buffer: u64,
    pub length: u64,
    pub capacity: u64,
    pub pointer_size: u8,
}

impl StringLayout {
    pub fn from_layout(layout: &MemoryLayout) -> Result<Self, LayoutError> {
        Ok(Self {
            buffer: layout.offset(Field::StringBuffer)?,
            length: layout.offset(Field::StringLength)?,
            capacity: layout.offset(Field::StringCapacity)?,
            pointer_size: layout.pointer_size,
        })
    }

    /// Bytes covering the whole string object.
    fn object_size(&self) -> usize {
        let word = u64::from(self.pointer_size);
        let end = (self.buffer + SSO_CAPACITY)
            .max(self.length + word)
            .max(self.capacity + word);
        end as usize
    }
}

/// Decode Windows-1252 bytes, stopping at the first NUL.
pub fn decode_cp1252(bytes: &[u8]) -> String {
    let len = memchr::memchr(0, bytes).unwrap_or(bytes.len());
    let (decoded, _, _) = WINDOWS_1252.decode(&bytes[..len]);
    decoded.into_owned()
}

/// Read a `std::string` at `address`.
///
/// Strings shorter than 16 bytes are stored inline in the object; longer ones
/// live behind a heap pointer in the same slot.
pub fn read_msvc_string<R: ReadMemory + ?Sized>(
    reader: &R,
    address: Address,
    strings: &StringLayout,
) -> Result<String, DecodeError> {
    let object = reader.read_bytes(address, strings.object_size())?;
    let buf = ByteBuffer::new(&object);

    let word = |offset: u64| buf.ptr_at(offset as usize, strings.pointer_size);
    let (Some(length), Some(capacity)) = (word(strings.length), word(strings.capacity)) else {
        return Err(DecodeError::corrupt(address, "string object truncated"));
    };

    if length == 0 {
        return Ok(String::new());
    }
    if length > MAX_STRING_LENGTH || length > capacity {
        return Err(DecodeError::corrupt(
            address,
            format!("implausible string (length {}, capacity {})", length, capacity),
        ));
    }

    if capacity < SSO_CAPACITY {
        let bytes = buf
            .slice(strings.buffer as usize, length as usize)
            .ok_or_else(|| DecodeError::corrupt(address, "inline string overruns object"))?;
        return Ok(decode_cp1252(bytes));
    }

    let heap = word(strings.buffer).unwrap_or(0);
    if heap == 0 || !reader.is_mapped(heap) {
        return Err(DecodeError::corrupt(
            address,
            format!("string buffer 0x{:X} is not mapped", heap),
        ));
    }
    let bytes = reader.read_bytes(heap, length as usize)?;
    Ok(decode_cp1252(&bytes))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::memory::{Address, MockMemoryBuilder};

    /// Write an MSVC string object at `address` using the fixture offsets
    /// (buffer 0x04, length 0x14, capacity 0x18). Long strings are stored at
    /// `heap`.
    pub fn string(
        builder: MockMemoryBuilder,
        address: Address,
        text: &str,
        heap: Address,
    ) -> MockMemoryBuilder {
        let len = text.len() as u32;
        if text.len() < 16 {
            builder
                .bytes(address + 0x04, text.as_bytes())
                .u32(address + 0x14, len)
                .u32(address + 0x18, 15)
        } else {
            builder
                .bytes(heap, text.as_bytes())
                .u32(address + 0x04, heap as u32)
                .u32(address + 0x14, len)
                .u32(address + 0x18, len.max(16) | 0x0F)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::string;
    use super::*;
    use crate::error::MemoryError;
    use crate::layout::fixtures::test_layout;
    use crate::memory::MockMemoryBuilder;

    fn strings() -> StringLayout {
        StringLayout::from_layout(&test_layout()).unwrap()
    }

    #[test]
    fn test_inline_string() {
        let mock = string(MockMemoryBuilder::new(0x1000, 0x100), 0x1000, "Urist", 0).build();
        assert_eq!(read_msvc_string(&mock, 0x1000, &strings()).unwrap(), "Urist");
    }

    #[test]
    fn test_heap_string() {
        let text = "Legendary Hammerdwarf of the Mountainhome";
        let mock = string(MockMemoryBuilder::new(0x1000, 0x200), 0x1000, text, 0x1100).build();
        assert_eq!(read_msvc_string(&mock, 0x1000, &strings()).unwrap(), text);
    }

    #[test]
    fn test_empty_string() {
        let mock = MockMemoryBuilder::new(0x1000, 0x100).u32(0x1018, 15).build();
        assert_eq!(read_msvc_string(&mock, 0x1000, &strings()).unwrap(), "");
    }

    #[test]
    fn test_cp1252_decoding() {
        let mock = MockMemoryBuilder::new(0x1000, 0x100)
            .bytes(0x1004, &[b'L', 0xE9, b'a'])
            .u32(0x1014, 3)
            .u32(0x1018, 15)
            .build();
        assert_eq!(read_msvc_string(&mock, 0x1000, &strings()).unwrap(), "Léa");
    }

    #[test]
    fn test_unmapped_heap_buffer_is_corrupt() {
        let mock = MockMemoryBuilder::new(0x1000, 0x100)
            .u32(0x1004, 0xDEAD0000)
            .u32(0x1014, 20)
            .u32(0x1018, 31)
            .build();
        assert!(matches!(
            read_msvc_string(&mock, 0x1000, &strings()),
            Err(DecodeError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn test_length_beyond_capacity_is_corrupt() {
        let mock = MockMemoryBuilder::new(0x1000, 0x100)
            .u32(0x1014, 40)
            .u32(0x1018, 15)
            .build();
        assert!(read_msvc_string(&mock, 0x1000, &strings()).is_err());
    }

    #[test]
    fn test_revoked_reader() {
        let mock = MockMemoryBuilder::new(0x1000, 0x100).build();
        mock.invalidate();
        assert!(matches!(
            read_msvc_string(&mock, 0x1000, &strings()),
            Err(DecodeError::Memory(MemoryError::AccessRevoked))
        ));
    }

    #[test]
    fn test_decode_cp1252_stops_at_nul() {
        assert_eq!(decode_cp1252(b"abc\0def"), "abc");
    }
}
