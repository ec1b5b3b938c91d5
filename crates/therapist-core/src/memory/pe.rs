//! Build identification from the main module's PE header.

use tracing::debug;

use super::ReadMemory;
use crate::error::{MemoryError, MemoryResult};

/// Offset of `e_lfanew` in the DOS header
const E_LFANEW: u64 = 0x3C;
/// Offset of `TimeDateStamp` from the start of the NT headers
const TIME_DATE_STAMP: u64 = 8;
const MZ: [u8; 2] = *b"MZ";
const PE: [u8; 4] = *b"PE\0\0";

/// Read the link timestamp of the main module, formatted as `0x%08x`.
///
/// Every shipped build of the game has a distinct timestamp, so this string
/// is what memory layout profiles are keyed by.
pub fn detect_build_id<R: ReadMemory + ?Sized>(reader: &R) -> MemoryResult<String> {
    let base = reader.base_address();

    let magic = reader.read_bytes(base, 2)?;
    if magic != MZ {
        return Err(MemoryError::ReadFailed {
            address: base,
            message: "main module has no MZ header".to_string(),
        });
    }

    let nt_headers = base + u64::from(reader.read_u32(base + E_LFANEW)?);
    let signature = reader.read_bytes(nt_headers, 4)?;
    if signature != PE {
        return Err(MemoryError::ReadFailed {
            address: nt_headers,
            message: "main module has no PE signature".to_string(),
        });
    }

    let stamp = reader.read_u32(nt_headers + TIME_DATE_STAMP)?;
    let build_id = format!("0x{:08x}", stamp);
    debug!("Detected build {} (NT headers at 0x{:X})", build_id, nt_headers);
    Ok(build_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MockMemoryBuilder;

    #[test]
    fn test_detect_build_id() {
        let mock = MockMemoryBuilder::new(0x400000, 0x1000)
            .bytes(0x400000, b"MZ")
            .u32(0x40003C, 0x80)
            .bytes(0x400080, b"PE\0\0")
            .u32(0x400088, 0x4A9C9BC5)
            .build();

        assert_eq!(detect_build_id(&mock).unwrap(), "0x4a9c9bc5");
    }

    #[test]
    fn test_detect_build_id_rejects_missing_header() {
        let mock = MockMemoryBuilder::new(0x400000, 0x1000).build();
        assert!(detect_build_id(&mock).is_err());
    }
}
