//! In-memory stand-in for a foreign process, for tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{Address, ReadMemory, WriteMemory};
use crate::error::{MemoryError, MemoryResult};

/// A flat block of fake foreign memory starting at `base`.
///
/// Every `write_bytes` call is recorded (including failed ones) so tests can
/// assert exactly which writes were attempted.
pub struct MockMemory {
    base: Address,
    data: Mutex<Vec<u8>>,
    writes: Mutex<Vec<(Address, Vec<u8>)>>,
    failing_writes: HashSet<Address>,
    valid: AtomicBool,
    invalidate_after: Option<usize>,
    successful_writes: AtomicUsize,
}

impl MockMemory {
    pub fn writes(&self) -> Vec<(Address, Vec<u8>)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    /// Simulate the foreign process exiting.
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    pub fn byte_at(&self, address: Address) -> u8 {
        let data = self.data.lock().unwrap();
        data[(address - self.base) as usize]
    }

    fn range(&self, address: Address, size: usize, len: usize) -> MemoryResult<std::ops::Range<usize>> {
        let out_of_range = MemoryError::AddressOutOfRange { address, size };
        if address < self.base {
            return Err(out_of_range);
        }
        let start = (address - self.base) as usize;
        let end = start.checked_add(size).ok_or(out_of_range.clone())?;
        if end > len {
            return Err(out_of_range);
        }
        Ok(start..end)
    }
}

impl ReadMemory for MockMemory {
    fn read_bytes(&self, address: Address, size: usize) -> MemoryResult<Vec<u8>> {
        if !self.is_valid() {
            return Err(MemoryError::AccessRevoked);
        }
        let data = self.data.lock().unwrap();
        let range = self.range(address, size, data.len())?;
        Ok(data[range].to_vec())
    }

    fn base_address(&self) -> Address {
        self.base
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn is_mapped(&self, address: Address) -> bool {
        let len = self.data.lock().unwrap().len() as u64;
        address >= self.base && address < self.base + len
    }
}

impl WriteMemory for MockMemory {
    fn write_bytes(&self, address: Address, bytes: &[u8]) -> MemoryResult<()> {
        if !self.is_valid() {
            return Err(MemoryError::AccessRevoked);
        }
        self.writes.lock().unwrap().push((address, bytes.to_vec()));

        if self.failing_writes.contains(&address) {
            return Err(MemoryError::WriteFailed {
                address,
                message: "injected failure".to_string(),
            });
        }

        let mut data = self.data.lock().unwrap();
        let len = data.len();
        let range = self.range(address, bytes.len(), len)?;
        data[range].copy_from_slice(bytes);

        let done = self.successful_writes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.invalidate_after == Some(done) {
            self.invalidate();
        }
        Ok(())
    }
}

pub struct MockMemoryBuilder {
    base: Address,
    data: Vec<u8>,
    failing_writes: HashSet<Address>,
    invalidate_after: Option<usize>,
}

impl MockMemoryBuilder {
    pub fn new(base: Address, size: usize) -> Self {
        Self {
            base,
            data: vec![0; size],
            failing_writes: HashSet::new(),
            invalidate_after: None,
        }
    }

    pub fn bytes(mut self, address: Address, bytes: &[u8]) -> Self {
        let start = (address - self.base) as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        self
    }

    pub fn u8(self, address: Address, value: u8) -> Self {
        self.bytes(address, &[value])
    }

    pub fn i16(self, address: Address, value: i16) -> Self {
        self.bytes(address, &value.to_le_bytes())
    }

    pub fn i32(self, address: Address, value: i32) -> Self {
        self.bytes(address, &value.to_le_bytes())
    }

    pub fn u32(self, address: Address, value: u32) -> Self {
        self.bytes(address, &value.to_le_bytes())
    }

    pub fn u64(self, address: Address, value: u64) -> Self {
        self.bytes(address, &value.to_le_bytes())
    }

    /// Vector header (start, end, capacity) with 4-byte pointers.
    pub fn vector32(self, address: Address, start: u32, end: u32, capacity: u32) -> Self {
        self.u32(address, start)
            .u32(address + 4, end)
            .u32(address + 8, capacity)
    }

    pub fn fail_write_at(mut self, address: Address) -> Self {
        self.failing_writes.insert(address);
        self
    }

    /// Invalidate the mock after `count` successful writes.
    pub fn invalidate_after_writes(mut self, count: usize) -> Self {
        self.invalidate_after = Some(count);
        self
    }

    pub fn build(self) -> MockMemory {
        MockMemory {
            base: self.base,
            data: Mutex::new(self.data),
            writes: Mutex::new(Vec::new()),
            failing_writes: self.failing_writes,
            valid: AtomicBool::new(true),
            invalidate_after: self.invalidate_after,
            successful_writes: AtomicUsize::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_read_bytes() {
        let mock = MockMemoryBuilder::new(0x1000, 16)
            .bytes(0x1000, &[0x41, 0x42, 0x43, 0x44])
            .build();

        assert_eq!(mock.read_bytes(0x1000, 4).unwrap(), vec![0x41, 0x42, 0x43, 0x44]);
        assert_eq!(mock.read_bytes(0x1001, 2).unwrap(), vec![0x42, 0x43]);
    }

    #[test]
    fn test_mock_read_out_of_bounds() {
        let mock = MockMemoryBuilder::new(0x1000, 4).build();

        assert!(matches!(
            mock.read_bytes(0x1002, 10),
            Err(MemoryError::AddressOutOfRange { .. })
        ));
        assert!(matches!(
            mock.read_bytes(0x500, 4),
            Err(MemoryError::AddressOutOfRange { .. })
        ));
    }

    #[test]
    fn test_mock_records_writes() {
        let mock = MockMemoryBuilder::new(0x1000, 16).fail_write_at(0x1004).build();

        mock.write_bytes(0x1000, &[1]).unwrap();
        assert!(mock.write_bytes(0x1004, &[1]).is_err());

        assert_eq!(mock.write_count(), 2);
        assert_eq!(mock.byte_at(0x1000), 1);
        assert_eq!(mock.byte_at(0x1004), 0);
    }

    #[test]
    fn test_mock_invalidate() {
        let mock = MockMemoryBuilder::new(0x1000, 16).build();
        mock.invalidate();

        assert!(!mock.is_valid());
        assert_eq!(mock.read_bytes(0x1000, 1), Err(MemoryError::AccessRevoked));
        assert_eq!(mock.write_bytes(0x1000, &[1]), Err(MemoryError::AccessRevoked));
        assert_eq!(mock.write_count(), 0);
    }

    #[test]
    fn test_mock_invalidate_after_writes() {
        let mock = MockMemoryBuilder::new(0x1000, 16)
            .invalidate_after_writes(1)
            .build();

        mock.write_bytes(0x1000, &[1]).unwrap();
        assert!(!mock.is_valid());
    }
}
