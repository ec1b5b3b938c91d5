//! Heuristic location of heap-allocated vectors.
//!
//! The game keeps its creatures and language tables in `std::vector`s whose
//! headers (start, end, capacity) live at addresses that move between runs.
//! The scanner walks a module-relative range looking for headers with a
//! plausible shape and ranks what it finds.

mod types;

use std::mem;

use tracing::{debug, info};

use crate::cancel::CancelSignal;
use crate::config::scan::{CHUNK_SIZE, HEADER_ALIGNMENT, SAMPLE_COUNT};
use crate::error::{MemoryError, ScanError};
use crate::layout::{MemoryLayout, VectorShape};
use crate::memory::{Address, ByteBuffer, ReadMemory};

pub use types::*;

pub struct VectorScanner<'a, R: ReadMemory + ?Sized> {
    reader: &'a R,
    layout: &'a MemoryLayout,
}

impl<'a, R: ReadMemory + ?Sized> VectorScanner<'a, R> {
    pub fn new(reader: &'a R, layout: &'a MemoryLayout) -> Self {
        Self { reader, layout }
    }

    /// Address of the header for `target`: the profile's static address if
    /// it has one, otherwise the best candidate in the profile's scan range.
    pub fn locate(
        &self,
        target: ScanTarget,
        progress: &dyn ProgressSink,
        cancel: &CancelSignal,
    ) -> Result<Address, ScanError> {
        let base = self.reader.base_address();
        if let Some(address) = self.layout.static_address(target, base) {
            debug!("{} fixed by layout at 0x{:X}", target, address);
            return Ok(address);
        }

        let start = base + self.layout.scan.start;
        let end = base + self.layout.scan.end;
        self.scan(target, start, end, progress, cancel)
            .map(|candidate| candidate.address)
    }

    /// Scan `start..end` and return the most plausible header for `target`.
    pub fn scan(
        &self,
        target: ScanTarget,
        start: Address,
        end: Address,
        progress: &dyn ProgressSink,
        cancel: &CancelSignal,
    ) -> Result<ScanCandidate, ScanError> {
        let shape = self.layout.scan.shape(target);
        let candidates = self.candidates(target, start, end, progress, cancel)?;
        debug!(
            "{} candidate header(s) for {} in 0x{:X}..0x{:X}",
            candidates.len(),
            target,
            start,
            end
        );

        let chosen = select_candidate(&candidates, &shape)
            .cloned()
            .ok_or(ScanError::NoCandidateFound { target, start, end })?;
        info!(
            "Found {} at 0x{:X} ({} elements, {}/{} samples valid)",
            target, chosen.address, chosen.count, chosen.valid_samples, chosen.sampled
        );
        Ok(chosen)
    }

    /// Every header in `start..end` that passes the shape predicate.
    ///
    /// Reads the range chunk by chunk, reporting one progress step per chunk
    /// and checking `cancel` before each. Unreadable chunks are skipped.
    pub fn candidates(
        &self,
        target: ScanTarget,
        start: Address,
        end: Address,
        progress: &dyn ProgressSink,
        cancel: &CancelSignal,
    ) -> Result<Vec<ScanCandidate>, ScanError> {
        if !self.reader.is_valid() {
            return Err(MemoryError::AccessRevoked.into());
        }

        let shape = self.layout.scan.shape(target);
        let header_size = 3 * usize::from(self.layout.pointer_size);
        let length = end.saturating_sub(start) as usize;
        let total = length.div_ceil(CHUNK_SIZE);

        let mut found = Vec::new();
        let mut tail: Vec<u8> = Vec::new();

        for step in 0..total {
            if cancel.is_cancelled() {
                debug!("Scan for {} cancelled at step {}/{}", target, step, total);
                return Err(ScanError::Cancelled);
            }

            let address = start + (step * CHUNK_SIZE) as u64;
            let read_size = CHUNK_SIZE.min((end - address) as usize);

            match self.reader.read_bytes(address, read_size) {
                Ok(chunk) => {
                    let mut data = mem::take(&mut tail);
                    let carried = data.len();
                    data.extend_from_slice(&chunk);
                    let data_base = address - carried as u64;

                    found.extend(self.headers_in(&data, data_base, &shape));

                    let keep = (header_size - 1).min(data.len());
                    tail = data[data.len() - keep..].to_vec();
                }
                Err(MemoryError::AccessRevoked) => {
                    return Err(MemoryError::AccessRevoked.into());
                }
                Err(e) => {
                    debug!("Skipping unreadable chunk at 0x{:X}: {}", address, e);
                    tail.clear();
                }
            }

            progress.report(ScanProgress {
                target,
                step: step + 1,
                total,
            });
        }

        Ok(found)
    }

    fn headers_in(&self, data: &[u8], data_base: Address, shape: &VectorShape) -> Vec<ScanCandidate> {
        let pointer_size = self.layout.pointer_size;
        let ptr = usize::from(pointer_size);
        let header_size = 3 * ptr;
        let buf = ByteBuffer::new(data);

        let misalignment = (data_base % HEADER_ALIGNMENT as u64) as usize;
        let first = (HEADER_ALIGNMENT - misalignment) % HEADER_ALIGNMENT;

        let mut found = Vec::new();
        let mut offset = first;
        while offset + header_size <= data.len() {
            let header = (
                buf.ptr_at(offset, pointer_size),
                buf.ptr_at(offset + ptr, pointer_size),
                buf.ptr_at(offset + 2 * ptr, pointer_size),
            );
            if let (Some(start), Some(end), Some(capacity)) = header {
                found.extend(self.probe(data_base + offset as u64, start, end, capacity, shape));
            }
            offset += HEADER_ALIGNMENT;
        }
        found
    }

    /// Apply the header predicate and sample the first elements.
    fn probe(
        &self,
        address: Address,
        start: Address,
        end: Address,
        capacity: Address,
        shape: &VectorShape,
    ) -> Option<ScanCandidate> {
        if start == 0 || start > end || end > capacity {
            return None;
        }

        let element_size = self.element_size(shape);
        let span = end - start;
        if span % element_size != 0 {
            return None;
        }
        let count = span / element_size;
        if count < shape.min_count || count > shape.max_count {
            return None;
        }
        if !self.reader.is_mapped(start) {
            return None;
        }

        let sampled = (count as usize).min(SAMPLE_COUNT);
        let valid_samples = (0..sampled)
            .filter(|&i| self.sample_is_valid(start + i as u64 * element_size, shape))
            .count();

        Some(ScanCandidate {
            address,
            start,
            end,
            capacity,
            count,
            sampled,
            valid_samples,
        })
    }

    fn element_size(&self, shape: &VectorShape) -> u64 {
        if shape.element_size == 0 {
            u64::from(self.layout.pointer_size)
        } else {
            shape.element_size
        }
    }

    fn sample_is_valid(&self, element: Address, shape: &VectorShape) -> bool {
        if shape.element_size != 0 {
            return self.reader.is_mapped(element);
        }
        match self.reader.read_ptr(element, self.layout.pointer_size) {
            Ok(pointer) => pointer != 0 && self.reader.is_mapped(pointer),
            Err(_) => false,
        }
    }
}

/// Pick the most plausible header.
///
/// The first candidate that reaches the expected count with every sample
/// valid wins outright. Otherwise the best ranked candidate with at least one
/// valid sample is used.
pub fn select_candidate<'c>(
    candidates: &'c [ScanCandidate],
    shape: &VectorShape,
) -> Option<&'c ScanCandidate> {
    let threshold = shape.expected_count.max(shape.min_count);
    if let Some(candidate) = candidates
        .iter()
        .find(|c| c.count >= threshold && c.all_samples_valid())
    {
        return Some(candidate);
    }

    candidates
        .iter()
        .filter(|c| c.valid_samples > 0)
        .fold(None, |best: Option<&ScanCandidate>, c| match best {
            Some(b) if !c.is_better_than(b) => Some(b),
            _ => Some(c),
        })
}
