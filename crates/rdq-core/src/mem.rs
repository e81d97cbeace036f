//! Simulated RDRAM with a first-fit allocator.
//!
//! Address 0 is never handed out so it can mean "none" in chunk links, and
//! the top 8 bytes stay reserved so that every range end still fits the
//! 24-bit address fields.

use std::collections::BTreeMap;

use rdq_hal::PhysicalMemory;

use crate::error::{QueueError, Result};

/// Bytes kept free at the bottom of RDRAM.
pub const RESERVED_LOW: u32 = 0x100;
/// Bytes kept free at the top of RDRAM.
pub const RESERVED_HIGH: u32 = 8;
/// Every allocation is rounded up to and aligned on this many bytes.
pub const MIN_ALIGN: u32 = 8;

/// Byte-addressed memory shared with the coprocessor.
pub struct Rdram {
    bytes: Vec<u8>,
    /// Free ranges, start -> length.
    free: BTreeMap<u32, u32>,
    /// Live allocations, start -> length.
    live: BTreeMap<u32, u32>,
}

impl Rdram {
    pub fn new(size: u32) -> Self {
        assert!(
            size > RESERVED_LOW + RESERVED_HIGH,
            "RDRAM of {size} bytes leaves no heap"
        );
        let mut free = BTreeMap::new();
        free.insert(RESERVED_LOW, size - RESERVED_LOW - RESERVED_HIGH);
        Self {
            bytes: vec![0; size as usize],
            free,
            live: BTreeMap::new(),
        }
    }

    /// Allocate `size` bytes aligned to `align` (a power of two).
    pub fn alloc(&mut self, size: u32, align: u32) -> Result<u32> {
        assert!(align.is_power_of_two(), "alignment {align} is not a power of two");
        let align = align.max(MIN_ALIGN);
        let size = size.max(1).next_multiple_of(MIN_ALIGN);

        let found = self.free.iter().find_map(|(&start, &len)| {
            let aligned = start.next_multiple_of(align);
            let end = start + len;
            (aligned.checked_add(size)? <= end).then_some((start, len, aligned))
        });
        let Some((start, len, aligned)) = found else {
            return Err(QueueError::OutOfMemory {
                requested: size,
                align,
            });
        };

        self.free.remove(&start);
        if aligned > start {
            self.free.insert(start, aligned - start);
        }
        let tail = aligned + size;
        if tail < start + len {
            self.free.insert(tail, start + len - tail);
        }
        self.live.insert(aligned, size);
        Ok(aligned)
    }

    /// Release an allocation made by [`Rdram::alloc`].
    pub fn free(&mut self, addr: u32) {
        let Some(len) = self.live.remove(&addr) else {
            panic!("free of unallocated RDRAM address 0x{addr:06X}");
        };
        let mut start = addr;
        let mut len = len;

        if let Some((&prev, &prev_len)) = self.free.range(..start).next_back() {
            if prev + prev_len == start {
                self.free.remove(&prev);
                start = prev;
                len += prev_len;
            }
        }
        if let Some(next_len) = self.free.remove(&(start + len)) {
            len += next_len;
        }
        self.free.insert(start, len);
    }

    /// Bytes currently allocated.
    pub fn allocated_bytes(&self) -> u32 {
        self.live.values().sum()
    }

    /// Number of live allocations.
    pub fn allocations(&self) -> usize {
        self.live.len()
    }

    pub fn bytes(&self, addr: u32, len: u32) -> &[u8] {
        &self.bytes[addr as usize..(addr + len) as usize]
    }

    pub fn bytes_mut(&mut self, addr: u32, len: u32) -> &mut [u8] {
        &mut self.bytes[addr as usize..(addr + len) as usize]
    }

    pub fn fill(&mut self, addr: u32, len: u32, value: u8) {
        self.bytes_mut(addr, len).fill(value);
    }

    pub fn write_bytes(&mut self, addr: u32, data: &[u8]) {
        self.bytes_mut(addr, data.len() as u32).copy_from_slice(data);
    }
}

impl PhysicalMemory for Rdram {
    fn size(&self) -> u32 {
        self.bytes.len() as u32
    }

    fn read_u8(&self, addr: u32) -> u8 {
        self.bytes[addr as usize]
    }

    fn write_u8(&mut self, addr: u32, value: u8) {
        self.bytes[addr as usize] = value;
    }

    fn read_u32(&self, addr: u32) -> u32 {
        let a = addr as usize;
        u32::from_be_bytes([self.bytes[a], self.bytes[a + 1], self.bytes[a + 2], self.bytes[a + 3]])
    }

    fn write_u32(&mut self, addr: u32, value: u32) {
        let a = addr as usize;
        self.bytes[a..a + 4].copy_from_slice(&value.to_be_bytes());
    }
}

impl std::fmt::Debug for Rdram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rdram")
            .field("size", &self.bytes.len())
            .field("allocated", &self.allocated_bytes())
            .field("allocations", &self.live.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_hands_out_null() {
        let mut mem = Rdram::new(4096);
        let a = mem.alloc(8, 8).unwrap();
        assert!(a >= RESERVED_LOW);
    }

    #[test]
    fn honours_alignment() {
        let mut mem = Rdram::new(1 << 16);
        let _ = mem.alloc(24, 8).unwrap();
        let b = mem.alloc(64, 64).unwrap();
        assert_eq!(b % 64, 0);
    }

    #[test]
    fn free_coalesces_and_reuses() {
        let mut mem = Rdram::new(1 << 16);
        let a = mem.alloc(256, 8).unwrap();
        let b = mem.alloc(256, 8).unwrap();
        let c = mem.alloc(256, 8).unwrap();
        mem.free(b);
        mem.free(a);
        mem.free(c);
        assert_eq!(mem.allocated_bytes(), 0);
        assert_eq!(mem.free.len(), 1);
        let d = mem.alloc(768, 8).unwrap();
        assert_eq!(d, a);
    }

    #[test]
    fn reports_exhaustion() {
        let mut mem = Rdram::new(1024);
        let err = mem.alloc(4096, 8).unwrap_err();
        assert!(matches!(err, QueueError::OutOfMemory { requested: 4096, .. }));
    }

    #[test]
    #[should_panic(expected = "free of unallocated")]
    fn double_free_panics() {
        let mut mem = Rdram::new(4096);
        let a = mem.alloc(8, 8).unwrap();
        mem.free(a);
        mem.free(a);
    }

    #[test]
    fn words_are_big_endian() {
        let mut mem = Rdram::new(4096);
        mem.write_u32(0x200, 0x1122_3344);
        assert_eq!(mem.bytes(0x200, 4), &[0x11, 0x22, 0x33, 0x44]);
        assert_eq!(mem.read_u16(0x202), 0x3344);
    }
}
