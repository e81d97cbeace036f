#![no_std]

/// Byte-addressable physical memory shared by the producer and the
/// coprocessor.
///
/// Multi-byte accessors are big-endian, matching the byte order the
/// coprocessor fetches command words in. Implementations may panic on
/// accesses past [`PhysicalMemory::size`]; consumers check bounds first.
pub trait PhysicalMemory {
    /// Total addressable size in bytes.
    fn size(&self) -> u32;

    /// Read one byte.
    fn read_u8(&self, addr: u32) -> u8;

    /// Write one byte.
    fn write_u8(&mut self, addr: u32, value: u8);

    /// Read a big-endian halfword.
    fn read_u16(&self, addr: u32) -> u16 {
        u16::from_be_bytes([self.read_u8(addr), self.read_u8(addr + 1)])
    }

    /// Write a big-endian halfword.
    fn write_u16(&mut self, addr: u32, value: u16) {
        for (i, b) in value.to_be_bytes().into_iter().enumerate() {
            self.write_u8(addr + i as u32, b);
        }
    }

    /// Read a big-endian word.
    fn read_u32(&self, addr: u32) -> u32 {
        u32::from_be_bytes([
            self.read_u8(addr),
            self.read_u8(addr + 1),
            self.read_u8(addr + 2),
            self.read_u8(addr + 3),
        ])
    }

    /// Write a big-endian word.
    fn write_u32(&mut self, addr: u32, value: u32) {
        for (i, b) in value.to_be_bytes().into_iter().enumerate() {
            self.write_u8(addr + i as u32, b);
        }
    }

    /// Returns true if `[addr, addr + len)` lies inside the memory.
    fn contains(&self, addr: u32, len: u32) -> bool {
        addr.checked_add(len).is_some_and(|end| end <= self.size())
    }
}

/// One of the two staging areas the coprocessor copies dynamically
/// submitted rasterizer commands into before handing them off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingBuffer {
    /// Physical base address, 8-byte aligned.
    pub base: u32,
    /// Capacity in 32-bit words.
    pub words: u32,
}

impl StagingBuffer {
    /// One past the last usable byte.
    pub fn end(&self) -> u32 {
        self.base + self.words * 4
    }
}

/// Abstracts the command-processing coprocessor that drains the queue.
///
/// The producer owns the memory and lends it to the coprocessor for the
/// duration of each call, so an implementation may run the commands inline
/// (a digital twin) or forward them to real hardware.
pub trait Coprocessor<M: PhysicalMemory + ?Sized> {
    type Error: core::error::Error + Send + Sync + 'static;

    /// Reset the coprocessor and hand it the two dynamic staging buffers.
    fn reset(&mut self, mem: &mut M, staging: [StagingBuffer; 2]) -> Result<(), Self::Error>;

    /// Submit a run of queue words, in order.
    fn kick(&mut self, mem: &mut M, words: &[u32]) -> Result<(), Self::Error>;

    /// Block until every submitted command has completed.
    fn wait_idle(&mut self, mem: &mut M) -> Result<(), Self::Error>;
}
