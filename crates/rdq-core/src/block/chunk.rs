//! Linked chunk chains backing a block.
//!
//! Chunk layout in RDRAM: `{next: u32, padding: u32, words[..]}`. A zero
//! `next` ends the chain. Chunks are never moved or resized once written,
//! so addresses already handed to the coprocessor stay valid while the
//! chain grows.

use rdq_hal::PhysicalMemory;

use crate::error::Result;
use crate::mem::Rdram;

/// Bytes in front of the command words of every chunk.
pub const CHUNK_HEADER_BYTES: u32 = 8;
pub const CHUNK_ALIGN: u32 = 8;

/// Location and capacity of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    pub base: u32,
    pub words: u32,
}

impl ChunkInfo {
    /// First command word.
    pub fn start(&self) -> u32 {
        self.base + CHUNK_HEADER_BYTES
    }

    /// One past the last command word.
    pub fn end(&self) -> u32 {
        self.start() + self.words * 4
    }

    pub fn contains(&self, start: u32, end: u32) -> bool {
        start >= self.start() && end <= self.end() && start <= end
    }
}

/// A growable chain of chunks with a write cursor in the last one.
#[derive(Debug)]
pub(crate) struct ChunkChain {
    chunks: Vec<ChunkInfo>,
    cursor: u32,
    sentinel: u32,
    /// Words kept free past the sentinel.
    margin: u32,
}

impl ChunkChain {
    /// Allocate the first chunk of a chain.
    pub fn begin(mem: &mut Rdram, words: u32, margin: u32) -> Result<Self> {
        assert!(words > margin, "chunk of {words} words cannot hold a {margin}-word margin");
        let first = alloc_chunk(mem, words)?;
        let mut chain = Self {
            chunks: Vec::new(),
            cursor: 0,
            sentinel: 0,
            margin,
        };
        chain.switch_to(first);
        Ok(chain)
    }

    pub fn head(&self) -> u32 {
        self.chunks[0].base
    }

    pub fn tail(&self) -> ChunkInfo {
        self.chunks[self.chunks.len() - 1]
    }

    pub fn chunks(&self) -> &[ChunkInfo] {
        &self.chunks
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Write `words` at the cursor and return the written range.
    pub fn push(&mut self, mem: &mut Rdram, words: &[u32]) -> (u32, u32) {
        assert!(
            self.cursor <= self.sentinel,
            "chunk overflow: cursor 0x{:06X} past sentinel 0x{:06X}",
            self.cursor,
            self.sentinel
        );
        assert!(words.len() as u32 <= self.margin);
        let start = self.cursor;
        for (i, &w) in words.iter().enumerate() {
            mem.write_u32(start + i as u32 * 4, w);
        }
        self.cursor = start + words.len() as u32 * 4;
        (start, self.cursor)
    }

    /// True once the next command might not fit.
    pub fn past_sentinel(&self) -> bool {
        self.cursor > self.sentinel
    }

    /// Link a new chunk of double the tail capacity, capped at `max_words`,
    /// and move the cursor into it. Returns the new chunk.
    pub fn grow(&mut self, mem: &mut Rdram, max_words: u32) -> Result<ChunkInfo> {
        let tail = self.tail();
        let words = (tail.words * 2).min(max_words).max(tail.words);
        let next = alloc_chunk(mem, words)?;
        mem.write_u32(tail.base, next.base);
        self.switch_to(next);
        log::debug!(
            "block chunk grown: 0x{:06X} -> 0x{:06X} ({} words)",
            tail.base,
            next.base,
            words
        );
        Ok(next)
    }

    fn switch_to(&mut self, chunk: ChunkInfo) {
        self.chunks.push(chunk);
        self.cursor = chunk.start();
        self.sentinel = chunk.end() - self.margin * 4;
    }
}

fn alloc_chunk(mem: &mut Rdram, words: u32) -> Result<ChunkInfo> {
    let base = mem.alloc(CHUNK_HEADER_BYTES + words * 4, CHUNK_ALIGN)?;
    mem.write_u32(base, 0);
    mem.write_u32(base + 4, 0);
    Ok(ChunkInfo { base, words })
}

/// Release every chunk of the chain starting at `head`, following the
/// `next` links. Returns the number of chunks freed.
pub(crate) fn free_chain(mem: &mut Rdram, head: u32) -> usize {
    let mut freed = 0;
    let mut chunk = head;
    while chunk != 0 {
        let next = mem.read_u32(chunk);
        mem.free(chunk);
        freed += 1;
        chunk = next;
    }
    freed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem() -> Rdram {
        Rdram::new(1 << 20)
    }

    #[test]
    fn sentinel_leaves_margin() {
        let mut mem = mem();
        let chain = ChunkChain::begin(&mut mem, 64, 44).unwrap();
        let tail = chain.tail();
        assert_eq!(chain.sentinel, tail.end() - 44 * 4);
        assert_eq!(chain.cursor(), tail.start());
    }

    #[test]
    fn growth_doubles_then_caps() {
        let mut mem = mem();
        let mut chain = ChunkChain::begin(&mut mem, 64, 44).unwrap();
        let sizes: Vec<u32> = (0..4).map(|_| chain.grow(&mut mem, 300).unwrap().words).collect();
        assert_eq!(sizes, vec![128, 256, 300, 300]);
    }

    #[test]
    fn growth_links_chunks() {
        let mut mem = mem();
        let mut chain = ChunkChain::begin(&mut mem, 64, 44).unwrap();
        let first = chain.tail();
        let second = chain.grow(&mut mem, 4192).unwrap();
        assert_eq!(mem.read_u32(first.base), second.base);
        assert_eq!(mem.read_u32(second.base), 0);
    }

    #[test]
    fn push_reports_range() {
        let mut mem = mem();
        let mut chain = ChunkChain::begin(&mut mem, 64, 44).unwrap();
        let start = chain.cursor();
        let (s, e) = chain.push(&mut mem, &[1, 2, 3, 4]);
        assert_eq!((s, e), (start, start + 16));
        assert_eq!(mem.read_u32(start + 12), 4);
    }

    #[test]
    fn free_walks_every_link() {
        let mut mem = mem();
        let mut chain = ChunkChain::begin(&mut mem, 64, 44).unwrap();
        chain.grow(&mut mem, 4192).unwrap();
        chain.grow(&mut mem, 4192).unwrap();
        assert_eq!(free_chain(&mut mem, chain.head()), 3);
        assert_eq!(mem.allocated_bytes(), 0);
    }
}
