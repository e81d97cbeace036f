//! Block recording.
//!
//! A block owns two chunk chains:
//! - the rasterizer chain, holding native commands exactly as the rasterizer
//!   will fetch them;
//! - the stream chain, holding the queue-level commands the coprocessor
//!   walks when the block is called: hand-off descriptors into the
//!   rasterizer chain, interpreted commands, nested calls, and a final
//!   `RETURN`.
//!
//! Consecutive native commands share one hand-off descriptor, patched in
//! place as the run grows.

pub mod chunk;

use rdq_commands::{header_of, modes::CycleMode, queue, MAX_COMMAND_WORDS};
use rdq_hal::PhysicalMemory;

use crate::autosync::AutoSync;
use crate::config::QueueConfig;
use crate::encode::{self, Command};
use crate::error::{QueueError, Result};
use crate::mem::Rdram;

use chunk::{free_chain, ChunkChain, ChunkInfo};

/// Margin of the rasterizer chain: one command of any size.
const RDP_MARGIN: u32 = MAX_COMMAND_WORDS as u32;
/// Margin of the stream chain: one command plus the `JUMP` to the next chunk.
const STREAM_MARGIN: u32 = MAX_COMMAND_WORDS as u32 + 1;

/// Counters collected while recording a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockStats {
    /// Native commands written to the rasterizer chain.
    pub rdp_commands: u32,
    /// Interpreted commands written to the stream.
    pub stream_commands: u32,
    /// Hand-off descriptors emitted.
    pub handoffs: u32,
    /// Native commands that extended an existing descriptor.
    pub coalesced: u32,
}

/// A finished, replayable block.
///
/// Owns its chunks in RDRAM; release it with
/// [`crate::RdpQueue::free_block`] once no replay is pending.
#[must_use = "a block owns RDRAM chunks and must be freed with RdpQueue::free_block"]
#[derive(Debug)]
pub struct Block {
    stream: Vec<ChunkInfo>,
    rdp: Vec<ChunkInfo>,
    stats: BlockStats,
}

impl Block {
    /// Address the coprocessor is told to `CALL`.
    pub fn entry(&self) -> u32 {
        self.stream[0].start()
    }

    pub fn stats(&self) -> BlockStats {
        self.stats
    }

    /// Chunks of the queue-level stream, in link order.
    pub fn stream_chunks(&self) -> &[ChunkInfo] {
        &self.stream
    }

    /// Chunks of native rasterizer commands, in link order.
    pub fn rdp_chunks(&self) -> &[ChunkInfo] {
        &self.rdp
    }

    pub(crate) fn release(self, mem: &mut Rdram) {
        let freed = free_chain(mem, self.stream[0].base) + free_chain(mem, self.rdp[0].base);
        debug_assert_eq!(freed, self.stream.len() + self.rdp.len());
        log::debug!("block 0x{:06X} freed ({freed} chunks)", self.entry());
    }
}

/// State of the block being recorded.
#[derive(Debug)]
pub(crate) struct BlockBuilder {
    stream: ChunkChain,
    rdp: ChunkChain,
    /// Stream address of the last hand-off descriptor, while it may still
    /// be extended.
    last_handoff: Option<u32>,
    /// Cycle mode set earlier in this block, if any.
    pub cycle: Option<CycleMode>,
    /// Live auto-sync state to restore when recording ends.
    pub saved_autosync: AutoSync,
    stats: BlockStats,
}

impl BlockBuilder {
    pub fn begin(mem: &mut Rdram, config: &QueueConfig, saved_autosync: AutoSync) -> Result<Self> {
        let stream = ChunkChain::begin(mem, config.block_min_words, STREAM_MARGIN)?;
        let rdp = match ChunkChain::begin(mem, config.block_min_words, RDP_MARGIN) {
            Ok(rdp) => rdp,
            Err(e) => {
                free_chain(mem, stream.head());
                return Err(e);
            }
        };
        log::debug!("block recording started at 0x{:06X}", stream.tail().start());
        Ok(Self {
            stream,
            rdp,
            last_handoff: None,
            cycle: None,
            saved_autosync,
            stats: BlockStats::default(),
        })
    }

    /// Append a native command to the rasterizer chain and make sure a
    /// hand-off covers it.
    pub fn record_rdp(&mut self, mem: &mut Rdram, config: &QueueConfig, cmd: &Command) -> Result<()> {
        let (start, end) = self.rdp.push(mem, cmd.words());
        self.stats.rdp_commands += 1;
        self.handoff(mem, config, start, end)?;

        if self.rdp.past_sentinel() {
            self.rdp.grow(mem, config.block_max_words)?;
            // The next native command starts a fresh descriptor.
            self.last_handoff = None;
        }
        Ok(())
    }

    /// Append a queue-level command to the block stream.
    pub fn record_stream(&mut self, mem: &mut Rdram, config: &QueueConfig, cmd: &Command) -> Result<()> {
        self.write_stream(mem, config, cmd.words())?;
        self.stats.stream_commands += 1;
        Ok(())
    }

    fn write_stream(&mut self, mem: &mut Rdram, config: &QueueConfig, words: &[u32]) -> Result<()> {
        self.stream.push(mem, words);
        if self.stream.past_sentinel() {
            let jump_at = self.stream.cursor();
            let next = self.stream.grow(mem, config.block_max_words)?;
            mem.write_u32(jump_at, encode::jump(next.start()).words()[0]);
        }
        Ok(())
    }

    fn handoff(&mut self, mem: &mut Rdram, config: &QueueConfig, start: u32, end: u32) -> Result<()> {
        assert!(
            start % 8 == 0 && end % 8 == 0,
            "hand-off range 0x{start:06X}..0x{end:06X} is not 8-byte aligned"
        );

        if let Some(desc) = self.last_handoff {
            let word0 = mem.read_u32(desc);
            let contiguous = word0 & rdq_commands::ARG0_MASK == start;
            if contiguous && self.stream.cursor() == desc + 8 {
                debug_assert_eq!(header_of(word0), queue::HANDOFF);
                mem.write_u32(desc, queue::handoff_word0(end));
                self.stats.coalesced += 1;
                return Ok(());
            }
        }

        let desc = self.stream.cursor();
        self.write_stream(mem, config, encode::handoff(start, end).words())?;
        self.last_handoff = Some(desc);
        self.stats.handoffs += 1;
        Ok(())
    }

    /// Terminate the stream and hand over the finished block.
    pub fn finish(mut self, mem: &mut Rdram) -> Block {
        // The margin always leaves room for the terminator.
        self.stream.push(mem, encode::ret().words());
        let block = Block {
            stream: self.stream.chunks().to_vec(),
            rdp: self.rdp.chunks().to_vec(),
            stats: self.stats,
        };
        log::debug!(
            "block 0x{:06X} recorded: {} native, {} interpreted, {} hand-offs, {}+{} chunks",
            block.entry(),
            block.stats.rdp_commands,
            block.stats.stream_commands,
            block.stats.handoffs,
            block.stream.len(),
            block.rdp.len()
        );
        block
    }

    /// Free a partially recorded block.
    pub fn abort(self, mem: &mut Rdram) {
        let freed = free_chain(mem, self.stream.head()) + free_chain(mem, self.rdp.head());
        log::debug!("block recording aborted ({freed} chunks freed)");
    }
}

/// Decode the queue-level stream of a block, following `JUMP`s, up to and
/// including its `RETURN`. Fails if a command is unknown or leaves the
/// block's stream chunks.
pub(crate) fn decode_stream(mem: &Rdram, block: &Block) -> Result<Vec<Command>> {
    let inside = |start: u32, end: u32| block.stream.iter().any(|c| c.contains(start, end));
    // Every command takes at least one word, so a well-formed stream ends
    // within this many commands.
    let limit: u32 = block.stream.iter().map(|c| c.words).sum();

    let mut out = Vec::new();
    let mut pc = block.entry();
    for _ in 0..limit {
        if !inside(pc, pc + 4) {
            return Err(QueueError::CorruptStream { addr: pc });
        }
        let word0 = mem.read_u32(pc);
        let h = header_of(word0);
        let n = rdq_commands::command_words(h).ok_or(QueueError::CorruptStream { addr: pc })? as u32;
        if !inside(pc, pc + n * 4) {
            return Err(QueueError::CorruptStream { addr: pc });
        }
        let words: Vec<u32> = (0..n).map(|i| mem.read_u32(pc + i * 4)).collect();
        let cmd = Command::from_words(&words).ok_or(QueueError::CorruptStream { addr: pc })?;
        out.push(cmd);
        match h {
            queue::RETURN => return Ok(out),
            queue::JUMP => pc = word0 & rdq_commands::ARG0_MASK,
            _ => pc += n * 4,
        }
    }
    Err(QueueError::CorruptStream { addr: pc })
}
