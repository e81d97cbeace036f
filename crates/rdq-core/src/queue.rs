//! The command queue: dynamic writer, block lifecycle and fixup dispatch.

use rdq_commands::rdp;
use rdq_hal::{Coprocessor, StagingBuffer};

use crate::autosync::{AutoSync, SyncKind};
use crate::block::{self, Block, BlockBuilder};
use crate::config::QueueConfig;
use crate::encode::{self, Command};
use crate::error::{QueueError, Result};
use crate::mem::Rdram;

/// Which path emitted commands take. A variant rather than a depth counter:
/// there is at most one block under construction.
#[derive(Debug)]
pub(crate) enum Recording {
    Idle,
    Block(BlockBuilder),
}

/// Counters for the live queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Calls into [`Coprocessor::kick`].
    pub kicks: u32,
    /// Words handed to the coprocessor.
    pub words_kicked: u64,
    /// Commands appended to the live queue.
    pub dynamic_commands: u32,
    /// Commands recorded into blocks.
    pub static_commands: u32,
    pub blocks_recorded: u32,
    pub block_runs: u32,
}

/// A rasterizer command queue feeding one coprocessor.
///
/// Single producer: every method takes `&mut self`. Commands reach the
/// coprocessor in append order, including across block calls.
pub struct RdpQueue<C: Coprocessor<Rdram>> {
    coprocessor: C,
    mem: Rdram,
    config: QueueConfig,
    /// Live words not yet kicked.
    pending: Vec<u32>,
    pub(crate) recording: Recording,
    pub(crate) autosync: AutoSync,
    staging: [StagingBuffer; 2],
    stats: QueueStats,
}

impl<C: Coprocessor<Rdram>> RdpQueue<C> {
    /// Create RDRAM, allocate the staging buffers and reset the coprocessor.
    pub fn new(mut coprocessor: C, config: QueueConfig) -> Result<Self> {
        config.validate()?;
        let mut mem = Rdram::new(config.rdram_bytes);

        let bytes = config.staging_words * 4;
        let staging = [
            StagingBuffer {
                base: mem.alloc(bytes, 8)?,
                words: config.staging_words,
            },
            StagingBuffer {
                base: mem.alloc(bytes, 8)?,
                words: config.staging_words,
            },
        ];
        coprocessor
            .reset(&mut mem, staging)
            .map_err(QueueError::coprocessor)?;
        log::info!(
            "rdq: queue ready, {} KiB RDRAM, staging at 0x{:06X}/0x{:06X}",
            config.rdram_bytes / 1024,
            staging[0].base,
            staging[1].base
        );

        let ring = config_ring(&config);
        Ok(Self {
            coprocessor,
            mem,
            config,
            pending: Vec::with_capacity(ring),
            recording: Recording::Idle,
            autosync: AutoSync::idle(),
            staging,
            stats: QueueStats::default(),
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    pub fn staging_buffers(&self) -> [StagingBuffer; 2] {
        self.staging
    }

    pub fn coprocessor(&self) -> &C {
        &self.coprocessor
    }

    pub fn coprocessor_mut(&mut self) -> &mut C {
        &mut self.coprocessor
    }

    /// Shared RDRAM. Only safe to inspect what the coprocessor wrote after
    /// [`RdpQueue::wait`].
    pub fn memory(&self) -> &Rdram {
        &self.mem
    }

    pub fn memory_mut(&mut self) -> &mut Rdram {
        &mut self.mem
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.recording, Recording::Block(_))
    }

    /// Current auto-sync state of the active context.
    pub fn autosync(&self) -> AutoSync {
        self.autosync
    }

    // ------------------------------------------------------------------
    // Writers
    // ------------------------------------------------------------------

    /// Append a command to the current queue context: the live queue, or
    /// the stream of the block being recorded.
    pub fn write_dynamic(&mut self, cmd: &Command) -> Result<()> {
        if let Recording::Block(builder) = &mut self.recording {
            self.stats.static_commands += 1;
            return builder.record_stream(&mut self.mem, &self.config, cmd);
        }

        self.pending.extend_from_slice(cmd.words());
        self.stats.dynamic_commands += 1;
        if self.pending.len() >= config_ring(&self.config) {
            self.flush()?;
        }
        Ok(())
    }

    /// Route one command: encoded with `dynamic_id` into the live queue
    /// when idle, or with `static_id` into the block being recorded.
    ///
    /// Inside a block, native commands go to the rasterizer chain and
    /// anything else to the block stream.
    pub fn dispatch(&mut self, dynamic_id: u8, static_id: u8, arg0: u32, rest: &[u32]) -> Result<()> {
        if let Recording::Block(builder) = &mut self.recording {
            let cmd = Command::rdp(static_id, arg0, rest);
            self.stats.static_commands += 1;
            return if rdp::is_native(static_id) {
                builder.record_rdp(&mut self.mem, &self.config, &cmd)
            } else {
                builder.record_stream(&mut self.mem, &self.config, &cmd)
            };
        }
        self.write_dynamic(&Command::rdp(dynamic_id, arg0, rest))
    }

    /// Write a rasterizer command with the same id on both paths.
    pub fn write(&mut self, id: u8, arg0: u32, rest: &[u32]) -> Result<()> {
        self.dispatch(id, id, arg0, rest)
    }

    /// Two-word command.
    pub fn write8(&mut self, id: u8, arg0: u32, arg1: u32) -> Result<()> {
        self.dispatch(id, id, arg0, &[arg1])
    }

    /// Four-word command.
    pub fn write16(&mut self, id: u8, arg0: u32, arg1: u32, arg2: u32, arg3: u32) -> Result<()> {
        self.dispatch(id, id, arg0, &[arg1, arg2, arg3])
    }

    /// Two-word command whose id depends on the path.
    pub fn fixup_write8(&mut self, dynamic_id: u8, static_id: u8, arg0: u32, arg1: u32) -> Result<()> {
        self.dispatch(dynamic_id, static_id, arg0, &[arg1])
    }

    /// Raw flat triangle from its eight edge words.
    pub fn fill_triangle_raw(&mut self, words: [u32; 8]) -> Result<()> {
        self.write(rdp::TRI_FILL, words[0], &words[1..])
    }

    // ------------------------------------------------------------------
    // Auto-sync
    // ------------------------------------------------------------------

    /// Emit whatever syncs must precede a command changing `changes`.
    pub(crate) fn autosync_change(&mut self, changes: u32) -> Result<()> {
        for kind in self.autosync.required(changes) {
            self.emit_sync(kind)?;
        }
        Ok(())
    }

    pub(crate) fn autosync_use(&mut self, uses: u32) {
        self.autosync.mark_used(uses);
    }

    pub(crate) fn emit_sync(&mut self, kind: SyncKind) -> Result<()> {
        self.write8(kind.command_id(), 0, 0)?;
        self.autosync.on_sync(kind);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    /// Kick every pending live word to the coprocessor.
    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let words = std::mem::take(&mut self.pending);
        log::trace!("rdq: kick {} words", words.len());
        self.stats.kicks += 1;
        self.stats.words_kicked += words.len() as u64;
        let result = self.coprocessor.kick(&mut self.mem, &words);
        // Reuse the allocation.
        self.pending = words;
        self.pending.clear();
        result.map_err(QueueError::coprocessor)
    }

    /// Queue a full sync followed by a wait for the rasterizer to go idle.
    pub fn fence(&mut self) -> Result<()> {
        self.emit_sync(SyncKind::Full)?;
        self.write_dynamic(&encode::wait_idle())
    }

    /// Submit everything and block until the coprocessor has finished it.
    pub fn wait(&mut self) -> Result<()> {
        if self.is_recording() {
            return Err(QueueError::WaitWhileRecording);
        }
        self.fence()?;
        self.flush()?;
        self.coprocessor
            .wait_idle(&mut self.mem)
            .map_err(QueueError::coprocessor)
    }

    /// Wait for completion and give back the coprocessor and RDRAM.
    pub fn close(mut self) -> Result<(C, Rdram)> {
        if let Recording::Block(builder) = std::mem::replace(&mut self.recording, Recording::Idle) {
            log::warn!("rdq: closing queue with a block still recording");
            builder.abort(&mut self.mem);
        }
        self.wait()?;
        Ok((self.coprocessor, self.mem))
    }

    // ------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------

    /// Start recording a block. Every command until [`RdpQueue::end_block`]
    /// is stored in the block instead of being submitted.
    pub fn begin_block(&mut self) -> Result<()> {
        if self.is_recording() {
            return Err(QueueError::NestedBlock);
        }
        // The block may run after anything.
        let builder = BlockBuilder::begin(&mut self.mem, &self.config, self.autosync)?;
        self.autosync = AutoSync::saturated();
        self.recording = Recording::Block(builder);
        Ok(())
    }

    /// Finish the recording and return the block.
    pub fn end_block(&mut self) -> Result<Block> {
        match std::mem::replace(&mut self.recording, Recording::Idle) {
            Recording::Idle => Err(QueueError::NotRecording),
            Recording::Block(builder) => {
                self.autosync = builder.saved_autosync;
                self.stats.blocks_recorded += 1;
                Ok(builder.finish(&mut self.mem))
            }
        }
    }

    /// Drop the block being recorded and free its chunks.
    pub fn abort_block(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.recording, Recording::Idle) {
            Recording::Idle => Err(QueueError::NotRecording),
            Recording::Block(builder) => {
                self.autosync = builder.saved_autosync;
                builder.abort(&mut self.mem);
                Ok(())
            }
        }
    }

    /// Queue one replay of `block` in the current context. Allowed while
    /// recording another block, which then calls it.
    pub fn run_block(&mut self, block: &Block) -> Result<()> {
        self.write_dynamic(&encode::call(block.entry()))?;
        self.stats.block_runs += 1;
        // Unknown work ran: every resource may be busy.
        self.autosync = AutoSync::saturated();
        if let Recording::Block(builder) = &mut self.recording {
            builder.cycle = None;
        }
        Ok(())
    }

    /// Free a block. Pending live words are kicked first so that queued
    /// calls to the block are consumed; the caller must not free a block a
    /// still-recording block calls.
    pub fn free_block(&mut self, block: Block) -> Result<()> {
        self.flush()?;
        block.release(&mut self.mem);
        Ok(())
    }

    /// Decode the queue-level stream of `block`.
    pub fn block_stream(&self, block: &Block) -> Result<Vec<Command>> {
        block::decode_stream(&self.mem, block)
    }

    /// The block being recorded, if any.
    pub(crate) fn builder_mut(&mut self) -> Option<&mut BlockBuilder> {
        match &mut self.recording {
            Recording::Block(builder) => Some(builder),
            Recording::Idle => None,
        }
    }
}

fn config_ring(config: &QueueConfig) -> usize {
    config.ring_words as usize
}

impl<C: Coprocessor<Rdram> + std::fmt::Debug> std::fmt::Debug for RdpQueue<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RdpQueue")
            .field("coprocessor", &self.coprocessor)
            .field("mem", &self.mem)
            .field("pending", &self.pending.len())
            .field("recording", &self.is_recording())
            .field("autosync", &self.autosync)
            .finish()
    }
}
