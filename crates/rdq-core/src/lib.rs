//! Rasterizer command queue.
//!
//! Turns immediate-mode rasterizer operations into an ordered, synchronized
//! binary command stream for a coprocessor. Operations are either appended
//! to the live queue or recorded into a [`Block`] for later replay; the
//! decision is made per command by [`RdpQueue::dispatch`]. Pipeline hazards
//! are handled by inserting sync commands automatically.

pub mod autosync;
pub mod block;
pub mod config;
pub mod encode;
pub mod error;
pub mod math;
pub mod mem;
pub mod queue;
pub mod rdp;

pub use block::chunk::ChunkInfo;
pub use block::{Block, BlockStats};
pub use config::QueueConfig;
pub use encode::Command;
pub use error::{QueueError, Result};
pub use mem::Rdram;
pub use queue::{QueueStats, RdpQueue};
pub use rdp::ModesWord;

pub use rdq_commands as commands;
pub use rdq_hal as hal;
