//! Command ids, sizes and field layouts for the rdq command stream.
//!
//! Single source of truth shared by the producer (`rdq-core`) and the
//! consumer model (`rdq-twin`). Every command starts with a header byte,
//! `(tag << 4) | id`, in the top byte of its first big-endian word; the low
//! 24 bits of that word carry the first argument.
#![no_std]

pub mod asserts;
pub mod color;
pub mod format;
pub mod modes;
pub mod queue;
pub mod rdp;
pub mod resource;

pub use color::Color;
pub use format::{ImageFormat, PixelSize, TexFormat};
pub use modes::CycleMode;

/// Largest command in the stream, in 32-bit words (a shaded, textured,
/// z-buffered triangle).
pub const MAX_COMMAND_WORDS: usize = 44;

/// Mask for the argument bits carried in the first word of a command.
pub const ARG0_MASK: u32 = 0x00FF_FFFF;

/// Build a header byte from a queue tag and a command id.
pub const fn header(tag: u8, id: u8) -> u8 {
    (tag << 4) | id
}

/// Extract the header byte from the first word of a command.
pub const fn header_of(word0: u32) -> u8 {
    (word0 >> 24) as u8
}

/// Static size in words of the command starting with `header`, or `None`
/// for a header no queue module defines.
pub fn command_words(header: u8) -> Option<usize> {
    if rdp::owns(header) {
        rdp::command_words(rdp::id_of(header))
    } else if header >> 4 == queue::TAG {
        queue::command_words(header & 0x0F)
    } else {
        None
    }
}
