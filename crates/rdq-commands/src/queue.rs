//! Queue-internal commands, interpreted by the coprocessor's queue engine.

/// Tag of the queue engine itself.
pub const TAG: u8 = 0x0;

pub const NOOP: u8 = 0x00;
/// Hand a range of rasterizer commands to the rasterizer.
/// Word 0 arg = end address, word 1 = start address.
pub const HANDOFF: u8 = 0x01;
/// Execute the block stream at the address in arg 0, then return here.
pub const CALL: u8 = 0x02;
/// Continue reading the current stream at the address in arg 0.
pub const JUMP: u8 = 0x03;
/// Return from a block stream.
pub const RETURN: u8 = 0x04;
/// Wait until the rasterizer has drained every handed-off range.
pub const WAIT_IDLE: u8 = 0x05;

pub fn command_words(id: u8) -> Option<usize> {
    match id {
        NOOP | CALL | JUMP | RETURN | WAIT_IDLE => Some(1),
        HANDOFF => Some(2),
        _ => None,
    }
}

/// First word of a hand-off descriptor ending at `end`.
pub const fn handoff_word0(end: u32) -> u32 {
    ((HANDOFF as u32) << 24) | (end & crate::ARG0_MASK)
}
