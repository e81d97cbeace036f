//! Command encoder.
//!
//! Formats one logical operation into its wire record. No semantic checks:
//! callers pass the argument count the command id requires.

use heapless::Vec;
use rdq_commands::{header, queue, rdp, ARG0_MASK, MAX_COMMAND_WORDS};

/// One encoded command, 1..=44 words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    words: Vec<u32, MAX_COMMAND_WORDS>,
}

impl Command {
    /// Encode `id` for the queue module `tag`. `arg0` fills the low 24 bits
    /// of the first word; `rest` follows in order.
    pub fn new(tag: u8, id: u8, arg0: u32, rest: &[u32]) -> Self {
        assert!(
            rest.len() < MAX_COMMAND_WORDS,
            "command 0x{id:02X} has {} words, max is {MAX_COMMAND_WORDS}",
            rest.len() + 1
        );
        let h = header(tag, id);
        debug_assert_eq!(
            rdq_commands::command_words(h),
            Some(rest.len() + 1),
            "wrong word count for command header 0x{h:02X}"
        );

        let mut words = Vec::new();
        // Capacity was checked above.
        let _ = words.push(((h as u32) << 24) | (arg0 & ARG0_MASK));
        let _ = words.extend_from_slice(rest);
        Self { words }
    }

    /// Encode a rasterizer overlay command.
    pub fn rdp(id: u8, arg0: u32, rest: &[u32]) -> Self {
        Self::new(rdp::TAG, id, arg0, rest)
    }

    /// Encode a queue-internal command.
    pub fn queue(id: u8, arg0: u32, rest: &[u32]) -> Self {
        Self::new(queue::TAG, id, arg0, rest)
    }

    pub fn header(&self) -> u8 {
        rdq_commands::header_of(self.words[0])
    }

    /// Overlay-relative id for rasterizer commands, the raw id otherwise.
    pub fn id(&self) -> u8 {
        let h = self.header();
        if rdp::owns(h) {
            rdp::id_of(h)
        } else {
            h & 0x0F
        }
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Rebuild a command from its raw words.
    pub fn from_words(words: &[u32]) -> Option<Self> {
        let first = *words.first()?;
        let expected = rdq_commands::command_words(rdq_commands::header_of(first))?;
        if expected != words.len() {
            return None;
        }
        Some(Self {
            words: Vec::from_slice(words).ok()?,
        })
    }
}

/// Hand-off descriptor for the rasterizer range `[start, end)`.
pub fn handoff(start: u32, end: u32) -> Command {
    Command::queue(queue::HANDOFF, end, &[start])
}

pub fn call(addr: u32) -> Command {
    Command::queue(queue::CALL, addr, &[])
}

pub fn jump(addr: u32) -> Command {
    Command::queue(queue::JUMP, addr, &[])
}

pub fn ret() -> Command {
    Command::queue(queue::RETURN, 0, &[])
}

pub fn wait_idle() -> Command {
    Command::queue(queue::WAIT_IDLE, 0, &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lands_in_top_byte() {
        let cmd = Command::rdp(rdp::SET_SCISSOR, 0x00AB_CDEF, &[0x1234_5678]);
        assert_eq!(cmd.words(), &[0xED_AB_CD_EF, 0x1234_5678]);
        assert_eq!(cmd.id(), rdp::SET_SCISSOR);
    }

    #[test]
    fn arg0_is_truncated_to_24_bits() {
        let cmd = Command::rdp(rdp::SET_COLOR_IMAGE, 0xFF12_3456, &[0]);
        assert_eq!(cmd.words()[0], 0xFF12_3456);
        let cmd = Command::rdp(rdp::SYNC_PIPE, 0x7F00_0000, &[0]);
        assert_eq!(cmd.words()[0], 0xE700_0000);
    }

    #[test]
    fn handoff_layout() {
        let cmd = handoff(0x1000, 0x1040);
        assert_eq!(cmd.words(), &[0x0100_1040, 0x1000]);
    }

    #[test]
    fn from_words_checks_size() {
        assert!(Command::from_words(&[0xE700_0000, 0]).is_some());
        assert!(Command::from_words(&[0xE700_0000]).is_none());
        assert!(Command::from_words(&[]).is_none());
    }
}
