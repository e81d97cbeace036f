//! Queue configuration.

use rdq_commands::MAX_COMMAND_WORDS;

use crate::block::chunk::CHUNK_HEADER_BYTES;
use crate::error::{QueueError, Result};
use crate::mem::{RESERVED_HIGH, RESERVED_LOW};

/// Largest RDRAM the 24-bit address fields can reach.
pub const MAX_RDRAM_BYTES: u32 = 1 << 24;

/// Sizes of the memories and buffers a queue is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Simulated RDRAM size in bytes.
    pub rdram_bytes: u32,
    /// Words in the first chunk of every block.
    pub block_min_words: u32,
    /// Chunk growth stops doubling at this many words.
    pub block_max_words: u32,
    /// Live queue words buffered before they are kicked to the coprocessor.
    pub ring_words: u32,
    /// Words in each of the two dynamic staging buffers.
    pub staging_words: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            rdram_bytes: 8 << 20,
            block_min_words: 64,
            block_max_words: 4192,
            ring_words: 1024,
            staging_words: 512,
        }
    }
}

impl QueueConfig {
    /// Smallest RDRAM that holds both staging buffers and the first chunks
    /// of one block.
    pub fn min_rdram_bytes(&self) -> u64 {
        let staging = 2 * u64::from(self.staging_words) * 4;
        let chunks = 2 * (u64::from(CHUNK_HEADER_BYTES) + u64::from(self.block_min_words) * 4);
        u64::from(RESERVED_LOW + RESERVED_HIGH) + staging + chunks
    }

    pub fn validate(&self) -> Result<()> {
        let min_chunk = (MAX_COMMAND_WORDS + 2) as u32;
        if self.rdram_bytes == 0 || self.rdram_bytes > MAX_RDRAM_BYTES {
            return Err(QueueError::InvalidConfig(format!(
                "rdram_bytes must be in 1..={MAX_RDRAM_BYTES}, got {}",
                self.rdram_bytes
            )));
        }
        if self.block_min_words < min_chunk {
            return Err(QueueError::InvalidConfig(format!(
                "block_min_words must be at least {min_chunk}, got {}",
                self.block_min_words
            )));
        }
        if self.block_max_words < self.block_min_words {
            return Err(QueueError::InvalidConfig(format!(
                "block_max_words ({}) is below block_min_words ({})",
                self.block_max_words, self.block_min_words
            )));
        }
        if self.ring_words < MAX_COMMAND_WORDS as u32 {
            return Err(QueueError::InvalidConfig(format!(
                "ring_words must hold at least one command ({MAX_COMMAND_WORDS} words)"
            )));
        }
        if self.staging_words < MAX_COMMAND_WORDS as u32 || self.staging_words % 2 != 0 {
            return Err(QueueError::InvalidConfig(format!(
                "staging_words must be even and at least {MAX_COMMAND_WORDS}, got {}",
                self.staging_words
            )));
        }
        let min_rdram = self.min_rdram_bytes();
        if u64::from(self.rdram_bytes) < min_rdram {
            return Err(QueueError::InvalidConfig(format!(
                "rdram_bytes must be at least {min_rdram} for these buffers, got {}",
                self.rdram_bytes
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(QueueConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_tiny_chunks() {
        let cfg = QueueConfig {
            block_min_words: 16,
            ..QueueConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(QueueError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_rdram_beyond_address_space() {
        let cfg = QueueConfig {
            rdram_bytes: MAX_RDRAM_BYTES + 8,
            ..QueueConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_rdram_too_small() {
        let cfg = QueueConfig {
            rdram_bytes: 0x100,
            ..QueueConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(QueueError::InvalidConfig(_))));

        // Exactly the minimum is enough.
        let cfg = QueueConfig {
            rdram_bytes: 4888,
            ..QueueConfig::default()
        };
        assert_eq!(cfg.min_rdram_bytes(), 4888);
        assert!(cfg.validate().is_ok());
    }
}
