//! Pipeline resources tracked by auto-sync.
//!
//! A command declares the resources it uses and the resources it changes.
//! Changing a resource that a previous command still uses needs a sync of
//! that resource's category first.

/// Tile descriptor `n` (0..=7).
pub const fn tile(n: u8) -> u32 {
    1 << (n & 0x7)
}

pub const TILES: u32 = 0xFF;
pub const TMEM: u32 = 1 << 8;
pub const PIPE: u32 = 1 << 16;
pub const ALL: u32 = TILES | TMEM | PIPE;
