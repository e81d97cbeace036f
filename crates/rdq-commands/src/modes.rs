//! Other-modes register bits.
//!
//! The 64-bit other-modes value travels as two words: the upper 24 bits of
//! the high half in argument 0, the low half in word 1.

pub const SOM_CYCLE_SHIFT: u32 = 52;
pub const SOM_CYCLE_MASK: u64 = 0x3 << SOM_CYCLE_SHIFT;
pub const SOM_CYCLE_1: u64 = 0 << SOM_CYCLE_SHIFT;
pub const SOM_CYCLE_2: u64 = 1 << SOM_CYCLE_SHIFT;
pub const SOM_CYCLE_COPY: u64 = 2 << SOM_CYCLE_SHIFT;
pub const SOM_CYCLE_FILL: u64 = 3 << SOM_CYCLE_SHIFT;

pub const SOM_RGBDITHER_NONE: u64 = 3 << 38;
pub const SOM_ALPHADITHER_NONE: u64 = 3 << 36;
pub const SOM_BLENDING: u64 = 1 << 14;

/// Pipeline cycle type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleMode {
    One,
    Two,
    Copy,
    Fill,
}

impl CycleMode {
    pub fn from_modes(modes: u64) -> Self {
        match (modes & SOM_CYCLE_MASK) >> SOM_CYCLE_SHIFT {
            0 => Self::One,
            1 => Self::Two,
            2 => Self::Copy,
            _ => Self::Fill,
        }
    }

    pub fn to_modes(self) -> u64 {
        match self {
            Self::One => SOM_CYCLE_1,
            Self::Two => SOM_CYCLE_2,
            Self::Copy => SOM_CYCLE_COPY,
            Self::Fill => SOM_CYCLE_FILL,
        }
    }

    /// Copy and fill modes treat rectangle and scissor right edges as
    /// inclusive.
    pub fn inclusive_right_edge(self) -> bool {
        matches!(self, Self::Copy | Self::Fill)
    }
}

/// Split an other-modes value into its argument and second word.
pub const fn split(modes: u64) -> (u32, u32) {
    (((modes >> 32) as u32) & crate::ARG0_MASK, modes as u32)
}

/// Inverse of [`split`].
pub const fn join(arg0: u32, word1: u32) -> u64 {
    (((arg0 & crate::ARG0_MASK) as u64) << 32) | word1 as u64
}
