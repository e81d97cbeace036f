/// Faults detected while interpreting or rasterizing the command stream.
#[derive(Debug, thiserror::Error)]
pub enum TwinError {
    /// Header byte no queue module defines. `at` is an RDRAM address, or a
    /// word index for commands read from a kick.
    #[error("unknown command header 0x{header:02X} at 0x{at:06X}")]
    UnknownCommand { header: u8, at: u32 },

    /// A command runs past the end of its buffer.
    #[error("command 0x{header:02X} truncated: needs {needed} words, {available} available")]
    Truncated {
        header: u8,
        needed: usize,
        available: usize,
    },

    /// A handed-off range contains something the rasterizer cannot run.
    #[error("command 0x{header:02X} at 0x{at:06X} is not a native rasterizer command")]
    NotNative { header: u8, at: u32 },

    #[error("rasterizer range 0x{start:06X}..0x{end:06X} is not 8-byte aligned")]
    Misaligned { start: u32, end: u32 },

    #[error("coprocessor used before reset")]
    NotReset,

    #[error("block calls nested deeper than {0}")]
    CallDepth(usize),

    /// `JUMP` or `RETURN` outside a block stream.
    #[error("{0} outside a block stream")]
    StrayControl(&'static str),

    #[error("{0} without an image set")]
    MissingImage(&'static str),

    #[error("unsupported {0}")]
    Unsupported(&'static str),

    #[error("TMEM access 0x{addr:03X}+{len} overflows")]
    TmemOverflow { addr: u32, len: u32 },

    #[error("RDRAM access 0x{addr:06X}+{len} out of bounds")]
    OutOfBounds { addr: u32, len: u32 },

    #[error("failed to write image")]
    Image(#[from] image::ImageError),

    /// The queue engine hit an assertion.
    #[error("coprocessor assertion 0x{code:04X}: {message}")]
    Assert { code: u16, message: &'static str },
}
