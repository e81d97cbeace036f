/// Errors reported by the command queue.
///
/// Producer bugs (misaligned hand-offs, oversize commands, chunk overflow)
/// are assertions instead.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// RDRAM has no free range large enough.
    #[error("out of RDRAM: {requested} bytes aligned to {align}")]
    OutOfMemory { requested: u32, align: u32 },

    /// A block is already being recorded.
    #[error("block recording is already active; blocks cannot nest")]
    NestedBlock,

    /// `end_block` or `abort_block` without an active recording.
    #[error("no block is being recorded")]
    NotRecording,

    /// Waiting for completion while recording would never return.
    #[error("cannot wait for completion while a block is being recorded")]
    WaitWhileRecording,

    /// Lookup slot outside the table, or slot 0 where a real slot is needed.
    #[error("invalid lookup address slot {0}")]
    InvalidLookupSlot(u8),

    /// A recorded block stream no longer decodes.
    #[error("corrupt block stream at 0x{addr:06X}")]
    CorruptStream { addr: u32 },

    /// Configuration rejected by [`crate::QueueConfig::validate`].
    #[error("invalid queue configuration: {0}")]
    InvalidConfig(String),

    /// The coprocessor failed to accept or execute commands.
    #[error("coprocessor error: {0}")]
    Coprocessor(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl QueueError {
    pub(crate) fn coprocessor<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        QueueError::Coprocessor(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
