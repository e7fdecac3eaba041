use crate::registry::ResId;

/// Errors that cross an `Engine` method boundary. Per the "no exception mechanism
/// crosses component boundaries" rule, these are always returned, never panicked
/// across a public API — internal invariant violations use `safe_assert!` instead,
/// which degrades to a logged error in release builds rather than unwinding.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("transport construction/IO failed: {0}")]
    Transport(#[from] nanozen_transport::TransportError),

    #[error("stream-mode transport does not support MAX_PEERS > 1 (no per-peer reassembly buffers)")]
    UnsupportedConfig,

    #[error("publication table is full ({0} entries)")]
    PublicationTableFull(usize),

    #[error("subscription table is full ({0} entries)")]
    SubscriptionTableFull(usize),

    #[error("resource id {0:?} is already published")]
    DuplicateResourceId(ResId),

    #[error("reliable transmit window is full")]
    WindowFull,

    #[error("no publication registered at index {0}")]
    UnknownPublication(usize),

    #[error("malformed or oversized wire field")]
    MalformedWireField,

    #[error("ICGCB arena has no space for a block of this size even after compaction")]
    ArenaOutOfSpace,
}

pub type EngineResult<T> = Result<T, EngineError>;
