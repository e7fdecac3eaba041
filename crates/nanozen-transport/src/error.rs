/// Transport-layer failures. A `send`/`recv` returning `Err` is the "negative count is
/// fatal" case from the transport interface; `WouldBlock`-style "no data available" is
/// modelled as `Ok(None)` from `Transport::try_recv`, never as an error.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("packet of {len} bytes exceeds receive buffer of {cap} bytes")]
    Oversized { len: usize, cap: usize },

    #[error("no local address bound for this transport")]
    Unbound,
}

pub type TransportResult<T> = Result<T, TransportError>;
