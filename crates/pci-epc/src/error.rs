use std::path::PathBuf;

/// Errors surfaced at device realize time (§7, category *Resource*).
#[derive(Debug, thiserror::Error)]
pub enum EpcError {
    #[error("failed to bind EPC socket at {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that terminate a single connection (§7, categories *Framing*,
/// *Validation*, *DMA*). Never retried; the worker logs and returns to
/// `Accepted` per the connection state machine in §4.1.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("short read on socket: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Decode(#[from] epc_protocol::DecodeError),
    #[error(transparent)]
    Dma(#[from] epc_host::DmaError),
    #[error("bar {0} is disabled or out of range")]
    BarDisabled(u8),
    #[error("dma base address overflowed (bar phys_addr + offset)")]
    DmaAddressOverflow,
    #[error("access_bar payload of {0} bytes exceeds the per-message cap")]
    PayloadTooLarge(u64),
}
