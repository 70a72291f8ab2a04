/// Errors from the EPF bridge's realization sequence and its link to the
/// EPC server. Realize-time errors abort device creation (§4.2, §7
/// category *Resource*/*Peer*); everything else is logged and handled
/// locally by the caller (forwarding is fire-and-forget).
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to connect to epc socket at {path}: {source}")]
    Connect {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Decode(#[from] epc_protocol::DecodeError),
    #[error("protocol version mismatch: expected {expected:#x}, server replied {got:#x}")]
    VersionMismatch { expected: u32, got: u32 },
    #[error("failed to create shared memory object: {0}")]
    SharedMemory(std::io::Error),
}
