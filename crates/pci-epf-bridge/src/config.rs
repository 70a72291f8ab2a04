use std::path::{Path, PathBuf};

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/qemu-epc.sock";

/// Configuration for a [`crate::PciEpfBridgeDevice`]. See `pci-epc`'s
/// `EpcConfig` for the matching rationale on the EPC side.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    socket_path: PathBuf,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }
}

impl BridgeConfig {
    pub fn with_socket_path(mut self, path: impl AsRef<Path>) -> Self {
        self.socket_path = path.as_ref().to_path_buf();
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}
