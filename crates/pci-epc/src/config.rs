use std::path::{Path, PathBuf};

/// The well-known path from SPEC_FULL.md §6.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/qemu-epc.sock";

/// Configuration for a [`crate::PciEpcDevice`]. Overridable mainly so tests
/// can bind to a per-test temp path instead of the shared well-known one;
/// production call sites should use [`EpcConfig::default`].
#[derive(Debug, Clone)]
pub struct EpcConfig {
    socket_path: PathBuf,
}

impl Default for EpcConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }
}

impl EpcConfig {
    pub fn with_socket_path(mut self, path: impl AsRef<Path>) -> Self {
        self.socket_path = path.as_ref().to_path_buf();
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}
