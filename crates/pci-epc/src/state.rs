use crate::bar_table::BarTable;
use crate::config_space::ConfigSpace;
use std::os::unix::io::RawFd;
use std::sync::Mutex;

/// The authoritative endpoint description (§3): config space, BAR table,
/// and the last shared-memfd handed over by the bridge. Created on EPC
/// realization, read by the worker thread and written by MMIO callbacks.
#[derive(Default)]
pub struct EndpointState {
    pub config_space: ConfigSpace,
    pub bar_table: BarTable,
    shared_memfd: Mutex<Option<RawFd>>,
}

impl EndpointState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the bridge's shared-memfd handle. The EPC side receives it
    /// but never reads through it directly (§3); it is kept only so a
    /// future extension (or a debugging tool) can inspect it.
    pub fn store_shared_memfd(&self, fd: RawFd) {
        let mut slot = self.shared_memfd.lock().unwrap();
        if let Some(old) = slot.replace(fd) {
            // A reconnecting bridge sends a fresh FD; drop the stale one.
            unsafe {
                libc::close(old);
            }
        }
    }

    pub fn shared_memfd(&self) -> Option<RawFd> {
        *self.shared_memfd.lock().unwrap()
    }
}

impl Drop for EndpointState {
    fn drop(&mut self) {
        if let Some(fd) = *self.shared_memfd.lock().unwrap() {
            unsafe {
                libc::close(fd);
            }
        }
    }
}
