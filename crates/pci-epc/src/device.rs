//! `PciEpcDevice`: the EPC target's three MMIO windows plus its socket
//! server lifecycle, tied to one [`EndpointState`].

use crate::config::EpcConfig;
use crate::error::EpcError;
use crate::server::{self, ServerHandle};
use crate::state::EndpointState;
use epc_host::{DmaTarget, PciIdentity};
use std::sync::{Arc, Mutex};

/// The EPC's own outer PCI identity (§6), distinct from the guest-populated
/// `config_space` buffer the PCI-config window writes into.
pub const PCI_VENDOR_ID_REDHAT: u16 = 0x1b36;
pub const PCI_DEVICE_ID_REDHAT_PCIE_EP: u16 = 0x0013;

pub struct PciEpcDevice {
    config: EpcConfig,
    state: Arc<EndpointState>,
    dma: Arc<dyn DmaTarget>,
    server: Mutex<Option<ServerHandle>>,
}

impl PciEpcDevice {
    /// Creates the device and sets its outer PCI identity on `identity`.
    /// Does not arm the socket server; that happens on the first `START`
    /// control write (or an explicit [`PciEpcDevice::start`] call), matching
    /// the control window's offset-0 semantics in SPEC_FULL.md §4.1.
    pub fn realize(
        config: EpcConfig,
        dma: Arc<dyn DmaTarget>,
        identity: &mut dyn PciIdentity,
    ) -> Self {
        identity.set_vendor_id(PCI_VENDOR_ID_REDHAT);
        identity.set_device_id(PCI_DEVICE_ID_REDHAT_PCIE_EP);
        Self {
            config,
            state: Arc::new(EndpointState::new()),
            dma,
            server: Mutex::new(None),
        }
    }

    /// Control window (64 bytes). Every offset other than 0 reads as zero.
    pub fn ctrl_read(&self, _offset: u64) -> u64 {
        0
    }

    /// Offset 0 (`START`): bit 0 arms the server, clear requests teardown.
    /// Idempotent; all other offsets are a no-op, per §4.1.
    pub fn ctrl_write(&self, offset: u64, _size: u8, val: u64) {
        if offset != 0 {
            return;
        }
        if val & 1 != 0 {
            if let Err(err) = self.start() {
                tracing::error!("epc: failed to arm socket server: {err}");
            }
        } else {
            self.stop();
        }
    }

    /// Arms the socket server if it is not already running. Idempotent.
    pub fn start(&self) -> Result<(), EpcError> {
        let mut guard = self.server.lock().unwrap();
        if guard.is_some() {
            return Ok(());
        }
        let handle = server::spawn(
            self.config.socket_path().to_path_buf(),
            self.state.clone(),
            self.dma.clone(),
        )?;
        *guard = Some(handle);
        Ok(())
    }

    /// Requests worker teardown and joins it. Idempotent: a no-op if the
    /// server is not running.
    pub fn stop(&self) {
        let handle = self.server.lock().unwrap().take();
        if let Some(handle) = handle {
            handle.shutdown();
        }
    }

    pub fn is_running(&self) -> bool {
        self.server.lock().unwrap().is_some()
    }

    /// PCI-config window (4096 bytes). Read-back always returns 0; the
    /// window is write-through into `config_space` only (§4.1).
    pub fn pci_cfg_read(&self, _offset: u64, _size: u8) -> u64 {
        0
    }

    pub fn pci_cfg_write(&self, offset: u64, size: u8, val: u64) {
        self.state.config_space.write(offset, size, val);
    }

    /// BAR-config window: the cascade-decoded packed record (§4.1).
    pub fn bar_cfg_read(&self, offset: u64) -> u64 {
        self.state.bar_table.read_bar_cfg(offset)
    }

    pub fn bar_cfg_write(&self, offset: u64, size: u8, val: u64) {
        self.state.bar_table.write_bar_cfg(offset, size, val);
    }

    /// Test/introspection hook: the authoritative endpoint state.
    pub fn state(&self) -> &Arc<EndpointState> {
        &self.state
    }
}

impl Drop for PciEpcDevice {
    fn drop(&mut self) {
        self.stop();
    }
}
