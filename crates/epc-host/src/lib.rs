//! Host-emulator capabilities consumed by the EPC/EPF device pair.
//!
//! The real hardware-emulation host owns MMIO region registration, PCI BAR
//! registration, MSI delivery, DMA, randomness, and logging; this crate only
//! states the seams `pci-epc`/`pci-epf-bridge` need from it, the same way
//! `aero_virtio::memory::GuestMemory` and `aero_virtio::pci::InterruptLog`
//! stand in for "the rest of the emulator" in the teacher's PCI tests. Each
//! trait ships a recording fake in [`fake`] so device-model tests don't need
//! a real host.

pub mod fake;
pub mod unix_fd;

/// Errors surfaced by DMA: black-box (d) in the external-interfaces section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DmaError {
    #[error("dma write of {len} bytes to guest physical address {addr:#x} failed")]
    WriteFailed { addr: u64, len: usize },
}

/// A host-assisted write into the guest's physical address space, initiated
/// by the emulated device. Black-box (d) of the external-interfaces section.
pub trait DmaTarget: Send + Sync {
    fn dma_write(&self, guest_phys_addr: u64, data: &[u8]) -> Result<(), DmaError>;
}

/// Message-signaled interrupt delivery. Black-box (c).
pub trait MsiController: Send + Sync {
    fn notify(&self, vector: u32);
}

/// Cryptographically-seeded random bytes. Black-box (e).
pub trait RandomSource: Send + Sync {
    fn fill_bytes(&self, buf: &mut [u8]);
}

/// A guest-visible MMIO region the bridge has registered for one of its BARs.
/// Black-box (a)+(b): MMIO region registration and PCI BAR registration.
pub trait MmioRegion: Send + Sync {
    fn size(&self) -> u64;
}

/// Registers a local MMIO region as a PCI BAR on the bridge's guest-facing
/// PCI function. Black-box (a)+(b).
pub trait BarRegistrar {
    fn register_bar(&mut self, bar_no: u8, size: u64) -> Box<dyn MmioRegion>;
}

/// PCI config-space identity setters. Black-box (h):
/// `set_vendor_id`/`set_device_id`/`set_revision`/`set_class`.
pub trait PciIdentity {
    fn set_vendor_id(&mut self, vendor_id: u16);
    fn set_device_id(&mut self, device_id: u16);
    fn set_revision(&mut self, revision: u8);
    fn set_subclass(&mut self, subclass: u8);
}
