//! Recording/deterministic fakes for the host-capability traits, used by the
//! `pci-epc` and `pci-epf-bridge` test suites. Modeled on
//! `aero_virtio::pci::InterruptLog`: a plain recording sink, not gated behind
//! `#[cfg(test)]`, so it can be shared across crates as a dev-dependency.

use crate::{BarRegistrar, DmaError, DmaTarget, MmioRegion, MsiController, PciIdentity, RandomSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Records every DMA write it receives; optionally fails the next write.
#[derive(Default)]
pub struct RecordingDma {
    writes: Mutex<Vec<(u64, Vec<u8>)>>,
    fail_next: AtomicBool,
}

impl RecordingDma {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `dma_write` call returns `Err` instead of recording.
    pub fn fail_next_write(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<(u64, Vec<u8>)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn last_write(&self) -> Option<(u64, Vec<u8>)> {
        self.writes.lock().unwrap().last().cloned()
    }
}

impl DmaTarget for RecordingDma {
    fn dma_write(&self, guest_phys_addr: u64, data: &[u8]) -> Result<(), DmaError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(DmaError::WriteFailed {
                addr: guest_phys_addr,
                len: data.len(),
            });
        }
        self.writes
            .lock()
            .unwrap()
            .push((guest_phys_addr, data.to_vec()));
        Ok(())
    }
}

/// Records every MSI vector raised.
#[derive(Default)]
pub struct MsiLog {
    notifications: Mutex<Vec<u32>>,
}

impl MsiLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<u32> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn count(&self, vector: u32) -> usize {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|&&v| v == vector)
            .count()
    }
}

impl MsiController for MsiLog {
    fn notify(&self, vector: u32) {
        self.notifications.lock().unwrap().push(vector);
    }
}

/// A small xorshift PRNG so tests are deterministic across platforms without
/// depending on the system entropy source.
pub struct DeterministicRng {
    state: Mutex<u64>,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self {
            state: Mutex::new(seed | 1),
        }
    }
}

impl RandomSource for DeterministicRng {
    fn fill_bytes(&self, buf: &mut [u8]) {
        let mut x = *self.state.lock().unwrap();
        for byte in buf.iter_mut() {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            *byte = (x & 0xFF) as u8;
        }
        *self.state.lock().unwrap() = x;
    }
}

/// A bare MMIO region of a fixed size; installed by [`FakeBarRegistrar`].
pub struct FakeBarRegion {
    size: u64,
}

impl MmioRegion for FakeBarRegion {
    fn size(&self) -> u64 {
        self.size
    }
}

/// Records `register_bar` calls in order, mirroring the guest-side BAR setup
/// an EPF bridge performs during realization.
#[derive(Default)]
pub struct FakeBarRegistrar {
    pub registered: Vec<(u8, u64)>,
}

impl FakeBarRegistrar {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BarRegistrar for FakeBarRegistrar {
    fn register_bar(&mut self, bar_no: u8, size: u64) -> Box<dyn MmioRegion> {
        self.registered.push((bar_no, size));
        Box::new(FakeBarRegion { size })
    }
}

/// Records the four PCI identity fields the bridge pulls from `HDR`.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakePciIdentity {
    pub vendor_id: u16,
    pub device_id: u16,
    pub revision: u8,
    pub subclass: u8,
}

impl PciIdentity for FakePciIdentity {
    fn set_vendor_id(&mut self, vendor_id: u16) {
        self.vendor_id = vendor_id;
    }

    fn set_device_id(&mut self, device_id: u16) {
        self.device_id = device_id;
    }

    fn set_revision(&mut self, revision: u8) {
        self.revision = revision;
    }

    fn set_subclass(&mut self, subclass: u8) {
        self.subclass = subclass;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_dma_captures_writes() {
        let dma = RecordingDma::new();
        dma.dma_write(0x9000_0010, &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
        assert_eq!(
            dma.last_write(),
            Some((0x9000_0010, vec![0xDE, 0xAD, 0xBE, 0xEF]))
        );
    }

    #[test]
    fn recording_dma_can_fail_once() {
        let dma = RecordingDma::new();
        dma.fail_next_write();
        assert!(dma.dma_write(0, &[1]).is_err());
        assert!(dma.dma_write(0, &[1]).is_ok());
        assert_eq!(dma.writes().len(), 1);
    }

    #[test]
    fn msi_log_counts_vectors() {
        let msi = MsiLog::new();
        msi.notify(0);
        msi.notify(0);
        msi.notify(1);
        assert_eq!(msi.count(0), 2);
        assert_eq!(msi.count(1), 1);
    }

    #[test]
    fn deterministic_rng_is_repeatable() {
        let rng_a = DeterministicRng::new(42);
        let rng_b = DeterministicRng::new(42);
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        rng_a.fill_bytes(&mut a);
        rng_b.fill_bytes(&mut b);
        assert_eq!(a, b);
    }
}
