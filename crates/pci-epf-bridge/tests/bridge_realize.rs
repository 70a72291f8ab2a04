//! Realize-sequence scenarios from SPEC_FULL.md §8: identity/BAR pull
//! against a real `PciEpcDevice`, and version-mismatch fatality.

use epc_host::fake::{DeterministicRng, FakeBarRegistrar, FakePciIdentity, MsiLog, RecordingDma};
use pci_epc::{EpcConfig, PciEpcDevice};
use pci_epf_bridge::{BridgeConfig, BridgeError, PciEpfBridgeDevice};
use std::io::{Read, Write};
use std::os::unix::net::UnixListener;
use std::sync::Arc;
use std::time::Duration;

fn start_epc(socket_path: &std::path::Path) -> (PciEpcDevice, Arc<RecordingDma>) {
    let dma = Arc::new(RecordingDma::new());
    let mut identity = FakePciIdentity::default();
    let config = EpcConfig::default().with_socket_path(socket_path);
    let device = PciEpcDevice::realize(config, dma.clone(), &mut identity);
    device.ctrl_write(0, 1, 1);
    std::thread::sleep(Duration::from_millis(10));
    (device, dma)
}

#[test]
fn realize_pulls_identity_and_registers_every_enabled_bar() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("epc.sock");
    let (epc, _epc_dma) = start_epc(&socket_path);

    // Guest-populated identity: vendor 0x104c, device 0xb500, revision 0,
    // subclass 0 (PCI_CLASS_OTHERS).
    epc.pci_cfg_write(0, 4, 0xb500_104c);
    epc.pci_cfg_write(8, 4, 0);

    // bar_mask = 0b0000_0101: BAR0 size 0x100, BAR2 size 0x1000.
    epc.bar_cfg_write(0x00, 1, 0b0000_0101);
    epc.bar_cfg_write(0x01, 1, 0);
    epc.bar_cfg_write(0x0c, 8, 0x100);
    epc.bar_cfg_write(0x01, 1, 2);
    epc.bar_cfg_write(0x0c, 8, 0x1000);

    let mut registrar = FakeBarRegistrar::new();
    let mut identity = FakePciIdentity::default();
    let dma = Arc::new(RecordingDma::new());
    let msi = Arc::new(MsiLog::new());
    let rng = Arc::new(DeterministicRng::new(1));

    let bridge = PciEpfBridgeDevice::realize(
        BridgeConfig::default().with_socket_path(&socket_path),
        &mut registrar,
        &mut identity,
        dma,
        msi,
        rng,
    )
    .expect("realize succeeds");

    assert_eq!(identity.vendor_id, 0x104c);
    assert_eq!(identity.device_id, 0xb500);
    assert_eq!(identity.revision, 0);
    assert_eq!(registrar.registered, vec![(0, 0x100), (2, 0x1000)]);
    assert_eq!(bridge.bar0_size(), Some(0x100));

    epc.stop();
}

#[test]
fn version_mismatch_aborts_realize_without_registering_bars() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("epc.sock");

    let listener = UnixListener::bind(&socket_path).unwrap();
    let server = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut tag = [0u8; 4];
        stream.read_exact(&mut tag).unwrap();
        // A server of a different protocol version.
        stream.write_all(&[0, 0, 0, 0]).unwrap();
    });

    let mut registrar = FakeBarRegistrar::new();
    let mut identity = FakePciIdentity::default();
    let dma = Arc::new(RecordingDma::new());
    let msi = Arc::new(MsiLog::new());
    let rng = Arc::new(DeterministicRng::new(1));

    let result = PciEpfBridgeDevice::realize(
        BridgeConfig::default().with_socket_path(&socket_path),
        &mut registrar,
        &mut identity,
        dma,
        msi,
        rng,
    );

    assert!(matches!(result, Err(BridgeError::VersionMismatch { .. })));
    assert!(registrar.registered.is_empty());

    server.join().unwrap();
}

#[test]
fn bar0_write_outside_endpoint_test_offsets_forwards_as_access_bar() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("epc.sock");
    let (epc, epc_dma) = start_epc(&socket_path);

    epc.bar_cfg_write(0x00, 1, 0b0000_0001);
    epc.bar_cfg_write(0x01, 1, 0);
    epc.bar_cfg_write(0x04, 8, 0x9000_0000);

    let mut registrar = FakeBarRegistrar::new();
    let mut identity = FakePciIdentity::default();
    let bridge_dma = Arc::new(RecordingDma::new());
    let msi = Arc::new(MsiLog::new());
    let rng = Arc::new(DeterministicRng::new(1));

    let bridge = PciEpfBridgeDevice::realize(
        BridgeConfig::default().with_socket_path(&socket_path),
        &mut registrar,
        &mut identity,
        bridge_dma,
        msi,
        rng,
    )
    .expect("realize succeeds");

    bridge.bar_write(0, 0x10, 4, 0xEFBEADDE);
    std::thread::sleep(Duration::from_millis(20));

    assert_eq!(
        epc_dma.last_write(),
        Some((0x9000_0010, vec![0xDE, 0xAD, 0xBE, 0xEF]))
    );

    epc.stop();
}
