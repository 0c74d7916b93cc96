use xhci_bar::regs::{doorbell, op, runtime};
use xhci_bar::snapshot::{SnapshotReader, SnapshotWriter};
use xhci_bar::{IoSnapshot, PortId, SnapshotError, SnapshotVersion, TickInputs, XhciBar};

mod util;

use util::{read, write};

fn busy_bar() -> XhciBar {
    let mut bar = util::fast_bar(16);
    write(&mut bar, op::USBCMD, op::USBCMD_RUN_STOP | op::USBCMD_INTE);
    write(&mut bar, op::CRCR_LO, 0x4000 | op::CRCR_RCS);
    write(&mut bar, doorbell::DB0, 0);
    write(&mut bar, op::DCBAAP_LO, 0x8000);
    write(&mut bar, op::CONFIG, 1);
    write(&mut bar, runtime::IMAN, runtime::IMAN_IE);
    write(&mut bar, runtime::ERSTBA_LO, 0xa000);
    write(&mut bar, 0x440, 0x0000_0200);
    bar.attach_port(PortId::Secondary, 3);
    bar.raise_event();
    util::idle(&mut bar, 37);
    bar
}

#[test]
fn restore_reproduces_register_state_and_timing() {
    let mut bar = busy_bar();
    // Leave a read in flight across the snapshot.
    bar.tick(TickInputs::read(0xfeedu64, runtime::MFINDEX));
    let bytes = bar.save_state();

    let mut restored = util::fast_bar(16);
    restored.load_state(&bytes).unwrap();
    assert_eq!(restored.bank(), bar.bank());
    assert_eq!(restored.ticks(), bar.ticks());
    assert!(!restored.pipeline_idle());

    for _ in 0..2 {
        assert_eq!(
            restored.tick(TickInputs::idle()),
            bar.tick(TickInputs::idle())
        );
    }
    for offset in [op::USBCMD, op::USBSTS, op::CRCR_LO, 0x430, runtime::MFINDEX, runtime::ERDP_LO] {
        assert_eq!(read(&mut restored, offset), read(&mut bar, offset), "offset {offset:#x}");
    }
}

#[test]
fn save_is_deterministic() {
    let a = busy_bar().save_state();
    let b = busy_bar().save_state();
    assert_eq!(a, b);
}

#[test]
fn missing_fields_keep_reset_values() {
    let mut w = SnapshotWriter::new(XhciBar::DEVICE_ID, XhciBar::DEVICE_VERSION);
    w.field_u32(6, 0x55);
    let bytes = w.finish();

    let mut bar = busy_bar();
    bar.load_state(&bytes).unwrap();
    assert_eq!(bar.bank().operational().config, 0x55);
    assert!(!bar.bank().command_ring_running());
    assert_eq!(bar.bank().microframe_timer().mfindex(), 0);
    assert!(bar.pipeline_idle());
}

#[test]
fn unknown_fields_are_skipped() {
    let bar = busy_bar();
    let mut bytes = bar.save_state();
    bytes.extend_from_slice(&0x7fffu16.to_le_bytes());
    bytes.extend_from_slice(&3u32.to_le_bytes());
    bytes.extend_from_slice(&[1, 2, 3]);

    let mut restored = util::fast_bar(16);
    restored.load_state(&bytes).unwrap();
    assert_eq!(restored.bank(), bar.bank());
}

#[test]
fn rejects_other_devices_and_major_versions() {
    let mut bar = util::default_bar();

    let foreign = SnapshotWriter::new(*b"UHCI", SnapshotVersion::new(1, 0)).finish();
    assert!(matches!(
        bar.load_state(&foreign),
        Err(SnapshotError::DeviceIdMismatch { .. })
    ));

    let future = SnapshotWriter::new(XhciBar::DEVICE_ID, SnapshotVersion::new(2, 0)).finish();
    assert_eq!(
        bar.load_state(&future),
        Err(SnapshotError::UnsupportedDeviceMajorVersion {
            expected: 1,
            found: 2
        })
    );

    let newer_minor = SnapshotWriter::new(XhciBar::DEVICE_ID, SnapshotVersion::new(1, 9)).finish();
    bar.load_state(&newer_minor).unwrap();
}

#[test]
fn malformed_field_leaves_state_untouched() {
    let mut bar = busy_bar();
    let before = bar.bank().clone();

    let mut w = SnapshotWriter::new(XhciBar::DEVICE_ID, XhciBar::DEVICE_VERSION);
    w.field_u32(6, 0x55);
    w.field_bytes(8, vec![0; 3]);
    let err = bar.load_state(&w.finish()).unwrap_err();
    assert_eq!(err, SnapshotError::UnexpectedEof);
    assert_eq!(bar.bank(), &before);

    let mut w = SnapshotWriter::new(XhciBar::DEVICE_ID, XhciBar::DEVICE_VERSION);
    w.field_bytes(13, vec![7]);
    assert_eq!(
        bar.load_state(&w.finish()),
        Err(SnapshotError::InvalidFieldEncoding("bool"))
    );
}

#[test]
fn header_carries_device_version() {
    let bytes = util::default_bar().save_state();
    let reader = SnapshotReader::parse(&bytes, *b"XBAR").unwrap();
    assert_eq!(reader.device_version(), XhciBar::DEVICE_VERSION);
    reader.ensure_device_major(1).unwrap();
}
