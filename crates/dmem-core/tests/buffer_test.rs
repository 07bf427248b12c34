//! Buffer ownership, copy and sharing tests against the host context

use dmem_core::{DeviceBuffer, Error, HostContext, ShareableHandle, SHARED_HANDLE_SIZE};
use std::sync::Arc;

fn unique_prefix() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};
    static SEQ: AtomicU32 = AtomicU32::new(0);
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!(
        "dmem_test_{}_{}_{}",
        std::process::id(),
        ts,
        SEQ.fetch_add(1, Ordering::SeqCst)
    )
}

fn ctx() -> Arc<HostContext> {
    Arc::new(HostContext::with_prefix(&unique_prefix()))
}

fn pattern(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i % 251) as u8).collect()
}

#[test]
fn test_copy_round_trip() {
    let ctx = ctx();
    let buf = DeviceBuffer::allocate(ctx, 256).unwrap();
    let data = pattern(256);

    buf.copy_from_host(0, &data).unwrap();

    let mut out = vec![0u8; 256];
    buf.copy_to_host(0, &mut out).unwrap();
    assert_eq!(out, data);
}

#[test]
fn test_copy_at_offset() {
    let ctx = ctx();
    let buf = DeviceBuffer::allocate(ctx, 128).unwrap();
    let data = pattern(32);

    buf.copy_from_host(64, &data).unwrap();

    let mut out = vec![0u8; 32];
    buf.copy_to_host(64, &mut out).unwrap();
    assert_eq!(out, data);
}

#[test]
#[should_panic(expected = "copy would overflow device buffer")]
fn test_copy_from_host_overflow_panics() {
    let ctx = ctx();
    let buf = DeviceBuffer::allocate(ctx, 16).unwrap();
    let _ = buf.copy_from_host(8, &pattern(16));
}

#[test]
fn test_slice_does_not_own() {
    let ctx = ctx();
    let buf = DeviceBuffer::allocate(ctx, 100).unwrap();
    let view = buf.slice(10, 20).unwrap();

    assert!(buf.owns_memory());
    assert!(!view.owns_memory());
    assert_eq!(view.len(), 20);
    assert_eq!(view.address(), buf.address() + 10);
}

#[test]
fn test_slice_keeps_parent_alive() {
    let ctx = ctx();
    let data = pattern(100);
    let buf = DeviceBuffer::allocate(ctx, 100).unwrap();
    buf.copy_from_host(0, &data).unwrap();

    let view = buf.slice(40, 30).unwrap();
    drop(buf);

    // The parent's region must still be mapped while the view lives;
    // the host context would fail the copy if it had been freed
    let mut out = vec![0u8; 30];
    view.copy_to_host(0, &mut out).unwrap();
    assert_eq!(out, &data[40..70]);
}

#[test]
fn test_slice_out_of_bounds() {
    let ctx = ctx();
    let buf = DeviceBuffer::allocate(ctx, 64).unwrap();
    assert!(matches!(
        buf.slice(32, 64),
        Err(Error::OutOfBounds { .. })
    ));
}

#[test]
fn test_export_is_single_shot() {
    let ctx = ctx();
    let buf = DeviceBuffer::allocate(ctx, 64).unwrap();

    assert!(buf.owns_memory());
    let _handle = buf.export_for_sharing().unwrap();
    assert!(!buf.owns_memory());
    assert!(buf.is_shared());

    assert!(matches!(
        buf.export_for_sharing(),
        Err(Error::AlreadyExported)
    ));
}

#[test]
fn test_slice_cannot_be_exported() {
    let ctx = ctx();
    let buf = DeviceBuffer::allocate(ctx, 64).unwrap();
    let view = buf.slice(0, 32).unwrap();
    assert!(matches!(
        view.export_for_sharing(),
        Err(Error::SliceNotExportable)
    ));
}

#[test]
fn test_handle_serialize_round_trip() {
    let mut payload = [0u8; SHARED_HANDLE_SIZE];
    for (i, b) in payload.iter_mut().enumerate() {
        *b = i as u8;
    }
    let handle = ShareableHandle::from_bytes(&payload).unwrap();

    let wire = handle.serialize();
    assert_eq!(wire.len(), SHARED_HANDLE_SIZE);

    let back = ShareableHandle::from_bytes(&wire).unwrap();
    assert_eq!(back, handle);
}

#[test]
fn test_handle_rejects_wrong_size() {
    assert!(matches!(
        ShareableHandle::from_bytes(&[0u8; 16]),
        Err(Error::HandleSize {
            expected: SHARED_HANDLE_SIZE,
            actual: 16
        })
    ));
}

#[test]
fn test_export_import_shares_payload() {
    let ctx = ctx();
    let data = pattern(512);
    let buf = DeviceBuffer::allocate(ctx.clone(), 512).unwrap();
    buf.copy_from_host(0, &data).unwrap();

    let handle = buf.export_for_sharing().unwrap();
    let wire = handle.serialize();

    // Import through a fresh context, as a receiving process would
    let importer = ctx;
    let received = ShareableHandle::from_bytes(&wire).unwrap();
    let imported = DeviceBuffer::from_handle(importer, &received, 512).unwrap();
    assert!(imported.is_shared());

    let mut out = vec![0u8; 512];
    imported.copy_to_host(0, &mut out).unwrap();
    assert_eq!(out, data);

    // Writes through the original buffer are visible through the import:
    // the handle shares the region, it does not copy it
    let update = pattern(16);
    buf.copy_from_host(100, &update).unwrap();
    let mut out = vec![0u8; 16];
    imported.copy_to_host(100, &mut out).unwrap();
    assert_eq!(out, update);
}

#[test]
fn test_pinned_host_buffer_round_trip() {
    let ctx = ctx();
    let mut pinned = dmem_core::PinnedHostBuffer::new(ctx, 64).unwrap();
    assert_eq!(pinned.size(), 64);

    pinned.as_mut_slice().copy_from_slice(&pattern(64));
    assert_eq!(pinned.as_slice(), &pattern(64)[..]);
}
