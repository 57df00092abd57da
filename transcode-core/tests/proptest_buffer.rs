//! Property-based tests for buffer reference counting and copy-on-write.

use proptest::prelude::*;
use transcode_core::{Buffer, CodecId, PixelFormat, VideoFormat};

#[derive(Debug, Clone)]
enum Op {
    Share(usize),
    Release(usize),
    Write(usize, u8),
    Clone(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..8).prop_map(Op::Share),
        (0usize..8).prop_map(Op::Release),
        (0usize..8, any::<u8>()).prop_map(|(i, v)| Op::Write(i, v)),
        (0usize..8).prop_map(Op::Clone),
    ]
}

// =============================================================================
// Reference counting
// =============================================================================

proptest! {
    /// Handles sharing storage always agree on the count, and a write through
    /// one handle is never visible through another.
    #[test]
    fn refcount_and_cow_hold(payload in prop::collection::vec(any::<u8>(), 1..64),
                             ops in prop::collection::vec(op(), 1..40)) {
        let mut handles = vec![Buffer::from_packet(payload.clone(), CodecId::H264)];
        // expected content per handle
        let mut expected = vec![payload.clone()];

        for op in ops {
            let len = handles.len();
            match op {
                Op::Share(i) if len > 0 => {
                    let i = i % len;
                    let shared = handles[i].share().unwrap();
                    expected.push(expected[i].clone());
                    handles.push(shared);
                }
                Op::Release(i) if len > 1 => {
                    let i = i % len;
                    handles.remove(i);
                    expected.remove(i);
                }
                Op::Write(i, v) if len > 0 => {
                    let i = i % len;
                    handles[i].make_writable().unwrap();
                    prop_assert!(handles[i].is_writable());
                    handles[i].data_mut().unwrap()[0] = v;
                    expected[i][0] = v;
                }
                Op::Clone(i) if len > 0 => {
                    let i = i % len;
                    let copy = handles[i].try_clone().unwrap();
                    prop_assert!(!copy.shares_storage_with(&handles[i]));
                    prop_assert_eq!(copy.ref_count(), 1);
                    expected.push(expected[i].clone());
                    handles.push(copy);
                }
                _ => {}
            }

            for (i, handle) in handles.iter().enumerate() {
                prop_assert_eq!(handle.data(), expected[i].as_slice());
                let sharing = handles.iter().filter(|h| h.shares_storage_with(handle)).count();
                prop_assert_eq!(handle.ref_count(), sharing);
            }
        }
    }

    /// make_writable never changes content, only ownership.
    #[test]
    fn make_writable_preserves_planes(width in 1u32..24, height in 1u32..24, fill in any::<u8>()) {
        let mut a = Buffer::new();
        a.allocate(VideoFormat::new(width, height, PixelFormat::Yuv420p)).unwrap();
        for plane in a.planes_mut().unwrap() {
            plane.data_mut().fill(fill);
        }
        a.pts = 7;
        let mut b = a.share().unwrap();
        prop_assert_eq!(a.ref_count(), 2);
        b.make_writable().unwrap();
        prop_assert_eq!(a.ref_count(), 1);
        prop_assert_eq!(b.ref_count(), 1);
        prop_assert_eq!(b.pts, 7);
        for p in 0..3 {
            prop_assert_eq!(a.plane(p), b.plane(p));
            prop_assert_eq!(a.stride(p), b.stride(p));
        }
    }
}

// =============================================================================
// Move semantics
// =============================================================================

#[test]
fn test_move_ref_transfers_without_count_change() {
    let mut src = Buffer::from_packet(vec![1, 2, 3], CodecId::Aac);
    src.pts = 10;
    let keep = src.share().unwrap();
    let mut dst = Buffer::new();
    dst.move_ref(&mut src);
    assert!(!src.has_storage());
    assert_eq!(dst.ref_count(), 2);
    assert_eq!(dst.pts, 10);
    assert!(dst.shares_storage_with(&keep));
}

#[test]
fn test_unreference_resets_metadata() {
    let mut buffer = Buffer::from_packet(vec![1], CodecId::Aac);
    buffer.pts = 3;
    buffer.set_keyframe(true);
    buffer.unreference();
    assert!(!buffer.has_storage());
    assert!(!buffer.is_keyframe());
    assert_eq!(buffer.pts, transcode_core::Timestamp::NONE);
}
