//! Integration tests for attachment bags
//!
//! These tests validate the attachment guarantees under concurrency:
//! - At-most-once delivery per set
//! - Populated count never exceeds the key count and tracks state
//! - Refcount transitions and registry leak reports

mod common;

use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use vpu_runtime::attachment::{
    AttachmentError, AttachmentKey, AttachmentRegistry, Release, SlotState,
};
use vpu_runtime::media::{FrameDescriptor, FrameFormat};

#[test]
fn test_racing_sets_deliver_once() {
    let registry = AttachmentRegistry::new();
    let bag = registry.acquire(Some("scenario"), None).unwrap();

    let frame_a = FrameDescriptor::new(64, 64, FrameFormat::Yuv420Sp).with_pts(1);
    let frame_b = FrameDescriptor::new(64, 64, FrameFormat::Yuv420Sp).with_pts(2);

    bag.set(AttachmentKey::OutputFrame, frame_a).unwrap();
    assert_eq!(bag.size().unwrap(), 1);

    let racer = bag.clone();
    thread::spawn(move || racer.set(AttachmentKey::OutputFrame, frame_b).unwrap())
        .join()
        .unwrap();
    assert_eq!(bag.size().unwrap(), 1);

    let got = bag.get::<FrameDescriptor>(AttachmentKey::OutputFrame).unwrap();
    assert!(got == frame_a || got == frame_b);
    assert_eq!(
        bag.get::<FrameDescriptor>(AttachmentKey::OutputFrame),
        Err(AttachmentError::NotReady(AttachmentKey::OutputFrame))
    );
    assert_eq!(bag.size().unwrap(), 0);
    bag.release();
}

#[test]
fn test_concurrent_getters_at_most_once() {
    const GETTERS: usize = 8;
    const ROUNDS: usize = 200;

    let registry = AttachmentRegistry::new();
    let bag = registry.acquire(Some("race"), None).unwrap();

    for round in 0..ROUNDS {
        bag.set(AttachmentKey::Pts, round as i64).unwrap();

        let barrier = Arc::new(Barrier::new(GETTERS));
        let winners = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..GETTERS)
            .map(|_| {
                let bag = bag.clone();
                let barrier = barrier.clone();
                let winners = winners.clone();
                thread::spawn(move || {
                    barrier.wait();
                    if let Ok(value) = bag.get::<i64>(AttachmentKey::Pts) {
                        assert_eq!(value, round as i64);
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1, "round {}", round);
        assert_eq!(bag.size().unwrap(), 0);
    }
    bag.release();
}

#[test]
fn test_type_mismatch_leaves_state_untouched() {
    let registry = AttachmentRegistry::new();
    let bag = registry.acquire(None, None).unwrap();

    let err = bag.set(AttachmentKey::Pts, 5i32).unwrap_err();
    assert!(matches!(err, AttachmentError::InvalidKey { .. }));
    assert_eq!(bag.state(AttachmentKey::Pts).unwrap(), SlotState::Empty);
    assert_eq!(bag.size().unwrap(), 0);
    bag.release();
}

#[test]
fn test_refcount_lifecycle() {
    let registry = AttachmentRegistry::new();
    let bag = registry.acquire(Some("shared"), Some("test")).unwrap();
    bag.retain().unwrap();
    assert_eq!(bag.refcount(), 2);

    assert_eq!(bag.release(), Release::Retained);
    assert_eq!(registry.live_count(), 1);
    assert_eq!(bag.release(), Release::Freed);
    assert_eq!(registry.live_count(), 0);

    // Excess releases are reported and ignored.
    assert_eq!(bag.release(), Release::Ignored);
    assert_eq!(
        bag.set(AttachmentKey::Pts, 1i64),
        Err(AttachmentError::BagReleased(bag.id()))
    );
    assert!(registry.teardown().is_clean());
}

#[test]
fn test_teardown_reports_leaks() {
    let registry = AttachmentRegistry::new();
    let kept = registry.acquire(Some("leaky"), Some("decoder")).unwrap();
    kept.set(AttachmentKey::ErrorFlags, 3i32).unwrap();
    let freed = registry.acquire(Some("tidy"), None).unwrap();
    freed.release();

    let report = registry.teardown();
    assert_eq!(report.leaked.len(), 1);
    assert_eq!(report.leaked[0].id, kept.id());
    assert_eq!(report.leaked[0].tag, Some("leaky"));
    assert_eq!(report.leaked[0].caller, Some("decoder"));
    assert_eq!(report.leaked[0].populated, 1);

    assert_eq!(
        registry.acquire(None, None).unwrap_err(),
        AttachmentError::RegistryFinished
    );
    assert_eq!(kept.release(), Release::Ignored);
}

#[derive(Debug, Clone)]
enum Op {
    Set(usize),
    Get(usize),
    Clear,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let keys = AttachmentKey::COUNT;
    prop_oneof![
        4 => (0..keys).prop_map(Op::Set),
        4 => (0..keys).prop_map(Op::Get),
        1 => Just(Op::Clear),
    ]
}

/// Set a default value of whatever kind `key` declares.
fn set_default(bag: &vpu_runtime::AttachmentBag, key: AttachmentKey) {
    use vpu_runtime::attachment::ValueKind;
    use vpu_runtime::media::{HalStatus, MediaBuffer, Packet, RefList};
    use vpu_runtime::SlotIndex;

    let result = match key.kind() {
        ValueKind::S32 => bag.set(key, 1i32),
        ValueKind::S64 => bag.set(key, 1i64),
        ValueKind::Frame => bag.set(key, FrameDescriptor::default()),
        ValueKind::Packet => bag.set(key, Packet::eos()),
        ValueKind::Buffer => bag.set(key, MediaBuffer::new(1, 16)),
        ValueKind::Slot => bag.set(key, SlotIndex(0)),
        ValueKind::Refs => bag.set(key, RefList::new()),
        ValueKind::Status => bag.set(key, HalStatus::DONE),
    };
    result.unwrap();
}

fn take_any(bag: &vpu_runtime::AttachmentBag, key: AttachmentKey) -> bool {
    use vpu_runtime::attachment::ValueKind;
    use vpu_runtime::media::{HalStatus, MediaBuffer, Packet, RefList};
    use vpu_runtime::SlotIndex;

    match key.kind() {
        ValueKind::S32 => bag.get::<i32>(key).is_ok(),
        ValueKind::S64 => bag.get::<i64>(key).is_ok(),
        ValueKind::Frame => bag.get::<FrameDescriptor>(key).is_ok(),
        ValueKind::Packet => bag.get::<Packet>(key).is_ok(),
        ValueKind::Buffer => bag.get::<MediaBuffer>(key).is_ok(),
        ValueKind::Slot => bag.get::<SlotIndex>(key).is_ok(),
        ValueKind::Refs => bag.get::<RefList>(key).is_ok(),
        ValueKind::Status => bag.get::<HalStatus>(key).is_ok(),
    }
}

proptest! {
    #[test]
    fn prop_size_matches_ready_keys(ops in prop::collection::vec(op_strategy(), 1..200)) {
        let registry = AttachmentRegistry::new();
        let bag = registry.acquire(Some("prop"), None).unwrap();
        let mut model = vec![false; AttachmentKey::COUNT];

        for op in ops {
            match op {
                Op::Set(i) => {
                    set_default(&bag, AttachmentKey::ALL[i]);
                    model[i] = true;
                }
                Op::Get(i) => {
                    let got = take_any(&bag, AttachmentKey::ALL[i]);
                    prop_assert_eq!(got, model[i]);
                    model[i] = false;
                }
                Op::Clear => {
                    bag.clear().unwrap();
                    model.iter_mut().for_each(|ready| *ready = false);
                }
            }

            let expected = model.iter().filter(|ready| **ready).count();
            let size = bag.size().unwrap();
            prop_assert_eq!(size, expected);
            prop_assert!(size <= AttachmentKey::COUNT);
        }
        bag.release();
        prop_assert!(registry.teardown().is_clean());
    }

    #[test]
    fn prop_refcount_never_negative(retains in 0usize..8, extra in 0usize..4) {
        let registry = AttachmentRegistry::new();
        let bag = registry.acquire(None, None).unwrap();
        for _ in 0..retains {
            bag.retain().unwrap();
        }

        let mut freed = 0;
        for _ in 0..(retains + 1 + extra) {
            if bag.release() == Release::Freed {
                freed += 1;
            }
            prop_assert!(bag.refcount() >= 0);
        }
        prop_assert_eq!(freed, 1);
        prop_assert_eq!(registry.live_count(), 0);
    }
}
