//! Shared-memory protocol tests
//!
//! These run against the real POSIX shared-memory namespace, each with its own
//! segment prefix, with threads standing in for cooperating processes.

use std::os::unix::fs::MetadataExt;
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::shm_open;
use nix::sys::stat::Mode as FileMode;
use serial_test::serial;
use uuid::Uuid;

use portamon::shm::{Access, SegmentKind, SegmentName, acquire_or_create, unlink};
use portamon::{AxisBounds, CrossInstanceAxisSync, Instance, Lifecycle, Mode, Quantity, ShmError};

const POLL: Duration = Duration::from_millis(10);

fn unique_prefix() -> String {
    format!("/pmtest_{}", Uuid::now_v7().simple())
}

fn data(min: f64, max: f64) -> AxisBounds {
    AxisBounds {
        min,
        max,
        is_default: false,
    }
}

fn default_count() -> AxisBounds {
    let (min, max) = Quantity::Count.default_bounds();
    AxisBounds::compute(f64::INFINITY, f64::NEG_INFINITY, min, max)
}

fn assert_unlinked(prefix: &str, total: usize) {
    for index in 0..total {
        for kind in [SegmentKind::Semaphore, SegmentKind::Data] {
            let name = SegmentName::for_instance(prefix, kind, index).unwrap();
            let result = shm_open(name.as_str(), OFlag::O_RDONLY, FileMode::empty());
            assert_eq!(result.err(), Some(Errno::ENOENT), "{name} still exists");
        }
    }
}

#[test]
#[serial]
fn test_single_instance_lifecycle() {
    let prefix = unique_prefix();
    let lifecycle = Lifecycle::new(prefix.clone(), POLL);

    let manager = lifecycle.start(Instance::new(0, 1).unwrap()).unwrap();
    let merged = CrossInstanceAxisSync::synchronize(&manager, Mode::Count, &[(Quantity::Count, data(1.0, 2.0))]).unwrap();
    assert_eq!(merged[0].1, data(1.0, 2.0));
    lifecycle.stop(manager).unwrap();

    assert_unlinked(&prefix, 1);
}

#[test]
#[serial]
fn test_idle_instance_adopts_peer_bounds() {
    let prefix = unique_prefix();
    let step = Arc::new(Barrier::new(2));

    let publisher = {
        let lifecycle = Lifecycle::new(prefix.clone(), POLL);
        let step = Arc::clone(&step);
        thread::spawn(move || {
            let manager = lifecycle.start(Instance::new(0, 2).unwrap()).unwrap();
            CrossInstanceAxisSync::synchronize(&manager, Mode::Count, &[(Quantity::Count, data(2.0, 6.0))]).unwrap();
            step.wait();
            step.wait();
            lifecycle.stop(manager).unwrap();
        })
    };

    let idle = {
        let lifecycle = Lifecycle::new(prefix.clone(), POLL);
        let step = Arc::clone(&step);
        thread::spawn(move || {
            let manager = lifecycle.start(Instance::new(1, 2).unwrap()).unwrap();
            step.wait();
            let merged =
                CrossInstanceAxisSync::synchronize(&manager, Mode::Count, &[(Quantity::Count, default_count())]).unwrap();
            step.wait();
            lifecycle.stop(manager).unwrap();
            merged
        })
    };

    publisher.join().unwrap();
    let merged = idle.join().unwrap();
    assert_eq!(merged, vec![(Quantity::Count, data(2.0, 6.0))]);
    assert_unlinked(&prefix, 2);
}

#[test]
#[serial]
fn test_init_barrier_waits_for_every_instance() {
    let prefix = unique_prefix();
    let (started_tx, started_rx) = mpsc::channel();

    let first = {
        let lifecycle = Lifecycle::new(prefix.clone(), POLL);
        thread::spawn(move || {
            let manager = lifecycle.start(Instance::new(0, 2).unwrap()).unwrap();
            started_tx.send(()).unwrap();
            lifecycle.stop(manager).unwrap();
        })
    };

    assert!(started_rx.recv_timeout(Duration::from_millis(200)).is_err());

    let lifecycle = Lifecycle::new(prefix.clone(), POLL);
    let manager = lifecycle.start(Instance::new(1, 2).unwrap()).unwrap();
    started_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    lifecycle.stop(manager).unwrap();

    first.join().unwrap();
    assert_unlinked(&prefix, 2);
}

fn assert_linked(prefix: &str, total: usize) {
    for index in 0..total {
        for kind in [SegmentKind::Semaphore, SegmentKind::Data] {
            let name = SegmentName::for_instance(prefix, kind, index).unwrap();
            assert!(
                shm_open(name.as_str(), OFlag::O_RDONLY, FileMode::empty()).is_ok(),
                "{name} removed too early"
            );
        }
    }
}

#[test]
#[serial]
fn test_teardown_barrier_waits_for_every_instance() {
    let prefix = unique_prefix();
    let (started_tx, started_rx) = mpsc::channel();
    let (stopped_tx, stopped_rx) = mpsc::channel();

    let first = {
        let lifecycle = Lifecycle::new(prefix.clone(), POLL);
        thread::spawn(move || {
            let manager = lifecycle.start(Instance::new(0, 2).unwrap()).unwrap();
            started_tx.send(()).unwrap();
            lifecycle.stop(manager).unwrap();
            stopped_tx.send(()).unwrap();
        })
    };

    let lifecycle = Lifecycle::new(prefix.clone(), POLL);
    let manager = lifecycle.start(Instance::new(1, 2).unwrap()).unwrap();
    started_rx.recv_timeout(Duration::from_secs(10)).unwrap();

    assert!(stopped_rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert_linked(&prefix, 2);

    lifecycle.stop(manager).unwrap();
    stopped_rx.recv_timeout(Duration::from_secs(10)).unwrap();

    first.join().unwrap();
    assert_unlinked(&prefix, 2);
}

#[test]
#[serial]
fn test_created_segment_is_private_and_sized() {
    let name = SegmentName::new(format!("{}_seg", unique_prefix())).unwrap();

    let segment = acquire_or_create(&name, 64, Access::ReadWrite, POLL).unwrap();
    let meta = segment.file().metadata().unwrap();
    assert_eq!(meta.len(), 64);
    assert_eq!(meta.mode() & 0o7777, 0o600);
    segment.release().unwrap();

    unlink(&name).unwrap();
    unlink(&name).unwrap();
}

#[test]
#[serial]
fn test_size_mismatch_is_fatal() {
    let name = SegmentName::new(format!("{}_seg", unique_prefix())).unwrap();
    acquire_or_create(&name, 64, Access::ReadWrite, POLL).unwrap().release().unwrap();

    let result = acquire_or_create(&name, 128, Access::ReadOnly, POLL);
    assert!(matches!(result, Err(ShmError::UnexpectedStat { .. })));

    unlink(&name).unwrap();
}

#[test]
#[serial]
fn test_concurrent_creation_agrees_on_one_segment() {
    let name = SegmentName::new(format!("{}_race", unique_prefix())).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let name = name.clone();
            thread::spawn(move || {
                let segment = acquire_or_create(&name, 48, Access::ReadWrite, POLL).unwrap();
                let len = segment.file().metadata().unwrap().len();
                segment.release().unwrap();
                len
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 48);
    }
    unlink(&name).unwrap();
}
