// tests/coordinator.rs

//! Lock coordination tests driving the core types directly.

use lockmgr::{ErrorKind, FileSerializer, LockCoordinator};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn wait_for_waiters(coordinator: &LockCoordinator, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while coordinator.waiting() < count {
        assert!(Instant::now() < deadline, "waiters never parked");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_holder_then_waiter_append_order() {
    let temp_dir = TempDir::new().unwrap();
    let files = FileSerializer::new(temp_dir.path());
    files.create_all().unwrap();
    let coordinator = LockCoordinator::new();

    coordinator.acquire(1);

    std::thread::scope(|s| {
        let waiter = s.spawn(|| {
            coordinator.acquire(2);
            assert!(coordinator.is_held_by(2));
            files.append("file_0", b"B").unwrap();
            coordinator.release(2).unwrap();
        });

        wait_for_waiters(&coordinator, 1);
        files.append("file_0", b"A").unwrap();
        coordinator.release(1).unwrap();
        waiter.join().unwrap();
    });

    assert_eq!(std::fs::read(temp_dir.path().join("file_0")).unwrap(), b"AB");
    assert_eq!(coordinator.holder(), None);
}

#[test]
fn test_no_lost_wakeup_under_churn() {
    // Acquire/release as fast as possible; a lost wake-up would hang here
    let coordinator = Arc::new(LockCoordinator::new());
    let grants = Arc::new(AtomicUsize::new(0));
    let threads = 8;
    let iterations = 500;

    let handles: Vec<_> = (0..threads)
        .map(|id| {
            let coordinator = Arc::clone(&coordinator);
            let grants = Arc::clone(&grants);
            std::thread::spawn(move || {
                for _ in 0..iterations {
                    coordinator.acquire(id);
                    grants.fetch_add(1, Ordering::SeqCst);
                    coordinator.release(id).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(grants.load(Ordering::SeqCst), threads as usize * iterations);
    assert_eq!(coordinator.holder(), None);
    assert_eq!(coordinator.waiting(), 0);
}

#[test]
fn test_rejected_release_does_not_wake_waiters() {
    let coordinator = LockCoordinator::new();
    coordinator.acquire(1);

    std::thread::scope(|s| {
        let waiter = s.spawn(|| coordinator.acquire(2));
        wait_for_waiters(&coordinator, 1);

        let err = coordinator.release(3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(coordinator.holder(), Some(1));
        assert_eq!(coordinator.waiting(), 1);

        coordinator.release(1).unwrap();
        waiter.join().unwrap();
    });

    assert_eq!(coordinator.holder(), Some(2));
}
