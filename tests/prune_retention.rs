//! Retention and locking scenarios against real directories.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cache_warden::lock::{force_unlock, with_lock, LockWait};
use cache_warden::prune::{EntryKind, LocalStore, PrunePolicy, Pruner};
use cache_warden::retention::RetentionWindow;
use chrono::{DateTime, Duration as Age, Utc};
use tempfile::TempDir;

fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-03-15T08:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

// === Retention ===

#[test]
fn test_nothing_within_window_is_removed() {
    let temp_dir = TempDir::new().unwrap();
    let store = LocalStore::at(temp_dir.path(), now());
    for days in 0..14 {
        store
            .put(&format!("entry-{:02}", days), EntryKind::Artifact, now() - Age::days(days))
            .unwrap();
    }

    let report = Pruner::new(PrunePolicy::new(RetentionWindow::weeks(2)))
        .prune(&store)
        .unwrap();

    assert!(report.removed().is_empty());
    assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 14);
}

#[test]
fn test_day_window_prunes_more_than_week_window() {
    let temp_dir = TempDir::new().unwrap();
    let store = LocalStore::at(temp_dir.path(), now());
    store.put("old", EntryKind::Artifact, now() - Age::days(20)).unwrap();
    store.put("recent", EntryKind::Artifact, now() - Age::days(10)).unwrap();

    let weeks = Pruner::new(PrunePolicy::new(RetentionWindow::weeks(2)).with_dry_run())
        .prune(&store)
        .unwrap();
    let days = Pruner::new(PrunePolicy::new(RetentionWindow::days(7)).with_dry_run())
        .prune(&store)
        .unwrap();

    assert_eq!(weeks.removed(), vec!["old"]);
    assert_eq!(days.removed(), vec!["old", "recent"]);
}

#[test]
fn test_recipe_outlives_its_binaries() {
    let temp_dir = TempDir::new().unwrap();
    let pruner = Pruner::new(PrunePolicy::new(RetentionWindow::weeks(2)));

    let store = LocalStore::at(temp_dir.path(), now());
    store.put("fmt", EntryKind::Record, now() - Age::weeks(5)).unwrap();
    store.put("fmt/release", EntryKind::Artifact, now() - Age::weeks(3)).unwrap();
    store.put("fmt/debug", EntryKind::Artifact, now() - Age::weeks(1)).unwrap();

    let first = pruner.prune(&store).unwrap();
    assert_eq!(first.removed(), vec!["fmt/release"]);
    assert!(temp_dir.path().join("fmt/debug").exists());

    let later = LocalStore::at(temp_dir.path(), now() + Age::weeks(1));
    let second = pruner.prune(&later).unwrap();
    assert_eq!(second.removed(), vec!["fmt/debug", "fmt"]);
    assert!(!temp_dir.path().join("fmt").exists());
}

#[test]
fn test_dry_run_twice_changes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let store = LocalStore::at(temp_dir.path(), now());
    store.put("zlib", EntryKind::Record, now() - Age::weeks(4)).unwrap();
    store.put("zlib/shared", EntryKind::Artifact, now() - Age::weeks(4)).unwrap();
    fs::write(temp_dir.path().join("zlib/shared/libz.so"), vec![0u8; 128]).unwrap();

    let pruner = Pruner::new(PrunePolicy::default().with_dry_run());
    let first = pruner.prune(&store).unwrap();
    let second = pruner.prune(&store).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.removed(), vec!["zlib/shared", "zlib"]);
    assert!(temp_dir.path().join("zlib/shared/libz.so").exists());

    let real = Pruner::new(PrunePolicy::default()).prune(&store).unwrap();

    assert_eq!(real.removed(), first.removed());
    assert_eq!(real.bytes_reclaimed(), first.bytes_reclaimed());
    assert!(!temp_dir.path().join("zlib").exists());
}

// === Locking ===

#[test]
fn test_concurrent_prunes_are_serialized() {
    let temp_dir = TempDir::new().unwrap();
    let lock_path = temp_dir.path().join("prune.lock");
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let lock_path = lock_path.clone();
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            thread::spawn(move || {
                with_lock(&lock_path, LockWait::Forever, || {
                    let now_inside = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now_inside, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
                .unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
}

#[test]
fn test_force_unlock_after_prune() {
    let temp_dir = TempDir::new().unwrap();
    let lock_path = temp_dir.path().join("nested/prune.lock");
    let store = LocalStore::at(&temp_dir.path().join("store"), now());

    Pruner::new(PrunePolicy::default())
        .prune_locked(&store, &lock_path, LockWait::Forever)
        .unwrap();

    assert!(lock_path.exists());
    assert!(force_unlock(&lock_path).unwrap());
    assert!(!force_unlock(&lock_path).unwrap());
}
