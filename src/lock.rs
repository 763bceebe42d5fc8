//! Inter-process locking for cache directories
//!
//! Only one process may prune a given cache at a time. The lock is an
//! advisory OS lock (`flock` on Unix, `LockFileEx` on Windows) on a lock
//! file next to the cache:
//! - Blocking by default, optional timeout with contention logging
//! - Released when the guard drops, on normal return and on unwinding
//! - The OS drops the lock when the holder dies, but the file stays behind;
//!   [`force_unlock`] removes it from an unconditional post-job step

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use thiserror::Error;

/// Lock result type
pub type LockResult<T> = Result<T, LockError>;

/// Errors from lock operations
#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out after {timeout:?} waiting for lock {path}")]
    Timeout { path: PathBuf, timeout: Duration },

    #[error("I/O error on lock {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LockError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// How long to wait for a contended lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockWait {
    /// Block until the holder releases it; the CI job timeout is the outer bound
    #[default]
    Forever,
    /// Give up with [`LockError::Timeout`] after the duration
    Timeout(Duration),
}

impl LockWait {
    /// `0` means wait forever.
    pub fn from_secs(secs: u64) -> Self {
        if secs == 0 {
            Self::Forever
        } else {
            Self::Timeout(Duration::from_secs(secs))
        }
    }
}

/// Exclusive ownership of a lock file.
///
/// The lock is released when this struct is dropped.
#[derive(Debug)]
pub struct CacheLock {
    lock_path: PathBuf,
    lock_file: File,
}

impl CacheLock {
    const POLL_INTERVAL: Duration = Duration::from_millis(50);
    const CONTENTION_WARNING: Duration = Duration::from_millis(500);

    /// Acquire the lock at `lock_path`.
    ///
    /// Creates parent directories and the lock file if they don't exist.
    pub fn acquire(lock_path: &Path, wait: LockWait) -> LockResult<Self> {
        if let Some(parent) = lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| LockError::io(parent, e))?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|e| LockError::io(lock_path, e))?;

        match wait {
            LockWait::Forever => Self::acquire_blocking(lock_path, file),
            LockWait::Timeout(timeout) => Self::acquire_with_timeout(lock_path, file, timeout),
        }
    }

    fn acquire_blocking(lock_path: &Path, file: File) -> LockResult<Self> {
        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if is_contended(&e) => {
                tracing::warn!(path = %lock_path.display(), "lock contention, waiting...");
                let start = Instant::now();
                file.lock_exclusive()
                    .map_err(|e| LockError::io(lock_path, e))?;
                tracing::info!(
                    path = %lock_path.display(),
                    "lock acquired after {:.1}s contention",
                    start.elapsed().as_secs_f64()
                );
            }
            Err(e) => return Err(LockError::io(lock_path, e)),
        }
        tracing::debug!(path = %lock_path.display(), "lock acquired");

        Ok(Self {
            lock_path: lock_path.to_path_buf(),
            lock_file: file,
        })
    }

    fn acquire_with_timeout(lock_path: &Path, file: File, timeout: Duration) -> LockResult<Self> {
        let start = Instant::now();
        let mut warned = false;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    if warned {
                        tracing::info!(
                            path = %lock_path.display(),
                            "lock acquired after {:.1}s contention",
                            start.elapsed().as_secs_f64()
                        );
                    }
                    return Ok(Self {
                        lock_path: lock_path.to_path_buf(),
                        lock_file: file,
                    });
                }
                Err(e) if is_contended(&e) => {
                    if !warned && start.elapsed() > Self::CONTENTION_WARNING {
                        tracing::warn!(path = %lock_path.display(), "lock contention, waiting...");
                        warned = true;
                    }
                }
                Err(e) => return Err(LockError::io(lock_path, e)),
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path: lock_path.to_path_buf(),
                    timeout,
                });
            }

            std::thread::sleep(Self::POLL_INTERVAL);
        }
    }

    /// Get the lock file path.
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        // Closing the file would release it as well; unlock explicitly so the
        // release is visible before the handle is gone.
        if let Err(e) = self.lock_file.unlock() {
            tracing::warn!(path = %self.lock_path.display(), "failed to release lock: {}", e);
        } else {
            tracing::debug!(path = %self.lock_path.display(), "lock released");
        }
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Run `action` while holding the lock at `lock_path`.
///
/// The lock is released when `action` returns or panics.
pub fn with_lock<T, F>(lock_path: &Path, wait: LockWait, action: F) -> LockResult<T>
where
    F: FnOnce() -> T,
{
    let _guard = CacheLock::acquire(lock_path, wait)?;
    Ok(action())
}

/// Delete the lock file unconditionally.
///
/// Returns `true` if a file was removed; a missing file is not an error.
pub fn force_unlock(lock_path: &Path) -> LockResult<bool> {
    match fs::remove_file(lock_path) {
        Ok(()) => {
            tracing::info!(path = %lock_path.display(), "removed lock file");
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %lock_path.display(), "no lock file to remove");
            Ok(false)
        }
        Err(e) => Err(LockError::io(lock_path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_lock_acquire_basic() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("prune.lock");

        let lock = CacheLock::acquire(&lock_path, LockWait::Forever).unwrap();

        assert!(lock.path().exists());
        assert_eq!(lock.path(), lock_path);
    }

    #[test]
    fn test_lock_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("nested").join("cache").join("prune.lock");

        let _lock = CacheLock::acquire(&lock_path, LockWait::Forever).unwrap();

        assert!(lock_path.exists());
    }

    #[test]
    fn test_reacquire_after_release() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("prune.lock");

        {
            let _lock = CacheLock::acquire(&lock_path, LockWait::Forever).unwrap();
        }

        let _lock2 = CacheLock::acquire(&lock_path, LockWait::Forever).unwrap();
    }

    #[test]
    fn test_with_lock_twice_sequentially() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("prune.lock");

        assert_eq!(with_lock(&lock_path, LockWait::Forever, || 1).unwrap(), 1);
        assert_eq!(with_lock(&lock_path, LockWait::Forever, || 2).unwrap(), 2);
    }

    #[test]
    fn test_with_lock_releases_on_panic() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("prune.lock");
        let path = lock_path.clone();

        let result = thread::spawn(move || {
            with_lock(&path, LockWait::Forever, || panic!("boom")).ok();
        })
        .join();
        assert!(result.is_err());

        let timeout = LockWait::Timeout(Duration::from_secs(1));
        assert!(with_lock(&lock_path, timeout, || ()).is_ok());
    }

    #[test]
    fn test_lock_contention_times_out() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("prune.lock");
        let path2 = lock_path.clone();

        let lock1 = CacheLock::acquire(&lock_path, LockWait::Forever).unwrap();

        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let result = CacheLock::acquire(&path2, LockWait::Timeout(Duration::from_millis(100)));
            tx.send(matches!(result, Err(LockError::Timeout { .. }))).unwrap();
        });

        assert!(rx.recv().unwrap(), "second acquisition should time out");
        handle.join().unwrap();
        drop(lock1);
    }

    #[test]
    fn test_blocking_waits_for_release() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("prune.lock");
        let path2 = lock_path.clone();

        let lock1 = CacheLock::acquire(&lock_path, LockWait::Forever).unwrap();
        let released = Arc::new(AtomicBool::new(false));
        let released2 = Arc::clone(&released);

        let handle = thread::spawn(move || {
            with_lock(&path2, LockWait::Forever, || released2.load(Ordering::SeqCst)).unwrap()
        });

        thread::sleep(Duration::from_millis(200));
        released.store(true, Ordering::SeqCst);
        drop(lock1);

        assert!(handle.join().unwrap(), "waiter must only run after release");
    }

    #[test]
    fn test_force_unlock_missing_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("prune.lock");

        assert!(!force_unlock(&lock_path).unwrap());
        assert!(!force_unlock(&lock_path).unwrap());
    }

    #[test]
    fn test_force_unlock_removes_stale_file() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("prune.lock");
        fs::write(&lock_path, "").unwrap();

        assert!(force_unlock(&lock_path).unwrap());
        assert!(!lock_path.exists());
        assert!(with_lock(&lock_path, LockWait::Forever, || ()).is_ok());
    }

    #[test]
    fn test_lock_wait_from_secs() {
        assert_eq!(LockWait::from_secs(0), LockWait::Forever);
        assert_eq!(LockWait::from_secs(5), LockWait::Timeout(Duration::from_secs(5)));
    }
}
