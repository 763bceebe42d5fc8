//! Retention-based cache pruning
//!
//! A prune runs three steps against a [`CacheBackend`], in order:
//! 1. Transient artifacts (downloaded sources, build scratch) are removed
//!    unconditionally; they are cheap to regenerate.
//! 2. Durable artifacts (package binaries, cached results) whose last use is
//!    at or beyond the retention window are removed.
//! 3. Parent records (e.g. Conan recipes) are removed only when the record
//!    and every one of its artifacts are beyond the window.
//!
//! Dry runs perform the same selection but delete nothing. Any failure
//! aborts the prune immediately: a partially pruned cache is fine, a
//! corrupt one is not.

mod conan;
mod ctcache;
mod local;

pub use conan::ConanBackend;
pub use ctcache::{entry_count, ClangTidyCacheBackend, ENTRIES_FILE};
pub use local::{EntryKind, EntryMeta, LocalStore, ENTRY_FILE};

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use warden_exec::ExecError;

use crate::lock::{CacheLock, LockError, LockWait};
use crate::retention::RetentionWindow;

/// Prune result type
pub type PruneResult<T> = Result<T, PruneError>;

/// Errors that abort a prune
#[derive(Debug, Error)]
pub enum PruneError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid cache metadata in {path}: {message}")]
    Metadata { path: PathBuf, message: String },
}

impl PruneError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Retention window plus dry-run switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrunePolicy {
    pub window: RetentionWindow,
    pub dry_run: bool,
}

impl PrunePolicy {
    pub fn new(window: RetentionWindow) -> Self {
        Self {
            window,
            dry_run: false,
        }
    }

    /// Select but don't delete.
    pub fn with_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// What one prune step removed (or would remove, in a dry run).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutcome {
    /// Identifiers of removed entries, when the backend can tell
    pub removed: Vec<String>,
    /// Bytes freed, when the backend can tell
    pub bytes_reclaimed: u64,
    /// External commands issued for this step
    pub commands: Vec<String>,
}

impl StepOutcome {
    pub fn command(cmd: impl Into<String>) -> Self {
        Self {
            commands: vec![cmd.into()],
            ..Self::default()
        }
    }
}

/// One storage engine that can be pruned.
pub trait CacheBackend {
    /// Short name used in logs and reports
    fn name(&self) -> &str;

    /// Step 1: remove artifacts that carry no retention.
    fn clean_transient(&self, dry_run: bool) -> PruneResult<StepOutcome>;

    /// Step 2: remove durable artifacts last used at or beyond `window`.
    fn remove_stale_artifacts(&self, window: RetentionWindow, dry_run: bool) -> PruneResult<StepOutcome>;

    /// Step 3: remove records whose own use and every artifact's use are
    /// at or beyond `window`.
    fn remove_orphaned_records(&self, window: RetentionWindow, dry_run: bool) -> PruneResult<StepOutcome>;
}

/// Result of a prune run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneReport {
    pub backend: String,
    pub policy: PrunePolicy,
    pub transient: StepOutcome,
    pub artifacts: StepOutcome,
    pub records: StepOutcome,
}

impl PruneReport {
    /// Every removed identifier, in step order.
    pub fn removed(&self) -> Vec<&str> {
        [&self.transient, &self.artifacts, &self.records]
            .into_iter()
            .flat_map(|step| step.removed.iter().map(String::as_str))
            .collect()
    }

    pub fn bytes_reclaimed(&self) -> u64 {
        self.transient.bytes_reclaimed + self.artifacts.bytes_reclaimed + self.records.bytes_reclaimed
    }
}

impl fmt::Display for PruneReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.policy.dry_run { "would remove" } else { "removed" };
        write!(
            f,
            "{}: {} {} transient, {} artifacts, {} records ({} bytes, retention {})",
            self.backend,
            verb,
            self.transient.removed.len(),
            self.artifacts.removed.len(),
            self.records.removed.len(),
            self.bytes_reclaimed(),
            self.policy.window
        )
    }
}

/// Runs the three prune steps against a backend.
#[derive(Debug, Clone, Copy)]
pub struct Pruner {
    policy: PrunePolicy,
}

impl Pruner {
    pub fn new(policy: PrunePolicy) -> Self {
        Self { policy }
    }

    /// Prune `backend`. Stops at the first failing step.
    pub fn prune<B: CacheBackend + ?Sized>(&self, backend: &B) -> PruneResult<PruneReport> {
        let PrunePolicy { window, dry_run } = self.policy;
        tracing::info!(backend = backend.name(), %window, dry_run, "pruning cache");

        let transient = backend.clean_transient(dry_run)?;
        let artifacts = backend.remove_stale_artifacts(window, dry_run)?;
        let records = backend.remove_orphaned_records(window, dry_run)?;

        let report = PruneReport {
            backend: backend.name().to_string(),
            policy: self.policy,
            transient,
            artifacts,
            records,
        };
        tracing::info!("{}", report);
        Ok(report)
    }

    /// Prune `backend` while holding the lock at `lock_path`.
    pub fn prune_locked<B: CacheBackend + ?Sized>(
        &self,
        backend: &B,
        lock_path: &Path,
        wait: LockWait,
    ) -> PruneResult<PruneReport> {
        let _lock = CacheLock::acquire(lock_path, wait)?;
        self.prune(backend)
    }
}
