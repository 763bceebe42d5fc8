//! CI job hooks
//!
//! `pre` and `post` wrap every CI job. `post` must also run for cancelled
//! jobs: killed processes never release their locks, so it clears them.

use std::path::{Path, PathBuf};

use thiserror::Error;
use warden_exec::CommandRunner;

use crate::conan_conf::{update_conan_conf, ConanConfError};
use crate::config::Context;
use crate::disk;
use crate::lock::{self, LockError};
use crate::platform::Platform;
use crate::prune::{
    entry_count, ClangTidyCacheBackend, ConanBackend, LocalStore, PruneError, PrunePolicy, PruneReport, Pruner,
};
use crate::timing::timed;

/// Lock file placed in the root of a local store
pub const LOCAL_LOCK_FILE: &str = ".prune.lock";

const STORAGE_PATH_KEY: &str = "core.cache:storage_path";

#[derive(Debug, Error)]
pub enum CiError {
    #[error("RUNNER_NAME is not set; cannot pick a Conan cache directory")]
    MissingRunnerName,

    #[error("cache store {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("failed to list Conan caches in {path}: {source}")]
    Discover {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Prune(#[from] PruneError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    ConanConf(#[from] ConanConfError),
}

pub type CiResult<T> = Result<T, CiError>;

/// Point Conan at the storage directory owned by this runner.
///
/// Conan 2 caches are not safe for concurrent use, so every runner prefix
/// gets its own. Returns the configured directory, or `None` on macOS where
/// each machine runs a single runner.
pub fn configure_conan_cache_path(ctx: &Context) -> CiResult<Option<PathBuf>> {
    if ctx.env.platform == Platform::MacOs {
        return Ok(None);
    }
    let runner_name = ctx.env.runner_name.as_deref().ok_or(CiError::MissingRunnerName)?;
    let storage = ctx.directory_set().storage_for(runner_name);

    let conf = ctx.conan_global_conf();
    let value = storage.display().to_string();
    update_conan_conf(&conf, &[(STORAGE_PATH_KEY, value.as_str())])?;
    tracing::info!(storage = %storage.display(), conf = %conf.display(), "configured Conan cache path");
    Ok(Some(storage))
}

/// Paths whose capacity is reported around a job.
pub fn disk_report_paths(ctx: &Context) -> Vec<PathBuf> {
    match ctx.env.platform {
        Platform::MacOs => vec![PathBuf::from(".")],
        _ => vec![PathBuf::from("."), ctx.cache_base()],
    }
}

/// Before every job. Returns the disk usage table.
pub fn pre<R: CommandRunner + ?Sized>(ctx: &Context, runner: &R) -> CiResult<String> {
    tracing::info!(platform = ctx.env.platform.name(), "pre-job maintenance");
    configure_conan_cache_path(ctx)?;
    // clang-tidy only runs on Linux
    if ctx.env.platform == Platform::Linux {
        ctcache_prune(ctx, runner, false)?;
    }
    Ok(disk::report(&disk_report_paths(ctx)))
}

/// After every job, including cancelled ones. Returns the disk usage table.
pub fn post(ctx: &Context) -> CiResult<String> {
    tracing::info!(platform = ctx.env.platform.name(), "post-job maintenance");
    if ctx.env.platform == Platform::Linux {
        ctcache_unlock(ctx)?;
    }
    Ok(disk::report(&disk_report_paths(ctx)))
}

/// Prune every per-runner Conan cache under the cache base.
pub fn prune_conan_caches<R: CommandRunner + ?Sized>(
    ctx: &Context,
    runner: &R,
    dry_run: bool,
) -> CiResult<Vec<PruneReport>> {
    timed("ci::prune_conan_caches", || -> CiResult<Vec<PruneReport>> {
        let set = ctx.directory_set();
        let dirs = set.discover().map_err(|source| CiError::Discover {
            path: set.root().to_path_buf(),
            source,
        })?;
        if dirs.is_empty() {
            tracing::info!(root = %set.root().display(), "no Conan caches found");
        }

        let pruner = Pruner::new(policy(ctx, dry_run));
        let mut reports = Vec::with_capacity(dirs.len());
        for dir in dirs {
            let backend = ConanBackend::new(runner, &ctx.settings.tools.conan).with_storage_path(&dir);
            reports.push(pruner.prune_locked(&backend, &set.lock_for(&dir), ctx.lock_wait())?);
        }
        Ok(reports)
    })
}

/// Number of cached clang-tidy results.
pub fn ctcache_info(ctx: &Context) -> CiResult<usize> {
    timed("ci::ctcache_info", || -> CiResult<usize> { Ok(entry_count(&ctx.ctcache_dir())?) })
}

/// Drop clang-tidy results outside the retention window.
pub fn ctcache_prune<R: CommandRunner + ?Sized>(ctx: &Context, runner: &R, dry_run: bool) -> CiResult<PruneReport> {
    timed("ci::ctcache_prune", || -> CiResult<PruneReport> {
        let dir = ctx.ctcache_dir();
        let backend = ClangTidyCacheBackend::new(runner, &ctx.settings.tools.clang_tidy_cache, &dir);
        Ok(Pruner::new(policy(ctx, dry_run)).prune_locked(&backend, &ctx.ctcache_lock(), ctx.lock_wait())?)
    })
}

/// Remove the clang-tidy prune lock left by a killed job.
pub fn ctcache_unlock(ctx: &Context) -> CiResult<bool> {
    Ok(lock::force_unlock(&ctx.ctcache_lock())?)
}

/// Prune a local directory store rooted at `root`, which must exist.
pub fn prune_dir(ctx: &Context, root: &Path, dry_run: bool) -> CiResult<PruneReport> {
    if !root.is_dir() {
        return Err(CiError::NotADirectory(root.to_path_buf()));
    }
    timed("ci::prune_dir", || -> CiResult<PruneReport> {
        let store = LocalStore::new(root);
        let lock_path = root.join(LOCAL_LOCK_FILE);
        Ok(Pruner::new(policy(ctx, dry_run)).prune_locked(&store, &lock_path, ctx.lock_wait())?)
    })
}

fn policy(ctx: &Context, dry_run: bool) -> PrunePolicy {
    PrunePolicy {
        window: ctx.retention(),
        dry_run,
    }
}
