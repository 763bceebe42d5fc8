//! clang-tidy-cache result cache backend.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use warden_exec::{CommandRunner, CommandSpec};

use super::{CacheBackend, PruneError, PruneResult, StepOutcome};
use crate::retention::RetentionWindow;

/// Index file maintained by clang-tidy-cache
pub const ENTRIES_FILE: &str = "entries.json";

/// Prunes the clang-tidy result cache through `clang-tidy-cache prune`.
///
/// The tool only takes a retention in whole weeks; shorter windows are
/// rounded up. Results have no parent records and nothing transient.
pub struct ClangTidyCacheBackend<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    program: String,
    cache_dir: PathBuf,
}

impl<'a, R: CommandRunner + ?Sized> ClangTidyCacheBackend<'a, R> {
    pub fn new(runner: &'a R, program: impl Into<String>, cache_dir: &Path) -> Self {
        Self {
            runner,
            program: program.into(),
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

impl<'a, R: CommandRunner + ?Sized> CacheBackend for ClangTidyCacheBackend<'a, R> {
    fn name(&self) -> &str {
        "clang-tidy-cache"
    }

    fn clean_transient(&self, _dry_run: bool) -> PruneResult<StepOutcome> {
        Ok(StepOutcome::default())
    }

    fn remove_stale_artifacts(&self, window: RetentionWindow, dry_run: bool) -> PruneResult<StepOutcome> {
        let cmd = CommandSpec::new(&self.program)
            .arg("prune")
            .arg(window.whole_weeks().to_string())
            .env("CLANG_TIDY_CACHE_DIR", self.cache_dir.display().to_string());
        if dry_run {
            // clang-tidy-cache has no dry-run mode
            tracing::info!(command = %cmd, "dry run, skipping");
        } else {
            let output = self.runner.run_checked(&cmd)?;
            for line in output.stdout.lines().filter(|l| !l.trim().is_empty()) {
                tracing::info!(target: "clang-tidy-cache", "{}", line);
            }
        }
        Ok(StepOutcome::command(cmd.to_string()))
    }

    fn remove_orphaned_records(&self, _window: RetentionWindow, _dry_run: bool) -> PruneResult<StepOutcome> {
        Ok(StepOutcome::default())
    }
}

/// Number of entries in the cache index. A missing index means an empty cache.
pub fn entry_count(cache_dir: &Path) -> PruneResult<usize> {
    let path = cache_dir.join(ENTRIES_FILE);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(PruneError::io(&path, e)),
    };
    let index: Value = serde_json::from_str(&text).map_err(|e| PruneError::Metadata {
        path: path.clone(),
        message: e.to_string(),
    })?;
    match index {
        Value::Object(map) => Ok(map.len()),
        Value::Array(list) => Ok(list.len()),
        _ => Err(PruneError::Metadata {
            path,
            message: "expected an object or array".to_string(),
        }),
    }
}
