//! Conan 2 package cache backend.
//!
//! Conan keeps its own LRU timestamps for recipes and package binaries, so
//! selection is delegated to `conan remove --lru`. Recipe and binary usage
//! are tracked separately; a recipe can only go once it and all of its
//! binaries are out of the window, which is why binaries (`*:*`) are
//! removed before recipes (`*`).

use std::path::{Path, PathBuf};

use warden_exec::{CommandOutput, CommandRunner, CommandSpec};

use super::{CacheBackend, PruneResult, StepOutcome};
use crate::retention::RetentionWindow;

/// Prunes a Conan cache through the `conan` CLI.
pub struct ConanBackend<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    program: String,
    /// Custom `core.cache:storage_path`; the configured one if unset
    storage_path: Option<PathBuf>,
}

impl<'a, R: CommandRunner + ?Sized> ConanBackend<'a, R> {
    pub fn new(runner: &'a R, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
            storage_path: None,
        }
    }

    /// Target a specific storage directory instead of the configured one.
    pub fn with_storage_path(mut self, path: &Path) -> Self {
        self.storage_path = Some(path.to_path_buf());
        self
    }

    fn command(&self, args: &[&str], dry_run: bool) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.program).args(args.iter().copied());
        if dry_run {
            cmd = cmd.arg("--dry-run");
        }
        if let Some(path) = &self.storage_path {
            cmd = cmd.arg(format!("--core-conf=core.cache:storage_path={}", path.display()));
        }
        cmd
    }

    fn run(&self, cmd: CommandSpec) -> PruneResult<StepOutcome> {
        let output = self.runner.run_checked(&cmd)?;
        log_output(&output);
        Ok(StepOutcome::command(cmd.to_string()))
    }

    fn remove_lru(&self, pattern: &str, window: RetentionWindow, dry_run: bool) -> PruneResult<StepOutcome> {
        let lru = format!("--lru={}", window);
        self.run(self.command(&["remove", pattern, "-c", &lru], dry_run))
    }
}

impl<'a, R: CommandRunner + ?Sized> CacheBackend for ConanBackend<'a, R> {
    fn name(&self) -> &str {
        "conan"
    }

    /// Sources and build folders are always safe to drop: sources are quick
    /// to re-download and build folders are temporary by nature.
    fn clean_transient(&self, dry_run: bool) -> PruneResult<StepOutcome> {
        // `conan cache clean` has no dry-run mode
        let cmd = self.command(&["cache", "clean", "*"], false);
        if dry_run {
            tracing::info!(command = %cmd, "dry run, skipping");
            return Ok(StepOutcome::command(cmd.to_string()));
        }
        self.run(cmd)
    }

    fn remove_stale_artifacts(&self, window: RetentionWindow, dry_run: bool) -> PruneResult<StepOutcome> {
        self.remove_lru("*:*", window, dry_run)
    }

    fn remove_orphaned_records(&self, window: RetentionWindow, dry_run: bool) -> PruneResult<StepOutcome> {
        self.remove_lru("*", window, dry_run)
    }
}

fn log_output(output: &CommandOutput) {
    for line in output.stdout.lines().chain(output.stderr.lines()) {
        if !line.trim().is_empty() {
            tracing::info!(target: "conan", "{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prune::{PruneError, PrunePolicy, Pruner};
    use warden_exec::ScriptedRunner;

    #[test]
    fn test_prune_issues_commands_in_order() {
        let runner = ScriptedRunner::new();
        let backend = ConanBackend::new(&runner, "conan");

        Pruner::new(PrunePolicy::default()).prune(&backend).unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                "conan cache clean *",
                "conan remove *:* -c --lru=2w",
                "conan remove * -c --lru=2w",
            ]
        );
    }

    #[test]
    fn test_dry_run_with_storage_path() {
        let runner = ScriptedRunner::new();
        let backend =
            ConanBackend::new(&runner, "conan").with_storage_path(Path::new("/cache/conan2/linux-a"));
        let policy = PrunePolicy::new(RetentionWindow::days(10)).with_dry_run();

        let report = Pruner::new(policy).prune(&backend).unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                "conan remove *:* -c --lru=10d --dry-run --core-conf=core.cache:storage_path=/cache/conan2/linux-a",
                "conan remove * -c --lru=10d --dry-run --core-conf=core.cache:storage_path=/cache/conan2/linux-a",
            ]
        );
        assert_eq!(
            report.transient.commands,
            vec!["conan cache clean * --core-conf=core.cache:storage_path=/cache/conan2/linux-a"]
        );
    }

    #[test]
    fn test_failed_binary_removal_skips_recipes() {
        let runner = ScriptedRunner::new();
        runner.respond("conan remove *:*", CommandOutput::failure(1, "ERROR: database locked"));
        let backend = ConanBackend::new(&runner, "conan");

        let err = Pruner::new(PrunePolicy::default()).prune(&backend).unwrap_err();

        assert!(matches!(err, PruneError::Exec(_)));
        assert!(err.to_string().contains("database locked"));
        assert_eq!(runner.calls().len(), 2);
    }
}
