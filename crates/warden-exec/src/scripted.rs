//! In-process runner with canned responses.
//!
//! Used by unit and integration tests to drive pruning and health checks
//! without the real tools installed.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::{CommandOutput, CommandRunner, CommandSpec, ExecError, ExecResult};

/// Command runner that replays scripted outputs and records every call.
///
/// Responses are matched by the longest registered prefix of the rendered
/// command line. Unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: Mutex<Vec<(String, CommandOutput)>>,
    missing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the output for commands starting with `prefix`.
    pub fn respond(&self, prefix: &str, output: CommandOutput) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push((prefix.to_string(), output));
        }
    }

    /// Pretend `program` is not installed.
    pub fn missing(&self, program: &str) {
        if let Ok(mut missing) = self.missing.lock() {
            missing.insert(program.to_string());
        }
    }

    /// Rendered command lines in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn lookup(&self, line: &str) -> CommandOutput {
        let responses = match self.responses.lock() {
            Ok(r) => r,
            Err(_) => return CommandOutput::success(""),
        };
        responses
            .iter()
            .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::success(""))
    }

    fn is_missing(&self, program: &str) -> bool {
        self.missing
            .lock()
            .map(|m| m.contains(program))
            .unwrap_or(false)
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, cmd: &CommandSpec) -> ExecResult<CommandOutput> {
        let line = cmd.to_string();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(line.clone());
        }
        if self.is_missing(&cmd.program) {
            return Err(ExecError::NotFound {
                program: cmd.program.clone(),
            });
        }
        Ok(self.lookup(&line))
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        if self.is_missing(program) {
            None
        } else {
            Some(PathBuf::from("/usr/bin").join(program))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_prefix_wins() {
        let runner = ScriptedRunner::new();
        runner.respond("git", CommandOutput::success("generic"));
        runner.respond("git --version", CommandOutput::success("git version 2.40.0"));

        let out = runner.run(&CommandSpec::new("git").arg("--version")).unwrap();
        assert_eq!(out.stdout, "git version 2.40.0");

        let out = runner.run(&CommandSpec::new("git").arg("status")).unwrap();
        assert_eq!(out.stdout, "generic");
    }

    #[test]
    fn test_records_calls_and_missing() {
        let runner = ScriptedRunner::new();
        runner.missing("git-lfs");

        assert!(runner.locate("git-lfs").is_none());
        assert!(runner.locate("git").is_some());
        assert!(runner.run(&CommandSpec::new("git-lfs").arg("env")).is_err());
        assert_eq!(runner.calls(), vec!["git-lfs env".to_string()]);
    }
}
