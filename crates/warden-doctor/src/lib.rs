//! Developer environment health checks.
//!
//! Each check is an independent predicate that returns a list of
//! human-readable issues; an empty list means healthy. Issues from all
//! checks are collected so a user sees every problem in one pass.

mod checks;
mod project;

pub use checks::{conan_login, git, parse_git_version, MIN_GIT_VERSION};
pub use project::{find_project_file, self_check, PROJECT_FILE};

use std::fmt;

/// Every issue found by a doctor run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issues {
    /// Tool name used in the report header
    pub tool: String,
    pub items: Vec<String>,
}

impl fmt::Display for Issues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} doctor found the following issues:", self.tool)?;
        for (i, issue) in self.items.iter().enumerate() {
            writeln!(f, " {}. {}", i + 1, issue)?;
        }
        Ok(())
    }
}

impl std::error::Error for Issues {}

/// Combine the results of several checks.
///
/// Returns `Err(Issues)` if any check reported a problem.
pub fn run_checks<I>(tool: &str, results: I) -> Result<(), Issues>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let items: Vec<String> = results.into_iter().flatten().collect();
    if items.is_empty() {
        Ok(())
    } else {
        tracing::debug!(count = items.len(), "doctor found issues");
        Err(Issues {
            tool: tool.to_string(),
            items,
        })
    }
}
