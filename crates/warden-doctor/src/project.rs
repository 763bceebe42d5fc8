//! Project marker discovery and version pinning.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// File that marks a project managed by cache-warden
pub const PROJECT_FILE: &str = "cache-warden.toml";

#[derive(Debug, Default, Deserialize)]
struct ProjectFile {
    #[serde(default)]
    version: Option<String>,
}

/// Search `start` and its ancestors for the nearest project file.
pub fn find_project_file(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_FILE))
        .find(|candidate| candidate.is_file())
}

/// Verify we run inside a project and that its pinned version matches ours.
pub fn self_check(start: &Path, running_version: &str) -> Vec<String> {
    let Some(path) = find_project_file(start) else {
        return vec![format!(
            "cache-warden must be called inside of a project. \
             It's identified by a '{}' file.",
            PROJECT_FILE
        )];
    };

    let project: ProjectFile = match fs::read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|text| toml::from_str(&text).map_err(|e| e.to_string()))
    {
        Ok(p) => p,
        Err(e) => return vec![format!("Could not read '{}': {}", path.display(), e)],
    };

    let Some(pinned) = project.version else {
        return Vec::new();
    };
    let pinned = pinned.strip_prefix('v').unwrap_or(&pinned);
    if pinned != running_version {
        return vec![format!(
            "The '{}' version of your project ({}) does not match the version of \
             this 'cache-warden' binary ({}). Install the pinned release to fix this.",
            PROJECT_FILE, pinned, running_version
        )];
    }

    Vec::new()
}
