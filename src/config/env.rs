//! Snapshot of the process environment.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use crate::platform::Platform;

/// Environment signals read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub platform: Platform,
    pub home: PathBuf,
    pub cwd: PathBuf,
    /// `RUNNER_NAME`, set by GitHub Actions runners
    pub runner_name: Option<String>,
    /// `CLANG_TIDY_CACHE_DIR`
    pub ctcache_dir: Option<PathBuf>,
    /// `CONAN_HOME`
    pub conan_home: Option<PathBuf>,
}

impl Environment {
    /// Capture the current process environment.
    pub fn capture() -> Self {
        let vars: HashMap<String, String> = env::vars().collect();
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::from_vars(Platform::current(), home, cwd, &vars)
    }

    /// Build from explicit values.
    pub fn from_vars(
        platform: Platform,
        home: PathBuf,
        cwd: PathBuf,
        vars: &HashMap<String, String>,
    ) -> Self {
        let non_empty = |key: &str| vars.get(key).filter(|v| !v.is_empty()).cloned();
        Self {
            platform,
            home,
            cwd,
            runner_name: non_empty("RUNNER_NAME"),
            ctcache_dir: non_empty("CLANG_TIDY_CACHE_DIR").map(PathBuf::from),
            conan_home: non_empty("CONAN_HOME").map(PathBuf::from),
        }
    }
}
