//! Platform detection and per-runner cache roots.
//!
//! Conan 2 does not support concurrent access to one cache, so every CI
//! runner gets its own storage directory under the platform's cache base:
//! `<base>/conan2/<runner prefix>`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Operating system family the tool runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Other
        }
    }

    /// Lowercase name used in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::Other => "other",
        }
    }

    /// Fixed base directory for CI caches on this platform.
    pub fn cache_base(&self, home: &Path) -> PathBuf {
        match self {
            Self::Windows => PathBuf::from("C:\\cache"),
            Self::Linux => PathBuf::from("/cache"),
            Self::MacOs | Self::Other => home.join(".cache"),
        }
    }
}

/// Stable runner prefix from a runner name.
///
/// Autoscaled runners carry the cloud instance id after `-i-`:
/// `linux-cpp2-i-0b3bc6e358f7261e7` -> `linux-cpp2`. The cut is at `-i-`,
/// not at any `-i`, so names such as `linux-intel-i-0abc` keep `linux-intel`
/// where the older Python tooling produced `linux`.
pub fn runner_prefix(runner_name: &str) -> &str {
    match runner_name.find("-i-") {
        Some(idx) => &runner_name[..idx],
        None => runner_name,
    }
}

/// Isolated Conan storage directories, one per runner prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDirectorySet {
    root: PathBuf,
}

impl CacheDirectorySet {
    const CONAN_DIR: &'static str = "conan2";

    pub fn new(cache_base: &Path) -> Self {
        Self {
            root: cache_base.join(Self::CONAN_DIR),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Storage directory owned by the runner named `runner_name`.
    pub fn storage_for(&self, runner_name: &str) -> PathBuf {
        self.root.join(runner_prefix(runner_name))
    }

    /// Lock file guarding a storage directory. It lives next to the
    /// directory so it is never picked up as cache content.
    pub fn lock_for(&self, storage: &Path) -> PathBuf {
        let name = storage
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.root.join(format!("{}.lock", name))
    }

    /// Every existing storage directory, sorted by path.
    pub fn discover(&self) -> io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut dirs = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}
