//! Configuration and run context
//!
//! Settings come from a 4-layer merge:
//! 1. Built-in defaults
//! 2. Host config (~/.config/cache-warden/config.toml)
//! 3. Project config (nearest cache-warden.toml, or --config)
//! 4. CLI flags
//!
//! Together with a snapshot of the process environment they form the
//! [`Context`] that is built once in `main` and passed to every operation.

mod defaults;
mod effective;
mod env;
mod merge;

pub use defaults::BuiltinDefaults;
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use env::Environment;
pub use merge::{deep_merge, merge_layers};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::lock::LockWait;
use crate::platform::CacheDirectorySet;
use crate::retention::RetentionWindow;

/// Name of the lock file placed in the clang-tidy cache directory
pub const CTCACHE_LOCK_FILE: &str = "prune.lock";

/// External tool names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolSettings {
    pub conan: String,
    pub clang_tidy_cache: String,
}

/// Doctor settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DoctorSettings {
    /// Conan remote that must be configured and logged in
    pub remote: String,
}

/// Typed settings after all layers are merged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub retention: RetentionWindow,
    pub lock_timeout_seconds: u64,

    /// Overrides the per-platform cache base directory
    #[serde(default)]
    pub cache_base: Option<PathBuf>,

    /// Overrides CLANG_TIDY_CACHE_DIR / ~/.ctcache
    #[serde(default)]
    pub ctcache_dir: Option<PathBuf>,

    /// Overrides CONAN_HOME / ~/.conan2
    #[serde(default)]
    pub conan_home: Option<PathBuf>,

    pub tools: ToolSettings,
    pub doctor: DoctorSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let defaults = BuiltinDefaults::default();
        Self {
            retention: defaults.retention,
            lock_timeout_seconds: defaults.lock_timeout_seconds,
            cache_base: None,
            ctcache_dir: None,
            conan_home: None,
            tools: ToolSettings {
                conan: defaults.conan_program,
                clang_tidy_cache: defaults.clang_tidy_cache_program,
            },
            doctor: DoctorSettings {
                remote: defaults.doctor_remote,
            },
        }
    }
}

/// Everything an operation needs to know about this run.
#[derive(Debug, Clone)]
pub struct Context {
    pub settings: Settings,
    pub env: Environment,
}

impl Context {
    pub fn new(settings: Settings, env: Environment) -> Self {
        Self { settings, env }
    }

    /// Base directory holding CI caches on this machine.
    pub fn cache_base(&self) -> PathBuf {
        self.settings
            .cache_base
            .clone()
            .unwrap_or_else(|| self.env.platform.cache_base(&self.env.home))
    }

    pub fn directory_set(&self) -> CacheDirectorySet {
        CacheDirectorySet::new(&self.cache_base())
    }

    /// Root of the clang-tidy result cache.
    pub fn ctcache_dir(&self) -> PathBuf {
        self.settings
            .ctcache_dir
            .clone()
            .or_else(|| self.env.ctcache_dir.clone())
            .unwrap_or_else(|| self.env.home.join(".ctcache"))
    }

    pub fn ctcache_lock(&self) -> PathBuf {
        self.ctcache_dir().join(CTCACHE_LOCK_FILE)
    }

    /// Conan home folder, usually `~/.conan2`.
    pub fn conan_home(&self) -> PathBuf {
        self.settings
            .conan_home
            .clone()
            .or_else(|| self.env.conan_home.clone())
            .unwrap_or_else(|| self.env.home.join(".conan2"))
    }

    pub fn conan_global_conf(&self) -> PathBuf {
        self.conan_home().join("global.conf")
    }

    pub fn lock_wait(&self) -> LockWait {
        LockWait::from_secs(self.settings.lock_timeout_seconds)
    }

    pub fn retention(&self) -> RetentionWindow {
        self.settings.retention
    }

    pub fn working_dir(&self) -> &Path {
        &self.env.cwd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;
    use std::collections::HashMap;
    use std::time::Duration;

    fn env(platform: Platform, vars: &[(&str, &str)]) -> Environment {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::from_vars(platform, PathBuf::from("/home/ci"), PathBuf::from("/work"), &vars)
    }

    #[test]
    fn test_settings_default_matches_builtin_layer() {
        let from_layers = EffectiveConfig::build(None, None, None)
            .unwrap()
            .settings()
            .unwrap();
        assert_eq!(from_layers, Settings::default());
    }

    #[test]
    fn test_context_defaults() {
        let ctx = Context::new(Settings::default(), env(Platform::Linux, &[]));

        assert_eq!(ctx.cache_base(), PathBuf::from("/cache"));
        assert_eq!(ctx.ctcache_dir(), PathBuf::from("/home/ci/.ctcache"));
        assert_eq!(ctx.ctcache_lock(), PathBuf::from("/home/ci/.ctcache/prune.lock"));
        assert_eq!(ctx.conan_global_conf(), PathBuf::from("/home/ci/.conan2/global.conf"));
        assert_eq!(ctx.lock_wait(), LockWait::Forever);
    }

    #[test]
    fn test_context_env_and_settings_overrides() {
        let mut settings = Settings::default();
        settings.cache_base = Some(PathBuf::from("/mnt/cache"));
        settings.lock_timeout_seconds = 30;
        let ctx = Context::new(
            settings,
            env(
                Platform::Windows,
                &[("CLANG_TIDY_CACHE_DIR", "/tmp/ct"), ("CONAN_HOME", "/opt/conan")],
            ),
        );

        assert_eq!(ctx.cache_base(), PathBuf::from("/mnt/cache"));
        assert_eq!(ctx.ctcache_dir(), PathBuf::from("/tmp/ct"));
        assert_eq!(ctx.conan_home(), PathBuf::from("/opt/conan"));
        assert_eq!(ctx.lock_wait(), LockWait::Timeout(Duration::from_secs(30)));
    }
}
