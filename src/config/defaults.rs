//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

use crate::retention::RetentionWindow;

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Retention window for every prune (default: 2 weeks)
    pub retention: RetentionWindow,

    /// Seconds to wait for a prune lock; 0 blocks until released
    pub lock_timeout_seconds: u64,

    /// Conan executable (default: "conan")
    pub conan_program: String,

    /// clang-tidy-cache executable (default: "clang-tidy-cache")
    pub clang_tidy_cache_program: String,

    /// Conan remote the doctor expects a login for
    pub doctor_remote: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            retention: RetentionWindow::default(),
            lock_timeout_seconds: 0,
            conan_program: "conan".to_string(),
            clang_tidy_cache_program: "clang-tidy-cache".to_string(),
            doctor_remote: "artifactory".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "retention": self.retention.to_string(),
            "lock_timeout_seconds": self.lock_timeout_seconds,
            "tools": {
                "conan": self.conan_program,
                "clang_tidy_cache": self.clang_tidy_cache_program
            },
            "doctor": {
                "remote": self.doctor_remote
            }
        })
    }
}
