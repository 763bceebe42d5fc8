//! Editing of Conan `.conf` files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConanConfError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Ordered `key=value` pairs of a Conan conf file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConanConf {
    entries: Vec<(String, String)>,
}

impl ConanConf {
    /// Parse conf text. Comments and lines without `=` are dropped.
    pub fn parse(text: &str) -> Self {
        let mut conf = Self::default();
        for line in text.lines() {
            if line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.trim().split_once('=') {
                conf.set(key, value);
            }
        }
        conf
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replace `key` in place, or append it.
    pub fn set(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }
}

/// Add or replace `key=value` pairs in the conf file at `path`.
pub fn update_conan_conf(path: &Path, values: &[(&str, &str)]) -> Result<(), ConanConfError> {
    let old = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(source) => {
            return Err(ConanConfError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut conf = ConanConf::parse(&old);
    for (key, value) in values {
        conf.set(key, value);
    }

    let write_err = |source| ConanConfError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::write(path, conf.render()).map_err(write_err)?;

    tracing::debug!(path = %path.display(), keys = values.len(), "updated conan conf");
    Ok(())
}
