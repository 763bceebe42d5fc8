//! Directory-backed cache store.
//!
//! Each entry is a directory carrying a small `.entry.json` with its key,
//! kind and last use time. Records may hold artifacts in subdirectories.
//! `tmp/` at the root and `source/`/`build/` inside a record are scratch,
//! but only while they carry no metadata of their own.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::{CacheBackend, PruneError, PruneResult, StepOutcome};
use crate::retention::RetentionWindow;

/// Metadata file inside every entry directory
pub const ENTRY_FILE: &str = ".entry.json";

const TMP_DIR: &str = "tmp";
const RECORD_SCRATCH: [&str; 2] = ["source", "build"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Record,
    Artifact,
}

/// Contents of `.entry.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryMeta {
    pub key: String,
    pub kind: EntryKind,
    pub last_used: DateTime<Utc>,
}

#[derive(Debug)]
struct Artifact {
    id: String,
    path: PathBuf,
    last_used: DateTime<Utc>,
}

#[derive(Debug)]
struct Record {
    id: String,
    path: PathBuf,
    last_used: DateTime<Utc>,
    artifacts: Vec<Artifact>,
    /// Scratch and artifact subdirectories, removed by earlier steps
    children: Vec<PathBuf>,
    /// Subdirectories that are neither scratch nor artifacts
    has_unknown: bool,
}

/// An entry selected for removal with the bytes it frees.
#[derive(Debug)]
struct Candidate {
    id: String,
    path: PathBuf,
    bytes: u64,
}

impl Candidate {
    fn measured(id: String, path: PathBuf) -> Self {
        let bytes = dir_size(&path, &[]);
        Self { id, path, bytes }
    }
}

#[derive(Debug, Default)]
struct Layout {
    transient: Vec<(String, PathBuf)>,
    records: Vec<Record>,
    flat: Vec<Artifact>,
}

/// A cache rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    now: DateTime<Utc>,
}

impl LocalStore {
    pub fn new(root: &Path) -> Self {
        Self::at(root, Utc::now())
    }

    /// Evaluate ages against a fixed clock.
    pub fn at(root: &Path, now: DateTime<Utc>) -> Self {
        Self {
            root: root.to_path_buf(),
            now,
        }
    }

    /// Create or overwrite the entry at `rel` (e.g. `zlib` or `zlib/b1`).
    pub fn put(&self, rel: &str, kind: EntryKind, last_used: DateTime<Utc>) -> PruneResult<PathBuf> {
        let dir = self.root.join(rel);
        fs::create_dir_all(&dir).map_err(|e| PruneError::io(&dir, e))?;
        write_meta(
            &dir,
            &EntryMeta {
                key: rel.to_string(),
                kind,
                last_used,
            },
        )?;
        Ok(dir)
    }

    fn scan(&self) -> PruneResult<Layout> {
        let mut layout = Layout::default();
        if !self.root.is_dir() {
            return Ok(layout);
        }

        for (name, path) in subdirs(&self.root)? {
            let Some(meta) = read_meta(&path)? else {
                if name == TMP_DIR {
                    layout.transient.push((name, path));
                } else {
                    tracing::debug!(path = %path.display(), "no entry metadata, ignoring");
                }
                continue;
            };
            match meta.kind {
                EntryKind::Artifact => layout.flat.push(Artifact {
                    id: name,
                    path,
                    last_used: meta.last_used,
                }),
                EntryKind::Record => {
                    let record = self.scan_record(name, path, meta.last_used, &mut layout.transient)?;
                    layout.records.push(record);
                }
            }
        }
        Ok(layout)
    }

    fn scan_record(
        &self,
        id: String,
        path: PathBuf,
        last_used: DateTime<Utc>,
        transient: &mut Vec<(String, PathBuf)>,
    ) -> PruneResult<Record> {
        let mut artifacts = Vec::new();
        let mut children = Vec::new();
        let mut has_unknown = false;

        for (name, child) in subdirs(&path)? {
            let child_id = format!("{}/{}", id, name);
            match read_meta(&child)? {
                Some(meta) if meta.kind == EntryKind::Artifact => {
                    children.push(child.clone());
                    artifacts.push(Artifact {
                        id: child_id,
                        path: child,
                        last_used: meta.last_used,
                    });
                }
                Some(_) => {
                    return Err(PruneError::Metadata {
                        path: child.join(ENTRY_FILE),
                        message: "records cannot be nested".to_string(),
                    })
                }
                None if RECORD_SCRATCH.contains(&name.as_str()) => {
                    children.push(child.clone());
                    transient.push((child_id, child));
                }
                None => has_unknown = true,
            }
        }

        Ok(Record {
            id,
            path,
            last_used,
            artifacts,
            children,
            has_unknown,
        })
    }

    fn remove(&self, candidates: Vec<Candidate>, dry_run: bool) -> PruneResult<StepOutcome> {
        let mut outcome = StepOutcome::default();
        for Candidate { id, path, bytes: size } in candidates {
            if dry_run {
                tracing::info!(entry = %id, bytes = size, "would remove");
            } else {
                fs::remove_dir_all(&path).map_err(|source| PruneError::Remove {
                    path: path.clone(),
                    source,
                })?;
                tracing::info!(entry = %id, bytes = size, "removed");
            }
            outcome.removed.push(id);
            outcome.bytes_reclaimed += size;
        }
        Ok(outcome)
    }
}

impl CacheBackend for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    fn clean_transient(&self, dry_run: bool) -> PruneResult<StepOutcome> {
        let layout = self.scan()?;
        let scratch = layout
            .transient
            .into_iter()
            .map(|(id, path)| Candidate::measured(id, path))
            .collect();
        self.remove(scratch, dry_run)
    }

    fn remove_stale_artifacts(&self, window: RetentionWindow, dry_run: bool) -> PruneResult<StepOutcome> {
        let layout = self.scan()?;
        let mut stale: Vec<Artifact> = layout
            .records
            .into_iter()
            .flat_map(|r| r.artifacts)
            .chain(layout.flat)
            .filter(|a| window.is_expired(a.last_used, self.now))
            .collect();
        stale.sort_by(|a, b| a.last_used.cmp(&b.last_used).then_with(|| a.id.cmp(&b.id)));

        self.remove(
            stale.into_iter().map(|a| Candidate::measured(a.id, a.path)).collect(),
            dry_run,
        )
    }

    fn remove_orphaned_records(&self, window: RetentionWindow, dry_run: bool) -> PruneResult<StepOutcome> {
        let layout = self.scan()?;
        let orphaned = layout
            .records
            .into_iter()
            .filter(|r| {
                !r.has_unknown
                    && window.is_expired(r.last_used, self.now)
                    && r.artifacts.iter().all(|a| window.is_expired(a.last_used, self.now))
            })
            .map(|r| {
                // scratch and artifacts are counted by the steps that remove them
                let bytes = dir_size(&r.path, &r.children);
                Candidate {
                    id: r.id,
                    path: r.path,
                    bytes,
                }
            })
            .collect();
        self.remove(orphaned, dry_run)
    }
}

fn subdirs(dir: &Path) -> PruneResult<Vec<(String, PathBuf)>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| PruneError::io(dir, e))? {
        let entry = entry.map_err(|e| PruneError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push((entry.file_name().to_string_lossy().into_owned(), path));
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn read_meta(dir: &Path) -> PruneResult<Option<EntryMeta>> {
    let path = dir.join(ENTRY_FILE);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PruneError::io(&path, e)),
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| PruneError::Metadata {
            path,
            message: e.to_string(),
        })
}

fn write_meta(dir: &Path, meta: &EntryMeta) -> PruneResult<()> {
    let path = dir.join(ENTRY_FILE);
    let json = serde_json::to_string_pretty(meta).map_err(|e| PruneError::Metadata {
        path: path.clone(),
        message: e.to_string(),
    })?;
    fs::write(&path, json).map_err(|e| PruneError::io(&path, e))
}

/// Bytes of regular files under `path`, skipping the `excluded` subtrees.
fn dir_size(path: &Path, excluded: &[PathBuf]) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_entry(|e| !excluded.iter().any(|x| x == e.path()))
        .filter_map(Result::ok)
        .filter_map(|e| e.metadata().ok())
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .sum()
}
