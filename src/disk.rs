//! Disk capacity reporting.
//!
//! Best-effort diagnostics printed around CI cache maintenance. A path that
//! cannot be inspected is skipped; the report itself never fails.

use std::path::{Path, PathBuf};

/// Bytes per binary gigabyte (GiB). Cloud block storage is sized in these
/// units, so the numbers line up with the provider's console.
const GIB: u64 = 1024 * 1024 * 1024;

/// Capacity of the filesystem holding a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

impl DiskUsage {
    /// Inspect the filesystem that contains `path`.
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let stats = fs2::statvfs(path)?;
        let total = stats.total_space();
        let free = stats.available_space();
        Ok(Self {
            total,
            used: total.saturating_sub(stats.free_space()),
            free,
        })
    }
}

/// Render `bytes` as whole GiB, rounded down.
pub fn to_gibi(bytes: u64) -> String {
    format!("{}Gi", bytes / GIB)
}

/// Render `size` as GiB plus its share of `total`.
pub fn to_gibi_and_percent(size: u64, total: u64) -> String {
    let percent = if total == 0 {
        0.0
    } else {
        size as f64 / total as f64 * 100.0
    };
    format!("{} ({:.0}%)", to_gibi(size), percent)
}

fn row(path: &str, size: &str, used: &str, free: &str) -> String {
    format!("{: <10} {: >6} {: >12} {: >12}", path, size, used, free)
}

/// Render one table row for a path and its usage.
pub fn format_row(path: &Path, usage: &DiskUsage) -> String {
    row(
        &path.display().to_string(),
        &to_gibi(usage.total),
        &to_gibi_and_percent(usage.used, usage.total),
        &to_gibi_and_percent(usage.free, usage.total),
    )
}

/// Build the capacity table for `paths`.
///
/// Paths that do not exist or cannot be stat'ed are left out.
pub fn report<P: AsRef<Path>>(paths: &[P]) -> String {
    let mut lines = vec![row("Path", "Size", "Used", "Free")];
    for path in paths {
        let path = path.as_ref();
        match DiskUsage::of(path) {
            Ok(usage) => lines.push(format_row(path, &usage)),
            Err(e) => tracing::warn!(path = %path.display(), "skipping disk usage: {}", e),
        }
    }
    lines.join("\n")
}

/// Print the capacity table to stdout.
pub fn print_report(paths: &[PathBuf]) {
    println!("{}", report(paths));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_to_gibi_rounds_down() {
        assert_eq!(to_gibi(0), "0Gi");
        assert_eq!(to_gibi(GIB - 1), "0Gi");
        assert_eq!(to_gibi(5 * GIB + GIB / 2), "5Gi");
    }

    #[test]
    fn test_to_gibi_and_percent() {
        assert_eq!(to_gibi_and_percent(25 * GIB, 100 * GIB), "25Gi (25%)");
        assert_eq!(to_gibi_and_percent(0, 0), "0Gi (0%)");
    }

    #[test]
    fn test_format_row_fixed_width() {
        let usage = DiskUsage {
            total: 100 * GIB,
            used: 40 * GIB,
            free: 60 * GIB,
        };
        let line = format_row(Path::new("/cache"), &usage);
        assert_eq!(line, "/cache      100Gi   40Gi (40%)   60Gi (60%)");
    }

    #[test]
    fn test_report_header() {
        let report = report::<&Path>(&[]);
        assert_eq!(report, "Path         Size         Used         Free");
    }

    #[test]
    fn test_report_skips_missing_path() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("does-not-exist");

        let report = report(&[missing.as_path(), temp_dir.path()]);
        let lines: Vec<&str> = report.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(!report.contains("does-not-exist"));
        assert!(lines[1].starts_with(&temp_dir.path().display().to_string()));
    }

    #[test]
    fn test_disk_usage_consistent() {
        let temp_dir = TempDir::new().unwrap();
        let usage = DiskUsage::of(temp_dir.path()).unwrap();
        assert!(usage.total > 0);
        assert!(usage.used <= usage.total);
        assert!(usage.free <= usage.total);
    }
}
