//! Destination name collisions.
//!
//! Existence is checked against the live filesystem with no locking, so another
//! process writing into the same destination tree between the check and the
//! move can still collide with us. That race is accepted, not defended against.

use crate::events::Reporter;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

/// What to do when the destination file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DuplicatePolicy {
    /// Leave the source where it is.
    Skip,
    /// Move under the first free `name (n).ext`.
    #[default]
    Rename,
}

impl DuplicatePolicy {
    /// Parses the persisted setting (`"skip"` / `"rename"`, any case).
    pub fn from_setting(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skip" => Some(Self::Skip),
            "rename" => Some(Self::Rename),
            _ => None,
        }
    }

    /// Like [`from_setting`](Self::from_setting), but an unrecognized value
    /// degrades to `Rename` with a warning instead of failing.
    pub fn from_setting_or_rename(value: &str, reporter: &Reporter) -> Self {
        Self::from_setting(value).unwrap_or_else(|| {
            reporter.warning(format!(
                "Unknown duplicate handling method '{}'. Defaulting to 'rename'.",
                value
            ));
            Self::Rename
        })
    }

    pub fn as_setting(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Rename => "rename",
        }
    }
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_setting())
    }
}

/// Final destination for `candidate`, checked against the filesystem.
///
/// Returns `candidate` itself when it is free, `None` when the file must be
/// skipped, or the first free numbered variant.
pub fn resolve(candidate: &Path, policy: DuplicatePolicy, reporter: &Reporter) -> Option<PathBuf> {
    resolve_with(candidate, policy, reporter, |p| p.exists())
}

/// [`resolve`] with a caller-supplied existence check.
///
/// Probing is sequential and unbounded: a directory that already holds
/// thousands of numbered copies costs one check per copy.
pub fn resolve_with<F>(
    candidate: &Path,
    policy: DuplicatePolicy,
    reporter: &Reporter,
    exists: F,
) -> Option<PathBuf>
where
    F: Fn(&Path) -> bool,
{
    if !exists(candidate) {
        return Some(candidate.to_path_buf());
    }

    match policy {
        DuplicatePolicy::Skip => {
            reporter.info(format!(
                "Skipping '{}' due to duplicate existing.",
                display_name(candidate)
            ));
            None
        }
        DuplicatePolicy::Rename => {
            let mut counter: u64 = 1;
            let mut renamed = numbered_path(candidate, counter);
            while exists(&renamed) {
                counter += 1;
                renamed = numbered_path(candidate, counter);
            }
            reporter.info(format!(
                "Renaming '{}' to '{}' due to duplicate.",
                display_name(candidate),
                display_name(&renamed)
            ));
            Some(renamed)
        }
    }
}

/// `dir/name (n).ext` for `dir/name.ext`; extensionless names just get the suffix.
pub fn numbered_path(path: &Path, n: u64) -> PathBuf {
    let stem = path.file_stem().map(OsString::from).unwrap_or_default();
    let mut name = stem;
    name.push(format!(" ({})", n));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{self, Event, EventReceiver, LogLevel};
    use crate::logging::NullLogSink;
    use std::collections::HashSet;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn reporter() -> (Reporter, EventReceiver) {
        let (tx, rx) = events::channel();
        (Reporter::new(Arc::new(NullLogSink), tx), rx)
    }

    #[test]
    fn test_numbered_path() {
        assert_eq!(
            numbered_path(Path::new("/d/a.pdf"), 1),
            PathBuf::from("/d/a (1).pdf")
        );
        assert_eq!(
            numbered_path(Path::new("/d/archive.tar.gz"), 3),
            PathBuf::from("/d/archive.tar (3).gz")
        );
        assert_eq!(
            numbered_path(Path::new("/d/Makefile"), 2),
            PathBuf::from("/d/Makefile (2)")
        );
    }

    #[test]
    fn test_free_path_returned_unchanged_for_both_policies() {
        let dir = TempDir::new().unwrap();
        let candidate = dir.path().join("a.pdf");
        let (reporter, rx) = reporter();

        for policy in [DuplicatePolicy::Skip, DuplicatePolicy::Rename] {
            assert_eq!(resolve(&candidate, policy, &reporter), Some(candidate.clone()));
        }
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn test_skip_returns_none_and_reports() {
        let dir = TempDir::new().unwrap();
        let candidate = dir.path().join("a.pdf");
        fs::write(&candidate, "x").unwrap();
        let (reporter, rx) = reporter();

        assert_eq!(resolve(&candidate, DuplicatePolicy::Skip, &reporter), None);
        let events = rx.drain();
        assert!(matches!(
            &events[..],
            [Event::Log { level: LogLevel::Info, text }] if text.contains("a.pdf")
        ));
    }

    #[test]
    fn test_rename_picks_smallest_free_suffix_and_advances() {
        let dir = TempDir::new().unwrap();
        let candidate = dir.path().join("a.pdf");
        fs::write(&candidate, "x").unwrap();
        let (reporter, _rx) = reporter();

        let first = resolve(&candidate, DuplicatePolicy::Rename, &reporter).unwrap();
        assert_eq!(first, dir.path().join("a (1).pdf"));
        assert!(!first.exists());

        fs::write(&first, "y").unwrap();
        let second = resolve(&candidate, DuplicatePolicy::Rename, &reporter).unwrap();
        assert_eq!(second, dir.path().join("a (2).pdf"));
    }

    #[test]
    fn test_rename_fills_gaps() {
        let dir = TempDir::new().unwrap();
        let candidate = dir.path().join("a.pdf");
        fs::write(&candidate, "x").unwrap();
        fs::write(dir.path().join("a (2).pdf"), "x").unwrap();
        let (reporter, _rx) = reporter();

        let resolved = resolve(&candidate, DuplicatePolicy::Rename, &reporter).unwrap();
        assert_eq!(resolved, dir.path().join("a (1).pdf"));
    }

    #[test]
    fn test_resolve_with_custom_existence() {
        let claimed: HashSet<PathBuf> = [PathBuf::from("/out/a.txt"), PathBuf::from("/out/a (1).txt")]
            .into_iter()
            .collect();
        let (reporter, rx) = reporter();

        let resolved = resolve_with(
            Path::new("/out/a.txt"),
            DuplicatePolicy::Rename,
            &reporter,
            |p| claimed.contains(p),
        );
        assert_eq!(resolved, Some(PathBuf::from("/out/a (2).txt")));
        assert_eq!(rx.drain().len(), 1);
    }

    #[test]
    fn test_unknown_policy_degrades_to_rename_with_warning() {
        let (reporter, rx) = reporter();
        assert_eq!(
            DuplicatePolicy::from_setting_or_rename("overwrite", &reporter),
            DuplicatePolicy::Rename
        );
        assert!(matches!(
            &rx.drain()[..],
            [Event::Log { level: LogLevel::Warning, text }] if text.contains("overwrite")
        ));

        assert_eq!(
            DuplicatePolicy::from_setting_or_rename("SKIP", &reporter),
            DuplicatePolicy::Skip
        );
        assert!(rx.drain().is_empty());
    }
}
