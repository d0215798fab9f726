//! Recursive enumeration of the files to organize.
//!
//! Directories whose basename is excluded are pruned before descent, so nothing
//! below them is ever visited. Entries are sorted by name inside every
//! directory, which keeps the enumeration order repeatable for an unchanged
//! tree. Directory symlinks are never followed; a symlink whose target is a
//! regular file is yielded like the file itself.

use crate::config::FileFilter;
use crate::events::Reporter;
use std::fs;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Directory basenames pruned during traversal (".git", "node_modules", ...).
pub type ExcludedDirNames = HashSet<String>;

/// Configurable traversal of a source tree.
#[derive(Clone)]
pub struct TreeWalker {
    root: PathBuf,
    excluded: ExcludedDirNames,
    pruned_paths: Vec<PathBuf>,
    filter: FileFilter,
    reporter: Option<Reporter>,
}

impl TreeWalker {
    /// Walks everything under `root`. Relative roots are resolved against the
    /// current directory so every yielded path is absolute.
    pub fn new(root: &Path) -> Self {
        Self {
            root: absolute(root),
            excluded: ExcludedDirNames::new(),
            pruned_paths: Vec::new(),
            filter: FileFilter::default(),
            reporter: None,
        }
    }

    pub fn exclude_dirs(mut self, excluded: ExcludedDirNames) -> Self {
        self.excluded = excluded;
        self
    }

    /// Prunes one specific directory, e.g. a destination nested inside the source.
    /// The root itself is never pruned this way.
    pub fn prune_path(mut self, path: &Path) -> Self {
        self.pruned_paths.push(absolute(path));
        self
    }

    pub fn filter(mut self, filter: FileFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Sends a warning through `reporter` for every entry that cannot be read.
    /// Without one, those warnings only go to `tracing`.
    pub fn report_to(mut self, reporter: Reporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazily yields the absolute paths of the regular files that pass the filter.
    pub fn files(self) -> impl Iterator<Item = PathBuf> + use<> {
        let Self {
            root,
            excluded,
            pruned_paths,
            filter,
            reporter,
        } = self;
        let strip_root = root.clone();

        WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !is_pruned(entry, &excluded, &pruned_paths))
            .filter_map(move |entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    let message = format!("Skipping unreadable entry: {}", e);
                    match &reporter {
                        Some(reporter) => reporter.warning(message),
                        None => tracing::warn!("{}", message),
                    }
                    None
                }
            })
            .filter(is_regular_file)
            .map(DirEntry::into_path)
            .filter(move |path| {
                let relative = path.strip_prefix(&strip_root).unwrap_or(path);
                filter.should_include(relative)
            })
    }
}

fn is_pruned(entry: &DirEntry, excluded: &ExcludedDirNames, pruned_paths: &[PathBuf]) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name_excluded = entry
        .file_name()
        .to_str()
        .is_some_and(|name| excluded.contains(name));
    name_excluded || pruned_paths.iter().any(|p| p == entry.path())
}

fn is_regular_file(entry: &DirEntry) -> bool {
    entry.file_type().is_file()
        || (entry.path_is_symlink() && fs::metadata(entry.path()).is_ok_and(|m| m.is_file()))
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Lazily yields every regular file under `root`, skipping excluded directories.
pub fn walk(
    root: &Path,
    excluded: &ExcludedDirNames,
) -> impl Iterator<Item = PathBuf> + use<> {
    TreeWalker::new(root).exclude_dirs(excluded.clone()).files()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExcludeRules, FilterRules};
    use crate::events::{self, Event, LogLevel};
    use crate::logging::NullLogSink;
    use std::sync::Arc;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, rel).unwrap();
    }

    fn relative(root: &Path, paths: Vec<PathBuf>) -> Vec<String> {
        paths
            .into_iter()
            .map(|p| {
                p.strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    fn excluded(names: &[&str]) -> ExcludedDirNames {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_walk_is_recursive_and_files_only() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.txt");
        touch(dir.path(), "sub/b.txt");
        touch(dir.path(), "sub/deeper/c.txt");
        fs::create_dir(dir.path().join("empty")).unwrap();

        let mut files = relative(dir.path(), walk(dir.path(), &excluded(&[])).collect());
        files.sort();
        assert_eq!(files, vec!["a.txt", "sub/b.txt", "sub/deeper/c.txt"]);
    }

    #[test]
    fn test_walk_yields_absolute_paths() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.txt");
        for path in walk(dir.path(), &excluded(&[])) {
            assert!(path.is_absolute());
        }
    }

    #[test]
    fn test_excluded_names_pruned_at_any_depth() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "keep.txt");
        touch(dir.path(), ".git/config");
        touch(dir.path(), "project/node_modules/pkg/index.js");
        touch(dir.path(), "project/src/main.js");
        touch(dir.path(), "a/b/c/.git/HEAD");

        let files = relative(
            dir.path(),
            walk(dir.path(), &excluded(&[".git", "node_modules"])).collect(),
        );
        assert!(files.contains(&"keep.txt".to_string()));
        assert!(files.contains(&"project/src/main.js".to_string()));
        assert!(
            files
                .iter()
                .all(|f| !f.contains(".git/") && !f.contains("node_modules/")),
            "excluded subtrees leaked: {:?}",
            files
        );
    }

    #[test]
    fn test_exclusion_matches_basename_not_substring() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "my_build/out.txt");
        touch(dir.path(), "build/out.txt");

        let files = relative(dir.path(), walk(dir.path(), &excluded(&["build"])).collect());
        assert_eq!(files, vec!["my_build/out.txt"]);
    }

    #[test]
    fn test_excluded_file_name_is_not_pruned() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), ".DS_Store");

        let files = relative(dir.path(), walk(dir.path(), &excluded(&[".DS_Store"])).collect());
        assert_eq!(files, vec![".DS_Store"]);
    }

    #[test]
    fn test_order_is_repeatable() {
        let dir = TempDir::new().unwrap();
        for name in ["z.txt", "m/1.txt", "a.txt", "m/0.txt", "b/x.txt"] {
            touch(dir.path(), name);
        }
        let first: Vec<PathBuf> = walk(dir.path(), &excluded(&[])).collect();
        let second: Vec<PathBuf> = walk(dir.path(), &excluded(&[])).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_prune_path_skips_nested_destination() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "new.txt");
        touch(dir.path(), "sorted/Documents/old.txt");

        let files = relative(
            dir.path(),
            TreeWalker::new(dir.path())
                .prune_path(&dir.path().join("sorted"))
                .files()
                .collect(),
        );
        assert_eq!(files, vec!["new.txt"]);
    }

    #[test]
    fn test_prune_path_never_prunes_root() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.txt");

        let files: Vec<PathBuf> = TreeWalker::new(dir.path())
            .prune_path(dir.path())
            .files()
            .collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_file_filter_applied_to_relative_paths() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "keep.txt");
        touch(dir.path(), "scratch.tmp");
        touch(dir.path(), "logs/app.log");

        let filter = FilterRules {
            include_hidden: true,
            exclude: ExcludeRules {
                extensions: vec!["tmp".to_string()],
                patterns: vec!["logs/**".to_string()],
                ..Default::default()
            },
            ..Default::default()
        }
        .compile()
        .unwrap();

        let files = relative(
            dir.path(),
            TreeWalker::new(dir.path()).filter(filter).files().collect(),
        );
        assert_eq!(files, vec!["keep.txt"]);
    }

    #[test]
    fn test_unreadable_root_reported_as_warning() {
        let dir = TempDir::new().unwrap();
        let (tx, rx) = events::channel();
        let reporter = Reporter::new(Arc::new(NullLogSink), tx);

        let files: Vec<PathBuf> = TreeWalker::new(&dir.path().join("missing"))
            .report_to(reporter)
            .files()
            .collect();

        assert!(files.is_empty());
        assert!(matches!(
            &rx.drain()[..],
            [Event::Log { level: LogLevel::Warning, text }] if text.starts_with("Skipping unreadable entry")
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_symlinks_yielded_directory_symlinks_not_followed() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        touch(dir.path(), "real/file.txt");
        touch(outside.path(), "real.pdf");
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link_dir")).unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("real/file.txt"),
            dir.path().join("link_file.txt"),
        )
        .unwrap();
        std::os::unix::fs::symlink(outside.path().join("real.pdf"), dir.path().join("link.pdf"))
            .unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone.txt"), dir.path().join("dangling.txt"))
            .unwrap();

        let files = relative(dir.path(), walk(dir.path(), &excluded(&[])).collect());
        assert_eq!(files, vec!["link.pdf", "link_file.txt", "real/file.txt"]);
    }
}
