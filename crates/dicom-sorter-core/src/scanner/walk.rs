use crate::config::{has_archive_suffix, SorterConfig};
use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::{error, warn};
use walkdir::WalkDir;

/// Which files a run looks at: archive suffixes, glob ignore patterns and
/// directories excluded from traversal (the scratch workspace, when it lives
/// inside the source tree).
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    suffixes: Vec<String>,
    ignore_patterns: Vec<Pattern>,
    excluded: Vec<PathBuf>,
}

impl Discovery {
    pub fn new(config: &SorterConfig) -> Self {
        Self {
            suffixes: config.archive_suffixes.clone(),
            ignore_patterns: compile_patterns(&config.ignore_patterns),
            excluded: Vec::new(),
        }
    }

    pub fn with_suffixes(suffixes: &[&str]) -> Self {
        Self {
            suffixes: suffixes.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn exclude(mut self, dir: &Path) -> Self {
        self.excluded.push(dir.to_path_buf());
        self
    }

    pub fn is_archive(&self, path: &Path) -> bool {
        has_archive_suffix(path, &self.suffixes)
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
    }

    /// Excluded directories that lie below `root`. A directory containing
    /// `root` does not prune the walk.
    fn exclusions_under(&self, root: &Path) -> Vec<&Path> {
        self.excluded
            .iter()
            .filter(|dir| !root.starts_with(dir))
            .map(PathBuf::as_path)
            .collect()
    }

    /// Every regular file under `root`, in file-name order per directory.
    /// Unreadable entries are logged and skipped. Symlinks are not followed.
    /// Exclusions apply below `root`, never to `root` itself or to a
    /// directory that contains it.
    pub fn files(&self, root: &Path) -> Vec<PathBuf> {
        if !root.is_dir() {
            warn!("Not a directory, nothing to scan: {}", root.display());
            return Vec::new();
        }
        let excluded = self.exclusions_under(root);

        WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !(excluded.iter().any(|dir| entry.path().starts_with(dir))
                        || self.is_ignored(entry.path()))
            })
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    error!("Error walking {}: {}", root.display(), err);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect()
    }

    pub fn archives(&self, root: &Path) -> Vec<PathBuf> {
        self.files(root)
            .into_iter()
            .filter(|path| self.is_archive(path))
            .collect()
    }

    pub fn data_files(&self, root: &Path) -> Vec<PathBuf> {
        self.files(root)
            .into_iter()
            .filter(|path| !self.is_archive(path))
            .collect()
    }
}

fn compile_patterns(globs: &[String]) -> Vec<Pattern> {
    globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect()
}
