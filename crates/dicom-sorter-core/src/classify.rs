use crate::error::Error;
use std::error::Error as StdError;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Error type returned by classifiers. Any error is accepted; the engine only
/// logs and records it.
pub type ClassifyError = Box<dyn StdError + Send + Sync>;

/// Destination of one file relative to the output root: directory segments
/// followed by the file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalPath {
    segments: Vec<String>,
}

impl CanonicalPath {
    /// Validate a classifier-produced path. It must be relative, non-empty
    /// and made only of plain segments (no `.`, `..`, root or prefix).
    pub fn new(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let mut segments = Vec::new();

        for component in path.components() {
            match component {
                Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
                _ => return Err(Error::InvalidPath(path.display().to_string())),
            }
        }

        if segments.is_empty() {
            return Err(Error::InvalidPath(path.display().to_string()));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Platform path, for joining onto an output directory.
    pub fn to_path_buf(&self) -> PathBuf {
        self.segments.iter().collect()
    }

    /// `/`-separated name used inside output archives.
    pub fn archive_name(&self) -> String {
        self.segments.join("/")
    }

    /// First `depth` segments (fewer if the path is shorter).
    pub fn prefix(&self, depth: usize) -> &[String] {
        &self.segments[..depth.min(self.segments.len())]
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.archive_name())
    }
}

impl TryFrom<&str> for CanonicalPath {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        CanonicalPath::new(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Sorted(CanonicalPath),
    /// Not a file this classifier handles. A normal outcome, not an error.
    Skip,
}

impl Classification {
    /// Convenience for classifiers that build a path: validates it.
    pub fn sorted(path: impl AsRef<Path>) -> Result<Self, ClassifyError> {
        Ok(Classification::Sorted(CanonicalPath::new(path)?))
    }
}

/// Computes where a file belongs. Implementations must not mutate the file.
pub trait Classifier: Send + Sync {
    fn classify(&self, path: &Path) -> Result<Classification, ClassifyError>;
}

impl<F> Classifier for F
where
    F: Fn(&Path) -> Result<Classification, ClassifyError> + Send + Sync,
{
    fn classify(&self, path: &Path) -> Result<Classification, ClassifyError> {
        self(path)
    }
}

/// Original file paired with its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub source: PathBuf,
    pub relative: CanonicalPath,
}
