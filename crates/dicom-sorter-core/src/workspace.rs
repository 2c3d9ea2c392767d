use crate::error::Error;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error};
use uuid::Uuid;

pub const WORKSPACE_PREFIX: &str = "DicomSorter-";
const EXTRACT_DIR: &str = "extract";

/// Scratch space owned by one sorting session.
///
/// Layout: `<base>/DicomSorter-<uuid>/extract`. The root is removed
/// recursively when the workspace is dropped or closed. The base directory
/// is never touched.
#[derive(Debug)]
pub struct ScratchWorkspace {
    root: PathBuf,
    extract_dir: PathBuf,
    released: bool,
}

impl ScratchWorkspace {
    /// Allocate a fresh workspace under `base`, or the platform temp dir.
    pub fn create(base: Option<&Path>) -> Result<Self, Error> {
        let base = match base {
            Some(dir) => dir.to_path_buf(),
            None => env::temp_dir(),
        };
        let base = fs::create_dir_all(&base)
            .and_then(|_| fs::canonicalize(&base))
            .map_err(|source| Error::Workspace {
                path: base.clone(),
                source,
            })?;

        let root = base.join(format!("{}{}", WORKSPACE_PREFIX, Uuid::new_v4()));
        // create_dir (not create_dir_all) so an existing directory is never adopted
        fs::create_dir(&root).map_err(|source| Error::Workspace {
            path: root.clone(),
            source,
        })?;

        let workspace = Self {
            extract_dir: root.join(EXTRACT_DIR),
            root,
            released: false,
        };
        // From here on Drop owns cleanup, even if the subdirectory fails.
        fs::create_dir(&workspace.extract_dir).map_err(|source| Error::Workspace {
            path: workspace.extract_dir.clone(),
            source,
        })?;

        debug!("Created scratch workspace {}", workspace.root.display());
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extract_dir(&self) -> &Path {
        &self.extract_dir
    }

    /// Remove the workspace now and surface any removal failure.
    pub fn close(mut self) -> Result<(), Error> {
        self.released = true;
        remove_root(&self.root).map_err(|source| Error::Workspace {
            path: self.root.clone(),
            source,
        })
    }
}

impl Drop for ScratchWorkspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = remove_root(&self.root) {
            error!(
                "Failed to remove scratch workspace {}: {}",
                self.root.display(),
                e
            );
        }
    }
}

fn remove_root(root: &Path) -> io::Result<()> {
    match fs::remove_dir_all(root) {
        Ok(()) => {
            debug!("Removed scratch workspace {}", root.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn workspace_dirs(base: &Path) -> Vec<PathBuf> {
        fs::read_dir(base)
            .unwrap()
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().starts_with(WORKSPACE_PREFIX))
                    .unwrap_or(false)
            })
            .collect()
    }

    #[test]
    fn test_workspace_removed_on_drop() {
        let base = tempdir().unwrap();
        let root = {
            let ws = ScratchWorkspace::create(Some(base.path())).unwrap();
            fs::write(ws.extract_dir().join("member.dcm"), b"x").unwrap();
            assert!(ws.extract_dir().is_dir());
            ws.root().to_path_buf()
        };
        assert!(!root.exists());
        assert!(base.path().exists());
    }

    #[test]
    fn test_workspace_removed_when_scope_errors() {
        let base = tempdir().unwrap();

        let run = || -> Result<(), Error> {
            let ws = ScratchWorkspace::create(Some(base.path()))?;
            fs::create_dir_all(ws.extract_dir().join("0001.zip-x/deep"))?;
            Err(Error::InvalidDepth(0))
        };

        assert!(run().is_err());
        assert!(workspace_dirs(base.path()).is_empty());
    }

    #[test]
    fn test_concurrent_sessions_get_distinct_roots() {
        let base = tempdir().unwrap();
        let a = ScratchWorkspace::create(Some(base.path())).unwrap();
        let b = ScratchWorkspace::create(Some(base.path())).unwrap();
        assert_ne!(a.root(), b.root());
        assert_eq!(workspace_dirs(base.path()).len(), 2);

        a.close().unwrap();
        assert_eq!(workspace_dirs(base.path()).len(), 1);
        drop(b);
        assert!(workspace_dirs(base.path()).is_empty());
    }

    #[test]
    fn test_close_leaves_unrelated_directories() {
        let base = tempdir().unwrap();
        let neighbour = base.path().join("keep-me");
        fs::create_dir(&neighbour).unwrap();

        let ws = ScratchWorkspace::create(Some(base.path())).unwrap();
        ws.close().unwrap();
        assert!(neighbour.is_dir());
    }
}
