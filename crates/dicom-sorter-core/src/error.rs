use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Source directory does not exist: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Scratch workspace error at {}: {source}", path.display())]
    Workspace { path: PathBuf, source: io::Error },

    #[error("Failed to extract {}: {reason}", path.display())]
    Archive { path: PathBuf, reason: String },

    #[error("Failed to write {}: {source}", path.display())]
    Materialize { path: PathBuf, source: io::Error },

    #[error("Bundle depth must be at least 1, got {0}")]
    InvalidDepth(usize),

    #[error("Invalid canonical path '{0}'")]
    InvalidPath(String),
}
