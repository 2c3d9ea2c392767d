use crate::archive::ArchiveFormat;
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_ARCHIVE_SUFFIXES: &[&str] =
    &[".tar", ".tgz", ".tar.gz", ".tar.bz2", ".tbz2", ".zip"];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SorterConfig {
    /// Base directory for scratch space. Falls back to the platform temp dir.
    pub extract_to_dir: Option<PathBuf>,
    pub archive_suffixes: Vec<String>,
    pub ignore_patterns: Vec<String>,
    pub bundle_separator: String,
    pub bundle_format: ArchiveFormat,
}

impl Default for SorterConfig {
    fn default() -> Self {
        Self {
            extract_to_dir: None,
            archive_suffixes: DEFAULT_ARCHIVE_SUFFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ignore_patterns: Vec::new(),
            bundle_separator: "_".to_string(),
            bundle_format: ArchiveFormat::Tar,
        }
    }
}

/// Load `path`, or `DicomSorter.{toml,json,yaml}` from the working directory
/// if present, then `DICOM_SORTER_*` environment variables.
pub fn load_configuration_from(path: Option<&Path>) -> Result<SorterConfig, ConfigError> {
    let file_source = match path {
        Some(path) => ConfigFile::from(path).required(true),
        None => ConfigFile::with_name("DicomSorter").required(false),
    };
    let builder = Config::builder()
        .add_source(file_source)
        .add_source(Environment::with_prefix("DICOM_SORTER"))
        .build()?;
    builder.try_deserialize::<SorterConfig>()
}

/// Suffix match on the file name, the way the sorter has always recognized
/// archives (`0001.tar.gz` matches both `.gz`-style suffixes and `.tar.gz`).
pub fn has_archive_suffix(path: &Path, suffixes: &[String]) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return false;
    };
    suffixes.iter().any(|suffix| name.ends_with(suffix.as_str()))
}
