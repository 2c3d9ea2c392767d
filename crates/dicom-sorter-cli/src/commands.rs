use clap::{ArgAction, Parser};
use dicom_sorter_core::archive::ArchiveFormat;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dicom-sorter")]
#[command(
    about = "Sort DICOM files, including those inside zip/tar archives, into tar bundles or a sorted tree",
    long_about = None
)]
pub struct Cli {
    /// Folder containing DICOM files and/or .zip/.tgz/.tar.gz/.tar.bz2 archives
    pub source_dir: PathBuf,

    /// Folder receiving the tar bundles (or sorted files with --sort)
    pub output_dir: PathBuf,

    /// Clinical scans (true/1/t); selects the clinical sort rule
    #[arg(action = ArgAction::Set, value_parser = parse_flag, default_value = "false")]
    pub clinical: bool,

    /// Copy sorted files into output_dir instead of writing tar bundles
    #[arg(long)]
    pub sort: bool,

    /// Number of leading path segments that name a bundle
    #[arg(long)]
    pub depth: Option<usize>,

    /// Base directory for temporary extraction (default: platform temp dir)
    #[arg(long)]
    pub extract_to: Option<PathBuf>,

    /// Bundle format: tar, tar.gz, tar.bz2 or zip
    #[arg(long)]
    pub format: Option<ArchiveFormat>,

    /// Configuration file (default: ./DicomSorter.toml if present)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

fn parse_flag(value: &str) -> Result<bool, String> {
    Ok(matches!(value.to_lowercase().as_str(), "true" | "1" | "t"))
}
