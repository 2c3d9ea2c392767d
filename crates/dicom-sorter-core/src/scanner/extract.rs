use super::walk::Discovery;
use crate::archive;
use crate::progress::ProgressReporter;
use crate::report::{RunReport, Stage};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ExtractedArchive {
    pub archive: PathBuf,
    pub target: PathBuf,
    pub files: usize,
}

/// Decode every archive found under `root_dir` into its own directory below
/// `destination_dir`, named `<archive file name>-<uuid>` so identically named
/// archives never share output. Archives found inside extracted output are
/// not extracted again.
///
/// A failing archive is logged and recorded, and whatever it had already
/// written is removed; the others still run.
pub fn extract_all(
    root_dir: &Path,
    discovery: &Discovery,
    destination_dir: &Path,
    report: &RunReport,
    progress: &dyn ProgressReporter,
) -> Vec<ExtractedArchive> {
    let start = Instant::now();
    let archives = discovery.archives(root_dir);
    let total = archives.len();
    info!("Found {} archives under {}", total, root_dir.display());
    progress.on_extract_start(total);

    let done = AtomicUsize::new(0);
    let extracted: Vec<ExtractedArchive> = archives
        .par_iter()
        .filter_map(|archive_path| {
            let result = extract_one(archive_path, destination_dir);
            progress.on_extract_progress(done.fetch_add(1, Ordering::Relaxed) + 1, total);

            match result {
                Ok(extracted) => {
                    report.done(
                        Stage::Extract,
                        archive_path,
                        format!("{} files", extracted.files),
                    );
                    Some(extracted)
                }
                Err(reason) => {
                    error!("Skipping archive {}: {}", archive_path.display(), reason);
                    report.failed(Stage::Extract, archive_path, reason);
                    None
                }
            }
        })
        .collect();

    progress.on_extract_complete(
        extracted.len(),
        total - extracted.len(),
        start.elapsed().as_secs_f64(),
    );
    extracted
}

fn extract_one(archive_path: &Path, destination_dir: &Path) -> Result<ExtractedArchive, String> {
    let file_name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    let target = destination_dir.join(format!("{}-{}", file_name, Uuid::new_v4()));

    fs::create_dir_all(&target)
        .map_err(|e| format!("Failed to create {}: {}", target.display(), e))?;

    let files = match archive::decode(archive_path, &target) {
        Ok(files) => files,
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(&target) {
                warn!("Failed to remove {}: {}", target.display(), cleanup);
            }
            return Err(e.to_string());
        }
    };

    Ok(ExtractedArchive {
        archive: archive_path.to_path_buf(),
        target,
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentReporter;
    use crate::report::Outcome;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, name: &str, data: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        zip.start_file(name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn test_same_named_archives_extract_to_disjoint_dirs() {
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        write_zip(&src.path().join("site_a/0001.zip"), "00001.dcm", b"from a");
        write_zip(&src.path().join("site_b/0001.zip"), "00001.dcm", b"from b");

        let report = RunReport::new();
        let extracted = extract_all(
            src.path(),
            &Discovery::with_suffixes(&[".zip"]),
            dest.path(),
            &report,
            &SilentReporter,
        );

        assert_eq!(extracted.len(), 2);
        assert_ne!(extracted[0].target, extracted[1].target);

        let mut contents: Vec<Vec<u8>> = extracted
            .iter()
            .map(|e| fs::read(e.target.join("00001.dcm")).unwrap())
            .collect();
        contents.sort();
        assert_eq!(contents, vec![b"from a".to_vec(), b"from b".to_vec()]);
    }

    #[test]
    fn test_corrupt_archive_does_not_stop_others() {
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        fs::write(src.path().join("0000.zip"), b"garbage").unwrap();
        fs::write(src.path().join("0001.tar.gz"), b"also garbage").unwrap();
        write_zip(&src.path().join("0002.zip"), "ok.dcm", b"ok");

        let report = RunReport::new();
        let extracted = extract_all(
            src.path(),
            &Discovery::with_suffixes(&[".zip", ".tar.gz"]),
            dest.path(),
            &report,
            &SilentReporter,
        );

        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].archive, src.path().join("0002.zip"));
        assert_eq!(
            report.count(Stage::Extract, |o| matches!(o, Outcome::Failed(_))),
            2
        );
    }

    #[test]
    fn test_truncated_archive_leaves_no_members() {
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();

        let mut builder = tar::Builder::new(Vec::new());
        for (name, size) in [("first.dcm", 600usize), ("second.dcm", 600)] {
            let mut header = tar::Header::new_gnu();
            header.set_size(size as u64);
            header.set_mode(0o644);
            builder
                .append_data(&mut header, name, vec![7u8; size].as_slice())
                .unwrap();
        }
        let mut bytes = builder.into_inner().unwrap();
        // first member (header + two data blocks), then part of the next header
        bytes.truncate(512 * 3 + 200);
        fs::write(src.path().join("cut.tar"), &bytes).unwrap();

        let report = RunReport::new();
        let extracted = extract_all(
            src.path(),
            &Discovery::with_suffixes(&[".tar"]),
            dest.path(),
            &report,
            &SilentReporter,
        );

        assert!(extracted.is_empty());
        assert_eq!(
            report.count(Stage::Extract, |o| matches!(o, Outcome::Failed(_))),
            1
        );
        assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 0);
    }
}
