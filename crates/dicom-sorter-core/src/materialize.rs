use crate::archive::{ArchiveFormat, BundleWriter};
use crate::error::Error;
use crate::plan::{Bundle, CopyOp};
use crate::progress::ProgressReporter;
use crate::report::{RunReport, Stage};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct CopySummary {
    pub copied: Vec<PathBuf>,
    pub failures: Vec<Failure>,
}

#[derive(Debug, Default)]
pub struct BundleSummary {
    pub archives: Vec<PathBuf>,
    pub failures: Vec<Failure>,
}

/// Execute a flat copy plan. Each copy creates its missing parent
/// directories. A failed copy is recorded and the rest continue.
pub fn copy_files(
    ops: &[CopyOp],
    report: &RunReport,
    progress: &dyn ProgressReporter,
) -> CopySummary {
    let start = Instant::now();
    let total = ops.len();
    info!("Copying {} files", total);
    progress.on_materialize_start(total);

    let done = AtomicUsize::new(0);
    let results: Vec<Result<PathBuf, Failure>> = ops
        .par_iter()
        .map(|op| {
            let result = copy_one(op);
            progress.on_materialize_progress(done.fetch_add(1, Ordering::Relaxed) + 1, total);
            match result {
                Ok(()) => {
                    report.done(Stage::Copy, &op.source, op.target.display().to_string());
                    Ok(op.target.clone())
                }
                Err(e) => {
                    error!("Copy {} failed: {}", op.source.display(), e);
                    report.failed(Stage::Copy, &op.source, e.to_string());
                    Err(Failure {
                        path: op.source.clone(),
                        reason: e.to_string(),
                    })
                }
            }
        })
        .collect();

    let mut summary = CopySummary::default();
    for result in results {
        match result {
            Ok(target) => summary.copied.push(target),
            Err(failure) => summary.failures.push(failure),
        }
    }

    progress.on_materialize_complete(
        summary.copied.len(),
        summary.failures.len(),
        start.elapsed().as_secs_f64(),
    );
    summary
}

fn copy_one(op: &CopyOp) -> Result<(), Error> {
    if let Some(parent) = op.target.parent() {
        fs::create_dir_all(parent).map_err(|source| Error::Materialize {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::copy(&op.source, &op.target).map_err(|source| Error::Materialize {
        path: op.target.clone(),
        source,
    })?;
    Ok(())
}

/// Write one archive per bundle, each member stored under its canonical
/// relative path. Bundles are independent and written in parallel; members
/// of a bundle are appended one at a time. A bundle with an unreadable member
/// is not published. Members stored under a different name than their
/// canonical path (repeated names in zip bundles) are recorded in `report`.
pub fn write_bundles(
    bundles: &[Bundle],
    format: ArchiveFormat,
    report: &RunReport,
    progress: &dyn ProgressReporter,
) -> BundleSummary {
    let start = Instant::now();
    let total = bundles.len();
    info!("Writing {} {} bundles", total, format);
    progress.on_materialize_start(total);

    let done = AtomicUsize::new(0);
    let results: Vec<Result<PathBuf, Failure>> = bundles
        .par_iter()
        .map(|bundle| {
            let result = write_one(bundle, format, report);
            progress.on_materialize_progress(done.fetch_add(1, Ordering::Relaxed) + 1, total);
            match result {
                Ok(path) => {
                    report.done(
                        Stage::Bundle,
                        &path,
                        format!("{} members", bundle.members.len()),
                    );
                    Ok(path)
                }
                Err(reason) => {
                    error!("Bundle {} failed: {}", bundle.archive_path.display(), reason);
                    report.failed(Stage::Bundle, &bundle.archive_path, reason.as_str());
                    Err(Failure {
                        path: bundle.archive_path.clone(),
                        reason,
                    })
                }
            }
        })
        .collect();

    let mut summary = BundleSummary::default();
    for result in results {
        match result {
            Ok(path) => summary.archives.push(path),
            Err(failure) => summary.failures.push(failure),
        }
    }

    progress.on_materialize_complete(
        summary.archives.len(),
        summary.failures.len(),
        start.elapsed().as_secs_f64(),
    );
    summary
}

fn write_one(bundle: &Bundle, format: ArchiveFormat, report: &RunReport) -> Result<PathBuf, String> {
    let mut writer = BundleWriter::create(&bundle.archive_path, format).map_err(|e| e.to_string())?;

    let mut renamed = Vec::new();
    for member in &bundle.members {
        let name = member.relative.archive_name();
        let stored = writer
            .add(&member.source, &name)
            .map_err(|e| describe_member_error(&member.source, e))?;
        if stored != name {
            renamed.push((member.source.as_path(), stored));
        }
    }

    let path = writer.finish().map_err(|e| e.to_string())?;
    for (source, stored) in renamed {
        warn!("{} stored as {} in {}", source.display(), stored, path.display());
        report.done(Stage::Bundle, source, format!("stored as {}", stored));
    }
    debug!("Bundle {} -> {}", bundle.key, path.display());
    Ok(path)
}

fn describe_member_error(source: &Path, err: Error) -> String {
    format!("member {}: {}", source.display(), err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{CanonicalPath, MappingEntry};
    use crate::progress::SilentReporter;
    use crate::report::Outcome;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_copy_failure_is_isolated() {
        let tmp = tempdir().unwrap();
        let good = tmp.path().join("good.dcm");
        fs::write(&good, b"good").unwrap();
        let out = tmp.path().join("out");

        let ops = vec![
            CopyOp {
                source: tmp.path().join("vanished.dcm"),
                target: out.join("P/Q/a.dcm"),
            },
            CopyOp {
                source: good.clone(),
                target: out.join("P/Q/b.dcm"),
            },
        ];

        let report = RunReport::new();
        let summary = copy_files(&ops, &report, &SilentReporter);

        assert_eq!(summary.copied, vec![out.join("P/Q/b.dcm")]);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].path, tmp.path().join("vanished.dcm"));
        assert_eq!(fs::read(out.join("P/Q/b.dcm")).unwrap(), b"good");
        assert_eq!(
            report.count(Stage::Copy, |o| matches!(o, Outcome::Failed(_))),
            1
        );
    }

    #[test]
    fn test_bundle_with_missing_member_is_not_published() {
        let tmp = tempdir().unwrap();
        let present = tmp.path().join("present.dcm");
        fs::write(&present, b"x").unwrap();
        let out = tmp.path().join("out");

        let bundles = vec![
            Bundle {
                key: "A_B".to_string(),
                archive_path: out.join("A_B.tar"),
                members: vec![
                    MappingEntry {
                        source: present.clone(),
                        relative: CanonicalPath::new("A/B/1.dcm").unwrap(),
                    },
                    MappingEntry {
                        source: tmp.path().join("gone.dcm"),
                        relative: CanonicalPath::new("A/B/2.dcm").unwrap(),
                    },
                ],
            },
            Bundle {
                key: "A_C".to_string(),
                archive_path: out.join("A_C.tar"),
                members: vec![MappingEntry {
                    source: present.clone(),
                    relative: CanonicalPath::new("A/C/3.dcm").unwrap(),
                }],
            },
        ];

        let report = RunReport::new();
        let summary = write_bundles(&bundles, ArchiveFormat::Tar, &report, &SilentReporter);

        assert_eq!(summary.archives, vec![out.join("A_C.tar")]);
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].reason.contains("gone.dcm"));
        assert!(!out.join("A_B.tar").exists());

        let leftovers: Vec<_> = fs::read_dir(&out).unwrap().flatten().map(|e| e.file_name()).collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("A_C.tar")]);

        let mut archive = tar::Archive::new(File::open(out.join("A_C.tar")).unwrap());
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["A/C/3.dcm".to_string()]);
    }

    #[test]
    fn test_zip_bundle_with_repeated_path_is_published() {
        let tmp = tempdir().unwrap();
        let first = tmp.path().join("first.dcm");
        let second = tmp.path().join("second.dcm");
        fs::write(&first, b"one").unwrap();
        fs::write(&second, b"two").unwrap();
        let out = tmp.path().join("out");

        let bundles = vec![Bundle {
            key: "A_B".to_string(),
            archive_path: out.join("A_B.zip"),
            members: vec![
                MappingEntry {
                    source: first.clone(),
                    relative: CanonicalPath::new("A/B/x.dcm").unwrap(),
                },
                MappingEntry {
                    source: second.clone(),
                    relative: CanonicalPath::new("A/B/x.dcm").unwrap(),
                },
            ],
        }];

        let report = RunReport::new();
        let summary = write_bundles(&bundles, ArchiveFormat::Zip, &report, &SilentReporter);

        assert!(summary.failures.is_empty());
        assert_eq!(summary.archives, vec![out.join("A_B.zip")]);

        let archive = zip::ZipArchive::new(File::open(out.join("A_B.zip")).unwrap()).unwrap();
        let mut names: Vec<&str> = archive.file_names().collect();
        names.sort();
        assert_eq!(names, vec!["A/B/x.dcm", "A/B/x_1.dcm"]);

        let renamed: Vec<_> = report
            .records()
            .into_iter()
            .filter(|r| r.path == second)
            .collect();
        assert_eq!(renamed.len(), 1);
        assert_eq!(renamed[0].outcome, Outcome::Done("stored as A/B/x_1.dcm".to_string()));
    }

    #[test]
    fn test_occupied_bundle_name_leaves_no_partial() {
        let tmp = tempdir().unwrap();
        let present = tmp.path().join("present.dcm");
        fs::write(&present, b"x").unwrap();
        let out = tmp.path().join("out");
        fs::create_dir_all(out.join("A_B.tar")).unwrap();

        let bundles = vec![Bundle {
            key: "A_B".to_string(),
            archive_path: out.join("A_B.tar"),
            members: vec![MappingEntry {
                source: present.clone(),
                relative: CanonicalPath::new("A/B/1.dcm").unwrap(),
            }],
        }];

        let report = RunReport::new();
        let summary = write_bundles(&bundles, ArchiveFormat::Tar, &report, &SilentReporter);

        assert!(summary.archives.is_empty());
        assert_eq!(summary.failures.len(), 1);
        let leftovers: Vec<_> = fs::read_dir(&out).unwrap().flatten().map(|e| e.file_name()).collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("A_B.tar")]);
        assert!(out.join("A_B.tar").is_dir());
    }
}
