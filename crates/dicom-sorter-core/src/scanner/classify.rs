use super::walk::Discovery;
use crate::classify::{Classification, Classifier, MappingEntry};
use crate::progress::ProgressReporter;
use crate::report::{RunReport, Stage};
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, error, info};

enum FileOutcome {
    Sorted(MappingEntry),
    Skipped,
    Failed(String),
}

/// Run `classifier` over every non-archive file under `search_dirs`.
///
/// Directories are walked in the order given. Files are classified in
/// parallel but the returned mapping keeps discovery order. Skipped and
/// failed files are recorded in `report` and left out of the mapping.
pub fn classify_all<C>(
    search_dirs: &[&Path],
    discovery: &Discovery,
    classifier: &C,
    report: &RunReport,
    progress: &dyn ProgressReporter,
) -> Vec<MappingEntry>
where
    C: Classifier + ?Sized,
{
    let start = Instant::now();
    let files: Vec<PathBuf> = search_dirs
        .iter()
        .flat_map(|dir| discovery.data_files(dir))
        .collect();
    let total = files.len();
    info!("Classifying {} files", total);
    progress.on_classify_start(total);

    let done = AtomicUsize::new(0);
    let outcomes: Vec<FileOutcome> = files
        .par_iter()
        .map(|path| {
            let outcome = classify_one(path, classifier);
            progress.on_classify_progress(done.fetch_add(1, Ordering::Relaxed) + 1, total);
            match &outcome {
                FileOutcome::Sorted(entry) => {
                    report.done(Stage::Classify, path, entry.relative.archive_name())
                }
                FileOutcome::Skipped => report.skipped(Stage::Classify, path),
                FileOutcome::Failed(reason) => report.failed(Stage::Classify, path, reason.as_str()),
            }
            outcome
        })
        .collect();

    let mut mapping = Vec::with_capacity(outcomes.len());
    let (mut skipped, mut failed) = (0, 0);
    for outcome in outcomes {
        match outcome {
            FileOutcome::Sorted(entry) => mapping.push(entry),
            FileOutcome::Skipped => skipped += 1,
            FileOutcome::Failed(_) => failed += 1,
        }
    }

    debug!(
        "Classification completed in {:.2}s: {} sorted, {} skipped, {} failed",
        start.elapsed().as_secs_f64(),
        mapping.len(),
        skipped,
        failed,
    );
    progress.on_classify_complete(mapping.len(), skipped, failed, start.elapsed().as_secs_f64());
    mapping
}

fn classify_one<C>(path: &Path, classifier: &C) -> FileOutcome
where
    C: Classifier + ?Sized,
{
    let result = panic::catch_unwind(AssertUnwindSafe(|| classifier.classify(path)));

    match result {
        Ok(Ok(Classification::Sorted(relative))) => FileOutcome::Sorted(MappingEntry {
            source: path.to_path_buf(),
            relative,
        }),
        Ok(Ok(Classification::Skip)) => {
            debug!("Skipped {}", path.display());
            FileOutcome::Skipped
        }
        Ok(Err(e)) => {
            error!("Failed to classify {}: {}", path.display(), e);
            FileOutcome::Failed(e.to_string())
        }
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "classifier panicked".to_string());
            error!("Classifier panicked on {}: {}", path.display(), reason);
            FileOutcome::Failed(reason)
        }
    }
}
