/// Trait for reporting sort progress.
///
/// CLI implements with indicatif. All methods have default no-op implementations.
/// Methods may be called from rayon worker threads.
pub trait ProgressReporter: Send + Sync {
    fn on_extract_start(&self, _archives: usize) {}
    fn on_extract_progress(&self, _archives_done: usize, _total_archives: usize) {}
    fn on_extract_complete(&self, _extracted: usize, _failed: usize, _duration_secs: f64) {}
    fn on_classify_start(&self, _files: usize) {}
    fn on_classify_progress(&self, _files_done: usize, _total_files: usize) {}
    fn on_classify_complete(&self, _classified: usize, _skipped: usize, _failed: usize, _duration_secs: f64) {}
    fn on_materialize_start(&self, _total: usize) {}
    fn on_materialize_progress(&self, _done: usize, _total: usize) {}
    fn on_materialize_complete(&self, _written: usize, _failed: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
