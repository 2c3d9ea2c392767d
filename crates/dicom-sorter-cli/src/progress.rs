use dicom_sorter_core::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars, one bar per phase.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn start_bar(&self, label: &str, total: usize) {
        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::with_template(&format!(
            "  {{spinner:.cyan}} {} [{{bar:30.cyan/dim}}] {{pos}}/{{len}} ({{eta}} remaining)",
            label
        )) {
            pb.set_style(style.progress_chars("━╸─").tick_chars(TICK_CHARS));
        }
        pb.enable_steady_tick(Duration::from_millis(80));

        let mut guard = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn set_position(&self, done: usize) {
        let guard = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pb) = guard.as_ref() {
            pb.set_position(done as u64);
        }
    }

    fn finish_bar(&self) {
        let mut guard = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_extract_start(&self, archives: usize) {
        self.start_bar("Extracting", archives);
    }

    fn on_extract_progress(&self, archives_done: usize, _total_archives: usize) {
        self.set_position(archives_done);
    }

    fn on_extract_complete(&self, extracted: usize, failed: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Extraction complete: {} archives ({} failed) in {:.2}s",
            extracted, failed, duration_secs
        );
    }

    fn on_classify_start(&self, files: usize) {
        self.start_bar("Classifying", files);
    }

    fn on_classify_progress(&self, files_done: usize, _total_files: usize) {
        self.set_position(files_done);
    }

    fn on_classify_complete(&self, classified: usize, skipped: usize, failed: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Classification complete: {} sorted, {} skipped, {} failed in {:.2}s",
            classified, skipped, failed, duration_secs
        );
    }

    fn on_materialize_start(&self, total: usize) {
        self.start_bar("Writing", total);
    }

    fn on_materialize_progress(&self, done: usize, _total: usize) {
        self.set_position(done);
    }

    fn on_materialize_complete(&self, written: usize, failed: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Write complete: {} written, {} failed in {:.2}s",
            written, failed, duration_secs
        );
    }
}
