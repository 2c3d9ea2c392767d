use crate::classify::{Classifier, MappingEntry};
use crate::config::SorterConfig;
use crate::error::Error;
use crate::materialize::{self, Failure};
use crate::plan::{self, BundleSpec};
use crate::progress::ProgressReporter;
use crate::report::{Record, RunReport};
use crate::scanner::{self, Discovery, ExtractedArchive};
use crate::workspace::ScratchWorkspace;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// One sorting session over a source tree.
///
/// Creating the session allocates its scratch workspace; dropping (or
/// closing) it removes the workspace again. Archives are extracted once per
/// session, the first time `sort` or `tar` runs.
pub struct DicomSorter<C: Classifier> {
    source_dir: PathBuf,
    output_dir: PathBuf,
    classifier: C,
    config: SorterConfig,
    workspace: ScratchWorkspace,
    extraction: Option<Extraction>,
}

struct Extraction {
    archives: Vec<ExtractedArchive>,
    records: Vec<Record>,
    duration: Duration,
}

#[derive(Debug)]
pub struct SortResult {
    pub extract_duration: Duration,
    pub classify_duration: Duration,
    pub copy_duration: Duration,
    pub archives_extracted: usize,
    /// `output_dir/<first segment>` for every sorted file, first-seen order.
    pub sorted_dirs: Vec<PathBuf>,
    pub copied: Vec<PathBuf>,
    pub failures: Vec<Failure>,
    pub report: RunReport,
}

#[derive(Debug)]
pub struct BundleResult {
    pub extract_duration: Duration,
    pub classify_duration: Duration,
    pub bundle_duration: Duration,
    pub archives_extracted: usize,
    pub files_bundled: usize,
    pub archives: Vec<PathBuf>,
    pub failures: Vec<Failure>,
    pub report: RunReport,
}

impl<C: Classifier> DicomSorter<C> {
    /// Fails with [`Error::SourceNotFound`] before creating anything when
    /// `source_dir` is not a directory.
    pub fn new(
        source_dir: &Path,
        classifier: C,
        output_dir: &Path,
        config: SorterConfig,
    ) -> Result<Self, Error> {
        if !source_dir.is_dir() {
            return Err(Error::SourceNotFound(source_dir.to_path_buf()));
        }
        let source_dir = fs::canonicalize(source_dir)
            .map_err(|_| Error::SourceNotFound(source_dir.to_path_buf()))?;

        let workspace = ScratchWorkspace::create(config.extract_to_dir.as_deref())?;
        info!(
            "Sorting {} into {} (scratch: {})",
            source_dir.display(),
            output_dir.display(),
            workspace.root().display()
        );

        Ok(Self {
            source_dir,
            output_dir: output_dir.to_path_buf(),
            classifier,
            config,
            workspace,
            extraction: None,
        })
    }

    /// Extract, classify and copy every classified file to
    /// `output_dir/<canonical path>`.
    pub fn sort(&mut self, progress: &dyn ProgressReporter) -> Result<SortResult, Error> {
        let report = RunReport::new();
        let (mapping, classify_duration) = self.prepare(&report, progress);
        let extraction = self.extraction_stats();

        let copy_start = Instant::now();
        let ops = plan::plan_copies(&mapping, &self.output_dir);
        let summary = materialize::copy_files(&ops, &report, progress);
        let copy_duration = copy_start.elapsed();

        let sorted_dirs = plan::top_level_dirs(&mapping, &self.output_dir);
        for dir in &sorted_dirs {
            info!("Sorted directory created: {}", dir.display());
        }

        Ok(SortResult {
            extract_duration: extraction.1,
            classify_duration,
            copy_duration,
            archives_extracted: extraction.0,
            sorted_dirs,
            copied: summary.copied,
            failures: summary.failures,
            report,
        })
    }

    /// Extract, classify and write one archive per bundle of files sharing
    /// their first `depth` path segments, using the configured separator and
    /// format.
    pub fn tar(&mut self, depth: usize, progress: &dyn ProgressReporter) -> Result<BundleResult, Error> {
        let spec = BundleSpec {
            depth,
            separator: self.config.bundle_separator.clone(),
            format: self.config.bundle_format,
        };
        self.bundle(&spec, progress)
    }

    pub fn bundle(
        &mut self,
        spec: &BundleSpec,
        progress: &dyn ProgressReporter,
    ) -> Result<BundleResult, Error> {
        if spec.depth == 0 {
            return Err(Error::InvalidDepth(spec.depth));
        }

        let report = RunReport::new();
        let (mapping, classify_duration) = self.prepare(&report, progress);
        let extraction = self.extraction_stats();

        let bundle_start = Instant::now();
        let bundles = plan::plan_bundles(&mapping, &self.output_dir, spec)?;
        let summary = materialize::write_bundles(&bundles, spec.format, &report, progress);
        let bundle_duration = bundle_start.elapsed();

        for archive in &summary.archives {
            info!("Tar file created: {}", archive.display());
        }
        let files_bundled = bundles
            .iter()
            .filter(|b| summary.archives.contains(&b.archive_path))
            .map(|b| b.members.len())
            .sum();

        Ok(BundleResult {
            extract_duration: extraction.1,
            classify_duration,
            bundle_duration,
            archives_extracted: extraction.0,
            files_bundled,
            archives: summary.archives,
            failures: summary.failures,
            report,
        })
    }

    /// Remove the scratch workspace now, surfacing removal errors.
    pub fn close(self) -> Result<(), Error> {
        self.workspace.close()
    }

    /// Walks see canonical paths: the source and workspace root are
    /// canonical, and the output dir is compared once it exists.
    fn discovery(&self) -> Discovery {
        let mut discovery = Discovery::new(&self.config).exclude(self.workspace.root());
        if let Ok(output_dir) = fs::canonicalize(&self.output_dir) {
            if output_dir != self.source_dir && output_dir.starts_with(&self.source_dir) {
                discovery = discovery.exclude(&output_dir);
            }
        }
        discovery
    }

    fn prepare(
        &mut self,
        report: &RunReport,
        progress: &dyn ProgressReporter,
    ) -> (Vec<MappingEntry>, Duration) {
        let discovery = self.discovery();

        if self.extraction.is_none() {
            let start = Instant::now();
            let extract_report = RunReport::new();
            let archives = scanner::extract_all(
                &self.source_dir,
                &discovery,
                self.workspace.extract_dir(),
                &extract_report,
                progress,
            );
            self.extraction = Some(Extraction {
                archives,
                records: extract_report.records(),
                duration: start.elapsed(),
            });
        }
        if let Some(extraction) = &self.extraction {
            report.extend(extraction.records.iter().cloned());
        }

        let start = Instant::now();
        let search_dirs = [self.source_dir.as_path(), self.workspace.extract_dir()];
        let mapping = scanner::classify_all(
            &search_dirs,
            &discovery,
            &self.classifier,
            report,
            progress,
        );
        let duration = start.elapsed();
        debug!(
            "{} files classified in {:.2}s",
            mapping.len(),
            duration.as_secs_f64()
        );
        (mapping, duration)
    }

    fn extraction_stats(&self) -> (usize, Duration) {
        self.extraction
            .as_ref()
            .map(|e| (e.archives.len(), e.duration))
            .unwrap_or_default()
    }
}
