use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Extract,
    Classify,
    Copy,
    Bundle,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extract => "extract",
            Stage::Classify => "classify",
            Stage::Copy => "copy",
            Stage::Bundle => "bundle",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Success, with a short description of what was produced.
    Done(String),
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct Record {
    pub stage: Stage,
    pub path: PathBuf,
    pub outcome: Outcome,
}

/// Collects one structured record per archive, file and bundle handled
/// during a run. Safe to share across rayon workers.
#[derive(Debug, Default)]
pub struct RunReport {
    records: Mutex<Vec<Record>>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, stage: Stage, path: &Path, outcome: Outcome) {
        let mut guard = self.records.lock().unwrap_or_else(|e| e.into_inner());
        guard.push(Record {
            stage,
            path: path.to_path_buf(),
            outcome,
        });
    }

    pub fn done(&self, stage: Stage, path: &Path, detail: impl Into<String>) {
        self.record(stage, path, Outcome::Done(detail.into()));
    }

    pub fn skipped(&self, stage: Stage, path: &Path) {
        self.record(stage, path, Outcome::Skipped);
    }

    pub fn failed(&self, stage: Stage, path: &Path, reason: impl Into<String>) {
        self.record(stage, path, Outcome::Failed(reason.into()));
    }

    pub fn extend(&self, records: impl IntoIterator<Item = Record>) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(records);
    }

    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn count(&self, stage: Stage, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.stage == stage && pred(&r.outcome))
            .count()
    }

    pub fn failures(&self) -> Vec<Record> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Failed(_)))
            .cloned()
            .collect()
    }
}
