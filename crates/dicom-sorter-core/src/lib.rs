pub mod archive;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod materialize;
pub mod plan;
pub mod progress;
pub mod report;
pub mod scanner;
pub mod workspace;

pub use classify::{CanonicalPath, Classification, Classifier, ClassifyError, MappingEntry};
pub use config::SorterConfig;
pub use engine::{BundleResult, DicomSorter, SortResult};
pub use error::Error;
pub use plan::BundleSpec;
pub use progress::{ProgressReporter, SilentReporter};
pub use report::{Outcome, Record, RunReport, Stage};
pub use workspace::ScratchWorkspace;
