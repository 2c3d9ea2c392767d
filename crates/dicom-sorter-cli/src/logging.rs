use std::env;
use std::path::PathBuf;
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LEVEL: &str = "info";
const DEFAULT_LOG_FILE: &str = "./logs/dicom-sorter.log";

/// Where sorter logs go: a terse stderr stream for the operator, and a full
/// file log next to the run.
#[derive(Debug, PartialEq, Eq)]
struct LogSettings {
    filter: String,
    log_dir: PathBuf,
    log_file: PathBuf,
}

impl LogSettings {
    fn from_env() -> Self {
        Self::resolve(
            env::var("TRACING_LEVEL").ok(),
            env::var("LOG_FILE_PATH").ok(),
        )
    }

    fn resolve(level: Option<String>, log_path: Option<String>) -> Self {
        let filter = level
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LEVEL.to_string());
        let log_path = PathBuf::from(log_path.unwrap_or_else(|| DEFAULT_LOG_FILE.to_string()));

        let log_dir = match log_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let log_file = log_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("dicom-sorter.log"));

        Self {
            filter,
            log_dir,
            log_file,
        }
    }

    fn log_path(&self) -> PathBuf {
        self.log_dir.join(&self.log_file)
    }
}

/// Install the global subscriber. Keep the returned guard alive for the
/// whole run or buffered file output is lost.
pub fn init_logger() -> WorkerGuard {
    let settings = LogSettings::from_env();
    let file_appender = tracing_appender::rolling::never(&settings.log_dir, &settings.log_file);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time()
                .with_ansi(true),
        )
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_thread_ids(true)
                .with_ansi(false),
        )
        .with(EnvFilter::new(&settings.filter))
        .init();

    debug!(
        "Logging at '{}' to stderr and {}",
        settings.filter,
        settings.log_path().display()
    );
    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = LogSettings::resolve(None, None);
        assert_eq!(settings.filter, "info");
        assert_eq!(settings.log_dir, PathBuf::from("./logs"));
        assert_eq!(settings.log_file, PathBuf::from("dicom-sorter.log"));
    }

    #[test]
    fn test_blank_level_falls_back() {
        let settings = LogSettings::resolve(Some("  ".to_string()), None);
        assert_eq!(settings.filter, "info");
    }

    #[test]
    fn test_bare_file_name_logs_to_working_dir() {
        let settings =
            LogSettings::resolve(Some("dicom_sorter_core=debug".to_string()), Some("run.log".to_string()));
        assert_eq!(settings.filter, "dicom_sorter_core=debug");
        assert_eq!(settings.log_path(), PathBuf::from("./run.log"));
    }
}
