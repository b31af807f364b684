//! Diagnostic logging to a file. The terminal belongs to the viewer, so no
//! layer ever writes to stdout or stderr.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "JOBMUX_LOG";
pub const LOG_DIR_ENV: &str = "JOBMUX_LOG_DIR";

#[derive(Debug)]
pub enum LoggingError {
    Filter(String),
    CreateDir { path: PathBuf, error: std::io::Error },
    Install(String),
}

impl std::fmt::Display for LoggingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoggingError::Filter(error) => write!(f, "invalid {LOG_ENV} filter: {error}"),
            LoggingError::CreateDir { path, error } => {
                write!(f, "failed to create log directory {}: {error}", path.display())
            }
            LoggingError::Install(error) => write!(f, "failed to install logger: {error}"),
        }
    }
}

impl std::error::Error for LoggingError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub filter: String,
    pub directory: PathBuf,
}

impl LogConfig {
    /// `None` unless `JOBMUX_LOG` names a filter.
    pub fn from_env() -> Option<Self> {
        Self::from_values(
            std::env::var(LOG_ENV).ok(),
            std::env::var(LOG_DIR_ENV).ok(),
        )
    }

    fn from_values(filter: Option<String>, directory: Option<String>) -> Option<Self> {
        let filter = filter
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())?;
        let directory = directory
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("jobmux"));
        Some(Self { filter, directory })
    }

    pub fn file_name() -> String {
        format!("jobmux.{}.log", std::process::id())
    }

    pub fn log_path(&self) -> PathBuf {
        self.directory.join(Self::file_name())
    }
}

/// Flushes buffered log lines when dropped.
pub struct LogGuard {
    path: PathBuf,
    _worker: WorkerGuard,
}

impl LogGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Installs the global subscriber writing to [`LogConfig::log_path`].
pub fn init(config: &LogConfig) -> Result<LogGuard, LoggingError> {
    let filter =
        EnvFilter::try_new(&config.filter).map_err(|error| LoggingError::Filter(error.to_string()))?;
    create_dir(&config.directory)?;

    let appender = tracing_appender::rolling::never(&config.directory, LogConfig::file_name());
    let (writer, worker) = tracing_appender::non_blocking(appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_thread_names(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .map_err(|error| LoggingError::Install(error.to_string()))?;
    Ok(LogGuard {
        path: config.log_path(),
        _worker: worker,
    })
}

fn create_dir(path: &Path) -> Result<(), LoggingError> {
    std::fs::create_dir_all(path).map_err(|error| LoggingError::CreateDir {
        path: path.to_path_buf(),
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_is_off_without_a_filter() {
        assert_eq!(LogConfig::from_values(None, Some("/tmp/x".to_owned())), None);
        assert_eq!(LogConfig::from_values(Some("  ".to_owned()), None), None);
    }

    #[test]
    fn directory_defaults_under_temp_dir() {
        let config = LogConfig::from_values(Some("jobmux=debug".to_owned()), None).expect("config");
        assert_eq!(config.filter, "jobmux=debug");
        assert_eq!(config.directory, std::env::temp_dir().join("jobmux"));

        let config = LogConfig::from_values(Some("info".to_owned()), Some("/var/log/jm".to_owned()))
            .expect("config");
        assert_eq!(config.directory, PathBuf::from("/var/log/jm"));
        assert!(config
            .log_path()
            .to_string_lossy()
            .ends_with(&format!("jobmux.{}.log", std::process::id())));
    }

    #[test]
    fn invalid_filter_is_reported() {
        let config = LogConfig {
            filter: "[[[".to_owned(),
            directory: std::env::temp_dir().join("jobmux-test-logs"),
        };
        assert!(matches!(init(&config), Err(LoggingError::Filter(_))));
    }
}
