//! Logging setup shared by the binaries.
//!
//! Level names follow the ones users already put in their service files
//! (`warning`, `critical`, `garbage`, ...). `RUST_LOG` overrides them.

use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_LEVELS: &[&str] = &[
    "none", "critical", "error", "warning", "warn", "info", "debug", "trace", "garbage",
];

/// Map a level name onto a tracing filter. Usable as a clap value parser.
pub fn parse_log_level(name: &str) -> Result<LevelFilter, String> {
    match name.to_lowercase().as_str() {
        "none" | "off" => Ok(LevelFilter::OFF),
        "critical" | "error" => Ok(LevelFilter::ERROR),
        "warning" | "warn" => Ok(LevelFilter::WARN),
        "info" => Ok(LevelFilter::INFO),
        "debug" => Ok(LevelFilter::DEBUG),
        "trace" | "garbage" => Ok(LevelFilter::TRACE),
        other => Err(format!(
            "invalid log level '{}' (expected one of: {})",
            other,
            LOG_LEVELS.join(", ")
        )),
    }
}

#[derive(Debug, Clone)]
pub struct LogOptions {
    pub level: LevelFilter,
    pub logfile: Option<PathBuf>,
    /// Rotate the log file daily instead of appending forever.
    pub rotate: bool,
    pub stdout: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            logfile: None,
            rotate: false,
            stdout: true,
        }
    }
}

fn file_appender(path: &Path, rotate: bool) -> std::io::Result<RollingFileAppender> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "deluge.log".to_string());

    if !rotate {
        return RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(file_name)
            .build(dir)
            .map_err(std::io::Error::other);
    }
    let (prefix, suffix) = match file_name.rsplit_once('.') {
        Some((p, s)) => (p.to_string(), s.to_string()),
        None => (file_name.clone(), "log".to_string()),
    };
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(7)
        .filename_prefix(prefix)
        .filename_suffix(suffix)
        .build(dir)
        .map_err(std::io::Error::other)
}

/// Install the global subscriber. Keep the returned guard alive for as long
/// as file logging should be flushed.
pub fn setup_logging(opts: &LogOptions) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::builder()
        .with_default_directive(opts.level.into())
        .from_env_lossy();

    let (file_layer, guard) = match &opts.logfile {
        Some(path) => {
            let appender = file_appender(path, opts.rotate)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    let stdout_layer = opts.stdout.then(fmt::layer);

    // A subscriber may already be installed (tests, embedded daemon).
    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
    {
        tracing::debug!("Logging already initialised: {}", e);
    }
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("warning"), Ok(LevelFilter::WARN));
        assert_eq!(parse_log_level("CRITICAL"), Ok(LevelFilter::ERROR));
        assert_eq!(parse_log_level("garbage"), Ok(LevelFilter::TRACE));
        assert_eq!(parse_log_level("none"), Ok(LevelFilter::OFF));
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn test_file_appender_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("deluged.log");
        file_appender(&path, false).unwrap();
        assert!(dir.path().join("logs").is_dir());
        file_appender(&path, true).unwrap();
    }

    #[test]
    fn test_file_appender_reports_unopenable_path() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("deluged.log");
        std::fs::create_dir(&target).unwrap();
        assert!(file_appender(&target, false).is_err());

        let opts = LogOptions {
            logfile: Some(target),
            stdout: false,
            ..LogOptions::default()
        };
        assert!(setup_logging(&opts).is_err());
    }
}
