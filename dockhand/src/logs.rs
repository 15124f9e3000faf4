//! Logging configuration
//!
//! Every run logs to the console with colored level tags and mirrors the
//! same lines, without ANSI codes, into a per-run file so a failed run can
//! be diagnosed from the log alone.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Local;
use colored::Colorize;
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{format, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::errors::DeployError;

/// Log level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_filter_string(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

impl<'de> serde::Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging options
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Log level
    pub log_level: LogLevel,

    /// Colorize console output
    pub ansi: bool,

    /// Directory for the per-run log file
    pub log_dir: PathBuf,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            ansi: true,
            log_dir: PathBuf::from("logs"),
        }
    }
}

/// Keeps the file writer alive; dropping it flushes pending lines
pub struct LogGuard {
    _worker: WorkerGuard,
    path: PathBuf,
}

impl LogGuard {
    /// Path of this run's log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Name of the log file for a run started now
pub fn run_log_file_name() -> String {
    format!("deploy_{}.log", Local::now().format("%Y%m%d_%H%M%S"))
}

/// Initialize logging
pub fn init_logging(options: LogOptions) -> Result<LogGuard, DeployError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.log_level.to_filter_string()));

    std::fs::create_dir_all(&options.log_dir)?;
    let file_name = run_log_file_name();
    let path = options.log_dir.join(&file_name);
    let appender = tracing_appender::rolling::never(&options.log_dir, &file_name);
    let (file_writer, worker) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(options.ansi)
                .event_format(LineFormat { ansi: options.ansi }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer)
                .event_format(LineFormat { ansi: false }),
        )
        .try_init()
        .map_err(|e| DeployError::Config(e.to_string()))?;

    Ok(LogGuard {
        _worker: worker,
        path,
    })
}

/// `[timestamp] [LEVEL] message` lines
#[derive(Debug, Clone, Copy)]
pub struct LineFormat {
    pub ansi: bool,
}

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let level = *event.metadata().level();

        if self.ansi {
            write!(writer, "[{}] [{}] ", timestamp.as_str().dimmed(), colored_tag(level))?;
        } else {
            write!(writer, "[{}] [{}] ", timestamp, level_tag(level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::TRACE => "TRACE",
        Level::DEBUG => "DEBUG",
        Level::INFO => "INFO",
        Level::WARN => "WARN",
        Level::ERROR => "ERROR",
    }
}

fn colored_tag(level: Level) -> colored::ColoredString {
    let tag = level_tag(level);
    match level {
        Level::TRACE | Level::DEBUG => tag.bright_black(),
        Level::INFO => tag.green(),
        Level::WARN => tag.yellow().bold(),
        Level::ERROR => tag.red().bold(),
    }
}
