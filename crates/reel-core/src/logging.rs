//! Logging bootstrap for binaries and tests embedding the pipeline.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Store failures, panicked tasks |
//! | WARN  | Failed fetch attempts, failed jobs, lagging subscribers |
//! | INFO  | Lifecycle events (start, shutdown), job completions |
//! | DEBUG | Scheduling decisions, dedup hits, published events |
//!
//! Structured fields used across crates: `chapter_id`, `job_id`, `priority`,
//! `attempt`, `duration_ms`, `error`.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{Error, Result};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "reel_jobs=info,reel_core=info,reel_db=info";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Write to a daily-rotated file instead of stdout.
    pub file: Option<String>,
    /// Force ANSI colors on or off; auto-detected when `None`.
    pub ansi: Option<bool>,
    /// Filter directive used when `RUST_LOG` is unset.
    pub default_filter: Option<String>,
}

impl LogConfig {
    /// Read configuration from the environment.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `LOG_FORMAT` | `text` | `text` or `json` |
    /// | `LOG_FILE` | unset | Path of a daily-rotated log file |
    /// | `LOG_ANSI` | auto | `true`/`1` or `false`/`0` |
    /// | `RUST_LOG` | [`DEFAULT_FILTER`] | Standard env filter |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
            file: lookup("LOG_FILE").filter(|v| !v.is_empty()),
            ansi: lookup("LOG_ANSI").map(|v| v == "true" || v == "1"),
            default_filter: None,
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = Some(filter.into());
        self
    }
}

/// Install the global tracing subscriber.
///
/// Returns the file writer guard when file logging is enabled; keep it alive
/// for the life of the process so buffered lines get flushed. Fails if a
/// global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let default_filter = config
        .default_filter
        .clone()
        .unwrap_or_else(|| DEFAULT_FILTER.to_string());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(env_filter);

    let init = |e: tracing_subscriber::util::TryInitError| {
        Error::Config(format!("Failed to install log subscriber: {e}"))
    };

    if let Some(ref path) = config.file {
        let path = Path::new(path);
        let dir = path.parent().unwrap_or(Path::new("."));
        let name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("reel-jobs.log");
        let appender = tracing_appender::rolling::daily(dir, name);
        let (writer, guard) = tracing_appender::non_blocking(appender);

        match config.format {
            LogFormat::Json => registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
                .try_init()
                .map_err(init)?,
            LogFormat::Text => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(config.ansi.unwrap_or(false)),
                )
                .try_init()
                .map_err(init)?,
        }
        return Ok(Some(guard));
    }

    match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(init)?,
        LogFormat::Text => {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = config.ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).try_init().map_err(init)?
        }
    }

    Ok(None)
}
