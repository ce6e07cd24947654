//! Logging bootstrap for the monofs processes.
//!
//! One call to [`init_logging`] at startup wires a console layer and an
//! optional rolling file layer behind an `EnvFilter`. The returned
//! guard owns the non-blocking file writer and must live as long as the
//! process.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Level filter when `RUST_LOG` is unset (trace..error).
    #[serde(default = "default_level")]
    pub level: String,

    /// Directory for rolling log files; no file output when unset.
    pub log_dir: Option<PathBuf>,

    /// Log file name prefix.
    #[serde(default = "default_prefix")]
    pub file_prefix: String,

    /// Rotation cadence: "hourly", "daily", or "never".
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Emit JSON instead of human-readable lines.
    #[serde(default)]
    pub json_format: bool,

    /// Also log to stdout.
    #[serde(default = "default_true")]
    pub console_output: bool,
}

fn default_level() -> String {
    "info".into()
}

fn default_prefix() -> String {
    "monofs".into()
}

fn default_rotation() -> String {
    "daily".into()
}

fn default_true() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            log_dir: None,
            file_prefix: default_prefix(),
            rotation: default_rotation(),
            json_format: false,
            console_output: true,
        }
    }
}

impl LogConfig {
    /// Development preset: debug level, console only.
    pub fn development() -> Self {
        Self {
            level: "debug".into(),
            ..Self::default()
        }
    }
}

/// Initialize the global subscriber. Call once; the returned guard (if
/// any) must be held for the life of the process so buffered file
/// output survives shutdown.
pub fn init_logging(config: &LogConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console_layer: Option<Box<dyn tracing_subscriber::Layer<_> + Send + Sync>> =
        if config.console_output {
            if config.json_format {
                Some(Box::new(fmt::layer().json()))
            } else {
                Some(Box::new(fmt::layer()))
            }
        } else {
            None
        };

    let (file_layer, guard): (
        Option<Box<dyn tracing_subscriber::Layer<_> + Send + Sync>>,
        Option<tracing_appender::non_blocking::WorkerGuard>,
    ) = match &config.log_dir {
        Some(log_dir) => {
            let rotation = match config.rotation.as_str() {
                "hourly" => rolling::Rotation::HOURLY,
                "never" => rolling::Rotation::NEVER,
                _ => rolling::Rotation::DAILY,
            };
            let appender = rolling::RollingFileAppender::builder()
                .rotation(rotation)
                .filename_prefix(&config.file_prefix)
                .filename_suffix("log")
                .build(log_dir)
                .expect("failed to create rolling file appender");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if config.json_format
            {
                Box::new(fmt::layer().json().with_writer(non_blocking))
            } else {
                Box::new(fmt::layer().with_ansi(false).with_writer(non_blocking))
            };
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}
