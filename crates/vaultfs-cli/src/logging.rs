//! Tracing subscriber setup.
//!
//! Level, format and destination come from the command line (or the config
//! file). `RUST_LOG` takes precedence over the level when set. Unrecognized
//! values fall back to the defaults and are reported once the subscriber is
//! installed.
//!
//! Journald entries carry their fields natively, so the format option only
//! applies to the other destinations. Syslog is not supported.

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

pub const DEFAULT_LEVEL: &str = "info";
pub const DEFAULT_DESTINATION: &str = "stdout:";

const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogDestination {
    #[default]
    Stdout,
    Stderr,
    File(PathBuf),
    Journald,
}

/// Resolved logging options plus any complaints about the raw input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    pub level: String,
    pub format: LogFormat,
    pub destination: LogDestination,
    pub warnings: Vec<String>,
}

impl LogOptions {
    /// Resolves raw option strings, substituting defaults for invalid ones.
    pub fn parse(level: Option<&str>, format: Option<&str>, destination: Option<&str>) -> Self {
        let mut warnings = Vec::new();

        let level = match level.map(str::to_ascii_lowercase) {
            None => DEFAULT_LEVEL.to_string(),
            // "warning" and "fatal" are accepted for compatibility with older configs
            Some(l) if l == "warning" => "warn".to_string(),
            Some(l) if l == "fatal" => "error".to_string(),
            Some(l) if LEVELS.contains(&l.as_str()) => l,
            Some(l) => {
                warnings.push(format!("invalid log level {l:?}, defaulting to \"{DEFAULT_LEVEL}\""));
                DEFAULT_LEVEL.to_string()
            }
        };

        let format = match format {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                warnings.push(format!("invalid log format {other:?}, defaulting to \"text\""));
                LogFormat::Text
            }
        };

        let destination = match destination {
            None => LogDestination::Stdout,
            Some(raw) => parse_destination(raw).unwrap_or_else(|| {
                warnings.push(format!(
                    "invalid log destination {raw:?}, defaulting to \"{DEFAULT_DESTINATION}\""
                ));
                LogDestination::Stdout
            }),
        };

        Self {
            level,
            format,
            destination,
            warnings,
        }
    }
}

/// Parses `stdout:`, `stderr:`, `journald:` or `file:/path`.
fn parse_destination(raw: &str) -> Option<LogDestination> {
    let (scheme, rest) = raw.split_once(':')?;
    match scheme {
        "stdout" if rest.is_empty() => Some(LogDestination::Stdout),
        "stderr" if rest.is_empty() => Some(LogDestination::Stderr),
        "journald" if rest.is_empty() => Some(LogDestination::Journald),
        "file" if !rest.is_empty() => Some(LogDestination::File(PathBuf::from(rest))),
        _ => None,
    }
}

/// Installs the global subscriber.
///
/// The returned guard flushes file output and must live until exit.
pub fn setup_tracing(options: &LogOptions) -> Option<WorkerGuard> {
    let mut warnings = options.warnings.clone();
    let mut guard = None;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&options.level));

    let layer = match &options.destination {
        LogDestination::Stdout => {
            fmt_layer(options.format, BoxMakeWriter::new(io::stdout), true, filter)
        }
        LogDestination::Stderr => {
            fmt_layer(options.format, BoxMakeWriter::new(io::stderr), true, filter)
        }
        LogDestination::File(path) => {
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => {
                    let (non_blocking, file_guard) = tracing_appender::non_blocking(file);
                    guard = Some(file_guard);
                    fmt_layer(options.format, BoxMakeWriter::new(non_blocking), false, filter)
                }
                Err(e) => {
                    warnings.push(format!(
                        "could not open log file {}: {e}, logging to stdout",
                        path.display()
                    ));
                    fmt_layer(options.format, BoxMakeWriter::new(io::stdout), true, filter)
                }
            }
        }
        LogDestination::Journald => match journald_layer() {
            Ok(journald) => journald.with_filter(filter).boxed(),
            Err(e) => {
                warnings.push(format!("could not connect to journald: {e}, logging to stdout"));
                fmt_layer(options.format, BoxMakeWriter::new(io::stdout), true, filter)
            }
        },
    };

    // A subscriber may already be installed when running under a test harness
    let _ = tracing_subscriber::registry().with(layer).try_init();

    for warning in warnings {
        tracing::warn!("{warning}");
    }
    guard
}

fn fmt_layer(
    format: LogFormat,
    writer: BoxMakeWriter,
    ansi: bool,
    filter: EnvFilter,
) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Text => fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
    }
}

#[cfg(target_os = "linux")]
fn journald_layer() -> io::Result<tracing_journald::Layer> {
    tracing_journald::layer()
}

#[cfg(not(target_os = "linux"))]
fn journald_layer() -> io::Result<tracing_subscriber::layer::Identity> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "journald is only available on Linux"))
}
