//! Logging setup for the `cms-etl` binary.
//!
//! Library crates only emit `tracing` events; this module installs the one
//! global subscriber. Step scopes from `cms_core::step` show up as `step`
//! spans carrying their nested path.
//!
//! # Log Levels
//!
//! - `error`: job failures
//! - `warn`: patient mapping misses, failed steps
//! - `info`: step start/end, chunk progress, upload status changes
//! - `debug`: query plans

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter,
    fmt::{
        self, MakeWriter,
        format::{Compact, DefaultFields, Format},
    },
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Crates whose events follow the configured level; everything else stays at warn.
const WORKSPACE_CRATES: &[&str] = &[
    "cms_cli",
    "cms_common",
    "cms_core",
    "cms_ingest",
    "cms_map",
    "cms_model",
    "cms_store",
    "cms_transform",
];

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level_filter: LevelFilter,
    /// Let `RUST_LOG` override `level_filter` when set.
    pub use_env_filter: bool,
    pub with_timestamps: bool,
    pub with_target: bool,
    pub with_ansi: bool,
    pub format: LogFormat,
    /// Append to this file instead of writing to stderr.
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    /// One JSON object per event, with the span list.
    Json,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level_filter: LevelFilter::INFO,
            use_env_filter: true,
            with_timestamps: true,
            with_target: false,
            with_ansi: true,
            format: LogFormat::default(),
            log_file: None,
        }
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened.
pub fn init_logging(config: &LogConfig) -> io::Result<()> {
    if let Some(path) = &config.log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        init_logging_with_writer(config, SharedFileWriter::new(file));
    } else {
        init_logging_with_writer(config, io::stderr);
    }
    Ok(())
}

pub fn init_logging_with_writer<W>(config: &LogConfig, writer: W)
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter = build_env_filter(config);
    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(writer)
                    .with_target(config.with_target),
            )
            .init(),
        LogFormat::Compact if config.with_timestamps => registry
            .with(compact_layer(config).with_writer(writer))
            .init(),
        LogFormat::Compact => registry
            .with(compact_layer(config).without_time().with_writer(writer))
            .init(),
        LogFormat::Pretty if config.with_timestamps => registry
            .with(pretty_layer(config).with_writer(writer))
            .init(),
        LogFormat::Pretty => registry
            .with(pretty_layer(config).without_time().with_writer(writer))
            .init(),
    }
}

type CompactLayer<S> = fmt::Layer<S, DefaultFields, Format<Compact>>;

fn compact_layer<S>(config: &LogConfig) -> CompactLayer<S> {
    fmt::layer()
        .compact()
        .with_ansi(config.with_ansi)
        .with_target(config.with_target)
}

fn pretty_layer<S>(config: &LogConfig) -> fmt::Layer<S> {
    fmt::layer()
        .with_ansi(config.with_ansi)
        .with_target(config.with_target)
}

/// `RUST_LOG` wins when allowed and set; otherwise the workspace crates log
/// at the configured level.
pub fn build_env_filter(config: &LogConfig) -> EnvFilter {
    if config.use_env_filter
        && let Ok(filter) = EnvFilter::try_from_default_env()
    {
        return filter;
    }
    EnvFilter::new(default_directives(config.level_filter))
}

fn default_directives(level: LevelFilter) -> String {
    let level = level.to_string().to_lowercase();
    let mut directives = vec!["warn".to_string()];
    directives.extend(WORKSPACE_CRATES.iter().map(|krate| format!("{krate}={level}")));
    directives.join(",")
}

#[derive(Clone)]
struct SharedFileWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl SharedFileWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
        }
    }
}

struct SharedFileGuard {
    file: Arc<Mutex<std::fs::File>>,
}

impl io::Write for SharedFileGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?
            .flush()
    }
}

impl<'a> MakeWriter<'a> for SharedFileWriter {
    type Writer = SharedFileGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedFileGuard {
            file: Arc::clone(&self.file),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        let directives = default_directives(LevelFilter::DEBUG);
        assert!(directives.starts_with("warn,cms_cli=debug,"));
        assert!(directives.contains("cms_store=debug"));
        assert_eq!(directives.matches('=').count(), WORKSPACE_CRATES.len());
    }

    #[test]
    fn test_off_level() {
        assert!(default_directives(LevelFilter::OFF).contains("cms_core=off"));
    }
}
