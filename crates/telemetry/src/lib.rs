// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! Structured logging for the control plane.
//!
//! Every subsystem emits named events through the `otel_*!` macros instead of calling
//! [`tracing`]'s macros directly, so that event names stay a stable, greppable vocabulary
//! (`"pcm.apply.upsert"`, `"sync.fan_out.retry"`, ...) independent of the free-text message.
//! Mechanically these are thin forwards to `tracing::{info,debug,warn,error}!`; the macro
//! accepts either a bare name/message as its first argument or an explicit `name: "..."` field,
//! matching whichever reads better at the call site.
//!
//! [`init`] wires up a [`tracing_subscriber::Registry`] with an env-filter layer and either a
//! human-readable or JSON-lines formatting layer. [`init_with_file`] additionally tees
//! JSON-lines events to a log file on disk (via a non-blocking [`tracing_appender`] writer),
//! which is the file the Error-Log Aggregator tails. The returned
//! [`WorkerGuard`](tracing_appender::non_blocking::WorkerGuard) must be kept alive for as long as
//! the process wants its file-backed logs flushed; dropping it stops the background writer.

use std::path::Path;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Emits a `TRACE`-level named event.
#[macro_export]
macro_rules! otel_trace {
    ($($args:tt)*) => { tracing::trace!($($args)*) };
}

/// Emits a `DEBUG`-level named event.
#[macro_export]
macro_rules! otel_debug {
    ($($args:tt)*) => { tracing::debug!($($args)*) };
}

/// Emits an `INFO`-level named event.
#[macro_export]
macro_rules! otel_info {
    ($($args:tt)*) => { tracing::info!($($args)*) };
}

/// Emits a `WARN`-level named event.
#[macro_export]
macro_rules! otel_warn {
    ($($args:tt)*) => { tracing::warn!($($args)*) };
}

/// Emits an `ERROR`-level named event.
#[macro_export]
macro_rules! otel_error {
    ($($args:tt)*) => { tracing::error!($($args)*) };
}

/// Opens a `DEBUG`-level span.
#[macro_export]
macro_rules! otel_debug_span {
    ($($args:tt)*) => { tracing::debug_span!($($args)*) };
}

/// Opens an `INFO`-level span.
#[macro_export]
macro_rules! otel_info_span {
    ($($args:tt)*) => { tracing::info_span!($($args)*) };
}

/// The output format for the console layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, one line per event. Good for a developer's terminal.
    #[default]
    Pretty,
    /// JSON-lines. Good for shipping to a log aggregator.
    Json,
}

/// Failures setting up the global subscriber.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The process already installed a global subscriber.
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
    /// The log file could not be opened for append.
    #[error("failed to open log file '{path}': {details}")]
    LogFileOpen {
        /// The path that failed to open.
        path: String,
        /// The underlying I/O error, stringified.
        details: String,
    },
}

/// Installs a global subscriber that writes to stderr in `format`, filtered by the
/// `RUST_LOG` environment variable (defaulting to `info` when unset).
///
/// # Errors
/// Returns [`TelemetryError::AlreadyInitialized`] if a global subscriber is already set.
pub fn init(format: LogFormat) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = Registry::default().with(filter);

    let result = match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)).try_init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)).try_init(),
    };

    result.map_err(|_| TelemetryError::AlreadyInitialized)
}

/// Installs a global subscriber like [`init`], additionally teeing JSON-lines events to
/// `log_path` (its parent directory is created if missing; the file itself is appended to,
/// never rotated — log rotation is out of scope, matching the Error-Log Aggregator's own
/// tolerance for externally-rotated files). This is the file the node's error-log uploader
/// tails, so its lines must stay one JSON object per line regardless of `format`.
///
/// # Errors
/// Returns [`TelemetryError::LogFileOpen`] if the parent directory can't be created or the path
/// has no file name component, or [`TelemetryError::AlreadyInitialized`] if a global subscriber
/// is already set.
pub fn init_with_file(format: LogFormat, log_path: &Path) -> Result<WorkerGuard, TelemetryError> {
    let open_err = |details: String| TelemetryError::LogFileOpen { path: log_path.display().to_string(), details };

    let file_name = log_path.file_name().ok_or_else(|| open_err("path has no file name".to_string()))?;
    let directory = match log_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(directory).map_err(|e| open_err(e.to_string()))?;

    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = Registry::default().with(filter);

    let file_layer = tracing_subscriber::fmt::layer().json().with_writer(writer.with_max_level(tracing::Level::TRACE));

    let result = match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(file_layer)
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .with(file_layer)
            .try_init(),
    };

    result.map_err(|_| TelemetryError::AlreadyInitialized)?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_format_is_pretty() {
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }

    #[test]
    fn init_with_file_rejects_path_whose_parent_is_a_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-directory");
        std::fs::write(&blocker, b"").unwrap();

        let log_path = blocker.join("sub").join("hub.log");
        let err = init_with_file(LogFormat::Json, &log_path).unwrap_err();
        assert!(matches!(err, TelemetryError::LogFileOpen { .. }));
    }
}
