// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! The Error-Log Aggregator (spec §4.9): each node tails its own log file and periodically
//! uploads new error lines to the coordination store under a per-node key; the leader merges
//! every node's key on read, so there is no separate aggregation process to keep alive.

mod scanner;

pub use scanner::{scan_new_lines, ScanError};

use chrono::{DateTime, Utc};
use cplane_coordination::CoordinationStore;
use cplane_core::Error;
use cplane_telemetry::otel_warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const UPLOAD_INTERVAL: Duration = Duration::from_secs(60);
const PER_NODE_CAP: usize = 1_000;
const PER_NODE_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 31);
const KEY_PREFIX: &str = "cluster:error_logs:";
const UPLOAD_WINDOW_SECS: i64 = 60 * 60 * 24;

/// Which of a node's two log files an entry came from, inferred from the file name
/// (`hub.log` / `plugin.log`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorLogSource {
    /// From `hub.log`.
    Hub,
    /// From `plugin.log`.
    Plugin,
}

impl ErrorLogSource {
    fn from_log_path(path: &Path) -> Self {
        match path.file_name().and_then(|name| name.to_str()) {
            Some(name) if name.eq_ignore_ascii_case("plugin.log") => ErrorLogSource::Plugin,
            _ => ErrorLogSource::Hub,
        }
    }
}

/// One parsed `{ERROR, FATAL}` error-log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    /// The node that produced this entry (its advertised address).
    pub node_id: String,
    /// The log file this entry came from.
    pub source: ErrorLogSource,
    /// When the line was written, parsed from its `time` field.
    pub timestamp: DateTime<Utc>,
    /// The log level, uppercased (`ERROR` or `FATAL`).
    pub level: String,
    /// The `msg` field.
    pub message: String,
    /// Every other JSON field on the line, preserved verbatim.
    pub context: serde_json::Map<String, serde_json::Value>,
    /// The original raw JSON-line text.
    pub line: String,
}

/// Parses one JSON-line (`{"time", "level", "msg", ...context}`) into an entry, or `None` if it
/// isn't `{ERROR, FATAL}`, isn't within the last [`UPLOAD_WINDOW_SECS`], or doesn't parse.
fn parse_error_line(node_id: &str, source: ErrorLogSource, line: &str, now: DateTime<Utc>) -> Option<ErrorLogEntry> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    let mut object = value.as_object()?.clone();

    let level = object.remove("level")?.as_str()?.to_uppercase();
    if level != "ERROR" && level != "FATAL" {
        return None;
    }

    let time = object.remove("time")?;
    let timestamp = DateTime::parse_from_rfc3339(time.as_str()?).ok()?.with_timezone(&Utc);
    if now.signed_duration_since(timestamp).num_seconds() > UPLOAD_WINDOW_SECS {
        return None;
    }

    let message = object.remove("msg")?.as_str()?.to_string();

    Some(ErrorLogEntry {
        node_id: node_id.to_string(),
        source,
        timestamp,
        level,
        message,
        context: object,
        line: line.to_string(),
    })
}

fn node_key(node_id: &str) -> String {
    format!("{KEY_PREFIX}{node_id}")
}

/// Runs on every node: tails `log_path` and uploads new lines to the coordination store under
/// this node's key, every [`UPLOAD_INTERVAL`].
pub struct ErrorLogUploader {
    node_id: String,
    log_path: PathBuf,
    store: Arc<dyn CoordinationStore>,
    offset: std::sync::atomic::AtomicU64,
}

impl ErrorLogUploader {
    /// Builds an uploader for `log_path`, tagging every uploaded entry with `node_id`.
    #[must_use]
    pub fn new(node_id: impl Into<String>, log_path: impl Into<PathBuf>, store: Arc<dyn CoordinationStore>) -> Self {
        Self {
            node_id: node_id.into(),
            log_path: log_path.into(),
            store,
            offset: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Reads and uploads whatever's new since the last call.
    ///
    /// # Errors
    /// Returns [`Error::Store`] if the upload fails. A scan error (missing file, a line
    /// exceeding the cap) is logged and treated as "nothing new" rather than propagated, since a
    /// transient log-rotation race shouldn't take the uploader task down.
    pub async fn tick(&self) -> Result<(), Error> {
        let offset = self.offset.load(std::sync::atomic::Ordering::Acquire);
        let (lines, new_offset) = match scanner::scan_new_lines(&self.log_path, offset) {
            Ok(result) => result,
            Err(e) => {
                otel_warn!("errorlog.scan_failed", error = %e, path = %self.log_path.display());
                return Ok(());
            }
        };
        self.offset.store(new_offset, std::sync::atomic::Ordering::Release);

        let source = ErrorLogSource::from_log_path(&self.log_path);
        let now = Utc::now();
        let key = node_key(&self.node_id);
        for line in lines {
            let Some(entry) = parse_error_line(&self.node_id, source, &line, now) else {
                continue;
            };
            let encoded = serde_json::to_string(&entry).map_err(|e| Error::Internal { message: e.to_string() })?;
            self.store
                .lpush_trim(&key, &encoded, PER_NODE_CAP, Some(PER_NODE_TTL))
                .await
                .map_err(|e| Error::Store { message: e.to_string() })?;
        }
        Ok(())
    }

    /// Spawns a background task calling [`tick`](ErrorLogUploader::tick) every
    /// [`UPLOAD_INTERVAL`], until `cancel` fires.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(UPLOAD_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.tick().await {
                            otel_warn!("errorlog.upload_failed", error = %e);
                        }
                    }
                }
            }
        });
    }
}

/// Filter for [`ErrorLogAggregator::list`].
#[derive(Debug, Default, Clone)]
pub struct ErrorLogFilter {
    /// Restrict to entries from this node.
    pub node_id: Option<String>,
    /// Restrict to entries from this log file.
    pub source: Option<ErrorLogSource>,
    /// Restrict to entries whose message contains this substring.
    pub contains: Option<String>,
}

/// Cluster-wide entry counts, for the summary the HTTP surface exposes alongside the paginated
/// list.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLogCounters {
    /// Entries from `hub.log` across every node.
    pub hub_errors: usize,
    /// Entries from `plugin.log` across every node.
    pub plugin_errors: usize,
    /// `hub_errors + plugin_errors`.
    pub total_errors: usize,
}

/// Leader-side view: merges every node's uploaded entries on read.
pub struct ErrorLogAggregator {
    store: Arc<dyn CoordinationStore>,
}

impl ErrorLogAggregator {
    /// Builds an aggregator reading from `store`.
    #[must_use]
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    async fn fetch_all(&self) -> Result<Vec<ErrorLogEntry>, Error> {
        let keys = self
            .store
            .keys(&format!("{KEY_PREFIX}*"))
            .await
            .map_err(|e| Error::Store { message: e.to_string() })?;

        let mut entries = Vec::new();
        for key in keys {
            let raw = self
                .store
                .lrange(&key, 0, -1)
                .await
                .map_err(|e| Error::Store { message: e.to_string() })?;
            entries.extend(raw.iter().filter_map(|s| serde_json::from_str::<ErrorLogEntry>(s).ok()));
        }
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    /// Merges, filters, and paginates every node's uploaded entries.
    ///
    /// # Errors
    /// Returns [`Error::Store`] if a store read fails.
    pub async fn list(&self, filter: &ErrorLogFilter, offset: usize, limit: usize) -> Result<Vec<ErrorLogEntry>, Error> {
        let entries = self.fetch_all().await?;
        let filtered: Vec<_> = entries
            .into_iter()
            .filter(|e| filter.node_id.as_deref().is_none_or(|n| n == e.node_id))
            .filter(|e| filter.source.is_none_or(|s| s == e.source))
            .filter(|e| filter.contains.as_deref().is_none_or(|needle| e.message.contains(needle)))
            .collect();
        Ok(filtered.into_iter().skip(offset).take(limit).collect())
    }

    /// Counts entries by source, across the whole cluster.
    ///
    /// # Errors
    /// Returns [`Error::Store`] if a store read fails.
    pub async fn counters(&self) -> Result<ErrorLogCounters, Error> {
        let entries = self.fetch_all().await?;
        let mut counters = ErrorLogCounters::default();
        for entry in entries {
            match entry.source {
                ErrorLogSource::Hub => counters.hub_errors += 1,
                ErrorLogSource::Plugin => counters.plugin_errors += 1,
            }
            counters.total_errors += 1;
        }
        Ok(counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cplane_coordination::MemoryStore;

    fn json_line(level: &str, msg: &str) -> String {
        format!("{{\"time\":\"{}\",\"level\":\"{level}\",\"msg\":\"{msg}\"}}\n", Utc::now().to_rfc3339())
    }

    #[tokio::test]
    async fn uploader_tick_is_idempotent_with_no_new_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.log");
        std::fs::write(&path, json_line("ERROR", "boom")).unwrap();

        let store = Arc::new(MemoryStore::new());
        let uploader = ErrorLogUploader::new("node-a", &path, store.clone());
        uploader.tick().await.unwrap();
        uploader.tick().await.unwrap();

        let aggregator = ErrorLogAggregator::new(store);
        let entries = aggregator.list(&ErrorLogFilter::default(), 0, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, ErrorLogSource::Hub);
        assert_eq!(entries[0].level, "ERROR");
        assert_eq!(entries[0].message, "boom");
    }

    #[tokio::test]
    async fn uploader_skips_non_error_levels_and_infers_plugin_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugin.log");
        let mut contents = json_line("INFO", "noise");
        contents.push_str(&json_line("FATAL", "crashed"));
        std::fs::write(&path, contents).unwrap();

        let store = Arc::new(MemoryStore::new());
        ErrorLogUploader::new("node-a", &path, store.clone()).tick().await.unwrap();

        let aggregator = ErrorLogAggregator::new(store);
        let entries = aggregator.list(&ErrorLogFilter::default(), 0, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, ErrorLogSource::Plugin);
        assert_eq!(entries[0].level, "FATAL");
    }

    #[tokio::test]
    async fn uploader_skips_entries_older_than_the_upload_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.log");
        let stale_time = (Utc::now() - chrono::Duration::hours(25)).to_rfc3339();
        std::fs::write(&path, format!("{{\"time\":\"{stale_time}\",\"level\":\"ERROR\",\"msg\":\"old\"}}\n")).unwrap();

        let store = Arc::new(MemoryStore::new());
        ErrorLogUploader::new("node-a", &path, store.clone()).tick().await.unwrap();

        let aggregator = ErrorLogAggregator::new(store);
        let entries = aggregator.list(&ErrorLogFilter::default(), 0, 10).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn aggregator_merges_multiple_nodes_and_counts_by_source() {
        let store = Arc::new(MemoryStore::new());
        let dir = tempfile::tempdir().unwrap();

        let path_a = dir.path().join("hub.log");
        std::fs::write(&path_a, json_line("ERROR", "from a")).unwrap();
        ErrorLogUploader::new("node-a", &path_a, store.clone()).tick().await.unwrap();

        let path_b = dir.path().join("plugin.log");
        std::fs::write(&path_b, json_line("ERROR", "from b")).unwrap();
        ErrorLogUploader::new("node-b", &path_b, store.clone()).tick().await.unwrap();

        let aggregator = ErrorLogAggregator::new(store);
        let counters = aggregator.counters().await.unwrap();
        assert_eq!(counters.hub_errors, 1);
        assert_eq!(counters.plugin_errors, 1);
        assert_eq!(counters.total_errors, 2);

        let hub_only = aggregator
            .list(&ErrorLogFilter { source: Some(ErrorLogSource::Hub), ..Default::default() }, 0, 10)
            .await
            .unwrap();
        assert_eq!(hub_only.len(), 1);
        assert_eq!(hub_only[0].node_id, "node-a");
    }
}
