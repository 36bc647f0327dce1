// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! Node configuration: a single TOML file (spec.md §6, SPEC_FULL §1.3), loaded once at startup.
//! There is deliberately no hot-reload of this file — it describes process identity and wiring,
//! not pipeline configuration (that lives under `config_root` and goes through the Pending-Change
//! Manager instead).

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(target_os = "linux")]
fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/hub_logs")
}

#[cfg(target_os = "macos")]
fn default_log_dir() -> PathBuf {
    PathBuf::from("/tmp/hub_logs")
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

/// The console log format, settable from the CLI.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliLogFormat {
    /// Human-readable, one line per event.
    Pretty,
    /// JSON-lines.
    Json,
}

/// The coordination store backend a node connects to.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CoordinationStoreConfig {
    /// An in-process store with no external dependency. Only sensible for a single-node
    /// deployment or local development — a real cluster needs the Redis backend so every node
    /// sees the same state.
    Memory,
    /// A Redis (or Redis-protocol-compatible) server.
    Redis {
        /// The connection URL, e.g. `redis://127.0.0.1:6379`.
        url: String,
    },
}

/// A node's on-disk configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Root directory of the file-backed Config Store.
    pub config_root: PathBuf,
    /// Whether this node is the cluster leader. Static, read once at startup (spec §4.5).
    pub is_leader: bool,
    /// This node's own advertised address — its identity, per spec §4.5.
    pub self_address: String,
    /// The leader's advertised address. Required when `is_leader` is `false`: followers
    /// heartbeat to it and fall back to it for sync-intake HTTP delivery.
    #[serde(default)]
    pub leader_address: Option<String>,
    /// Address the HTTP surface binds to.
    pub bind_address: String,
    /// The cluster-wide shared bearer token. On the leader this is the token of record,
    /// published to the coordination store at startup; on a follower it is overridden by
    /// whatever the leader published, once fetched.
    pub token: String,
    /// The coordination store backend.
    pub coordination_store: CoordinationStoreConfig,
    /// Interval between follower heartbeats and leader sweeps, in seconds.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Directory error/JSON-lines logs are written under. Defaults per spec §4.10.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// `RUST_LOG`-style filter directive used as a fallback when the environment variable isn't
    /// set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    /// How long a node may go without heartbeating before Cluster Membership marks it unhealthy:
    /// `3 x heartbeat_interval`, per spec §4.5.
    #[must_use]
    pub fn unhealthy_after(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.saturating_mul(3))
    }

    /// The heartbeat/sweep tick interval.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

/// Errors loading a node's configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file '{path}': {details}")]
    Read {
        /// The path that failed to read.
        path: String,
        /// The underlying I/O error, stringified.
        details: String,
    },
    /// The config file's contents could not be parsed as valid TOML matching [`Config`]'s shape.
    #[error("failed to parse config file '{path}': {details}")]
    Parse {
        /// The path that failed to parse.
        path: String,
        /// The underlying parse error, stringified.
        details: String,
    },
    /// A follower config is missing `leader_address`, which it needs to heartbeat and for
    /// sync-intake HTTP fallback.
    #[error("config error: 'leader_address' is required when 'is_leader' is false")]
    MissingLeaderAddress,
}

impl Config {
    /// Loads and validates a config file from `path`.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file can't be read, doesn't parse, or fails validation.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read { path: path.display().to_string(), details: e.to_string() })?;

        let cfg: Config =
            toml::from_str(&raw).map_err(|e| ConfigError::Parse { path: path.display().to_string(), details: e.to_string() })?;

        if !cfg.is_leader && cfg.leader_address.is_none() {
            return Err(ConfigError::MissingLeaderAddress);
        }

        Ok(cfg)
    }
}
