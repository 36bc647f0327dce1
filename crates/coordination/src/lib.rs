// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! The Coordination Store Client (spec §4.4): the cluster's one piece of genuinely shared state —
//! a KV store with TTLs, capped lists, and pub/sub channels. [`CoordinationStore`] is the trait
//! every other component programs against; [`RedisStore`] is the real backend and [`MemoryStore`]
//! is an in-process double for tests that don't stand up Redis.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use std::time::Duration;

/// Errors talking to the coordination store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The backend returned an error (connection failure, protocol error, ...).
    #[error("coordination store error: {0}")]
    Backend(String),
    /// The operation did not complete within its deadline (spec §4.4: 5-10s).
    #[error("coordination store operation timed out")]
    Timeout,
}

/// The KV + TTL + list + pub/sub contract the rest of the control plane needs from the shared
/// store. Every method matches a single store-side primitive; callers compose them (e.g. the
/// Operations Journal does `lpush_trim` then periodically `lrange`).
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Sets `key` to `value`, with an optional expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Fetches the value at `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Deletes `key`. Not an error if it didn't exist.
    async fn del(&self, key: &str) -> Result<(), StoreError>;

    /// Pushes `value` onto the head of the list at `key`, then trims the list to `cap` entries
    /// and (re)sets its expiry to `ttl` if given. Used by the Operations Journal and the
    /// Error-Log Aggregator so neither needs a separate trim round-trip.
    async fn lpush_trim(&self, key: &str, value: &str, cap: usize, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Returns list elements in `[start, stop]` (inclusive, Redis `LRANGE` semantics), newest
    /// first given `lpush_trim` pushes onto the head.
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError>;

    /// Sets (or refreshes) the expiry on `key`.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Lists keys matching a glob `pattern` (Redis `KEYS` semantics). Used sparingly — membership
    /// discovery only, per spec §4.4's note that this call does not scale to large keyspaces.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Publishes `payload` on `channel`.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError>;

    /// Subscribes to `channel`, returning a receiver of published payloads. The subscription
    /// lives until the receiver is dropped.
    async fn subscribe(&self, channel: &str) -> Result<tokio::sync::mpsc::UnboundedReceiver<String>, StoreError>;
}
