// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

use crate::{CoordinationStore, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedSender};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > Instant::now())
    }
}

#[derive(Default)]
struct Inner {
    kv: HashMap<String, Entry>,
    lists: HashMap<String, (Vec<String>, Option<Instant>)>,
    subscribers: HashMap<String, Vec<UnboundedSender<String>>>,
}

/// In-process [`CoordinationStore`] double. Used by tests and by single-node (non-clustered)
/// runs where standing up Redis is unnecessary overhead.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Builds an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.inner.lock().kv.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.kv.get(key).filter(|e| e.live()).map(|e| e.value.clone()))
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.inner.lock().kv.remove(key);
        Ok(())
    }

    async fn lpush_trim(&self, key: &str, value: &str, cap: usize, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let entry = inner.lists.entry(key.to_string()).or_default();
        entry.0.insert(0, value.to_string());
        entry.0.truncate(cap);
        if let Some(d) = ttl {
            entry.1 = Some(Instant::now() + d);
        }
        Ok(())
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock();
        let Some((values, expires_at)) = inner.lists.get(key) else {
            return Ok(Vec::new());
        };
        if expires_at.is_some_and(|d| d <= Instant::now()) {
            return Ok(Vec::new());
        }
        let len = values.len() as isize;
        let norm = |i: isize| -> isize {
            if i < 0 {
                (len + i).max(0)
            } else {
                i.min(len - 1).max(0)
            }
        };
        if len == 0 {
            return Ok(Vec::new());
        }
        let lo = norm(start);
        let hi = norm(stop);
        if lo > hi {
            return Ok(Vec::new());
        }
        Ok(values[lo as usize..=hi as usize].to_vec())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let deadline = Instant::now() + ttl;
        if let Some(e) = inner.kv.get_mut(key) {
            e.expires_at = Some(deadline);
        }
        if let Some(l) = inner.lists.get_mut(key) {
            l.1 = Some(deadline);
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let prefix = pattern.trim_end_matches('*');
        let inner = self.inner.lock();
        let mut out: Vec<String> = inner
            .kv
            .keys()
            .filter(|k| k.starts_with(prefix))
            .chain(inner.lists.keys().filter(|k| k.starts_with(prefix)))
            .cloned()
            .collect();
        out.sort();
        out.dedup();
        Ok(out)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(subs) = inner.subscribers.get_mut(channel) {
            subs.retain(|tx| tx.send(payload.to_string()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<mpsc::UnboundedReceiver<String>, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().subscribers.entry(channel.to_string()).or_default().push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lpush_trim_caps_list_length() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.lpush_trim("k", &i.to_string(), 3, None).await.unwrap();
        }
        let all = store.lrange("k", 0, -1).await.unwrap();
        assert_eq!(all, vec!["4", "3", "2"]);
    }

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe("ch").await.unwrap();
        store.publish("ch", "hello").await.unwrap();
        assert_eq!(rx.recv().await, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn get_after_ttl_expiry_returns_none() {
        let store = MemoryStore::new();
        store.set("k", "v", Some(Duration::from_millis(5))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
