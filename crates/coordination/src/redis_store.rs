// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

use crate::{CoordinationStore, StoreError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

const STORE_DEADLINE: Duration = Duration::from_secs(10);

fn backend_err(e: redis::RedisError) -> StoreError {
    StoreError::Backend(e.to_string())
}

async fn with_deadline<F, T>(fut: F) -> Result<T, StoreError>
where
    F: std::future::Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(STORE_DEADLINE, fut).await.map_err(|_| StoreError::Timeout)?
}

/// Redis-backed [`CoordinationStore`]. Uses a [`ConnectionManager`] for automatic reconnection,
/// and a dedicated connection per [`subscribe`](CoordinationStore::subscribe) call since Redis
/// pub/sub connections can't multiplex regular commands.
pub struct RedisStore {
    client: redis::Client,
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connects to `url` (e.g. `redis://host:6379`) and establishes a managed connection.
    ///
    /// # Errors
    /// Returns [`StoreError::Backend`] if the client can't be built or the initial connection
    /// fails.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(backend_err)?;
        let manager = client.get_connection_manager().await.map_err(backend_err)?;
        Ok(Self { client, manager })
    }
}

#[async_trait]
impl CoordinationStore for RedisStore {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        with_deadline(async move {
            match ttl {
                Some(d) => conn.set_ex::<_, _, ()>(key, value, d.as_secs().max(1)).await.map_err(backend_err),
                None => conn.set::<_, _, ()>(key, value).await.map_err(backend_err),
            }
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.manager.clone();
        with_deadline(async move { conn.get(key).await.map_err(backend_err) }).await
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        with_deadline(async move { conn.del::<_, ()>(key).await.map_err(backend_err) }).await
    }

    async fn lpush_trim(&self, key: &str, value: &str, cap: usize, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let key = key.to_string();
        let value = value.to_string();
        with_deadline(async move {
            let () = conn.lpush(&key, value).await.map_err(backend_err)?;
            let () = conn
                .ltrim(&key, 0, cap.saturating_sub(1) as isize)
                .await
                .map_err(backend_err)?;
            if let Some(d) = ttl {
                let () = conn.expire(&key, d.as_secs().max(1) as i64).await.map_err(backend_err)?;
            }
            Ok(())
        })
        .await
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError> {
        let mut conn = self.manager.clone();
        with_deadline(async move { conn.lrange(key, start, stop).await.map_err(backend_err) }).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        with_deadline(async move {
            conn.expire::<_, ()>(key, ttl.as_secs().max(1) as i64).await.map_err(backend_err)
        })
        .await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.manager.clone();
        with_deadline(async move { conn.keys(pattern).await.map_err(backend_err) }).await
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        with_deadline(async move { conn.publish::<_, _, ()>(channel, payload).await.map_err(backend_err) }).await
    }

    async fn subscribe(&self, channel: &str) -> Result<tokio::sync::mpsc::UnboundedReceiver<String>, StoreError> {
        use redis::aio::PubSub;
        use tokio_stream::StreamExt;

        let mut pubsub: PubSub = self.client.get_async_pubsub().await.map_err(backend_err)?;
        pubsub.subscribe(channel).await.map_err(backend_err)?;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let Ok(payload) = msg.get_payload::<String>() else {
                    continue;
                };
                if tx.send(payload).is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}
