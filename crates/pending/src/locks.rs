// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

use cplane_core::ComponentKind;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One `tokio::sync::Mutex` per `(kind, id)`, created on first use and kept around for the life
/// of the process. Guarantees that two concurrent applies touching the same component serialize,
/// without serializing applies to unrelated components.
pub(crate) struct KeyLocks {
    table: parking_lot::Mutex<HashMap<(ComponentKind, String), Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub(crate) fn new() -> Self {
        Self {
            table: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    pub(crate) async fn lock(&self, kind: ComponentKind, id: &str) -> OwnedMutexGuard<()> {
        let entry = self
            .table
            .lock()
            .entry((kind, id.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        entry.lock_owned().await
    }
}
