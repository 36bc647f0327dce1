// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! The Operations Journal (spec §4.8): a capped, append-only history of every change applied by
//! the Pending-Change Manager, stored as a single Redis list (`cluster:ops_history`) via
//! [`CoordinationStore::lpush_trim`], with filtering/sorting/pagination done in memory over
//! `LRANGE`.

use chrono::{DateTime, Utc};
use cplane_coordination::CoordinationStore;
use cplane_core::{ComponentKind, Error};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const JOURNAL_KEY: &str = "cluster:ops_history";
const JOURNAL_CAP: usize = 10_000;
const JOURNAL_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 31);

/// One row of the journal: what changed, who changed it, and whether it succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Unique id for this record.
    pub id: String,
    /// When the operation was applied.
    pub timestamp: DateTime<Utc>,
    /// The component kind affected.
    pub kind: ComponentKind,
    /// The component id affected.
    pub component_id: String,
    /// The project id this change was scoped to, if the operation was project-specific (e.g. a
    /// restart) rather than a standalone component change.
    pub project_id: Option<String>,
    /// A short verb describing what happened: `upsert`, `delete`, `start`, `stop`,
    /// `project_restart`.
    pub action: String,
    /// Whether the operation succeeded.
    pub success: bool,
    /// A human-readable detail, typically the error message on failure.
    pub message: Option<String>,
    /// The node that applied this operation (its advertised address).
    pub node_id: String,
}

/// Filter criteria for [`Journal::list`].
#[derive(Debug, Default, Clone)]
pub struct JournalFilter {
    /// Restrict to this component kind.
    pub kind: Option<ComponentKind>,
    /// Restrict to this component id.
    pub component_id: Option<String>,
    /// Restrict to this project id.
    pub project_id: Option<String>,
    /// Restrict to successes (`Some(true)`) or failures (`Some(false)`).
    pub success: Option<bool>,
    /// Restrict to records at or after this timestamp.
    pub start_time: Option<DateTime<Utc>>,
    /// Restrict to records at or before this timestamp.
    pub end_time: Option<DateTime<Utc>>,
    /// Restrict to this exact action (`upsert`, `delete`, `start`, `stop`, `project_restart`, ...).
    pub action: Option<String>,
    /// Restrict to records applied by this node.
    pub node_id: Option<String>,
    /// Case-insensitive substring match across `component_id`, `project_id`, `message`, and
    /// `node_id`.
    pub keyword: Option<String>,
}

impl JournalFilter {
    fn matches(&self, record: &OperationRecord) -> bool {
        self.kind.is_none_or(|k| k == record.kind)
            && self.component_id.as_deref().is_none_or(|id| id == record.component_id)
            && self
                .project_id
                .as_deref()
                .is_none_or(|id| record.project_id.as_deref() == Some(id))
            && self.success.is_none_or(|s| s == record.success)
            && self.start_time.is_none_or(|t| record.timestamp >= t)
            && self.end_time.is_none_or(|t| record.timestamp <= t)
            && self.action.as_deref().is_none_or(|a| a == record.action)
            && self.node_id.as_deref().is_none_or(|n| n == record.node_id)
            && self.keyword.as_deref().is_none_or(|kw| record_contains_keyword(record, kw))
    }
}

fn record_contains_keyword(record: &OperationRecord, keyword: &str) -> bool {
    let keyword = keyword.to_lowercase();
    record.component_id.to_lowercase().contains(&keyword)
        || record.project_id.as_deref().is_some_and(|p| p.to_lowercase().contains(&keyword))
        || record.message.as_deref().is_some_and(|m| m.to_lowercase().contains(&keyword))
        || record.node_id.to_lowercase().contains(&keyword)
}

/// The Operations Journal.
pub struct Journal {
    store: Arc<dyn CoordinationStore>,
}

impl Journal {
    /// Builds a journal writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    /// Appends a record, trimming the journal to [`JOURNAL_CAP`] entries.
    ///
    /// # Errors
    /// Returns [`Error::Store`] if the store write fails.
    pub async fn append(&self, record: OperationRecord) -> Result<(), Error> {
        let encoded = serde_json::to_string(&record).map_err(|e| Error::Internal { message: e.to_string() })?;
        self.store
            .lpush_trim(JOURNAL_KEY, &encoded, JOURNAL_CAP, Some(JOURNAL_TTL))
            .await
            .map_err(|e| Error::Store { message: e.to_string() })
    }

    /// Fetches, filters, and paginates the journal. Records are newest-first (the store list is
    /// written head-first by `append`).
    ///
    /// # Errors
    /// Returns [`Error::Store`] if the store read fails.
    pub async fn list(&self, filter: &JournalFilter, offset: usize, limit: usize) -> Result<Vec<OperationRecord>, Error> {
        let raw = self
            .store
            .lrange(JOURNAL_KEY, 0, (JOURNAL_CAP as isize) - 1)
            .await
            .map_err(|e| Error::Store { message: e.to_string() })?;

        let records: Vec<OperationRecord> = raw
            .iter()
            .filter_map(|s| serde_json::from_str(s).ok())
            .filter(|r| filter.matches(r))
            .collect();

        Ok(records.into_iter().skip(offset).take(limit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cplane_coordination::MemoryStore;

    fn record(id: &str, kind: ComponentKind, success: bool) -> OperationRecord {
        OperationRecord {
            id: id.to_string(),
            timestamp: Utc::now(),
            kind,
            component_id: "x".to_string(),
            project_id: None,
            action: "upsert".to_string(),
            success,
            message: None,
            node_id: "node-1".to_string(),
        }
    }

    #[tokio::test]
    async fn list_filters_by_success() {
        let journal = Journal::new(Arc::new(MemoryStore::new()));
        journal.append(record("1", ComponentKind::Input, true)).await.unwrap();
        journal.append(record("2", ComponentKind::Input, false)).await.unwrap();

        let filter = JournalFilter {
            success: Some(false),
            ..Default::default()
        };
        let results = journal.list(&filter, 0, 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "2");
    }

    #[tokio::test]
    async fn list_respects_offset_and_limit() {
        let journal = Journal::new(Arc::new(MemoryStore::new()));
        for i in 0..5 {
            journal.append(record(&i.to_string(), ComponentKind::Output, true)).await.unwrap();
        }
        let page = journal.list(&JournalFilter::default(), 1, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        // Newest-first: ids pushed in order 0..5, head is "4".
        assert_eq!(page[0].id, "3");
    }
}
