//! Import queue entity model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use nzbflow_core::types::{DbId, Timestamp};

use crate::models::status::StatusId;

/// A row from the `import_queue` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ImportQueueItem {
    pub id: DbId,
    pub nzb_path: String,
    pub category: Option<String>,
    pub priority: StatusId,
    pub status_id: StatusId,
    pub max_retries: i32,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub storage_path: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for enqueueing an NZB import job.
#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueImport {
    pub nzb_path: String,
    /// `QueuePriority` ID. Defaults to Normal.
    pub priority: Option<StatusId>,
    /// Defaults to 3.
    pub max_retries: Option<i32>,
    pub category: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl EnqueueImport {
    /// Convenience constructor for the common path-only case.
    pub fn new(nzb_path: impl Into<String>) -> Self {
        Self {
            nzb_path: nzb_path.into(),
            priority: None,
            max_retries: None,
            category: None,
            metadata: None,
        }
    }
}

/// Queue counts grouped into the four externally meaningful buckets.
///
/// `queued` covers Pending and Retrying, both of which are claimable.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QueueStats {
    pub queued: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}
