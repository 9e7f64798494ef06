//! File health entity model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use nzbflow_core::types::{DbId, Timestamp};

use crate::models::status::StatusId;

/// A row from the `file_health` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FileHealthRecord {
    pub id: DbId,
    pub file_path: String,
    pub status_id: StatusId,
    pub last_error: Option<String>,
    pub source_nzb_path: Option<String>,
    pub error_details: Option<serde_json::Value>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub next_retry_at: Option<Timestamp>,
    pub repair_retry_count: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for the prober's general status report upsert.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportFileHealth {
    pub file_path: String,
    /// `HealthStatus` ID.
    pub status_id: StatusId,
    pub last_error: Option<String>,
    pub source_nzb_path: Option<String>,
    pub error_details: Option<serde_json::Value>,
}

/// Query parameters for the admin health listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthListQuery {
    /// Filter by `HealthStatus` ID.
    pub status_id: Option<StatusId>,
    /// Restrict to records created at or after this timestamp.
    pub since: Option<Timestamp>,
    /// Case-insensitive substring match on `file_path`.
    pub search: Option<String>,
    /// Sort column; unknown or absent values fall back to `created_at`.
    pub sort_by: Option<String>,
    /// `asc` or `desc`; defaults to `desc`.
    pub sort_dir: Option<String>,
    /// Defaults to 50, capped at 500.
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// One row of the per-status count breakdown.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct HealthStatusCount {
    pub status_id: StatusId,
    pub count: i64,
}
