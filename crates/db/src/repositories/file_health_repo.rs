//! Repository for the `file_health` table.
//!
//! Tracks post-import integrity of produced media files through a
//! retry/backoff/repair state machine. Probers lease records via the
//! `Pending -> Checking` transition; exhausted retries escalate to
//! `RepairTriggered`, and repeated repair failures end in `Corrupted`.

use chrono::Utc;
use sqlx::PgPool;
use tracing::info;

use nzbflow_core::retry::next_retry_at;
use nzbflow_core::search::{clamp_limit, clamp_offset, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT};
use nzbflow_core::types::{DbId, Timestamp};

use crate::models::file_health::{
    FileHealthRecord, HealthListQuery, HealthStatusCount, ReportFileHealth,
};
use crate::models::status::HealthStatus;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, file_path, status_id, last_error, source_nzb_path, error_details, \
    retry_count, max_retries, next_retry_at, repair_retry_count, \
    created_at, updated_at";

/// Provides upsert, retry/backoff, repair-escalation and maintenance
/// operations for file health records.
pub struct FileHealthRepo;

impl FileHealthRepo {
    /// Register a file for health checking.
    ///
    /// Creates a `Pending` record, or updates `max_retries` (and
    /// `source_nzb_path` when provided) in place without disturbing the
    /// existing status or retry progress.
    pub async fn register(
        pool: &PgPool,
        file_path: &str,
        max_retries: i32,
        source_nzb_path: Option<&str>,
    ) -> Result<FileHealthRecord, sqlx::Error> {
        let query = format!(
            "INSERT INTO file_health (file_path, max_retries, source_nzb_path) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (file_path) DO UPDATE SET \
                 max_retries = EXCLUDED.max_retries, \
                 source_nzb_path = COALESCE(EXCLUDED.source_nzb_path, file_health.source_nzb_path) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, FileHealthRecord>(&query)
            .bind(file_path)
            .bind(max_retries)
            .bind(source_nzb_path)
            .fetch_one(pool)
            .await
    }

    /// General prober report: upsert any status directly, creating the
    /// record if the path has never been seen.
    pub async fn report(
        pool: &PgPool,
        input: &ReportFileHealth,
    ) -> Result<FileHealthRecord, sqlx::Error> {
        let query = format!(
            "INSERT INTO file_health (file_path, status_id, last_error, source_nzb_path, error_details) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (file_path) DO UPDATE SET \
                 status_id = EXCLUDED.status_id, \
                 last_error = EXCLUDED.last_error, \
                 source_nzb_path = COALESCE(EXCLUDED.source_nzb_path, file_health.source_nzb_path), \
                 error_details = EXCLUDED.error_details \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, FileHealthRecord>(&query)
            .bind(&input.file_path)
            .bind(input.status_id)
            .bind(&input.last_error)
            .bind(&input.source_nzb_path)
            .bind(&input.error_details)
            .fetch_one(pool)
            .await
    }

    /// Records eligible for an automatic health check: `Pending` with
    /// retries remaining. Due records (earliest `next_retry_at`, NULLs
    /// first) sort to the front.
    pub async fn unhealthy(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<FileHealthRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM file_health \
             WHERE status_id = $1 AND retry_count < max_retries \
             ORDER BY next_retry_at ASC NULLS FIRST, id ASC \
             LIMIT $2"
        );
        sqlx::query_as::<_, FileHealthRecord>(&query)
            .bind(HealthStatus::Pending.id())
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Records awaiting the external repair notifier: exactly the
    /// `RepairTriggered` set, disjoint from [`unhealthy`](Self::unhealthy).
    pub async fn repair_candidates(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<FileHealthRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM file_health \
             WHERE status_id = $1 \
             ORDER BY updated_at ASC, id ASC \
             LIMIT $2"
        );
        sqlx::query_as::<_, FileHealthRecord>(&query)
            .bind(HealthStatus::RepairTriggered.id())
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Record a failed check with retries remaining: bump `retry_count`,
    /// store the error and schedule the next attempt on the exponential
    /// backoff curve. The status is deliberately left unchanged; the
    /// orchestrator decides when exhaustion escalates to repair.
    pub async fn increment_retry(
        pool: &PgPool,
        file_path: &str,
        error_message: &str,
    ) -> Result<FileHealthRecord, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let row: Option<(DbId, i32)> = sqlx::query_as(
            "SELECT id, retry_count FROM file_health WHERE file_path = $1 FOR UPDATE",
        )
        .bind(file_path)
        .fetch_optional(&mut *tx)
        .await?;
        let (id, retry_count) = row.ok_or(sqlx::Error::RowNotFound)?;

        let new_count = retry_count + 1;
        let retry_at: Timestamp = next_retry_at(Utc::now(), new_count);

        let query = format!(
            "UPDATE file_health \
             SET retry_count = $2, last_error = $3, next_retry_at = $4 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let record = sqlx::query_as::<_, FileHealthRecord>(&query)
            .bind(id)
            .bind(new_count)
            .bind(error_message)
            .bind(retry_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(record)
    }

    /// Lease a record for checking: conditional `Pending -> Checking`.
    ///
    /// Returns `true` if this prober won the lease, `false` if the record
    /// exists but is not `Pending` (already leased or terminal), and
    /// `RowNotFound` if no record has that path.
    pub async fn set_checking(pool: &PgPool, file_path: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE file_health SET status_id = $2 WHERE file_path = $1 AND status_id = $3",
        )
        .bind(file_path)
        .bind(HealthStatus::Checking.id())
        .bind(HealthStatus::Pending.id())
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        Self::require_exists_by_path(pool, file_path).await?;
        Ok(false)
    }

    /// ID-keyed variant of [`set_checking`](Self::set_checking).
    pub async fn set_checking_by_id(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE file_health SET status_id = $2 WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(HealthStatus::Checking.id())
        .bind(HealthStatus::Pending.id())
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        Self::require_exists_by_id(pool, id).await?;
        Ok(false)
    }

    /// Escalate to `RepairTriggered`, recording the error that exhausted
    /// the retry budget. The record leaves the automatic check rotation
    /// and is surfaced to the repair notifier instead.
    pub async fn set_repair_triggered(
        pool: &PgPool,
        file_path: &str,
        error_message: &str,
    ) -> Result<FileHealthRecord, sqlx::Error> {
        let query = format!(
            "UPDATE file_health SET status_id = $2, last_error = $3 \
             WHERE file_path = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, FileHealthRecord>(&query)
            .bind(file_path)
            .bind(HealthStatus::RepairTriggered.id())
            .bind(error_message)
            .fetch_optional(pool)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// ID-keyed variant of [`set_repair_triggered`](Self::set_repair_triggered).
    pub async fn set_repair_triggered_by_id(
        pool: &PgPool,
        id: DbId,
        error_message: &str,
    ) -> Result<FileHealthRecord, sqlx::Error> {
        let query = format!(
            "UPDATE file_health SET status_id = $2, last_error = $3 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, FileHealthRecord>(&query)
            .bind(id)
            .bind(HealthStatus::RepairTriggered.id())
            .bind(error_message)
            .fetch_optional(pool)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Terminal failure: mark the file `Corrupted` with its final error.
    /// Callable directly (skip retries) or after repair exhaustion.
    pub async fn mark_corrupted(
        pool: &PgPool,
        file_path: &str,
        final_error: &str,
    ) -> Result<FileHealthRecord, sqlx::Error> {
        let query = format!(
            "UPDATE file_health SET status_id = $2, last_error = $3 \
             WHERE file_path = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, FileHealthRecord>(&query)
            .bind(file_path)
            .bind(HealthStatus::Corrupted.id())
            .bind(final_error)
            .fetch_optional(pool)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// ID-keyed variant of [`mark_corrupted`](Self::mark_corrupted).
    pub async fn set_corrupted_by_id(
        pool: &PgPool,
        id: DbId,
        final_error: &str,
    ) -> Result<FileHealthRecord, sqlx::Error> {
        let query = format!(
            "UPDATE file_health SET status_id = $2, last_error = $3 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, FileHealthRecord>(&query)
            .bind(id)
            .bind(HealthStatus::Corrupted.id())
            .bind(final_error)
            .fetch_optional(pool)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Bump the separate repair retry counter. Only applies while the
    /// record is `RepairTriggered`, so repair attempts have their own
    /// budget independent of `retry_count`.
    ///
    /// Returns `false` if the record exists but is not `RepairTriggered`.
    pub async fn increment_repair_retry(
        pool: &PgPool,
        file_path: &str,
        error_message: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE file_health \
             SET repair_retry_count = repair_retry_count + 1, last_error = $2 \
             WHERE file_path = $1 AND status_id = $3",
        )
        .bind(file_path)
        .bind(error_message)
        .bind(HealthStatus::RepairTriggered.id())
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        Self::require_exists_by_path(pool, file_path).await?;
        Ok(false)
    }

    /// Crash-recovery sweep: every record stuck in `Checking` reverts to
    /// `Pending`. Run once at prober-pool startup.
    pub async fn reset_all_checking(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE file_health SET status_id = $1 WHERE status_id = $2")
            .bind(HealthStatus::Pending.id())
            .bind(HealthStatus::Checking.id())
            .execute(pool)
            .await?;

        let reset = result.rows_affected();
        if reset > 0 {
            info!(reset, "recovered file health records stuck in checking");
        }
        Ok(reset)
    }

    /// Admin-facing filtered, sorted and paginated listing.
    pub async fn list(
        pool: &PgPool,
        params: &HealthListQuery,
    ) -> Result<Vec<FileHealthRecord>, sqlx::Error> {
        let limit = clamp_limit(params.limit, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT);
        let offset = clamp_offset(params.offset);

        let (where_clause, bind_values, bind_idx) = build_health_filter(params);
        let order = sort_column(params.sort_by.as_deref());
        let direction = sort_direction(params.sort_dir.as_deref());

        let query = format!(
            "SELECT {COLUMNS} FROM file_health {where_clause} \
             ORDER BY {order} {direction}, id DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1
        );

        let q = bind_health_values(sqlx::query_as::<_, FileHealthRecord>(&query), &bind_values);
        q.bind(limit).bind(offset).fetch_all(pool).await
    }

    /// Count records matching the same filter as [`list`](Self::list),
    /// for pagination metadata.
    pub async fn count(pool: &PgPool, params: &HealthListQuery) -> Result<i64, sqlx::Error> {
        let (where_clause, bind_values, _) = build_health_filter(params);

        let query = format!("SELECT COUNT(*)::BIGINT FROM file_health {where_clause}");

        let q = bind_health_values_scalar(sqlx::query_scalar::<_, i64>(&query), &bind_values);
        q.fetch_one(pool).await
    }

    /// Per-status record counts. Statuses with no records are absent.
    pub async fn stats(pool: &PgPool) -> Result<Vec<HealthStatusCount>, sqlx::Error> {
        sqlx::query_as::<_, HealthStatusCount>(
            "SELECT status_id, COUNT(*)::BIGINT AS count \
             FROM file_health \
             GROUP BY status_id \
             ORDER BY status_id",
        )
        .fetch_all(pool)
        .await
    }

    /// Delete one record by path. `RowNotFound` if absent.
    pub async fn delete(pool: &PgPool, file_path: &str) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM file_health WHERE file_path = $1")
            .bind(file_path)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    /// Delete one record by ID. `RowNotFound` if absent.
    pub async fn delete_by_id(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM file_health WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    /// Delete a set of records, all-or-nothing.
    ///
    /// If any named path is missing, the whole call fails with
    /// `RowNotFound` and no rows are deleted. An empty input succeeds
    /// without touching the store.
    pub async fn delete_bulk(pool: &PgPool, file_paths: &[String]) -> Result<u64, sqlx::Error> {
        if file_paths.is_empty() {
            return Ok(0);
        }

        let mut tx = pool.begin().await?;

        let present: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT file_path)::BIGINT FROM file_health WHERE file_path = ANY($1)",
        )
        .bind(file_paths)
        .fetch_one(&mut *tx)
        .await?;

        let mut distinct = file_paths.to_vec();
        distinct.sort_unstable();
        distinct.dedup();
        if present != distinct.len() as i64 {
            return Err(sqlx::Error::RowNotFound);
        }

        let result = sqlx::query("DELETE FROM file_health WHERE file_path = ANY($1)")
            .bind(file_paths)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// Garbage collection after a library scan: delete every record whose
    /// path is not in the keep-set. An empty keep-set deletes all records.
    pub async fn cleanup(pool: &PgPool, existing_paths: &[String]) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM file_health WHERE NOT (file_path = ANY($1))")
            .bind(existing_paths)
            .execute(pool)
            .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            info!(removed, "cleaned up orphaned file health records");
        }
        Ok(removed)
    }

    /// Reset named records to `Pending` with a fresh retry budget.
    ///
    /// Absent paths are silently skipped; the count of rows actually
    /// reset is returned.
    pub async fn reset_bulk(pool: &PgPool, file_paths: &[String]) -> Result<u64, sqlx::Error> {
        if file_paths.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            "UPDATE file_health \
             SET status_id = $2, retry_count = 0, next_retry_at = NULL \
             WHERE file_path = ANY($1)",
        )
        .bind(file_paths)
        .bind(HealthStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Find a record by path.
    pub async fn find_by_path(
        pool: &PgPool,
        file_path: &str,
    ) -> Result<Option<FileHealthRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM file_health WHERE file_path = $1");
        sqlx::query_as::<_, FileHealthRecord>(&query)
            .bind(file_path)
            .fetch_optional(pool)
            .await
    }

    /// Find a record by ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<FileHealthRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM file_health WHERE id = $1");
        sqlx::query_as::<_, FileHealthRecord>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Distinguish "no-op by state" from "no such record" after a
    /// conditional update matched zero rows.
    async fn require_exists_by_path(pool: &PgPool, file_path: &str) -> Result<(), sqlx::Error> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM file_health WHERE file_path = $1)")
                .bind(file_path)
                .fetch_one(pool)
                .await?;
        if !exists {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    async fn require_exists_by_id(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM file_health WHERE id = $1)")
                .bind(id)
                .fetch_one(pool)
                .await?;
        if !exists {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Filter building
// ---------------------------------------------------------------------------

/// Owned bind value for dynamically built WHERE clauses.
enum BindValue {
    Status(crate::models::status::StatusId),
    Text(String),
    Timestamp(Timestamp),
}

/// Build the WHERE clause for [`FileHealthRepo::list`] /
/// [`FileHealthRepo::count`]. Returns the clause, the values to bind in
/// order, and the next free bind parameter index.
fn build_health_filter(params: &HealthListQuery) -> (String, Vec<BindValue>, u32) {
    let mut conditions: Vec<String> = Vec::new();
    let mut bind_idx = 1u32;
    let mut bind_values: Vec<BindValue> = Vec::new();

    if let Some(status_id) = params.status_id {
        conditions.push(format!("status_id = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Status(status_id));
    }

    if let Some(since) = params.since {
        conditions.push(format!("created_at >= ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Timestamp(since));
    }

    if let Some(ref search) = params.search {
        conditions.push(format!("file_path ILIKE ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Text(format!("%{search}%")));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    (where_clause, bind_values, bind_idx)
}

/// Whitelist the sort column; anything unknown falls back to `created_at`.
fn sort_column(sort_by: Option<&str>) -> &'static str {
    match sort_by {
        Some("file_path") => "file_path",
        Some("status") => "status_id",
        Some("retry_count") => "retry_count",
        Some("next_retry_at") => "next_retry_at",
        Some("updated_at") => "updated_at",
        _ => "created_at",
    }
}

/// Normalize the sort direction; anything but `asc` sorts descending.
fn sort_direction(sort_dir: Option<&str>) -> &'static str {
    match sort_dir {
        Some(d) if d.eq_ignore_ascii_case("asc") => "ASC",
        _ => "DESC",
    }
}

/// Bind a slice of `BindValue` to a sqlx `QueryAs`.
fn bind_health_values<'q, O>(
    mut q: sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments>,
    bind_values: &'q [BindValue],
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments> {
    for val in bind_values {
        match val {
            BindValue::Status(v) => q = q.bind(*v),
            BindValue::Text(v) => q = q.bind(v.as_str()),
            BindValue::Timestamp(v) => q = q.bind(*v),
        }
    }
    q
}

/// Bind a slice of `BindValue` to a sqlx `QueryScalar`.
fn bind_health_values_scalar<'q>(
    mut q: sqlx::query::QueryScalar<'q, sqlx::Postgres, i64, sqlx::postgres::PgArguments>,
    bind_values: &'q [BindValue],
) -> sqlx::query::QueryScalar<'q, sqlx::Postgres, i64, sqlx::postgres::PgArguments> {
    for val in bind_values {
        match val {
            BindValue::Status(v) => q = q.bind(*v),
            BindValue::Text(v) => q = q.bind(v.as_str()),
            BindValue::Timestamp(v) => q = q.bind(*v),
        }
    }
    q
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_sort_column_falls_back_to_created_at() {
        assert_eq!(sort_column(Some("file_path")), "file_path");
        assert_eq!(sort_column(Some("status")), "status_id");
        assert_eq!(sort_column(Some("; DROP TABLE file_health")), "created_at");
        assert_eq!(sort_column(None), "created_at");
    }

    #[test]
    fn sort_direction_defaults_to_desc() {
        assert_eq!(sort_direction(Some("asc")), "ASC");
        assert_eq!(sort_direction(Some("ASC")), "ASC");
        assert_eq!(sort_direction(Some("desc")), "DESC");
        assert_eq!(sort_direction(Some("sideways")), "DESC");
        assert_eq!(sort_direction(None), "DESC");
    }

    #[test]
    fn filter_with_no_params_has_no_where_clause() {
        let (clause, values, next_idx) = build_health_filter(&HealthListQuery::default());
        assert!(clause.is_empty());
        assert!(values.is_empty());
        assert_eq!(next_idx, 1);
    }

    #[test]
    fn filter_numbers_parameters_sequentially() {
        let params = HealthListQuery {
            status_id: Some(1),
            search: Some("movie".into()),
            ..Default::default()
        };
        let (clause, values, next_idx) = build_health_filter(&params);
        assert_eq!(clause, "WHERE status_id = $1 AND file_path ILIKE $2");
        assert_eq!(values.len(), 2);
        assert_eq!(next_idx, 3);
    }
}
