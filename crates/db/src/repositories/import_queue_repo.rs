//! Repository for the `import_queue` table.
//!
//! Workers claim rows through a single conditional UPDATE, so at most one
//! caller ever receives a given row no matter how many claim concurrently.
//! Uses `QueueStatus` from `models::status` for all transitions; no magic
//! numbers.

use sqlx::PgPool;
use tracing::info;

use nzbflow_core::search::{clamp_limit, clamp_offset, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT};
use nzbflow_core::types::DbId;

use crate::models::import_queue::{EnqueueImport, ImportQueueItem, QueueStats};
use crate::models::status::{QueuePriority, QueueStatus};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, nzb_path, category, priority, status_id, max_retries, retry_count, \
    error_message, storage_path, metadata, created_at, updated_at";

/// Retry budget applied when the producer does not specify one.
const DEFAULT_MAX_RETRIES: i32 = 3;

/// Provides enqueue, claim and recovery operations for import jobs.
pub struct ImportQueueRepo;

impl ImportQueueRepo {
    /// Enqueue an NZB import job, deduplicating on `nzb_path`.
    ///
    /// If a row for the path already exists and is terminal (`Completed`,
    /// or `Failed` with exhausted retries), it is reset to `Pending` with
    /// the new priority and retry budget, keeping its `id`. If the existing
    /// row is still active, the call is a no-op and the active row is
    /// returned untouched.
    pub async fn enqueue(
        pool: &PgPool,
        input: &EnqueueImport,
    ) -> Result<ImportQueueItem, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        Self::upsert(&mut conn, input).await
    }

    /// Enqueue a batch of jobs with per-item [`enqueue`](Self::enqueue)
    /// semantics, all inside one transaction.
    ///
    /// An empty input succeeds without touching the store.
    pub async fn enqueue_batch(
        pool: &PgPool,
        items: &[EnqueueImport],
    ) -> Result<Vec<ImportQueueItem>, sqlx::Error> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = pool.begin().await?;
        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            rows.push(Self::upsert(&mut tx, item).await?);
        }
        tx.commit().await?;
        Ok(rows)
    }

    /// Shared upsert used by `enqueue` and `enqueue_batch`.
    async fn upsert(
        conn: &mut sqlx::PgConnection,
        input: &EnqueueImport,
    ) -> Result<ImportQueueItem, sqlx::Error> {
        let query = format!(
            "INSERT INTO import_queue (nzb_path, category, priority, max_retries, metadata) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (nzb_path) DO UPDATE SET \
                 status_id = $6, \
                 priority = EXCLUDED.priority, \
                 max_retries = EXCLUDED.max_retries, \
                 retry_count = 0, \
                 error_message = NULL \
             WHERE import_queue.status_id = $7 \
                OR (import_queue.status_id = $8 \
                    AND import_queue.retry_count >= import_queue.max_retries) \
             RETURNING {COLUMNS}"
        );

        let updated = sqlx::query_as::<_, ImportQueueItem>(&query)
            .bind(&input.nzb_path)
            .bind(&input.category)
            .bind(input.priority.unwrap_or(QueuePriority::Normal.id()))
            .bind(input.max_retries.unwrap_or(DEFAULT_MAX_RETRIES))
            .bind(&input.metadata)
            .bind(QueueStatus::Pending.id())
            .bind(QueueStatus::Completed.id())
            .bind(QueueStatus::Failed.id())
            .fetch_optional(&mut *conn)
            .await?;

        match updated {
            Some(row) => Ok(row),
            // Conflict against an active row: leave it alone, hand it back.
            None => {
                let query = format!("SELECT {COLUMNS} FROM import_queue WHERE nzb_path = $1");
                sqlx::query_as::<_, ImportQueueItem>(&query)
                    .bind(&input.nzb_path)
                    .fetch_optional(&mut *conn)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound)
            }
        }
    }

    /// True iff a row with that path exists and is not `Completed`.
    ///
    /// Producer-side dedup check used before scheduling a new import.
    pub async fn is_queued(pool: &PgPool, nzb_path: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS( \
                 SELECT 1 FROM import_queue \
                 WHERE nzb_path = $1 AND status_id != $2 \
             )",
        )
        .bind(nzb_path)
        .bind(QueueStatus::Completed.id())
        .fetch_one(pool)
        .await
    }

    /// Atomically claim the next eligible job and move it to `Processing`.
    ///
    /// Eligible rows are `Pending` or `Retrying` with retries remaining,
    /// ordered by priority (high first) then `id` (FIFO within a priority
    /// band). Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent claimers
    /// never double-dispatch a row; a caller that loses the race simply
    /// claims the next eligible row or gets `None`.
    pub async fn claim_next(pool: &PgPool) -> Result<Option<ImportQueueItem>, sqlx::Error> {
        let query = format!(
            "UPDATE import_queue \
             SET status_id = $1 \
             WHERE id = ( \
                 SELECT id FROM import_queue \
                 WHERE status_id IN ($2, $3) AND retry_count < max_retries \
                 ORDER BY priority DESC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ImportQueueItem>(&query)
            .bind(QueueStatus::Processing.id())
            .bind(QueueStatus::Pending.id())
            .bind(QueueStatus::Retrying.id())
            .fetch_optional(pool)
            .await
    }

    /// Targeted claim of one specific row.
    ///
    /// Returns `true` if this caller won the transition to `Processing`,
    /// `false` if the row is missing or not currently `Pending`.
    pub async fn try_claim(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE import_queue SET status_id = $2 WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(QueueStatus::Processing.id())
        .bind(QueueStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a worker-reported outcome for a claimed job.
    ///
    /// Writing `Retrying` also increments `retry_count`. The write is
    /// unconditional on the current status (the worker owns the claim);
    /// a missing `id` surfaces as `RowNotFound`.
    pub async fn update_status(
        pool: &PgPool,
        id: DbId,
        status: QueueStatus,
        error_message: Option<&str>,
    ) -> Result<ImportQueueItem, sqlx::Error> {
        let query = format!(
            "UPDATE import_queue \
             SET status_id = $2, \
                 error_message = $3, \
                 retry_count = retry_count + CASE WHEN $2 = $4 THEN 1 ELSE 0 END \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ImportQueueItem>(&query)
            .bind(id)
            .bind(status.id())
            .bind(error_message)
            .bind(QueueStatus::Retrying.id())
            .fetch_optional(pool)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Crash-recovery sweep: reset every `Processing`/`Retrying` row back
    /// to `Pending`, retaining retry history and error messages.
    ///
    /// Run once at process-group startup, before workers begin claiming.
    pub async fn reset_stale(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE import_queue SET status_id = $1 WHERE status_id IN ($2, $3)",
        )
        .bind(QueueStatus::Pending.id())
        .bind(QueueStatus::Processing.id())
        .bind(QueueStatus::Retrying.id())
        .execute(pool)
        .await?;

        let reset = result.rows_affected();
        if reset > 0 {
            info!(reset, "recovered stale import queue items");
        }
        Ok(reset)
    }

    /// Find a queue item by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ImportQueueItem>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM import_queue WHERE id = $1");
        sqlx::query_as::<_, ImportQueueItem>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a queue item by its NZB path.
    pub async fn find_by_path(
        pool: &PgPool,
        nzb_path: &str,
    ) -> Result<Option<ImportQueueItem>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM import_queue WHERE nzb_path = $1");
        sqlx::query_as::<_, ImportQueueItem>(&query)
            .bind(nzb_path)
            .fetch_optional(pool)
            .await
    }

    /// List queue items, newest first.
    pub async fn list(
        pool: &PgPool,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ImportQueueItem>, sqlx::Error> {
        let limit = clamp_limit(limit, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT);
        let offset = clamp_offset(offset);

        let query = format!(
            "SELECT {COLUMNS} FROM import_queue \
             ORDER BY created_at DESC, id DESC \
             LIMIT $1 OFFSET $2"
        );
        sqlx::query_as::<_, ImportQueueItem>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Queue counts in the four externally meaningful buckets.
    pub async fn stats(pool: &PgPool) -> Result<QueueStats, sqlx::Error> {
        sqlx::query_as::<_, QueueStats>(
            "SELECT \
                 COUNT(*) FILTER (WHERE status_id IN ($1, $2)) AS queued, \
                 COUNT(*) FILTER (WHERE status_id = $3) AS processing, \
                 COUNT(*) FILTER (WHERE status_id = $4) AS completed, \
                 COUNT(*) FILTER (WHERE status_id = $5) AS failed \
             FROM import_queue",
        )
        .bind(QueueStatus::Pending.id())
        .bind(QueueStatus::Retrying.id())
        .bind(QueueStatus::Processing.id())
        .bind(QueueStatus::Completed.id())
        .bind(QueueStatus::Failed.id())
        .fetch_one(pool)
        .await
    }

    /// Record where the assembled output landed. No status side effects.
    pub async fn set_storage_path(
        pool: &PgPool,
        id: DbId,
        storage_path: &str,
    ) -> Result<(), sqlx::Error> {
        let result = sqlx::query("UPDATE import_queue SET storage_path = $2 WHERE id = $1")
            .bind(id)
            .bind(storage_path)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    /// Attach or replace the passthrough metadata payload.
    pub async fn update_metadata(
        pool: &PgPool,
        id: DbId,
        metadata: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        let result = sqlx::query("UPDATE import_queue SET metadata = $2 WHERE id = $1")
            .bind(id)
            .bind(metadata)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }
}
