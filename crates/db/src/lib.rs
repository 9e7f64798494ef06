//! Database access layer for the nzbflow import pipeline.
//!
//! Two tables, two repositories: `import_queue` (durable download jobs
//! claimed by workers) and `file_health` (post-import integrity tracking).
//! All mutual exclusion between workers is enforced by conditional updates
//! in the store; nothing here holds in-process locks.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

pub mod models;
pub mod repositories;

/// Open a connection pool against the given Postgres URL.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    info!(max_connections, "database pool connected");
    Ok(pool)
}

/// Run pending migrations from `db/migrations`.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await?;
    info!("database migrations applied");
    Ok(())
}

/// Cheap liveness probe used at process startup.
pub async fn health_check(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
