//! Database connection and pool management.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::LedgerConfig;
use crate::error::LedgerError;

/// Creates a database connection pool.
pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
) -> std::result::Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Creates a pool from configuration; fails when no database URL is set.
pub async fn connect(config: &LedgerConfig) -> crate::error::Result<PgPool> {
    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| LedgerError::BadRequest("DATABASE_URL is not set".to_string()))?;
    let pool = create_pool(url, config.max_connections).await?;
    tracing::info!(max_connections = config.max_connections, "Connected to PostgreSQL");
    Ok(pool)
}

/// Runs all pending migrations.
pub async fn run_migrations(pool: &PgPool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
