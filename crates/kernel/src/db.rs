//! Database connection pool management and schema setup.

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use crate::config::Config;

/// Schema files in application order.
const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_layout",
    include_str!("../migrations/0001_layout.sql"),
)];

/// Create a PostgreSQL connection pool.
pub async fn create_pool(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to PostgreSQL")?;

    Ok(pool)
}

/// Check if the database connection is healthy.
pub async fn check_health(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}

/// Apply pending schema files, recording each in `layout_migration`.
///
/// Returns the names of newly applied migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<Vec<String>> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS layout_migration (
            migration  TEXT PRIMARY KEY,
            applied_at BIGINT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create layout_migration table")?;

    let applied: Vec<String> =
        sqlx::query_scalar("SELECT migration FROM layout_migration ORDER BY migration")
            .fetch_all(pool)
            .await
            .context("failed to load applied migrations")?;

    let pending: Vec<&(&str, &str)> = MIGRATIONS
        .iter()
        .filter(|(name, _)| !applied.iter().any(|a| a == name))
        .collect();

    if pending.is_empty() {
        debug!("no pending migrations");
        return Ok(Vec::new());
    }

    let mut tx = pool.begin().await.context("failed to start transaction")?;
    let now = chrono::Utc::now().timestamp();
    let mut newly_applied = Vec::new();

    for (name, sql) in pending {
        debug!(migration = name, "executing migration");

        // Schema files hold several statements, which prepared queries reject.
        sqlx::raw_sql(sql)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("migration {name} failed"))?;

        sqlx::query("INSERT INTO layout_migration (migration, applied_at) VALUES ($1, $2)")
            .bind(*name)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("failed to record migration")?;

        newly_applied.push((*name).to_string());
    }

    tx.commit().await.context("failed to commit migrations")?;

    info!(applied = newly_applied.len(), "migrations complete");
    Ok(newly_applied)
}
