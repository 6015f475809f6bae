//! PostgreSQL persistence for attendance.
//!
//! [`PgStore`] implements the ingestion repository, directory and calendar
//! traits over one pool. Writes for a single punch go through one
//! transaction; the partial unique index on open sessions backs up the
//! per-employee lock.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;

mod attendance;
mod directory;

pub use directory::seed_directory;
pub use sqlx::PgPool;

pub const ENV_DB_URL: &str = "TALLY_DATABASE_URL";

/// Connect to Postgres using TALLY_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_sessions_table: bool,
}

/// Connectivity plus schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='attendance_sessions'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_sessions_table: exists,
    })
}

/// Repository, directory and calendar provider over one pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
