//! Database service for finance-service.
//!
//! `Database` wraps the pool; each ledger component adds its operations in
//! its own `impl Database` block (see the sibling modules).

use crate::error::{db_err, LedgerResult};
use service_core::error::AppError;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Default and maximum page sizes for cursor-paginated lists.
const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 100;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "finance-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::database("Failed to connect", e))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database("Health check failed", e))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::database("Migration failed", e))?;
        info!("Database migrations completed");
        Ok(())
    }
}

/// Take the next value of an organization-scoped sequence.
///
/// Runs inside the caller's transaction: the row stays locked until commit,
/// so concurrent callers are serialized and numbers are gap-free.
pub(crate) async fn next_sequence(
    conn: &mut PgConnection,
    organization_id: Uuid,
    name: &str,
) -> LedgerResult<i64> {
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO sequences (organization_id, name, last_value)
        VALUES ($1, $2, 1)
        ON CONFLICT (organization_id, name)
        DO UPDATE SET last_value = sequences.last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(organization_id)
    .bind(name)
    .fetch_one(conn)
    .await
    .map_err(db_err("Failed to advance sequence"))
}

/// Transaction-scoped advisory lock serializing writers of one
/// organization-wide structure (the account tree, the fiscal calendar).
pub(crate) async fn advisory_lock(
    conn: &mut PgConnection,
    organization_id: Uuid,
    scope: &str,
) -> LedgerResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(format!("{}:{}", organization_id, scope))
        .execute(conn)
        .await
        .map_err(db_err("Failed to take advisory lock"))?;
    Ok(())
}

/// Row lock appended to a `SELECT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowLock {
    None,
    Share,
    Update,
}

impl RowLock {
    pub(crate) fn clause(self) -> &'static str {
        match self {
            RowLock::None => "",
            RowLock::Share => " FOR SHARE",
            RowLock::Update => " FOR UPDATE",
        }
    }
}

pub(crate) fn page_limit(page_size: i32) -> i64 {
    if page_size <= 0 {
        DEFAULT_PAGE_SIZE
    } else {
        (page_size as i64).min(MAX_PAGE_SIZE)
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(e) if e.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_limit_defaults_and_caps() {
        assert_eq!(page_limit(0), DEFAULT_PAGE_SIZE);
        assert_eq!(page_limit(-3), DEFAULT_PAGE_SIZE);
        assert_eq!(page_limit(10), 10);
        assert_eq!(page_limit(10_000), MAX_PAGE_SIZE);
    }
}
