//! FiscalCalendar: fiscal years and the open/closed state of dates.

use crate::error::{db_err, LedgerError, LedgerResult};
use crate::models::{validate_new_year, FiscalYear};
use crate::services::database::{advisory_lock, Database, RowLock};
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::NaiveDate;
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

const FISCAL_YEAR_COLUMNS: &str = "fiscal_year_id, organization_id, name, start_date, end_date, \
     status, closed_by, closed_utc, created_utc";

impl Database {
    #[instrument(skip(self, name), fields(organization_id = %organization_id, start = %start_date, end = %end_date))]
    pub async fn open_year(
        &self,
        organization_id: Uuid,
        name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> LedgerResult<FiscalYear> {
        if name.trim().is_empty() {
            return Err(LedgerError::Validation("fiscal year name is required".to_string()));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["open_year"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;

        // Overlap is checked against a consistent calendar.
        advisory_lock(&mut tx, organization_id, "fiscal_years").await?;

        let existing = sqlx::query_as::<_, FiscalYear>(&format!(
            "SELECT {} FROM fiscal_years WHERE organization_id = $1",
            FISCAL_YEAR_COLUMNS
        ))
        .bind(organization_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err("Failed to load fiscal years"))?;

        validate_new_year(start_date, end_date, &existing)?;

        let year = sqlx::query_as::<_, FiscalYear>(&format!(
            r#"
            INSERT INTO fiscal_years (fiscal_year_id, organization_id, name, start_date, end_date)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            FISCAL_YEAR_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(organization_id)
        .bind(name.trim())
        .bind(start_date)
        .bind(end_date)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("Failed to create fiscal year"))?;

        tx.commit().await.map_err(db_err("Failed to commit transaction"))?;
        timer.observe_duration();

        info!(fiscal_year_id = %year.fiscal_year_id, "Fiscal year opened");
        Ok(year)
    }

    /// Close a fiscal year. Refused while draft entries are dated inside it.
    ///
    /// The year row is held `FOR UPDATE`, so a concurrent posting that took
    /// `FOR SHARE` on it either commits first or sees the year closed.
    #[instrument(skip(self), fields(organization_id = %organization_id, fiscal_year_id = %fiscal_year_id))]
    pub async fn close_year(
        &self,
        organization_id: Uuid,
        fiscal_year_id: Uuid,
        actor_id: Uuid,
    ) -> LedgerResult<FiscalYear> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["close_year"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;

        let year = fetch_year(&mut tx, organization_id, fiscal_year_id, RowLock::Update)
            .await?
            .ok_or_else(|| LedgerError::not_found("fiscal_year", fiscal_year_id))?;

        if !year.is_open() {
            return Err(LedgerError::AlreadyClosed(fiscal_year_id));
        }

        let drafts: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM journal_entries
            WHERE organization_id = $1
              AND status = 'draft'
              AND entry_date BETWEEN $2 AND $3
            "#,
        )
        .bind(organization_id)
        .bind(year.start_date)
        .bind(year.end_date)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("Failed to count draft entries"))?;

        if drafts > 0 {
            return Err(LedgerError::OpenEntriesExist(drafts));
        }

        let closed = sqlx::query_as::<_, FiscalYear>(&format!(
            r#"
            UPDATE fiscal_years
            SET status = 'closed', closed_by = $3, closed_utc = NOW()
            WHERE organization_id = $1 AND fiscal_year_id = $2
            RETURNING {}
            "#,
            FISCAL_YEAR_COLUMNS
        ))
        .bind(organization_id)
        .bind(fiscal_year_id)
        .bind(actor_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("Failed to close fiscal year"))?;

        tx.commit().await.map_err(db_err("Failed to commit transaction"))?;
        timer.observe_duration();

        info!(name = %closed.name, "Fiscal year closed");
        Ok(closed)
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, fiscal_year_id = %fiscal_year_id))]
    pub async fn get_year(&self, organization_id: Uuid, fiscal_year_id: Uuid) -> LedgerResult<FiscalYear> {
        let mut conn = self.pool.acquire().await.map_err(db_err("Failed to acquire connection"))?;
        fetch_year(&mut conn, organization_id, fiscal_year_id, RowLock::None)
            .await?
            .ok_or_else(|| LedgerError::not_found("fiscal_year", fiscal_year_id))
    }

    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn list_years(&self, organization_id: Uuid) -> LedgerResult<Vec<FiscalYear>> {
        sqlx::query_as::<_, FiscalYear>(&format!(
            "SELECT {} FROM fiscal_years WHERE organization_id = $1 ORDER BY start_date",
            FISCAL_YEAR_COLUMNS
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list fiscal years"))
    }

    /// Whether `date` falls in an open fiscal year, and which year covers it.
    /// A date outside every fiscal year is not open.
    #[instrument(skip(self), fields(organization_id = %organization_id, date = %date))]
    pub async fn is_date_open(
        &self,
        organization_id: Uuid,
        date: NaiveDate,
    ) -> LedgerResult<(bool, Option<Uuid>)> {
        let mut conn = self.pool.acquire().await.map_err(db_err("Failed to acquire connection"))?;
        let year = fetch_covering_year(&mut conn, organization_id, date, RowLock::None).await?;
        Ok(match year {
            Some(year) => (year.is_open(), Some(year.fiscal_year_id)),
            None => (false, None),
        })
    }
}

async fn fetch_year(
    conn: &mut PgConnection,
    organization_id: Uuid,
    fiscal_year_id: Uuid,
    lock: RowLock,
) -> LedgerResult<Option<FiscalYear>> {
    sqlx::query_as::<_, FiscalYear>(&format!(
        "SELECT {} FROM fiscal_years WHERE organization_id = $1 AND fiscal_year_id = $2{}",
        FISCAL_YEAR_COLUMNS,
        lock.clause()
    ))
    .bind(organization_id)
    .bind(fiscal_year_id)
    .fetch_optional(conn)
    .await
    .map_err(db_err("Failed to get fiscal year"))
}

/// The fiscal year containing `date`, if any. Years never overlap, so at
/// most one row matches.
pub(crate) async fn fetch_covering_year(
    conn: &mut PgConnection,
    organization_id: Uuid,
    date: NaiveDate,
    lock: RowLock,
) -> LedgerResult<Option<FiscalYear>> {
    sqlx::query_as::<_, FiscalYear>(&format!(
        r#"
        SELECT {} FROM fiscal_years
        WHERE organization_id = $1 AND start_date <= $2 AND end_date >= $2{}
        "#,
        FISCAL_YEAR_COLUMNS,
        lock.clause()
    ))
    .bind(organization_id)
    .bind(date)
    .fetch_optional(conn)
    .await
    .map_err(db_err("Failed to find fiscal year"))
}

/// A date accepts postings only inside an open fiscal year.
pub(crate) async fn require_open_date(
    conn: &mut PgConnection,
    organization_id: Uuid,
    date: NaiveDate,
) -> LedgerResult<FiscalYear> {
    match fetch_covering_year(conn, organization_id, date, RowLock::Share).await? {
        Some(year) if year.is_open() => Ok(year),
        _ => Err(LedgerError::PeriodClosed(date)),
    }
}
