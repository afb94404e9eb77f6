//! JournalRegistry: journal definitions that classify entries.

use crate::error::{db_err, LedgerError, LedgerResult};
use crate::models::{ActiveFilter, Journal, JournalType};
use crate::services::database::{is_unique_violation, Database, RowLock};
use crate::services::metrics::DB_QUERY_DURATION;
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

impl Database {
    // -------------------------------------------------------------------------
    // Journal Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, name), fields(organization_id = %organization_id, code = %code))]
    pub async fn create_journal(
        &self,
        organization_id: Uuid,
        code: &str,
        name: &str,
        journal_type: JournalType,
    ) -> LedgerResult<Journal> {
        let (code, name) = (code.trim(), name.trim());
        if code.is_empty() || name.is_empty() {
            return Err(LedgerError::Validation(
                "journal code and name are required".to_string(),
            ));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_journal"])
            .start_timer();

        let journal = sqlx::query_as::<_, Journal>(
            r#"
            INSERT INTO journals (journal_id, organization_id, code, name, journal_type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING journal_id, organization_id, code, name, journal_type, active, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(organization_id)
        .bind(code)
        .bind(name)
        .bind(journal_type.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::DuplicateCode(code.to_string())
            } else {
                db_err("Failed to create journal")(e)
            }
        })?;

        timer.observe_duration();
        info!(journal_id = %journal.journal_id, "Journal created");

        Ok(journal)
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, journal_id = %journal_id))]
    pub async fn get_journal(&self, organization_id: Uuid, journal_id: Uuid) -> LedgerResult<Journal> {
        let mut conn = self.pool.acquire().await.map_err(db_err("Failed to acquire connection"))?;
        fetch_journal(&mut conn, organization_id, journal_id, RowLock::None)
            .await?
            .ok_or_else(|| LedgerError::not_found("journal", journal_id))
    }

    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn list_journals(
        &self,
        organization_id: Uuid,
        journal_type: Option<JournalType>,
        active: ActiveFilter,
    ) -> LedgerResult<Vec<Journal>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_journals"])
            .start_timer();

        let journals = sqlx::query_as::<_, Journal>(
            r#"
            SELECT journal_id, organization_id, code, name, journal_type, active, created_utc
            FROM journals
            WHERE organization_id = $1
              AND ($2::varchar IS NULL OR journal_type = $2)
              AND ($3::boolean IS NULL OR active = $3)
            ORDER BY code
            "#,
        )
        .bind(organization_id)
        .bind(journal_type.map(|t| t.as_str()))
        .bind(active.as_flag())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list journals"))?;

        timer.observe_duration();
        Ok(journals)
    }

    /// Existing entries keep their journal; new drafts are refused.
    #[instrument(skip(self), fields(organization_id = %organization_id, journal_id = %journal_id))]
    pub async fn deactivate_journal(&self, organization_id: Uuid, journal_id: Uuid) -> LedgerResult<Journal> {
        let journal = sqlx::query_as::<_, Journal>(
            r#"
            UPDATE journals SET active = FALSE
            WHERE organization_id = $1 AND journal_id = $2
            RETURNING journal_id, organization_id, code, name, journal_type, active, created_utc
            "#,
        )
        .bind(organization_id)
        .bind(journal_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to deactivate journal"))?
        .ok_or_else(|| LedgerError::not_found("journal", journal_id))?;

        info!("Journal deactivated");
        Ok(journal)
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, journal_id = %journal_id))]
    pub async fn delete_journal(&self, organization_id: Uuid, journal_id: Uuid) -> LedgerResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;

        fetch_journal(&mut tx, organization_id, journal_id, RowLock::Update)
            .await?
            .ok_or_else(|| LedgerError::not_found("journal", journal_id))?;

        let in_use: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM journal_entries WHERE journal_id = $1)",
        )
        .bind(journal_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("Failed to check journal references"))?;

        if in_use {
            return Err(LedgerError::JournalInUse(journal_id));
        }

        sqlx::query("DELETE FROM journals WHERE organization_id = $1 AND journal_id = $2")
            .bind(organization_id)
            .bind(journal_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("Failed to delete journal"))?;

        tx.commit().await.map_err(db_err("Failed to commit transaction"))?;
        info!("Journal deleted");
        Ok(())
    }
}

/// Draft creation takes `FOR SHARE`; deletion takes `FOR UPDATE`.
pub(crate) async fn fetch_journal(
    conn: &mut PgConnection,
    organization_id: Uuid,
    journal_id: Uuid,
    lock: RowLock,
) -> LedgerResult<Option<Journal>> {
    let sql = format!(
        r#"
        SELECT journal_id, organization_id, code, name, journal_type, active, created_utc
        FROM journals
        WHERE organization_id = $1 AND journal_id = $2{}
        "#,
        lock.clause()
    );
    sqlx::query_as::<_, Journal>(&sql)
        .bind(organization_id)
        .bind(journal_id)
        .fetch_optional(conn)
        .await
        .map_err(db_err("Failed to get journal"))
}
