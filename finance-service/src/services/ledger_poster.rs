//! LedgerPoster: draft journal entries, posting, cancellation and reversal.
//!
//! Posting is the only path that makes lines count towards balances. Every
//! mutation runs in one transaction that locks the entry row first and the
//! covering fiscal-year row second.

use crate::error::{db_err, LedgerError, LedgerResult};
use crate::models::currency::parse_currency;
use crate::models::{
    account_movements, check_balanced, check_non_negative, reversal_lines, validate_line_account,
    validate_line_amounts, EntryLineInput, EntryStatus, EntryTotals, Journal, JournalEntry,
    JournalEntryLine, ListEntriesFilter, NewEntry,
};
use crate::services::chart_of_accounts::fetch_accounts;
use crate::services::database::{advisory_lock, next_sequence, page_limit, Database, RowLock};
use crate::services::fiscal_calendar::{fetch_covering_year, require_open_date};
use crate::services::journal_registry::fetch_journal;
use crate::services::metrics::{DB_QUERY_DURATION, ENTRIES_TOTAL};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::{info, instrument};
use uuid::Uuid;

const ENTRY_COLUMNS: &str = "entry_id, organization_id, journal_id, reference, entry_date, \
     description, currency, status, total_debit, total_credit, created_by, created_utc, \
     posted_by, posted_utc, cancelled_by, cancelled_utc, reversal_of, reversed_by, idempotency_key";

const LINE_COLUMNS: &str = "line_id, entry_id, organization_id, account_id, label, debit, credit, \
     position, reconciled, reconciled_utc";

impl Database {
    // -------------------------------------------------------------------------
    // Drafts
    // -------------------------------------------------------------------------

    #[instrument(skip(self, entry), fields(organization_id = %entry.organization_id, journal_id = %entry.journal_id))]
    pub async fn create_draft_entry(&self, entry: &NewEntry, actor_id: Uuid) -> LedgerResult<JournalEntry> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_draft_entry"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;
        let draft = create_draft(&mut tx, entry, actor_id).await?;
        tx.commit().await.map_err(db_err("Failed to commit transaction"))?;

        timer.observe_duration();
        info!(entry_id = %draft.entry_id, reference = %draft.reference, "Draft entry created");

        Ok(draft)
    }

    #[instrument(skip(self, line), fields(organization_id = %organization_id, entry_id = %entry_id))]
    pub async fn add_draft_line(
        &self,
        organization_id: Uuid,
        entry_id: Uuid,
        line: &EntryLineInput,
    ) -> LedgerResult<JournalEntry> {
        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;

        let entry = fetch_draft(&mut tx, organization_id, entry_id).await?;

        let position: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM journal_entry_lines WHERE entry_id = $1",
        )
        .bind(entry_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("Failed to compute line position"))?;

        validate_line_amounts(position as usize, line, &entry.currency)?;
        let accounts = fetch_accounts(&mut tx, organization_id, &[line.account_id], RowLock::None).await?;
        validate_line_account(
            position as usize,
            accounts.get(&line.account_id),
            line.account_id,
            &entry.currency,
        )?;

        insert_line(&mut tx, &entry, line, position).await?;
        let mut entry = refresh_totals(&mut tx, entry_id).await?;
        entry.lines = fetch_lines(&mut tx, entry_id).await?;

        tx.commit().await.map_err(db_err("Failed to commit transaction"))?;
        info!(position = position, "Draft line added");

        Ok(entry)
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, entry_id = %entry_id, line_id = %line_id))]
    pub async fn remove_draft_line(
        &self,
        organization_id: Uuid,
        entry_id: Uuid,
        line_id: Uuid,
    ) -> LedgerResult<JournalEntry> {
        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;

        fetch_draft(&mut tx, organization_id, entry_id).await?;

        let removed = sqlx::query(
            "DELETE FROM journal_entry_lines WHERE organization_id = $1 AND entry_id = $2 AND line_id = $3",
        )
        .bind(organization_id)
        .bind(entry_id)
        .bind(line_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("Failed to remove line"))?;

        if removed.rows_affected() == 0 {
            return Err(LedgerError::not_found("journal_entry_line", line_id));
        }

        let mut entry = refresh_totals(&mut tx, entry_id).await?;
        entry.lines = fetch_lines(&mut tx, entry_id).await?;

        tx.commit().await.map_err(db_err("Failed to commit transaction"))?;
        info!("Draft line removed");

        Ok(entry)
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, entry_id = %entry_id))]
    pub async fn cancel_draft(
        &self,
        organization_id: Uuid,
        entry_id: Uuid,
        actor_id: Uuid,
    ) -> LedgerResult<JournalEntry> {
        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;

        fetch_draft(&mut tx, organization_id, entry_id).await?;

        let mut entry = sqlx::query_as::<_, JournalEntry>(&format!(
            r#"
            UPDATE journal_entries
            SET status = 'cancelled', cancelled_by = $2, cancelled_utc = NOW()
            WHERE entry_id = $1
            RETURNING {}
            "#,
            ENTRY_COLUMNS
        ))
        .bind(entry_id)
        .bind(actor_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("Failed to cancel entry"))?;
        entry.lines = fetch_lines(&mut tx, entry_id).await?;

        tx.commit().await.map_err(db_err("Failed to commit transaction"))?;

        ENTRIES_TOTAL.with_label_values(&["cancelled"]).inc();
        info!(reference = %entry.reference, "Draft entry cancelled");

        Ok(entry)
    }

    // -------------------------------------------------------------------------
    // Posting
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(organization_id = %organization_id, entry_id = %entry_id))]
    pub async fn post_entry(
        &self,
        organization_id: Uuid,
        entry_id: Uuid,
        actor_id: Uuid,
    ) -> LedgerResult<JournalEntry> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["post_entry"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;
        let entry = post_draft(&mut tx, organization_id, entry_id, actor_id).await?;
        tx.commit().await.map_err(db_err("Failed to commit transaction"))?;

        timer.observe_duration();
        ENTRIES_TOTAL.with_label_values(&["posted"]).inc();
        info!(
            reference = %entry.reference,
            total = %entry.total_debit,
            "Entry posted"
        );

        Ok(entry)
    }

    /// Create and post an entry in one transaction.
    ///
    /// With an idempotency key, a repeated call returns the entry created by
    /// the first one instead of posting again. Callers with the same key are
    /// serialized on an advisory lock.
    #[instrument(skip(self, entry), fields(organization_id = %entry.organization_id, journal_id = %entry.journal_id))]
    pub async fn post_journal_entry(&self, entry: &NewEntry, actor_id: Uuid) -> LedgerResult<JournalEntry> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["post_journal_entry"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;

        if let Some(key) = entry.idempotency_key.as_deref() {
            advisory_lock(&mut tx, entry.organization_id, &format!("idempotency:{}", key)).await?;

            let existing = sqlx::query_scalar::<_, Uuid>(
                "SELECT entry_id FROM journal_entries WHERE organization_id = $1 AND idempotency_key = $2",
            )
            .bind(entry.organization_id)
            .bind(key)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err("Failed to check idempotency"))?;

            if let Some(entry_id) = existing {
                tx.rollback().await.ok();
                timer.observe_duration();
                info!(entry_id = %entry_id, "Idempotent replay, returning existing entry");
                return self.get_entry(entry.organization_id, entry_id).await;
            }
        }

        let draft = create_draft(&mut tx, entry, actor_id).await?;
        let posted = post_draft(&mut tx, entry.organization_id, draft.entry_id, actor_id).await?;

        tx.commit().await.map_err(db_err("Failed to commit transaction"))?;

        timer.observe_duration();
        ENTRIES_TOTAL.with_label_values(&["posted"]).inc();
        info!(
            entry_id = %posted.entry_id,
            reference = %posted.reference,
            total = %posted.total_debit,
            "Entry posted"
        );

        Ok(posted)
    }

    /// Undo a posted entry with a compensating one.
    ///
    /// The reversal is posted in the original's journal on `reversal_date`;
    /// the original becomes cancelled and points at it through
    /// `reversed_by`. Both entries keep counting towards balances, so they
    /// net out. Returns `(original, reversal)`.
    #[instrument(skip(self, description), fields(organization_id = %organization_id, entry_id = %entry_id, reversal_date = %reversal_date))]
    pub async fn reverse_entry(
        &self,
        organization_id: Uuid,
        entry_id: Uuid,
        reversal_date: NaiveDate,
        description: Option<&str>,
        actor_id: Uuid,
    ) -> LedgerResult<(JournalEntry, JournalEntry)> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["reverse_entry"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;

        let original = fetch_entry(&mut tx, organization_id, entry_id, RowLock::Update)
            .await?
            .ok_or_else(|| LedgerError::not_found("journal_entry", entry_id))?;
        if original.status != EntryStatus::Posted {
            return Err(LedgerError::NotPosted(entry_id));
        }

        // The original is altered too, so its own period must still be open.
        require_open_date(&mut tx, organization_id, original.entry_date).await?;
        require_open_date(&mut tx, organization_id, reversal_date).await?;

        let journal = fetch_journal(&mut tx, organization_id, original.journal_id, RowLock::Share)
            .await?
            .ok_or_else(|| LedgerError::not_found("journal", original.journal_id))?;

        let lines = fetch_lines(&mut tx, entry_id).await?;
        let reversal = NewEntry {
            organization_id,
            journal_id: journal.journal_id,
            entry_date: reversal_date,
            description: description
                .filter(|d| !d.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("Reversal of {}", original.reference)),
            currency: original.currency.clone(),
            lines: reversal_lines(&lines),
            idempotency_key: None,
        };

        let draft = insert_entry(&mut tx, &journal, &reversal, actor_id, Some(entry_id)).await?;
        let reversal = post_draft(&mut tx, organization_id, draft.entry_id, actor_id).await?;

        let mut original = sqlx::query_as::<_, JournalEntry>(&format!(
            r#"
            UPDATE journal_entries
            SET status = 'cancelled', reversed_by = $2, cancelled_by = $3, cancelled_utc = NOW()
            WHERE entry_id = $1
            RETURNING {}
            "#,
            ENTRY_COLUMNS
        ))
        .bind(entry_id)
        .bind(reversal.entry_id)
        .bind(actor_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("Failed to mark entry reversed"))?;
        original.lines = lines;

        tx.commit().await.map_err(db_err("Failed to commit transaction"))?;

        timer.observe_duration();
        ENTRIES_TOTAL.with_label_values(&["reversed"]).inc();
        info!(
            reference = %original.reference,
            reversal_reference = %reversal.reference,
            "Entry reversed"
        );

        Ok((original, reversal))
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(organization_id = %organization_id, entry_id = %entry_id))]
    pub async fn get_entry(&self, organization_id: Uuid, entry_id: Uuid) -> LedgerResult<JournalEntry> {
        let mut conn = self.pool.acquire().await.map_err(db_err("Failed to acquire connection"))?;
        let mut entry = fetch_entry(&mut conn, organization_id, entry_id, RowLock::None)
            .await?
            .ok_or_else(|| LedgerError::not_found("journal_entry", entry_id))?;
        entry.lines = fetch_lines(&mut conn, entry_id).await?;
        Ok(entry)
    }

    /// Entries ordered by date then id. `page_token` is the id of the last
    /// entry of the previous page. Lines are not loaded.
    #[instrument(skip(self, filter), fields(organization_id = %organization_id))]
    pub async fn list_entries(
        &self,
        organization_id: Uuid,
        filter: &ListEntriesFilter,
    ) -> LedgerResult<Vec<JournalEntry>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_entries"])
            .start_timer();

        let sql = format!(
            r#"
            SELECT {} FROM journal_entries
            WHERE organization_id = $1
              AND ($2::uuid IS NULL OR journal_id = $2)
              AND ($3::varchar IS NULL OR status = $3)
              AND ($4::date IS NULL OR entry_date >= $4)
              AND ($5::date IS NULL OR entry_date <= $5)
              AND ($6::uuid IS NULL OR (entry_date, entry_id) > (
                  SELECT entry_date, entry_id FROM journal_entries
                  WHERE organization_id = $1 AND entry_id = $6))
            ORDER BY entry_date, entry_id
            LIMIT $7
            "#,
            ENTRY_COLUMNS
        );
        let entries = sqlx::query_as::<_, JournalEntry>(&sql)
            .bind(organization_id)
            .bind(filter.journal_id)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.start_date)
            .bind(filter.end_date)
            .bind(filter.page_token)
            .bind(page_limit(filter.page_size))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("Failed to list entries"))?;

        timer.observe_duration();
        Ok(entries)
    }

    /// Set or clear the reconciled flag of a posted line. Amounts never change.
    #[instrument(skip(self), fields(organization_id = %organization_id, line_id = %line_id))]
    pub async fn reconcile_line(
        &self,
        organization_id: Uuid,
        line_id: Uuid,
        reconciled: bool,
    ) -> LedgerResult<JournalEntryLine> {
        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;

        let entry_id: Uuid = sqlx::query_scalar(
            "SELECT entry_id FROM journal_entry_lines WHERE organization_id = $1 AND line_id = $2",
        )
        .bind(organization_id)
        .bind(line_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err("Failed to get line"))?
        .ok_or_else(|| LedgerError::not_found("journal_entry_line", line_id))?;

        let entry = fetch_entry(&mut tx, organization_id, entry_id, RowLock::Share)
            .await?
            .ok_or_else(|| LedgerError::not_found("journal_entry", entry_id))?;
        if !entry.was_posted() {
            return Err(LedgerError::NotPosted(entry_id));
        }

        let line = sqlx::query_as::<_, JournalEntryLine>(&format!(
            r#"
            UPDATE journal_entry_lines
            SET reconciled = $2,
                reconciled_utc = CASE WHEN $2 THEN NOW() ELSE NULL END
            WHERE line_id = $1
            RETURNING {}
            "#,
            LINE_COLUMNS
        ))
        .bind(line_id)
        .bind(reconciled)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("Failed to reconcile line"))?;

        tx.commit().await.map_err(db_err("Failed to commit transaction"))?;
        info!(reconciled = reconciled, "Line reconciliation updated");

        Ok(line)
    }
}

// -----------------------------------------------------------------------------
// Transaction helpers
// -----------------------------------------------------------------------------

/// Validate a new entry and insert it as a draft.
///
/// The journal must be active and the date must not fall in a closed year;
/// a date outside every fiscal year is accepted and checked again at posting.
async fn create_draft(
    conn: &mut PgConnection,
    entry: &NewEntry,
    actor_id: Uuid,
) -> LedgerResult<JournalEntry> {
    let currency = parse_currency(&entry.currency)?;
    for (i, line) in entry.lines.iter().enumerate() {
        validate_line_amounts(i + 1, line, &currency)?;
    }

    let journal = fetch_journal(conn, entry.organization_id, entry.journal_id, RowLock::Share)
        .await?
        .ok_or_else(|| LedgerError::not_found("journal", entry.journal_id))?;
    if !journal.active {
        return Err(LedgerError::InactiveJournal(journal.journal_id));
    }

    if let Some(year) =
        fetch_covering_year(conn, entry.organization_id, entry.entry_date, RowLock::Share).await?
    {
        if !year.is_open() {
            return Err(LedgerError::PeriodClosed(entry.entry_date));
        }
    }

    let ids: Vec<Uuid> = entry.lines.iter().map(|l| l.account_id).collect();
    let accounts = fetch_accounts(conn, entry.organization_id, &ids, RowLock::None).await?;
    for (i, line) in entry.lines.iter().enumerate() {
        validate_line_account(i + 1, accounts.get(&line.account_id), line.account_id, &currency)?;
    }

    let normalized = NewEntry {
        currency,
        ..entry.clone()
    };
    insert_entry(conn, &journal, &normalized, actor_id, None).await
}

/// Insert a draft header and its lines. The reference is the journal's next
/// sequence number.
async fn insert_entry(
    conn: &mut PgConnection,
    journal: &Journal,
    entry: &NewEntry,
    created_by: Uuid,
    reversal_of: Option<Uuid>,
) -> LedgerResult<JournalEntry> {
    let number = next_sequence(conn, entry.organization_id, &journal.sequence_name()).await?;
    let totals = EntryTotals::of(&entry.lines);

    let mut draft = sqlx::query_as::<_, JournalEntry>(&format!(
        r#"
        INSERT INTO journal_entries (
            entry_id, organization_id, journal_id, reference, entry_date, description,
            currency, total_debit, total_credit, created_by, reversal_of, idempotency_key
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING {}
        "#,
        ENTRY_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(entry.organization_id)
    .bind(journal.journal_id)
    .bind(journal.entry_reference(number))
    .bind(entry.entry_date)
    .bind(&entry.description)
    .bind(&entry.currency)
    .bind(totals.debit)
    .bind(totals.credit)
    .bind(created_by)
    .bind(reversal_of)
    .bind(entry.idempotency_key.as_deref())
    .fetch_one(&mut *conn)
    .await
    .map_err(db_err("Failed to create entry"))?;

    let mut lines = Vec::with_capacity(entry.lines.len());
    for (i, line) in entry.lines.iter().enumerate() {
        lines.push(insert_line(conn, &draft, line, i as i32 + 1).await?);
    }
    draft.lines = lines;

    Ok(draft)
}

async fn insert_line(
    conn: &mut PgConnection,
    entry: &JournalEntry,
    line: &EntryLineInput,
    position: i32,
) -> LedgerResult<JournalEntryLine> {
    sqlx::query_as::<_, JournalEntryLine>(&format!(
        r#"
        INSERT INTO journal_entry_lines (line_id, entry_id, organization_id, account_id, label, debit, credit, position)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {}
        "#,
        LINE_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(entry.entry_id)
    .bind(entry.organization_id)
    .bind(line.account_id)
    .bind(&line.label)
    .bind(line.debit)
    .bind(line.credit)
    .bind(position)
    .fetch_one(conn)
    .await
    .map_err(db_err("Failed to insert line"))
}

/// Transition a draft to posted.
///
/// Checks, in order: draft status, balance, line accounts, open period, and
/// the non-negative guard. Accounts under the guard are locked in id order.
async fn post_draft(
    conn: &mut PgConnection,
    organization_id: Uuid,
    entry_id: Uuid,
    actor_id: Uuid,
) -> LedgerResult<JournalEntry> {
    let entry = fetch_entry(conn, organization_id, entry_id, RowLock::Update)
        .await?
        .ok_or_else(|| LedgerError::not_found("journal_entry", entry_id))?;
    if entry.status != EntryStatus::Draft {
        return Err(LedgerError::NotDraft(entry.reference));
    }

    let lines = fetch_lines(conn, entry_id).await?;
    let totals = check_balanced(&lines, &entry.currency)?;

    let movements = account_movements(&lines);
    let ids: Vec<Uuid> = movements.keys().copied().collect();
    let accounts = fetch_accounts(conn, organization_id, &ids, RowLock::None).await?;

    // Reversals mirror an already posted entry and may touch accounts
    // deactivated since.
    if entry.reversal_of.is_none() {
        for line in &lines {
            validate_line_account(
                line.position as usize,
                accounts.get(&line.account_id),
                line.account_id,
                &entry.currency,
            )?;
        }
    }

    require_open_date(conn, organization_id, entry.entry_date).await?;

    let guarded: Vec<Uuid> = accounts
        .values()
        .filter(|a| a.enforce_non_negative)
        .map(|a| a.account_id)
        .collect();
    if !guarded.is_empty() {
        let locked = fetch_accounts(conn, organization_id, &guarded, RowLock::Update).await?;
        let posted = posted_totals(conn, organization_id, &guarded).await?;
        for (account_id, account) in &locked {
            let current = posted.get(account_id).copied().unwrap_or_default();
            let movement = movements.get(account_id).copied().unwrap_or_default();
            check_non_negative(account, current, movement)?;
        }
    }

    let mut posted = sqlx::query_as::<_, JournalEntry>(&format!(
        r#"
        UPDATE journal_entries
        SET status = 'posted', total_debit = $2, total_credit = $3,
            posted_by = $4, posted_utc = NOW()
        WHERE entry_id = $1
        RETURNING {}
        "#,
        ENTRY_COLUMNS
    ))
    .bind(entry_id)
    .bind(totals.debit)
    .bind(totals.credit)
    .bind(actor_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_err("Failed to post entry"))?;
    posted.lines = lines;

    Ok(posted)
}

/// Debit and credit posted so far per account.
async fn posted_totals(
    conn: &mut PgConnection,
    organization_id: Uuid,
    account_ids: &[Uuid],
) -> LedgerResult<HashMap<Uuid, EntryTotals>> {
    let rows = sqlx::query_as::<_, (Uuid, Decimal, Decimal)>(
        r#"
        SELECT l.account_id, COALESCE(SUM(l.debit), 0), COALESCE(SUM(l.credit), 0)
        FROM journal_entry_lines l
        JOIN journal_entries e ON e.entry_id = l.entry_id
        WHERE l.organization_id = $1
          AND l.account_id = ANY($2)
          AND e.posted_utc IS NOT NULL
        GROUP BY l.account_id
        "#,
    )
    .bind(organization_id)
    .bind(account_ids)
    .fetch_all(conn)
    .await
    .map_err(db_err("Failed to sum posted lines"))?;

    Ok(rows
        .into_iter()
        .map(|(id, debit, credit)| (id, EntryTotals { debit, credit }))
        .collect())
}

/// Lock an entry that must still be a draft.
async fn fetch_draft(
    conn: &mut PgConnection,
    organization_id: Uuid,
    entry_id: Uuid,
) -> LedgerResult<JournalEntry> {
    let entry = fetch_entry(conn, organization_id, entry_id, RowLock::Update)
        .await?
        .ok_or_else(|| LedgerError::not_found("journal_entry", entry_id))?;
    if entry.status != EntryStatus::Draft {
        return Err(LedgerError::NotDraft(entry.reference));
    }
    Ok(entry)
}

async fn refresh_totals(conn: &mut PgConnection, entry_id: Uuid) -> LedgerResult<JournalEntry> {
    sqlx::query_as::<_, JournalEntry>(&format!(
        r#"
        UPDATE journal_entries e
        SET total_debit = t.debit, total_credit = t.credit
        FROM (
            SELECT COALESCE(SUM(debit), 0) AS debit, COALESCE(SUM(credit), 0) AS credit
            FROM journal_entry_lines WHERE entry_id = $1
        ) t
        WHERE e.entry_id = $1
        RETURNING {}
        "#,
        ENTRY_COLUMNS
    ))
    .bind(entry_id)
    .fetch_one(conn)
    .await
    .map_err(db_err("Failed to update entry totals"))
}

pub(crate) async fn fetch_entry(
    conn: &mut PgConnection,
    organization_id: Uuid,
    entry_id: Uuid,
    lock: RowLock,
) -> LedgerResult<Option<JournalEntry>> {
    sqlx::query_as::<_, JournalEntry>(&format!(
        "SELECT {} FROM journal_entries WHERE organization_id = $1 AND entry_id = $2{}",
        ENTRY_COLUMNS,
        lock.clause()
    ))
    .bind(organization_id)
    .bind(entry_id)
    .fetch_optional(conn)
    .await
    .map_err(db_err("Failed to get entry"))
}

async fn fetch_lines(conn: &mut PgConnection, entry_id: Uuid) -> LedgerResult<Vec<JournalEntryLine>> {
    sqlx::query_as::<_, JournalEntryLine>(&format!(
        "SELECT {} FROM journal_entry_lines WHERE entry_id = $1 ORDER BY position",
        LINE_COLUMNS
    ))
    .bind(entry_id)
    .fetch_all(conn)
    .await
    .map_err(db_err("Failed to get lines"))
}
