//! LedgerReporter: read-only aggregation over posted lines.
//!
//! A line counts once its entry has been posted (`posted_utc` set), whether
//! or not the entry was later reversed; the reversal carries the opposite
//! amounts. Each report reads one repeatable-read snapshot.

use crate::error::{db_err, LedgerError, LedgerResult};
use crate::models::currency::parse_currency;
use crate::models::{
    AccountActivity, AccountStatement, BalanceSheet, IncomeStatement, PostedLine, TrialBalance,
};
use crate::services::chart_of_accounts::fetch_account;
use crate::services::database::Database;
use crate::services::metrics::{DB_QUERY_DURATION, INTEGRITY_VIOLATIONS_TOTAL};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{PgConnection, Postgres, Transaction};
use tracing::{error, instrument};
use uuid::Uuid;

impl Database {
    #[instrument(skip(self), fields(organization_id = %organization_id, start = %start_date, end = %end_date))]
    pub async fn trial_balance(
        &self,
        organization_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
        currency: &str,
    ) -> LedgerResult<TrialBalance> {
        check_range(start_date, end_date)?;
        let currency = parse_currency(currency)?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["trial_balance"])
            .start_timer();

        let mut tx = self.snapshot().await?;
        let activity =
            fetch_activity(&mut tx, organization_id, Some(start_date), end_date, &currency).await?;
        tx.commit().await.map_err(db_err("Failed to end snapshot"))?;

        timer.observe_duration();

        let report = TrialBalance::build(start_date, end_date, currency, &activity);
        if !report.is_balanced() {
            INTEGRITY_VIOLATIONS_TOTAL
                .with_label_values(&["trial_balance"])
                .inc();
            error!(
                total_debit = %report.total_debit,
                total_credit = %report.total_credit,
                "Trial balance does not balance"
            );
        }
        Ok(report)
    }

    /// Cumulative balances through `as_of_date`, with unclosed profit and
    /// loss shown as current earnings inside equity.
    #[instrument(skip(self), fields(organization_id = %organization_id, as_of = %as_of_date))]
    pub async fn balance_sheet(
        &self,
        organization_id: Uuid,
        as_of_date: NaiveDate,
        currency: &str,
    ) -> LedgerResult<BalanceSheet> {
        let currency = parse_currency(currency)?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["balance_sheet"])
            .start_timer();

        let mut tx = self.snapshot().await?;
        let activity = fetch_activity(&mut tx, organization_id, None, as_of_date, &currency).await?;
        tx.commit().await.map_err(db_err("Failed to end snapshot"))?;

        timer.observe_duration();

        BalanceSheet::build(as_of_date, currency, &activity).inspect_err(|e| {
            if matches!(e, LedgerError::IntegrityViolation(_)) {
                INTEGRITY_VIOLATIONS_TOTAL
                    .with_label_values(&["balance_sheet"])
                    .inc();
            }
        })
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, start = %start_date, end = %end_date))]
    pub async fn income_statement(
        &self,
        organization_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
        currency: &str,
    ) -> LedgerResult<IncomeStatement> {
        check_range(start_date, end_date)?;
        let currency = parse_currency(currency)?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["income_statement"])
            .start_timer();

        let mut tx = self.snapshot().await?;
        let activity =
            fetch_activity(&mut tx, organization_id, Some(start_date), end_date, &currency).await?;
        tx.commit().await.map_err(db_err("Failed to end snapshot"))?;

        timer.observe_duration();
        Ok(IncomeStatement::build(start_date, end_date, currency, &activity))
    }

    /// Posted lines of one account inside the range, with a running balance
    /// under the account's normal-sign convention.
    #[instrument(skip(self), fields(organization_id = %organization_id, account_id = %account_id))]
    pub async fn account_statement(
        &self,
        organization_id: Uuid,
        account_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> LedgerResult<AccountStatement> {
        check_range(start_date, end_date)?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["account_statement"])
            .start_timer();

        let mut tx = self.snapshot().await?;

        let account = fetch_account(&mut tx, organization_id, account_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("account", account_id))?;

        let (opening_debit, opening_credit) = sqlx::query_as::<_, (Decimal, Decimal)>(
            r#"
            SELECT COALESCE(SUM(l.debit), 0), COALESCE(SUM(l.credit), 0)
            FROM journal_entry_lines l
            JOIN journal_entries e ON e.entry_id = l.entry_id
            WHERE l.organization_id = $1
              AND l.account_id = $2
              AND e.posted_utc IS NOT NULL
              AND e.entry_date < $3
            "#,
        )
        .bind(organization_id)
        .bind(account_id)
        .bind(start_date)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("Failed to compute opening balance"))?;

        let lines = sqlx::query_as::<_, PostedLine>(
            r#"
            SELECT e.entry_id, e.reference, e.entry_date, l.label, l.debit, l.credit
            FROM journal_entry_lines l
            JOIN journal_entries e ON e.entry_id = l.entry_id
            WHERE l.organization_id = $1
              AND l.account_id = $2
              AND e.posted_utc IS NOT NULL
              AND e.entry_date BETWEEN $3 AND $4
            ORDER BY e.entry_date, e.posted_utc, l.position
            "#,
        )
        .bind(organization_id)
        .bind(account_id)
        .bind(start_date)
        .bind(end_date)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err("Failed to read account lines"))?;

        tx.commit().await.map_err(db_err("Failed to end snapshot"))?;
        timer.observe_duration();

        Ok(AccountStatement::build(&account, opening_debit, opening_credit, lines))
    }

    /// Read-only transaction over one consistent snapshot.
    async fn snapshot(&self) -> LedgerResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(db_err("Failed to set snapshot isolation"))?;
        Ok(tx)
    }
}

fn check_range(start_date: NaiveDate, end_date: NaiveDate) -> LedgerResult<()> {
    if start_date > end_date {
        return Err(LedgerError::Validation(format!(
            "start date {} is after end date {}",
            start_date, end_date
        )));
    }
    Ok(())
}

/// Per-account sums of posted lines dated on or before `end_date`, split at
/// `start_date` into opening and period. Without a start everything is period.
async fn fetch_activity(
    conn: &mut PgConnection,
    organization_id: Uuid,
    start_date: Option<NaiveDate>,
    end_date: NaiveDate,
    currency: &str,
) -> LedgerResult<Vec<AccountActivity>> {
    sqlx::query_as::<_, AccountActivity>(
        r#"
        SELECT a.account_id, a.code, a.name, a.account_type,
               COALESCE(SUM(p.debit) FILTER (WHERE p.entry_date < $2), 0) AS opening_debit,
               COALESCE(SUM(p.credit) FILTER (WHERE p.entry_date < $2), 0) AS opening_credit,
               COALESCE(SUM(p.debit) FILTER (WHERE $2::date IS NULL OR p.entry_date >= $2), 0) AS period_debit,
               COALESCE(SUM(p.credit) FILTER (WHERE $2::date IS NULL OR p.entry_date >= $2), 0) AS period_credit
        FROM accounts a
        LEFT JOIN (
            SELECT l.account_id, l.debit, l.credit, e.entry_date
            FROM journal_entry_lines l
            JOIN journal_entries e ON e.entry_id = l.entry_id
            WHERE l.organization_id = $1
              AND e.posted_utc IS NOT NULL
              AND e.entry_date <= $3
        ) p ON p.account_id = a.account_id
        WHERE a.organization_id = $1 AND a.currency = $4
        GROUP BY a.account_id, a.code, a.name, a.account_type
        ORDER BY a.code
        "#,
    )
    .bind(organization_id)
    .bind(start_date)
    .bind(end_date)
    .bind(currency)
    .fetch_all(conn)
    .await
    .map_err(db_err("Failed to aggregate account activity"))
}
