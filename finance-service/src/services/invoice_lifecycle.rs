//! InvoiceLifecycle: invoice creation, pricing and status transitions.
//!
//! The stored status is a cache of `amount_paid` against `total`, written in
//! the same transaction as the amounts. `overdue` is never stored.

use crate::error::{db_err, LedgerError, LedgerResult};
use crate::models::currency::parse_currency;
use crate::models::{
    invoice_number, price_line, validate_dates, validate_rate, Invoice, InvoiceLine,
    InvoiceLineInput, InvoiceStatus, InvoiceTotals, ListInvoicesFilter, NewInvoice, PricedLine,
};
use crate::services::chart_of_accounts::fetch_account;
use crate::services::database::{next_sequence, page_limit, Database, RowLock};
use crate::services::ledger_poster::fetch_entry;
use crate::services::metrics::{DB_QUERY_DURATION, INVOICES_TOTAL};
use crate::services::tax_rates::fetch_tax_rate;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

pub(crate) const INVOICE_COLUMNS: &str = "invoice_id, organization_id, number, customer_id, \
     customer_name, customer_email, customer_address, invoice_date, due_date, status, subtotal, \
     tax_amount, total, amount_paid, amount_due, currency, journal_entry_id, created_by, \
     created_utc, sent_utc, cancelled_utc";

const INVOICE_LINE_COLUMNS: &str = "line_id, invoice_id, organization_id, description, quantity, \
     unit_price, tax_rate_id, tax_rate, tax_amount, subtotal, total, account_id, position";

/// Sequence shared by every invoice number of an organization.
const INVOICE_SEQUENCE: &str = "invoice";

/// A line after tax resolution and pricing, ready to insert.
struct ResolvedLine<'a> {
    input: &'a InvoiceLineInput,
    tax_rate: Decimal,
    priced: PricedLine,
}

impl Database {
    #[instrument(skip(self, input), fields(organization_id = %input.organization_id))]
    pub async fn create_invoice(&self, input: &NewInvoice, actor_id: Uuid) -> LedgerResult<Invoice> {
        if input.lines.is_empty() {
            return Err(LedgerError::EmptyInvoice);
        }
        if input.customer.name.trim().is_empty() {
            return Err(LedgerError::Validation("customer name is required".to_string()));
        }
        let currency = parse_currency(&input.currency)?;
        validate_dates(input.invoice_date, input.due_date)?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;

        let mut resolved = Vec::with_capacity(input.lines.len());
        for (i, line) in input.lines.iter().enumerate() {
            resolved.push(resolve_line(&mut tx, input.organization_id, i + 1, line, &currency).await?);
        }

        let priced: Vec<PricedLine> = resolved.iter().map(|l| l.priced).collect();
        let totals = InvoiceTotals::sum(&priced);
        totals.check_payable()?;

        let mut invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            INSERT INTO invoices (
                invoice_id, organization_id, customer_id, customer_name, customer_email,
                customer_address, invoice_date, due_date, status, subtotal, tax_amount, total,
                amount_paid, amount_due, currency, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'draft', $9, $10, $11, 0, $11, $12, $13)
            RETURNING {}
            "#,
            INVOICE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(input.organization_id)
        .bind(input.customer.customer_id)
        .bind(input.customer.name.trim())
        .bind(input.customer.email.as_deref())
        .bind(input.customer.address.as_deref())
        .bind(input.invoice_date)
        .bind(input.due_date)
        .bind(totals.subtotal)
        .bind(totals.tax_amount)
        .bind(totals.total)
        .bind(&currency)
        .bind(actor_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("Failed to create invoice"))?;

        let mut lines = Vec::with_capacity(resolved.len());
        for (i, line) in resolved.iter().enumerate() {
            lines.push(insert_line(&mut tx, &invoice, line, i as i32 + 1).await?);
        }
        invoice.lines = lines;

        tx.commit().await.map_err(db_err("Failed to commit transaction"))?;
        timer.observe_duration();

        INVOICES_TOTAL.with_label_values(&["created"]).inc();
        info!(
            invoice_id = %invoice.invoice_id,
            total = %invoice.total,
            currency = %invoice.currency,
            "Invoice created"
        );

        Ok(invoice)
    }

    /// Assign the next invoice number and move a draft to sent. Nothing is
    /// posted to the ledger.
    #[instrument(skip(self), fields(organization_id = %organization_id, invoice_id = %invoice_id))]
    pub async fn send_invoice(&self, organization_id: Uuid, invoice_id: Uuid) -> LedgerResult<Invoice> {
        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;

        let invoice = fetch_invoice(&mut tx, organization_id, invoice_id, RowLock::Update)
            .await?
            .ok_or_else(|| LedgerError::not_found("invoice", invoice_id))?;
        if invoice.status != InvoiceStatus::Draft {
            return Err(LedgerError::NotDraft(invoice_id.to_string()));
        }

        let number = invoice_number(next_sequence(&mut tx, organization_id, INVOICE_SEQUENCE).await?);

        let mut sent = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            UPDATE invoices SET status = 'sent', number = $2, sent_utc = NOW()
            WHERE invoice_id = $1
            RETURNING {}
            "#,
            INVOICE_COLUMNS
        ))
        .bind(invoice_id)
        .bind(&number)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("Failed to send invoice"))?;
        sent.lines = fetch_lines(&mut tx, invoice_id).await?;

        tx.commit().await.map_err(db_err("Failed to commit transaction"))?;

        INVOICES_TOTAL.with_label_values(&["sent"]).inc();
        info!(number = %number, "Invoice sent");

        Ok(with_effective_status(sent, today()))
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, invoice_id = %invoice_id))]
    pub async fn cancel_invoice(&self, organization_id: Uuid, invoice_id: Uuid) -> LedgerResult<Invoice> {
        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;

        let invoice = fetch_invoice(&mut tx, organization_id, invoice_id, RowLock::Update)
            .await?
            .ok_or_else(|| LedgerError::not_found("invoice", invoice_id))?;
        invoice.check_cancellable()?;

        let mut cancelled = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            UPDATE invoices SET status = 'cancelled', cancelled_utc = NOW()
            WHERE invoice_id = $1
            RETURNING {}
            "#,
            INVOICE_COLUMNS
        ))
        .bind(invoice_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("Failed to cancel invoice"))?;
        cancelled.lines = fetch_lines(&mut tx, invoice_id).await?;

        tx.commit().await.map_err(db_err("Failed to commit transaction"))?;

        INVOICES_TOTAL.with_label_values(&["cancelled"]).inc();
        info!(previous_status = %invoice.status, "Invoice cancelled");

        Ok(cancelled)
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, invoice_id = %invoice_id))]
    pub async fn get_invoice(&self, organization_id: Uuid, invoice_id: Uuid) -> LedgerResult<Invoice> {
        let mut conn = self.pool.acquire().await.map_err(db_err("Failed to acquire connection"))?;
        let mut invoice = fetch_invoice(&mut conn, organization_id, invoice_id, RowLock::None)
            .await?
            .ok_or_else(|| LedgerError::not_found("invoice", invoice_id))?;
        invoice.lines = fetch_lines(&mut conn, invoice_id).await?;
        Ok(with_effective_status(invoice, today()))
    }

    /// Invoices ordered by date then id, without lines. Filtering on a
    /// status matches the effective status, so `Overdue` selects sent and
    /// partial invoices past their due date and `Sent` excludes them.
    #[instrument(skip(self, filter), fields(organization_id = %organization_id))]
    pub async fn list_invoices(
        &self,
        organization_id: Uuid,
        filter: &ListInvoicesFilter,
    ) -> LedgerResult<Vec<Invoice>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let today = today();
        let sql = format!(
            r#"
            SELECT {} FROM invoices
            WHERE organization_id = $1
              AND ($2::varchar IS NULL
                   OR ($2 = 'overdue' AND status IN ('sent', 'partial') AND due_date < $3)
                   OR ($2 IN ('sent', 'partial') AND status = $2 AND due_date >= $3)
                   OR ($2 NOT IN ('overdue', 'sent', 'partial') AND status = $2))
              AND ($4::uuid IS NULL OR customer_id = $4)
              AND ($5::date IS NULL OR invoice_date >= $5)
              AND ($6::date IS NULL OR invoice_date <= $6)
              AND ($7::uuid IS NULL OR (invoice_date, invoice_id) > (
                  SELECT invoice_date, invoice_id FROM invoices
                  WHERE organization_id = $1 AND invoice_id = $7))
            ORDER BY invoice_date, invoice_id
            LIMIT $8
            "#,
            INVOICE_COLUMNS
        );
        let invoices = sqlx::query_as::<_, Invoice>(&sql)
            .bind(organization_id)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(today)
            .bind(filter.customer_id)
            .bind(filter.start_date)
            .bind(filter.end_date)
            .bind(filter.page_token)
            .bind(page_limit(filter.page_size))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("Failed to list invoices"))?;

        timer.observe_duration();
        Ok(invoices
            .into_iter()
            .map(|invoice| with_effective_status(invoice, today))
            .collect())
    }

    /// Record the journal entry a caller posted for this invoice.
    #[instrument(skip(self), fields(organization_id = %organization_id, invoice_id = %invoice_id, entry_id = %entry_id))]
    pub async fn link_invoice_entry(
        &self,
        organization_id: Uuid,
        invoice_id: Uuid,
        entry_id: Uuid,
    ) -> LedgerResult<Invoice> {
        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;

        fetch_invoice(&mut tx, organization_id, invoice_id, RowLock::Update)
            .await?
            .ok_or_else(|| LedgerError::not_found("invoice", invoice_id))?;

        let entry = fetch_entry(&mut tx, organization_id, entry_id, RowLock::Share)
            .await?
            .ok_or_else(|| LedgerError::not_found("journal_entry", entry_id))?;
        if !entry.was_posted() {
            return Err(LedgerError::NotPosted(entry_id));
        }

        let mut invoice = sqlx::query_as::<_, Invoice>(&format!(
            "UPDATE invoices SET journal_entry_id = $2 WHERE invoice_id = $1 RETURNING {}",
            INVOICE_COLUMNS
        ))
        .bind(invoice_id)
        .bind(entry_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("Failed to link invoice entry"))?;
        invoice.lines = fetch_lines(&mut tx, invoice_id).await?;

        tx.commit().await.map_err(db_err("Failed to commit transaction"))?;
        info!(reference = %entry.reference, "Invoice linked to journal entry");

        Ok(with_effective_status(invoice, today()))
    }
}

/// Resolve the tax rate and revenue account of one line and price it.
async fn resolve_line<'a>(
    conn: &mut PgConnection,
    organization_id: Uuid,
    position: usize,
    line: &'a InvoiceLineInput,
    currency: &str,
) -> LedgerResult<ResolvedLine<'a>> {
    let tax_rate = match (line.tax_rate_id, line.tax_rate) {
        (Some(_), Some(_)) => {
            return Err(LedgerError::Validation(format!(
                "line {}: give either a tax rate id or a tax rate, not both",
                position
            )));
        }
        (Some(tax_rate_id), None) => {
            let rate = fetch_tax_rate(conn, organization_id, tax_rate_id)
                .await?
                .ok_or_else(|| LedgerError::not_found("tax_rate", tax_rate_id))?;
            if !rate.active {
                return Err(LedgerError::Validation(format!(
                    "line {}: tax rate {} is inactive",
                    position, rate.code
                )));
            }
            if !rate.tax_type.applies_to_sales() {
                return Err(LedgerError::Validation(format!(
                    "line {}: tax rate {} is not a sales rate",
                    position, rate.code
                )));
            }
            rate.rate
        }
        (None, Some(rate)) => {
            validate_rate(rate)?;
            rate
        }
        (None, None) => Decimal::ZERO,
    };

    if let Some(account_id) = line.account_id {
        let account = fetch_account(conn, organization_id, account_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("account", account_id))?;
        if account.currency != currency {
            return Err(LedgerError::Validation(format!(
                "line {}: account {} is in {}, invoice is in {}",
                position, account.code, account.currency, currency
            )));
        }
    }

    let priced = price_line(position, line.quantity, line.unit_price, tax_rate, currency)?;
    Ok(ResolvedLine {
        input: line,
        tax_rate,
        priced,
    })
}

async fn insert_line(
    conn: &mut PgConnection,
    invoice: &Invoice,
    line: &ResolvedLine<'_>,
    position: i32,
) -> LedgerResult<InvoiceLine> {
    sqlx::query_as::<_, InvoiceLine>(&format!(
        r#"
        INSERT INTO invoice_lines (
            line_id, invoice_id, organization_id, description, quantity, unit_price,
            tax_rate_id, tax_rate, tax_amount, subtotal, total, account_id, position
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING {}
        "#,
        INVOICE_LINE_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(invoice.invoice_id)
    .bind(invoice.organization_id)
    .bind(&line.input.description)
    .bind(line.input.quantity)
    .bind(line.input.unit_price)
    .bind(line.input.tax_rate_id)
    .bind(line.tax_rate)
    .bind(line.priced.tax_amount)
    .bind(line.priced.subtotal)
    .bind(line.priced.total)
    .bind(line.input.account_id)
    .bind(position)
    .fetch_one(conn)
    .await
    .map_err(db_err("Failed to insert invoice line"))
}

pub(crate) async fn fetch_invoice(
    conn: &mut PgConnection,
    organization_id: Uuid,
    invoice_id: Uuid,
    lock: RowLock,
) -> LedgerResult<Option<Invoice>> {
    sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {} FROM invoices WHERE organization_id = $1 AND invoice_id = $2{}",
        INVOICE_COLUMNS,
        lock.clause()
    ))
    .bind(organization_id)
    .bind(invoice_id)
    .fetch_optional(conn)
    .await
    .map_err(db_err("Failed to get invoice"))
}

async fn fetch_lines(conn: &mut PgConnection, invoice_id: Uuid) -> LedgerResult<Vec<InvoiceLine>> {
    sqlx::query_as::<_, InvoiceLine>(&format!(
        "SELECT {} FROM invoice_lines WHERE invoice_id = $1 ORDER BY position",
        INVOICE_LINE_COLUMNS
    ))
    .bind(invoice_id)
    .fetch_all(conn)
    .await
    .map_err(db_err("Failed to get invoice lines"))
}

pub(crate) fn with_effective_status(mut invoice: Invoice, today: NaiveDate) -> Invoice {
    invoice.status = invoice.effective_status(today);
    invoice
}

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}
