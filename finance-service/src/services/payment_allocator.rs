//! PaymentAllocator: payments and their allocation to invoices.
//!
//! Allocation never touches the ledger. Every change to an allocation
//! updates the invoice's amounts and cached status in the same transaction,
//! with the payment row locked before the invoice row.

use crate::error::{db_err, LedgerError, LedgerResult};
use crate::models::currency::{fits_minor_units, minor_units, parse_currency};
use crate::models::{
    check_allocation, payment_reference, Invoice, InvoiceStatus, NewPayment, Payment,
    PaymentAllocation,
};
use crate::services::chart_of_accounts::fetch_account;
use crate::services::database::{next_sequence, page_limit, Database, RowLock};
use crate::services::invoice_lifecycle::{fetch_invoice, today, with_effective_status, INVOICE_COLUMNS};
use crate::services::ledger_poster::fetch_entry;
use crate::services::metrics::{ALLOCATIONS_TOTAL, DB_QUERY_DURATION};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

const PAYMENT_COLUMNS: &str = "payment_id, organization_id, reference, payment_date, amount, \
     currency, method, customer_id, supplier_id, account_id, journal_entry_id, amount_allocated, \
     created_by, created_utc";

const ALLOCATION_COLUMNS: &str =
    "allocation_id, organization_id, payment_id, invoice_id, amount, created_by, created_utc";

const PAYMENT_SEQUENCE: &str = "payment";

impl Database {
    /// Record money received or paid. No ledger or invoice effect.
    #[instrument(skip(self, input), fields(organization_id = %input.organization_id, amount = %input.amount))]
    pub async fn record_payment(&self, input: &NewPayment, actor_id: Uuid) -> LedgerResult<Payment> {
        if input.amount <= Decimal::ZERO {
            return Err(LedgerError::Validation(
                "payment amount must be greater than zero".to_string(),
            ));
        }
        let currency = parse_currency(&input.currency)?;
        check_precision(input.amount, &currency)?;

        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;

        if let Some(account_id) = input.account_id {
            let account = fetch_account(&mut tx, input.organization_id, account_id)
                .await?
                .ok_or_else(|| LedgerError::not_found("account", account_id))?;
            if account.currency != currency {
                return Err(LedgerError::CurrencyMismatch {
                    expected: currency,
                    found: account.currency,
                });
            }
        }

        let reference =
            payment_reference(next_sequence(&mut tx, input.organization_id, PAYMENT_SEQUENCE).await?);

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments (
                payment_id, organization_id, reference, payment_date, amount, currency, method,
                customer_id, supplier_id, account_id, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {}
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(input.organization_id)
        .bind(&reference)
        .bind(input.payment_date)
        .bind(input.amount)
        .bind(&currency)
        .bind(input.method.as_str())
        .bind(input.counterparty.customer_id())
        .bind(input.counterparty.supplier_id())
        .bind(input.account_id)
        .bind(actor_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("Failed to record payment"))?;

        tx.commit().await.map_err(db_err("Failed to commit transaction"))?;
        info!(payment_id = %payment.payment_id, reference = %reference, "Payment recorded");

        Ok(payment)
    }

    /// Allocate part of a payment to an invoice.
    ///
    /// Returns the allocation with the updated payment and invoice (the
    /// invoice without lines). Nothing is written unless every check passes.
    #[instrument(skip(self), fields(organization_id = %organization_id, payment_id = %payment_id, invoice_id = %invoice_id, amount = %amount))]
    pub async fn allocate(
        &self,
        organization_id: Uuid,
        payment_id: Uuid,
        invoice_id: Uuid,
        amount: Decimal,
        actor_id: Uuid,
    ) -> LedgerResult<(PaymentAllocation, Payment, Invoice)> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::Validation(
                "allocation amount must be greater than zero".to_string(),
            ));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["allocate"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;

        let payment = fetch_payment(&mut tx, organization_id, payment_id, RowLock::Update)
            .await?
            .ok_or_else(|| LedgerError::not_found("payment", payment_id))?;
        let invoice = fetch_invoice(&mut tx, organization_id, invoice_id, RowLock::Update)
            .await?
            .ok_or_else(|| LedgerError::not_found("invoice", invoice_id))?;

        if payment.currency != invoice.currency {
            return Err(LedgerError::CurrencyMismatch {
                expected: invoice.currency,
                found: payment.currency,
            });
        }
        check_precision(amount, &invoice.currency)?;

        if matches!(invoice.status, InvoiceStatus::Draft | InvoiceStatus::Cancelled) {
            return Err(LedgerError::InvalidTransition {
                action: "allocate to",
                status: invoice.status.to_string(),
            });
        }

        check_allocation(&payment, invoice.total, invoice.amount_paid, amount)?;

        let allocation = sqlx::query_as::<_, PaymentAllocation>(&format!(
            r#"
            INSERT INTO payment_allocations (allocation_id, organization_id, payment_id, invoice_id, amount, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            ALLOCATION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(organization_id)
        .bind(payment_id)
        .bind(invoice_id)
        .bind(amount)
        .bind(actor_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("Failed to create allocation"))?;

        let invoice = settle_invoice(&mut tx, &invoice, invoice.amount_paid + amount).await?;
        let payment = adjust_allocated(&mut tx, payment_id, amount).await?;

        tx.commit().await.map_err(db_err("Failed to commit transaction"))?;
        timer.observe_duration();

        ALLOCATIONS_TOTAL.with_label_values(&["allocate"]).inc();
        info!(
            allocation_id = %allocation.allocation_id,
            invoice_status = %invoice.status,
            amount_due = %invoice.amount_due,
            "Payment allocated"
        );

        Ok((allocation, payment, with_effective_status(invoice, today())))
    }

    /// Remove an allocation and reverse its arithmetic on both sides.
    #[instrument(skip(self), fields(organization_id = %organization_id, allocation_id = %allocation_id))]
    pub async fn unallocate(
        &self,
        organization_id: Uuid,
        allocation_id: Uuid,
    ) -> LedgerResult<(Payment, Invoice)> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["unallocate"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;

        let (payment_id, invoice_id) =
            fetch_allocation(&mut tx, organization_id, allocation_id, RowLock::None)
                .await?
                .map(|a| (a.payment_id, a.invoice_id))
                .ok_or_else(|| LedgerError::not_found("allocation", allocation_id))?;

        fetch_payment(&mut tx, organization_id, payment_id, RowLock::Update)
            .await?
            .ok_or_else(|| LedgerError::not_found("payment", payment_id))?;
        let invoice = fetch_invoice(&mut tx, organization_id, invoice_id, RowLock::Update)
            .await?
            .ok_or_else(|| LedgerError::not_found("invoice", invoice_id))?;

        // Re-read under the payment lock: a concurrent unallocate may have won.
        let allocation = fetch_allocation(&mut tx, organization_id, allocation_id, RowLock::Update)
            .await?
            .ok_or_else(|| LedgerError::not_found("allocation", allocation_id))?;

        if invoice.status == InvoiceStatus::Cancelled {
            return Err(LedgerError::InvoiceAlreadyClosed(format!(
                "invoice {} is cancelled",
                invoice_id
            )));
        }
        let paid = invoice.amount_paid - allocation.amount;
        if paid < Decimal::ZERO {
            return Err(LedgerError::InvoiceAlreadyClosed(format!(
                "removing {} would leave invoice {} with {} paid",
                allocation.amount, invoice_id, paid
            )));
        }

        sqlx::query("DELETE FROM payment_allocations WHERE allocation_id = $1")
            .bind(allocation_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("Failed to delete allocation"))?;

        let invoice = settle_invoice(&mut tx, &invoice, paid).await?;
        let payment = adjust_allocated(&mut tx, payment_id, -allocation.amount).await?;

        tx.commit().await.map_err(db_err("Failed to commit transaction"))?;
        timer.observe_duration();

        ALLOCATIONS_TOTAL.with_label_values(&["unallocate"]).inc();
        info!(
            amount = %allocation.amount,
            invoice_status = %invoice.status,
            "Payment unallocated"
        );

        Ok((payment, with_effective_status(invoice, today())))
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, payment_id = %payment_id))]
    pub async fn get_payment(&self, organization_id: Uuid, payment_id: Uuid) -> LedgerResult<Payment> {
        let mut conn = self.pool.acquire().await.map_err(db_err("Failed to acquire connection"))?;
        fetch_payment(&mut conn, organization_id, payment_id, RowLock::None)
            .await?
            .ok_or_else(|| LedgerError::not_found("payment", payment_id))
    }

    /// Payments ordered by date then id; `page_token` is the last payment id
    /// of the previous page.
    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn list_payments(
        &self,
        organization_id: Uuid,
        customer_id: Option<Uuid>,
        supplier_id: Option<Uuid>,
        page_size: i32,
        page_token: Option<Uuid>,
    ) -> LedgerResult<Vec<Payment>> {
        sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {} FROM payments
            WHERE organization_id = $1
              AND ($2::uuid IS NULL OR customer_id = $2)
              AND ($3::uuid IS NULL OR supplier_id = $3)
              AND ($4::uuid IS NULL OR (payment_date, payment_id) > (
                  SELECT payment_date, payment_id FROM payments
                  WHERE organization_id = $1 AND payment_id = $4))
            ORDER BY payment_date, payment_id
            LIMIT $5
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(organization_id)
        .bind(customer_id)
        .bind(supplier_id)
        .bind(page_token)
        .bind(page_limit(page_size))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list payments"))
    }

    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn list_allocations(
        &self,
        organization_id: Uuid,
        payment_id: Option<Uuid>,
        invoice_id: Option<Uuid>,
    ) -> LedgerResult<Vec<PaymentAllocation>> {
        sqlx::query_as::<_, PaymentAllocation>(&format!(
            r#"
            SELECT {} FROM payment_allocations
            WHERE organization_id = $1
              AND ($2::uuid IS NULL OR payment_id = $2)
              AND ($3::uuid IS NULL OR invoice_id = $3)
            ORDER BY created_utc, allocation_id
            "#,
            ALLOCATION_COLUMNS
        ))
        .bind(organization_id)
        .bind(payment_id)
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list allocations"))
    }

    /// Record the journal entry a caller posted for this payment.
    #[instrument(skip(self), fields(organization_id = %organization_id, payment_id = %payment_id, entry_id = %entry_id))]
    pub async fn link_payment_entry(
        &self,
        organization_id: Uuid,
        payment_id: Uuid,
        entry_id: Uuid,
    ) -> LedgerResult<Payment> {
        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;

        fetch_payment(&mut tx, organization_id, payment_id, RowLock::Update)
            .await?
            .ok_or_else(|| LedgerError::not_found("payment", payment_id))?;

        let entry = fetch_entry(&mut tx, organization_id, entry_id, RowLock::Share)
            .await?
            .ok_or_else(|| LedgerError::not_found("journal_entry", entry_id))?;
        if !entry.was_posted() {
            return Err(LedgerError::NotPosted(entry_id));
        }

        let payment = sqlx::query_as::<_, Payment>(&format!(
            "UPDATE payments SET journal_entry_id = $2 WHERE payment_id = $1 RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(payment_id)
        .bind(entry_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("Failed to link payment entry"))?;

        tx.commit().await.map_err(db_err("Failed to commit transaction"))?;
        info!(reference = %entry.reference, "Payment linked to journal entry");

        Ok(payment)
    }
}

fn check_precision(amount: Decimal, currency: &str) -> LedgerResult<()> {
    if !fits_minor_units(amount, currency) {
        return Err(LedgerError::Validation(format!(
            "{} allows at most {} decimal places",
            currency,
            minor_units(currency)
        )));
    }
    Ok(())
}

/// Write the amounts and cached status that follow from `paid`.
async fn settle_invoice(conn: &mut PgConnection, invoice: &Invoice, paid: Decimal) -> LedgerResult<Invoice> {
    let settlement = invoice.settlement(paid);
    sqlx::query_as::<_, Invoice>(&format!(
        r#"
        UPDATE invoices SET amount_paid = $2, amount_due = $3, status = $4
        WHERE invoice_id = $1
        RETURNING {}
        "#,
        INVOICE_COLUMNS
    ))
    .bind(invoice.invoice_id)
    .bind(settlement.amount_paid)
    .bind(settlement.amount_due)
    .bind(settlement.status.as_str())
    .fetch_one(conn)
    .await
    .map_err(db_err("Failed to update invoice balance"))
}

async fn adjust_allocated(conn: &mut PgConnection, payment_id: Uuid, delta: Decimal) -> LedgerResult<Payment> {
    sqlx::query_as::<_, Payment>(&format!(
        r#"
        UPDATE payments SET amount_allocated = amount_allocated + $2
        WHERE payment_id = $1
        RETURNING {}
        "#,
        PAYMENT_COLUMNS
    ))
    .bind(payment_id)
    .bind(delta)
    .fetch_one(conn)
    .await
    .map_err(db_err("Failed to update payment allocation"))
}

async fn fetch_payment(
    conn: &mut PgConnection,
    organization_id: Uuid,
    payment_id: Uuid,
    lock: RowLock,
) -> LedgerResult<Option<Payment>> {
    sqlx::query_as::<_, Payment>(&format!(
        "SELECT {} FROM payments WHERE organization_id = $1 AND payment_id = $2{}",
        PAYMENT_COLUMNS,
        lock.clause()
    ))
    .bind(organization_id)
    .bind(payment_id)
    .fetch_optional(conn)
    .await
    .map_err(db_err("Failed to get payment"))
}

async fn fetch_allocation(
    conn: &mut PgConnection,
    organization_id: Uuid,
    allocation_id: Uuid,
    lock: RowLock,
) -> LedgerResult<Option<PaymentAllocation>> {
    sqlx::query_as::<_, PaymentAllocation>(&format!(
        "SELECT {} FROM payment_allocations WHERE organization_id = $1 AND allocation_id = $2{}",
        ALLOCATION_COLUMNS,
        lock.clause()
    ))
    .bind(organization_id)
    .bind(allocation_id)
    .fetch_optional(conn)
    .await
    .map_err(db_err("Failed to get allocation"))
}
