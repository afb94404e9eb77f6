//! Conversions between wire messages and domain models.
//!
//! Money travels as decimal strings, dates as `YYYY-MM-DD`, and absent
//! optional ids or dates as empty strings.

use crate::error::{LedgerError, LedgerResult};
use crate::grpc::proto;
use crate::models;
use crate::models::currency::minor_units;
use chrono::{DateTime, NaiveDate, Utc};
use prost_types::Timestamp;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Request parsing
// ============================================================================

pub(crate) fn parse_uuid(field: &str, value: &str) -> LedgerResult<Uuid> {
    let value = value.trim();
    if value.is_empty() {
        return Err(LedgerError::Validation(format!("{} is required", field)));
    }
    Uuid::parse_str(value)
        .map_err(|_| LedgerError::Validation(format!("{} '{}' is not a valid id", field, value)))
}

pub(crate) fn parse_optional_uuid(field: &str, value: &str) -> LedgerResult<Option<Uuid>> {
    if value.trim().is_empty() {
        Ok(None)
    } else {
        parse_uuid(field, value).map(Some)
    }
}

pub(crate) fn parse_date(field: &str, value: &str) -> LedgerResult<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return Err(LedgerError::Validation(format!("{} is required", field)));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        LedgerError::Validation(format!("{} '{}' is not a YYYY-MM-DD date", field, value))
    })
}

pub(crate) fn parse_optional_date(field: &str, value: &str) -> LedgerResult<Option<NaiveDate>> {
    if value.trim().is_empty() {
        Ok(None)
    } else {
        parse_date(field, value).map(Some)
    }
}

pub(crate) fn parse_decimal(field: &str, value: &str) -> LedgerResult<Decimal> {
    let value = value.trim();
    if value.is_empty() {
        return Err(LedgerError::Validation(format!("{} is required", field)));
    }
    Decimal::from_str(value)
        .map_err(|_| LedgerError::Validation(format!("{} '{}' is not a decimal", field, value)))
}

pub(crate) fn parse_optional_decimal(field: &str, value: &str) -> LedgerResult<Option<Decimal>> {
    if value.trim().is_empty() {
        Ok(None)
    } else {
        parse_decimal(field, value).map(Some)
    }
}

/// An empty decimal field on an entry line means zero on that side.
fn parse_amount(field: &str, value: &str) -> LedgerResult<Decimal> {
    Ok(parse_optional_decimal(field, value)?.unwrap_or(Decimal::ZERO))
}

pub(crate) fn optional_text(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == value.len() {
        Some(value)
    } else {
        Some(trimmed.to_string())
    }
}

pub(crate) fn entry_line_input(line: proto::EntryLineInput) -> LedgerResult<models::EntryLineInput> {
    Ok(models::EntryLineInput {
        account_id: parse_uuid("line.account_id", &line.account_id)?,
        label: line.label,
        debit: parse_amount("line.debit", &line.debit)?,
        credit: parse_amount("line.credit", &line.credit)?,
    })
}

pub(crate) fn invoice_line_input(
    line: proto::InvoiceLineInput,
) -> LedgerResult<models::InvoiceLineInput> {
    Ok(models::InvoiceLineInput {
        description: line.description,
        quantity: parse_decimal("line.quantity", &line.quantity)?,
        unit_price: parse_decimal("line.unit_price", &line.unit_price)?,
        tax_rate_id: parse_optional_uuid("line.tax_rate_id", &line.tax_rate_id)?,
        tax_rate: parse_optional_decimal("line.tax_rate", &line.tax_rate)?,
        account_id: parse_optional_uuid("line.account_id", &line.account_id)?,
    })
}

pub(crate) fn customer_snapshot(
    customer: Option<proto::CustomerSnapshot>,
) -> LedgerResult<models::CustomerSnapshot> {
    let customer = customer.unwrap_or_default();
    Ok(models::CustomerSnapshot {
        customer_id: parse_optional_uuid("customer.customer_id", &customer.customer_id)?,
        name: customer.name,
        email: optional_text(customer.email),
        address: optional_text(customer.address),
    })
}

// ============================================================================
// Response building
// ============================================================================

fn timestamp(dt: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: dt.timestamp(),
        nanos: dt.timestamp_subsec_nanos() as i32,
    }
}

fn id_or_empty(id: Option<Uuid>) -> String {
    id.map(|id| id.to_string()).unwrap_or_default()
}

fn date_string(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Amount at the currency's minor-unit scale, e.g. `1000.00` for EUR.
fn money(amount: Decimal, currency: &str) -> String {
    let mut amount = amount;
    amount.rescale(minor_units(currency));
    amount.to_string()
}

/// Quantities, prices, rates and amounts with no currency at hand.
fn plain(value: Decimal) -> String {
    value.normalize().to_string()
}

impl From<models::Account> for proto::Account {
    fn from(a: models::Account) -> Self {
        Self {
            account_id: a.account_id.to_string(),
            organization_id: a.organization_id.to_string(),
            code: a.code,
            name: a.name,
            account_type: a.account_type.to_proto(),
            parent_id: id_or_empty(a.parent_id),
            currency: a.currency,
            active: a.active,
            system: a.system,
            enforce_non_negative: a.enforce_non_negative,
            created_at: Some(timestamp(a.created_utc)),
            updated_at: Some(timestamp(a.updated_utc)),
        }
    }
}

impl From<models::Journal> for proto::Journal {
    fn from(j: models::Journal) -> Self {
        Self {
            journal_id: j.journal_id.to_string(),
            organization_id: j.organization_id.to_string(),
            code: j.code,
            name: j.name,
            journal_type: j.journal_type.to_proto(),
            active: j.active,
            created_at: Some(timestamp(j.created_utc)),
        }
    }
}

impl From<models::BankAccount> for proto::BankAccount {
    fn from(b: models::BankAccount) -> Self {
        let balance = money(b.balance, &b.currency);
        Self {
            bank_account_id: b.bank_account_id.to_string(),
            organization_id: b.organization_id.to_string(),
            name: b.name,
            account_number: b.account_number.unwrap_or_default(),
            iban: b.iban.unwrap_or_default(),
            swift: b.swift.unwrap_or_default(),
            currency: b.currency,
            balance,
            gl_account_id: id_or_empty(b.gl_account_id),
            balance_refreshed_at: b.balance_refreshed_utc.map(timestamp),
            created_at: Some(timestamp(b.created_utc)),
        }
    }
}

impl From<models::FiscalYear> for proto::FiscalYear {
    fn from(y: models::FiscalYear) -> Self {
        Self {
            fiscal_year_id: y.fiscal_year_id.to_string(),
            organization_id: y.organization_id.to_string(),
            name: y.name,
            start_date: date_string(y.start_date),
            end_date: date_string(y.end_date),
            status: y.status.to_proto(),
            closed_by: id_or_empty(y.closed_by),
            closed_at: y.closed_utc.map(timestamp),
            created_at: Some(timestamp(y.created_utc)),
        }
    }
}

impl From<models::JournalEntryLine> for proto::JournalEntryLine {
    fn from(l: models::JournalEntryLine) -> Self {
        Self {
            line_id: l.line_id.to_string(),
            account_id: l.account_id.to_string(),
            label: l.label,
            debit: plain(l.debit),
            credit: plain(l.credit),
            position: l.position,
            reconciled: l.reconciled,
            reconciled_at: l.reconciled_utc.map(timestamp),
        }
    }
}

impl From<models::JournalEntry> for proto::JournalEntry {
    fn from(e: models::JournalEntry) -> Self {
        let currency = e.currency;
        let lines = e
            .lines
            .into_iter()
            .map(|l| {
                let (debit, credit) = (money(l.debit, &currency), money(l.credit, &currency));
                proto::JournalEntryLine {
                    debit,
                    credit,
                    ..l.into()
                }
            })
            .collect();
        Self {
            entry_id: e.entry_id.to_string(),
            organization_id: e.organization_id.to_string(),
            journal_id: e.journal_id.to_string(),
            reference: e.reference,
            date: date_string(e.entry_date),
            description: e.description,
            status: e.status.to_proto(),
            total_debit: money(e.total_debit, &currency),
            total_credit: money(e.total_credit, &currency),
            currency,
            lines,
            created_by: e.created_by.to_string(),
            created_at: Some(timestamp(e.created_utc)),
            posted_by: id_or_empty(e.posted_by),
            posted_at: e.posted_utc.map(timestamp),
            cancelled_by: id_or_empty(e.cancelled_by),
            cancelled_at: e.cancelled_utc.map(timestamp),
            reversal_of: id_or_empty(e.reversal_of),
            reversed_by: id_or_empty(e.reversed_by),
            idempotency_key: e.idempotency_key.unwrap_or_default(),
        }
    }
}

impl From<models::CustomerSnapshot> for proto::CustomerSnapshot {
    fn from(c: models::CustomerSnapshot) -> Self {
        Self {
            customer_id: id_or_empty(c.customer_id),
            name: c.name,
            email: c.email.unwrap_or_default(),
            address: c.address.unwrap_or_default(),
        }
    }
}

impl From<models::InvoiceLine> for proto::InvoiceLine {
    fn from(l: models::InvoiceLine) -> Self {
        Self {
            line_id: l.line_id.to_string(),
            description: l.description,
            quantity: plain(l.quantity),
            unit_price: plain(l.unit_price),
            tax_rate_id: id_or_empty(l.tax_rate_id),
            tax_rate: plain(l.tax_rate),
            tax_amount: plain(l.tax_amount),
            subtotal: plain(l.subtotal),
            total: plain(l.total),
            account_id: id_or_empty(l.account_id),
            position: l.position,
        }
    }
}

impl From<models::Invoice> for proto::Invoice {
    fn from(i: models::Invoice) -> Self {
        let customer = i.customer();
        let currency = i.currency;
        let lines = i
            .lines
            .into_iter()
            .map(|l| {
                let tax_amount = money(l.tax_amount, &currency);
                let subtotal = money(l.subtotal, &currency);
                let total = money(l.total, &currency);
                proto::InvoiceLine {
                    tax_amount,
                    subtotal,
                    total,
                    ..l.into()
                }
            })
            .collect();
        Self {
            invoice_id: i.invoice_id.to_string(),
            organization_id: i.organization_id.to_string(),
            number: i.number.unwrap_or_default(),
            customer: Some(customer.into()),
            date: date_string(i.invoice_date),
            due_date: date_string(i.due_date),
            status: i.status.to_proto(),
            subtotal: money(i.subtotal, &currency),
            tax_amount: money(i.tax_amount, &currency),
            total: money(i.total, &currency),
            amount_paid: money(i.amount_paid, &currency),
            amount_due: money(i.amount_due, &currency),
            currency,
            journal_entry_id: id_or_empty(i.journal_entry_id),
            lines,
            created_by: i.created_by.to_string(),
            created_at: Some(timestamp(i.created_utc)),
            sent_at: i.sent_utc.map(timestamp),
            cancelled_at: i.cancelled_utc.map(timestamp),
        }
    }
}

impl From<models::TaxRate> for proto::TaxRate {
    fn from(t: models::TaxRate) -> Self {
        Self {
            tax_rate_id: t.tax_rate_id.to_string(),
            organization_id: t.organization_id.to_string(),
            name: t.name,
            code: t.code,
            rate: plain(t.rate),
            tax_type: t.tax_type.to_proto(),
            account_id: id_or_empty(t.account_id),
            active: t.active,
            created_at: Some(timestamp(t.created_utc)),
        }
    }
}

impl From<models::Payment> for proto::Payment {
    fn from(p: models::Payment) -> Self {
        let amount_unallocated = money(p.amount_unallocated(), &p.currency);
        let amount_allocated = money(p.amount_allocated, &p.currency);
        let amount = money(p.amount, &p.currency);
        Self {
            payment_id: p.payment_id.to_string(),
            organization_id: p.organization_id.to_string(),
            reference: p.reference,
            date: date_string(p.payment_date),
            amount,
            currency: p.currency,
            method: p.method.to_proto(),
            customer_id: id_or_empty(p.customer_id),
            supplier_id: id_or_empty(p.supplier_id),
            account_id: id_or_empty(p.account_id),
            journal_entry_id: id_or_empty(p.journal_entry_id),
            amount_allocated,
            amount_unallocated,
            created_by: p.created_by.to_string(),
            created_at: Some(timestamp(p.created_utc)),
        }
    }
}

impl From<models::PaymentAllocation> for proto::PaymentAllocation {
    fn from(a: models::PaymentAllocation) -> Self {
        Self {
            allocation_id: a.allocation_id.to_string(),
            payment_id: a.payment_id.to_string(),
            invoice_id: a.invoice_id.to_string(),
            amount: plain(a.amount),
            created_by: a.created_by.to_string(),
            created_at: Some(timestamp(a.created_utc)),
        }
    }
}

// ----- Reports -----

fn trial_balance_row(r: models::TrialBalanceRow, currency: &str) -> proto::TrialBalanceRow {
    proto::TrialBalanceRow {
        account_id: r.account_id.to_string(),
        code: r.code,
        name: r.name,
        account_type: r.account_type.to_proto(),
        opening_balance: money(r.opening_balance, currency),
        debit: money(r.debit, currency),
        credit: money(r.credit, currency),
        balance: money(r.balance, currency),
        closing_balance: money(r.closing_balance, currency),
    }
}

impl From<models::TrialBalance> for proto::TrialBalanceResponse {
    fn from(t: models::TrialBalance) -> Self {
        let currency = t.currency;
        Self {
            start_date: date_string(t.start_date),
            end_date: date_string(t.end_date),
            rows: t
                .rows
                .into_iter()
                .map(|r| trial_balance_row(r, &currency))
                .collect(),
            total_debit: money(t.total_debit, &currency),
            total_credit: money(t.total_credit, &currency),
            currency,
        }
    }
}

fn report_section(s: models::ReportSection, currency: &str) -> proto::ReportSection {
    proto::ReportSection {
        account_type: s.account_type.to_proto(),
        lines: s
            .lines
            .into_iter()
            .map(|l| proto::ReportLine {
                account_id: l.account_id.to_string(),
                code: l.code,
                name: l.name,
                amount: money(l.amount, currency),
            })
            .collect(),
        total: money(s.total, currency),
    }
}

impl From<models::BalanceSheet> for proto::BalanceSheetResponse {
    fn from(b: models::BalanceSheet) -> Self {
        let currency = b.currency;
        Self {
            as_of_date: date_string(b.as_of_date),
            assets: Some(report_section(b.assets, &currency)),
            liabilities: Some(report_section(b.liabilities, &currency)),
            equity: Some(report_section(b.equity, &currency)),
            current_earnings: money(b.current_earnings, &currency),
            total_assets: money(b.total_assets, &currency),
            total_liabilities: money(b.total_liabilities, &currency),
            total_equity: money(b.total_equity, &currency),
            currency,
        }
    }
}

impl From<models::IncomeStatement> for proto::IncomeStatementResponse {
    fn from(i: models::IncomeStatement) -> Self {
        let currency = i.currency;
        Self {
            start_date: date_string(i.start_date),
            end_date: date_string(i.end_date),
            revenue: Some(report_section(i.revenue, &currency)),
            expenses: Some(report_section(i.expenses, &currency)),
            total_revenue: money(i.total_revenue, &currency),
            total_expenses: money(i.total_expenses, &currency),
            net_income: money(i.net_income, &currency),
            currency,
        }
    }
}

fn statement_line(s: models::StatementLine, currency: &str) -> proto::StatementLine {
    proto::StatementLine {
        entry_id: s.line.entry_id.to_string(),
        reference: s.line.reference,
        date: date_string(s.line.entry_date),
        label: s.line.label,
        debit: money(s.line.debit, currency),
        credit: money(s.line.credit, currency),
        running_balance: money(s.running_balance, currency),
    }
}

impl From<models::AccountStatement> for proto::AccountStatementResponse {
    fn from(s: models::AccountStatement) -> Self {
        let currency = s.currency;
        Self {
            account_id: s.account_id.to_string(),
            opening_balance: money(s.opening_balance, &currency),
            closing_balance: money(s.closing_balance, &currency),
            lines: s
                .lines
                .into_iter()
                .map(|l| statement_line(l, &currency))
                .collect(),
            currency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn empty_optional_fields_are_absent() {
        assert_eq!(parse_optional_uuid("parent_id", "").unwrap(), None);
        assert_eq!(parse_optional_uuid("parent_id", "  ").unwrap(), None);
        assert_eq!(parse_optional_date("start_date", "").unwrap(), None);
        assert_eq!(parse_optional_decimal("tax_rate", "").unwrap(), None);
        assert_eq!(optional_text("   ".to_string()), None);
        assert_eq!(optional_text(" a@b.c ".to_string()), Some("a@b.c".to_string()));
    }

    #[test]
    fn required_fields_reject_empty_and_malformed_values() {
        assert!(matches!(
            parse_uuid("organization_id", ""),
            Err(LedgerError::Validation(msg)) if msg == "organization_id is required"
        ));
        assert!(parse_uuid("entry_id", "not-a-uuid").is_err());
        assert!(parse_date("date", "2026-02-30").is_err());
        assert!(parse_date("date", "15/03/2026").is_err());
        assert!(parse_decimal("amount", "12,50").is_err());
    }

    #[test]
    fn decimals_keep_their_scale() {
        assert_eq!(parse_decimal("amount", "1000.00").unwrap().to_string(), "1000.00");
        assert_eq!(parse_decimal("amount", " 0.5 ").unwrap(), dec!(0.5));
    }

    #[test]
    fn entry_line_sides_default_to_zero() {
        let account_id = Uuid::new_v4();
        let line = entry_line_input(proto::EntryLineInput {
            account_id: account_id.to_string(),
            label: "Sale".to_string(),
            debit: "250.00".to_string(),
            credit: String::new(),
        })
        .unwrap();
        assert_eq!(line.account_id, account_id);
        assert_eq!(line.debit, dec!(250.00));
        assert_eq!(line.credit, Decimal::ZERO);
    }

    #[test]
    fn invoice_line_distinguishes_rate_id_from_literal_rate() {
        let line = invoice_line_input(proto::InvoiceLineInput {
            description: "Consulting".to_string(),
            quantity: "2".to_string(),
            unit_price: "100.00".to_string(),
            tax_rate_id: String::new(),
            tax_rate: "20".to_string(),
            account_id: String::new(),
        })
        .unwrap();
        assert_eq!(line.tax_rate, Some(dec!(20)));
        assert_eq!(line.tax_rate_id, None);
        assert_eq!(line.account_id, None);
    }

    #[test]
    fn money_uses_the_currency_minor_units() {
        assert_eq!(money(dec!(1000.000000), "EUR"), "1000.00");
        assert_eq!(money(dec!(1500.000000), "JPY"), "1500");
        assert_eq!(plain(dec!(20.000000)), "20");
        assert_eq!(plain(dec!(0.055000)), "0.055");
    }

    #[test]
    fn missing_customer_snapshot_has_empty_name() {
        let customer = customer_snapshot(None).unwrap();
        assert!(customer.name.is_empty());
        assert_eq!(customer.customer_id, None);
    }

    #[test]
    fn unsent_invoice_has_empty_number_and_no_sent_timestamp() {
        let invoice = models::Invoice {
            invoice_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            number: None,
            customer_id: None,
            customer_name: "Acme".to_string(),
            customer_email: Some("billing@acme.test".to_string()),
            customer_address: None,
            invoice_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            status: models::InvoiceStatus::Draft,
            subtotal: dec!(250.00),
            tax_amount: dec!(50.00),
            total: dec!(300.00),
            amount_paid: dec!(0),
            amount_due: dec!(300.00),
            currency: "EUR".to_string(),
            journal_entry_id: None,
            created_by: Uuid::new_v4(),
            created_utc: Utc::now(),
            sent_utc: None,
            cancelled_utc: None,
            lines: Vec::new(),
        };

        let wire = proto::Invoice::from(invoice);
        assert_eq!(wire.number, "");
        assert_eq!(wire.date, "2026-03-01");
        assert_eq!(wire.total, "300.00");
        assert_eq!(wire.status, proto::InvoiceStatus::Draft as i32);
        assert!(wire.sent_at.is_none());
        let customer = wire.customer.unwrap();
        assert_eq!(customer.email, "billing@acme.test");
        assert_eq!(customer.address, "");
    }

    #[test]
    fn payment_reports_unallocated_remainder() {
        let payment = models::Payment {
            payment_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            reference: "PAY-000001".to_string(),
            payment_date: NaiveDate::from_ymd_opt(2026, 3, 15).unwrap(),
            amount: dec!(500.00),
            currency: "EUR".to_string(),
            method: models::PaymentMethod::BankTransfer,
            customer_id: None,
            supplier_id: None,
            account_id: None,
            journal_entry_id: None,
            amount_allocated: dec!(300.00),
            created_by: Uuid::new_v4(),
            created_utc: Utc::now(),
        };

        let wire = proto::Payment::from(payment);
        assert_eq!(wire.amount_unallocated, "200.00");
        assert_eq!(wire.method, proto::PaymentMethod::BankTransfer as i32);
        assert_eq!(wire.customer_id, "");
    }
}
