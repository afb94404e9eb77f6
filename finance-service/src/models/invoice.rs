//! Invoice model: pricing, totals and status derivation.

use crate::error::LedgerError;
use crate::models::currency::round_minor;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invoice status.
///
/// `Overdue` is never stored: it is `Sent`/`Partial` viewed after the due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Partial,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn from_proto(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Draft),
            2 => Some(Self::Sent),
            3 => Some(Self::Partial),
            4 => Some(Self::Paid),
            5 => Some(Self::Overdue),
            6 => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn to_proto(self) -> i32 {
        match self {
            Self::Draft => 1,
            Self::Sent => 2,
            Self::Partial => 3,
            Self::Paid => 4,
            Self::Overdue => 5,
            Self::Cancelled => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Partial => "partial",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Cancelled => "cancelled",
        }
    }
}

impl TryFrom<String> for InvoiceStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "draft" => Ok(Self::Draft),
            "sent" => Ok(Self::Sent),
            "partial" => Ok(Self::Partial),
            "paid" => Ok(Self::Paid),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown invoice status '{}'", other)),
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Customer details copied onto the invoice at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    pub customer_id: Option<Uuid>,
    pub name: String,
    pub email: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub organization_id: Uuid,
    pub number: Option<String>,
    pub customer_id: Option<Uuid>,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_address: Option<String>,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    #[sqlx(try_from = "String")]
    pub status: InvoiceStatus,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub amount_paid: Decimal,
    pub amount_due: Decimal,
    pub currency: String,
    pub journal_entry_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_utc: DateTime<Utc>,
    pub sent_utc: Option<DateTime<Utc>>,
    pub cancelled_utc: Option<DateTime<Utc>>,
    #[sqlx(skip)]
    pub lines: Vec<InvoiceLine>,
}

impl Invoice {
    pub fn customer(&self) -> CustomerSnapshot {
        CustomerSnapshot {
            customer_id: self.customer_id,
            name: self.customer_name.clone(),
            email: self.customer_email.clone(),
            address: self.customer_address.clone(),
        }
    }

    /// Status as shown to callers on `today`.
    pub fn effective_status(&self, today: NaiveDate) -> InvoiceStatus {
        match self.status {
            InvoiceStatus::Sent | InvoiceStatus::Partial if today > self.due_date => {
                InvoiceStatus::Overdue
            }
            status => status,
        }
    }

    pub fn check_cancellable(&self) -> Result<(), LedgerError> {
        if self.amount_paid > Decimal::ZERO {
            return Err(LedgerError::HasPayments(self.invoice_id));
        }
        match self.status {
            InvoiceStatus::Draft | InvoiceStatus::Sent => Ok(()),
            status => Err(LedgerError::InvalidTransition {
                action: "cancel",
                status: status.to_string(),
            }),
        }
    }

    /// Amounts and status once `amount_paid` becomes `paid`.
    pub fn settlement(&self, paid: Decimal) -> Settlement {
        Settlement {
            amount_paid: paid,
            amount_due: self.total - paid,
            status: payment_status(self.total, paid),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub amount_paid: Decimal,
    pub amount_due: Decimal,
    pub status: InvoiceStatus,
}

/// Status of a sent invoice given what has been paid against it.
pub fn payment_status(total: Decimal, paid: Decimal) -> InvoiceStatus {
    if paid <= Decimal::ZERO {
        InvoiceStatus::Sent
    } else if paid < total {
        InvoiceStatus::Partial
    } else {
        InvoiceStatus::Paid
    }
}

pub fn invoice_number(sequence: i64) -> String {
    format!("INV-{:06}", sequence)
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceLine {
    pub line_id: Uuid,
    pub invoice_id: Uuid,
    pub organization_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub tax_rate_id: Option<Uuid>,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub account_id: Option<Uuid>,
    pub position: i32,
}

/// A line as submitted by a caller. Either `tax_rate_id` (looked up and
/// snapshotted) or a literal `tax_rate` percentage may be given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLineInput {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub tax_rate_id: Option<Uuid>,
    pub tax_rate: Option<Decimal>,
    pub account_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub organization_id: Uuid,
    pub customer: CustomerSnapshot,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub currency: String,
    pub lines: Vec<InvoiceLineInput>,
}

/// Filter parameters for listing invoices.
#[derive(Debug, Clone, Default)]
pub struct ListInvoicesFilter {
    pub status: Option<InvoiceStatus>,
    pub customer_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedLine {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

/// Price one line, rounding half away from zero at the currency's minor unit.
///
/// `position` is 1-based and only used in error messages.
pub fn price_line(
    position: usize,
    quantity: Decimal,
    unit_price: Decimal,
    tax_rate: Decimal,
    currency: &str,
) -> Result<PricedLine, LedgerError> {
    if quantity <= Decimal::ZERO {
        return Err(LedgerError::InvalidQuantity { line: position });
    }
    if unit_price < Decimal::ZERO {
        return Err(LedgerError::Validation(format!(
            "line {}: unit price must not be negative",
            position
        )));
    }

    let gross = quantity * unit_price;
    let subtotal = round_minor(gross, currency);
    let tax_amount = round_minor(gross * tax_rate / Decimal::ONE_HUNDRED, currency);

    Ok(PricedLine {
        subtotal,
        tax_amount,
        total: subtotal + tax_amount,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

impl InvoiceTotals {
    pub fn sum(lines: &[PricedLine]) -> Self {
        lines.iter().fold(Self::default(), |acc, line| Self {
            subtotal: acc.subtotal + line.subtotal,
            tax_amount: acc.tax_amount + line.tax_amount,
            total: acc.total + line.total,
        })
    }

    /// A zero total could never be settled by an allocation.
    pub fn check_payable(&self) -> Result<(), LedgerError> {
        if self.total <= Decimal::ZERO {
            return Err(LedgerError::Validation(
                "invoice total must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn validate_dates(invoice_date: NaiveDate, due_date: NaiveDate) -> Result<(), LedgerError> {
    if due_date < invoice_date {
        return Err(LedgerError::Validation(format!(
            "due date {} is before invoice date {}",
            due_date, invoice_date
        )));
    }
    Ok(())
}
