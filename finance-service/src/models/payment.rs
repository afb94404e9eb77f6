//! Payments and their allocation to invoices.

use crate::error::LedgerError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Check,
    CreditCard,
    Other,
}

impl PaymentMethod {
    pub fn from_proto(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Cash),
            2 => Some(Self::BankTransfer),
            3 => Some(Self::Check),
            4 => Some(Self::CreditCard),
            5 => Some(Self::Other),
            _ => None,
        }
    }

    pub fn to_proto(self) -> i32 {
        match self {
            Self::Cash => 1,
            Self::BankTransfer => 2,
            Self::Check => 3,
            Self::CreditCard => 4,
            Self::Other => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::BankTransfer => "bank_transfer",
            Self::Check => "check",
            Self::CreditCard => "credit_card",
            Self::Other => "other",
        }
    }
}

impl TryFrom<String> for PaymentMethod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "cash" => Ok(Self::Cash),
            "bank_transfer" => Ok(Self::BankTransfer),
            "check" => Ok(Self::Check),
            "credit_card" => Ok(Self::CreditCard),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown payment method '{}'", other)),
        }
    }
}

/// Who a payment was received from or made to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Counterparty {
    Unspecified,
    Customer(Uuid),
    Supplier(Uuid),
}

impl Counterparty {
    pub fn from_ids(customer_id: Option<Uuid>, supplier_id: Option<Uuid>) -> Result<Self, LedgerError> {
        match (customer_id, supplier_id) {
            (None, None) => Ok(Self::Unspecified),
            (Some(id), None) => Ok(Self::Customer(id)),
            (None, Some(id)) => Ok(Self::Supplier(id)),
            (Some(_), Some(_)) => Err(LedgerError::Validation(
                "a payment names either a customer or a supplier, not both".to_string(),
            )),
        }
    }

    pub fn customer_id(self) -> Option<Uuid> {
        match self {
            Self::Customer(id) => Some(id),
            _ => None,
        }
    }

    pub fn supplier_id(self) -> Option<Uuid> {
        match self {
            Self::Supplier(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub organization_id: Uuid,
    pub reference: String,
    pub payment_date: NaiveDate,
    pub amount: Decimal,
    pub currency: String,
    #[sqlx(try_from = "String")]
    pub method: PaymentMethod,
    pub customer_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub account_id: Option<Uuid>,
    pub journal_entry_id: Option<Uuid>,
    pub amount_allocated: Decimal,
    pub created_by: Uuid,
    pub created_utc: DateTime<Utc>,
}

impl Payment {
    pub fn amount_unallocated(&self) -> Decimal {
        self.amount - self.amount_allocated
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentAllocation {
    pub allocation_id: Uuid,
    pub organization_id: Uuid,
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub created_by: Uuid,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub organization_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub payment_date: NaiveDate,
    pub currency: String,
    pub counterparty: Counterparty,
    pub account_id: Option<Uuid>,
}

pub fn payment_reference(sequence: i64) -> String {
    format!("PAY-{:06}", sequence)
}

/// Both sides of an allocation must have room for `amount`.
pub fn check_allocation(
    payment: &Payment,
    invoice_total: Decimal,
    invoice_paid: Decimal,
    amount: Decimal,
) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::Validation(
            "allocation amount must be greater than zero".to_string(),
        ));
    }
    if payment.amount_allocated + amount > payment.amount {
        return Err(LedgerError::OverAllocation(format!(
            "payment {} has {} unallocated, requested {}",
            payment.reference,
            payment.amount_unallocated(),
            amount
        )));
    }
    if invoice_paid + amount > invoice_total {
        return Err(LedgerError::OverAllocation(format!(
            "invoice has {} due, requested {}",
            invoice_total - invoice_paid,
            amount
        )));
    }
    Ok(())
}
