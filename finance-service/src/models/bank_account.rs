//! Bank accounts and their cached balance.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BankAccount {
    pub bank_account_id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub account_number: Option<String>,
    pub iban: Option<String>,
    pub swift: Option<String>,
    pub currency: String,
    /// Projection of posted lines on `gl_account_id`, as of `balance_refreshed_utc`.
    pub balance: Decimal,
    pub gl_account_id: Option<Uuid>,
    pub balance_refreshed_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateBankAccount {
    pub organization_id: Uuid,
    pub name: String,
    pub account_number: Option<String>,
    pub iban: Option<String>,
    pub swift: Option<String>,
    pub currency: String,
    pub gl_account_id: Option<Uuid>,
}
