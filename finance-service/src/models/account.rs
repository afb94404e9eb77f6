//! Chart of accounts.

use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Account types following standard accounting categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountType {
    /// Convert from proto enum value.
    pub fn from_proto(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Asset),
            2 => Some(Self::Liability),
            3 => Some(Self::Equity),
            4 => Some(Self::Revenue),
            5 => Some(Self::Expense),
            _ => None,
        }
    }

    /// Convert to proto enum value.
    pub fn to_proto(self) -> i32 {
        match self {
            Self::Asset => 1,
            Self::Liability => 2,
            Self::Equity => 3,
            Self::Revenue => 4,
            Self::Expense => 5,
        }
    }

    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Liability => "liability",
            Self::Equity => "equity",
            Self::Revenue => "revenue",
            Self::Expense => "expense",
        }
    }

    /// Asset and expense accounts carry a debit balance.
    pub fn is_debit_normal(self) -> bool {
        matches!(self, Self::Asset | Self::Expense)
    }

    /// Balance under the normal-sign convention: debit − credit for
    /// asset/expense, credit − debit for liability/equity/revenue.
    pub fn signed_balance(self, debit: Decimal, credit: Decimal) -> Decimal {
        if self.is_debit_normal() {
            debit - credit
        } else {
            credit - debit
        }
    }
}

impl TryFrom<String> for AccountType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "asset" => Ok(Self::Asset),
            "liability" => Ok(Self::Liability),
            "equity" => Ok(Self::Equity),
            "revenue" => Ok(Self::Revenue),
            "expense" => Ok(Self::Expense),
            other => Err(format!("unknown account type '{}'", other)),
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ledger account.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub account_id: Uuid,
    pub organization_id: Uuid,
    pub code: String,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub account_type: AccountType,
    pub parent_id: Option<Uuid>,
    pub currency: String,
    pub active: bool,
    pub system: bool,
    pub enforce_non_negative: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a new account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccount {
    pub organization_id: Uuid,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub parent_id: Option<Uuid>,
    pub currency: String,
    pub system: bool,
    pub enforce_non_negative: bool,
}

/// Check that `parent` may become the parent of an account with the given
/// type and currency.
///
/// `account_id` is `None` for an account being created. `parent_ancestors`
/// lists every ancestor of `parent`; a cycle exists when the account itself
/// appears among them.
pub fn validate_parent(
    account_id: Option<Uuid>,
    account_type: AccountType,
    currency: &str,
    parent: &Account,
    parent_ancestors: &[Uuid],
) -> Result<(), LedgerError> {
    if parent.account_type != account_type {
        return Err(LedgerError::InvalidParent(format!(
            "parent {} is of type {}, expected {}",
            parent.code, parent.account_type, account_type
        )));
    }
    if parent.currency != currency {
        return Err(LedgerError::InvalidParent(format!(
            "parent {} is in {}, expected {}",
            parent.code, parent.currency, currency
        )));
    }
    if let Some(id) = account_id {
        if parent.account_id == id || parent_ancestors.contains(&id) {
            return Err(LedgerError::InvalidParent(format!(
                "parent {} would create a cycle",
                parent.code
            )));
        }
    }
    Ok(())
}
