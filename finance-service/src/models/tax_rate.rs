//! Tax rates referenced by invoice lines.

use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxType {
    Sales,
    Purchase,
    Both,
}

impl TaxType {
    pub fn from_proto(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Sales),
            2 => Some(Self::Purchase),
            3 => Some(Self::Both),
            _ => None,
        }
    }

    pub fn to_proto(self) -> i32 {
        match self {
            Self::Sales => 1,
            Self::Purchase => 2,
            Self::Both => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sales => "sales",
            Self::Purchase => "purchase",
            Self::Both => "both",
        }
    }

    pub fn applies_to_sales(self) -> bool {
        matches!(self, Self::Sales | Self::Both)
    }
}

impl TryFrom<String> for TaxType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "sales" => Ok(Self::Sales),
            "purchase" => Ok(Self::Purchase),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown tax type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TaxRate {
    pub tax_rate_id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub code: String,
    /// Percentage, e.g. `20` for 20 %.
    pub rate: Decimal,
    #[sqlx(try_from = "String")]
    pub tax_type: TaxType,
    pub account_id: Option<Uuid>,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaxRate {
    pub organization_id: Uuid,
    pub name: String,
    pub code: String,
    pub rate: Decimal,
    pub tax_type: TaxType,
    pub account_id: Option<Uuid>,
}

pub fn validate_rate(rate: Decimal) -> Result<(), LedgerError> {
    if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
        return Err(LedgerError::Validation(format!(
            "tax rate {} must be between 0 and 100",
            rate
        )));
    }
    Ok(())
}
