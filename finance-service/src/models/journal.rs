//! Journals classify entries (sales, purchases, bank, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalType {
    General,
    Sales,
    Purchase,
    Bank,
    Cash,
}

impl JournalType {
    pub fn from_proto(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::General),
            2 => Some(Self::Sales),
            3 => Some(Self::Purchase),
            4 => Some(Self::Bank),
            5 => Some(Self::Cash),
            _ => None,
        }
    }

    pub fn to_proto(self) -> i32 {
        match self {
            Self::General => 1,
            Self::Sales => 2,
            Self::Purchase => 3,
            Self::Bank => 4,
            Self::Cash => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Sales => "sales",
            Self::Purchase => "purchase",
            Self::Bank => "bank",
            Self::Cash => "cash",
        }
    }
}

impl TryFrom<String> for JournalType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "general" => Ok(Self::General),
            "sales" => Ok(Self::Sales),
            "purchase" => Ok(Self::Purchase),
            "bank" => Ok(Self::Bank),
            "cash" => Ok(Self::Cash),
            other => Err(format!("unknown journal type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Journal {
    pub journal_id: Uuid,
    pub organization_id: Uuid,
    pub code: String,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub journal_type: JournalType,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
}

impl Journal {
    /// Sequence feeding this journal's entry references.
    pub fn sequence_name(&self) -> String {
        format!("journal:{}", self.journal_id)
    }

    /// Entry reference for the n-th entry of the journal, e.g. `SAL-000042`.
    pub fn entry_reference(&self, number: i64) -> String {
        format!("{}-{:06}", self.code, number)
    }
}
