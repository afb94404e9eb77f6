//! Fiscal years gate which dates accept postings.

use crate::error::LedgerError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FiscalYearStatus {
    Open,
    Closed,
}

impl FiscalYearStatus {
    pub fn to_proto(self) -> i32 {
        match self {
            Self::Open => 1,
            Self::Closed => 2,
        }
    }
}

impl TryFrom<String> for FiscalYearStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(format!("unknown fiscal year status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FiscalYear {
    pub fiscal_year_id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[sqlx(try_from = "String")]
    pub status: FiscalYearStatus,
    pub closed_by: Option<Uuid>,
    pub closed_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl FiscalYear {
    pub fn is_open(&self) -> bool {
        self.status == FiscalYearStatus::Open
    }

    /// Inclusive on both ends.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    /// Whether the inclusive range `[start, end]` intersects this year.
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        start <= self.end_date && self.start_date <= end
    }
}

/// Validate a new fiscal year against the organization's existing years.
pub fn validate_new_year(
    start: NaiveDate,
    end: NaiveDate,
    existing: &[FiscalYear],
) -> Result<(), LedgerError> {
    if start > end {
        return Err(LedgerError::Validation(format!(
            "start date {} is after end date {}",
            start, end
        )));
    }
    if let Some(year) = existing.iter().find(|y| y.overlaps(start, end)) {
        return Err(LedgerError::OverlappingPeriod(year.name.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn year(name: &str, start: &str, end: &str) -> FiscalYear {
        FiscalYear {
            fiscal_year_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            name: name.to_string(),
            start_date: date(start),
            end_date: date(end),
            status: FiscalYearStatus::Open,
            closed_by: None,
            closed_utc: None,
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn bounds_are_inclusive() {
        let fy = year("FY2026", "2026-01-01", "2026-12-31");
        assert!(fy.contains(date("2026-01-01")));
        assert!(fy.contains(date("2026-12-31")));
        assert!(!fy.contains(date("2027-01-01")));
        assert!(!fy.contains(date("2025-12-31")));
    }

    #[test]
    fn touching_ranges_overlap_adjacent_ranges_do_not() {
        let existing = vec![year("FY2026", "2026-01-01", "2026-12-31")];

        let err = validate_new_year(date("2026-12-31"), date("2027-12-31"), &existing).unwrap_err();
        assert!(matches!(err, LedgerError::OverlappingPeriod(name) if name == "FY2026"));

        assert!(validate_new_year(date("2027-01-01"), date("2027-12-31"), &existing).is_ok());
        assert!(validate_new_year(date("2025-01-01"), date("2025-12-31"), &existing).is_ok());
    }

    #[test]
    fn enclosing_range_overlaps() {
        let existing = vec![year("H1", "2026-01-01", "2026-06-30")];
        assert!(validate_new_year(date("2025-07-01"), date("2027-06-30"), &existing).is_err());
    }

    #[test]
    fn start_after_end_is_rejected() {
        let err = validate_new_year(date("2026-12-31"), date("2026-01-01"), &[]).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn single_day_year_is_allowed() {
        assert!(validate_new_year(date("2026-01-01"), date("2026-01-01"), &[]).is_ok());
    }
}
