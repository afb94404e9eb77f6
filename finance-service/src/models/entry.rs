//! Journal entries and their lines.

use crate::error::LedgerError;
use crate::models::account::Account;
use crate::models::currency::{fits_minor_units, minor_units, round_minor};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Draft,
    Posted,
    Cancelled,
}

impl EntryStatus {
    pub fn from_proto(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Draft),
            2 => Some(Self::Posted),
            3 => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn to_proto(self) -> i32 {
        match self {
            Self::Draft => 1,
            Self::Posted => 2,
            Self::Cancelled => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Posted => "posted",
            Self::Cancelled => "cancelled",
        }
    }
}

impl TryFrom<String> for EntryStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "draft" => Ok(Self::Draft),
            "posted" => Ok(Self::Posted),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown entry status '{}'", other)),
        }
    }
}

/// Journal entry header. `lines` is filled separately, in position order.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JournalEntry {
    pub entry_id: Uuid,
    pub organization_id: Uuid,
    pub journal_id: Uuid,
    pub reference: String,
    pub entry_date: NaiveDate,
    pub description: String,
    pub currency: String,
    #[sqlx(try_from = "String")]
    pub status: EntryStatus,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub created_by: Uuid,
    pub created_utc: DateTime<Utc>,
    pub posted_by: Option<Uuid>,
    pub posted_utc: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Uuid>,
    pub cancelled_utc: Option<DateTime<Utc>>,
    pub reversal_of: Option<Uuid>,
    pub reversed_by: Option<Uuid>,
    pub idempotency_key: Option<String>,
    #[sqlx(skip)]
    pub lines: Vec<JournalEntryLine>,
}

impl JournalEntry {
    /// A reversed original is `cancelled` but was posted, so its lines still
    /// count in the ledger alongside the reversal.
    pub fn was_posted(&self) -> bool {
        self.posted_utc.is_some()
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JournalEntryLine {
    pub line_id: Uuid,
    pub entry_id: Uuid,
    pub organization_id: Uuid,
    pub account_id: Uuid,
    pub label: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub position: i32,
    pub reconciled: bool,
    pub reconciled_utc: Option<DateTime<Utc>>,
}

/// A line as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryLineInput {
    pub account_id: Uuid,
    pub label: String,
    pub debit: Decimal,
    pub credit: Decimal,
}

/// Input for creating a draft (or posting directly through the posting surface).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntry {
    pub organization_id: Uuid,
    pub journal_id: Uuid,
    pub entry_date: NaiveDate,
    pub description: String,
    pub currency: String,
    pub lines: Vec<EntryLineInput>,
    pub idempotency_key: Option<String>,
}

/// Filters for listing entries; every field is optional.
#[derive(Debug, Clone, Default)]
pub struct ListEntriesFilter {
    pub journal_id: Option<Uuid>,
    pub status: Option<EntryStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

pub trait LineAmounts {
    fn debit(&self) -> Decimal;
    fn credit(&self) -> Decimal;
}

impl LineAmounts for JournalEntryLine {
    fn debit(&self) -> Decimal {
        self.debit
    }
    fn credit(&self) -> Decimal {
        self.credit
    }
}

impl LineAmounts for EntryLineInput {
    fn debit(&self) -> Decimal {
        self.debit
    }
    fn credit(&self) -> Decimal {
        self.credit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryTotals {
    pub debit: Decimal,
    pub credit: Decimal,
}

impl EntryTotals {
    pub fn of<'a, L: LineAmounts + 'a>(lines: impl IntoIterator<Item = &'a L>) -> Self {
        lines.into_iter().fold(Self::default(), |acc, line| Self {
            debit: acc.debit + line.debit(),
            credit: acc.credit + line.credit(),
        })
    }
}

/// Check one line's amounts: both non-negative, exactly one side non-zero,
/// and no more precision than the currency's minor unit.
///
/// `position` is 1-based and only used in the error message.
pub fn validate_line_amounts(
    position: usize,
    line: &impl LineAmounts,
    currency: &str,
) -> Result<(), LedgerError> {
    let (debit, credit) = (line.debit(), line.credit());
    if debit < Decimal::ZERO || credit < Decimal::ZERO {
        return Err(LedgerError::InvalidLine(format!(
            "line {}: amounts must not be negative",
            position
        )));
    }
    if debit.is_zero() == credit.is_zero() {
        return Err(LedgerError::InvalidLine(format!(
            "line {}: exactly one of debit or credit must be non-zero",
            position
        )));
    }
    if !fits_minor_units(debit, currency) || !fits_minor_units(credit, currency) {
        return Err(LedgerError::InvalidLine(format!(
            "line {}: {} allows at most {} decimal places",
            position,
            currency,
            minor_units(currency)
        )));
    }
    Ok(())
}

/// Check a line's account: it must be active and in the entry's currency.
pub fn validate_line_account(
    position: usize,
    account: Option<&Account>,
    account_id: Uuid,
    currency: &str,
) -> Result<(), LedgerError> {
    let account = account.ok_or_else(|| {
        LedgerError::InvalidLine(format!("line {}: account {} does not exist", position, account_id))
    })?;
    if !account.active {
        return Err(LedgerError::InvalidLine(format!(
            "line {}: account {} is inactive",
            position, account.code
        )));
    }
    if account.currency != currency {
        return Err(LedgerError::InvalidLine(format!(
            "line {}: account {} is in {}, entry is in {}",
            position, account.code, account.currency, currency
        )));
    }
    Ok(())
}

/// Totals of a postable entry: at least two lines, non-zero, and debit equal
/// to credit at the currency's minor-unit precision.
pub fn check_balanced<L: LineAmounts>(lines: &[L], currency: &str) -> Result<EntryTotals, LedgerError> {
    let totals = EntryTotals::of(lines);
    let debit = round_minor(totals.debit, currency);
    let credit = round_minor(totals.credit, currency);

    if lines.len() < 2 || debit.is_zero() || debit != credit {
        return Err(LedgerError::UnbalancedEntry {
            debit: totals.debit,
            credit: totals.credit,
        });
    }
    Ok(totals)
}

/// Compensating lines: same accounts and labels, sides swapped.
pub fn reversal_lines(lines: &[JournalEntryLine]) -> Vec<EntryLineInput> {
    lines
        .iter()
        .map(|line| EntryLineInput {
            account_id: line.account_id,
            label: line.label.clone(),
            debit: line.credit,
            credit: line.debit,
        })
        .collect()
}

/// Net debit and credit per account, ordered by account id (the lock order).
pub fn account_movements<L: LineAmounts + HasAccount>(lines: &[L]) -> BTreeMap<Uuid, EntryTotals> {
    let mut movements: BTreeMap<Uuid, EntryTotals> = BTreeMap::new();
    for line in lines {
        let totals = movements.entry(line.account_id()).or_default();
        totals.debit += line.debit();
        totals.credit += line.credit();
    }
    movements
}

pub trait HasAccount {
    fn account_id(&self) -> Uuid;
}

impl HasAccount for JournalEntryLine {
    fn account_id(&self) -> Uuid {
        self.account_id
    }
}

impl HasAccount for EntryLineInput {
    fn account_id(&self) -> Uuid {
        self.account_id
    }
}

/// Reject a movement that would take a non-negative account below zero
/// under its normal-sign convention.
pub fn check_non_negative(
    account: &Account,
    posted: EntryTotals,
    movement: EntryTotals,
) -> Result<(), LedgerError> {
    if !account.enforce_non_negative {
        return Ok(());
    }
    let current = account.account_type.signed_balance(posted.debit, posted.credit);
    let projected = current + account.account_type.signed_balance(movement.debit, movement.credit);
    if projected < Decimal::ZERO {
        return Err(LedgerError::InsufficientBalance(format!(
            "account {} balance {} would become {}",
            account.code, current, projected
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::account::AccountType;
    use rust_decimal_macros::dec;

    fn input(debit: Decimal, credit: Decimal) -> EntryLineInput {
        EntryLineInput {
            account_id: Uuid::new_v4(),
            label: String::new(),
            debit,
            credit,
        }
    }

    fn account(account_type: AccountType, enforce_non_negative: bool) -> Account {
        Account {
            account_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            code: "512000".to_string(),
            name: "Bank".to_string(),
            account_type,
            parent_id: None,
            currency: "EUR".to_string(),
            active: true,
            system: false,
            enforce_non_negative,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    #[test]
    fn line_needs_exactly_one_side() {
        assert!(validate_line_amounts(1, &input(dec!(10), dec!(0)), "EUR").is_ok());
        assert!(validate_line_amounts(1, &input(dec!(0), dec!(10)), "EUR").is_ok());

        let err = validate_line_amounts(2, &input(dec!(10), dec!(10)), "EUR").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidLine(msg) if msg.starts_with("line 2")));
        assert!(validate_line_amounts(1, &input(dec!(0), dec!(0)), "EUR").is_err());
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let err = validate_line_amounts(1, &input(dec!(-5), dec!(0)), "EUR").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidLine(_)));
    }

    #[test]
    fn excess_precision_is_rejected() {
        assert!(validate_line_amounts(1, &input(dec!(10.001), dec!(0)), "EUR").is_err());
        assert!(validate_line_amounts(1, &input(dec!(10.001), dec!(0)), "KWD").is_ok());
        assert!(validate_line_amounts(1, &input(dec!(100.5), dec!(0)), "JPY").is_err());
    }

    #[test]
    fn inactive_or_foreign_currency_account_is_invalid_line() {
        let mut acc = account(AccountType::Asset, false);
        assert!(validate_line_account(1, Some(&acc), acc.account_id, "EUR").is_ok());
        assert!(validate_line_account(1, Some(&acc), acc.account_id, "USD").is_err());
        assert!(validate_line_account(1, None, acc.account_id, "EUR").is_err());

        acc.active = false;
        assert!(validate_line_account(1, Some(&acc), acc.account_id, "EUR").is_err());
    }

    #[test]
    fn balanced_entry_returns_totals() {
        let lines = vec![input(dec!(1000), dec!(0)), input(dec!(0), dec!(1000))];
        let totals = check_balanced(&lines, "EUR").unwrap();
        assert_eq!(totals.debit, dec!(1000));
        assert_eq!(totals.credit, dec!(1000));
    }

    #[test]
    fn unbalanced_single_and_zero_entries_are_rejected() {
        let unbalanced = vec![input(dec!(100), dec!(0)), input(dec!(0), dec!(90))];
        assert!(matches!(
            check_balanced(&unbalanced, "EUR"),
            Err(LedgerError::UnbalancedEntry { debit, credit }) if debit == dec!(100) && credit == dec!(90)
        ));

        let single = vec![input(dec!(100), dec!(0))];
        assert!(check_balanced(&single, "EUR").is_err());

        let empty: Vec<EntryLineInput> = Vec::new();
        assert!(check_balanced(&empty, "EUR").is_err());
    }

    #[test]
    fn reversal_swaps_sides() {
        let original = JournalEntryLine {
            line_id: Uuid::new_v4(),
            entry_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            label: "Sale".to_string(),
            debit: dec!(250.00),
            credit: dec!(0),
            position: 1,
            reconciled: false,
            reconciled_utc: None,
        };
        let reversed = reversal_lines(&[original.clone()]);
        assert_eq!(reversed.len(), 1);
        assert_eq!(reversed[0].account_id, original.account_id);
        assert_eq!(reversed[0].debit, dec!(0));
        assert_eq!(reversed[0].credit, dec!(250.00));
        assert_eq!(reversed[0].label, "Sale");
    }

    #[test]
    fn movements_are_netted_per_account() {
        let a = Uuid::new_v4();
        let lines = vec![
            EntryLineInput { account_id: a, label: String::new(), debit: dec!(10), credit: dec!(0) },
            EntryLineInput { account_id: a, label: String::new(), debit: dec!(5), credit: dec!(0) },
            input(dec!(0), dec!(15)),
        ];
        let movements = account_movements(&lines);
        assert_eq!(movements.len(), 2);
        assert_eq!(movements[&a].debit, dec!(15));
    }

    #[test]
    fn non_negative_accounts_cannot_go_below_zero() {
        let bank = account(AccountType::Asset, true);
        let posted = EntryTotals { debit: dec!(100), credit: dec!(0) };

        let ok = EntryTotals { debit: dec!(0), credit: dec!(100) };
        assert!(check_non_negative(&bank, posted, ok).is_ok());

        let overdraw = EntryTotals { debit: dec!(0), credit: dec!(100.01) };
        assert!(matches!(
            check_non_negative(&bank, posted, overdraw),
            Err(LedgerError::InsufficientBalance(_))
        ));

        let unrestricted = account(AccountType::Asset, false);
        assert!(check_non_negative(&unrestricted, posted, overdraw).is_ok());
    }

    #[test]
    fn non_negative_respects_credit_normal_accounts() {
        let payable = account(AccountType::Liability, true);
        let posted = EntryTotals { debit: dec!(0), credit: dec!(50) };
        let settle = EntryTotals { debit: dec!(60), credit: dec!(0) };
        assert!(check_non_negative(&payable, posted, settle).is_err());
    }
}
