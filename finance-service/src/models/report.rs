//! Financial statements derived from posted lines.
//!
//! The database layer aggregates posted lines per account into
//! [`AccountActivity`]; everything here is pure arithmetic on those rows.

use crate::error::LedgerError;
use crate::models::account::{Account, AccountType};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Posted debit/credit sums for one account, split at the report start date.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AccountActivity {
    pub account_id: Uuid,
    pub code: String,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub account_type: AccountType,
    pub opening_debit: Decimal,
    pub opening_credit: Decimal,
    pub period_debit: Decimal,
    pub period_credit: Decimal,
}

impl AccountActivity {
    pub fn opening_balance(&self) -> Decimal {
        self.account_type
            .signed_balance(self.opening_debit, self.opening_credit)
    }

    pub fn period_balance(&self) -> Decimal {
        self.account_type
            .signed_balance(self.period_debit, self.period_credit)
    }

    pub fn closing_balance(&self) -> Decimal {
        self.opening_balance() + self.period_balance()
    }

    fn has_period_activity(&self) -> bool {
        !self.period_debit.is_zero() || !self.period_credit.is_zero()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialBalanceRow {
    pub account_id: Uuid,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub opening_balance: Decimal,
    pub debit: Decimal,
    pub credit: Decimal,
    pub balance: Decimal,
    pub closing_balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialBalance {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub currency: String,
    pub rows: Vec<TrialBalanceRow>,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
}

impl TrialBalance {
    /// Rows with period activity or a non-zero closing balance, in input order.
    pub fn build(
        start_date: NaiveDate,
        end_date: NaiveDate,
        currency: String,
        activity: &[AccountActivity],
    ) -> Self {
        let rows: Vec<TrialBalanceRow> = activity
            .iter()
            .filter(|a| a.has_period_activity() || !a.closing_balance().is_zero())
            .map(|a| TrialBalanceRow {
                account_id: a.account_id,
                code: a.code.clone(),
                name: a.name.clone(),
                account_type: a.account_type,
                opening_balance: a.opening_balance(),
                debit: a.period_debit,
                credit: a.period_credit,
                balance: a.period_balance(),
                closing_balance: a.closing_balance(),
            })
            .collect();

        let total_debit = rows.iter().map(|r| r.debit).sum();
        let total_credit = rows.iter().map(|r| r.credit).sum();

        Self {
            start_date,
            end_date,
            currency,
            rows,
            total_debit,
            total_credit,
        }
    }

    pub fn is_balanced(&self) -> bool {
        self.total_debit == self.total_credit
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportLine {
    pub account_id: Uuid,
    pub code: String,
    pub name: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSection {
    pub account_type: AccountType,
    pub lines: Vec<ReportLine>,
    pub total: Decimal,
}

impl ReportSection {
    /// Accounts of `account_type` with a non-zero amount.
    fn collect(
        account_type: AccountType,
        activity: &[AccountActivity],
        amount: impl Fn(&AccountActivity) -> Decimal,
    ) -> Self {
        let lines: Vec<ReportLine> = activity
            .iter()
            .filter(|a| a.account_type == account_type)
            .map(|a| ReportLine {
                account_id: a.account_id,
                code: a.code.clone(),
                name: a.name.clone(),
                amount: amount(a),
            })
            .filter(|line| !line.amount.is_zero())
            .collect();
        let total = lines.iter().map(|l| l.amount).sum();

        Self {
            account_type,
            lines,
            total,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub as_of_date: NaiveDate,
    pub currency: String,
    pub assets: ReportSection,
    pub liabilities: ReportSection,
    pub equity: ReportSection,
    /// Revenue − expenses not yet closed into an equity account.
    pub current_earnings: Decimal,
    pub total_assets: Decimal,
    pub total_liabilities: Decimal,
    /// Equity section plus current earnings.
    pub total_equity: Decimal,
}

impl BalanceSheet {
    /// Build from cumulative activity through `as_of_date`.
    ///
    /// Fails with `IntegrityViolation` when assets differ from liabilities
    /// plus equity; the difference is reported, never rounded away.
    pub fn build(
        as_of_date: NaiveDate,
        currency: String,
        activity: &[AccountActivity],
    ) -> Result<Self, LedgerError> {
        let closing = AccountActivity::closing_balance;
        let assets = ReportSection::collect(AccountType::Asset, activity, closing);
        let liabilities = ReportSection::collect(AccountType::Liability, activity, closing);
        let equity = ReportSection::collect(AccountType::Equity, activity, closing);
        let revenue = ReportSection::collect(AccountType::Revenue, activity, closing);
        let expenses = ReportSection::collect(AccountType::Expense, activity, closing);

        let current_earnings = revenue.total - expenses.total;
        let total_assets = assets.total;
        let total_liabilities = liabilities.total;
        let total_equity = equity.total + current_earnings;

        if total_assets != total_liabilities + total_equity {
            return Err(LedgerError::IntegrityViolation(format!(
                "balance sheet as of {} in {}: assets {} != liabilities {} + equity {}",
                as_of_date, currency, total_assets, total_liabilities, total_equity
            )));
        }

        Ok(Self {
            as_of_date,
            currency,
            assets,
            liabilities,
            equity,
            current_earnings,
            total_assets,
            total_liabilities,
            total_equity,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomeStatement {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub currency: String,
    pub revenue: ReportSection,
    pub expenses: ReportSection,
    pub total_revenue: Decimal,
    pub total_expenses: Decimal,
    pub net_income: Decimal,
}

impl IncomeStatement {
    /// Build from activity inside `[start_date, end_date]`; opening sums are ignored.
    pub fn build(
        start_date: NaiveDate,
        end_date: NaiveDate,
        currency: String,
        activity: &[AccountActivity],
    ) -> Self {
        let period = AccountActivity::period_balance;
        let revenue = ReportSection::collect(AccountType::Revenue, activity, period);
        let expenses = ReportSection::collect(AccountType::Expense, activity, period);
        let total_revenue = revenue.total;
        let total_expenses = expenses.total;

        Self {
            start_date,
            end_date,
            currency,
            revenue,
            expenses,
            total_revenue,
            total_expenses,
            net_income: total_revenue - total_expenses,
        }
    }
}

/// A posted line on one account, as read for a statement.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PostedLine {
    pub entry_id: Uuid,
    pub reference: String,
    pub entry_date: NaiveDate,
    pub label: String,
    pub debit: Decimal,
    pub credit: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementLine {
    pub line: PostedLine,
    pub running_balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountStatement {
    pub account_id: Uuid,
    pub currency: String,
    pub opening_balance: Decimal,
    pub closing_balance: Decimal,
    pub lines: Vec<StatementLine>,
}

impl AccountStatement {
    pub fn build(
        account: &Account,
        opening_debit: Decimal,
        opening_credit: Decimal,
        lines: Vec<PostedLine>,
    ) -> Self {
        let opening_balance = account
            .account_type
            .signed_balance(opening_debit, opening_credit);

        let mut running = opening_balance;
        let lines: Vec<StatementLine> = lines
            .into_iter()
            .map(|line| {
                running += account.account_type.signed_balance(line.debit, line.credit);
                StatementLine {
                    line,
                    running_balance: running,
                }
            })
            .collect();

        Self {
            account_id: account.account_id,
            currency: account.currency.clone(),
            opening_balance,
            closing_balance: running,
            lines,
        }
    }
}
