//! Domain models for finance-service.

mod account;
mod bank_account;
pub mod currency;
mod entry;
mod fiscal_year;
mod invoice;
mod journal;
mod payment;
mod report;
mod tax_rate;

pub use account::{validate_parent, Account, AccountType, CreateAccount};
pub use bank_account::{BankAccount, CreateBankAccount};
pub use entry::{
    account_movements, check_balanced, check_non_negative, reversal_lines, validate_line_account,
    validate_line_amounts, EntryLineInput, EntryStatus, EntryTotals, JournalEntry,
    JournalEntryLine, ListEntriesFilter, NewEntry,
};
pub use fiscal_year::{validate_new_year, FiscalYear, FiscalYearStatus};
pub use invoice::{
    invoice_number, payment_status, price_line, validate_dates, CustomerSnapshot, Invoice,
    InvoiceLine, InvoiceLineInput, InvoiceStatus, InvoiceTotals, ListInvoicesFilter, NewInvoice,
    PricedLine, Settlement,
};
pub use journal::{Journal, JournalType};
pub use payment::{
    check_allocation, payment_reference, Counterparty, NewPayment, Payment, PaymentAllocation,
    PaymentMethod,
};
pub use report::{
    AccountActivity, AccountStatement, BalanceSheet, IncomeStatement, PostedLine, ReportLine,
    ReportSection, StatementLine, TrialBalance, TrialBalanceRow,
};
pub use tax_rate::{validate_rate, CreateTaxRate, TaxRate, TaxType};

/// Three-state filter on an `active` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveFilter {
    #[default]
    Any,
    Active,
    Inactive,
}

impl ActiveFilter {
    pub fn from_proto(value: i32) -> Self {
        match value {
            1 => Self::Active,
            2 => Self::Inactive,
            _ => Self::Any,
        }
    }

    /// Value bound to `($n::boolean IS NULL OR active = $n)`.
    pub fn as_flag(self) -> Option<bool> {
        match self {
            Self::Any => None,
            Self::Active => Some(true),
            Self::Inactive => Some(false),
        }
    }
}
