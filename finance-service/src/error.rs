//! Domain errors for finance-service.
//!
//! Every variant carries a stable code (see [`LedgerError::code`]) that
//! prefixes the gRPC status message, e.g. `UNBALANCED_ENTRY: debit 100 != credit 90`.
//!
//! | Class | Variants | gRPC Status |
//! |-------|----------|-------------|
//! | Validation | `Validation`, `InvalidLine`, `EmptyInvoice`, `InvalidQuantity`, `InvalidParent` | `INVALID_ARGUMENT` |
//! | Validation | `DuplicateCode` | `ALREADY_EXISTS` |
//! | Invariant / state | everything else below | `FAILED_PRECONDITION` |
//! | Lookup | `NotFound` | `NOT_FOUND` |
//! | Integrity | `IntegrityViolation` | `DATA_LOSS` |
//! | Storage | `Storage` | `INTERNAL` |

use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use service_core::grpc::IntoStatus;
use thiserror::Error;
use tonic::Status;

#[derive(Debug, Error)]
pub enum LedgerError {
    // ----- Validation -----
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvalidLine(String),

    #[error("invoice must have at least one line")]
    EmptyInvoice,

    #[error("quantity must be greater than zero (line {line})")]
    InvalidQuantity { line: usize },

    #[error("code '{0}' already exists")]
    DuplicateCode(String),

    #[error("{0}")]
    InvalidParent(String),

    // ----- Invariant protection -----
    #[error("debit {debit} != credit {credit}")]
    UnbalancedEntry { debit: Decimal, credit: Decimal },

    #[error("{0}")]
    OverAllocation(String),

    #[error("no open fiscal year covers {0}")]
    PeriodClosed(NaiveDate),

    #[error("period overlaps fiscal year '{0}'")]
    OverlappingPeriod(String),

    #[error("{0} draft entries are dated inside the fiscal year")]
    OpenEntriesExist(i64),

    #[error("currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch { expected: String, found: String },

    #[error("{0}")]
    InsufficientBalance(String),

    // ----- State -----
    #[error("{0} is not a draft")]
    NotDraft(String),

    #[error("entry {0} is not posted")]
    NotPosted(uuid::Uuid),

    #[error("invoice {0} has payments allocated")]
    HasPayments(uuid::Uuid),

    #[error("account {0} is referenced and cannot be deleted")]
    AccountInUse(uuid::Uuid),

    #[error("journal {0} has entries and cannot be deleted")]
    JournalInUse(uuid::Uuid),

    #[error("account {0} is a system account")]
    SystemAccount(uuid::Uuid),

    #[error("{0}")]
    InvoiceAlreadyClosed(String),

    #[error("cannot {action} an invoice in status {status}")]
    InvalidTransition {
        action: &'static str,
        status: String,
    },

    #[error("fiscal year {0} is already closed")]
    AlreadyClosed(uuid::Uuid),

    #[error("journal {0} is inactive")]
    InactiveJournal(uuid::Uuid),

    // ----- Lookup -----
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    // ----- Integrity -----
    #[error("{0}")]
    IntegrityViolation(String),

    // ----- Storage -----
    #[error(transparent)]
    Storage(#[from] AppError),
}

impl LedgerError {
    pub fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        LedgerError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "VALIDATION",
            LedgerError::InvalidLine(_) => "INVALID_LINE",
            LedgerError::EmptyInvoice => "EMPTY_INVOICE",
            LedgerError::InvalidQuantity { .. } => "INVALID_QUANTITY",
            LedgerError::DuplicateCode(_) => "DUPLICATE_CODE",
            LedgerError::InvalidParent(_) => "INVALID_PARENT",
            LedgerError::UnbalancedEntry { .. } => "UNBALANCED_ENTRY",
            LedgerError::OverAllocation(_) => "OVER_ALLOCATION",
            LedgerError::PeriodClosed(_) => "PERIOD_CLOSED",
            LedgerError::OverlappingPeriod(_) => "OVERLAPPING_PERIOD",
            LedgerError::OpenEntriesExist(_) => "OPEN_ENTRIES_EXIST",
            LedgerError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            LedgerError::InsufficientBalance(_) => "INSUFFICIENT_BALANCE",
            LedgerError::NotDraft(_) => "NOT_DRAFT",
            LedgerError::NotPosted(_) => "NOT_POSTED",
            LedgerError::HasPayments(_) => "HAS_PAYMENTS",
            LedgerError::AccountInUse(_) => "ACCOUNT_IN_USE",
            LedgerError::JournalInUse(_) => "JOURNAL_IN_USE",
            LedgerError::SystemAccount(_) => "SYSTEM_ACCOUNT",
            LedgerError::InvoiceAlreadyClosed(_) => "INVOICE_ALREADY_CLOSED",
            LedgerError::InvalidTransition { .. } => "INVALID_TRANSITION",
            LedgerError::AlreadyClosed(_) => "ALREADY_CLOSED",
            LedgerError::InactiveJournal(_) => "INACTIVE_JOURNAL",
            LedgerError::NotFound { .. } => "NOT_FOUND",
            LedgerError::IntegrityViolation(_) => "INTEGRITY_VIOLATION",
            LedgerError::Storage(_) => "STORAGE",
        }
    }

    /// Label used for the `status` dimension of request metrics.
    pub fn metric_label(&self) -> &'static str {
        match self {
            LedgerError::Validation(_)
            | LedgerError::InvalidLine(_)
            | LedgerError::EmptyInvoice
            | LedgerError::InvalidQuantity { .. }
            | LedgerError::InvalidParent(_) => "invalid_argument",
            LedgerError::DuplicateCode(_) => "already_exists",
            LedgerError::NotFound { .. } => "not_found",
            LedgerError::IntegrityViolation(_) => "data_loss",
            LedgerError::Storage(_) => "internal",
            _ => "failed_precondition",
        }
    }
}

impl From<LedgerError> for Status {
    fn from(err: LedgerError) -> Self {
        let message = format!("{}: {}", err.code(), err);
        match err {
            LedgerError::Storage(app) => app.into_status(),
            LedgerError::DuplicateCode(_) => Status::already_exists(message),
            LedgerError::NotFound { .. } => Status::not_found(message),
            LedgerError::IntegrityViolation(_) => {
                tracing::error!(error = %message, "Ledger integrity violation");
                Status::data_loss(message)
            }
            LedgerError::Validation(_)
            | LedgerError::InvalidLine(_)
            | LedgerError::EmptyInvoice
            | LedgerError::InvalidQuantity { .. }
            | LedgerError::InvalidParent(_) => Status::invalid_argument(message),
            _ => Status::failed_precondition(message),
        }
    }
}

/// Map a sqlx failure into a storage error tagged with the failing operation.
pub(crate) fn db_err(context: &'static str) -> impl Fn(sqlx::Error) -> LedgerError {
    move |e| LedgerError::Storage(AppError::database(context, e))
}

pub type LedgerResult<T> = Result<T, LedgerError>;
