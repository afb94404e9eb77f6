//! Services module for finance-service.
//!
//! Each ledger component is an `impl Database` block in its own module.

pub mod bank_accounts;
pub mod chart_of_accounts;
pub mod database;
pub mod fiscal_calendar;
pub mod invoice_lifecycle;
pub mod journal_registry;
pub mod ledger_poster;
pub mod ledger_reporter;
pub mod metrics;
pub mod payment_allocator;
pub mod tax_rates;

pub use database::Database;
pub use metrics::{get_metrics, init_metrics};
