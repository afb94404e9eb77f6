//! Finance Service - ERP ledger core: chart of accounts, double-entry posting,
//! fiscal calendar, invoices, payment allocation and financial statements.

pub mod config;
pub mod error;
pub mod grpc;
pub mod models;
pub mod services;
pub mod startup;
