//! gRPC module for finance-service.

mod chart_of_accounts;
pub(crate) mod convert;
mod fiscal_calendar;
mod invoices;
mod payments;
mod posting;
mod reporting;

pub mod proto {
    tonic::include_proto!("erp.finance.v1");

    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("finance_descriptor");
}

pub use chart_of_accounts::ChartOfAccountsServiceImpl;
pub use fiscal_calendar::FiscalCalendarServiceImpl;
pub use invoices::InvoiceServiceImpl;
pub use payments::PaymentServiceImpl;
pub use posting::PostingServiceImpl;
pub use reporting::ReportingServiceImpl;

use crate::error::LedgerResult;
use crate::services::database::page_limit;
use crate::services::metrics::{GRPC_REQUESTS_TOTAL, GRPC_REQUEST_DURATION};
use std::future::Future;
use tonic::{Response, Status};
use tracing::Instrument;

/// Run one RPC body inside a span named after the method: time it, count it
/// by outcome, and turn a domain error into its status.
pub(crate) async fn observe<T>(
    method: &'static str,
    call: impl Future<Output = LedgerResult<T>>,
) -> Result<Response<T>, Status> {
    let timer = GRPC_REQUEST_DURATION
        .with_label_values(&[method])
        .start_timer();
    let result = call
        .instrument(tracing::info_span!("grpc", method))
        .await;
    timer.observe_duration();

    match result {
        Ok(body) => {
            GRPC_REQUESTS_TOTAL.with_label_values(&[method, "ok"]).inc();
            Ok(Response::new(body))
        }
        Err(err) => {
            GRPC_REQUESTS_TOTAL
                .with_label_values(&[method, err.metric_label()])
                .inc();
            tracing::warn!(method, code = err.code(), error = %err, "Request failed");
            Err(err.into())
        }
    }
}

/// Cursor for the next page: the last item's key when the page came back full.
pub(crate) fn next_page_token<T>(
    items: &[T],
    page_size: i32,
    key: impl Fn(&T) -> String,
) -> String {
    match items.last() {
        Some(last) if items.len() as i64 == page_limit(page_size) => key(last),
        _ => String::new(),
    }
}
