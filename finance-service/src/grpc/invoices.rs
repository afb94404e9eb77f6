//! gRPC service implementation for InvoiceService.

use crate::error::LedgerError;
use crate::grpc::convert::{
    customer_snapshot, invoice_line_input, parse_date, parse_decimal, parse_optional_date,
    parse_optional_uuid, parse_uuid,
};
use crate::grpc::proto::*;
use crate::grpc::{next_page_token, observe};
use crate::models::{self, ActiveFilter, ListInvoicesFilter, NewInvoice};
use crate::services::Database;
use std::sync::Arc;
use tonic::{Request, Response, Status};
use uuid::Uuid;

pub struct InvoiceServiceImpl {
    db: Arc<Database>,
}

impl InvoiceServiceImpl {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

fn invoice_action(req: &InvoiceActionRequest) -> Result<(Uuid, Uuid), LedgerError> {
    let organization_id = parse_uuid("organization_id", &req.organization_id)?;
    let actor_id = parse_uuid("actor_id", &req.actor_id)?;
    let invoice_id = parse_uuid("invoice_id", &req.invoice_id)?;
    tracing::info!(actor_id = %actor_id, invoice_id = %invoice_id, "Invoice action");
    Ok((organization_id, invoice_id))
}

#[tonic::async_trait]
impl invoice_service_server::InvoiceService for InvoiceServiceImpl {
    // =========================================================================
    // Invoices
    // =========================================================================

    async fn create_invoice(
        &self,
        request: Request<CreateInvoiceRequest>,
    ) -> Result<Response<InvoiceResponse>, Status> {
        let req = request.into_inner();
        observe("CreateInvoice", async move {
            let actor_id = parse_uuid("actor_id", &req.actor_id)?;
            let input = NewInvoice {
                organization_id: parse_uuid("organization_id", &req.organization_id)?,
                customer: customer_snapshot(req.customer)?,
                invoice_date: parse_date("date", &req.date)?,
                due_date: parse_date("due_date", &req.due_date)?,
                currency: req.currency,
                lines: req
                    .lines
                    .into_iter()
                    .map(invoice_line_input)
                    .collect::<Result<_, _>>()?,
            };

            let invoice = self.db.create_invoice(&input, actor_id).await?;
            Ok(InvoiceResponse {
                invoice: Some(invoice.into()),
            })
        })
        .await
    }

    async fn send_invoice(
        &self,
        request: Request<InvoiceActionRequest>,
    ) -> Result<Response<InvoiceResponse>, Status> {
        let req = request.into_inner();
        observe("SendInvoice", async move {
            let (organization_id, invoice_id) = invoice_action(&req)?;

            let invoice = self.db.send_invoice(organization_id, invoice_id).await?;
            Ok(InvoiceResponse {
                invoice: Some(invoice.into()),
            })
        })
        .await
    }

    async fn cancel_invoice(
        &self,
        request: Request<InvoiceActionRequest>,
    ) -> Result<Response<InvoiceResponse>, Status> {
        let req = request.into_inner();
        observe("CancelInvoice", async move {
            let (organization_id, invoice_id) = invoice_action(&req)?;

            let invoice = self.db.cancel_invoice(organization_id, invoice_id).await?;
            Ok(InvoiceResponse {
                invoice: Some(invoice.into()),
            })
        })
        .await
    }

    async fn get_invoice(
        &self,
        request: Request<GetInvoiceRequest>,
    ) -> Result<Response<InvoiceResponse>, Status> {
        let req = request.into_inner();
        observe("GetInvoice", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let invoice_id = parse_uuid("invoice_id", &req.invoice_id)?;

            let invoice = self.db.get_invoice(organization_id, invoice_id).await?;
            Ok(InvoiceResponse {
                invoice: Some(invoice.into()),
            })
        })
        .await
    }

    async fn list_invoices(
        &self,
        request: Request<ListInvoicesRequest>,
    ) -> Result<Response<ListInvoicesResponse>, Status> {
        let req = request.into_inner();
        observe("ListInvoices", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let filter = ListInvoicesFilter {
                status: models::InvoiceStatus::from_proto(req.status),
                customer_id: parse_optional_uuid("customer_id", &req.customer_id)?,
                start_date: parse_optional_date("start_date", &req.start_date)?,
                end_date: parse_optional_date("end_date", &req.end_date)?,
                page_size: req.page_size,
                page_token: parse_optional_uuid("page_token", &req.page_token)?,
            };

            let invoices = self.db.list_invoices(organization_id, &filter).await?;
            let next_page_token =
                next_page_token(&invoices, req.page_size, |i| i.invoice_id.to_string());
            Ok(ListInvoicesResponse {
                invoices: invoices.into_iter().map(Into::into).collect(),
                next_page_token,
            })
        })
        .await
    }

    async fn link_invoice_entry(
        &self,
        request: Request<LinkInvoiceEntryRequest>,
    ) -> Result<Response<InvoiceResponse>, Status> {
        let req = request.into_inner();
        observe("LinkInvoiceEntry", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let actor_id = parse_uuid("actor_id", &req.actor_id)?;
            let invoice_id = parse_uuid("invoice_id", &req.invoice_id)?;
            let entry_id = parse_uuid("entry_id", &req.entry_id)?;
            tracing::info!(
                actor_id = %actor_id,
                invoice_id = %invoice_id,
                entry_id = %entry_id,
                "Linking invoice to journal entry"
            );

            let invoice = self
                .db
                .link_invoice_entry(organization_id, invoice_id, entry_id)
                .await?;
            Ok(InvoiceResponse {
                invoice: Some(invoice.into()),
            })
        })
        .await
    }

    // =========================================================================
    // Tax rates
    // =========================================================================

    async fn create_tax_rate(
        &self,
        request: Request<CreateTaxRateRequest>,
    ) -> Result<Response<TaxRateResponse>, Status> {
        let req = request.into_inner();
        observe("CreateTaxRate", async move {
            let actor_id = parse_uuid("actor_id", &req.actor_id)?;
            let tax_type = models::TaxType::from_proto(req.tax_type)
                .ok_or_else(|| LedgerError::Validation("tax_type is required".to_string()))?;
            let input = models::CreateTaxRate {
                organization_id: parse_uuid("organization_id", &req.organization_id)?,
                name: req.name,
                code: req.code,
                rate: parse_decimal("rate", &req.rate)?,
                tax_type,
                account_id: parse_optional_uuid("account_id", &req.account_id)?,
            };
            tracing::info!(actor_id = %actor_id, code = %input.code, "Creating tax rate");

            let tax_rate = self.db.create_tax_rate(&input).await?;
            Ok(TaxRateResponse {
                tax_rate: Some(tax_rate.into()),
            })
        })
        .await
    }

    async fn list_tax_rates(
        &self,
        request: Request<ListTaxRatesRequest>,
    ) -> Result<Response<ListTaxRatesResponse>, Status> {
        let req = request.into_inner();
        observe("ListTaxRates", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;

            let tax_rates = self
                .db
                .list_tax_rates(
                    organization_id,
                    models::TaxType::from_proto(req.tax_type),
                    ActiveFilter::from_proto(req.active_filter),
                )
                .await?;
            Ok(ListTaxRatesResponse {
                tax_rates: tax_rates.into_iter().map(Into::into).collect(),
            })
        })
        .await
    }

    async fn deactivate_tax_rate(
        &self,
        request: Request<DeactivateTaxRateRequest>,
    ) -> Result<Response<TaxRateResponse>, Status> {
        let req = request.into_inner();
        observe("DeactivateTaxRate", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let actor_id = parse_uuid("actor_id", &req.actor_id)?;
            let tax_rate_id = parse_uuid("tax_rate_id", &req.tax_rate_id)?;
            tracing::info!(actor_id = %actor_id, tax_rate_id = %tax_rate_id, "Deactivating tax rate");

            let tax_rate = self
                .db
                .deactivate_tax_rate(organization_id, tax_rate_id)
                .await?;
            Ok(TaxRateResponse {
                tax_rate: Some(tax_rate.into()),
            })
        })
        .await
    }
}
