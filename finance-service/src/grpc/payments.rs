//! gRPC service implementation for PaymentService.

use crate::error::LedgerError;
use crate::grpc::convert::{parse_date, parse_decimal, parse_optional_uuid, parse_uuid};
use crate::grpc::proto::*;
use crate::grpc::{next_page_token, observe};
use crate::models::{self, Counterparty, NewPayment};
use crate::services::Database;
use std::sync::Arc;
use tonic::{Request, Response, Status};

pub struct PaymentServiceImpl {
    db: Arc<Database>,
}

impl PaymentServiceImpl {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[tonic::async_trait]
impl payment_service_server::PaymentService for PaymentServiceImpl {
    async fn record_payment(
        &self,
        request: Request<RecordPaymentRequest>,
    ) -> Result<Response<PaymentResponse>, Status> {
        let req = request.into_inner();
        observe("RecordPayment", async move {
            let actor_id = parse_uuid("actor_id", &req.actor_id)?;
            let method = models::PaymentMethod::from_proto(req.method)
                .ok_or_else(|| LedgerError::Validation("method is required".to_string()))?;
            let input = NewPayment {
                organization_id: parse_uuid("organization_id", &req.organization_id)?,
                amount: parse_decimal("amount", &req.amount)?,
                method,
                payment_date: parse_date("date", &req.date)?,
                currency: req.currency,
                counterparty: Counterparty::from_ids(
                    parse_optional_uuid("customer_id", &req.customer_id)?,
                    parse_optional_uuid("supplier_id", &req.supplier_id)?,
                )?,
                account_id: parse_optional_uuid("account_id", &req.account_id)?,
            };

            let payment = self.db.record_payment(&input, actor_id).await?;
            Ok(PaymentResponse {
                payment: Some(payment.into()),
            })
        })
        .await
    }

    async fn allocate(
        &self,
        request: Request<AllocateRequest>,
    ) -> Result<Response<AllocateResponse>, Status> {
        let req = request.into_inner();
        observe("Allocate", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let actor_id = parse_uuid("actor_id", &req.actor_id)?;
            let payment_id = parse_uuid("payment_id", &req.payment_id)?;
            let invoice_id = parse_uuid("invoice_id", &req.invoice_id)?;
            let amount = parse_decimal("amount", &req.amount)?;

            let (allocation, payment, invoice) = self
                .db
                .allocate(organization_id, payment_id, invoice_id, amount, actor_id)
                .await?;
            Ok(AllocateResponse {
                allocation: Some(allocation.into()),
                payment: Some(payment.into()),
                invoice: Some(invoice.into()),
            })
        })
        .await
    }

    async fn unallocate(
        &self,
        request: Request<UnallocateRequest>,
    ) -> Result<Response<UnallocateResponse>, Status> {
        let req = request.into_inner();
        observe("Unallocate", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let actor_id = parse_uuid("actor_id", &req.actor_id)?;
            let allocation_id = parse_uuid("allocation_id", &req.allocation_id)?;
            tracing::info!(actor_id = %actor_id, allocation_id = %allocation_id, "Removing allocation");

            let (payment, invoice) = self.db.unallocate(organization_id, allocation_id).await?;
            Ok(UnallocateResponse {
                payment: Some(payment.into()),
                invoice: Some(invoice.into()),
            })
        })
        .await
    }

    async fn get_payment(
        &self,
        request: Request<GetPaymentRequest>,
    ) -> Result<Response<PaymentResponse>, Status> {
        let req = request.into_inner();
        observe("GetPayment", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let payment_id = parse_uuid("payment_id", &req.payment_id)?;

            let payment = self.db.get_payment(organization_id, payment_id).await?;
            Ok(PaymentResponse {
                payment: Some(payment.into()),
            })
        })
        .await
    }

    async fn list_payments(
        &self,
        request: Request<ListPaymentsRequest>,
    ) -> Result<Response<ListPaymentsResponse>, Status> {
        let req = request.into_inner();
        observe("ListPayments", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;

            let payments = self
                .db
                .list_payments(
                    organization_id,
                    parse_optional_uuid("customer_id", &req.customer_id)?,
                    parse_optional_uuid("supplier_id", &req.supplier_id)?,
                    req.page_size,
                    parse_optional_uuid("page_token", &req.page_token)?,
                )
                .await?;

            let next_page_token =
                next_page_token(&payments, req.page_size, |p| p.payment_id.to_string());
            Ok(ListPaymentsResponse {
                payments: payments.into_iter().map(Into::into).collect(),
                next_page_token,
            })
        })
        .await
    }

    async fn list_allocations(
        &self,
        request: Request<ListAllocationsRequest>,
    ) -> Result<Response<ListAllocationsResponse>, Status> {
        let req = request.into_inner();
        observe("ListAllocations", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;

            let allocations = self
                .db
                .list_allocations(
                    organization_id,
                    parse_optional_uuid("payment_id", &req.payment_id)?,
                    parse_optional_uuid("invoice_id", &req.invoice_id)?,
                )
                .await?;
            Ok(ListAllocationsResponse {
                allocations: allocations.into_iter().map(Into::into).collect(),
            })
        })
        .await
    }

    async fn link_payment_entry(
        &self,
        request: Request<LinkPaymentEntryRequest>,
    ) -> Result<Response<PaymentResponse>, Status> {
        let req = request.into_inner();
        observe("LinkPaymentEntry", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let actor_id = parse_uuid("actor_id", &req.actor_id)?;
            let payment_id = parse_uuid("payment_id", &req.payment_id)?;
            let entry_id = parse_uuid("entry_id", &req.entry_id)?;
            tracing::info!(
                actor_id = %actor_id,
                payment_id = %payment_id,
                entry_id = %entry_id,
                "Linking payment to journal entry"
            );

            let payment = self
                .db
                .link_payment_entry(organization_id, payment_id, entry_id)
                .await?;
            Ok(PaymentResponse {
                payment: Some(payment.into()),
            })
        })
        .await
    }
}
