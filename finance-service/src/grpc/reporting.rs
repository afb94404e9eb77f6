//! gRPC service implementation for ReportingService.

use crate::grpc::convert::{parse_date, parse_uuid};
use crate::grpc::observe;
use crate::grpc::proto::*;
use crate::services::Database;
use std::sync::Arc;
use tonic::{Request, Response, Status};

pub struct ReportingServiceImpl {
    db: Arc<Database>,
}

impl ReportingServiceImpl {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[tonic::async_trait]
impl reporting_service_server::ReportingService for ReportingServiceImpl {
    async fn trial_balance(
        &self,
        request: Request<TrialBalanceRequest>,
    ) -> Result<Response<TrialBalanceResponse>, Status> {
        let req = request.into_inner();
        observe("TrialBalance", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let start_date = parse_date("start_date", &req.start_date)?;
            let end_date = parse_date("end_date", &req.end_date)?;

            let report = self
                .db
                .trial_balance(organization_id, start_date, end_date, &req.currency)
                .await?;
            Ok(report.into())
        })
        .await
    }

    async fn balance_sheet(
        &self,
        request: Request<BalanceSheetRequest>,
    ) -> Result<Response<BalanceSheetResponse>, Status> {
        let req = request.into_inner();
        observe("BalanceSheet", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let as_of_date = parse_date("as_of_date", &req.as_of_date)?;

            let report = self
                .db
                .balance_sheet(organization_id, as_of_date, &req.currency)
                .await?;
            Ok(report.into())
        })
        .await
    }

    async fn income_statement(
        &self,
        request: Request<IncomeStatementRequest>,
    ) -> Result<Response<IncomeStatementResponse>, Status> {
        let req = request.into_inner();
        observe("IncomeStatement", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let start_date = parse_date("start_date", &req.start_date)?;
            let end_date = parse_date("end_date", &req.end_date)?;

            let report = self
                .db
                .income_statement(organization_id, start_date, end_date, &req.currency)
                .await?;
            Ok(report.into())
        })
        .await
    }

    async fn account_statement(
        &self,
        request: Request<AccountStatementRequest>,
    ) -> Result<Response<AccountStatementResponse>, Status> {
        let req = request.into_inner();
        observe("AccountStatement", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let account_id = parse_uuid("account_id", &req.account_id)?;
            let start_date = parse_date("start_date", &req.start_date)?;
            let end_date = parse_date("end_date", &req.end_date)?;

            let statement = self
                .db
                .account_statement(organization_id, account_id, start_date, end_date)
                .await?;
            Ok(statement.into())
        })
        .await
    }
}
