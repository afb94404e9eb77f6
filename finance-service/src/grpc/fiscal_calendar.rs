//! gRPC service implementation for FiscalCalendarService.

use crate::grpc::convert::{parse_date, parse_uuid};
use crate::grpc::observe;
use crate::grpc::proto::*;
use crate::services::Database;
use std::sync::Arc;
use tonic::{Request, Response, Status};

pub struct FiscalCalendarServiceImpl {
    db: Arc<Database>,
}

impl FiscalCalendarServiceImpl {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[tonic::async_trait]
impl fiscal_calendar_service_server::FiscalCalendarService for FiscalCalendarServiceImpl {
    async fn open_year(
        &self,
        request: Request<OpenYearRequest>,
    ) -> Result<Response<FiscalYearResponse>, Status> {
        let req = request.into_inner();
        observe("OpenYear", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let actor_id = parse_uuid("actor_id", &req.actor_id)?;
            let start_date = parse_date("start_date", &req.start_date)?;
            let end_date = parse_date("end_date", &req.end_date)?;
            tracing::info!(
                organization_id = %organization_id,
                actor_id = %actor_id,
                name = %req.name,
                "Opening fiscal year"
            );

            let year = self
                .db
                .open_year(organization_id, &req.name, start_date, end_date)
                .await?;
            Ok(FiscalYearResponse {
                fiscal_year: Some(year.into()),
            })
        })
        .await
    }

    async fn close_year(
        &self,
        request: Request<CloseYearRequest>,
    ) -> Result<Response<FiscalYearResponse>, Status> {
        let req = request.into_inner();
        observe("CloseYear", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let actor_id = parse_uuid("actor_id", &req.actor_id)?;
            let fiscal_year_id = parse_uuid("fiscal_year_id", &req.fiscal_year_id)?;

            let year = self
                .db
                .close_year(organization_id, fiscal_year_id, actor_id)
                .await?;
            Ok(FiscalYearResponse {
                fiscal_year: Some(year.into()),
            })
        })
        .await
    }

    async fn get_year(
        &self,
        request: Request<GetYearRequest>,
    ) -> Result<Response<FiscalYearResponse>, Status> {
        let req = request.into_inner();
        observe("GetYear", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let fiscal_year_id = parse_uuid("fiscal_year_id", &req.fiscal_year_id)?;

            let year = self.db.get_year(organization_id, fiscal_year_id).await?;
            Ok(FiscalYearResponse {
                fiscal_year: Some(year.into()),
            })
        })
        .await
    }

    async fn list_years(
        &self,
        request: Request<ListYearsRequest>,
    ) -> Result<Response<ListYearsResponse>, Status> {
        let req = request.into_inner();
        observe("ListYears", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;

            let years = self.db.list_years(organization_id).await?;
            Ok(ListYearsResponse {
                fiscal_years: years.into_iter().map(Into::into).collect(),
            })
        })
        .await
    }

    async fn is_date_open(
        &self,
        request: Request<IsDateOpenRequest>,
    ) -> Result<Response<IsDateOpenResponse>, Status> {
        let req = request.into_inner();
        observe("IsDateOpen", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let date = parse_date("date", &req.date)?;

            let (open, fiscal_year_id) = self.db.is_date_open(organization_id, date).await?;
            Ok(IsDateOpenResponse {
                open,
                fiscal_year_id: fiscal_year_id.map(|id| id.to_string()).unwrap_or_default(),
            })
        })
        .await
    }
}
