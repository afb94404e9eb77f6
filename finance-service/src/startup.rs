//! Application startup and lifecycle management.

use crate::config::FinanceConfig;
use crate::grpc::proto::{
    chart_of_accounts_service_server::ChartOfAccountsServiceServer,
    fiscal_calendar_service_server::FiscalCalendarServiceServer,
    invoice_service_server::InvoiceServiceServer, payment_service_server::PaymentServiceServer,
    posting_service_server::PostingServiceServer, reporting_service_server::ReportingServiceServer,
    FILE_DESCRIPTOR_SET,
};
use crate::grpc::{
    ChartOfAccountsServiceImpl, FiscalCalendarServiceImpl, InvoiceServiceImpl, PaymentServiceImpl,
    PostingServiceImpl, ReportingServiceImpl,
};
use crate::services::{get_metrics, init_metrics, Database};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use service_core::error::AppError;
use service_core::grpc::trace_context_interceptor;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tonic::transport::Server as GrpcServer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// State for health check endpoints.
#[derive(Clone)]
struct HealthState {
    db: Arc<Database>,
}

/// Liveness probe; fails when PostgreSQL is unreachable.
async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": "finance-service",
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "finance-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

async fn readiness_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Prometheus scrape endpoint.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    grpc_port: u16,
    http_listener: TcpListener,
    grpc_listener: TcpListener,
    db: Arc<Database>,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: FinanceConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: FinanceConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: FinanceConfig, run_migrations: bool) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        let grpc_addr = SocketAddr::from(([0, 0, 0, 0], config.common.grpc_port()));
        let grpc_listener = TcpListener::bind(grpc_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %grpc_addr, "Failed to bind gRPC listener");
            AppError::from(e)
        })?;
        let grpc_port = grpc_listener.local_addr()?.port();

        tracing::info!(
            http_port = http_port,
            grpc_port = grpc_port,
            "Finance service listeners bound"
        );

        Ok(Self {
            http_port,
            grpc_port,
            http_listener,
            grpc_listener,
            db: Arc::new(db),
        })
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn grpc_port(&self) -> u16 {
        self.grpc_port
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Serve the HTTP side port and every gRPC service until either fails.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let health_state = HealthState {
            db: self.db.clone(),
        };

        let http_router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(health_state);

        let (mut health_reporter, grpc_health_service) = tonic_health::server::health_reporter();
        health_reporter
            .set_serving::<ChartOfAccountsServiceServer<ChartOfAccountsServiceImpl>>()
            .await;
        health_reporter
            .set_serving::<FiscalCalendarServiceServer<FiscalCalendarServiceImpl>>()
            .await;
        health_reporter
            .set_serving::<PostingServiceServer<PostingServiceImpl>>()
            .await;
        health_reporter
            .set_serving::<InvoiceServiceServer<InvoiceServiceImpl>>()
            .await;
        health_reporter
            .set_serving::<PaymentServiceServer<PaymentServiceImpl>>()
            .await;
        health_reporter
            .set_serving::<ReportingServiceServer<ReportingServiceImpl>>()
            .await;

        let reflection_service = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
            .build_v1()
            .map_err(|e| {
                std::io::Error::other(format!("Failed to build reflection service: {}", e))
            })?;

        let grpc_trace_layer = TraceLayer::new_for_grpc()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::DEBUG));

        // W3C trace context is propagated into every ledger service.
        let db = &self.db;
        let chart_of_accounts = ChartOfAccountsServiceServer::with_interceptor(
            ChartOfAccountsServiceImpl::new(db.clone()),
            trace_context_interceptor,
        );
        let fiscal_calendar = FiscalCalendarServiceServer::with_interceptor(
            FiscalCalendarServiceImpl::new(db.clone()),
            trace_context_interceptor,
        );
        let posting = PostingServiceServer::with_interceptor(
            PostingServiceImpl::new(db.clone()),
            trace_context_interceptor,
        );
        let invoices = InvoiceServiceServer::with_interceptor(
            InvoiceServiceImpl::new(db.clone()),
            trace_context_interceptor,
        );
        let payments = PaymentServiceServer::with_interceptor(
            PaymentServiceImpl::new(db.clone()),
            trace_context_interceptor,
        );
        let reporting = ReportingServiceServer::with_interceptor(
            ReportingServiceImpl::new(db.clone()),
            trace_context_interceptor,
        );

        let incoming = tokio_stream::wrappers::TcpListenerStream::new(self.grpc_listener);
        let grpc_server = GrpcServer::builder()
            .layer(grpc_trace_layer)
            .add_service(grpc_health_service)
            .add_service(reflection_service)
            .add_service(chart_of_accounts)
            .add_service(fiscal_calendar)
            .add_service(posting)
            .add_service(invoices)
            .add_service(payments)
            .add_service(reporting)
            .serve_with_incoming(incoming);

        tracing::info!(
            service = "finance-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            grpc_port = self.grpc_port,
            "Service ready to accept connections"
        );

        tokio::select! {
            result = axum::serve(self.http_listener, http_router) => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "HTTP server error");
                    return Err(std::io::Error::other(format!("HTTP server error: {}", e)));
                }
            }
            result = grpc_server => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "gRPC server error");
                    return Err(std::io::Error::other(format!("gRPC server error: {}", e)));
                }
            }
        }

        Ok(())
    }
}
