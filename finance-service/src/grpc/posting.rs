//! gRPC service implementation for PostingService.

use crate::error::LedgerError;
use crate::grpc::convert::{
    entry_line_input, optional_text, parse_date, parse_optional_date, parse_optional_uuid,
    parse_uuid,
};
use crate::grpc::proto::*;
use crate::grpc::{next_page_token, observe};
use crate::models::{self, ListEntriesFilter, NewEntry};
use crate::services::Database;
use std::sync::Arc;
use tonic::{Request, Response, Status};
use uuid::Uuid;

pub struct PostingServiceImpl {
    db: Arc<Database>,
}

impl PostingServiceImpl {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

/// Header and lines shared by draft creation and direct posting.
fn new_entry(
    organization_id: &str,
    journal_id: &str,
    date: &str,
    description: String,
    currency: String,
    lines: Vec<EntryLineInput>,
    idempotency_key: Option<String>,
) -> Result<NewEntry, LedgerError> {
    Ok(NewEntry {
        organization_id: parse_uuid("organization_id", organization_id)?,
        journal_id: parse_uuid("journal_id", journal_id)?,
        entry_date: parse_date("date", date)?,
        description,
        currency,
        lines: lines
            .into_iter()
            .map(entry_line_input)
            .collect::<Result<_, _>>()?,
        idempotency_key,
    })
}

fn entry_action(req: &EntryActionRequest) -> Result<(Uuid, Uuid, Uuid), LedgerError> {
    Ok((
        parse_uuid("organization_id", &req.organization_id)?,
        parse_uuid("entry_id", &req.entry_id)?,
        parse_uuid("actor_id", &req.actor_id)?,
    ))
}

#[tonic::async_trait]
impl posting_service_server::PostingService for PostingServiceImpl {
    // =========================================================================
    // Drafts
    // =========================================================================

    async fn create_draft_entry(
        &self,
        request: Request<CreateDraftEntryRequest>,
    ) -> Result<Response<EntryResponse>, Status> {
        let req = request.into_inner();
        observe("CreateDraftEntry", async move {
            let actor_id = parse_uuid("actor_id", &req.actor_id)?;
            let entry = new_entry(
                &req.organization_id,
                &req.journal_id,
                &req.date,
                req.description,
                req.currency,
                req.lines,
                None,
            )?;

            let entry = self.db.create_draft_entry(&entry, actor_id).await?;
            Ok(EntryResponse {
                entry: Some(entry.into()),
            })
        })
        .await
    }

    async fn add_draft_line(
        &self,
        request: Request<AddDraftLineRequest>,
    ) -> Result<Response<EntryResponse>, Status> {
        let req = request.into_inner();
        observe("AddDraftLine", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let actor_id = parse_uuid("actor_id", &req.actor_id)?;
            let entry_id = parse_uuid("entry_id", &req.entry_id)?;
            let line = req
                .line
                .ok_or_else(|| LedgerError::Validation("line is required".to_string()))
                .and_then(entry_line_input)?;
            tracing::info!(actor_id = %actor_id, entry_id = %entry_id, "Adding draft line");

            let entry = self
                .db
                .add_draft_line(organization_id, entry_id, &line)
                .await?;
            Ok(EntryResponse {
                entry: Some(entry.into()),
            })
        })
        .await
    }

    async fn remove_draft_line(
        &self,
        request: Request<RemoveDraftLineRequest>,
    ) -> Result<Response<EntryResponse>, Status> {
        let req = request.into_inner();
        observe("RemoveDraftLine", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let actor_id = parse_uuid("actor_id", &req.actor_id)?;
            let entry_id = parse_uuid("entry_id", &req.entry_id)?;
            let line_id = parse_uuid("line_id", &req.line_id)?;
            tracing::info!(actor_id = %actor_id, entry_id = %entry_id, line_id = %line_id, "Removing draft line");

            let entry = self
                .db
                .remove_draft_line(organization_id, entry_id, line_id)
                .await?;
            Ok(EntryResponse {
                entry: Some(entry.into()),
            })
        })
        .await
    }

    async fn cancel_draft(
        &self,
        request: Request<EntryActionRequest>,
    ) -> Result<Response<EntryResponse>, Status> {
        let req = request.into_inner();
        observe("CancelDraft", async move {
            let (organization_id, entry_id, actor_id) = entry_action(&req)?;

            let entry = self
                .db
                .cancel_draft(organization_id, entry_id, actor_id)
                .await?;
            Ok(EntryResponse {
                entry: Some(entry.into()),
            })
        })
        .await
    }

    // =========================================================================
    // Posting
    // =========================================================================

    async fn post_entry(
        &self,
        request: Request<EntryActionRequest>,
    ) -> Result<Response<EntryResponse>, Status> {
        let req = request.into_inner();
        observe("PostEntry", async move {
            let (organization_id, entry_id, actor_id) = entry_action(&req)?;

            let entry = self
                .db
                .post_entry(organization_id, entry_id, actor_id)
                .await?;
            Ok(EntryResponse {
                entry: Some(entry.into()),
            })
        })
        .await
    }

    async fn post_journal_entry(
        &self,
        request: Request<PostJournalEntryRequest>,
    ) -> Result<Response<EntryResponse>, Status> {
        let req = request.into_inner();
        observe("PostJournalEntry", async move {
            let actor_id = parse_uuid("actor_id", &req.actor_id)?;
            let entry = new_entry(
                &req.organization_id,
                &req.journal_id,
                &req.date,
                req.description,
                req.currency,
                req.lines,
                optional_text(req.idempotency_key),
            )?;

            let entry = self.db.post_journal_entry(&entry, actor_id).await?;
            Ok(EntryResponse {
                entry: Some(entry.into()),
            })
        })
        .await
    }

    async fn reverse_entry(
        &self,
        request: Request<ReverseEntryRequest>,
    ) -> Result<Response<ReverseEntryResponse>, Status> {
        let req = request.into_inner();
        observe("ReverseEntry", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let actor_id = parse_uuid("actor_id", &req.actor_id)?;
            let entry_id = parse_uuid("entry_id", &req.entry_id)?;
            let reversal_date = parse_date("reversal_date", &req.reversal_date)?;
            let description = optional_text(req.description);

            let (original, reversal) = self
                .db
                .reverse_entry(
                    organization_id,
                    entry_id,
                    reversal_date,
                    description.as_deref(),
                    actor_id,
                )
                .await?;
            Ok(ReverseEntryResponse {
                original: Some(original.into()),
                reversal: Some(reversal.into()),
            })
        })
        .await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    async fn get_entry(
        &self,
        request: Request<GetEntryRequest>,
    ) -> Result<Response<EntryResponse>, Status> {
        let req = request.into_inner();
        observe("GetEntry", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let entry_id = parse_uuid("entry_id", &req.entry_id)?;

            let entry = self.db.get_entry(organization_id, entry_id).await?;
            Ok(EntryResponse {
                entry: Some(entry.into()),
            })
        })
        .await
    }

    async fn list_entries(
        &self,
        request: Request<ListEntriesRequest>,
    ) -> Result<Response<ListEntriesResponse>, Status> {
        let req = request.into_inner();
        observe("ListEntries", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let filter = ListEntriesFilter {
                journal_id: parse_optional_uuid("journal_id", &req.journal_id)?,
                status: models::EntryStatus::from_proto(req.status),
                start_date: parse_optional_date("start_date", &req.start_date)?,
                end_date: parse_optional_date("end_date", &req.end_date)?,
                page_size: req.page_size,
                page_token: parse_optional_uuid("page_token", &req.page_token)?,
            };

            let entries = self.db.list_entries(organization_id, &filter).await?;
            let next_page_token =
                next_page_token(&entries, req.page_size, |e| e.entry_id.to_string());
            Ok(ListEntriesResponse {
                entries: entries.into_iter().map(Into::into).collect(),
                next_page_token,
            })
        })
        .await
    }

    async fn reconcile_line(
        &self,
        request: Request<ReconcileLineRequest>,
    ) -> Result<Response<ReconcileLineResponse>, Status> {
        let req = request.into_inner();
        observe("ReconcileLine", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let actor_id = parse_uuid("actor_id", &req.actor_id)?;
            let line_id = parse_uuid("line_id", &req.line_id)?;
            tracing::info!(
                actor_id = %actor_id,
                line_id = %line_id,
                reconciled = req.reconciled,
                "Setting line reconciliation"
            );

            let line = self
                .db
                .reconcile_line(organization_id, line_id, req.reconciled)
                .await?;
            Ok(ReconcileLineResponse {
                line: Some(line.into()),
            })
        })
        .await
    }
}
