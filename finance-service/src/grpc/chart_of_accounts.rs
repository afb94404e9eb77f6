//! gRPC service implementation for ChartOfAccountsService.
//!
//! Accounts, journals and bank accounts.

use crate::error::LedgerError;
use crate::grpc::convert::{optional_text, parse_optional_uuid, parse_uuid};
use crate::grpc::proto::*;
use crate::grpc::{next_page_token, observe};
use crate::models::{self, ActiveFilter};
use crate::services::Database;
use std::sync::Arc;
use tonic::{Request, Response, Status};

pub struct ChartOfAccountsServiceImpl {
    db: Arc<Database>,
}

impl ChartOfAccountsServiceImpl {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[tonic::async_trait]
impl chart_of_accounts_service_server::ChartOfAccountsService for ChartOfAccountsServiceImpl {
    // =========================================================================
    // Accounts
    // =========================================================================

    async fn create_account(
        &self,
        request: Request<CreateAccountRequest>,
    ) -> Result<Response<AccountResponse>, Status> {
        let req = request.into_inner();
        observe("CreateAccount", async move {
            let actor_id = parse_uuid("actor_id", &req.actor_id)?;
            let account_type = models::AccountType::from_proto(req.account_type)
                .ok_or_else(|| LedgerError::Validation("account_type is required".to_string()))?;
            let input = models::CreateAccount {
                organization_id: parse_uuid("organization_id", &req.organization_id)?,
                code: req.code,
                name: req.name,
                account_type,
                parent_id: parse_optional_uuid("parent_id", &req.parent_id)?,
                currency: req.currency,
                system: req.system,
                enforce_non_negative: req.enforce_non_negative,
            };
            tracing::info!(
                organization_id = %input.organization_id,
                actor_id = %actor_id,
                code = %input.code,
                "Creating account"
            );

            let account = self.db.create_account(&input).await?;
            Ok(AccountResponse {
                account: Some(account.into()),
            })
        })
        .await
    }

    async fn get_account(
        &self,
        request: Request<GetAccountRequest>,
    ) -> Result<Response<AccountResponse>, Status> {
        let req = request.into_inner();
        observe("GetAccount", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let account_id = parse_uuid("account_id", &req.account_id)?;

            let account = self.db.get_account(organization_id, account_id).await?;
            Ok(AccountResponse {
                account: Some(account.into()),
            })
        })
        .await
    }

    async fn list_accounts(
        &self,
        request: Request<ListAccountsRequest>,
    ) -> Result<Response<ListAccountsResponse>, Status> {
        let req = request.into_inner();
        observe("ListAccounts", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let page_token = optional_text(req.page_token);

            let accounts = self
                .db
                .list_accounts(
                    organization_id,
                    models::AccountType::from_proto(req.account_type),
                    ActiveFilter::from_proto(req.active_filter),
                    req.page_size,
                    page_token.as_deref(),
                )
                .await?;

            let next_page_token = next_page_token(&accounts, req.page_size, |a| a.code.clone());
            Ok(ListAccountsResponse {
                accounts: accounts.into_iter().map(Into::into).collect(),
                next_page_token,
            })
        })
        .await
    }

    async fn rename_account(
        &self,
        request: Request<RenameAccountRequest>,
    ) -> Result<Response<AccountResponse>, Status> {
        let req = request.into_inner();
        observe("RenameAccount", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let actor_id = parse_uuid("actor_id", &req.actor_id)?;
            let account_id = parse_uuid("account_id", &req.account_id)?;
            tracing::info!(actor_id = %actor_id, account_id = %account_id, "Renaming account");

            let account = self
                .db
                .rename_account(organization_id, account_id, &req.name)
                .await?;
            Ok(AccountResponse {
                account: Some(account.into()),
            })
        })
        .await
    }

    async fn set_account_parent(
        &self,
        request: Request<SetAccountParentRequest>,
    ) -> Result<Response<AccountResponse>, Status> {
        let req = request.into_inner();
        observe("SetAccountParent", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let actor_id = parse_uuid("actor_id", &req.actor_id)?;
            let account_id = parse_uuid("account_id", &req.account_id)?;
            let parent_id = parse_optional_uuid("parent_id", &req.parent_id)?;
            tracing::info!(
                actor_id = %actor_id,
                account_id = %account_id,
                parent_id = ?parent_id,
                "Moving account"
            );

            let account = self
                .db
                .set_account_parent(organization_id, account_id, parent_id)
                .await?;
            Ok(AccountResponse {
                account: Some(account.into()),
            })
        })
        .await
    }

    async fn deactivate_account(
        &self,
        request: Request<AccountIdRequest>,
    ) -> Result<Response<AccountResponse>, Status> {
        let req = request.into_inner();
        observe("DeactivateAccount", async move {
            let (organization_id, account_id) = account_ids(&req)?;
            let account = self.db.deactivate_account(organization_id, account_id).await?;
            Ok(AccountResponse {
                account: Some(account.into()),
            })
        })
        .await
    }

    async fn reactivate_account(
        &self,
        request: Request<AccountIdRequest>,
    ) -> Result<Response<AccountResponse>, Status> {
        let req = request.into_inner();
        observe("ReactivateAccount", async move {
            let (organization_id, account_id) = account_ids(&req)?;
            let account = self.db.reactivate_account(organization_id, account_id).await?;
            Ok(AccountResponse {
                account: Some(account.into()),
            })
        })
        .await
    }

    async fn delete_account(
        &self,
        request: Request<AccountIdRequest>,
    ) -> Result<Response<DeleteResponse>, Status> {
        let req = request.into_inner();
        observe("DeleteAccount", async move {
            let (organization_id, account_id) = account_ids(&req)?;
            self.db.delete_account(organization_id, account_id).await?;
            Ok(DeleteResponse {})
        })
        .await
    }

    // =========================================================================
    // Journals
    // =========================================================================

    async fn create_journal(
        &self,
        request: Request<CreateJournalRequest>,
    ) -> Result<Response<JournalResponse>, Status> {
        let req = request.into_inner();
        observe("CreateJournal", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let actor_id = parse_uuid("actor_id", &req.actor_id)?;
            let journal_type = models::JournalType::from_proto(req.journal_type)
                .ok_or_else(|| LedgerError::Validation("journal_type is required".to_string()))?;
            tracing::info!(actor_id = %actor_id, code = %req.code, "Creating journal");

            let journal = self
                .db
                .create_journal(organization_id, &req.code, &req.name, journal_type)
                .await?;
            Ok(JournalResponse {
                journal: Some(journal.into()),
            })
        })
        .await
    }

    async fn get_journal(
        &self,
        request: Request<JournalIdRequest>,
    ) -> Result<Response<JournalResponse>, Status> {
        let req = request.into_inner();
        observe("GetJournal", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let journal_id = parse_uuid("journal_id", &req.journal_id)?;

            let journal = self.db.get_journal(organization_id, journal_id).await?;
            Ok(JournalResponse {
                journal: Some(journal.into()),
            })
        })
        .await
    }

    async fn list_journals(
        &self,
        request: Request<ListJournalsRequest>,
    ) -> Result<Response<ListJournalsResponse>, Status> {
        let req = request.into_inner();
        observe("ListJournals", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;

            let journals = self
                .db
                .list_journals(
                    organization_id,
                    models::JournalType::from_proto(req.journal_type),
                    ActiveFilter::from_proto(req.active_filter),
                )
                .await?;
            Ok(ListJournalsResponse {
                journals: journals.into_iter().map(Into::into).collect(),
            })
        })
        .await
    }

    async fn deactivate_journal(
        &self,
        request: Request<JournalIdRequest>,
    ) -> Result<Response<JournalResponse>, Status> {
        let req = request.into_inner();
        observe("DeactivateJournal", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let journal_id = parse_uuid("journal_id", &req.journal_id)?;

            let journal = self.db.deactivate_journal(organization_id, journal_id).await?;
            Ok(JournalResponse {
                journal: Some(journal.into()),
            })
        })
        .await
    }

    async fn delete_journal(
        &self,
        request: Request<JournalIdRequest>,
    ) -> Result<Response<DeleteResponse>, Status> {
        let req = request.into_inner();
        observe("DeleteJournal", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let journal_id = parse_uuid("journal_id", &req.journal_id)?;

            self.db.delete_journal(organization_id, journal_id).await?;
            Ok(DeleteResponse {})
        })
        .await
    }

    // =========================================================================
    // Bank accounts
    // =========================================================================

    async fn create_bank_account(
        &self,
        request: Request<CreateBankAccountRequest>,
    ) -> Result<Response<BankAccountResponse>, Status> {
        let req = request.into_inner();
        observe("CreateBankAccount", async move {
            let actor_id = parse_uuid("actor_id", &req.actor_id)?;
            let input = models::CreateBankAccount {
                organization_id: parse_uuid("organization_id", &req.organization_id)?,
                name: req.name,
                account_number: optional_text(req.account_number),
                iban: optional_text(req.iban),
                swift: optional_text(req.swift),
                currency: req.currency,
                gl_account_id: parse_optional_uuid("gl_account_id", &req.gl_account_id)?,
            };
            tracing::info!(actor_id = %actor_id, name = %input.name, "Creating bank account");

            let bank_account = self.db.create_bank_account(&input).await?;
            Ok(BankAccountResponse {
                bank_account: Some(bank_account.into()),
            })
        })
        .await
    }

    async fn list_bank_accounts(
        &self,
        request: Request<ListBankAccountsRequest>,
    ) -> Result<Response<ListBankAccountsResponse>, Status> {
        let req = request.into_inner();
        observe("ListBankAccounts", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;

            let bank_accounts = self.db.list_bank_accounts(organization_id).await?;
            Ok(ListBankAccountsResponse {
                bank_accounts: bank_accounts.into_iter().map(Into::into).collect(),
            })
        })
        .await
    }

    async fn refresh_bank_balance(
        &self,
        request: Request<RefreshBankBalanceRequest>,
    ) -> Result<Response<BankAccountResponse>, Status> {
        let req = request.into_inner();
        observe("RefreshBankBalance", async move {
            let organization_id = parse_uuid("organization_id", &req.organization_id)?;
            let bank_account_id = parse_uuid("bank_account_id", &req.bank_account_id)?;

            let bank_account = self
                .db
                .refresh_bank_balance(organization_id, bank_account_id)
                .await?;
            Ok(BankAccountResponse {
                bank_account: Some(bank_account.into()),
            })
        })
        .await
    }
}

fn account_ids(req: &AccountIdRequest) -> Result<(uuid::Uuid, uuid::Uuid), LedgerError> {
    let organization_id = parse_uuid("organization_id", &req.organization_id)?;
    let actor_id = parse_uuid("actor_id", &req.actor_id)?;
    let account_id = parse_uuid("account_id", &req.account_id)?;
    tracing::info!(actor_id = %actor_id, account_id = %account_id, "Account status change");
    Ok((organization_id, account_id))
}
