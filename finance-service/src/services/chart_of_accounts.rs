//! ChartOfAccounts: account records and their hierarchy.

use crate::error::{db_err, LedgerError, LedgerResult};
use crate::models::currency::parse_currency;
use crate::models::{validate_parent, Account, AccountType, ActiveFilter, CreateAccount};
use crate::services::database::{advisory_lock, is_unique_violation, page_limit, Database, RowLock};
use crate::services::metrics::DB_QUERY_DURATION;
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::{info, instrument};
use uuid::Uuid;

const ACCOUNT_SELECT: &str = r#"
    SELECT account_id, organization_id, code, name, account_type, parent_id, currency,
           active, system, enforce_non_negative, created_utc, updated_utc
    FROM accounts
"#;

impl Database {
    // -------------------------------------------------------------------------
    // Account Operations
    // -------------------------------------------------------------------------

    /// Create a new account.
    #[instrument(skip(self, input), fields(organization_id = %input.organization_id, code = %input.code))]
    pub async fn create_account(&self, input: &CreateAccount) -> LedgerResult<Account> {
        if input.code.trim().is_empty() || input.name.trim().is_empty() {
            return Err(LedgerError::Validation(
                "account code and name are required".to_string(),
            ));
        }
        let currency = parse_currency(&input.currency)?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_account"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;

        if let Some(parent_id) = input.parent_id {
            advisory_lock(&mut tx, input.organization_id, "accounts").await?;
            let parent = fetch_account(&mut tx, input.organization_id, parent_id)
                .await?
                .ok_or_else(|| {
                    LedgerError::InvalidParent(format!("parent {} does not exist", parent_id))
                })?;
            validate_parent(None, input.account_type, &currency, &parent, &[])?;
        }

        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (account_id, organization_id, code, name, account_type, parent_id,
                                  currency, system, enforce_non_negative)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING account_id, organization_id, code, name, account_type, parent_id, currency,
                      active, system, enforce_non_negative, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.organization_id)
        .bind(input.code.trim())
        .bind(input.name.trim())
        .bind(input.account_type.as_str())
        .bind(input.parent_id)
        .bind(&currency)
        .bind(input.system)
        .bind(input.enforce_non_negative)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::DuplicateCode(input.code.clone())
            } else {
                db_err("Failed to create account")(e)
            }
        })?;

        tx.commit().await.map_err(db_err("Failed to commit transaction"))?;
        timer.observe_duration();

        info!(
            account_id = %account.account_id,
            account_type = %account.account_type,
            "Account created"
        );

        Ok(account)
    }

    /// Get an account by ID for a specific organization.
    #[instrument(skip(self), fields(organization_id = %organization_id, account_id = %account_id))]
    pub async fn get_account(&self, organization_id: Uuid, account_id: Uuid) -> LedgerResult<Account> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_account"])
            .start_timer();

        let mut conn = self.pool.acquire().await.map_err(db_err("Failed to acquire connection"))?;
        let account = fetch_account(&mut conn, organization_id, account_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("account", account_id))?;

        timer.observe_duration();
        Ok(account)
    }

    /// List accounts ordered by code; `page_token` is the last code of the previous page.
    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn list_accounts(
        &self,
        organization_id: Uuid,
        account_type: Option<AccountType>,
        active: ActiveFilter,
        page_size: i32,
        page_token: Option<&str>,
    ) -> LedgerResult<Vec<Account>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_accounts"])
            .start_timer();

        let sql = format!(
            r#"{}
            WHERE organization_id = $1
              AND ($2::varchar IS NULL OR account_type = $2)
              AND ($3::boolean IS NULL OR active = $3)
              AND ($4::varchar IS NULL OR code > $4)
            ORDER BY code
            LIMIT $5
            "#,
            ACCOUNT_SELECT
        );
        let accounts = sqlx::query_as::<_, Account>(&sql)
            .bind(organization_id)
            .bind(account_type.map(|t| t.as_str()))
            .bind(active.as_flag())
            .bind(page_token)
            .bind(page_limit(page_size))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("Failed to list accounts"))?;

        timer.observe_duration();
        Ok(accounts)
    }

    #[instrument(skip(self, name), fields(organization_id = %organization_id, account_id = %account_id))]
    pub async fn rename_account(
        &self,
        organization_id: Uuid,
        account_id: Uuid,
        name: &str,
    ) -> LedgerResult<Account> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::Validation("account name is required".to_string()));
        }
        let account = self
            .update_account(
                organization_id,
                account_id,
                "rename_account",
                "UPDATE accounts SET name = $3, updated_utc = NOW() WHERE organization_id = $1 AND account_id = $2",
                Some(name),
            )
            .await?;
        info!("Account renamed");
        Ok(account)
    }

    /// Move an account under `parent_id`, or detach it when `None`.
    #[instrument(skip(self), fields(organization_id = %organization_id, account_id = %account_id))]
    pub async fn set_account_parent(
        &self,
        organization_id: Uuid,
        account_id: Uuid,
        parent_id: Option<Uuid>,
    ) -> LedgerResult<Account> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_account_parent"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;
        advisory_lock(&mut tx, organization_id, "accounts").await?;

        let account = fetch_account(&mut tx, organization_id, account_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("account", account_id))?;

        if let Some(parent_id) = parent_id {
            let parent = fetch_account(&mut tx, organization_id, parent_id)
                .await?
                .ok_or_else(|| {
                    LedgerError::InvalidParent(format!("parent {} does not exist", parent_id))
                })?;
            let ancestors = fetch_ancestors(&mut tx, organization_id, parent_id).await?;
            validate_parent(
                Some(account.account_id),
                account.account_type,
                &account.currency,
                &parent,
                &ancestors,
            )?;
        }

        sqlx::query(
            "UPDATE accounts SET parent_id = $3, updated_utc = NOW() WHERE organization_id = $1 AND account_id = $2",
        )
        .bind(organization_id)
        .bind(account_id)
        .bind(parent_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("Failed to set account parent"))?;

        let account = fetch_account(&mut tx, organization_id, account_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("account", account_id))?;

        tx.commit().await.map_err(db_err("Failed to commit transaction"))?;
        timer.observe_duration();

        info!(parent_id = ?parent_id, "Account parent changed");
        Ok(account)
    }

    /// Soft-deactivate. System accounts stay active.
    #[instrument(skip(self), fields(organization_id = %organization_id, account_id = %account_id))]
    pub async fn deactivate_account(&self, organization_id: Uuid, account_id: Uuid) -> LedgerResult<Account> {
        let account = self.get_account(organization_id, account_id).await?;
        if account.system {
            return Err(LedgerError::SystemAccount(account_id));
        }
        let account = self
            .update_account(
                organization_id,
                account_id,
                "deactivate_account",
                "UPDATE accounts SET active = FALSE, updated_utc = NOW() WHERE organization_id = $1 AND account_id = $2",
                None,
            )
            .await?;
        info!("Account deactivated");
        Ok(account)
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, account_id = %account_id))]
    pub async fn reactivate_account(&self, organization_id: Uuid, account_id: Uuid) -> LedgerResult<Account> {
        let account = self
            .update_account(
                organization_id,
                account_id,
                "reactivate_account",
                "UPDATE accounts SET active = TRUE, updated_utc = NOW() WHERE organization_id = $1 AND account_id = $2",
                None,
            )
            .await?;
        info!("Account reactivated");
        Ok(account)
    }

    /// Hard-delete an unreferenced, non-system account.
    #[instrument(skip(self), fields(organization_id = %organization_id, account_id = %account_id))]
    pub async fn delete_account(&self, organization_id: Uuid, account_id: Uuid) -> LedgerResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_account"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;
        advisory_lock(&mut tx, organization_id, "accounts").await?;

        let account = sqlx::query_as::<_, Account>(&format!(
            "{} WHERE organization_id = $1 AND account_id = $2 FOR UPDATE",
            ACCOUNT_SELECT
        ))
        .bind(organization_id)
        .bind(account_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err("Failed to lock account"))?
        .ok_or_else(|| LedgerError::not_found("account", account_id))?;

        if account.system {
            return Err(LedgerError::SystemAccount(account_id));
        }

        let referenced: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (SELECT 1 FROM journal_entry_lines WHERE account_id = $1)
                OR EXISTS (SELECT 1 FROM invoice_lines WHERE account_id = $1)
                OR EXISTS (SELECT 1 FROM payments WHERE account_id = $1)
                OR EXISTS (SELECT 1 FROM bank_accounts WHERE gl_account_id = $1)
                OR EXISTS (SELECT 1 FROM tax_rates WHERE account_id = $1)
                OR EXISTS (SELECT 1 FROM accounts WHERE parent_id = $1)
            "#,
        )
        .bind(account_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("Failed to check account references"))?;

        if referenced {
            return Err(LedgerError::AccountInUse(account_id));
        }

        sqlx::query("DELETE FROM accounts WHERE organization_id = $1 AND account_id = $2")
            .bind(organization_id)
            .bind(account_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("Failed to delete account"))?;

        tx.commit().await.map_err(db_err("Failed to commit transaction"))?;
        timer.observe_duration();

        info!(code = %account.code, "Account deleted");
        Ok(())
    }

    /// Run a single-row update (`$1` organization, `$2` account, optional `$3`)
    /// and return the updated account.
    async fn update_account(
        &self,
        organization_id: Uuid,
        account_id: Uuid,
        operation: &'static str,
        sql: &'static str,
        value: Option<&str>,
    ) -> LedgerResult<Account> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&[operation])
            .start_timer();

        let mut query = sqlx::query(sql).bind(organization_id).bind(account_id);
        if let Some(value) = value {
            query = query.bind(value);
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(db_err("Failed to update account"))?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found("account", account_id));
        }

        timer.observe_duration();
        self.get_account(organization_id, account_id).await
    }
}

pub(crate) async fn fetch_account(
    conn: &mut PgConnection,
    organization_id: Uuid,
    account_id: Uuid,
) -> LedgerResult<Option<Account>> {
    sqlx::query_as::<_, Account>(&format!(
        "{} WHERE organization_id = $1 AND account_id = $2",
        ACCOUNT_SELECT
    ))
    .bind(organization_id)
    .bind(account_id)
    .fetch_optional(conn)
    .await
    .map_err(db_err("Failed to get account"))
}

/// Accounts by id; ids that do not exist in the organization are absent.
/// Locked rows are taken in id order.
pub(crate) async fn fetch_accounts(
    conn: &mut PgConnection,
    organization_id: Uuid,
    account_ids: &[Uuid],
    lock: RowLock,
) -> LedgerResult<HashMap<Uuid, Account>> {
    let sql = format!(
        "{} WHERE organization_id = $1 AND account_id = ANY($2) ORDER BY account_id{}",
        ACCOUNT_SELECT,
        lock.clause()
    );
    let accounts = sqlx::query_as::<_, Account>(&sql)
        .bind(organization_id)
        .bind(account_ids)
        .fetch_all(conn)
        .await
        .map_err(db_err("Failed to fetch accounts"))?;

    Ok(accounts.into_iter().map(|a| (a.account_id, a)).collect())
}

/// Every ancestor of `account_id`, nearest first.
async fn fetch_ancestors(
    conn: &mut PgConnection,
    organization_id: Uuid,
    account_id: Uuid,
) -> LedgerResult<Vec<Uuid>> {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        WITH RECURSIVE ancestors (account_id, parent_id, depth) AS (
            SELECT account_id, parent_id, 0
            FROM accounts
            WHERE organization_id = $1 AND account_id = $2
            UNION ALL
            SELECT a.account_id, a.parent_id, anc.depth + 1
            FROM accounts a
            JOIN ancestors anc ON a.account_id = anc.parent_id
            WHERE a.organization_id = $1 AND anc.depth < 256
        )
        SELECT parent_id FROM ancestors WHERE parent_id IS NOT NULL ORDER BY depth
        "#,
    )
    .bind(organization_id)
    .bind(account_id)
    .fetch_all(conn)
    .await
    .map_err(db_err("Failed to walk account hierarchy"))
}
