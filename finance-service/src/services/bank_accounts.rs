//! Bank accounts with a cached balance projected from the ledger.

use crate::error::{db_err, LedgerError, LedgerResult};
use crate::models::currency::parse_currency;
use crate::models::{AccountType, BankAccount, CreateBankAccount};
use crate::services::chart_of_accounts::fetch_account;
use crate::services::database::Database;
use crate::services::metrics::DB_QUERY_DURATION;
use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

const BANK_ACCOUNT_COLUMNS: &str = "bank_account_id, organization_id, name, account_number, iban, \
     swift, currency, balance, gl_account_id, balance_refreshed_utc, created_utc";

impl Database {
    /// The linked GL account, when given, must be an asset in the same currency.
    #[instrument(skip(self, input), fields(organization_id = %input.organization_id))]
    pub async fn create_bank_account(&self, input: &CreateBankAccount) -> LedgerResult<BankAccount> {
        if input.name.trim().is_empty() {
            return Err(LedgerError::Validation("bank account name is required".to_string()));
        }
        let currency = parse_currency(&input.currency)?;

        let mut conn = self.pool.acquire().await.map_err(db_err("Failed to acquire connection"))?;

        if let Some(gl_account_id) = input.gl_account_id {
            let account = fetch_account(&mut conn, input.organization_id, gl_account_id)
                .await?
                .ok_or_else(|| LedgerError::not_found("account", gl_account_id))?;
            if account.account_type != AccountType::Asset {
                return Err(LedgerError::Validation(format!(
                    "account {} is {}, a bank account needs an asset account",
                    account.code, account.account_type
                )));
            }
            if account.currency != currency {
                return Err(LedgerError::CurrencyMismatch {
                    expected: currency,
                    found: account.currency,
                });
            }
        }

        let bank_account = sqlx::query_as::<_, BankAccount>(&format!(
            r#"
            INSERT INTO bank_accounts (bank_account_id, organization_id, name, account_number, iban, swift, currency, gl_account_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            BANK_ACCOUNT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(input.organization_id)
        .bind(input.name.trim())
        .bind(input.account_number.as_deref())
        .bind(input.iban.as_deref())
        .bind(input.swift.as_deref())
        .bind(&currency)
        .bind(input.gl_account_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err("Failed to create bank account"))?;

        info!(bank_account_id = %bank_account.bank_account_id, "Bank account created");
        Ok(bank_account)
    }

    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn list_bank_accounts(&self, organization_id: Uuid) -> LedgerResult<Vec<BankAccount>> {
        sqlx::query_as::<_, BankAccount>(&format!(
            "SELECT {} FROM bank_accounts WHERE organization_id = $1 ORDER BY name",
            BANK_ACCOUNT_COLUMNS
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list bank accounts"))
    }

    /// Recompute the cached balance (debit minus credit) from every posted
    /// line on the linked GL account. Without a linked account the balance
    /// stays at zero.
    #[instrument(skip(self), fields(organization_id = %organization_id, bank_account_id = %bank_account_id))]
    pub async fn refresh_bank_balance(
        &self,
        organization_id: Uuid,
        bank_account_id: Uuid,
    ) -> LedgerResult<BankAccount> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["refresh_bank_balance"])
            .start_timer();

        let bank_account = sqlx::query_as::<_, BankAccount>(&format!(
            r#"
            UPDATE bank_accounts b
            SET balance = COALESCE((
                    SELECT SUM(l.debit - l.credit)
                    FROM journal_entry_lines l
                    JOIN journal_entries e ON e.entry_id = l.entry_id
                    WHERE l.organization_id = b.organization_id
                      AND l.account_id = b.gl_account_id
                      AND e.posted_utc IS NOT NULL
                ), $3),
                balance_refreshed_utc = NOW()
            WHERE b.organization_id = $1 AND b.bank_account_id = $2
            RETURNING {}
            "#,
            BANK_ACCOUNT_COLUMNS
        ))
        .bind(organization_id)
        .bind(bank_account_id)
        .bind(Decimal::ZERO)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to refresh bank balance"))?
        .ok_or_else(|| LedgerError::not_found("bank_account", bank_account_id))?;

        timer.observe_duration();
        info!(balance = %bank_account.balance, "Bank balance refreshed");

        Ok(bank_account)
    }
}
