//! Tax rates referenced by invoice lines.

use crate::error::{db_err, LedgerError, LedgerResult};
use crate::models::{validate_rate, ActiveFilter, CreateTaxRate, TaxRate, TaxType};
use crate::services::chart_of_accounts::fetch_account;
use crate::services::database::{is_unique_violation, Database};
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

const TAX_RATE_COLUMNS: &str =
    "tax_rate_id, organization_id, name, code, rate, tax_type, account_id, active, created_utc";

impl Database {
    #[instrument(skip(self, input), fields(organization_id = %input.organization_id, code = %input.code))]
    pub async fn create_tax_rate(&self, input: &CreateTaxRate) -> LedgerResult<TaxRate> {
        validate_rate(input.rate)?;
        if input.code.trim().is_empty() || input.name.trim().is_empty() {
            return Err(LedgerError::Validation("tax rate code and name are required".to_string()));
        }

        let mut conn = self.pool.acquire().await.map_err(db_err("Failed to acquire connection"))?;

        if let Some(account_id) = input.account_id {
            fetch_account(&mut conn, input.organization_id, account_id)
                .await?
                .ok_or_else(|| LedgerError::not_found("account", account_id))?;
        }

        let rate = sqlx::query_as::<_, TaxRate>(&format!(
            r#"
            INSERT INTO tax_rates (tax_rate_id, organization_id, name, code, rate, tax_type, account_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            TAX_RATE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(input.organization_id)
        .bind(input.name.trim())
        .bind(input.code.trim())
        .bind(input.rate)
        .bind(input.tax_type.as_str())
        .bind(input.account_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::DuplicateCode(input.code.trim().to_string())
            } else {
                db_err("Failed to create tax rate")(e)
            }
        })?;

        info!(tax_rate_id = %rate.tax_rate_id, rate = %rate.rate, "Tax rate created");
        Ok(rate)
    }

    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn list_tax_rates(
        &self,
        organization_id: Uuid,
        tax_type: Option<TaxType>,
        active: ActiveFilter,
    ) -> LedgerResult<Vec<TaxRate>> {
        sqlx::query_as::<_, TaxRate>(&format!(
            r#"
            SELECT {} FROM tax_rates
            WHERE organization_id = $1
              AND ($2::varchar IS NULL OR tax_type = $2)
              AND ($3::boolean IS NULL OR active = $3)
            ORDER BY code
            "#,
            TAX_RATE_COLUMNS
        ))
        .bind(organization_id)
        .bind(tax_type.map(|t| t.as_str()))
        .bind(active.as_flag())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list tax rates"))
    }

    /// Invoices keep the rate value they snapshotted.
    #[instrument(skip(self), fields(organization_id = %organization_id, tax_rate_id = %tax_rate_id))]
    pub async fn deactivate_tax_rate(&self, organization_id: Uuid, tax_rate_id: Uuid) -> LedgerResult<TaxRate> {
        let rate = sqlx::query_as::<_, TaxRate>(&format!(
            r#"
            UPDATE tax_rates SET active = FALSE
            WHERE organization_id = $1 AND tax_rate_id = $2
            RETURNING {}
            "#,
            TAX_RATE_COLUMNS
        ))
        .bind(organization_id)
        .bind(tax_rate_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to deactivate tax rate"))?
        .ok_or_else(|| LedgerError::not_found("tax_rate", tax_rate_id))?;

        info!("Tax rate deactivated");
        Ok(rate)
    }
}

pub(crate) async fn fetch_tax_rate(
    conn: &mut PgConnection,
    organization_id: Uuid,
    tax_rate_id: Uuid,
) -> LedgerResult<Option<TaxRate>> {
    sqlx::query_as::<_, TaxRate>(&format!(
        "SELECT {} FROM tax_rates WHERE organization_id = $1 AND tax_rate_id = $2",
        TAX_RATE_COLUMNS
    ))
    .bind(organization_id)
    .bind(tax_rate_id)
    .fetch_optional(conn)
    .await
    .map_err(db_err("Failed to get tax rate"))
}
