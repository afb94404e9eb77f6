//! Common test utilities for finance-service integration tests.

#![allow(dead_code)]

use finance_service::config::{DatabaseConfig, FinanceConfig};
use finance_service::grpc::proto::{
    chart_of_accounts_service_client::ChartOfAccountsServiceClient,
    fiscal_calendar_service_client::FiscalCalendarServiceClient,
    invoice_service_client::InvoiceServiceClient, payment_service_client::PaymentServiceClient,
    posting_service_client::PostingServiceClient, reporting_service_client::ReportingServiceClient,
    Account, AccountType, CreateAccountRequest, CreateInvoiceRequest, CreateJournalRequest,
    CustomerSnapshot, EntryLineInput, FiscalYear, Invoice, InvoiceActionRequest, InvoiceLineInput,
    Journal, JournalEntry, JournalType, OpenYearRequest, Payment, PaymentMethod,
    PostJournalEntryRequest, RecordPaymentRequest,
};
use finance_service::startup::Application;
use rust_decimal::Decimal;
use service_core::config::Config as CommonConfig;
use std::str::FromStr;
use std::sync::Once;
use tonic::transport::{Channel, Endpoint};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,finance_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Clients for every ledger surface, scoped to a fresh organization.
pub struct TestApp {
    pub accounts: ChartOfAccountsServiceClient<Channel>,
    pub calendar: FiscalCalendarServiceClient<Channel>,
    pub posting: PostingServiceClient<Channel>,
    pub invoices: InvoiceServiceClient<Channel>,
    pub payments: PaymentServiceClient<Channel>,
    pub reporting: ReportingServiceClient<Channel>,
    pub organization_id: Uuid,
    pub actor_id: Uuid,
}

/// Spawn a test application and connect clients with a unique organization id.
pub async fn spawn_app() -> TestApp {
    init_tracing();

    let database_url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set - use scripts/integ-tests.sh to run tests");

    let config = FinanceConfig {
        common: CommonConfig { port: 0 },
        service_name: "finance-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: database_url,
            max_connections: 5,
            min_connections: 1,
        },
    };

    let app = Application::build(config)
        .await
        .expect("Failed to build application");

    let endpoint = Endpoint::from_shared(format!("http://127.0.0.1:{}", app.grpc_port()))
        .expect("Invalid gRPC address");

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    // Wait for server to be ready with retry
    let channel = {
        let mut attempts = 0;
        loop {
            match endpoint.connect().await {
                Ok(channel) => break channel,
                Err(_) if attempts < 20 => {
                    attempts += 1;
                    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
                }
                Err(e) => panic!("Failed to connect gRPC client after 20 attempts: {}", e),
            }
        }
    };

    TestApp {
        accounts: ChartOfAccountsServiceClient::new(channel.clone()),
        calendar: FiscalCalendarServiceClient::new(channel.clone()),
        posting: PostingServiceClient::new(channel.clone()),
        invoices: InvoiceServiceClient::new(channel.clone()),
        payments: PaymentServiceClient::new(channel.clone()),
        reporting: ReportingServiceClient::new(channel),
        organization_id: Uuid::new_v4(),
        actor_id: Uuid::new_v4(),
    }
}

/// Parse a wire amount for numeric comparison.
pub fn amount(value: &str) -> Decimal {
    Decimal::from_str(value).expect("Should be a decimal amount")
}

/// A debit or credit line for `account`.
pub fn debit(account: &Account, amount: &str) -> EntryLineInput {
    EntryLineInput {
        account_id: account.account_id.clone(),
        label: String::new(),
        debit: amount.to_string(),
        credit: String::new(),
    }
}

pub fn credit(account: &Account, amount: &str) -> EntryLineInput {
    EntryLineInput {
        account_id: account.account_id.clone(),
        label: String::new(),
        debit: String::new(),
        credit: amount.to_string(),
    }
}

impl TestApp {
    pub fn org(&self) -> String {
        self.organization_id.to_string()
    }

    pub fn actor(&self) -> String {
        self.actor_id.to_string()
    }

    pub async fn create_account(
        &mut self,
        code: &str,
        account_type: AccountType,
        currency: &str,
    ) -> Account {
        self.create_account_with(code, account_type, currency, "", false)
            .await
    }

    pub async fn create_account_with(
        &mut self,
        code: &str,
        account_type: AccountType,
        currency: &str,
        parent_id: &str,
        enforce_non_negative: bool,
    ) -> Account {
        let request = CreateAccountRequest {
            organization_id: self.org(),
            actor_id: self.actor(),
            code: code.to_string(),
            name: format!("Account {}", code),
            account_type: account_type as i32,
            parent_id: parent_id.to_string(),
            currency: currency.to_string(),
            system: false,
            enforce_non_negative,
        };

        self.accounts
            .create_account(request)
            .await
            .expect("Failed to create account")
            .into_inner()
            .account
            .expect("Should return account")
    }

    pub async fn create_journal(&mut self, code: &str, journal_type: JournalType) -> Journal {
        let request = CreateJournalRequest {
            organization_id: self.org(),
            actor_id: self.actor(),
            code: code.to_string(),
            name: format!("Journal {}", code),
            journal_type: journal_type as i32,
        };

        self.accounts
            .create_journal(request)
            .await
            .expect("Failed to create journal")
            .into_inner()
            .journal
            .expect("Should return journal")
    }

    pub async fn open_year(&mut self, name: &str, start_date: &str, end_date: &str) -> FiscalYear {
        let request = OpenYearRequest {
            organization_id: self.org(),
            actor_id: self.actor(),
            name: name.to_string(),
            start_date: start_date.to_string(),
            end_date: end_date.to_string(),
        };

        self.calendar
            .open_year(request)
            .await
            .expect("Failed to open fiscal year")
            .into_inner()
            .fiscal_year
            .expect("Should return fiscal year")
    }

    pub fn post_request(
        &self,
        journal: &Journal,
        date: &str,
        lines: Vec<EntryLineInput>,
    ) -> PostJournalEntryRequest {
        PostJournalEntryRequest {
            organization_id: self.org(),
            actor_id: self.actor(),
            journal_id: journal.journal_id.clone(),
            date: date.to_string(),
            description: "Test entry".to_string(),
            currency: "EUR".to_string(),
            lines,
            idempotency_key: String::new(),
        }
    }

    /// Post a balanced entry through the direct posting surface.
    pub async fn post(
        &mut self,
        journal: &Journal,
        date: &str,
        lines: Vec<EntryLineInput>,
    ) -> JournalEntry {
        let request = self.post_request(journal, date, lines);
        self.posting
            .post_journal_entry(request)
            .await
            .expect("Failed to post entry")
            .into_inner()
            .entry
            .expect("Should return entry")
    }

    /// Create and send a single-line EUR invoice for `amount` (no tax).
    pub async fn sent_invoice(&mut self, amount: &str) -> Invoice {
        let request = CreateInvoiceRequest {
            organization_id: self.org(),
            actor_id: self.actor(),
            customer: Some(CustomerSnapshot {
                customer_id: Uuid::new_v4().to_string(),
                name: "Acme SARL".to_string(),
                email: "billing@acme.test".to_string(),
                address: String::new(),
            }),
            date: "2026-03-01".to_string(),
            due_date: "2099-12-31".to_string(),
            currency: "EUR".to_string(),
            lines: vec![InvoiceLineInput {
                description: "Services".to_string(),
                quantity: "1".to_string(),
                unit_price: amount.to_string(),
                tax_rate_id: String::new(),
                tax_rate: String::new(),
                account_id: String::new(),
            }],
        };

        let invoice = self
            .invoices
            .create_invoice(request)
            .await
            .expect("Failed to create invoice")
            .into_inner()
            .invoice
            .expect("Should return invoice");

        self.invoices
            .send_invoice(InvoiceActionRequest {
                organization_id: self.org(),
                actor_id: self.actor(),
                invoice_id: invoice.invoice_id,
            })
            .await
            .expect("Failed to send invoice")
            .into_inner()
            .invoice
            .expect("Should return invoice")
    }

    pub async fn record_payment(&mut self, amount: &str) -> Payment {
        let request = RecordPaymentRequest {
            organization_id: self.org(),
            actor_id: self.actor(),
            amount: amount.to_string(),
            method: PaymentMethod::BankTransfer as i32,
            date: "2026-03-15".to_string(),
            currency: "EUR".to_string(),
            customer_id: String::new(),
            supplier_id: String::new(),
            account_id: String::new(),
        };

        self.payments
            .record_payment(request)
            .await
            .expect("Failed to record payment")
            .into_inner()
            .payment
            .expect("Should return payment")
    }
}

/// Assert the status carries the given stable error code prefix.
pub fn assert_code(status: &tonic::Status, code: tonic::Code, error_code: &str) {
    assert_eq!(status.code(), code, "unexpected status: {:?}", status);
    assert!(
        status.message().starts_with(&format!("{}:", error_code)),
        "expected {} in message '{}'",
        error_code,
        status.message()
    );
}
