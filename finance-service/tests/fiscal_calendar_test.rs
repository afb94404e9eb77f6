//! Fiscal calendar integration tests: opening, closing and period locks.
//!
//! Run with: ./scripts/integ-tests.sh -p finance-service

mod common;

use common::{assert_code, credit, debit, spawn_app, TestApp};
use finance_service::grpc::proto::{
    AccountType, CloseYearRequest, CreateDraftEntryRequest, EntryActionRequest, EntryStatus,
    FiscalYearStatus, GetEntryRequest, GetYearRequest, IsDateOpenRequest, JournalType,
    ListYearsRequest, OpenYearRequest, ReverseEntryRequest,
};
use tonic::Code;

async fn close(app: &mut TestApp, fiscal_year_id: &str) -> Result<(), tonic::Status> {
    app.calendar
        .close_year(CloseYearRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            fiscal_year_id: fiscal_year_id.to_string(),
        })
        .await
        .map(|_| ())
}

async fn is_open(app: &mut TestApp, date: &str) -> (bool, String) {
    let response = app
        .calendar
        .is_date_open(IsDateOpenRequest {
            organization_id: app.org(),
            date: date.to_string(),
        })
        .await
        .expect("Failed to check date")
        .into_inner();
    (response.open, response.fiscal_year_id)
}

#[tokio::test]
#[ignore] // Requires database - run with integ-tests.sh
async fn open_year_and_lookup() {
    let mut app = spawn_app().await;
    let year = app.open_year("FY2026", "2026-01-01", "2026-12-31").await;

    assert_eq!(year.status, FiscalYearStatus::Open as i32);
    assert_eq!(year.start_date, "2026-01-01");
    assert_eq!(year.end_date, "2026-12-31");
    assert_eq!(year.closed_by, "");

    let fetched = app
        .calendar
        .get_year(GetYearRequest {
            organization_id: app.org(),
            fiscal_year_id: year.fiscal_year_id.clone(),
        })
        .await
        .expect("Failed to get year")
        .into_inner()
        .fiscal_year
        .expect("Should return fiscal year");
    assert_eq!(fetched.name, "FY2026");

    app.open_year("FY2027", "2027-01-01", "2027-12-31").await;
    let years = app
        .calendar
        .list_years(ListYearsRequest {
            organization_id: app.org(),
        })
        .await
        .expect("Failed to list years")
        .into_inner()
        .fiscal_years;
    let names: Vec<_> = years.iter().map(|y| y.name.as_str()).collect();
    assert_eq!(names, ["FY2026", "FY2027"]);
}

#[tokio::test]
#[ignore]
async fn overlapping_years_are_rejected() {
    let mut app = spawn_app().await;
    app.open_year("FY2026", "2026-01-01", "2026-12-31").await;

    let err = app
        .calendar
        .open_year(OpenYearRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            name: "Broken".to_string(),
            start_date: "2026-07-01".to_string(),
            end_date: "2027-06-30".to_string(),
        })
        .await
        .expect_err("Overlap should fail");
    assert_code(&err, Code::FailedPrecondition, "OVERLAPPING_PERIOD");

    let err = app
        .calendar
        .open_year(OpenYearRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            name: "Backwards".to_string(),
            start_date: "2028-12-31".to_string(),
            end_date: "2028-01-01".to_string(),
        })
        .await
        .expect_err("End before start should fail");
    assert_code(&err, Code::InvalidArgument, "VALIDATION");
}

#[tokio::test]
#[ignore]
async fn is_date_open_reports_covering_year() {
    let mut app = spawn_app().await;
    let year = app.open_year("FY2026", "2026-01-01", "2026-12-31").await;

    assert_eq!(is_open(&mut app, "2026-06-15").await, (true, year.fiscal_year_id.clone()));
    assert_eq!(is_open(&mut app, "2025-12-31").await, (false, String::new()));

    close(&mut app, &year.fiscal_year_id)
        .await
        .expect("Failed to close year");
    assert_eq!(is_open(&mut app, "2026-06-15").await, (false, year.fiscal_year_id));
}

#[tokio::test]
#[ignore]
async fn close_refused_while_drafts_exist() {
    let mut app = spawn_app().await;
    let year = app.open_year("FY2026", "2026-01-01", "2026-12-31").await;
    let bank = app.create_account("512000", AccountType::Asset, "EUR").await;
    let capital = app.create_account("101000", AccountType::Equity, "EUR").await;
    let journal = app.create_journal("OD", JournalType::General).await;

    let draft = app
        .posting
        .create_draft_entry(CreateDraftEntryRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            journal_id: journal.journal_id.clone(),
            date: "2026-11-30".to_string(),
            description: "Pending".to_string(),
            currency: "EUR".to_string(),
            lines: vec![debit(&bank, "10.00"), credit(&capital, "10.00")],
        })
        .await
        .expect("Failed to create draft")
        .into_inner()
        .entry
        .expect("Should return entry");

    let err = close(&mut app, &year.fiscal_year_id)
        .await
        .expect_err("Close with drafts should fail");
    assert_code(&err, Code::FailedPrecondition, "OPEN_ENTRIES_EXIST");

    app.posting
        .cancel_draft(EntryActionRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            entry_id: draft.entry_id,
        })
        .await
        .expect("Failed to cancel draft");

    close(&mut app, &year.fiscal_year_id)
        .await
        .expect("Close should succeed once drafts are gone");

    let err = close(&mut app, &year.fiscal_year_id)
        .await
        .expect_err("Second close should fail");
    assert_code(&err, Code::FailedPrecondition, "ALREADY_CLOSED");
}

#[tokio::test]
#[ignore]
async fn closed_year_rejects_postings() {
    let mut app = spawn_app().await;
    let year = app.open_year("FY2025", "2025-01-01", "2025-12-31").await;
    let bank = app.create_account("512000", AccountType::Asset, "EUR").await;
    let capital = app.create_account("101000", AccountType::Equity, "EUR").await;
    let journal = app.create_journal("OD", JournalType::General).await;

    close(&mut app, &year.fiscal_year_id)
        .await
        .expect("Failed to close year");

    let request = app.post_request(
        &journal,
        "2025-06-30",
        vec![debit(&bank, "100.00"), credit(&capital, "100.00")],
    );
    let err = app
        .posting
        .post_journal_entry(request)
        .await
        .expect_err("Posting into a closed year should fail");
    assert_code(&err, Code::FailedPrecondition, "PERIOD_CLOSED");

    let err = app
        .posting
        .create_draft_entry(CreateDraftEntryRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            journal_id: journal.journal_id.clone(),
            date: "2025-06-30".to_string(),
            description: String::new(),
            currency: "EUR".to_string(),
            lines: Vec::new(),
        })
        .await
        .expect_err("Drafts in a closed year should fail");
    assert_code(&err, Code::FailedPrecondition, "PERIOD_CLOSED");
}

#[tokio::test]
#[ignore]
async fn posting_outside_any_year_is_rejected() {
    let mut app = spawn_app().await;
    let bank = app.create_account("512000", AccountType::Asset, "EUR").await;
    let capital = app.create_account("101000", AccountType::Equity, "EUR").await;
    let journal = app.create_journal("OD", JournalType::General).await;

    let request = app.post_request(
        &journal,
        "2026-03-01",
        vec![debit(&bank, "100.00"), credit(&capital, "100.00")],
    );
    let err = app
        .posting
        .post_journal_entry(request)
        .await
        .expect_err("No fiscal year covers the date");
    assert_code(&err, Code::FailedPrecondition, "PERIOD_CLOSED");
}

#[tokio::test]
#[ignore]
async fn closed_year_entries_cannot_be_reversed() {
    let mut app = spawn_app().await;
    let fy2025 = app.open_year("FY2025", "2025-01-01", "2025-12-31").await;
    app.open_year("FY2026", "2026-01-01", "2026-12-31").await;
    let bank = app.create_account("512000", AccountType::Asset, "EUR").await;
    let capital = app.create_account("101000", AccountType::Equity, "EUR").await;
    let journal = app.create_journal("OD", JournalType::General).await;

    let entry = app
        .post(
            &journal,
            "2025-06-30",
            vec![debit(&bank, "100.00"), credit(&capital, "100.00")],
        )
        .await;
    close(&mut app, &fy2025.fiscal_year_id)
        .await
        .expect("Failed to close year");

    // The reversal date is open, the original's period is not.
    let err = app
        .posting
        .reverse_entry(ReverseEntryRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            entry_id: entry.entry_id.clone(),
            reversal_date: "2026-01-15".to_string(),
            description: String::new(),
        })
        .await
        .expect_err("Reversing a closed-year entry should fail");
    assert_code(&err, Code::FailedPrecondition, "PERIOD_CLOSED");

    let unchanged = app
        .posting
        .get_entry(GetEntryRequest {
            organization_id: app.org(),
            entry_id: entry.entry_id,
        })
        .await
        .expect("Failed to get entry")
        .into_inner()
        .entry
        .expect("Should return entry");
    assert_eq!(unchanged.status, EntryStatus::Posted as i32);
    assert_eq!(unchanged.reversed_by, "");
}
