//! Journal entry posting integration tests: drafts, balance, idempotency,
//! reversal and reconciliation.
//!
//! Run with: ./scripts/integ-tests.sh -p finance-service

mod common;

use common::{amount, assert_code, credit, debit, spawn_app, TestApp};
use finance_service::grpc::proto::{
    Account, AccountType, AddDraftLineRequest, CreateDraftEntryRequest, EntryActionRequest,
    EntryStatus, GetEntryRequest, Journal, JournalType, ListEntriesRequest, ReconcileLineRequest,
    RemoveDraftLineRequest, ReverseEntryRequest,
};
use rust_decimal_macros::dec;
use tonic::Code;

struct Books {
    bank: Account,
    capital: Account,
    journal: Journal,
}

async fn setup(app: &mut TestApp) -> Books {
    app.open_year("FY2026", "2026-01-01", "2026-12-31").await;
    Books {
        bank: app.create_account("512000", AccountType::Asset, "EUR").await,
        capital: app.create_account("101000", AccountType::Equity, "EUR").await,
        journal: app.create_journal("OD", JournalType::General).await,
    }
}

fn action(app: &TestApp, entry_id: &str) -> EntryActionRequest {
    EntryActionRequest {
        organization_id: app.org(),
        actor_id: app.actor(),
        entry_id: entry_id.to_string(),
    }
}

#[tokio::test]
#[ignore] // Requires database - run with integ-tests.sh
async fn post_balanced_entry() {
    let mut app = spawn_app().await;
    let books = setup(&mut app).await;

    let entry = app
        .post(
            &books.journal,
            "2026-01-10",
            vec![debit(&books.bank, "1000.00"), credit(&books.capital, "1000.00")],
        )
        .await;

    assert_eq!(entry.status, EntryStatus::Posted as i32);
    assert_eq!(entry.reference, "OD-000001");
    assert_eq!(entry.total_debit, "1000.00");
    assert_eq!(entry.total_credit, "1000.00");
    assert_eq!(entry.posted_by, app.actor());
    assert!(entry.posted_at.is_some());
    assert_eq!(entry.lines.len(), 2);
    assert_eq!(entry.lines[0].position, 1);
    assert_eq!(entry.lines[0].debit, "1000.00");
    assert_eq!(entry.lines[0].credit, "0.00");

    let second = app
        .post(
            &books.journal,
            "2026-01-11",
            vec![debit(&books.bank, "5.00"), credit(&books.capital, "5.00")],
        )
        .await;
    assert_eq!(second.reference, "OD-000002");
}

#[tokio::test]
#[ignore]
async fn unbalanced_entry_is_rejected() {
    let mut app = spawn_app().await;
    let books = setup(&mut app).await;

    let request = app.post_request(
        &books.journal,
        "2026-01-10",
        vec![debit(&books.bank, "100.00"), credit(&books.capital, "90.00")],
    );
    let err = app
        .posting
        .post_journal_entry(request)
        .await
        .expect_err("Unbalanced entry should fail");
    assert_code(&err, Code::FailedPrecondition, "UNBALANCED_ENTRY");

    let entries = app
        .posting
        .list_entries(ListEntriesRequest {
            organization_id: app.org(),
            journal_id: String::new(),
            status: EntryStatus::Unspecified as i32,
            start_date: String::new(),
            end_date: String::new(),
            page_size: 0,
            page_token: String::new(),
        })
        .await
        .expect("Failed to list entries")
        .into_inner()
        .entries;
    assert!(entries.is_empty(), "Nothing should be persisted");
}

#[tokio::test]
#[ignore]
async fn invalid_lines_are_rejected() {
    let mut app = spawn_app().await;
    let books = setup(&mut app).await;

    let mut both_sides = debit(&books.bank, "10.00");
    both_sides.credit = "10.00".to_string();
    let request = app.post_request(
        &books.journal,
        "2026-01-10",
        vec![both_sides, credit(&books.capital, "10.00")],
    );
    let err = app
        .posting
        .post_journal_entry(request)
        .await
        .expect_err("Line with both sides should fail");
    assert_code(&err, Code::InvalidArgument, "INVALID_LINE");

    let request = app.post_request(
        &books.journal,
        "2026-01-10",
        vec![debit(&books.bank, "10.005"), credit(&books.capital, "10.005")],
    );
    let err = app
        .posting
        .post_journal_entry(request)
        .await
        .expect_err("Sub-cent amounts should fail");
    assert_code(&err, Code::InvalidArgument, "INVALID_LINE");

    let usd = app.create_account("512100", AccountType::Asset, "USD").await;
    let request = app.post_request(
        &books.journal,
        "2026-01-10",
        vec![debit(&usd, "10.00"), credit(&books.capital, "10.00")],
    );
    let err = app
        .posting
        .post_journal_entry(request)
        .await
        .expect_err("Foreign-currency account should fail");
    assert_code(&err, Code::InvalidArgument, "INVALID_LINE");
}

#[tokio::test]
#[ignore]
async fn draft_lines_can_be_edited_before_posting() {
    let mut app = spawn_app().await;
    let books = setup(&mut app).await;

    let draft = app
        .posting
        .create_draft_entry(CreateDraftEntryRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            journal_id: books.journal.journal_id.clone(),
            date: "2026-02-01".to_string(),
            description: "Capital contribution".to_string(),
            currency: "EUR".to_string(),
            lines: vec![debit(&books.bank, "300.00")],
        })
        .await
        .expect("Failed to create draft")
        .into_inner()
        .entry
        .expect("Should return entry");
    assert_eq!(draft.status, EntryStatus::Draft as i32);
    assert!(draft.posted_at.is_none());

    // A one-sided draft cannot be posted.
    let err = app
        .posting
        .post_entry(action(&app, &draft.entry_id))
        .await
        .expect_err("One-line draft should not post");
    assert_code(&err, Code::FailedPrecondition, "UNBALANCED_ENTRY");

    let wrong = app
        .posting
        .add_draft_line(AddDraftLineRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            entry_id: draft.entry_id.clone(),
            line: Some(credit(&books.capital, "250.00")),
        })
        .await
        .expect("Failed to add line")
        .into_inner()
        .entry
        .expect("Should return entry");
    assert_eq!(wrong.lines.len(), 2);
    assert_eq!(amount(&wrong.total_credit), dec!(250));

    let fixed = app
        .posting
        .remove_draft_line(RemoveDraftLineRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            entry_id: draft.entry_id.clone(),
            line_id: wrong.lines[1].line_id.clone(),
        })
        .await
        .expect("Failed to remove line")
        .into_inner()
        .entry
        .expect("Should return entry");
    assert_eq!(fixed.lines.len(), 1);

    app.posting
        .add_draft_line(AddDraftLineRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            entry_id: draft.entry_id.clone(),
            line: Some(credit(&books.capital, "300.00")),
        })
        .await
        .expect("Failed to add line");

    let posted = app
        .posting
        .post_entry(action(&app, &draft.entry_id))
        .await
        .expect("Failed to post draft")
        .into_inner()
        .entry
        .expect("Should return entry");
    assert_eq!(posted.status, EntryStatus::Posted as i32);
    assert_eq!(posted.total_debit, "300.00");

    let err = app
        .posting
        .post_entry(action(&app, &draft.entry_id))
        .await
        .expect_err("Posting twice should fail");
    assert_code(&err, Code::FailedPrecondition, "NOT_DRAFT");

    let err = app
        .posting
        .add_draft_line(AddDraftLineRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            entry_id: draft.entry_id.clone(),
            line: Some(debit(&books.bank, "1.00")),
        })
        .await
        .expect_err("Posted entries are immutable");
    assert_code(&err, Code::FailedPrecondition, "NOT_DRAFT");

    let err = app
        .posting
        .cancel_draft(action(&app, &draft.entry_id))
        .await
        .expect_err("Posted entries cannot be cancelled as drafts");
    assert_code(&err, Code::FailedPrecondition, "NOT_DRAFT");
}

#[tokio::test]
#[ignore]
async fn cancel_draft_keeps_it_out_of_posting() {
    let mut app = spawn_app().await;
    let books = setup(&mut app).await;

    let draft = app
        .posting
        .create_draft_entry(CreateDraftEntryRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            journal_id: books.journal.journal_id.clone(),
            date: "2026-02-15".to_string(),
            description: "Abandoned".to_string(),
            currency: "EUR".to_string(),
            lines: vec![debit(&books.bank, "75.00"), credit(&books.capital, "75.00")],
        })
        .await
        .expect("Failed to create draft")
        .into_inner()
        .entry
        .expect("Should return entry");

    let cancelled = app
        .posting
        .cancel_draft(action(&app, &draft.entry_id))
        .await
        .expect("Failed to cancel draft")
        .into_inner()
        .entry
        .expect("Should return entry");
    assert_eq!(cancelled.status, EntryStatus::Cancelled as i32);
    assert_eq!(cancelled.cancelled_by, app.actor());
    assert!(cancelled.cancelled_at.is_some());
    assert!(cancelled.posted_at.is_none());

    let err = app
        .posting
        .post_entry(action(&app, &draft.entry_id))
        .await
        .expect_err("Cancelled drafts cannot be posted");
    assert_code(&err, Code::FailedPrecondition, "NOT_DRAFT");

    let err = app
        .posting
        .cancel_draft(action(&app, &draft.entry_id))
        .await
        .expect_err("Cancelling twice should fail");
    assert_code(&err, Code::FailedPrecondition, "NOT_DRAFT");
}

#[tokio::test]
#[ignore]
async fn idempotent_post_returns_the_same_entry() {
    let mut app = spawn_app().await;
    let books = setup(&mut app).await;

    let mut request = app.post_request(
        &books.journal,
        "2026-03-01",
        vec![debit(&books.bank, "42.00"), credit(&books.capital, "42.00")],
    );
    request.idempotency_key = "import-2026-03-01-001".to_string();

    let first = app
        .posting
        .post_journal_entry(request.clone())
        .await
        .expect("Failed to post")
        .into_inner()
        .entry
        .expect("Should return entry");
    let replay = app
        .posting
        .post_journal_entry(request)
        .await
        .expect("Replay should succeed")
        .into_inner()
        .entry
        .expect("Should return entry");

    assert_eq!(replay.entry_id, first.entry_id);
    assert_eq!(replay.idempotency_key, "import-2026-03-01-001");

    let entries = app
        .posting
        .list_entries(ListEntriesRequest {
            organization_id: app.org(),
            journal_id: books.journal.journal_id.clone(),
            status: EntryStatus::Posted as i32,
            start_date: String::new(),
            end_date: String::new(),
            page_size: 0,
            page_token: String::new(),
        })
        .await
        .expect("Failed to list entries")
        .into_inner()
        .entries;
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
#[ignore]
async fn reversal_links_both_entries() {
    let mut app = spawn_app().await;
    let books = setup(&mut app).await;

    let original = app
        .post(
            &books.journal,
            "2026-04-01",
            vec![debit(&books.bank, "75.00"), credit(&books.capital, "75.00")],
        )
        .await;

    let response = app
        .posting
        .reverse_entry(ReverseEntryRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            entry_id: original.entry_id.clone(),
            reversal_date: "2026-04-02".to_string(),
            description: String::new(),
        })
        .await
        .expect("Failed to reverse")
        .into_inner();
    let reversed = response.original.expect("Should return original");
    let reversal = response.reversal.expect("Should return reversal");

    assert_eq!(reversed.status, EntryStatus::Cancelled as i32);
    assert_eq!(reversed.reversed_by, reversal.entry_id);
    assert_eq!(reversal.reversal_of, original.entry_id);
    assert_eq!(reversal.status, EntryStatus::Posted as i32);
    assert_eq!(reversal.description, format!("Reversal of {}", original.reference));
    assert_eq!(reversal.lines[0].account_id, books.bank.account_id);
    assert_eq!(reversal.lines[0].credit, "75.00");
    assert_eq!(reversal.lines[1].debit, "75.00");

    let err = app
        .posting
        .reverse_entry(ReverseEntryRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            entry_id: original.entry_id,
            reversal_date: "2026-04-03".to_string(),
            description: String::new(),
        })
        .await
        .expect_err("An entry is reversed at most once");
    assert_code(&err, Code::FailedPrecondition, "NOT_POSTED");
}

#[tokio::test]
#[ignore]
async fn non_negative_account_blocks_overdraft() {
    let mut app = spawn_app().await;
    let books = setup(&mut app).await;
    let cash = app
        .create_account_with("530000", AccountType::Asset, "EUR", "", true)
        .await;

    app.post(
        &books.journal,
        "2026-05-01",
        vec![debit(&cash, "100.00"), credit(&books.capital, "100.00")],
    )
    .await;

    let request = app.post_request(
        &books.journal,
        "2026-05-02",
        vec![debit(&books.bank, "150.00"), credit(&cash, "150.00")],
    );
    let err = app
        .posting
        .post_journal_entry(request)
        .await
        .expect_err("Cash cannot go negative");
    assert_code(&err, Code::FailedPrecondition, "INSUFFICIENT_BALANCE");

    // Exactly emptying the account is fine.
    app.post(
        &books.journal,
        "2026-05-02",
        vec![debit(&books.bank, "100.00"), credit(&cash, "100.00")],
    )
    .await;
}

#[tokio::test]
#[ignore]
async fn reconcile_posted_line() {
    let mut app = spawn_app().await;
    let books = setup(&mut app).await;

    let entry = app
        .post(
            &books.journal,
            "2026-06-01",
            vec![debit(&books.bank, "20.00"), credit(&books.capital, "20.00")],
        )
        .await;
    let line_id = entry.lines[0].line_id.clone();

    let line = app
        .posting
        .reconcile_line(ReconcileLineRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            line_id: line_id.clone(),
            reconciled: true,
        })
        .await
        .expect("Failed to reconcile")
        .into_inner()
        .line
        .expect("Should return line");
    assert!(line.reconciled);
    assert!(line.reconciled_at.is_some());
    assert_eq!(amount(&line.debit), dec!(20));

    let fetched = app
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
    assert!(fetched.lines[0].reconciled);
    assert!(!fetched.lines[1].reconciled);

    let cleared = app
        .posting
        .reconcile_line(ReconcileLineRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            line_id,
            reconciled: false,
        })
        .await
        .expect("Failed to clear reconciliation")
        .into_inner()
        .line
        .expect("Should return line");
    assert!(!cleared.reconciled);
    assert!(cleared.reconciled_at.is_none());
}

#[tokio::test]
#[ignore]
async fn list_entries_filters_by_date_and_pages() {
    let mut app = spawn_app().await;
    let books = setup(&mut app).await;

    for date in ["2026-07-01", "2026-07-15", "2026-08-01"] {
        app.post(
            &books.journal,
            date,
            vec![debit(&books.bank, "1.00"), credit(&books.capital, "1.00")],
        )
        .await;
    }

    let july = app
        .posting
        .list_entries(ListEntriesRequest {
            organization_id: app.org(),
            journal_id: String::new(),
            status: EntryStatus::Unspecified as i32,
            start_date: "2026-07-01".to_string(),
            end_date: "2026-07-31".to_string(),
            page_size: 1,
            page_token: String::new(),
        })
        .await
        .expect("Failed to list entries")
        .into_inner();
    assert_eq!(july.entries.len(), 1);
    assert!(!july.next_page_token.is_empty());

    let rest = app
        .posting
        .list_entries(ListEntriesRequest {
            organization_id: app.org(),
            journal_id: String::new(),
            status: EntryStatus::Unspecified as i32,
            start_date: "2026-07-01".to_string(),
            end_date: "2026-07-31".to_string(),
            page_size: 10,
            page_token: july.next_page_token,
        })
        .await
        .expect("Failed to list entries")
        .into_inner();
    assert_eq!(rest.entries.len(), 1);
    assert_ne!(rest.entries[0].entry_id, july.entries[0].entry_id);
    assert_eq!(rest.next_page_token, "");
}
