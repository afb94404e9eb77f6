//! Payment recording and allocation integration tests.
//!
//! Run with: ./scripts/integ-tests.sh -p finance-service

mod common;

use common::{amount, assert_code, spawn_app, TestApp};
use finance_service::grpc::proto::{
    AllocateRequest, AllocateResponse, CreateInvoiceRequest, CustomerSnapshot, GetInvoiceRequest,
    GetPaymentRequest, InvoiceActionRequest, InvoiceLineInput, InvoiceStatus,
    ListAllocationsRequest, ListPaymentsRequest, PaymentMethod, RecordPaymentRequest,
    UnallocateRequest,
};
use rust_decimal_macros::dec;
use tonic::Code;
use uuid::Uuid;

async fn allocate(
    app: &mut TestApp,
    payment_id: &str,
    invoice_id: &str,
    value: &str,
) -> Result<AllocateResponse, tonic::Status> {
    app.payments
        .allocate(AllocateRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            payment_id: payment_id.to_string(),
            invoice_id: invoice_id.to_string(),
            amount: value.to_string(),
        })
        .await
        .map(|r| r.into_inner())
}

#[tokio::test]
#[ignore] // Requires database - run with integ-tests.sh
async fn record_payment_assigns_reference() {
    let mut app = spawn_app().await;

    let first = app.record_payment("500.00").await;
    let second = app.record_payment("20.00").await;

    assert_eq!(first.reference, "PAY-000001");
    assert_eq!(second.reference, "PAY-000002");
    assert_eq!(first.amount, "500.00");
    assert_eq!(first.amount_allocated, "0.00");
    assert_eq!(first.amount_unallocated, "500.00");
    assert_eq!(first.method, PaymentMethod::BankTransfer as i32);

    let fetched = app
        .payments
        .get_payment(GetPaymentRequest {
            organization_id: app.org(),
            payment_id: first.payment_id.clone(),
        })
        .await
        .expect("Failed to get payment")
        .into_inner()
        .payment
        .expect("Should return payment");
    assert_eq!(fetched.reference, first.reference);
}

#[tokio::test]
#[ignore]
async fn invalid_payments_are_rejected() {
    let mut app = spawn_app().await;

    let request = RecordPaymentRequest {
        organization_id: app.org(),
        actor_id: app.actor(),
        amount: "0".to_string(),
        method: PaymentMethod::Cash as i32,
        date: "2026-03-15".to_string(),
        currency: "EUR".to_string(),
        customer_id: String::new(),
        supplier_id: String::new(),
        account_id: String::new(),
    };

    let err = app
        .payments
        .record_payment(request.clone())
        .await
        .expect_err("Zero payment should fail");
    assert_code(&err, Code::InvalidArgument, "VALIDATION");

    let err = app
        .payments
        .record_payment(RecordPaymentRequest {
            amount: "10.00".to_string(),
            customer_id: Uuid::new_v4().to_string(),
            supplier_id: Uuid::new_v4().to_string(),
            ..request.clone()
        })
        .await
        .expect_err("Customer and supplier together should fail");
    assert_code(&err, Code::InvalidArgument, "VALIDATION");

    let err = app
        .payments
        .record_payment(RecordPaymentRequest {
            amount: "10.00".to_string(),
            method: PaymentMethod::Unspecified as i32,
            ..request
        })
        .await
        .expect_err("Method is required");
    assert_code(&err, Code::InvalidArgument, "VALIDATION");
}

#[tokio::test]
#[ignore]
async fn partial_allocations_settle_invoice() {
    let mut app = spawn_app().await;
    let invoice = app.sent_invoice("300.00").await;
    let payment = app.record_payment("500.00").await;

    let first = allocate(&mut app, &payment.payment_id, &invoice.invoice_id, "100.00")
        .await
        .expect("Failed to allocate");
    let after_first = first.invoice.expect("Should return invoice");
    assert_eq!(after_first.status, InvoiceStatus::Partial as i32);
    assert_eq!(amount(&after_first.amount_paid), dec!(100));

    let second = allocate(&mut app, &payment.payment_id, &invoice.invoice_id, "100.00")
        .await
        .expect("Failed to allocate");
    let after_second = second.invoice.expect("Should return invoice");
    assert_eq!(after_second.status, InvoiceStatus::Partial as i32);
    assert_eq!(after_second.amount_paid, "200.00");
    assert_eq!(after_second.amount_due, "100.00");

    let third = allocate(&mut app, &payment.payment_id, &invoice.invoice_id, "100.00")
        .await
        .expect("Failed to allocate");
    let settled = third.invoice.expect("Should return invoice");
    assert_eq!(settled.status, InvoiceStatus::Paid as i32);
    assert_eq!(settled.amount_paid, "300.00");
    assert_eq!(settled.amount_due, "0.00");

    let payment = third.payment.expect("Should return payment");
    assert_eq!(payment.amount_allocated, "300.00");
    assert_eq!(payment.amount_unallocated, "200.00");

    let allocation = third.allocation.expect("Should return allocation");
    assert_eq!(amount(&allocation.amount), dec!(100));
    assert_eq!(allocation.created_by, app.actor());

    let allocations = app
        .payments
        .list_allocations(ListAllocationsRequest {
            organization_id: app.org(),
            payment_id: String::new(),
            invoice_id: invoice.invoice_id,
        })
        .await
        .expect("Failed to list allocations")
        .into_inner()
        .allocations;
    assert_eq!(allocations.len(), 3);
}

#[tokio::test]
#[ignore]
async fn over_allocation_leaves_both_sides_unchanged() {
    let mut app = spawn_app().await;
    let invoice = app.sent_invoice("300.00").await;
    let payment = app.record_payment("500.00").await;

    // More than the invoice still owes.
    let err = allocate(&mut app, &payment.payment_id, &invoice.invoice_id, "400.00")
        .await
        .expect_err("Over-allocating the invoice should fail");
    assert_code(&err, Code::FailedPrecondition, "OVER_ALLOCATION");

    let small = app.record_payment("50.00").await;
    // More than the payment has left.
    let err = allocate(&mut app, &small.payment_id, &invoice.invoice_id, "60.00")
        .await
        .expect_err("Over-allocating the payment should fail");
    assert_code(&err, Code::FailedPrecondition, "OVER_ALLOCATION");

    let unchanged = app
        .invoices
        .get_invoice(GetInvoiceRequest {
            organization_id: app.org(),
            invoice_id: invoice.invoice_id.clone(),
        })
        .await
        .expect("Failed to get invoice")
        .into_inner()
        .invoice
        .expect("Should return invoice");
    assert_eq!(unchanged.status, InvoiceStatus::Sent as i32);
    assert_eq!(unchanged.amount_paid, "0.00");
    assert_eq!(unchanged.amount_due, "300.00");

    let untouched = app
        .payments
        .get_payment(GetPaymentRequest {
            organization_id: app.org(),
            payment_id: payment.payment_id,
        })
        .await
        .expect("Failed to get payment")
        .into_inner()
        .payment
        .expect("Should return payment");
    assert_eq!(untouched.amount_allocated, "0.00");
}

#[tokio::test]
#[ignore]
async fn concurrent_allocations_cannot_both_pass() {
    let mut app = spawn_app().await;
    let invoice = app.sent_invoice("300.00").await;
    let first = app.record_payment("200.00").await;
    let second = app.record_payment("200.00").await;

    let request = |payment_id: &str| AllocateRequest {
        organization_id: app.org(),
        actor_id: app.actor(),
        payment_id: payment_id.to_string(),
        invoice_id: invoice.invoice_id.clone(),
        amount: "200.00".to_string(),
    };
    let (first_request, second_request) = (request(&first.payment_id), request(&second.payment_id));

    let mut left = app.payments.clone();
    let mut right = app.payments.clone();
    let (a, b) = tokio::join!(left.allocate(first_request), right.allocate(second_request));

    let outcomes = [a, b];
    let succeeded = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1, "exactly one allocation should win");
    let err = outcomes
        .into_iter()
        .find_map(Result::err)
        .expect("One allocation should fail");
    assert_code(&err, Code::FailedPrecondition, "OVER_ALLOCATION");

    let settled = app
        .invoices
        .get_invoice(GetInvoiceRequest {
            organization_id: app.org(),
            invoice_id: invoice.invoice_id,
        })
        .await
        .expect("Failed to get invoice")
        .into_inner()
        .invoice
        .expect("Should return invoice");
    assert_eq!(settled.amount_paid, "200.00");
    assert_eq!(settled.amount_due, "100.00");
    assert_eq!(settled.status, InvoiceStatus::Partial as i32);
}

#[tokio::test]
#[ignore]
async fn unallocate_restores_balances() {
    let mut app = spawn_app().await;
    let invoice = app.sent_invoice("300.00").await;
    let payment = app.record_payment("300.00").await;

    let response = allocate(&mut app, &payment.payment_id, &invoice.invoice_id, "300.00")
        .await
        .expect("Failed to allocate");
    let allocation = response.allocation.expect("Should return allocation");
    assert_eq!(
        response.invoice.expect("Should return invoice").status,
        InvoiceStatus::Paid as i32
    );

    let err = app
        .invoices
        .cancel_invoice(InvoiceActionRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            invoice_id: invoice.invoice_id.clone(),
        })
        .await
        .expect_err("Paid invoice cannot be cancelled");
    assert_code(&err, Code::FailedPrecondition, "HAS_PAYMENTS");

    let restored = app
        .payments
        .unallocate(UnallocateRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            allocation_id: allocation.allocation_id.clone(),
        })
        .await
        .expect("Failed to unallocate")
        .into_inner();
    let invoice_after = restored.invoice.expect("Should return invoice");
    let payment_after = restored.payment.expect("Should return payment");
    assert_eq!(invoice_after.status, InvoiceStatus::Sent as i32);
    assert_eq!(invoice_after.amount_due, "300.00");
    assert_eq!(payment_after.amount_unallocated, "300.00");

    let err = app
        .payments
        .unallocate(UnallocateRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            allocation_id: allocation.allocation_id,
        })
        .await
        .expect_err("Allocation is already gone");
    assert_code(&err, Code::NotFound, "NOT_FOUND");
}

#[tokio::test]
#[ignore]
async fn allocation_requires_sent_invoice_in_same_currency() {
    let mut app = spawn_app().await;
    let payment = app.record_payment("100.00").await;

    let draft = app
        .invoices
        .create_invoice(CreateInvoiceRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            customer: Some(CustomerSnapshot {
                customer_id: String::new(),
                name: "Draft Ltd".to_string(),
                email: String::new(),
                address: String::new(),
            }),
            date: "2026-03-01".to_string(),
            due_date: "2099-12-31".to_string(),
            currency: "USD".to_string(),
            lines: vec![InvoiceLineInput {
                description: "Licence".to_string(),
                quantity: "1".to_string(),
                unit_price: "100.00".to_string(),
                tax_rate_id: String::new(),
                tax_rate: String::new(),
                account_id: String::new(),
            }],
        })
        .await
        .expect("Failed to create invoice")
        .into_inner()
        .invoice
        .expect("Should return invoice");

    let err = allocate(&mut app, &payment.payment_id, &draft.invoice_id, "10.00")
        .await
        .expect_err("Currency mismatch should fail");
    assert_code(&err, Code::FailedPrecondition, "CURRENCY_MISMATCH");

    let eur_draft = app
        .invoices
        .create_invoice(CreateInvoiceRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            customer: Some(CustomerSnapshot {
                customer_id: String::new(),
                name: "Draft Ltd".to_string(),
                email: String::new(),
                address: String::new(),
            }),
            date: "2026-03-01".to_string(),
            due_date: "2099-12-31".to_string(),
            currency: "EUR".to_string(),
            lines: vec![InvoiceLineInput {
                description: "Licence".to_string(),
                quantity: "1".to_string(),
                unit_price: "100.00".to_string(),
                tax_rate_id: String::new(),
                tax_rate: String::new(),
                account_id: String::new(),
            }],
        })
        .await
        .expect("Failed to create invoice")
        .into_inner()
        .invoice
        .expect("Should return invoice");

    let err = allocate(&mut app, &payment.payment_id, &eur_draft.invoice_id, "10.00")
        .await
        .expect_err("Draft invoices cannot receive payments");
    assert_code(&err, Code::FailedPrecondition, "INVALID_TRANSITION");
}

#[tokio::test]
#[ignore]
async fn list_payments_by_customer() {
    let mut app = spawn_app().await;
    let customer_id = Uuid::new_v4();

    app.payments
        .record_payment(RecordPaymentRequest {
            organization_id: app.org(),
            actor_id: app.actor(),
            amount: "80.00".to_string(),
            method: PaymentMethod::Check as i32,
            date: "2026-04-01".to_string(),
            currency: "EUR".to_string(),
            customer_id: customer_id.to_string(),
            supplier_id: String::new(),
            account_id: String::new(),
        })
        .await
        .expect("Failed to record payment");
    app.record_payment("10.00").await;

    let payments = app
        .payments
        .list_payments(ListPaymentsRequest {
            organization_id: app.org(),
            customer_id: customer_id.to_string(),
            supplier_id: String::new(),
            page_size: 0,
            page_token: String::new(),
        })
        .await
        .expect("Failed to list payments")
        .into_inner();
    assert_eq!(payments.payments.len(), 1);
    assert_eq!(payments.payments[0].customer_id, customer_id.to_string());
    assert_eq!(payments.next_page_token, "");
}
