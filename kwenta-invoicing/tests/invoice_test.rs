//! Invoice CRUD and calculation integration tests.

mod common;

use common::TestApp;
use kwenta_invoicing::models::Invoice;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn create_invoice_computes_totals_and_number() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Acme Studios").await;

    let invoice = app.create_standard_invoice(client_id, "PHP").await;

    assert_eq!(invoice.invoice_number, "INV-2026-03-001");
    assert_eq!(invoice.status, "draft");
    assert_eq!(invoice.subtotal, dec!(7000));
    assert_eq!(invoice.tax_amount, dec!(840));
    assert_eq!(invoice.total, dec!(7840));
    assert_eq!(invoice.total_paid, Decimal::ZERO);
    assert_eq!(invoice.remaining_balance, dec!(7840));
    assert_eq!(invoice.client_name, "Acme Studios");
    assert!(invoice.total_php.is_none());
    assert!(invoice.exchange_rate.is_none());
}

#[tokio::test]
async fn invoice_numbers_are_sequential_within_the_month() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Sequential Co").await;

    let first = app.create_standard_invoice(client_id, "PHP").await;
    let second = app.create_standard_invoice(client_id, "PHP").await;

    assert_eq!(first.invoice_number, "INV-2026-03-001");
    assert_eq!(second.invoice_number, "INV-2026-03-002");
}

#[tokio::test]
async fn foreign_currency_invoice_converts_to_php() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("US Client").await;

    let invoice = app.create_standard_invoice(client_id, "USD").await;

    assert_eq!(invoice.currency, "USD");
    assert_eq!(invoice.exchange_rate, Some(dec!(56)));
    assert_eq!(invoice.total_php, Some(dec!(439040.00)));
}

#[tokio::test]
async fn stored_totals_recompute_from_line_items() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Roundtrip Co").await;
    let invoice = app.create_standard_invoice(client_id, "PHP").await;

    let response = app.get(&format!("/invoices/{}", invoice.invoice_id)).await;
    assert_eq!(response.status(), 200);
    let fetched: Invoice = response.json().await.unwrap();

    let subtotal: Decimal = fetched
        .line_items
        .iter()
        .map(|item| item.quantity * item.rate)
        .sum();
    assert_eq!(subtotal, fetched.subtotal);
    assert!(fetched.discount.is_none());
    assert_eq!(fetched.subtotal + fetched.tax_amount, fetched.total);
}

#[tokio::test]
async fn percentage_discount_is_applied_before_tax() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Discount Co").await;

    let response = app
        .post(
            "/invoices",
            json!({
                "client_id": client_id,
                "currency": "PHP",
                "issue_date": "2026-03-01",
                "due_date": "2099-12-31",
                "tax_rate": "12",
                "discount": { "kind": "percentage", "value": "10" },
                "line_items": [
                    { "description": "Retainer", "quantity": "1", "rate": "10000" }
                ]
            }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let invoice: Invoice = response.json().await.unwrap();

    assert_eq!(invoice.subtotal, dec!(10000));
    // 10% off -> 9000, then 12% tax -> 1080.
    assert_eq!(invoice.tax_amount, dec!(1080));
    assert_eq!(invoice.total, dec!(10080));
}

#[tokio::test]
async fn vat_registered_issuer_gets_twelve_percent_vat_and_business_withholding() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client_with("BigCorp Inc", true).await;

    let response = app
        .post(
            "/invoices",
            json!({
                "client_id": client_id,
                "currency": "PHP",
                "issue_date": "2026-03-01",
                "due_date": "2099-12-31",
                "tax_rate": "5",
                "vat_registered": true,
                "line_items": [
                    { "description": "Consulting", "quantity": "1", "rate": "10000" }
                ]
            }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let invoice: Invoice = response.json().await.unwrap();

    // The supplied 5% rate is replaced by the fixed 12% VAT.
    assert_eq!(invoice.tax_rate, dec!(12));
    assert_eq!(invoice.tax_amount, dec!(1200));
    assert_eq!(invoice.total, dec!(11200));
    assert!(invoice.issuer_vat_registered);
    assert_eq!(invoice.withholding_tax_amount, Some(dec!(1000)));
    assert_eq!(invoice.net_amount_due, Some(dec!(10200)));
}

#[tokio::test]
async fn vat_aware_invoice_to_an_individual_has_no_withholding() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Juan dela Cruz").await;

    let response = app
        .post(
            "/invoices",
            json!({
                "client_id": client_id,
                "currency": "PHP",
                "issue_date": "2026-03-01",
                "due_date": "2099-12-31",
                "tax_rate": "0",
                "vat_registered": true,
                "line_items": [
                    { "description": "Consulting", "quantity": "1", "rate": "10000" }
                ]
            }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let invoice: Invoice = response.json().await.unwrap();

    assert_eq!(invoice.tax_amount, dec!(1200));
    assert_eq!(invoice.withholding_tax_amount, Some(Decimal::ZERO));
    assert_eq!(invoice.net_amount_due, Some(dec!(11200)));
}

#[tokio::test]
async fn creating_an_invoice_for_a_missing_client_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/invoices",
            json!({
                "client_id": "99999999-9999-9999-9999-999999999999",
                "currency": "PHP",
                "issue_date": "2026-03-01",
                "due_date": "2099-12-31",
                "tax_rate": "12",
                "line_items": [
                    { "description": "Work", "quantity": "1", "rate": "100" }
                ]
            }),
        )
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn malformed_invoices_are_rejected() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Validation Co").await;

    // No line items.
    let response = app
        .post(
            "/invoices",
            json!({
                "client_id": client_id,
                "currency": "PHP",
                "issue_date": "2026-03-01",
                "due_date": "2099-12-31",
                "tax_rate": "12",
                "line_items": []
            }),
        )
        .await;
    assert_eq!(response.status(), 422);

    // Zero quantity.
    let response = app
        .post(
            "/invoices",
            json!({
                "client_id": client_id,
                "currency": "PHP",
                "issue_date": "2026-03-01",
                "due_date": "2099-12-31",
                "tax_rate": "12",
                "line_items": [
                    { "description": "Work", "quantity": "0", "rate": "100" }
                ]
            }),
        )
        .await;
    assert_eq!(response.status(), 422);

    // Due date before issue date.
    let response = app
        .post(
            "/invoices",
            json!({
                "client_id": client_id,
                "currency": "PHP",
                "issue_date": "2026-03-01",
                "due_date": "2026-02-01",
                "tax_rate": "12",
                "line_items": [
                    { "description": "Work", "quantity": "1", "rate": "100" }
                ]
            }),
        )
        .await;
    assert_eq!(response.status(), 422);

    // Percentage discount over 100.
    let response = app
        .post(
            "/invoices",
            json!({
                "client_id": client_id,
                "currency": "PHP",
                "issue_date": "2026-03-01",
                "due_date": "2099-12-31",
                "tax_rate": "12",
                "discount": { "kind": "percentage", "value": "150" },
                "line_items": [
                    { "description": "Work", "quantity": "1", "rate": "100" }
                ]
            }),
        )
        .await;
    assert_eq!(response.status(), 422);
}

#[tokio::test]
async fn get_invoice_not_found_returns_404() {
    let app = TestApp::spawn().await;
    let response = app
        .get("/invoices/99999999-9999-9999-9999-999999999999")
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn updating_line_items_recalculates_totals_and_reconverts() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Update Co").await;
    let invoice = app.create_standard_invoice(client_id, "USD").await;

    let response = app
        .patch(
            &format!("/invoices/{}", invoice.invoice_id),
            json!({
                "line_items": [
                    { "description": "Revised scope", "quantity": "2", "rate": "1000" }
                ]
            }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let updated: Invoice = response.json().await.unwrap();

    assert_eq!(updated.subtotal, dec!(2000));
    assert_eq!(updated.tax_amount, dec!(240));
    assert_eq!(updated.total, dec!(2240));
    assert_eq!(updated.remaining_balance, dec!(2240));
    assert_eq!(updated.total_php, Some(dec!(125440.00)));
    // Identity stays put.
    assert_eq!(updated.invoice_number, invoice.invoice_number);
    assert_eq!(updated.created_utc, invoice.created_utc);
}

#[tokio::test]
async fn list_invoices_filters_by_effective_status() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Filter Co").await;

    app.create_standard_invoice(client_id, "PHP").await;
    app.create_sent_invoice(client_id, "PHP").await;

    let response = app.get("/invoices?status=draft").await;
    assert_eq!(response.status(), 200);
    let drafts: Vec<Invoice> = response.json().await.unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].status, "draft");

    let response = app.get("/invoices?status=sent").await;
    let sent: Vec<Invoice> = response.json().await.unwrap();
    assert_eq!(sent.len(), 1);

    let response = app.get("/invoices").await;
    let all: Vec<Invoice> = response.json().await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn missing_user_header_is_rejected() {
    let app = TestApp::spawn().await;
    let response = app
        .client
        .get(format!("{}/invoices", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);
}

#[tokio::test]
async fn analytics_aggregates_by_effective_status() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Analytics Co").await;

    app.create_standard_invoice(client_id, "PHP").await;
    let sent = app.create_sent_invoice(client_id, "PHP").await;
    let paid = app.create_sent_invoice(client_id, "PHP").await;
    let response = app.record_payment(paid.invoice_id, "7840").await;
    assert_eq!(response.status(), 201);

    let response = app.get("/analytics/invoices?period=all").await;
    assert_eq!(response.status(), 200);
    let analytics: serde_json::Value = response.json().await.unwrap();

    assert_eq!(analytics["invoice_count"], 3);
    assert_eq!(analytics["by_status"]["draft"], 1);
    assert_eq!(analytics["by_status"]["sent"], 1);
    assert_eq!(analytics["by_status"]["paid"], 1);
    assert_eq!(analytics["total_collected"].as_str().unwrap(), "7840");
    // Only the sent invoice still carries an outstanding balance.
    assert_eq!(
        analytics["total_outstanding"].as_str().unwrap(),
        sent.remaining_balance.to_string()
    );
}
