//! Philippine tax calculation integration tests.

mod common;

use common::TestApp;
use kwenta_invoicing::models::{QuarterlyReturn, TaxCalculation};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn progressive_income_tax_on_the_fifteen_percent_bracket() {
    let app = TestApp::spawn().await;

    // 500k gross takes the 40% OSD -> 300k taxable -> 15% bracket.
    let response = app
        .post(
            "/tax/calculate",
            json!({
                "gross_income": "500000",
                "income_type": "freelancing"
            }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let result: TaxCalculation = response.json().await.unwrap();

    assert_eq!(result.taxable_income, dec!(300000));
    assert_eq!(result.income_tax, dec!(7500));
    assert_eq!(result.breakdown.bracket.rate, dec!(0.15));
    assert_eq!(result.breakdown.deductions.applied, dec!(200000));
    // Below the VAT threshold and not registered: no VAT, no percentage tax.
    assert_eq!(result.vat_amount, Decimal::ZERO);
    assert_eq!(result.percentage_tax, Decimal::ZERO);
}

#[tokio::test]
async fn vat_registered_gross_of_100k_nets_6k_vat() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/tax/calculate",
            json!({
                "gross_income": "100000",
                "income_type": "freelancing",
                "is_vat_registered": true
            }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let result: TaxCalculation = response.json().await.unwrap();

    assert_eq!(result.breakdown.vat.output_vat, dec!(12000));
    assert_eq!(result.breakdown.vat.input_vat, dec!(6000));
    assert_eq!(result.vat_amount, dec!(6000));
}

#[tokio::test]
async fn net_income_invariant_holds_over_the_wire() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/tax/calculate",
            json!({
                "gross_income": "1000000",
                "income_type": "professional_services",
                "is_vat_registered": true
            }),
        )
        .await;
    let result: TaxCalculation = response.json().await.unwrap();

    assert_eq!(
        result.net_income,
        result.gross_income - (result.income_tax + result.vat_amount + result.percentage_tax)
    );
    // Withholding is disclosed, not part of the subtraction.
    assert_eq!(result.withholding_tax, dec!(100000));
}

#[tokio::test]
async fn cross_currency_calculation_keeps_php_audit_figures() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/tax/calculate",
            json!({
                "gross_income": "10000",
                "currency": "USD",
                "income_type": "freelancing"
            }),
        )
        .await;
    let result: TaxCalculation = response.json().await.unwrap();

    assert_eq!(result.currency, "USD");
    assert_eq!(result.php_equivalent.gross_income, dec!(560000));
    assert_eq!(result.php_equivalent.exchange_rate, dec!(56));
    // 560k gross, 224k OSD -> 336k taxable -> 12,900 PHP income tax.
    assert_eq!(result.php_equivalent.income_tax, dec!(12900));
    assert_eq!(result.income_tax, round_usd(dec!(12900) / dec!(56)));
}

fn round_usd(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}

#[tokio::test]
async fn quarterly_return_aggregates_recorded_payments() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Quarterly Co").await;

    // Two paid invoices in Q1 2026 (payment helper pays on 2026-03-15).
    for _ in 0..2 {
        let invoice = app.create_sent_invoice(client_id, "PHP").await;
        let response = app.record_payment(invoice.invoice_id, "7840").await;
        assert_eq!(response.status(), 201);
    }

    let response = app
        .post(
            "/tax/quarterly",
            json!({
                "quarter": 1,
                "year": 2026,
                "income_type": "freelancing"
            }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let quarterly: QuarterlyReturn = response.json().await.unwrap();

    assert_eq!(quarterly.gross_income, dec!(15680));
    assert_eq!(quarterly.transaction_count, 2);
    assert_eq!(quarterly.due_date.to_string(), "2026-04-15");
    // Well under the 250k bracket floor after deductions.
    assert_eq!(quarterly.tax.income_tax, Decimal::ZERO);
    assert_eq!(quarterly.balance_due, Decimal::ZERO);
}

#[tokio::test]
async fn quarterly_return_nets_previous_payments_and_never_goes_negative() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Netting Co").await;

    // One large paid invoice in Q1 2026.
    let response = app
        .post(
            "/invoices",
            json!({
                "client_id": client_id,
                "currency": "PHP",
                "issue_date": "2026-03-01",
                "due_date": "2099-12-31",
                "tax_rate": "0",
                "line_items": [
                    { "description": "Annual retainer", "quantity": "1", "rate": "500000" }
                ]
            }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let invoice: kwenta_invoicing::models::Invoice = response.json().await.unwrap();
    let response = app
        .post_empty(&format!("/invoices/{}/send", invoice.invoice_id))
        .await;
    assert_eq!(response.status(), 200);
    let response = app.record_payment(invoice.invoice_id, "500000").await;
    assert_eq!(response.status(), 201);

    // 500k gross -> 300k taxable -> 7,500 tax; 5,000 already paid.
    let response = app
        .post(
            "/tax/quarterly",
            json!({
                "quarter": 1,
                "year": 2026,
                "income_type": "freelancing",
                "previous_payments": "5000"
            }),
        )
        .await;
    let quarterly: QuarterlyReturn = response.json().await.unwrap();
    assert_eq!(quarterly.tax.income_tax, dec!(7500));
    assert_eq!(quarterly.balance_due, dec!(2500));

    // Overpaying the quarter owes nothing.
    let response = app
        .post(
            "/tax/quarterly",
            json!({
                "quarter": 1,
                "year": 2026,
                "income_type": "freelancing",
                "previous_payments": "99999"
            }),
        )
        .await;
    let quarterly: QuarterlyReturn = response.json().await.unwrap();
    assert_eq!(quarterly.balance_due, Decimal::ZERO);
}

#[tokio::test]
async fn invalid_tax_inputs_are_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/tax/calculate",
            json!({
                "gross_income": "-5",
                "income_type": "freelancing"
            }),
        )
        .await;
    assert_eq!(response.status(), 422);

    let response = app
        .post(
            "/tax/quarterly",
            json!({
                "quarter": 7,
                "year": 2026,
                "income_type": "freelancing"
            }),
        )
        .await;
    assert_eq!(response.status(), 422);
}
