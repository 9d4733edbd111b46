//! Shared test harness: in-process HTTP server over the in-memory store
//! with mock collaborators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kwenta_core::error::AppError;
use kwenta_invoicing::models::{Invoice, Payment};
use kwenta_invoicing::services::{
    EmailReceipt, ExchangeRateService, InMemoryStore, InvoiceMailer, PdfRenderer, RateFetcher,
};
use kwenta_invoicing::startup::{build_router, AppState};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

pub const TEST_USER_ID: &str = "user-001";

/// Deterministic rates: PHP value per unit of each currency.
struct FixedRateFetcher;

fn php_value(code: &str) -> Option<Decimal> {
    match code {
        "PHP" => Some(dec!(1)),
        "USD" => Some(dec!(56)),
        "EUR" => Some(dec!(60)),
        _ => None,
    }
}

#[async_trait]
impl RateFetcher for FixedRateFetcher {
    async fn fetch(
        &self,
        base: &str,
    ) -> Result<kwenta_invoicing::services::exchange::RateTable, AppError> {
        let base_value = php_value(base).ok_or_else(|| {
            AppError::external("exchange-rate", anyhow::anyhow!("unknown base {}", base))
        })?;
        let rates = ["PHP", "USD", "EUR"]
            .into_iter()
            .map(|code| {
                let value = php_value(code).expect("known code");
                (code.to_string(), base_value / value)
            })
            .collect();
        Ok(kwenta_invoicing::services::exchange::RateTable {
            base: base.to_string(),
            rates,
        })
    }
}

/// Records dispatches; flips to failure on demand.
#[derive(Default)]
pub struct MockMailer {
    pub fail: AtomicBool,
    pub sent: Mutex<Vec<String>>,
}

impl MockMailer {
    async fn dispatch(&self, kind: &str) -> Result<EmailReceipt, AppError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::external(
                "email",
                anyhow::anyhow!("smtp relay unreachable"),
            ));
        }
        self.sent.lock().await.push(kind.to_string());
        Ok(EmailReceipt {
            email_id: Uuid::new_v4().to_string(),
            status: "sent".to_string(),
        })
    }
}

#[async_trait]
impl InvoiceMailer for MockMailer {
    async fn send_invoice(&self, _invoice: &Invoice) -> Result<EmailReceipt, AppError> {
        self.dispatch("invoice").await
    }

    async fn send_reminder(&self, _invoice: &Invoice) -> Result<EmailReceipt, AppError> {
        self.dispatch("reminder").await
    }

    async fn send_payment_confirmation(
        &self,
        _invoice: &Invoice,
        _payment: &Payment,
    ) -> Result<EmailReceipt, AppError> {
        self.dispatch("payment_confirmation").await
    }
}

#[derive(Default)]
pub struct MockRenderer {
    pub fail: AtomicBool,
}

#[async_trait]
impl PdfRenderer for MockRenderer {
    async fn render_invoice(&self, invoice: &Invoice) -> Result<String, AppError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::external(
                "pdf-renderer",
                anyhow::anyhow!("renderer down"),
            ));
        }
        Ok(format!(
            "https://files.test/invoices/{}.pdf",
            invoice.invoice_id
        ))
    }
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub mailer: Arc<MockMailer>,
    pub renderer: Arc<MockRenderer>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let rates = Arc::new(ExchangeRateService::new(
            Arc::new(FixedRateFetcher),
            Duration::from_secs(900),
            Duration::from_secs(5),
        ));
        let mailer = Arc::new(MockMailer::default());
        let renderer = Arc::new(MockRenderer::default());

        let state = AppState::build(
            store,
            rates,
            renderer.clone(),
            mailer.clone(),
            dec!(0.5),
        );
        let router = build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let address = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Server failed");
        });

        Self {
            address,
            client: reqwest::Client::new(),
            mailer,
            renderer,
        }
    }

    pub async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .header("X-User-ID", TEST_USER_ID)
            .json(&body)
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn post_empty(&self, path: &str) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .header("X-User-ID", TEST_USER_ID)
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .header("X-User-ID", TEST_USER_ID)
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn patch(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .patch(format!("{}{}", self.address, path))
            .header("X-User-ID", TEST_USER_ID)
            .json(&body)
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.client
            .delete(format!("{}{}", self.address, path))
            .header("X-User-ID", TEST_USER_ID)
            .send()
            .await
            .expect("Request failed")
    }

    /// Register a client and return its id.
    pub async fn create_client(&self, name: &str) -> Uuid {
        self.create_client_with(name, false).await
    }

    pub async fn create_client_with(&self, name: &str, is_business: bool) -> Uuid {
        let response = self
            .post(
                "/clients",
                json!({
                    "name": name,
                    "email": "client@example.com",
                    "address": "123 Mabini St, Manila",
                    "is_business": is_business
                }),
            )
            .await;
        assert_eq!(response.status(), 201, "Failed to create client");
        let body: Value = response.json().await.expect("Invalid client JSON");
        body["client_id"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .expect("Missing client_id")
    }

    /// Create the standard two-line-item invoice: qty 10 @ 500 plus
    /// qty 1 @ 2000 at 12% tax -> subtotal 7000, tax 840, total 7840.
    pub async fn create_standard_invoice(&self, client_id: Uuid, currency: &str) -> Invoice {
        let response = self
            .post(
                "/invoices",
                json!({
                    "client_id": client_id,
                    "currency": currency,
                    "issue_date": "2026-03-01",
                    "due_date": "2099-12-31",
                    "tax_rate": "12",
                    "line_items": [
                        { "description": "Web development", "quantity": "10", "rate": "500" },
                        { "description": "Hosting setup", "quantity": "1", "rate": "2000" }
                    ]
                }),
            )
            .await;
        assert_eq!(response.status(), 201, "Failed to create invoice");
        response.json().await.expect("Invalid invoice JSON")
    }

    /// Create the standard invoice and move it to `sent`.
    pub async fn create_sent_invoice(&self, client_id: Uuid, currency: &str) -> Invoice {
        let invoice = self.create_standard_invoice(client_id, currency).await;
        let response = self
            .post_empty(&format!("/invoices/{}/send", invoice.invoice_id))
            .await;
        assert_eq!(response.status(), 200, "Failed to send invoice");
        let body: Value = response.json().await.expect("Invalid send JSON");
        serde_json::from_value(body["invoice"].clone()).expect("Invalid invoice in send outcome")
    }

    pub async fn record_payment(&self, invoice_id: Uuid, amount: &str) -> reqwest::Response {
        self.post(
            &format!("/invoices/{}/payments", invoice_id),
            json!({
                "amount": amount,
                "payment_date": "2026-03-15",
                "payment_method": "gcash"
            }),
        )
        .await
    }
}
