//! Persistence seam for the invoicing engine.
//!
//! Any store exposing atomic multi-record commit with read-then-write
//! semantics can back the engine. Payments go through [`FinanceStore::apply_payment`]:
//! the store re-reads the invoice inside its own transaction and evaluates
//! a pure closure against that snapshot, so two concurrent payments can
//! never both see an unpaid invoice. The Payment, the updated Invoice, and
//! the derived Transaction commit together or not at all.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use kwenta_core::error::AppError;
use uuid::Uuid;

use crate::models::{Client, Invoice, ListInvoicesFilter, Payment, Transaction};

/// The three records written by a successful payment, plus any warnings
/// produced while reconciling (e.g. an accepted overpayment).
#[derive(Debug, Clone)]
pub struct PaymentCommit {
    pub invoice: Invoice,
    pub payment: Payment,
    pub transaction: Transaction,
    pub warnings: Vec<String>,
}

/// Reconciliation step evaluated against the transaction-current invoice.
/// Must be pure: no I/O, the store may re-run it after a retryable
/// conflict.
pub type ApplyPayment = Box<dyn FnOnce(&Invoice) -> Result<PaymentCommit, AppError> + Send>;

#[async_trait]
pub trait FinanceStore: Send + Sync {
    async fn insert_client(&self, client: &Client) -> Result<(), AppError>;
    async fn get_client(&self, user_id: &str, client_id: Uuid)
        -> Result<Option<Client>, AppError>;

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError>;
    async fn get_invoice(
        &self,
        user_id: &str,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError>;
    /// Filtering by `filter.status` is the caller's job (it applies to the
    /// derived status); stores filter on client and date range only.
    async fn list_invoices(
        &self,
        user_id: &str,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, AppError>;
    async fn update_invoice(&self, invoice: &Invoice) -> Result<(), AppError>;
    /// Deletes only while the stored status is `draft`; returns whether a
    /// row was removed.
    async fn delete_draft_invoice(
        &self,
        user_id: &str,
        invoice_id: Uuid,
    ) -> Result<bool, AppError>;
    /// Number of invoices issued in the given calendar month, for
    /// sequential invoice numbering.
    async fn count_invoices_in_month(
        &self,
        user_id: &str,
        year: i32,
        month: u32,
    ) -> Result<i64, AppError>;

    /// Atomically commit a payment: re-read the invoice, evaluate `apply`
    /// against the current state, and persist all three records together.
    async fn apply_payment(
        &self,
        user_id: &str,
        invoice_id: Uuid,
        apply: ApplyPayment,
    ) -> Result<PaymentCommit, AppError>;
    async fn list_payments(
        &self,
        user_id: &str,
        invoice_id: Uuid,
    ) -> Result<Vec<Payment>, AppError>;

    async fn list_transactions(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Transaction>, AppError>;
}
