//! In-memory store.
//!
//! Backs the test suite and local development without Postgres. The write
//! lock is the serialization point: `apply_payment` holds it across the
//! read-evaluate-write sequence, which gives the same "no two payments see
//! the same unpaid invoice" guarantee the SQL implementation gets from
//! `SELECT ... FOR UPDATE`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use kwenta_core::error::AppError;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ApplyPayment, FinanceStore, PaymentCommit};
use crate::models::{Client, Invoice, ListInvoicesFilter, Payment, Transaction};

#[derive(Default)]
struct State {
    clients: HashMap<Uuid, Client>,
    invoices: HashMap<Uuid, Invoice>,
    payments: Vec<Payment>,
    transactions: Vec<Transaction>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FinanceStore for InMemoryStore {
    async fn insert_client(&self, client: &Client) -> Result<(), AppError> {
        let mut state = self.inner.write().await;
        state.clients.insert(client.client_id, client.clone());
        Ok(())
    }

    async fn get_client(
        &self,
        user_id: &str,
        client_id: Uuid,
    ) -> Result<Option<Client>, AppError> {
        let state = self.inner.read().await;
        Ok(state
            .clients
            .get(&client_id)
            .filter(|c| c.user_id == user_id)
            .cloned())
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError> {
        let mut state = self.inner.write().await;
        state.invoices.insert(invoice.invoice_id, invoice.clone());
        Ok(())
    }

    async fn get_invoice(
        &self,
        user_id: &str,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let state = self.inner.read().await;
        Ok(state
            .invoices
            .get(&invoice_id)
            .filter(|i| i.user_id == user_id)
            .cloned())
    }

    async fn list_invoices(
        &self,
        user_id: &str,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, AppError> {
        let state = self.inner.read().await;
        let mut invoices: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|i| i.user_id == user_id)
            .filter(|i| filter.client_id.map(|c| i.client_id == c).unwrap_or(true))
            .filter(|i| filter.start_date.map(|d| i.issue_date >= d).unwrap_or(true))
            .filter(|i| filter.end_date.map(|d| i.issue_date <= d).unwrap_or(true))
            .cloned()
            .collect();
        invoices.sort_by(|a, b| a.invoice_number.cmp(&b.invoice_number));
        Ok(invoices)
    }

    async fn update_invoice(&self, invoice: &Invoice) -> Result<(), AppError> {
        let mut state = self.inner.write().await;
        match state.invoices.get_mut(&invoice.invoice_id) {
            Some(existing) if existing.user_id == invoice.user_id => {
                *existing = invoice.clone();
                Ok(())
            }
            _ => Err(AppError::NotFound(anyhow::anyhow!("Invoice not found"))),
        }
    }

    async fn delete_draft_invoice(
        &self,
        user_id: &str,
        invoice_id: Uuid,
    ) -> Result<bool, AppError> {
        let mut state = self.inner.write().await;
        let deletable = state
            .invoices
            .get(&invoice_id)
            .map(|i| i.user_id == user_id && i.status == "draft")
            .unwrap_or(false);
        if deletable {
            state.invoices.remove(&invoice_id);
        }
        Ok(deletable)
    }

    async fn count_invoices_in_month(
        &self,
        user_id: &str,
        year: i32,
        month: u32,
    ) -> Result<i64, AppError> {
        let state = self.inner.read().await;
        Ok(state
            .invoices
            .values()
            .filter(|i| i.user_id == user_id)
            .filter(|i| {
                use chrono::Datelike;
                i.issue_date.year() == year && i.issue_date.month() == month
            })
            .count() as i64)
    }

    async fn apply_payment(
        &self,
        user_id: &str,
        invoice_id: Uuid,
        apply: ApplyPayment,
    ) -> Result<PaymentCommit, AppError> {
        let mut state = self.inner.write().await;
        let invoice = state
            .invoices
            .get(&invoice_id)
            .filter(|i| i.user_id == user_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        let commit = apply(&invoice)?;

        state
            .invoices
            .insert(commit.invoice.invoice_id, commit.invoice.clone());
        state.payments.push(commit.payment.clone());
        state.transactions.push(commit.transaction.clone());
        Ok(commit)
    }

    async fn list_payments(
        &self,
        user_id: &str,
        invoice_id: Uuid,
    ) -> Result<Vec<Payment>, AppError> {
        let state = self.inner.read().await;
        Ok(state
            .payments
            .iter()
            .filter(|p| p.user_id == user_id && p.invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    async fn list_transactions(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Transaction>, AppError> {
        let state = self.inner.read().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id && t.date >= start && t.date <= end)
            .cloned()
            .collect())
    }
}
