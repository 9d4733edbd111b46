//! Income transactions derived from completed payments.
//!
//! Owned by the payment reconciliation engine: created exactly once per
//! completed payment, never mutated afterwards. The invoice side never
//! writes these directly.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Income,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "income",
        }
    }
}

/// Traceability links back to the originating documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    pub invoice_id: Uuid,
    pub payment_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: Uuid,
    pub user_id: String,
    pub transaction_type: String,
    pub amount: Decimal,
    pub currency: String,
    pub amount_php: Decimal,
    pub date: NaiveDate,
    pub description: String,
    pub metadata: TransactionMetadata,
    pub created_utc: DateTime<Utc>,
}
