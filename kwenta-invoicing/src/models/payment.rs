//! Payment model for the invoicing engine.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Only `Completed` payments count toward an invoice balance. A completed
/// payment is immutable; corrections are offsetting payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Completed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    Gcash,
    Paymaya,
    Paypal,
    Wise,
    Cash,
    Check,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Gcash => "gcash",
            PaymentMethod::Paymaya => "paymaya",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::Wise => "wise",
            PaymentMethod::Cash => "cash",
            PaymentMethod::Check => "check",
            PaymentMethod::Other => "other",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "bank_transfer" => PaymentMethod::BankTransfer,
            "gcash" => PaymentMethod::Gcash,
            "paymaya" => PaymentMethod::Paymaya,
            "paypal" => PaymentMethod::Paypal,
            "wise" => PaymentMethod::Wise,
            "cash" => PaymentMethod::Cash,
            "check" => PaymentMethod::Check,
            _ => PaymentMethod::Other,
        }
    }
}

/// Payment record against an invoice.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub user_id: String,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    /// Converted at the payment date's rate, not the invoice's.
    pub amount_php: Decimal,
    pub exchange_rate: Decimal,
    pub payment_date: NaiveDate,
    pub payment_method: String,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub status: String,
    /// Back-reference to the income transaction created with this payment.
    pub transaction_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

/// Input for recording a payment. The payment is denominated in the
/// invoice's currency.
#[derive(Debug, Clone)]
pub struct RecordPayment {
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub allow_overpayment: bool,
}

/// Pure read over an invoice's completed payments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub invoice_id: Uuid,
    pub total: Decimal,
    pub total_paid: Decimal,
    pub remaining_balance: Decimal,
    pub payment_count: usize,
    pub is_fully_paid: bool,
    pub is_partially_paid: bool,
}
