//! Invoice model for the invoicing engine.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored invoice status.
///
/// `Overdue` is derived at read time for past-due invoices that have left
/// `Draft`; it is never written back. `Paid` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Viewed,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Viewed => "viewed",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "sent" => InvoiceStatus::Sent,
            "viewed" => InvoiceStatus::Viewed,
            "paid" => InvoiceStatus::Paid,
            "overdue" => InvoiceStatus::Overdue,
            "cancelled" => InvoiceStatus::Cancelled,
            _ => InvoiceStatus::Draft,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Cancelled)
    }
}

/// Invoice line item. `amount` is always `quantity * rate`, never set
/// independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    Percentage,
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discount {
    pub kind: DiscountKind,
    pub value: Decimal,
}

/// Invoice document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub user_id: String,
    /// Unique, sequential per calendar month: `INV-YYYY-MM-NNN`.
    /// Immutable after creation.
    pub invoice_number: String,
    pub status: String,
    pub client_id: Uuid,
    pub client_name: String,
    pub client_email: String,
    pub client_address: Option<String>,
    pub client_is_business: bool,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub line_items: Vec<LineItem>,
    pub subtotal: Decimal,
    /// Percent, 0-100.
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub discount: Option<Discount>,
    pub total: Decimal,
    /// Set when the issuer is VAT-registered: a fixed 12% VAT replaces
    /// the supplied tax rate, and business clients withhold 10% at
    /// source.
    pub issuer_vat_registered: bool,
    pub withholding_tax_amount: Option<Decimal>,
    pub net_amount_due: Option<Decimal>,
    pub total_php: Option<Decimal>,
    pub exchange_rate: Option<Decimal>,
    pub total_paid: Decimal,
    pub remaining_balance: Decimal,
    pub payment_percentage: Decimal,
    pub reminders_sent: Vec<DateTime<Utc>>,
    pub pdf_url: Option<String>,
    pub notes: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub paid_at: Option<NaiveDate>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Invoice {
    pub fn status_enum(&self) -> InvoiceStatus {
        InvoiceStatus::from_string(&self.status)
    }

    /// Status as observed by callers: past-due invoices that have been
    /// sent (or viewed) read as `Overdue`. The stored value is untouched.
    pub fn effective_status(&self, today: NaiveDate) -> InvoiceStatus {
        match self.status_enum() {
            status @ (InvoiceStatus::Sent | InvoiceStatus::Viewed) => {
                if self.due_date < today {
                    InvoiceStatus::Overdue
                } else {
                    status
                }
            }
            status => status,
        }
    }

    pub fn is_fully_paid(&self) -> bool {
        self.remaining_balance.is_zero() && self.total_paid > Decimal::ZERO
    }

    /// Copy of the invoice with the derived status written into `status`,
    /// for responses. Stored state is never updated this way.
    pub fn presented(mut self, today: NaiveDate) -> Self {
        self.status = self.effective_status(today).as_str().to_string();
        self
    }
}

/// Line item input; `amount` is derived by the calculator.
#[derive(Debug, Clone, Deserialize)]
pub struct LineItemInput {
    pub description: String,
    pub quantity: Decimal,
    pub rate: Decimal,
    #[serde(default)]
    pub taxable: Option<bool>,
    #[serde(default)]
    pub tax_rate: Option<Decimal>,
}

/// Input for creating an invoice.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub client_id: Uuid,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub line_items: Vec<LineItemInput>,
    pub tax_rate: Decimal,
    pub discount: Option<Discount>,
    /// Issuer is VAT-registered: VAT-aware totals apply.
    pub vat_registered: bool,
    pub notes: Option<String>,
}

/// Partial update. Identity fields (id, owner, invoice number, creation
/// time) are not representable here and therefore cannot be mutated.
#[derive(Debug, Clone, Default)]
pub struct UpdateInvoice {
    pub due_date: Option<NaiveDate>,
    pub line_items: Option<Vec<LineItemInput>>,
    pub tax_rate: Option<Decimal>,
    /// `Some(None)` clears the discount, `Some(Some(_))` replaces it.
    pub discount: Option<Option<Discount>>,
    pub notes: Option<String>,
}

impl UpdateInvoice {
    /// True when the update touches anything that feeds the totals.
    pub fn affects_totals(&self) -> bool {
        self.line_items.is_some() || self.tax_rate.is_some() || self.discount.is_some()
    }
}

/// Filter parameters for listing invoices. Status filtering is applied
/// against the effective (derived) status.
#[derive(Debug, Clone, Default)]
pub struct ListInvoicesFilter {
    pub status: Option<InvoiceStatus>,
    pub client_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}
