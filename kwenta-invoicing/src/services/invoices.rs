//! Invoice lifecycle manager.
//!
//! Owns the invoice state machine (`draft -> sent -> viewed -> paid`,
//! with explicit cancellation and derived overdue), invoice numbering,
//! and CRUD against the store. Collaborator dispatch happens after the
//! state change is committed; an email failure is reported to the caller
//! but never rolls the transition back.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use kwenta_core::error::AppError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::models::{
    Client, CreateClient, CreateInvoice, Discount, DiscountKind, Invoice, InvoiceStatus,
    LineItemInput, ListInvoicesFilter, UpdateInvoice,
};
use crate::services::calculator;
use crate::services::email::{EmailReceipt, InvoiceMailer};
use crate::services::exchange::{ExchangeRateService, PHP};
use crate::services::metrics::INVOICES_TOTAL;
use crate::services::pdf::PdfRenderer;
use crate::services::store::FinanceStore;

/// Result of an operation that also dispatches email: the state change is
/// already committed, and a dispatch failure rides along as a warning.
#[derive(Debug, Serialize)]
pub struct SendOutcome {
    pub invoice: Invoice,
    pub email: Option<EmailReceipt>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsPeriod {
    Month,
    Quarter,
    Year,
    All,
}

impl AnalyticsPeriod {
    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "month" => Ok(AnalyticsPeriod::Month),
            "quarter" => Ok(AnalyticsPeriod::Quarter),
            "year" => Ok(AnalyticsPeriod::Year),
            "all" => Ok(AnalyticsPeriod::All),
            other => Err(AppError::Validation(anyhow::anyhow!(
                "unknown analytics period '{}'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsPeriod::Month => "month",
            AnalyticsPeriod::Quarter => "quarter",
            AnalyticsPeriod::Year => "year",
            AnalyticsPeriod::All => "all",
        }
    }

    fn start_date(&self, today: NaiveDate) -> Option<NaiveDate> {
        let date = |m, d| NaiveDate::from_ymd_opt(today.year(), m, d).expect("valid date");
        match self {
            AnalyticsPeriod::Month => Some(date(today.month(), 1)),
            AnalyticsPeriod::Quarter => {
                let quarter_start_month = (today.month0() / 3) * 3 + 1;
                Some(date(quarter_start_month, 1))
            }
            AnalyticsPeriod::Year => Some(date(1, 1)),
            AnalyticsPeriod::All => None,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct StatusCounts {
    pub draft: u64,
    pub sent: u64,
    pub viewed: u64,
    pub paid: u64,
    pub overdue: u64,
    pub cancelled: u64,
}

#[derive(Debug, Serialize)]
pub struct InvoiceAnalytics {
    pub period: String,
    pub invoice_count: usize,
    pub by_status: StatusCounts,
    /// Sum of totals, cancelled invoices excluded.
    pub total_invoiced: Decimal,
    pub total_collected: Decimal,
    /// Outstanding balance across sent, viewed, and overdue invoices.
    pub total_outstanding: Decimal,
}

pub struct InvoiceService {
    store: Arc<dyn FinanceStore>,
    rates: Arc<ExchangeRateService>,
    pdf: Arc<dyn PdfRenderer>,
    mailer: Arc<dyn InvoiceMailer>,
}

impl InvoiceService {
    pub fn new(
        store: Arc<dyn FinanceStore>,
        rates: Arc<ExchangeRateService>,
        pdf: Arc<dyn PdfRenderer>,
        mailer: Arc<dyn InvoiceMailer>,
    ) -> Self {
        Self {
            store,
            rates,
            pdf,
            mailer,
        }
    }

    pub async fn create_client(
        &self,
        user_id: &str,
        input: CreateClient,
    ) -> Result<Client, AppError> {
        if input.name.trim().is_empty() {
            return Err(AppError::Validation(anyhow::anyhow!(
                "client name cannot be empty"
            )));
        }
        let client = Client {
            client_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            name: input.name,
            email: input.email,
            address: input.address,
            is_business: input.is_business,
            created_utc: Utc::now(),
        };
        self.store.insert_client(&client).await?;
        Ok(client)
    }

    pub async fn get_client(&self, user_id: &str, client_id: Uuid) -> Result<Client, AppError> {
        self.store
            .get_client(user_id, client_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))
    }

    #[instrument(skip(self, input), fields(client_id = %input.client_id))]
    pub async fn create_invoice(
        &self,
        user_id: &str,
        input: CreateInvoice,
    ) -> Result<Invoice, AppError> {
        validate_invoice_inputs(
            &input.line_items,
            input.tax_rate,
            input.discount.as_ref(),
            input.issue_date,
            input.due_date,
        )?;
        let currency = normalize_currency(&input.currency)?;

        let client = self.get_client(user_id, input.client_id).await?;

        let line_items = calculator::build_line_items(&input.line_items);
        // VAT-registered issuers get the fixed 12% VAT treatment; the
        // supplied tax rate only applies otherwise.
        let (totals, tax_rate, withholding_tax_amount, net_amount_due) = if input.vat_registered {
            let vat = calculator::compute_totals_vat_aware(
                &line_items,
                input.discount.as_ref(),
                client.is_business,
            );
            (
                vat.totals,
                calculator::VAT_RATE,
                Some(vat.withholding_tax_amount),
                Some(vat.net_amount_due),
            )
        } else {
            (
                calculator::compute_totals(&line_items, input.tax_rate, input.discount.as_ref()),
                input.tax_rate,
                None,
                None,
            )
        };

        let year = input.issue_date.year();
        let month = input.issue_date.month();
        let existing = self
            .store
            .count_invoices_in_month(user_id, year, month)
            .await?;
        let invoice_number = format!("INV-{:04}-{:02}-{:03}", year, month, existing + 1);

        let (total_php, exchange_rate) = if currency != PHP {
            let conversion = self.rates.to_php(totals.total, &currency).await?;
            if conversion.stale {
                warn!(
                    invoice_number = %invoice_number,
                    "Invoice converted with stale exchange rates"
                );
            }
            (Some(conversion.amount), Some(conversion.rate))
        } else {
            (None, None)
        };

        let now = Utc::now();
        let invoice = Invoice {
            invoice_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            invoice_number,
            status: InvoiceStatus::Draft.as_str().to_string(),
            client_id: client.client_id,
            client_name: client.name,
            client_email: client.email,
            client_address: client.address,
            client_is_business: client.is_business,
            currency,
            issue_date: input.issue_date,
            due_date: input.due_date,
            line_items,
            subtotal: totals.subtotal,
            tax_rate,
            tax_amount: totals.tax_amount,
            discount: input.discount,
            total: totals.total,
            issuer_vat_registered: input.vat_registered,
            withholding_tax_amount,
            net_amount_due,
            total_php,
            exchange_rate,
            total_paid: Decimal::ZERO,
            remaining_balance: totals.total,
            payment_percentage: Decimal::ZERO,
            reminders_sent: Vec::new(),
            pdf_url: None,
            notes: input.notes,
            sent_at: None,
            paid_at: None,
            created_utc: now,
            updated_utc: now,
        };

        self.store.insert_invoice(&invoice).await?;
        INVOICES_TOTAL.with_label_values(&["draft"]).inc();
        Ok(invoice)
    }

    pub async fn get_invoice(&self, user_id: &str, invoice_id: Uuid) -> Result<Invoice, AppError> {
        let invoice = self.load(user_id, invoice_id).await?;
        Ok(invoice.presented(today()))
    }

    pub async fn list_invoices(
        &self,
        user_id: &str,
        filter: ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, AppError> {
        let invoices = self.store.list_invoices(user_id, &filter).await?;
        let today = today();
        let presented = invoices.into_iter().map(|i| i.presented(today));
        Ok(match filter.status {
            Some(status) => presented
                .filter(|i| i.status == status.as_str())
                .collect(),
            None => presented.collect(),
        })
    }

    /// Update a draft, sent, or viewed invoice. Identity fields are not
    /// updatable; totals are recalculated (and reconverted for non-PHP
    /// invoices) when line items, tax, or discount change.
    #[instrument(skip(self, update))]
    pub async fn update_invoice(
        &self,
        user_id: &str,
        invoice_id: Uuid,
        update: UpdateInvoice,
    ) -> Result<Invoice, AppError> {
        let mut invoice = self.load(user_id, invoice_id).await?;

        match invoice.status_enum() {
            InvoiceStatus::Paid => {
                return Err(AppError::InvalidOperation(anyhow::anyhow!(
                    "a paid invoice cannot be updated"
                )))
            }
            InvoiceStatus::Cancelled => {
                return Err(AppError::InvalidOperation(anyhow::anyhow!(
                    "a cancelled invoice cannot be updated"
                )))
            }
            _ => {}
        }

        if let Some(due_date) = update.due_date {
            if due_date < invoice.issue_date {
                return Err(AppError::Validation(anyhow::anyhow!(
                    "due date cannot be before the issue date"
                )));
            }
            invoice.due_date = due_date;
        }
        if let Some(notes) = update.notes.clone() {
            invoice.notes = Some(notes);
        }

        if update.affects_totals() {
            if let Some(items) = &update.line_items {
                validate_line_items(items)?;
                invoice.line_items = calculator::build_line_items(items);
            }
            if let Some(tax_rate) = update.tax_rate {
                validate_tax_rate(tax_rate)?;
                invoice.tax_rate = tax_rate;
            }
            if let Some(discount) = update.discount.clone() {
                if let Some(d) = &discount {
                    validate_discount(d)?;
                }
                invoice.discount = discount;
            }

            let totals = if invoice.issuer_vat_registered {
                let vat = calculator::compute_totals_vat_aware(
                    &invoice.line_items,
                    invoice.discount.as_ref(),
                    invoice.client_is_business,
                );
                invoice.tax_rate = calculator::VAT_RATE;
                invoice.withholding_tax_amount = Some(vat.withholding_tax_amount);
                invoice.net_amount_due = Some(vat.net_amount_due);
                vat.totals
            } else {
                calculator::compute_totals(
                    &invoice.line_items,
                    invoice.tax_rate,
                    invoice.discount.as_ref(),
                )
            };
            invoice.subtotal = totals.subtotal;
            invoice.tax_amount = totals.tax_amount;
            invoice.total = totals.total;
            invoice.remaining_balance = (invoice.total - invoice.total_paid).max(Decimal::ZERO);
            invoice.payment_percentage =
                calculator::payment_percentage(invoice.total_paid, invoice.total);

            if invoice.currency != PHP {
                let conversion = self.rates.to_php(invoice.total, &invoice.currency).await?;
                invoice.total_php = Some(conversion.amount);
                invoice.exchange_rate = Some(conversion.rate);
            }
        }

        invoice.updated_utc = Utc::now();
        self.store.update_invoice(&invoice).await?;
        Ok(invoice.presented(today()))
    }

    /// Delete is permitted only while the invoice is still a draft.
    #[instrument(skip(self))]
    pub async fn delete_invoice(&self, user_id: &str, invoice_id: Uuid) -> Result<(), AppError> {
        let invoice = self.load(user_id, invoice_id).await?;
        if invoice.status_enum() != InvoiceStatus::Draft {
            return Err(AppError::InvalidOperation(anyhow::anyhow!(
                "only draft invoices can be deleted (status is '{}')",
                invoice.status
            )));
        }
        let deleted = self.store.delete_draft_invoice(user_id, invoice_id).await?;
        if !deleted {
            return Err(AppError::ConcurrencyConflict(anyhow::anyhow!(
                "invoice left draft status during deletion, retry the operation"
            )));
        }
        INVOICES_TOTAL.with_label_values(&["deleted"]).inc();
        Ok(())
    }

    /// `draft -> sent`. Requires a rendered PDF; the send email is
    /// dispatched after the transition is committed.
    #[instrument(skip(self))]
    pub async fn send_invoice(&self, user_id: &str, invoice_id: Uuid) -> Result<SendOutcome, AppError> {
        let mut invoice = self.load(user_id, invoice_id).await?;
        if invoice.status_enum() != InvoiceStatus::Draft {
            return Err(AppError::InvalidOperation(anyhow::anyhow!(
                "only draft invoices can be sent (status is '{}')",
                invoice.status
            )));
        }

        // Without a document there is nothing to dispatch: PDF failure
        // aborts the transition.
        let pdf_url = self.pdf.render_invoice(&invoice).await?;

        invoice.status = InvoiceStatus::Sent.as_str().to_string();
        invoice.sent_at = Some(Utc::now());
        invoice.pdf_url = Some(pdf_url);
        invoice.updated_utc = Utc::now();
        self.store.update_invoice(&invoice).await?;
        INVOICES_TOTAL.with_label_values(&["sent"]).inc();

        let mut warnings = Vec::new();
        let email = match self.mailer.send_invoice(&invoice).await {
            Ok(receipt) => Some(receipt),
            Err(e) => {
                warn!(invoice_id = %invoice_id, error = %e, "Invoice email dispatch failed");
                warnings.push(format!("invoice email could not be sent: {}", e));
                None
            }
        };

        Ok(SendOutcome {
            invoice: invoice.presented(today()),
            email,
            warnings,
        })
    }

    /// Reminders are valid while the invoice is awaiting payment: sent,
    /// viewed, or (derived) overdue.
    #[instrument(skip(self))]
    pub async fn send_reminder(
        &self,
        user_id: &str,
        invoice_id: Uuid,
    ) -> Result<SendOutcome, AppError> {
        let mut invoice = self.load(user_id, invoice_id).await?;
        match invoice.effective_status(today()) {
            InvoiceStatus::Sent | InvoiceStatus::Viewed | InvoiceStatus::Overdue => {}
            status => {
                return Err(AppError::InvalidOperation(anyhow::anyhow!(
                    "cannot send a reminder for a {} invoice",
                    status.as_str()
                )))
            }
        }

        invoice.reminders_sent.push(Utc::now());
        invoice.updated_utc = Utc::now();
        self.store.update_invoice(&invoice).await?;

        let mut warnings = Vec::new();
        let email = match self.mailer.send_reminder(&invoice).await {
            Ok(receipt) => Some(receipt),
            Err(e) => {
                warn!(invoice_id = %invoice_id, error = %e, "Reminder email dispatch failed");
                warnings.push(format!("reminder email could not be sent: {}", e));
                None
            }
        };

        Ok(SendOutcome {
            invoice: invoice.presented(today()),
            email,
            warnings,
        })
    }

    /// `sent -> viewed`, triggered by the client opening the document.
    /// Idempotent: viewing anything other than a sent invoice is a no-op.
    #[instrument(skip(self))]
    pub async fn mark_viewed(&self, user_id: &str, invoice_id: Uuid) -> Result<Invoice, AppError> {
        let mut invoice = self.load(user_id, invoice_id).await?;
        if invoice.status_enum() == InvoiceStatus::Sent {
            invoice.status = InvoiceStatus::Viewed.as_str().to_string();
            invoice.updated_utc = Utc::now();
            self.store.update_invoice(&invoice).await?;
            INVOICES_TOTAL.with_label_values(&["viewed"]).inc();
        }
        Ok(invoice.presented(today()))
    }

    /// Explicit cancellation from draft, sent, or viewed. A cancelled
    /// invoice accepts no further payments and cannot be reactivated.
    #[instrument(skip(self))]
    pub async fn cancel_invoice(
        &self,
        user_id: &str,
        invoice_id: Uuid,
    ) -> Result<Invoice, AppError> {
        let mut invoice = self.load(user_id, invoice_id).await?;
        match invoice.status_enum() {
            InvoiceStatus::Draft | InvoiceStatus::Sent | InvoiceStatus::Viewed => {}
            status => {
                return Err(AppError::InvalidOperation(anyhow::anyhow!(
                    "a {} invoice cannot be cancelled",
                    status.as_str()
                )))
            }
        }
        invoice.status = InvoiceStatus::Cancelled.as_str().to_string();
        invoice.updated_utc = Utc::now();
        self.store.update_invoice(&invoice).await?;
        INVOICES_TOTAL.with_label_values(&["cancelled"]).inc();
        Ok(invoice.presented(today()))
    }

    pub async fn invoice_analytics(
        &self,
        user_id: &str,
        period: AnalyticsPeriod,
    ) -> Result<InvoiceAnalytics, AppError> {
        let today = today();
        let filter = ListInvoicesFilter {
            start_date: period.start_date(today),
            ..Default::default()
        };
        let invoices = self.store.list_invoices(user_id, &filter).await?;

        let mut by_status = StatusCounts::default();
        let mut total_invoiced = Decimal::ZERO;
        let mut total_collected = Decimal::ZERO;
        let mut total_outstanding = Decimal::ZERO;

        for invoice in &invoices {
            let status = invoice.effective_status(today);
            match status {
                InvoiceStatus::Draft => by_status.draft += 1,
                InvoiceStatus::Sent => by_status.sent += 1,
                InvoiceStatus::Viewed => by_status.viewed += 1,
                InvoiceStatus::Paid => by_status.paid += 1,
                InvoiceStatus::Overdue => by_status.overdue += 1,
                InvoiceStatus::Cancelled => by_status.cancelled += 1,
            }
            if status != InvoiceStatus::Cancelled {
                total_invoiced += invoice.total;
                total_collected += invoice.total_paid;
            }
            if matches!(
                status,
                InvoiceStatus::Sent | InvoiceStatus::Viewed | InvoiceStatus::Overdue
            ) {
                total_outstanding += invoice.remaining_balance;
            }
        }

        Ok(InvoiceAnalytics {
            period: period.as_str().to_string(),
            invoice_count: invoices.len(),
            by_status,
            total_invoiced,
            total_collected,
            total_outstanding,
        })
    }

    async fn load(&self, user_id: &str, invoice_id: Uuid) -> Result<Invoice, AppError> {
        self.store
            .get_invoice(user_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn normalize_currency(currency: &str) -> Result<String, AppError> {
    let code = currency.trim().to_uppercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::Validation(anyhow::anyhow!(
            "currency must be a 3-letter code"
        )));
    }
    Ok(code)
}

fn validate_line_items(items: &[LineItemInput]) -> Result<(), AppError> {
    if items.is_empty() {
        return Err(AppError::Validation(anyhow::anyhow!(
            "an invoice needs at least one line item"
        )));
    }
    for item in items {
        if item.description.trim().is_empty() {
            return Err(AppError::Validation(anyhow::anyhow!(
                "line item description cannot be empty"
            )));
        }
        if item.quantity <= Decimal::ZERO {
            return Err(AppError::Validation(anyhow::anyhow!(
                "line item quantity must be positive"
            )));
        }
        if item.rate < Decimal::ZERO {
            return Err(AppError::Validation(anyhow::anyhow!(
                "line item rate cannot be negative"
            )));
        }
    }
    Ok(())
}

fn validate_tax_rate(tax_rate: Decimal) -> Result<(), AppError> {
    if tax_rate < Decimal::ZERO || tax_rate > dec!(100) {
        return Err(AppError::Validation(anyhow::anyhow!(
            "tax rate must be between 0 and 100"
        )));
    }
    Ok(())
}

fn validate_discount(discount: &Discount) -> Result<(), AppError> {
    if discount.value < Decimal::ZERO {
        return Err(AppError::Validation(anyhow::anyhow!(
            "discount value cannot be negative"
        )));
    }
    if discount.kind == DiscountKind::Percentage && discount.value > dec!(100) {
        return Err(AppError::Validation(anyhow::anyhow!(
            "percentage discount cannot exceed 100"
        )));
    }
    Ok(())
}

fn validate_invoice_inputs(
    items: &[LineItemInput],
    tax_rate: Decimal,
    discount: Option<&Discount>,
    issue_date: NaiveDate,
    due_date: NaiveDate,
) -> Result<(), AppError> {
    validate_line_items(items)?;
    validate_tax_rate(tax_rate)?;
    if let Some(d) = discount {
        validate_discount(d)?;
    }
    if due_date < issue_date {
        return Err(AppError::Validation(anyhow::anyhow!(
            "due date cannot be before the issue date"
        )));
    }
    Ok(())
}
