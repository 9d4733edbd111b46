//! Payment reconciliation engine.
//!
//! Validation is fail-fast with a distinct reason per rule, then the
//! Payment, the recomputed Invoice, and the derived income Transaction
//! commit through a single store transaction. The same validation runs
//! again inside that transaction against the re-read invoice, so a racing
//! payment cannot reconcile against a stale balance. The confirmation
//! email runs after the commit and only ever downgrades to a warning.

use std::sync::Arc;

use chrono::Utc;
use kwenta_core::error::AppError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::models::{
    Invoice, InvoiceStatus, Payment, PaymentStatus, PaymentSummary, RecordPayment, Transaction,
    TransactionMetadata, TransactionType,
};
use crate::services::calculator::{payment_percentage, round_money};
use crate::services::email::{EmailReceipt, InvoiceMailer};
use crate::services::exchange::{ExchangeRateService, PHP};
use crate::services::metrics::{PAYMENTS_TOTAL, PAYMENT_AMOUNT_TOTAL};
use crate::services::store::{FinanceStore, PaymentCommit};

/// Result of a recorded payment. The financial records are committed;
/// `warnings` carries non-fatal follow-ups (accepted overpayment excess,
/// stale exchange rates, failed confirmation email).
#[derive(Debug, Serialize)]
pub struct RecordPaymentOutcome {
    pub invoice: Invoice,
    pub payment: Payment,
    pub transaction: Transaction,
    pub email: Option<EmailReceipt>,
    pub warnings: Vec<String>,
}

pub struct PaymentService {
    store: Arc<dyn FinanceStore>,
    rates: Arc<ExchangeRateService>,
    mailer: Arc<dyn InvoiceMailer>,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn FinanceStore>,
        rates: Arc<ExchangeRateService>,
        mailer: Arc<dyn InvoiceMailer>,
    ) -> Self {
        Self {
            store,
            rates,
            mailer,
        }
    }

    #[instrument(skip(self, cmd), fields(amount = %cmd.amount))]
    pub async fn record_payment(
        &self,
        user_id: &str,
        invoice_id: Uuid,
        cmd: RecordPayment,
    ) -> Result<RecordPaymentOutcome, AppError> {
        // Fail fast before doing any conversion work. The same checks run
        // again inside the store transaction against the locked invoice.
        let invoice = self
            .store
            .get_invoice(user_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
        validate_payment(&invoice, &cmd)?;

        // The payment converts at its own date's rate, not the rate the
        // invoice was created with. Fetched outside the transaction so no
        // network call ever runs inside it.
        let quote = self.rates.rate(&invoice.currency, PHP).await?;

        let owner = user_id.to_string();
        let rate_stale = quote.stale;
        let commit = self
            .store
            .apply_payment(
                user_id,
                invoice_id,
                Box::new(move |current: &Invoice| reconcile(current, &owner, &cmd, quote.rate)),
            )
            .await?;

        PAYMENTS_TOTAL
            .with_label_values(&[commit.payment.payment_method.as_str()])
            .inc();
        PAYMENT_AMOUNT_TOTAL
            .with_label_values(&[commit.payment.currency.as_str()])
            .inc_by(commit.payment.amount.to_f64().unwrap_or(0.0));

        let PaymentCommit {
            invoice,
            payment,
            transaction,
            mut warnings,
        } = commit;

        if rate_stale {
            warnings.push(
                "exchange rate source was unavailable; the payment was converted with \
                 cached or fallback rates"
                    .to_string(),
            );
        }

        // Post-commit, best-effort: the payment stands even if the
        // confirmation email does not go out.
        let email = match self.mailer.send_payment_confirmation(&invoice, &payment).await {
            Ok(receipt) => Some(receipt),
            Err(e) => {
                warn!(invoice_id = %invoice_id, error = %e, "Payment confirmation email failed");
                warnings.push(format!("payment confirmation email could not be sent: {}", e));
                None
            }
        };

        Ok(RecordPaymentOutcome {
            invoice: invoice.presented(Utc::now().date_naive()),
            payment,
            transaction,
            email,
            warnings,
        })
    }

    /// Pure read over the invoice's completed payments.
    pub async fn payment_summary(
        &self,
        user_id: &str,
        invoice_id: Uuid,
    ) -> Result<PaymentSummary, AppError> {
        let invoice = self
            .store
            .get_invoice(user_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
        let payments = self.store.list_payments(user_id, invoice_id).await?;

        let completed: Vec<&Payment> = payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Completed.as_str())
            .collect();
        let total_paid: Decimal = completed.iter().map(|p| p.amount).sum();
        let remaining_balance = (invoice.total - total_paid).max(Decimal::ZERO);

        Ok(PaymentSummary {
            invoice_id,
            total: invoice.total,
            total_paid,
            remaining_balance,
            payment_count: completed.len(),
            is_fully_paid: remaining_balance.is_zero() && total_paid > Decimal::ZERO,
            is_partially_paid: total_paid > Decimal::ZERO && total_paid < invoice.total,
        })
    }
}

/// Fail-fast validation sequence; each rule has its own reason.
fn validate_payment(invoice: &Invoice, cmd: &RecordPayment) -> Result<(), AppError> {
    match invoice.status_enum() {
        InvoiceStatus::Cancelled => {
            return Err(AppError::InvalidOperation(anyhow::anyhow!(
                "cannot record a payment on a cancelled invoice"
            )))
        }
        InvoiceStatus::Draft => {
            return Err(AppError::InvalidOperation(anyhow::anyhow!(
                "the invoice must be sent before payments can be recorded"
            )))
        }
        _ => {}
    }
    if cmd.amount <= Decimal::ZERO {
        return Err(AppError::Validation(anyhow::anyhow!(
            "payment amount must be positive"
        )));
    }
    if invoice.status_enum() == InvoiceStatus::Paid || invoice.is_fully_paid() {
        return Err(AppError::InvalidOperation(anyhow::anyhow!(
            "invoice {} is already fully paid",
            invoice.invoice_number
        )));
    }
    if cmd.amount > invoice.remaining_balance && !cmd.allow_overpayment {
        return Err(AppError::InvalidOperation(anyhow::anyhow!(
            "payment of {} exceeds the remaining balance of {} by {}; set allow_overpayment \
             to accept the excess",
            cmd.amount,
            invoice.remaining_balance,
            cmd.amount - invoice.remaining_balance
        )));
    }
    Ok(())
}

/// Pure reconciliation step, evaluated by the store against the
/// transaction-current invoice.
fn reconcile(
    current: &Invoice,
    user_id: &str,
    cmd: &RecordPayment,
    rate: Decimal,
) -> Result<PaymentCommit, AppError> {
    validate_payment(current, cmd)?;

    let mut warnings = Vec::new();
    if cmd.amount > current.remaining_balance {
        warnings.push(format!(
            "payment exceeds the remaining balance by {}; the balance is clamped to zero \
             and the excess is kept on record",
            round_money(cmd.amount - current.remaining_balance)
        ));
    }

    let payment_id = Uuid::new_v4();
    let transaction_id = Uuid::new_v4();
    let amount_php = round_money(cmd.amount * rate);
    let now = Utc::now();

    let mut invoice = current.clone();
    invoice.total_paid = round_money(invoice.total_paid + cmd.amount);
    invoice.remaining_balance = (invoice.total - invoice.total_paid).max(Decimal::ZERO);
    invoice.payment_percentage = payment_percentage(invoice.total_paid, invoice.total);
    if invoice.total_paid >= invoice.total {
        invoice.status = InvoiceStatus::Paid.as_str().to_string();
        invoice.paid_at = Some(cmd.payment_date);
    }
    invoice.updated_utc = now;

    let payment = Payment {
        payment_id,
        user_id: user_id.to_string(),
        invoice_id: invoice.invoice_id,
        amount: cmd.amount,
        currency: invoice.currency.clone(),
        amount_php,
        exchange_rate: rate,
        payment_date: cmd.payment_date,
        payment_method: cmd.payment_method.as_str().to_string(),
        reference: cmd.reference.clone(),
        notes: cmd.notes.clone(),
        status: PaymentStatus::Completed.as_str().to_string(),
        transaction_id: Some(transaction_id),
        created_utc: now,
    };

    // The derived income record always reflects the full tendered amount,
    // even when the invoice balance clamps.
    let transaction = Transaction {
        transaction_id,
        user_id: user_id.to_string(),
        transaction_type: TransactionType::Income.as_str().to_string(),
        amount: cmd.amount,
        currency: invoice.currency.clone(),
        amount_php,
        date: cmd.payment_date,
        description: format!("Payment for invoice {}", invoice.invoice_number),
        metadata: TransactionMetadata {
            invoice_id: invoice.invoice_id,
            payment_id,
        },
        created_utc: now,
    };

    Ok(PaymentCommit {
        invoice,
        payment,
        transaction,
        warnings,
    })
}
