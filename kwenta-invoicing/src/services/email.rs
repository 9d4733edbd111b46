//! Outbound email for invoices, reminders, and payment confirmations.
//!
//! Dispatch failures are reported to the caller as warnings on an
//! already-committed result; nothing in this module is retried or awaited
//! inside a financial transaction.

use async_trait::async_trait;
use kwenta_core::error::AppError;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use secrecy::ExposeSecret;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::config::SmtpConfig;
use crate::models::{Invoice, Payment};

/// Receipt returned by the dispatcher.
#[derive(Debug, Clone, Serialize)]
pub struct EmailReceipt {
    pub email_id: String,
    pub status: String,
}

#[async_trait]
pub trait InvoiceMailer: Send + Sync {
    async fn send_invoice(&self, invoice: &Invoice) -> Result<EmailReceipt, AppError>;
    async fn send_reminder(&self, invoice: &Invoice) -> Result<EmailReceipt, AppError>;
    async fn send_payment_confirmation(
        &self,
        invoice: &Invoice,
        payment: &Payment,
    ) -> Result<EmailReceipt, AppError>;
}

/// SMTP implementation.
#[derive(Clone)]
pub struct SmtpMailer {
    mailer: SmtpTransport,
    from_email: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let creds = Credentials::new(
            config.user.clone(),
            config.password.expose_secret().clone(),
        );

        let mailer = SmtpTransport::relay(&config.host)
            .map_err(|e| AppError::external("email", anyhow::anyhow!(e.to_string())))?
            .credentials(creds)
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, "SMTP mailer initialized");

        Ok(Self {
            mailer,
            from_email: config.from.clone(),
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        body: String,
    ) -> Result<EmailReceipt, AppError> {
        let email = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e: lettre::address::AddressError| AppError::Internal(e.into()))?,
            )
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| AppError::Internal(e.into()))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| AppError::Internal(e.into()))?;

        // lettre's SMTP transport is blocking; keep it off the runtime.
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::Internal(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "Email sent");
                Ok(EmailReceipt {
                    email_id: Uuid::new_v4().to_string(),
                    status: "sent".to_string(),
                })
            }
            Err(e) => {
                tracing::error!(error = %e.to_string(), to = %to_email, "Failed to send email");
                Err(AppError::external("email", anyhow::anyhow!(e.to_string())))
            }
        }
    }
}

#[async_trait]
impl InvoiceMailer for SmtpMailer {
    async fn send_invoice(&self, invoice: &Invoice) -> Result<EmailReceipt, AppError> {
        let subject = format!("Invoice {} from {}", invoice.invoice_number, self.from_email);
        let body = format!(
            "Hi {},\n\nPlease find invoice {} for {} {} attached.\n{}\nDue date: {}.\n",
            invoice.client_name,
            invoice.invoice_number,
            invoice.currency,
            invoice.total,
            invoice
                .pdf_url
                .as_deref()
                .map(|url| format!("Download: {}\n", url))
                .unwrap_or_default(),
            invoice.due_date,
        );
        self.send_email(&invoice.client_email, &subject, body).await
    }

    async fn send_reminder(&self, invoice: &Invoice) -> Result<EmailReceipt, AppError> {
        let subject = format!("Reminder: invoice {} is awaiting payment", invoice.invoice_number);
        let body = format!(
            "Hi {},\n\nThis is a friendly reminder that invoice {} ({} {}) is due on {}.\n\
             Outstanding balance: {} {}.\n",
            invoice.client_name,
            invoice.invoice_number,
            invoice.currency,
            invoice.total,
            invoice.due_date,
            invoice.currency,
            invoice.remaining_balance,
        );
        self.send_email(&invoice.client_email, &subject, body).await
    }

    async fn send_payment_confirmation(
        &self,
        invoice: &Invoice,
        payment: &Payment,
    ) -> Result<EmailReceipt, AppError> {
        let subject = format!("Payment received for invoice {}", invoice.invoice_number);
        let body = format!(
            "Hi {},\n\nWe received your payment of {} {} on {} for invoice {}.\n\
             Remaining balance: {} {}.\n\nThank you!\n",
            invoice.client_name,
            payment.currency,
            payment.amount,
            payment.payment_date,
            invoice.invoice_number,
            invoice.currency,
            invoice.remaining_balance,
        );
        self.send_email(&invoice.client_email, &subject, body).await
    }
}
