//! Postgres store.
//!
//! Payments serialize on `SELECT ... FOR UPDATE`: the invoice row is
//! locked and re-read inside the same transaction that writes the Payment,
//! the updated Invoice, and the derived Transaction, so the three records
//! commit together or not at all. Lost races and unique-constraint hits
//! surface as `ConcurrencyConflict` so callers can retry the whole
//! operation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use kwenta_core::error::AppError;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::FromRow;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{ApplyPayment, FinanceStore, PaymentCommit};
use crate::models::{
    Client, Discount, Invoice, LineItem, ListInvoicesFilter, Payment, Transaction,
    TransactionMetadata,
};
use crate::services::metrics::DB_QUERY_DURATION;

const INVOICE_COLUMNS: &str = "invoice_id, user_id, invoice_number, status, client_id, \
    client_name, client_email, client_address, client_is_business, currency, issue_date, \
    due_date, line_items, subtotal, tax_rate, tax_amount, discount, total, \
    issuer_vat_registered, withholding_tax_amount, net_amount_due, total_php, exchange_rate, \
    total_paid, remaining_balance, payment_percentage, reminders_sent, pdf_url, notes, sent_at, \
    paid_at, created_utc, updated_utc";

const PAYMENT_COLUMNS: &str = "payment_id, user_id, invoice_id, amount, currency, amount_php, \
    exchange_rate, payment_date, payment_method, reference, notes, status, transaction_id, \
    created_utc";

/// Row shape for invoices; line items and discount live in JSONB.
#[derive(FromRow)]
struct InvoiceRow {
    invoice_id: Uuid,
    user_id: String,
    invoice_number: String,
    status: String,
    client_id: Uuid,
    client_name: String,
    client_email: String,
    client_address: Option<String>,
    client_is_business: bool,
    currency: String,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    line_items: Json<Vec<LineItem>>,
    subtotal: Decimal,
    tax_rate: Decimal,
    tax_amount: Decimal,
    discount: Option<Json<Discount>>,
    total: Decimal,
    issuer_vat_registered: bool,
    withholding_tax_amount: Option<Decimal>,
    net_amount_due: Option<Decimal>,
    total_php: Option<Decimal>,
    exchange_rate: Option<Decimal>,
    total_paid: Decimal,
    remaining_balance: Decimal,
    payment_percentage: Decimal,
    reminders_sent: Vec<DateTime<Utc>>,
    pdf_url: Option<String>,
    notes: Option<String>,
    sent_at: Option<DateTime<Utc>>,
    paid_at: Option<NaiveDate>,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl From<InvoiceRow> for Invoice {
    fn from(row: InvoiceRow) -> Self {
        Invoice {
            invoice_id: row.invoice_id,
            user_id: row.user_id,
            invoice_number: row.invoice_number,
            status: row.status,
            client_id: row.client_id,
            client_name: row.client_name,
            client_email: row.client_email,
            client_address: row.client_address,
            client_is_business: row.client_is_business,
            currency: row.currency,
            issue_date: row.issue_date,
            due_date: row.due_date,
            line_items: row.line_items.0,
            subtotal: row.subtotal,
            tax_rate: row.tax_rate,
            tax_amount: row.tax_amount,
            discount: row.discount.map(|d| d.0),
            total: row.total,
            issuer_vat_registered: row.issuer_vat_registered,
            withholding_tax_amount: row.withholding_tax_amount,
            net_amount_due: row.net_amount_due,
            total_php: row.total_php,
            exchange_rate: row.exchange_rate,
            total_paid: row.total_paid,
            remaining_balance: row.remaining_balance,
            payment_percentage: row.payment_percentage,
            reminders_sent: row.reminders_sent,
            pdf_url: row.pdf_url,
            notes: row.notes,
            sent_at: row.sent_at,
            paid_at: row.paid_at,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        }
    }
}

#[derive(FromRow)]
struct TransactionRow {
    transaction_id: Uuid,
    user_id: String,
    transaction_type: String,
    amount: Decimal,
    currency: String,
    amount_php: Decimal,
    date: NaiveDate,
    description: String,
    invoice_id: Uuid,
    payment_id: Uuid,
    created_utc: DateTime<Utc>,
}

impl From<TransactionRow> for Transaction {
    fn from(row: TransactionRow) -> Self {
        Transaction {
            transaction_id: row.transaction_id,
            user_id: row.user_id,
            transaction_type: row.transaction_type,
            amount: row.amount,
            currency: row.currency,
            amount_php: row.amount_php,
            date: row.date,
            description: row.description,
            metadata: TransactionMetadata {
                invoice_id: row.invoice_id,
                payment_id: row.payment_id,
            },
            created_utc: row.created_utc,
        }
    }
}

fn map_db_err(context: &str, e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return AppError::ConcurrencyConflict(anyhow::anyhow!(
                "{}: unique constraint violated, retry the operation",
                context
            ));
        }
        if let Some(code) = db.code() {
            if matches!(code.as_ref(), "40001" | "40P01") {
                return AppError::ConcurrencyConflict(anyhow::anyhow!(
                    "{}: transaction lost a race, retry the operation",
                    context
                ));
            }
        }
    }
    AppError::Database(anyhow::anyhow!("{}: {}", context, e))
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and build the pool.
    #[instrument(skip(database_url))]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn insert_payment_tx(
        tx: &mut sqlx::PgConnection,
        payment: &Payment,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO payments (payment_id, user_id, invoice_id, amount, currency, \
             amount_php, exchange_rate, payment_date, payment_method, reference, notes, \
             status, transaction_id, created_utc) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(payment.payment_id)
        .bind(&payment.user_id)
        .bind(payment.invoice_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.amount_php)
        .bind(payment.exchange_rate)
        .bind(payment.payment_date)
        .bind(&payment.payment_method)
        .bind(&payment.reference)
        .bind(&payment.notes)
        .bind(&payment.status)
        .bind(payment.transaction_id)
        .bind(payment.created_utc)
        .execute(tx)
        .await?;
        Ok(())
    }

    async fn insert_transaction_tx(
        tx: &mut sqlx::PgConnection,
        transaction: &Transaction,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO transactions (transaction_id, user_id, transaction_type, amount, \
             currency, amount_php, date, description, invoice_id, payment_id, created_utc) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(transaction.transaction_id)
        .bind(&transaction.user_id)
        .bind(&transaction.transaction_type)
        .bind(transaction.amount)
        .bind(&transaction.currency)
        .bind(transaction.amount_php)
        .bind(transaction.date)
        .bind(&transaction.description)
        .bind(transaction.metadata.invoice_id)
        .bind(transaction.metadata.payment_id)
        .bind(transaction.created_utc)
        .execute(tx)
        .await?;
        Ok(())
    }

    async fn update_invoice_tx(
        tx: &mut sqlx::PgConnection,
        invoice: &Invoice,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE invoices SET status = $3, due_date = $4, line_items = $5, subtotal = $6, \
             tax_rate = $7, tax_amount = $8, discount = $9, total = $10, \
             withholding_tax_amount = $11, net_amount_due = $12, total_php = $13, \
             exchange_rate = $14, total_paid = $15, remaining_balance = $16, \
             payment_percentage = $17, reminders_sent = $18, pdf_url = $19, notes = $20, \
             sent_at = $21, paid_at = $22, updated_utc = $23 \
             WHERE user_id = $1 AND invoice_id = $2",
        )
        .bind(&invoice.user_id)
        .bind(invoice.invoice_id)
        .bind(&invoice.status)
        .bind(invoice.due_date)
        .bind(Json(&invoice.line_items))
        .bind(invoice.subtotal)
        .bind(invoice.tax_rate)
        .bind(invoice.tax_amount)
        .bind(invoice.discount.as_ref().map(Json))
        .bind(invoice.total)
        .bind(invoice.withholding_tax_amount)
        .bind(invoice.net_amount_due)
        .bind(invoice.total_php)
        .bind(invoice.exchange_rate)
        .bind(invoice.total_paid)
        .bind(invoice.remaining_balance)
        .bind(invoice.payment_percentage)
        .bind(&invoice.reminders_sent)
        .bind(&invoice.pdf_url)
        .bind(&invoice.notes)
        .bind(invoice.sent_at)
        .bind(invoice.paid_at)
        .bind(invoice.updated_utc)
        .execute(tx)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl FinanceStore for PgStore {
    #[instrument(skip(self, client), fields(client_id = %client.client_id))]
    async fn insert_client(&self, client: &Client) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_client"])
            .start_timer();

        sqlx::query(
            "INSERT INTO clients (client_id, user_id, name, email, address, is_business, \
             created_utc) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(client.client_id)
        .bind(&client.user_id)
        .bind(&client.name)
        .bind(&client.email)
        .bind(&client.address)
        .bind(client.is_business)
        .bind(client.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to insert client", e))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_client(
        &self,
        user_id: &str,
        client_id: Uuid,
    ) -> Result<Option<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_client"])
            .start_timer();

        let client = sqlx::query_as::<_, Client>(
            "SELECT client_id, user_id, name, email, address, is_business, created_utc \
             FROM clients WHERE user_id = $1 AND client_id = $2",
        )
        .bind(user_id)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to get client", e))?;

        timer.observe_duration();
        Ok(client)
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.invoice_id))]
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_invoice"])
            .start_timer();

        sqlx::query(
            "INSERT INTO invoices (invoice_id, user_id, invoice_number, status, client_id, \
             client_name, client_email, client_address, client_is_business, currency, \
             issue_date, due_date, line_items, subtotal, tax_rate, tax_amount, discount, total, \
             issuer_vat_registered, withholding_tax_amount, net_amount_due, total_php, \
             exchange_rate, total_paid, remaining_balance, payment_percentage, reminders_sent, \
             pdf_url, notes, sent_at, paid_at, created_utc, updated_utc) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
             $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32, \
             $33)",
        )
        .bind(invoice.invoice_id)
        .bind(&invoice.user_id)
        .bind(&invoice.invoice_number)
        .bind(&invoice.status)
        .bind(invoice.client_id)
        .bind(&invoice.client_name)
        .bind(&invoice.client_email)
        .bind(&invoice.client_address)
        .bind(invoice.client_is_business)
        .bind(&invoice.currency)
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(Json(&invoice.line_items))
        .bind(invoice.subtotal)
        .bind(invoice.tax_rate)
        .bind(invoice.tax_amount)
        .bind(invoice.discount.as_ref().map(Json))
        .bind(invoice.total)
        .bind(invoice.issuer_vat_registered)
        .bind(invoice.withholding_tax_amount)
        .bind(invoice.net_amount_due)
        .bind(invoice.total_php)
        .bind(invoice.exchange_rate)
        .bind(invoice.total_paid)
        .bind(invoice.remaining_balance)
        .bind(invoice.payment_percentage)
        .bind(&invoice.reminders_sent)
        .bind(&invoice.pdf_url)
        .bind(&invoice.notes)
        .bind(invoice.sent_at)
        .bind(invoice.paid_at)
        .bind(invoice.created_utc)
        .bind(invoice.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to insert invoice", e))?;

        timer.observe_duration();

        info!(
            invoice_id = %invoice.invoice_id,
            invoice_number = %invoice.invoice_number,
            "Invoice created"
        );
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_invoice(
        &self,
        user_id: &str,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let query = format!(
            "SELECT {} FROM invoices WHERE user_id = $1 AND invoice_id = $2",
            INVOICE_COLUMNS
        );
        let row = sqlx::query_as::<_, InvoiceRow>(&query)
            .bind(user_id)
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db_err("Failed to get invoice", e))?;

        timer.observe_duration();
        Ok(row.map(Invoice::from))
    }

    #[instrument(skip(self, filter))]
    async fn list_invoices(
        &self,
        user_id: &str,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let query = format!(
            "SELECT {} FROM invoices \
             WHERE user_id = $1 \
               AND ($2::uuid IS NULL OR client_id = $2) \
               AND ($3::date IS NULL OR issue_date >= $3) \
               AND ($4::date IS NULL OR issue_date <= $4) \
             ORDER BY invoice_number",
            INVOICE_COLUMNS
        );
        let rows = sqlx::query_as::<_, InvoiceRow>(&query)
            .bind(user_id)
            .bind(filter.client_id)
            .bind(filter.start_date)
            .bind(filter.end_date)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_db_err("Failed to list invoices", e))?;

        timer.observe_duration();
        Ok(rows.into_iter().map(Invoice::from).collect())
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.invoice_id))]
    async fn update_invoice(&self, invoice: &Invoice) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_invoice"])
            .start_timer();

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_db_err("Failed to acquire connection", e))?;
        let affected = Self::update_invoice_tx(&mut *conn, invoice)
            .await
            .map_err(|e| map_db_err("Failed to update invoice", e))?;

        timer.observe_duration();

        if affected == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!("Invoice not found")));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_draft_invoice(
        &self,
        user_id: &str,
        invoice_id: Uuid,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_draft_invoice"])
            .start_timer();

        let result = sqlx::query(
            "DELETE FROM invoices \
             WHERE user_id = $1 AND invoice_id = $2 AND status = 'draft'",
        )
        .bind(user_id)
        .bind(invoice_id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to delete invoice", e))?;

        timer.observe_duration();

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(invoice_id = %invoice_id, "Draft invoice deleted");
        }
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn count_invoices_in_month(
        &self,
        user_id: &str,
        year: i32,
        month: u32,
    ) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["count_invoices_in_month"])
            .start_timer();

        let month_start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| AppError::Validation(anyhow::anyhow!("invalid month {}", month)))?;
        let next_month = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .expect("first of month is always valid");

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM invoices \
             WHERE user_id = $1 AND issue_date >= $2 AND issue_date < $3",
        )
        .bind(user_id)
        .bind(month_start)
        .bind(next_month)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to count invoices", e))?;

        timer.observe_duration();
        Ok(count)
    }

    #[instrument(skip(self, apply))]
    async fn apply_payment(
        &self,
        user_id: &str,
        invoice_id: Uuid,
        apply: ApplyPayment,
    ) -> Result<PaymentCommit, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_payment"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_db_err("Failed to begin transaction", e))?;

        // Lock and re-read the invoice inside this transaction so a
        // concurrent payment cannot reconcile against the same balance.
        let query = format!(
            "SELECT {} FROM invoices WHERE user_id = $1 AND invoice_id = $2 FOR UPDATE",
            INVOICE_COLUMNS
        );
        let row = sqlx::query_as::<_, InvoiceRow>(&query)
            .bind(user_id)
            .bind(invoice_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_db_err("Failed to lock invoice", e))?;
        let invoice = row
            .map(Invoice::from)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        let commit = apply(&invoice)?;

        Self::update_invoice_tx(&mut tx, &commit.invoice)
            .await
            .map_err(|e| map_db_err("Failed to update invoice", e))?;
        Self::insert_payment_tx(&mut tx, &commit.payment)
            .await
            .map_err(|e| map_db_err("Failed to insert payment", e))?;
        Self::insert_transaction_tx(&mut tx, &commit.transaction)
            .await
            .map_err(|e| map_db_err("Failed to insert transaction", e))?;

        tx.commit()
            .await
            .map_err(|e| map_db_err("Failed to commit payment", e))?;

        timer.observe_duration();

        info!(
            invoice_id = %invoice_id,
            payment_id = %commit.payment.payment_id,
            amount = %commit.payment.amount,
            "Payment committed"
        );
        Ok(commit)
    }

    #[instrument(skip(self))]
    async fn list_payments(
        &self,
        user_id: &str,
        invoice_id: Uuid,
    ) -> Result<Vec<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_payments"])
            .start_timer();

        let query = format!(
            "SELECT {} FROM payments \
             WHERE user_id = $1 AND invoice_id = $2 ORDER BY created_utc",
            PAYMENT_COLUMNS
        );
        let payments = sqlx::query_as::<_, Payment>(&query)
            .bind(user_id)
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_db_err("Failed to list payments", e))?;

        timer.observe_duration();
        Ok(payments)
    }

    #[instrument(skip(self))]
    async fn list_transactions(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Transaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_transactions"])
            .start_timer();

        let rows = sqlx::query_as::<_, TransactionRow>(
            "SELECT transaction_id, user_id, transaction_type, amount, currency, amount_php, \
             date, description, invoice_id, payment_id, created_utc \
             FROM transactions \
             WHERE user_id = $1 AND date >= $2 AND date <= $3 ORDER BY date",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to list transactions", e))?;

        timer.observe_duration();
        Ok(rows.into_iter().map(Transaction::from).collect())
    }
}
