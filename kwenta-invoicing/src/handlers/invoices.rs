//! Invoice lifecycle handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use kwenta_core::error::AppError;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::middleware::UserContext;
use crate::models::{
    CreateInvoice, Discount, Invoice, InvoiceStatus, LineItemInput, ListInvoicesFilter,
    UpdateInvoice,
};
use crate::services::invoices::{AnalyticsPeriod, InvoiceAnalytics, SendOutcome};
use crate::startup::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    pub client_id: Uuid,
    #[validate(length(equal = 3))]
    pub currency: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub line_items: Vec<LineItemInput>,
    pub tax_rate: Decimal,
    pub discount: Option<Discount>,
    /// Issuer is VAT-registered: 12% VAT replaces `tax_rate`, and
    /// business clients withhold 10% at source.
    #[serde(default)]
    pub vat_registered: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateInvoiceRequest {
    pub due_date: Option<NaiveDate>,
    pub line_items: Option<Vec<LineItemInput>>,
    pub tax_rate: Option<Decimal>,
    pub discount: Option<Discount>,
    /// Set to drop an existing discount; `discount` wins if both appear.
    #[serde(default)]
    pub clear_discount: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListInvoicesQuery {
    pub status: Option<String>,
    pub client_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub period: Option<String>,
}

fn parse_status(raw: &str) -> Result<InvoiceStatus, AppError> {
    match raw {
        "draft" => Ok(InvoiceStatus::Draft),
        "sent" => Ok(InvoiceStatus::Sent),
        "viewed" => Ok(InvoiceStatus::Viewed),
        "paid" => Ok(InvoiceStatus::Paid),
        "overdue" => Ok(InvoiceStatus::Overdue),
        "cancelled" => Ok(InvoiceStatus::Cancelled),
        other => Err(AppError::Validation(anyhow::anyhow!(
            "unknown invoice status '{}'",
            other
        ))),
    }
}

pub async fn create_invoice(
    State(state): State<AppState>,
    user: UserContext,
    Json(payload): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<Invoice>), AppError> {
    payload.validate()?;

    tracing::info!(
        user_id = %user.user_id,
        client_id = %payload.client_id,
        currency = %payload.currency,
        "Creating invoice"
    );

    let invoice = state
        .invoices
        .create_invoice(
            &user.user_id,
            CreateInvoice {
                client_id: payload.client_id,
                currency: payload.currency,
                issue_date: payload.issue_date,
                due_date: payload.due_date,
                line_items: payload.line_items,
                tax_rate: payload.tax_rate,
                discount: payload.discount,
                vat_registered: payload.vat_registered,
                notes: payload.notes,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    user: UserContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    let invoice = state.invoices.get_invoice(&user.user_id, invoice_id).await?;
    Ok(Json(invoice))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    user: UserContext,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<Json<Vec<Invoice>>, AppError> {
    let status = query.status.as_deref().map(parse_status).transpose()?;
    let invoices = state
        .invoices
        .list_invoices(
            &user.user_id,
            ListInvoicesFilter {
                status,
                client_id: query.client_id,
                start_date: query.start_date,
                end_date: query.end_date,
            },
        )
        .await?;
    Ok(Json(invoices))
}

pub async fn update_invoice(
    State(state): State<AppState>,
    user: UserContext,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<UpdateInvoiceRequest>,
) -> Result<Json<Invoice>, AppError> {
    let discount = match (payload.discount, payload.clear_discount) {
        (Some(d), _) => Some(Some(d)),
        (None, true) => Some(None),
        (None, false) => None,
    };

    let invoice = state
        .invoices
        .update_invoice(
            &user.user_id,
            invoice_id,
            UpdateInvoice {
                due_date: payload.due_date,
                line_items: payload.line_items,
                tax_rate: payload.tax_rate,
                discount,
                notes: payload.notes,
            },
        )
        .await?;
    Ok(Json(invoice))
}

pub async fn delete_invoice(
    State(state): State<AppState>,
    user: UserContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .invoices
        .delete_invoice(&user.user_id, invoice_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn send_invoice(
    State(state): State<AppState>,
    user: UserContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<SendOutcome>, AppError> {
    let outcome = state.invoices.send_invoice(&user.user_id, invoice_id).await?;
    Ok(Json(outcome))
}

pub async fn send_reminder(
    State(state): State<AppState>,
    user: UserContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<SendOutcome>, AppError> {
    let outcome = state
        .invoices
        .send_reminder(&user.user_id, invoice_id)
        .await?;
    Ok(Json(outcome))
}

pub async fn mark_viewed(
    State(state): State<AppState>,
    user: UserContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    let invoice = state.invoices.mark_viewed(&user.user_id, invoice_id).await?;
    Ok(Json(invoice))
}

pub async fn cancel_invoice(
    State(state): State<AppState>,
    user: UserContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    let invoice = state
        .invoices
        .cancel_invoice(&user.user_id, invoice_id)
        .await?;
    Ok(Json(invoice))
}

pub async fn invoice_analytics(
    State(state): State<AppState>,
    user: UserContext,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<InvoiceAnalytics>, AppError> {
    let period = AnalyticsPeriod::parse(query.period.as_deref().unwrap_or("month"))?;
    let analytics = state
        .invoices
        .invoice_analytics(&user.user_id, period)
        .await?;
    Ok(Json(analytics))
}
