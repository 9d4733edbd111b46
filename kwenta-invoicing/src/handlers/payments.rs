//! Payment reconciliation handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use kwenta_core::error::AppError;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::UserContext;
use crate::models::{PaymentMethod, PaymentSummary, RecordPayment};
use crate::services::payments::RecordPaymentOutcome;
use crate::startup::AppState;

#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub allow_overpayment: bool,
}

pub async fn record_payment(
    State(state): State<AppState>,
    user: UserContext,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<RecordPaymentOutcome>), AppError> {
    tracing::info!(
        user_id = %user.user_id,
        invoice_id = %invoice_id,
        amount = %payload.amount,
        "Recording payment"
    );

    let outcome = state
        .payments
        .record_payment(
            &user.user_id,
            invoice_id,
            RecordPayment {
                amount: payload.amount,
                payment_date: payload.payment_date,
                payment_method: payload.payment_method,
                reference: payload.reference,
                notes: payload.notes,
                allow_overpayment: payload.allow_overpayment,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn payment_summary(
    State(state): State<AppState>,
    user: UserContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<PaymentSummary>, AppError> {
    let summary = state
        .payments
        .payment_summary(&user.user_id, invoice_id)
        .await?;
    Ok(Json(summary))
}
