//! Philippine tax calculation handlers.

use axum::{extract::State, Json};
use kwenta_core::error::AppError;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::middleware::UserContext;
use crate::models::{IncomeType, QuarterlyReturn, TaxCalculation, TaxInput};
use crate::services::tax::quarter_bounds;
use crate::startup::AppState;

fn default_currency() -> String {
    "PHP".to_string()
}

#[derive(Debug, Deserialize)]
pub struct CalculateTaxRequest {
    pub gross_income: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub income_type: IncomeType,
    #[serde(default)]
    pub is_vat_registered: bool,
    pub itemized_deductions: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct QuarterlyReturnRequest {
    pub quarter: u8,
    pub year: i32,
    pub income_type: IncomeType,
    #[serde(default)]
    pub is_vat_registered: bool,
    #[serde(default)]
    pub previous_payments: Decimal,
}

pub async fn calculate_tax(
    State(state): State<AppState>,
    _user: UserContext,
    Json(payload): Json<CalculateTaxRequest>,
) -> Result<Json<TaxCalculation>, AppError> {
    let result = state
        .tax
        .calculate_tax(&TaxInput {
            gross_income: payload.gross_income,
            currency: payload.currency,
            income_type: payload.income_type,
            is_vat_registered: payload.is_vat_registered,
            itemized_deductions: payload.itemized_deductions,
        })
        .await?;
    Ok(Json(result))
}

pub async fn quarterly_return(
    State(state): State<AppState>,
    user: UserContext,
    Json(payload): Json<QuarterlyReturnRequest>,
) -> Result<Json<QuarterlyReturn>, AppError> {
    if !(1..=4).contains(&payload.quarter) {
        return Err(AppError::Validation(anyhow::anyhow!(
            "quarter must be between 1 and 4"
        )));
    }
    let (start, end, _due) = quarter_bounds(payload.quarter, payload.year);
    let transactions = state.store.list_transactions(&user.user_id, start, end).await?;

    let result = state
        .tax
        .calculate_quarterly_return(
            &transactions,
            payload.quarter,
            payload.year,
            payload.income_type,
            payload.is_vat_registered,
            payload.previous_payments,
        )
        .await?;
    Ok(Json(result))
}
