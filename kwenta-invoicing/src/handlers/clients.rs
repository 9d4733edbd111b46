//! Client registry handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use kwenta_core::error::AppError;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::middleware::UserContext;
use crate::models::{Client, CreateClient};
use crate::startup::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateClientRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    pub address: Option<String>,
    #[serde(default)]
    pub is_business: bool,
}

pub async fn create_client(
    State(state): State<AppState>,
    user: UserContext,
    Json(payload): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<Client>), AppError> {
    payload.validate()?;

    tracing::info!(user_id = %user.user_id, name = %payload.name, "Creating client");

    let client = state
        .invoices
        .create_client(
            &user.user_id,
            CreateClient {
                name: payload.name,
                email: payload.email,
                address: payload.address,
                is_business: payload.is_business,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn get_client(
    State(state): State<AppState>,
    user: UserContext,
    Path(client_id): Path<Uuid>,
) -> Result<Json<Client>, AppError> {
    let client = state.invoices.get_client(&user.user_id, client_id).await?;
    Ok(Json(client))
}
