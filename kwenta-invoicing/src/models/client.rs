//! Client registry model.
//!
//! Clients are resolved at invoice creation and denormalized onto the
//! invoice, so later client edits never rewrite issued documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Client {
    pub client_id: Uuid,
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub address: Option<String>,
    /// Business clients are subject to withholding in VAT-aware invoices.
    pub is_business: bool,
    pub created_utc: DateTime<Utc>,
}

/// Input for registering a client.
#[derive(Debug, Clone)]
pub struct CreateClient {
    pub name: String,
    pub email: String,
    pub address: Option<String>,
    pub is_business: bool,
}
