//! User context extractor.
//!
//! The engine is scoped per user; the `X-User-ID` header is set by the
//! authenticating front end after validating the session. Authentication
//! itself is an upstream concern.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use kwenta_core::error::AppError;

#[derive(Debug, Clone)]
pub struct UserContext {
    pub user_id: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("X-User-ID")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AppError::Validation(anyhow::anyhow!("Missing X-User-ID header"))
            })?;

        let span = tracing::Span::current();
        span.record("user_id", user_id);

        Ok(UserContext {
            user_id: user_id.to_string(),
        })
    }
}
