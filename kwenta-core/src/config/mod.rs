use std::env;
use std::str::FromStr;

use crate::error::AppError;

/// Load `.env` once and read an environment variable, falling back to a
/// default when unset.
pub fn var_or(key: &str, default: &str) -> String {
    dotenvy::dotenv().ok();
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an environment variable that must be present.
pub fn require_var(key: &str) -> Result<String, AppError> {
    dotenvy::dotenv().ok();
    env::var(key).map_err(|_| AppError::Config(anyhow::anyhow!("{} must be set", key)))
}

/// Read and parse an environment variable, falling back to a default when
/// unset. A present-but-unparsable value is a configuration error, not a
/// silent fallback.
pub fn parse_var_or<T: FromStr>(key: &str, default: T) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    dotenvy::dotenv().ok();
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| AppError::Config(anyhow::anyhow!("invalid {}: {}", key, e))),
        Err(_) => Ok(default),
    }
}
