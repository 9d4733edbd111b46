use kwenta_core::config::{parse_var_or, require_var, var_or};
use kwenta_core::error::AppError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::Secret;

#[derive(Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub exchange: ExchangeConfig,
    pub smtp: SmtpConfig,
    pub pdf: PdfConfig,
    pub tax: TaxConfig,
    pub service_name: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Clone, Debug)]
pub struct ExchangeConfig {
    pub api_url: String,
    pub cache_ttl_secs: u64,
    pub fetch_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret<String>,
    pub from: String,
}

#[derive(Clone, Debug)]
pub struct PdfConfig {
    pub base_url: String,
}

#[derive(Clone, Debug)]
pub struct TaxConfig {
    /// Estimated input VAT as a fraction of output VAT. A placeholder
    /// policy until purchase records feed the real figure.
    pub input_vat_ratio: Decimal,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let host = var_or("KWENTA_HOST", "0.0.0.0");
        let port = parse_var_or("KWENTA_PORT", 3000)?;

        let db_url = require_var("KWENTA_DATABASE_URL")?;
        let max_connections = parse_var_or("KWENTA_DB_MAX_CONNECTIONS", 10)?;
        let min_connections = parse_var_or("KWENTA_DB_MIN_CONNECTIONS", 1)?;

        let api_url = var_or("KWENTA_EXCHANGE_API_URL", "https://api.exchangerate-api.com");
        let cache_ttl_secs = parse_var_or("KWENTA_EXCHANGE_CACHE_TTL_SECS", 900)?;
        let fetch_timeout_secs = parse_var_or("KWENTA_EXCHANGE_FETCH_TIMEOUT_SECS", 5)?;

        let smtp_host = var_or("KWENTA_SMTP_HOST", "smtp.gmail.com");
        let smtp_port = parse_var_or("KWENTA_SMTP_PORT", 587)?;
        let smtp_user = var_or("KWENTA_SMTP_USER", "");
        let smtp_password = var_or("KWENTA_SMTP_PASSWORD", "");
        let smtp_from = var_or("KWENTA_SMTP_FROM", &smtp_user);

        let pdf_base_url = var_or("KWENTA_PDF_BASE_URL", "http://localhost:4000");

        let input_vat_ratio: Decimal = parse_var_or("KWENTA_INPUT_VAT_RATIO", dec!(0.5))?;
        if input_vat_ratio < Decimal::ZERO || input_vat_ratio > Decimal::ONE {
            return Err(AppError::Config(anyhow::anyhow!(
                "KWENTA_INPUT_VAT_RATIO must be between 0 and 1"
            )));
        }

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                max_connections,
                min_connections,
            },
            exchange: ExchangeConfig {
                api_url,
                cache_ttl_secs,
                fetch_timeout_secs,
            },
            smtp: SmtpConfig {
                host: smtp_host,
                port: smtp_port,
                user: smtp_user,
                password: Secret::new(smtp_password),
                from: smtp_from,
            },
            pdf: PdfConfig {
                base_url: pdf_base_url,
            },
            tax: TaxConfig { input_vat_ratio },
            service_name: "kwenta-invoicing".to_string(),
        })
    }
}
