//! PDF rendering collaborator.
//!
//! The renderer is an external document service; this client posts the
//! invoice and gets back a URL. Rendering is idempotent per invoice
//! content, so re-sending an unchanged invoice reuses the same document.

use async_trait::async_trait;
use kwenta_core::error::AppError;
use serde::Deserialize;

use crate::models::Invoice;

#[async_trait]
pub trait PdfRenderer: Send + Sync {
    /// Render the invoice and return the document URL.
    async fn render_invoice(&self, invoice: &Invoice) -> Result<String, AppError>;
}

#[derive(Debug, Deserialize)]
struct RenderResponse {
    url: String,
}

/// HTTP client against the document renderer.
pub struct HttpPdfRenderer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPdfRenderer {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl PdfRenderer for HttpPdfRenderer {
    async fn render_invoice(&self, invoice: &Invoice) -> Result<String, AppError> {
        let url = format!("{}/render/invoice", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(invoice)
            .send()
            .await
            .map_err(|e| AppError::external("pdf-renderer", e.into()))?;

        if !response.status().is_success() {
            return Err(AppError::external(
                "pdf-renderer",
                anyhow::anyhow!("renderer returned {}", response.status()),
            ));
        }

        let rendered: RenderResponse = response
            .json()
            .await
            .map_err(|e| AppError::external("pdf-renderer", e.into()))?;

        tracing::debug!(invoice_id = %invoice.invoice_id, url = %rendered.url, "Invoice rendered");
        Ok(rendered.url)
    }
}
