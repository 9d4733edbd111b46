//! Application startup and lifecycle management.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use kwenta_core::error::AppError;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::handlers;
use crate::services::{
    init_metrics, ExchangeRateService, FinanceStore, HttpPdfRenderer, HttpRateFetcher,
    InvoiceMailer, InvoiceService, PaymentService, PdfRenderer, PgStore, SmtpMailer, TaxService,
};

/// Shared application state: the engine services over one injected store.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn FinanceStore>,
    pub invoices: Arc<InvoiceService>,
    pub payments: Arc<PaymentService>,
    pub tax: Arc<TaxService>,
}

impl AppState {
    /// Wire the services over any store and collaborators. The test
    /// harness calls this with the in-memory store and mock collaborators.
    pub fn build(
        store: Arc<dyn FinanceStore>,
        rates: Arc<ExchangeRateService>,
        pdf: Arc<dyn PdfRenderer>,
        mailer: Arc<dyn InvoiceMailer>,
        input_vat_ratio: Decimal,
    ) -> Self {
        let invoices = Arc::new(InvoiceService::new(
            store.clone(),
            rates.clone(),
            pdf,
            mailer.clone(),
        ));
        let payments = Arc::new(PaymentService::new(store.clone(), rates.clone(), mailer));
        let tax = Arc::new(TaxService::new(rates, input_vat_ratio));
        Self {
            store,
            invoices,
            payments,
            tax,
        }
    }
}

/// Build the REST router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/clients", post(handlers::clients::create_client))
        .route("/clients/:id", get(handlers::clients::get_client))
        .route(
            "/invoices",
            post(handlers::invoices::create_invoice).get(handlers::invoices::list_invoices),
        )
        .route(
            "/invoices/:id",
            get(handlers::invoices::get_invoice)
                .patch(handlers::invoices::update_invoice)
                .delete(handlers::invoices::delete_invoice),
        )
        .route("/invoices/:id/send", post(handlers::invoices::send_invoice))
        .route("/invoices/:id/remind", post(handlers::invoices::send_reminder))
        .route("/invoices/:id/viewed", post(handlers::invoices::mark_viewed))
        .route("/invoices/:id/cancel", post(handlers::invoices::cancel_invoice))
        .route(
            "/invoices/:id/payments",
            post(handlers::payments::record_payment),
        )
        .route(
            "/invoices/:id/payments/summary",
            get(handlers::payments::payment_summary),
        )
        .route(
            "/analytics/invoices",
            get(handlers::invoices::invoice_analytics),
        )
        .route("/tax/calculate", post(handlers::tax::calculate_tax))
        .route("/tax/quarterly", post(handlers::tax::quarterly_return))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration: Postgres
    /// store, live rate source, SMTP mailer, HTTP PDF renderer.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        init_metrics();

        let store = PgStore::connect(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;
        store.run_migrations().await?;

        let rates = Arc::new(ExchangeRateService::new(
            Arc::new(HttpRateFetcher::new(config.exchange.api_url.clone())),
            Duration::from_secs(config.exchange.cache_ttl_secs),
            Duration::from_secs(config.exchange.fetch_timeout_secs),
        ));
        let mailer = Arc::new(SmtpMailer::new(&config.smtp)?);
        let pdf = Arc::new(HttpPdfRenderer::new(config.pdf.base_url.clone()));

        let state = AppState::build(
            Arc::new(store),
            rates,
            pdf,
            mailer,
            config.tax.input_vat_ratio,
        );

        // Port 0 binds a random free port, used by tests.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "{} listening", config.service_name);

        Ok(Self {
            port,
            listener,
            router: build_router(state),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router).await
    }
}
