//! Engine services: calculators, collaborator clients, and stores.

pub mod calculator;
pub mod email;
pub mod exchange;
pub mod invoices;
pub mod metrics;
pub mod payments;
pub mod pdf;
pub mod store;
pub mod tax;

pub use email::{EmailReceipt, InvoiceMailer, SmtpMailer};
pub use exchange::{ExchangeRateService, HttpRateFetcher, RateFetcher};
pub use invoices::{AnalyticsPeriod, InvoiceAnalytics, InvoiceService, SendOutcome};
pub use metrics::{get_metrics, init_metrics};
pub use payments::{PaymentService, RecordPaymentOutcome};
pub use pdf::{HttpPdfRenderer, PdfRenderer};
pub use store::{FinanceStore, InMemoryStore, PaymentCommit, PgStore};
pub use tax::TaxService;
