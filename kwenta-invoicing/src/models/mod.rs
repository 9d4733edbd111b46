//! Domain models for the Kwenta invoicing engine.

mod client;
mod invoice;
mod payment;
mod tax;
mod transaction;

pub use client::{Client, CreateClient};
pub use invoice::{
    CreateInvoice, Discount, DiscountKind, Invoice, InvoiceStatus, LineItem, LineItemInput,
    ListInvoicesFilter, UpdateInvoice,
};
pub use payment::{Payment, PaymentMethod, PaymentStatus, PaymentSummary, RecordPayment};
pub use tax::{
    BracketDetail, DeductionDetail, IncomeType, QuarterlyReturn, TaxBreakdown, TaxCalculation,
    TaxInput, TaxTotalsPhp, VatDetail, WithholdingDetail,
};
pub use transaction::{Transaction, TransactionMetadata, TransactionType};
