//! Philippine (BIR) tax calculation types.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Income classification driving the withholding rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeType {
    /// Professional services: 10% withholding.
    ProfessionalServices,
    /// Rental income: 5% withholding.
    RentalIncome,
    /// Freelancing: 8% withholding, only above the monthly threshold.
    Freelancing,
}

impl IncomeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncomeType::ProfessionalServices => "professional_services",
            IncomeType::RentalIncome => "rental_income",
            IncomeType::Freelancing => "freelancing",
        }
    }
}

/// Input to the tax calculator.
#[derive(Debug, Clone)]
pub struct TaxInput {
    pub gross_income: Decimal,
    pub currency: String,
    pub income_type: IncomeType,
    pub is_vat_registered: bool,
    pub itemized_deductions: Option<Decimal>,
}

/// The progressive bracket the taxable income landed in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketDetail {
    pub lower: Decimal,
    pub upper: Option<Decimal>,
    /// Fraction, e.g. 0.15.
    pub rate: Decimal,
    /// Precomputed tax for all brackets below this one.
    pub base_tax: Decimal,
}

/// Best-of-three deduction rule: standard, itemized, or 40% OSD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeductionDetail {
    pub standard: Decimal,
    pub itemized: Decimal,
    pub optional_standard: Decimal,
    pub applied: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VatDetail {
    pub output_vat: Decimal,
    /// Estimated; see `tax.input_vat_ratio` in the configuration.
    pub input_vat: Decimal,
    pub net_vat: Decimal,
    pub percentage_tax: Decimal,
    pub vat_registered: bool,
}

/// Withholding reduces cash received from the client; it is disclosed but
/// not added to the total tax due.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithholdingDetail {
    pub income_type: IncomeType,
    pub rate: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxBreakdown {
    pub bracket: BracketDetail,
    pub deductions: DeductionDetail,
    pub vat: VatDetail,
    pub withholding: WithholdingDetail,
}

/// PHP figures retained for audit when the caller works in another
/// currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxTotalsPhp {
    pub gross_income: Decimal,
    pub taxable_income: Decimal,
    pub income_tax: Decimal,
    pub vat_amount: Decimal,
    pub percentage_tax: Decimal,
    pub withholding_tax: Decimal,
    pub total_tax: Decimal,
    pub net_income: Decimal,
    /// PHP per unit of the caller's currency at calculation time.
    pub exchange_rate: Decimal,
    pub rate_stale: bool,
}

/// Result of a tax calculation, in the caller's currency.
///
/// Invariant: `net_income = gross_income - (income_tax + vat_amount +
/// percentage_tax)`; withholding is reported separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxCalculation {
    pub currency: String,
    pub gross_income: Decimal,
    pub taxable_income: Decimal,
    pub income_tax: Decimal,
    pub vat_amount: Decimal,
    pub percentage_tax: Decimal,
    pub withholding_tax: Decimal,
    pub total_tax: Decimal,
    pub net_income: Decimal,
    /// Percent of gross, 2 decimal places.
    pub effective_tax_rate: Decimal,
    pub php_equivalent: TaxTotalsPhp,
    pub breakdown: TaxBreakdown,
}

/// Quarterly income tax return aggregated from income transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarterlyReturn {
    pub quarter: u8,
    pub year: i32,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub due_date: NaiveDate,
    pub gross_income: Decimal,
    pub transaction_count: usize,
    pub tax: TaxCalculation,
    pub previous_payments: Decimal,
    /// Never negative; excess becomes a refund tracked outside this
    /// engine.
    pub balance_due: Decimal,
}
