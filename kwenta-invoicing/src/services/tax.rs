//! Philippine (BIR) tax calculation.
//!
//! Income tax follows the TRAIN-law progressive table with precomputed
//! base amounts per bracket. VAT, percentage tax, and withholding interact
//! as follows: VAT-registered taxpayers owe 12% output VAT net of an
//! estimated input VAT credit; non-registered taxpayers owe the 3%
//! percentage tax once gross receipts pass the VAT-exempt threshold;
//! withholding is deducted at source by the payer and is disclosed
//! separately, never added to the tax due here.

use std::sync::Arc;

use chrono::NaiveDate;
use kwenta_core::error::AppError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::instrument;

use crate::models::{
    BracketDetail, DeductionDetail, IncomeType, QuarterlyReturn, TaxBreakdown, TaxCalculation,
    TaxInput, TaxTotalsPhp, Transaction, TransactionType, VatDetail, WithholdingDetail,
};
use crate::services::calculator::round_money;
use crate::services::exchange::{ExchangeRateService, PHP};

/// Flat deduction every taxpayer may claim, PHP.
const STANDARD_DEDUCTION: Decimal = dec!(50000);
/// Optional standard deduction: 40% of gross in lieu of itemizing.
const OSD_RATE: Decimal = dec!(0.40);
/// Standard VAT rate, fraction.
const VAT_RATE: Decimal = dec!(0.12);
/// Annual gross receipts above which VAT (or percentage tax) applies, PHP.
const VAT_THRESHOLD: Decimal = dec!(3000000);
/// Percentage tax for non-VAT taxpayers above the threshold, fraction.
const PERCENTAGE_TAX_RATE: Decimal = dec!(0.03);
/// Freelance withholding applies only above this monthly-equivalent, PHP.
const FREELANCE_MONTHLY_THRESHOLD: Decimal = dec!(25000);

struct Bracket {
    lower: Decimal,
    upper: Option<Decimal>,
    rate: Decimal,
    base: Decimal,
}

/// Annual income tax table (TRAIN, 2023 onwards). `base` is the tax for
/// all brackets below.
static BRACKETS: &[Bracket] = &[
    Bracket {
        lower: dec!(0),
        upper: Some(dec!(250000)),
        rate: dec!(0),
        base: dec!(0),
    },
    Bracket {
        lower: dec!(250000),
        upper: Some(dec!(400000)),
        rate: dec!(0.15),
        base: dec!(0),
    },
    Bracket {
        lower: dec!(400000),
        upper: Some(dec!(800000)),
        rate: dec!(0.20),
        base: dec!(22500),
    },
    Bracket {
        lower: dec!(800000),
        upper: Some(dec!(2000000)),
        rate: dec!(0.25),
        base: dec!(102500),
    },
    Bracket {
        lower: dec!(2000000),
        upper: Some(dec!(8000000)),
        rate: dec!(0.30),
        base: dec!(402500),
    },
    Bracket {
        lower: dec!(8000000),
        upper: None,
        rate: dec!(0.35),
        base: dec!(2202500),
    },
];

fn bracket_for(taxable_income: Decimal) -> &'static Bracket {
    BRACKETS
        .iter()
        .find(|b| {
            taxable_income >= b.lower
                && b.upper.map(|upper| taxable_income < upper).unwrap_or(true)
        })
        .unwrap_or(&BRACKETS[0])
}

/// Progressive income tax on PHP taxable income.
fn income_tax_for(taxable_income: Decimal) -> (Decimal, &'static Bracket) {
    let bracket = bracket_for(taxable_income);
    let tax = bracket.base + (taxable_income - bracket.lower) * bracket.rate;
    (tax, bracket)
}

fn withholding_rate(income_type: IncomeType, gross_php: Decimal) -> Decimal {
    match income_type {
        IncomeType::ProfessionalServices => dec!(0.10),
        IncomeType::RentalIncome => dec!(0.05),
        IncomeType::Freelancing => {
            if gross_php / dec!(12) > FREELANCE_MONTHLY_THRESHOLD {
                dec!(0.08)
            } else {
                Decimal::ZERO
            }
        }
    }
}

pub struct TaxService {
    rates: Arc<ExchangeRateService>,
    /// Estimated input VAT as a fraction of output VAT. A placeholder
    /// policy until purchase records exist; see DESIGN.md.
    input_vat_ratio: Decimal,
}

impl TaxService {
    pub fn new(rates: Arc<ExchangeRateService>, input_vat_ratio: Decimal) -> Self {
        Self {
            rates,
            input_vat_ratio,
        }
    }

    /// Compute income tax, VAT or percentage tax, and withholding for a
    /// gross amount in any supported currency. PHP figures are retained
    /// alongside the caller-currency figures for audit.
    #[instrument(skip(self, input), fields(currency = %input.currency, income_type = input.income_type.as_str()))]
    pub async fn calculate_tax(&self, input: &TaxInput) -> Result<TaxCalculation, AppError> {
        if input.gross_income < Decimal::ZERO {
            return Err(AppError::Validation(anyhow::anyhow!(
                "gross income cannot be negative"
            )));
        }

        let quote = self.rates.rate(&input.currency, PHP).await?;
        let gross_php = input.gross_income * quote.rate;

        // Deductions: the taxpayer always gets the best of the standard
        // deduction, itemized deductions, and the 40% OSD.
        let itemized = input
            .itemized_deductions
            .unwrap_or(Decimal::ZERO)
            .max(Decimal::ZERO);
        let optional_standard = gross_php * OSD_RATE;
        let applied = STANDARD_DEDUCTION.max(itemized).max(optional_standard);

        let taxable_php = (gross_php - applied).max(Decimal::ZERO);
        let (income_tax_php, bracket) = income_tax_for(taxable_php);

        let (output_vat, input_vat, net_vat, percentage_tax_php) = if input.is_vat_registered {
            let output = gross_php * VAT_RATE;
            let input_credit = output * self.input_vat_ratio;
            let net = (output - input_credit).max(Decimal::ZERO);
            (output, input_credit, net, Decimal::ZERO)
        } else if gross_php > VAT_THRESHOLD {
            (
                Decimal::ZERO,
                Decimal::ZERO,
                Decimal::ZERO,
                gross_php * PERCENTAGE_TAX_RATE,
            )
        } else {
            (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)
        };

        let wht_rate = withholding_rate(input.income_type, gross_php);
        let withholding_php = gross_php * wht_rate;

        let total_tax_php = income_tax_php + net_vat + percentage_tax_php;
        let net_income_php = gross_php - total_tax_php;
        let effective_tax_rate = if gross_php.is_zero() {
            Decimal::ZERO
        } else {
            round_money(total_tax_php / gross_php * dec!(100))
        };

        // Back to the caller's currency for display; PHP kept for audit.
        let display = |php: Decimal| round_money(php / quote.rate);

        Ok(TaxCalculation {
            currency: input.currency.clone(),
            gross_income: input.gross_income,
            taxable_income: display(taxable_php),
            income_tax: display(income_tax_php),
            vat_amount: display(net_vat),
            percentage_tax: display(percentage_tax_php),
            withholding_tax: display(withholding_php),
            total_tax: display(total_tax_php),
            net_income: display(net_income_php),
            effective_tax_rate,
            php_equivalent: TaxTotalsPhp {
                gross_income: round_money(gross_php),
                taxable_income: round_money(taxable_php),
                income_tax: round_money(income_tax_php),
                vat_amount: round_money(net_vat),
                percentage_tax: round_money(percentage_tax_php),
                withholding_tax: round_money(withholding_php),
                total_tax: round_money(total_tax_php),
                net_income: round_money(net_income_php),
                exchange_rate: quote.rate,
                rate_stale: quote.stale,
            },
            breakdown: TaxBreakdown {
                bracket: BracketDetail {
                    lower: bracket.lower,
                    upper: bracket.upper,
                    rate: bracket.rate,
                    base_tax: bracket.base,
                },
                deductions: DeductionDetail {
                    standard: STANDARD_DEDUCTION,
                    itemized: round_money(itemized),
                    optional_standard: round_money(optional_standard),
                    applied: round_money(applied),
                },
                vat: VatDetail {
                    output_vat: round_money(output_vat),
                    input_vat: round_money(input_vat),
                    net_vat: round_money(net_vat),
                    percentage_tax: round_money(percentage_tax_php),
                    vat_registered: input.is_vat_registered,
                },
                withholding: WithholdingDetail {
                    income_type: input.income_type,
                    rate: wht_rate,
                    amount: round_money(withholding_php),
                },
            },
        })
    }

    /// Aggregate income transactions into a quarterly return and net the
    /// result against payments already made for the period.
    #[instrument(skip(self, transactions))]
    pub async fn calculate_quarterly_return(
        &self,
        transactions: &[Transaction],
        quarter: u8,
        year: i32,
        income_type: IncomeType,
        is_vat_registered: bool,
        previous_payments: Decimal,
    ) -> Result<QuarterlyReturn, AppError> {
        if !(1..=4).contains(&quarter) {
            return Err(AppError::Validation(anyhow::anyhow!(
                "quarter must be between 1 and 4"
            )));
        }
        if previous_payments < Decimal::ZERO {
            return Err(AppError::Validation(anyhow::anyhow!(
                "previous payments cannot be negative"
            )));
        }

        let (period_start, period_end, due_date) = quarter_bounds(quarter, year);

        let in_period: Vec<&Transaction> = transactions
            .iter()
            .filter(|t| {
                t.transaction_type == TransactionType::Income.as_str()
                    && t.date >= period_start
                    && t.date <= period_end
            })
            .collect();
        let gross_income: Decimal = in_period.iter().map(|t| t.amount_php).sum();

        let tax = self
            .calculate_tax(&TaxInput {
                gross_income,
                currency: PHP.to_string(),
                income_type,
                is_vat_registered,
                itemized_deductions: None,
            })
            .await?;

        let balance_due = round_money((tax.total_tax - previous_payments).max(Decimal::ZERO));

        Ok(QuarterlyReturn {
            quarter,
            year,
            period_start,
            period_end,
            due_date,
            gross_income: round_money(gross_income),
            transaction_count: in_period.len(),
            tax,
            previous_payments,
            balance_due,
        })
    }
}

/// Fixed calendar quarters; returns due on the 15th of the following
/// month, except Q4 which is due with the annual return on April 15.
pub(crate) fn quarter_bounds(quarter: u8, year: i32) -> (NaiveDate, NaiveDate, NaiveDate) {
    let date = |y: i32, m: u32, d: u32| {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid calendar date")
    };
    match quarter {
        1 => (date(year, 1, 1), date(year, 3, 31), date(year, 4, 15)),
        2 => (date(year, 4, 1), date(year, 6, 30), date(year, 7, 15)),
        3 => (date(year, 7, 1), date(year, 9, 30), date(year, 10, 15)),
        _ => (date(year, 10, 1), date(year, 12, 31), date(year + 1, 4, 15)),
    }
}
