//! Pure invoice arithmetic.
//!
//! Quantities and rates are validated by the lifecycle manager before they
//! reach this module; the calculator only does arithmetic. All stored
//! figures are rounded to 2 decimal places, half away from zero, at the
//! storage boundary — intermediate products keep full precision so
//! rounding error never compounds across line items.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::models::{Discount, DiscountKind, LineItem, LineItemInput};

/// Standard VAT rate applied in VAT-aware mode, percent.
pub const VAT_RATE: Decimal = dec!(12);
/// Withholding applied when invoicing a business client, percent.
pub const BUSINESS_WITHHOLDING_RATE: Decimal = dec!(10);

const HUNDRED: Decimal = dec!(100);

/// Round a monetary figure for storage: 2 decimal places, half away from
/// zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Invoice totals derived from line items, tax rate, and discount.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub discounted_subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

/// VAT-aware totals for VAT-registered issuers.
#[derive(Debug, Clone, PartialEq)]
pub struct VatAwareTotals {
    pub totals: InvoiceTotals,
    pub withholding_tax_amount: Decimal,
    pub net_amount_due: Decimal,
}

/// Materialize line items from inputs, deriving each `amount`.
pub fn build_line_items(inputs: &[LineItemInput]) -> Vec<LineItem> {
    inputs
        .iter()
        .map(|item| LineItem {
            id: Uuid::new_v4(),
            description: item.description.clone(),
            quantity: item.quantity,
            rate: item.rate,
            amount: round_money(item.quantity * item.rate),
            taxable: item.taxable,
            tax_rate: item.tax_rate,
        })
        .collect()
}

fn subtotal_of(items: &[LineItem]) -> Decimal {
    items
        .iter()
        .map(|item| item.quantity * item.rate)
        .sum::<Decimal>()
}

fn discount_on(subtotal: Decimal, discount: Option<&Discount>) -> Decimal {
    match discount {
        Some(d) => match d.kind {
            DiscountKind::Percentage => subtotal * d.value / HUNDRED,
            DiscountKind::Fixed => d.value.min(subtotal),
        },
        None => Decimal::ZERO,
    }
}

/// Compute subtotal, discount, tax, and total.
///
/// `tax_rate` is a percent (0-100). The discounted subtotal is clamped at
/// zero so a discount can never drive the total negative.
pub fn compute_totals(
    items: &[LineItem],
    tax_rate: Decimal,
    discount: Option<&Discount>,
) -> InvoiceTotals {
    let subtotal = round_money(subtotal_of(items));
    let discount_amount = round_money(discount_on(subtotal, discount));
    let discounted_subtotal = (subtotal - discount_amount).max(Decimal::ZERO);
    let tax_amount = round_money(discounted_subtotal * tax_rate / HUNDRED);
    let total = discounted_subtotal + tax_amount;

    InvoiceTotals {
        subtotal,
        discount_amount,
        discounted_subtotal,
        tax_amount,
        total,
    }
}

/// VAT-aware mode: a fixed 12% VAT replaces the supplied tax rate, and
/// business clients withhold 10% of the discounted subtotal at source.
pub fn compute_totals_vat_aware(
    items: &[LineItem],
    discount: Option<&Discount>,
    client_is_business: bool,
) -> VatAwareTotals {
    let totals = compute_totals(items, VAT_RATE, discount);
    let withholding_tax_amount = if client_is_business {
        round_money(totals.discounted_subtotal * BUSINESS_WITHHOLDING_RATE / HUNDRED)
    } else {
        Decimal::ZERO
    };
    let net_amount_due = totals.total - withholding_tax_amount;

    VatAwareTotals {
        totals,
        withholding_tax_amount,
        net_amount_due,
    }
}

/// Share of the total covered by payments, percent, clamped to 0-100.
pub fn payment_percentage(total_paid: Decimal, total: Decimal) -> Decimal {
    if total <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    round_money((total_paid / total * HUNDRED).min(HUNDRED))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: Decimal, rate: Decimal) -> LineItem {
        LineItem {
            id: Uuid::new_v4(),
            description: "work".to_string(),
            quantity,
            rate,
            amount: round_money(quantity * rate),
            taxable: None,
            tax_rate: None,
        }
    }

    #[test]
    fn subtotal_is_exact_sum_of_line_amounts() {
        // 100 items with an awkward rate must not drift.
        let items: Vec<LineItem> = (0..100).map(|_| item(dec!(3), dec!(0.07))).collect();
        let totals = compute_totals(&items, Decimal::ZERO, None);
        assert_eq!(totals.subtotal, dec!(21.00));
        assert_eq!(totals.total, dec!(21.00));
    }

    #[test]
    fn two_line_items_with_twelve_percent_tax() {
        let items = vec![item(dec!(10), dec!(500)), item(dec!(1), dec!(2000))];
        let totals = compute_totals(&items, dec!(12), None);
        assert_eq!(totals.subtotal, dec!(7000));
        assert_eq!(totals.tax_amount, dec!(840));
        assert_eq!(totals.total, dec!(7840));
    }

    #[test]
    fn percentage_discount_applies_before_tax() {
        let items = vec![item(dec!(1), dec!(1000))];
        let discount = Discount {
            kind: DiscountKind::Percentage,
            value: dec!(10),
        };
        let totals = compute_totals(&items, dec!(12), Some(&discount));
        assert_eq!(totals.discount_amount, dec!(100));
        assert_eq!(totals.discounted_subtotal, dec!(900));
        assert_eq!(totals.tax_amount, dec!(108));
        assert_eq!(totals.total, dec!(1008));
    }

    #[test]
    fn fixed_discount_is_clamped_to_subtotal() {
        let items = vec![item(dec!(1), dec!(500))];
        let discount = Discount {
            kind: DiscountKind::Fixed,
            value: dec!(900),
        };
        let totals = compute_totals(&items, dec!(12), Some(&discount));
        assert_eq!(totals.discount_amount, dec!(500));
        assert_eq!(totals.discounted_subtotal, Decimal::ZERO);
        assert_eq!(totals.total, Decimal::ZERO);
    }

    #[test]
    fn discounted_subtotal_never_exceeds_subtotal() {
        let items = vec![item(dec!(2), dec!(250))];
        for value in [dec!(0), dec!(50), dec!(100)] {
            let discount = Discount {
                kind: DiscountKind::Percentage,
                value,
            };
            let totals = compute_totals(&items, dec!(5), Some(&discount));
            assert!(totals.discounted_subtotal >= Decimal::ZERO);
            assert!(totals.discounted_subtotal <= totals.subtotal);
        }
    }

    #[test]
    fn totals_recompute_to_the_same_figures() {
        // Round-trip idempotence: recomputing from the same line items,
        // tax, and discount always reproduces the stored totals.
        let items = vec![item(dec!(3.5), dec!(1333.33)), item(dec!(1), dec!(99.99))];
        let discount = Discount {
            kind: DiscountKind::Percentage,
            value: dec!(7.5),
        };
        let first = compute_totals(&items, dec!(12), Some(&discount));
        let second = compute_totals(&items, dec!(12), Some(&discount));
        assert_eq!(first, second);
        assert_eq!(
            first.total,
            (first.subtotal - first.discount_amount).max(Decimal::ZERO) + first.tax_amount
        );
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round_money(dec!(1.005)), dec!(1.01));
        assert_eq!(round_money(dec!(1.004)), dec!(1.00));
        assert_eq!(round_money(dec!(-1.005)), dec!(-1.01));
    }

    #[test]
    fn vat_aware_mode_substitutes_twelve_percent_and_withholds_for_business() {
        let items = vec![item(dec!(1), dec!(10000))];
        let result = compute_totals_vat_aware(&items, None, true);
        assert_eq!(result.totals.tax_amount, dec!(1200));
        assert_eq!(result.totals.total, dec!(11200));
        assert_eq!(result.withholding_tax_amount, dec!(1000));
        assert_eq!(result.net_amount_due, dec!(10200));

        let personal = compute_totals_vat_aware(&items, None, false);
        assert_eq!(personal.withholding_tax_amount, Decimal::ZERO);
        assert_eq!(personal.net_amount_due, personal.totals.total);
    }

    #[test]
    fn payment_percentage_matches_partial_payment_scenario() {
        assert_eq!(payment_percentage(dec!(3000), dec!(7840)), dec!(38.27));
        assert_eq!(payment_percentage(dec!(7840), dec!(7840)), dec!(100));
        assert_eq!(payment_percentage(dec!(9000), dec!(7840)), dec!(100));
        assert_eq!(payment_percentage(dec!(10), Decimal::ZERO), Decimal::ZERO);
    }
}
