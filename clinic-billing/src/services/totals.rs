//! Bill arithmetic.
//!
//! Discounts and GST are independent terms: GST is charged on the gross
//! line amount and discounts are subtracted afterwards. Totals never go
//! below zero.

use crate::models::{bounded_amount, AmountTooLarge, PharmacyLineItem, TreatmentLineItem};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Amounts shown for the treatment bill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentTotals {
    pub subtotal: Decimal,
    pub item_discounts: Decimal,
    pub overall_discount: Decimal,
    pub gst_amount: Decimal,
    pub total: Decimal,
}

impl TreatmentTotals {
    /// Item discounts plus the overall discount, as recorded on the bill.
    pub fn total_discount(&self) -> Decimal {
        self.item_discounts.saturating_add(self.overall_discount)
    }
}

/// Amounts shown for the pharmacy sale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PharmacyTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

fn checked_sum(values: impl IntoIterator<Item = Option<Decimal>>) -> Option<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |sum, value| sum.checked_add(value?))
}

/// Treatment totals, or `None` when they do not fit a `Decimal`.
pub fn checked_treatment_totals(
    items: &[TreatmentLineItem],
    overall_discount: Decimal,
) -> Option<TreatmentTotals> {
    let subtotal = checked_sum(items.iter().map(|item| Some(non_negative(item.amount))))?;
    let item_discounts = checked_sum(items.iter().map(|item| Some(non_negative(item.discount))))?;
    let gst_amount = checked_sum(items.iter().map(|item| item.gst_amount().map(non_negative)))?;
    let overall_discount = non_negative(overall_discount);
    let total = subtotal
        .checked_sub(item_discounts)?
        .checked_sub(overall_discount)?
        .checked_add(gst_amount)?;

    Some(TreatmentTotals {
        subtotal,
        item_discounts,
        overall_discount,
        gst_amount,
        total: non_negative(total),
    })
}

/// Sessions refuse edits that overflow, so the zero fallback is never
/// shown for a live draft.
pub fn treatment_totals(items: &[TreatmentLineItem], overall_discount: Decimal) -> TreatmentTotals {
    checked_treatment_totals(items, overall_discount).unwrap_or_default()
}

pub fn checked_pharmacy_totals(
    items: &[PharmacyLineItem],
    discount: Decimal,
) -> Option<PharmacyTotals> {
    let subtotal = checked_sum(items.iter().map(|item| Some(non_negative(item.line_total()))))?;
    let discount = non_negative(discount);

    Some(PharmacyTotals {
        subtotal,
        discount,
        total: non_negative(subtotal.checked_sub(discount)?),
    })
}

pub fn pharmacy_totals(items: &[PharmacyLineItem], discount: Decimal) -> PharmacyTotals {
    checked_pharmacy_totals(items, discount).unwrap_or_default()
}

/// GST collected on a pharmacy sale, for the stored record.
pub fn pharmacy_gst(items: &[PharmacyLineItem]) -> Decimal {
    checked_sum(items.iter().map(|item| {
        item.line_total()
            .checked_mul(item.gst_percentage)?
            .checked_div(Decimal::ONE_HUNDRED)
    }))
    .unwrap_or_default()
}

pub fn non_negative(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO)
}

/// Parse a currency form field. Blank, malformed or negative input is 0;
/// anything over [`MAX_AMOUNT`](crate::models::MAX_AMOUNT) is refused.
pub fn parse_amount(input: &str) -> Result<Decimal, AmountTooLarge> {
    Decimal::from_str(input.trim())
        .map(bounded_amount)
        .unwrap_or(Ok(Decimal::ZERO))
}

/// Parse a units form field. Anything that is not a positive integer is 1.
pub fn parse_units(input: &str) -> u32 {
    input
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|units| *units >= 1)
        .unwrap_or(1)
}

/// Parse a quantity form field; `None` when it is not a whole number.
pub fn parse_quantity(input: &str) -> Option<u32> {
    input.trim().parse::<u32>().ok()
}
