//! Treatment line items.

use super::records::{BillServiceLine, TreatmentCatalogEntry};
use super::tooth::{ToothCode, ToothSelection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One treatment on the bill being composed.
///
/// `amount` is derived: `base_amount` times the number of selected teeth,
/// or times `units` when no tooth is selected. Every setter recomputes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentLineItem {
    pub treatment_id: String,
    pub treatment_name: String,
    pub base_amount: Decimal,
    pub units: u32,
    pub teeth: ToothSelection,
    pub discount: Decimal,
    pub gst_percentage: Decimal,
    pub amount: Decimal,
}

impl Default for TreatmentLineItem {
    fn default() -> Self {
        Self {
            treatment_id: String::new(),
            treatment_name: String::new(),
            base_amount: Decimal::ZERO,
            units: 1,
            teeth: ToothSelection::new(),
            discount: Decimal::ZERO,
            gst_percentage: Decimal::ZERO,
            amount: Decimal::ZERO,
        }
    }
}

/// Largest amount accepted in any money field, in rupees.
pub const MAX_AMOUNT: i64 = 1_000_000_000;

pub fn max_amount() -> Decimal {
    Decimal::from(MAX_AMOUNT)
}

/// An edit whose amounts would not fit on a bill. The line is left as it
/// was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountTooLarge;

impl std::fmt::Display for AmountTooLarge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Amount cannot exceed {}", MAX_AMOUNT)
    }
}

impl std::error::Error for AmountTooLarge {}

impl TreatmentLineItem {
    /// Blank line awaiting a treatment choice.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a line from a stored bill so it can be edited again.
    pub fn from_service_line(line: &BillServiceLine) -> Result<Self, AmountTooLarge> {
        let base_amount = if line.base_amount.is_zero() {
            line.amount
        } else {
            line.base_amount
        };
        let mut item = Self {
            treatment_id: line.treatment_id.clone().unwrap_or_default(),
            treatment_name: line.service_name.clone(),
            base_amount: bounded_amount(base_amount)?,
            units: line.units.max(1),
            teeth: line.teeth.iter().copied().collect(),
            discount: bounded_amount(line.discount)?,
            gst_percentage: clamp_percentage(line.gst_percentage),
            amount: Decimal::ZERO,
        };
        item.amount = item.checked_amount().ok_or(AmountTooLarge)?;
        Ok(item)
    }

    /// Teeth count when any tooth is selected, otherwise units (at least 1).
    pub fn multiplier(&self) -> u32 {
        if self.teeth.is_empty() {
            self.units.max(1)
        } else {
            self.teeth.len() as u32
        }
    }

    fn checked_amount(&self) -> Option<Decimal> {
        self.base_amount.checked_mul(Decimal::from(self.multiplier()))
    }

    /// Run `change` on a copy and keep it only if the amounts still fit.
    fn edit(&mut self, change: impl FnOnce(&mut Self)) -> Result<(), AmountTooLarge> {
        let mut next = self.clone();
        change(&mut next);
        next.amount = next.checked_amount().ok_or(AmountTooLarge)?;
        next.gst_amount().ok_or(AmountTooLarge)?;
        *self = next;
        Ok(())
    }

    /// Switch to a catalog treatment. Teeth and units are kept.
    pub fn apply_catalog_entry(
        &mut self,
        entry: &TreatmentCatalogEntry,
    ) -> Result<(), AmountTooLarge> {
        let base_amount = bounded_amount(entry.charges)?;
        self.edit(|item| {
            item.treatment_id = entry.id.clone();
            item.treatment_name = entry.name.clone();
            item.base_amount = base_amount;
            item.gst_percentage = clamp_percentage(entry.gst_percentage.unwrap_or_default());
        })
    }

    pub fn set_base_amount(&mut self, base_amount: Decimal) -> Result<(), AmountTooLarge> {
        let base_amount = bounded_amount(base_amount)?;
        self.edit(|item| item.base_amount = base_amount)
    }

    pub fn set_units(&mut self, units: u32) -> Result<(), AmountTooLarge> {
        self.edit(|item| item.units = units.max(1))
    }

    pub fn set_discount(&mut self, discount: Decimal) -> Result<(), AmountTooLarge> {
        self.discount = bounded_amount(discount)?;
        Ok(())
    }

    pub fn set_teeth(&mut self, teeth: ToothSelection) -> Result<(), AmountTooLarge> {
        self.edit(|item| item.teeth = teeth)
    }

    /// Flip one tooth. Returns whether it is now selected.
    pub fn toggle_tooth(&mut self, code: ToothCode) -> Result<bool, AmountTooLarge> {
        let mut selected = false;
        self.edit(|item| selected = item.teeth.toggle(code))?;
        Ok(selected)
    }

    /// GST on the gross line amount; `None` if it does not fit a `Decimal`.
    pub fn gst_amount(&self) -> Option<Decimal> {
        self.amount
            .checked_mul(self.gst_percentage)?
            .checked_div(Decimal::ONE_HUNDRED)
    }

    /// Service line as sent to the billing service.
    pub fn to_service_line(&self) -> BillServiceLine {
        BillServiceLine {
            treatment_id: Some(self.treatment_id.clone()).filter(|id| !id.is_empty()),
            service_name: self.treatment_name.clone(),
            description: String::new(),
            base_amount: self.base_amount,
            units: self.units,
            amount: self.amount,
            gst_percentage: self.gst_percentage,
            discount: self.discount,
            teeth: self.teeth.to_vec(),
            teeth_count: self.teeth.len(),
        }
    }
}

pub(crate) fn clamp_percentage(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO).min(Decimal::ONE_HUNDRED)
}

/// Negative amounts become 0; amounts over [`MAX_AMOUNT`] are refused.
pub fn bounded_amount(value: Decimal) -> Result<Decimal, AmountTooLarge> {
    if value > max_amount() {
        return Err(AmountTooLarge);
    }
    Ok(value.max(Decimal::ZERO))
}
