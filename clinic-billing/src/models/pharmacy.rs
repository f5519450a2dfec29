//! Pharmacy line items.

use super::records::{MedicineStock, PharmacySaleLine};
use super::treatment::{clamp_percentage, max_amount};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One medicine batch on the sale being composed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PharmacyLineItem {
    pub medicine_id: String,
    pub medicine_name: String,
    pub batch_number: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    /// Stock on hand when the medicine was added.
    pub available_stock: u32,
    pub gst_percentage: Decimal,
}

/// Why a quantity edit was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityRejection {
    ExceedsStock { available: u32 },
    BelowOne,
}

impl std::fmt::Display for QuantityRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuantityRejection::ExceedsStock { available } => {
                write!(f, "Only {} units available", available)
            }
            QuantityRejection::BelowOne => write!(f, "Quantity must be at least 1"),
        }
    }
}

impl PharmacyLineItem {
    /// New line with quantity 1, capturing the current stock level.
    pub fn from_stock(medicine: &MedicineStock) -> Self {
        Self {
            medicine_id: medicine.id.clone(),
            medicine_name: medicine.name.clone(),
            batch_number: medicine.batch_number.clone().unwrap_or_default(),
            unit_price: medicine.unit_price().max(Decimal::ZERO).min(max_amount()),
            quantity: 1,
            available_stock: stock_units(medicine.quantity),
            gst_percentage: clamp_percentage(medicine.gst_percentage.unwrap_or_default()),
        }
    }

    /// Exact for any capped price and `u32` quantity.
    pub fn line_total(&self) -> Decimal {
        self.unit_price.saturating_mul(Decimal::from(self.quantity))
    }

    /// Set the quantity if it is within `1..=available_stock`; otherwise the
    /// current quantity is kept.
    pub fn try_set_quantity(&mut self, quantity: u32) -> Result<(), QuantityRejection> {
        if quantity < 1 {
            return Err(QuantityRejection::BelowOne);
        }
        if quantity > self.available_stock {
            return Err(QuantityRejection::ExceedsStock {
                available: self.available_stock,
            });
        }
        self.quantity = quantity;
        Ok(())
    }

    pub fn to_sale_line(&self) -> PharmacySaleLine {
        PharmacySaleLine {
            medicine_id: self.medicine_id.clone(),
            medicine_name: self.medicine_name.clone(),
            batch_number: self.batch_number.clone(),
            quantity: self.quantity,
            unit_price: self.unit_price,
            total_price: self.line_total(),
            gst_percentage: self.gst_percentage,
        }
    }
}

/// Whole units in stock; fractional or negative stock rounds down to what
/// can actually be sold.
pub(crate) fn stock_units(quantity: Decimal) -> u32 {
    quantity.floor().to_u32().unwrap_or(0)
}
