//! Outstanding balance of a patient across the three backend sources.
//!
//! Credit sales, treatment bills and pharmacy sales are summed
//! independently. A credit sale may point at a bill or sale that is also
//! matched here; such pairs are reported by [`PendingBalance::possible_overlaps`]
//! but still counted twice.

use crate::models::{
    BillKind, BillingMode, CreditSaleRecord, Patient, PaymentStatus, PharmacySaleRecord,
    TreatmentBillRecord,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The identifiers a record may use to refer to a patient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientIdentity {
    pub id: String,
    pub patient_code: Option<String>,
    pub name: String,
}

impl PatientIdentity {
    pub fn of(patient: &Patient) -> Self {
        Self {
            id: patient.id.clone(),
            patient_code: patient.patient_code.clone(),
            name: patient.name.clone(),
        }
    }

    /// True when the record's patient id is this patient's code or internal
    /// id, or its patient name equals this patient's name ignoring case.
    pub fn matches(&self, patient_id: Option<&str>, patient_name: Option<&str>) -> bool {
        if let Some(record_id) = patient_id.map(str::trim).filter(|id| !id.is_empty()) {
            if record_id == self.id {
                return true;
            }
            if self.patient_code.as_deref().map(str::trim) == Some(record_id) {
                return true;
            }
        }

        let name = self.name.trim();
        match patient_name.map(str::trim) {
            Some(record_name) if !name.is_empty() && !record_name.is_empty() => {
                record_name.to_lowercase() == name.to_lowercase()
            }
            _ => false,
        }
    }
}

/// A credit sale that refers to a bill or pharmacy sale also matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOverlap {
    pub credit_sale_id: String,
    pub record_id: String,
    pub kind: BillKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingBalance {
    pub credit_sales: Vec<CreditSaleRecord>,
    pub treatment_bills: Vec<TreatmentBillRecord>,
    pub pharmacy_sales: Vec<PharmacySaleRecord>,
    pub pending_treatment_total: Decimal,
    pub pending_pharmacy_total: Decimal,
}

impl PendingBalance {
    pub fn combined_total(&self) -> Decimal {
        self.pending_treatment_total
            .saturating_add(self.pending_pharmacy_total)
    }

    /// Pending amount that counts toward the grand total in `mode`.
    pub fn total_for(&self, mode: BillingMode) -> Decimal {
        match mode {
            BillingMode::All => self.combined_total(),
            BillingMode::Treatment => self.pending_treatment_total,
            BillingMode::Pharmacy => self.pending_pharmacy_total,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.credit_sales.is_empty()
            && self.treatment_bills.is_empty()
            && self.pharmacy_sales.is_empty()
    }

    pub fn find_bill(&self, bill_id: &str) -> Option<&TreatmentBillRecord> {
        self.treatment_bills.iter().find(|bill| bill.id == bill_id)
    }

    pub fn possible_overlaps(&self) -> Vec<PendingOverlap> {
        let mut overlaps = Vec::new();
        for sale in &self.credit_sales {
            if let Some(bill_id) = sale.bill_id.as_deref() {
                if self.find_bill(bill_id).is_some() {
                    overlaps.push(PendingOverlap {
                        credit_sale_id: sale.id.clone(),
                        record_id: bill_id.to_string(),
                        kind: BillKind::Treatment,
                    });
                }
            }
            if let Some(sale_id) = sale.pharmacy_sale_id.as_deref() {
                if self.pharmacy_sales.iter().any(|s| s.id == sale_id) {
                    overlaps.push(PendingOverlap {
                        credit_sale_id: sale.id.clone(),
                        record_id: sale_id.to_string(),
                        kind: BillKind::Pharmacy,
                    });
                }
            }
        }
        overlaps
    }
}

/// Remaining amount on a credit sale.
pub fn credit_sale_due(sale: &CreditSaleRecord) -> Decimal {
    let paid = sale.paid_amount.unwrap_or_default();
    sale.pending_amount
        .unwrap_or_else(|| sale.total_amount.saturating_sub(paid))
        .max(Decimal::ZERO)
}

pub fn treatment_bill_due(bill: &TreatmentBillRecord) -> Decimal {
    let paid = bill.paid_amount.unwrap_or_default();
    bill.balance_amount
        .unwrap_or_else(|| bill.total_amount.saturating_sub(paid))
        .max(Decimal::ZERO)
}

pub fn pharmacy_sale_due(sale: &PharmacySaleRecord) -> Decimal {
    let paid = sale.paid_amount.unwrap_or_default();
    sale.balance_amount
        .unwrap_or_else(|| sale.total_amount.saturating_sub(paid))
        .max(Decimal::ZERO)
}

fn is_outstanding(status: Option<&str>) -> bool {
    status
        .and_then(PaymentStatus::parse)
        .is_some_and(|s| s.is_outstanding())
}

fn credit_sale_is_open(sale: &CreditSaleRecord) -> bool {
    let paid = sale.paid_amount.unwrap_or_default();
    let settled = sale
        .status
        .as_deref()
        .and_then(PaymentStatus::parse)
        .is_some_and(|s| s == PaymentStatus::Paid);
    !settled && sale.total_amount.saturating_sub(paid) > Decimal::ZERO
}

/// Filter, partition and sum the records that belong to `patient`.
pub fn aggregate_pending_balance(
    patient: &PatientIdentity,
    credit_sales: Vec<CreditSaleRecord>,
    treatment_bills: Vec<TreatmentBillRecord>,
    pharmacy_sales: Vec<PharmacySaleRecord>,
) -> PendingBalance {
    let credit_sales: Vec<_> = credit_sales
        .into_iter()
        .filter(|sale| {
            patient.matches(sale.patient_id.as_deref(), sale.patient_name.as_deref())
                && credit_sale_is_open(sale)
        })
        .collect();

    let treatment_bills: Vec<_> = treatment_bills
        .into_iter()
        .filter(|bill| {
            patient.matches(bill.patient_id.as_deref(), bill.patient_name.as_deref())
                && (bill.is_temporary || is_outstanding(bill.payment_status.as_deref()))
        })
        .collect();

    let pharmacy_sales: Vec<_> = pharmacy_sales
        .into_iter()
        .filter(|sale| {
            patient.matches(sale.patient_id.as_deref(), sale.patient_name.as_deref())
                && is_outstanding(sale.payment_status.as_deref())
        })
        .collect();

    // Backend amounts are unbounded; sums saturate instead of overflowing.
    let mut pending_treatment_total = Decimal::ZERO;
    let mut pending_pharmacy_total = Decimal::ZERO;

    for sale in &credit_sales {
        let due = credit_sale_due(sale);
        match BillKind::from_sale_type(sale.sale_type.as_deref()) {
            BillKind::Treatment => {
                pending_treatment_total = pending_treatment_total.saturating_add(due)
            }
            BillKind::Pharmacy => pending_pharmacy_total = pending_pharmacy_total.saturating_add(due),
        }
    }
    pending_treatment_total = treatment_bills
        .iter()
        .map(treatment_bill_due)
        .fold(pending_treatment_total, Decimal::saturating_add);
    pending_pharmacy_total = pharmacy_sales
        .iter()
        .map(pharmacy_sale_due)
        .fold(pending_pharmacy_total, Decimal::saturating_add);

    PendingBalance {
        credit_sales,
        treatment_bills,
        pharmacy_sales,
        pending_treatment_total,
        pending_pharmacy_total,
    }
}
