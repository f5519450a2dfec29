//! Filtering for the billing screen's pickers.

use crate::models::{Doctor, MedicineStock, Patient, TreatmentCatalogEntry};
use rust_decimal::Decimal;

/// Patients whose name or code contains `query` (ignoring case) or whose
/// phone contains it. An empty query returns everyone.
pub fn filter_patients<'a>(patients: &'a [Patient], query: &str) -> Vec<&'a Patient> {
    let query = query.trim();
    if query.is_empty() {
        return patients.iter().collect();
    }
    let needle = query.to_lowercase();

    patients
        .iter()
        .filter(|patient| {
            patient.name.to_lowercase().contains(&needle)
                || patient
                    .patient_code
                    .as_deref()
                    .is_some_and(|code| code.to_lowercase().contains(&needle))
                || patient.phone.contains(query)
        })
        .collect()
}

/// Sellable medicines: active, in stock, in the branch when one is given,
/// and named like `query`.
pub fn filter_medicines<'a>(
    medicines: &'a [MedicineStock],
    query: &str,
    branch_id: Option<&str>,
) -> Vec<&'a MedicineStock> {
    let needle = query.trim().to_lowercase();

    medicines
        .iter()
        .filter(|medicine| medicine.is_active())
        .filter(|medicine| medicine.quantity > Decimal::ZERO)
        .filter(|medicine| match (branch_id, medicine.branch_id.as_deref()) {
            (Some(branch), Some(stock_branch)) => branch == stock_branch,
            _ => true,
        })
        .filter(|medicine| needle.is_empty() || medicine.name.to_lowercase().contains(&needle))
        .collect()
}

/// Doctors without a branch work everywhere.
pub fn filter_doctors<'a>(doctors: &'a [Doctor], branch_id: Option<&str>) -> Vec<&'a Doctor> {
    doctors
        .iter()
        .filter(|doctor| match (branch_id, doctor.branch_id.as_deref()) {
            (Some(branch), Some(doctor_branch)) if !doctor_branch.is_empty() => {
                branch == doctor_branch
            }
            _ => true,
        })
        .collect()
}

pub fn active_treatments(entries: Vec<TreatmentCatalogEntry>) -> Vec<TreatmentCatalogEntry> {
    entries.into_iter().filter(|entry| entry.is_active()).collect()
}
