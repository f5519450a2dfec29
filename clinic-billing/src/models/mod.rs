//! Domain models for clinic-billing.

mod draft;
mod pharmacy;
mod records;
mod tooth;
mod treatment;

pub use draft::{BillDraft, BillKind, BillingMode, PharmacyDraft, TreatmentDraft};
pub use pharmacy::{PharmacyLineItem, QuantityRejection};
pub use records::{
    BillServiceLine, Branch, CreditSaleRecord, Doctor, ItemType, MedicineStock, NewPatient,
    NewPharmacySale, NewTreatmentBill, Patient, PaymentStatus, PharmacySaleLine,
    PharmacySaleRecord, TreatmentBillRecord, TreatmentCatalogEntry, Walkin, INACTIVE_STATUS,
    WALKIN_WAITING,
};
pub use tooth::{
    is_valid_tooth, ChartType, ToothChart, ToothCode, ToothSelection, DECIDUOUS_TEETH,
    PERMANENT_TEETH,
};
pub use treatment::{bounded_amount, max_amount, AmountTooLarge, TreatmentLineItem, MAX_AMOUNT};
