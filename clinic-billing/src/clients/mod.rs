//! Collaborators backed by the clinic backend.
//!
//! The billing service only depends on these traits; [`ClinicApiClient`]
//! implements all of them over HTTP.

mod http;

pub use http::{ClinicApiClient, TREATMENT_ITEM_TYPE};

use crate::models::{
    Branch, CreditSaleRecord, Doctor, MedicineStock, NewPatient, NewPharmacySale,
    NewTreatmentBill, Patient, PharmacySaleRecord, TreatmentBillRecord, TreatmentCatalogEntry,
    Walkin,
};
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Item master entries of the treatment item type.
    async fn list_treatments(&self) -> Result<Vec<TreatmentCatalogEntry>>;

    /// Pharmacy stock, restricted to `branch_id` when given.
    async fn list_medicines(&self, branch_id: Option<&str>) -> Result<Vec<MedicineStock>>;

    async fn list_branches(&self) -> Result<Vec<Branch>>;

    async fn list_doctors(&self) -> Result<Vec<Doctor>>;
}

#[async_trait]
pub trait PatientService: Send + Sync {
    async fn list_patients(&self) -> Result<Vec<Patient>>;

    async fn create_patient(&self, patient: &NewPatient) -> Result<Patient>;
}

#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn create_treatment_bill(&self, bill: &NewTreatmentBill) -> Result<TreatmentBillRecord>;

    async fn list_treatment_bills(&self) -> Result<Vec<TreatmentBillRecord>>;

    async fn delete_treatment_bill(&self, bill_id: &str) -> Result<()>;

    async fn create_pharmacy_sale(&self, sale: &NewPharmacySale) -> Result<PharmacySaleRecord>;

    async fn list_pharmacy_sales(&self) -> Result<Vec<PharmacySaleRecord>>;
}

#[async_trait]
pub trait CreditSalesService: Send + Sync {
    async fn list_credit_sales(&self) -> Result<Vec<CreditSaleRecord>>;
}

#[async_trait]
pub trait WalkinService: Send + Sync {
    /// Walk-ins of `branch_id` still waiting to be billed.
    async fn list_waiting_walkins(&self, branch_id: &str) -> Result<Vec<Walkin>>;
}
