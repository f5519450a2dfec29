//! Common test utilities for clinic-billing integration tests.
//!
//! The clinic backend is replaced by [`FakeClinic`], an in-memory store
//! implementing every collaborator trait.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use clinic_billing::clients::{
    BillingStore, CatalogService, CreditSalesService, PatientService, WalkinService,
};
use clinic_billing::config::{ClinicApiConfig, ClinicBillingConfig};
use clinic_billing::models::{
    BillingMode, Branch, CreditSaleRecord, Doctor, MedicineStock, NewPatient, NewPharmacySale,
    NewTreatmentBill, Patient, PharmacySaleRecord, TreatmentBillRecord, TreatmentCatalogEntry,
    Walkin, WALKIN_WAITING,
};
use clinic_billing::services::{BillingService, Collaborators};
use clinic_billing::startup::Application;
use rust_decimal::Decimal;
use service_core::config::Config as CommonConfig;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::sync::Notify;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,clinic_billing=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn dec(value: &str) -> Decimal {
    value.parse().unwrap()
}

pub fn patient(id: &str, code: &str, name: &str) -> Patient {
    Patient {
        id: id.to_string(),
        patient_code: Some(code.to_string()),
        name: name.to_string(),
        phone: "9840012345".to_string(),
        gender: None,
        address: None,
        branch_id: Some("branch-1".to_string()),
    }
}

pub fn treatment(id: &str, name: &str, charges: &str, gst: Option<&str>) -> TreatmentCatalogEntry {
    TreatmentCatalogEntry {
        id: id.to_string(),
        name: name.to_string(),
        charges: dec(charges),
        gst_percentage: gst.map(dec),
        item_type_id: Some("type-treatment".to_string()),
        item_status: None,
    }
}

pub fn medicine(id: &str, name: &str, price: &str, quantity: u32, branch: &str) -> MedicineStock {
    MedicineStock {
        id: id.to_string(),
        name: name.to_string(),
        batch_number: Some(format!("B-{}", id)),
        sales_price: Some(dec(price)),
        mrp: None,
        quantity: Decimal::from(quantity),
        gst_percentage: None,
        branch_id: Some(branch.to_string()),
        item_status: None,
    }
}

pub fn walkin(id: &str, patient_id: &str, branch: &str, status: &str) -> Walkin {
    Walkin {
        id: id.to_string(),
        patient_id: patient_id.to_string(),
        patient_name: format!("Patient {}", patient_id),
        patient_phone: "9840012345".to_string(),
        branch_id: Some(branch.to_string()),
        branch_name: None,
        check_in_time: None,
        status: status.to_string(),
    }
}

pub fn pending_bill(id: &str, patient_code: &str, total: &str, paid: &str) -> TreatmentBillRecord {
    TreatmentBillRecord {
        id: id.to_string(),
        patient_id: Some(patient_code.to_string()),
        patient_name: None,
        services: Vec::new(),
        subtotal: dec(total),
        gst_amount: Decimal::ZERO,
        discount: Decimal::ZERO,
        total_amount: dec(total),
        paid_amount: Some(dec(paid)),
        balance_amount: None,
        payment_mode: Some("pending".to_string()),
        payment_status: Some("pending".to_string()),
        is_temporary: true,
        notes: None,
        branch_id: Some("branch-1".to_string()),
        doctor_id: None,
        created_at: None,
    }
}

#[derive(Default)]
struct FakeData {
    patients: Vec<Patient>,
    treatments: Vec<TreatmentCatalogEntry>,
    medicines: Vec<MedicineStock>,
    branches: Vec<Branch>,
    doctors: Vec<Doctor>,
    bills: Vec<TreatmentBillRecord>,
    pharmacy_sales: Vec<PharmacySaleRecord>,
    credit_sales: Vec<CreditSaleRecord>,
    walkins: Vec<Walkin>,
    walkin_queries: Vec<String>,
    submitted_bills: Vec<NewTreatmentBill>,
    submitted_sales: Vec<NewPharmacySale>,
}

/// In-memory clinic backend.
#[derive(Default)]
pub struct FakeClinic {
    data: Mutex<FakeData>,
    fail_treatment: AtomicBool,
    fail_pharmacy: AtomicBool,
    fail_catalog: AtomicBool,
    next_id: AtomicUsize,
    treatment_gate: Mutex<Option<Arc<Notify>>>,
    treatment_entered: Notify,
}

impl FakeClinic {
    /// Two branches, two doctors, a small catalog, two patients and a few
    /// walk-ins.
    pub fn seeded() -> Arc<Self> {
        let clinic = Arc::new(Self::default());
        {
            let mut data = clinic.data.lock().unwrap();
            data.patients = vec![
                patient("p-1", "PT-001", "Asha Kumar"),
                patient("p-2", "PT-002", "Ravi Shankar"),
            ];
            data.treatments = vec![
                treatment("t-1", "Scaling", "1000", None),
                treatment("t-2", "Root Canal", "1000", Some("18")),
                TreatmentCatalogEntry {
                    item_status: Some("INACTIVE".to_string()),
                    ..treatment("t-9", "Retired", "50", None)
                },
            ];
            data.medicines = vec![
                medicine("m-1", "Paracetamol", "10", 2, "branch-1"),
                medicine("m-2", "Amoxicillin", "25", 30, "branch-1"),
                medicine("m-3", "Ibuprofen", "8", 50, "branch-2"),
            ];
            data.branches = vec![
                Branch {
                    id: "branch-1".to_string(),
                    name: "Anna Nagar".to_string(),
                },
                Branch {
                    id: "branch-2".to_string(),
                    name: "Velachery".to_string(),
                },
            ];
            data.doctors = vec![
                Doctor {
                    id: "d-1".to_string(),
                    name: "Dr. Meena".to_string(),
                    branch_id: Some("branch-1".to_string()),
                },
                Doctor {
                    id: "d-2".to_string(),
                    name: "Dr. Arun".to_string(),
                    branch_id: Some("branch-2".to_string()),
                },
            ];
            data.walkins = vec![
                walkin("w-1", "p-1", "branch-1", WALKIN_WAITING),
                walkin("w-2", "p-2", "branch-2", WALKIN_WAITING),
                walkin("w-3", "p-2", "branch-1", "completed"),
            ];
        }
        clinic
    }

    /// Hold treatment bill saves until the returned gate is notified.
    pub fn hold_treatment_saves(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.treatment_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Wait until a held treatment save has reached the backend.
    pub async fn treatment_save_started(&self) {
        self.treatment_entered.notified().await;
    }

    pub fn walkin_queries(&self) -> Vec<String> {
        self.data.lock().unwrap().walkin_queries.clone()
    }

    pub fn clear_branches(&self) {
        self.data.lock().unwrap().branches.clear();
    }

    pub fn fail_treatment_saves(&self, fail: bool) {
        self.fail_treatment.store(fail, Ordering::SeqCst);
    }

    pub fn fail_pharmacy_saves(&self, fail: bool) {
        self.fail_pharmacy.store(fail, Ordering::SeqCst);
    }

    pub fn fail_catalog(&self, fail: bool) {
        self.fail_catalog.store(fail, Ordering::SeqCst);
    }

    pub fn add_bill(&self, bill: TreatmentBillRecord) {
        self.data.lock().unwrap().bills.push(bill);
    }

    pub fn add_credit_sale(&self, sale: CreditSaleRecord) {
        self.data.lock().unwrap().credit_sales.push(sale);
    }

    pub fn submitted_bills(&self) -> Vec<NewTreatmentBill> {
        self.data.lock().unwrap().submitted_bills.clone()
    }

    pub fn submitted_sales(&self) -> Vec<NewPharmacySale> {
        self.data.lock().unwrap().submitted_sales.clone()
    }

    pub fn bill_ids(&self) -> Vec<String> {
        self.data
            .lock()
            .unwrap()
            .bills
            .iter()
            .map(|bill| bill.id.clone())
            .collect()
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn check_catalog(&self) -> Result<()> {
        if self.fail_catalog.load(Ordering::SeqCst) {
            return Err(anyhow!("catalog unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogService for FakeClinic {
    async fn list_treatments(&self) -> Result<Vec<TreatmentCatalogEntry>> {
        self.check_catalog()?;
        Ok(self.data.lock().unwrap().treatments.clone())
    }

    async fn list_medicines(&self, branch_id: Option<&str>) -> Result<Vec<MedicineStock>> {
        self.check_catalog()?;
        let data = self.data.lock().unwrap();
        Ok(data
            .medicines
            .iter()
            .filter(|m| branch_id.is_none() || m.branch_id.as_deref() == branch_id)
            .cloned()
            .collect())
    }

    async fn list_branches(&self) -> Result<Vec<Branch>> {
        self.check_catalog()?;
        Ok(self.data.lock().unwrap().branches.clone())
    }

    async fn list_doctors(&self) -> Result<Vec<Doctor>> {
        self.check_catalog()?;
        Ok(self.data.lock().unwrap().doctors.clone())
    }
}

#[async_trait]
impl PatientService for FakeClinic {
    async fn list_patients(&self) -> Result<Vec<Patient>> {
        Ok(self.data.lock().unwrap().patients.clone())
    }

    async fn create_patient(&self, new_patient: &NewPatient) -> Result<Patient> {
        let created = Patient {
            id: self.next_id("p"),
            patient_code: new_patient.patient_code.clone(),
            name: new_patient.name.clone(),
            phone: new_patient.phone.clone(),
            gender: Some(new_patient.gender.clone()),
            address: Some(new_patient.address.clone()),
            branch_id: Some(new_patient.branch_id.clone()),
        };
        self.data.lock().unwrap().patients.push(created.clone());
        Ok(created)
    }
}

#[async_trait]
impl BillingStore for FakeClinic {
    async fn create_treatment_bill(&self, bill: &NewTreatmentBill) -> Result<TreatmentBillRecord> {
        let gate = self.treatment_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            self.treatment_entered.notify_one();
            gate.notified().await;
        }
        if self.fail_treatment.load(Ordering::SeqCst) {
            return Err(anyhow!("bill service unavailable"));
        }
        let record = TreatmentBillRecord {
            id: self.next_id("bill"),
            patient_id: Some(bill.patient_id.clone()),
            patient_name: Some(bill.patient_name.clone()),
            services: bill.services.clone(),
            subtotal: bill.subtotal,
            gst_amount: bill.gst_amount,
            discount: bill.discount,
            total_amount: bill.total_amount,
            paid_amount: Some(bill.paid_amount),
            balance_amount: Some(bill.balance_amount),
            payment_mode: Some(bill.payment_mode.clone()),
            payment_status: Some(bill.payment_status.clone()),
            is_temporary: bill.is_temporary,
            notes: Some(bill.notes.clone()),
            branch_id: Some(bill.branch_id.clone()),
            doctor_id: bill.doctor_id.clone(),
            created_at: None,
        };
        let mut data = self.data.lock().unwrap();
        data.submitted_bills.push(bill.clone());
        data.bills.push(record.clone());
        Ok(record)
    }

    async fn list_treatment_bills(&self) -> Result<Vec<TreatmentBillRecord>> {
        Ok(self.data.lock().unwrap().bills.clone())
    }

    async fn delete_treatment_bill(&self, bill_id: &str) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        let before = data.bills.len();
        data.bills.retain(|bill| bill.id != bill_id);
        if data.bills.len() == before {
            return Err(anyhow!("bill {} not found", bill_id));
        }
        Ok(())
    }

    async fn create_pharmacy_sale(&self, sale: &NewPharmacySale) -> Result<PharmacySaleRecord> {
        if self.fail_pharmacy.load(Ordering::SeqCst) {
            return Err(anyhow!("pharmacy service unavailable"));
        }
        let record = PharmacySaleRecord {
            id: self.next_id("sale"),
            patient_id: Some(sale.patient_id.clone()),
            patient_name: Some(sale.patient_name.clone()),
            items: sale.items.clone(),
            subtotal: sale.subtotal,
            discount: sale.discount,
            total_amount: sale.total_amount,
            paid_amount: Some(sale.paid_amount),
            balance_amount: Some(sale.balance_amount),
            payment_mode: Some(sale.payment_mode.clone()),
            payment_status: Some(sale.payment_status.clone()),
            branch_id: Some(sale.branch_id.clone()),
            created_at: None,
        };
        let mut data = self.data.lock().unwrap();
        data.submitted_sales.push(sale.clone());
        data.pharmacy_sales.push(record.clone());
        Ok(record)
    }

    async fn list_pharmacy_sales(&self) -> Result<Vec<PharmacySaleRecord>> {
        Ok(self.data.lock().unwrap().pharmacy_sales.clone())
    }
}

#[async_trait]
impl CreditSalesService for FakeClinic {
    async fn list_credit_sales(&self) -> Result<Vec<CreditSaleRecord>> {
        Ok(self.data.lock().unwrap().credit_sales.clone())
    }
}

#[async_trait]
impl WalkinService for FakeClinic {
    async fn list_waiting_walkins(&self, branch_id: &str) -> Result<Vec<Walkin>> {
        let mut data = self.data.lock().unwrap();
        data.walkin_queries.push(branch_id.to_string());
        Ok(data
            .walkins
            .iter()
            .filter(|w| w.branch_id.as_deref() == Some(branch_id) && w.status == WALKIN_WAITING)
            .cloned()
            .collect())
    }
}

/// Billing service over the given fake backend.
pub fn billing_service(clinic: &Arc<FakeClinic>) -> BillingService {
    BillingService::new(
        Collaborators {
            catalog: clinic.clone(),
            patients: clinic.clone(),
            store: clinic.clone(),
            credit_sales: clinic.clone(),
            walkins: clinic.clone(),
        },
        BillingMode::All,
    )
}

fn test_config() -> ClinicBillingConfig {
    ClinicBillingConfig {
        common: CommonConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        service_name: "clinic-billing-test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        clinic_api: ClinicApiConfig {
            url: "http://127.0.0.1:9".to_string(),
            token: None,
            timeout_secs: 2,
        },
        default_mode: BillingMode::All,
        session_idle: Duration::from_secs(600),
    }
}

/// Test application wrapper.
pub struct TestApp {
    pub address: String,
    pub clinic: Arc<FakeClinic>,
    pub client: reqwest::Client,
}

impl TestApp {
    /// Spawn the HTTP application on a random port over a seeded fake backend.
    pub async fn spawn() -> Self {
        init_tracing();

        let clinic = FakeClinic::seeded();
        let app = Application::build_with_service(test_config(), billing_service(&clinic))
            .await
            .expect("Failed to build application");
        let address = format!("http://127.0.0.1:{}", app.port());

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        Self {
            address,
            clinic,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// POST with the forwarded identity headers of `role`.
    pub fn post_as(&self, role: &str, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .header("x-user-id", "user-1")
            .header("x-user-role", role)
    }
}
