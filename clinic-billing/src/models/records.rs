//! Records exchanged with the clinic backend.
//!
//! Field names follow the backend's snake_case JSON. Optional fields are
//! tolerated because older records were written by several generations of
//! the frontend.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Status value that marks catalog entries hidden from billing.
pub const INACTIVE_STATUS: &str = "INACTIVE";

/// Patient as stored by the patient service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    /// Clinic-assigned patient code, entered by staff.
    #[serde(rename = "patient_id", default)]
    pub patient_code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
}

impl Patient {
    /// Identifier recorded on bills: the patient code when present.
    pub fn billing_id(&self) -> &str {
        self.patient_code
            .as_deref()
            .filter(|code| !code.is_empty())
            .unwrap_or(&self.id)
    }
}

/// Input for registering a patient from the billing screen.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewPatient {
    #[serde(rename = "patient_id", default)]
    pub patient_code: Option<String>,
    #[validate(length(min = 1, message = "Patient name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Phone number is required"))]
    pub phone: String,
    #[serde(default = "default_gender")]
    pub gender: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub branch_id: String,
}

fn default_gender() -> String {
    "male".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub branch_id: Option<String>,
}

/// Patient checked in at reception and waiting to be billed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Walkin {
    pub id: String,
    pub patient_id: String,
    pub patient_name: String,
    #[serde(default)]
    pub patient_phone: String,
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub branch_name: Option<String>,
    #[serde(default)]
    pub check_in_time: Option<String>,
    #[serde(default = "default_walkin_status")]
    pub status: String,
}

/// Walk-in status the billing screen lists.
pub const WALKIN_WAITING: &str = "waiting";

fn default_walkin_status() -> String {
    WALKIN_WAITING.to_string()
}

/// Item type from the item master (e.g. "Treatment").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemType {
    pub id: String,
    pub name: String,
}

/// Treatment definition from the item master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentCatalogEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub charges: Decimal,
    #[serde(default)]
    pub gst_percentage: Option<Decimal>,
    #[serde(default)]
    pub item_type_id: Option<String>,
    #[serde(default)]
    pub item_status: Option<String>,
}

impl TreatmentCatalogEntry {
    pub fn is_active(&self) -> bool {
        self.item_status.as_deref() != Some(INACTIVE_STATUS)
    }
}

/// Branch stock line for a medicine batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicineStock {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub batch_number: Option<String>,
    #[serde(default)]
    pub sales_price: Option<Decimal>,
    #[serde(default)]
    pub mrp: Option<Decimal>,
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default)]
    pub gst_percentage: Option<Decimal>,
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub item_status: Option<String>,
}

impl MedicineStock {
    pub fn is_active(&self) -> bool {
        self.item_status.as_deref() != Some(INACTIVE_STATUS)
    }

    /// Selling price: sales price, else MRP, else zero.
    pub fn unit_price(&self) -> Decimal {
        self.sales_price
            .filter(|p| !p.is_zero())
            .or(self.mrp)
            .unwrap_or_default()
    }
}

/// Payment state shared by bills and sales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Pending,
    Partial,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Partial => "partial",
        }
    }

    /// Parse a backend status string; unknown values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paid" => Some(PaymentStatus::Paid),
            "pending" => Some(PaymentStatus::Pending),
            "partial" => Some(PaymentStatus::Partial),
            _ => None,
        }
    }

    /// Pending and partial records still carry a balance.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Partial)
    }
}

/// One service line on a stored treatment bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillServiceLine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treatment_id: Option<String>,
    pub service_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub base_amount: Decimal,
    #[serde(default = "default_units")]
    pub units: u32,
    #[serde(default)]
    pub amount: Decimal,
    #[serde(default)]
    pub gst_percentage: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub teeth: Vec<u8>,
    #[serde(default)]
    pub teeth_count: usize,
}

fn default_units() -> u32 {
    1
}

/// Treatment bill as returned by `GET /bills`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentBillRecord {
    pub id: String,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub services: Vec<BillServiceLine>,
    #[serde(default)]
    pub subtotal: Decimal,
    #[serde(default)]
    pub gst_amount: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub total_amount: Decimal,
    #[serde(default)]
    pub paid_amount: Option<Decimal>,
    #[serde(default)]
    pub balance_amount: Option<Decimal>,
    #[serde(default)]
    pub payment_mode: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub is_temporary: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub doctor_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// One medicine line on a stored pharmacy sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PharmacySaleLine {
    pub medicine_id: String,
    pub medicine_name: String,
    #[serde(default)]
    pub batch_number: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    #[serde(default)]
    pub gst_percentage: Decimal,
}

/// Pharmacy sale as returned by `GET /pharmacy-sales`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PharmacySaleRecord {
    pub id: String,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub items: Vec<PharmacySaleLine>,
    #[serde(default)]
    pub subtotal: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub total_amount: Decimal,
    #[serde(default)]
    pub paid_amount: Option<Decimal>,
    #[serde(default)]
    pub balance_amount: Option<Decimal>,
    #[serde(default)]
    pub payment_mode: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Outstanding credit extended to a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditSaleRecord {
    pub id: String,
    #[serde(default)]
    pub bill_id: Option<String>,
    #[serde(default)]
    pub pharmacy_sale_id: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub total_amount: Decimal,
    #[serde(default)]
    pub paid_amount: Option<Decimal>,
    #[serde(default)]
    pub pending_amount: Option<Decimal>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub sale_type: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
}

/// Treatment bill submitted to `POST /bills`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTreatmentBill {
    pub patient_id: String,
    pub patient_name: String,
    pub services: Vec<BillServiceLine>,
    pub subtotal: Decimal,
    pub gst_amount: Decimal,
    pub discount: Decimal,
    pub collection_discount: Decimal,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub balance_amount: Decimal,
    pub payment_mode: String,
    pub payment_status: String,
    pub notes: String,
    pub is_temporary: bool,
    pub branch_id: String,
    pub branch_name: Option<String>,
    pub doctor_id: Option<String>,
    pub doctor_name: Option<String>,
}

/// Pharmacy sale submitted to `POST /pharmacy-sales`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPharmacySale {
    pub patient_id: String,
    pub patient_name: String,
    pub items: Vec<PharmacySaleLine>,
    pub subtotal: Decimal,
    pub gst_amount: Decimal,
    pub discount: Decimal,
    pub collection_discount: Decimal,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub balance_amount: Decimal,
    pub payment_mode: String,
    pub payment_status: String,
    pub branch_id: String,
    pub branch_name: Option<String>,
}
