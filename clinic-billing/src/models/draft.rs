//! Bill drafts held by a billing session.

use super::pharmacy::PharmacyLineItem;
use super::treatment::TreatmentLineItem;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kind of bill, also used to partition outstanding balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillKind {
    Treatment,
    Pharmacy,
}

impl BillKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillKind::Treatment => "treatment",
            BillKind::Pharmacy => "pharmacy",
        }
    }

    /// Parse a `sale_type` tag. Missing or unknown tags count as treatment.
    pub fn from_sale_type(sale_type: Option<&str>) -> Self {
        match sale_type.map(|s| s.trim().to_ascii_lowercase()) {
            Some(s) if s == "pharmacy" => BillKind::Pharmacy,
            _ => BillKind::Treatment,
        }
    }
}

impl std::fmt::Display for BillKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which bills the screen is working on. Decides what the grand total adds up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingMode {
    #[default]
    All,
    Treatment,
    Pharmacy,
}

impl BillingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingMode::All => "all",
            BillingMode::Treatment => "treatment",
            BillingMode::Pharmacy => "pharmacy",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "treatment" => BillingMode::Treatment,
            "pharmacy" => BillingMode::Pharmacy,
            _ => BillingMode::All,
        }
    }

    pub fn includes(&self, kind: BillKind) -> bool {
        match self {
            BillingMode::All => true,
            BillingMode::Treatment => kind == BillKind::Treatment,
            BillingMode::Pharmacy => kind == BillKind::Pharmacy,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentDraft {
    pub items: Vec<TreatmentLineItem>,
    pub overall_discount: Decimal,
    pub notes: String,
}

impl TreatmentDraft {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PharmacyDraft {
    pub items: Vec<PharmacyLineItem>,
    pub overall_discount: Decimal,
}

impl PharmacyDraft {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn position_of(&self, medicine_id: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.medicine_id == medicine_id)
    }
}

/// A bill not yet saved: either kind, never persisted by this service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BillDraft {
    Treatment(TreatmentDraft),
    Pharmacy(PharmacyDraft),
}

impl BillDraft {
    pub fn kind(&self) -> BillKind {
        match self {
            BillDraft::Treatment(_) => BillKind::Treatment,
            BillDraft::Pharmacy(_) => BillKind::Pharmacy,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            BillDraft::Treatment(draft) => draft.is_empty(),
            BillDraft::Pharmacy(draft) => draft.is_empty(),
        }
    }
}
