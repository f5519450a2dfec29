//! Role-derived capabilities for the billing screen.

use crate::error::BillingError;
use serde::{Deserialize, Serialize};

/// Billing capability names.
pub mod capabilities {
    /// Add, edit and remove treatment lines; save and delete treatment bills.
    pub const TREATMENT_EDIT: &str = "billing.treatment:edit";

    /// Add, edit and remove pharmacy lines.
    pub const PHARMACY_EDIT: &str = "billing.pharmacy:edit";

    /// Enter line or overall discounts.
    pub const DISCOUNT_GIVE: &str = "billing.discount:give";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    BranchManager,
    Receptionist,
    Accountant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::BranchManager => "branch_manager",
            Role::Receptionist => "receptionist",
            Role::Accountant => "accountant",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "branch_manager" => Some(Role::BranchManager),
            "receptionist" => Some(Role::Receptionist),
            "accountant" => Some(Role::Accountant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub can_edit_treatment: bool,
    pub can_edit_pharmacy: bool,
    pub can_give_discount: bool,
}

impl Capabilities {
    pub fn all() -> Self {
        Self {
            can_edit_treatment: true,
            can_edit_pharmacy: true,
            can_give_discount: true,
        }
    }

    /// Every role may sell medicines, including roles this service does not
    /// know. Treatments and discounts stay with managers.
    pub fn for_role(role: Option<Role>) -> Self {
        match role {
            Some(Role::Admin | Role::BranchManager) => Self::all(),
            Some(Role::Receptionist | Role::Accountant) | None => Self {
                can_edit_pharmacy: true,
                ..Self::default()
            },
        }
    }

    /// Capabilities for a forwarded role header.
    pub fn for_role_name(role: &str) -> Self {
        Self::for_role(Role::from_string(role))
    }

    pub fn has(&self, capability: &str) -> bool {
        match capability {
            capabilities::TREATMENT_EDIT => self.can_edit_treatment,
            capabilities::PHARMACY_EDIT => self.can_edit_pharmacy,
            capabilities::DISCOUNT_GIVE => self.can_give_discount,
            _ => false,
        }
    }

    pub fn require(&self, capability: &'static str) -> Result<(), BillingError> {
        if self.has(capability) {
            Ok(())
        } else {
            Err(BillingError::PermissionDenied { capability })
        }
    }
}
