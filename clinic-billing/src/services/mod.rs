//! Services module for clinic-billing.

pub mod billing;
pub mod capabilities;
pub mod metrics;
pub mod pending;
pub mod search;
pub mod session;
pub mod totals;

pub use billing::{ActionResponse, BillingService, Collaborators, HalfOutcome, SubmissionReport};
pub use capabilities::{Capabilities, Role};
pub use metrics::{get_metrics, init_metrics};
pub use pending::{aggregate_pending_balance, PatientIdentity, PendingBalance, PendingOverlap};
pub use session::{
    ActionOutcome, BillingAction, BillingSessionState, FetchResolution, FetchTicket,
    SessionCatalog, SessionTotals, SessionView, SubmissionTicket, TreatmentField,
};
pub use totals::{
    checked_pharmacy_totals, checked_treatment_totals, pharmacy_totals, treatment_totals,
    PharmacyTotals, TreatmentTotals,
};
