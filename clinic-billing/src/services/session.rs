//! State of one billing screen.
//!
//! All edits go through [`BillingSessionState::apply`]. Branch and patient
//! selection hand out a [`FetchTicket`]; the data fetched for it is only
//! accepted while the ticket is still current, so a slow response for a
//! previous selection can never overwrite the current one.

use crate::error::BillingError;
use crate::models::{
    bounded_amount, is_valid_tooth, AmountTooLarge, BillKind, BillingMode, Branch, ChartType,
    Doctor, MedicineStock, NewPharmacySale, NewTreatmentBill, Patient, PaymentStatus,
    PharmacyDraft, PharmacyLineItem, ToothChart, ToothCode, TreatmentCatalogEntry,
    TreatmentDraft, TreatmentLineItem,
};
use crate::services::capabilities::{capabilities, Capabilities};
use crate::services::pending::{PatientIdentity, PendingBalance, PendingOverlap};
use crate::services::search::filter_doctors;
use crate::services::totals::{
    self, parse_amount, parse_quantity, parse_units, PharmacyTotals, TreatmentTotals,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one outstanding fetch. Only the most recently issued ticket
/// of each kind is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    generation: u64,
    key: String,
}

impl FetchTicket {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchResolution {
    Applied,
    Stale,
}

/// Balance fetch to run for the selected patient.
#[derive(Debug, Clone)]
pub struct PendingFetch {
    pub ticket: FetchTicket,
    pub patient: PatientIdentity,
}

/// Branch-scoped reference data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionCatalog {
    pub branch_name: Option<String>,
    pub treatments: Vec<TreatmentCatalogEntry>,
    pub medicines: Vec<MedicineStock>,
    pub doctors: Vec<Doctor>,
    /// First branch of the clinic; bills carry it when no branch is selected.
    #[serde(default)]
    pub fallback_branch: Option<Branch>,
}

/// Field of a treatment line edited by the user. Numbers arrive as typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "value", rename_all = "snake_case")]
pub enum TreatmentField {
    Treatment(String),
    BaseAmount(String),
    Units(String),
    Discount(String),
    Teeth(Vec<ToothCode>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BillingAction {
    SetMode { mode: BillingMode },
    SelectDoctor { doctor_id: Option<String> },
    AddTreatmentItem,
    UpdateTreatmentItem { index: usize, field: TreatmentField },
    RemoveTreatmentItem { index: usize },
    ToggleToothChart { index: usize },
    SetToothChartType { chart_type: ChartType },
    /// Flip a tooth on the line whose chart is open.
    ToggleTooth { tooth: ToothCode },
    SetTreatmentDiscount { value: String },
    SetTreatmentNotes { notes: String },
    AddMedicine { medicine_id: String },
    UpdateMedicineQuantity { index: usize, value: String },
    RemoveMedicine { index: usize },
    SetPharmacyDiscount { value: String },
    LoadPendingBill { bill_id: String },
    Reset,
}

impl BillingAction {
    pub fn name(&self) -> &'static str {
        match self {
            BillingAction::SetMode { .. } => "set_mode",
            BillingAction::SelectDoctor { .. } => "select_doctor",
            BillingAction::AddTreatmentItem => "add_treatment_item",
            BillingAction::UpdateTreatmentItem { .. } => "update_treatment_item",
            BillingAction::RemoveTreatmentItem { .. } => "remove_treatment_item",
            BillingAction::ToggleToothChart { .. } => "toggle_tooth_chart",
            BillingAction::SetToothChartType { .. } => "set_tooth_chart_type",
            BillingAction::ToggleTooth { .. } => "toggle_tooth",
            BillingAction::SetTreatmentDiscount { .. } => "set_treatment_discount",
            BillingAction::SetTreatmentNotes { .. } => "set_treatment_notes",
            BillingAction::AddMedicine { .. } => "add_medicine",
            BillingAction::UpdateMedicineQuantity { .. } => "update_medicine_quantity",
            BillingAction::RemoveMedicine { .. } => "remove_medicine",
            BillingAction::SetPharmacyDiscount { .. } => "set_pharmacy_discount",
            BillingAction::LoadPendingBill { .. } => "load_pending_bill",
            BillingAction::Reset => "reset",
        }
    }

    /// The draft this action edits, if any.
    pub fn bill_kind(&self) -> Option<BillKind> {
        match self {
            BillingAction::SetMode { .. }
            | BillingAction::SelectDoctor { .. }
            | BillingAction::Reset => None,
            BillingAction::AddMedicine { .. }
            | BillingAction::UpdateMedicineQuantity { .. }
            | BillingAction::RemoveMedicine { .. }
            | BillingAction::SetPharmacyDiscount { .. } => Some(BillKind::Pharmacy),
            _ => Some(BillKind::Treatment),
        }
    }

    pub fn required_capabilities(&self) -> Vec<&'static str> {
        let mut required = match self.bill_kind() {
            Some(BillKind::Treatment) => vec![capabilities::TREATMENT_EDIT],
            Some(BillKind::Pharmacy) => vec![capabilities::PHARMACY_EDIT],
            None => vec![],
        };
        let gives_discount = matches!(
            self,
            BillingAction::SetTreatmentDiscount { .. }
                | BillingAction::SetPharmacyDiscount { .. }
                | BillingAction::UpdateTreatmentItem {
                    field: TreatmentField::Discount(_),
                    ..
                }
        );
        if gives_discount {
            required.push(capabilities::DISCOUNT_GIVE);
        }
        required
    }
}

/// Result of an accepted action. A warning means the edit was refused and
/// nothing changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum ActionOutcome {
    Applied,
    Warning(String),
}

impl ActionOutcome {
    pub fn warning(message: impl Into<String>) -> Self {
        ActionOutcome::Warning(message.into())
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, ActionOutcome::Applied)
    }
}

/// Half of a submission that the backend already stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedHalf {
    pub kind: BillKind,
    pub record_id: String,
}

/// Identifies the draft a save was started for. Its outcome only touches
/// the session while the same patient and draft are still on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionTicket {
    generation: u64,
    patient_id: String,
}

impl SubmissionTicket {
    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }
}

/// Payloads for the halves a submit would send.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionPlan {
    pub treatment: Option<NewTreatmentBill>,
    pub pharmacy: Option<NewPharmacySale>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTotals {
    pub treatment: TreatmentTotals,
    pub pharmacy: PharmacyTotals,
    pub pending_treatment: Decimal,
    pub pending_pharmacy: Decimal,
    pub grand_total: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToothChartView {
    pub open_index: Option<usize>,
    pub chart_type: ChartType,
    pub teeth: Vec<ToothCode>,
}

/// Snapshot returned to clients after every change.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub mode: BillingMode,
    pub branch_id: Option<String>,
    pub branch_name: Option<String>,
    pub doctor_id: Option<String>,
    pub patient: Option<Patient>,
    pub treatment: TreatmentDraft,
    pub pharmacy: PharmacyDraft,
    pub tooth_chart: ToothChartView,
    pub pending: PendingBalance,
    pub possible_overlaps: Vec<PendingOverlap>,
    pub loaded_bill_id: Option<String>,
    pub committed: Option<CommittedHalf>,
    /// A save of the draft on screen is running.
    pub saving: bool,
    pub treatments: Vec<TreatmentCatalogEntry>,
    pub totals: SessionTotals,
}

#[derive(Debug, Clone)]
pub struct BillingSessionState {
    id: Uuid,
    initial_mode: BillingMode,
    mode: BillingMode,
    branch_id: Option<String>,
    doctor_id: Option<String>,
    catalog: SessionCatalog,
    patient: Option<Patient>,
    treatment: TreatmentDraft,
    pharmacy: PharmacyDraft,
    tooth_chart: ToothChart,
    pending: PendingBalance,
    loaded_bill_id: Option<String>,
    committed: Option<CommittedHalf>,
    saving: Option<SubmissionTicket>,
    balance_generation: u64,
    catalog_generation: u64,
    draft_generation: u64,
}

impl BillingSessionState {
    pub fn new(id: Uuid, mode: BillingMode, branch_id: Option<String>) -> Self {
        Self {
            id,
            initial_mode: mode,
            mode,
            branch_id,
            doctor_id: None,
            catalog: SessionCatalog::default(),
            patient: None,
            treatment: TreatmentDraft::default(),
            pharmacy: PharmacyDraft::default(),
            tooth_chart: ToothChart::default(),
            pending: PendingBalance::default(),
            loaded_bill_id: None,
            committed: None,
            saving: None,
            balance_generation: 0,
            catalog_generation: 0,
            draft_generation: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> BillingMode {
        self.mode
    }

    pub fn branch_id(&self) -> Option<&str> {
        self.branch_id.as_deref()
    }

    pub fn doctor_id(&self) -> Option<&str> {
        self.doctor_id.as_deref()
    }

    pub fn catalog(&self) -> &SessionCatalog {
        &self.catalog
    }

    pub fn patient(&self) -> Option<&Patient> {
        self.patient.as_ref()
    }

    pub fn treatment(&self) -> &TreatmentDraft {
        &self.treatment
    }

    pub fn pharmacy(&self) -> &PharmacyDraft {
        &self.pharmacy
    }

    pub fn tooth_chart(&self) -> &ToothChart {
        &self.tooth_chart
    }

    pub fn pending(&self) -> &PendingBalance {
        &self.pending
    }

    pub fn loaded_bill_id(&self) -> Option<&str> {
        self.loaded_bill_id.as_deref()
    }

    pub fn committed(&self) -> Option<&CommittedHalf> {
        self.committed.as_ref()
    }

    /// Doctors selectable in the current branch.
    pub fn available_doctors(&self) -> Vec<&Doctor> {
        filter_doctors(&self.catalog.doctors, self.branch_id.as_deref())
    }

    // -------------------------------------------------------------------------
    // Edits
    // -------------------------------------------------------------------------

    /// Apply one user edit. Capabilities are checked before anything changes.
    pub fn apply(
        &mut self,
        action: BillingAction,
        capabilities: &Capabilities,
    ) -> Result<ActionOutcome, BillingError> {
        for capability in action.required_capabilities() {
            capabilities.require(capability)?;
        }

        let edits_draft = action.bill_kind().is_some() || matches!(action, BillingAction::Reset);
        if edits_draft && self.save_in_progress() {
            return Ok(ActionOutcome::warning(
                "The bill is being saved; wait for the save to finish",
            ));
        }

        if let (Some(kind), Some(committed)) = (action.bill_kind(), &self.committed) {
            if committed.kind == kind {
                return Ok(ActionOutcome::warning(format!(
                    "The {} bill is already saved; reset to start a new bill",
                    kind
                )));
            }
        }

        // Edits whose sums would not fit are rolled back.
        let snapshot = action
            .bill_kind()
            .map(|_| (self.treatment.clone(), self.pharmacy.clone()));
        let outcome = self.apply_edit(action)?;
        if let Some((treatment, pharmacy)) = snapshot {
            if outcome.is_applied() && !self.amounts_fit() {
                self.treatment = treatment;
                self.pharmacy = pharmacy;
                return Ok(ActionOutcome::warning("Bill total is too large"));
            }
        }
        Ok(outcome)
    }

    fn apply_edit(&mut self, action: BillingAction) -> Result<ActionOutcome, BillingError> {
        match action {
            BillingAction::SetMode { mode } => {
                self.mode = mode;
                Ok(ActionOutcome::Applied)
            }
            BillingAction::SelectDoctor { doctor_id } => Ok(self.select_doctor(doctor_id)),
            BillingAction::AddTreatmentItem => {
                self.treatment.items.push(TreatmentLineItem::new());
                Ok(ActionOutcome::Applied)
            }
            BillingAction::UpdateTreatmentItem { index, field } => {
                self.update_treatment_item(index, field)
            }
            BillingAction::RemoveTreatmentItem { index } => {
                self.check_treatment_index(index)?;
                self.treatment.items.remove(index);
                self.tooth_chart.on_item_removed(index);
                Ok(ActionOutcome::Applied)
            }
            BillingAction::ToggleToothChart { index } => {
                self.check_treatment_index(index)?;
                self.tooth_chart.toggle(index);
                Ok(ActionOutcome::Applied)
            }
            BillingAction::SetToothChartType { chart_type } => {
                self.tooth_chart.set_chart_type(chart_type);
                Ok(ActionOutcome::Applied)
            }
            BillingAction::ToggleTooth { tooth } => Ok(self.toggle_tooth(tooth)),
            BillingAction::SetTreatmentDiscount { value } => Ok(outcome_of(
                parse_amount(&value).map(|discount| self.treatment.overall_discount = discount),
            )),
            BillingAction::SetTreatmentNotes { notes } => {
                self.treatment.notes = notes;
                Ok(ActionOutcome::Applied)
            }
            BillingAction::AddMedicine { medicine_id } => Ok(self.add_medicine(&medicine_id)),
            BillingAction::UpdateMedicineQuantity { index, value } => {
                let item = self
                    .pharmacy
                    .items
                    .get_mut(index)
                    .ok_or_else(|| no_line("pharmacy", index))?;
                let Some(quantity) = parse_quantity(&value) else {
                    return Ok(ActionOutcome::warning("Quantity must be a whole number"));
                };
                Ok(match item.try_set_quantity(quantity) {
                    Ok(()) => ActionOutcome::Applied,
                    Err(rejection) => ActionOutcome::warning(rejection.to_string()),
                })
            }
            BillingAction::RemoveMedicine { index } => {
                if index >= self.pharmacy.items.len() {
                    return Err(no_line("pharmacy", index));
                }
                self.pharmacy.items.remove(index);
                Ok(ActionOutcome::Applied)
            }
            BillingAction::SetPharmacyDiscount { value } => Ok(outcome_of(
                parse_amount(&value).map(|discount| self.pharmacy.overall_discount = discount),
            )),
            BillingAction::LoadPendingBill { bill_id } => Ok(self.load_pending_bill(&bill_id)),
            BillingAction::Reset => {
                self.reset_draft();
                Ok(ActionOutcome::Applied)
            }
        }
    }

    fn select_doctor(&mut self, doctor_id: Option<String>) -> ActionOutcome {
        let doctor_id = doctor_id.filter(|id| !id.trim().is_empty());
        if let Some(id) = doctor_id.as_deref() {
            if !self.available_doctors().iter().any(|doctor| doctor.id == id) {
                return ActionOutcome::warning("Doctor is not available in this branch");
            }
        }
        self.doctor_id = doctor_id;
        ActionOutcome::Applied
    }

    fn check_treatment_index(&self, index: usize) -> Result<(), BillingError> {
        if index < self.treatment.items.len() {
            Ok(())
        } else {
            Err(no_line("treatment", index))
        }
    }

    fn update_treatment_item(
        &mut self,
        index: usize,
        field: TreatmentField,
    ) -> Result<ActionOutcome, BillingError> {
        self.check_treatment_index(index)?;

        if let TreatmentField::Treatment(id) = &field {
            let Some(entry) = self
                .catalog
                .treatments
                .iter()
                .find(|entry| entry.id == *id && entry.is_active())
                .cloned()
            else {
                return Ok(ActionOutcome::warning(format!("Unknown treatment {}", id)));
            };
            return Ok(outcome_of(
                self.treatment.items[index].apply_catalog_entry(&entry),
            ));
        }

        let item = &mut self.treatment.items[index];
        let result = match field {
            TreatmentField::Treatment(_) => Ok(()),
            TreatmentField::BaseAmount(value) => {
                parse_amount(&value).and_then(|amount| item.set_base_amount(amount))
            }
            TreatmentField::Units(value) => item.set_units(parse_units(&value)),
            TreatmentField::Discount(value) => {
                parse_amount(&value).and_then(|discount| item.set_discount(discount))
            }
            TreatmentField::Teeth(teeth) => {
                if let Some(bad) = teeth.iter().find(|code| !is_valid_tooth(**code)) {
                    return Ok(ActionOutcome::warning(format!("Invalid tooth {}", bad)));
                }
                item.set_teeth(teeth.into_iter().collect())
            }
        };
        Ok(outcome_of(result))
    }

    fn toggle_tooth(&mut self, tooth: ToothCode) -> ActionOutcome {
        let Some(index) = self.tooth_chart.open_index() else {
            return ActionOutcome::warning("Open the tooth chart of a treatment first");
        };
        if !is_valid_tooth(tooth) {
            return ActionOutcome::warning(format!("Invalid tooth {}", tooth));
        }
        match self.treatment.items.get_mut(index) {
            Some(item) => outcome_of(item.toggle_tooth(tooth).map(|_| ())),
            None => {
                self.tooth_chart.close();
                ActionOutcome::warning("Open the tooth chart of a treatment first")
            }
        }
    }

    fn add_medicine(&mut self, medicine_id: &str) -> ActionOutcome {
        let Some(stock) = self
            .catalog
            .medicines
            .iter()
            .find(|medicine| medicine.id == medicine_id && medicine.is_active())
        else {
            return ActionOutcome::warning("Medicine is not available in this branch");
        };

        if let Some(position) = self.pharmacy.position_of(medicine_id) {
            let item = &mut self.pharmacy.items[position];
            let next = item.quantity.saturating_add(1);
            return match item.try_set_quantity(next) {
                Ok(()) => ActionOutcome::Applied,
                Err(rejection) => ActionOutcome::warning(rejection.to_string()),
            };
        }

        let item = PharmacyLineItem::from_stock(stock);
        if item.available_stock == 0 {
            return ActionOutcome::warning(format!("{} is out of stock", item.medicine_name));
        }
        self.pharmacy.items.push(item);
        ActionOutcome::Applied
    }

    fn load_pending_bill(&mut self, bill_id: &str) -> ActionOutcome {
        let Some(bill) = self.pending.find_bill(bill_id) else {
            return ActionOutcome::warning("Pending bill not found for this patient");
        };

        let items: Result<Vec<TreatmentLineItem>, AmountTooLarge> = bill
            .services
            .iter()
            .map(TreatmentLineItem::from_service_line)
            .collect();
        let Ok(items) = items else {
            return ActionOutcome::warning("Pending bill amounts are too large to edit");
        };
        let item_discounts = items
            .iter()
            .fold(Decimal::ZERO, |sum, item| sum.saturating_add(item.discount));
        let Ok(overall_discount) = bounded_amount(bill.discount.saturating_sub(item_discounts))
        else {
            return ActionOutcome::warning("Pending bill amounts are too large to edit");
        };
        if totals::checked_treatment_totals(&items, overall_discount).is_none() {
            return ActionOutcome::warning("Pending bill amounts are too large to edit");
        }

        self.treatment = TreatmentDraft {
            overall_discount,
            notes: bill.notes.clone().unwrap_or_default(),
            items,
        };
        self.loaded_bill_id = Some(bill.id.clone());
        self.tooth_chart.close();
        ActionOutcome::Applied
    }

    /// Return to the state of a freshly opened session. Branch, doctor and
    /// catalog are kept.
    pub fn reset_draft(&mut self) {
        self.mode = self.initial_mode;
        self.patient = None;
        self.treatment = TreatmentDraft::default();
        self.pharmacy = PharmacyDraft::default();
        self.tooth_chart = ToothChart::default();
        self.pending = PendingBalance::default();
        self.loaded_bill_id = None;
        self.committed = None;
        self.balance_generation += 1;
        self.draft_generation += 1;
    }

    fn amounts_fit(&self) -> bool {
        totals::checked_treatment_totals(&self.treatment.items, self.treatment.overall_discount)
            .is_some()
            && totals::checked_pharmacy_totals(&self.pharmacy.items, self.pharmacy.overall_discount)
                .is_some()
    }

    /// Drop the treatment draft after it was saved as a temporary bill.
    pub fn clear_treatment_draft(&mut self) {
        self.treatment = TreatmentDraft::default();
        self.tooth_chart.close();
        self.loaded_bill_id = None;
    }

    // -------------------------------------------------------------------------
    // Selections and fetches
    // -------------------------------------------------------------------------

    /// Switch branch. Pharmacy lines and the doctor belong to the old branch
    /// and are dropped.
    pub fn select_branch(&mut self, branch_id: Option<String>) -> FetchTicket {
        let branch_id = branch_id.filter(|id| !id.trim().is_empty());
        if branch_id != self.branch_id {
            self.pharmacy.items.clear();
            self.doctor_id = None;
            self.catalog.medicines.clear();
            self.catalog.doctors.clear();
            self.catalog.branch_name = None;
        }
        self.branch_id = branch_id;
        self.catalog_ticket()
    }

    /// Ticket for reloading the catalog of the current branch.
    pub fn catalog_ticket(&mut self) -> FetchTicket {
        self.catalog_generation += 1;
        FetchTicket {
            generation: self.catalog_generation,
            key: self.branch_id.clone().unwrap_or_default(),
        }
    }

    pub fn complete_catalog_fetch(
        &mut self,
        ticket: &FetchTicket,
        catalog: SessionCatalog,
    ) -> FetchResolution {
        let current_key = self.branch_id.as_deref().unwrap_or_default();
        if ticket.generation != self.catalog_generation || ticket.key != current_key {
            return FetchResolution::Stale;
        }
        self.catalog = catalog;
        FetchResolution::Applied
    }

    /// Select the patient being billed. Choosing a different patient starts
    /// a new draft.
    pub fn select_patient(&mut self, patient: Patient) -> PendingFetch {
        let same_patient = self
            .patient
            .as_ref()
            .is_some_and(|current| current.id == patient.id);
        if !same_patient {
            let mode = self.mode;
            self.reset_draft();
            self.mode = mode;
        }
        let identity = PatientIdentity::of(&patient);
        self.patient = Some(patient);
        PendingFetch {
            ticket: self.balance_ticket(&identity),
            patient: identity,
        }
    }

    /// Reload the pending balance of the selected patient.
    pub fn refresh_pending(&mut self) -> Option<PendingFetch> {
        let identity = self.patient.as_ref().map(PatientIdentity::of)?;
        Some(PendingFetch {
            ticket: self.balance_ticket(&identity),
            patient: identity,
        })
    }

    fn balance_ticket(&mut self, patient: &PatientIdentity) -> FetchTicket {
        self.balance_generation += 1;
        FetchTicket {
            generation: self.balance_generation,
            key: patient.id.clone(),
        }
    }

    pub fn complete_balance_fetch(
        &mut self,
        ticket: &FetchTicket,
        balance: PendingBalance,
    ) -> FetchResolution {
        let current = self.patient.as_ref().map(|patient| patient.id.as_str());
        if ticket.generation != self.balance_generation || current != Some(ticket.key.as_str()) {
            return FetchResolution::Stale;
        }
        self.pending = balance;
        FetchResolution::Applied
    }

    // -------------------------------------------------------------------------
    // Submission
    // -------------------------------------------------------------------------

    /// Payloads for every non-empty draft not already saved.
    pub fn plan_submission(&self) -> Result<SubmissionPlan, BillingError> {
        let patient = self.require_patient()?;
        let committed = self.committed.as_ref().map(|c| c.kind);

        let treatment = (!self.treatment.is_empty() && committed != Some(BillKind::Treatment))
            .then(|| self.treatment_bill(patient, false));
        let pharmacy = (!self.pharmacy.is_empty() && committed != Some(BillKind::Pharmacy))
            .then(|| self.pharmacy_sale(patient));

        if treatment.is_none() && pharmacy.is_none() {
            return Err(BillingError::validation(
                "Add at least one treatment or medicine",
            ));
        }
        Ok(SubmissionPlan {
            treatment,
            pharmacy,
        })
    }

    /// Payload for saving the treatment draft as a temporary bill.
    pub fn plan_temporary_bill(
        &self,
        capabilities: &Capabilities,
    ) -> Result<NewTreatmentBill, BillingError> {
        capabilities.require(capabilities::TREATMENT_EDIT)?;
        let patient = self.require_patient()?;
        if self.treatment.is_empty() {
            return Err(BillingError::validation("Please add at least one treatment"));
        }
        Ok(self.treatment_bill(patient, true))
    }

    /// Start saving the draft: plans the payloads and blocks a second save
    /// until [`finish_save`](Self::finish_save) is called with the ticket.
    pub fn begin_submission(&mut self) -> Result<(SubmissionPlan, SubmissionTicket), BillingError> {
        self.check_no_save_running()?;
        let plan = self.plan_submission()?;
        Ok((plan, self.start_save()?))
    }

    pub fn begin_temporary_bill(
        &mut self,
        capabilities: &Capabilities,
    ) -> Result<(NewTreatmentBill, SubmissionTicket), BillingError> {
        self.check_no_save_running()?;
        let bill = self.plan_temporary_bill(capabilities)?;
        Ok((bill, self.start_save()?))
    }

    /// End the save started with `ticket`. `Applied` means the draft it was
    /// started for is still on screen and may be reset or marked.
    pub fn finish_save(&mut self, ticket: &SubmissionTicket) -> FetchResolution {
        if self.saving.as_ref() == Some(ticket) {
            self.saving = None;
        }
        if self.is_current(ticket) {
            FetchResolution::Applied
        } else {
            FetchResolution::Stale
        }
    }

    /// True while a save of the draft on screen is running.
    pub fn save_in_progress(&self) -> bool {
        self.saving
            .as_ref()
            .is_some_and(|ticket| self.is_current(ticket))
    }

    fn is_current(&self, ticket: &SubmissionTicket) -> bool {
        ticket.generation == self.draft_generation
            && self.patient.as_ref().map(|patient| patient.id.as_str())
                == Some(ticket.patient_id.as_str())
    }

    fn check_no_save_running(&self) -> Result<(), BillingError> {
        if self.saving.is_some() {
            return Err(BillingError::validation("A save is already in progress"));
        }
        Ok(())
    }

    fn start_save(&mut self) -> Result<SubmissionTicket, BillingError> {
        let ticket = SubmissionTicket {
            generation: self.draft_generation,
            patient_id: self.require_patient()?.id.clone(),
        };
        self.saving = Some(ticket.clone());
        Ok(ticket)
    }

    /// A pending bill of the selected patient may be deleted; anything
    /// else is refused.
    pub fn check_deletable(&self, bill_id: &str) -> Result<(), BillingError> {
        self.require_patient()?;
        if self.pending.find_bill(bill_id).is_none() {
            return Err(BillingError::validation(
                "Pending bill not found for this patient",
            ));
        }
        Ok(())
    }

    /// Unlink a deleted bill from the draft it was loaded into.
    pub fn forget_bill(&mut self, bill_id: &str) {
        if self.loaded_bill_id.as_deref() == Some(bill_id) {
            self.loaded_bill_id = None;
        }
    }

    /// Branch recorded on bills: the selected one, else the clinic's first.
    pub fn billing_branch(&self) -> Option<(&str, Option<&str>)> {
        match self.branch_id.as_deref() {
            Some(id) => Some((id, self.catalog.branch_name.as_deref())),
            None => self
                .catalog
                .fallback_branch
                .as_ref()
                .map(|branch| (branch.id.as_str(), Some(branch.name.as_str()))),
        }
    }

    /// Remember a half stored by a submit whose other half failed.
    pub fn mark_committed(&mut self, kind: BillKind, record_id: String) {
        self.committed = Some(CommittedHalf { kind, record_id });
    }

    fn require_patient(&self) -> Result<&Patient, BillingError> {
        self.patient
            .as_ref()
            .ok_or_else(|| BillingError::validation("Please select a patient first"))
    }

    fn doctor_name(&self) -> Option<String> {
        let id = self.doctor_id.as_deref()?;
        self.catalog
            .doctors
            .iter()
            .find(|doctor| doctor.id == id)
            .map(|doctor| doctor.name.clone())
    }

    fn billing_branch_id(&self) -> String {
        self.billing_branch()
            .map(|(id, _)| id.to_string())
            .unwrap_or_default()
    }

    fn billing_branch_name(&self) -> Option<String> {
        self.billing_branch()
            .and_then(|(_, name)| name.map(str::to_string))
    }

    fn treatment_bill(&self, patient: &Patient, temporary: bool) -> NewTreatmentBill {
        let totals = self.treatment_totals();
        NewTreatmentBill {
            patient_id: patient.billing_id().to_string(),
            patient_name: patient.name.clone(),
            services: self
                .treatment
                .items
                .iter()
                .map(TreatmentLineItem::to_service_line)
                .collect(),
            subtotal: totals.subtotal,
            gst_amount: totals.gst_amount,
            discount: totals.total_discount(),
            collection_discount: Decimal::ZERO,
            total_amount: totals.total,
            paid_amount: Decimal::ZERO,
            balance_amount: totals.total,
            payment_mode: if temporary { "pending" } else { "cash" }.to_string(),
            payment_status: PaymentStatus::Pending.as_str().to_string(),
            notes: self.treatment.notes.clone(),
            is_temporary: temporary,
            branch_id: self.billing_branch_id(),
            branch_name: self.billing_branch_name(),
            doctor_id: self.doctor_id.clone(),
            doctor_name: self.doctor_name(),
        }
    }

    fn pharmacy_sale(&self, patient: &Patient) -> NewPharmacySale {
        let totals = self.pharmacy_totals();
        NewPharmacySale {
            patient_id: patient.billing_id().to_string(),
            patient_name: patient.name.clone(),
            items: self
                .pharmacy
                .items
                .iter()
                .map(PharmacyLineItem::to_sale_line)
                .collect(),
            subtotal: totals.subtotal,
            gst_amount: totals::pharmacy_gst(&self.pharmacy.items),
            discount: totals.discount,
            collection_discount: Decimal::ZERO,
            total_amount: totals.total,
            paid_amount: Decimal::ZERO,
            balance_amount: totals.total,
            payment_mode: "cash".to_string(),
            payment_status: PaymentStatus::Pending.as_str().to_string(),
            branch_id: self.billing_branch_id(),
            branch_name: self.billing_branch_name(),
        }
    }

    // -------------------------------------------------------------------------
    // Totals and view
    // -------------------------------------------------------------------------

    pub fn treatment_totals(&self) -> TreatmentTotals {
        totals::treatment_totals(&self.treatment.items, self.treatment.overall_discount)
    }

    pub fn pharmacy_totals(&self) -> PharmacyTotals {
        totals::pharmacy_totals(&self.pharmacy.items, self.pharmacy.overall_discount)
    }

    pub fn totals(&self) -> SessionTotals {
        let treatment = self.treatment_totals();
        let pharmacy = self.pharmacy_totals();

        let mut grand_total = self.pending.total_for(self.mode);
        if self.mode.includes(BillKind::Treatment) {
            grand_total = grand_total.saturating_add(treatment.total);
        }
        if self.mode.includes(BillKind::Pharmacy) {
            grand_total = grand_total.saturating_add(pharmacy.total);
        }

        SessionTotals {
            treatment,
            pharmacy,
            pending_treatment: self.pending.pending_treatment_total,
            pending_pharmacy: self.pending.pending_pharmacy_total,
            grand_total,
        }
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            mode: self.mode,
            branch_id: self.branch_id.clone(),
            branch_name: self.catalog.branch_name.clone(),
            doctor_id: self.doctor_id.clone(),
            patient: self.patient.clone(),
            treatment: self.treatment.clone(),
            pharmacy: self.pharmacy.clone(),
            tooth_chart: ToothChartView {
                open_index: self.tooth_chart.open_index(),
                chart_type: self.tooth_chart.chart_type(),
                teeth: self.tooth_chart.chart_type().teeth(),
            },
            pending: self.pending.clone(),
            possible_overlaps: self.pending.possible_overlaps(),
            loaded_bill_id: self.loaded_bill_id.clone(),
            committed: self.committed.clone(),
            saving: self.save_in_progress(),
            treatments: self.catalog.treatments.clone(),
            totals: self.totals(),
        }
    }
}

fn outcome_of(result: Result<(), AmountTooLarge>) -> ActionOutcome {
    match result {
        Ok(()) => ActionOutcome::Applied,
        Err(e) => ActionOutcome::warning(e.to_string()),
    }
}

fn no_line(kind: &str, index: usize) -> BillingError {
    BillingError::validation(format!("No {} line at index {}", kind, index))
}
