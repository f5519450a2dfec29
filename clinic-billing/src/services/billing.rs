//! Billing sessions over the clinic backend.
//!
//! Sessions live in memory, each behind its own lock. The lock is never held
//! across a backend call: fetches and saves take a ticket under the lock,
//! run unlocked, and hand their result back with the ticket. Sessions left
//! idle are swept by [`BillingService::spawn_idle_sweeper`].

use crate::clients::{
    BillingStore, CatalogService, ClinicApiClient, CreditSalesService, PatientService,
    WalkinService,
};
use crate::error::BillingError;
use crate::models::{BillKind, BillingMode, Doctor, MedicineStock, NewPatient, Patient, Walkin};
use crate::services::capabilities::{capabilities, Capabilities};
use crate::services::metrics::{ACTIONS_TOTAL, OPEN_SESSIONS, STALE_FETCHES_TOTAL, SUBMISSIONS_TOTAL};
use crate::services::pending::aggregate_pending_balance;
use crate::services::search::{active_treatments, filter_medicines, filter_patients};
use crate::services::session::{
    ActionOutcome, BillingAction, BillingSessionState, FetchResolution, FetchTicket, PendingFetch,
    SessionCatalog, SessionView, SubmissionPlan,
};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

type SharedSession = Arc<Mutex<BillingSessionState>>;

struct SessionEntry {
    state: SharedSession,
    last_touched: Instant,
}

/// Result of an action together with the state it produced.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResponse {
    pub outcome: ActionOutcome,
    pub session: SessionView,
}

/// What happened to one half of a submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HalfOutcome {
    /// Nothing to save for this kind.
    Skipped,
    /// Saved by an earlier submit.
    AlreadySaved { record_id: String },
    Saved { record_id: String },
    Failed { error: String },
}

impl HalfOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, HalfOutcome::Failed { .. })
    }

    fn saved_id(&self) -> Option<&str> {
        match self {
            HalfOutcome::Saved { record_id } => Some(record_id.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReport {
    pub treatment: HalfOutcome,
    pub pharmacy: HalfOutcome,
    pub session: SessionView,
}

impl SubmissionReport {
    /// True when nothing failed and the draft was reset.
    pub fn is_complete(&self) -> bool {
        !self.treatment.is_failed() && !self.pharmacy.is_failed()
    }
}

/// Backend collaborators of the billing service.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn CatalogService>,
    pub patients: Arc<dyn PatientService>,
    pub store: Arc<dyn BillingStore>,
    pub credit_sales: Arc<dyn CreditSalesService>,
    pub walkins: Arc<dyn WalkinService>,
}

impl Collaborators {
    /// Every collaborator served by the same backend client.
    pub fn from_client(client: ClinicApiClient) -> Self {
        let client = Arc::new(client);
        Self {
            catalog: client.clone(),
            patients: client.clone(),
            store: client.clone(),
            credit_sales: client.clone(),
            walkins: client,
        }
    }
}

pub struct BillingService {
    catalog: Arc<dyn CatalogService>,
    patients: Arc<dyn PatientService>,
    store: Arc<dyn BillingStore>,
    credit_sales: Arc<dyn CreditSalesService>,
    walkins: Arc<dyn WalkinService>,
    sessions: DashMap<Uuid, SessionEntry>,
    default_mode: BillingMode,
}

impl BillingService {
    pub fn new(collaborators: Collaborators, default_mode: BillingMode) -> Self {
        Self {
            catalog: collaborators.catalog,
            patients: collaborators.patients,
            store: collaborators.store,
            credit_sales: collaborators.credit_sales,
            walkins: collaborators.walkins,
            sessions: DashMap::new(),
            default_mode,
        }
    }

    /// Service where every collaborator is the same backend client.
    pub fn with_client(client: ClinicApiClient, default_mode: BillingMode) -> Self {
        Self::new(Collaborators::from_client(client), default_mode)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Look up a session and mark it as used now.
    fn session(&self, id: Uuid) -> Result<SharedSession, BillingError> {
        let mut entry = self
            .sessions
            .get_mut(&id)
            .ok_or(BillingError::SessionNotFound(id))?;
        entry.last_touched = Instant::now();
        Ok(entry.state.clone())
    }

    /// Close every session not used for `idle`. Returns how many were closed.
    pub fn sweep_idle(&self, idle: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| entry.last_touched.elapsed() < idle);
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            OPEN_SESSIONS.sub(removed as i64);
            info!(removed = removed, "Closed idle billing sessions");
        }
        removed
    }

    /// Sweep idle sessions on a fixed interval until the service is dropped.
    pub fn spawn_idle_sweeper(self: &Arc<Self>, idle: Duration) -> JoinHandle<()> {
        let service: Weak<Self> = Arc::downgrade(self);
        let period = (idle / 4).max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(service) = service.upgrade() else {
                    debug!("Billing service dropped, idle sweeper exiting");
                    break;
                };
                service.sweep_idle(idle);
            }
        })
    }

    // -------------------------------------------------------------------------
    // Session lifecycle
    // -------------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn open_session(
        &self,
        mode: Option<BillingMode>,
        branch_id: Option<String>,
    ) -> Result<SessionView, BillingError> {
        let id = Uuid::new_v4();
        let mut state = BillingSessionState::new(
            id,
            mode.unwrap_or(self.default_mode),
            branch_id.filter(|b| !b.trim().is_empty()),
        );
        let ticket = state.catalog_ticket();
        let session = Arc::new(Mutex::new(state));

        if let Err(e) = self.load_catalog(&session, ticket).await {
            warn!(error = %e, "Catalog load failed, session not opened");
            return Err(e);
        }

        self.sessions.insert(
            id,
            SessionEntry {
                state: session.clone(),
                last_touched: Instant::now(),
            },
        );
        OPEN_SESSIONS.inc();
        info!(session_id = %id, "Billing session opened");

        let view = session.lock().await.view();
        Ok(view)
    }

    pub async fn get_session(&self, id: Uuid) -> Result<SessionView, BillingError> {
        let session = self.session(id)?;
        let view = session.lock().await.view();
        Ok(view)
    }

    #[instrument(skip(self))]
    pub fn close_session(&self, id: Uuid) -> Result<(), BillingError> {
        self.sessions
            .remove(&id)
            .ok_or(BillingError::SessionNotFound(id))?;
        OPEN_SESSIONS.dec();
        info!(session_id = %id, "Billing session closed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Edits and selections
    // -------------------------------------------------------------------------

    #[instrument(skip(self, action, capabilities), fields(action = action.name()))]
    pub async fn apply(
        &self,
        id: Uuid,
        action: BillingAction,
        capabilities: &Capabilities,
    ) -> Result<ActionResponse, BillingError> {
        let session = self.session(id)?;
        let name = action.name();
        let mut state = session.lock().await;

        let result = state.apply(action, capabilities);
        let label = match &result {
            Ok(ActionOutcome::Applied) => "applied",
            Ok(ActionOutcome::Warning(_)) => "warning",
            Err(BillingError::PermissionDenied { .. }) => "denied",
            Err(_) => "error",
        };
        ACTIONS_TOTAL.with_label_values(&[name, label]).inc();

        let outcome = result?;
        if let ActionOutcome::Warning(message) = &outcome {
            debug!(session_id = %id, warning = %message, "Action refused");
        }
        Ok(ActionResponse {
            outcome,
            session: state.view(),
        })
    }

    #[instrument(skip(self))]
    pub async fn select_branch(
        &self,
        id: Uuid,
        branch_id: Option<String>,
    ) -> Result<SessionView, BillingError> {
        let session = self.session(id)?;
        let ticket = session.lock().await.select_branch(branch_id);
        self.load_catalog(&session, ticket).await?;

        let view = session.lock().await.view();
        Ok(view)
    }

    /// Select the patient by internal id or patient code and load what they
    /// still owe.
    #[instrument(skip(self))]
    pub async fn select_patient(
        &self,
        id: Uuid,
        patient_id: &str,
    ) -> Result<SessionView, BillingError> {
        let session = self.session(id)?;
        let patients = self
            .patients
            .list_patients()
            .await
            .map_err(|e| BillingError::upstream("Load patients", e))?;
        let patient = patients
            .into_iter()
            .find(|p| p.id == patient_id || p.patient_code.as_deref() == Some(patient_id))
            .ok_or_else(|| BillingError::validation(format!("Patient {} not found", patient_id)))?;

        let fetch = session.lock().await.select_patient(patient);
        self.load_pending(&session, fetch).await?;

        let view = session.lock().await.view();
        Ok(view)
    }

    async fn load_catalog(
        &self,
        session: &SharedSession,
        ticket: FetchTicket,
    ) -> Result<FetchResolution, BillingError> {
        let branch_id = Some(ticket.key()).filter(|key| !key.is_empty());

        let (treatments, medicines, doctors, branches) = futures::try_join!(
            self.catalog.list_treatments(),
            self.catalog.list_medicines(branch_id),
            self.catalog.list_doctors(),
            self.catalog.list_branches(),
        )
        .map_err(|e| BillingError::upstream("Load catalog", e))?;

        let catalog = SessionCatalog {
            branch_name: branch_id.and_then(|branch| {
                branches
                    .iter()
                    .find(|b| b.id == branch)
                    .map(|b| b.name.clone())
            }),
            treatments: active_treatments(treatments),
            medicines,
            doctors,
            fallback_branch: branches.into_iter().next(),
        };

        let resolution = session.lock().await.complete_catalog_fetch(&ticket, catalog);
        if resolution == FetchResolution::Stale {
            STALE_FETCHES_TOTAL.with_label_values(&["catalog"]).inc();
            debug!(branch_id = ticket.key(), "Discarded stale catalog response");
        }
        Ok(resolution)
    }

    async fn load_pending(
        &self,
        session: &SharedSession,
        fetch: PendingFetch,
    ) -> Result<FetchResolution, BillingError> {
        let (credit_sales, bills, pharmacy_sales) = futures::try_join!(
            self.credit_sales.list_credit_sales(),
            self.store.list_treatment_bills(),
            self.store.list_pharmacy_sales(),
        )
        .map_err(|e| BillingError::upstream("Load pending balance", e))?;

        let balance = aggregate_pending_balance(&fetch.patient, credit_sales, bills, pharmacy_sales);
        let overlaps = balance.possible_overlaps().len();

        let resolution = session
            .lock()
            .await
            .complete_balance_fetch(&fetch.ticket, balance);
        match resolution {
            FetchResolution::Applied => {
                if overlaps > 0 {
                    info!(
                        patient_id = %fetch.patient.id,
                        overlaps = overlaps,
                        "Credit sales reference bills also counted as pending"
                    );
                }
            }
            FetchResolution::Stale => {
                STALE_FETCHES_TOTAL.with_label_values(&["balance"]).inc();
                debug!(patient_id = %fetch.patient.id, "Discarded stale balance response");
            }
        }
        Ok(resolution)
    }

    // -------------------------------------------------------------------------
    // Saving
    // -------------------------------------------------------------------------

    /// Save every non-empty draft. The halves succeed or fail independently;
    /// the draft is only reset when nothing failed and it is still the one
    /// on screen.
    #[instrument(skip(self))]
    pub async fn submit(&self, id: Uuid) -> Result<SubmissionReport, BillingError> {
        let session = self.session(id)?;
        let (plan, ticket, committed) = {
            let mut state = session.lock().await;
            let (plan, ticket) = state.begin_submission()?;
            (plan, ticket, state.committed().cloned())
        };

        // Detached so a dropped request still settles the session.
        let store = self.store.clone();
        let saves = tokio::spawn(async move { save_halves(store, plan).await });
        let (treatment_result, pharmacy_result) = match saves.await {
            Ok(results) => results,
            Err(e) => {
                session.lock().await.finish_save(&ticket);
                return Err(BillingError::upstream("Submit bill", anyhow::Error::new(e)));
            }
        };

        let already_saved = |kind: BillKind| {
            committed
                .as_ref()
                .filter(|c| c.kind == kind)
                .map(|c| HalfOutcome::AlreadySaved {
                    record_id: c.record_id.clone(),
                })
                .unwrap_or(HalfOutcome::Skipped)
        };
        let treatment = match treatment_result {
            Some(result) => half_outcome(BillKind::Treatment, result),
            None => already_saved(BillKind::Treatment),
        };
        let pharmacy = match pharmacy_result {
            Some(result) => half_outcome(BillKind::Pharmacy, result),
            None => already_saved(BillKind::Pharmacy),
        };

        let mut state = session.lock().await;
        if state.finish_save(&ticket) == FetchResolution::Stale {
            STALE_FETCHES_TOTAL.with_label_values(&["submission"]).inc();
            info!(
                session_id = %id,
                patient_id = %ticket.patient_id(),
                "Save finished after the draft was replaced; session left untouched"
            );
        } else if !treatment.is_failed() && !pharmacy.is_failed() {
            state.reset_draft();
            info!(session_id = %id, "Bill saved");
        } else {
            if let Some(record_id) = treatment.saved_id() {
                state.mark_committed(BillKind::Treatment, record_id.to_string());
            }
            if let Some(record_id) = pharmacy.saved_id() {
                state.mark_committed(BillKind::Pharmacy, record_id.to_string());
            }
            warn!(
                session_id = %id,
                treatment_failed = treatment.is_failed(),
                pharmacy_failed = pharmacy.is_failed(),
                "Bill only partly saved"
            );
        }

        Ok(SubmissionReport {
            treatment,
            pharmacy,
            session: state.view(),
        })
    }

    /// Park the treatment draft as a temporary bill the patient still owes.
    #[instrument(skip(self, capabilities))]
    pub async fn save_temporary_bill(
        &self,
        id: Uuid,
        capabilities: &Capabilities,
    ) -> Result<SessionView, BillingError> {
        let session = self.session(id)?;
        let (bill, ticket) = session.lock().await.begin_temporary_bill(capabilities)?;

        let store = self.store.clone();
        let saved = tokio::spawn(async move { store.create_treatment_bill(&bill).await })
            .await
            .map_err(anyhow::Error::new)
            .and_then(|result| result);
        let saved = match saved {
            Ok(saved) => {
                SUBMISSIONS_TOTAL.with_label_values(&["temporary", "saved"]).inc();
                saved
            }
            Err(e) => {
                SUBMISSIONS_TOTAL.with_label_values(&["temporary", "failed"]).inc();
                session.lock().await.finish_save(&ticket);
                return Err(BillingError::upstream("Create temporary bill", e));
            }
        };
        info!(session_id = %id, bill_id = %saved.id, "Temporary bill created");

        let fetch = {
            let mut state = session.lock().await;
            match state.finish_save(&ticket) {
                FetchResolution::Applied => {
                    state.clear_treatment_draft();
                    state.refresh_pending()
                }
                FetchResolution::Stale => {
                    STALE_FETCHES_TOTAL.with_label_values(&["submission"]).inc();
                    None
                }
            }
        };
        if let Some(fetch) = fetch {
            self.load_pending(&session, fetch).await?;
        }

        let view = session.lock().await.view();
        Ok(view)
    }

    #[instrument(skip(self, capabilities))]
    pub async fn delete_pending_bill(
        &self,
        id: Uuid,
        bill_id: &str,
        capabilities: &Capabilities,
    ) -> Result<SessionView, BillingError> {
        capabilities.require(capabilities::TREATMENT_EDIT)?;
        let session = self.session(id)?;
        session.lock().await.check_deletable(bill_id)?;

        self.store
            .delete_treatment_bill(bill_id)
            .await
            .map_err(|e| BillingError::upstream("Delete bill", e))?;
        info!(session_id = %id, bill_id = %bill_id, "Pending bill deleted");

        let fetch = {
            let mut state = session.lock().await;
            state.forget_bill(bill_id);
            state.refresh_pending()
        };
        if let Some(fetch) = fetch {
            self.load_pending(&session, fetch).await?;
        }

        let view = session.lock().await.view();
        Ok(view)
    }

    // -------------------------------------------------------------------------
    // Patients and search
    // -------------------------------------------------------------------------

    #[instrument(skip(self, patient), fields(patient_name = %patient.name))]
    pub async fn create_patient(&self, patient: NewPatient) -> Result<Patient, BillingError> {
        patient
            .validate()
            .map_err(|e| BillingError::validation(e.to_string()))?;

        let created = self
            .patients
            .create_patient(&patient)
            .await
            .map_err(|e| BillingError::upstream("Create patient", e))?;
        info!(patient_id = %created.id, "Patient created");
        Ok(created)
    }

    pub async fn search_patients(&self, query: &str) -> Result<Vec<Patient>, BillingError> {
        let patients = self
            .patients
            .list_patients()
            .await
            .map_err(|e| BillingError::upstream("Load patients", e))?;
        Ok(filter_patients(&patients, query)
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn search_medicines(
        &self,
        id: Uuid,
        query: &str,
    ) -> Result<Vec<MedicineStock>, BillingError> {
        let session = self.session(id)?;
        let state = session.lock().await;
        Ok(filter_medicines(&state.catalog().medicines, query, state.branch_id())
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn list_doctors(&self, id: Uuid) -> Result<Vec<Doctor>, BillingError> {
        let session = self.session(id)?;
        let state = session.lock().await;
        Ok(state.available_doctors().into_iter().cloned().collect())
    }

    /// Walk-ins waiting in the session's billing branch. Empty when the
    /// clinic has no branch at all.
    pub async fn list_walkins(&self, id: Uuid) -> Result<Vec<Walkin>, BillingError> {
        let session = self.session(id)?;
        let branch_id = {
            let state = session.lock().await;
            state.billing_branch().map(|(branch_id, _)| branch_id.to_string())
        };
        let Some(branch_id) = branch_id else {
            return Ok(Vec::new());
        };

        self.walkins
            .list_waiting_walkins(&branch_id)
            .await
            .map_err(|e| BillingError::upstream("Load walk-ins", e))
    }
}

type HalfResult = Option<anyhow::Result<String>>;

async fn save_halves(
    store: Arc<dyn BillingStore>,
    plan: SubmissionPlan,
) -> (HalfResult, HalfResult) {
    let treatment_half = async {
        match &plan.treatment {
            Some(bill) => Some(store.create_treatment_bill(bill).await.map(|bill| bill.id)),
            None => None,
        }
    };
    let pharmacy_half = async {
        match &plan.pharmacy {
            Some(sale) => Some(store.create_pharmacy_sale(sale).await.map(|sale| sale.id)),
            None => None,
        }
    };
    tokio::join!(treatment_half, pharmacy_half)
}

fn half_outcome(kind: BillKind, result: anyhow::Result<String>) -> HalfOutcome {
    match result {
        Ok(record_id) => {
            SUBMISSIONS_TOTAL
                .with_label_values(&[kind.as_str(), "saved"])
                .inc();
            HalfOutcome::Saved { record_id }
        }
        Err(e) => {
            SUBMISSIONS_TOTAL
                .with_label_values(&[kind.as_str(), "failed"])
                .inc();
            warn!(kind = %kind, error = %e, "Saving bill failed");
            HalfOutcome::Failed {
                error: format!("{:#}", e),
            }
        }
    }
}
