//! Billing service tests over the in-memory clinic backend.

mod common;

use clinic_billing::error::BillingError;
use clinic_billing::models::{BillKind, BillingMode, CreditSaleRecord};
use clinic_billing::services::{
    ActionOutcome, BillingAction, BillingService, Capabilities, HalfOutcome, TreatmentField,
};
use common::{billing_service, dec, init_tracing, pending_bill, FakeClinic};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

fn manager() -> Capabilities {
    Capabilities::for_role_name("branch_manager")
}

fn receptionist() -> Capabilities {
    Capabilities::for_role_name("receptionist")
}

async fn setup() -> (Arc<FakeClinic>, BillingService) {
    init_tracing();
    let clinic = FakeClinic::seeded();
    let service = billing_service(&clinic);
    (clinic, service)
}

async fn act(service: &BillingService, id: Uuid, action: BillingAction) -> ActionOutcome {
    service
        .apply(id, action, &manager())
        .await
        .expect("action should be accepted")
        .outcome
}

/// Root canal on teeth 11 and 12 plus two strips of amoxicillin.
async fn compose_bill(service: &BillingService, id: Uuid) {
    act(service, id, BillingAction::AddTreatmentItem).await;
    act(
        service,
        id,
        BillingAction::UpdateTreatmentItem {
            index: 0,
            field: TreatmentField::Treatment("t-2".to_string()),
        },
    )
    .await;
    act(
        service,
        id,
        BillingAction::UpdateTreatmentItem {
            index: 0,
            field: TreatmentField::Teeth(vec![11, 12]),
        },
    )
    .await;
    act(
        service,
        id,
        BillingAction::AddMedicine {
            medicine_id: "m-2".to_string(),
        },
    )
    .await;
    act(
        service,
        id,
        BillingAction::UpdateMedicineQuantity {
            index: 0,
            value: "2".to_string(),
        },
    )
    .await;
}

// ============================================================================
// Session lifecycle
// ============================================================================

#[tokio::test]
async fn open_session_loads_branch_catalog() {
    let (_clinic, service) = setup().await;

    let view = service
        .open_session(None, Some("branch-1".to_string()))
        .await
        .unwrap();

    assert_eq!(view.mode, BillingMode::All);
    assert_eq!(view.branch_name.as_deref(), Some("Anna Nagar"));
    let treatment_ids: Vec<_> = view.treatments.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(treatment_ids, vec!["t-1", "t-2"]);
    assert_eq!(service.session_count(), 1);

    let doctors = service.list_doctors(view.id).await.unwrap();
    assert_eq!(doctors.len(), 1);
    assert_eq!(doctors[0].id, "d-1");
}

#[tokio::test]
async fn catalog_failure_does_not_open_a_session() {
    let (clinic, service) = setup().await;
    clinic.fail_catalog(true);

    let result = service.open_session(None, None).await;

    assert!(matches!(result, Err(BillingError::Upstream { .. })));
    assert_eq!(service.session_count(), 0);
}

#[tokio::test]
async fn closed_session_is_gone() {
    let (_clinic, service) = setup().await;
    let view = service.open_session(None, None).await.unwrap();

    assert_ok!(service.close_session(view.id));

    assert!(matches!(
        service.get_session(view.id).await,
        Err(BillingError::SessionNotFound(_))
    ));
    assert!(matches!(
        service.close_session(view.id),
        Err(BillingError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn branch_switch_reloads_medicines_and_drops_lines() {
    let (_clinic, service) = setup().await;
    let view = service
        .open_session(None, Some("branch-1".to_string()))
        .await
        .unwrap();
    act(
        &service,
        view.id,
        BillingAction::AddMedicine {
            medicine_id: "m-2".to_string(),
        },
    )
    .await;

    let view = service
        .select_branch(view.id, Some("branch-2".to_string()))
        .await
        .unwrap();

    assert!(view.pharmacy.items.is_empty());
    assert_eq!(view.branch_name.as_deref(), Some("Velachery"));
    let medicines = service.search_medicines(view.id, "").await.unwrap();
    let ids: Vec<_> = medicines.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m-3"]);
}

// ============================================================================
// Patients and pending balance
// ============================================================================

#[tokio::test]
async fn selecting_patient_loads_pending_balance() {
    let (clinic, service) = setup().await;
    clinic.add_bill(pending_bill("old-1", "PT-001", "500", "200"));
    clinic.add_bill(pending_bill("other-1", "PT-002", "900", "0"));
    clinic.add_credit_sale(CreditSaleRecord {
        id: "cs-1".to_string(),
        bill_id: None,
        pharmacy_sale_id: None,
        patient_id: None,
        patient_name: Some("asha kumar".to_string()),
        total_amount: dec("120"),
        paid_amount: Some(dec("20")),
        pending_amount: None,
        status: Some("pending".to_string()),
        sale_type: Some("pharmacy".to_string()),
        branch_id: None,
    });

    let view = service.open_session(None, None).await.unwrap();
    let view = service.select_patient(view.id, "PT-001").await.unwrap();

    assert_eq!(view.patient.as_ref().unwrap().id, "p-1");
    assert_eq!(view.totals.pending_treatment, dec("300"));
    assert_eq!(view.totals.pending_pharmacy, dec("100"));
    assert_eq!(view.totals.grand_total, dec("400"));

    act(
        &service,
        view.id,
        BillingAction::SetMode {
            mode: BillingMode::Treatment,
        },
    )
    .await;
    let view = service.get_session(view.id).await.unwrap();
    assert_eq!(view.totals.grand_total, dec("300"));
}

#[tokio::test]
async fn unknown_patient_is_rejected() {
    let (_clinic, service) = setup().await;
    let view = service.open_session(None, None).await.unwrap();

    let err = assert_err!(service.select_patient(view.id, "PT-404").await);

    assert!(matches!(err, BillingError::Validation(_)));
}

#[tokio::test]
async fn patient_search_and_registration() {
    let (_clinic, service) = setup().await;

    let found = service.search_patients("ravi").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "p-2");

    let created = service
        .create_patient(clinic_billing::models::NewPatient {
            patient_code: Some("PT-003".to_string()),
            name: "Lakshmi".to_string(),
            phone: "9000000000".to_string(),
            gender: "female".to_string(),
            address: String::new(),
            branch_id: "branch-1".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(created.name, "Lakshmi");
    assert_eq!(service.search_patients("PT-003").await.unwrap().len(), 1);
}

#[tokio::test]
async fn patient_without_phone_is_not_registered() {
    let (_clinic, service) = setup().await;

    let result = service
        .create_patient(clinic_billing::models::NewPatient {
            patient_code: None,
            name: "Lakshmi".to_string(),
            phone: String::new(),
            gender: "female".to_string(),
            address: String::new(),
            branch_id: String::new(),
        })
        .await;

    assert!(matches!(result, Err(BillingError::Validation(_))));
}

// ============================================================================
// Permissions
// ============================================================================

#[tokio::test]
async fn receptionist_cannot_give_discount() {
    let (_clinic, service) = setup().await;
    let view = service.open_session(None, None).await.unwrap();

    let result = service
        .apply(
            view.id,
            BillingAction::SetPharmacyDiscount {
                value: "50".to_string(),
            },
            &receptionist(),
        )
        .await;

    match result {
        Err(BillingError::PermissionDenied { capability }) => {
            assert_eq!(capability, "billing.discount:give")
        }
        other => panic!("expected permission denial, got {:?}", other.map(|r| r.outcome)),
    }
    let view = service.get_session(view.id).await.unwrap();
    assert_eq!(view.pharmacy.overall_discount, Decimal::ZERO);
}

#[tokio::test]
async fn receptionist_can_sell_medicines() {
    let (_clinic, service) = setup().await;
    let view = service
        .open_session(None, Some("branch-1".to_string()))
        .await
        .unwrap();

    let response = service
        .apply(
            view.id,
            BillingAction::AddMedicine {
                medicine_id: "m-2".to_string(),
            },
            &receptionist(),
        )
        .await
        .unwrap();

    assert!(response.outcome.is_applied());
    assert_eq!(response.session.totals.pharmacy.total, dec("25"));
}

// ============================================================================
// Submission
// ============================================================================

#[tokio::test]
async fn full_submit_saves_both_bills_and_resets() {
    let (clinic, service) = setup().await;
    let view = service
        .open_session(None, Some("branch-1".to_string()))
        .await
        .unwrap();
    service.select_patient(view.id, "p-1").await.unwrap();
    compose_bill(&service, view.id).await;

    let report = service.submit(view.id).await.unwrap();

    assert!(report.is_complete());
    assert!(matches!(report.treatment, HalfOutcome::Saved { .. }));
    assert!(matches!(report.pharmacy, HalfOutcome::Saved { .. }));
    assert!(report.session.patient.is_none());
    assert!(report.session.treatment.items.is_empty());

    let bills = clinic.submitted_bills();
    assert_eq!(bills.len(), 1);
    assert_eq!(bills[0].patient_id, "PT-001");
    assert_eq!(bills[0].subtotal, dec("2000"));
    assert_eq!(bills[0].gst_amount, dec("360"));
    assert_eq!(bills[0].total_amount, dec("2360"));
    assert!(!bills[0].is_temporary);

    let sales = clinic.submitted_sales();
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].total_amount, dec("50"));
    assert_eq!(sales[0].branch_name.as_deref(), Some("Anna Nagar"));
}

#[tokio::test]
async fn partial_failure_keeps_draft_and_retry_skips_saved_half() {
    let (clinic, service) = setup().await;
    let view = service
        .open_session(None, Some("branch-1".to_string()))
        .await
        .unwrap();
    service.select_patient(view.id, "PT-001").await.unwrap();
    compose_bill(&service, view.id).await;
    clinic.fail_pharmacy_saves(true);

    let report = service.submit(view.id).await.unwrap();

    assert!(!report.is_complete());
    let bill_id = match &report.treatment {
        HalfOutcome::Saved { record_id } => record_id.clone(),
        other => panic!("treatment should be saved, got {:?}", other),
    };
    assert!(report.pharmacy.is_failed());
    assert!(report.session.patient.is_some());
    assert_eq!(report.session.pharmacy.items.len(), 1);
    let committed = report.session.committed.as_ref().unwrap();
    assert_eq!(committed.kind, BillKind::Treatment);
    assert_eq!(committed.record_id, bill_id);

    let outcome = act(&service, view.id, BillingAction::AddTreatmentItem).await;
    assert!(matches!(outcome, ActionOutcome::Warning(_)));

    clinic.fail_pharmacy_saves(false);
    let retry = service.submit(view.id).await.unwrap();

    assert!(retry.is_complete());
    assert_eq!(
        retry.treatment,
        HalfOutcome::AlreadySaved { record_id: bill_id }
    );
    assert!(matches!(retry.pharmacy, HalfOutcome::Saved { .. }));
    assert_eq!(clinic.submitted_bills().len(), 1);
    assert_eq!(clinic.submitted_sales().len(), 1);
    assert!(retry.session.committed.is_none());
}

#[tokio::test]
async fn submit_without_patient_is_rejected() {
    let (clinic, service) = setup().await;
    let view = service
        .open_session(None, Some("branch-1".to_string()))
        .await
        .unwrap();
    compose_bill(&service, view.id).await;

    let result = service.submit(view.id).await;

    assert!(matches!(result, Err(BillingError::Validation(_))));
    assert!(clinic.submitted_bills().is_empty());
}

#[tokio::test]
async fn temporary_bill_becomes_pending_balance() {
    let (clinic, service) = setup().await;
    let view = service.open_session(None, None).await.unwrap();
    service.select_patient(view.id, "p-1").await.unwrap();
    act(&service, view.id, BillingAction::AddTreatmentItem).await;
    act(
        &service,
        view.id,
        BillingAction::UpdateTreatmentItem {
            index: 0,
            field: TreatmentField::Treatment("t-1".to_string()),
        },
    )
    .await;

    let view = service
        .save_temporary_bill(view.id, &manager())
        .await
        .unwrap();

    let bills = clinic.submitted_bills();
    assert_eq!(bills.len(), 1);
    assert!(bills[0].is_temporary);
    assert_eq!(bills[0].payment_mode, "pending");
    assert!(view.treatment.items.is_empty());
    assert_eq!(view.pending.treatment_bills.len(), 1);
    assert_eq!(view.totals.pending_treatment, dec("1000"));
    assert_eq!(view.totals.grand_total, dec("1000"));
}

#[tokio::test]
async fn receptionist_cannot_save_temporary_bill() {
    let (clinic, service) = setup().await;
    let view = service.open_session(None, None).await.unwrap();
    service.select_patient(view.id, "p-1").await.unwrap();
    act(&service, view.id, BillingAction::AddTreatmentItem).await;

    let result = service.save_temporary_bill(view.id, &receptionist()).await;

    assert!(matches!(result, Err(BillingError::PermissionDenied { .. })));
    assert!(clinic.submitted_bills().is_empty());
}

#[tokio::test]
async fn pending_bill_can_be_loaded_and_deleted() {
    let (clinic, service) = setup().await;
    let mut old = pending_bill("old-1", "PT-001", "1500", "0");
    old.services = vec![clinic_billing::models::BillServiceLine {
        treatment_id: Some("t-1".to_string()),
        service_name: "Scaling".to_string(),
        description: String::new(),
        base_amount: dec("1500"),
        units: 1,
        amount: dec("1500"),
        gst_percentage: Decimal::ZERO,
        discount: Decimal::ZERO,
        teeth: Vec::new(),
        teeth_count: 0,
    }];
    clinic.add_bill(old);

    let view = service.open_session(None, None).await.unwrap();
    service.select_patient(view.id, "PT-001").await.unwrap();

    let outcome = act(
        &service,
        view.id,
        BillingAction::LoadPendingBill {
            bill_id: "old-1".to_string(),
        },
    )
    .await;
    assert!(outcome.is_applied());
    let loaded = service.get_session(view.id).await.unwrap();
    assert_eq!(loaded.loaded_bill_id.as_deref(), Some("old-1"));
    assert_eq!(loaded.treatment.items.len(), 1);
    assert_eq!(loaded.totals.treatment.subtotal, dec("1500"));

    let denied = service
        .delete_pending_bill(view.id, "old-1", &receptionist())
        .await;
    assert!(matches!(denied, Err(BillingError::PermissionDenied { .. })));

    let view = service
        .delete_pending_bill(view.id, "old-1", &manager())
        .await
        .unwrap();
    assert!(clinic.bill_ids().is_empty());
    assert!(view.pending.treatment_bills.is_empty());
    assert!(view.loaded_bill_id.is_none());
    assert_eq!(view.totals.pending_treatment, Decimal::ZERO);
}

#[tokio::test]
async fn bill_of_another_patient_cannot_be_deleted() {
    let (clinic, service) = setup().await;
    clinic.add_bill(pending_bill("other-1", "PT-002", "800", "0"));

    let view = service.open_session(None, None).await.unwrap();
    let refused = service
        .delete_pending_bill(view.id, "other-1", &manager())
        .await;
    assert!(matches!(refused, Err(BillingError::Validation(_))));

    service.select_patient(view.id, "p-1").await.unwrap();
    let refused = service
        .delete_pending_bill(view.id, "other-1", &manager())
        .await;
    assert!(matches!(refused, Err(BillingError::Validation(_))));
    assert_eq!(clinic.bill_ids(), vec!["other-1".to_string()]);
}

// ============================================================================
// Concurrent saves and oversized input
// ============================================================================

#[tokio::test]
async fn save_finishing_after_patient_change_keeps_new_draft() {
    let (clinic, service) = setup().await;
    let service = Arc::new(service);
    let view = service
        .open_session(None, Some("branch-1".to_string()))
        .await
        .unwrap();
    service.select_patient(view.id, "p-1").await.unwrap();
    compose_bill(&service, view.id).await;
    clinic.fail_pharmacy_saves(true);

    let gate = clinic.hold_treatment_saves();
    let submitting = {
        let service = service.clone();
        let id = view.id;
        tokio::spawn(async move { service.submit(id).await })
    };
    clinic.treatment_save_started().await;

    let second = service.submit(view.id).await;
    assert!(matches!(second, Err(BillingError::Validation(_))));
    let refused = act(&service, view.id, BillingAction::AddTreatmentItem).await;
    assert!(!refused.is_applied());
    assert!(service.get_session(view.id).await.unwrap().saving);

    service.select_patient(view.id, "p-2").await.unwrap();
    let outcome = act(&service, view.id, BillingAction::AddTreatmentItem).await;
    assert!(outcome.is_applied());

    gate.notify_one();
    let report = submitting.await.unwrap().unwrap();
    assert!(matches!(report.treatment, HalfOutcome::Saved { .. }));
    assert!(report.pharmacy.is_failed());
    assert_eq!(clinic.submitted_bills().len(), 1);

    let after = service.get_session(view.id).await.unwrap();
    assert_eq!(after.patient.as_ref().map(|p| p.id.as_str()), Some("p-2"));
    assert_eq!(after.treatment.items.len(), 1);
    assert!(after.committed.is_none());
    assert!(!after.saving);
}

#[tokio::test]
async fn oversized_amount_is_refused_and_session_keeps_working() {
    let (_clinic, service) = setup().await;
    let view = service
        .open_session(None, Some("branch-1".to_string()))
        .await
        .unwrap();
    act(&service, view.id, BillingAction::AddTreatmentItem).await;
    act(
        &service,
        view.id,
        BillingAction::UpdateTreatmentItem {
            index: 0,
            field: TreatmentField::Treatment("t-2".to_string()),
        },
    )
    .await;

    let outcome = act(
        &service,
        view.id,
        BillingAction::UpdateTreatmentItem {
            index: 0,
            field: TreatmentField::BaseAmount("50000000000000000000000000000".to_string()),
        },
    )
    .await;
    assert!(matches!(outcome, ActionOutcome::Warning(_)));

    let view = service.get_session(view.id).await.unwrap();
    assert_eq!(view.treatment.items[0].amount, dec("1000"));
    assert_eq!(view.totals.treatment.total, dec("1180"));
}

// ============================================================================
// Idle sessions
// ============================================================================

#[tokio::test]
async fn idle_sessions_are_swept() {
    let (_clinic, service) = setup().await;
    let view = service.open_session(None, None).await.unwrap();

    assert_eq!(service.sweep_idle(Duration::from_secs(3600)), 0);
    assert_ok!(service.get_session(view.id).await);

    assert_eq!(service.sweep_idle(Duration::ZERO), 1);
    assert_eq!(service.session_count(), 0);
    assert!(matches!(
        service.get_session(view.id).await,
        Err(BillingError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn idle_sweeper_closes_abandoned_sessions() {
    let (_clinic, service) = setup().await;
    let service = Arc::new(service);
    service.open_session(None, None).await.unwrap();

    let sweeper = service.spawn_idle_sweeper(Duration::from_millis(200));
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(service.session_count(), 0);
    sweeper.abort();
}

// ============================================================================
// Walk-ins and branch fallback
// ============================================================================

#[tokio::test]
async fn walkins_follow_the_billing_branch() {
    let (clinic, service) = setup().await;
    let view = service
        .open_session(None, Some("branch-1".to_string()))
        .await
        .unwrap();

    let ids = |walkins: Vec<clinic_billing::models::Walkin>| {
        walkins.into_iter().map(|w| w.id).collect::<Vec<_>>()
    };
    assert_eq!(ids(service.list_walkins(view.id).await.unwrap()), vec!["w-1"]);

    service
        .select_branch(view.id, Some("branch-2".to_string()))
        .await
        .unwrap();
    assert_eq!(ids(service.list_walkins(view.id).await.unwrap()), vec!["w-2"]);

    let unscoped = service.open_session(None, None).await.unwrap();
    assert_eq!(ids(service.list_walkins(unscoped.id).await.unwrap()), vec!["w-1"]);
    assert_eq!(
        clinic.walkin_queries(),
        vec!["branch-1", "branch-2", "branch-1"]
    );
}

#[tokio::test]
async fn clinic_without_branches_has_no_walkins() {
    let (clinic, service) = setup().await;
    clinic.clear_branches();
    let view = service.open_session(None, None).await.unwrap();

    assert!(service.list_walkins(view.id).await.unwrap().is_empty());
    assert!(clinic.walkin_queries().is_empty());
}

#[tokio::test]
async fn bills_without_selected_branch_use_first_branch() {
    let (clinic, service) = setup().await;
    let view = service.open_session(None, None).await.unwrap();
    assert!(view.branch_id.is_none());

    service.select_patient(view.id, "p-1").await.unwrap();
    act(&service, view.id, BillingAction::AddTreatmentItem).await;
    act(
        &service,
        view.id,
        BillingAction::UpdateTreatmentItem {
            index: 0,
            field: TreatmentField::Treatment("t-1".to_string()),
        },
    )
    .await;

    let report = service.submit(view.id).await.unwrap();
    assert!(report.is_complete());
    let bill = &clinic.submitted_bills()[0];
    assert_eq!(bill.branch_id, "branch-1");
    assert_eq!(bill.branch_name.as_deref(), Some("Anna Nagar"));
}
