//! Billing session endpoints.
//!
//! Identity comes from the forwarded BFF headers; the caller's role decides
//! which edits are allowed.

use super::patients::SearchParams;
use crate::models::{BillingMode, Doctor, MedicineStock, Walkin};
use crate::services::{ActionResponse, BillingAction, Capabilities, SessionView, SubmissionReport};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use service_core::context::RequestContext;
use service_core::error::AppError;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct OpenSessionRequest {
    #[serde(default)]
    pub mode: Option<BillingMode>,
    #[serde(default)]
    pub branch_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SelectBranchRequest {
    #[serde(default)]
    pub branch_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SelectPatientRequest {
    pub patient_id: String,
}

fn capabilities_of(context: &RequestContext) -> Capabilities {
    Capabilities::for_role_name(&context.role)
}

pub async fn open_session(
    State(state): State<AppState>,
    context: RequestContext,
    payload: Option<Json<OpenSessionRequest>>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let branch_id = request.branch_id.or(context.branch_id);

    let view = state.billing.open_session(request.mode, branch_id).await?;
    tracing::info!(user_id = %context.user_id, session_id = %view.id, "Session opened by user");
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(state.billing.get_session(id).await?))
}

pub async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.billing.close_session(id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn apply_action(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    context: RequestContext,
    Json(action): Json<BillingAction>,
) -> Result<Json<ActionResponse>, AppError> {
    let response = state
        .billing
        .apply(id, action, &capabilities_of(&context))
        .await?;
    Ok(Json(response))
}

pub async fn select_branch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SelectBranchRequest>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(state.billing.select_branch(id, payload.branch_id).await?))
}

pub async fn select_patient(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SelectPatientRequest>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(
        state
            .billing
            .select_patient(id, payload.patient_id.trim())
            .await?,
    ))
}

pub async fn search_medicines(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<MedicineStock>>, AppError> {
    Ok(Json(state.billing.search_medicines(id, &params.q).await?))
}

pub async fn list_doctors(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Doctor>>, AppError> {
    Ok(Json(state.billing.list_doctors(id).await?))
}

/// Walk-ins waiting to be billed in the session's branch.
pub async fn list_walkins(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Walkin>>, AppError> {
    Ok(Json(state.billing.list_walkins(id).await?))
}

/// 201 when everything was saved, 207 when one half failed.
pub async fn submit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<SubmissionReport>), AppError> {
    let report = state.billing.submit(id).await?;
    let status = if report.is_complete() {
        StatusCode::CREATED
    } else {
        StatusCode::MULTI_STATUS
    };
    Ok((status, Json(report)))
}

pub async fn save_temporary_bill(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    context: RequestContext,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    let view = state
        .billing
        .save_temporary_bill(id, &capabilities_of(&context))
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn delete_pending_bill(
    State(state): State<AppState>,
    Path((id, bill_id)): Path<(Uuid, String)>,
    context: RequestContext,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(
        state
            .billing
            .delete_pending_bill(id, &bill_id, &capabilities_of(&context))
            .await?,
    ))
}
