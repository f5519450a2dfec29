use crate::models::{NewPatient, Patient};
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

pub async fn search_patients(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Patient>>, AppError> {
    let patients = state.billing.search_patients(&params.q).await?;
    Ok(Json(patients))
}

pub async fn create_patient(
    State(state): State<AppState>,
    Json(payload): Json<NewPatient>,
) -> Result<(StatusCode, Json<Patient>), AppError> {
    let patient = state.billing.create_patient(payload).await?;
    Ok((StatusCode::CREATED, Json(patient)))
}
