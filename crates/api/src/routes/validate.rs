use axum::{
    extract::{Path, State},
    Json,
};
use sched_core::constraints::parameter_schemas;
use sched_core::repo::CatalogRepository;
use sched_core::validate;
use serde::Serialize;
use types::TermId;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize, utoipa::ToSchema)]
pub struct ValidationReport {
    pub ok: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/v1/terms/{id}/catalog/validation",
    params(("id" = u64, Path, description = "Term ID")),
    responses(
        (
            status = 200,
            description = "Catalog invariants the scheduler relies on",
            body = ValidationReport
        )
    )
)]
pub async fn validate_catalog(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ValidationReport>, ApiError> {
    let repo = state.timetables.repo();
    let term = repo.term(TermId(id)).await?;
    let slots = repo.time_slots(false).await?;
    let rooms = repo.rooms(false).await?;
    let constraints = repo.constraints(false).await?;
    Ok(Json(match validate(&term, &slots, &rooms, &constraints) {
        Ok(()) => ValidationReport { ok: true, errors: vec![] },
        Err(e) => ValidationReport { ok: false, errors: e.messages() },
    }))
}

#[utoipa::path(
    get,
    path = "/v1/schema/constraints",
    responses((status = 200, description = "JSON Schema of each constraint kind's parameters"))
)]
pub async fn constraint_schemas() -> Json<serde_json::Value> {
    Json(parameter_schemas())
}
