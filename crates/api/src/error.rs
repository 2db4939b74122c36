use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sched_core::{RepositoryError, SchedulingError};
use serde::Serialize;
use utoipa::ToSchema;

/// Body of every non-2xx response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct ApiError(pub SchedulingError);

impl From<SchedulingError> for ApiError {
    fn from(e: SchedulingError) -> Self {
        ApiError(e)
    }
}

impl From<RepositoryError> for ApiError {
    fn from(e: RepositoryError) -> Self {
        ApiError(e.into())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            SchedulingError::GenerationInProgress { .. } => StatusCode::LOCKED,
            SchedulingError::ConstraintViolation { .. }
            | SchedulingError::TeacherUnavailable { .. }
            | SchedulingError::RoomUnavailable { .. } => StatusCode::CONFLICT,
            SchedulingError::OptimizationFailed(_)
            | SchedulingError::InsufficientResources { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            SchedulingError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            SchedulingError::NotFound { .. } => StatusCode::NOT_FOUND,
            SchedulingError::TermNotActive { .. }
            | SchedulingError::InvalidSubjectAssignment { .. }
            | SchedulingError::Validation(_) => StatusCode::BAD_REQUEST,
            SchedulingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        let details = match &self.0 {
            SchedulingError::ConstraintViolation { conflicts } => {
                serde_json::to_value(conflicts).ok()
            }
            SchedulingError::NotFound { entity, id } => {
                Some(serde_json::json!({ "entity": entity, "id": id }))
            }
            _ => None,
        };
        ErrorBody {
            code: self.0.code(),
            message: self.0.to_string(),
            details,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = %self.0.code(), error = %self.0, "request failed");
        }
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{RunId, TermId};

    #[test]
    fn codes_map_to_statuses() {
        let cases = [
            (SchedulingError::GenerationInProgress { term: TermId(1) }, 423),
            (SchedulingError::ConstraintViolation { conflicts: vec![] }, 409),
            (SchedulingError::OptimizationFailed("x".into()), 422),
            (SchedulingError::RateLimitExceeded("x".into()), 429),
            (SchedulingError::not_found("run", RunId::new().0), 404),
            (SchedulingError::Validation("x".into()), 400),
            (SchedulingError::Internal("x".into()), 500),
        ];
        for (e, status) in cases {
            assert_eq!(ApiError(e).status().as_u16(), status);
        }
    }

    #[test]
    fn missing_entities_carry_details() {
        let body = ApiError(SchedulingError::not_found("term", 7)).body();
        assert_eq!(body.code, "validation_error");
        assert_eq!(body.details, Some(serde_json::json!({"entity": "term", "id": "7"})));
    }
}
