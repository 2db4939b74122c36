use thiserror::Error;
use types::Conflict;

use crate::repo::RepositoryError;

/// Typed errors surfaced by the scheduling core. Each variant carries a
/// stable machine code, see [`SchedulingError::code`].
#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("a generation run is already pending or running for term {term}")]
    GenerationInProgress { term: types::TermId },

    #[error("term {term} is neither current nor upcoming")]
    TermNotActive { term: types::TermId },

    #[error("teacher {teacher} is unavailable: {reason}")]
    TeacherUnavailable {
        teacher: types::TeacherId,
        reason: String,
    },

    #[error("room {room} is unavailable: {reason}")]
    RoomUnavailable { room: types::RoomId, reason: String },

    #[error("teacher {teacher} is not authorized to teach subject {subject} to class {class}")]
    InvalidSubjectAssignment {
        teacher: types::TeacherId,
        class: types::ClassId,
        subject: types::SubjectId,
    },

    #[error("{} scheduling conflict(s) detected", conflicts.len())]
    ConstraintViolation { conflicts: Vec<Conflict> },

    #[error("optimization failed: {0}")]
    OptimizationFailed(String),

    #[error("insufficient {resource}: required {required}, available {available}")]
    InsufficientResources {
        resource: String,
        required: usize,
        available: usize,
    },

    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl SchedulingError {
    pub fn code(&self) -> String {
        match self {
            SchedulingError::GenerationInProgress { .. } => "generation_in_progress".into(),
            SchedulingError::TermNotActive { .. } => "term_not_active".into(),
            SchedulingError::TeacherUnavailable { .. } => "teacher_unavailable".into(),
            SchedulingError::RoomUnavailable { .. } => "room_unavailable".into(),
            SchedulingError::InvalidSubjectAssignment { .. } => "invalid_subject_assignment".into(),
            SchedulingError::ConstraintViolation { .. } => "constraint_violation".into(),
            SchedulingError::OptimizationFailed(_) => "optimization_failed".into(),
            SchedulingError::InsufficientResources { resource, .. } => {
                format!("insufficient_{resource}")
            }
            SchedulingError::RateLimitExceeded(_) => "rate_limit_exceeded".into(),
            SchedulingError::Validation(_) | SchedulingError::NotFound { .. } => {
                "validation_error".into()
            }
            SchedulingError::Internal(_) => "internal_error".into(),
        }
    }

    /// Only persistence conflicts are worth resubmitting.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SchedulingError::ConstraintViolation { .. })
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        SchedulingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<RepositoryError> for SchedulingError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound { entity, id } => SchedulingError::NotFound { entity, id },
            RepositoryError::ActiveRun(term) => SchedulingError::GenerationInProgress { term },
            RepositoryError::Validation(msg) => SchedulingError::Validation(msg),
            RepositoryError::Conflict(msg) => SchedulingError::Validation(msg),
            other => SchedulingError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let e = SchedulingError::InsufficientResources {
            resource: "time_slots".into(),
            required: 3,
            available: 0,
        };
        assert_eq!(e.code(), "insufficient_time_slots");
        assert_eq!(
            SchedulingError::not_found("term", 9).code(),
            "validation_error"
        );
        let e: SchedulingError = RepositoryError::ActiveRun(types::TermId(1)).into();
        assert_eq!(e.code(), "generation_in_progress");
        assert!(SchedulingError::ConstraintViolation { conflicts: vec![] }.is_retryable());
    }
}
