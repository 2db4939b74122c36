use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::{Algorithm, GradeId, RunId, Session, TermId, UserId};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled)
    }

    /// Pending and running runs hold the term.
    pub fn is_active(self) -> bool {
        matches!(self, RunStatus::Pending | RunStatus::Running)
    }

    pub fn can_transition_to(self, next: RunStatus) -> bool {
        use RunStatus::*;
        match (self, next) {
            (a, b) if a == b => true,
            (Pending, Running | Cancelled | Failed) => true,
            (Running, Completed | Failed | Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        })
    }
}

/// Optimizer knobs. Missing fields fall back to the genetic defaults.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct GenerationParams {
    #[serde(default = "default_population")]
    pub population_size: usize,
    #[serde(default = "default_generations")]
    pub generations: usize,
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,
    #[serde(default)]
    pub seed: u64,
    /// Tightens the run's wall-clock budget; never extends the configured maximum.
    #[serde(default)]
    pub time_limit_secs: Option<u64>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            population_size: default_population(),
            generations: default_generations(),
            mutation_rate: default_mutation_rate(),
            seed: 0,
            time_limit_secs: None,
        }
    }
}

fn default_population() -> usize {
    50
}
fn default_generations() -> usize {
    100
}
fn default_mutation_rate() -> f64 {
    0.1
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct RunSummary {
    pub assigned: usize,
    pub unassigned: usize,
    pub conflicts: usize,
    pub hard_violations: usize,
    pub success: bool,
    /// Assignments written by the persistence step; zero when nothing was saved.
    pub created: usize,
    pub removed: usize,
    pub constraint_score: f64,
    pub generations_run: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct GenerationRun {
    pub id: RunId,
    pub term: TermId,
    pub grades: Vec<GradeId>,
    pub algorithm: Algorithm,
    pub params: GenerationParams,
    pub status: RunStatus,
    pub optimization_score: Option<f64>,
    pub execution_time: Option<f64>,
    pub conflicts_resolved: usize,
    pub result_summary: Option<RunSummary>,
    /// Placements of the best individual of a run that ended without
    /// committing (cancelled or failed). Never written to the schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best: Option<Vec<Session>>,
    pub error_message: Option<String>,
    pub started_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deadline: DateTime<Utc>,
}

impl GenerationRun {
    pub fn new(
        req: GenerationRequest,
        started_by: Option<UserId>,
        now: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RunId::new(),
            term: req.term,
            grades: req.grades,
            algorithm: req.algorithm,
            params: req.params,
            status: RunStatus::Pending,
            optimization_score: None,
            execution_time: None,
            conflicts_resolved: 0,
            result_summary: None,
            best: None,
            error_message: None,
            started_by,
            created_at: now,
            started_at: None,
            completed_at: None,
            deadline,
        }
    }

    /// True when only the mutable bookkeeping fields differ.
    pub fn same_identity(&self, other: &GenerationRun) -> bool {
        self.id == other.id
            && self.term == other.term
            && self.grades == other.grades
            && self.algorithm == other.algorithm
            && self.params == other.params
            && self.started_by == other.started_by
            && self.created_at == other.created_at
            && self.deadline == other.deadline
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct GenerationRequest {
    pub term: TermId,
    pub grades: Vec<GradeId>,
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default)]
    pub params: GenerationParams,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_is_monotonic() {
        use RunStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Running.can_transition_to(Completed));
        assert!(!Running.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Cancelled.can_transition_to(Completed));
        assert!(Failed.can_transition_to(Failed));
        assert!(Running.is_active() && !Running.is_terminal());
    }

    #[test]
    fn params_fill_defaults() {
        let p: GenerationParams = serde_json::from_str(r#"{"seed": 7}"#).unwrap();
        assert_eq!(p.population_size, 50);
        assert_eq!(p.generations, 100);
        assert_eq!(p.seed, 7);
        assert!((p.mutation_rate - 0.1).abs() < 1e-12);
    }
}
