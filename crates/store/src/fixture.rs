use std::path::Path;

use sched_core::CatalogParts;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use types::{
    Class, Grade, Room, ScheduledAssignment, SchedulingConstraint, Subject, SubstituteAssignment,
    Teacher, TeacherAssignment, Term, TimeSlot,
};

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to read fixture {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid fixture JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// JSON snapshot of the entities owned by the surrounding CRUD modules,
/// optionally with a committed schedule and substitutes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub terms: Vec<Term>,
    pub grades: Vec<Grade>,
    pub classes: Vec<Class>,
    pub subjects: Vec<Subject>,
    pub teachers: Vec<Teacher>,
    pub authorizations: Vec<TeacherAssignment>,
    pub time_slots: Vec<TimeSlot>,
    pub rooms: Vec<Room>,
    pub constraints: Vec<SchedulingConstraint>,
    pub assignments: Vec<ScheduledAssignment>,
    pub substitutes: Vec<SubstituteAssignment>,
}

impl Fixture {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(s: &str) -> Result<Self, FixtureError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Fixture for a single term built from catalog parts. Grades are named
    /// after their id.
    pub fn from_parts(term: Term, parts: CatalogParts) -> Self {
        let mut grades: Vec<Grade> = parts
            .classes
            .iter()
            .map(|c| c.grade)
            .chain(parts.grades.iter().copied())
            .map(|id| Grade {
                id,
                name: format!("Grade {id}"),
                level: u8::try_from(id.0).unwrap_or(u8::MAX),
            })
            .collect();
        grades.sort_by_key(|g| g.id);
        grades.dedup_by_key(|g| g.id);
        Self {
            terms: vec![term],
            grades,
            classes: parts.classes,
            subjects: parts.subjects,
            teachers: parts.teachers,
            authorizations: parts.authorizations,
            time_slots: parts.time_slots,
            rooms: parts.rooms,
            constraints: parts.constraints,
            assignments: Vec::new(),
            substitutes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sched_core::testing;

    #[test]
    fn missing_sections_default_to_empty() {
        let f = Fixture::from_json_str(r#"{"terms": []}"#).unwrap();
        assert!(f.rooms.is_empty());
        assert!(f.assignments.is_empty());
    }

    #[test]
    fn parts_produce_one_grade_per_id() {
        let (term, parts) = testing::small_school();
        let f = Fixture::from_parts(term, parts);
        assert_eq!(f.grades.len(), 1);
        assert_eq!(f.grades[0].name, "Grade 1");
    }

    #[test]
    fn unreadable_file_reports_path() {
        let err = Fixture::load("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }

    #[test]
    fn bundled_sample_school_is_consistent() {
        let f = Fixture::from_json_str(include_str!("../../../data/sample_school.json")).unwrap();
        assert_eq!(f.terms.len(), 1);
        sched_core::validate(&f.terms[0], &f.time_slots, &f.rooms, &f.constraints).unwrap();
        let rules = sched_core::config::RulesConfig::default();
        sched_core::constraints::ConstraintSet::from_records(&f.constraints, &rules).unwrap();
    }
}
