use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::{
    AssignmentId, ClassId, ConstraintId, DayOfWeek, RoomId, SubjectId, SubstituteId, TeacherId,
    TermId, TimeSlotId, UserId,
};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Hash)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    pub fn single(date: NaiveDate) -> Self {
        Self { from: date, to: date }
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.from <= other.to && other.from <= self.to
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

/// A committed weekly slot.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct ScheduledAssignment {
    pub id: AssignmentId,
    pub class: ClassId,
    pub subject: SubjectId,
    pub teacher: TeacherId,
    pub time_slot: TimeSlotId,
    pub room: Option<RoomId>,
    pub term: TermId,
    pub effective_from: NaiveDate,
    pub effective_to: NaiveDate,
    pub is_active: bool,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledAssignment {
    pub fn range(&self) -> DateRange {
        DateRange::new(self.effective_from, self.effective_to)
    }

    pub fn is_effective_on(&self, date: NaiveDate) -> bool {
        self.is_active && self.range().contains(date)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct NewAssignment {
    pub class: ClassId,
    pub subject: SubjectId,
    pub teacher: TeacherId,
    pub time_slot: TimeSlotId,
    pub room: Option<RoomId>,
    pub term: TermId,
    pub effective_from: NaiveDate,
    pub effective_to: NaiveDate,
    pub created_by: Option<UserId>,
}

/// Flattened view of one placement, with the slot's day and period resolved.
/// This is what the conflict detector and the constraint evaluator work on.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct Session {
    #[serde(default)]
    pub assignment: Option<AssignmentId>,
    #[serde(default)]
    pub required_slot: Option<usize>,
    pub class: ClassId,
    pub subject: SubjectId,
    pub teacher: TeacherId,
    pub time_slot: TimeSlotId,
    pub day: DayOfWeek,
    pub period: u32,
    pub room: Option<RoomId>,
    pub effective_from: NaiveDate,
    pub effective_to: NaiveDate,
}

impl Session {
    pub fn range(&self) -> DateRange {
        DateRange::new(self.effective_from, self.effective_to)
    }
}

#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Hash, Ord,
    PartialOrd,
)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    Teacher,
    Room,
    Class,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConflictKind::Teacher => "teacher",
            ConflictKind::Room => "room",
            ConflictKind::Class => "class",
        })
    }
}

/// One side of a conflict. Probe parties only carry the fields the probe set.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct ConflictParty {
    pub assignment: Option<AssignmentId>,
    pub required_slot: Option<usize>,
    pub class: Option<ClassId>,
    pub subject: Option<SubjectId>,
    pub teacher: Option<TeacherId>,
    pub room: Option<RoomId>,
}

impl From<&Session> for ConflictParty {
    fn from(s: &Session) -> Self {
        Self {
            assignment: s.assignment,
            required_slot: s.required_slot,
            class: Some(s.class),
            subject: Some(s.subject),
            teacher: Some(s.teacher),
            room: s.room,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub time_slot: TimeSlotId,
    pub day: DayOfWeek,
    pub period: u32,
    pub first: ConflictParty,
    pub second: ConflictParty,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct ConflictProbe {
    #[serde(default)]
    pub teacher: Option<TeacherId>,
    #[serde(default)]
    pub room: Option<RoomId>,
    #[serde(default)]
    pub class: Option<ClassId>,
    #[serde(default)]
    pub time_slot: Option<TimeSlotId>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub exclude: Option<AssignmentId>,
}

#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Hash, Ord,
    PartialOrd,
)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    TeacherAvailability,
    RoomRequirement,
    #[serde(alias = "time_preference")]
    SubjectTimePreference,
    ConsecutivePeriods,
    DailyLimit,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConstraintKind::TeacherAvailability => "teacher_availability",
            ConstraintKind::RoomRequirement => "room_requirement",
            ConstraintKind::SubjectTimePreference => "subject_time_preference",
            ConstraintKind::ConsecutivePeriods => "consecutive_periods",
            ConstraintKind::DailyLimit => "daily_limit",
        })
    }
}

/// Catalog record as stored; `parameters` is parsed per kind when loaded.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct SchedulingConstraint {
    pub id: ConstraintId,
    pub name: String,
    pub kind: ConstraintKind,
    pub priority: u8,
    #[serde(default)]
    pub is_hard: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct ConstraintScore {
    pub constraint: ConstraintId,
    pub name: String,
    pub kind: ConstraintKind,
    pub priority: u8,
    pub is_hard: bool,
    pub score: f64,
    pub satisfied: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct ConstraintViolation {
    pub constraint: ConstraintId,
    pub name: String,
    pub kind: ConstraintKind,
    pub score: f64,
}

#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Hash, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[default]
    Genetic,
    Greedy,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Algorithm::Genetic => "genetic",
            Algorithm::Greedy => "greedy",
        })
    }
}

/// An unplaced scheduling unit: one of `credit_hours` copies of an authorization.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq, Eq)]
pub struct RequiredSlot {
    pub index: usize,
    pub class: ClassId,
    pub subject: SubjectId,
    pub teacher: TeacherId,
    pub priority: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct PlacedSlot {
    pub slot: RequiredSlot,
    pub time_slot: TimeSlotId,
    pub day: DayOfWeek,
    pub period: u32,
    pub room: Option<RoomId>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum UnplacedReason {
    NoFeasiblePlacement,
    TeacherInactive,
    /// The run stopped before the slot was tried.
    NotAttempted,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct UnplacedSlot {
    pub slot: RequiredSlot,
    pub reason: UnplacedReason,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Cancelled,
    DeadlineExceeded,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct SchedulingResult {
    pub success: bool,
    pub algorithm: Algorithm,
    pub assigned: Vec<PlacedSlot>,
    pub unassigned: Vec<UnplacedSlot>,
    pub conflicts: Vec<Conflict>,
    pub violations: Vec<ConstraintViolation>,
    pub constraint_score: f64,
    pub optimization_score: f64,
    /// Wall-clock seconds; the only field not reproduced by a seeded rerun.
    pub execution_time: f64,
    pub generations_run: usize,
    pub stopped: Option<StopReason>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct SubstituteAssignment {
    pub id: SubstituteId,
    pub original: AssignmentId,
    pub substitute: TeacherId,
    pub date: NaiveDate,
    pub reason: String,
    #[serde(default)]
    pub notes: String,
    pub approver: Option<UserId>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct NewSubstitute {
    pub original: AssignmentId,
    pub substitute: TeacherId,
    pub date: NaiveDate,
    pub reason: String,
    #[serde(default)]
    pub notes: String,
    pub created_by: Option<UserId>,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn date_ranges_overlap_inclusively() {
        let a = DateRange::new(d(2024, 4, 1), d(2024, 4, 30));
        let b = DateRange::new(d(2024, 4, 30), d(2024, 5, 10));
        let c = DateRange::new(d(2024, 5, 1), d(2024, 5, 10));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
        assert!(DateRange::single(d(2024, 4, 8)).overlaps(&a));
    }

    #[test]
    fn legacy_time_preference_kind_is_accepted() {
        let k: ConstraintKind = serde_json::from_str("\"time_preference\"").unwrap();
        assert_eq!(k, ConstraintKind::SubjectTimePreference);
        let k: ConstraintKind = serde_json::from_str("\"daily_limit\"").unwrap();
        assert_eq!(k, ConstraintKind::DailyLimit);
    }
}
