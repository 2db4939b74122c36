use chrono::{NaiveDate, NaiveTime};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::{
    AuthorizationId, ClassId, DayOfWeek, GradeId, RoomId, SubjectId, TeacherId, TermId, TimeSlotId,
};

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct Term {
    pub id: TermId,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub is_current: bool,
}

impl Term {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    /// A term accepts new generation runs while it is current or has not started yet.
    pub fn accepts_generation(&self, today: NaiveDate) -> bool {
        self.is_current || self.start_date > today
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct Grade {
    pub id: GradeId,
    pub name: String,
    #[serde(default)]
    pub level: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    pub grade: GradeId,
    pub term: TermId,
    pub student_count: u32,
    #[serde(default)]
    pub class_teacher: Option<TeacherId>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
    pub code: String,
    /// Required periods per week.
    pub credit_hours: u32,
    #[serde(default)]
    pub preferred_room_type: Option<RoomType>,
}

#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Hash, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TeacherStatus {
    #[default]
    Active,
    OnLeave,
    Terminated,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct Teacher {
    pub id: TeacherId,
    pub name: String,
    #[serde(default)]
    pub status: TeacherStatus,
    #[serde(default)]
    pub department: Option<String>,
}

impl Teacher {
    pub fn is_active(&self) -> bool {
        self.status == TeacherStatus::Active
    }
}

/// Declares that a teacher may teach `subject` to `class` during `term`.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct TeacherAssignment {
    pub id: AuthorizationId,
    pub teacher: TeacherId,
    pub class: ClassId,
    pub subject: SubjectId,
    pub term: TermId,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct TimeSlot {
    pub id: TimeSlotId,
    pub day: DayOfWeek,
    pub period: u32,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub duration_minutes: u32,
    #[serde(default)]
    pub is_break: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl TimeSlot {
    pub fn is_schedulable(&self) -> bool {
        self.is_active && !self.is_break
    }

    pub fn span_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.day == other.day && self.start < other.end && other.start < self.end
    }
}

#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Hash, Ord,
    PartialOrd, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    #[default]
    Classroom,
    Laboratory,
    Library,
    Auditorium,
    Gymnasium,
    ComputerLab,
    MusicRoom,
    ArtRoom,
    Conference,
    Outdoor,
}

impl fmt::Display for RoomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoomType::Classroom => "classroom",
            RoomType::Laboratory => "laboratory",
            RoomType::Library => "library",
            RoomType::Auditorium => "auditorium",
            RoomType::Gymnasium => "gymnasium",
            RoomType::ComputerLab => "computer_lab",
            RoomType::MusicRoom => "music_room",
            RoomType::ArtRoom => "art_room",
            RoomType::Conference => "conference",
            RoomType::Outdoor => "outdoor",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct Room {
    pub id: RoomId,
    pub number: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub room_type: RoomType,
    pub capacity: u32,
    #[serde(default = "default_true")]
    pub is_available: bool,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(day: DayOfWeek, period: u32, start: (u32, u32), end: (u32, u32)) -> TimeSlot {
        let start = NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap();
        let end = NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap();
        TimeSlot {
            id: TimeSlotId(period as u64),
            day,
            period,
            start,
            end,
            duration_minutes: (end - start).num_minutes() as u32,
            is_break: false,
            is_active: true,
        }
    }

    #[test]
    fn slot_overlap_is_per_day() {
        let a = slot(DayOfWeek::Mon, 1, (8, 0), (8, 45));
        let b = slot(DayOfWeek::Mon, 2, (8, 30), (9, 15));
        let c = slot(DayOfWeek::Tue, 2, (8, 30), (9, 15));
        let d = slot(DayOfWeek::Mon, 3, (8, 45), (9, 30));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(!a.overlaps(&d));
        assert_eq!(a.span_minutes(), 45);
    }

    #[test]
    fn term_generation_window() {
        let term = Term {
            id: TermId(1),
            name: "T1".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 7, 31).unwrap(),
            is_current: false,
        };
        assert!(term.accepts_generation(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()));
        assert!(!term.accepts_generation(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()));
        assert!(term.contains(NaiveDate::from_ymd_opt(2024, 7, 31).unwrap()));
        assert!(!term.contains(NaiveDate::from_ymd_opt(2024, 8, 1).unwrap()));
    }

    #[test]
    fn room_type_uses_snake_case() {
        let v = serde_json::to_value(RoomType::ComputerLab).unwrap();
        assert_eq!(v, serde_json::json!("computer_lab"));
        assert_eq!(RoomType::ComputerLab.to_string(), "computer_lab");
    }
}
