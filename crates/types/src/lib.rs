use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

mod entities;
mod runs;
mod schedule;

pub use entities::*;
pub use runs::*;
pub use schedule::*;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Hash,
            Ord, PartialOrd,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}
id_newtype!(TermId);
id_newtype!(GradeId);
id_newtype!(ClassId);
id_newtype!(SubjectId);
id_newtype!(TeacherId);
id_newtype!(AuthorizationId);
id_newtype!(TimeSlotId);
id_newtype!(RoomId);
id_newtype!(AssignmentId);
id_newtype!(ConstraintId);
id_newtype!(SubstituteId);
id_newtype!(UserId);

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Hash)]
#[serde(transparent)]
pub struct RunId(pub uuid::Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Hash, Ord,
    PartialOrd,
)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Mon,
        DayOfWeek::Tue,
        DayOfWeek::Wed,
        DayOfWeek::Thu,
        DayOfWeek::Fri,
        DayOfWeek::Sat,
        DayOfWeek::Sun,
    ];

    /// Monday is 0, Sunday is 6.
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(idx: u8) -> Option<Self> {
        Self::ALL.get(idx as usize).copied()
    }

    pub fn from_date(date: chrono::NaiveDate) -> Self {
        use chrono::Datelike;
        Self::ALL[date.weekday().num_days_from_monday() as usize]
    }

    pub fn name(self) -> &'static str {
        match self {
            DayOfWeek::Mon => "Monday",
            DayOfWeek::Tue => "Tuesday",
            DayOfWeek::Wed => "Wednesday",
            DayOfWeek::Thu => "Thursday",
            DayOfWeek::Fri => "Friday",
            DayOfWeek::Sat => "Saturday",
            DayOfWeek::Sun => "Sunday",
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn day_index_roundtrip() {
        for d in DayOfWeek::ALL {
            assert_eq!(DayOfWeek::from_index(d.index()), Some(d));
        }
        assert_eq!(DayOfWeek::from_index(7), None);
    }

    #[test]
    fn day_from_date() {
        let monday = NaiveDate::from_ymd_opt(2024, 4, 8).unwrap();
        assert_eq!(DayOfWeek::from_date(monday), DayOfWeek::Mon);
        assert_eq!(DayOfWeek::from_date(monday.succ_opt().unwrap()), DayOfWeek::Tue);
    }

    #[test]
    fn ids_serialize_as_plain_numbers() {
        let v = serde_json::to_value(TeacherId(7)).unwrap();
        assert_eq!(v, serde_json::json!(7));
        let back: ClassId = serde_json::from_value(serde_json::json!(3)).unwrap();
        assert_eq!(back, ClassId(3));
    }
}
