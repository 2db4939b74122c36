//! Typed scheduling constraints.
//!
//! The repository stores a free-form parameter object per constraint; it is
//! parsed into one of the records below when the catalog is loaded and the
//! whole load fails if any active constraint is malformed.

use std::collections::{BTreeMap, BTreeSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use types::{
    ConstraintId, ConstraintKind, DayOfWeek, RoomType, SchedulingConstraint, SubjectId, TeacherId,
};

use crate::config::RulesConfig;
use crate::error::SchedulingError;

#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct DayPeriod {
    pub day: DayOfWeek,
    pub period: u32,
}

/// When a teacher may be scheduled. Empty `days`/`periods` leave that axis
/// unrestricted; a non-empty `slots` list replaces both.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TeacherWindow {
    pub teacher: TeacherId,
    #[serde(default)]
    pub days: Vec<DayOfWeek>,
    #[serde(default)]
    pub periods: Vec<u32>,
    #[serde(default)]
    pub slots: Vec<DayPeriod>,
}

impl TeacherWindow {
    pub fn allows(&self, day: DayOfWeek, period: u32) -> bool {
        if !self.slots.is_empty() {
            return self.slots.contains(&DayPeriod { day, period });
        }
        (self.days.is_empty() || self.days.contains(&day))
            && (self.periods.is_empty() || self.periods.contains(&period))
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TeacherAvailabilityParams {
    pub teachers: Vec<TeacherWindow>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SubjectRooms {
    pub subject: SubjectId,
    pub room_types: Vec<RoomType>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RoomRequirementParams {
    pub subjects: Vec<SubjectRooms>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SubjectBand {
    pub subject: SubjectId,
    #[serde(default = "first_period")]
    pub min_period: u32,
    /// Defaults to the configured last morning period.
    #[serde(default)]
    pub max_period: Option<u32>,
}

/// Preferred period bands. With no subjects listed, every high-priority
/// subject (priority 8 and up) prefers the morning band.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SubjectTimePreferenceParams {
    #[serde(default)]
    pub subjects: Vec<SubjectBand>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SubjectRun {
    pub subject: SubjectId,
    #[serde(default = "first_period")]
    pub min: u32,
    #[serde(default = "two")]
    pub max: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConsecutivePeriodsParams {
    pub subjects: Vec<SubjectRun>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SubjectLimit {
    pub subject: SubjectId,
    pub max_per_day: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DailyLimitParams {
    /// Per class, subject and day. Defaults to the configured limit.
    #[serde(default)]
    pub max_per_day: Option<u32>,
    #[serde(default)]
    pub exceptions: Vec<SubjectLimit>,
}

fn first_period() -> u32 {
    1
}
fn two() -> u32 {
    2
}

/// Parsed parameters, tagged by kind.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstraintRule {
    TeacherAvailability(BTreeMap<TeacherId, Vec<TeacherWindow>>),
    RoomRequirement(BTreeMap<SubjectId, Vec<RoomType>>),
    SubjectTimePreference {
        bands: BTreeMap<SubjectId, (u32, u32)>,
        /// Band used for high-priority subjects when `bands` is empty.
        morning: (u32, u32),
    },
    ConsecutivePeriods(BTreeMap<SubjectId, (u32, u32)>),
    DailyLimit {
        default: u32,
        exceptions: BTreeMap<SubjectId, u32>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedConstraint {
    pub id: ConstraintId,
    pub name: String,
    pub kind: ConstraintKind,
    pub priority: u8,
    pub is_hard: bool,
    pub rule: ConstraintRule,
}

impl ParsedConstraint {
    pub fn parse(c: &SchedulingConstraint, rules: &RulesConfig) -> Result<Self, SchedulingError> {
        if !(1..=10).contains(&c.priority) {
            return Err(malformed(c, format!("priority {} outside 1..=10", c.priority)));
        }
        let rule = match c.kind {
            ConstraintKind::TeacherAvailability => {
                let p: TeacherAvailabilityParams = params(c)?;
                let mut map: BTreeMap<TeacherId, Vec<TeacherWindow>> = BTreeMap::new();
                for w in p.teachers {
                    if w.periods.contains(&0) || w.slots.iter().any(|s| s.period == 0) {
                        return Err(malformed(c, "periods start at 1".into()));
                    }
                    map.entry(w.teacher).or_default().push(w);
                }
                ConstraintRule::TeacherAvailability(map)
            }
            ConstraintKind::RoomRequirement => {
                let p: RoomRequirementParams = params(c)?;
                let mut map: BTreeMap<SubjectId, Vec<RoomType>> = BTreeMap::new();
                for s in p.subjects {
                    if s.room_types.is_empty() {
                        let reason = format!("subject {} lists no room types", s.subject);
                        return Err(malformed(c, reason));
                    }
                    let entry = map.entry(s.subject).or_default();
                    for t in s.room_types {
                        if !entry.contains(&t) {
                            entry.push(t);
                        }
                    }
                }
                ConstraintRule::RoomRequirement(map)
            }
            ConstraintKind::SubjectTimePreference => {
                let p: SubjectTimePreferenceParams = params(c)?;
                let mut bands = BTreeMap::new();
                for b in p.subjects {
                    let max = b.max_period.unwrap_or(rules.morning_last_period);
                    if b.min_period == 0 || b.min_period > max {
                        return Err(malformed(
                            c,
                            format!("band {}..={} for subject {}", b.min_period, max, b.subject),
                        ));
                    }
                    bands.insert(b.subject, (b.min_period, max));
                }
                ConstraintRule::SubjectTimePreference {
                    bands,
                    morning: (1, rules.morning_last_period),
                }
            }
            ConstraintKind::ConsecutivePeriods => {
                let p: ConsecutivePeriodsParams = params(c)?;
                let mut map = BTreeMap::new();
                for r in p.subjects {
                    if r.min == 0 || r.min > r.max {
                        return Err(malformed(
                            c,
                            format!("run length {}..={} for subject {}", r.min, r.max, r.subject),
                        ));
                    }
                    map.insert(r.subject, (r.min, r.max));
                }
                ConstraintRule::ConsecutivePeriods(map)
            }
            ConstraintKind::DailyLimit => {
                let p: DailyLimitParams = params(c)?;
                let default = p.max_per_day.unwrap_or(rules.default_daily_limit);
                if default == 0 {
                    return Err(malformed(c, "max_per_day must be >= 1".into()));
                }
                let exceptions = p
                    .exceptions
                    .into_iter()
                    .map(|e| (e.subject, e.max_per_day))
                    .collect();
                ConstraintRule::DailyLimit {
                    default,
                    exceptions,
                }
            }
        };
        Ok(Self {
            id: c.id,
            name: c.name.clone(),
            kind: c.kind,
            priority: c.priority,
            is_hard: c.is_hard,
            rule,
        })
    }
}

fn params<T: serde::de::DeserializeOwned + Default>(
    c: &SchedulingConstraint,
) -> Result<T, SchedulingError> {
    if c.parameters.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(c.parameters.clone()).map_err(|e| malformed(c, e.to_string()))
}

fn malformed(c: &SchedulingConstraint, msg: String) -> SchedulingError {
    SchedulingError::Validation(format!(
        "constraint {} ({}) has malformed {} parameters: {}",
        c.id, c.name, c.kind, msg
    ))
}

/// The active constraint catalog for one run, ordered by id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstraintSet {
    constraints: Vec<ParsedConstraint>,
}

impl ConstraintSet {
    /// Parses every active record; inactive ones are skipped.
    pub fn from_records(
        records: &[SchedulingConstraint],
        rules: &RulesConfig,
    ) -> Result<Self, SchedulingError> {
        let mut constraints = records
            .iter()
            .filter(|c| c.is_active)
            .map(|c| ParsedConstraint::parse(c, rules))
            .collect::<Result<Vec<_>, _>>()?;
        constraints.sort_by_key(|c| c.id);
        Ok(Self { constraints })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParsedConstraint> {
        self.constraints.iter()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    fn hard(&self) -> impl Iterator<Item = &ParsedConstraint> {
        self.constraints.iter().filter(|c| c.is_hard)
    }

    /// Room types named for `subject` by any room requirement, in catalog order.
    pub fn required_room_types(&self, subject: SubjectId) -> Vec<RoomType> {
        let mut out = Vec::new();
        for c in &self.constraints {
            if let ConstraintRule::RoomRequirement(map) = &c.rule {
                for t in map.get(&subject).into_iter().flatten() {
                    if !out.contains(t) {
                        out.push(*t);
                    }
                }
            }
        }
        out
    }

    /// Room types a hard requirement restricts `subject` to. A room must be of
    /// a type every hard requirement accepts.
    pub fn hard_room_types(&self, subject: SubjectId) -> Option<BTreeSet<RoomType>> {
        let mut allowed: Option<BTreeSet<RoomType>> = None;
        for c in self.hard() {
            if let ConstraintRule::RoomRequirement(map) = &c.rule {
                if let Some(list) = map.get(&subject) {
                    let set: BTreeSet<RoomType> = list.iter().copied().collect();
                    allowed = Some(match allowed {
                        None => set,
                        Some(prev) => prev.intersection(&set).copied().collect(),
                    });
                }
            }
        }
        allowed
    }

    pub fn hard_allows_teacher(&self, teacher: TeacherId, day: DayOfWeek, period: u32) -> bool {
        self.hard().all(|c| match &c.rule {
            ConstraintRule::TeacherAvailability(map) => map
                .get(&teacher)
                .map_or(true, |ws| ws.iter().any(|w| w.allows(day, period))),
            _ => true,
        })
    }

    pub fn hard_allows_period(&self, subject: SubjectId, priority: u8, period: u32) -> bool {
        self.hard().all(|c| match &c.rule {
            ConstraintRule::SubjectTimePreference { .. } => {
                match c.rule.band_for(subject, priority) {
                    Some((lo, hi)) => lo <= period && period <= hi,
                    None => true,
                }
            }
            _ => true,
        })
    }

    /// Tightest hard per-day cap for a subject within one class.
    pub fn hard_daily_limit(&self, subject: SubjectId) -> Option<u32> {
        self.hard()
            .filter_map(|c| match &c.rule {
                ConstraintRule::DailyLimit { default, exceptions } => {
                    Some(*exceptions.get(&subject).unwrap_or(default))
                }
                _ => None,
            })
            .min()
    }
}

impl ConstraintRule {
    /// Preferred period band for a subject under a time-preference rule.
    pub fn band_for(&self, subject: SubjectId, priority: u8) -> Option<(u32, u32)> {
        match self {
            ConstraintRule::SubjectTimePreference { bands, morning } => {
                if bands.is_empty() {
                    (priority >= 8).then_some(*morning)
                } else {
                    bands.get(&subject).copied()
                }
            }
            _ => None,
        }
    }
}

/// JSON Schema of each kind's parameter object, keyed by kind name.
pub fn parameter_schemas() -> serde_json::Value {
    let mut out = serde_json::Map::new();
    let entries = [
        (
            ConstraintKind::TeacherAvailability,
            schemars::schema_for!(TeacherAvailabilityParams),
        ),
        (
            ConstraintKind::RoomRequirement,
            schemars::schema_for!(RoomRequirementParams),
        ),
        (
            ConstraintKind::SubjectTimePreference,
            schemars::schema_for!(SubjectTimePreferenceParams),
        ),
        (
            ConstraintKind::ConsecutivePeriods,
            schemars::schema_for!(ConsecutivePeriodsParams),
        ),
        (ConstraintKind::DailyLimit, schemars::schema_for!(DailyLimitParams)),
    ];
    for (kind, schema) in entries {
        out.insert(
            kind.to_string(),
            serde_json::to_value(schema).unwrap_or(serde_json::Value::Null),
        );
    }
    serde_json::Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(
        id: u64,
        kind: ConstraintKind,
        is_hard: bool,
        parameters: serde_json::Value,
    ) -> SchedulingConstraint {
        SchedulingConstraint {
            id: ConstraintId(id),
            name: format!("c{id}"),
            kind,
            priority: 5,
            is_hard,
            is_active: true,
            parameters,
        }
    }

    #[test]
    fn parses_every_kind() {
        let rules = RulesConfig::default();
        let records = vec![
            record(
                1,
                ConstraintKind::TeacherAvailability,
                true,
                json!({"teachers": [{"teacher": 1, "days": ["mon"], "periods": [1, 2]}]}),
            ),
            record(
                2,
                ConstraintKind::RoomRequirement,
                true,
                json!({"subjects": [{"subject": 3, "room_types": ["laboratory"]}]}),
            ),
            record(3, ConstraintKind::SubjectTimePreference, false, json!({})),
            record(
                4,
                ConstraintKind::ConsecutivePeriods,
                false,
                json!({"subjects": [{"subject": 3, "min": 2, "max": 2}]}),
            ),
            record(5, ConstraintKind::DailyLimit, true, serde_json::Value::Null),
        ];
        let set = ConstraintSet::from_records(&records, &rules).unwrap();
        assert_eq!(set.len(), 5);
        assert!(set.hard_allows_teacher(TeacherId(1), DayOfWeek::Mon, 2));
        assert!(!set.hard_allows_teacher(TeacherId(1), DayOfWeek::Tue, 2));
        assert!(set.hard_allows_teacher(TeacherId(2), DayOfWeek::Tue, 6));
        assert_eq!(
            set.hard_room_types(SubjectId(3)),
            Some([RoomType::Laboratory].into_iter().collect())
        );
        assert_eq!(set.hard_room_types(SubjectId(4)), None);
        assert_eq!(set.hard_daily_limit(SubjectId(9)), Some(2));
    }

    #[test]
    fn malformed_parameters_are_rejected() {
        let rules = RulesConfig::default();
        let bad = record(1, ConstraintKind::RoomRequirement, false, json!({"subjects": "lab"}));
        let err = ConstraintSet::from_records(&[bad], &rules).unwrap_err();
        assert_eq!(err.code(), "validation_error");

        let inverted = record(
            2,
            ConstraintKind::ConsecutivePeriods,
            false,
            json!({"subjects": [{"subject": 1, "min": 3, "max": 2}]}),
        );
        assert!(ConstraintSet::from_records(&[inverted], &rules).is_err());

        let mut out_of_range = record(3, ConstraintKind::DailyLimit, false, json!({}));
        out_of_range.priority = 11;
        assert!(ConstraintSet::from_records(&[out_of_range], &rules).is_err());
    }

    #[test]
    fn inactive_records_are_skipped() {
        let mut c = record(1, ConstraintKind::RoomRequirement, false, json!({"bogus": true}));
        c.is_active = false;
        let set = ConstraintSet::from_records(&[c], &RulesConfig::default()).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn default_time_band_covers_high_priority_subjects() {
        let rules = RulesConfig::default();
        let c = ParsedConstraint::parse(
            &record(1, ConstraintKind::SubjectTimePreference, true, json!({})),
            &rules,
        )
        .unwrap();
        assert_eq!(c.rule.band_for(SubjectId(1), 9), Some((1, 3)));
        assert_eq!(c.rule.band_for(SubjectId(1), 5), None);
    }

    #[test]
    fn schemas_cover_all_kinds() {
        let v = parameter_schemas();
        for k in [
            "teacher_availability",
            "room_requirement",
            "subject_time_preference",
            "consecutive_periods",
            "daily_limit",
        ] {
            assert!(v.get(k).is_some(), "missing {k}");
        }
    }
}
