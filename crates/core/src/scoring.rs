use std::collections::BTreeMap;

use types::{
    ClassId, ConstraintScore, ConstraintViolation, DayOfWeek, Session, SubjectId,
};

use crate::catalog::Catalog;
use crate::constraints::{ConstraintRule, ParsedConstraint};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Evaluation {
    /// Priority-weighted mean of the per-constraint scores, in [0, 1].
    pub score: f64,
    pub breakdown: Vec<ConstraintScore>,
}

impl Evaluation {
    pub fn hard_violations(&self) -> Vec<ConstraintViolation> {
        self.breakdown
            .iter()
            .filter(|c| c.is_hard && !c.satisfied)
            .map(|c| ConstraintViolation {
                constraint: c.constraint,
                name: c.name.clone(),
                kind: c.kind,
                score: c.score,
            })
            .collect()
    }

    pub fn hard_satisfied(&self) -> bool {
        self.breakdown.iter().all(|c| !c.is_hard || c.satisfied)
    }
}

/// Scores `sessions` against the catalog's constraints.
///
/// Every rule is computed from order-independent counts, so permuting the
/// input leaves the result unchanged. An empty catalog scores 1.0.
pub fn evaluate(catalog: &Catalog, sessions: &[Session]) -> Evaluation {
    let mut breakdown = Vec::with_capacity(catalog.constraints.len());
    let mut weighted = 0.0;
    let mut weights = 0.0;
    for c in catalog.constraints.iter() {
        let score = score_rule(catalog, c, sessions);
        weighted += f64::from(c.priority) * score;
        weights += f64::from(c.priority);
        breakdown.push(ConstraintScore {
            constraint: c.id,
            name: c.name.clone(),
            kind: c.kind,
            priority: c.priority,
            is_hard: c.is_hard,
            score,
            satisfied: score >= 1.0,
        });
    }
    let score = if weights > 0.0 { weighted / weights } else { 1.0 };
    Evaluation {
        score: score.clamp(0.0, 1.0),
        breakdown,
    }
}

fn ratio(ok: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        ok as f64 / total as f64
    }
}

fn score_rule(catalog: &Catalog, c: &ParsedConstraint, sessions: &[Session]) -> f64 {
    match &c.rule {
        ConstraintRule::TeacherAvailability(windows) => {
            let (mut ok, mut total) = (0, 0);
            for s in sessions {
                if let Some(ws) = windows.get(&s.teacher) {
                    total += 1;
                    if ws.iter().any(|w| w.allows(s.day, s.period)) {
                        ok += 1;
                    }
                }
            }
            ratio(ok, total)
        }
        ConstraintRule::RoomRequirement(required) => {
            let (mut ok, mut total) = (0, 0);
            for s in sessions {
                if let Some(accepted) = required.get(&s.subject) {
                    total += 1;
                    let room_type = s.room.and_then(|r| catalog.room_type(r));
                    if room_type.is_some_and(|t| accepted.contains(&t)) {
                        ok += 1;
                    }
                }
            }
            ratio(ok, total)
        }
        ConstraintRule::SubjectTimePreference { .. } => {
            let (mut ok, mut total) = (0, 0);
            for s in sessions {
                let priority = catalog.subject_priority(s.subject);
                if let Some((lo, hi)) = c.rule.band_for(s.subject, priority) {
                    total += 1;
                    if lo <= s.period && s.period <= hi {
                        ok += 1;
                    }
                }
            }
            ratio(ok, total)
        }
        ConstraintRule::ConsecutivePeriods(bands) => {
            let mut periods: BTreeMap<(ClassId, DayOfWeek, SubjectId), Vec<u32>> = BTreeMap::new();
            for s in sessions.iter().filter(|s| bands.contains_key(&s.subject)) {
                periods.entry((s.class, s.day, s.subject)).or_default().push(s.period);
            }
            let (mut ok, mut total) = (0, 0);
            for ((_, _, subject), mut ps) in periods {
                let Some(&(lo, hi)) = bands.get(&subject) else {
                    continue;
                };
                ps.sort_unstable();
                ps.dedup();
                for len in run_lengths(&ps) {
                    total += 1;
                    if lo <= len && len <= hi {
                        ok += 1;
                    }
                }
            }
            ratio(ok, total)
        }
        ConstraintRule::DailyLimit { default, exceptions } => {
            let mut counts: BTreeMap<(ClassId, DayOfWeek, SubjectId), u32> = BTreeMap::new();
            for s in sessions {
                *counts.entry((s.class, s.day, s.subject)).or_default() += 1;
            }
            let violations = counts
                .iter()
                .filter(|((_, _, subject), n)| **n > *exceptions.get(subject).unwrap_or(default))
                .count();
            if sessions.is_empty() {
                1.0
            } else {
                (1.0 - violations as f64 / sessions.len() as f64).clamp(0.0, 1.0)
            }
        }
    }
}

/// Lengths of maximal runs of consecutive numbers in a sorted, deduplicated list.
fn run_lengths(sorted: &[u32]) -> Vec<u32> {
    let mut out = Vec::new();
    let mut iter = sorted.iter();
    let Some(&first) = iter.next() else {
        return out;
    };
    let (mut prev, mut len) = (first, 1);
    for &p in iter {
        if p == prev + 1 {
            len += 1;
        } else {
            out.push(len);
            len = 1;
        }
        prev = p;
    }
    out.push(len);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::RulesConfig;
    use crate::testing;
    use proptest::prelude::*;
    use serde_json::json;
    use types::{
        ConstraintId, ConstraintKind, RoomId, SchedulingConstraint, TeacherId, TimeSlotId,
    };

    fn constraint(
        id: u64,
        kind: ConstraintKind,
        priority: u8,
        is_hard: bool,
        parameters: serde_json::Value,
    ) -> SchedulingConstraint {
        SchedulingConstraint {
            id: ConstraintId(id),
            name: format!("{kind}"),
            kind,
            priority,
            is_hard,
            is_active: true,
            parameters,
        }
    }

    fn catalog(constraints: Vec<SchedulingConstraint>) -> Catalog {
        let (term, mut parts) = testing::small_school();
        parts.constraints = constraints;
        Catalog::from_parts(term, parts, RulesConfig::default()).unwrap()
    }

    fn session(
        cat: &Catalog,
        subject: u64,
        teacher: u64,
        period: u32,
        room: Option<u64>,
    ) -> Session {
        Session {
            assignment: None,
            required_slot: None,
            class: ClassId(1),
            subject: SubjectId(subject),
            teacher: TeacherId(teacher),
            time_slot: TimeSlotId(u64::from(period)),
            day: DayOfWeek::Mon,
            period,
            room: room.map(RoomId),
            effective_from: cat.term.start_date,
            effective_to: cat.term.end_date,
        }
    }

    #[test]
    fn empty_catalog_scores_one() {
        let cat = catalog(vec![]);
        let e = evaluate(&cat, &[session(&cat, 1, 1, 1, Some(1))]);
        assert_eq!(e.score, 1.0);
        assert!(e.breakdown.is_empty());
        assert!(e.hard_satisfied());
    }

    #[test]
    fn weighted_mean_uses_priority() {
        let cat = catalog(vec![
            constraint(
                1,
                ConstraintKind::TeacherAvailability,
                9,
                false,
                json!({"teachers": [{"teacher": 1, "periods": [1]}]}),
            ),
            constraint(2, ConstraintKind::DailyLimit, 1, false, json!({"max_per_day": 1})),
        ]);
        let sessions = vec![session(&cat, 1, 1, 1, Some(1)), session(&cat, 1, 1, 3, Some(1))];
        let e = evaluate(&cat, &sessions);
        // availability: 1 of 2 inside; daily limit: one (class, day, subject) over the cap
        assert_eq!(e.breakdown[0].score, 0.5);
        assert_eq!(e.breakdown[1].score, 0.5);
        assert!((e.score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn hard_room_requirement_flags_wrong_rooms() {
        let cat = catalog(vec![constraint(
            1,
            ConstraintKind::RoomRequirement,
            8,
            true,
            json!({"subjects": [{"subject": 1, "room_types": ["laboratory"]}]}),
        )]);
        let sessions = [session(&cat, 1, 1, 1, Some(1)), session(&cat, 2, 2, 2, Some(1))];
        let e = evaluate(&cat, &sessions);
        assert_eq!(e.breakdown[0].score, 0.0);
        let v = e.hard_violations();
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].kind, ConstraintKind::RoomRequirement);
    }

    #[test]
    fn consecutive_runs_are_measured_per_class_day() {
        let cat = catalog(vec![constraint(
            1,
            ConstraintKind::ConsecutivePeriods,
            5,
            true,
            json!({"subjects": [{"subject": 1, "min": 2, "max": 2}]}),
        )]);
        let paired = vec![session(&cat, 1, 1, 1, None), session(&cat, 1, 1, 2, None)];
        assert!(evaluate(&cat, &paired).hard_satisfied());
        let split = vec![session(&cat, 1, 1, 1, None), session(&cat, 1, 1, 3, None)];
        let e = evaluate(&cat, &split);
        assert_eq!(e.breakdown[0].score, 0.0);
        assert!(!e.hard_satisfied());
    }

    #[test]
    fn morning_band_is_inclusive() {
        let cat = catalog(vec![constraint(
            1,
            ConstraintKind::SubjectTimePreference,
            5,
            false,
            json!({}),
        )]);
        let e = evaluate(&cat, &[session(&cat, 1, 1, 3, None)]);
        assert_eq!(e.score, 1.0);
    }

    #[test]
    fn runs_split_on_gaps() {
        assert_eq!(run_lengths(&[1, 2, 3, 5, 7, 8]), vec![3, 1, 2]);
        assert!(run_lengths(&[]).is_empty());
    }

    proptest! {
        #[test]
        fn evaluation_is_permutation_stable(
            raw in prop::collection::vec((1u64..3, 1u32..4, prop::option::of(1u64..2)), 0..12),
            rotate in 0usize..12,
        ) {
            let cat = catalog(vec![
                constraint(1, ConstraintKind::DailyLimit, 4, false, json!({})),
                constraint(
                    2,
                    ConstraintKind::ConsecutivePeriods,
                    6,
                    false,
                    json!({"subjects": [{"subject": 1, "min": 1, "max": 2}]}),
                ),
                constraint(3, ConstraintKind::SubjectTimePreference, 7, false, json!({})),
            ]);
            let sessions: Vec<Session> =
                raw.iter().map(|&(s, p, r)| session(&cat, s, s, p, r)).collect();
            let mut permuted = sessions.clone();
            permuted.reverse();
            if !permuted.is_empty() {
                let k = rotate % permuted.len();
                permuted.rotate_left(k);
            }
            prop_assert_eq!(evaluate(&cat, &sessions), evaluate(&cat, &permuted));
        }
    }
}
