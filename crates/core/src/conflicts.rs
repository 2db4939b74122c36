//! Double-booking detection.
//!
//! Pure functions over sessions. Output order is (kind, day, period, slot)
//! and then the parties, so the result does not depend on input order.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use types::{Conflict, ConflictKind, ConflictParty, ConflictProbe, Session, TimeSlotId};

type SessionKey = (
    Option<types::AssignmentId>,
    Option<usize>,
    types::ClassId,
    types::SubjectId,
    types::TeacherId,
    Option<types::RoomId>,
    chrono::NaiveDate,
    chrono::NaiveDate,
);

fn session_key(s: &Session) -> SessionKey {
    (
        s.assignment,
        s.required_slot,
        s.class,
        s.subject,
        s.teacher,
        s.room,
        s.effective_from,
        s.effective_to,
    )
}

type PartyKey = (
    Option<types::AssignmentId>,
    Option<usize>,
    Option<types::ClassId>,
    Option<types::SubjectId>,
    Option<types::TeacherId>,
    Option<types::RoomId>,
);

fn party_key(p: &ConflictParty) -> PartyKey {
    (p.assignment, p.required_slot, p.class, p.subject, p.teacher, p.room)
}

fn order(a: &Conflict, b: &Conflict) -> Ordering {
    (a.kind, a.day, a.period, a.time_slot)
        .cmp(&(b.kind, b.day, b.period, b.time_slot))
        .then_with(|| party_key(&a.first).cmp(&party_key(&b.first)))
        .then_with(|| party_key(&a.second).cmp(&party_key(&b.second)))
}

/// Every teacher, room and class clash between sessions sharing a time slot
/// with overlapping date ranges.
pub fn detect(sessions: &[Session]) -> Vec<Conflict> {
    let mut groups: BTreeMap<TimeSlotId, Vec<&Session>> = BTreeMap::new();
    for s in sessions {
        groups.entry(s.time_slot).or_default().push(s);
    }

    let mut out = Vec::new();
    for (_, mut group) in groups {
        if group.len() < 2 {
            continue;
        }
        group.sort_by_key(|s| session_key(s));
        for (i, a) in group.iter().enumerate() {
            for b in &group[i + 1..] {
                if !a.range().overlaps(&b.range()) {
                    continue;
                }
                let mut push = |kind| {
                    out.push(Conflict {
                        kind,
                        time_slot: a.time_slot,
                        day: a.day,
                        period: a.period,
                        first: ConflictParty::from(*a),
                        second: ConflictParty::from(*b),
                    })
                };
                if a.teacher == b.teacher {
                    push(ConflictKind::Teacher);
                }
                if a.room.is_some() && a.room == b.room {
                    push(ConflictKind::Room);
                }
                if a.class == b.class {
                    push(ConflictKind::Class);
                }
            }
        }
    }
    out.sort_by(order);
    out
}

/// Clashes a hypothetical session described by `probe` would have with
/// `existing`. The existing session is the first party of each conflict.
pub fn probe(existing: &[Session], probe: &ConflictProbe) -> Vec<Conflict> {
    let second = ConflictParty {
        assignment: None,
        required_slot: None,
        class: probe.class,
        subject: None,
        teacher: probe.teacher,
        room: probe.room,
    };

    let mut out = Vec::new();
    for s in existing {
        if probe.time_slot.is_some_and(|t| t != s.time_slot) {
            continue;
        }
        if probe.exclude.is_some() && s.assignment == probe.exclude {
            continue;
        }
        if probe.date_range.is_some_and(|r| !r.overlaps(&s.range())) {
            continue;
        }
        let mut push = |kind| {
            out.push(Conflict {
                kind,
                time_slot: s.time_slot,
                day: s.day,
                period: s.period,
                first: ConflictParty::from(s),
                second: second.clone(),
            })
        };
        if probe.teacher == Some(s.teacher) {
            push(ConflictKind::Teacher);
        }
        if probe.room.is_some() && probe.room == s.room {
            push(ConflictKind::Room);
        }
        if probe.class == Some(s.class) {
            push(ConflictKind::Class);
        }
    }
    out.sort_by(order);
    out
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct ConflictCounts {
    pub teacher: usize,
    pub room: usize,
    pub class: usize,
}

impl ConflictCounts {
    pub fn of(conflicts: &[Conflict]) -> Self {
        let mut c = Self::default();
        for x in conflicts {
            match x.kind {
                ConflictKind::Teacher => c.teacher += 1,
                ConflictKind::Room => c.room += 1,
                ConflictKind::Class => c.class += 1,
            }
        }
        c
    }

    pub fn total(&self) -> usize {
        self.teacher + self.room + self.class
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use types::{AssignmentId, ClassId, DateRange, DayOfWeek, RoomId, SubjectId, TeacherId};

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn session(id: u64, class: u64, teacher: u64, slot: u64, room: Option<u64>) -> Session {
        Session {
            assignment: Some(AssignmentId(id)),
            required_slot: None,
            class: ClassId(class),
            subject: SubjectId(1),
            teacher: TeacherId(teacher),
            time_slot: TimeSlotId(slot),
            day: DayOfWeek::Mon,
            period: slot as u32,
            room: room.map(RoomId),
            effective_from: d(4, 1),
            effective_to: d(7, 31),
        }
    }

    #[test]
    fn finds_each_kind() {
        let sessions = vec![
            session(1, 1, 1, 1, Some(1)),
            session(2, 2, 1, 1, Some(1)),
            session(3, 2, 2, 1, None),
            session(4, 3, 3, 2, None),
        ];
        let conflicts = detect(&sessions);
        let counts = ConflictCounts::of(&conflicts);
        assert_eq!(counts.teacher, 1);
        assert_eq!(counts.room, 1);
        assert_eq!(counts.class, 1);
        assert_eq!(conflicts[0].kind, ConflictKind::Teacher);
        assert_eq!(conflicts[0].first.assignment, Some(AssignmentId(1)));
        assert_eq!(conflicts[0].second.assignment, Some(AssignmentId(2)));
    }

    #[test]
    fn null_rooms_never_clash() {
        let sessions = vec![session(1, 1, 1, 1, None), session(2, 2, 2, 1, None)];
        assert!(detect(&sessions).is_empty());
    }

    #[test]
    fn disjoint_date_ranges_do_not_clash() {
        let a = session(1, 1, 1, 1, Some(1));
        let mut b = session(2, 1, 1, 1, Some(1));
        b.effective_from = d(8, 1);
        b.effective_to = d(8, 31);
        assert!(detect(&[a, b]).is_empty());
    }

    #[test]
    fn hypothetical_session_reports_existing_party_first() {
        let existing = vec![session(1, 1, 1, 1, Some(1)), session(2, 2, 2, 2, Some(1))];
        let p = ConflictProbe {
            teacher: Some(TeacherId(1)),
            time_slot: Some(TimeSlotId(1)),
            ..ConflictProbe::default()
        };
        let found = probe(&existing, &p);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, ConflictKind::Teacher);
        assert_eq!(found[0].first.assignment, Some(AssignmentId(1)));
        assert_eq!(found[0].second.teacher, Some(TeacherId(1)));
    }

    #[test]
    fn hypothetical_session_honours_exclude_and_dates() {
        let existing = vec![session(1, 1, 1, 1, Some(1))];
        let excluded = ConflictProbe {
            teacher: Some(TeacherId(1)),
            room: Some(RoomId(1)),
            time_slot: Some(TimeSlotId(1)),
            exclude: Some(AssignmentId(1)),
            ..ConflictProbe::default()
        };
        assert!(probe(&existing, &excluded).is_empty());

        let later = ConflictProbe {
            room: Some(RoomId(1)),
            date_range: Some(DateRange::single(d(9, 2))),
            ..ConflictProbe::default()
        };
        assert!(probe(&existing, &later).is_empty());
    }

    proptest! {
        #[test]
        fn detection_is_permutation_stable(
            raw in prop::collection::vec(
                (0u64..4, 0u64..4, 0u64..3, prop::option::of(0u64..3)),
                0..24,
            ),
            seed in any::<u64>(),
        ) {
            let sessions: Vec<Session> = raw
                .iter()
                .enumerate()
                .map(|(i, &(c, t, s, r))| session(i as u64, c, t, s, r))
                .collect();
            let mut shuffled = sessions.clone();
            // deterministic Fisher-Yates driven by the seed
            let mut x = seed | 1;
            for i in (1..shuffled.len()).rev() {
                x ^= x << 13;
                x ^= x >> 7;
                x ^= x << 17;
                let j = (x % (i as u64 + 1)) as usize;
                shuffled.swap(i, j);
            }
            prop_assert_eq!(detect(&sessions), detect(&shuffled));
        }
    }
}
