use std::cmp::Reverse;

use chrono::NaiveDate;
use sched_core::catalog::preferred_room_types;
use sched_core::constraints::ConstraintSet;
use sched_core::{Repository, SchedulingError};
use serde::Serialize;
use types::{ClassId, Room, SubjectId, TimeSlotId};
use utoipa::ToSchema;

use crate::Timetables;

const FITS: i32 = 30;
const SNUG: i32 = 20;
const TOO_SMALL: i32 = -50;
const SUITED: i32 = 40;

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
pub struct RoomSuggestion {
    pub room: Room,
    pub score: i32,
    pub reasons: Vec<String>,
}

fn rate(room: Room, students: u32, suited: bool) -> RoomSuggestion {
    let mut score = 0;
    let mut reasons = Vec::new();
    if room.capacity >= students {
        score += FITS;
        reasons.push(format!("seats all {students} students"));
        // at most 20 % empty seats
        if u64::from(room.capacity) * 10 <= u64::from(students) * 12 {
            score += SNUG;
            reasons.push("little unused capacity".into());
        }
    } else {
        score += TOO_SMALL;
        reasons.push(format!("only {} seats for {students} students", room.capacity));
    }
    if suited {
        score += SUITED;
        reasons.push(format!("{:?} suits the subject", room.room_type));
    }
    RoomSuggestion {
        room,
        score,
        reasons,
    }
}

impl<R: Repository> Timetables<R> {
    /// Free rooms for a class's lesson in `slot` on `date`, best first.
    pub async fn suggest_rooms(
        &self,
        class: ClassId,
        subject: SubjectId,
        slot: TimeSlotId,
        date: NaiveDate,
    ) -> Result<Vec<RoomSuggestion>, SchedulingError> {
        let repo = &self.inner.repo;
        let class = repo.class(class).await?;
        let subject = repo.subject(subject).await?;
        let records = repo.constraints(true).await?;
        let constraints = ConstraintSet::from_records(&records, &self.inner.rules)?;
        let preferred = preferred_room_types(&subject, &constraints);

        let mut out: Vec<RoomSuggestion> = self
            .available_rooms(slot, date, None, None)
            .await?
            .into_iter()
            .map(|room| {
                let suited = preferred.contains(&room.room_type);
                rate(room, class.student_count, suited)
            })
            .collect();
        out.sort_by_key(|s| (Reverse(s.score), s.room.id));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sched_core::repo::ScheduleRepository;
    use crate::tests::{entry, service_with};
    use sched_core::testing::{date, room, subject};
    use types::{RoomId, RoomType, TermId};

    #[tokio::test]
    async fn labs_first_for_physics() {
        let mut physics = subject(3, "Physics", 2);
        physics.preferred_room_type = Some(RoomType::Laboratory);
        let (t, _) = service_with(|parts| {
            parts.subjects.push(physics);
            parts.rooms.extend([
                room(2, "LAB", RoomType::Laboratory, 30),
                room(3, "HALL", RoomType::Classroom, 100),
                room(4, "BOX", RoomType::Classroom, 10),
            ]);
        });
        let ranked = t
            .suggest_rooms(ClassId(1), SubjectId(3), TimeSlotId(1), date(2024, 4, 8))
            .await
            .unwrap();
        let order: Vec<(u64, i32)> = ranked.iter().map(|s| (s.room.id.0, s.score)).collect();
        assert_eq!(order, vec![(2, 90), (1, 50), (3, 30), (4, -50)]);
        assert_eq!(ranked[0].reasons.len(), 3);
    }

    #[tokio::test]
    async fn booked_rooms_are_skipped() {
        let (t, _) = service_with(|parts| {
            parts.rooms.push(room(2, "R2", RoomType::Classroom, 40));
        });
        t.repo()
            .replace_term_schedule(TermId(1), vec![entry(1, 1, 1)])
            .await
            .unwrap();
        let ranked = t
            .suggest_rooms(ClassId(1), SubjectId(1), TimeSlotId(1), date(2024, 4, 8))
            .await
            .unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].room.id, RoomId(2));
        assert_eq!(ranked[0].score, 30);

        // after the term the lesson no longer holds the room
        let ranked = t
            .suggest_rooms(ClassId(1), SubjectId(1), TimeSlotId(1), date(2024, 9, 2))
            .await
            .unwrap();
        assert_eq!(ranked.len(), 2);
    }
}
