//! Small hand-built catalogs shared by unit tests, integration tests and benches.

use chrono::{NaiveDate, NaiveTime};
use types::{
    AuthorizationId, Class, ClassId, DayOfWeek, GradeId, Room, RoomId, RoomType, Subject,
    SubjectId, Teacher, TeacherAssignment, TeacherId, TeacherStatus, Term, TermId, TimeSlot,
    TimeSlotId,
};

use crate::catalog::CatalogParts;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

pub fn term_t1() -> Term {
    Term {
        id: TermId(1),
        name: "T1".into(),
        start_date: date(2024, 4, 1),
        end_date: date(2024, 7, 31),
        is_current: true,
    }
}

/// A 45 minute lesson; periods start at 08:00 and are 50 minutes apart.
pub fn lesson(id: u64, day: DayOfWeek, period: u32) -> TimeSlot {
    let start_min = 8 * 60 + (period - 1) * 50;
    let start = NaiveTime::from_hms_opt(start_min / 60, start_min % 60, 0).unwrap_or_default();
    TimeSlot {
        id: TimeSlotId(id),
        day,
        period,
        start,
        end: start + chrono::Duration::minutes(45),
        duration_minutes: 45,
        is_break: false,
        is_active: true,
    }
}

pub fn room(id: u64, number: &str, room_type: RoomType, capacity: u32) -> Room {
    Room {
        id: RoomId(id),
        number: number.into(),
        name: number.into(),
        room_type,
        capacity,
        is_available: true,
    }
}

pub fn subject(id: u64, name: &str, credit_hours: u32) -> Subject {
    Subject {
        id: SubjectId(id),
        name: name.into(),
        code: name.to_uppercase(),
        credit_hours,
        preferred_room_type: None,
    }
}

pub fn teacher(id: u64, name: &str) -> Teacher {
    Teacher {
        id: TeacherId(id),
        name: name.into(),
        status: TeacherStatus::Active,
        department: None,
    }
}

pub fn class(id: u64, grade: u64, student_count: u32) -> Class {
    Class {
        id: ClassId(id),
        name: format!("{grade}-{id}"),
        grade: GradeId(grade),
        term: TermId(1),
        student_count,
        class_teacher: None,
    }
}

pub fn authorize(id: u64, teacher: u64, class: u64, subject: u64) -> TeacherAssignment {
    TeacherAssignment {
        id: AuthorizationId(id),
        teacher: TeacherId(teacher),
        class: ClassId(class),
        subject: SubjectId(subject),
        term: TermId(1),
        is_active: true,
    }
}

/// One class of 25 taking Math (2 periods, teacher 1) and English
/// (1 period, teacher 2) over Monday periods 1-3 in a single classroom.
pub fn small_school() -> (Term, CatalogParts) {
    let parts = CatalogParts {
        grades: vec![GradeId(1)],
        time_slots: vec![
            lesson(1, DayOfWeek::Mon, 1),
            lesson(2, DayOfWeek::Mon, 2),
            lesson(3, DayOfWeek::Mon, 3),
        ],
        rooms: vec![room(1, "R1", RoomType::Classroom, 30)],
        classes: vec![class(1, 1, 25)],
        subjects: vec![subject(1, "Math", 2), subject(2, "English", 1)],
        teachers: vec![teacher(1, "A"), teacher(2, "B")],
        authorizations: vec![authorize(1, 1, 1, 1), authorize(2, 2, 1, 2)],
        constraints: vec![],
    };
    (term_t1(), parts)
}

/// `classes` classes of 28 in one grade, five days of `periods` periods,
/// six subjects each with its own teacher per pair of classes, and enough
/// classrooms plus a lab and a gym.
pub fn synthetic_school(classes: u64, periods: u32) -> (Term, CatalogParts) {
    let days = [
        DayOfWeek::Mon,
        DayOfWeek::Tue,
        DayOfWeek::Wed,
        DayOfWeek::Thu,
        DayOfWeek::Fri,
    ];
    let mut time_slots = Vec::new();
    let mut next_slot = 1;
    for day in days {
        for p in 1..=periods {
            time_slots.push(lesson(next_slot, day, p));
            next_slot += 1;
        }
    }

    let mut lab = subject(3, "Physics", 3);
    lab.preferred_room_type = Some(RoomType::Laboratory);
    let subjects = vec![
        subject(1, "Mathematics", 5),
        subject(2, "English", 4),
        lab,
        subject(4, "History", 2),
        subject(5, "Physical Education", 2),
        subject(6, "Music", 1),
    ];

    let mut rooms: Vec<Room> = (1..=classes)
        .map(|i| room(i, &format!("C{i}"), RoomType::Classroom, 30))
        .collect();
    rooms.push(room(classes + 1, "LAB1", RoomType::Laboratory, 30));
    rooms.push(room(classes + 2, "GYM", RoomType::Gymnasium, 60));

    let mut teachers = Vec::new();
    let mut authorizations = Vec::new();
    let mut next_teacher = 1;
    let mut next_auth = 1;
    for pair in 0..classes.div_ceil(2) {
        for s in &subjects {
            teachers.push(teacher(next_teacher, &format!("{}-{}", s.code, pair)));
            for c in [pair * 2 + 1, pair * 2 + 2] {
                if c <= classes {
                    authorizations.push(authorize(next_auth, next_teacher, c, s.id.0));
                    next_auth += 1;
                }
            }
            next_teacher += 1;
        }
    }

    let parts = CatalogParts {
        grades: vec![GradeId(1)],
        time_slots,
        rooms,
        classes: (1..=classes).map(|i| class(i, 1, 28)).collect(),
        subjects,
        teachers,
        authorizations,
        constraints: vec![],
    };
    (term_t1(), parts)
}
