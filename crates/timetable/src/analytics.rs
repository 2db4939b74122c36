//! Reporting over a committed term schedule.
//!
//! Every function here is pure over a [`ScheduleSnapshot`]; the service in
//! the crate root loads the snapshot and caches the computed
//! [`TermAnalytics`] per schedule revision.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveTime;
use sched_core::catalog::sessions_of;
use sched_core::conflicts;
use sched_core::priority::subject_priority;
use serde::Serialize;
use types::{
    AssignmentId, Class, ClassId, ConflictKind, DayOfWeek, Grade, GradeId, Room, RoomId, RoomType,
    ScheduledAssignment, Session, Subject, SubjectId, SubstituteAssignment, Teacher, TeacherId,
    Term, TermId, TimeSlot, TimeSlotId,
};
use utoipa::ToSchema;

/// Priority from which a subject counts as core for the morning metric.
const CORE_PRIORITY: u8 = 8;

/// Everything the reports read: the term's active assignments, the
/// substitutes covering them, and the entities they reference.
#[derive(Clone, Debug, Default)]
pub struct ScheduleSnapshot {
    pub term: Option<Term>,
    pub assignments: Vec<ScheduledAssignment>,
    pub substitutes: Vec<SubstituteAssignment>,
    pub slots: HashMap<TimeSlotId, TimeSlot>,
    pub rooms: BTreeMap<RoomId, Room>,
    pub teachers: BTreeMap<TeacherId, Teacher>,
    pub subjects: BTreeMap<SubjectId, Subject>,
    pub classes: BTreeMap<ClassId, Class>,
    pub grades: BTreeMap<GradeId, Grade>,
    pub morning_last_period: u32,
}

impl ScheduleSnapshot {
    fn active(&self) -> impl Iterator<Item = &ScheduledAssignment> {
        self.assignments.iter().filter(|a| a.is_active)
    }

    /// Active assignments paired with their time slot.
    fn placed(&self) -> impl Iterator<Item = (&ScheduledAssignment, &TimeSlot)> {
        self.active()
            .filter_map(|a| self.slots.get(&a.time_slot).map(|s| (a, s)))
    }

    fn teaching_slots(&self) -> usize {
        self.slots.values().filter(|s| s.is_schedulable()).count()
    }

    pub fn sessions(&self) -> Vec<Session> {
        sessions_of(&self.assignments, &self.slots)
    }

    fn teacher_name(&self, id: TeacherId) -> String {
        self.teachers
            .get(&id)
            .map_or_else(|| format!("teacher {id}"), |t| t.name.clone())
    }

    fn subject_name(&self, id: SubjectId) -> String {
        self.subjects
            .get(&id)
            .map_or_else(|| format!("subject {id}"), |s| s.name.clone())
    }
}

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
pub struct DayCount {
    pub day: DayOfWeek,
    pub periods: usize,
}

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
pub struct TeacherWorkload {
    pub teacher: TeacherId,
    pub name: String,
    pub total_periods: usize,
    pub unique_classes: usize,
    pub unique_subjects: usize,
    /// Days with at least one period, Monday first.
    pub daily: Vec<DayCount>,
    pub max_daily: usize,
    pub min_daily: usize,
    pub avg_daily: f64,
    /// 1 − (max − min) / max over the teaching days; 1 when idle.
    pub balance: f64,
}

#[derive(Clone, Debug, Default, Serialize, ToSchema, PartialEq)]
pub struct WorkloadSummary {
    pub total_teachers: usize,
    pub average_periods: f64,
    pub variance: f64,
    pub most_loaded: Option<TeacherId>,
    pub least_loaded: Option<TeacherId>,
}

#[derive(Clone, Debug, Default, Serialize, ToSchema, PartialEq)]
pub struct WorkloadReport {
    /// Heaviest first.
    pub teachers: Vec<TeacherWorkload>,
    pub summary: WorkloadSummary,
}

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
pub struct RoomUsage {
    pub room: RoomId,
    pub number: String,
    pub room_type: RoomType,
    pub capacity: u32,
    pub periods_used: usize,
    pub unique_classes: usize,
    pub unique_subjects: usize,
    /// Percentage of the active teaching slots.
    pub utilization_rate: f64,
    pub free_periods: usize,
}

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
pub struct RoomTypeUsage {
    pub room_type: RoomType,
    pub total_usage: usize,
    pub avg_capacity: f64,
}

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
pub struct PeakUsage {
    pub day: DayOfWeek,
    pub period: u32,
    pub rooms_used: usize,
}

#[derive(Clone, Debug, Default, Serialize, ToSchema, PartialEq)]
pub struct RoomSummary {
    pub rooms_in_use: usize,
    /// Mean over the rooms in use.
    pub average_utilization_rate: f64,
    pub most_used: Option<RoomId>,
    pub least_used: Option<RoomId>,
}

#[derive(Clone, Debug, Default, Serialize, ToSchema, PartialEq)]
pub struct RoomUtilizationReport {
    pub rooms: Vec<RoomUsage>,
    pub room_types: Vec<RoomTypeUsage>,
    pub peak_usage: Vec<PeakUsage>,
    pub summary: RoomSummary,
}

/// Assignments sharing a teacher or a room in one time slot.
#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
pub struct DoubleBooking {
    pub time_slot: TimeSlotId,
    pub day: DayOfWeek,
    pub period: u32,
    pub teacher: Option<TeacherId>,
    pub room: Option<RoomId>,
    pub assignments: Vec<AssignmentId>,
}

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
pub struct SubstituteFrequency {
    pub teacher: TeacherId,
    pub name: String,
    pub substitutions: usize,
}

#[derive(Clone, Debug, Default, Serialize, ToSchema, PartialEq)]
pub struct ConflictReport {
    pub teacher_conflicts: usize,
    pub room_conflicts: usize,
    pub class_conflicts: usize,
    /// Active assignments without a room.
    pub unassigned_rooms: usize,
    pub teacher_double_bookings: Vec<DoubleBooking>,
    pub room_double_bookings: Vec<DoubleBooking>,
    pub substitute_frequency: Vec<SubstituteFrequency>,
}

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
pub struct PeriodCount {
    pub period: u32,
    pub count: usize,
}

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
pub struct SubjectTiming {
    pub subject: SubjectId,
    pub name: String,
    pub total: usize,
    pub by_period: Vec<PeriodCount>,
}

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
pub struct DaySubjectCount {
    pub day: DayOfWeek,
    pub subject: SubjectId,
    pub count: usize,
}

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
pub struct GradeSubjectLoad {
    pub grade: GradeId,
    pub grade_name: String,
    pub subject: SubjectId,
    pub periods_per_week: usize,
}

#[derive(Clone, Debug, Default, Serialize, ToSchema, PartialEq)]
pub struct SubjectDistributionReport {
    pub subjects: Vec<SubjectTiming>,
    pub daily: Vec<DaySubjectCount>,
    pub grade_load: Vec<GradeSubjectLoad>,
    pub total_subjects: usize,
    pub most_scheduled_periods: usize,
}

#[derive(Clone, Copy, Debug, Serialize, ToSchema, PartialEq, Eq)]
pub enum LetterGrade {
    A,
    B,
    C,
    D,
    F,
}

impl LetterGrade {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 90.0 => LetterGrade::A,
            s if s >= 80.0 => LetterGrade::B,
            s if s >= 70.0 => LetterGrade::C,
            s if s >= 60.0 => LetterGrade::D,
            _ => LetterGrade::F,
        }
    }
}

/// Points per component; the maxima are 25, 20, 25, 15 and 15.
#[derive(Clone, Debug, Default, Serialize, ToSchema, PartialEq)]
pub struct ScoreBreakdown {
    pub workload_balance: f64,
    pub room_utilization: f64,
    pub conflict_minimization: f64,
    pub subject_distribution: f64,
    pub room_assignment: f64,
}

impl ScoreBreakdown {
    fn total(&self) -> f64 {
        self.workload_balance
            + self.room_utilization
            + self.conflict_minimization
            + self.subject_distribution
            + self.room_assignment
    }
}

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
pub struct OptimizationScore {
    /// 0..=100.
    pub overall: f64,
    pub grade: LetterGrade,
    pub breakdown: ScoreBreakdown,
    pub recommendations: Vec<String>,
}

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
pub struct SlotUsage {
    pub time_slot: TimeSlotId,
    pub day: DayOfWeek,
    pub period: u32,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub usage: usize,
    pub unique_teachers: usize,
    pub unique_subjects: usize,
}

#[derive(Clone, Debug, Default, Serialize, ToSchema, PartialEq)]
pub struct SlotPopularityReport {
    /// Used slots in (day, period) order.
    pub slots: Vec<SlotUsage>,
    pub most_popular: Option<TimeSlotId>,
    pub least_popular: Option<TimeSlotId>,
}

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
pub struct ClassDensity {
    pub class: ClassId,
    pub name: String,
    pub grade: Option<GradeId>,
    pub total_periods: usize,
    pub free_periods: usize,
    pub unique_subjects: usize,
    pub max_daily: usize,
    pub min_daily: usize,
    pub avg_daily: f64,
}

#[derive(Clone, Debug, Default, Serialize, ToSchema, PartialEq)]
pub struct ClassDensityReport {
    pub classes: Vec<ClassDensity>,
    pub busiest: Option<ClassId>,
    pub lightest: Option<ClassId>,
}

/// All reports of one term at one schedule revision.
#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
pub struct TermAnalytics {
    pub term: TermId,
    pub revision: u64,
    pub workload: WorkloadReport,
    pub rooms: RoomUtilizationReport,
    pub conflicts: ConflictReport,
    pub subjects: SubjectDistributionReport,
    pub score: OptimizationScore,
    pub slot_popularity: SlotPopularityReport,
    pub class_density: ClassDensityReport,
}

pub fn compute(term: TermId, revision: u64, snap: &ScheduleSnapshot) -> TermAnalytics {
    let workload = teacher_workload(snap, None);
    let rooms = room_utilization(snap);
    let conflicts = conflict_report(snap);
    let score = optimization_score(snap, &workload, &rooms, &conflicts);
    TermAnalytics {
        term,
        revision,
        workload,
        rooms,
        conflicts,
        subjects: subject_distribution(snap),
        score,
        slot_popularity: slot_popularity(snap),
        class_density: class_density(snap),
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// (max, min, mean) of the non-empty days.
fn spread(daily: &BTreeMap<DayOfWeek, usize>) -> (usize, usize, f64) {
    let max = daily.values().copied().max().unwrap_or(0);
    let min = daily.values().copied().min().unwrap_or(0);
    (max, min, mean(daily.values().map(|&v| v as f64)))
}

fn day_counts(daily: &BTreeMap<DayOfWeek, usize>) -> Vec<DayCount> {
    daily
        .iter()
        .map(|(&day, &periods)| DayCount { day, periods })
        .collect()
}

/// First item with the largest key.
fn most_by<T, K: Ord>(items: &[T], key: impl Fn(&T) -> K) -> Option<&T> {
    items.iter().fold(None, |best, x| match best {
        Some(b) if key(b) >= key(x) => Some(b),
        _ => Some(x),
    })
}

/// First item with the smallest key.
fn least_by<T, K: Ord>(items: &[T], key: impl Fn(&T) -> K) -> Option<&T> {
    items.iter().fold(None, |best, x| match best {
        Some(b) if key(b) <= key(x) => Some(b),
        _ => Some(x),
    })
}

/// Per-teacher load, optionally restricted to one teacher.
pub fn teacher_workload(snap: &ScheduleSnapshot, only: Option<TeacherId>) -> WorkloadReport {
    #[derive(Default)]
    struct Acc {
        total: usize,
        classes: BTreeSet<ClassId>,
        subjects: BTreeSet<SubjectId>,
        daily: BTreeMap<DayOfWeek, usize>,
    }

    let mut acc: BTreeMap<TeacherId, Acc> = BTreeMap::new();
    for a in snap.active().filter(|a| only.map_or(true, |t| a.teacher == t)) {
        let e = acc.entry(a.teacher).or_default();
        e.total += 1;
        e.classes.insert(a.class);
        e.subjects.insert(a.subject);
        if let Some(slot) = snap.slots.get(&a.time_slot) {
            *e.daily.entry(slot.day).or_default() += 1;
        }
    }

    let mut teachers: Vec<TeacherWorkload> = acc
        .into_iter()
        .map(|(teacher, e)| {
            let (max_daily, min_daily, avg_daily) = spread(&e.daily);
            let balance = if max_daily > 0 {
                1.0 - (max_daily - min_daily) as f64 / max_daily as f64
            } else {
                1.0
            };
            TeacherWorkload {
                teacher,
                name: snap.teacher_name(teacher),
                total_periods: e.total,
                unique_classes: e.classes.len(),
                unique_subjects: e.subjects.len(),
                daily: day_counts(&e.daily),
                max_daily,
                min_daily,
                avg_daily: round2(avg_daily),
                balance: round2(balance),
            }
        })
        .collect();
    teachers.sort_by_key(|t| (std::cmp::Reverse(t.total_periods), t.teacher));

    let average = mean(teachers.iter().map(|t| t.total_periods as f64));
    let variance = mean(
        teachers
            .iter()
            .map(|t| (t.total_periods as f64 - average).powi(2)),
    );
    let summary = WorkloadSummary {
        total_teachers: teachers.len(),
        average_periods: round2(average),
        variance: round2(variance),
        most_loaded: most_by(&teachers, |t| t.total_periods).map(|t| t.teacher),
        least_loaded: least_by(&teachers, |t| t.total_periods).map(|t| t.teacher),
    };
    WorkloadReport { teachers, summary }
}

/// Usage of every available room, plus any unavailable room that still
/// holds an assignment, as a share of the active non-break slots. Idle
/// rooms are listed at zero.
pub fn room_utilization(snap: &ScheduleSnapshot) -> RoomUtilizationReport {
    let teaching = snap.teaching_slots();

    let mut used: BTreeMap<RoomId, (usize, BTreeSet<ClassId>, BTreeSet<SubjectId>)> = snap
        .rooms
        .values()
        .filter(|r| r.is_available)
        .map(|r| (r.id, Default::default()))
        .collect();
    let mut peaks: BTreeMap<(DayOfWeek, u32), BTreeSet<RoomId>> = BTreeMap::new();
    for (a, slot) in snap.placed() {
        let Some(room) = a.room else { continue };
        let e = used.entry(room).or_default();
        e.0 += 1;
        e.1.insert(a.class);
        e.2.insert(a.subject);
        peaks.entry((slot.day, slot.period)).or_default().insert(room);
    }

    let mut rooms: Vec<RoomUsage> = used
        .into_iter()
        .filter_map(|(id, (periods_used, classes, subjects))| {
            let room = snap.rooms.get(&id)?;
            let rate = if teaching > 0 {
                periods_used as f64 / teaching as f64 * 100.0
            } else {
                0.0
            };
            Some(RoomUsage {
                room: id,
                number: room.number.clone(),
                room_type: room.room_type,
                capacity: room.capacity,
                periods_used,
                unique_classes: classes.len(),
                unique_subjects: subjects.len(),
                utilization_rate: round2(rate),
                free_periods: teaching.saturating_sub(periods_used),
            })
        })
        .collect();
    rooms.sort_by_key(|r| (std::cmp::Reverse(r.periods_used), r.room));

    let in_use: Vec<&RoomUsage> = rooms.iter().filter(|r| r.periods_used > 0).collect();
    let mut by_type: BTreeMap<RoomType, (usize, u64)> = BTreeMap::new();
    for r in &in_use {
        let e = by_type.entry(r.room_type).or_default();
        e.0 += r.periods_used;
        e.1 += u64::from(r.capacity) * r.periods_used as u64;
    }
    let mut room_types: Vec<RoomTypeUsage> = by_type
        .into_iter()
        .map(|(room_type, (total_usage, capacity_sum))| RoomTypeUsage {
            room_type,
            total_usage,
            avg_capacity: round2(capacity_sum as f64 / total_usage.max(1) as f64),
        })
        .collect();
    room_types.sort_by_key(|t| std::cmp::Reverse(t.total_usage));

    let mut peak_usage: Vec<PeakUsage> = peaks
        .into_iter()
        .map(|((day, period), rooms)| PeakUsage {
            day,
            period,
            rooms_used: rooms.len(),
        })
        .collect();
    peak_usage.sort_by_key(|p| std::cmp::Reverse(p.rooms_used));

    let summary = RoomSummary {
        rooms_in_use: in_use.len(),
        average_utilization_rate: round2(mean(in_use.iter().map(|r| r.utilization_rate))),
        most_used: most_by(&rooms, |r| r.periods_used).map(|r| r.room),
        least_used: least_by(&rooms, |r| r.periods_used).map(|r| r.room),
    };
    RoomUtilizationReport {
        rooms,
        room_types,
        peak_usage,
        summary,
    }
}

fn bookings(
    found: &[types::Conflict],
    kind: ConflictKind,
    key: impl Fn(&types::ConflictParty) -> Option<u64>,
) -> Vec<(TimeSlotId, DayOfWeek, u32, u64, BTreeSet<AssignmentId>)> {
    let mut groups: BTreeMap<(TimeSlotId, u64), (DayOfWeek, u32, BTreeSet<AssignmentId>)> =
        BTreeMap::new();
    for c in found.iter().filter(|c| c.kind == kind) {
        let Some(id) = key(&c.first) else { continue };
        let e = groups
            .entry((c.time_slot, id))
            .or_insert_with(|| (c.day, c.period, BTreeSet::new()));
        e.2.extend(c.first.assignment);
        e.2.extend(c.second.assignment);
    }
    groups
        .into_iter()
        .map(|((slot, id), (day, period, ids))| (slot, day, period, id, ids))
        .collect()
}

/// Double bookings in the committed schedule plus substitute activity.
pub fn conflict_report(snap: &ScheduleSnapshot) -> ConflictReport {
    let found = conflicts::detect(&snap.sessions());
    let counts = conflicts::ConflictCounts::of(&found);

    let teacher_double_bookings =
        bookings(&found, ConflictKind::Teacher, |p| p.teacher.map(|t| t.0))
            .into_iter()
            .map(|(time_slot, day, period, id, ids)| DoubleBooking {
                time_slot,
                day,
                period,
                teacher: Some(TeacherId(id)),
                room: None,
                assignments: ids.into_iter().collect(),
            })
            .collect();
    let room_double_bookings = bookings(&found, ConflictKind::Room, |p| p.room.map(|r| r.0))
        .into_iter()
        .map(|(time_slot, day, period, id, ids)| DoubleBooking {
            time_slot,
            day,
            period,
            teacher: None,
            room: Some(RoomId(id)),
            assignments: ids.into_iter().collect(),
        })
        .collect();

    let mut freq: BTreeMap<TeacherId, usize> = BTreeMap::new();
    for s in &snap.substitutes {
        *freq.entry(s.substitute).or_default() += 1;
    }
    let mut substitute_frequency: Vec<SubstituteFrequency> = freq
        .into_iter()
        .map(|(teacher, substitutions)| SubstituteFrequency {
            teacher,
            name: snap.teacher_name(teacher),
            substitutions,
        })
        .collect();
    substitute_frequency.sort_by_key(|f| std::cmp::Reverse(f.substitutions));

    ConflictReport {
        teacher_conflicts: counts.teacher,
        room_conflicts: counts.room,
        class_conflicts: counts.class,
        unassigned_rooms: snap.active().filter(|a| a.room.is_none()).count(),
        teacher_double_bookings,
        room_double_bookings,
        substitute_frequency,
    }
}

pub fn subject_distribution(snap: &ScheduleSnapshot) -> SubjectDistributionReport {
    let mut timing: BTreeMap<SubjectId, BTreeMap<u32, usize>> = BTreeMap::new();
    let mut daily: BTreeMap<(DayOfWeek, SubjectId), usize> = BTreeMap::new();
    for (a, slot) in snap.placed() {
        *timing.entry(a.subject).or_default().entry(slot.period).or_default() += 1;
        *daily.entry((slot.day, a.subject)).or_default() += 1;
    }

    let mut grade_load: BTreeMap<(GradeId, SubjectId), usize> = BTreeMap::new();
    for a in snap.active() {
        if let Some(class) = snap.classes.get(&a.class) {
            *grade_load.entry((class.grade, a.subject)).or_default() += 1;
        }
    }
    let mut grade_load: Vec<GradeSubjectLoad> = grade_load
        .into_iter()
        .map(|((grade, subject), periods_per_week)| GradeSubjectLoad {
            grade,
            grade_name: snap
                .grades
                .get(&grade)
                .map_or_else(|| format!("Grade {grade}"), |g| g.name.clone()),
            subject,
            periods_per_week,
        })
        .collect();
    grade_load.sort_by_key(|g| (g.grade, std::cmp::Reverse(g.periods_per_week), g.subject));

    let subjects: Vec<SubjectTiming> = timing
        .into_iter()
        .map(|(subject, periods)| SubjectTiming {
            subject,
            name: snap.subject_name(subject),
            total: periods.values().sum(),
            by_period: periods
                .into_iter()
                .map(|(period, count)| PeriodCount { period, count })
                .collect(),
        })
        .collect();

    SubjectDistributionReport {
        total_subjects: subjects.len(),
        most_scheduled_periods: subjects.iter().map(|s| s.total).max().unwrap_or(0),
        subjects,
        daily: daily
            .into_iter()
            .map(|((day, subject), count)| DaySubjectCount {
                day,
                subject,
                count,
            })
            .collect(),
        grade_load,
    }
}

/// Composite 0..=100 quality score with a letter grade.
pub fn optimization_score(
    snap: &ScheduleSnapshot,
    workload: &WorkloadReport,
    rooms: &RoomUtilizationReport,
    conflicts: &ConflictReport,
) -> OptimizationScore {
    let entries = snap.active().count();

    let workload_balance = if workload.teachers.is_empty() {
        0.0
    } else {
        mean(workload.teachers.iter().map(|t| t.balance)) * 25.0
    };

    let u = rooms.summary.average_utilization_rate;
    let room_utilization = if (70.0..=85.0).contains(&u) {
        20.0
    } else if u > 85.0 {
        20.0 - (u - 85.0) * 0.5
    } else {
        u / 70.0 * 20.0
    };

    let conflict_minimization = if entries > 0 {
        let double_bookings =
            conflicts.teacher_double_bookings.len() + conflicts.room_double_bookings.len();
        (25.0 - double_bookings as f64 / entries as f64 * 100.0).max(0.0)
    } else {
        25.0
    };

    let (mut core, mut core_morning) = (0usize, 0usize);
    for (a, slot) in snap.placed() {
        let priority = snap
            .subjects
            .get(&a.subject)
            .map_or(0, |s| subject_priority(&s.name));
        if priority >= CORE_PRIORITY {
            core += 1;
            if slot.period <= snap.morning_last_period {
                core_morning += 1;
            }
        }
    }
    let subject_distribution = if core > 0 {
        core_morning as f64 / core as f64 * 15.0
    } else {
        15.0
    };

    let room_assignment = if entries > 0 {
        (entries - conflicts.unassigned_rooms) as f64 / entries as f64 * 15.0
    } else {
        15.0
    };

    let raw = ScoreBreakdown {
        workload_balance,
        room_utilization,
        conflict_minimization,
        subject_distribution,
        room_assignment,
    };
    let overall = raw.total().clamp(0.0, 100.0);
    let breakdown = ScoreBreakdown {
        workload_balance: round2(raw.workload_balance),
        room_utilization: round2(raw.room_utilization),
        conflict_minimization: round2(raw.conflict_minimization),
        subject_distribution: round2(raw.subject_distribution),
        room_assignment: round2(raw.room_assignment),
    };
    OptimizationScore {
        overall: round2(overall),
        grade: LetterGrade::from_score(overall),
        recommendations: recommendations(&breakdown),
        breakdown,
    }
}

fn recommendations(b: &ScoreBreakdown) -> Vec<String> {
    let mut out = Vec::new();
    if b.workload_balance < 20.0 {
        out.push("Spread teaching periods more evenly over each teacher's week".to_string());
    }
    if b.room_utilization < 15.0 {
        out.push(
            "Rebalance room usage; some rooms sit idle while others are saturated".to_string(),
        );
    }
    if b.conflict_minimization < 20.0 {
        out.push("Resolve teacher and room double bookings".to_string());
    }
    if b.subject_distribution < 12.0 {
        out.push("Move high-priority subjects into the morning periods".to_string());
    }
    if b.room_assignment < 12.0 {
        out.push("Give every timetable entry a room".to_string());
    }
    out
}

pub fn slot_popularity(snap: &ScheduleSnapshot) -> SlotPopularityReport {
    type Usage = (usize, BTreeSet<TeacherId>, BTreeSet<SubjectId>);
    let mut usage: BTreeMap<(DayOfWeek, u32, TimeSlotId), Usage> = BTreeMap::new();
    for (a, slot) in snap.placed() {
        let e = usage.entry((slot.day, slot.period, slot.id)).or_default();
        e.0 += 1;
        e.1.insert(a.teacher);
        e.2.insert(a.subject);
    }
    let slots: Vec<SlotUsage> = usage
        .into_iter()
        .filter_map(|((day, period, id), (usage, teachers, subjects))| {
            let slot = snap.slots.get(&id)?;
            Some(SlotUsage {
                time_slot: id,
                day,
                period,
                start: slot.start,
                end: slot.end,
                usage,
                unique_teachers: teachers.len(),
                unique_subjects: subjects.len(),
            })
        })
        .collect();
    SlotPopularityReport {
        most_popular: most_by(&slots, |s| s.usage).map(|s| s.time_slot),
        least_popular: least_by(&slots, |s| s.usage).map(|s| s.time_slot),
        slots,
    }
}

pub fn class_density(snap: &ScheduleSnapshot) -> ClassDensityReport {
    let teaching = snap.teaching_slots();
    let mut acc: BTreeMap<ClassId, (usize, BTreeSet<SubjectId>, BTreeMap<DayOfWeek, usize>)> =
        BTreeMap::new();
    for a in snap.active() {
        let e = acc.entry(a.class).or_default();
        e.0 += 1;
        e.1.insert(a.subject);
        if let Some(slot) = snap.slots.get(&a.time_slot) {
            *e.2.entry(slot.day).or_default() += 1;
        }
    }
    let mut classes: Vec<ClassDensity> = acc
        .into_iter()
        .map(|(id, (total, subjects, daily))| {
            let (max_daily, min_daily, avg_daily) = spread(&daily);
            let class = snap.classes.get(&id);
            ClassDensity {
                class: id,
                name: class.map_or_else(|| format!("class {id}"), |c| c.name.clone()),
                grade: class.map(|c| c.grade),
                total_periods: total,
                free_periods: teaching.saturating_sub(total),
                unique_subjects: subjects.len(),
                max_daily,
                min_daily,
                avg_daily: round2(avg_daily),
            }
        })
        .collect();
    classes.sort_by_key(|c| (std::cmp::Reverse(c.total_periods), c.class));
    ClassDensityReport {
        busiest: most_by(&classes, |c| c.total_periods).map(|c| c.class),
        lightest: least_by(&classes, |c| c.total_periods).map(|c| c.class),
        classes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sched_core::testing;
    use types::DayOfWeek;

    fn assignment(
        id: u64,
        class: u64,
        subject: u64,
        teacher: u64,
        slot: u64,
        room: Option<u64>,
    ) -> ScheduledAssignment {
        let term = testing::term_t1();
        ScheduledAssignment {
            id: AssignmentId(id),
            class: ClassId(class),
            subject: SubjectId(subject),
            teacher: TeacherId(teacher),
            time_slot: TimeSlotId(slot),
            room: room.map(RoomId),
            term: term.id,
            effective_from: term.start_date,
            effective_to: term.end_date,
            is_active: true,
            created_by: None,
            created_at: Utc::now(),
        }
    }

    /// The small school with Math in periods 1-2 and English in period 3.
    fn committed() -> ScheduleSnapshot {
        let (term, parts) = testing::small_school();
        ScheduleSnapshot {
            term: Some(term),
            assignments: vec![
                assignment(1, 1, 1, 1, 1, Some(1)),
                assignment(2, 1, 1, 1, 2, Some(1)),
                assignment(3, 1, 2, 2, 3, Some(1)),
            ],
            substitutes: vec![],
            slots: parts.time_slots.into_iter().map(|s| (s.id, s)).collect(),
            rooms: parts.rooms.into_iter().map(|r| (r.id, r)).collect(),
            teachers: parts.teachers.into_iter().map(|t| (t.id, t)).collect(),
            subjects: parts.subjects.into_iter().map(|s| (s.id, s)).collect(),
            classes: parts.classes.into_iter().map(|c| (c.id, c)).collect(),
            grades: BTreeMap::new(),
            morning_last_period: 3,
        }
    }

    #[test]
    fn small_school_scores_an_a() {
        let snap = committed();
        let a = compute(TermId(1), 1, &snap);
        assert_eq!(a.score.breakdown.workload_balance, 25.0);
        // one room busy in every slot is over the 85 % band
        assert_eq!(a.score.breakdown.room_utilization, 12.5);
        assert_eq!(a.score.breakdown.conflict_minimization, 25.0);
        assert_eq!(a.score.breakdown.subject_distribution, 15.0);
        assert_eq!(a.score.breakdown.room_assignment, 15.0);
        assert!((a.score.overall - 92.5).abs() < 1e-9);
        assert_eq!(a.score.grade, LetterGrade::A);
        assert_eq!(a.score.recommendations.len(), 1);
    }

    #[test]
    fn workload_counts_days_and_balance() {
        let mut snap = committed();
        snap.slots.insert(TimeSlotId(4), testing::lesson(4, DayOfWeek::Tue, 1));
        snap.slots.insert(TimeSlotId(5), testing::lesson(5, DayOfWeek::Tue, 2));
        snap.assignments.push(assignment(4, 1, 1, 1, 4, Some(1)));
        snap.assignments.push(assignment(5, 1, 1, 1, 5, Some(1)));
        snap.assignments.push(assignment(6, 1, 2, 2, 4, None));

        let w = teacher_workload(&snap, None);
        assert_eq!(w.teachers[0].teacher, TeacherId(1));
        assert_eq!(w.teachers[0].total_periods, 4);
        assert_eq!(w.teachers[0].balance, 1.0);
        let b = &w.teachers[1];
        assert_eq!((b.max_daily, b.min_daily), (1, 1));
        assert_eq!(w.summary.most_loaded, Some(TeacherId(1)));
        assert_eq!(w.summary.least_loaded, Some(TeacherId(2)));
        assert_eq!(w.summary.average_periods, 3.0);
        assert_eq!(w.summary.variance, 1.0);

        let only = teacher_workload(&snap, Some(TeacherId(2)));
        assert_eq!(only.teachers.len(), 1);
        assert_eq!(only.teachers[0].daily.len(), 2);
    }

    #[test]
    fn uneven_days_lower_the_balance() {
        let mut snap = committed();
        snap.slots.insert(TimeSlotId(4), testing::lesson(4, DayOfWeek::Tue, 1));
        snap.assignments.push(assignment(4, 1, 2, 1, 4, Some(1)));
        let w = teacher_workload(&snap, Some(TeacherId(1)));
        assert_eq!(w.teachers[0].max_daily, 2);
        assert_eq!(w.teachers[0].min_daily, 1);
        assert_eq!(w.teachers[0].balance, 0.5);
    }

    #[test]
    fn double_bookings_are_grouped() {
        let mut snap = committed();
        snap.assignments.push(assignment(4, 2, 1, 1, 1, Some(1)));
        let r = conflict_report(&snap);
        assert_eq!(r.teacher_conflicts, 1);
        assert_eq!(r.room_conflicts, 1);
        assert_eq!(r.teacher_double_bookings.len(), 1);
        assert_eq!(
            r.teacher_double_bookings[0].assignments,
            vec![AssignmentId(1), AssignmentId(4)]
        );
        assert_eq!(r.room_double_bookings[0].room, Some(RoomId(1)));

        let a = compute(TermId(1), 2, &snap);
        // two double bookings over four entries
        assert_eq!(a.score.breakdown.conflict_minimization, 0.0);
    }

    #[test]
    fn rooms_use_per_slot_counting() {
        let mut snap = committed();
        snap.assignments[2].room = None;
        let r = room_utilization(&snap);
        assert_eq!(r.rooms.len(), 1);
        assert_eq!(r.rooms[0].periods_used, 2);
        assert_eq!(r.rooms[0].free_periods, 1);
        assert!((r.rooms[0].utilization_rate - 66.67).abs() < 1e-9);
        assert_eq!(r.peak_usage.len(), 2);

        let c = conflict_report(&snap);
        assert_eq!(c.unassigned_rooms, 1);
        let s = compute(TermId(1), 1, &snap).score;
        assert_eq!(s.breakdown.room_assignment, 10.0);
    }

    #[test]
    fn idle_rooms_are_listed_at_zero() {
        let mut snap = committed();
        snap.rooms.insert(RoomId(2), testing::room(2, "LAB", RoomType::Laboratory, 20));
        let mut closed = testing::room(3, "OLD", RoomType::Classroom, 30);
        closed.is_available = false;
        snap.rooms.insert(RoomId(3), closed);

        let r = room_utilization(&snap);
        let listed: Vec<_> = r.rooms.iter().map(|u| (u.room, u.periods_used)).collect();
        assert_eq!(listed, vec![(RoomId(1), 3), (RoomId(2), 0)]);
        assert_eq!(r.rooms[1].utilization_rate, 0.0);
        assert_eq!(r.rooms[1].free_periods, 3);
        assert_eq!(r.summary.rooms_in_use, 1);
        assert_eq!(r.summary.average_utilization_rate, 100.0);
        assert_eq!(r.summary.least_used, Some(RoomId(2)));
        assert_eq!(r.room_types.len(), 1);

        let s = compute(TermId(1), 1, &snap).score;
        assert_eq!(s.breakdown.room_utilization, 12.5);
    }

    #[test]
    fn afternoon_core_subjects_cost_points() {
        let mut snap = committed();
        snap.slots.insert(TimeSlotId(6), testing::lesson(6, DayOfWeek::Mon, 6));
        snap.assignments[1].time_slot = TimeSlotId(6);
        let s = compute(TermId(1), 1, &snap).score;
        assert_eq!(s.breakdown.subject_distribution, 10.0);
    }

    #[test]
    fn empty_schedule_is_graded() {
        let mut snap = committed();
        snap.assignments.clear();
        let a = compute(TermId(1), 0, &snap);
        assert_eq!(a.score.breakdown.workload_balance, 0.0);
        assert_eq!(a.score.breakdown.conflict_minimization, 25.0);
        assert_eq!(a.score.overall, 55.0);
        assert_eq!(a.score.grade, LetterGrade::F);
        assert!(a.slot_popularity.most_popular.is_none());
        assert!(a.class_density.busiest.is_none());
    }

    #[test]
    fn slot_popularity_and_density() {
        let mut snap = committed();
        snap.assignments.push(assignment(4, 2, 2, 2, 1, None));
        let p = slot_popularity(&snap);
        assert_eq!(p.slots.len(), 3);
        assert_eq!(p.most_popular, Some(TimeSlotId(1)));
        assert_eq!(p.least_popular, Some(TimeSlotId(2)));
        assert_eq!(p.slots[0].unique_teachers, 2);

        let d = class_density(&snap);
        assert_eq!(d.busiest, Some(ClassId(1)));
        assert_eq!(d.lightest, Some(ClassId(2)));
        assert_eq!(d.classes[0].free_periods, 0);
        assert_eq!(d.classes[1].free_periods, 2);
    }

    #[test]
    fn subjects_by_period_and_grade() {
        let snap = committed();
        let d = subject_distribution(&snap);
        assert_eq!(d.total_subjects, 2);
        assert_eq!(d.most_scheduled_periods, 2);
        assert_eq!(d.subjects[0].by_period.len(), 2);
        assert_eq!(d.grade_load[0].grade_name, "Grade 1");
        assert_eq!(d.grade_load[0].periods_per_week, 2);
    }
}
