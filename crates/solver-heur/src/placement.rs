//! The assignment primitive shared by both algorithms, plus the occupancy
//! maps it places against.

use std::collections::{BTreeSet, HashMap, HashSet};

use rand::Rng;
use sched_core::Catalog;
use types::{ClassId, DayOfWeek, PlacedSlot, RequiredSlot, RoomType, SubjectId, TeacherId};

const MORNING_BONUS: i32 = 20;
const ROOM_MATCH_BONUS: i32 = 25;
const SNUG_FIT_BONUS: i32 = 15;
const OVERCROWDED_PENALTY: i32 = 30;

/// Placement of one required slot: positions into `catalog.time_slots` and
/// `catalog.rooms`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Gene {
    Untried,
    Unplaced,
    Placed { slot: usize, room: Option<usize> },
}

impl Gene {
    pub fn placed(self) -> Option<(usize, Option<usize>)> {
        match self {
            Gene::Placed { slot, room } => Some((slot, room)),
            _ => None,
        }
    }
}

/// Static facts about one required slot, computed once per run.
#[derive(Clone, Debug)]
pub struct SlotInfo {
    pub students: u32,
    pub preferred: Vec<RoomType>,
    pub hard_rooms: Option<BTreeSet<RoomType>>,
    pub daily_cap: Option<u32>,
    pub teacher_active: bool,
}

/// Everything the optimizer reads during a run.
pub struct Problem<'a> {
    pub catalog: &'a Catalog,
    pub slots: Vec<RequiredSlot>,
    pub info: Vec<SlotInfo>,
}

impl<'a> Problem<'a> {
    pub fn new(catalog: &'a Catalog, slots: Vec<RequiredSlot>) -> Self {
        let info = slots
            .iter()
            .map(|s| {
                let hard_rooms = catalog.constraints.hard_room_types(s.subject);
                let mut preferred = catalog.preferred_room_types(s.subject);
                if let Some(hard) = &hard_rooms {
                    preferred.retain(|t| hard.contains(t));
                    if preferred.is_empty() {
                        preferred.extend(hard.iter().copied());
                    }
                }
                SlotInfo {
                    students: catalog.class(s.class).map_or(0, |c| c.student_count),
                    preferred,
                    hard_rooms,
                    daily_cap: catalog.constraints.hard_daily_limit(s.subject),
                    teacher_active: catalog.teacher(s.teacher).is_some_and(|t| t.is_active()),
                }
            })
            .collect();
        Self {
            catalog,
            slots,
            info,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn placed_slot(&self, i: usize, gene: Gene) -> Option<PlacedSlot> {
        let (pos, room) = gene.placed()?;
        let ts = &self.catalog.time_slots[pos];
        Some(PlacedSlot {
            slot: self.slots[i].clone(),
            time_slot: ts.id,
            day: ts.day,
            period: ts.period,
            room: room.map(|r| self.catalog.rooms[r].id),
        })
    }

    pub fn placed_slots(&self, genes: &[Gene]) -> Vec<PlacedSlot> {
        genes
            .iter()
            .enumerate()
            .filter_map(|(i, g)| self.placed_slot(i, *g))
            .collect()
    }
}

#[derive(Default, Clone, Debug)]
pub struct Occupancy {
    teacher: HashSet<(TeacherId, usize)>,
    class: HashSet<(ClassId, usize)>,
    room: HashSet<(usize, usize)>,
    daily: HashMap<(ClassId, SubjectId, DayOfWeek), u32>,
}

impl Occupancy {
    pub fn from_genes(problem: &Problem<'_>, genes: &[Gene]) -> Self {
        let mut occ = Self::default();
        for (i, g) in genes.iter().enumerate() {
            occ.insert(problem, i, *g);
        }
        occ
    }

    /// Whether `gene` can be added without a double booking or exceeding a
    /// hard daily cap. Static checks are the primitive's concern.
    pub fn admits(&self, problem: &Problem<'_>, i: usize, gene: Gene) -> bool {
        let Some((pos, room)) = gene.placed() else {
            return true;
        };
        let s = &problem.slots[i];
        if self.teacher.contains(&(s.teacher, pos)) || self.class.contains(&(s.class, pos)) {
            return false;
        }
        if room.is_some_and(|r| self.room.contains(&(r, pos))) {
            return false;
        }
        match problem.info[i].daily_cap {
            Some(cap) => self.daily_count(s, problem.catalog.time_slots[pos].day) < cap,
            None => true,
        }
    }

    pub fn insert(&mut self, problem: &Problem<'_>, i: usize, gene: Gene) {
        let Some((pos, room)) = gene.placed() else {
            return;
        };
        let s = &problem.slots[i];
        self.teacher.insert((s.teacher, pos));
        self.class.insert((s.class, pos));
        if let Some(r) = room {
            self.room.insert((r, pos));
        }
        let day = problem.catalog.time_slots[pos].day;
        *self.daily.entry((s.class, s.subject, day)).or_default() += 1;
    }

    pub fn remove(&mut self, problem: &Problem<'_>, i: usize, gene: Gene) {
        let Some((pos, room)) = gene.placed() else {
            return;
        };
        let s = &problem.slots[i];
        self.teacher.remove(&(s.teacher, pos));
        self.class.remove(&(s.class, pos));
        if let Some(r) = room {
            self.room.remove(&(r, pos));
        }
        let day = problem.catalog.time_slots[pos].day;
        if let Some(n) = self.daily.get_mut(&(s.class, s.subject, day)) {
            *n = n.saturating_sub(1);
        }
    }

    fn daily_count(&self, s: &RequiredSlot, day: DayOfWeek) -> u32 {
        self.daily.get(&(s.class, s.subject, day)).copied().unwrap_or(0)
    }

    fn room_free(&self, room: usize, pos: usize) -> bool {
        !self.room.contains(&(room, pos))
    }
}

enum RoomChoice {
    Room(usize),
    NoRoom,
    Blocked,
}

fn suitable_room(problem: &Problem<'_>, occ: &Occupancy, i: usize, pos: usize) -> RoomChoice {
    let info = &problem.info[i];
    let rooms = &problem.catalog.rooms;
    let fits = |r: usize| occ.room_free(r, pos) && rooms[r].capacity >= info.students;

    let preferred = (0..rooms.len())
        .find(|&r| fits(r) && info.preferred.contains(&rooms[r].room_type));
    if let Some(r) = preferred {
        return RoomChoice::Room(r);
    }
    let classroom_ok = info
        .hard_rooms
        .as_ref()
        .map_or(true, |h| h.contains(&RoomType::Classroom));
    if classroom_ok {
        let classroom = (0..rooms.len())
            .find(|&r| fits(r) && rooms[r].room_type == RoomType::Classroom);
        if let Some(r) = classroom {
            return RoomChoice::Room(r);
        }
    }
    if info.hard_rooms.is_some() {
        RoomChoice::Blocked
    } else {
        RoomChoice::NoRoom
    }
}

fn local_score(problem: &Problem<'_>, i: usize, period: u32, room: Option<usize>) -> i32 {
    let s = &problem.slots[i];
    let info = &problem.info[i];
    let mut score = 0;
    if s.priority >= 8 && period <= problem.catalog.rules.morning_last_period {
        score += MORNING_BONUS;
    }
    if let Some(r) = room {
        let room = &problem.catalog.rooms[r];
        if info.preferred.contains(&room.room_type) {
            score += ROOM_MATCH_BONUS;
        }
        let (students, capacity) = (u64::from(info.students), u64::from(room.capacity));
        if students > capacity {
            score -= OVERCROWDED_PENALTY;
        } else if capacity > 0 && students * 10 >= capacity * 7 {
            score += SNUG_FIT_BONUS;
        }
    }
    score
}

/// Tries every schedulable time slot for required slot `i` and places it at
/// the best-scoring candidate, breaking ties uniformly with `rng`. On
/// success the occupancy is updated.
pub fn assign<R: Rng + ?Sized>(
    problem: &Problem<'_>,
    occ: &mut Occupancy,
    i: usize,
    rng: &mut R,
) -> Gene {
    let s = &problem.slots[i];
    let info = &problem.info[i];
    if !info.teacher_active {
        return Gene::Unplaced;
    }
    let constraints = &problem.catalog.constraints;

    let mut best: Option<(i32, Gene)> = None;
    let mut ties = 0u32;
    for (pos, ts) in problem.catalog.time_slots.iter().enumerate() {
        if occ.teacher.contains(&(s.teacher, pos)) || occ.class.contains(&(s.class, pos)) {
            continue;
        }
        if !constraints.hard_allows_teacher(s.teacher, ts.day, ts.period)
            || !constraints.hard_allows_period(s.subject, s.priority, ts.period)
        {
            continue;
        }
        if info.daily_cap.is_some_and(|cap| occ.daily_count(s, ts.day) >= cap) {
            continue;
        }
        let room = match suitable_room(problem, occ, i, pos) {
            RoomChoice::Room(r) => Some(r),
            RoomChoice::NoRoom => None,
            RoomChoice::Blocked => continue,
        };
        let score = local_score(problem, i, ts.period, room);
        let gene = Gene::Placed { slot: pos, room };
        match best {
            Some((b, _)) if score < b => {}
            Some((b, _)) if score == b => {
                ties += 1;
                if rng.gen_range(0..ties) == 0 {
                    best = Some((score, gene));
                }
            }
            _ => {
                best = Some((score, gene));
                ties = 1;
            }
        }
    }

    match best {
        Some((_, gene)) => {
            occ.insert(problem, i, gene);
            gene
        }
        None => Gene::Unplaced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::required_slots;
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use sched_core::config::RulesConfig;
    use sched_core::testing;
    use serde_json::json;
    use types::{ConstraintId, ConstraintKind, SchedulingConstraint};

    fn hard_lab_for(subject: u64) -> SchedulingConstraint {
        SchedulingConstraint {
            id: ConstraintId(1),
            name: "labs".into(),
            kind: ConstraintKind::RoomRequirement,
            priority: 8,
            is_hard: true,
            is_active: true,
            parameters: json!({"subjects": [{"subject": subject, "room_types": ["laboratory"]}]}),
        }
    }

    #[test]
    fn prefers_morning_and_blocks_double_booking() {
        let (term, parts) = testing::small_school();
        let cat = Catalog::from_parts(term, parts, RulesConfig::default()).unwrap();
        let problem = Problem::new(&cat, required_slots(&cat));
        let mut occ = Occupancy::default();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let genes: Vec<Gene> = (0..problem.len())
            .map(|i| assign(&problem, &mut occ, i, &mut rng))
            .collect();
        let slots: BTreeSet<usize> =
            genes.iter().filter_map(|g| g.placed()).map(|(s, _)| s).collect();
        assert_eq!(slots.len(), 3);
        assert!(genes.iter().all(|g| matches!(g, Gene::Placed { room: Some(0), .. })));
    }

    #[test]
    fn hard_room_requirement_never_falls_back() {
        let (term, mut parts) = testing::small_school();
        parts.subjects.push(testing::subject(3, "Physics", 1));
        parts.teachers.push(testing::teacher(3, "P"));
        parts.authorizations.push(testing::authorize(3, 3, 1, 3));
        parts.constraints.push(hard_lab_for(3));
        let cat = Catalog::from_parts(term, parts, RulesConfig::default()).unwrap();
        let problem = Problem::new(&cat, required_slots(&cat));
        let physics = problem.slots.iter().position(|s| s.subject == SubjectId(3)).unwrap();

        let mut occ = Occupancy::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(assign(&problem, &mut occ, physics, &mut rng), Gene::Unplaced);
    }

    #[test]
    fn soft_preference_without_matching_room_uses_classroom() {
        let (term, mut parts) = testing::small_school();
        parts.subjects[0].preferred_room_type = Some(RoomType::Laboratory);
        let cat = Catalog::from_parts(term, parts, RulesConfig::default()).unwrap();
        let problem = Problem::new(&cat, required_slots(&cat));
        let mut occ = Occupancy::default();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!(matches!(
            assign(&problem, &mut occ, 0, &mut rng),
            Gene::Placed { room: Some(0), .. }
        ));
    }

    #[test]
    fn no_fitting_room_places_without_room() {
        let (term, mut parts) = testing::small_school();
        parts.classes[0].student_count = 40;
        let cat = Catalog::from_parts(term, parts, RulesConfig::default()).unwrap();
        let problem = Problem::new(&cat, required_slots(&cat));
        let mut occ = Occupancy::default();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!(matches!(
            assign(&problem, &mut occ, 0, &mut rng),
            Gene::Placed { room: None, .. }
        ));
    }

    #[test]
    fn removing_a_gene_frees_its_slot() {
        let (term, parts) = testing::small_school();
        let cat = Catalog::from_parts(term, parts, RulesConfig::default()).unwrap();
        let problem = Problem::new(&cat, required_slots(&cat));
        let mut occ = Occupancy::default();
        let gene = Gene::Placed { slot: 0, room: Some(0) };
        occ.insert(&problem, 0, gene);
        assert!(!occ.admits(&problem, 1, gene));
        occ.remove(&problem, 0, gene);
        assert!(occ.admits(&problem, 1, gene));
    }
}
