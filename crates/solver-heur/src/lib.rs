pub mod fitness;
pub mod genetic;
pub mod greedy;
pub mod placement;
pub mod slots;

use std::time::{Duration, Instant};

use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sched_core::config::OptimizerConfig;
use sched_core::{Catalog, RunControl, Scheduler, SchedulingError};
use tracing::info;
use types::{
    Algorithm, GenerationParams, SchedulingResult, StopReason, UnplacedReason, UnplacedSlot,
};

use crate::genetic::GeneticParams;
use crate::placement::{Gene, Problem};

/// Greedy and genetic timetable construction over a catalog snapshot.
#[derive(Clone, Debug, Default)]
pub struct HeurSolver {
    cfg: OptimizerConfig,
}

impl HeurSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(cfg: OptimizerConfig) -> Self {
        Self { cfg }
    }

    fn genetic_params(&self, params: &GenerationParams) -> GeneticParams {
        GeneticParams {
            population_size: params.population_size,
            generations: params.generations,
            mutation_rate: params.mutation_rate,
            crossover_rate: self.cfg.crossover_rate,
            tournament_size: self.cfg.tournament_size,
            seed: params.seed,
        }
    }
}

impl Scheduler for HeurSolver {
    fn generate(
        &self,
        catalog: &Catalog,
        algorithm: Algorithm,
        params: &GenerationParams,
        control: &RunControl,
    ) -> Result<SchedulingResult, SchedulingError> {
        let started = Instant::now();
        let problem = Problem::new(catalog, slots::required_slots(catalog));
        if !problem.is_empty() && catalog.time_slots.is_empty() {
            return Err(SchedulingError::InsufficientResources {
                resource: "time_slots".into(),
                required: problem.len(),
                available: 0,
            });
        }
        let control = match params.time_limit_secs {
            Some(secs) => control.clone().with_deadline(started + Duration::from_secs(secs)),
            None => control.clone(),
        };

        let (genes, generations_run, stopped) = match algorithm {
            Algorithm::Greedy => {
                let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
                let built = greedy::construct(&problem, &mut rng, &control);
                (built.genes, 0, built.stopped)
            }
            Algorithm::Genetic => {
                let evolved = genetic::evolve(&problem, &self.genetic_params(params), &control);
                (evolved.best.genes, evolved.generations_run, evolved.stopped)
            }
        };

        let result = summarize(&problem, algorithm, &genes, generations_run, stopped, started);
        info!(
            term = %catalog.term.id,
            %algorithm,
            assigned = result.assigned.len(),
            unassigned = result.unassigned.len(),
            conflicts = result.conflicts.len(),
            score = result.optimization_score,
            generations = result.generations_run,
            stopped = ?result.stopped,
            "timetable generated"
        );
        Ok(result)
    }
}

fn summarize(
    problem: &Problem<'_>,
    algorithm: Algorithm,
    genes: &[Gene],
    generations_run: usize,
    stopped: Option<StopReason>,
    started: Instant,
) -> SchedulingResult {
    let assessment = fitness::assess(problem, genes);
    let assigned = problem.placed_slots(genes);
    let unassigned: Vec<UnplacedSlot> = genes
        .iter()
        .enumerate()
        .filter_map(|(i, g)| {
            let reason = match g {
                Gene::Placed { .. } => return None,
                _ if !problem.info[i].teacher_active => UnplacedReason::TeacherInactive,
                Gene::Untried => UnplacedReason::NotAttempted,
                Gene::Unplaced => UnplacedReason::NoFeasiblePlacement,
            };
            Some(UnplacedSlot {
                slot: problem.slots[i].clone(),
                reason,
            })
        })
        .collect();
    let violations = assessment.evaluation.hard_violations();
    SchedulingResult {
        success: unassigned.is_empty() && assessment.conflicts.is_empty() && violations.is_empty(),
        algorithm,
        assigned,
        unassigned,
        conflicts: assessment.conflicts,
        violations,
        constraint_score: assessment.evaluation.score,
        optimization_score: assessment.fitness,
        execution_time: started.elapsed().as_secs_f64(),
        generations_run,
        stopped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sched_core::config::RulesConfig;
    use sched_core::testing;
    use serde_json::json;
    use types::{
        ConstraintId, ConstraintKind, RoomType, SchedulingConstraint, SubjectId, TeacherStatus,
    };

    fn small(f: impl FnOnce(&mut sched_core::CatalogParts)) -> Catalog {
        let (term, mut parts) = testing::small_school();
        f(&mut parts);
        Catalog::from_parts(term, parts, RulesConfig::default()).unwrap()
    }

    fn params(seed: u64) -> GenerationParams {
        GenerationParams {
            population_size: 8,
            generations: 10,
            seed,
            ..GenerationParams::default()
        }
    }

    fn stable(mut r: SchedulingResult) -> SchedulingResult {
        r.execution_time = 0.0;
        r
    }

    #[test]
    fn greedy_fills_the_small_school() {
        let cat = small(|_| {});
        let r = HeurSolver::new()
            .generate(&cat, Algorithm::Greedy, &params(1), &RunControl::new())
            .unwrap();
        assert!(r.success);
        assert_eq!(r.assigned.len(), 3);
        assert!(r.conflicts.is_empty());
        assert_eq!(r.constraint_score, 1.0);
        assert_eq!(r.optimization_score, 700.0);
        // priority order: both Math slots come first
        assert_eq!(r.assigned[0].slot.subject, SubjectId(1));
        assert_eq!(r.assigned[2].slot.subject, SubjectId(2));
    }

    #[test]
    fn genetic_fills_the_small_school() {
        let cat = small(|_| {});
        let r = HeurSolver::new()
            .generate(&cat, Algorithm::Genetic, &params(5), &RunControl::new())
            .unwrap();
        assert!(r.success);
        assert_eq!(r.generations_run, 10);
        assert_eq!(r.assigned.len(), 3);
    }

    #[test]
    fn hard_lab_requirement_without_a_lab_fails() {
        let cat = small(|p| {
            let mut physics = testing::subject(3, "Physics", 1);
            physics.preferred_room_type = Some(RoomType::Laboratory);
            p.subjects.push(physics);
            p.teachers.push(testing::teacher(3, "P"));
            p.authorizations.push(testing::authorize(3, 3, 1, 3));
            p.time_slots.push(testing::lesson(4, types::DayOfWeek::Mon, 4));
            p.constraints.push(SchedulingConstraint {
                id: ConstraintId(1),
                name: "physics in a lab".into(),
                kind: ConstraintKind::RoomRequirement,
                priority: 9,
                is_hard: true,
                is_active: true,
                parameters: json!({"subjects": [{"subject": 3, "room_types": ["laboratory"]}]}),
            });
        });
        for algorithm in [Algorithm::Greedy, Algorithm::Genetic] {
            let r = HeurSolver::new()
                .generate(&cat, algorithm, &params(2), &RunControl::new())
                .unwrap();
            assert!(!r.success);
            assert_eq!(r.unassigned.len(), 1);
            assert_eq!(r.unassigned[0].slot.subject, SubjectId(3));
            assert_eq!(r.unassigned[0].reason, UnplacedReason::NoFeasiblePlacement);
        }
    }

    #[test]
    fn inactive_teacher_is_reported() {
        let cat = small(|p| p.teachers[1].status = TeacherStatus::OnLeave);
        let r = HeurSolver::new()
            .generate(&cat, Algorithm::Greedy, &params(0), &RunControl::new())
            .unwrap();
        assert!(!r.success);
        assert_eq!(r.unassigned.len(), 1);
        assert_eq!(r.unassigned[0].reason, UnplacedReason::TeacherInactive);
    }

    #[test]
    fn no_time_slots_is_insufficient() {
        let cat = small(|p| p.time_slots.clear());
        let err = HeurSolver::new()
            .generate(&cat, Algorithm::Greedy, &params(0), &RunControl::new())
            .unwrap_err();
        assert_eq!(err.code(), "insufficient_time_slots");
    }

    #[test]
    fn cancelled_run_leaves_slots_untried() {
        let cat = small(|_| {});
        let control = RunControl::new();
        control.cancel();
        let r = HeurSolver::new()
            .generate(&cat, Algorithm::Greedy, &params(0), &control)
            .unwrap();
        assert_eq!(r.stopped, Some(StopReason::Cancelled));
        assert!(r.assigned.is_empty());
        assert!(r.unassigned.iter().all(|u| u.reason == UnplacedReason::NotAttempted));
        assert!(!r.success);
    }

    #[test]
    fn synthetic_school_has_no_double_bookings() {
        let (term, parts) = testing::synthetic_school(4, 6);
        let cat = Catalog::from_parts(term, parts, RulesConfig::default()).unwrap();
        let r = HeurSolver::new()
            .generate(&cat, Algorithm::Genetic, &params(11), &RunControl::new())
            .unwrap();
        assert!(r.conflicts.is_empty());
        assert!(r.success, "unassigned: {:?}", r.unassigned);
        for p in &r.assigned {
            if p.slot.subject == SubjectId(3) {
                assert_eq!(p.room.and_then(|id| cat.room_type(id)), Some(RoomType::Laboratory));
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn seeded_runs_are_reproducible(seed in any::<u64>(), genetic in any::<bool>()) {
            let (term, parts) = testing::synthetic_school(2, 4);
            let cat = Catalog::from_parts(term, parts, RulesConfig::default()).unwrap();
            let algorithm = if genetic { Algorithm::Genetic } else { Algorithm::Greedy };
            let solver = HeurSolver::new();
            let a = solver.generate(&cat, algorithm, &params(seed), &RunControl::new()).unwrap();
            let b = solver.generate(&cat, algorithm, &params(seed), &RunControl::new()).unwrap();
            prop_assert_eq!(stable(a), stable(b));
        }
    }
}
