use sched_core::conflicts;
use sched_core::scoring::{self, Evaluation};
use types::Conflict;

use crate::placement::{Gene, Problem};

const COMPLETION_WEIGHT: f64 = 400.0;
const CONSTRAINT_WEIGHT: f64 = 300.0;
const CONFLICT_PENALTY: f64 = 30.0;

pub struct Assessment {
    pub fitness: f64,
    pub conflicts: Vec<Conflict>,
    pub evaluation: Evaluation,
}

/// 400 x completion + 300 x constraint score - 30 x (conflicts + unmet hard
/// constraints). A problem without required slots counts as complete.
pub fn assess(problem: &Problem<'_>, genes: &[Gene]) -> Assessment {
    let placed = problem.placed_slots(genes);
    let sessions = problem.catalog.sessions_for(&placed);
    let conflicts = conflicts::detect(&sessions);
    let evaluation = scoring::evaluate(problem.catalog, &sessions);

    let ratio = if problem.is_empty() {
        1.0
    } else {
        placed.len() as f64 / problem.len() as f64
    };
    let penalties = conflicts.len() + evaluation.hard_violations().len();
    let fitness = COMPLETION_WEIGHT * ratio + CONSTRAINT_WEIGHT * evaluation.score
        - CONFLICT_PENALTY * penalties as f64;
    Assessment {
        fitness,
        conflicts,
        evaluation,
    }
}

pub fn fitness(problem: &Problem<'_>, genes: &[Gene]) -> f64 {
    assess(problem, genes).fitness
}
