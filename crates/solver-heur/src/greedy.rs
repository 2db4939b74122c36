use rand::Rng;
use sched_core::RunControl;
use types::StopReason;

use crate::placement::{assign, Gene, Occupancy, Problem};

pub struct Construction {
    pub genes: Vec<Gene>,
    pub stopped: Option<StopReason>,
}

/// One pass of the assignment primitive over the priority-ordered slots.
/// The stop signal is consulted before every placement; slots after the
/// stop stay `Untried`.
pub fn construct<R: Rng + ?Sized>(
    problem: &Problem<'_>,
    rng: &mut R,
    control: &RunControl,
) -> Construction {
    let mut genes = vec![Gene::Untried; problem.len()];
    let mut occ = Occupancy::default();
    for (i, gene) in genes.iter_mut().enumerate() {
        if let Some(reason) = control.stop_reason() {
            return Construction {
                genes,
                stopped: Some(reason),
            };
        }
        *gene = assign(problem, &mut occ, i, rng);
    }
    Construction {
        genes,
        stopped: None,
    }
}
