use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use sched_core::RunControl;
use tracing::debug;
use types::StopReason;

use crate::fitness::fitness;
use crate::greedy;
use crate::placement::{assign, Gene, Occupancy, Problem};

const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Clone, Debug)]
pub struct GeneticParams {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub tournament_size: usize,
    pub seed: u64,
}

#[derive(Clone, Debug)]
pub struct Individual {
    pub genes: Vec<Gene>,
    pub fitness: f64,
}

pub struct Evolution {
    pub best: Individual,
    pub generations_run: usize,
    pub stopped: Option<StopReason>,
}

/// Seed of the `i`-th greedy run in the initial population.
pub fn sub_seed(seed: u64, i: usize) -> u64 {
    seed ^ (i as u64 + 1).wrapping_mul(SEED_STRIDE)
}

pub fn evolve(problem: &Problem<'_>, params: &GeneticParams, control: &RunControl) -> Evolution {
    let size = params.population_size.max(1);

    let seeded: Vec<(Individual, Option<StopReason>)> = (0..size)
        .into_par_iter()
        .map(|i| {
            let mut rng = ChaCha8Rng::seed_from_u64(sub_seed(params.seed, i));
            let built = greedy::construct(problem, &mut rng, control);
            let fitness = fitness(problem, &built.genes);
            (
                Individual {
                    genes: built.genes,
                    fitness,
                },
                built.stopped,
            )
        })
        .collect();
    let mut stopped = seeded.iter().find_map(|(_, s)| *s);
    let mut population: Vec<Individual> = seeded.into_iter().map(|(ind, _)| ind).collect();
    let mut best = population[fittest(&population)].clone();
    let mut generations_run = 0;

    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let mut next = population.clone();
    if stopped.is_none() {
        for generation in 0..params.generations {
            if let Some(reason) = control.stop_reason() {
                stopped = Some(reason);
                break;
            }
            for child in next.iter_mut() {
                let p1 = tournament(&population, params.tournament_size, &mut rng);
                let p2 = tournament(&population, params.tournament_size, &mut rng);
                child.genes.clone_from(&population[p1].genes);
                let mut occ = crossover(
                    problem,
                    &mut child.genes,
                    &population[p2].genes,
                    params.crossover_rate,
                    &mut rng,
                );
                mutate(problem, &mut occ, &mut child.genes, params.mutation_rate, &mut rng);
                child.fitness = fitness(problem, &child.genes);
            }
            std::mem::swap(&mut population, &mut next);
            generations_run += 1;

            let leader = &population[fittest(&population)];
            if leader.fitness > best.fitness {
                best.clone_from(leader);
                debug!(generation, fitness = best.fitness, "new best individual");
            }
        }
    }

    Evolution {
        best,
        generations_run,
        stopped,
    }
}

fn chance<R: Rng + ?Sized>(rng: &mut R, p: f64) -> bool {
    rng.gen::<f64>() < p
}

/// Index of the first individual with the highest fitness.
fn fittest(pop: &[Individual]) -> usize {
    let mut best = 0;
    for (i, ind) in pop.iter().enumerate().skip(1) {
        if ind.fitness > pop[best].fitness {
            best = i;
        }
    }
    best
}

fn tournament<R: Rng + ?Sized>(pop: &[Individual], k: usize, rng: &mut R) -> usize {
    let mut best = rng.gen_range(0..pop.len());
    for _ in 1..k.max(1) {
        let i = rng.gen_range(0..pop.len());
        if pop[i].fitness > pop[best].fitness {
            best = i;
        }
    }
    best
}

/// Slot-wise crossover into `child`, which starts as a copy of the first
/// parent. A placement from `other` is taken only when it clashes with
/// nothing already in the child. Returns the child's occupancy.
fn crossover<R: Rng + ?Sized>(
    problem: &Problem<'_>,
    child: &mut [Gene],
    other: &[Gene],
    rate: f64,
    rng: &mut R,
) -> Occupancy {
    let mut occ = Occupancy::from_genes(problem, child);
    for (i, gene) in child.iter_mut().enumerate() {
        if !chance(rng, rate) {
            continue;
        }
        let theirs = other[i];
        if theirs.placed().is_none() || theirs == *gene {
            continue;
        }
        let mine = *gene;
        occ.remove(problem, i, mine);
        if occ.admits(problem, i, theirs) {
            occ.insert(problem, i, theirs);
            *gene = theirs;
        } else {
            occ.insert(problem, i, mine);
        }
    }
    occ
}

/// Drops each placement with probability `rate` and re-runs the primitive
/// for it against the remaining occupancy.
fn mutate<R: Rng + ?Sized>(
    problem: &Problem<'_>,
    occ: &mut Occupancy,
    genes: &mut [Gene],
    rate: f64,
    rng: &mut R,
) {
    for (i, gene) in genes.iter_mut().enumerate() {
        if !chance(rng, rate) {
            continue;
        }
        occ.remove(problem, i, *gene);
        *gene = assign(problem, occ, i, rng);
    }
}
