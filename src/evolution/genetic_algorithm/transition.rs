//! One generation boundary, split into independently testable pieces:
//! tournament selection, reduce/replace, elitist splicing and mutation.

use rand::Rng;

use super::{EvolutionConfig, SelectionType};
use crate::consts::{ELITE_DIVISOR, TOURNAMENT_SIZE};
use crate::evolution::chromosome::Chromosome;

pub fn evaluate<C: Chromosome>(population: &[C]) -> Result<Vec<f64>, C::Error> {
    population.iter().map(Chromosome::fitness).collect()
}

/// Index and score of the best individual; the first one wins ties.
pub fn fittest(scores: &[f64]) -> Option<(usize, f64)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (index, score)| match best {
            Some((_, best_score)) if best_score.total_cmp(&score).is_ge() => best,
            _ => Some((index, score)),
        })
}

pub fn mean(scores: &[f64]) -> f64 {
    scores.iter().sum::<f64>() / scores.len() as f64
}

/// Indices sorted by score, best first. Stable, so ties keep population order.
fn ranked(scores: &[f64]) -> Vec<usize> {
    let mut order = (0..scores.len()).collect::<Vec<usize>>();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    order
}

pub fn elite_size(population_size: usize) -> usize {
    (population_size / ELITE_DIVISOR).max(1)
}

/// Draws `TOURNAMENT_SIZE` contestants uniformly with replacement and returns
/// the two fittest, best first. The same individual may be drawn twice.
pub fn tournament<'a, C, R>(population: &'a [C], scores: &[f64], rng: &mut R) -> (&'a C, &'a C)
where
    R: Rng + ?Sized,
{
    let contestants = (0..TOURNAMENT_SIZE)
        .map(|_| rng.gen_range(0..population.len()))
        .collect::<Vec<usize>>();
    let contestant_scores = contestants.iter().map(|&i| scores[i]).collect::<Vec<f64>>();
    let podium = ranked(&contestant_scores);

    (
        &population[contestants[podium[0]]],
        &population[contestants[podium[1]]],
    )
}

/// Builds a full offspring population from tournament pairs, each pair
/// recombined with probability `crossover_rate` and copied through otherwise.
pub fn reduce_replace<C, R>(
    population: &[C],
    scores: &[f64],
    crossover_rate: f64,
    rng: &mut R,
) -> Result<Vec<C>, C::Error>
where
    C: Chromosome,
    R: Rng + ?Sized,
{
    let target = population.len();
    let mut offspring = Vec::with_capacity(target + 1);

    while offspring.len() < target {
        let (first, second) = tournament(population, scores, rng);
        if rng.gen::<f64>() < crossover_rate {
            let (child_1, child_2) = first.crossover(second)?;
            offspring.push(child_1);
            offspring.push(child_2);
        } else {
            offspring.push(first.clone());
            offspring.push(second.clone());
        }
    }
    // pairs overshoot odd sizes by one
    offspring.truncate(target);
    Ok(offspring)
}

/// The `elite_size` best of `previous`, followed by the best of `offspring`
/// up to the previous population size. The worst offspring make room.
pub fn apply_elitism<C: Chromosome>(
    previous: &[C],
    previous_scores: &[f64],
    offspring: Vec<C>,
) -> Result<Vec<C>, C::Error> {
    let population_size = previous.len();
    let elites = elite_size(population_size).min(population_size);

    let offspring_scores = evaluate(&offspring)?;
    let mut offspring = offspring
        .into_iter()
        .map(Some)
        .collect::<Vec<Option<C>>>();

    let mut next = ranked(previous_scores)
        .into_iter()
        .take(elites)
        .map(|i| previous[i].clone())
        .collect::<Vec<C>>();
    next.extend(
        ranked(&offspring_scores)
            .into_iter()
            .take(population_size - elites)
            .filter_map(|i| offspring[i].take()),
    );
    Ok(next)
}

/// Each individual is mutated in place with probability `mutation_rate`.
pub fn mutate_population<C, R>(population: &mut [C], mutation_rate: f64, rng: &mut R)
where
    C: Chromosome,
    R: Rng + ?Sized,
{
    for individual in population.iter_mut() {
        if rng.gen::<f64>() < mutation_rate {
            individual.mutate(rng);
        }
    }
}

/// `(population, scores, config, rng) -> next population`: selection and
/// replacement, optional elitism, then mutation. `scores` must be the
/// fitness of `population`, index for index.
pub fn next_generation<C, R>(
    population: &[C],
    scores: &[f64],
    config: &EvolutionConfig,
    rng: &mut R,
) -> Result<Vec<C>, C::Error>
where
    C: Chromosome,
    R: Rng + ?Sized,
{
    let offspring = match config.selection_type {
        SelectionType::Tournament => {
            reduce_replace(population, scores, config.crossover_rate, rng)?
        }
    };
    let mut next = if config.elitism {
        apply_elitism(population, scores, offspring)?
    } else {
        offspring
    };
    mutate_population(&mut next, config.mutation_rate, rng);
    Ok(next)
}
