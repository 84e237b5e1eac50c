use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::evolution::chromosome::Chromosome;

mod transition;
pub use transition::{
    apply_elitism, elite_size, evaluate, fittest, mean, mutate_population, next_generation,
    reduce_replace, tournament,
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionType {
    #[default]
    Tournament,
}

fn default_elitism() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EvolutionConfig {
    pub max_generations: usize,
    /// Probability that an individual is mutated at the end of a generation.
    pub mutation_rate: f64,
    /// Probability that a tournament pair is recombined instead of copied.
    pub crossover_rate: f64,
    /// Fitness at which the search stops early.
    pub threshold: f64,
    #[serde(default = "default_elitism")]
    pub elitism: bool,
    #[serde(default)]
    pub selection_type: SelectionType,
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid evolution parameter: {0}")]
pub struct BadParameter(pub String);

impl EvolutionConfig {
    /// Callers are expected to run this before building an engine; the engine
    /// trusts its configuration.
    pub fn validate(&self) -> Result<(), BadParameter> {
        if self.max_generations == 0 {
            return Err(BadParameter("max_generations must be positive".into()));
        }
        for (name, rate) in [
            ("mutation_rate", self.mutation_rate),
            ("crossover_rate", self.crossover_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(BadParameter(format!(
                    "{} must lie within [0, 1], got {}",
                    name, rate
                )));
            }
        }
        if self.threshold.is_nan() {
            return Err(BadParameter("threshold cannot be NaN".into()));
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum EvolutionError<E> {
    #[error("Initial population is empty, nothing to evolve.")]
    EmptyPopulation,
    #[error(transparent)]
    Chromosome(E),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct FitnessRecord {
    pub generation: usize,
    pub best_fitness: f64,
    pub mean_fitness: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    ThresholdReached,
    GenerationsExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A generation ran; more may follow.
    Advanced,
    Converged,
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct EvolutionResult<C> {
    /// Best individual seen over the whole run, not necessarily still alive.
    pub best: C,
    pub best_fitness: f64,
    /// One record per generation that went through selection; empty when the
    /// initial population already met the threshold.
    pub history: Vec<FitnessRecord>,
    pub generations_run: usize,
    /// `None` when the caller stopped stepping before the run terminated.
    pub termination: Option<Termination>,
}

/// Generational genetic algorithm over any [`Chromosome`].
///
/// Each generation: score the population, stop if its best meets the
/// threshold, otherwise record `(generation, best, mean)`, build the next
/// population with [`next_generation`] and update the all-time best.
///
/// The initial population must be non-empty and structurally consistent
/// (e.g. portfolios over the same assets and return matrix). Any fitness or
/// crossover error aborts the run and is returned as is.
#[derive(Debug)]
pub struct GeneticAlgorithm<C: Chromosome> {
    config: EvolutionConfig,
    population: Vec<C>,
    generation: usize,
    best: C,
    best_fitness: f64,
    history: Vec<FitnessRecord>,
    termination: Option<Termination>,
}

impl<C: Chromosome> GeneticAlgorithm<C> {
    pub fn new(
        population: Vec<C>,
        config: EvolutionConfig,
    ) -> Result<Self, EvolutionError<C::Error>> {
        let scores = evaluate(&population).map_err(EvolutionError::Chromosome)?;
        let (best_index, best_fitness) = fittest(&scores).ok_or(EvolutionError::EmptyPopulation)?;
        let best = population[best_index].clone();

        Ok(GeneticAlgorithm {
            config,
            population,
            generation: 0,
            best,
            best_fitness,
            history: Vec::new(),
            termination: None,
        })
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub fn population(&self) -> &[C] {
        &self.population
    }

    /// Index of the next generation to run.
    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn best(&self) -> &C {
        &self.best
    }

    pub fn best_fitness(&self) -> f64 {
        self.best_fitness
    }

    pub fn history(&self) -> &[FitnessRecord] {
        &self.history
    }

    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// Runs at most one generation. Once the run has terminated, further
    /// calls are no-ops reporting the same outcome.
    pub fn step<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<StepOutcome, EvolutionError<C::Error>> {
        match self.termination {
            Some(Termination::ThresholdReached) => return Ok(StepOutcome::Converged),
            Some(Termination::GenerationsExhausted) => return Ok(StepOutcome::Exhausted),
            None => {}
        }
        if self.generation >= self.config.max_generations {
            info!(
                "Stopping after {} generations, best fitness {:.6}.",
                self.generation, self.best_fitness
            );
            self.termination = Some(Termination::GenerationsExhausted);
            return Ok(StepOutcome::Exhausted);
        }

        let scores = evaluate(&self.population).map_err(EvolutionError::Chromosome)?;
        let (_, current_best) = fittest(&scores).ok_or(EvolutionError::EmptyPopulation)?;
        if current_best >= self.config.threshold {
            info!(
                "Generation {}: best fitness {:.6} reached threshold {:.6}.",
                self.generation, current_best, self.config.threshold
            );
            self.termination = Some(Termination::ThresholdReached);
            return Ok(StepOutcome::Converged);
        }

        let mean_fitness = mean(&scores);
        self.history.push(FitnessRecord {
            generation: self.generation,
            best_fitness: current_best,
            mean_fitness,
        });
        info!(
            "Generation {}: best fitness {:.6}, mean fitness {:.6}",
            self.generation, current_best, mean_fitness
        );

        let next = next_generation(&self.population, &scores, &self.config, rng)
            .map_err(EvolutionError::Chromosome)?;
        let next_scores = evaluate(&next).map_err(EvolutionError::Chromosome)?;
        if let Some((index, fitness)) = fittest(&next_scores) {
            if fitness > self.best_fitness {
                debug!(
                    "New best fitness {:.6} (was {:.6}).",
                    fitness, self.best_fitness
                );
                self.best = next[index].clone();
                self.best_fitness = fitness;
            }
        }
        self.population = next;
        self.generation += 1;
        Ok(StepOutcome::Advanced)
    }

    /// Steps until the threshold is met or `max_generations` have run.
    pub fn run<R: Rng + ?Sized>(
        mut self,
        rng: &mut R,
    ) -> Result<EvolutionResult<C>, EvolutionError<C::Error>> {
        while self.step(rng)? == StepOutcome::Advanced {}
        Ok(self.into_result())
    }

    pub fn into_result(self) -> EvolutionResult<C> {
        EvolutionResult {
            best: self.best,
            best_fitness: self.best_fitness,
            history: self.history,
            generations_run: self.generation,
            termination: self.termination,
        }
    }
}
