use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::consts::{DEFAULT_CONFIDENCE_LEVEL, DEFAULT_GENE_MUTATION_RATE, DEFAULT_RISK_FREE_RATE};
use crate::evolution::genetic_algorithm::{
    BadParameter, EvolutionConfig, EvolutionError, EvolutionResult, GeneticAlgorithm,
};
use crate::portfolio::{Portfolio, PortfolioError, WeightVector};
use crate::returns::ReturnMatrix;

#[derive(Error, Debug)]
pub enum PortfolioEvolutionError {
    #[error("Invalid population parameters were passed: {0}")]
    BadPopulationParameter(String),
    #[error(transparent)]
    BadEvolutionParameter(#[from] BadParameter),
    #[error(transparent)]
    Portfolio(#[from] PortfolioError),
    #[error(transparent)]
    Evolution(#[from] EvolutionError<PortfolioError>),
}

fn default_risk_free_rate() -> f64 {
    DEFAULT_RISK_FREE_RATE
}

fn default_confidence_level() -> f64 {
    DEFAULT_CONFIDENCE_LEVEL
}

fn default_gene_mutation_rate() -> f64 {
    DEFAULT_GENE_MUTATION_RATE
}

/// How the initial population of portfolios is drawn.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PopulationConfig {
    pub population_size: usize,
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
    #[serde(default = "default_gene_mutation_rate")]
    pub gene_mutation_rate: f64,
}

impl PopulationConfig {
    pub fn new(population_size: usize, risk_free_rate: f64) -> Self {
        PopulationConfig {
            population_size,
            risk_free_rate,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            gene_mutation_rate: DEFAULT_GENE_MUTATION_RATE,
        }
    }

    pub fn validate(&self) -> Result<(), PortfolioEvolutionError> {
        if self.population_size == 0 {
            return Err(PortfolioEvolutionError::BadPopulationParameter(
                "Population size cannot be zero".into(),
            ));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(PortfolioEvolutionError::BadPopulationParameter(format!(
                "Risk free rate must be finite, got {}",
                self.risk_free_rate
            )));
        }
        if !(self.confidence_level > 0. && self.confidence_level < 1.) {
            return Err(PortfolioEvolutionError::BadPopulationParameter(format!(
                "Confidence level must lie strictly between 0 and 1, got {}",
                self.confidence_level
            )));
        }
        if !(0.0..=1.0).contains(&self.gene_mutation_rate) {
            return Err(PortfolioEvolutionError::BadPopulationParameter(format!(
                "Gene mutation rate must lie within [0, 1], got {}",
                self.gene_mutation_rate
            )));
        }
        Ok(())
    }
}

/// Draws `population_size` portfolios with independent uniform `[0, 1]` raw
/// weights over every asset of `returns`. All of them share the matrix.
pub fn initialize_population<R: Rng + ?Sized>(
    config: &PopulationConfig,
    returns: &Arc<ReturnMatrix>,
    rng: &mut R,
) -> Result<Vec<Portfolio>, PortfolioEvolutionError> {
    config.validate()?;
    let template = WeightVector::uniform(returns);

    let population = (0..config.population_size)
        .map(|_| {
            Portfolio::random(&template, Arc::clone(returns), config.risk_free_rate, rng).map(
                |portfolio| {
                    portfolio
                        .with_confidence_level(config.confidence_level)
                        .with_gene_mutation_rate(config.gene_mutation_rate)
                },
            )
        })
        .collect::<Result<Vec<Portfolio>, PortfolioError>>()?;
    Ok(population)
}

/// Seeds a population over `returns` and evolves it to completion.
pub fn optimize_portfolio<R: Rng + ?Sized>(
    returns: &Arc<ReturnMatrix>,
    population: &PopulationConfig,
    evolution: &EvolutionConfig,
    rng: &mut R,
) -> Result<EvolutionResult<Portfolio>, PortfolioEvolutionError> {
    evolution.validate()?;
    let initial = initialize_population(population, returns, rng)?;
    info!(
        "Evolving {} portfolios over {} assets and {} periods.",
        initial.len(),
        returns.n_assets(),
        returns.n_periods()
    );

    let result = GeneticAlgorithm::new(initial, evolution.clone())?.run(rng)?;
    info!(
        "Best fitness {:.6} after {} generation(s).",
        result.best_fitness, result.generations_run
    );
    Ok(result)
}
