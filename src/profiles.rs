use serde::{Deserialize, Serialize};

use crate::evolution::genetic_algorithm::{EvolutionConfig, SelectionType};
use crate::evolution::portfolio_evolution::PopulationConfig;

/// Risk-rate used by every preset (Selic-like annual rate).
pub const PROFILE_RISK_FREE_RATE: f64 = 0.1075;

/// Preset run parameters for a class of investor.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InvestorProfile {
    Conservative,
    Moderate,
    Aggressive,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProfileParameters {
    pub risk_free_rate: f64,
    pub max_generations: usize,
    pub population_size: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub threshold: f64,
    pub min_assets: usize,
    pub max_assets: usize,
}

impl InvestorProfile {
    pub const ALL: [InvestorProfile; 3] = [
        InvestorProfile::Conservative,
        InvestorProfile::Moderate,
        InvestorProfile::Aggressive,
    ];

    pub fn description(&self) -> &'static str {
        match self {
            InvestorProfile::Conservative => {
                "Capital preservation first, lower volatility, a stable search."
            }
            InvestorProfile::Moderate => "Balanced between risk and return.",
            InvestorProfile::Aggressive => {
                "Return maximization, accepts higher volatility, explores widely."
            }
        }
    }

    pub fn parameters(&self) -> ProfileParameters {
        match self {
            InvestorProfile::Conservative => ProfileParameters {
                risk_free_rate: PROFILE_RISK_FREE_RATE,
                max_generations: 30,
                population_size: 50,
                mutation_rate: 0.15,
                crossover_rate: 0.7,
                threshold: 0.15,
                min_assets: 8,
                max_assets: 12,
            },
            InvestorProfile::Moderate => ProfileParameters {
                risk_free_rate: PROFILE_RISK_FREE_RATE,
                max_generations: 40,
                population_size: 75,
                mutation_rate: 0.2,
                crossover_rate: 0.8,
                threshold: 0.12,
                min_assets: 10,
                max_assets: 15,
            },
            InvestorProfile::Aggressive => ProfileParameters {
                risk_free_rate: PROFILE_RISK_FREE_RATE,
                max_generations: 50,
                population_size: 100,
                mutation_rate: 0.25,
                crossover_rate: 0.85,
                threshold: 0.1,
                min_assets: 12,
                max_assets: 18,
            },
        }
    }

    /// Tournament selection with elitism, using the profile's rates.
    pub fn evolution_config(&self) -> EvolutionConfig {
        let parameters = self.parameters();
        EvolutionConfig {
            max_generations: parameters.max_generations,
            mutation_rate: parameters.mutation_rate,
            crossover_rate: parameters.crossover_rate,
            threshold: parameters.threshold,
            elitism: true,
            selection_type: SelectionType::Tournament,
        }
    }

    pub fn population_config(&self) -> PopulationConfig {
        let parameters = self.parameters();
        PopulationConfig::new(parameters.population_size, parameters.risk_free_rate)
    }
}
