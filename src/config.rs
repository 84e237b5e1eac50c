use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::consts::DEFAULT_RISK_FREE_RATE;
use crate::evolution::genetic_algorithm::{BadParameter, EvolutionConfig};
use crate::evolution::portfolio_evolution::{PopulationConfig, PortfolioEvolutionError};
use crate::profiles::InvestorProfile;
use crate::report::ReportOptions;
use crate::returns::{ReturnMatrix, ReturnMatrixError};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed run file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("A run file needs exactly one of `returns` or `prices`.")]
    DataSource,
    #[error("`{0}` is required when no profile is given.")]
    Missing(&'static str),
    #[error(transparent)]
    ReturnMatrix(#[from] ReturnMatrixError),
    #[error(transparent)]
    Evolution(#[from] BadParameter),
    #[error(transparent)]
    Population(#[from] PortfolioEvolutionError),
}

/// Price history; `null` marks a missing quote.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PriceTable {
    pub assets: Vec<String>,
    pub periods: Vec<String>,
    pub prices: Vec<Vec<Option<f64>>>,
}

impl PriceTable {
    pub fn to_returns(&self) -> Result<ReturnMatrix, ConfigError> {
        if let Some((period, row)) = self
            .periods
            .iter()
            .zip(self.prices.iter())
            .find(|(_, row)| row.len() != self.assets.len())
        {
            return Err(ReturnMatrixError::RaggedRow {
                period: period.clone(),
                expected: self.assets.len(),
                found: row.len(),
            }
            .into());
        }
        let flat = self
            .prices
            .iter()
            .flatten()
            .map(|price| price.unwrap_or(f64::NAN))
            .collect::<Vec<f64>>();
        let prices = Array2::from_shape_vec((self.prices.len(), self.assets.len()), flat)
            .map_err(ReturnMatrixError::from)?;

        Ok(ReturnMatrix::from_prices(
            self.assets.clone(),
            self.periods.clone(),
            prices,
        )?)
    }
}

/// Contents of a run file. Explicit fields take precedence over the profile.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunSettings {
    #[serde(default)]
    pub returns: Option<ReturnMatrix>,
    #[serde(default)]
    pub prices: Option<PriceTable>,
    #[serde(default)]
    pub profile: Option<InvestorProfile>,
    #[serde(default)]
    pub evolution: Option<EvolutionConfig>,
    #[serde(default)]
    pub population_size: Option<usize>,
    #[serde(default)]
    pub risk_free_rate: Option<f64>,
    #[serde(default)]
    pub confidence_level: Option<f64>,
    #[serde(default)]
    pub gene_mutation_rate: Option<f64>,
    /// Seed for the run's random generator; drawn from entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Keep only the best assets by mean return. Defaults to the profile's
    /// `max_assets` when a profile is set.
    #[serde(default)]
    pub top_assets: Option<usize>,
    #[serde(flatten)]
    pub report: ReportOptions,
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl RunSettings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.returns.is_some() == self.prices.is_some() {
            return Err(ConfigError::DataSource);
        }
        self.evolution_config()?.validate()?;
        self.population_config()?.validate()?;
        Ok(())
    }

    pub fn evolution_config(&self) -> Result<EvolutionConfig, ConfigError> {
        match (&self.evolution, self.profile) {
            (Some(evolution), _) => Ok(evolution.clone()),
            (None, Some(profile)) => Ok(profile.evolution_config()),
            (None, None) => Err(ConfigError::Missing("evolution")),
        }
    }

    pub fn population_config(&self) -> Result<PopulationConfig, ConfigError> {
        let mut config = match (self.profile, self.population_size) {
            (Some(profile), _) => profile.population_config(),
            (None, Some(size)) => PopulationConfig::new(size, DEFAULT_RISK_FREE_RATE),
            (None, None) => return Err(ConfigError::Missing("population_size")),
        };
        if let Some(size) = self.population_size {
            config.population_size = size;
        }
        if let Some(rate) = self.risk_free_rate {
            config.risk_free_rate = rate;
        }
        if let Some(level) = self.confidence_level {
            config.confidence_level = level;
        }
        if let Some(rate) = self.gene_mutation_rate {
            config.gene_mutation_rate = rate;
        }
        Ok(config)
    }

    /// The return matrix the run optimizes over, after asset filtering.
    pub fn return_matrix(&self) -> Result<ReturnMatrix, ConfigError> {
        let matrix = match (&self.returns, &self.prices) {
            (Some(returns), None) => returns.clone(),
            (None, Some(prices)) => prices.to_returns()?,
            _ => return Err(ConfigError::DataSource),
        };

        let limit = match (self.top_assets, self.profile) {
            (Some(n), _) => Some(n),
            (None, Some(profile)) => {
                let parameters = profile.parameters();
                if matrix.n_assets() < parameters.min_assets {
                    warn!(
                        "Only {} assets available, the {:?} profile expects at least {}.",
                        matrix.n_assets(),
                        profile,
                        parameters.min_assets
                    );
                }
                Some(parameters.max_assets.min(matrix.n_assets()))
            }
            (None, None) => None,
        };

        match limit {
            Some(n) if n < matrix.n_assets() => {
                info!(
                    "Keeping the top {} of {} assets by mean return.",
                    n,
                    matrix.n_assets()
                );
                Ok(matrix.top_by_mean_return(n)?)
            }
            Some(n) if n > matrix.n_assets() => Err(ReturnMatrixError::NotEnoughAssets {
                requested: n,
                available: matrix.n_assets(),
            }
            .into()),
            _ => Ok(matrix),
        }
    }
}
