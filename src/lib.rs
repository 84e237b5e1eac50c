//! Mean-CVaR portfolio optimization with a generic genetic algorithm.
//!
//! [`returns::ReturnMatrix`] holds the historical data, [`portfolio::Portfolio`]
//! is the chromosome scored by [`evolution::objective::MeanCvar`], and
//! [`evolution::genetic_algorithm::GeneticAlgorithm`] evolves any type
//! implementing [`evolution::chromosome::Chromosome`].

pub mod config;
pub mod consts;
pub mod evolution;
pub mod portfolio;
pub mod profiles;
pub mod report;
pub mod returns;

pub use evolution::chromosome::Chromosome;
pub use evolution::genetic_algorithm::{EvolutionConfig, EvolutionResult, GeneticAlgorithm};
pub use portfolio::{Portfolio, PortfolioError, WeightVector};
pub use returns::ReturnMatrix;
