pub mod aggregator;
pub mod chromosome;
pub mod genetic_algorithm;
pub mod objective;
pub mod portfolio_evolution;
