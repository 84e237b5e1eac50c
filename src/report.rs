use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{DEFAULT_EQUITY_WINDOW, TRADING_DAYS_PER_YEAR};
use crate::evolution::aggregator::{Aggregator, AggregatorError, StandardDeviation};
use crate::evolution::genetic_algorithm::{EvolutionResult, FitnessRecord, Termination};
use crate::portfolio::{Portfolio, PortfolioError};
use crate::profiles::InvestorProfile;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Initial capital must be positive and finite, got {0}.")]
    InvalidCapital(f64),
    #[error(transparent)]
    Portfolio(#[from] PortfolioError),
    #[error(transparent)]
    Aggregation(#[from] AggregatorError),
    #[error("Invalid benchmark `{name}`: {reason}")]
    InvalidBenchmark { name: String, reason: String },
}

fn default_initial_capital() -> f64 {
    10_000.
}

fn default_equity_window() -> usize {
    DEFAULT_EQUITY_WINDOW
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReportOptions {
    #[serde(default = "default_initial_capital")]
    pub initial_capital: f64,
    /// Number of trailing periods replayed in the equity curve.
    #[serde(default = "default_equity_window")]
    pub equity_window: usize,
    /// Reference index replayed over the same window as the portfolio.
    #[serde(default)]
    pub benchmark: Option<BenchmarkSeries>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        ReportOptions {
            initial_capital: default_initial_capital(),
            equity_window: default_equity_window(),
            benchmark: None,
        }
    }
}

/// A market index given either as closing prices or as period returns,
/// one value per period label.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BenchmarkSeries {
    pub name: String,
    pub periods: Vec<String>,
    #[serde(default)]
    pub prices: Option<Vec<f64>>,
    #[serde(default)]
    pub returns: Option<Vec<f64>>,
}

impl BenchmarkSeries {
    fn invalid(&self, reason: impl Into<String>) -> ReportError {
        ReportError::InvalidBenchmark {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Labelled period returns. Prices become simple returns, which consumes
    /// the first period; non-finite returns are skipped.
    pub fn period_returns(&self) -> Result<(Vec<String>, Vec<f64>), ReportError> {
        let (periods, returns): (&[String], Vec<f64>) = match (&self.prices, &self.returns) {
            (Some(prices), None) => {
                if prices.len() != self.periods.len() {
                    return Err(self.invalid(format!(
                        "{} prices for {} periods",
                        prices.len(),
                        self.periods.len()
                    )));
                }
                let returns = prices
                    .iter()
                    .tuple_windows()
                    .map(|(previous, next)| next / previous - 1.)
                    .collect();
                (self.periods.get(1..).unwrap_or_default(), returns)
            }
            (None, Some(returns)) => {
                if returns.len() != self.periods.len() {
                    return Err(self.invalid(format!(
                        "{} returns for {} periods",
                        returns.len(),
                        self.periods.len()
                    )));
                }
                (self.periods.as_slice(), returns.clone())
            }
            _ => return Err(self.invalid("exactly one of `prices` or `returns` is required")),
        };

        let (periods, returns): (Vec<String>, Vec<f64>) = periods
            .iter()
            .zip(returns)
            .filter(|(_, r)| r.is_finite())
            .map(|(period, r)| (period.clone(), r))
            .unzip();
        if returns.is_empty() {
            return Err(self.invalid("no usable returns"));
        }
        Ok((periods, returns))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AllocationEntry {
    pub asset: String,
    pub weight: f64,
    /// Share of the initial capital placed in the asset.
    pub amount: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub period: String,
    pub value: f64,
}

/// Summary of an optimization run, centred on its best portfolio.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OptimizationReport {
    pub profile: Option<InvestorProfile>,
    pub profile_description: Option<String>,
    /// Normalized weights, largest first.
    pub allocation: Vec<AllocationEntry>,
    pub fitness: f64,
    pub expected_return: f64,
    pub value_at_risk: f64,
    pub conditional_value_at_risk: f64,
    /// Sample standard deviation of the historical returns scaled by
    /// `sqrt(252)`. Absent with fewer than two periods.
    pub annualized_volatility: Option<f64>,
    pub generations_executed: usize,
    pub converged: bool,
    pub termination: Option<Termination>,
    pub history: Vec<FitnessRecord>,
    pub initial_capital: f64,
    pub equity_curve: Vec<EquityPoint>,
    pub benchmark: Option<String>,
    /// The benchmark's `capital * cumprod(1 + r)` over its own trailing
    /// `equity_window` returns.
    pub benchmark_curve: Option<Vec<EquityPoint>>,
}

impl OptimizationReport {
    pub fn build(
        result: &EvolutionResult<Portfolio>,
        threshold: f64,
        options: &ReportOptions,
    ) -> Result<Self, ReportError> {
        if !(options.initial_capital.is_finite() && options.initial_capital > 0.) {
            return Err(ReportError::InvalidCapital(options.initial_capital));
        }
        let best = &result.best;
        let profile = best.risk_profile()?;
        let weights = best.weights()?;

        let allocation = weights
            .iter()
            .sorted_by(|(_, a), (_, b)| b.total_cmp(a))
            .map(|(asset, weight)| AllocationEntry {
                asset: asset.to_string(),
                weight,
                amount: weight * options.initial_capital,
            })
            .collect::<Vec<AllocationEntry>>();

        let series = best.historical_returns()?.to_vec();
        let annualized_volatility = if series.len() > 1 {
            Some(StandardDeviation.value(&series)? * TRADING_DAYS_PER_YEAR.sqrt())
        } else {
            None
        };

        let portfolio_curve = equity_curve(
            best.returns().periods(),
            &series,
            options.initial_capital,
            options.equity_window,
        );
        let benchmark_curve = options
            .benchmark
            .as_ref()
            .map(|benchmark| {
                benchmark.period_returns().map(|(periods, returns)| {
                    equity_curve(
                        &periods,
                        &returns,
                        options.initial_capital,
                        options.equity_window,
                    )
                })
            })
            .transpose()?;

        Ok(OptimizationReport {
            profile: None,
            profile_description: None,
            allocation,
            fitness: profile.fitness,
            expected_return: profile.expected_return,
            value_at_risk: profile.value_at_risk,
            conditional_value_at_risk: profile.conditional_value_at_risk,
            annualized_volatility,
            generations_executed: result.generations_run,
            converged: result.best_fitness >= threshold,
            termination: result.termination,
            history: result.history.clone(),
            initial_capital: options.initial_capital,
            equity_curve: portfolio_curve,
            benchmark: options.benchmark.as_ref().map(|b| b.name.clone()),
            benchmark_curve,
        })
    }

    pub fn with_profile(mut self, profile: Option<InvestorProfile>) -> Self {
        self.profile = profile;
        self.profile_description = profile.map(|p| p.description().to_string());
        self
    }

    /// Last value of the equity curve, or the initial capital if it is empty.
    pub fn final_value(&self) -> f64 {
        self.equity_curve
            .last()
            .map_or(self.initial_capital, |point| point.value)
    }

    pub fn benchmark_final_value(&self) -> Option<f64> {
        self.benchmark_curve.as_ref().map(|curve| {
            curve
                .last()
                .map_or(self.initial_capital, |point| point.value)
        })
    }
}

/// `capital * cumprod(1 + r)` over the trailing `window` returns.
fn equity_curve(periods: &[String], series: &[f64], capital: f64, window: usize) -> Vec<EquityPoint> {
    let start = series.len().saturating_sub(window);
    periods[start..]
        .iter()
        .zip(series[start..].iter())
        .scan(capital, |value, (period, r)| {
            *value *= 1. + r;
            Some(EquityPoint {
                period: period.clone(),
                value: *value,
            })
        })
        .collect()
}
