use itertools::Itertools;
use statrs::statistics::Statistics;
use thiserror::Error;

/// Aggregator trait which reduces a return series to a single f64.
/// Expected return, VaR and CVaR are all a portfolio return series plus one
/// of these.
pub trait Aggregator: Sync + Send {
    fn value(&self, series: &[f64]) -> Result<f64, AggregatorError>;
}

#[derive(Error, Debug, PartialEq)]
pub enum AggregatorError {
    #[error("Cannot aggregate an empty series.")]
    EmptySeries,
    #[error("Number of periods is invalid for aggregator: `{0}`")]
    InvalidNumberOfPeriods(String),
    #[error("Percentile must lie within [0, 100], got {0}.")]
    InvalidPercentile(f64),
    #[error("Confidence level must lie within [0, 1], got {0}.")]
    InvalidConfidenceLevel(f64),
}

pub struct ArithmeticMean;
impl Aggregator for ArithmeticMean {
    fn value(&self, series: &[f64]) -> Result<f64, AggregatorError> {
        if series.is_empty() {
            return Err(AggregatorError::EmptySeries);
        }
        Ok(series.iter().sum::<f64>() / (series.len() as f64))
    }
}

/// Sample standard deviation (n - 1 denominator).
pub struct StandardDeviation;
impl Aggregator for StandardDeviation {
    fn value(&self, series: &[f64]) -> Result<f64, AggregatorError> {
        if series.len() <= 1 {
            return Err(AggregatorError::InvalidNumberOfPeriods(
                "Standard deviation cannot be computed for series with less than 2 elements."
                    .into(),
            ));
        }
        Ok(series.iter().std_dev())
    }
}

/// Percentile with linear interpolation between the two closest ranks
/// (rank = p / 100 * (n - 1)), the same estimator numpy uses by default.
pub struct Percentile(pub f64);
impl Aggregator for Percentile {
    fn value(&self, series: &[f64]) -> Result<f64, AggregatorError> {
        if series.is_empty() {
            return Err(AggregatorError::EmptySeries);
        }
        if !(0.0..=100.0).contains(&self.0) {
            return Err(AggregatorError::InvalidPercentile(self.0));
        }
        let sorted = series
            .iter()
            .copied()
            .sorted_by(|a, b| a.total_cmp(b))
            .collect::<Vec<f64>>();

        let rank = self.0 / 100. * (sorted.len() - 1) as f64;
        let lower = sorted[rank.floor() as usize];
        let upper = sorted[rank.ceil() as usize];
        let t = rank - rank.floor();
        let spread = upper - lower;

        // interpolate from the nearer end, keeps the result monotone in t
        if t >= 0.5 {
            Ok(upper - spread * (1. - t))
        } else {
            Ok(lower + spread * t)
        }
    }
}

/// Historical Value-at-Risk: the `(1 - confidence_level)` percentile of the
/// series. Reported as a return (negative means a loss), not a loss magnitude.
pub struct ValueAtRisk {
    pub confidence_level: f64,
}
impl Aggregator for ValueAtRisk {
    fn value(&self, series: &[f64]) -> Result<f64, AggregatorError> {
        if !(0.0..=1.0).contains(&self.confidence_level) {
            return Err(AggregatorError::InvalidConfidenceLevel(
                self.confidence_level,
            ));
        }
        Percentile((1. - self.confidence_level) * 100.).value(series)
    }
}

/// Conditional Value-at-Risk (expected shortfall): the mean of every outcome
/// at or below the VaR.
pub struct ExpectedShortfall {
    pub confidence_level: f64,
}

impl ExpectedShortfall {
    /// Returns `(VaR, CVaR)` computed from a single pass over the tail.
    pub fn tail(&self, series: &[f64]) -> Result<(f64, f64), AggregatorError> {
        let var = ValueAtRisk {
            confidence_level: self.confidence_level,
        }
        .value(series)?;
        let tail = series
            .iter()
            .copied()
            .filter(|&r| r <= var)
            .collect::<Vec<f64>>();
        Ok((var, ArithmeticMean.value(&tail)?))
    }
}

impl Aggregator for ExpectedShortfall {
    fn value(&self, series: &[f64]) -> Result<f64, AggregatorError> {
        self.tail(series).map(|(_, cvar)| cvar)
    }
}
