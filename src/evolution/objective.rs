use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_CONFIDENCE_LEVEL, DEFAULT_RISK_FREE_RATE};
use crate::evolution::aggregator::{Aggregator, AggregatorError, ArithmeticMean, ExpectedShortfall};
use crate::returns::ReturnMatrix;

/// Everything a mean-CVaR evaluation produces for one weight vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub fitness: f64,
    /// Mean of the historical portfolio return series.
    pub expected_return: f64,
    pub value_at_risk: f64,
    pub conditional_value_at_risk: f64,
}

/// Mean-CVaR objective:
/// `(1 - risk_free_rate) * dot(mean_returns, w) - risk_free_rate * CVaR`.
///
/// `risk_free_rate` acts as a risk-aversion weight between the expected
/// return and the tail penalty, not as a literal interest rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeanCvar {
    pub risk_free_rate: f64,
    pub confidence_level: f64,
}

impl Default for MeanCvar {
    fn default() -> Self {
        MeanCvar {
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
        }
    }
}

impl MeanCvar {
    /// Portfolio-level return for every period: `returns · w`.
    pub fn portfolio_returns(weights: ArrayView1<'_, f64>, returns: &ReturnMatrix) -> Array1<f64> {
        returns.values().dot(&weights)
    }

    /// `weights` must already be normalized and follow the matrix's asset order.
    pub fn evaluate(
        &self,
        weights: ArrayView1<'_, f64>,
        returns: &ReturnMatrix,
    ) -> Result<RiskProfile, AggregatorError> {
        let series = Self::portfolio_returns(weights, returns).to_vec();

        let expected_return = ArithmeticMean.value(&series)?;
        let (value_at_risk, conditional_value_at_risk) = ExpectedShortfall {
            confidence_level: self.confidence_level,
        }
        .tail(&series)?;

        let weighted_mean_return = returns.mean_returns().dot(&weights);
        let fitness = (1. - self.risk_free_rate) * weighted_mean_return
            - self.risk_free_rate * conditional_value_at_risk;

        Ok(RiskProfile {
            fitness,
            expected_return,
            value_at_risk,
            conditional_value_at_risk,
        })
    }
}
