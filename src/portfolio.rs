use std::cell::Cell;
use std::sync::Arc;

use ndarray::{Array1, ArrayView1};
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use serde::ser::{Serialize, Serializer};
use thiserror::Error;

use crate::consts::{DEFAULT_CONFIDENCE_LEVEL, DEFAULT_GENE_MUTATION_RATE, PERTURBATION};
use crate::evolution::aggregator::AggregatorError;
use crate::evolution::chromosome::Chromosome;
use crate::evolution::objective::{MeanCvar, RiskProfile};
use crate::returns::ReturnMatrix;

#[derive(Error, Debug, PartialEq)]
pub enum PortfolioError {
    #[error("Cannot normalize a zero-sum weight vector.")]
    ZeroSumWeights,
    #[error("Weights cover assets {found:?} but the return matrix has {expected:?}.")]
    AssetMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("Got {found} weights for {expected} assets.")]
    LengthMismatch { expected: usize, found: usize },
    #[error("Unknown asset `{0}`.")]
    UnknownAsset(String),
    #[error("No weight given for asset `{0}`.")]
    MissingAsset(String),
    #[error(transparent)]
    Aggregation(#[from] AggregatorError),
}

/// Asset weights in the canonical asset order of a [`ReturnMatrix`].
///
/// The asset list is shared, never reordered, so position `i` means the same
/// asset in every weight vector of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightVector {
    assets: Arc<[String]>,
    values: Array1<f64>,
}

impl WeightVector {
    pub fn new(assets: Arc<[String]>, values: Vec<f64>) -> Result<Self, PortfolioError> {
        if assets.len() != values.len() {
            return Err(PortfolioError::LengthMismatch {
                expected: assets.len(),
                found: values.len(),
            });
        }
        Ok(WeightVector {
            assets,
            values: Array1::from(values),
        })
    }

    /// Equal weight on every asset of the matrix.
    pub fn uniform(returns: &ReturnMatrix) -> Self {
        let n = returns.n_assets();
        WeightVector {
            assets: returns.asset_list(),
            values: Array1::from_elem(n, 1. / n as f64),
        }
    }

    /// Reorders `(asset, weight)` pairs into the matrix's asset order. Every
    /// asset must be given exactly once.
    pub fn from_pairs<I, S>(pairs: I, returns: &ReturnMatrix) -> Result<Self, PortfolioError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let mut slots: Vec<Option<f64>> = vec![None; returns.n_assets()];
        for (asset, weight) in pairs {
            let index = returns
                .asset_index(asset.as_ref())
                .ok_or_else(|| PortfolioError::UnknownAsset(asset.as_ref().to_string()))?;
            slots[index] = Some(weight);
        }
        let values = slots
            .into_iter()
            .zip(returns.assets())
            .map(|(slot, asset)| slot.ok_or_else(|| PortfolioError::MissingAsset(asset.clone())))
            .collect::<Result<Vec<f64>, PortfolioError>>()?;

        WeightVector::new(returns.asset_list(), values)
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn values(&self) -> ArrayView1<'_, f64> {
        self.values.view()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, asset: &str) -> Option<f64> {
        self.assets
            .iter()
            .position(|a| a == asset)
            .map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.assets
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    pub fn sum(&self) -> f64 {
        self.values.sum()
    }

    /// Raw weights divided by their sum. Negative weights survive as short
    /// exposure; only an exactly zero sum is rejected.
    pub fn normalized(&self) -> Result<WeightVector, PortfolioError> {
        let total = self.sum();
        if total == 0. {
            return Err(PortfolioError::ZeroSumWeights);
        }
        Ok(WeightVector {
            assets: Arc::clone(&self.assets),
            values: &self.values / total,
        })
    }
}

impl Serialize for WeightVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

/// A candidate allocation: raw weights over a shared return history, scored
/// with the mean-CVaR objective.
#[derive(Debug, Clone)]
pub struct Portfolio {
    weights: WeightVector,
    returns: Arc<ReturnMatrix>,
    objective: MeanCvar,
    gene_mutation_rate: f64,
    // valid until the raw weights change
    risk: Cell<Option<RiskProfile>>,
}

impl Portfolio {
    pub fn new(
        weights: WeightVector,
        returns: Arc<ReturnMatrix>,
        risk_free_rate: f64,
    ) -> Result<Self, PortfolioError> {
        if weights.assets() != returns.assets() {
            return Err(PortfolioError::AssetMismatch {
                expected: returns.assets().to_vec(),
                found: weights.assets().to_vec(),
            });
        }
        Ok(Portfolio {
            weights,
            returns,
            objective: MeanCvar {
                risk_free_rate,
                confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            },
            gene_mutation_rate: DEFAULT_GENE_MUTATION_RATE,
            risk: Cell::new(None),
        })
    }

    /// Uniform `[0, 1]` raw weight for every asset of `template`.
    pub fn random<R: Rng + ?Sized>(
        template: &WeightVector,
        returns: Arc<ReturnMatrix>,
        risk_free_rate: f64,
        rng: &mut R,
    ) -> Result<Self, PortfolioError> {
        let values = random_weights(template.len(), rng);
        Portfolio::new(
            WeightVector {
                assets: Arc::clone(&template.assets),
                values,
            },
            returns,
            risk_free_rate,
        )
    }

    pub fn with_confidence_level(mut self, confidence_level: f64) -> Self {
        self.objective.confidence_level = confidence_level;
        self.risk.set(None);
        self
    }

    /// Per-asset probability of a perturbation when `mutate` is called.
    pub fn with_gene_mutation_rate(mut self, gene_mutation_rate: f64) -> Self {
        self.gene_mutation_rate = gene_mutation_rate;
        self
    }

    pub fn raw_weights(&self) -> &WeightVector {
        &self.weights
    }

    /// Normalized view of the raw weights, derived on every call.
    pub fn weights(&self) -> Result<WeightVector, PortfolioError> {
        self.weights.normalized()
    }

    pub fn set_weight(&mut self, asset: &str, weight: f64) -> Result<(), PortfolioError> {
        let index = self
            .weights
            .assets
            .iter()
            .position(|a| a == asset)
            .ok_or_else(|| PortfolioError::UnknownAsset(asset.to_string()))?;
        self.weights.values[index] = weight;
        self.risk.set(None);
        Ok(())
    }

    pub fn set_raw_weights(&mut self, weights: WeightVector) -> Result<(), PortfolioError> {
        if weights.assets() != self.weights.assets() {
            return Err(PortfolioError::AssetMismatch {
                expected: self.weights.assets().to_vec(),
                found: weights.assets().to_vec(),
            });
        }
        self.weights = weights;
        self.risk.set(None);
        Ok(())
    }

    pub fn returns(&self) -> &Arc<ReturnMatrix> {
        &self.returns
    }

    pub fn risk_free_rate(&self) -> f64 {
        self.objective.risk_free_rate
    }

    pub fn confidence_level(&self) -> f64 {
        self.objective.confidence_level
    }

    pub fn gene_mutation_rate(&self) -> f64 {
        self.gene_mutation_rate
    }

    /// Evaluates (or reuses) the mean-CVaR diagnostics at the portfolio's
    /// confidence level.
    pub fn risk_profile(&self) -> Result<RiskProfile, PortfolioError> {
        if let Some(profile) = self.risk.get() {
            return Ok(profile);
        }
        let profile = self.evaluate_at(self.objective.confidence_level)?;
        self.risk.set(Some(profile));
        Ok(profile)
    }

    /// One-off evaluation at another confidence level; the cache is untouched.
    pub fn evaluate_at(&self, confidence_level: f64) -> Result<RiskProfile, PortfolioError> {
        let weights = self.weights.normalized()?;
        let objective = MeanCvar {
            confidence_level,
            ..self.objective
        };
        Ok(objective.evaluate(weights.values(), &self.returns)?)
    }

    /// Available once the portfolio has been evaluated.
    pub fn expected_return(&self) -> Option<f64> {
        self.risk.get().map(|p| p.expected_return)
    }

    pub fn value_at_risk(&self) -> Option<f64> {
        self.risk.get().map(|p| p.value_at_risk)
    }

    pub fn cvar(&self) -> Option<f64> {
        self.risk.get().map(|p| p.conditional_value_at_risk)
    }

    /// Historical per-period returns of the normalized allocation.
    pub fn historical_returns(&self) -> Result<Array1<f64>, PortfolioError> {
        let weights = self.weights.normalized()?;
        Ok(MeanCvar::portfolio_returns(weights.values(), &self.returns))
    }

    fn offspring(&self, values: Array1<f64>) -> Portfolio {
        Portfolio {
            weights: WeightVector {
                assets: Arc::clone(&self.weights.assets),
                values,
            },
            returns: Arc::clone(&self.returns),
            objective: self.objective,
            gene_mutation_rate: self.gene_mutation_rate,
            risk: Cell::new(None),
        }
    }
}

fn random_weights<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Array1<f64> {
    let uniform = Uniform::new_inclusive(0., 1.);
    (0..n).map(|_| uniform.sample(rng)).collect()
}

impl Chromosome for Portfolio {
    type Error = PortfolioError;

    fn fitness(&self) -> Result<f64, PortfolioError> {
        self.risk_profile().map(|profile| profile.fitness)
    }

    /// Each weight independently, with probability `gene_mutation_rate`,
    /// moves by up to `PERTURBATION` and is floored at zero. There is no upper
    /// clamp; normalization on read takes care of scale.
    fn mutate<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for weight in self.weights.values.iter_mut() {
            if rng.gen::<f64>() < self.gene_mutation_rate {
                let change: f64 = rng.gen_range(-PERTURBATION..=PERTURBATION);
                *weight = (*weight + change).max(0.);
            }
        }
        self.risk.set(None);
    }

    /// Single-point crossover at `n_assets / 2` over the parents' normalized
    /// weights. Child 1 takes the head from `self` and the tail from `peer`,
    /// child 2 the reverse. Both children keep `self`'s data and parameters.
    fn crossover(&self, peer: &Self) -> Result<(Self, Self), PortfolioError> {
        if self.weights.assets() != peer.weights.assets() {
            return Err(PortfolioError::AssetMismatch {
                expected: self.weights.assets().to_vec(),
                found: peer.weights.assets().to_vec(),
            });
        }
        let first = self.weights.normalized()?;
        let second = peer.weights.normalized()?;
        let split = first.len() / 2;

        // same asset list, so the tail lookup by key is a lookup by position
        let splice = |head: &WeightVector, tail: &WeightVector| -> Array1<f64> {
            head.values
                .iter()
                .take(split)
                .chain(tail.values.iter().skip(split))
                .copied()
                .collect()
        };

        Ok((
            self.offspring(splice(&first, &second)),
            self.offspring(splice(&second, &first)),
        ))
    }

    fn random_instance<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        self.offspring(random_weights(self.weights.len(), rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::FLOAT_COMPARISON_EPSILON;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn scenario_matrix() -> Arc<ReturnMatrix> {
        Arc::new(
            ReturnMatrix::from_rows(
                vec!["A".into(), "B".into()],
                vec![
                    vec![0.01, 0.00],
                    vec![0.02, 0.01],
                    vec![-0.01, 0.01],
                    vec![0.03, 0.00],
                    vec![-0.02, 0.02],
                ],
            )
            .unwrap(),
        )
    }

    fn four_asset_matrix() -> Arc<ReturnMatrix> {
        Arc::new(
            ReturnMatrix::from_rows(
                vec!["PETR4".into(), "VALE3".into(), "ITUB4".into(), "BBDC4".into()],
                vec![
                    vec![0.010, -0.020, 0.004, 0.012],
                    vec![-0.005, 0.031, -0.010, 0.002],
                    vec![0.021, 0.004, 0.006, -0.018],
                    vec![-0.013, -0.009, 0.015, 0.007],
                    vec![0.002, 0.017, -0.003, 0.011],
                    vec![0.008, -0.026, 0.009, -0.004],
                ],
            )
            .unwrap(),
        )
    }

    fn portfolio(matrix: &Arc<ReturnMatrix>, weights: &[f64], risk_free_rate: f64) -> Portfolio {
        let weights = WeightVector::new(matrix.asset_list(), weights.to_vec()).unwrap();
        Portfolio::new(weights, Arc::clone(matrix), risk_free_rate).unwrap()
    }

    #[test]
    fn test_scenario_two_assets_five_periods() {
        let matrix = scenario_matrix();
        let weights = WeightVector::from_pairs([("A", 0.5), ("B", 0.5)], &matrix).unwrap();
        let portfolio = Portfolio::new(weights, matrix, 0.2).unwrap();

        // portfolio returns: [0.005, 0.015, 0.0, 0.015, 0.0]
        let profile = portfolio.risk_profile().unwrap();
        assert!((profile.expected_return - 0.007).abs() < 1e-12);
        assert!(profile.value_at_risk.abs() < 1e-12);
        assert!(profile.conditional_value_at_risk.abs() < 1e-12);
        // 0.8 * dot([0.006, 0.008], [0.5, 0.5]) - 0.2 * 0.0
        assert!((profile.fitness - 0.0056).abs() < 1e-12);

        assert_eq!(portfolio.expected_return(), Some(profile.expected_return));
        assert_eq!(portfolio.cvar(), Some(profile.conditional_value_at_risk));
    }

    #[test]
    fn test_diagnostics_absent_before_evaluation() {
        let matrix = scenario_matrix();
        let portfolio = portfolio(&matrix, &[0.3, 0.7], 0.2);
        assert_eq!(portfolio.expected_return(), None);
        assert_eq!(portfolio.cvar(), None);
        portfolio.fitness().unwrap();
        assert!(portfolio.expected_return().is_some());
        assert!(portfolio.value_at_risk().is_some());
    }

    #[test]
    fn test_normalized_weights_sum_to_one() {
        let matrix = four_asset_matrix();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let raw = (0..4)
                .map(|_| rng.gen_range(-2.0..5.0))
                .collect::<Vec<f64>>();
            let portfolio = portfolio(&matrix, &raw, 0.2);
            let sum = portfolio.raw_weights().sum();
            if sum.abs() < 1e-6 {
                continue;
            }
            let normalized = portfolio.weights().unwrap();
            assert!(
                (normalized.sum() - 1.).abs() < FLOAT_COMPARISON_EPSILON,
                "Weights should sum to 1. Got {}",
                normalized.sum()
            );
        }
    }

    #[test]
    fn test_normalization_keeps_scale_and_shorts() {
        let matrix = scenario_matrix();
        let normalized = portfolio(&matrix, &[30., 70.], 0.2).weights().unwrap();
        assert!((normalized.get("A").unwrap() - 0.3).abs() < FLOAT_COMPARISON_EPSILON);
        assert!((normalized.get("B").unwrap() - 0.7).abs() < FLOAT_COMPARISON_EPSILON);

        let shorted = portfolio(&matrix, &[-2., 8.], 0.2).weights().unwrap();
        assert!((shorted.get("A").unwrap() + 2. / 6.).abs() < FLOAT_COMPARISON_EPSILON);
        assert!((shorted.get("B").unwrap() - 8. / 6.).abs() < FLOAT_COMPARISON_EPSILON);
    }

    #[test]
    fn test_zero_sum_weights_are_a_domain_error() {
        let matrix = scenario_matrix();
        let zeros = portfolio(&matrix, &[0., 0.], 0.2);
        assert_eq!(zeros.weights(), Err(PortfolioError::ZeroSumWeights));
        assert_eq!(zeros.fitness(), Err(PortfolioError::ZeroSumWeights));

        let cancelling = portfolio(&matrix, &[1., -1.], 0.2);
        assert_eq!(cancelling.fitness(), Err(PortfolioError::ZeroSumWeights));
        assert_eq!(
            PortfolioError::ZeroSumWeights.to_string(),
            "Cannot normalize a zero-sum weight vector."
        );
    }

    #[test]
    fn test_raw_weight_changes_are_seen_immediately() {
        let matrix = scenario_matrix();
        let mut portfolio = portfolio(&matrix, &[1., 1.], 0.2);
        let before = portfolio.fitness().unwrap();

        portfolio.set_weight("A", 3.).unwrap();
        assert_eq!(portfolio.cvar(), None, "Changing a weight must drop the cache");
        assert!((portfolio.weights().unwrap().get("A").unwrap() - 0.75).abs() < FLOAT_COMPARISON_EPSILON);
        assert_ne!(portfolio.fitness().unwrap(), before);

        assert_eq!(
            portfolio.set_weight("ZZZ", 1.),
            Err(PortfolioError::UnknownAsset("ZZZ".into()))
        );
    }

    #[test]
    fn test_cvar_var_expected_return_ordering() {
        let matrix = four_asset_matrix();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let weights = (0..4).map(|_| rng.gen_range(0.01..1.0)).collect::<Vec<f64>>();
            let profile = portfolio(&matrix, &weights, 0.3).risk_profile().unwrap();
            assert!(
                profile.conditional_value_at_risk <= profile.value_at_risk
                    && profile.value_at_risk <= profile.expected_return,
                "Expected CVaR <= VaR <= E[R], got {:?}",
                profile
            );
        }
    }

    #[test]
    fn test_constant_returns_are_degenerate_not_an_error() {
        for r in [0.004, 0.003, 0.1, -0.02] {
            let matrix = Arc::new(
                ReturnMatrix::from_rows(
                    vec!["A".into(), "B".into(), "C".into()],
                    vec![vec![r; 3]; 8],
                )
                .unwrap(),
            );
            let profile = portfolio(&matrix, &[0.2, 0.5, 0.3], 0.4)
                .risk_profile()
                .unwrap();

            assert_eq!(profile.expected_return, profile.conditional_value_at_risk);
            assert_eq!(profile.value_at_risk, profile.conditional_value_at_risk);
            // the weighted sum `r * w` is off from `r` by a few ulps at most
            let tolerance = 8. * f64::EPSILON * r.abs();
            assert!(
                (profile.expected_return - r).abs() <= tolerance,
                "Expected {} within 8 ulps ({}), got {}",
                r,
                tolerance,
                profile.expected_return
            );
        }
    }

    #[test]
    fn test_fitness_is_deterministic() {
        let matrix = four_asset_matrix();
        let a = portfolio(&matrix, &[0.4, 0.3, 0.2, 0.1], 0.1);
        let b = portfolio(&matrix, &[0.4, 0.3, 0.2, 0.1], 0.1);
        assert_eq!(a.fitness().unwrap(), a.fitness().unwrap());
        assert_eq!(a.fitness().unwrap(), b.fitness().unwrap());
    }

    #[test]
    fn test_evaluate_at_other_confidence_leaves_cache_alone() {
        let matrix = four_asset_matrix();
        let p = portfolio(&matrix, &[0.4, 0.3, 0.2, 0.1], 0.1);
        let at_95 = p.risk_profile().unwrap();
        let at_99 = p.evaluate_at(0.99).unwrap();
        assert!(at_99.value_at_risk <= at_95.value_at_risk);
        assert_eq!(p.risk_profile().unwrap(), at_95);
    }

    #[test]
    fn test_crossover_splits_at_midpoint_by_asset() {
        let matrix = four_asset_matrix();
        let first = portfolio(&matrix, &[2., 2., 2., 2.], 0.2);
        let second = portfolio(&matrix, &[0.4, 0.3, 0.2, 0.1], 0.15);

        let (child_1, child_2) = first.crossover(&second).unwrap();
        let expected_1 = [0.25, 0.25, 0.2, 0.1];
        let expected_2 = [0.4, 0.3, 0.25, 0.25];
        for (i, asset) in matrix.assets().iter().enumerate() {
            assert!((child_1.raw_weights().get(asset).unwrap() - expected_1[i]).abs() < FLOAT_COMPARISON_EPSILON);
            assert!((child_2.raw_weights().get(asset).unwrap() - expected_2[i]).abs() < FLOAT_COMPARISON_EPSILON);
        }

        // children keep the first parent's parameters and data
        assert_eq!(child_1.risk_free_rate(), 0.2);
        assert_eq!(child_2.risk_free_rate(), 0.2);
        assert!(Arc::ptr_eq(child_1.returns(), &matrix));
        assert_eq!(child_1.raw_weights().assets(), matrix.assets());
        assert_eq!(child_2.raw_weights().assets(), matrix.assets());

        // parents untouched
        assert_eq!(first.raw_weights().values().to_vec(), vec![2.; 4]);
        assert_eq!(second.raw_weights().values().to_vec(), vec![0.4, 0.3, 0.2, 0.1]);
    }

    #[test]
    fn test_crossover_with_odd_asset_count() {
        let matrix = Arc::new(
            ReturnMatrix::from_rows(
                vec!["X".into(), "Y".into(), "Z".into()],
                vec![vec![0.01, 0.02, 0.03], vec![0.0, -0.01, 0.02]],
            )
            .unwrap(),
        );
        let (child_1, _) = portfolio(&matrix, &[1., 0., 0.], 0.2)
            .crossover(&portfolio(&matrix, &[0., 0.5, 0.5], 0.2))
            .unwrap();
        assert_eq!(child_1.raw_weights().values().to_vec(), vec![1., 0.5, 0.5]);
    }

    #[test]
    fn test_crossover_rejects_different_asset_lists() {
        let matrix = four_asset_matrix();
        let other = scenario_matrix();
        let result = portfolio(&matrix, &[0.25; 4], 0.2).crossover(&portfolio(&other, &[0.5, 0.5], 0.2));
        assert!(matches!(result, Err(PortfolioError::AssetMismatch { .. })));
    }

    #[test]
    fn test_mutating_a_copy_leaves_the_source_alone() {
        let matrix = four_asset_matrix();
        let mut rng = StdRng::seed_from_u64(17);
        let original = portfolio(&matrix, &[0.4, 0.3, 0.2, 0.1], 0.2).with_gene_mutation_rate(1.);
        let cached = original.risk_profile().unwrap();

        let mut copy = original.clone();
        copy.mutate(&mut rng);
        assert_ne!(copy.raw_weights(), original.raw_weights());
        assert_eq!(copy.cvar(), None);
        assert_eq!(original.raw_weights().values().to_vec(), vec![0.4, 0.3, 0.2, 0.1]);
        assert_eq!(original.cvar(), Some(cached.conditional_value_at_risk));

        let (mut child, _) = original.crossover(&copy).unwrap();
        let copy_weights = copy.raw_weights().clone();
        child.mutate(&mut rng);
        assert_eq!(original.raw_weights().values().to_vec(), vec![0.4, 0.3, 0.2, 0.1]);
        assert_eq!(copy.raw_weights(), &copy_weights);
        assert_eq!(original.risk_profile().unwrap(), cached);
    }

    #[test]
    fn test_mutate_with_zero_rate_changes_nothing() {
        let matrix = four_asset_matrix();
        let mut rng = StdRng::seed_from_u64(3);
        let mut p = portfolio(&matrix, &[0.4, 0.3, 0.2, 0.1], 0.2).with_gene_mutation_rate(0.);
        p.mutate(&mut rng);
        assert_eq!(p.raw_weights().values().to_vec(), vec![0.4, 0.3, 0.2, 0.1]);
    }

    #[test]
    fn test_mutate_with_full_rate_moves_every_weight_within_bounds() {
        let matrix = four_asset_matrix();
        let mut rng = StdRng::seed_from_u64(5);
        let original = [0.6, 0.4, 0.5, 0.3];
        let mut p = portfolio(&matrix, &original, 0.2).with_gene_mutation_rate(1.);
        p.fitness().unwrap();
        p.mutate(&mut rng);

        assert_eq!(p.cvar(), None, "Mutation must invalidate cached diagnostics");
        for (before, after) in original.iter().zip(p.raw_weights().values().iter()) {
            assert_ne!(before, after);
            assert!((after - before).abs() <= PERTURBATION + FLOAT_COMPARISON_EPSILON);
        }
    }

    #[test]
    fn test_mutate_never_goes_negative() {
        let matrix = four_asset_matrix();
        let mut rng = StdRng::seed_from_u64(9);
        let mut p = portfolio(&matrix, &[0.05, 0.0, 0.02, 0.05], 0.2).with_gene_mutation_rate(1.);
        for _ in 0..100 {
            p.mutate(&mut rng);
            assert!(p.raw_weights().values().iter().all(|&w| w >= 0.));
        }
    }

    #[test]
    fn test_random_instance_shares_structure() {
        let matrix = four_asset_matrix();
        let mut rng = StdRng::seed_from_u64(13);
        let template = portfolio(&matrix, &[0.25; 4], 0.35);

        let fresh = template.random_instance(&mut rng);
        assert!(Arc::ptr_eq(fresh.returns(), template.returns()));
        assert_eq!(fresh.risk_free_rate(), 0.35);
        assert_eq!(fresh.raw_weights().assets(), template.raw_weights().assets());
        assert!(fresh
            .raw_weights()
            .values()
            .iter()
            .all(|&w| (0.0..=1.0).contains(&w)));

        let seeded = Portfolio::random(template.raw_weights(), Arc::clone(&matrix), 0.1, &mut rng).unwrap();
        assert_eq!(seeded.risk_free_rate(), 0.1);
        assert_ne!(seeded.raw_weights(), fresh.raw_weights());
    }

    #[test]
    fn test_weight_vector_from_pairs() {
        let matrix = scenario_matrix();
        let weights = WeightVector::from_pairs([("B", 0.9), ("A", 0.1)], &matrix).unwrap();
        assert_eq!(weights.values().to_vec(), vec![0.1, 0.9]);
        assert_eq!(
            WeightVector::from_pairs([("A", 1.)], &matrix),
            Err(PortfolioError::MissingAsset("B".into()))
        );
        assert_eq!(
            WeightVector::from_pairs([("A", 1.), ("B", 1.), ("C", 1.)], &matrix),
            Err(PortfolioError::UnknownAsset("C".into()))
        );

        let json = serde_json::to_string(&weights).unwrap();
        assert_eq!(json, r#"{"A":0.1,"B":0.9}"#);
    }

    #[test]
    fn test_portfolio_rejects_foreign_weights() {
        let weights = WeightVector::uniform(&four_asset_matrix());
        assert!(matches!(
            Portfolio::new(weights, scenario_matrix(), 0.2),
            Err(PortfolioError::AssetMismatch { .. })
        ));
    }
}
