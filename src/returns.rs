use std::sync::Arc;

use itertools::Itertools;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ReturnMatrixError {
    #[error("A return matrix needs at least one period and one asset.")]
    Empty,
    #[error("Period `{period}` has {found} values, expected one per asset ({expected}).")]
    RaggedRow {
        period: String,
        expected: usize,
        found: usize,
    },
    #[error("Got {found} period labels for {expected} periods.")]
    PeriodCountMismatch { expected: usize, found: usize },
    #[error("Asset `{0}` appears more than once.")]
    DuplicateAsset(String),
    #[error("Period labels must be unique and ascending: `{previous}` is followed by `{next}`.")]
    UnorderedPeriods { previous: String, next: String },
    #[error("Non-finite return for asset `{asset}` in period `{period}`.")]
    NonFinite { asset: String, period: String },
    #[error("Cannot select {requested} assets out of {available}.")]
    NotEnoughAssets { requested: usize, available: usize },
    #[error("Matrix shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Historical periodic returns, one column per asset and one row per period.
///
/// The matrix is immutable once built. Chromosomes of a run share a single
/// instance behind an `Arc`, and the asset list doubles as the canonical gene
/// order for every weight vector built against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawReturnMatrix", into = "RawReturnMatrix")]
pub struct ReturnMatrix {
    assets: Arc<[String]>,
    periods: Vec<String>,
    returns: Array2<f64>,
    mean_returns: Array1<f64>,
}

/// Wire form of a [`ReturnMatrix`]: row-major returns, optional period labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawReturnMatrix {
    assets: Vec<String>,
    #[serde(default)]
    periods: Option<Vec<String>>,
    returns: Vec<Vec<f64>>,
}

impl TryFrom<RawReturnMatrix> for ReturnMatrix {
    type Error = ReturnMatrixError;

    fn try_from(raw: RawReturnMatrix) -> Result<Self, Self::Error> {
        match raw.periods {
            Some(periods) => ReturnMatrix::from_labelled_rows(raw.assets, periods, raw.returns),
            None => ReturnMatrix::from_rows(raw.assets, raw.returns),
        }
    }
}

impl From<ReturnMatrix> for RawReturnMatrix {
    fn from(matrix: ReturnMatrix) -> Self {
        RawReturnMatrix {
            assets: matrix.assets.to_vec(),
            periods: Some(matrix.periods),
            returns: matrix
                .returns
                .outer_iter()
                .map(|row| row.to_vec())
                .collect(),
        }
    }
}

fn index_labels(count: usize) -> Vec<String> {
    let width = count.to_string().len();
    (0..count).map(|i| format!("{:0width$}", i)).collect()
}

fn rows_to_array(
    periods: &[String],
    n_assets: usize,
    rows: Vec<Vec<f64>>,
) -> Result<Array2<f64>, ReturnMatrixError> {
    if let Some((period, row)) = periods
        .iter()
        .zip(rows.iter())
        .find(|(_, row)| row.len() != n_assets)
    {
        return Err(ReturnMatrixError::RaggedRow {
            period: period.clone(),
            expected: n_assets,
            found: row.len(),
        });
    }
    let n_periods = rows.len();
    let flat = rows.into_iter().flatten().collect::<Vec<f64>>();
    Ok(Array2::from_shape_vec((n_periods, n_assets), flat)?)
}

impl ReturnMatrix {
    pub fn new(
        assets: Vec<String>,
        periods: Vec<String>,
        returns: Array2<f64>,
    ) -> Result<Self, ReturnMatrixError> {
        let (n_periods, n_assets) = returns.dim();
        if n_periods == 0 || n_assets == 0 {
            return Err(ReturnMatrixError::Empty);
        }
        if assets.len() != n_assets {
            return Err(ReturnMatrixError::RaggedRow {
                period: "<header>".into(),
                expected: n_assets,
                found: assets.len(),
            });
        }
        if periods.len() != n_periods {
            return Err(ReturnMatrixError::PeriodCountMismatch {
                expected: n_periods,
                found: periods.len(),
            });
        }
        if let Some(duplicate) = assets.iter().duplicates().next() {
            return Err(ReturnMatrixError::DuplicateAsset(duplicate.clone()));
        }
        if let Some((previous, next)) = periods.iter().tuple_windows().find(|(a, b)| a >= b) {
            return Err(ReturnMatrixError::UnorderedPeriods {
                previous: previous.clone(),
                next: next.clone(),
            });
        }
        if let Some(((t, j), _)) = returns.indexed_iter().find(|(_, r)| !r.is_finite()) {
            return Err(ReturnMatrixError::NonFinite {
                asset: assets[j].clone(),
                period: periods[t].clone(),
            });
        }

        // non-empty, so the mean is always defined
        let mean_returns = returns
            .mean_axis(Axis(0))
            .ok_or(ReturnMatrixError::Empty)?;

        Ok(ReturnMatrix {
            assets: assets.into(),
            periods,
            returns,
            mean_returns,
        })
    }

    /// Builds a matrix from row-major data, labelling periods `0..n` (zero padded).
    pub fn from_rows(assets: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self, ReturnMatrixError> {
        let periods = index_labels(rows.len());
        Self::from_labelled_rows(assets, periods, rows)
    }

    pub fn from_labelled_rows(
        assets: Vec<String>,
        periods: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self, ReturnMatrixError> {
        if periods.len() != rows.len() {
            return Err(ReturnMatrixError::PeriodCountMismatch {
                expected: rows.len(),
                found: periods.len(),
            });
        }
        if rows.is_empty() || assets.is_empty() {
            return Err(ReturnMatrixError::Empty);
        }
        let returns = rows_to_array(&periods, assets.len(), rows)?;
        Self::new(assets, periods, returns)
    }

    /// Converts a price table into simple returns `p[t] / p[t-1] - 1`.
    ///
    /// Assets with any missing (non-finite) price are dropped entirely and the
    /// first period is consumed by the differencing.
    pub fn from_prices(
        assets: Vec<String>,
        periods: Vec<String>,
        prices: Array2<f64>,
    ) -> Result<Self, ReturnMatrixError> {
        let (n_periods, n_assets) = prices.dim();
        if assets.len() != n_assets {
            return Err(ReturnMatrixError::RaggedRow {
                period: "<header>".into(),
                expected: n_assets,
                found: assets.len(),
            });
        }
        if periods.len() != n_periods {
            return Err(ReturnMatrixError::PeriodCountMismatch {
                expected: n_periods,
                found: periods.len(),
            });
        }
        if n_periods < 2 {
            return Err(ReturnMatrixError::Empty);
        }

        let kept = prices
            .axis_iter(Axis(1))
            .enumerate()
            .filter(|(_, column)| column.iter().all(|p| p.is_finite()))
            .map(|(j, _)| j)
            .collect::<Vec<usize>>();
        if kept.len() < n_assets {
            warn!(
                "Dropping {} asset(s) with missing prices.",
                n_assets - kept.len()
            );
        }

        let prices = prices.select(Axis(1), &kept);
        let returns = &prices.slice(s![1.., ..]) / &prices.slice(s![..-1, ..]) - 1.0;
        let assets = kept.iter().map(|&j| assets[j].clone()).collect();

        Self::new(assets, periods[1..].to_vec(), returns)
    }

    /// Restricts the matrix to the `n` assets with the highest mean return,
    /// best first.
    pub fn top_by_mean_return(&self, n: usize) -> Result<Self, ReturnMatrixError> {
        if n == 0 || n > self.n_assets() {
            return Err(ReturnMatrixError::NotEnoughAssets {
                requested: n,
                available: self.n_assets(),
            });
        }
        let selected = (0..self.n_assets())
            .sorted_by(|&a, &b| self.mean_returns[b].total_cmp(&self.mean_returns[a]))
            .take(n)
            .collect::<Vec<usize>>();

        Self::new(
            selected.iter().map(|&j| self.assets[j].clone()).collect(),
            self.periods.clone(),
            self.returns.select(Axis(1), &selected),
        )
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    /// Shared handle on the canonical asset order.
    pub fn asset_list(&self) -> Arc<[String]> {
        Arc::clone(&self.assets)
    }

    pub fn asset_index(&self, asset: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }

    pub fn periods(&self) -> &[String] {
        &self.periods
    }

    pub fn n_periods(&self) -> usize {
        self.returns.nrows()
    }

    pub fn n_assets(&self) -> usize {
        self.returns.ncols()
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.returns.view()
    }

    /// Arithmetic mean of each asset's column.
    pub fn mean_returns(&self) -> ArrayView1<'_, f64> {
        self.mean_returns.view()
    }

    pub fn column(&self, asset: &str) -> Option<ArrayView1<'_, f64>> {
        self.asset_index(asset)
            .map(|j| self.returns.column(j))
    }
}
