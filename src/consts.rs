/// Half-width of the uniform perturbation applied to a mutated weight.
pub const PERTURBATION: f64 = 0.1;

/// Tolerance used when comparing floats that went through normalization.
pub const FLOAT_COMPARISON_EPSILON: f64 = 1e-9;

/// Confidence level used for VaR / CVaR unless a portfolio overrides it.
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

/// Risk-aversion weight of the mean-CVaR blend.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.2;

/// Probability that a single gene (asset weight) is perturbed during `mutate`.
pub const DEFAULT_GENE_MUTATION_RATE: f64 = 0.2;

/// Contestants drawn (with replacement) per tournament.
pub const TOURNAMENT_SIZE: usize = 3;

/// Elite size is `max(1, population_size / ELITE_DIVISOR)`.
pub const ELITE_DIVISOR: usize = 10;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.;

/// Periods covered by the equity curve of a report.
pub const DEFAULT_EQUITY_WINDOW: usize = 120;
