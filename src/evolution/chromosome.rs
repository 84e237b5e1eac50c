use rand::Rng;

/// Capability set of anything the genetic algorithm can evolve.
///
/// Individuals are plain values: `crossover` must hand back fresh instances
/// and `mutate` may only touch `self`, so no two members of a population ever
/// share mutable state.
pub trait Chromosome: Clone {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Higher is better. Must be deterministic for a fixed internal state;
    /// implementations may cache derived diagnostics but nothing else.
    fn fitness(&self) -> Result<f64, Self::Error>;

    /// In-place stochastic perturbation. Invalidates any cached fitness.
    fn mutate<R: Rng + ?Sized>(&mut self, rng: &mut R);

    /// Recombines `self` with `peer` into two new children, leaving both
    /// parents untouched.
    fn crossover(&self, peer: &Self) -> Result<(Self, Self), Self::Error>;

    /// A randomized individual with the same structure as `self`
    /// (same genes, same evaluation data, same parameters).
    fn random_instance<R: Rng + ?Sized>(&self, rng: &mut R) -> Self;
}
