/// Generate a random `f64` in the range `[low, high)`.
#[inline]
pub(crate) fn f64_range(rng: &mut fastrand::Rng, low: f64, high: f64) -> f64 {
    low + rng.f64() * (high - low)
}

/// Draw a point uniformly from per-dimension `(low, high)` bounds.
pub(crate) fn uniform_point(rng: &mut fastrand::Rng, bounds: &[(f64, f64)]) -> Vec<f64> {
    bounds
        .iter()
        .map(|&(low, high)| f64_range(rng, low, high))
        .collect()
}

/// Seeded generator, or an entropy-seeded one when `seed` is `None`.
pub(crate) fn make_rng(seed: Option<u64>) -> fastrand::Rng {
    seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed)
}
