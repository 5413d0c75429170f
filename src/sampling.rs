//! Secret, error and mask distributions.

use crate::polynomial::RnsPoly;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Uniform coefficients in {-1, 0, 1}.
pub fn ternary<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<i64> {
    (0..n).map(|_| rng.gen_range(-1i64..=1)).collect()
}

/// Rounded Gaussian coefficients, cut off at six standard deviations.
pub fn gaussian<R: Rng + ?Sized>(n: usize, std_dev: f64, rng: &mut R) -> Vec<i64> {
    let bound = (6.0 * std_dev).ceil();
    match Normal::new(0.0, std_dev) {
        Ok(normal) => (0..n)
            .map(|_| normal.sample(rng).round().clamp(-bound, bound) as i64)
            .collect(),
        // zero or non-finite deviation: no noise
        Err(_) => vec![0; n],
    }
}

/// Uniformly random residues in every limb.
pub fn uniform<R: Rng + ?Sized>(moduli: &[u64], n: usize, rng: &mut R) -> RnsPoly {
    let limbs = moduli
        .iter()
        .map(|&q| (0..n).map(|_| rng.gen_range(0..q)).collect())
        .collect();
    RnsPoly::from_limbs(moduli, limbs)
}
