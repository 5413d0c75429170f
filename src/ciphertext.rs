//! In-memory ciphertext.

use crate::params::Scheme;
use crate::polynomial::RnsPoly;

/// `parts[0] + parts[1]·s (+ parts[2]·s²)` encrypts the plaintext.
/// All parts share the same primes; they are kept in the coefficient domain.
#[derive(Clone, Debug, PartialEq)]
pub struct Ciphertext {
    pub(crate) scheme: Scheme,
    pub(crate) fingerprint: u64,
    pub(crate) parts: Vec<RnsPoly>,
    pub(crate) scale: f64,
}

impl Ciphertext {
    pub(crate) fn new(scheme: Scheme, fingerprint: u64, parts: Vec<RnsPoly>, scale: f64) -> Self {
        debug_assert!(matches!(parts.len(), 2 | 3));
        Self {
            scheme,
            fingerprint,
            parts,
            scale,
        }
    }

    /// Scheme in use.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Fingerprint of the parameter set the ciphertext was produced under.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Remaining number of rescales.
    pub fn level(&self) -> usize {
        self.limb_count().saturating_sub(1)
    }

    /// Primes still carried, `level() + 1`.
    pub fn limb_count(&self) -> usize {
        self.parts.first().map_or(0, RnsPoly::limb_count)
    }

    /// 2 after relinearization, 3 straight out of a product.
    pub fn size(&self) -> usize {
        self.parts.len()
    }

    /// Fixed-point scale (1.0 under the exact scheme).
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Polynomial parts, lowest power of `s` first.
    pub fn parts(&self) -> &[RnsPoly] {
        &self.parts
    }

    pub(crate) fn truncate(&mut self, limbs: usize) {
        for p in &mut self.parts {
            p.truncate(limbs);
        }
    }
}
