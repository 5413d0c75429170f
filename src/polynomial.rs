//! Polynomials of `Z_Q[X]/(X^N+1)` in residue-number-system form.
//!
//! Q is a product of word-sized primes and every polynomial keeps one residue
//! vector ("limb") per prime. Limb `i` is always reduced modulo `moduli[i]`.
//! Whether a limb holds coefficients or NTT evaluations is up to the caller;
//! addition and scalar products are valid in both domains.

use crate::arith::{add_mod, center, inv_mod, mul_mod, neg_mod, reduce_i128, sub_mod};
use crate::crt::CrtBasis;
use crate::ntt::NttTable;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Polynomial in RNS form: one limb of N residues per prime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RnsPoly {
    moduli: Vec<u64>,
    limbs: Vec<Vec<u64>>,
}

impl RnsPoly {
    /// All-zero polynomial of degree `n` over `moduli`.
    pub fn zero(moduli: &[u64], n: usize) -> Self {
        Self {
            moduli: moduli.to_vec(),
            limbs: vec![vec![0; n]; moduli.len()],
        }
    }

    /// Builds a polynomial from limbs that are already reduced.
    pub fn from_limbs(moduli: &[u64], limbs: Vec<Vec<u64>>) -> Self {
        debug_assert_eq!(moduli.len(), limbs.len());
        debug_assert!(limbs
            .iter()
            .zip(moduli)
            .all(|(l, &q)| l.iter().all(|&c| c < q)));
        Self {
            moduli: moduli.to_vec(),
            limbs,
        }
    }

    /// Small signed coefficients (secrets, errors) reduced into every limb.
    pub fn from_signed(coeffs: &[i64], moduli: &[u64]) -> Self {
        let limbs = moduli
            .iter()
            .map(|&q| coeffs.iter().map(|&c| reduce_i128(c as i128, q)).collect())
            .collect();
        Self {
            moduli: moduli.to_vec(),
            limbs,
        }
    }

    /// Integer coefficients reduced into every limb.
    pub fn from_bigints(coeffs: &[BigInt], moduli: &[u64]) -> Self {
        let limbs = moduli
            .iter()
            .map(|&q| coeffs.iter().map(|c| crate::crt::residue(c, q)).collect())
            .collect();
        Self {
            moduli: moduli.to_vec(),
            limbs,
        }
    }

    /// Ring degree N.
    #[inline]
    pub fn degree(&self) -> usize {
        self.limbs.first().map_or(0, Vec::len)
    }

    /// Primes, in chain order.
    #[inline]
    pub fn moduli(&self) -> &[u64] {
        &self.moduli
    }

    /// Number of primes.
    #[inline]
    pub fn limb_count(&self) -> usize {
        self.limbs.len()
    }

    /// Residues modulo the `i`-th prime.
    #[inline]
    pub fn limb(&self, i: usize) -> &[u64] {
        &self.limbs[i]
    }

    /// Residues, one vector per prime.
    pub fn limbs(&self) -> &[Vec<u64>] {
        &self.limbs
    }

    /// Keeps the first `count` limbs (reduction modulo a divisor of Q).
    pub fn truncate(&mut self, count: usize) {
        self.limbs.truncate(count);
        self.moduli.truncate(count);
    }

    /// Copy keeping the first `count` limbs.
    pub fn truncated(&self, count: usize) -> Self {
        let count = count.min(self.limb_count());
        Self {
            moduli: self.moduli[..count].to_vec(),
            limbs: self.limbs[..count].to_vec(),
        }
    }

    /// Adds an integer to the constant coefficient. Coefficient domain only.
    pub fn add_constant(&mut self, value: i128) {
        for (limb, &q) in self.limbs.iter_mut().zip(&self.moduli) {
            limb[0] = add_mod(limb[0], reduce_i128(value, q), q);
        }
    }

    /// Adds per-limb residues to the constant coefficient. Coefficient domain only.
    pub fn add_constant_residues(&mut self, residues: &[u64]) {
        for ((limb, &q), &r) in self.limbs.iter_mut().zip(&self.moduli).zip(residues) {
            limb[0] = add_mod(limb[0], r, q);
        }
    }

    /// Multiplies every coefficient by a signed integer.
    pub fn mul_scalar(&self, value: i128) -> Self {
        let residues: Vec<u64> = self.moduli.iter().map(|&q| reduce_i128(value, q)).collect();
        self.mul_scalar_residues(&residues)
    }

    /// Multiplies limb `i` by `residues[i]`.
    pub fn mul_scalar_residues(&self, residues: &[u64]) -> Self {
        let limbs = self
            .limbs
            .iter()
            .zip(&self.moduli)
            .zip(residues)
            .map(|((limb, &q), &r)| limb.iter().map(|&c| mul_mod(c, r, q)).collect())
            .collect();
        Self {
            moduli: self.moduli.clone(),
            limbs,
        }
    }

    /// Coefficient → evaluation domain, limb by limb.
    pub fn forward(&mut self, tables: &[NttTable]) {
        for (limb, table) in self.limbs.iter_mut().zip(tables) {
            debug_assert_eq!(limb.len(), table.degree());
            table.forward(limb);
        }
    }

    /// Evaluation → coefficient domain, limb by limb.
    pub fn inverse(&mut self, tables: &[NttTable]) {
        for (limb, table) in self.limbs.iter_mut().zip(tables) {
            table.inverse(limb);
        }
    }

    /// Pointwise product; both operands in the evaluation domain.
    pub fn mul_pointwise(&self, rhs: &RnsPoly) -> Self {
        let count = self.limb_count().min(rhs.limb_count());
        let limbs = (0..count)
            .map(|i| {
                let q = self.moduli[i];
                self.limbs[i]
                    .iter()
                    .zip(&rhs.limbs[i])
                    .map(|(&a, &b)| mul_mod(a, b, q))
                    .collect()
            })
            .collect();
        Self {
            moduli: self.moduli[..count].to_vec(),
            limbs,
        }
    }

    /// Negacyclic product of two coefficient-domain polynomials.
    pub fn mul_ntt(&self, rhs: &RnsPoly, tables: &[NttTable]) -> Self {
        let count = self.limb_count().min(rhs.limb_count());
        let limbs = (0..count)
            .map(|i| tables[i].multiply(&self.limbs[i], &rhs.limbs[i]))
            .collect();
        Self {
            moduli: self.moduli[..count].to_vec(),
            limbs,
        }
    }

    /// Constant coefficient of the negacyclic product, per limb, in O(N).
    pub fn product_constant_term(&self, rhs: &RnsPoly) -> Vec<u64> {
        let n = self.degree();
        let count = self.limb_count().min(rhs.limb_count());
        (0..count)
            .map(|i| {
                let q = self.moduli[i];
                let (a, b) = (&self.limbs[i], &rhs.limbs[i]);
                // a_0·b_0 − Σ_{j≥1} a_j·b_{N−j}
                let mut acc = mul_mod(a[0], b[0], q);
                for j in 1..n {
                    acc = sub_mod(acc, mul_mod(a[j], b[n - j], q), q);
                }
                acc
            })
            .collect()
    }

    /// Replaces x by round(x / q_last) and drops the last limb.
    /// Coefficient domain only.
    pub fn divide_round_by_last(&mut self) {
        let (Some(last), Some(q_last)) = (self.limbs.pop(), self.moduli.pop()) else {
            return;
        };
        for (limb, &q) in self.limbs.iter_mut().zip(&self.moduli) {
            let inv = inv_mod(q_last % q, q).unwrap_or_default();
            for (c, &r) in limb.iter_mut().zip(&last) {
                // centered remainder so the division rounds instead of flooring
                let r = reduce_i128(center(r, q_last) as i128, q);
                *c = mul_mod(sub_mod(*c, r, q), inv, q);
            }
        }
    }

    /// Coefficient `index` lifted to (-Q/2, Q/2] for the limbs present.
    pub fn coefficient_centered(&self, index: usize, basis: &CrtBasis) -> BigInt {
        let residues: Vec<u64> = self.limbs.iter().map(|l| l[index]).collect();
        basis.reconstruct_centered(&residues)
    }

    /// All coefficients lifted to (-Q/2, Q/2].
    pub fn to_centered(&self, basis: &CrtBasis) -> Vec<BigInt> {
        (0..self.degree())
            .map(|j| self.coefficient_centered(j, basis))
            .collect()
    }
}

// ------------------------------------------------------------
// operators (limb counts of both sides must agree)
// ------------------------------------------------------------
impl Add for &RnsPoly {
    type Output = RnsPoly;
    fn add(self, rhs: Self) -> RnsPoly {
        let mut out = self.clone();
        out += rhs;
        out
    }
}

impl Sub for &RnsPoly {
    type Output = RnsPoly;
    fn sub(self, rhs: Self) -> RnsPoly {
        let mut out = self.clone();
        out -= rhs;
        out
    }
}

impl Neg for &RnsPoly {
    type Output = RnsPoly;
    fn neg(self) -> RnsPoly {
        let limbs = self
            .limbs
            .iter()
            .zip(&self.moduli)
            .map(|(limb, &q)| limb.iter().map(|&c| neg_mod(c, q)).collect())
            .collect();
        RnsPoly {
            moduli: self.moduli.clone(),
            limbs,
        }
    }
}

impl AddAssign<&RnsPoly> for RnsPoly {
    fn add_assign(&mut self, rhs: &RnsPoly) {
        debug_assert_eq!(self.moduli, rhs.moduli);
        for ((a, b), &q) in self.limbs.iter_mut().zip(&rhs.limbs).zip(&self.moduli) {
            for (x, &y) in a.iter_mut().zip(b) {
                *x = add_mod(*x, y, q);
            }
        }
    }
}

impl SubAssign<&RnsPoly> for RnsPoly {
    fn sub_assign(&mut self, rhs: &RnsPoly) {
        debug_assert_eq!(self.moduli, rhs.moduli);
        for ((a, b), &q) in self.limbs.iter_mut().zip(&rhs.limbs).zip(&self.moduli) {
            for (x, &y) in a.iter_mut().zip(b) {
                *x = sub_mod(*x, y, q);
            }
        }
    }
}

impl Add for RnsPoly {
    type Output = RnsPoly;
    fn add(mut self, rhs: Self) -> RnsPoly {
        self += &rhs;
        self
    }
}

impl Sub for RnsPoly {
    type Output = RnsPoly;
    fn sub(mut self, rhs: Self) -> RnsPoly {
        self -= &rhs;
        self
    }
}
