//! Chinese-remainder reconstruction over a basis of word-sized primes.

use crate::arith::mul_mod;
use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed, ToPrimitive, Zero};

/// Precomputed data to lift residues back to an integer modulo Q = ∏ q_i.
#[derive(Clone, Debug)]
pub struct CrtBasis {
    moduli: Vec<u64>,
    product: BigInt,
    half: BigInt,
    /// Q / q_i
    punctured: Vec<BigInt>,
    /// (Q / q_i)^{-1} mod q_i
    punctured_inv: Vec<u64>,
}

impl CrtBasis {
    /// Precomputes the punctured products of pairwise coprime `moduli`.
    pub fn new(moduli: &[u64]) -> Self {
        let product: BigInt = moduli.iter().fold(BigInt::one(), |acc, &q| acc * q);
        let punctured: Vec<BigInt> = moduli.iter().map(|&q| &product / q).collect();
        let punctured_inv = moduli
            .iter()
            .zip(&punctured)
            .map(|(&q, p)| {
                let r = residue(p, q);
                crate::arith::pow_mod(r, q - 2, q)
            })
            .collect();
        let half = &product >> 1;
        Self {
            moduli: moduli.to_vec(),
            product,
            half,
            punctured,
            punctured_inv,
        }
    }

    /// Primes, in chain order.
    pub fn moduli(&self) -> &[u64] {
        &self.moduli
    }

    /// Q, the product of all primes.
    pub fn product(&self) -> &BigInt {
        &self.product
    }

    /// Integer in [0, Q) with the given residues.
    pub fn reconstruct(&self, residues: &[u64]) -> BigInt {
        debug_assert_eq!(residues.len(), self.moduli.len());
        let mut acc = BigInt::zero();
        for (i, &r) in residues.iter().enumerate() {
            let q = self.moduli[i];
            let t = mul_mod(r, self.punctured_inv[i], q);
            acc += &self.punctured[i] * t;
        }
        acc.mod_floor(&self.product)
    }

    /// Representative in (-Q/2, Q/2].
    pub fn reconstruct_centered(&self, residues: &[u64]) -> BigInt {
        let v = self.reconstruct(residues);
        if v > self.half {
            v - &self.product
        } else {
            v
        }
    }
}

/// x mod q as a value in [0, q).
pub fn residue(x: &BigInt, q: u64) -> u64 {
    x.mod_floor(&BigInt::from(q)).to_u64().unwrap_or_default()
}

/// Rounded integer division.
pub trait DivRound {
    /// `self / other` rounded to the nearest integer.
    fn div_round(&self, other: &Self) -> Self;
}

impl DivRound for BigInt {
    /// Division rounding half away from zero.
    fn div_round(&self, other: &Self) -> Self {
        let (quo, mut rem) = self.div_rem(other);
        rem <<= 1;
        if !rem.is_zero() && rem.abs() >= other.abs() {
            if self.sign() == other.sign() {
                quo + BigInt::one()
            } else {
                quo - BigInt::one()
            }
        } else {
            quo
        }
    }
}

/// Lossy conversion used when decoding approximate values.
pub fn to_f64(x: &BigInt) -> f64 {
    x.to_f64().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arith::primes_below;

    #[test]
    fn test_reconstruct_centered() {
        let moduli = primes_below(50, 2048, 3, &[]);
        let basis = CrtBasis::new(&moduli);
        for v in [0i64, 1, -1, 123_456_789, -987_654_321_012] {
            let x = BigInt::from(v);
            let residues: Vec<u64> = moduli.iter().map(|&q| residue(&x, q)).collect();
            assert_eq!(basis.reconstruct_centered(&residues), x);
        }
        let big = basis.product() / 3;
        let residues: Vec<u64> = moduli.iter().map(|&q| residue(&big, q)).collect();
        assert_eq!(basis.reconstruct(&residues), big);
    }

    #[test]
    fn test_div_round() {
        let cases = [(7, 2, 4), (-7, 2, -4), (5, 3, 2), (-5, 3, -2), (4, 3, 1), (-4, 3, -1)];
        for (a, b, want) in cases {
            assert_eq!(
                BigInt::from(a).div_round(&BigInt::from(b)),
                BigInt::from(want),
                "{a} / {b}"
            );
        }
    }
}
