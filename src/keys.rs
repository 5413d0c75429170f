//! Key material: secret key, public key and the relinearization key.
//!
//! The relinearization key uses an RNS gadget: for every prime q_i and every
//! base-2^w digit k of a residue modulo q_i, the component
//! `(b_ik, a_ik) = (-(a_ik·s) + e_ik + 2^{wk}·s²·[limb i], a_ik)`.
//! The gadget value is non-zero on limb i only, so dropping trailing limbs
//! yields a valid key for every lower level.

use crate::arith::bit_len;
use crate::params::Context;
use crate::polynomial::RnsPoly;
use crate::sampling;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Ternary secret `s`. Only ever held by the custodian.
#[derive(Clone, Serialize, Deserialize)]
pub struct SecretKey {
    fingerprint: u64,
    coeffs: Vec<i64>,
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("fingerprint", &format_args!("{:016x}", self.fingerprint))
            .finish_non_exhaustive()
    }
}

impl SecretKey {
    /// Fingerprint of the parameter set the key was generated under.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub(crate) fn to_poly(&self, moduli: &[u64]) -> RnsPoly {
        RnsPoly::from_signed(&self.coeffs, moduli)
    }

    pub(crate) fn degree(&self) -> usize {
        self.coeffs.len()
    }
}

/// `(b, a) = (-(a·s) + e, a)` at the top level, coefficient domain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublicKey {
    fingerprint: u64,
    pub(crate) b: RnsPoly,
    pub(crate) a: RnsPoly,
}

impl PublicKey {
    /// Fingerprint of the parameter set the key was generated under.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

/// Gadget key switching `s² → s`. Components are kept in the NTT domain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelinearizationKey {
    decomposition_bits: u32,
    /// `components[i][k]` = (b_ik, a_ik)
    components: Vec<Vec<(RnsPoly, RnsPoly)>>,
}

impl RelinearizationKey {
    /// Returns `(d0, d1)` with `d0 + d1·s ≈ c2·s²` modulo the primes of `c2`.
    /// `c2` must be in the coefficient domain; the outputs are too.
    pub(crate) fn switch(&self, c2: &RnsPoly, ctx: &Context) -> (RnsPoly, RnsPoly) {
        let n = c2.degree();
        let moduli = c2.moduli();
        let tables = &ctx.tables()[..moduli.len()];
        let w = self.decomposition_bits;
        let mask = (1u64 << w) - 1;

        let mut acc0 = RnsPoly::zero(moduli, n);
        let mut acc1 = RnsPoly::zero(moduli, n);
        for (i, digits) in self.components.iter().enumerate().take(moduli.len()) {
            let residues = c2.limb(i);
            for (k, (b, a)) in digits.iter().enumerate() {
                let shift = w * k as u32;
                let limbs = moduli
                    .iter()
                    .map(|&q| residues.iter().map(|&c| ((c >> shift) & mask) % q).collect())
                    .collect();
                let mut digit = RnsPoly::from_limbs(moduli, limbs);
                digit.forward(tables);
                acc0 += &digit.mul_pointwise(b);
                acc1 += &digit.mul_pointwise(a);
            }
        }
        acc0.inverse(tables);
        acc1.inverse(tables);
        (acc0, acc1)
    }

    /// Total number of gadget components over all primes.
    pub fn component_count(&self) -> usize {
        self.components.iter().map(Vec::len).sum()
    }
}

/// Public evaluation material handed to the computing party.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluationKeys {
    fingerprint: u64,
    pub(crate) relinearization: RelinearizationKey,
}

impl EvaluationKeys {
    /// Fingerprint of the parameter set the keys were generated under.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Key used by `relinearize`.
    pub fn relinearization(&self) -> &RelinearizationKey {
        &self.relinearization
    }
}

/// Samples key material for one context.
pub struct KeyGenerator {
    ctx: Arc<Context>,
}

impl KeyGenerator {
    /// Generator for keys under `ctx`.
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Fresh ternary secret.
    pub fn secret_key<R: Rng + ?Sized>(&self, rng: &mut R) -> SecretKey {
        SecretKey {
            fingerprint: self.ctx.fingerprint(),
            coeffs: sampling::ternary(self.ctx.degree(), rng),
        }
    }

    /// Fresh RLWE sample `(-(a·s) + e, a)` over every prime.
    fn rlwe_sample<R: Rng + ?Sized>(&self, s: &RnsPoly, rng: &mut R) -> (RnsPoly, RnsPoly) {
        let ctx = &self.ctx;
        let n = ctx.degree();
        let a = sampling::uniform(ctx.moduli(), n, rng);
        let e = RnsPoly::from_signed(
            &sampling::gaussian(n, ctx.params().error_std_dev, rng),
            ctx.moduli(),
        );
        let b = &e - &a.mul_ntt(s, ctx.tables());
        (b, a)
    }

    /// Public key for `sk` at the top level.
    pub fn public_key<R: Rng + ?Sized>(&self, sk: &SecretKey, rng: &mut R) -> PublicKey {
        let s = sk.to_poly(self.ctx.moduli());
        let (b, a) = self.rlwe_sample(&s, rng);
        PublicKey {
            fingerprint: self.ctx.fingerprint(),
            b,
            a,
        }
    }

    /// Relinearization key for `sk`.
    pub fn evaluation_keys<R: Rng + ?Sized>(&self, sk: &SecretKey, rng: &mut R) -> EvaluationKeys {
        let ctx = &self.ctx;
        let moduli = ctx.moduli();
        let tables = ctx.tables();
        let w = ctx.params().decomposition_bits;

        let s = sk.to_poly(moduli);
        let s2 = s.mul_ntt(&s, tables);

        let mut components = Vec::with_capacity(moduli.len());
        for (i, &qi) in moduli.iter().enumerate() {
            let digit_count = bit_len(qi).div_ceil(w) as usize;
            let mut digits = Vec::with_capacity(digit_count);
            for k in 0..digit_count {
                let (mut b, mut a) = self.rlwe_sample(&s, rng);

                // 2^{wk}·s² on limb i only
                let g = crate::arith::pow_mod(2, (w * k as u32) as u64, qi);
                let mut limbs = vec![vec![0u64; ctx.degree()]; moduli.len()];
                limbs[i] = s2
                    .limb(i)
                    .iter()
                    .map(|&c| crate::arith::mul_mod(c, g, qi))
                    .collect();
                b += &RnsPoly::from_limbs(moduli, limbs);

                b.forward(tables);
                a.forward(tables);
                digits.push((b, a));
            }
            components.push(digits);
        }

        let relinearization = RelinearizationKey {
            decomposition_bits: w,
            components,
        };
        tracing::debug!(
            components = relinearization.component_count(),
            "relinearization key generated"
        );
        EvaluationKeys {
            fingerprint: ctx.fingerprint(),
            relinearization,
        }
    }

    /// Secret, public and evaluation keys in one go.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> (SecretKey, PublicKey, EvaluationKeys) {
        let sk = self.secret_key(rng);
        let pk = self.public_key(&sk, rng);
        let evk = self.evaluation_keys(&sk, rng);
        (sk, pk, evk)
    }
}
