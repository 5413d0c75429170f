//! Parameter sets and the shared evaluation context.
//!
//! [`Parameters`] is the serialisable description (what lives on disk next to
//! the keys). [`Context`] is the immutable, precomputed form every operation
//! borrows: NTT tables per prime, CRT bases per level and, for the exact
//! scheme, the auxiliary basis used by ciphertext multiplication.

use crate::arith::{bit_len, is_prime, primes_below, primes_near};
use crate::crt::{residue, CrtBasis};
use crate::error::ProvisionError;
use crate::ntt::NttTable;
use fnv::FnvHasher;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hasher;
use std::sync::Arc;

/// Which homomorphic scheme a parameter set (and every ciphertext under it) uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    /// CKKS: fixed-point real arithmetic with rescaling.
    #[serde(alias = "ckks")]
    Approximate,
    /// BFV: exact arithmetic on signed integers modulo `t`.
    #[serde(alias = "bfv")]
    Exact,
}

impl Scheme {
    /// Byte used in the ciphertext header.
    pub fn tag(self) -> u8 {
        match self {
            Scheme::Approximate => 0,
            Scheme::Exact => 1,
        }
    }

    /// Inverse of [`Scheme::tag`].
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Scheme::Approximate),
            1 => Some(Scheme::Exact),
            _ => None,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Approximate => f.write_str("approximate (CKKS)"),
            Scheme::Exact => f.write_str("exact (BFV)"),
        }
    }
}

/// Named parameter sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ParameterPreset {
    /// N = 1024. Fast, NOT secure: tests and demos only.
    Small,
    /// N = 16384 with the same modulus chain, ~128-bit security.
    Medium,
}

impl ParameterPreset {
    fn log_n(self) -> u8 {
        match self {
            ParameterPreset::Small => 10,
            ParameterPreset::Medium => 14,
        }
    }
}

/// log2 of the CKKS scale Δ.
pub const DEFAULT_SCALE_BITS: u32 = 40;
/// BFV plaintext modulus t.
pub const DEFAULT_PLAIN_MODULUS: u64 = 65537;
/// Standard deviation of the encryption error.
pub const DEFAULT_ERROR_STD_DEV: f64 = 3.2;

/// Serialisable parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    /// Scheme this set is for.
    pub scheme: Scheme,
    /// Ring degree N = 2^log_n.
    pub log_n: u8,
    /// Ciphertext modulus chain q_0, q_1, ... (CKKS drops primes from the end).
    pub moduli: Vec<u64>,
    /// CKKS encoding scale Δ = 2^scale_bits. Unused by BFV.
    pub scale_bits: u32,
    /// BFV plaintext modulus t. Unused by CKKS.
    pub plain_modulus: u64,
    /// Base-2^w digit size of the relinearization gadget.
    pub decomposition_bits: u32,
    /// Standard deviation of the Gaussian error.
    pub error_std_dev: f64,
}

impl Parameters {
    /// Builds a named parameter set; the primes are searched for, not tabulated.
    pub fn preset(scheme: Scheme, preset: ParameterPreset) -> Self {
        let log_n = preset.log_n();
        let two_n = 2u64 << log_n;
        match scheme {
            Scheme::Approximate => {
                // one 60-bit base prime, eight rescale primes as close to Δ as possible
                let mut moduli = primes_below(60, two_n, 1, &[]);
                let rescale = primes_near(DEFAULT_SCALE_BITS, two_n, 8, &moduli);
                moduli.extend(rescale);
                Self {
                    scheme,
                    log_n,
                    moduli,
                    scale_bits: DEFAULT_SCALE_BITS,
                    plain_modulus: 0,
                    decomposition_bits: 30,
                    error_std_dev: DEFAULT_ERROR_STD_DEV,
                }
            }
            Scheme::Exact => Self {
                scheme,
                log_n,
                moduli: primes_below(55, two_n, 3, &[]),
                scale_bits: 0,
                plain_modulus: DEFAULT_PLAIN_MODULUS,
                decomposition_bits: 60,
                error_std_dev: DEFAULT_ERROR_STD_DEV,
            },
        }
    }

    /// Ring degree N.
    pub fn degree(&self) -> usize {
        1usize << self.log_n
    }

    /// Checks degree, prime chain, scale room and gadget size.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        let invalid = |msg: String| Err(ProvisionError::InvalidParameters(msg));

        if !(3..=16).contains(&self.log_n) {
            return invalid(format!("log_n {} outside 3..=16", self.log_n));
        }
        if self.moduli.is_empty() || self.moduli.len() > u8::MAX as usize {
            return invalid(format!("{} moduli, need 1..=255", self.moduli.len()));
        }
        let two_n = 2u64 << self.log_n;
        for (i, &q) in self.moduli.iter().enumerate() {
            if bit_len(q) > 62 || !is_prime(q) || q % two_n != 1 {
                return invalid(format!("q_{i} = {q} is not an NTT-friendly prime below 2^62"));
            }
            if self.moduli[..i].contains(&q) {
                return invalid(format!("q_{i} = {q} appears twice"));
            }
        }
        if !(1..=62).contains(&self.decomposition_bits) {
            return invalid(format!(
                "decomposition_bits {} outside 1..=62",
                self.decomposition_bits
            ));
        }
        if !self.error_std_dev.is_finite() || self.error_std_dev < 0.0 {
            return invalid(format!("error_std_dev {}", self.error_std_dev));
        }
        match self.scheme {
            Scheme::Approximate => {
                let base_bits = bit_len(self.moduli[0]);
                if self.scale_bits == 0 || self.scale_bits + 2 >= base_bits {
                    return invalid(format!(
                        "scale_bits {} leaves no room below q_0 ({base_bits} bits)",
                        self.scale_bits
                    ));
                }
            }
            Scheme::Exact => {
                let t = self.plain_modulus;
                if t < 3 || !is_prime(t) {
                    return invalid(format!("plain modulus {t} must be an odd prime"));
                }
                if self.moduli.iter().any(|&q| q <= t) {
                    return invalid("every q_i must exceed the plain modulus".into());
                }
            }
        }
        Ok(())
    }

    /// FNV-1a digest of every field; embedded in each serialized ciphertext.
    pub fn fingerprint(&self) -> u64 {
        let mut h = FnvHasher::default();
        h.write_u8(self.scheme.tag());
        h.write_u8(self.log_n);
        h.write_usize(self.moduli.len());
        for &q in &self.moduli {
            h.write_u64(q);
        }
        h.write_u32(self.scale_bits);
        h.write_u64(self.plain_modulus);
        h.write_u32(self.decomposition_bits);
        h.write_u64(self.error_std_dev.to_bits());
        h.finish()
    }
}

/// Exact-scheme precomputation.
#[derive(Debug)]
pub(crate) struct ExactTables {
    /// floor(Q / t) mod q_i
    pub delta: Vec<u64>,
    pub q_basis: CrtBasis,
    pub aux_basis: CrtBasis,
    pub aux_tables: Vec<NttTable>,
}

/// Immutable evaluation context, shared as `Arc<Context>`. Holds no key material.
#[derive(Debug)]
pub struct Context {
    params: Parameters,
    fingerprint: u64,
    tables: Vec<NttTable>,
    /// `crt[l]` spans q_0..=q_l
    crt: Vec<CrtBasis>,
    exact: Option<ExactTables>,
}

impl Context {
    /// Validates `params` and builds every table.
    pub fn new(params: Parameters) -> Result<Arc<Self>, ProvisionError> {
        params.validate()?;
        let n = params.degree();
        let tables = params.moduli.iter().map(|&q| NttTable::new(q, n)).collect();
        let crt = (1..=params.moduli.len())
            .map(|k| CrtBasis::new(&params.moduli[..k]))
            .collect::<Vec<_>>();

        let exact = match params.scheme {
            Scheme::Approximate => None,
            Scheme::Exact => Some(Self::exact_tables(&params, &crt)),
        };

        let fingerprint = params.fingerprint();
        tracing::debug!(
            scheme = %params.scheme,
            n,
            limbs = params.moduli.len(),
            fingerprint = %format!("{fingerprint:016x}"),
            "evaluation context ready"
        );
        Ok(Arc::new(Self {
            params,
            fingerprint,
            tables,
            crt,
            exact,
        }))
    }

    fn exact_tables(params: &Parameters, crt: &[CrtBasis]) -> ExactTables {
        let n = params.degree();
        let q_basis = crt[crt.len() - 1].clone();
        let q = q_basis.product().clone();
        let delta = &q / params.plain_modulus;

        // tensor coefficients are bounded by N·Q²/2; the centred lift needs P > N·Q²
        let bound: BigInt = &q * &q * (n as u64) * 4u32;
        // every auxiliary prime exceeds 2^60
        let count = (bound.bits() / 60 + 1) as usize;
        let aux = primes_below(61, 2 * n as u64, count, &params.moduli);

        ExactTables {
            delta: params.moduli.iter().map(|&qi| residue(&delta, qi)).collect(),
            q_basis,
            aux_tables: aux.iter().map(|&p| NttTable::new(p, n)).collect(),
            aux_basis: CrtBasis::new(&aux),
        }
    }

    /// Parameters the context was built from.
    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Scheme of the parameter set.
    pub fn scheme(&self) -> Scheme {
        self.params.scheme
    }

    /// Fingerprint of the parameter set.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Ring degree N.
    pub fn degree(&self) -> usize {
        self.params.degree()
    }

    /// Full prime chain.
    pub fn moduli(&self) -> &[u64] {
        &self.params.moduli
    }

    /// Level of a fresh ciphertext.
    pub fn max_level(&self) -> usize {
        self.params.moduli.len() - 1
    }

    pub(crate) fn tables(&self) -> &[NttTable] {
        &self.tables
    }

    pub(crate) fn crt(&self, level: usize) -> &CrtBasis {
        &self.crt[level]
    }

    pub(crate) fn exact(&self) -> Option<&ExactTables> {
        self.exact.as_ref()
    }

    /// Δ for the approximate scheme.
    pub fn scale(&self) -> f64 {
        2f64.powi(self.params.scale_bits as i32)
    }

    /// BFV plaintext modulus t.
    pub fn plain_modulus(&self) -> u64 {
        self.params.plain_modulus
    }

    /// Largest plaintext magnitude accepted by encryption.
    pub fn max_value(&self) -> f64 {
        match self.params.scheme {
            Scheme::Approximate => {
                let room = bit_len(self.params.moduli[0]) - self.params.scale_bits - 2;
                2f64.powi(room as i32)
            }
            Scheme::Exact => (self.params.plain_modulus / 2) as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        for scheme in [Scheme::Approximate, Scheme::Exact] {
            let p = Parameters::preset(scheme, ParameterPreset::Small);
            p.validate().unwrap();
            assert_eq!(p.degree(), 1024);
        }
        let ckks = Parameters::preset(Scheme::Approximate, ParameterPreset::Small);
        assert_eq!(ckks.moduli.len(), 9);
        assert_eq!(bit_len(ckks.moduli[0]), 60);
    }

    #[test]
    fn test_validate_rejects() {
        let mut p = Parameters::preset(Scheme::Exact, ParameterPreset::Small);
        p.plain_modulus = 65536;
        assert!(matches!(p.validate(), Err(ProvisionError::InvalidParameters(_))));

        let mut p = Parameters::preset(Scheme::Approximate, ParameterPreset::Small);
        p.moduli.push(p.moduli[1]);
        assert!(p.validate().is_err());

        let mut p = Parameters::preset(Scheme::Approximate, ParameterPreset::Small);
        p.moduli[2] += 2;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_fingerprint_distinguishes() {
        let a = Parameters::preset(Scheme::Approximate, ParameterPreset::Small);
        let b = Parameters::preset(Scheme::Exact, ParameterPreset::Small);
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
        let mut c = a.clone();
        c.scale_bits = 39;
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_params_json_round_trip() {
        let p = Parameters::preset(Scheme::Exact, ParameterPreset::Small);
        let json = serde_json::to_string(&p).unwrap();
        let back: Parameters = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
        assert!(json.contains("\"exact\""));
    }

    #[test]
    fn test_exact_context_aux_basis() {
        let ctx = Context::new(Parameters::preset(Scheme::Exact, ParameterPreset::Small)).unwrap();
        let exact = ctx.exact().unwrap();
        let q = exact.q_basis.product();
        let need = q * q * 1024u32;
        assert!(exact.aux_basis.product() > &need);
        assert!(ctx.moduli().iter().all(|q| !exact.aux_basis.moduli().contains(q)));
    }
}
