//! The two key-holding roles.
//!
//! [`Encryptor`] needs only the public key and may live anywhere.
//! [`Custodian`] owns the secret key; it is the only type in the crate that
//! can turn a ciphertext back into a [`Scalar`].

use crate::bfv;
use crate::ciphertext::Ciphertext;
use crate::ckks;
use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::evaluator::check_operand;
use crate::keys::{PublicKey, SecretKey};
use crate::params::{Context, Scheme};
use crate::polynomial::RnsPoly;
use crate::sampling;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Decrypted (or to-be-encrypted) plaintext value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    /// Approximate scheme.
    Real(f64),
    /// Exact scheme.
    Integer(i64),
}

impl Scalar {
    /// Scheme this kind of value is encrypted under.
    pub fn scheme(&self) -> Scheme {
        match self {
            Scalar::Real(_) => Scheme::Approximate,
            Scalar::Integer(_) => Scheme::Exact,
        }
    }

    /// Value as a float, whatever the variant.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Scalar::Real(v) => v,
            Scalar::Integer(v) => v as f64,
        }
    }

    /// Wraps a plain number in the variant `scheme` expects.
    pub fn for_scheme(scheme: Scheme, value: f64) -> Result<Self> {
        match scheme {
            Scheme::Approximate => Ok(Scalar::Real(value)),
            Scheme::Exact if value.fract() == 0.0 && value.abs() < 9.2e18 => {
                Ok(Scalar::Integer(value as i64))
            }
            Scheme::Exact => Err(Error::ValueOutOfRange(format!(
                "{value} is not an integer"
            ))),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Real(v) => write!(f, "{v}"),
            Scalar::Integer(v) => write!(f, "{v}"),
        }
    }
}

/// Public-key encryption of scalars.
#[derive(Clone, Debug)]
pub struct Encryptor {
    ctx: Arc<Context>,
    pk: Arc<PublicKey>,
    codec: Codec,
}

impl Encryptor {
    /// Fails with `SchemeMismatch` when `pk` belongs to other parameters.
    pub fn new(ctx: Arc<Context>, pk: Arc<PublicKey>) -> Result<Self> {
        if pk.fingerprint() != ctx.fingerprint() {
            return Err(Error::SchemeMismatch(
                "public key was generated for another parameter set".into(),
            ));
        }
        let codec = Codec::new(ctx.clone());
        Ok(Self { ctx, pk, codec })
    }

    /// Encrypts with the thread-local RNG.
    pub fn encrypt(&self, value: Scalar) -> Result<Ciphertext> {
        self.encrypt_with_rng(value, &mut rand::thread_rng())
    }

    /// [`Encryptor::encrypt`] followed by serialization.
    pub fn encrypt_bytes(&self, value: Scalar) -> Result<Vec<u8>> {
        Ok(self.codec.serialize(&self.encrypt(value)?))
    }

    /// `(b·u + e0 + m, a·u + e1)` with a fresh ternary `u`.
    pub fn encrypt_with_rng<R: Rng + ?Sized>(
        &self,
        value: Scalar,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        let ctx = &self.ctx;
        let n = ctx.degree();
        let moduli = ctx.moduli();
        let tables = ctx.tables();

        let (scale, mut c0) = match (ctx.scheme(), value) {
            (Scheme::Approximate, Scalar::Real(v)) => {
                let max = ctx.max_value();
                if !v.is_finite() || v.abs() > max {
                    return Err(Error::ValueOutOfRange(format!(
                        "{v} outside [-{max}, {max}]"
                    )));
                }
                let mut m = RnsPoly::zero(moduli, n);
                m.add_constant(ckks::encode(v, ctx.scale())?);
                (ctx.scale(), m)
            }
            (Scheme::Exact, Scalar::Integer(v)) => {
                let mut m = RnsPoly::zero(moduli, n);
                m.add_constant_residues(&bfv::encode(ctx, v)?);
                (1.0, m)
            }
            (scheme, value) => {
                return Err(Error::SchemeMismatch(format!(
                    "cannot encrypt a {} value under the {scheme} scheme",
                    value.scheme()
                )))
            }
        };

        let u = RnsPoly::from_signed(&sampling::ternary(n, rng), moduli);
        let std_dev = ctx.params().error_std_dev;
        let e0 = RnsPoly::from_signed(&sampling::gaussian(n, std_dev, rng), moduli);
        let e1 = RnsPoly::from_signed(&sampling::gaussian(n, std_dev, rng), moduli);

        c0 += &self.pk.b.mul_ntt(&u, tables);
        c0 += &e0;
        let c1 = &self.pk.a.mul_ntt(&u, tables) + &e1;

        Ok(Ciphertext::new(
            ctx.scheme(),
            ctx.fingerprint(),
            vec![c0, c1],
            scale,
        ))
    }

    /// Context this value is bound to.
    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }
}

/// Holder of the secret key. Stateless across calls.
#[derive(Clone)]
pub struct Custodian {
    ctx: Arc<Context>,
    sk: SecretKey,
    codec: Codec,
}

impl fmt::Debug for Custodian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Custodian")
            .field("scheme", &self.ctx.scheme())
            .finish_non_exhaustive()
    }
}

impl Custodian {
    /// Fails with `SchemeMismatch` when `sk` belongs to other parameters.
    pub fn new(ctx: Arc<Context>, sk: SecretKey) -> Result<Self> {
        if sk.fingerprint() != ctx.fingerprint() || sk.degree() != ctx.degree() {
            return Err(Error::SchemeMismatch(
                "secret key was generated for another parameter set".into(),
            ));
        }
        let codec = Codec::new(ctx.clone());
        Ok(Self { ctx, sk, codec })
    }

    /// Scheme of the secret key.
    pub fn scheme(&self) -> Scheme {
        self.ctx.scheme()
    }

    /// Fingerprint of the parameter set the secret key belongs to.
    pub fn fingerprint(&self) -> u64 {
        self.ctx.fingerprint()
    }

    /// Validates `bytes` through the codec, then decrypts.
    pub fn decrypt(&self, bytes: &[u8]) -> Result<Scalar> {
        let ct = self.codec.deserialize(bytes)?;
        self.decrypt_ciphertext(&ct)
    }

    /// Decrypts an in-memory ciphertext. Only the constant coefficient of the
    /// phase is computed.
    pub fn decrypt_ciphertext(&self, ct: &Ciphertext) -> Result<Scalar> {
        check_operand(&self.ctx, ct)?;
        let limbs = ct.limb_count();
        let moduli = &self.ctx.moduli()[..limbs];
        let s = self.sk.to_poly(moduli);

        // constant coefficient of c0 + c1·s (+ c2·s²)
        let mut phase: Vec<u64> = ct.parts[0].limbs().iter().map(|l| l[0]).collect();
        let mut add_term = |term: Vec<u64>| {
            for ((p, t), &q) in phase.iter_mut().zip(term).zip(moduli) {
                *p = crate::arith::add_mod(*p, t, q);
            }
        };
        add_term(ct.parts[1].product_constant_term(&s));
        if let Some(c2) = ct.parts.get(2) {
            let s2 = s.mul_ntt(&s, &self.ctx.tables()[..limbs]);
            add_term(c2.product_constant_term(&s2));
        }
        let phase = self.ctx.crt(limbs - 1).reconstruct_centered(&phase);

        let value = match self.ctx.scheme() {
            Scheme::Approximate => {
                let v = ckks::decode(&phase, ct.scale);
                if !v.is_finite() {
                    return Err(Error::MalformedCiphertext(format!(
                        "decrypts to {v} at scale {:e}",
                        ct.scale
                    )));
                }
                Scalar::Real(v)
            }
            Scheme::Exact => Scalar::Integer(bfv::decode(&self.ctx, &phase)?),
        };
        tracing::debug!(level = ct.level(), parts = ct.size(), "decrypted");
        Ok(value)
    }
}
