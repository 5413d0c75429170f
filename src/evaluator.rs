//! Scheme-agnostic primitive operations.
//!
//! [`HomomorphicOps`] is the operation set the statistics engine is written
//! against. [`Evaluator`] closes it over the two supported schemes and
//! dispatches with a plain `match`.

use crate::bfv::BfvEvaluator;
use crate::ciphertext::Ciphertext;
use crate::ckks::CkksEvaluator;
use crate::error::{Error, Result};
use crate::keys::EvaluationKeys;
use crate::params::{Context, Scheme};
use crate::polynomial::RnsPoly;
use std::sync::Arc;

/// Primitive homomorphic operations. Inputs are borrowed, outputs are fresh
/// ciphertexts, except for [`HomomorphicOps::add_assign`].
pub trait HomomorphicOps {
    /// Context every operand must belong to.
    fn context(&self) -> &Arc<Context>;

    /// `a + b`, at the lower of the two levels.
    fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext>;

    /// In-place accumulation `acc += b`.
    fn add_assign(&self, acc: &mut Ciphertext, b: &Ciphertext) -> Result<()> {
        *acc = self.add(acc, b)?;
        Ok(())
    }

    /// `a - b`, at the lower of the two levels.
    fn sub(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext>;

    /// Tensor product. Both operands must be relinearized; the result has
    /// three parts and, under CKKS, the product of the scales.
    fn mul(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext>;

    /// Adds a plaintext constant.
    fn add_const(&self, a: &Ciphertext, k: f64) -> Result<Ciphertext>;

    /// Multiplies by a plaintext constant. Under CKKS a fractional `k` spends a level.
    fn mul_const(&self, a: &Ciphertext, k: f64) -> Result<Ciphertext>;

    /// Divides by a plaintext constant; zero is `DivisionByZero`.
    fn div_const(&self, a: &Ciphertext, divisor: f64) -> Result<Ciphertext>;

    /// `-a`.
    fn negate(&self, a: &Ciphertext) -> Result<Ciphertext>;

    /// Three parts back to two. Two-part input is returned unchanged.
    fn relinearize(&self, a: &Ciphertext) -> Result<Ciphertext>;

    /// Divides by the last prime and drops it. CKKS only.
    fn rescale(&self, a: &Ciphertext) -> Result<Ciphertext>;

    /// Encryption of zero at the level (and scale) of `a`, computed as `a - a`.
    fn zero_like(&self, a: &Ciphertext) -> Result<Ciphertext> {
        self.sub(a, a)
    }
}

/// Closed set of evaluators.
#[derive(Clone, Debug)]
pub enum Evaluator {
    /// CKKS.
    Approximate(CkksEvaluator),
    /// BFV.
    Exact(BfvEvaluator),
}

impl Evaluator {
    /// Picks the evaluator for `ctx.scheme()`.
    pub fn new(ctx: Arc<Context>, keys: Arc<EvaluationKeys>) -> Result<Self> {
        if keys.fingerprint() != ctx.fingerprint() {
            return Err(Error::SchemeMismatch(
                "evaluation keys were generated for another parameter set".into(),
            ));
        }
        Ok(match ctx.scheme() {
            Scheme::Approximate => Evaluator::Approximate(CkksEvaluator::new(ctx, keys)),
            Scheme::Exact => Evaluator::Exact(BfvEvaluator::new(ctx, keys)),
        })
    }

    /// Scheme in use.
    pub fn scheme(&self) -> Scheme {
        match self {
            Evaluator::Approximate(_) => Scheme::Approximate,
            Evaluator::Exact(_) => Scheme::Exact,
        }
    }

    /// `mul` → `relinearize` → `rescale` (the last step only under CKKS).
    pub fn product(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        let relin = self.relinearize(&self.mul(a, b)?)?;
        match self {
            Evaluator::Approximate(ev) => ev.rescale(&relin),
            Evaluator::Exact(_) => Ok(relin),
        }
    }

    /// Division by a constant the caller knows divides the encrypted value.
    /// Under the exact scheme this uses the modular inverse of `divisor`.
    pub(crate) fn div_exact(&self, a: &Ciphertext, divisor: i64) -> Result<Ciphertext> {
        match self {
            Evaluator::Approximate(ev) => ev.div_const(a, divisor as f64),
            Evaluator::Exact(ev) => ev.div_exact(a, divisor),
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $ev:ident => $body:expr) => {
        match $self {
            Evaluator::Approximate($ev) => $body,
            Evaluator::Exact($ev) => $body,
        }
    };
}

impl HomomorphicOps for Evaluator {
    fn context(&self) -> &Arc<Context> {
        dispatch!(self, ev => ev.context())
    }
    fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        dispatch!(self, ev => ev.add(a, b))
    }
    fn add_assign(&self, acc: &mut Ciphertext, b: &Ciphertext) -> Result<()> {
        dispatch!(self, ev => ev.add_assign(acc, b))
    }
    fn sub(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        dispatch!(self, ev => ev.sub(a, b))
    }
    fn mul(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        dispatch!(self, ev => ev.mul(a, b))
    }
    fn add_const(&self, a: &Ciphertext, k: f64) -> Result<Ciphertext> {
        dispatch!(self, ev => ev.add_const(a, k))
    }
    fn mul_const(&self, a: &Ciphertext, k: f64) -> Result<Ciphertext> {
        dispatch!(self, ev => ev.mul_const(a, k))
    }
    fn div_const(&self, a: &Ciphertext, divisor: f64) -> Result<Ciphertext> {
        dispatch!(self, ev => ev.div_const(a, divisor))
    }
    fn negate(&self, a: &Ciphertext) -> Result<Ciphertext> {
        dispatch!(self, ev => ev.negate(a))
    }
    fn relinearize(&self, a: &Ciphertext) -> Result<Ciphertext> {
        dispatch!(self, ev => ev.relinearize(a))
    }
    fn rescale(&self, a: &Ciphertext) -> Result<Ciphertext> {
        dispatch!(self, ev => ev.rescale(a))
    }
    fn zero_like(&self, a: &Ciphertext) -> Result<Ciphertext> {
        dispatch!(self, ev => ev.zero_like(a))
    }
}

// ------------------------------------------------------------
// helpers shared by both schemes
// ------------------------------------------------------------

/// Rejects ciphertexts produced under another context.
pub(crate) fn check_operand(ctx: &Context, ct: &Ciphertext) -> Result<()> {
    if ct.scheme != ctx.scheme() {
        return Err(Error::SchemeMismatch(format!(
            "{} ciphertext given to the {} evaluator",
            ct.scheme,
            ctx.scheme()
        )));
    }
    if ct.fingerprint != ctx.fingerprint() {
        return Err(Error::SchemeMismatch(format!(
            "ciphertext fingerprint {:016x}, context is {:016x}",
            ct.fingerprint,
            ctx.fingerprint()
        )));
    }
    Ok(())
}

/// Brings both operands to the lower of their two levels.
pub(crate) fn aligned(a: &Ciphertext, b: &Ciphertext) -> (Ciphertext, Ciphertext) {
    let limbs = a.limb_count().min(b.limb_count());
    let mut a = a.clone();
    let mut b = b.clone();
    a.truncate(limbs);
    b.truncate(limbs);
    (a, b)
}

/// Part-wise `a ± b`; a missing third part counts as zero.
pub(crate) fn combine_parts(a: &Ciphertext, b: &Ciphertext, subtract: bool) -> Vec<RnsPoly> {
    let size = a.size().max(b.size());
    (0..size)
        .filter_map(|i| match (a.parts.get(i), b.parts.get(i)) {
            (Some(x), Some(y)) => Some(if subtract { x - y } else { x + y }),
            (Some(x), None) => Some(x.clone()),
            (None, Some(y)) => Some(if subtract { -y } else { y.clone() }),
            (None, None) => None,
        })
        .collect()
}

pub(crate) fn negate_parts(a: &Ciphertext) -> Vec<RnsPoly> {
    a.parts.iter().map(|p| -p).collect()
}

/// Degree-two tensor `(a0b0, a0b1 + a1b0, a1b1)` over the primes in `tables`.
pub(crate) fn tensor(
    a: &[RnsPoly],
    b: &[RnsPoly],
    tables: &[crate::ntt::NttTable],
) -> Vec<RnsPoly> {
    let forward = |p: &RnsPoly| {
        let mut p = p.clone();
        p.forward(tables);
        p
    };
    let (a0, a1) = (forward(&a[0]), forward(&a[1]));
    let (b0, b1) = (forward(&b[0]), forward(&b[1]));

    let mut d0 = a0.mul_pointwise(&b0);
    let mut d1 = a0.mul_pointwise(&b1);
    d1 += &a1.mul_pointwise(&b0);
    let mut d2 = a1.mul_pointwise(&b1);
    for d in [&mut d0, &mut d1, &mut d2] {
        d.inverse(tables);
    }
    vec![d0, d1, d2]
}

/// Replaces `(c0, c1, c2)` by `(c0 + d0, c1 + d1)` with the relinearization key.
pub(crate) fn relinearize_parts(
    ctx: &Context,
    keys: &EvaluationKeys,
    ct: &Ciphertext,
) -> Result<Ciphertext> {
    check_operand(ctx, ct)?;
    match ct.size() {
        2 => Ok(ct.clone()),
        3 => {
            let (d0, d1) = keys.relinearization().switch(&ct.parts[2], ctx);
            let parts = vec![&ct.parts[0] + &d0, &ct.parts[1] + &d1];
            Ok(Ciphertext::new(ct.scheme, ct.fingerprint, parts, ct.scale))
        }
        n => Err(Error::NotRelinearized(n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{approx, exact};

    #[test]
    fn test_enum_dispatches_by_scheme() {
        assert_eq!(approx().evaluator.scheme(), Scheme::Approximate);
        assert_eq!(exact().evaluator.scheme(), Scheme::Exact);
    }

    #[test]
    fn test_rejects_foreign_ciphertext() {
        let a = approx();
        let e = exact();
        let ct = e.encrypt_raw(4.0);
        let own = a.encrypt_raw(4.0);
        assert!(matches!(a.evaluator.add(&own, &ct), Err(Error::SchemeMismatch(_))));
        assert!(matches!(a.evaluator.negate(&ct), Err(Error::SchemeMismatch(_))));
    }

    #[test]
    fn test_evaluator_rejects_foreign_keys() {
        let a = approx();
        let e = exact();
        let err = Evaluator::new(a.ctx.clone(), e.evk.clone()).unwrap_err();
        assert!(matches!(err, Error::SchemeMismatch(_)));
    }

    #[test]
    fn test_zero_like_keeps_level() {
        for fx in [approx(), exact()] {
            let x = fx.encrypt_raw(7.0);
            let z = fx.evaluator.zero_like(&x).unwrap();
            assert_eq!(z.level(), x.level());
            assert_eq!(fx.decrypt_raw(&z), 0.0);
        }
    }

    #[test]
    fn test_product_of_three_part_operand_is_refused() {
        for fx in [approx(), exact()] {
            let x = fx.encrypt_raw(2.0);
            let raw = fx.evaluator.mul(&x, &x).unwrap();
            assert_eq!(raw.size(), 3);
            assert!(matches!(
                fx.evaluator.mul(&raw, &x),
                Err(Error::NotRelinearized(3))
            ));
        }
    }
}
