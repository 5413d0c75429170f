//! Approximate arithmetic (CKKS) on constant-polynomial encodings.
//!
//! A real `v` is encoded as the constant polynomial `round(v·Δ)`, so every
//! slot carries the same value. Products multiply scales; [`rescale`] divides
//! by the last prime of the chain and drops it.
//!
//! [`rescale`]: HomomorphicOps::rescale

use crate::ciphertext::Ciphertext;
use crate::crt::to_f64;
use crate::error::{Error, Result};
use crate::evaluator::{
    aligned, check_operand, combine_parts, negate_parts, relinearize_parts, tensor,
    HomomorphicOps,
};
use crate::keys::EvaluationKeys;
use crate::params::Context;
use num_bigint::BigInt;
use std::sync::Arc;

/// Relative distance under which two scales count as equal.
pub const SCALE_TOLERANCE: f64 = 1.0 / 4096.0;

/// Integral constants below this bound are multiplied in without rescaling.
const EXACT_INTEGER_BOUND: f64 = (1u64 << 52) as f64;

/// Largest magnitude of an encoded constant.
const ENCODE_BOUND: f64 = 1.0e36;

pub(crate) fn scales_match(a: f64, b: f64) -> bool {
    ((a - b) / a).abs() <= SCALE_TOLERANCE
}

/// `round(v·scale)`.
pub(crate) fn encode(v: f64, scale: f64) -> Result<i128> {
    let x = (v * scale).round();
    if !x.is_finite() || x.abs() >= ENCODE_BOUND {
        return Err(Error::ValueOutOfRange(format!(
            "{v} cannot be encoded at scale {scale:e}"
        )));
    }
    Ok(x as i128)
}

/// Constant coefficient of the decryption phase back to a real.
pub(crate) fn decode(phase: &BigInt, scale: f64) -> f64 {
    to_f64(phase) / scale
}

/// Approximate-scheme evaluator.
#[derive(Clone, Debug)]
pub struct CkksEvaluator {
    ctx: Arc<Context>,
    keys: Arc<EvaluationKeys>,
}

impl CkksEvaluator {
    /// Evaluator over `ctx`; `keys` must come from the same parameter set.
    pub fn new(ctx: Arc<Context>, keys: Arc<EvaluationKeys>) -> Self {
        Self { ctx, keys }
    }

    fn same_scale(a: &Ciphertext, b: &Ciphertext) -> Result<()> {
        if scales_match(a.scale, b.scale) {
            Ok(())
        } else {
            Err(Error::ScaleMismatch {
                left: a.scale,
                right: b.scale,
            })
        }
    }

    fn binary(&self, a: &Ciphertext, b: &Ciphertext, subtract: bool) -> Result<Ciphertext> {
        check_operand(&self.ctx, a)?;
        check_operand(&self.ctx, b)?;
        Self::same_scale(a, b)?;
        let (a, b) = aligned(a, b);
        let parts = combine_parts(&a, &b, subtract);
        Ok(Ciphertext::new(a.scheme, a.fingerprint, parts, a.scale))
    }
}

impl HomomorphicOps for CkksEvaluator {
    fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.binary(a, b, false)
    }

    fn sub(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.binary(a, b, true)
    }

    fn mul(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        check_operand(&self.ctx, a)?;
        check_operand(&self.ctx, b)?;
        for ct in [a, b] {
            if ct.size() != 2 {
                return Err(Error::NotRelinearized(ct.size()));
            }
        }
        let (a, b) = aligned(a, b);
        let tables = &self.ctx.tables()[..a.limb_count()];
        let parts = tensor(&a.parts, &b.parts, tables);
        tracing::trace!(level = a.level(), "ckks tensor");
        Ok(Ciphertext::new(
            a.scheme,
            a.fingerprint,
            parts,
            a.scale * b.scale,
        ))
    }

    fn add_const(&self, a: &Ciphertext, k: f64) -> Result<Ciphertext> {
        check_operand(&self.ctx, a)?;
        let encoded = encode(k, a.scale)?;
        let mut out = a.clone();
        out.parts[0].add_constant(encoded);
        Ok(out)
    }

    fn mul_const(&self, a: &Ciphertext, k: f64) -> Result<Ciphertext> {
        check_operand(&self.ctx, a)?;
        if !k.is_finite() {
            return Err(Error::ValueOutOfRange(format!("constant {k}")));
        }
        if k.fract() == 0.0 && k.abs() < EXACT_INTEGER_BOUND {
            let parts = a.parts.iter().map(|p| p.mul_scalar(k as i128)).collect();
            return Ok(Ciphertext::new(a.scheme, a.fingerprint, parts, a.scale));
        }

        // k·q_last, then divide q_last back out: scale is unchanged, one level is spent
        let Some(&q_last) = a.parts[0].moduli().last().filter(|_| a.level() > 0) else {
            return Err(Error::LevelExhausted);
        };
        let encoded = encode(k, q_last as f64)?;
        let mut parts: Vec<_> = a.parts.iter().map(|p| p.mul_scalar(encoded)).collect();
        for p in &mut parts {
            p.divide_round_by_last();
        }
        Ok(Ciphertext::new(a.scheme, a.fingerprint, parts, a.scale))
    }

    fn div_const(&self, a: &Ciphertext, divisor: f64) -> Result<Ciphertext> {
        if divisor == 0.0 {
            return Err(Error::DivisionByZero);
        }
        self.mul_const(a, 1.0 / divisor)
    }

    fn negate(&self, a: &Ciphertext) -> Result<Ciphertext> {
        check_operand(&self.ctx, a)?;
        Ok(Ciphertext::new(
            a.scheme,
            a.fingerprint,
            negate_parts(a),
            a.scale,
        ))
    }

    fn relinearize(&self, a: &Ciphertext) -> Result<Ciphertext> {
        relinearize_parts(&self.ctx, &self.keys, a)
    }

    fn rescale(&self, a: &Ciphertext) -> Result<Ciphertext> {
        check_operand(&self.ctx, a)?;
        if a.level() == 0 {
            return Err(Error::LevelExhausted);
        }
        let q_last = a.parts[0].moduli()[a.level()];
        let mut out = a.clone();
        for p in &mut out.parts {
            p.divide_round_by_last();
        }
        out.scale = a.scale / q_last as f64;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::approx;

    const DELTA: f64 = 1e-4;

    #[test]
    fn test_add_sub_negate() {
        let fx = approx();
        let ev = &fx.evaluator;
        let a = fx.encrypt_raw(3.25);
        let b = fx.encrypt_raw(-1.5);
        assert!((fx.decrypt_raw(&ev.add(&a, &b).unwrap()) - 1.75).abs() < DELTA);
        assert!((fx.decrypt_raw(&ev.sub(&a, &b).unwrap()) - 4.75).abs() < DELTA);
        assert!((fx.decrypt_raw(&ev.negate(&a).unwrap()) + 3.25).abs() < DELTA);

        let mut acc = ev.zero_like(&a).unwrap();
        ev.add_assign(&mut acc, &a).unwrap();
        ev.add_assign(&mut acc, &a).unwrap();
        assert!((fx.decrypt_raw(&acc) - 6.5).abs() < DELTA);
    }

    #[test]
    fn test_product_rescales_back_to_delta() {
        let fx = approx();
        let ev = &fx.evaluator;
        let a = fx.encrypt_raw(1.5);
        let b = fx.encrypt_raw(-4.0);

        let raw = ev.mul(&a, &b).unwrap();
        assert_eq!(raw.size(), 3);
        // an unrelinearized ciphertext still decrypts
        assert!((fx.decrypt_raw(&raw) + 6.0).abs() < DELTA);

        let p = ev.product(&a, &b).unwrap();
        assert_eq!(p.size(), 2);
        assert_eq!(p.level(), a.level() - 1);
        assert!(scales_match(p.scale(), fx.ctx.scale()));
        assert!((fx.decrypt_raw(&p) + 6.0).abs() < DELTA);
    }

    #[test]
    fn test_mul_const_integral_and_fractional() {
        let fx = approx();
        let ev = &fx.evaluator;
        let a = fx.encrypt_raw(6.0);

        let tripled = ev.mul_const(&a, 3.0).unwrap();
        assert_eq!(tripled.level(), a.level());
        assert!((fx.decrypt_raw(&tripled) - 18.0).abs() < DELTA);

        let third = ev.mul_const(&a, 1.0 / 3.0).unwrap();
        assert_eq!(third.level(), a.level() - 1);
        assert_eq!(third.scale(), a.scale());
        assert!((fx.decrypt_raw(&third) - 2.0).abs() < DELTA);

        let shifted = ev.add_const(&third, -0.5).unwrap();
        assert!((fx.decrypt_raw(&shifted) - 1.5).abs() < DELTA);
    }

    #[test]
    fn test_div_const() {
        let fx = approx();
        let ev = &fx.evaluator;
        let a = fx.encrypt_raw(10.0);
        assert!((fx.decrypt_raw(&ev.div_const(&a, 4.0).unwrap()) - 2.5).abs() < DELTA);
        assert_eq!(ev.div_const(&a, 0.0).unwrap_err(), Error::DivisionByZero);
    }

    #[test]
    fn test_level_exhaustion() {
        let fx = approx();
        let ev = &fx.evaluator;
        let mut ct = fx.encrypt_raw(1.0);
        ct.truncate(1);
        assert_eq!(ct.level(), 0);
        assert_eq!(ev.rescale(&ct).unwrap_err(), Error::LevelExhausted);
        assert_eq!(ev.mul_const(&ct, 0.5).unwrap_err(), Error::LevelExhausted);
        // integral constants need no level
        assert!((fx.decrypt_raw(&ev.mul_const(&ct, -2.0).unwrap()) + 2.0).abs() < DELTA);
    }

    #[test]
    fn test_scale_mismatch() {
        let fx = approx();
        let ev = &fx.evaluator;
        let a = fx.encrypt_raw(2.0);
        let squared = ev.relinearize(&ev.mul(&a, &a).unwrap()).unwrap();
        assert!(matches!(
            ev.add(&a, &squared),
            Err(Error::ScaleMismatch { .. })
        ));
    }

    #[test]
    fn test_mixed_levels_are_aligned() {
        let fx = approx();
        let ev = &fx.evaluator;
        let a = fx.encrypt_raw(2.0);
        let low = ev.mul_const(&fx.encrypt_raw(8.0), 0.25).unwrap();
        let sum = ev.add(&a, &low).unwrap();
        assert_eq!(sum.level(), low.level());
        assert!((fx.decrypt_raw(&sum) - 4.0).abs() < DELTA);
    }

    #[test]
    fn test_non_finite_constants() {
        let fx = approx();
        let a = fx.encrypt_raw(1.0);
        assert!(matches!(
            fx.evaluator.add_const(&a, f64::NAN),
            Err(Error::ValueOutOfRange(_))
        ));
        assert!(matches!(
            fx.evaluator.mul_const(&a, f64::INFINITY),
            Err(Error::ValueOutOfRange(_))
        ));
    }
}
