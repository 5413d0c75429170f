//! Exact integer arithmetic (BFV) modulo the plain modulus t.
//!
//! A message `m` is carried as `Δ·m` with `Δ = floor(Q/t)`. Products are
//! formed over an auxiliary prime basis wide enough to hold the integer
//! tensor, then scaled by `t/Q` and rounded back into the ciphertext basis.

use crate::arith::{center, inv_mod, reduce_i128};
use crate::ciphertext::Ciphertext;
use crate::crt::DivRound;
use crate::error::{Error, Result};
use crate::evaluator::{
    aligned, check_operand, combine_parts, negate_parts, relinearize_parts, tensor,
    HomomorphicOps,
};
use crate::keys::EvaluationKeys;
use crate::params::{Context, ExactTables};
use crate::polynomial::RnsPoly;
use num_bigint::BigInt;
use std::sync::Arc;

fn tables(ctx: &Context) -> Result<&ExactTables> {
    ctx.exact()
        .ok_or_else(|| Error::SchemeMismatch("context has no exact-scheme tables".into()))
}

/// Per-limb residues of `Δ·m`.
pub(crate) fn encode(ctx: &Context, m: i64) -> Result<Vec<u64>> {
    let t = ctx.plain_modulus();
    let bound = (t / 2) as i64;
    if m.abs() > bound {
        return Err(Error::ValueOutOfRange(format!(
            "{m} outside [-{bound}, {bound}] for plain modulus {t}"
        )));
    }
    let m = reduce_i128(m as i128, t);
    let delta = &tables(ctx)?.delta;
    Ok(ctx
        .moduli()
        .iter()
        .zip(delta)
        .map(|(&q, &d)| crate::arith::mul_mod(d, m % q, q))
        .collect())
}

/// `round(t·phase/Q) mod t`, centred.
pub(crate) fn decode(ctx: &Context, phase: &BigInt) -> Result<i64> {
    let t = ctx.plain_modulus();
    let q = tables(ctx)?.q_basis.product();
    let scaled = (phase * t).div_round(q);
    let m = crate::crt::residue(&scaled, t);
    Ok(center(m, t))
}

/// Integral constant or `Unsupported`.
fn integral(k: f64) -> Result<i64> {
    if !k.is_finite() || k.abs() >= 9.2e18 {
        return Err(Error::ValueOutOfRange(format!("constant {k}")));
    }
    if k.fract() != 0.0 {
        return Err(Error::Unsupported(format!(
            "the exact scheme only takes integral constants, got {k}"
        )));
    }
    Ok(k as i64)
}

/// Exact-scheme evaluator.
#[derive(Clone, Debug)]
pub struct BfvEvaluator {
    ctx: Arc<Context>,
    keys: Arc<EvaluationKeys>,
}

impl BfvEvaluator {
    /// Evaluator over `ctx`; `keys` must come from the same parameter set.
    pub fn new(ctx: Arc<Context>, keys: Arc<EvaluationKeys>) -> Self {
        Self { ctx, keys }
    }

    fn binary(&self, a: &Ciphertext, b: &Ciphertext, subtract: bool) -> Result<Ciphertext> {
        check_operand(&self.ctx, a)?;
        check_operand(&self.ctx, b)?;
        let (a, b) = aligned(a, b);
        let parts = combine_parts(&a, &b, subtract);
        Ok(Ciphertext::new(a.scheme, a.fingerprint, parts, 1.0))
    }

    /// Multiplies every part by the centred representative of `k mod t`.
    fn scale_by(&self, a: &Ciphertext, k: i64) -> Ciphertext {
        let t = self.ctx.plain_modulus();
        let k = center(reduce_i128(k as i128, t), t);
        let parts = a.parts.iter().map(|p| p.mul_scalar(k as i128)).collect();
        Ciphertext::new(a.scheme, a.fingerprint, parts, 1.0)
    }

    /// Multiplies by `divisor⁻¹ mod t`. The result is the quotient only when
    /// the encrypted value is a multiple of `divisor`; otherwise it is an
    /// unrelated residue, so callers must know the division is exact.
    pub(crate) fn div_exact(&self, a: &Ciphertext, divisor: i64) -> Result<Ciphertext> {
        check_operand(&self.ctx, a)?;
        let t = self.ctx.plain_modulus();
        let inv = inv_mod(reduce_i128(divisor as i128, t), t).ok_or(Error::DivisionByZero)?;
        Ok(self.scale_by(a, inv as i64))
    }
}

impl HomomorphicOps for BfvEvaluator {
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
        let exact = tables(&self.ctx)?;
        let aux = exact.aux_basis.moduli();
        let lift = |p: &RnsPoly| RnsPoly::from_bigints(&p.to_centered(&exact.q_basis), aux);
        let lifted_a: Vec<RnsPoly> = a.parts.iter().map(lift).collect();
        let lifted_b: Vec<RnsPoly> = b.parts.iter().map(lift).collect();

        let t = self.ctx.plain_modulus();
        let q = exact.q_basis.product();
        let moduli = self.ctx.moduli();
        let parts = tensor(&lifted_a, &lifted_b, &exact.aux_tables)
            .iter()
            .map(|d| {
                let scaled: Vec<BigInt> = d
                    .to_centered(&exact.aux_basis)
                    .into_iter()
                    .map(|x| (x * t).div_round(q))
                    .collect();
                RnsPoly::from_bigints(&scaled, moduli)
            })
            .collect();
        tracing::trace!(aux_primes = aux.len(), "bfv tensor");
        Ok(Ciphertext::new(a.scheme, a.fingerprint, parts, 1.0))
    }

    fn add_const(&self, a: &Ciphertext, k: f64) -> Result<Ciphertext> {
        check_operand(&self.ctx, a)?;
        let t = self.ctx.plain_modulus();
        let k = center(reduce_i128(integral(k)? as i128, t), t);
        let residues = encode(&self.ctx, k)?;
        let mut out = a.clone();
        out.parts[0].add_constant_residues(&residues);
        Ok(out)
    }

    fn mul_const(&self, a: &Ciphertext, k: f64) -> Result<Ciphertext> {
        check_operand(&self.ctx, a)?;
        Ok(self.scale_by(a, integral(k)?))
    }

    /// Only `±1` divide every plaintext; any other divisor would hand back a
    /// wrapped residue for dividends it does not divide.
    fn div_const(&self, a: &Ciphertext, divisor: f64) -> Result<Ciphertext> {
        check_operand(&self.ctx, a)?;
        match integral(divisor)? {
            0 => Err(Error::DivisionByZero),
            d @ (1 | -1) => Ok(self.scale_by(a, d)),
            d => Err(Error::Unsupported(format!(
                "division by {d} is not closed over the integers mod {}",
                self.ctx.plain_modulus()
            ))),
        }
    }

    fn negate(&self, a: &Ciphertext) -> Result<Ciphertext> {
        check_operand(&self.ctx, a)?;
        Ok(Ciphertext::new(a.scheme, a.fingerprint, negate_parts(a), 1.0))
    }

    fn relinearize(&self, a: &Ciphertext) -> Result<Ciphertext> {
        relinearize_parts(&self.ctx, &self.keys, a)
    }

    fn rescale(&self, _a: &Ciphertext) -> Result<Ciphertext> {
        Err(Error::Unsupported(
            "rescale has no meaning under the exact scheme".into(),
        ))
    }
}
