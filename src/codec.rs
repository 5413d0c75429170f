//! Binary ciphertext format.
//!
//! Layout (little-endian):
//! `"HECT" | version u8 | scheme u8 | parts u8 | limbs u8 | log_n u8 |
//!  fingerprint u64 | scale f64 | parts × limbs × N × u64`.
//!
//! Structural faults are [`Error::MalformedCiphertext`]; a well-formed blob
//! produced under other parameters is [`Error::SchemeMismatch`].

use crate::ciphertext::Ciphertext;
use crate::ckks::scales_match;
use crate::error::{Error, Result};
use crate::params::{Context, Scheme};
use crate::polynomial::RnsPoly;
use std::sync::Arc;

/// First four bytes of every serialized ciphertext.
pub const MAGIC: [u8; 4] = *b"HECT";
/// Format version written and accepted.
pub const VERSION: u8 = 1;
/// Fixed header size in bytes.
pub const HEADER_LEN: usize = 4 + 1 + 1 + 1 + 1 + 1 + 8 + 8;

/// Serializer bound to one parameter set.
#[derive(Clone, Debug)]
pub struct Codec {
    ctx: Arc<Context>,
}

fn malformed(msg: impl Into<String>) -> Error {
    Error::MalformedCiphertext(msg.into())
}

impl Codec {
    /// Codec for ciphertexts under `ctx`.
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Context this value is bound to.
    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// Infallible: a ciphertext built under this context always fits the format.
    pub fn serialize(&self, ct: &Ciphertext) -> Vec<u8> {
        let n = self.ctx.degree();
        let limbs = ct.limb_count();
        let mut out = Vec::with_capacity(HEADER_LEN + ct.size() * limbs * n * 8);
        out.extend_from_slice(&MAGIC);
        out.push(VERSION);
        out.push(ct.scheme.tag());
        out.push(ct.size() as u8);
        out.push(limbs as u8);
        out.push(self.ctx.params().log_n);
        out.extend_from_slice(&ct.fingerprint.to_le_bytes());
        out.extend_from_slice(&ct.scale.to_le_bytes());
        for part in &ct.parts {
            for limb in part.limbs() {
                for c in limb {
                    out.extend_from_slice(&c.to_le_bytes());
                }
            }
        }
        out
    }

    /// Parses and validates `bytes`: header fields, scale, body length and every
    /// residue against its prime.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<Ciphertext> {
        let ctx = &self.ctx;
        if bytes.len() < HEADER_LEN {
            return Err(malformed(format!(
                "{} bytes is shorter than the {HEADER_LEN}-byte header",
                bytes.len()
            )));
        }
        let (header, body) = bytes.split_at(HEADER_LEN);
        if header[..4] != MAGIC {
            return Err(malformed("bad magic"));
        }
        if header[4] != VERSION {
            return Err(malformed(format!("unknown format version {}", header[4])));
        }
        let scheme = Scheme::from_tag(header[5])
            .ok_or_else(|| malformed(format!("unknown scheme tag {}", header[5])))?;
        if scheme != ctx.scheme() {
            return Err(Error::SchemeMismatch(format!(
                "ciphertext is {scheme}, context is {}",
                ctx.scheme()
            )));
        }
        let parts = header[6] as usize;
        if !matches!(parts, 2 | 3) {
            return Err(malformed(format!("{parts} polynomial parts")));
        }
        let limbs = header[7] as usize;
        let log_n = header[8];
        if log_n != ctx.params().log_n {
            return Err(Error::SchemeMismatch(format!(
                "ring degree 2^{log_n}, context uses 2^{}",
                ctx.params().log_n
            )));
        }
        let fingerprint = u64::from_le_bytes(read8(&header[9..17]));
        if fingerprint != ctx.fingerprint() {
            return Err(Error::SchemeMismatch(format!(
                "parameter fingerprint {fingerprint:016x}, context is {:016x}",
                ctx.fingerprint()
            )));
        }
        let moduli = ctx.moduli();
        if limbs == 0 || limbs > moduli.len() {
            return Err(malformed(format!("{limbs} limbs, parameters have {}", moduli.len())));
        }
        if scheme == Scheme::Exact && limbs != moduli.len() {
            return Err(malformed("exact-scheme ciphertexts carry every prime"));
        }
        let scale = f64::from_le_bytes(read8(&header[17..25]));
        if !scale.is_finite() || scale <= 0.0 {
            return Err(malformed(format!("scale {scale}")));
        }
        match scheme {
            Scheme::Exact if scale != 1.0 => {
                return Err(malformed(format!("exact-scheme scale {scale}")));
            }
            // Δ after a rescale, Δ² for a product that has not been rescaled yet
            Scheme::Approximate
                if !scales_match(scale, ctx.scale())
                    && !scales_match(scale, ctx.scale() * ctx.scale()) =>
            {
                return Err(malformed(format!(
                    "scale {scale:e} is neither Δ nor Δ² for these parameters"
                )));
            }
            _ => {}
        }

        let n = ctx.degree();
        let expected = parts * limbs * n * 8;
        if body.len() != expected {
            return Err(malformed(format!(
                "body is {} bytes, expected {expected}",
                body.len()
            )));
        }

        let moduli = &moduli[..limbs];
        let mut words = body
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(read8(c)));
        let mut polys = Vec::with_capacity(parts);
        for p in 0..parts {
            let mut limb_vecs = Vec::with_capacity(limbs);
            for (l, &q) in moduli.iter().enumerate() {
                let limb: Vec<u64> = words.by_ref().take(n).collect();
                if let Some(i) = limb.iter().position(|&c| c >= q) {
                    return Err(malformed(format!(
                        "part {p}, limb {l}, coefficient {i}: {} >= q = {q}",
                        limb[i]
                    )));
                }
                limb_vecs.push(limb);
            }
            polys.push(RnsPoly::from_limbs(moduli, limb_vecs));
        }
        Ok(Ciphertext::new(scheme, fingerprint, polys, scale))
    }
}

fn read8(bytes: &[u8]) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    buf
}
