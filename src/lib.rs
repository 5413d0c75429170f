//! HE statistics ― aggregate statistics over CKKS / BFV ciphertexts, with a
//! decryption oracle held by a separate key custodian.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, missing_docs)]

extern crate rand;

pub mod arith;
pub mod ntt;
pub mod crt;
pub mod polynomial;
pub mod sampling;
pub mod params;
pub mod keys;
pub mod ciphertext;
pub mod codec;
pub mod evaluator;
pub mod ckks;
pub mod bfv;
pub mod custody;
pub mod stats;
pub mod oracle;
pub mod provision;
pub mod source;
pub mod error;

#[cfg(test)]
mod testing;

pub use ciphertext::Ciphertext;
pub use codec::Codec;
pub use custody::{Custodian, Encryptor, Scalar};
pub use error::{Error, ErrorKind, ProvisionError, Result};
pub use evaluator::{Evaluator, HomomorphicOps};
pub use keys::{EvaluationKeys, KeyGenerator, PublicKey, SecretKey};
pub use oracle::{
    two_step_division, DecryptionOracle, LoopbackTransport, OracleClient, OracleReply,
    OracleRequest, OracleService, Transport,
};
pub use params::{Context, ParameterPreset, Parameters, Scheme};
pub use provision::{
    load_evaluator, load_or_generate, CustodianSide, EvaluatorBundle, EvaluatorSide,
};
pub use source::{CiphertextSource, MemorySource};
pub use stats::StatisticsEngine;
