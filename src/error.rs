//! Error types.
//!
//! [`Error`] covers everything a single call can get wrong (bad input, mismatched
//! configuration); none of it is transient, so nothing is retried. [`ProvisionError`]
//! is reserved for start-up failures while loading or generating key material.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Per-call error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Byte blob does not parse as a ciphertext for the configured parameters.
    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    /// Aggregate operation called on a zero-length array.
    #[error("cannot use empty array")]
    EmptyInput,

    /// Paired-array operation called with arrays of different lengths.
    #[error("length mismatch: {left} elements vs {right} elements")]
    LengthMismatch {
        /// Length of the first array.
        left: usize,
        /// Length of the second array.
        right: usize,
    },

    /// Ciphertext and context disagree on scheme or parameter set.
    #[error("scheme mismatch: {0}")]
    SchemeMismatch(String),

    /// Division by a plaintext zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Approximate-scheme operands carry incompatible scales.
    #[error("scale mismatch: {left:e} vs {right:e}")]
    ScaleMismatch {
        /// Scale of the left operand.
        left: f64,
        /// Scale of the right operand.
        right: f64,
    },

    /// No prime left to drop for a rescale.
    #[error("ciphertext is at level 0, no modulus left to rescale by")]
    LevelExhausted,

    /// Product of an unrelinearized ciphertext.
    #[error("ciphertext has {0} parts, relinearize before multiplying")]
    NotRelinearized(usize),

    /// Operation has no meaning under the scheme in use.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Plaintext value cannot be encoded under the parameter set.
    #[error("value out of range: {0}")]
    ValueOutOfRange(String),

    /// Transport between the two parties failed.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Remote party refused for a reason without a local counterpart.
    #[error("remote failure: {0}")]
    Remote(String),
}

/// Wire-level classification of an [`Error`], used in oracle refusals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// [`Error::MalformedCiphertext`].
    MalformedCiphertext,
    /// [`Error::SchemeMismatch`].
    SchemeMismatch,
    /// Anything else; rebuilt as [`Error::Remote`].
    Other,
}

impl Error {
    /// Wire classification sent back in a refusal.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedCiphertext(_) => ErrorKind::MalformedCiphertext,
            Error::SchemeMismatch(_) => ErrorKind::SchemeMismatch,
            _ => ErrorKind::Other,
        }
    }

    /// Rebuilds the local variant for a refusal received from the custodian.
    pub fn from_remote(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::MalformedCiphertext => Error::MalformedCiphertext(message),
            ErrorKind::SchemeMismatch => Error::SchemeMismatch(message),
            ErrorKind::Other => Error::Remote(message),
        }
    }
}

/// Result of a per-call operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal start-up error while provisioning parameters and keys.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Reading or writing a key file failed.
    #[error("i/o error on {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying i/o error.
        #[source]
        source: std::io::Error,
    },

    /// A key file is not valid JSON for its bundle type.
    #[error("cannot (de)serialize key material: {0}")]
    Json(#[from] serde_json::Error),

    /// Parameter set failed validation.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Stored keys were generated for a different parameter set.
    #[error("key material does not match parameters: {0}")]
    KeyMismatch(String),
}

impl ProvisionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProvisionError::Io {
            path: path.into(),
            source,
        }
    }
}
