//! Loading and generating key material on disk.
//!
//! A key directory holds two JSON files:
//! - `custodian.json`: parameters, secret, public and evaluation keys;
//! - `evaluator.json`: parameters, public and evaluation keys, for the party
//!   that computes on ciphertexts and must never see the secret.
//!
//! The two halves are loaded by different functions and land in different
//! types, so no value ever holds both the secret key and an engine.

use crate::custody::{Custodian, Encryptor};
use crate::error::ProvisionError;
use crate::evaluator::Evaluator;
use crate::keys::{EvaluationKeys, KeyGenerator, PublicKey, SecretKey};
use crate::params::{Context, Parameters};
use crate::stats::StatisticsEngine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Custodian key file name inside a key directory.
pub const CUSTODIAN_FILE: &str = "custodian.json";
/// Evaluator key file name inside a key directory.
pub const EVALUATOR_FILE: &str = "evaluator.json";

/// Contents of `custodian.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustodianBundle {
    /// Parameters the keys were generated under.
    pub params: Parameters,
    /// The only copy of the secret.
    pub secret_key: SecretKey,
    /// Encryption key.
    pub public_key: PublicKey,
    /// Relinearization material.
    pub evaluation_keys: EvaluationKeys,
}

/// Contents of `evaluator.json`. Has no secret key field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorBundle {
    /// Parameters the keys were generated under.
    pub params: Parameters,
    /// Encryption key.
    pub public_key: PublicKey,
    /// Relinearization material.
    pub evaluation_keys: EvaluationKeys,
}

impl CustodianBundle {
    /// The public half.
    pub fn evaluator_bundle(&self) -> EvaluatorBundle {
        EvaluatorBundle {
            params: self.params.clone(),
            public_key: self.public_key.clone(),
            evaluation_keys: self.evaluation_keys.clone(),
        }
    }
}

/// Key-holding party. Keeps the public half of its key material so it can
/// hand it to evaluators, and nothing that computes on ciphertexts.
#[derive(Debug)]
pub struct CustodianSide {
    /// Shared context.
    pub context: Arc<Context>,
    /// Secret-key holder.
    pub custodian: Custodian,
    /// What the custodian hands to evaluators.
    pub published: EvaluatorBundle,
}

/// Evaluating party only.
#[derive(Debug)]
pub struct EvaluatorSide {
    /// Shared context.
    pub context: Arc<Context>,
    /// Public-key encryption of inputs.
    pub encryptor: Encryptor,
    /// Statistics over the encrypted inputs.
    pub engine: StatisticsEngine,
}

impl EvaluatorSide {
    /// Builds the evaluating party from public key material, whether read
    /// from disk or fetched from the custodian.
    pub fn from_bundle(bundle: EvaluatorBundle) -> Result<Self, ProvisionError> {
        let context = Context::new(bundle.params)?;
        check_fingerprints(
            &context,
            &[
                ("public key", bundle.public_key.fingerprint()),
                ("evaluation keys", bundle.evaluation_keys.fingerprint()),
            ],
        )?;
        let mismatch = |e: crate::error::Error| ProvisionError::KeyMismatch(e.to_string());
        let encryptor =
            Encryptor::new(context.clone(), Arc::new(bundle.public_key)).map_err(mismatch)?;
        let evaluator =
            Evaluator::new(context.clone(), Arc::new(bundle.evaluation_keys)).map_err(mismatch)?;
        Ok(Self {
            context,
            encryptor,
            engine: StatisticsEngine::new(evaluator),
        })
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ProvisionError> {
    let raw = fs::read(path).map_err(|e| ProvisionError::io(path, e))?;
    Ok(serde_json::from_slice(&raw)?)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ProvisionError> {
    let raw = serde_json::to_vec(value)?;
    fs::write(path, raw).map_err(|e| ProvisionError::io(path, e))
}

fn check_fingerprints(ctx: &Context, found: &[(&str, u64)]) -> Result<(), ProvisionError> {
    for &(what, fp) in found {
        if fp != ctx.fingerprint() {
            return Err(ProvisionError::KeyMismatch(format!(
                "{what} fingerprint {fp:016x}, parameters give {:016x}",
                ctx.fingerprint()
            )));
        }
    }
    Ok(())
}

/// Custodian start-up. Loads `custodian.json` from `dir`, or generates fresh
/// keys under `params` and writes it. `evaluator.json` is (re)written whenever
/// it is missing. Stored keys must have been generated for exactly `params`.
///
/// The evaluating party is never built here; it comes from
/// [`load_evaluator`] or from the custodian over the oracle protocol.
pub fn load_or_generate(dir: &Path, params: &Parameters) -> Result<CustodianSide, ProvisionError> {
    let context = Context::new(params.clone())?;
    let path = dir.join(CUSTODIAN_FILE);

    let bundle = if path.exists() {
        let bundle: CustodianBundle = read_json(&path)?;
        if bundle.params != *params {
            return Err(ProvisionError::KeyMismatch(format!(
                "{} was written for other parameters",
                path.display()
            )));
        }
        info!(path = %path.display(), scheme = %params.scheme, "loaded key material");
        bundle
    } else {
        let (secret_key, public_key, evaluation_keys) =
            KeyGenerator::new(context.clone()).generate(&mut rand::thread_rng());
        let bundle = CustodianBundle {
            params: params.clone(),
            secret_key,
            public_key,
            evaluation_keys,
        };
        fs::create_dir_all(dir).map_err(|e| ProvisionError::io(dir, e))?;
        write_json(&path, &bundle)?;
        info!(dir = %dir.display(), scheme = %params.scheme, "generated key material");
        bundle
    };

    check_fingerprints(
        &context,
        &[
            ("secret key", bundle.secret_key.fingerprint()),
            ("public key", bundle.public_key.fingerprint()),
            ("evaluation keys", bundle.evaluation_keys.fingerprint()),
        ],
    )?;
    let published = bundle.evaluator_bundle();
    let evaluator_path = dir.join(EVALUATOR_FILE);
    if !evaluator_path.exists() {
        write_json(&evaluator_path, &published)?;
    }
    let custodian = Custodian::new(context.clone(), bundle.secret_key)
        .map_err(|e| ProvisionError::KeyMismatch(e.to_string()))?;
    Ok(CustodianSide {
        context,
        custodian,
        published,
    })
}

/// Evaluator start-up: loads `evaluator.json` from `dir`. The parameters
/// come from the file.
pub fn load_evaluator(dir: &Path) -> Result<EvaluatorSide, ProvisionError> {
    let path = dir.join(EVALUATOR_FILE);
    let side = EvaluatorSide::from_bundle(read_json(&path)?)?;
    info!(path = %path.display(), "loaded evaluator keys");
    Ok(side)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::Scalar;
    use crate::params::{ParameterPreset, Scheme};

    fn small(scheme: Scheme) -> Parameters {
        Parameters::preset(scheme, ParameterPreset::Small)
    }

    #[test]
    fn test_generate_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let params = small(Scheme::Exact);
        let first = load_or_generate(dir.path(), &params).unwrap();
        assert!(dir.path().join(CUSTODIAN_FILE).exists());
        assert!(dir.path().join(EVALUATOR_FILE).exists());

        // the second call must load, not regenerate: old ciphertexts still decrypt
        let side = load_evaluator(dir.path()).unwrap();
        let bytes = side.encryptor.encrypt_bytes(Scalar::Integer(-99)).unwrap();
        let second = load_or_generate(dir.path(), &params).unwrap();
        assert_eq!(second.custodian.decrypt(&bytes).unwrap(), Scalar::Integer(-99));
        assert_eq!(first.custodian.decrypt(&bytes).unwrap(), Scalar::Integer(-99));
    }

    #[test]
    fn test_evaluator_file_has_no_secret() {
        let dir = tempfile::tempdir().unwrap();
        let custodian = load_or_generate(dir.path(), &small(Scheme::Approximate)).unwrap();
        let raw = fs::read_to_string(dir.path().join(EVALUATOR_FILE)).unwrap();
        assert!(!raw.contains("secret_key"));
        let published = serde_json::to_string(&custodian.published).unwrap();
        assert!(!published.contains("secret_key"));

        let side = load_evaluator(dir.path()).unwrap();
        let xs = [1.0, 2.0, 3.0].map(|v| side.encryptor.encrypt_bytes(Scalar::Real(v)).unwrap());
        let mean = side.engine.mean(&xs).unwrap();
        let got = custodian.custodian.decrypt(&mean).unwrap().as_f64();
        assert!((got - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_missing_evaluator_file_is_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let params = small(Scheme::Exact);
        load_or_generate(dir.path(), &params).unwrap();
        fs::remove_file(dir.path().join(EVALUATOR_FILE)).unwrap();
        assert!(load_evaluator(dir.path()).is_err());

        load_or_generate(dir.path(), &params).unwrap();
        assert!(load_evaluator(dir.path()).is_ok());
    }

    #[test]
    fn test_bundle_for_other_parameters_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let custodian = load_or_generate(dir.path(), &small(Scheme::Exact)).unwrap();
        let mut bundle = custodian.published;
        bundle.params.error_std_dev = 3.3;
        assert!(matches!(
            EvaluatorSide::from_bundle(bundle),
            Err(ProvisionError::KeyMismatch(_))
        ));
    }

    #[test]
    fn test_parameter_change_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        load_or_generate(dir.path(), &small(Scheme::Exact)).unwrap();
        let mut other = small(Scheme::Exact);
        other.error_std_dev = 3.3;
        assert!(matches!(
            load_or_generate(dir.path(), &other),
            Err(ProvisionError::KeyMismatch(_))
        ));
    }

    #[test]
    fn test_unreadable_bundle() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CUSTODIAN_FILE), b"{ not json").unwrap();
        assert!(matches!(
            load_or_generate(dir.path(), &small(Scheme::Exact)),
            Err(ProvisionError::Json(_))
        ));
        assert!(matches!(
            load_evaluator(dir.path()),
            Err(ProvisionError::Io { .. })
        ));
    }

    #[test]
    fn test_invalid_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let mut params = small(Scheme::Approximate);
        params.moduli.push(params.moduli[0]);
        assert!(matches!(
            load_or_generate(dir.path(), &params),
            Err(ProvisionError::InvalidParameters(_))
        ));
    }
}
