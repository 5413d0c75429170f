//! Protocol between the evaluating party and the custodian.
//!
//! The evaluator sends a serialized ciphertext, the custodian answers with the
//! plaintext or a refusal. An evaluator that starts with nothing can also ask
//! for the public parameters and evaluation keys it needs to compute. Messages
//! are JSON; how they travel is up to the [`Transport`] implementation.
//! [`LoopbackTransport`] hands them straight to an in-process [`OracleService`].

use crate::custody::{Custodian, Scalar};
use crate::error::{Error, ErrorKind, Result};
use crate::params::Scheme;
use crate::provision::EvaluatorBundle;
use crate::stats::StatisticsEngine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Anything that can turn a serialized ciphertext into a plaintext.
pub trait DecryptionOracle {
    /// Decrypts `encrypted`, or reports why the custodian refused.
    fn request_decryption(&self, encrypted: &[u8]) -> Result<Scalar>;
}

impl DecryptionOracle for Custodian {
    fn request_decryption(&self, encrypted: &[u8]) -> Result<Scalar> {
        self.decrypt(encrypted)
    }
}

/// Body of a decryption request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecryptionRequest {
    /// Scheme the client believes the custodian serves.
    pub scheme: Scheme,
    /// Serialized ciphertext.
    pub encrypted_result: Vec<u8>,
}

/// Everything a client can ask the custodian.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleRequest {
    /// Decrypt one ciphertext.
    Decrypt(DecryptionRequest),
    /// Parameters, public key and evaluation keys for `scheme`.
    EvaluatorKeys {
        /// Scheme the client wants to compute under.
        scheme: Scheme,
    },
}

/// Custodian's answer to an [`OracleRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleReply {
    /// Plaintext of a [`OracleRequest::Decrypt`].
    Decrypted {
        /// The decrypted value.
        decrypted_result: Scalar,
    },
    /// Answer to [`OracleRequest::EvaluatorKeys`]. Holds no secret.
    EvaluatorKeys(Box<EvaluatorBundle>),
    /// The custodian would not serve the request.
    Refused {
        /// Local error variant to rebuild on the client.
        kind: ErrorKind,
        /// Human-readable reason.
        message: String,
    },
}

impl OracleReply {
    fn refused(err: &Error) -> Self {
        warn!(%err, "refusing request");
        OracleReply::Refused {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Byte pipe to the custodian: one request out, one reply back.
pub trait Transport {
    /// Sends `request` and waits for the reply.
    fn round_trip(&self, request: &[u8]) -> Result<Vec<u8>>;
}

/// Custodian side of the protocol.
#[derive(Debug)]
pub struct OracleService {
    custodian: Custodian,
    published: EvaluatorBundle,
}

impl OracleService {
    /// `published` is what [`OracleRequest::EvaluatorKeys`] hands out; it must
    /// have been generated under the custodian's parameters.
    pub fn new(custodian: Custodian, published: EvaluatorBundle) -> Result<Self> {
        if published.params.scheme != custodian.scheme()
            || published.public_key.fingerprint() != custodian.fingerprint()
            || published.evaluation_keys.fingerprint() != custodian.fingerprint()
        {
            return Err(Error::SchemeMismatch(
                "published keys do not belong to this custodian".into(),
            ));
        }
        Ok(Self {
            custodian,
            published,
        })
    }

    fn check_scheme(&self, scheme: Scheme) -> Result<()> {
        if scheme == self.custodian.scheme() {
            Ok(())
        } else {
            Err(Error::SchemeMismatch(format!(
                "request for {scheme}, custodian holds {} keys",
                self.custodian.scheme()
            )))
        }
    }

    /// Answers one request.
    pub fn reply(&self, request: &OracleRequest) -> OracleReply {
        match request {
            OracleRequest::Decrypt(req) => match self
                .check_scheme(req.scheme)
                .and_then(|()| self.custodian.decrypt(&req.encrypted_result))
            {
                Ok(decrypted_result) => OracleReply::Decrypted { decrypted_result },
                Err(err) => OracleReply::refused(&err),
            },
            OracleRequest::EvaluatorKeys { scheme } => match self.check_scheme(*scheme) {
                Ok(()) => {
                    info!(%scheme, "handing out evaluator keys");
                    OracleReply::EvaluatorKeys(Box::new(self.published.clone()))
                }
                Err(err) => OracleReply::refused(&err),
            },
        }
    }

    /// Wire entry point: JSON request in, JSON reply out.
    pub fn handle(&self, request: &[u8]) -> Vec<u8> {
        let reply = match serde_json::from_slice::<OracleRequest>(request) {
            Ok(req) => self.reply(&req),
            Err(err) => OracleReply::Refused {
                kind: ErrorKind::Other,
                message: format!("unreadable request: {err}"),
            },
        };
        serde_json::to_vec(&reply).unwrap_or_else(|err| {
            let fallback = OracleReply::Refused {
                kind: ErrorKind::Other,
                message: format!("cannot encode reply: {err}"),
            };
            serde_json::to_vec(&fallback).unwrap_or_default()
        })
    }
}

/// In-process transport.
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    service: Arc<OracleService>,
}

impl LoopbackTransport {
    /// Transport that calls `service` directly.
    pub fn new(service: Arc<OracleService>) -> Self {
        Self { service }
    }
}

impl Transport for LoopbackTransport {
    fn round_trip(&self, request: &[u8]) -> Result<Vec<u8>> {
        Ok(self.service.handle(request))
    }
}

/// Evaluator side of the protocol.
#[derive(Debug, Clone)]
pub struct OracleClient<T> {
    scheme: Scheme,
    transport: T,
}

impl<T: Transport> OracleClient<T> {
    /// Client for a custodian serving `scheme`.
    pub fn new(scheme: Scheme, transport: T) -> Self {
        Self { scheme, transport }
    }

    fn call(&self, request: &OracleRequest) -> Result<OracleReply> {
        let body = serde_json::to_vec(request).map_err(|e| Error::Transport(e.to_string()))?;
        let raw = self.transport.round_trip(&body)?;
        let reply: OracleReply = serde_json::from_slice(&raw)
            .map_err(|e| Error::Transport(format!("unreadable reply: {e}")))?;
        match reply {
            OracleReply::Refused { kind, message } => Err(Error::from_remote(kind, message)),
            other => Ok(other),
        }
    }

    /// Fetches the public parameters and evaluation keys; feed them to
    /// [`EvaluatorSide::from_bundle`](crate::provision::EvaluatorSide::from_bundle).
    pub fn fetch_evaluator_keys(&self) -> Result<EvaluatorBundle> {
        match self.call(&OracleRequest::EvaluatorKeys { scheme: self.scheme })? {
            OracleReply::EvaluatorKeys(bundle) if bundle.params.scheme == self.scheme => {
                debug!(scheme = %self.scheme, "evaluator keys received");
                Ok(*bundle)
            }
            OracleReply::EvaluatorKeys(bundle) => Err(Error::SchemeMismatch(format!(
                "asked for {} keys, got {}",
                self.scheme, bundle.params.scheme
            ))),
            _ => Err(Error::Transport("reply does not answer a key request".into())),
        }
    }
}

impl<T: Transport> DecryptionOracle for OracleClient<T> {
    fn request_decryption(&self, encrypted: &[u8]) -> Result<Scalar> {
        let request = OracleRequest::Decrypt(DecryptionRequest {
            scheme: self.scheme,
            encrypted_result: encrypted.to_vec(),
        });
        match self.call(&request)? {
            OracleReply::Decrypted { decrypted_result } => {
                debug!(scheme = %self.scheme, "decryption granted");
                Ok(decrypted_result)
            }
            _ => Err(Error::Transport(
                "reply does not answer a decryption request".into(),
            )),
        }
    }
}

/// Divides by a ciphertext by revealing it: the divisor is decrypted through
/// `oracle` and the dividend is divided by the resulting plaintext constant.
pub fn two_step_division<O: DecryptionOracle + ?Sized>(
    engine: &StatisticsEngine,
    oracle: &O,
    dividend: &[u8],
    divisor: &[u8],
) -> Result<Vec<u8>> {
    let revealed = oracle.request_decryption(divisor)?;
    debug!(divisor = %revealed, "two-step division");
    engine.div_const(dividend, revealed.as_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyGenerator;
    use crate::provision::EvaluatorSide;
    use crate::testing::{approx, exact, Fixture};

    fn client_for(fx: &Fixture) -> OracleClient<LoopbackTransport> {
        OracleClient::new(fx.ctx.scheme(), LoopbackTransport::new(Arc::new(fx.service())))
    }

    #[test]
    fn test_loopback_decrypts() {
        for fx in [approx(), exact()] {
            let client = client_for(fx);
            let bytes = fx.encrypt_bytes(-42.0);
            let got = client.request_decryption(&bytes).unwrap().as_f64();
            assert!((got + 42.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_refusal_keeps_error_variant() {
        let fx = approx();
        let client = client_for(fx);
        assert!(matches!(
            client.request_decryption(&[0, 0, 0]),
            Err(Error::MalformedCiphertext(_))
        ));

        let from_exact = exact().encrypt_bytes(3.0);
        assert!(matches!(
            client.request_decryption(&from_exact),
            Err(Error::SchemeMismatch(_))
        ));
    }

    #[test]
    fn test_request_for_other_scheme_is_refused() {
        let fx = approx();
        let service = fx.service();
        let req = OracleRequest::Decrypt(DecryptionRequest {
            scheme: Scheme::Exact,
            encrypted_result: fx.encrypt_bytes(1.0),
        });
        assert!(matches!(
            service.reply(&req),
            OracleReply::Refused {
                kind: ErrorKind::SchemeMismatch,
                ..
            }
        ));
        assert!(matches!(
            service.reply(&OracleRequest::EvaluatorKeys {
                scheme: Scheme::Exact
            }),
            OracleReply::Refused {
                kind: ErrorKind::SchemeMismatch,
                ..
            }
        ));
    }

    #[test]
    fn test_unreadable_request() {
        let service = approx().service();
        let reply: OracleReply = serde_json::from_slice(&service.handle(b"not json")).unwrap();
        assert!(matches!(
            reply,
            OracleReply::Refused {
                kind: ErrorKind::Other,
                ..
            }
        ));
    }

    #[test]
    fn test_wire_format() {
        let reply = OracleReply::Decrypted {
            decrypted_result: Scalar::Integer(7),
        };
        assert_eq!(
            serde_json::to_string(&reply).unwrap(),
            r#"{"decrypted":{"decrypted_result":{"integer":7}}}"#
        );
        let req: OracleRequest =
            serde_json::from_str(r#"{"decrypt":{"scheme":"ckks","encrypted_result":[1,2]}}"#)
                .unwrap();
        assert!(matches!(
            req,
            OracleRequest::Decrypt(DecryptionRequest {
                scheme: Scheme::Approximate,
                ..
            })
        ));
        let req: OracleRequest = serde_json::from_str(r#"{"evaluator_keys":{"scheme":"bfv"}}"#).unwrap();
        assert_eq!(
            req,
            OracleRequest::EvaluatorKeys {
                scheme: Scheme::Exact
            }
        );
    }

    #[test]
    fn test_evaluator_bootstraps_from_custodian() {
        for fx in [approx(), exact()] {
            let client = client_for(fx);
            let bundle = client.fetch_evaluator_keys().unwrap();
            assert!(!serde_json::to_string(&bundle).unwrap().contains("secret"));

            let side = EvaluatorSide::from_bundle(bundle).unwrap();
            let xs: Vec<Vec<u8>> = [3.0, 5.0, 10.0]
                .map(|v| {
                    let s = Scalar::for_scheme(fx.ctx.scheme(), v).unwrap();
                    side.encryptor.encrypt_bytes(s).unwrap()
                })
                .to_vec();
            let total = side.engine.sum(&xs).unwrap();
            assert_eq!(client.request_decryption(&total).unwrap().as_f64().round(), 18.0);
        }
    }

    #[test]
    fn test_service_refuses_foreign_bundle() {
        let custodian = approx().custodian.clone();
        assert!(matches!(
            OracleService::new(custodian, exact().published()),
            Err(Error::SchemeMismatch(_))
        ));
    }

    struct Broken;

    impl Transport for Broken {
        fn round_trip(&self, _request: &[u8]) -> Result<Vec<u8>> {
            Err(Error::Transport("connection reset".into()))
        }
    }

    struct Garbled;

    impl Transport for Garbled {
        fn round_trip(&self, _request: &[u8]) -> Result<Vec<u8>> {
            Ok(b"{\"decrypted\":".to_vec())
        }
    }

    #[test]
    fn test_transport_failures() {
        let bytes = approx().encrypt_bytes(1.0);
        let broken = OracleClient::new(Scheme::Approximate, Broken);
        assert!(matches!(
            broken.request_decryption(&bytes),
            Err(Error::Transport(_))
        ));
        let garbled = OracleClient::new(Scheme::Approximate, Garbled);
        assert!(matches!(
            garbled.request_decryption(&bytes),
            Err(Error::Transport(_))
        ));
    }

    #[test]
    fn test_two_step_division() {
        let fx = approx();
        let client = client_for(fx);
        let out = two_step_division(
            &fx.engine,
            &client,
            &fx.encrypt_bytes(10.0),
            &fx.encrypt_bytes(4.0),
        )
        .unwrap();
        assert!((fx.decrypt_bytes(&out) - 2.5).abs() < 1e-3);

        let fx = exact();
        let out = two_step_division(
            &fx.engine,
            &fx.custodian,
            &fx.encrypt_bytes(84.0),
            &fx.encrypt_bytes(-1.0),
        )
        .unwrap();
        assert_eq!(fx.decrypt_bytes(&out), -84.0);

        // 13 / 4 has no integer answer
        assert!(matches!(
            two_step_division(
                &fx.engine,
                &fx.custodian,
                &fx.encrypt_bytes(13.0),
                &fx.encrypt_bytes(4.0),
            ),
            Err(Error::Unsupported(_))
        ));

        assert_eq!(
            two_step_division(
                &fx.engine,
                &fx.custodian,
                &fx.encrypt_bytes(84.0),
                &fx.encrypt_bytes(0.0),
            )
            .unwrap_err(),
            Error::DivisionByZero
        );
    }

    #[test]
    fn test_foreign_custodian_cannot_decrypt() {
        let fx = approx();
        let (sk, _, _) = KeyGenerator::new(fx.ctx.clone()).generate(&mut rand::thread_rng());
        let stranger = Custodian::new(fx.ctx.clone(), sk).unwrap();
        let got = stranger
            .request_decryption(&fx.encrypt_bytes(5.0))
            .map(|s| s.as_f64())
            .unwrap_or(f64::NAN);
        assert!((got - 5.0).abs() > 1.0);
    }
}
