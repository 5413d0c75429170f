//! Shared test fixtures. Key generation dominates test time, so each scheme
//! gets one set of keys per test binary.

use crate::ciphertext::Ciphertext;
use crate::codec::Codec;
use crate::custody::{Custodian, Encryptor, Scalar};
use crate::evaluator::Evaluator;
use crate::keys::{EvaluationKeys, KeyGenerator, PublicKey};
use crate::oracle::OracleService;
use crate::params::{Context, ParameterPreset, Parameters, Scheme};
use crate::provision::EvaluatorBundle;
use crate::stats::StatisticsEngine;
use std::sync::{Arc, OnceLock};

pub(crate) struct Fixture {
    pub ctx: Arc<Context>,
    pub codec: Codec,
    pub pk: Arc<PublicKey>,
    pub evk: Arc<EvaluationKeys>,
    pub encryptor: Encryptor,
    pub custodian: Custodian,
    pub evaluator: Evaluator,
    pub engine: StatisticsEngine,
}

impl Fixture {
    fn new(scheme: Scheme) -> Self {
        let ctx = Context::new(Parameters::preset(scheme, ParameterPreset::Small)).unwrap();
        let (sk, pk, evk) = KeyGenerator::new(ctx.clone()).generate(&mut rand::thread_rng());
        let (pk, evk) = (Arc::new(pk), Arc::new(evk));
        let evaluator = Evaluator::new(ctx.clone(), evk.clone()).unwrap();
        Self {
            codec: Codec::new(ctx.clone()),
            encryptor: Encryptor::new(ctx.clone(), pk.clone()).unwrap(),
            custodian: Custodian::new(ctx.clone(), sk).unwrap(),
            engine: StatisticsEngine::new(evaluator.clone()),
            evaluator,
            pk,
            evk,
            ctx,
        }
    }

    pub fn published(&self) -> EvaluatorBundle {
        EvaluatorBundle {
            params: self.ctx.params().clone(),
            public_key: (*self.pk).clone(),
            evaluation_keys: (*self.evk).clone(),
        }
    }

    pub fn service(&self) -> OracleService {
        OracleService::new(self.custodian.clone(), self.published()).unwrap()
    }

    fn scalar(&self, v: f64) -> Scalar {
        Scalar::for_scheme(self.ctx.scheme(), v).unwrap()
    }

    pub fn encrypt_raw(&self, v: f64) -> Ciphertext {
        self.encryptor.encrypt(self.scalar(v)).unwrap()
    }

    pub fn encrypt_bytes(&self, v: f64) -> Vec<u8> {
        self.encryptor.encrypt_bytes(self.scalar(v)).unwrap()
    }

    pub fn decrypt_raw(&self, ct: &Ciphertext) -> f64 {
        self.custodian.decrypt_ciphertext(ct).unwrap().as_f64()
    }

    pub fn decrypt_bytes(&self, bytes: &[u8]) -> f64 {
        self.custodian.decrypt(bytes).unwrap().as_f64()
    }
}

pub(crate) fn approx() -> &'static Fixture {
    static FIXTURE: OnceLock<Fixture> = OnceLock::new();
    FIXTURE.get_or_init(|| Fixture::new(Scheme::Approximate))
}

pub(crate) fn exact() -> &'static Fixture {
    static FIXTURE: OnceLock<Fixture> = OnceLock::new();
    FIXTURE.get_or_init(|| Fixture::new(Scheme::Exact))
}
