use hestat_core::provision::{load_evaluator, CustodianSide};
use hestat_core::{
    load_or_generate, two_step_division, DecryptionOracle, Error, EvaluatorSide,
    LoopbackTransport, OracleClient, OracleService, ParameterPreset, Parameters, Scalar, Scheme,
};
use std::sync::Arc;

fn oracle_for(side: CustodianSide, scheme: Scheme) -> OracleClient<LoopbackTransport> {
    let service = Arc::new(OracleService::new(side.custodian, side.published).unwrap());
    OracleClient::new(scheme, LoopbackTransport::new(service))
}

#[test]
fn approximate_statistics_across_parties() {
    let dir = tempfile::tempdir().unwrap();
    let params = Parameters::preset(Scheme::Approximate, ParameterPreset::Small);
    let custodian_side = load_or_generate(dir.path(), &params).unwrap();
    let oracle = oracle_for(custodian_side, Scheme::Approximate);

    // the evaluating party only ever reads evaluator.json
    let evaluator = load_evaluator(dir.path()).unwrap();
    let data = [12.5, 7.25, -3.0, 20.0, 0.75];
    let xs: Vec<Vec<u8>> = data
        .iter()
        .map(|&v| evaluator.encryptor.encrypt_bytes(Scalar::Real(v)).unwrap())
        .collect();

    let reveal = |bytes: &[u8]| oracle.request_decryption(bytes).unwrap().as_f64();
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    let variance = data.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    assert!((reveal(&evaluator.engine.sum(&xs).unwrap()) - mean * n).abs() < 1e-2);
    assert!((reveal(&evaluator.engine.mean(&xs).unwrap()) - mean).abs() < 1e-2);
    assert!((reveal(&evaluator.engine.variance(&xs).unwrap()) - variance).abs() < 1e-2);

    let averages = evaluator.engine.moving_average(&xs, 3).unwrap();
    assert_eq!(averages.len(), 3);
    for (got, window) in averages.iter().zip(data.windows(3)) {
        let want = window.iter().sum::<f64>() / 3.0;
        assert!((reveal(got) - want).abs() < 1e-2);
    }

    let q = two_step_division(&evaluator.engine, &oracle, &xs[3], &xs[0]).unwrap();
    assert!((reveal(&q) - 1.6).abs() < 1e-2);
}

#[test]
fn exact_statistics_across_parties() {
    let dir = tempfile::tempdir().unwrap();
    let params = Parameters::preset(Scheme::Exact, ParameterPreset::Small);
    let oracle = oracle_for(load_or_generate(dir.path(), &params).unwrap(), Scheme::Exact);

    // the evaluating party starts from nothing and asks the custodian for keys
    let side = EvaluatorSide::from_bundle(oracle.fetch_evaluator_keys().unwrap()).unwrap();
    let engine = side.engine;
    let encrypt = |v: i64| side.encryptor.encrypt_bytes(Scalar::Integer(v)).unwrap();

    let xs: Vec<Vec<u8>> = [100, -250, 33, 7].map(encrypt).to_vec();
    assert_eq!(
        oracle.request_decryption(&engine.sum(&xs).unwrap()).unwrap(),
        Scalar::Integer(-110)
    );

    let total = engine
        .arithmetic_progression_sum(&encrypt(3), &encrypt(4), &encrypt(10))
        .unwrap();
    assert_eq!(oracle.request_decryption(&total).unwrap(), Scalar::Integer(210));

    assert!(matches!(engine.mean(&xs), Err(Error::Unsupported(_))));

    // 13 / 4 has no integer quotient
    assert!(matches!(
        two_step_division(&engine, &oracle, &encrypt(13), &encrypt(4)),
        Err(Error::Unsupported(_))
    ));
}

#[test]
fn custodian_refuses_garbage_through_the_oracle() {
    let dir = tempfile::tempdir().unwrap();
    let params = Parameters::preset(Scheme::Exact, ParameterPreset::Small);
    let oracle = oracle_for(load_or_generate(dir.path(), &params).unwrap(), Scheme::Exact);
    let side = load_evaluator(dir.path()).unwrap();

    assert!(matches!(
        oracle.request_decryption(&[0, 0, 0]),
        Err(Error::MalformedCiphertext(_))
    ));
    // a client that labels its requests with the wrong scheme
    let reloaded = load_or_generate(dir.path(), &params).unwrap();
    let wrong = oracle_for(reloaded, Scheme::Approximate);
    assert!(matches!(wrong.fetch_evaluator_keys(), Err(Error::SchemeMismatch(_))));
    let bytes = side.encryptor.encrypt_bytes(Scalar::Integer(1)).unwrap();
    assert!(matches!(
        wrong.request_decryption(&bytes),
        Err(Error::SchemeMismatch(_))
    ));
}
