//! Two-party demo. The custodian provisions keys and sits behind the loopback
//! oracle; the evaluating party fetches public keys through it, encrypts a
//! sample column, runs every statistic and asks the oracle for the results.

use clap::Parser;
use csv::Writer;
use hestat_core::{
    load_or_generate, two_step_division, CiphertextSource, DecryptionOracle, EvaluatorSide,
    LoopbackTransport, MemorySource, OracleClient, OracleService, ParameterPreset, Parameters,
    Scalar, Scheme,
};
use itertools::Itertools;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Statistics over encrypted samples")]
struct Args {
    #[arg(long, value_enum, default_value_t = Scheme::Approximate)]
    scheme: Scheme,

    #[arg(long, value_enum, default_value_t = ParameterPreset::Small)]
    preset: ParameterPreset,

    /// Directory holding custodian.json / evaluator.json (created if missing).
    #[arg(long, default_value = "keys")]
    keys_dir: PathBuf,

    #[arg(long, value_delimiter = ',', default_values_t = vec![2.0, 4.0, 6.0, 8.0])]
    samples: Vec<f64>,

    #[arg(long, default_value_t = 2)]
    window: usize,

    /// Newton–Raphson iterations for inverse / divide.
    #[arg(long, default_value_t = 3)]
    iterations: usize,

    /// Starting point for Newton–Raphson, must lie in (0, 2/x).
    #[arg(long, default_value_t = 0.2)]
    initial: f64,

    /// Per-operation timing report.
    #[arg(long, default_value = "stats_timing.csv")]
    report: PathBuf,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();
    if args.samples.len() < 2 {
        return Err("need at least two samples".into());
    }

    let params = Parameters::preset(args.scheme, args.preset);
    let keys_dir = args.keys_dir.join(format!("{:?}", args.scheme).to_lowercase());

    // -------------- custodian --------------
    let custodian = load_or_generate(&keys_dir, &params)?;
    let service = Arc::new(OracleService::new(custodian.custodian, custodian.published)?);
    let oracle = OracleClient::new(args.scheme, LoopbackTransport::new(service));

    // -------------- evaluator: public keys only, fetched from the custodian --------------
    let evaluator = EvaluatorSide::from_bundle(oracle.fetch_evaluator_keys()?)?;
    let engine = &evaluator.engine;
    let encryptor = &evaluator.encryptor;

    println!("Scheme: {}", args.scheme);
    println!("Samples: [{}]", args.samples.iter().join(", "));

    // -------------- staging --------------
    let to_scalars = |vs: &[f64]| -> Result<Vec<Scalar>, hestat_core::Error> {
        vs.iter().map(|&v| Scalar::for_scheme(args.scheme, v)).collect()
    };
    let xs = to_scalars(&args.samples)?;
    let ys = to_scalars(&args.samples.iter().rev().copied().collect::<Vec<_>>())?;
    let mut source = MemorySource::new();
    source.encrypt_column(encryptor, "x", &xs)?;
    source.encrypt_column(encryptor, "y", &ys)?;
    let x = source.column("x")?;
    let y = source.column("y")?;

    let constant = |v: f64| -> Result<Vec<u8>, hestat_core::Error> {
        encryptor.encrypt_bytes(Scalar::for_scheme(args.scheme, v)?)
    };
    let diff = constant(2.0)?;
    let count = constant(x.len() as f64)?;

    type Outcome = Result<Vec<Vec<u8>>, hestat_core::Error>;
    let one = |r: Result<Vec<u8>, hestat_core::Error>| r.map(|b| vec![b]);
    let ops: [(&str, &dyn Fn() -> Outcome); 11] = [
        ("sum", &|| one(engine.sum(&x))),
        ("mean", &|| one(engine.mean(&x))),
        ("moving_average", &|| engine.moving_average(&x, args.window)),
        ("variance", &|| one(engine.variance(&x))),
        ("covariance", &|| one(engine.covariance(&x, &y))),
        ("ap_element_n", &|| {
            one(engine.arithmetic_progression_element_n(&x[0], &diff, &count))
        }),
        ("ap_sum", &|| {
            one(engine.arithmetic_progression_sum(&x[0], &diff, &count))
        }),
        ("inverse", &|| {
            one(engine.inverse(&x[0], args.iterations, args.initial))
        }),
        ("divide", &|| {
            one(engine.divide(&x[1], &x[0], args.iterations, args.initial))
        }),
        ("div_const", &|| one(engine.div_const(&x[1], 2.0))),
        ("two_step_division", &|| {
            one(two_step_division(engine, &oracle, &x[1], &x[0]))
        }),
    ];

    // -------------- timing report --------------
    let mut wtr = Writer::from_path(&args.report)?;
    wtr.write_record(["operation", "time_ms", "result"])?;

    println!("\nResults:");
    for (name, op) in ops {
        let start = Instant::now();
        let outcome = op();
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let shown = match outcome {
            Ok(blobs) => blobs
                .iter()
                .map(|b| match oracle.request_decryption(b) {
                    Ok(v) => v.to_string(),
                    Err(e) => format!("<{e}>"),
                })
                .join(" "),
            Err(e) => format!("error: {e}"),
        };
        println!("{name:>18}: {shown}  ({elapsed_ms:.3} ms)");
        wtr.write_record([name.to_string(), format!("{elapsed_ms:.6}"), shown])?;
    }
    wtr.flush()?;
    println!("\nTimings written to {}", args.report.display());
    Ok(())
}
