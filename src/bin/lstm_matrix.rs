//! Runs the LSTM sequence conformance matrix on the CPU backend.
//!
//! Usage:
//!   lstm-matrix [--suite <name>] [--filter <substring>] [--seed <n>] [--fail-fast]
//!
//! Without `--suite` every registered suite runs.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use lstm_sequence::matrix::{run_case, Suite};

type Backend = burn_ndarray::NdArray<f32>;

#[derive(Parser)]
#[command(name = "lstm-matrix")]
#[command(about = "Check the LSTM sequence engine against the scalar reference")]
struct Args {
    /// Suite to run (e.g. smoke_LSTMSequenceCommonClip)
    #[arg(short, long)]
    suite: Option<String>,

    /// Only run cases whose name contains this substring
    #[arg(short, long)]
    filter: Option<String>,

    /// Base seed for generated inputs and weights
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Stop at the first failing case
    #[arg(long)]
    fail_fast: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let suites = match &args.suite {
        Some(name) => match Suite::from_name(name) {
            Some(suite) => vec![suite],
            None => anyhow::bail!(
                "Unknown suite: {}. Use one of: {}",
                name,
                Suite::ALL.map(|s| s.name()).join(", ")
            ),
        },
        None => Suite::ALL.to_vec(),
    };

    let device = Default::default();
    let (mut passed, mut failed) = (0usize, 0usize);

    'suites: for suite in suites {
        let cases: Vec<_> = suite
            .cases()
            .into_iter()
            .filter(|c| args.filter.as_deref().is_none_or(|f| c.name().contains(f)))
            .collect();
        tracing::info!("=== {} ({} cases) ===", suite.name(), cases.len());

        for (index, case) in cases.iter().enumerate() {
            let report = run_case::<Backend>(case, args.seed.wrapping_add(index as u64), &device)?;
            if report.passed {
                passed += 1;
                tracing::info!("[ OK ] {} (max error {:.2e})", report.name, report.max_abs_error);
            } else {
                failed += 1;
                tracing::error!("[FAIL] {} (max error {:.2e})", report.name, report.max_abs_error);
                if args.fail_fast {
                    break 'suites;
                }
            }
        }
    }

    tracing::info!("{} passed, {} failed", passed, failed);
    if failed > 0 {
        anyhow::bail!("{} case(s) failed", failed);
    }
    Ok(())
}
