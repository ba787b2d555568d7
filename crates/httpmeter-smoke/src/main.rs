//! httpmeter smoke
//!
//! Usage: `httpmeter-smoke [--targets targets.yaml] [--json]`
//!
//! Without `--targets` the built-in local stack targets are checked with the
//! default retry policy (3 attempts, 2 s apart, 5 s timeout).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use httpmeter_core::error::{MeterError, Result};
use httpmeter_smoke::{exit_code, render_report, run_smoke_tests, HttpProbe, SmokeConfig};

/// Check that the local stack answers over HTTP.
#[derive(Parser, Debug)]
#[command(name = "httpmeter-smoke")]
#[command(version)]
struct Args {
    /// YAML file with services and retry policy
    #[arg(long)]
    targets: Option<PathBuf>,

    /// Print results as JSON instead of the text report
    #[arg(long)]
    json: bool,
}

async fn run(args: Args) -> Result<u8> {
    let cfg = match &args.targets {
        Some(path) => SmokeConfig::load_from_file(path)?,
        None => SmokeConfig::default(),
    };
    let policy = cfg.retry_policy();
    let probe = HttpProbe::new()?;

    tracing::info!(services = cfg.services.len(), attempts = policy.attempts, "running smoke tests");
    let results = run_smoke_tests(&probe, &cfg.services, &policy).await;

    if args.json {
        let body = serde_json::to_string_pretty(&results)
            .map_err(|e| MeterError::Internal(format!("json: {e}")))?;
        println!("{body}");
    } else {
        print!("{}", render_report(&results));
    }
    Ok(exit_code(&results))
}

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // usage errors exit 1 like a failed run; --help/--version exit 0
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(args).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!(code = e.code().as_str(), error = %e, "smoke run aborted");
            ExitCode::from(1)
        }
    }
}
