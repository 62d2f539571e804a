use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use nt_bandwidth::{BenchConfig, CancelToken, Metrics, Supervisor, resolve_thread_count, run};

/// Multi-threaded memory bandwidth stress with AVX2 non-temporal stores.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// number of worker threads; missing or invalid values fall back to 1
    #[arg(
        short,
        long,
        env = "NT_BANDWIDTH_THREADS",
        num_args = 0..=1,
        allow_negative_numbers = true
    )]
    threads: Option<String>,

    /// cancel the workers after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<f64>,

    /// print the per-pass timing table after the report
    #[arg(long)]
    per_pass: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let thread_count = resolve_thread_count(cli.threads.as_deref());
    let config = BenchConfig::with_threads(thread_count);
    let token = CancelToken::new();

    let supervisor = match cli.timeout_secs.map(Duration::try_from_secs_f64) {
        Some(Ok(deadline)) => Some(Supervisor::spawn(token.clone(), deadline)?),
        Some(Err(err)) => {
            tracing::warn!(error = %err, "ignoring invalid --timeout-secs");
            None
        }
        None => None,
    };

    let report = run(&config, &token)?;

    if let Some(supervisor) = supervisor {
        supervisor.dismiss();
    }
    if report.cancelled {
        tracing::info!("run was cancelled before all passes completed");
    }

    print!("{}", Metrics::from(&report));
    println!("All threads completed.");

    if cli.per_pass {
        print!("{}", report.timing);
    }

    Ok(())
}
