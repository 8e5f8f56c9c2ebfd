use anyhow::Result;
use clap::Parser;
use mrseason::standalone::{engine::run_job, Args, Job};
use std::io::IsTerminal;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
}

async fn run(job: Job) -> Result<()> {
    let counters = run_job(&job).await?;
    info!(counters = %serde_json::to_string(&counters)?, "job succeeded");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let job = match Job::try_from(args) {
        Ok(job) => job,
        Err(e) => {
            error!("invalid arguments: {:#}", e);
            return ExitCode::from(2);
        }
    };
    match run(job).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("job failed: {:#}", e);
            ExitCode::from(1)
        }
    }
}
