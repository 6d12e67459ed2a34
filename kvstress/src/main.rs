//! Binary entry point: parse flags, load the configuration, run, and apply
//! the optional failure-rate threshold.

use std::path::PathBuf;

use anyhow::bail;
use argh::FromArgs;

use kvstress::config::Config;
use kvstress::http::Transport;
use kvstress::stress;

/// Concurrent workload generator for a key-value HTTP service
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the yaml configuration file (reference-run defaults when omitted)
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// print one line per completed call
    #[argh(switch, short = 'v')]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match args.config {
        Some(path) => Config::from_file(&path)?,
        None => Config::default(),
    };
    config.verbose |= args.verbose;
    config.validate()?;

    let transport = Transport::new(&config)?;
    let summary = stress::run(transport, &config).await?;

    if let Some(threshold) = config.max_failure_rate {
        let rate = summary.measured.failure_rate();
        if rate > threshold {
            bail!("failure rate {rate:.3} exceeded the configured maximum {threshold:.3}");
        }
    }

    Ok(())
}
