use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use routerd::config::RouterConfig;
use routerd::server;

/// Fan-out HTTP request router.
#[derive(Parser, Debug)]
#[command(name = "routerd", version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (JSON).
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "routerd=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = RouterConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    tracing::info!(
        port = config.port,
        threads = config.threads,
        graphs = config.graphs.len(),
        "configuration loaded"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.threads)
        .enable_all()
        .build()
        .context("building runtime")?;

    runtime.block_on(server::run(config))
}
