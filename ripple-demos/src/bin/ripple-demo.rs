//! Host one demo over stdin/stdout as JSON lines.

use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use ripple_core::SessionConfig;
use ripple_demos::host::{DemoKind, Host, JsonLines};
use ripple_demos::Settings;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ripple-demo")]
#[command(about = "Run a ripple demo app over a JSON-lines command stream")]
#[command(version)]
struct Cli {
    /// Which demo to run
    demo: DemoKind,

    /// Session configuration (JSON). Missing fields take their defaults
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let settings = Settings::load();
    let config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read config {}", path.display()))?;
            SessionConfig::from_json(&json)?
        }
        None => SessionConfig::default(),
    }
    .with_env_overrides()?;

    let graph = cli.demo.build(&settings)?;
    info!(demo = ?cli.demo, nodes = graph.len(), "demo ready");

    let mut host = Host::new(&graph, config, JsonLines::new(io::stdout()))?;
    host.start()?;
    host.run(io::stdin().lock())?;
    Ok(())
}
