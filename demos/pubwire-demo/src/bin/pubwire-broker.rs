//! Runs a pubwire broker until Ctrl-C.

use std::path::PathBuf;

use clap::Parser;
use pubwire::prelude::*;

#[derive(Parser)]
#[command(name = "pubwire-broker", about = "Run a pubwire broker")]
struct Args {
    /// JSON file with a broker config; flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Interface to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to run the broker on.
    #[arg(long)]
    port: Option<u16>,
}

fn load_config(args: &Args) -> Result<BrokerConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => BrokerConfig::default(),
    };
    if let Some(host) = &args.host {
        config = config.with_host(host.clone());
    }
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pubwire_demo::init_logging();

    let args = Args::parse();
    let config = load_config(&args)?;
    let broker = Broker::builder().config(config).build().await?;

    tokio::select! {
        result = broker.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }
    Ok(())
}
