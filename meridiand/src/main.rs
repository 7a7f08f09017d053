//! The Meridian daemon.

#![deny(missing_debug_implementations)]

mod config;
mod miner;
mod node;

use std::path::PathBuf;

use color_eyre::Report;
use gumdrop::Options;
use tracing::info;

use crate::config::Config;
use crate::node::Node;

#[derive(Debug, Options)]
struct DaemonOptions {
    #[options(help = "print this help message")]
    help: bool,

    #[options(help = "path to the TOML configuration file")]
    config: Option<PathBuf>,

    #[options(help = "network to join: mainnet or testnet")]
    network: Option<String>,

    #[options(help = "run the built-in miner")]
    mine: bool,

    #[options(help = "extra peer to dial, host:port (repeatable)")]
    connect: Vec<String>,

    #[options(help = "data directory")]
    data_dir: Option<PathBuf>,
}

fn load_config(options: &DaemonOptions) -> Result<Config, Report> {
    let mut config = match &options.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(network) = &options.network {
        config.network = network.clone();
    }
    if options.mine {
        config.mine = true;
    }
    if let Some(data_dir) = &options.data_dir {
        config.data_dir = data_dir.clone();
    }
    config.connect.extend(options.connect.iter().cloned());
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Report> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let options = DaemonOptions::parse_args_default_or_exit();
    let config = load_config(&options)?;
    info!(network = %config.network, "starting meridiand");

    let node = Node::new(config)?;
    node.run().await
}
