//! Daemon configuration: a TOML file with command-line overrides.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use meridian_chain::parameters::Network;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown network '{0}'")]
    UnknownNetwork(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// "mainnet" or "testnet".
    pub network: String,
    /// Where chain state lives on disk.
    pub data_dir: PathBuf,
    /// P2P listener; port 0 picks the network default.
    pub listen: SocketAddr,
    /// RPC listener; port 0 picks the network default.
    pub rpc_listen: SocketAddr,
    pub rpc_username: String,
    pub rpc_password: String,
    /// Extra peers to dial at startup, `host:port`.
    pub connect: Vec<String>,
    /// DNS seeds consulted when the address book is empty.
    pub dns_seeds: Vec<String>,
    pub max_outbound: usize,
    pub max_inbound: usize,
    /// Run the built-in miner.
    pub mine: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            network: "mainnet".to_owned(),
            data_dir: PathBuf::from(".meridian"),
            listen: "0.0.0.0:0".parse().expect("static address parses"),
            rpc_listen: "127.0.0.1:0".parse().expect("static address parses"),
            rpc_username: "meridianrpc".to_owned(),
            rpc_password: String::new(),
            connect: Vec::new(),
            dns_seeds: vec![
                "seed.meridian.network:9333".to_owned(),
                "seed2.meridian.network:9333".to_owned(),
            ],
            max_outbound: 8,
            max_inbound: 125,
            mine: false,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn network(&self) -> Result<Network, ConfigError> {
        match self.network.as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            other => Err(ConfigError::UnknownNetwork(other.to_owned())),
        }
    }

    /// The P2P listen address with defaulted port.
    pub fn listen_addr(&self, network: Network) -> SocketAddr {
        let mut addr = self.listen;
        if addr.port() == 0 {
            addr.set_port(network.default_port());
        }
        addr
    }

    /// The RPC listen address with defaulted port.
    pub fn rpc_addr(&self, network: Network) -> SocketAddr {
        let mut addr = self.rpc_listen;
        if addr.port() == 0 {
            addr.set_port(network.default_rpc_port());
        }
        addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_network() {
        meridian_test::init();

        let config = Config::default();
        assert_eq!(config.network().unwrap(), Network::Mainnet);
        assert_eq!(config.listen_addr(Network::Mainnet).port(), 9333);
        assert_eq!(config.rpc_addr(Network::Mainnet).port(), 9334);
        assert_eq!(config.listen_addr(Network::Testnet).port(), 19333);
        assert_eq!(config.rpc_addr(Network::Testnet).port(), 19334);
    }

    #[test]
    fn toml_round_trip() {
        meridian_test::init();

        let parsed: Config = toml::from_str(
            r#"
                network = "testnet"
                mine = true
                connect = ["203.0.113.6:19333"]
            "#,
        )
        .unwrap();
        assert_eq!(parsed.network().unwrap(), Network::Testnet);
        assert!(parsed.mine);
        assert_eq!(parsed.connect, vec!["203.0.113.6:19333".to_owned()]);
        // Unset fields keep their defaults.
        assert_eq!(parsed.max_outbound, 8);
    }
}
