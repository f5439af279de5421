//! Network configuration.
//!
//! Everything has a default, so running without a config file (or with an empty one) boots
//! the standard devnet: one consensus node, a faucet, one bridge and two light nodes under
//! `$HOME/.apollo`.
//!
//! # Example TOML
//!
//! ```toml
//! chain_id = "apollo-devnet"
//! root_dir = "/tmp/apollo"
//! bridge_count = 2
//! light_count = 2
//! base_rpc_port = 26658
//! start_timeout_secs = 120
//! stop_grace_secs = 10
//!
//! [faucet]
//! enabled = true
//! account = "faucet"
//! initial_balance = 1000000000
//! port = 0
//!
//! [external_endpoints]
//! consensus-rpc = ["http://10.0.0.5:26657"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use apollo_core::{Endpoints, GenesisDoc, RunOptions};
use serde::{Deserialize, Serialize};

use crate::error::NodeError;

pub const APOLLO_DIR: &str = ".apollo";
pub const DEFAULT_CHAIN_ID: &str = "apollo-devnet";
pub const DEFAULT_BASE_RPC_PORT: u16 = 26658;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaucetConfig {
    pub enabled: bool,
    /// Genesis account holding the faucet funds.
    pub account: String,
    pub initial_balance: u64,
    /// Port for the faucet endpoint; `0` picks a free one.
    pub port: u16,
}

impl Default for FaucetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            account: "faucet".to_string(),
            initial_balance: 1_000_000_000,
            port: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub chain_id: String,
    pub root_dir: PathBuf,
    pub bridge_count: usize,
    pub light_count: usize,
    /// RPC port of the first bridge; every further bridge or light node takes the next one.
    pub base_rpc_port: u16,
    pub start_timeout_secs: u64,
    pub stop_grace_secs: u64,
    pub faucet: FaucetConfig,
    /// Addresses of nodes running outside this devnet, published before the first wave.
    pub external_endpoints: BTreeMap<String, Vec<String>>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID.to_string(),
            root_dir: default_root_dir(),
            bridge_count: 1,
            light_count: 2,
            base_rpc_port: DEFAULT_BASE_RPC_PORT,
            start_timeout_secs: 120,
            stop_grace_secs: 10,
            faucet: FaucetConfig::default(),
            external_endpoints: BTreeMap::new(),
        }
    }
}

/// `$HOME/.apollo`, or `.apollo` in the working directory when `HOME` is unset.
pub fn default_root_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(APOLLO_DIR)
}

impl NetworkConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| NodeError::Config {
            path: path.to_path_buf(),
            source: source.into(),
        })?;
        toml::from_str(&raw).map_err(|source| NodeError::Config {
            path: path.to_path_buf(),
            source: source.into(),
        })
    }

    pub fn genesis(&self) -> GenesisDoc {
        GenesisDoc::new(&self.chain_id)
    }

    pub fn to_run_options(&self) -> RunOptions {
        let mut external_endpoints = Endpoints::new();
        for (label, addresses) in &self.external_endpoints {
            external_endpoints.add(label.clone(), addresses.iter().cloned());
        }
        RunOptions {
            start_timeout: Duration::from_secs(self.start_timeout_secs),
            stop_grace: Duration::from_secs(self.stop_grace_secs),
            external_endpoints,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = NetworkConfig::from_path(file.path()).unwrap();
        assert_eq!(config, NetworkConfig::default());
        assert_eq!(config.root_dir.file_name().unwrap(), APOLLO_DIR);
    }

    #[test]
    fn partial_file_overrides_only_what_it_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apollo.toml");
        std::fs::write(
            &path,
            r#"
            light_count = 4
            stop_grace_secs = 3

            [faucet]
            enabled = false

            [external_endpoints]
            consensus-rpc = ["http://10.0.0.5:26657", "http://10.0.0.6:26657"]
            "#,
        )
        .unwrap();

        let config = NetworkConfig::from_path(&path).unwrap();
        assert_eq!(config.light_count, 4);
        assert_eq!(config.bridge_count, 1);
        assert!(!config.faucet.enabled);
        assert_eq!(config.faucet.initial_balance, FaucetConfig::default().initial_balance);

        let options = config.to_run_options();
        assert_eq!(options.stop_grace, Duration::from_secs(3));
        assert_eq!(options.start_timeout, Duration::from_secs(120));
        assert_eq!(options.external_endpoints.resolve_all("consensus-rpc").len(), 2);
    }

    #[test]
    fn malformed_file_names_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "light_count = \"many\"").unwrap();

        let err = NetworkConfig::from_path(&path).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }
}
