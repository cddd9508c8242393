//! Project configuration.
//!
//! Layers, lowest precedence first: built-in defaults, `fundme.toml` (or the
//! file passed with `--config`), `FUNDME_`-prefixed environment variables and
//! finally the conventional variables (`PRIVATE_KEY`, `ETHERSCAN_API_KEY`, ...).

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::network::{
    AccountsSource, ChainParams, DEFAULT_CONFIRMATION_TIMEOUT_SECS, DEV_CHAIN_ID,
    IN_PROCESS_NETWORK, NetworkDescriptor, NetworkSettings, NetworkTable,
};

/// The default name for the configuration file.
pub const CONFIG_FILENAME: &str = "fundme.toml";

/// Prefix of environment variables that override configuration keys.
pub const ENV_PREFIX: &str = "FUNDME_";

/// Fallback used when `RINKEBY_RPC_URL` is unset.
pub const RINKEBY_RPC_URL_FALLBACK: &str = "https://eth-rinkeby";

/// Fallback used when `KOVAN_RPC_URL` is unset.
pub const KOVAN_RPC_URL_FALLBACK: &str = "https://eth-kovan";

const REDACTED: &str = "<redacted>";

/// Block explorer settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtherscanConfig {
    /// API key. Verification is skipped when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Gas reporter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasReporterConfig {
    pub enabled: bool,
    pub output_file: PathBuf,
    pub no_colors: bool,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coinmarketcap_api_key: Option<String>,
}

impl Default for GasReporterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_file: PathBuf::from("gas-report.txt"),
            no_colors: true,
            currency: "USD".to_string(),
            coinmarketcap_api_key: None,
        }
    }
}

/// Named account indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedAccounts {
    /// Index of the deployer among the network's accounts.
    pub deployer: usize,
}

/// Project paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paths {
    pub artifacts: PathBuf,
    pub deployments: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            artifacts: PathBuf::from("artifacts"),
            deployments: PathBuf::from("deployments"),
        }
    }
}

/// Full project configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub default_network: String,
    pub networks: BTreeMap<String, NetworkSettings>,
    /// Networks on which mocks replace external dependencies.
    pub development_chains: Vec<String>,
    pub chains: Vec<ChainParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(default)]
    pub etherscan: EtherscanConfig,
    #[serde(default)]
    pub gas_reporter: GasReporterConfig,
    #[serde(default)]
    pub named_accounts: NamedAccounts,
    #[serde(default)]
    pub paths: Paths,
}

impl Default for Config {
    fn default() -> Self {
        let mut networks = BTreeMap::new();
        networks.insert(
            IN_PROCESS_NETWORK.to_string(),
            NetworkSettings {
                url: None,
                chain_id: DEV_CHAIN_ID,
                block_confirmations: None,
                confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
                accounts: AccountsSource::Node,
            },
        );
        networks.insert(
            "localhost".to_string(),
            NetworkSettings {
                url: Some("http://127.0.0.1:8545/".to_string()),
                chain_id: DEV_CHAIN_ID,
                block_confirmations: None,
                confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
                accounts: AccountsSource::Node,
            },
        );
        networks.insert(
            "rinkeby".to_string(),
            NetworkSettings {
                url: Some(RINKEBY_RPC_URL_FALLBACK.to_string()),
                chain_id: 4,
                block_confirmations: Some(6),
                confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
                accounts: AccountsSource::PrivateKey,
            },
        );
        networks.insert(
            "kovan".to_string(),
            NetworkSettings {
                url: Some(KOVAN_RPC_URL_FALLBACK.to_string()),
                chain_id: 42,
                block_confirmations: Some(6),
                confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
                accounts: AccountsSource::PrivateKey,
            },
        );

        Self {
            default_network: IN_PROCESS_NETWORK.to_string(),
            networks,
            development_chains: vec![IN_PROCESS_NETWORK.to_string(), "localhost".to_string()],
            chains: NetworkTable::default_chains(),
            private_key: None,
            etherscan: EtherscanConfig::default(),
            gas_reporter: GasReporterConfig::default(),
            named_accounts: NamedAccounts::default(),
            paths: Paths::default(),
        }
    }
}

impl Config {
    /// Load the configuration.
    ///
    /// If `path` is `None`, `fundme.toml` in the current directory is used
    /// when it exists. An explicit path that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Configuration file not found: {}", path.display());
                }
                figment = figment.merge(Toml::file(path));
            }
            None => {
                let default_path = PathBuf::from(CONFIG_FILENAME);
                if default_path.exists() {
                    figment = figment.merge(Toml::file(default_path));
                }
            }
        }

        let mut config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to load configuration")?;

        config.apply_env_overrides(|key| std::env::var(key).ok());

        tracing::debug!(networks = config.networks.len(), "Configuration loaded");
        Ok(config)
    }

    /// Apply the conventional environment variables through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        for (network, var) in [("rinkeby", "RINKEBY_RPC_URL"), ("kovan", "KOVAN_RPC_URL")] {
            if let (Some(url), Some(settings)) = (non_empty(var), self.networks.get_mut(network)) {
                settings.url = Some(url);
            }
        }

        if let Some(key) = non_empty("PRIVATE_KEY") {
            self.private_key = Some(key);
        }
        if let Some(key) = non_empty("ETHERSCAN_API_KEY") {
            self.etherscan.api_key = Some(key);
        }
        if let Some(key) = non_empty("COINMARKETCAP_API_KEY") {
            self.gas_reporter.coinmarketcap_api_key = Some(key);
        }
    }

    /// The settings of a named network.
    pub fn network_settings(&self, name: &str) -> Result<&NetworkSettings> {
        self.networks.get(name).with_context(|| {
            format!(
                "Unknown network '{}'. Known networks: {}",
                name,
                self.networks.keys().cloned().collect::<Vec<_>>().join(", ")
            )
        })
    }

    /// Resolve the descriptor of a named network.
    pub fn network(&self, name: &str) -> Result<NetworkDescriptor> {
        let settings = self.network_settings(name)?;
        if let Some(url) = &settings.url {
            url::Url::parse(url)
                .with_context(|| format!("Invalid RPC URL for network {}: {}", name, url))?;
        }

        let table = NetworkTable::new(self.chains.iter().cloned());
        Ok(NetworkDescriptor::resolve(
            name,
            settings,
            &table,
            &self.development_chains,
        ))
    }

    /// Serialize the effective configuration to TOML, with secrets redacted.
    pub fn to_toml(&self) -> Result<String> {
        let mut redacted = self.clone();
        for secret in [
            &mut redacted.private_key,
            &mut redacted.etherscan.api_key,
            &mut redacted.gas_reporter.coinmarketcap_api_key,
        ] {
            if secret.is_some() {
                *secret = Some(REDACTED.to_string());
            }
        }
        toml::to_string_pretty(&redacted).context("Failed to serialize configuration to TOML")
    }
}
