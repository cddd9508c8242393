//! Network configuration table and the resolved network descriptor.

use std::{collections::BTreeMap, time::Duration};

use alloy_core::primitives::{Address, address};
use serde::{Deserialize, Serialize};

/// Name of the in-process development network.
pub const IN_PROCESS_NETWORK: &str = "hardhat";

/// Chain id shared by local development nodes.
pub const DEV_CHAIN_ID: u64 = 31337;

/// Decimals of the mock price feed deployed on development chains.
pub const MOCK_DECIMALS: u8 = 8;

/// Initial answer of the mock price feed (2000 USD with 8 decimals).
pub const MOCK_INITIAL_ANSWER: i64 = 200_000_000_000;

/// Default number of seconds to wait for a transaction to be confirmed.
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 300;

/// How transactions on a network get signed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountsSource {
    /// The node holds unlocked accounts (local development nodes).
    #[default]
    Node,
    /// Transactions are signed locally with the configured private key.
    PrivateKey,
}

/// Per-network connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// JSON-RPC endpoint. `None` selects the in-process chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub chain_id: u64,
    /// Confirmations to wait for deployments. Unset means 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_confirmations: Option<u64>,
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
    #[serde(default)]
    pub accounts: AccountsSource,
}

fn default_confirmation_timeout() -> u64 {
    DEFAULT_CONFIRMATION_TIMEOUT_SECS
}

impl NetworkSettings {
    /// Required confirmations, defaulting unset values to 1.
    ///
    /// An explicit 0 is raised to 1: a deployment is only recorded once its
    /// transaction is mined.
    pub fn required_confirmations(&self) -> u64 {
        match self.block_confirmations {
            None => 1,
            Some(0) => {
                tracing::warn!(
                    chain_id = self.chain_id,
                    "block_confirmations = 0 is not supported, waiting for 1 confirmation"
                );
                1
            }
            Some(n) => n,
        }
    }
}

/// Static per-chain parameters, keyed by chain id in the [`NetworkTable`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    pub chain_id: u64,
    pub name: String,
    /// ETH/USD price feed on this chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_usd_price_feed: Option<Address>,
    /// Block explorer verification API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer_api_url: Option<String>,
}

/// Mapping from chain id to [`ChainParams`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkTable {
    chains: BTreeMap<u64, ChainParams>,
}

impl NetworkTable {
    pub fn new(chains: impl IntoIterator<Item = ChainParams>) -> Self {
        Self {
            chains: chains.into_iter().map(|c| (c.chain_id, c)).collect(),
        }
    }

    pub fn get(&self, chain_id: u64) -> Option<&ChainParams> {
        self.chains.get(&chain_id)
    }

    /// The chains known by default.
    pub fn default_chains() -> Vec<ChainParams> {
        vec![
            ChainParams {
                chain_id: 4,
                name: "rinkeby".to_string(),
                eth_usd_price_feed: Some(address!("8A753747A1Fa494EC906cE90E9f37563A8AF630e")),
                explorer_api_url: Some("https://api-rinkeby.etherscan.io/api".to_string()),
            },
            ChainParams {
                chain_id: 42,
                name: "kovan".to_string(),
                eth_usd_price_feed: Some(address!("9326BFA02ADD2366b30bacB125260Af641031331")),
                explorer_api_url: Some("https://api-kovan.etherscan.io/api".to_string()),
            },
            ChainParams {
                chain_id: 137,
                name: "polygon".to_string(),
                eth_usd_price_feed: Some(address!("F9680D99D6C9589e2a93a78A04A279e509205945")),
                explorer_api_url: Some("https://api.polygonscan.com/api".to_string()),
            },
        ]
    }
}

/// Everything the deploy workflow needs to know about the target network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDescriptor {
    pub name: String,
    pub chain_id: u64,
    pub price_feed: Option<Address>,
    pub explorer_api_url: Option<String>,
    pub required_confirmations: u64,
    pub confirmation_timeout: Duration,
    pub is_development: bool,
    /// Whether deployment records are written to disk.
    pub persist_deployments: bool,
}

impl NetworkDescriptor {
    /// Resolve a descriptor from the network's settings and the chain table.
    pub fn resolve(
        name: &str,
        settings: &NetworkSettings,
        table: &NetworkTable,
        development_chains: &[String],
    ) -> Self {
        let params = table.get(settings.chain_id);
        Self {
            name: name.to_string(),
            chain_id: settings.chain_id,
            price_feed: params.and_then(|p| p.eth_usd_price_feed),
            explorer_api_url: params.and_then(|p| p.explorer_api_url.clone()),
            required_confirmations: settings.required_confirmations(),
            confirmation_timeout: Duration::from_secs(settings.confirmation_timeout_secs),
            is_development: development_chains.iter().any(|c| c == name),
            persist_deployments: settings.url.is_some(),
        }
    }

    /// A development descriptor for the in-process chain.
    pub fn in_process() -> Self {
        Self {
            name: IN_PROCESS_NETWORK.to_string(),
            chain_id: DEV_CHAIN_ID,
            price_feed: None,
            explorer_api_url: None,
            required_confirmations: 1,
            confirmation_timeout: Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECS),
            is_development: true,
            persist_deployments: false,
        }
    }
}
