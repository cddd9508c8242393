//! fundme-deploy - Deployment library for the FundMe contracts.
//!
//! This crate deploys the FundMe contract (with a mock price feed on
//! development networks), verifies deployments on Etherscan-compatible
//! explorers and runs the SimpleStorage interaction script.

pub mod abi;
pub mod artifacts;
pub mod chain;
pub mod contract;
pub mod deployments;
pub mod gas_report;
pub mod network;
pub mod rpc;
pub mod scripts;
pub mod tasks;
pub mod verify;

mod builder;
pub use builder::{Runtime, RuntimeBuilder};

mod config;
pub use config::{
    CONFIG_FILENAME, Config, ENV_PREFIX, EtherscanConfig, GasReporterConfig, NamedAccounts, Paths,
};

mod deployer;
pub use deployer::{
    DeployOptions, Deployments, MOCK_PRICE_FEED, resolve_price_feed, should_verify,
};

pub use chain::{Chain, ChainClient, DevChain, RpcChain, TransactionReceipt};
pub use network::{NetworkDescriptor, NetworkSettings, NetworkTable};
pub use scripts::{DeployScript, InteractionReport, run_deploy_scripts, run_simple_storage};
pub use verify::{
    ContractVerifier, EtherscanVerifier, VerificationOutcome, VerificationRequest,
    is_already_verified,
};
