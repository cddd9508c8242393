//! Builder module for creating a [`Runtime`].
//!
//! [`RuntimeBuilder`] resolves the target network from the [`Config`], connects
//! the matching chain client, opens the deployment store and decides whether
//! deployments get verified.

use std::sync::Arc;

use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};

use crate::{
    artifacts::ArtifactStore,
    chain::{Chain, ChainClient, DevChain, RpcChain},
    config::{Config, GasReporterConfig},
    deployer::{Deployments, should_verify},
    deployments::DeploymentStore,
    gas_report::GasReport,
    network::{AccountsSource, NetworkDescriptor},
    verify::{ContractVerifier, EtherscanVerifier},
};

/// Everything a deploy script or task runs against.
pub struct Runtime<C, V> {
    deployments: Deployments<C>,
    verifier: Option<V>,
    gas_reporter: GasReporterConfig,
}

impl<C: ChainClient, V: ContractVerifier> Runtime<C, V> {
    pub fn deployments(&self) -> &Deployments<C> {
        &self.deployments
    }

    pub fn network(&self) -> &NetworkDescriptor {
        self.deployments.network()
    }

    pub fn client(&self) -> &Arc<C> {
        self.deployments.client()
    }

    /// The verifier, present only when deployments on this network are verified.
    pub fn verifier(&self) -> Option<&V> {
        self.verifier.as_ref()
    }

    /// Write the gas report if the reporter is enabled.
    pub fn finish(&self) -> Result<()> {
        if let Some(report) = self.deployments.gas_report() {
            report.write_to_file(
                &self.gas_reporter.output_file,
                &self.gas_reporter.currency,
                self.gas_reporter.no_colors,
            )?;
        }
        Ok(())
    }
}

/// Builder for a [`Runtime`].
///
/// # Example
///
/// ```no_run
/// use fundme_deploy::{Config, RuntimeBuilder};
///
/// # async fn example() -> anyhow::Result<()> {
/// let runtime = RuntimeBuilder::new(Config::load(None)?)
///     .network("rinkeby")
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RuntimeBuilder {
    config: Config,
    /// Falls back to the configured default network.
    network: Option<String>,
    redeploy: bool,
}

impl RuntimeBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            network: None,
            redeploy: false,
        }
    }

    /// Set the target network by name.
    pub fn network(mut self, name: impl Into<String>) -> Self {
        self.network = Some(name.into());
        self
    }

    /// Force new deployments even when a matching one is recorded.
    pub fn redeploy(mut self, redeploy: bool) -> Self {
        self.redeploy = redeploy;
        self
    }

    pub fn network_name(&self) -> &str {
        self.network
            .as_deref()
            .unwrap_or(&self.config.default_network)
    }

    /// Connect to the target network.
    ///
    /// Networks without a URL run on a fresh in-process chain.
    pub async fn connect(&self) -> Result<Chain> {
        let name = self.network_name();
        let settings = self.config.network_settings(name)?;
        let account_index = self.config.named_accounts.deployer;

        let Some(url) = &settings.url else {
            tracing::debug!(network = name, "Using the in-process chain");
            let chain = DevChain::with_chain_id(settings.chain_id)?
                .with_sender_index(account_index)?;
            return Ok(Chain::InProcess(chain));
        };

        let signer = match settings.accounts {
            AccountsSource::Node => None,
            AccountsSource::PrivateKey => {
                let key = self.config.private_key.as_deref().with_context(|| {
                    format!(
                        "Network {} signs with a private key but PRIVATE_KEY is not set",
                        name
                    )
                })?;
                Some(
                    key.parse::<PrivateKeySigner>()
                        .context("PRIVATE_KEY is not a valid private key")?,
                )
            }
        };

        let chain = RpcChain::connect(url, signer, account_index).await?;
        ensure_chain_id(name, settings.chain_id, url, &chain)?;

        tracing::info!(
            network = name,
            chain_id = chain.chain_id(),
            sender = %chain.sender(),
            "Connected"
        );
        Ok(Chain::Rpc(chain))
    }

    /// Connect to the target network for reads only.
    ///
    /// No account is resolved, so networks signing with a private key work
    /// without `PRIVATE_KEY`.
    pub async fn connect_read_only(&self) -> Result<Chain> {
        let name = self.network_name();
        let settings = self.config.network_settings(name)?;

        let Some(url) = &settings.url else {
            return Ok(Chain::InProcess(DevChain::with_chain_id(settings.chain_id)?));
        };

        let chain = RpcChain::connect_read_only(url).await?;
        ensure_chain_id(name, settings.chain_id, url, &chain)?;

        tracing::debug!(network = name, chain_id = chain.chain_id(), "Connected read-only");
        Ok(Chain::Rpc(chain))
    }

    /// Connect to the configured network and build the runtime.
    pub async fn build(self) -> Result<Runtime<Chain, EtherscanVerifier>> {
        let chain = self.connect().await?;
        let network = self.config.network(self.network_name())?;
        let verifier = self.etherscan_verifier(&network)?;
        self.assemble(chain, network, verifier)
    }

    /// Build the runtime around an existing chain client and verifier.
    ///
    /// The verifier is still only kept when the network calls for
    /// verification.
    pub fn build_with<C, V>(self, chain: C, verifier: V) -> Result<Runtime<C, V>>
    where
        C: ChainClient,
        V: ContractVerifier,
    {
        let network = self.config.network(self.network_name())?;
        let verifier = should_verify(&network, self.config.etherscan.api_key.as_deref())
            .then_some(verifier);
        self.assemble(chain, network, verifier)
    }

    fn etherscan_verifier(&self, network: &NetworkDescriptor) -> Result<Option<EtherscanVerifier>> {
        let api_key = self.config.etherscan.api_key.as_deref();
        if !should_verify(network, api_key) {
            tracing::debug!(network = %network.name, "Contract verification disabled");
            return Ok(None);
        }

        let (Some(api_key), Some(api_url)) = (api_key, &network.explorer_api_url) else {
            tracing::warn!(
                chain_id = network.chain_id,
                "No block explorer API known for this chain, skipping verification"
            );
            return Ok(None);
        };

        Ok(Some(EtherscanVerifier::new(api_url, api_key)?))
    }

    fn assemble<C, V>(
        self,
        chain: C,
        network: NetworkDescriptor,
        verifier: Option<V>,
    ) -> Result<Runtime<C, V>>
    where
        C: ChainClient,
        V: ContractVerifier,
    {
        if chain.chain_id() != network.chain_id {
            anyhow::bail!(
                "Chain id mismatch for network {}: expected {}, got {}",
                network.name,
                network.chain_id,
                chain.chain_id()
            );
        }

        let store = if network.persist_deployments {
            DeploymentStore::open(&self.config.paths.deployments, &network.name)?
        } else {
            DeploymentStore::in_memory(&network.name)
        };

        let gas_report = self
            .config
            .gas_reporter
            .enabled
            .then(|| Arc::new(GasReport::new()));

        let deployments = Deployments::new(
            Arc::new(chain),
            network,
            ArtifactStore::new(&self.config.paths.artifacts),
            store,
        )
        .with_redeploy(self.redeploy)
        .with_gas_report(gas_report);

        Ok(Runtime {
            deployments,
            verifier,
            gas_reporter: self.config.gas_reporter,
        })
    }
}

fn ensure_chain_id(name: &str, expected: u64, url: &str, chain: &RpcChain) -> Result<()> {
    if chain.chain_id() != expected {
        anyhow::bail!(
            "Network {} is configured with chain id {} but the node at {} reports {}",
            name,
            expected,
            url,
            chain.chain_id()
        );
    }
    Ok(())
}
