//! The deployment workflow.
//!
//! [`Deployments`] deploys named contracts, waits for the network's
//! confirmation count and records the result. A contract whose recorded
//! deployment still matches its bytecode and arguments is reused unless a
//! redeploy is forced.

use std::sync::Arc;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use chrono::Utc;

use crate::{
    abi::{ConstructorArg, encode_constructor_args},
    artifacts::ArtifactStore,
    chain::ChainClient,
    contract::{Contract, ContractFactory},
    deployments::{DeploymentRecord, DeploymentStore, fingerprint},
    gas_report::GasReport,
    network::NetworkDescriptor,
    verify::{ContractVerifier, VerificationOutcome, VerificationRequest, verify_contract},
};

/// Name of the mock price feed contract.
pub const MOCK_PRICE_FEED: &str = "MockV3Aggregator";

/// Options of a single named deployment.
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    pub args: Vec<ConstructorArg>,
    /// Extra confirmations to wait for. Never fewer than the network requires.
    pub wait_confirmations: Option<u64>,
    /// Log the deployment at info level.
    pub log: bool,
}

impl DeployOptions {
    pub fn new(args: Vec<ConstructorArg>) -> Self {
        Self {
            args,
            wait_confirmations: None,
            log: true,
        }
    }

    pub fn wait_confirmations(mut self, confirmations: u64) -> Self {
        self.wait_confirmations = Some(confirmations);
        self
    }
}

/// Deploys and tracks the named contracts of one network.
pub struct Deployments<C> {
    client: Arc<C>,
    network: NetworkDescriptor,
    artifacts: ArtifactStore,
    store: DeploymentStore,
    redeploy: bool,
    gas_report: Option<Arc<GasReport>>,
}

impl<C: ChainClient> Deployments<C> {
    pub fn new(
        client: Arc<C>,
        network: NetworkDescriptor,
        artifacts: ArtifactStore,
        store: DeploymentStore,
    ) -> Self {
        Self {
            client,
            network,
            artifacts,
            store,
            redeploy: false,
            gas_report: None,
        }
    }

    /// Always send new deployments instead of reusing recorded ones.
    pub fn with_redeploy(mut self, redeploy: bool) -> Self {
        self.redeploy = redeploy;
        self
    }

    pub fn with_gas_report(mut self, gas_report: Option<Arc<GasReport>>) -> Self {
        self.gas_report = gas_report;
        self
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn network(&self) -> &NetworkDescriptor {
        &self.network
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn gas_report(&self) -> Option<&Arc<GasReport>> {
        self.gas_report.as_ref()
    }

    /// The recorded deployment of `contract_name`, if any.
    pub fn record(&self, contract_name: &str) -> Result<Option<DeploymentRecord>> {
        self.store.get(contract_name)
    }

    /// The recorded deployment of `contract_name`.
    pub fn get(&self, contract_name: &str) -> Result<DeploymentRecord> {
        self.record(contract_name)?.with_context(|| {
            format!(
                "No deployment of {} recorded on network {}",
                contract_name, self.network.name
            )
        })
    }

    /// Names of every recorded deployment.
    pub fn names(&self) -> Result<Vec<String>> {
        self.store.names()
    }

    /// A factory for new instances of `contract_name`.
    pub fn factory(&self, contract_name: &str) -> Result<ContractFactory<C>> {
        Ok(ContractFactory::new(
            self.artifacts.get(contract_name)?,
            Arc::clone(&self.client),
            self.network.confirmation_timeout,
        )
        .with_gas_report(self.gas_report.clone()))
    }

    /// A handle to a recorded deployment.
    pub fn contract(&self, record: &DeploymentRecord) -> Contract<C> {
        Contract::new(
            record.contract_name.clone(),
            record.address,
            Arc::clone(&self.client),
            self.network.confirmation_timeout,
        )
        .with_gas_report(self.gas_report.clone())
    }

    /// Deploy `contract_name`, or reuse its matching recorded deployment.
    ///
    /// Returns once the transaction has the required confirmations. Only then
    /// is the deployment recorded.
    pub async fn deploy(
        &self,
        contract_name: &str,
        options: DeployOptions,
    ) -> Result<DeploymentRecord> {
        let factory = self.factory(contract_name)?;
        let fingerprint = fingerprint(&factory.artifact().bytecode, &options.args);

        if !self.redeploy
            && let Some(existing) = self.store.get(contract_name)?
            && existing.fingerprint == fingerprint
            && self.client.has_code(existing.address).await?
        {
            tracing::info!(
                contract = contract_name,
                address = %existing.address,
                "Reusing existing deployment"
            );
            return Ok(existing);
        }

        let required = self.network.required_confirmations;
        let confirmations = options
            .wait_confirmations
            .unwrap_or(required)
            .max(required)
            .max(1);

        let pending = factory.deploy(&options.args).await?;
        if options.log {
            tracing::info!(
                contract = contract_name,
                network = %self.network.name,
                tx = %pending.hash(),
                confirmations,
                "Deploying contract..."
            );
        }

        let (contract, receipt) = pending
            .wait(confirmations)
            .await
            .with_context(|| format!("Deployment of {} was not confirmed", contract_name))?;

        let record = DeploymentRecord {
            contract_name: contract_name.to_string(),
            address: contract.address(),
            abi: factory.artifact().abi.clone(),
            args: options.args,
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            fingerprint,
            deployed_at: Utc::now(),
        };
        self.store.insert(record.clone())?;

        if options.log {
            tracing::info!(
                contract = contract_name,
                address = %record.address,
                block = record.block_number,
                gas_used = record.gas_used,
                "Contract deployed"
            );
        }

        Ok(record)
    }

    /// [`resolve_price_feed`] against this network's records.
    pub fn price_feed(&self) -> Result<Address> {
        resolve_price_feed(&self.network, &self.store)
    }

    /// Verify a recorded deployment if `verifier` is set.
    ///
    /// Never fails: verification problems are logged.
    pub async fn verify<V: ContractVerifier>(
        &self,
        verifier: Option<&V>,
        record: &DeploymentRecord,
    ) -> Option<VerificationOutcome> {
        let verifier = verifier?;
        let request = match self.verification_request(record) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(
                    contract = %record.contract_name,
                    error = %format!("{:#}", e),
                    "Cannot verify contract"
                );
                return Some(VerificationOutcome::Failed(e.to_string()));
            }
        };
        Some(verify_contract(verifier, &request).await)
    }

    /// The verification request for a recorded deployment.
    pub fn verification_request(&self, record: &DeploymentRecord) -> Result<VerificationRequest> {
        Ok(VerificationRequest {
            address: record.address,
            artifact: self.artifacts.get(&record.contract_name)?,
            constructor_args: encode_constructor_args(&record.args).into(),
        })
    }
}

/// The price feed FundMe should be constructed with on `network`.
///
/// Development networks use the latest recorded mock; other networks use the
/// configured feed for their chain id.
pub fn resolve_price_feed(network: &NetworkDescriptor, store: &DeploymentStore) -> Result<Address> {
    if network.is_development {
        let mock = store.get(MOCK_PRICE_FEED)?.with_context(|| {
            format!(
                "No {} deployed on development network {}. Run the mocks deploy script first.",
                MOCK_PRICE_FEED, network.name
            )
        })?;
        return Ok(mock.address);
    }

    network.price_feed.with_context(|| {
        format!(
            "No ETH/USD price feed configured for chain id {} (network {})",
            network.chain_id, network.name
        )
    })
}

/// Whether deployments on `network` should be verified.
pub fn should_verify(network: &NetworkDescriptor, api_key: Option<&str>) -> bool {
    !network.is_development && api_key.is_some_and(|key| !key.is_empty())
}
