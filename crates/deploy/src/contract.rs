//! Handles to deployed contracts and pending transactions.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use alloy_core::primitives::{Address, B256, I256, U256};
use alloy_sol_types::SolCall;
use anyhow::{Context, Result};

use crate::{
    abi::{ConstructorArg, IFundMe, IMockV3Aggregator, ISimpleStorage, encode_constructor_args},
    artifacts::Artifact,
    chain::{ChainClient, TransactionReceipt},
    gas_report::{DEPLOYMENT_METHOD, GasReport},
    rpc::DEFAULT_POLL_INTERVAL,
};

/// Label under which a transaction's gas is reported.
#[derive(Debug, Clone)]
struct GasLabel {
    report: Arc<GasReport>,
    contract: String,
    method: String,
}

/// A submitted transaction that has not been waited on yet.
pub struct PendingTransaction<C> {
    client: Arc<C>,
    hash: B256,
    timeout: Duration,
    poll_interval: Duration,
    gas_label: Option<GasLabel>,
}

impl<C: ChainClient> PendingTransaction<C> {
    pub fn new(client: Arc<C>, hash: B256, timeout: Duration) -> Self {
        Self {
            client,
            hash,
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
            gas_label: None,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub(crate) fn with_gas_report(
        mut self,
        report: Option<Arc<GasReport>>,
        contract: &str,
        method: &str,
    ) -> Self {
        self.gas_label = report.map(|report| GasLabel {
            report,
            contract: contract.to_string(),
            method: method.to_string(),
        });
        self
    }

    pub fn hash(&self) -> B256 {
        self.hash
    }

    /// Block until the transaction has `confirmations` confirmations.
    ///
    /// The block containing the transaction counts as the first
    /// confirmation. A reverted transaction or an expired timeout is an
    /// error.
    pub async fn wait(self, confirmations: u64) -> Result<TransactionReceipt> {
        let confirmations = confirmations.max(1);
        let start = Instant::now();

        loop {
            if start.elapsed() > self.timeout {
                anyhow::bail!(
                    "Timeout waiting for {} confirmation(s) of transaction {}",
                    confirmations,
                    self.hash
                );
            }

            if let Some(receipt) = self.client.transaction_receipt(self.hash).await? {
                if !receipt.success {
                    anyhow::bail!(
                        "Transaction {} reverted in block {}",
                        self.hash,
                        receipt.block_number
                    );
                }

                let target = receipt.block_number.saturating_add(confirmations - 1);
                let mut head = self.client.block_number().await?;
                if head < target {
                    self.client.mine(target - head).await?;
                    head = self.client.block_number().await?;
                }

                if head >= target {
                    tracing::debug!(
                        hash = %self.hash,
                        block = receipt.block_number,
                        confirmations,
                        "Transaction confirmed"
                    );
                    if let Some(label) = &self.gas_label {
                        label
                            .report
                            .record(&label.contract, &label.method, receipt.gas_used);
                    }
                    return Ok(receipt);
                }

                tracing::trace!(
                    hash = %self.hash,
                    head,
                    target,
                    "Waiting for confirmations"
                );
            } else {
                tracing::trace!(hash = %self.hash, "Transaction not mined yet");
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// A deployed contract.
pub struct Contract<C> {
    name: String,
    address: Address,
    client: Arc<C>,
    confirmation_timeout: Duration,
    gas_report: Option<Arc<GasReport>>,
}

impl<C> Clone for Contract<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            address: self.address,
            client: Arc::clone(&self.client),
            confirmation_timeout: self.confirmation_timeout,
            gas_report: self.gas_report.clone(),
        }
    }
}

impl<C: ChainClient> Contract<C> {
    pub fn new(
        name: impl Into<String>,
        address: Address,
        client: Arc<C>,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            address,
            client,
            confirmation_timeout,
            gas_report: None,
        }
    }

    pub fn with_gas_report(mut self, gas_report: Option<Arc<GasReport>>) -> Self {
        self.gas_report = gas_report;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Execute a read-only call and decode its return value.
    pub async fn read<T: SolCall>(&self, call: T) -> Result<T::Return> {
        let output = self
            .client
            .call(self.address, call.abi_encode().into())
            .await
            .with_context(|| format!("Call to {}.{} failed", self.name, method_name::<T>()))?;
        T::abi_decode_returns(&output).with_context(|| {
            format!(
                "Failed to decode the result of {}.{}",
                self.name,
                method_name::<T>()
            )
        })
    }

    /// Submit a state-changing call.
    pub async fn send<T: SolCall>(&self, call: T) -> Result<PendingTransaction<C>> {
        let method = method_name::<T>();
        let hash = self
            .client
            .send_transaction(self.address, call.abi_encode().into())
            .await
            .with_context(|| format!("Transaction {}.{} failed", self.name, method))?;

        tracing::debug!(contract = %self.name, method, %hash, "Transaction sent");

        Ok(
            PendingTransaction::new(Arc::clone(&self.client), hash, self.confirmation_timeout)
                .with_gas_report(self.gas_report.clone(), &self.name, method),
        )
    }
}

/// Deploys new instances of a compiled contract.
pub struct ContractFactory<C> {
    artifact: Artifact,
    client: Arc<C>,
    confirmation_timeout: Duration,
    gas_report: Option<Arc<GasReport>>,
}

impl<C: ChainClient> ContractFactory<C> {
    pub fn new(artifact: Artifact, client: Arc<C>, confirmation_timeout: Duration) -> Self {
        Self {
            artifact,
            client,
            confirmation_timeout,
            gas_report: None,
        }
    }

    pub fn with_gas_report(mut self, gas_report: Option<Arc<GasReport>>) -> Self {
        self.gas_report = gas_report;
        self
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Submit a creation transaction with the given constructor arguments.
    pub async fn deploy(&self, args: &[ConstructorArg]) -> Result<PendingDeployment<C>> {
        let name = &self.artifact.contract_name;
        let hash = self
            .client
            .deploy(&self.artifact, encode_constructor_args(args).into())
            .await
            .with_context(|| format!("Failed to send deployment of {}", name))?;

        tracing::debug!(contract = %name, %hash, "Deployment transaction sent");

        let pending =
            PendingTransaction::new(Arc::clone(&self.client), hash, self.confirmation_timeout)
                .with_gas_report(self.gas_report.clone(), name, DEPLOYMENT_METHOD);
        Ok(PendingDeployment {
            pending,
            contract_name: name.clone(),
            client: Arc::clone(&self.client),
            confirmation_timeout: self.confirmation_timeout,
            gas_report: self.gas_report.clone(),
        })
    }
}

/// A submitted contract creation.
pub struct PendingDeployment<C> {
    pending: PendingTransaction<C>,
    contract_name: String,
    client: Arc<C>,
    confirmation_timeout: Duration,
    gas_report: Option<Arc<GasReport>>,
}

impl<C: ChainClient> PendingDeployment<C> {
    pub fn hash(&self) -> B256 {
        self.pending.hash()
    }

    /// Wait for `confirmations` and return a handle to the new contract.
    pub async fn wait(self, confirmations: u64) -> Result<(Contract<C>, TransactionReceipt)> {
        let receipt = self.pending.wait(confirmations).await?;
        let address = receipt.contract_address.with_context(|| {
            format!(
                "Receipt of {} deployment has no contract address",
                self.contract_name
            )
        })?;

        let contract = Contract::new(
            self.contract_name,
            address,
            self.client,
            self.confirmation_timeout,
        )
        .with_gas_report(self.gas_report);
        Ok((contract, receipt))
    }
}

/// Name of a call, without its parameter list.
fn method_name<T: SolCall>() -> &'static str {
    T::SIGNATURE
        .split_once('(')
        .map_or(T::SIGNATURE, |(name, _)| name)
}

/// Typed handle to a `SimpleStorage` deployment.
pub struct SimpleStorage<C>(pub Contract<C>);

impl<C: ChainClient> SimpleStorage<C> {
    pub fn address(&self) -> Address {
        self.0.address()
    }

    pub async fn retrieve(&self) -> Result<U256> {
        self.0.read(ISimpleStorage::retrieveCall {}).await
    }

    pub async fn store(&self, favorite_number: U256) -> Result<PendingTransaction<C>> {
        self.0
            .send(ISimpleStorage::storeCall {
                favoriteNumber: favorite_number,
            })
            .await
    }

    pub async fn add_person(
        &self,
        name: &str,
        favorite_number: U256,
    ) -> Result<PendingTransaction<C>> {
        self.0
            .send(ISimpleStorage::addPersonCall {
                name: name.to_string(),
                favoriteNumber: favorite_number,
            })
            .await
    }

    pub async fn name_to_favorite_number(&self, name: &str) -> Result<U256> {
        self.0
            .read(ISimpleStorage::nameToFavoriteNumberCall {
                name: name.to_string(),
            })
            .await
    }
}

/// Typed handle to a `FundMe` deployment.
pub struct FundMe<C>(pub Contract<C>);

impl<C: ChainClient> FundMe<C> {
    pub fn address(&self) -> Address {
        self.0.address()
    }

    pub async fn price_feed(&self) -> Result<Address> {
        self.0.read(IFundMe::getPriceFeedCall {}).await
    }

    pub async fn owner(&self) -> Result<Address> {
        self.0.read(IFundMe::getOwnerCall {}).await
    }
}

/// Typed handle to a `MockV3Aggregator` deployment.
pub struct MockV3Aggregator<C>(pub Contract<C>);

impl<C: ChainClient> MockV3Aggregator<C> {
    pub fn address(&self) -> Address {
        self.0.address()
    }

    pub async fn decimals(&self) -> Result<u8> {
        self.0.read(IMockV3Aggregator::decimalsCall {}).await
    }

    pub async fn latest_answer(&self) -> Result<I256> {
        self.0.read(IMockV3Aggregator::latestAnswerCall {}).await
    }

    pub async fn update_answer(&self, answer: I256) -> Result<PendingTransaction<C>> {
        self.0
            .send(IMockV3Aggregator::updateAnswerCall { answer })
            .await
    }
}
