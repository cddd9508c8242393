//! Deploy scripts and the SimpleStorage interaction script.

use alloy_core::primitives::{Address, Bytes, I256, U256};
use anyhow::{Context, Result};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::{
    abi::ConstructorArg,
    builder::Runtime,
    chain::ChainClient,
    contract::SimpleStorage,
    deployer::{DeployOptions, MOCK_PRICE_FEED},
    deployments::DeploymentRecord,
    network::{MOCK_DECIMALS, MOCK_INITIAL_ANSWER},
    verify::{ContractVerifier, VerificationRequest, verify_contract},
};

/// Tag matching every deploy script.
pub const TAG_ALL: &str = "all";

/// The deploy scripts, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum DeployScript {
    /// Mock price feed, development networks only.
    Mocks,
    FundMe,
}

impl DeployScript {
    pub fn tags(&self) -> &'static [&'static str] {
        match self {
            Self::Mocks => &[TAG_ALL, "mocks"],
            Self::FundMe => &[TAG_ALL, "fundme"],
        }
    }

    /// Whether the script runs for the requested tags. No tags selects all.
    pub fn matches<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        tags.is_empty()
            || tags
                .iter()
                .any(|tag| self.tags().contains(&tag.as_ref()))
    }

    /// Run the script.
    ///
    /// Returns the deployment it produced, if any.
    pub async fn run<C, V>(&self, runtime: &Runtime<C, V>) -> Result<Option<DeploymentRecord>>
    where
        C: ChainClient,
        V: ContractVerifier,
    {
        match self {
            Self::Mocks => deploy_mocks(runtime).await,
            Self::FundMe => deploy_fund_me(runtime).await.map(Some),
        }
    }
}

/// Run every deploy script matching `tags`, in order.
pub async fn run_deploy_scripts<C, V, S>(
    runtime: &Runtime<C, V>,
    tags: &[S],
) -> Result<Vec<DeploymentRecord>>
where
    C: ChainClient,
    V: ContractVerifier,
    S: AsRef<str>,
{
    let scripts: Vec<_> = DeployScript::iter()
        .filter(|script| script.matches(tags))
        .collect();
    if scripts.is_empty() {
        anyhow::bail!(
            "No deploy script matches the requested tags. Available tags: {}",
            DeployScript::iter()
                .flat_map(|script| script.tags().iter().copied())
                .collect::<std::collections::BTreeSet<_>>()
                .into_iter()
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let mut records = Vec::new();
    for script in scripts {
        tracing::debug!(%script, "Running deploy script");
        if let Some(record) = script
            .run(runtime)
            .await
            .with_context(|| format!("Deploy script {} failed", script))?
        {
            records.push(record);
        }
    }
    Ok(records)
}

async fn deploy_mocks<C, V>(runtime: &Runtime<C, V>) -> Result<Option<DeploymentRecord>>
where
    C: ChainClient,
    V: ContractVerifier,
{
    let network = runtime.network();
    if !network.is_development {
        tracing::debug!(network = %network.name, "Not a development network, skipping mocks");
        return Ok(None);
    }

    tracing::info!(network = %network.name, "Local network detected! Deploying mocks...");
    let record = runtime
        .deployments()
        .deploy(
            MOCK_PRICE_FEED,
            DeployOptions::new(vec![
                ConstructorArg::from(U256::from(MOCK_DECIMALS)),
                ConstructorArg::from(I256::unchecked_from(MOCK_INITIAL_ANSWER)),
            ]),
        )
        .await?;
    tracing::info!("Mocks deployed!");

    Ok(Some(record))
}

async fn deploy_fund_me<C, V>(runtime: &Runtime<C, V>) -> Result<DeploymentRecord>
where
    C: ChainClient,
    V: ContractVerifier,
{
    let deployments = runtime.deployments();
    let price_feed = deployments.price_feed()?;
    tracing::info!(%price_feed, "Using ETH/USD price feed");

    let record = deployments
        .deploy(
            "FundMe",
            DeployOptions::new(vec![ConstructorArg::from(price_feed)]),
        )
        .await?;

    deployments.verify(runtime.verifier(), &record).await;
    Ok(record)
}

/// What the interaction script observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionReport {
    pub address: Address,
    pub initial_value: U256,
    pub updated_value: U256,
}

/// Value written by the interaction script.
pub const INTERACTION_VALUE: u64 = 7;

/// Deploy a fresh SimpleStorage, read it, store 7 and read it back.
pub async fn run_simple_storage<C, V>(runtime: &Runtime<C, V>) -> Result<InteractionReport>
where
    C: ChainClient,
    V: ContractVerifier,
{
    let deployments = runtime.deployments();
    let factory = deployments.factory("SimpleStorage")?;

    tracing::info!("Deploying contract...");
    let pending = factory.deploy(&[]).await?;

    // Verified contracts wait for the full confirmation count first.
    let confirmations = if runtime.verifier().is_some() {
        runtime.network().required_confirmations
    } else {
        1
    };
    let (contract, _) = pending.wait(confirmations).await?;
    tracing::info!(address = %contract.address(), "Deployed contract");

    if let Some(verifier) = runtime.verifier() {
        let request = VerificationRequest {
            address: contract.address(),
            artifact: factory.artifact().clone(),
            constructor_args: Bytes::new(),
        };
        verify_contract(verifier, &request).await;
    }

    let storage = SimpleStorage(contract);

    let initial_value = storage.retrieve().await?;
    tracing::info!(value = %initial_value, "Current value");

    storage
        .store(U256::from(INTERACTION_VALUE))
        .await?
        .wait(1)
        .await?;

    let updated_value = storage.retrieve().await?;
    tracing::info!(value = %updated_value, "Updated value");

    if updated_value != U256::from(INTERACTION_VALUE) {
        anyhow::bail!(
            "SimpleStorage returned {} after storing {}",
            updated_value,
            INTERACTION_VALUE
        );
    }

    Ok(InteractionReport {
        address: storage.address(),
        initial_value,
        updated_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_script_tags() {
        assert!(DeployScript::Mocks.matches::<&str>(&[]));
        assert!(DeployScript::Mocks.matches(&["all"]));
        assert!(DeployScript::Mocks.matches(&["mocks"]));
        assert!(!DeployScript::Mocks.matches(&["fundme"]));
        assert!(DeployScript::FundMe.matches(&["fundme", "other"]));
    }

    #[test]
    fn test_script_names() {
        let names: Vec<String> = DeployScript::iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["mocks", "fund-me"]);
        assert_eq!(
            DeployScript::from_str("fund-me").unwrap(),
            DeployScript::FundMe
        );
    }
}
