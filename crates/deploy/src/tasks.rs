//! Standalone tasks.

use anyhow::Result;

use crate::{
    builder::Runtime,
    chain::ChainClient,
    verify::{ContractVerifier, VerificationOutcome},
};

/// Fetch and log the current block height.
pub async fn block_number<C: ChainClient>(client: &C) -> Result<u64> {
    let number = client.block_number().await?;
    tracing::info!(block_number = number, "Current block number: {}", number);
    Ok(number)
}

/// Verify an already recorded deployment.
///
/// Fails only when there is nothing to verify. The verification itself is
/// best effort, like after a deployment.
pub async fn verify_deployment<C, V>(
    runtime: &Runtime<C, V>,
    contract_name: &str,
) -> Result<VerificationOutcome>
where
    C: ChainClient,
    V: ContractVerifier,
{
    let record = runtime.deployments().get(contract_name)?;

    if runtime.network().is_development {
        anyhow::bail!(
            "Network {} is a development network, nothing to verify",
            runtime.network().name
        );
    }

    match runtime
        .deployments()
        .verify(runtime.verifier(), &record)
        .await
    {
        Some(outcome) => Ok(outcome),
        None => anyhow::bail!(
            "Verification is not configured for network {}. Set ETHERSCAN_API_KEY.",
            runtime.network().name
        ),
    }
}
