//! Source verification on Etherscan-compatible block explorers.
//!
//! Verification is best effort: [`verify_contract`] logs the outcome and never
//! returns an error.

use std::{fmt, future::Future, time::Duration};

use alloy_core::primitives::{Address, Bytes};
use anyhow::{Context, Result};
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize};

use crate::artifacts::Artifact;

/// Delay between two verification status checks.
pub const DEFAULT_STATUS_POLL_DELAY: Duration = Duration::from_secs(5);

/// Number of status checks before giving up on a pending verification.
pub const DEFAULT_STATUS_POLL_ATTEMPTS: usize = 24;

const CODE_FORMAT: &str = "solidity-standard-json-input";

/// Everything needed to verify one deployed contract.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub address: Address,
    pub artifact: Artifact,
    pub constructor_args: Bytes,
}

/// Outcome of a verification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified,
    /// The explorer already had the source. Counts as success.
    AlreadyVerified,
    Failed(String),
}

impl VerificationOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Whether an explorer error says the contract is already verified.
pub fn is_already_verified(message: &str) -> bool {
    message.to_lowercase().contains("already verified")
}

/// A block explorer that can verify contract sources.
pub trait ContractVerifier: Send + Sync {
    fn verify(&self, request: &VerificationRequest) -> impl Future<Output = Result<()>> + Send;
}

/// Verify `request`, logging the outcome.
pub async fn verify_contract<V: ContractVerifier>(
    verifier: &V,
    request: &VerificationRequest,
) -> VerificationOutcome {
    tracing::info!(
        contract = %request.artifact.contract_name,
        address = %request.address,
        "Verifying contract..."
    );

    match verifier.verify(request).await {
        Ok(()) => {
            tracing::info!(contract = %request.artifact.contract_name, "Contract verified");
            VerificationOutcome::Verified
        }
        Err(e) => {
            let message = format!("{:#}", e);
            if is_already_verified(&message) {
                tracing::info!(contract = %request.artifact.contract_name, "Already verified!");
                VerificationOutcome::AlreadyVerified
            } else {
                tracing::warn!(
                    contract = %request.artifact.contract_name,
                    error = %message,
                    "Verification failed"
                );
                VerificationOutcome::Failed(message)
            }
        }
    }
}

/// The explorer has not finished processing a submission yet.
#[derive(Debug)]
struct VerificationPending;

impl fmt::Display for VerificationPending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "verification is still pending")
    }
}

impl std::error::Error for VerificationPending {}

/// Response envelope of the Etherscan API.
#[derive(Debug, Serialize, Deserialize)]
struct EtherscanResponse {
    status: String,
    message: String,
    result: String,
}

impl EtherscanResponse {
    fn into_result(self) -> Result<String> {
        if self.status != "1" {
            anyhow::bail!("Etherscan API error: {} ({})", self.result, self.message);
        }
        Ok(self.result)
    }
}

/// Interpret the result of a `checkverifystatus` request.
fn check_status(result: &str) -> Result<()> {
    let lower = result.to_lowercase();
    if lower.contains("pending") || lower.contains("in queue") {
        return Err(VerificationPending.into());
    }
    if lower.starts_with("pass") || is_already_verified(&lower) {
        return Ok(());
    }
    anyhow::bail!("Verification failed: {}", result)
}

/// Client for the Etherscan verification API.
pub struct EtherscanVerifier {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    poll_delay: Duration,
    poll_attempts: usize,
}

impl EtherscanVerifier {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let api_url = api_url.into();
        url::Url::parse(&api_url)
            .with_context(|| format!("Invalid explorer API URL: {}", api_url))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url,
            api_key: api_key.into(),
            poll_delay: DEFAULT_STATUS_POLL_DELAY,
            poll_attempts: DEFAULT_STATUS_POLL_ATTEMPTS,
        })
    }

    pub fn with_polling(mut self, delay: Duration, attempts: usize) -> Self {
        self.poll_delay = delay;
        self.poll_attempts = attempts;
        self
    }

    async fn submit(&self, request: &VerificationRequest) -> Result<String> {
        let compiler = request.artifact.compiler.as_ref().with_context(|| {
            format!(
                "Artifact {} has no compiler input, cannot verify",
                request.artifact.contract_name
            )
        })?;
        let source_code = serde_json::to_string(&compiler.input)
            .context("Failed to serialize compiler input")?;

        let form = [
            ("apikey", self.api_key.clone()),
            ("module", "contract".to_string()),
            ("action", "verifysourcecode".to_string()),
            ("contractaddress", request.address.to_string()),
            ("sourceCode", source_code),
            ("codeformat", CODE_FORMAT.to_string()),
            ("contractname", request.artifact.qualified_name()),
            ("compilerversion", compiler.version.clone()),
            // Misspelled on the explorer side.
            (
                "constructorArguements",
                hex::encode(&request.constructor_args),
            ),
        ];

        let response: EtherscanResponse = self
            .client
            .post(&self.api_url)
            .form(&form)
            .send()
            .await
            .context("Failed to submit verification request")?
            .json()
            .await
            .context("Failed to parse verification response")?;

        response.into_result()
    }

    async fn status(&self, guid: &str) -> Result<()> {
        let response: EtherscanResponse = self
            .client
            .get(&self.api_url)
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
            ])
            .send()
            .await
            .context("Failed to query verification status")?
            .json()
            .await
            .context("Failed to parse verification status")?;

        // Pending states come back with status "0".
        check_status(&response.result)
    }
}

impl ContractVerifier for EtherscanVerifier {
    async fn verify(&self, request: &VerificationRequest) -> Result<()> {
        let guid = self.submit(request).await?;
        tracing::debug!(%guid, "Verification submitted");

        let backoff = ConstantBuilder::default()
            .with_delay(self.poll_delay)
            .with_max_times(self.poll_attempts);

        (|| self.status(&guid))
            .retry(backoff)
            .when(|e| e.is::<VerificationPending>())
            .notify(|_, delay| {
                tracing::debug!(?delay, "Verification pending, checking again");
            })
            .await
    }
}
