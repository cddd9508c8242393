//! Deploy script behaviour on development and live-like networks.
//!
//! Live networks are simulated with an in-process chain carrying the live
//! chain id, so the network table and verification gating apply unchanged.

use std::sync::{Arc, Mutex};

use alloy_core::primitives::{Address, I256, address};
use anyhow::Result;
use fundme_deploy::{
    Config, DeployScript, DevChain, MOCK_PRICE_FEED, NetworkSettings, Runtime, RuntimeBuilder,
    VerificationRequest,
    chain::ChainClient,
    contract::{FundMe, MockV3Aggregator},
    deployments::DeploymentRecord,
    network::AccountsSource,
    run_deploy_scripts, tasks,
    verify::{ContractVerifier, VerificationOutcome},
};
use tempdir::TempDir;

const RINKEBY_PRICE_FEED: Address = address!("8A753747A1Fa494EC906cE90E9f37563A8AF630e");

/// Records every verification request and answers with a scripted error.
#[derive(Clone, Default)]
struct RecordingVerifier {
    requests: Arc<Mutex<Vec<VerificationRequest>>>,
    error: Option<&'static str>,
}

impl RecordingVerifier {
    fn failing_with(error: &'static str) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    fn verified(&self) -> Vec<Address> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.address)
            .collect()
    }
}

impl ContractVerifier for RecordingVerifier {
    async fn verify(&self, request: &VerificationRequest) -> Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        match self.error {
            Some(error) => anyhow::bail!("{}", error),
            None => Ok(()),
        }
    }
}

struct LiveNetwork {
    _dir: TempDir,
    config: Config,
}

/// Configuration targeting rinkeby, with deployments written to a temp dir.
fn rinkeby(api_key: Option<&str>) -> LiveNetwork {
    init_test_tracing();
    let dir = TempDir::new("fundme-workflow").unwrap();
    let mut config = Config::default();
    config.paths.deployments = dir.path().join("deployments");
    config.etherscan.api_key = api_key.map(str::to_string);
    LiveNetwork { _dir: dir, config }
}

fn live_runtime(
    config: &Config,
    network: &str,
    verifier: RecordingVerifier,
) -> Runtime<DevChain, RecordingVerifier> {
    let chain_id = config.networks[network].chain_id;
    RuntimeBuilder::new(config.clone())
        .network(network)
        .build_with(DevChain::with_chain_id(chain_id).unwrap(), verifier)
        .unwrap()
}

/// Initialize tracing for tests (idempotent).
fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init()
        .ok();
}

fn find<'a>(records: &'a [DeploymentRecord], name: &str) -> &'a DeploymentRecord {
    records
        .iter()
        .find(|record| record.contract_name == name)
        .unwrap_or_else(|| panic!("no {} deployment", name))
}

#[tokio::test]
async fn test_development_network_uses_latest_mock() {
    init_test_tracing();
    let verifier = RecordingVerifier::default();
    let runtime = RuntimeBuilder::new(Config::default())
        .build_with(DevChain::new().unwrap(), verifier.clone())
        .unwrap();

    let records = run_deploy_scripts::<_, _, &str>(&runtime, &[]).await.unwrap();
    assert_eq!(records.len(), 2);

    let mock = find(&records, MOCK_PRICE_FEED);
    let fund_me = find(&records, "FundMe");
    assert_eq!(fund_me.args[0].as_address(), Some(mock.address));

    let deployments = runtime.deployments();
    let fund_me = FundMe(deployments.contract(fund_me));
    assert_eq!(fund_me.price_feed().await.unwrap(), mock.address);
    assert_eq!(
        fund_me.owner().await.unwrap(),
        runtime.client().sender()
    );

    let mock = MockV3Aggregator(deployments.contract(mock));
    assert_eq!(mock.decimals().await.unwrap(), 8);
    assert_eq!(
        mock.latest_answer().await.unwrap(),
        I256::try_from(200_000_000_000i64).unwrap()
    );

    assert!(verifier.verified().is_empty());
}

#[tokio::test]
async fn test_fund_me_alone_needs_a_mock_on_development() {
    let runtime = RuntimeBuilder::new(Config::default())
        .build_with(DevChain::new().unwrap(), RecordingVerifier::default())
        .unwrap();

    let err = run_deploy_scripts(&runtime, &["fundme"]).await.unwrap_err();
    assert!(format!("{:#}", err).contains(MOCK_PRICE_FEED));
}

#[tokio::test]
async fn test_latest_mock_wins_after_redeploy() {
    let runtime = RuntimeBuilder::new(Config::default())
        .redeploy(true)
        .build_with(DevChain::new().unwrap(), RecordingVerifier::default())
        .unwrap();

    let first = DeployScript::Mocks.run(&runtime).await.unwrap().unwrap();
    let second = DeployScript::Mocks.run(&runtime).await.unwrap().unwrap();
    assert_ne!(first.address, second.address);

    let fund_me = DeployScript::FundMe.run(&runtime).await.unwrap().unwrap();
    assert_eq!(fund_me.args[0].as_address(), Some(second.address));
}

#[tokio::test]
async fn test_live_network_uses_table_feed_and_verifies() {
    let live = rinkeby(Some("api-key"));
    let verifier = RecordingVerifier::default();
    let runtime = live_runtime(&live.config, "rinkeby", verifier.clone());

    let records = run_deploy_scripts::<_, _, &str>(&runtime, &[]).await.unwrap();
    assert_eq!(records.len(), 1, "mocks only run on development networks");

    let fund_me = find(&records, "FundMe");
    assert_eq!(fund_me.args[0].as_address(), Some(RINKEBY_PRICE_FEED));
    assert_eq!(verifier.verified(), vec![fund_me.address]);

    // Six confirmations were waited for before the record was written.
    let head = runtime.client().block_number().await.unwrap();
    assert!(head >= fund_me.block_number + 5);

    let saved = live
        .config
        .paths
        .deployments
        .join("rinkeby")
        .join("FundMe.json");
    assert!(saved.exists());
}

#[tokio::test]
async fn test_live_network_without_api_key_skips_verification() {
    let live = rinkeby(None);
    let verifier = RecordingVerifier::default();
    let runtime = live_runtime(&live.config, "rinkeby", verifier.clone());
    assert!(runtime.verifier().is_none());

    let records = run_deploy_scripts(&runtime, &["fundme"]).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(verifier.verified().is_empty());
}

#[tokio::test]
async fn test_already_verified_is_not_a_failure() {
    let live = rinkeby(Some("api-key"));
    let verifier = RecordingVerifier::failing_with("Contract source code already verified");
    let runtime = live_runtime(&live.config, "rinkeby", verifier.clone());

    let records = run_deploy_scripts(&runtime, &["all"]).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(verifier.verified().len(), 1);

    let outcome = tasks::verify_deployment(&runtime, "FundMe").await.unwrap();
    assert_eq!(outcome, VerificationOutcome::AlreadyVerified);
}

#[tokio::test]
async fn test_verification_errors_are_not_fatal() {
    let live = rinkeby(Some("api-key"));
    let verifier = RecordingVerifier::failing_with("Invalid API Key");
    let runtime = live_runtime(&live.config, "rinkeby", verifier.clone());

    let records = run_deploy_scripts(&runtime, &["fundme"]).await.unwrap();
    assert_eq!(records.len(), 1);

    let outcome = tasks::verify_deployment(&runtime, "FundMe").await.unwrap();
    assert!(!outcome.is_success());
}

#[tokio::test]
async fn test_live_network_without_price_feed_fails() {
    let mut live = rinkeby(Some("api-key"));
    live.config.networks.insert(
        "goerli".to_string(),
        NetworkSettings {
            url: Some("https://eth-goerli".to_string()),
            chain_id: 5,
            block_confirmations: Some(2),
            confirmation_timeout_secs: 30,
            accounts: AccountsSource::PrivateKey,
        },
    );
    let runtime = live_runtime(&live.config, "goerli", RecordingVerifier::default());

    let err = run_deploy_scripts(&runtime, &["fundme"]).await.unwrap_err();
    assert!(format!("{:#}", err).contains("price feed"));
}

#[tokio::test]
async fn test_unknown_tag() {
    let runtime = RuntimeBuilder::new(Config::default())
        .build_with(DevChain::new().unwrap(), RecordingVerifier::default())
        .unwrap();
    assert!(run_deploy_scripts(&runtime, &["lottery"]).await.is_err());
}
