//! JSON-RPC chain client against a scripted node.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use alloy_core::primitives::{Address, B256, Bytes, U256, address, keccak256};
use fundme_deploy::{
    Config, RpcChain, RuntimeBuilder,
    artifacts::Artifact,
    chain::ChainClient,
    contract::{Contract, PendingTransaction, SimpleStorage},
    tasks,
};
use mockito::{Server, ServerGuard};
use serde_json::{Value, json};

/// First development account, unlocked on the scripted node.
const NODE_ACCOUNT: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
/// Key of [`NODE_ACCOUNT`].
const NODE_ACCOUNT_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
/// Address every creation transaction lands at.
const CONTRACT: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");

/// State of the scripted node.
#[derive(Debug)]
struct NodeState {
    chain_id: u64,
    block_number: u64,
    revert: bool,
    /// Receipt lookups answered with `null` before the receipt shows up.
    pending_polls: u32,
    receipts: HashMap<B256, Value>,
    methods: Vec<String>,
}

impl NodeState {
    fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            block_number: 10,
            revert: false,
            pending_polls: 0,
            receipts: HashMap::new(),
            methods: Vec::new(),
        }
    }

    fn mine(&mut self, hash: B256, creation: bool) -> Value {
        self.block_number += 1;
        let receipt = json!({
            "transactionHash": hash,
            "blockNumber": format!("{:#x}", self.block_number),
            "from": NODE_ACCOUNT,
            "to": if creation { Value::Null } else { json!(CONTRACT) },
            "contractAddress": if creation { json!(CONTRACT) } else { Value::Null },
            "gasUsed": "0x1d8a8",
            "status": if self.revert { "0x0" } else { "0x1" },
            "logs": []
        });
        self.receipts.insert(hash, receipt);
        json!(hash)
    }

    fn answer(&mut self, method: &str, params: &[Value]) -> Result<Value, Value> {
        self.methods.push(method.to_string());
        match method {
            "eth_chainId" => Ok(json!(format!("{:#x}", self.chain_id))),
            "eth_accounts" => Ok(json!([NODE_ACCOUNT])),
            "eth_blockNumber" => Ok(json!(format!("{:#x}", self.block_number))),
            "eth_gasPrice" => Ok(json!("0x3b9aca00")),
            "eth_getTransactionCount" => Ok(json!("0x0")),
            "eth_estimateGas" => Ok(json!("0x5208")),
            "eth_sendRawTransaction" => {
                let raw: Bytes = serde_json::from_value(params[0].clone()).unwrap();
                Ok(self.mine(keccak256(&raw), true))
            }
            "eth_sendTransaction" => {
                let creation = params[0].get("to").is_none_or(Value::is_null);
                let hash = keccak256(params[0].to_string());
                Ok(self.mine(hash, creation))
            }
            "eth_getTransactionReceipt" => {
                if self.pending_polls > 0 {
                    self.pending_polls -= 1;
                    return Ok(Value::Null);
                }
                let hash: B256 = serde_json::from_value(params[0].clone()).unwrap();
                Ok(self.receipts.get(&hash).cloned().unwrap_or(Value::Null))
            }
            "eth_getCode" => {
                let target: Address = serde_json::from_value(params[0].clone()).unwrap();
                Ok(json!(if target == CONTRACT { "0x6080" } else { "0x" }))
            }
            "eth_call" => Ok(json!(Bytes::from(U256::from(7).to_be_bytes::<32>().to_vec()))),
            _ => Err(json!({ "code": -32601, "message": format!("{} not supported", method) })),
        }
    }
}

struct ScriptedNode {
    server: ServerGuard,
    state: Arc<Mutex<NodeState>>,
}

impl ScriptedNode {
    async fn start(chain_id: u64) -> Self {
        init_test_tracing();
        let mut server = Server::new_async().await;
        let state = Arc::new(Mutex::new(NodeState::new(chain_id)));

        let handler_state = Arc::clone(&state);
        server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body_from_request(move |request| {
                let body: Value = serde_json::from_slice(request.body().unwrap()).unwrap();
                let method = body["method"].as_str().unwrap_or_default();
                let params = body["params"].as_array().cloned().unwrap_or_default();

                let response = match handler_state.lock().unwrap().answer(method, &params) {
                    Ok(result) => json!({ "jsonrpc": "2.0", "id": body["id"], "result": result }),
                    Err(error) => json!({ "jsonrpc": "2.0", "id": body["id"], "error": error }),
                };
                response.to_string().into_bytes()
            })
            .create_async()
            .await;

        Self { server, state }
    }

    fn url(&self) -> String {
        self.server.url()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, NodeState> {
        self.state.lock().unwrap()
    }

    fn saw(&self, method: &str) -> bool {
        self.state().methods.iter().any(|seen| seen == method)
    }
}

/// Initialize tracing for tests (idempotent).
fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init()
        .ok();
}

fn compiled(name: &str) -> Artifact {
    Artifact {
        bytecode: Bytes::from_static(&[0x60, 0x80, 0x60, 0x40, 0x52]),
        ..Artifact::named(name)
    }
}

/// Default configuration with rinkeby served by `node`.
fn rinkeby_config(node: &ScriptedNode) -> Config {
    let mut config = Config::default();
    if let Some(rinkeby) = config.networks.get_mut("rinkeby") {
        rinkeby.url = Some(node.url());
    }
    config
}

fn pending<C: ChainClient>(client: Arc<C>, hash: B256) -> PendingTransaction<C> {
    PendingTransaction::new(client, hash, Duration::from_secs(5))
        .with_poll_interval(Duration::from_millis(10))
}

#[tokio::test]
async fn test_connect_reads_chain_id_and_node_account() {
    let node = ScriptedNode::start(31337).await;

    let chain = RpcChain::connect(&node.url(), None, 0).await.unwrap();
    assert_eq!(chain.chain_id(), 31337);
    assert_eq!(chain.sender(), NODE_ACCOUNT);
    assert_eq!(chain.block_number().await.unwrap(), 10);

    assert!(RpcChain::connect(&node.url(), None, 1).await.is_err());
}

#[tokio::test]
async fn test_connect_rejects_unexpected_chain_id() {
    let node = ScriptedNode::start(1).await;
    let mut config = rinkeby_config(&node);
    config.private_key = Some(NODE_ACCOUNT_KEY.to_string());

    let err = RuntimeBuilder::new(config)
        .network("rinkeby")
        .connect()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("chain id 4"));
}

#[tokio::test]
async fn test_deploy_with_node_account_and_poll_receipt() {
    let node = ScriptedNode::start(31337).await;
    let chain = Arc::new(RpcChain::connect(&node.url(), None, 0).await.unwrap());
    node.state().pending_polls = 2;

    let hash = chain
        .deploy(&compiled("SimpleStorage"), Bytes::new())
        .await
        .unwrap();
    let receipt = pending(Arc::clone(&chain), hash).wait(1).await.unwrap();

    assert_eq!(receipt.transaction_hash, hash);
    assert_eq!(receipt.block_number, 11);
    assert_eq!(receipt.contract_address, Some(CONTRACT));
    assert!(chain.has_code(CONTRACT).await.unwrap());
    assert!(!chain.has_code(NODE_ACCOUNT).await.unwrap());

    assert!(node.saw("eth_sendTransaction"));
    assert!(!node.saw("eth_sendRawTransaction"));
}

#[tokio::test]
async fn test_local_signer_sends_raw_transactions() {
    let node = ScriptedNode::start(4).await;
    let mut config = rinkeby_config(&node);
    config.private_key = Some(NODE_ACCOUNT_KEY.to_string());

    let chain = RuntimeBuilder::new(config)
        .network("rinkeby")
        .connect()
        .await
        .unwrap();
    assert_eq!(chain.sender(), NODE_ACCOUNT);
    assert!(!node.saw("eth_accounts"));

    let storage = SimpleStorage(Contract::new(
        "SimpleStorage",
        CONTRACT,
        Arc::new(chain),
        Duration::from_secs(5),
    ));
    let tx = storage.store(U256::from(7)).await.unwrap();
    let hash = tx.hash();

    assert!(node.saw("eth_sendRawTransaction"));
    assert!(!node.saw("eth_sendTransaction"));
    assert!(node.state().receipts.contains_key(&hash));
}

#[tokio::test]
async fn test_reverted_receipt_is_an_error() {
    let node = ScriptedNode::start(31337).await;
    let chain = Arc::new(RpcChain::connect(&node.url(), None, 0).await.unwrap());
    node.state().revert = true;

    let hash = chain
        .send_transaction(CONTRACT, Bytes::from_static(&[0x60, 0x57, 0xd6, 0x4f]))
        .await
        .unwrap();
    let err = pending(chain, hash).wait(1).await.unwrap_err();
    assert!(err.to_string().contains("reverted"));
}

#[tokio::test]
async fn test_deploy_requires_bytecode() {
    let node = ScriptedNode::start(31337).await;
    let chain = RpcChain::connect(&node.url(), None, 0).await.unwrap();

    let err = chain
        .deploy(&Artifact::named("FundMe"), Bytes::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no bytecode"));
    assert!(!node.saw("eth_sendTransaction"));
}

#[tokio::test]
async fn test_reads_go_through_eth_call() {
    let node = ScriptedNode::start(31337).await;
    let chain = Arc::new(RpcChain::connect(&node.url(), None, 0).await.unwrap());

    let storage = SimpleStorage(Contract::new(
        "SimpleStorage",
        CONTRACT,
        chain,
        Duration::from_secs(5),
    ));
    assert_eq!(storage.retrieve().await.unwrap(), U256::from(7));
}

#[tokio::test]
async fn test_block_number_needs_no_private_key() {
    let node = ScriptedNode::start(4).await;
    let builder = RuntimeBuilder::new(rinkeby_config(&node)).network("rinkeby");

    let err = builder.connect().await.unwrap_err();
    assert!(err.to_string().contains("PRIVATE_KEY"));

    let chain = builder.connect_read_only().await.unwrap();
    assert_eq!(tasks::block_number(&chain).await.unwrap(), 10);
    assert!(!node.saw("eth_accounts"));

    let err = chain
        .send_transaction(CONTRACT, Bytes::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("read-only"));
}
