//! JSON-RPC chain client.

use std::fmt;

use alloy_core::primitives::{Address, B256, Bytes};
use alloy_network::{EthereumWallet, TransactionBuilder};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use super::{ChainClient, TransactionReceipt};
use crate::{
    artifacts::Artifact,
    rpc::{create_client, deserialize_u64_from_hex, json_rpc_call, parse_hex_u64},
};

/// Who signs the transactions sent through an [`RpcChain`].
#[derive(Debug, Clone, Copy)]
enum Sender {
    /// Signed by the provider's wallet, submitted with `eth_sendRawTransaction`.
    Local(Address),
    /// An account unlocked on the node, used with `eth_sendTransaction`.
    Node(Address),
    /// No account. Only reads are possible.
    ReadOnly,
}

/// Receipt as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    block_number: u64,
    from: Address,
    to: Option<Address>,
    contract_address: Option<Address>,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    gas_used: u64,
    /// Absent on pre-Byzantium chains.
    status: Option<String>,
}

impl TryFrom<RpcReceipt> for TransactionReceipt {
    type Error = anyhow::Error;

    fn try_from(receipt: RpcReceipt) -> Result<Self> {
        let success = match receipt.status.as_deref() {
            Some(status) => parse_hex_u64(status)? == 1,
            None => true,
        };
        Ok(Self {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            from: receipt.from,
            to: receipt.to,
            contract_address: receipt.contract_address,
            gas_used: receipt.gas_used,
            success,
        })
    }
}

/// A chain reached over JSON-RPC.
///
/// Reads use plain JSON-RPC requests. Transactions are filled (nonce, gas,
/// chain id), signed and submitted by an alloy provider.
pub struct RpcChain {
    client: reqwest::Client,
    url: String,
    chain_id: u64,
    sender: Sender,
    provider: DynProvider,
}

impl fmt::Debug for RpcChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcChain")
            .field("url", &self.url)
            .field("chain_id", &self.chain_id)
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}

impl RpcChain {
    /// Connect to `url`.
    ///
    /// With a `signer`, transactions are signed locally. Otherwise the node's
    /// account at `account_index` in `eth_accounts` is used.
    pub async fn connect(
        url: &str,
        signer: Option<PrivateKeySigner>,
        account_index: usize,
    ) -> Result<Self> {
        let (client, endpoint, chain_id) = handshake(url).await?;

        let (sender, provider) = match signer {
            Some(signer) => {
                let address = signer.address();
                let provider = ProviderBuilder::new()
                    .wallet(EthereumWallet::from(signer))
                    .connect_http(endpoint);
                (Sender::Local(address), DynProvider::new(provider))
            }
            None => {
                let accounts: Vec<Address> =
                    json_rpc_call(&client, url, "eth_accounts", vec![]).await?;
                let account = accounts.get(account_index).copied().with_context(|| {
                    format!(
                        "Node at {} exposes {} accounts, no account at index {}",
                        url,
                        accounts.len(),
                        account_index
                    )
                })?;
                let provider = ProviderBuilder::new().connect_http(endpoint);
                (Sender::Node(account), DynProvider::new(provider))
            }
        };

        tracing::debug!(%url, chain_id, sender = ?sender, "Connected to JSON-RPC node");

        Ok(Self {
            client,
            url: url.to_string(),
            chain_id,
            sender,
            provider,
        })
    }

    /// Connect to `url` without any account. Sending transactions fails.
    pub async fn connect_read_only(url: &str) -> Result<Self> {
        let (client, endpoint, chain_id) = handshake(url).await?;
        tracing::debug!(%url, chain_id, "Connected to JSON-RPC node (read-only)");

        Ok(Self {
            client,
            url: url.to_string(),
            chain_id,
            sender: Sender::ReadOnly,
            provider: DynProvider::new(ProviderBuilder::new().connect_http(endpoint)),
        })
    }

    async fn rpc<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T> {
        json_rpc_call(&self.client, &self.url, method, params).await
    }

    async fn submit(&self, tx: TransactionRequest) -> Result<B256> {
        let from = match self.sender {
            Sender::Local(address) | Sender::Node(address) => address,
            Sender::ReadOnly => {
                anyhow::bail!("Connected to {} read-only, cannot send transactions", self.url)
            }
        };

        let gas_price = self
            .provider
            .get_gas_price()
            .await
            .context("Failed to fetch gas price")?;
        let tx = tx
            .with_from(from)
            .with_chain_id(self.chain_id)
            .with_gas_price(gas_price);

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .context("Failed to submit transaction")?;
        let hash = *pending.tx_hash();

        tracing::debug!(%from, %hash, gas_price, "Transaction submitted");
        Ok(hash)
    }
}

/// Validate `url` and read the chain id of the node behind it.
async fn handshake(url: &str) -> Result<(reqwest::Client, Url, u64)> {
    let endpoint = Url::parse(url).with_context(|| format!("Invalid RPC URL: {}", url))?;
    let client = create_client()?;

    let chain_id: String = json_rpc_call(&client, url, "eth_chainId", vec![])
        .await
        .with_context(|| format!("Failed to reach node at {}", url))?;
    let chain_id = parse_hex_u64(&chain_id)?;

    Ok((client, endpoint, chain_id))
}

impl ChainClient for RpcChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn sender(&self) -> Address {
        match self.sender {
            Sender::Local(address) | Sender::Node(address) => address,
            Sender::ReadOnly => Address::ZERO,
        }
    }

    async fn block_number(&self) -> Result<u64> {
        let number: String = self.rpc("eth_blockNumber", vec![]).await?;
        parse_hex_u64(&number)
    }

    async fn deploy(&self, artifact: &Artifact, constructor_args: Bytes) -> Result<B256> {
        if artifact.bytecode.is_empty() {
            anyhow::bail!(
                "Artifact {} has no bytecode. Compile the contracts first.",
                artifact.contract_name
            );
        }
        let mut code = artifact.bytecode.to_vec();
        code.extend_from_slice(&constructor_args);
        self.submit(TransactionRequest::default().with_deploy_code(code))
            .await
            .with_context(|| format!("Failed to deploy {}", artifact.contract_name))
    }

    async fn send_transaction(&self, to: Address, data: Bytes) -> Result<B256> {
        self.submit(TransactionRequest::default().with_to(to).with_input(data))
            .await
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let request = json!({
            "from": self.sender(),
            "to": to,
            "data": data,
        });
        self.rpc("eth_call", vec![request, json!("latest")]).await
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>> {
        let receipt: Option<RpcReceipt> = self
            .rpc("eth_getTransactionReceipt", vec![json!(hash)])
            .await?;
        receipt.map(TransactionReceipt::try_from).transpose()
    }

    async fn has_code(&self, address: Address) -> Result<bool> {
        let code: Bytes = self
            .rpc("eth_getCode", vec![json!(address), json!("latest")])
            .await?;
        Ok(!code.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_from_wire_format() {
        let raw = json!({
            "transactionHash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "blockNumber": "0x1b4",
            "from": "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266",
            "to": null,
            "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "gasUsed": "0x1d8a8",
            "status": "0x1",
            "logs": []
        });

        let receipt: RpcReceipt = serde_json::from_value(raw).unwrap();
        let receipt = TransactionReceipt::try_from(receipt).unwrap();
        assert_eq!(receipt.block_number, 436);
        assert_eq!(receipt.gas_used, 121_000);
        assert!(receipt.to.is_none());
        assert!(receipt.contract_address.is_some());
        assert!(receipt.success);
    }

    #[test]
    fn test_reverted_receipt() {
        let raw = json!({
            "transactionHash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "blockNumber": "0x2",
            "from": "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266",
            "to": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "contractAddress": null,
            "gasUsed": "0x5208",
            "status": "0x0"
        });

        let receipt: RpcReceipt = serde_json::from_value(raw).unwrap();
        assert!(!TransactionReceipt::try_from(receipt).unwrap().success);
    }
}
