//! Chain clients.
//!
//! [`ChainClient`] is the only surface the deploy workflow talks to. It has
//! two implementations: [`DevChain`], an in-process simulated chain, and
//! [`RpcChain`], a JSON-RPC client for real nodes.

mod dev;
mod native;
mod rpc;

use std::future::Future;

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use dev::{DEV_MNEMONIC, DevChain};
pub use native::NativeContract;
pub use rpc::RpcChain;

use crate::artifacts::Artifact;

/// A mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    pub from: Address,
    pub to: Option<Address>,
    pub contract_address: Option<Address>,
    pub gas_used: u64,
    pub success: bool,
}

/// Client for a chain the deploy workflow can target.
pub trait ChainClient: Send + Sync {
    /// The chain id of the connected chain.
    fn chain_id(&self) -> u64;

    /// The account transactions are sent from.
    fn sender(&self) -> Address;

    /// The current block height.
    fn block_number(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Submit a contract creation transaction for `artifact`.
    fn deploy(
        &self,
        artifact: &Artifact,
        constructor_args: Bytes,
    ) -> impl Future<Output = Result<B256>> + Send;

    /// Submit a state-changing call to `to`.
    fn send_transaction(&self, to: Address, data: Bytes)
    -> impl Future<Output = Result<B256>> + Send;

    /// Execute a read-only call against the latest block.
    fn call(&self, to: Address, data: Bytes) -> impl Future<Output = Result<Bytes>> + Send;

    /// The receipt of a transaction, if it has been mined.
    fn transaction_receipt(
        &self,
        hash: B256,
    ) -> impl Future<Output = Result<Option<TransactionReceipt>>> + Send;

    /// Whether there is contract code at `address`.
    fn has_code(&self, address: Address) -> impl Future<Output = Result<bool>> + Send;

    /// Ask the chain to produce `blocks` blocks.
    ///
    /// Real networks mine on their own, so this is a no-op unless the chain
    /// is simulated.
    fn mine(&self, _blocks: u64) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}

/// A chain selected at runtime from the network configuration.
#[derive(Debug)]
pub enum Chain {
    InProcess(DevChain),
    Rpc(RpcChain),
}

impl ChainClient for Chain {
    fn chain_id(&self) -> u64 {
        match self {
            Chain::InProcess(chain) => chain.chain_id(),
            Chain::Rpc(chain) => chain.chain_id(),
        }
    }

    fn sender(&self) -> Address {
        match self {
            Chain::InProcess(chain) => chain.sender(),
            Chain::Rpc(chain) => chain.sender(),
        }
    }

    async fn block_number(&self) -> Result<u64> {
        match self {
            Chain::InProcess(chain) => chain.block_number().await,
            Chain::Rpc(chain) => chain.block_number().await,
        }
    }

    async fn deploy(&self, artifact: &Artifact, constructor_args: Bytes) -> Result<B256> {
        match self {
            Chain::InProcess(chain) => chain.deploy(artifact, constructor_args).await,
            Chain::Rpc(chain) => chain.deploy(artifact, constructor_args).await,
        }
    }

    async fn send_transaction(&self, to: Address, data: Bytes) -> Result<B256> {
        match self {
            Chain::InProcess(chain) => chain.send_transaction(to, data).await,
            Chain::Rpc(chain) => chain.send_transaction(to, data).await,
        }
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        match self {
            Chain::InProcess(chain) => chain.call(to, data).await,
            Chain::Rpc(chain) => chain.call(to, data).await,
        }
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>> {
        match self {
            Chain::InProcess(chain) => chain.transaction_receipt(hash).await,
            Chain::Rpc(chain) => chain.transaction_receipt(hash).await,
        }
    }

    async fn has_code(&self, address: Address) -> Result<bool> {
        match self {
            Chain::InProcess(chain) => chain.has_code(address).await,
            Chain::Rpc(chain) => chain.has_code(address).await,
        }
    }

    async fn mine(&self, blocks: u64) -> Result<()> {
        match self {
            Chain::InProcess(chain) => chain.mine(blocks).await,
            Chain::Rpc(chain) => chain.mine(blocks).await,
        }
    }
}
