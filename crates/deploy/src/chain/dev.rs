//! In-process development chain.
//!
//! Every transaction is mined into its own block as soon as it is sent.
//! [`ChainClient::mine`] appends empty blocks, which is how waits for more
//! than one confirmation complete.

use std::{
    collections::HashMap,
    future::{Future, ready},
    fmt,
    sync::{Mutex, MutexGuard},
};

use alloy_core::primitives::{Address, B256, Bytes, keccak256};
use alloy_signer_local::{MnemonicBuilder, coins_bip39::English};
use anyhow::{Context, Result};

use super::{
    ChainClient, TransactionReceipt,
    native::{self, CallContext, NativeContract},
};
use crate::{artifacts::Artifact, network::DEV_CHAIN_ID};

/// Mnemonic of the well-known development accounts.
pub const DEV_MNEMONIC: &str = "test test test test test test test test test test test junk";

/// Number of development accounts derived from [`DEV_MNEMONIC`].
const DEV_ACCOUNTS: u32 = 10;

const TX_BASE_GAS: u64 = 21_000;
const CREATE_GAS: u64 = 32_000;

#[derive(Default)]
struct DevState {
    block_number: u64,
    nonces: HashMap<Address, u64>,
    contracts: HashMap<Address, Box<dyn NativeContract>>,
    receipts: HashMap<B256, TransactionReceipt>,
}

impl DevState {
    fn next_nonce(&mut self, sender: Address) -> u64 {
        let nonce = self.nonces.entry(sender).or_default();
        let current = *nonce;
        *nonce += 1;
        current
    }

    fn mine_receipt(
        &mut self,
        sender: Address,
        nonce: u64,
        to: Option<Address>,
        contract_address: Option<Address>,
        gas_used: u64,
    ) -> B256 {
        self.block_number += 1;

        let mut preimage = Vec::with_capacity(60);
        preimage.extend_from_slice(sender.as_slice());
        preimage.extend_from_slice(&nonce.to_be_bytes());
        preimage.extend_from_slice(&self.block_number.to_be_bytes());
        let hash = keccak256(&preimage);

        self.receipts.insert(
            hash,
            TransactionReceipt {
                transaction_hash: hash,
                block_number: self.block_number,
                from: sender,
                to,
                contract_address,
                gas_used,
                success: true,
            },
        );
        hash
    }
}

/// Intrinsic gas of a transaction carrying `data`.
fn intrinsic_gas(data: &[u8], create: bool) -> u64 {
    let data_gas: u64 = data.iter().map(|b| if *b == 0 { 4 } else { 16 }).sum();
    TX_BASE_GAS + data_gas + if create { CREATE_GAS } else { 0 }
}

/// A simulated chain living in the current process.
///
/// Contracts run as native implementations selected by contract name. An
/// artifact's bytecode only feeds the gas estimate and is never executed.
pub struct DevChain {
    chain_id: u64,
    accounts: Vec<Address>,
    sender: Address,
    state: Mutex<DevState>,
}

impl fmt::Debug for DevChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevChain")
            .field("chain_id", &self.chain_id)
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}

impl DevChain {
    /// Create a fresh chain with the default chain id.
    pub fn new() -> Result<Self> {
        Self::with_chain_id(DEV_CHAIN_ID)
    }

    /// Create a fresh chain with a specific chain id.
    pub fn with_chain_id(chain_id: u64) -> Result<Self> {
        let accounts = (0..DEV_ACCOUNTS)
            .map(|index| {
                MnemonicBuilder::<English>::default()
                    .phrase(DEV_MNEMONIC)
                    .index(index)?
                    .build()
                    .map(|signer| signer.address())
            })
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to derive development accounts")?;

        Ok(Self {
            chain_id,
            sender: accounts[0],
            accounts,
            state: Mutex::new(DevState::default()),
        })
    }

    /// Send from the account at `index` instead of the first one.
    pub fn with_sender_index(mut self, index: usize) -> Result<Self> {
        self.sender = *self.accounts.get(index).with_context(|| {
            format!(
                "Account index {} out of range, the development chain has {} accounts",
                index,
                self.accounts.len()
            )
        })?;
        Ok(self)
    }

    /// The development accounts.
    pub fn accounts(&self) -> &[Address] {
        &self.accounts
    }

    fn state(&self) -> Result<MutexGuard<'_, DevState>> {
        self.state
            .lock()
            .map_err(|_| anyhow::anyhow!("Development chain state is poisoned"))
    }

    fn deploy_now(&self, artifact: &Artifact, constructor_args: &[u8]) -> Result<B256> {
        if !artifact.bytecode.is_empty() {
            tracing::debug!(
                contract = %artifact.contract_name,
                bytecode_len = artifact.bytecode.len(),
                "Running the native implementation instead of the artifact bytecode"
            );
        }
        let contract =
            native::instantiate(&artifact.contract_name, self.sender, constructor_args)?;

        let mut state = self.state()?;
        let nonce = state.next_nonce(self.sender);
        let address = self.sender.create(nonce);
        state.contracts.insert(address, contract);

        let gas_used = intrinsic_gas(&artifact.bytecode, true)
            + intrinsic_gas(constructor_args, false)
            - TX_BASE_GAS;
        let hash = state.mine_receipt(self.sender, nonce, None, Some(address), gas_used);

        tracing::debug!(
            contract = %artifact.contract_name,
            %address,
            block = state.block_number,
            "Contract deployed on the in-process chain"
        );
        Ok(hash)
    }

    fn transact_now(&self, to: Address, data: &[u8]) -> Result<B256> {
        let mut state = self.state()?;
        let ctx = CallContext {
            sender: self.sender,
            mutable: true,
        };
        state
            .contracts
            .get_mut(&to)
            .with_context(|| format!("No contract at {}", to))?
            .execute(ctx, data)?;

        let nonce = state.next_nonce(self.sender);
        Ok(state.mine_receipt(self.sender, nonce, Some(to), None, intrinsic_gas(data, false)))
    }

    fn call_now(&self, to: Address, data: &[u8]) -> Result<Bytes> {
        let mut state = self.state()?;
        let ctx = CallContext {
            sender: self.sender,
            mutable: false,
        };
        let output = state
            .contracts
            .get_mut(&to)
            .with_context(|| format!("No contract at {}", to))?
            .execute(ctx, data)?;
        Ok(Bytes::from(output))
    }
}

impl ChainClient for DevChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn sender(&self) -> Address {
        self.sender
    }

    fn block_number(&self) -> impl Future<Output = Result<u64>> + Send {
        ready(self.state().map(|state| state.block_number))
    }

    fn deploy(
        &self,
        artifact: &Artifact,
        constructor_args: Bytes,
    ) -> impl Future<Output = Result<B256>> + Send {
        ready(self.deploy_now(artifact, &constructor_args))
    }

    fn send_transaction(
        &self,
        to: Address,
        data: Bytes,
    ) -> impl Future<Output = Result<B256>> + Send {
        ready(self.transact_now(to, &data))
    }

    fn call(&self, to: Address, data: Bytes) -> impl Future<Output = Result<Bytes>> + Send {
        ready(self.call_now(to, &data))
    }

    fn transaction_receipt(
        &self,
        hash: B256,
    ) -> impl Future<Output = Result<Option<TransactionReceipt>>> + Send {
        ready(self.state().map(|state| state.receipts.get(&hash).cloned()))
    }

    fn has_code(&self, address: Address) -> impl Future<Output = Result<bool>> + Send {
        ready(self.state().map(|state| state.contracts.contains_key(&address)))
    }

    fn mine(&self, blocks: u64) -> impl Future<Output = Result<()>> + Send {
        ready(self.state().map(|mut state| {
            state.block_number = state.block_number.saturating_add(blocks);
        }))
    }
}
