//! Native stand-ins for the project's contracts on the in-process chain.
//!
//! These mirror the external surface of the Solidity contracts closely enough
//! for the deploy scripts and the test suite; they are not a full EVM.

use std::collections::HashMap;

use alloy_core::primitives::{Address, I256, U256};
use alloy_sol_types::{SolInterface, SolValue};
use anyhow::{Context, Result};

use crate::abi::{
    IFundMe::IFundMeCalls,
    IMockV3Aggregator::IMockV3AggregatorCalls,
    ISimpleStorage::ISimpleStorageCalls,
};

/// Execution context of a call on the in-process chain.
#[derive(Debug, Clone, Copy)]
pub struct CallContext {
    pub sender: Address,
    /// Whether the call may mutate state.
    pub mutable: bool,
}

/// A contract the in-process chain can execute.
pub trait NativeContract: Send {
    /// Execute ABI-encoded calldata, returning ABI-encoded output.
    fn execute(&mut self, ctx: CallContext, calldata: &[u8]) -> Result<Vec<u8>>;
}

/// Instantiate the native implementation of `contract_name`.
pub fn instantiate(
    contract_name: &str,
    deployer: Address,
    constructor_args: &[u8],
) -> Result<Box<dyn NativeContract>> {
    let contract: Box<dyn NativeContract> = match contract_name {
        "SimpleStorage" => Box::new(SimpleStorage::default()),
        "MockV3Aggregator" => {
            let (decimals, initial_answer) =
                <(U256, I256)>::abi_decode_params(constructor_args)
                    .context("Invalid MockV3Aggregator constructor arguments")?;
            let decimals = u8::try_from(decimals)
                .map_err(|_| anyhow::anyhow!("MockV3Aggregator decimals {} exceed uint8", decimals))?;
            Box::new(MockV3Aggregator::new(decimals, initial_answer))
        }
        "FundMe" => {
            let price_feed = Address::abi_decode(constructor_args)
                .context("Invalid FundMe constructor arguments")?;
            Box::new(FundMe {
                owner: deployer,
                price_feed,
            })
        }
        other => anyhow::bail!("The in-process chain has no implementation of {}", other),
    };
    Ok(contract)
}

fn ensure_mutable(ctx: CallContext, method: &str) -> Result<()> {
    if !ctx.mutable {
        anyhow::bail!("{} modifies state and cannot be called read-only", method);
    }
    Ok(())
}

#[derive(Debug, Default)]
struct SimpleStorage {
    favorite_number: U256,
    name_to_favorite_number: HashMap<String, U256>,
}

impl NativeContract for SimpleStorage {
    fn execute(&mut self, ctx: CallContext, calldata: &[u8]) -> Result<Vec<u8>> {
        let call = ISimpleStorageCalls::abi_decode(calldata)
            .context("Unknown SimpleStorage call")?;

        match call {
            ISimpleStorageCalls::retrieve(_) => Ok(self.favorite_number.abi_encode()),
            ISimpleStorageCalls::store(call) => {
                ensure_mutable(ctx, "store")?;
                self.favorite_number = call.favoriteNumber;
                Ok(Vec::new())
            }
            ISimpleStorageCalls::addPerson(call) => {
                ensure_mutable(ctx, "addPerson")?;
                self.name_to_favorite_number
                    .insert(call.name, call.favoriteNumber);
                Ok(Vec::new())
            }
            ISimpleStorageCalls::nameToFavoriteNumber(call) => Ok(self
                .name_to_favorite_number
                .get(&call.name)
                .copied()
                .unwrap_or_default()
                .abi_encode()),
        }
    }
}

#[derive(Debug)]
struct MockV3Aggregator {
    decimals: u8,
    latest_answer: I256,
    latest_round: U256,
}

impl MockV3Aggregator {
    fn new(decimals: u8, initial_answer: I256) -> Self {
        Self {
            decimals,
            latest_answer: initial_answer,
            latest_round: U256::from(1),
        }
    }
}

impl NativeContract for MockV3Aggregator {
    fn execute(&mut self, ctx: CallContext, calldata: &[u8]) -> Result<Vec<u8>> {
        let call = IMockV3AggregatorCalls::abi_decode(calldata)
            .context("Unknown MockV3Aggregator call")?;

        match call {
            IMockV3AggregatorCalls::decimals(_) => Ok(U256::from(self.decimals).abi_encode()),
            IMockV3AggregatorCalls::version(_) => Ok(U256::ZERO.abi_encode()),
            IMockV3AggregatorCalls::latestAnswer(_) => Ok(self.latest_answer.abi_encode()),
            IMockV3AggregatorCalls::latestRound(_) => Ok(self.latest_round.abi_encode()),
            IMockV3AggregatorCalls::updateAnswer(call) => {
                ensure_mutable(ctx, "updateAnswer")?;
                self.latest_answer = call.answer;
                self.latest_round += U256::from(1);
                Ok(Vec::new())
            }
        }
    }
}

#[derive(Debug)]
struct FundMe {
    owner: Address,
    price_feed: Address,
}

impl NativeContract for FundMe {
    fn execute(&mut self, _ctx: CallContext, calldata: &[u8]) -> Result<Vec<u8>> {
        let call = IFundMeCalls::abi_decode(calldata).context("Unknown FundMe call")?;

        match call {
            IFundMeCalls::getPriceFeed(_) => Ok(self.price_feed.abi_encode()),
            IFundMeCalls::getOwner(_) => Ok(self.owner.abi_encode()),
        }
    }
}
