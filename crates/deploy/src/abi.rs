//! Solidity interfaces of the deployed contracts and constructor argument encoding.

use alloy_core::primitives::{Address, I256, U256};
use alloy_sol_types::{SolValue, sol};
use serde::{Deserialize, Serialize};

sol! {
    /// Minimal storage contract used by the interaction script and the test suite.
    interface ISimpleStorage {
        function retrieve() external view returns (uint256);
        function store(uint256 favoriteNumber) external;
        function addPerson(string memory name, uint256 favoriteNumber) external;
        function nameToFavoriteNumber(string memory name) external view returns (uint256);
    }

    /// Chainlink-style aggregator stand-in deployed on development chains.
    interface IMockV3Aggregator {
        function decimals() external view returns (uint8);
        function version() external view returns (uint256);
        function latestAnswer() external view returns (int256);
        function latestRound() external view returns (uint256);
        function updateAnswer(int256 answer) external;
    }

    /// Read surface of the FundMe contract needed by the deploy scripts.
    interface IFundMe {
        function getPriceFeed() external view returns (address);
        function getOwner() external view returns (address);
    }
}

/// A single constructor argument.
///
/// Only static ABI types are supported: every argument encodes to exactly one
/// 32-byte word, so the encoded arguments are the concatenation of the words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ConstructorArg {
    Address(Address),
    Uint(U256),
    Int(I256),
    Bool(bool),
}

impl ConstructorArg {
    /// ABI-encode this argument as a single word.
    pub fn abi_encode(&self) -> Vec<u8> {
        match self {
            Self::Address(address) => address.abi_encode(),
            Self::Uint(value) => value.abi_encode(),
            Self::Int(value) => value.abi_encode(),
            Self::Bool(value) => value.abi_encode(),
        }
    }

    /// The address held by this argument, if any.
    pub fn as_address(&self) -> Option<Address> {
        match self {
            Self::Address(address) => Some(*address),
            _ => None,
        }
    }
}

impl From<Address> for ConstructorArg {
    fn from(address: Address) -> Self {
        Self::Address(address)
    }
}

impl From<U256> for ConstructorArg {
    fn from(value: U256) -> Self {
        Self::Uint(value)
    }
}

impl From<I256> for ConstructorArg {
    fn from(value: I256) -> Self {
        Self::Int(value)
    }
}

/// Encode a full constructor argument list.
pub fn encode_constructor_args(args: &[ConstructorArg]) -> Vec<u8> {
    args.iter().flat_map(ConstructorArg::abi_encode).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_args_are_word_aligned() {
        let feed = Address::repeat_byte(0x11);
        let args = vec![
            ConstructorArg::from(feed),
            ConstructorArg::from(U256::from(8)),
            ConstructorArg::Int(I256::MINUS_ONE),
        ];

        let encoded = encode_constructor_args(&args);
        assert_eq!(encoded.len(), 96);
        assert_eq!(&encoded[12..32], feed.as_slice());
        assert_eq!(encoded[63], 8);
        assert!(encoded[64..].iter().all(|b| *b == 0xff));
    }

    #[test]
    fn test_constructor_arg_serde_shape() {
        let arg = ConstructorArg::Bool(true);
        let json = serde_json::to_value(&arg).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "bool", "value": true }));
    }
}
