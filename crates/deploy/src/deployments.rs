//! Deployment records.
//!
//! A record is written once its deployment transaction is confirmed. Records
//! are kept per network, in memory for the in-process chain and as
//! `<deployments>/<network>/<Contract>.json` otherwise.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use alloy_core::{
    json_abi::JsonAbi,
    primitives::{Address, B256},
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::abi::{ConstructorArg, encode_constructor_args};

/// Compute the fingerprint of a deployment.
///
/// SHA-256 over the creation bytecode followed by the encoded constructor
/// arguments, hex encoded. Two deployments with the same fingerprint run the
/// same code with the same arguments.
pub fn fingerprint(bytecode: &[u8], args: &[ConstructorArg]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytecode);
    hasher.update(encode_constructor_args(args));
    hex::encode(hasher.finalize())
}

/// A confirmed deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub contract_name: String,
    pub address: Address,
    pub abi: JsonAbi,
    pub args: Vec<ConstructorArg>,
    pub transaction_hash: B256,
    pub block_number: u64,
    pub gas_used: u64,
    pub fingerprint: String,
    pub deployed_at: DateTime<Utc>,
}

impl DeploymentRecord {
    /// Save this record to a file as formatted JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create deployments directory {}", parent.display())
            })?;
        }

        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize deployment record")?;
        std::fs::write(path, json).with_context(|| {
            format!("Failed to write deployment record to {}", path.display())
        })?;

        Ok(())
    }

    /// Load a record from a file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Deployment record does not exist: {}", path.display());
        }

        let content = std::fs::read_to_string(path).with_context(|| {
            format!("Failed to read deployment record from {}", path.display())
        })?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse deployment record {}", path.display()))
    }
}

/// Records of the deployments made on one network.
#[derive(Debug)]
pub struct DeploymentStore {
    network: String,
    /// `None` keeps records in memory only.
    dir: Option<PathBuf>,
    records: Mutex<BTreeMap<String, DeploymentRecord>>,
}

impl DeploymentStore {
    /// A store that lives only as long as the process.
    pub fn in_memory(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            dir: None,
            records: Mutex::new(BTreeMap::new()),
        }
    }

    /// A store backed by `<root>/<network>/`, loading the records already there.
    pub fn open(root: &Path, network: impl Into<String>) -> Result<Self> {
        let network = network.into();
        let dir = root.join(&network);

        let mut records = BTreeMap::new();
        if dir.exists() {
            let entries = std::fs::read_dir(&dir)
                .with_context(|| format!("Failed to list {}", dir.display()))?;
            for entry in entries {
                let path = entry?.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    let record = DeploymentRecord::load_from_file(&path)?;
                    records.insert(record.contract_name.clone(), record);
                }
            }
        }

        tracing::debug!(
            %network,
            path = %dir.display(),
            records = records.len(),
            "Opened deployment store"
        );

        Ok(Self {
            network,
            dir: Some(dir),
            records: Mutex::new(records),
        })
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    fn records(&self) -> Result<MutexGuard<'_, BTreeMap<String, DeploymentRecord>>> {
        self.records
            .lock()
            .map_err(|_| anyhow::anyhow!("Deployment store is poisoned"))
    }

    /// The most recent record for `contract_name`.
    pub fn get(&self, contract_name: &str) -> Result<Option<DeploymentRecord>> {
        Ok(self.records()?.get(contract_name).cloned())
    }

    /// Names of the recorded contracts.
    pub fn names(&self) -> Result<Vec<String>> {
        Ok(self.records()?.keys().cloned().collect())
    }

    /// Store a record, replacing any previous one for the same contract.
    pub fn insert(&self, record: DeploymentRecord) -> Result<()> {
        if let Some(dir) = &self.dir {
            record.save_to_file(&dir.join(format!("{}.json", record.contract_name)))?;
        }
        self.records()?.insert(record.contract_name.clone(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::U256;
    use tempdir::TempDir;

    fn record(name: &str, address: Address) -> DeploymentRecord {
        let args = vec![ConstructorArg::from(Address::repeat_byte(0x22))];
        DeploymentRecord {
            contract_name: name.to_string(),
            address,
            abi: JsonAbi::default(),
            fingerprint: fingerprint(&[0x60, 0x80], &args),
            args,
            transaction_hash: B256::repeat_byte(0x01),
            block_number: 1,
            gas_used: 21_000,
            deployed_at: Utc::now(),
        }
    }

    #[test]
    fn test_fingerprint_changes_with_args() {
        let code = [0x60, 0x80, 0x60, 0x40];
        let a = fingerprint(&code, &[ConstructorArg::from(U256::from(1))]);
        let b = fingerprint(&code, &[ConstructorArg::from(U256::from(2))]);

        assert_eq!(a, fingerprint(&code, &[ConstructorArg::from(U256::from(1))]));
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_in_memory_store_keeps_latest() {
        let store = DeploymentStore::in_memory("hardhat");
        store
            .insert(record("MockV3Aggregator", Address::repeat_byte(0x01)))
            .unwrap();
        store
            .insert(record("MockV3Aggregator", Address::repeat_byte(0x02)))
            .unwrap();

        let latest = store.get("MockV3Aggregator").unwrap().unwrap();
        assert_eq!(latest.address, Address::repeat_byte(0x02));
        assert!(store.get("FundMe").unwrap().is_none());
    }

    #[test]
    fn test_disk_store_reloads_records() {
        let dir = TempDir::new("fundme-deployments").unwrap();

        let store = DeploymentStore::open(dir.path(), "rinkeby").unwrap();
        let saved = record("FundMe", Address::repeat_byte(0x03));
        store.insert(saved.clone()).unwrap();
        assert!(dir.path().join("rinkeby").join("FundMe.json").exists());

        let reopened = DeploymentStore::open(dir.path(), "rinkeby").unwrap();
        assert_eq!(reopened.get("FundMe").unwrap(), Some(saved));
        assert_eq!(reopened.names().unwrap(), vec!["FundMe".to_string()]);

        let other = DeploymentStore::open(dir.path(), "kovan").unwrap();
        assert!(other.get("FundMe").unwrap().is_none());
    }
}
