//! Compiled contract artifacts.
//!
//! Artifacts are produced by the Solidity toolchain and read from
//! `<artifacts>/<ContractName>.json`.

use std::path::{Path, PathBuf};

use alloy_core::{json_abi::JsonAbi, primitives::Bytes};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Compiler metadata needed to verify a contract on a block explorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerInput {
    /// Full compiler version, e.g. `v0.8.7+commit.e28d00a7`.
    pub version: String,
    /// Standard JSON input the contract was compiled from.
    pub input: serde_json::Value,
}

/// A compiled contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub contract_name: String,
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub abi: JsonAbi,
    #[serde(default)]
    pub bytecode: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler: Option<CompilerInput>,
}

impl Artifact {
    /// An artifact without bytecode, enough for the in-process chain.
    pub fn named(contract_name: impl Into<String>) -> Self {
        Self {
            contract_name: contract_name.into(),
            source_name: None,
            abi: JsonAbi::default(),
            bytecode: Bytes::new(),
            compiler: None,
        }
    }

    /// Fully qualified name as block explorers expect it (`contracts/X.sol:X`).
    pub fn qualified_name(&self) -> String {
        match &self.source_name {
            Some(source) => format!("{}:{}", source, self.contract_name),
            None => self.contract_name.clone(),
        }
    }

    /// Load an artifact from a JSON file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", path.display()))
    }
}

/// Directory of compiled artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Load the artifact for a contract by name.
    ///
    /// A missing file yields a bytecode-less artifact, which only the
    /// in-process chain can deploy.
    pub fn get(&self, contract_name: &str) -> Result<Artifact> {
        let path = self.root.join(format!("{}.json", contract_name));
        if !path.exists() {
            tracing::debug!(
                contract = contract_name,
                path = %path.display(),
                "No compiled artifact found"
            );
            return Ok(Artifact::named(contract_name));
        }

        let artifact = Artifact::load_from_file(&path)?;
        if artifact.contract_name != contract_name {
            anyhow::bail!(
                "Artifact {} declares contract {}",
                path.display(),
                artifact.contract_name
            );
        }
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_store_reads_artifact() {
        let dir = TempDir::new("fundme-artifacts").unwrap();
        std::fs::write(
            dir.path().join("SimpleStorage.json"),
            r#"{
                "contractName": "SimpleStorage",
                "sourceName": "contracts/SimpleStorage.sol",
                "abi": [],
                "bytecode": "0x6080"
            }"#,
        )
        .unwrap();

        let store = ArtifactStore::new(dir.path());
        let artifact = store.get("SimpleStorage").unwrap();
        assert_eq!(artifact.bytecode.as_ref(), &[0x60, 0x80]);
        assert_eq!(
            artifact.qualified_name(),
            "contracts/SimpleStorage.sol:SimpleStorage"
        );
        let missing = store.get("FundMe").unwrap();
        assert_eq!(missing.contract_name, "FundMe");
        assert!(missing.bytecode.is_empty());

        std::fs::write(
            dir.path().join("Lottery.json"),
            r#"{ "contractName": "Raffle", "bytecode": "0x00" }"#,
        )
        .unwrap();
        assert!(store.get("Lottery").is_err());
    }
}
