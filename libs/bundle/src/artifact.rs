//! Compiled contract artifacts.
//!
//! Deploy actions name a contract; the artifact supplies its creation bytecode
//! and ABI. Artifacts use the Hardhat JSON layout:
//! `{ "contractName": ..., "abi": [...], "bytecode": "0x..." }`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use stepchain_abi::{hex, AbiError, DynSolType, Function, JsonAbi, Param, Specifier};
use tracing::debug;

use crate::{ArtifactError, MalformedKind};

/// Compiled contract: creation code plus its JSON ABI.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub contract_name: String,
    pub bytecode: Vec<u8>,
    pub abi: JsonAbi,
}

/// Where the resolver looks up artifacts by contract name.
pub trait ArtifactSource {
    fn artifact(&self, name: &str) -> Result<Artifact, ArtifactError>;
}

impl ArtifactSource for HashMap<String, Artifact> {
    fn artifact(&self, name: &str) -> Result<Artifact, ArtifactError> {
        self.get(name)
            .cloned()
            .ok_or_else(|| ArtifactError::NotFound(name.to_string()))
    }
}

impl ArtifactSource for BTreeMap<String, Artifact> {
    fn artifact(&self, name: &str) -> Result<Artifact, ArtifactError> {
        self.get(name)
            .cloned()
            .ok_or_else(|| ArtifactError::NotFound(name.to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HardhatArtifact {
    #[serde(default)]
    contract_name: Option<String>,
    #[serde(default)]
    abi: JsonAbi,
    #[serde(default)]
    bytecode: String,
}

impl Artifact {
    pub fn new(contract_name: impl Into<String>, bytecode: Vec<u8>, abi: JsonAbi) -> Self {
        Self {
            contract_name: contract_name.into(),
            bytecode,
            abi,
        }
    }

    /// Parses a Hardhat artifact. `fallback_name` is used when the file has no
    /// `contractName`.
    pub fn from_hardhat_json(contents: &str, fallback_name: &str) -> Result<Self, ArtifactError> {
        let raw: HardhatArtifact =
            serde_json::from_str(contents).map_err(|e| ArtifactError::Parse {
                path: fallback_name.to_string(),
                message: e.to_string(),
            })?;
        let contract_name = raw
            .contract_name
            .unwrap_or_else(|| fallback_name.to_string());

        let bytecode = hex::decode(raw.bytecode.trim().trim_start_matches("0x")).map_err(|e| {
            ArtifactError::InvalidBytecode {
                name: contract_name.clone(),
                message: format!("bytecode is not plain hex (unlinked library?): {e}"),
            }
        })?;

        Ok(Self::new(contract_name, bytecode, raw.abi))
    }

    /// Constructor parameter types; empty when the ABI declares no constructor.
    pub fn constructor_types(&self) -> Result<Vec<DynSolType>, AbiError> {
        match &self.abi.constructor {
            Some(constructor) => param_types(&constructor.inputs),
            None => Ok(Vec::new()),
        }
    }

    /// Finds the unique function named `name`.
    pub fn function(&self, name: &str) -> Result<&Function, MalformedKind> {
        match self.abi.function(name).map(Vec::as_slice) {
            Some([only]) => Ok(only),
            Some([_, _, ..]) => Err(MalformedKind::AmbiguousFunction {
                contract: self.contract_name.clone(),
                function: name.to_string(),
            }),
            _ => Err(MalformedKind::UnknownFunction {
                contract: self.contract_name.clone(),
                function: name.to_string(),
            }),
        }
    }
}

/// Resolves ABI parameters, expanding tuple components.
pub(crate) fn param_types(params: &[Param]) -> Result<Vec<DynSolType>, AbiError> {
    params
        .iter()
        .map(|param| {
            param
                .resolve()
                .map_err(|e| AbiError::signature(param.selector_type(), e))
        })
        .collect()
}

/// Artifacts stored under a directory tree, located by `<Name>.json`.
#[derive(Debug, Clone)]
pub struct ArtifactDir {
    root: PathBuf,
}

impl ArtifactDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn find(&self, file_name: &str) -> Result<Vec<PathBuf>, ArtifactError> {
        let mut found = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let entries = std::fs::read_dir(&dir).map_err(|e| ArtifactError::Read {
                path: dir.display().to_string(),
                message: e.to_string(),
            })?;
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else if path.file_name().is_some_and(|n| n == file_name) {
                    found.push(path);
                }
            }
        }

        found.sort();
        Ok(found)
    }
}

impl ArtifactSource for ArtifactDir {
    fn artifact(&self, name: &str) -> Result<Artifact, ArtifactError> {
        let matches = self.find(&format!("{name}.json"))?;
        let path = match matches.as_slice() {
            [] => return Err(ArtifactError::NotFound(name.to_string())),
            [only] => only,
            _ => {
                return Err(ArtifactError::Ambiguous {
                    name: name.to_string(),
                    paths: matches.iter().map(|p| p.display().to_string()).collect(),
                })
            }
        };

        debug!(contract = name, path = %path.display(), "Loading artifact");
        let contents = std::fs::read_to_string(path).map_err(|e| ArtifactError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        Artifact::from_hardhat_json(&contents, name).map_err(|e| match e {
            ArtifactError::Parse { message, .. } => ArtifactError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN_ARTIFACT: &str = r#"{
        "contractName": "Token",
        "abi": [
            {"type": "constructor", "inputs": [{"name": "name", "type": "string", "internalType": "string"}], "stateMutability": "nonpayable"},
            {"type": "function", "name": "mint", "inputs": [{"name": "to", "type": "address"}, {"name": "amount", "type": "uint256"}], "outputs": [], "stateMutability": "nonpayable"},
            {"type": "function", "name": "configure", "inputs": [{"name": "cfg", "type": "tuple", "components": [{"name": "enabled", "type": "bool"}, {"name": "decimals", "type": "uint8"}]}], "outputs": [], "stateMutability": "nonpayable"},
            {"type": "function", "name": "burn", "inputs": [{"name": "amount", "type": "uint256"}], "outputs": [], "stateMutability": "nonpayable"},
            {"type": "function", "name": "burn", "inputs": [{"name": "from", "type": "address"}, {"name": "amount", "type": "uint256"}], "outputs": [], "stateMutability": "nonpayable"},
            {"type": "event", "name": "Transfer", "inputs": [], "anonymous": false}
        ],
        "bytecode": "0x6080"
    }"#;

    #[test]
    fn test_parses_constructor_functions_and_bytecode() {
        let artifact = Artifact::from_hardhat_json(TOKEN_ARTIFACT, "Token").unwrap();
        assert_eq!(artifact.bytecode, vec![0x60, 0x80]);
        assert_eq!(artifact.constructor_types().unwrap(), vec![DynSolType::String]);
        assert_eq!(
            artifact.function("mint").unwrap().signature(),
            "mint(address,uint256)"
        );
        assert_eq!(
            artifact.function("configure").unwrap().signature(),
            "configure((bool,uint8))"
        );
    }

    #[test]
    fn test_missing_constructor_takes_no_arguments() {
        let json = r#"{"contractName": "Empty", "abi": [], "bytecode": "0x00"}"#;
        let artifact = Artifact::from_hardhat_json(json, "Empty").unwrap();
        assert!(artifact.constructor_types().unwrap().is_empty());
    }

    #[test]
    fn test_overloaded_and_missing_functions_are_reported() {
        let artifact = Artifact::from_hardhat_json(TOKEN_ARTIFACT, "Token").unwrap();
        assert!(matches!(
            artifact.function("burn"),
            Err(MalformedKind::AmbiguousFunction { .. })
        ));
        assert!(matches!(
            artifact.function("approve"),
            Err(MalformedKind::UnknownFunction { .. })
        ));
    }

    #[test]
    fn test_unlinked_bytecode_is_rejected() {
        let json = r#"{"contractName": "Lib", "abi": [], "bytecode": "0x60__$abc$__"}"#;
        assert!(matches!(
            Artifact::from_hardhat_json(json, "Lib"),
            Err(ArtifactError::InvalidBytecode { .. })
        ));
    }

    #[test]
    fn test_non_array_abi_is_a_parse_error() {
        let json = r#"{"contractName": "Bad", "abi": {"type": "function"}, "bytecode": "0x"}"#;
        assert!(matches!(
            Artifact::from_hardhat_json(json, "Bad"),
            Err(ArtifactError::Parse { .. })
        ));
    }

    #[test]
    fn test_artifact_dir_searches_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("contracts").join("Token.sol");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("Token.json"), TOKEN_ARTIFACT).unwrap();
        std::fs::write(nested.join("Token.dbg.json"), "{}").unwrap();

        let source = ArtifactDir::new(dir.path());
        let artifact = source.artifact("Token").unwrap();
        assert_eq!(artifact.contract_name, "Token");
        assert!(matches!(
            source.artifact("Missing"),
            Err(ArtifactError::NotFound(_))
        ));
    }
}
