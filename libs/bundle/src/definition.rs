//! Deployment definitions and their on-disk formats.
//!
//! A definition is an ordered list of actions. On disk it is either a JSON
//! array of actions (or an object with an `actions` array) or a TOML document
//! with `[[actions]]` tables:
//!
//! ```toml
//! [[actions]]
//! action = "deploy"
//! contract = "Token"
//! name = "token"
//! arguments = ["Example", "EXM"]
//! gasLimit = 3000000
//!
//! [[actions]]
//! action = "call"
//! target = "token"
//! function = "mint(address,uint256)"
//! arguments = ["0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed", "1000"]
//! gasLimit = 120000
//! ```
//!
//! Fields are optional at parse time; the resolver reports missing ones with
//! the index of the action, before any ledger interaction.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::DefinitionError;

/// Ordered list of intended actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentDefinition {
    pub actions: Vec<Action>,
}

/// One intended action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    Deploy(DeployAction),
    Call(CallAction),
}

/// Create a new contract instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployAction {
    /// Artifact (contract) name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,

    /// Alias later actions use to refer to the new instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Constructor arguments.
    #[serde(default)]
    pub arguments: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
}

/// Call a function on an existing instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAction {
    /// Literal `0x` address or an alias from an earlier deploy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Full signature (`mint(address,uint256)`) or a bare name looked up in the
    /// aliased contract's ABI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,

    #[serde(default)]
    pub arguments: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
}

impl Action {
    /// A deploy action for `contract`.
    pub fn deploy(contract: impl Into<String>, gas_limit: u64) -> Self {
        Self::Deploy(DeployAction {
            contract: Some(contract.into()),
            name: None,
            arguments: Vec::new(),
            gas_limit: Some(gas_limit),
        })
    }

    /// A call action on `target`.
    pub fn call(target: impl Into<String>, function: impl Into<String>, gas_limit: u64) -> Self {
        Self::Call(CallAction {
            target: Some(target.into()),
            function: Some(function.into()),
            arguments: Vec::new(),
            gas_limit: Some(gas_limit),
        })
    }

    /// Sets the alias of a deploy action. No-op for calls.
    #[must_use]
    pub fn named(mut self, alias: impl Into<String>) -> Self {
        if let Self::Deploy(deploy) = &mut self {
            deploy.name = Some(alias.into());
        }
        self
    }

    #[must_use]
    pub fn with_arguments(mut self, args: Vec<Value>) -> Self {
        match &mut self {
            Self::Deploy(deploy) => deploy.arguments = args,
            Self::Call(call) => call.arguments = args,
        }
        self
    }

    pub fn arguments(&self) -> &[Value] {
        match self {
            Self::Deploy(deploy) => &deploy.arguments,
            Self::Call(call) => &call.arguments,
        }
    }

    pub fn gas_limit(&self) -> Option<u64> {
        match self {
            Self::Deploy(deploy) => deploy.gas_limit,
            Self::Call(call) => call.gas_limit,
        }
    }
}

impl DeploymentDefinition {
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Loads a definition, choosing the format by extension (`.toml` or JSON).
    pub fn load(path: &Path) -> Result<Self, DefinitionError> {
        let contents = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                DefinitionError::NotFound(path.to_path_buf())
            } else {
                DefinitionError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let parsed = if is_toml {
            Self::from_toml_str(&contents)
        } else {
            Self::from_json_str(&contents)
        };

        parsed.map_err(|message| DefinitionError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parses a JSON array of actions, or an object with an `actions` array.
    pub fn from_json_str(contents: &str) -> Result<Self, String> {
        let value: Value = serde_json::from_str(contents).map_err(|e| e.to_string())?;
        Self::from_value(value)
    }

    /// Parses a TOML document with `[[actions]]` tables.
    pub fn from_toml_str(contents: &str) -> Result<Self, String> {
        let value: toml::Value = toml::from_str(contents).map_err(|e| e.to_string())?;
        let json = serde_json::to_value(value).map_err(|e| e.to_string())?;
        Self::from_value(json)
    }

    fn from_value(value: Value) -> Result<Self, String> {
        let actions = match value {
            Value::Array(actions) => actions,
            Value::Object(mut map) => match map.remove("actions") {
                Some(Value::Array(actions)) => actions,
                Some(_) => return Err("'actions' must be an array".to_string()),
                None => Vec::new(),
            },
            _ => return Err("definition must be an array of actions".to_string()),
        };

        actions
            .into_iter()
            .enumerate()
            .map(|(i, action)| {
                serde_json::from_value(action).map_err(|e| format!("action #{}: {e}", i + 1))
            })
            .collect::<Result<Vec<Action>, _>>()
            .map(Self::new)
    }
}

/// `sha256:<hex>` over the canonical JSON form of the definition.
///
/// Independent of source formatting and key order, so reviewers can compare
/// definitions that were written differently.
pub fn definition_hash(definition: &DeploymentDefinition) -> String {
    // serde_json maps are ordered, so to_value + to_vec yields sorted keys.
    let value = serde_json::to_value(definition).unwrap_or(Value::Null);
    let canonical = serde_json::to_vec(&value).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    format!("sha256:{:x}", hasher.finalize())
}
