//! Deployment definition → raw operations.
//!
//! A single left-to-right pass. Aliases introduced by `deploy` actions map to
//! placeholder addresses that later `call` targets and `address` arguments may
//! reference. No ledger I/O happens here; only referential integrity of names
//! is checked.
//!
//! Placeholders are the CREATE2 address the coordinator gives the instance:
//! `create2(coordinator, bytes32(action_index), init_code)`.

use std::collections::{BTreeMap, HashMap};

use stepchain_abi::{coerce, AbiError, Address, DynSolType, DynSolValue, Function, U256};
use tracing::debug;

use crate::artifact::param_types;
use crate::{
    Action, Artifact, ArtifactSource, CallAction, DeployAction, DeploymentDefinition,
    MalformedDefinition, MalformedKind, RawOperation,
};

/// Alias entry: placeholder address plus the contract deployed there.
#[derive(Debug, Clone)]
struct AliasEntry {
    address: Address,
    contract: String,
}

/// Resolves `definition` into raw operations for `coordinator`.
pub fn resolve(
    definition: &DeploymentDefinition,
    coordinator: &Address,
    artifacts: &dyn ArtifactSource,
) -> Result<Vec<RawOperation>, MalformedDefinition> {
    let mut resolver = Resolver {
        coordinator: *coordinator,
        artifacts,
        aliases: BTreeMap::new(),
        cache: HashMap::new(),
    };

    let mut operations = Vec::with_capacity(definition.len());
    for (index, action) in definition.actions.iter().enumerate() {
        let operation = match action {
            Action::Deploy(deploy) => resolver.deploy(index, deploy),
            Action::Call(call) => resolver.call(call),
        }
        .map_err(|kind| MalformedDefinition::new(index, kind))?;
        operations.push(operation);
    }

    debug!(
        operations = operations.len(),
        aliases = resolver.aliases.len(),
        "Resolved deployment definition"
    );
    Ok(operations)
}

/// Placeholder address of the instance created by the deploy at `index`.
pub fn alias_address(coordinator: &Address, index: usize, init_code: &[u8]) -> Address {
    let salt = U256::from(index as u64).to_be_bytes::<32>();
    coordinator.create2_from_code(salt, init_code)
}

struct Resolver<'a> {
    coordinator: Address,
    artifacts: &'a dyn ArtifactSource,
    aliases: BTreeMap<String, AliasEntry>,
    cache: HashMap<String, Artifact>,
}

impl Resolver<'_> {
    fn artifact(&mut self, contract: &str) -> Result<&Artifact, MalformedKind> {
        if !self.cache.contains_key(contract) {
            let artifact = self.artifacts.artifact(contract)?;
            self.cache.insert(contract.to_string(), artifact);
        }
        self.cache
            .get(contract)
            .ok_or_else(|| MalformedKind::Artifact(crate::ArtifactError::NotFound(contract.into())))
    }

    fn deploy(
        &mut self,
        index: usize,
        deploy: &DeployAction,
    ) -> Result<RawOperation, MalformedKind> {
        let contract = required_str(deploy.contract.as_deref(), "contract")?;
        let gas_limit = required_gas(deploy.gas_limit)?;

        if let Some(alias) = deploy.name.as_deref() {
            validate_alias(alias)?;
            if self.aliases.contains_key(alias) {
                return Err(MalformedKind::DuplicateAlias(alias.to_string()));
            }
        }

        let artifact = self.artifact(contract)?.clone();
        if artifact.bytecode.is_empty() {
            return Err(crate::ArtifactError::InvalidBytecode {
                name: artifact.contract_name.clone(),
                message: "contract is abstract or an interface".to_string(),
            }
            .into());
        }

        let types = artifact
            .constructor_types()
            .map_err(MalformedKind::Signature)?;
        let args = self.coerce_all(&types, &deploy.arguments)?;
        let mut init_code = artifact.bytecode.clone();
        init_code.extend(DynSolValue::Tuple(args).abi_encode_params());

        if let Some(alias) = deploy.name.as_deref() {
            let address = alias_address(&self.coordinator, index, &init_code);
            debug!(alias, %address, contract, "Registered alias");
            self.aliases.insert(
                alias.to_string(),
                AliasEntry {
                    address,
                    contract: contract.to_string(),
                },
            );
        }

        Ok(RawOperation::create(init_code, gas_limit))
    }

    fn call(&mut self, call: &CallAction) -> Result<RawOperation, MalformedKind> {
        let target = required_str(call.target.as_deref(), "target")?;
        let function = required_str(call.function.as_deref(), "function")?;
        let gas_limit = required_gas(call.gas_limit)?;

        let (address, contract) = if is_hex_literal(target) {
            let address = target
                .parse::<Address>()
                .map_err(|e| MalformedKind::InvalidTarget {
                    target: target.to_string(),
                    reason: e.to_string(),
                })?;
            (address, None)
        } else {
            let entry = self
                .aliases
                .get(target)
                .ok_or_else(|| MalformedKind::UnknownAlias(target.to_string()))?;
            (entry.address, Some(entry.contract.clone()))
        };

        let signature = if function.contains('(') {
            Function::parse(function)
                .map_err(|e| MalformedKind::Signature(AbiError::signature(function, e)))?
        } else {
            let contract =
                contract.ok_or_else(|| MalformedKind::BareFunctionName(function.to_string()))?;
            self.artifact(&contract)?.function(function)?.clone()
        };

        let types = param_types(&signature.inputs).map_err(MalformedKind::Signature)?;
        let args = self.coerce_all(&types, &call.arguments)?;
        let mut call_data = signature.selector().to_vec();
        call_data.extend(DynSolValue::Tuple(args).abi_encode_params());
        Ok(RawOperation::call(address, call_data, gas_limit))
    }

    fn coerce_all(
        &self,
        types: &[DynSolType],
        values: &[serde_json::Value],
    ) -> Result<Vec<DynSolValue>, MalformedKind> {
        if types.len() != values.len() {
            return Err(MalformedKind::ArgumentCount {
                expected: types.len(),
                actual: values.len(),
            });
        }

        let lookup = |name: &str| self.aliases.get(name).map(|entry| entry.address);
        types
            .iter()
            .zip(values)
            .enumerate()
            .map(|(position, (ty, value))| {
                coerce(ty, value, &lookup)
                    .map_err(|source| MalformedKind::Argument { position, source })
            })
            .collect()
    }
}

fn required_str<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, MalformedKind> {
    match value.map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(MalformedKind::MissingField(field)),
    }
}

fn required_gas(value: Option<u64>) -> Result<u64, MalformedKind> {
    match value {
        None => Err(MalformedKind::MissingField("gasLimit")),
        Some(0) => Err(MalformedKind::ZeroGasLimit),
        Some(gas) => Ok(gas),
    }
}

fn is_hex_literal(s: &str) -> bool {
    s.starts_with("0x") || s.starts_with("0X")
}

/// Aliases must not be mistaken for literal addresses.
fn validate_alias(alias: &str) -> Result<(), MalformedKind> {
    if alias.trim().is_empty() || alias.trim() != alias || is_hex_literal(alias) {
        return Err(MalformedKind::InvalidAlias(alias.to_string()));
    }
    Ok(())
}
