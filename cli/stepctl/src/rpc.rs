//! JSON-RPC client for the coordinator contract.
//!
//! Implements the executor's [`CoordinatorView`] and [`Ledger`] capabilities
//! over a node's JSON-RPC 2.0 endpoint. Transactions are signed by the node
//! (`eth_sendTransaction`); the sender must be an account the node manages.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stepchain_abi::{hex, revert_reason, Address, Bytes, ICoordinator, SolCall, B256, U256};
use stepchain_reconcile::{
    CoordinatorView, ExecuteCall, Ledger, PendingHandle, ReadError, Receipt, Rejection,
    SubmissionError,
};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ExecutorSettings;
use crate::error::CliError;

/// Send errors that no retry can fix.
const FATAL_MARKERS: &[&str] = &[
    "unknown account",
    "unauthorized",
    "authentication needed",
    "account is locked",
    "no signer",
];

/// JSON-RPC failures.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{message} (code {code})")]
    Server {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl RpcError {
    /// The revert message, when the node reports a revert.
    pub fn revert_reason(&self) -> Option<String> {
        let Self::Server { message, data, .. } = self else {
            return None;
        };

        let encoded = match data {
            Some(Value::String(s)) => Some(s.as_str()),
            Some(Value::Object(map)) => map.get("data").and_then(Value::as_str),
            _ => None,
        };
        if let Some(reason) = encoded
            .and_then(|s| hex::decode(s.trim_start_matches("0x")).ok())
            .and_then(|bytes| revert_reason(&bytes))
        {
            return Some(reason);
        }

        message
            .to_lowercase()
            .contains("revert")
            .then(|| message.clone())
    }
}

#[derive(Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ErrorObject>,
}

#[derive(Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Minimal JSON-RPC 2.0 transport.
#[derive(Debug)]
pub struct JsonRpc {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpc {
    pub fn new(url: &str) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "JSON-RPC request");

        let response: Response = self
            .client
            .post(&self.url)
            .json(&Request {
                jsonrpc: "2.0",
                id,
                method,
                params,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(RpcError::Server {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }

        serde_json::from_value(response.result.unwrap_or(Value::Null))
            .map_err(|e| RpcError::Decode(format!("{method}: {e}")))
    }
}

fn hex_data(bytes: &[u8]) -> String {
    hex::encode_prefixed(bytes)
}

fn quantity(value: u64) -> String {
    format!("{value:#x}")
}

fn parse_quantity(s: &str) -> Result<u64, RpcError> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| RpcError::Decode(format!("invalid quantity {s:?}: {e}")))
}

fn parse_data(s: &str) -> Result<Vec<u8>, RpcError> {
    hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| RpcError::Decode(format!("invalid data: {e}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    block_number: String,
    gas_used: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    contract_address: Option<Address>,
}

#[derive(Debug, Deserialize)]
struct RpcTransaction {
    from: Address,
    #[serde(default)]
    to: Option<Address>,
    input: String,
    gas: String,
}

/// Send errors mapped onto the executor's taxonomy.
fn classify(err: RpcError) -> SubmissionError {
    if let Some(reason) = err.revert_reason() {
        return SubmissionError::Rejected(Rejection::reverted(reason));
    }
    match &err {
        RpcError::Server { message, .. } => {
            let lower = message.to_lowercase();
            if FATAL_MARKERS.iter().any(|marker| lower.contains(marker)) {
                SubmissionError::Fatal(message.clone())
            } else {
                SubmissionError::Dispatch(err.to_string())
            }
        }
        RpcError::Transport(_) | RpcError::Decode(_) => SubmissionError::Dispatch(err.to_string()),
    }
}

/// Coordinator contract reached through a node.
pub struct CoordinatorClient {
    rpc: JsonRpc,
    coordinator: Address,
    from: Address,
    gas_padding: u64,
    poll: Duration,
    timeout: Duration,
}

impl CoordinatorClient {
    pub fn new(
        rpc: JsonRpc,
        coordinator: Address,
        from: Address,
        settings: &ExecutorSettings,
    ) -> Self {
        Self {
            rpc,
            coordinator,
            from,
            gas_padding: settings.gas_padding,
            poll: settings.receipt_poll(),
            timeout: settings.inclusion_timeout(),
        }
    }

    /// Like [`CoordinatorClient::new`], defaulting the sender to the node's
    /// first account.
    pub async fn connect(
        rpc: JsonRpc,
        coordinator: Address,
        from: Option<Address>,
        settings: &ExecutorSettings,
    ) -> Result<Self, CliError> {
        let from = match from {
            Some(from) => from,
            None => first_account(&rpc).await?,
        };
        debug!(%coordinator, %from, "Connected to coordinator");
        Ok(Self::new(rpc, coordinator, from, settings))
    }

    pub fn coordinator(&self) -> Address {
        self.coordinator
    }

    pub fn from(&self) -> Address {
        self.from
    }

    async fn estimate_gas(&self, to: Option<Address>, data: &[u8]) -> Result<u64, RpcError> {
        let mut tx = json!({ "from": self.from, "data": hex_data(data) });
        if let Some(to) = to {
            tx["to"] = json!(to);
        }
        let estimate: String = self.rpc.request("eth_estimateGas", json!([tx])).await?;
        parse_quantity(&estimate)
    }

    async fn send(
        &self,
        to: Option<Address>,
        data: &[u8],
        gas: u64,
    ) -> Result<PendingHandle, SubmissionError> {
        let mut tx = json!({
            "from": self.from,
            "data": hex_data(data),
            "gas": quantity(gas),
        });
        if let Some(to) = to {
            tx["to"] = json!(to);
        }

        let tx_hash: B256 = self
            .rpc
            .request("eth_sendTransaction", json!([tx]))
            .await
            .map_err(classify)?;
        info!(tx = %tx_hash, gas, "Transaction submitted");
        Ok(PendingHandle { tx_hash })
    }

    /// Estimates, pads and sends; used for one-off transactions.
    async fn send_estimated(
        &self,
        to: Option<Address>,
        data: &[u8],
    ) -> Result<PendingHandle, SubmissionError> {
        let estimate = self.estimate_gas(to, data).await.map_err(classify)?;
        self.send(to, data, estimate.saturating_add(self.gas_padding))
            .await
    }

    /// Deploys a contract from `init_code` and waits for its receipt.
    pub async fn deploy(&self, init_code: &[u8]) -> Result<Receipt, CliError> {
        let pending = self
            .send_estimated(None, init_code)
            .await
            .map_err(|e| anyhow::anyhow!("Deployment was not accepted: {e}"))?;
        let receipt = self
            .await_finality(&pending)
            .await
            .map_err(|e| anyhow::anyhow!("Deployment transaction {pending} failed: {e}"))?;
        Ok(receipt)
    }

    /// Recovers the revert reason of a failed transaction by replaying it
    /// against the state before its block.
    async fn replay(&self, receipt: &RpcReceipt) -> String {
        let tx: RpcTransaction = match self
            .rpc
            .request::<Option<RpcTransaction>>(
                "eth_getTransactionByHash",
                json!([receipt.transaction_hash]),
            )
            .await
        {
            Ok(Some(tx)) => tx,
            Ok(None) => return "reverted (transaction not found for replay)".to_string(),
            Err(e) => return format!("reverted (replay failed: {e})"),
        };

        let block = parse_quantity(&receipt.block_number)
            .map(|n| quantity(n.saturating_sub(1)))
            .unwrap_or_else(|_| "latest".to_string());
        let mut call = json!({ "from": tx.from, "data": tx.input, "gas": tx.gas });
        if let Some(to) = tx.to {
            call["to"] = json!(to);
        }

        match self
            .rpc
            .request::<String>("eth_call", json!([call, block]))
            .await
        {
            Ok(_) => "reverted without a reason".to_string(),
            Err(e) => e.revert_reason().unwrap_or_else(|| e.to_string()),
        }
    }
}

async fn first_account(rpc: &JsonRpc) -> Result<Address, CliError> {
    let accounts: Vec<Address> = rpc.request("eth_accounts", json!([])).await?;
    accounts.first().copied().ok_or(CliError::NoAccount)
}

#[async_trait]
impl CoordinatorView for CoordinatorClient {
    async fn current_expected_fingerprint(&self) -> Result<B256, ReadError> {
        let data = ICoordinator::nextTransactionHashCall {}.abi_encode();
        let call = json!({ "from": self.from, "to": self.coordinator, "data": hex_data(&data) });

        let result: String = self
            .rpc
            .request("eth_call", json!([call, "latest"]))
            .await
            .map_err(|e| ReadError(e.to_string()))?;
        let bytes = parse_data(&result).map_err(|e| ReadError(e.to_string()))?;
        let word = bytes
            .get(..32)
            .ok_or_else(|| ReadError(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(B256::from_slice(word))
    }

    async fn execute(&self, call: &ExecuteCall) -> Result<PendingHandle, SubmissionError> {
        let data = ICoordinator::executeTransactionCall {
            expectedHash: call.expected,
            isCreate: call.is_create,
            target: call.target,
            gasLimit: U256::from(call.resource_limit),
            data: Bytes::copy_from_slice(&call.payload),
        }
        .abi_encode();
        self.send(Some(self.coordinator), &data, call.padded_limit)
            .await
    }

    async fn approve(&self, bundle_hash: &B256) -> Result<PendingHandle, SubmissionError> {
        let data = ICoordinator::approveTransactionBundleCall {
            bundleHash: *bundle_hash,
        }
        .abi_encode();
        self.send_estimated(Some(self.coordinator), &data).await
    }
}

#[async_trait]
impl Ledger for CoordinatorClient {
    async fn await_finality(&self, pending: &PendingHandle) -> Result<Receipt, Rejection> {
        let started = Instant::now();
        loop {
            match self
                .rpc
                .request::<Option<RpcReceipt>>(
                    "eth_getTransactionReceipt",
                    json!([pending.tx_hash]),
                )
                .await
            {
                Ok(Some(receipt)) => {
                    if receipt.status.as_deref() == Some("0x0") {
                        let reason = self.replay(&receipt).await;
                        warn!(tx = %pending, reason = %reason, "Transaction reverted");
                        return Err(Rejection::reverted(reason));
                    }
                    let quantities = parse_quantity(&receipt.block_number)
                        .and_then(|block| Ok((block, parse_quantity(&receipt.gas_used)?)));
                    let (block_number, gas_used) = match quantities {
                        Ok(quantities) => quantities,
                        Err(e) => {
                            warn!(tx = %pending, error = %e, "Receipt has malformed fields");
                            return Err(Rejection::InvalidReceipt(e.to_string()));
                        }
                    };
                    return Ok(Receipt {
                        tx_hash: receipt.transaction_hash,
                        block_number,
                        gas_used,
                        contract_address: receipt.contract_address,
                    });
                }
                Ok(None) => {}
                Err(e) => debug!(tx = %pending, error = %e, "Receipt poll failed"),
            }

            let waited = started.elapsed();
            if waited >= self.timeout {
                return Err(Rejection::Timeout { waited });
            }
            tokio::time::sleep(self.poll).await;
        }
    }
}
