// src/rpc.rs
//! JSON-RPC 2.0 over HTTP

use alloy_primitives::{Address, Bytes, B256, U64};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::RpcError;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    id: Option<u64>,
    result: Option<Value>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    data: Option<Value>,
}

impl RpcResponse {
    fn into_result(self) -> Result<Value, RpcError> {
        if let Some(error) = self.error {
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
                data: error.data.map(|d| match d {
                    Value::String(s) => s,
                    other => other.to_string(),
                }),
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// Receipt fields the action gateway cares about
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub block_number: Option<U64>,
    /// 1 success, 0 reverted; absent on pre-Byzantium receipts
    pub status: Option<U64>,
}

impl TransactionReceipt {
    /// `None` when the receipt does not say
    pub fn succeeded(&self) -> Option<bool> {
        self.status.map(|status| status == U64::from(1u64))
    }

    pub fn block_number(&self) -> Option<u64> {
        self.block_number.and_then(|b| u64::try_from(b).ok())
    }
}

/// One call inside a JSON-RPC batch
#[derive(Debug, Clone)]
pub struct BatchCall {
    pub method: &'static str,
    pub params: Value,
}

/// Thin JSON-RPC 2.0 client over HTTP
pub struct JsonRpcClient {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a single request and return its `result`
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id(),
            method,
            params,
        };

        let response = self.client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RpcError::Transport(format!("HTTP {}", response.status())));
        }

        let rpc_response: RpcResponse = response
            .json()
            .await
            .map_err(|e| RpcError::Malformed(e.to_string()))?;

        rpc_response.into_result()
    }

    /// Send several requests in one HTTP round trip. Results come back in the
    /// order of `calls` regardless of the order the node answers in; a missing
    /// answer is reported per call.
    pub async fn batch(&self, calls: &[BatchCall]) -> Result<Vec<Result<Value, RpcError>>, RpcError> {
        let first_id = self.next_id.fetch_add(calls.len() as u64, Ordering::Relaxed);
        let requests: Vec<RpcRequest> = calls
            .iter()
            .enumerate()
            .map(|(i, call)| RpcRequest {
                jsonrpc: "2.0",
                id: first_id + i as u64,
                method: call.method,
                params: call.params.clone(),
            })
            .collect();

        let response = self.client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&requests)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RpcError::Transport(format!("HTTP {}", response.status())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RpcError::Malformed(e.to_string()))?;

        order_batch_responses(body, first_id, calls.len())
    }

    /// Replay a call as `from` at `block` and return the raw revert data, if any
    pub async fn replay_for_revert(
        &self,
        from: &Address,
        to: &Address,
        data: &[u8],
        block: u64,
    ) -> Option<Vec<u8>> {
        match self.request("eth_call", replay_params(from, to, data, block)).await {
            Ok(_) => None,
            Err(RpcError::Rpc { data: Some(data), .. }) => Bytes::from_str(&data).ok().map(|bytes| bytes.to_vec()),
            Err(_) => None,
        }
    }

    pub async fn get_transaction_receipt(&self, hash: &B256) -> Result<Option<TransactionReceipt>, RpcError> {
        let result = self
            .request("eth_getTransactionReceipt", json!([hash.to_string()]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        decode_result(result).map(Some)
    }

    /// Accounts exposed by the wallet provider
    pub async fn accounts(&self) -> Result<Vec<Address>, RpcError> {
        let result = self.request("eth_accounts", json!([])).await?;
        decode_result(result)
    }

    /// Hand an unsigned transaction to the wallet provider for signing and
    /// broadcast. Returns the transaction hash.
    pub async fn send_transaction(&self, from: &Address, to: &Address, data: &[u8]) -> Result<B256, RpcError> {
        let params = json!([{
            "from": from.to_string(),
            "to": to.to_string(),
            "data": Bytes::copy_from_slice(data),
        }]);
        let result = self.request("eth_sendTransaction", params).await?;
        decode_result(result)
    }
}

fn decode_result<T: DeserializeOwned>(result: Value) -> Result<T, RpcError> {
    serde_json::from_value(result).map_err(|e| RpcError::Malformed(e.to_string()))
}

fn replay_params(from: &Address, to: &Address, data: &[u8], block: u64) -> Value {
    json!([
        {
            "from": from.to_string(),
            "to": to.to_string(),
            "data": Bytes::copy_from_slice(data),
        },
        format!("0x{:x}", block)
    ])
}

/// Match batch answers back to request ids
fn order_batch_responses(
    body: Value,
    first_id: u64,
    count: usize,
) -> Result<Vec<Result<Value, RpcError>>, RpcError> {
    // Some nodes answer a whole batch with a single error object
    if let Some(obj) = body.as_object() {
        if obj.contains_key("error") {
            let single: RpcResponse = serde_json::from_value(body)
                .map_err(|e| RpcError::Malformed(e.to_string()))?;
            return Err(single.into_result().err().unwrap_or_else(|| {
                RpcError::Malformed("batch rejected".to_string())
            }));
        }
    }

    let responses: Vec<RpcResponse> = serde_json::from_value(body)
        .map_err(|e| RpcError::Malformed(e.to_string()))?;

    let mut slots: Vec<Option<Result<Value, RpcError>>> = (0..count).map(|_| None).collect();
    for response in responses {
        let Some(id) = response.id else { continue };
        if id < first_id {
            continue;
        }
        let index = (id - first_id) as usize;
        if index < count {
            slots[index] = Some(response.into_result());
        }
    }

    Ok(slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| Err(RpcError::Malformed("missing batch response".to_string()))))
        .collect())
}
