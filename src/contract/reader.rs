// src/contract/reader.rs
//! Batched contract reads

use alloy_primitives::{Address, Bytes};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::abi::{seconds, IStakingPool};
use crate::config::StakingConfig;
use crate::contract::types::*;
use crate::error::{ReadError, RpcError};
use crate::rpc::{BatchCall, JsonRpcClient};

/// Anything that can produce a contract snapshot for an account
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshot(&self, account: Address) -> Result<RawContractSnapshot, ReadError>;
}

/// Issues the eight snapshot reads as one JSON-RPC batch
pub struct ContractReader {
    rpc: Arc<JsonRpcClient>,
    contract: Address,
}

impl ContractReader {
    pub fn new(config: &StakingConfig) -> Self {
        Self::with_client(Arc::new(JsonRpcClient::new(config.rpc_url.clone())), config.staking_contract)
    }

    /// Share an existing RPC client (the action gateway uses the same one)
    pub fn with_client(rpc: Arc<JsonRpcClient>, contract: Address) -> Self {
        Self { rpc, contract }
    }

    fn batch_calls(&self, account: &Address) -> Vec<BatchCall> {
        let user = *account;
        let calls: [Vec<u8>; 8] = [
            IStakingPool::userInfoCall { user }.abi_encode(),
            IStakingPool::getPendingRewardsCall { user }.abi_encode(),
            IStakingPool::getTimeUntilUnlockCall { user }.abi_encode(),
            IStakingPool::getUserDetailsCall { user }.abi_encode(),
            IStakingPool::totalStakedCall {}.abi_encode(),
            IStakingPool::currentRewardRateCall {}.abi_encode(),
            IStakingPool::initialAprCall {}.abi_encode(),
            IStakingPool::minLockDurationCall {}.abi_encode(),
        ];

        calls
            .into_iter()
            .map(|data| BatchCall {
                method: "eth_call",
                params: json!([
                    {
                        "to": self.contract.to_string(),
                        "data": Bytes::from(data),
                    },
                    "latest"
                ]),
            })
            .collect()
    }
}

#[async_trait]
impl SnapshotSource for ContractReader {
    async fn fetch_snapshot(&self, account: Address) -> Result<RawContractSnapshot, ReadError> {
        if self.contract.is_zero() {
            return Err(ReadError::ContractAddressInvalid);
        }

        let calls = self.batch_calls(&account);
        let results = self.rpc.batch(&calls).await.map_err(|e| {
            log::warn!("Snapshot batch for {} failed: {}", account, e);
            ReadError::from(e)
        })?;

        decode_snapshot(account, results, Utc::now().timestamp())
    }
}

/// Decode one batch slot as the return value of `C`
fn decode_return<C: SolCall>(result: Result<Value, RpcError>) -> Result<C::Return, ReadError> {
    let value = result.map_err(|e| match e {
        RpcError::Transport(msg) => ReadError::NetworkUnavailable(msg),
        other => ReadError::MalformedResponse(format!("{}: {}", C::SIGNATURE, other)),
    })?;
    let data: Bytes = serde_json::from_value(value)
        .map_err(|e| ReadError::MalformedResponse(format!("{}: {}", C::SIGNATURE, e)))?;
    C::abi_decode_returns(&data, false)
        .map_err(|e| ReadError::MalformedResponse(format!("{}: {}", C::SIGNATURE, e)))
}

/// Turn the ordered batch results into a snapshot
fn decode_snapshot(
    account: Address,
    results: Vec<Result<Value, RpcError>>,
    taken_at: i64,
) -> Result<RawContractSnapshot, ReadError> {
    let [info, pending, until_unlock, details, total, rate, apr, min_lock]: [Result<Value, RpcError>; 8] =
        results.try_into().map_err(|rest: Vec<_>| {
            ReadError::MalformedResponse(format!("expected 8 results, got {}", rest.len()))
        })?;

    let info = decode_return::<IStakingPool::userInfoCall>(info)?;
    let pending = decode_return::<IStakingPool::getPendingRewardsCall>(pending)?;
    let until_unlock = decode_return::<IStakingPool::getTimeUntilUnlockCall>(until_unlock)?;
    let details = decode_return::<IStakingPool::getUserDetailsCall>(details)?;
    let total = decode_return::<IStakingPool::totalStakedCall>(total)?;
    let rate = decode_return::<IStakingPool::currentRewardRateCall>(rate)?;
    let apr = decode_return::<IStakingPool::initialAprCall>(apr)?;
    let min_lock = decode_return::<IStakingPool::minLockDurationCall>(min_lock)?;

    Ok(RawContractSnapshot {
        account,
        staked_amount: info.stakedAmount,
        last_stake_timestamp: seconds(info.lastStakeTimestamp),
        reward_debt: info.rewardDebt,
        pending_rewards: pending.pending,
        seconds_until_unlock: seconds(until_unlock.secondsLeft),
        can_withdraw: details.canWithdraw,
        total_staked: total.total,
        current_reward_rate: rate.rate,
        initial_apr: apr.apr,
        min_lock_duration: seconds(min_lock.duration),
        taken_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    fn word_hex(values: &[u64]) -> Value {
        let mut bytes = Vec::new();
        for v in values {
            bytes.extend_from_slice(&U256::from(*v).to_be_bytes::<32>());
        }
        Value::String(format!("0x{}", hex::encode(bytes)))
    }

    fn happy_results() -> Vec<Result<Value, RpcError>> {
        vec![
            Ok(word_hex(&[10_000, 1_700_000_000, 42])),
            Ok(word_hex(&[137])),
            Ok(word_hex(&[3600])),
            Ok(word_hex(&[10_000, 1_700_000_000, 137, 3600, 0])),
            Ok(word_hex(&[250_000])),
            Ok(word_hex(&[500])),
            Ok(word_hex(&[1200])),
            Ok(word_hex(&[604_800])),
        ]
    }

    #[test]
    fn test_decode_snapshot() {
        let account = Address::repeat_byte(0xaa);
        let snapshot = decode_snapshot(account, happy_results(), 1_700_000_100).unwrap();
        assert_eq!(snapshot.staked_amount, U256::from(10_000u64));
        assert_eq!(snapshot.last_stake_timestamp, 1_700_000_000);
        assert_eq!(snapshot.reward_debt, U256::from(42u64));
        assert_eq!(snapshot.pending_rewards, U256::from(137u64));
        assert_eq!(snapshot.seconds_until_unlock, 3600);
        assert!(!snapshot.can_withdraw);
        assert_eq!(snapshot.total_staked, U256::from(250_000u64));
        assert_eq!(snapshot.current_reward_rate, U256::from(500u64));
        assert_eq!(snapshot.initial_apr, U256::from(1200u64));
        assert_eq!(snapshot.min_lock_duration, 604_800);
        assert_eq!(snapshot.unlock_timestamp(1_700_000_100), Some(1_700_003_700));
        assert_eq!(snapshot.unlock_timestamp(1_700_003_700), None);
    }

    #[test]
    fn test_reverted_call_is_malformed() {
        let mut results = happy_results();
        results[5] = Err(RpcError::Rpc {
            code: 3,
            message: "execution reverted".to_string(),
            data: None,
        });
        let err = decode_snapshot(Address::ZERO, results, 0).unwrap_err();
        assert!(matches!(err, ReadError::MalformedResponse(msg) if msg.contains("currentRewardRate")));
    }

    #[test]
    fn test_short_return_is_malformed() {
        let mut results = happy_results();
        results[3] = Ok(word_hex(&[1, 2]));
        assert!(matches!(
            decode_snapshot(Address::ZERO, results, 0),
            Err(ReadError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_contract_rejected_before_any_call() {
        // Unroutable endpoint: reaching the network would surface NetworkUnavailable instead
        let rpc = Arc::new(JsonRpcClient::new("http://127.0.0.1:9"));
        let reader = ContractReader::with_client(rpc, Address::ZERO);
        let err = reader.fetch_snapshot(Address::repeat_byte(1)).await.unwrap_err();
        assert_eq!(err, ReadError::ContractAddressInvalid);
    }

    #[test]
    fn test_batch_targets_contract() {
        let contract = Address::repeat_byte(0x5f);
        let reader = ContractReader::with_client(Arc::new(JsonRpcClient::new("http://127.0.0.1:9")), contract);
        let calls = reader.batch_calls(&Address::repeat_byte(0xaa));
        assert_eq!(calls.len(), 8);
        assert!(calls.iter().all(|c| c.method == "eth_call"));
        assert_eq!(calls[0].params[0]["to"], json!(contract.to_string()));
        let data = calls[0].params[0]["data"].as_str().unwrap();
        assert!(data.starts_with(&format!("0x{}", hex::encode(IStakingPool::userInfoCall::SELECTOR))));
        // selector + one address word
        assert_eq!(calls[0].params[0]["data"].as_str().unwrap().len(), 2 + 2 * (4 + 32));
        // selector only
        assert_eq!(calls[4].params[0]["data"].as_str().unwrap().len(), 2 + 2 * 4);
    }
}
