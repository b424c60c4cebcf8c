// src/indexer/types.rs
//! Indexer entities. Big integers arrive as decimal strings.

use alloy_primitives::{Address, B256, U256};
use serde::{de, Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

/// Per-account totals kept by the indexer (`User` entity)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAggregate {
    pub id: String,
    #[serde(default, deserialize_with = "big_int")]
    pub total_staked: U256,
    #[serde(default, deserialize_with = "big_int")]
    pub total_withdrawn: U256,
    #[serde(default, deserialize_with = "big_int")]
    pub total_rewards_claimed: U256,
    #[serde(default, deserialize_with = "small_int")]
    pub stake_count: u64,
    #[serde(default, deserialize_with = "small_int")]
    pub first_stake_timestamp: u64,
    #[serde(default, deserialize_with = "small_int")]
    pub last_activity_timestamp: u64,
}

/// One stake as indexed (`StakePosition` entity). Once inactive it stays inactive.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakePositionRecord {
    pub id: String,
    #[serde(default, rename = "user", deserialize_with = "owner")]
    pub owner: Option<Address>,
    #[serde(deserialize_with = "big_int")]
    pub amount: U256,
    #[serde(deserialize_with = "small_int")]
    pub stake_timestamp: u64,
    #[serde(deserialize_with = "small_int")]
    pub unlock_timestamp: u64,
    /// Basis points
    #[serde(rename = "rewardRate", deserialize_with = "big_int")]
    pub reward_rate_bps: U256,
    #[serde(deserialize_with = "small_int")]
    pub last_reward_calculation: u64,
    #[serde(default, deserialize_with = "big_int")]
    pub accumulated_rewards: U256,
    // The positions query filters on isActive and does not select it back
    #[serde(default = "active")]
    pub is_active: bool,
    #[serde(default)]
    pub emergency_withdrawn: bool,
    #[serde(default, deserialize_with = "opt_small_int")]
    pub withdrawn_at: Option<u64>,
}

fn active() -> bool {
    true
}

impl StakePositionRecord {
    /// Unlock time on the signed clock the view uses, saturating
    pub fn unlock_at(&self) -> i64 {
        i64::try_from(self.unlock_timestamp).unwrap_or(i64::MAX)
    }
}

/// Contract-wide figures (`StakingContract` entity)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolStats {
    pub id: String,
    #[serde(default, deserialize_with = "big_int")]
    pub total_staked: U256,
    #[serde(default, deserialize_with = "big_int")]
    pub current_reward_rate: U256,
    #[serde(default, deserialize_with = "small_int")]
    pub total_users: u64,
    #[serde(default, deserialize_with = "small_int")]
    pub total_stake_positions: u64,
    #[serde(default, deserialize_with = "big_int")]
    pub initial_apr: U256,
    #[serde(default, deserialize_with = "small_int")]
    pub min_lock_duration: u64,
    /// Basis points, when the subgraph exposes it
    #[serde(default, deserialize_with = "opt_small_int")]
    pub emergency_withdraw_penalty: Option<u64>,
    #[serde(default)]
    pub is_paused: bool,
    #[serde(default, deserialize_with = "big_int")]
    pub total_rewards_paid: U256,
    #[serde(default, deserialize_with = "opt_small_int")]
    pub last_update_timestamp: Option<u64>,
    #[serde(default, deserialize_with = "opt_small_int")]
    pub initialization_timestamp: Option<u64>,
    #[serde(default, deserialize_with = "small_int")]
    pub total_emergency_withdrawals: u64,
    #[serde(default, deserialize_with = "big_int")]
    pub total_emergency_penalties: U256,
    /// Rate reduction per thousand tokens staked
    #[serde(default, deserialize_with = "big_int")]
    pub apr_reduction_per_thousand: U256,
}

/// Result of the user stakes query
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStakes {
    #[serde(default)]
    pub user: Option<UserAggregate>,
    #[serde(default, rename = "stakePositions")]
    pub positions: Vec<StakePositionRecord>,
}

impl UserStakes {
    pub fn active_positions(&self) -> impl Iterator<Item = &StakePositionRecord> {
        self.positions.iter().filter(|p| p.is_active)
    }
}

/// Indexed `Staked` event
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakedRecord {
    pub id: String,
    /// Only selected by the activity feed
    #[serde(default, deserialize_with = "owner")]
    pub user: Option<Address>,
    #[serde(deserialize_with = "big_int")]
    pub amount: U256,
    #[serde(deserialize_with = "small_int")]
    pub timestamp: u64,
    #[serde(default, deserialize_with = "big_int")]
    pub new_total_staked: U256,
    #[serde(default, deserialize_with = "big_int")]
    pub current_reward_rate: U256,
    #[serde(default, deserialize_with = "small_int")]
    pub block_number: u64,
    pub transaction_hash: B256,
}

/// Indexed `Withdrawn` event
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawnRecord {
    pub id: String,
    #[serde(default, deserialize_with = "owner")]
    pub user: Option<Address>,
    #[serde(deserialize_with = "big_int")]
    pub amount: U256,
    #[serde(deserialize_with = "small_int")]
    pub timestamp: u64,
    #[serde(default, deserialize_with = "big_int")]
    pub new_total_staked: U256,
    #[serde(default, deserialize_with = "big_int")]
    pub rewards_accrued: U256,
    #[serde(default, deserialize_with = "small_int")]
    pub block_number: u64,
    pub transaction_hash: B256,
}

/// Indexed `RewardsClaimed` event
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardsClaimedRecord {
    pub id: String,
    #[serde(deserialize_with = "big_int")]
    pub amount: U256,
    #[serde(deserialize_with = "small_int")]
    pub timestamp: u64,
    #[serde(default, deserialize_with = "big_int")]
    pub new_pending_rewards: U256,
    #[serde(default, deserialize_with = "small_int")]
    pub block_number: u64,
    pub transaction_hash: B256,
}

/// Everything one account did, newest first within each list
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserHistory {
    #[serde(default, rename = "stakedEvents")]
    pub staked: Vec<StakedRecord>,
    #[serde(default, rename = "withdrawnEvents")]
    pub withdrawn: Vec<WithdrawnRecord>,
    #[serde(default, rename = "rewardsClaimedEvents")]
    pub rewards_claimed: Vec<RewardsClaimedRecord>,
}

impl UserHistory {
    pub fn is_empty(&self) -> bool {
        self.staked.is_empty() && self.withdrawn.is_empty() && self.rewards_claimed.is_empty()
    }

    /// Sum of every claimed reward in the history
    pub fn total_claimed(&self) -> U256 {
        self.rewards_claimed
            .iter()
            .fold(U256::ZERO, |acc, r| acc.saturating_add(r.amount))
    }
}

/// Latest stakes and withdrawals across all accounts
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RecentActivity {
    #[serde(default, rename = "stakedEvents")]
    pub staked: Vec<StakedRecord>,
    #[serde(default, rename = "withdrawnEvents")]
    pub withdrawn: Vec<WithdrawnRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ContractStatsData {
    #[serde(default)]
    pub staking_contract: Option<ProtocolStats>,
}

fn parse_big(s: &str) -> Result<U256, String> {
    U256::from_str(s.trim()).map_err(|e| format!("invalid integer '{}': {}", s, e))
}

fn big_int<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => parse_big(&s).map_err(de::Error::custom),
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| de::Error::custom(format!("invalid integer {}", n))),
        Value::Null => Ok(U256::ZERO),
        other => Err(de::Error::custom(format!("expected integer, got {}", other))),
    }
}

fn small_int<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    opt_small_int(deserializer).map(Option::unwrap_or_default)
}

fn opt_small_int<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| de::Error::custom(format!("invalid integer '{}': {}", s, e))),
        Value::Number(n) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid integer {}", n))),
        Value::Null => Ok(None),
        other => Err(de::Error::custom(format!("expected integer, got {}", other))),
    }
}

/// `user` is either the account id string or a nested `{ id }` object
fn owner<'de, D>(deserializer: D) -> Result<Option<Address>, D::Error>
where
    D: Deserializer<'de>,
{
    let id = match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Object(map) => match map.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => return Ok(None),
        },
        _ => return Ok(None),
    };
    id.parse::<Address>()
        .map(Some)
        .map_err(|e| de::Error::custom(format!("invalid user '{}': {}", id, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_position_from_subgraph_json() {
        let record: StakePositionRecord = serde_json::from_value(json!({
            "id": "0xabc-1",
            "user": { "id": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa" },
            "amount": "10000000000000000000000",
            "stakeTimestamp": "1700000000",
            "unlockTimestamp": "1700604800",
            "rewardRate": "500",
            "lastRewardCalculation": "1700000000",
            "accumulatedRewards": "0",
            "emergencyWithdrawn": false
        }))
        .unwrap();

        assert_eq!(record.owner, Some(Address::repeat_byte(0xaa)));
        assert_eq!(record.amount, U256::from(10_000u64) * U256::from(10u64).pow(U256::from(18u64)));
        assert_eq!(record.reward_rate_bps, U256::from(500u64));
        assert_eq!(record.unlock_timestamp, 1_700_604_800);
        assert!(record.is_active);
        assert_eq!(record.withdrawn_at, None);
    }

    #[test]
    fn test_user_as_plain_string_and_missing() {
        let record: StakePositionRecord = serde_json::from_value(json!({
            "id": "p",
            "user": "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
            "amount": 5,
            "stakeTimestamp": 1,
            "unlockTimestamp": 2,
            "rewardRate": "400",
            "lastRewardCalculation": "1",
            "isActive": false,
            "withdrawnAt": "3"
        }))
        .unwrap();
        assert_eq!(record.owner, Some(Address::repeat_byte(0xbb)));
        assert!(!record.is_active);
        assert_eq!(record.withdrawn_at, Some(3));

        let stakes: UserStakes = serde_json::from_value(json!({
            "user": null,
            "stakePositions": [{
                "id": "q",
                "amount": "1",
                "stakeTimestamp": "1",
                "unlockTimestamp": "1",
                "rewardRate": "1",
                "lastRewardCalculation": "1"
            }]
        }))
        .unwrap();
        assert!(stakes.user.is_none());
        assert_eq!(stakes.positions[0].owner, None);
        assert_eq!(stakes.active_positions().count(), 1);
    }

    #[test]
    fn test_contract_stats() {
        let data: ContractStatsData = serde_json::from_value(json!({
            "stakingContract": {
                "id": "0x5f",
                "totalStaked": "250000",
                "currentRewardRate": "500",
                "totalUsers": "12",
                "totalStakePositions": "30",
                "initialApr": "1200",
                "minLockDuration": "604800",
                "emergencyWithdrawPenalty": "5000",
                "isPaused": true,
                "totalRewardsPaid": "77",
                "initializationTimestamp": "1699990000",
                "totalEmergencyWithdrawals": "2",
                "totalEmergencyPenalties": "500",
                "aprReductionPerThousand": "10"
            }
        }))
        .unwrap();
        let stats = data.staking_contract.unwrap();
        assert_eq!(stats.total_users, 12);
        assert_eq!(stats.emergency_withdraw_penalty, Some(5_000));
        assert!(stats.is_paused);
        assert_eq!(stats.last_update_timestamp, None);
        assert_eq!(stats.initialization_timestamp, Some(1_699_990_000));
        assert_eq!(stats.total_emergency_withdrawals, 2);
        assert_eq!(stats.total_emergency_penalties, U256::from(500u64));
        assert_eq!(stats.apr_reduction_per_thousand, U256::from(10u64));
    }

    #[test]
    fn test_user_history() {
        let history: UserHistory = serde_json::from_value(json!({
            "stakedEvents": [{
                "id": "0x11-0",
                "amount": "1000",
                "timestamp": "1700000000",
                "currentRewardRate": "500",
                "newTotalStaked": "51000",
                "blockNumber": "16",
                "transactionHash": format!("0x{}", "11".repeat(32))
            }],
            "withdrawnEvents": [],
            "rewardsClaimedEvents": [
                {
                    "id": "0x22-1",
                    "amount": "7",
                    "timestamp": "1700086400",
                    "newPendingRewards": "0",
                    "blockNumber": "20",
                    "transactionHash": format!("0x{}", "22".repeat(32))
                },
                {
                    "id": "0x33-0",
                    "amount": "5",
                    "timestamp": "1700090000",
                    "newPendingRewards": "0",
                    "blockNumber": "21",
                    "transactionHash": format!("0x{}", "33".repeat(32))
                }
            ]
        }))
        .unwrap();

        assert!(!history.is_empty());
        assert_eq!(history.staked[0].user, None);
        assert_eq!(history.staked[0].block_number, 16);
        assert_eq!(history.staked[0].transaction_hash, B256::repeat_byte(0x11));
        assert_eq!(history.total_claimed(), U256::from(12u64));
        assert!(UserHistory::default().is_empty());
    }

    #[test]
    fn test_recent_activity_carries_user() {
        let activity: RecentActivity = serde_json::from_value(json!({
            "stakedEvents": [{
                "id": "0x44-0",
                "user": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                "amount": "1",
                "timestamp": "1",
                "newTotalStaked": "1",
                "currentRewardRate": "500",
                "blockNumber": "1",
                "transactionHash": format!("0x{}", "44".repeat(32))
            }]
        }))
        .unwrap();
        assert_eq!(activity.staked[0].user, Some(Address::repeat_byte(0xaa)));
        assert!(activity.withdrawn.is_empty());
    }

    #[test]
    fn test_garbage_amount_rejected() {
        let result: Result<StakePositionRecord, _> = serde_json::from_value(json!({
            "id": "p",
            "amount": "ten",
            "stakeTimestamp": "1",
            "unlockTimestamp": "1",
            "rewardRate": "1",
            "lastRewardCalculation": "1"
        }));
        assert!(result.is_err());
    }
}
