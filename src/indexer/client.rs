// src/indexer/client.rs
//! GraphQL client for the staking subgraph

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::types::{ContractStatsData, ProtocolStats, RecentActivity, UserHistory, UserStakes};
use crate::config::StakingConfig;
use crate::error::QueryError;

pub const GET_USER_STAKES: &str = r#"
query GetUserStakes($userAddress: String!) {
  user(id: $userAddress) {
    id
    totalStaked
    totalWithdrawn
    totalRewardsClaimed
    stakeCount
    firstStakeTimestamp
    lastActivityTimestamp
  }
  stakePositions(
    where: { user: $userAddress, isActive: true }
    orderBy: stakeTimestamp
    orderDirection: desc
  ) {
    id
    user { id }
    amount
    stakeTimestamp
    unlockTimestamp
    rewardRate
    lastRewardCalculation
    accumulatedRewards
    isActive
    emergencyWithdrawn
    withdrawnAt
  }
}
"#;

pub const GET_CONTRACT_STATS: &str = r#"
query GetContractStats($contractAddress: String!) {
  stakingContract(id: $contractAddress) {
    id
    totalStaked
    currentRewardRate
    totalUsers
    totalStakePositions
    initialApr
    minLockDuration
    emergencyWithdrawPenalty
    isPaused
    totalRewardsPaid
    totalEmergencyWithdrawals
    totalEmergencyPenalties
    aprReductionPerThousand
    initializationTimestamp
    lastUpdateTimestamp
  }
}
"#;

pub const GET_USER_HISTORY: &str = r#"
query GetUserHistory($userAddress: Bytes!) {
  stakedEvents(where: { user: $userAddress }, orderBy: blockTimestamp, orderDirection: desc) {
    id
    amount
    timestamp
    currentRewardRate
    newTotalStaked
    blockNumber
    transactionHash
  }
  withdrawnEvents(where: { user: $userAddress }, orderBy: blockTimestamp, orderDirection: desc) {
    id
    amount
    timestamp
    rewardsAccrued
    newTotalStaked
    blockNumber
    transactionHash
  }
  rewardsClaimedEvents(where: { user: $userAddress }, orderBy: blockTimestamp, orderDirection: desc) {
    id
    amount
    timestamp
    newPendingRewards
    blockNumber
    transactionHash
  }
}
"#;

pub const GET_RECENT_ACTIVITY: &str = r#"
query GetRecentActivity($limit: Int = 10) {
  stakedEvents(first: $limit, orderBy: blockTimestamp, orderDirection: desc) {
    id
    user
    amount
    timestamp
    newTotalStaked
    currentRewardRate
    blockNumber
    transactionHash
  }
  withdrawnEvents(first: $limit, orderBy: blockTimestamp, orderDirection: desc) {
    id
    user
    amount
    timestamp
    newTotalStaked
    rewardsAccrued
    blockNumber
    transactionHash
  }
}
"#;

/// Read side of the indexer, keyed by lower-cased hex addresses
#[async_trait]
pub trait IndexerSource: Send + Sync {
    async fn fetch_user_stakes(&self, account_key: &str) -> Result<UserStakes, QueryError>;

    /// `None` when the contract has not been indexed yet
    async fn fetch_protocol_stats(&self, contract_key: &str) -> Result<Option<ProtocolStats>, QueryError>;

    /// Full event history of one account. Fetched on demand, never polled.
    async fn fetch_user_history(&self, account_key: &str) -> Result<UserHistory, QueryError>;

    /// Latest `limit` stakes and withdrawals across every account
    async fn fetch_recent_activity(&self, limit: u32) -> Result<RecentActivity, QueryError>;
}

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorMessage {
    message: String,
}

pub struct IndexedQueryClient {
    client: Client,
    url: String,
}

impl IndexedQueryClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    pub fn from_config(config: &StakingConfig) -> Self {
        Self::new(config.indexer_url.clone())
    }

    async fn query<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T, QueryError> {
        let response = self.client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&GraphQlRequest { query, variables })
            .send()
            .await
            .map_err(|e| QueryError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(QueryError::Status(response.status().as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| QueryError::Decode(e.to_string()))?;

        into_data(body)
    }
}

#[async_trait]
impl IndexerSource for IndexedQueryClient {
    async fn fetch_user_stakes(&self, account_key: &str) -> Result<UserStakes, QueryError> {
        self.query(GET_USER_STAKES, json!({ "userAddress": account_key })).await
    }

    async fn fetch_protocol_stats(&self, contract_key: &str) -> Result<Option<ProtocolStats>, QueryError> {
        let data: ContractStatsData = self
            .query(GET_CONTRACT_STATS, json!({ "contractAddress": contract_key }))
            .await?;
        Ok(data.staking_contract)
    }

    async fn fetch_user_history(&self, account_key: &str) -> Result<UserHistory, QueryError> {
        self.query(GET_USER_HISTORY, json!({ "userAddress": account_key })).await
    }

    async fn fetch_recent_activity(&self, limit: u32) -> Result<RecentActivity, QueryError> {
        self.query(GET_RECENT_ACTIVITY, json!({ "limit": limit })).await
    }
}

/// Unwrap a GraphQL envelope. Any entry in `errors` fails the whole query.
fn into_data<T: DeserializeOwned>(body: Value) -> Result<T, QueryError> {
    let response: GraphQlResponse<T> =
        serde_json::from_value(body).map_err(|e| QueryError::Decode(e.to_string()))?;

    if !response.errors.is_empty() {
        let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
        return Err(QueryError::GraphQl(messages.join("; ")));
    }

    response
        .data
        .ok_or_else(|| QueryError::Decode("response has no data".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_array_is_a_failure() {
        let body = json!({
            "data": null,
            "errors": [{ "message": "indexing_error" }, { "message": "store unavailable" }]
        });
        let err = into_data::<UserStakes>(body).unwrap_err();
        assert_eq!(err, QueryError::GraphQl("indexing_error; store unavailable".to_string()));
    }

    #[test]
    fn test_unknown_user_is_empty() {
        let body = json!({ "data": { "user": null, "stakePositions": [] } });
        let stakes: UserStakes = into_data(body).unwrap();
        assert_eq!(stakes, UserStakes::default());
    }

    #[test]
    fn test_missing_data_is_decode_error() {
        assert!(matches!(into_data::<UserStakes>(json!({})), Err(QueryError::Decode(_))));
    }

    #[test]
    fn test_stats_not_indexed() {
        let data: ContractStatsData = into_data(json!({ "data": { "stakingContract": null } })).unwrap();
        assert!(data.staking_contract.is_none());
    }

    #[test]
    fn test_history_without_events_is_empty() {
        let body = json!({
            "data": { "stakedEvents": [], "withdrawnEvents": [], "rewardsClaimedEvents": [] }
        });
        let history: UserHistory = into_data(body).unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_indexer() {
        let client = IndexedQueryClient::new("http://127.0.0.1:9/subgraphs/name/staking");
        let err = client.fetch_user_stakes("0xaa").await.unwrap_err();
        assert!(matches!(err, QueryError::Unreachable(_)));
        let err = client.fetch_user_history("0xaa").await.unwrap_err();
        assert!(matches!(err, QueryError::Unreachable(_)));
    }
}
