// src/events/types.rs
//! Staking contract events and their decoded payloads

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolEvent;
use serde::Deserialize;

use crate::abi::{seconds, IStakingPool};

/// Event kinds the subscriber tracks, one subscription each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Staked,
    Withdrawn,
    RewardsClaimed,
    EmergencyWithdrawn,
    RewardRateUpdated,
    StakingPaused,
    StakingUnpaused,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Staked,
        EventKind::Withdrawn,
        EventKind::RewardsClaimed,
        EventKind::EmergencyWithdrawn,
        EventKind::RewardRateUpdated,
        EventKind::StakingPaused,
        EventKind::StakingUnpaused,
    ];

    /// topic0 the node filters on
    pub fn topic(&self) -> B256 {
        match self {
            EventKind::Staked => IStakingPool::Staked::SIGNATURE_HASH,
            EventKind::Withdrawn => IStakingPool::Withdrawn::SIGNATURE_HASH,
            EventKind::RewardsClaimed => IStakingPool::RewardsClaimed::SIGNATURE_HASH,
            EventKind::EmergencyWithdrawn => IStakingPool::EmergencyWithdrawn::SIGNATURE_HASH,
            EventKind::RewardRateUpdated => IStakingPool::RewardRateUpdated::SIGNATURE_HASH,
            EventKind::StakingPaused => IStakingPool::StakingPaused::SIGNATURE_HASH,
            EventKind::StakingUnpaused => IStakingPool::StakingUnpaused::SIGNATURE_HASH,
        }
    }

    pub fn from_topic(topic: &B256) -> Option<Self> {
        EventKind::ALL.into_iter().find(|kind| kind.topic() == *topic)
    }
}

/// A log as delivered by `eth_subscribe("logs")`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawLog {
    pub topics: Vec<B256>,
    pub data: Bytes,
    /// Set when a reorg drops a previously delivered log
    #[serde(default)]
    pub removed: bool,
}

impl RawLog {
    pub fn from_json(value: &serde_json::Value) -> Result<Self, String> {
        RawLog::deserialize(value).map_err(|e| format!("Invalid log: {}", e))
    }

    fn decode<E: SolEvent>(&self) -> Result<E, String> {
        E::decode_raw_log(self.topics.iter().copied(), &self.data, true)
            .map_err(|e| format!("Failed to decode {}: {}", E::SIGNATURE, e))
    }
}

/// Decoded staking event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StakingEvent {
    Staked {
        user: Address,
        amount: U256,
        timestamp: u64,
        new_total_staked: U256,
        current_reward_rate: U256,
    },
    Withdrawn {
        user: Address,
        amount: U256,
        timestamp: u64,
        new_total_staked: U256,
        current_reward_rate: U256,
        rewards_accrued: U256,
    },
    RewardsClaimed {
        user: Address,
        amount: U256,
        timestamp: u64,
        new_pending_rewards: U256,
        total_staked: U256,
    },
    EmergencyWithdrawn {
        user: Address,
        amount: U256,
        penalty: U256,
        timestamp: u64,
        new_total_staked: U256,
    },
    RewardRateUpdated {
        old_rate: U256,
        new_rate: U256,
        timestamp: u64,
        total_staked: U256,
    },
    StakingPaused {
        timestamp: u64,
    },
    StakingUnpaused {
        timestamp: u64,
    },
}

impl StakingEvent {
    pub fn decode(log: &RawLog) -> Result<Self, String> {
        let topic0 = log.topics.first().ok_or("Log has no topics")?;
        let kind = EventKind::from_topic(topic0).ok_or_else(|| format!("Unknown event topic {}", topic0))?;

        let event = match kind {
            EventKind::Staked => {
                let e: IStakingPool::Staked = log.decode()?;
                StakingEvent::Staked {
                    user: e.user,
                    amount: e.amount,
                    timestamp: seconds(e.timestamp),
                    new_total_staked: e.newTotalStaked,
                    current_reward_rate: e.currentRewardRate,
                }
            }
            EventKind::Withdrawn => {
                let e: IStakingPool::Withdrawn = log.decode()?;
                StakingEvent::Withdrawn {
                    user: e.user,
                    amount: e.amount,
                    timestamp: seconds(e.timestamp),
                    new_total_staked: e.newTotalStaked,
                    current_reward_rate: e.currentRewardRate,
                    rewards_accrued: e.rewardsAccrued,
                }
            }
            EventKind::RewardsClaimed => {
                let e: IStakingPool::RewardsClaimed = log.decode()?;
                StakingEvent::RewardsClaimed {
                    user: e.user,
                    amount: e.amount,
                    timestamp: seconds(e.timestamp),
                    new_pending_rewards: e.newPendingRewards,
                    total_staked: e.totalStaked,
                }
            }
            EventKind::EmergencyWithdrawn => {
                let e: IStakingPool::EmergencyWithdrawn = log.decode()?;
                StakingEvent::EmergencyWithdrawn {
                    user: e.user,
                    amount: e.amount,
                    penalty: e.penalty,
                    timestamp: seconds(e.timestamp),
                    new_total_staked: e.newTotalStaked,
                }
            }
            EventKind::RewardRateUpdated => {
                let e: IStakingPool::RewardRateUpdated = log.decode()?;
                StakingEvent::RewardRateUpdated {
                    old_rate: e.oldRate,
                    new_rate: e.newRate,
                    timestamp: seconds(e.timestamp),
                    total_staked: e.totalStaked,
                }
            }
            EventKind::StakingPaused => {
                let e: IStakingPool::StakingPaused = log.decode()?;
                StakingEvent::StakingPaused { timestamp: seconds(e.timestamp) }
            }
            EventKind::StakingUnpaused => {
                let e: IStakingPool::StakingUnpaused = log.decode()?;
                StakingEvent::StakingUnpaused { timestamp: seconds(e.timestamp) }
            }
        };
        Ok(event)
    }

    /// Affected account, for events that carry one
    pub fn user(&self) -> Option<Address> {
        match self {
            StakingEvent::Staked { user, .. }
            | StakingEvent::Withdrawn { user, .. }
            | StakingEvent::RewardsClaimed { user, .. }
            | StakingEvent::EmergencyWithdrawn { user, .. } => Some(*user),
            _ => None,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_topics_are_distinct_and_reversible() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_topic(&kind.topic()), Some(kind));
        }
        let topics: std::collections::HashSet<B256> = EventKind::ALL.iter().map(|k| k.topic()).collect();
        assert_eq!(topics.len(), 7);
    }

    #[test]
    fn test_decode_staked() {
        let user = Address::repeat_byte(0xaa);
        let log = raw_log(EventKind::Staked, Some(user), &[1_000, 1_700_000_000, 51_000, 500]);
        let event = StakingEvent::decode(&log).unwrap();
        assert_eq!(
            event,
            StakingEvent::Staked {
                user,
                amount: U256::from(1_000u64),
                timestamp: 1_700_000_000,
                new_total_staked: U256::from(51_000u64),
                current_reward_rate: U256::from(500u64),
            }
        );
        assert_eq!(event.user(), Some(user));
    }

    #[test]
    fn test_decode_rate_update_and_pause() {
        let log = raw_log(EventKind::RewardRateUpdated, None, &[500, 450, 1_700_000_000, 90_000]);
        match StakingEvent::decode(&log).unwrap() {
            StakingEvent::RewardRateUpdated { new_rate, .. } => assert_eq!(new_rate, U256::from(450u64)),
            other => panic!("unexpected event {:?}", other),
        }

        let log = raw_log(EventKind::StakingPaused, None, &[1_700_000_000]);
        assert_eq!(
            StakingEvent::decode(&log).unwrap(),
            StakingEvent::StakingPaused { timestamp: 1_700_000_000 }
        );
    }

    #[test]
    fn test_decode_rejects_bad_logs() {
        let mut log = raw_log(EventKind::Withdrawn, None, &[1, 2, 3, 4, 5]);
        assert!(StakingEvent::decode(&log).is_err(), "missing indexed user");

        log = raw_log(EventKind::Withdrawn, Some(Address::ZERO), &[1, 2]);
        assert!(StakingEvent::decode(&log).is_err(), "short data");

        log.topics = vec![B256::repeat_byte(0x01)];
        assert!(StakingEvent::decode(&log).is_err(), "unknown topic");
    }

    #[test]
    fn test_raw_log_from_json() {
        let value = json!({
            "address": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "topics": [EventKind::StakingUnpaused.topic().to_string()],
            "data": format!("0x{}", "00".repeat(31) + "2a"),
            "blockNumber": "0x1b4",
            "transactionHash": format!("0x{}", "ab".repeat(32)),
            "logIndex": "0x0",
            "removed": false
        });
        let log = RawLog::from_json(&value).unwrap();
        assert!(!log.removed);
        assert_eq!(
            StakingEvent::decode(&log).unwrap(),
            StakingEvent::StakingUnpaused { timestamp: 42 }
        );
    }
}
