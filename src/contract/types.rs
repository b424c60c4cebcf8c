// src/contract/types.rs
//! Contract read types

use alloy_primitives::{Address, U256};

/// Point-in-time read of one account's position and the protocol parameters.
/// Never mutated after construction; the next read replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawContractSnapshot {
    pub account: Address,
    pub staked_amount: U256,
    pub last_stake_timestamp: u64,
    pub reward_debt: U256,
    pub pending_rewards: U256,
    pub seconds_until_unlock: u64,
    pub can_withdraw: bool,
    pub total_staked: U256,
    pub current_reward_rate: U256,
    pub initial_apr: U256,
    pub min_lock_duration: u64,
    /// Local unix time the read completed
    pub taken_at: i64,
}

impl RawContractSnapshot {
    pub fn has_stake(&self) -> bool {
        !self.staked_amount.is_zero()
    }

    /// Absolute unlock time implied by the countdown, if still ahead of `now`
    pub fn unlock_timestamp(&self, now: i64) -> Option<i64> {
        if !self.has_stake() || self.seconds_until_unlock == 0 {
            return None;
        }
        let unlock = self.taken_at.saturating_add(i64::try_from(self.seconds_until_unlock).unwrap_or(i64::MAX));
        (unlock > now).then_some(unlock)
    }
}
