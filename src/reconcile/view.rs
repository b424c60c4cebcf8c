// src/reconcile/view.rs
//! Deterministic view derivation.
//!
//! Everything here is a pure function of the stored inputs and `now`, so the
//! same inputs always render the same view.

use alloy_primitives::{Address, U256};

use crate::contract::RawContractSnapshot;
use crate::error::StakeWatchError;
use crate::indexer::{ProtocolStats, StakePositionRecord, UserAggregate, UserStakes};
use crate::units::is_unlocked;

pub const BPS_DENOMINATOR: u64 = 10_000;
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// Linear accrual since `last_calculation`:
/// `principal * rate_bps * elapsed / (10_000 * 31_536_000)`.
/// Elapsed time is clamped at zero.
pub fn pending_reward(principal: U256, rate_bps: U256, last_calculation: u64, now: i64) -> U256 {
    let last = i64::try_from(last_calculation).unwrap_or(i64::MAX);
    let elapsed = now.saturating_sub(last).max(0) as u64;
    if elapsed == 0 {
        return U256::ZERO;
    }
    principal
        .saturating_mul(rate_bps)
        .saturating_mul(U256::from(elapsed))
        / U256::from(BPS_DENOMINATOR * SECONDS_PER_YEAR)
}

/// Contract-wide figures, merged last-write-wins from snapshots, indexer
/// stats and event patches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolAggregate {
    pub total_staked: U256,
    pub total_users: u64,
    pub total_positions: u64,
    pub current_reward_rate: U256,
    pub paused: bool,
    pub initial_apr: U256,
    pub min_lock_duration: u64,
    pub emergency_withdraw_penalty_bps: Option<u32>,
    pub total_rewards_paid: U256,
}

impl ProtocolAggregate {
    pub fn apply_snapshot(&mut self, snapshot: &RawContractSnapshot) {
        self.total_staked = snapshot.total_staked;
        self.current_reward_rate = snapshot.current_reward_rate;
        self.initial_apr = snapshot.initial_apr;
        self.min_lock_duration = snapshot.min_lock_duration;
    }

    pub fn apply_stats(&mut self, stats: &ProtocolStats) {
        self.total_staked = stats.total_staked;
        self.total_users = stats.total_users;
        self.total_positions = stats.total_stake_positions;
        self.current_reward_rate = stats.current_reward_rate;
        self.paused = stats.is_paused;
        self.initial_apr = stats.initial_apr;
        self.min_lock_duration = stats.min_lock_duration;
        self.total_rewards_paid = stats.total_rewards_paid;
        if let Some(penalty) = stats.emergency_withdraw_penalty {
            self.emergency_withdraw_penalty_bps = u32::try_from(penalty).ok();
        }
    }

    pub fn apply_patch(&mut self, total_staked: Option<U256>, current_reward_rate: Option<U256>) {
        if let Some(total) = total_staked {
            self.total_staked = total;
        }
        if let Some(rate) = current_reward_rate {
            self.current_reward_rate = rate;
        }
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }
}

/// An active position with its projection at the evaluation instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionView {
    pub record: StakePositionRecord,
    pub pending_rewards: U256,
    pub unlocked: bool,
}

/// Which input the headline figures were computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewSource {
    Indexer,
    Contract,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakingView {
    pub account: Address,
    pub has_stake: bool,
    pub total_staked: U256,
    pub total_pending_rewards: U256,
    /// Earliest unlock still ahead of `evaluated_at`
    pub next_unlock_timestamp: Option<i64>,
    pub protocol: ProtocolAggregate,
    pub positions: Vec<PositionView>,
    pub source: ViewSource,
    /// What the contract itself reports as pending. Shown on its own, never
    /// added to `total_pending_rewards` when positions are the source.
    pub contract_pending_rewards: Option<U256>,
    pub can_withdraw: Option<bool>,
    pub user: Option<UserAggregate>,
    pub evaluated_at: i64,
    /// Most recent background failure, if any source is currently failing
    pub error: Option<StakeWatchError>,
}

/// Inputs the engine has accumulated for one account
#[derive(Debug, Clone, Copy)]
pub struct ViewInputs<'a> {
    pub account: Address,
    pub snapshot: Option<&'a RawContractSnapshot>,
    pub contract_pending: Option<U256>,
    pub stakes: Option<&'a UserStakes>,
    pub protocol: &'a ProtocolAggregate,
}

/// Render the view at `now`, or `None` while neither primary source has
/// produced anything.
///
/// Indexed positions are preferred when there are any. Otherwise the snapshot
/// is used, and only when there is no snapshot either does an empty position
/// list stand for "no stake".
pub fn derive_view(inputs: &ViewInputs<'_>, now: i64) -> Option<StakingView> {
    let has_positions = inputs
        .stakes
        .map(|s| s.active_positions().next().is_some())
        .unwrap_or(false);

    let mut view = match (inputs.stakes, inputs.snapshot) {
        (Some(stakes), _) if has_positions => from_positions(inputs.account, stakes, now),
        (_, Some(snapshot)) => from_snapshot(snapshot, inputs.contract_pending, now),
        (Some(stakes), None) => from_positions(inputs.account, stakes, now),
        (None, None) => return None,
    };

    view.protocol = inputs.protocol.clone();
    view.contract_pending_rewards = inputs.contract_pending;
    view.can_withdraw = inputs.snapshot.map(|s| s.can_withdraw);
    view.user = inputs.stakes.and_then(|s| s.user.clone());
    Some(view)
}

fn from_positions(account: Address, stakes: &UserStakes, now: i64) -> StakingView {
    let positions: Vec<PositionView> = stakes
        .active_positions()
        .map(|record| PositionView {
            pending_rewards: pending_reward(
                record.amount,
                record.reward_rate_bps,
                record.last_reward_calculation,
                now,
            ),
            unlocked: is_unlocked(record.unlock_at(), now),
            record: record.clone(),
        })
        .collect();

    let total_staked = positions
        .iter()
        .fold(U256::ZERO, |acc, p| acc.saturating_add(p.record.amount));
    let total_pending_rewards = positions
        .iter()
        .fold(U256::ZERO, |acc, p| acc.saturating_add(p.pending_rewards));
    let next_unlock_timestamp = positions
        .iter()
        .map(|p| p.record.unlock_at())
        .filter(|unlock| *unlock > now)
        .min();

    StakingView {
        account,
        has_stake: !positions.is_empty(),
        total_staked,
        total_pending_rewards,
        next_unlock_timestamp,
        protocol: ProtocolAggregate::default(),
        positions,
        source: ViewSource::Indexer,
        contract_pending_rewards: None,
        can_withdraw: None,
        user: None,
        evaluated_at: now,
        error: None,
    }
}

fn from_snapshot(snapshot: &RawContractSnapshot, contract_pending: Option<U256>, now: i64) -> StakingView {
    StakingView {
        account: snapshot.account,
        has_stake: snapshot.has_stake(),
        total_staked: snapshot.staked_amount,
        total_pending_rewards: contract_pending.unwrap_or(snapshot.pending_rewards),
        next_unlock_timestamp: snapshot.unlock_timestamp(now),
        protocol: ProtocolAggregate::default(),
        positions: Vec::new(),
        source: ViewSource::Contract,
        contract_pending_rewards: None,
        can_withdraw: None,
        user: None,
        evaluated_at: now,
        error: None,
    }
}
