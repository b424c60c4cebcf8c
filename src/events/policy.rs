// src/events/policy.rs
//! What a batch of logs means for the tracked account.
//!
//! Pure: given the event kind, the decoded batch and the account, decide
//! whether a full re-read is needed or whether the payload can be patched in.

use alloy_primitives::{Address, U256};

use super::types::{EventKind, StakingEvent};

/// Instruction for the reconciliation engine derived from contract events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAction {
    /// The account's own position changed; only an authoritative read has
    /// the new principal and unlock time.
    RefreshAccount,
    /// Protocol-wide figures carried in the log
    PatchProtocol {
        total_staked: Option<U256>,
        current_reward_rate: Option<U256>,
    },
    /// The account claimed; its pending figure is in the payload
    PatchPendingRewards(U256),
    PatchPaused(bool),
}

/// Classify one delivered batch of a single event kind
pub fn classify_batch(kind: EventKind, events: &[StakingEvent], account: &Address) -> Vec<EventAction> {
    if events.is_empty() {
        return Vec::new();
    }

    let involved = |e: &&StakingEvent| e.user().as_ref() == Some(account);

    match kind {
        EventKind::Staked | EventKind::Withdrawn | EventKind::EmergencyWithdrawn => {
            if events.iter().any(|e| involved(&e)) {
                return vec![EventAction::RefreshAccount];
            }
            // Logs arrive in chain order; the last one carries the newest totals
            match events.last() {
                Some(StakingEvent::Staked { new_total_staked, current_reward_rate, .. })
                | Some(StakingEvent::Withdrawn { new_total_staked, current_reward_rate, .. }) => {
                    vec![EventAction::PatchProtocol {
                        total_staked: Some(*new_total_staked),
                        current_reward_rate: Some(*current_reward_rate),
                    }]
                }
                Some(StakingEvent::EmergencyWithdrawn { new_total_staked, .. }) => {
                    vec![EventAction::PatchProtocol {
                        total_staked: Some(*new_total_staked),
                        current_reward_rate: None,
                    }]
                }
                _ => Vec::new(),
            }
        }
        EventKind::RewardsClaimed => events
            .iter()
            .filter(involved)
            .last()
            .and_then(|e| match e {
                StakingEvent::RewardsClaimed { new_pending_rewards, .. } => {
                    Some(vec![EventAction::PatchPendingRewards(*new_pending_rewards)])
                }
                _ => None,
            })
            .unwrap_or_default(),
        EventKind::RewardRateUpdated => match events.last() {
            Some(StakingEvent::RewardRateUpdated { new_rate, .. }) => vec![EventAction::PatchProtocol {
                total_staked: None,
                current_reward_rate: Some(*new_rate),
            }],
            _ => Vec::new(),
        },
        EventKind::StakingPaused => vec![EventAction::PatchPaused(true)],
        EventKind::StakingUnpaused => vec![EventAction::PatchPaused(false)],
    }
}
