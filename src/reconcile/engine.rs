// src/reconcile/engine.rs
//! Reconciliation state machine.
//!
//! The engine owns every input it has accepted for the tracked account and
//! re-derives the whole view after each one. It performs no I/O; follow-up
//! work is returned as [`Effect`]s for the session to carry out.

use alloy_primitives::{Address, U256};

use super::view::{derive_view, ProtocolAggregate, StakingView, ViewInputs, ViewSource};
use crate::contract::RawContractSnapshot;
use crate::error::{QueryError, ReadError, StakeWatchError};
use crate::events::EventAction;
use crate::indexer::{Polled, ProtocolStats, UserStakes};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState {
    /// No account tracked
    Empty,
    /// Waiting for the first snapshot or positions poll
    Loading,
    Ready(StakingView),
    /// Every primary source failed before any succeeded
    Failed(StakeWatchError),
}

impl ViewState {
    pub fn view(&self) -> Option<&StakingView> {
        match self {
            ViewState::Ready(view) => Some(view),
            _ => None,
        }
    }
}

/// Everything that can reach the engine, in arrival order
#[derive(Debug, Clone)]
pub enum EngineInput {
    Snapshot {
        account: Address,
        result: Result<RawContractSnapshot, ReadError>,
    },
    UserStakes {
        account: Address,
        state: Polled<UserStakes>,
    },
    ProtocolStats(Polled<Option<ProtocolStats>>),
    Event {
        account: Address,
        action: EventAction,
    },
    /// Periodic recompute; rewards accrue with time alone
    Tick,
    /// Explicit refresh, e.g. after a confirmed action
    Refresh,
}

/// Work the session performs on the engine's behalf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    FetchSnapshot(Address),
    /// Run the positions query now instead of waiting for its cadence
    PollPositions,
}

#[derive(Debug)]
pub struct ReconciliationEngine {
    account: Option<Address>,
    snapshot: Option<RawContractSnapshot>,
    snapshot_error: Option<ReadError>,
    /// Contract pending figure; a claim event may replace it between reads
    contract_pending: Option<U256>,
    stakes: Polled<UserStakes>,
    stats_applied_at: Option<i64>,
    stats_error: Option<QueryError>,
    protocol: ProtocolAggregate,
    penalty_override: Option<u32>,
    state: ViewState,
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self {
            account: None,
            snapshot: None,
            snapshot_error: None,
            contract_pending: None,
            stakes: Polled::default(),
            stats_applied_at: None,
            stats_error: None,
            protocol: ProtocolAggregate::default(),
            penalty_override: None,
            state: ViewState::Empty,
        }
    }

    /// Emergency-withdraw penalty that wins over whatever the indexer reports
    pub fn with_penalty_override(mut self, penalty_bps: Option<u32>) -> Self {
        self.penalty_override = penalty_bps;
        self.protocol.emergency_withdraw_penalty_bps = penalty_bps;
        self
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn account(&self) -> Option<Address> {
        self.account
    }

    /// Start tracking `account`. Per-account inputs are dropped; protocol
    /// figures are contract-wide and carry over.
    pub fn activate(&mut self, account: Address) -> Vec<Effect> {
        self.clear_account();
        self.account = Some(account);
        self.state = ViewState::Loading;
        log::info!("Tracking {}", account);
        vec![Effect::FetchSnapshot(account), Effect::PollPositions]
    }

    pub fn deactivate(&mut self) {
        if let Some(account) = self.account.take() {
            log::info!("Stopped tracking {}", account);
        }
        self.clear_account();
        self.state = ViewState::Empty;
    }

    fn clear_account(&mut self) {
        self.snapshot = None;
        self.snapshot_error = None;
        self.contract_pending = None;
        self.stakes = Polled::default();
    }

    /// Accept one input and recompute. Inputs for another account, or any
    /// input while nothing is tracked, are discarded without a recompute.
    pub fn apply(&mut self, input: EngineInput, now: i64) -> Vec<Effect> {
        let Some(current) = self.account else {
            return Vec::new();
        };

        let mut effects = Vec::new();
        match input {
            EngineInput::Snapshot { account, result } => {
                if account != current {
                    log::debug!("Discarding snapshot for stale account {}", account);
                    return effects;
                }
                match result {
                    Ok(snapshot) => {
                        self.protocol.apply_snapshot(&snapshot);
                        self.contract_pending = Some(snapshot.pending_rewards);
                        self.snapshot = Some(snapshot);
                        self.snapshot_error = None;
                    }
                    Err(e) => {
                        log::warn!("Snapshot read for {} failed: {}", account, e);
                        self.snapshot_error = Some(e);
                    }
                }
            }
            EngineInput::UserStakes { account, state } => {
                if account != current {
                    log::debug!("Discarding positions for stale account {}", account);
                    return effects;
                }
                self.stakes = state;
            }
            EngineInput::ProtocolStats(polled) => {
                // Re-sent last-good stats must not undo newer event patches
                if polled.updated_at.is_some() && polled.updated_at != self.stats_applied_at {
                    if let Some(Some(stats)) = &polled.data {
                        self.protocol.apply_stats(stats);
                        if self.penalty_override.is_some() {
                            self.protocol.emergency_withdraw_penalty_bps = self.penalty_override;
                        }
                    }
                    self.stats_applied_at = polled.updated_at;
                }
                self.stats_error = polled.error;
            }
            EngineInput::Event { account, action } => {
                if account != current {
                    return effects;
                }
                match action {
                    EventAction::RefreshAccount => {
                        effects.push(Effect::FetchSnapshot(current));
                        effects.push(Effect::PollPositions);
                    }
                    EventAction::PatchProtocol { total_staked, current_reward_rate } => {
                        self.protocol.apply_patch(total_staked, current_reward_rate);
                    }
                    EventAction::PatchPendingRewards(pending) => {
                        self.contract_pending = Some(pending);
                        effects.push(Effect::PollPositions);
                    }
                    EventAction::PatchPaused(paused) => self.protocol.set_paused(paused),
                }
            }
            EngineInput::Tick => {
                let contract_sourced = self
                    .state
                    .view()
                    .map(|view| view.source == ViewSource::Contract)
                    .unwrap_or(false);
                if contract_sourced {
                    effects.push(Effect::FetchSnapshot(current));
                }
            }
            EngineInput::Refresh => {
                effects.push(Effect::FetchSnapshot(current));
                effects.push(Effect::PollPositions);
            }
        }

        self.recompute(current, now);
        effects
    }

    fn recompute(&mut self, account: Address, now: i64) {
        let inputs = ViewInputs {
            account,
            snapshot: self.snapshot.as_ref(),
            contract_pending: self.contract_pending,
            stakes: self.stakes.data.as_ref(),
            protocol: &self.protocol,
        };

        self.state = match derive_view(&inputs, now) {
            Some(mut view) => {
                view.error = self.latest_error();
                ViewState::Ready(view)
            }
            None => match (&self.snapshot_error, &self.stakes.error) {
                (Some(read), Some(_)) => ViewState::Failed(read.clone().into()),
                _ => ViewState::Loading,
            },
        };
    }

    fn latest_error(&self) -> Option<StakeWatchError> {
        if let Some(e) = &self.snapshot_error {
            return Some(e.clone().into());
        }
        self.stakes
            .error
            .as_ref()
            .or(self.stats_error.as_ref())
            .map(|e| e.clone().into())
    }
}
