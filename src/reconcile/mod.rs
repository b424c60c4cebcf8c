// src/reconcile/mod.rs
mod engine;
mod view;

#[cfg(test)]
pub(crate) use view::fixtures;

pub use engine::{Effect, EngineInput, ReconciliationEngine, ViewState};
pub use view::{
    derive_view, pending_reward, PositionView, ProtocolAggregate, StakingView, ViewInputs, ViewSource,
    BPS_DENOMINATOR, SECONDS_PER_YEAR,
};
