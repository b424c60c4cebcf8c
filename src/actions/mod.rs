// src/actions/mod.rs
mod gateway;
mod types;
mod wallet;

pub use gateway::ActionGateway;
pub use types::{AbortCause, ActionOutcome, EmergencyNotice};
pub use wallet::{ChainWatcher, ConfirmationPrompt, RpcWallet, WalletSession};
