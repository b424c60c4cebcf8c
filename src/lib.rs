//! Client-side staking position tracking.
//!
//! Reads an account's position from the staking contract and the indexer,
//! keeps it fresh from contract events, projects reward accrual locally and
//! submits staking actions through a wallet.

pub mod abi;
pub mod actions;
pub mod config;
pub mod contract;
pub mod error;
pub mod events;
pub mod indexer;
pub mod reconcile;
pub mod rpc;
pub mod session;
pub mod units;

pub use actions::{AbortCause, ActionGateway, ActionOutcome, ConfirmationPrompt, EmergencyNotice};
pub use config::StakingConfig;
pub use contract::{ContractReader, RawContractSnapshot};
pub use error::StakeWatchError;
pub use events::EventSubscriber;
pub use indexer::IndexedQueryClient;
pub use reconcile::{ReconciliationEngine, StakingView, ViewState};
pub use session::{RefreshHandle, StakingSession};
