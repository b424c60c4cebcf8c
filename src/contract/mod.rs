// src/contract/mod.rs
//! Read side of the staking contract

mod reader;
mod types;

pub use reader::{ContractReader, SnapshotSource};
pub use types::*;
