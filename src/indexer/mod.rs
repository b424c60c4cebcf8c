// src/indexer/mod.rs
mod client;
mod poller;
mod types;

pub use client::{
    IndexedQueryClient, IndexerSource, GET_CONTRACT_STATS, GET_RECENT_ACTIVITY, GET_USER_HISTORY, GET_USER_STAKES,
};
pub use poller::Polled;
pub use types::{
    ProtocolStats, RecentActivity, RewardsClaimedRecord, StakePositionRecord, StakedRecord, UserAggregate, UserHistory,
    UserStakes, WithdrawnRecord,
};
