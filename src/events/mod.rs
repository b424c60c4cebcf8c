// src/events/mod.rs
mod policy;
mod subscriber;
mod types;

pub use policy::{classify_batch, EventAction};
pub use subscriber::EventSubscriber;
pub use types::{EventKind, RawLog, StakingEvent};
