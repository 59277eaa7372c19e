//! Persistent counters, starred files, host figures and the live stats stream.

pub mod broadcaster;
pub mod store;
pub mod system;

pub use broadcaster::{BroadcastSettings, CloseReason, ExtendedStats, StatsBroadcaster, StreamState};
pub use store::{ServerStats, StarredFile, StatField, StatsStore};
pub use system::SystemStats;
