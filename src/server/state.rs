//! Shared handler state

use std::sync::Arc;

use crate::stats::{StatsBroadcaster, StatsStore};
use crate::storage::FileOperations;

/// Cloned into every handler. All fields are cheap handles.
#[derive(Clone)]
pub struct AppState {
    pub ops: FileOperations,
    pub broadcaster: StatsBroadcaster,
}

impl AppState {
    pub fn new(ops: FileOperations, broadcaster: StatsBroadcaster) -> Self {
        Self { ops, broadcaster }
    }

    pub fn stats(&self) -> &Arc<StatsStore> {
        self.ops.stats()
    }
}
