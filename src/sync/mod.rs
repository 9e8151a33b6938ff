//! Inventory runs: fetch a collection, normalize each item, store it, and
//! keep an audit record of the run.

mod orchestrator;
mod run_tracker;

pub use orchestrator::{InventoryOptions, SyncOrchestrator};
pub use run_tracker::RunTracker;

use thiserror::Error;

use crate::graph::ApiError;
use crate::inventory::NormalizeError;
use crate::inventory_store::StoreError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Whether this error must abort the whole run rather than a single item.
    ///
    /// Authentication failures and failed store writes abort; anything else
    /// only costs the item it happened on.
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::Api(e) => e.is_auth(),
            SyncError::Normalize(_) => false,
            SyncError::Store(e) => !e.is_not_found(),
        }
    }
}
