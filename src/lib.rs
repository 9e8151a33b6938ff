//! MDM configuration inventory
//!
//! Pulls applications, scripts and remediations from the device-management
//! API, keeps them in a local flat-file store and reports on them.

pub mod cli_style;
pub mod config;
pub mod graph;
pub mod inventory;
pub mod inventory_store;
pub mod report;
pub mod session;
pub mod sync;

// Re-export commonly used types for convenience
pub use config::{AppConfig, CliConfig, FileConfig};
pub use inventory::{InventoryRecord, ItemKind, RunRecord, RunStatus};
pub use inventory_store::{FileInventoryStore, InventoryStore};
pub use session::Session;
pub use sync::{InventoryOptions, SyncError, SyncOrchestrator};
