//! Common test infrastructure
//!
//! Every test gets its own storage root and an in-process transport that
//! answers API calls from scripted responses.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{fixtures, TestInventory};
//!
//! #[test]
//! fn test_inventory_applications() {
//!     let env = TestInventory::new();
//!     env.transport.respond(&env.url(APPLICATIONS_PATH), fixtures::page(vec![], None));
//!     let session = env.connect();
//! }
//! ```

mod constants;
pub mod fixtures;
mod harness;
mod transport;

pub use constants::*;
pub use harness::TestInventory;
pub use transport::ScriptedTransport;
