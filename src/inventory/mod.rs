//! Inventory domain types and the source-to-record normalizer.

mod groups;
mod models;
mod normalizer;

pub use groups::{GraphGroupDirectory, GroupDirectory, GroupNameCache};
pub use models::*;
pub use normalizer::{
    normalize, parse_assignment, NormalizeError, Normalizer, SourceAssignment,
    REMEDIATION_SCRIPT_KEY,
};
