//! Group display-name lookups for assignment targets.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::graph::{ApiResult, HttpMethod, PagedFetcher};

/// Looks up directory groups by id.
#[cfg_attr(test, mockall::automock)]
pub trait GroupDirectory {
    /// `Ok(None)` when the group does not exist.
    fn group_display_name(&self, group_id: &str) -> ApiResult<Option<String>>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupResponse {
    display_name: Option<String>,
}

/// `GroupDirectory` backed by the `groups/{id}` endpoint.
pub struct GraphGroupDirectory<'a> {
    fetcher: &'a PagedFetcher,
}

impl<'a> GraphGroupDirectory<'a> {
    pub fn new(fetcher: &'a PagedFetcher) -> Self {
        Self { fetcher }
    }
}

impl GroupDirectory for GraphGroupDirectory<'_> {
    fn group_display_name(&self, group_id: &str) -> ApiResult<Option<String>> {
        let path = format!(
            "groups/{}?$select=id,displayName",
            urlencoding::encode(group_id)
        );
        match self.fetcher.fetch_one(&path, HttpMethod::Get, None) {
            Ok(value) => {
                let group = GroupResponse::deserialize(&value).map_err(|e| {
                    crate::graph::ApiError::InvalidResponse {
                        url: self.fetcher.resolve_url(&path),
                        message: e.to_string(),
                    }
                })?;
                Ok(group.display_name)
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Memoizes group names for the lifetime of one resolver.
///
/// Failed lookups are memoized too, as their sentinel name.
pub struct GroupNameCache<'a> {
    directory: &'a dyn GroupDirectory,
    names: HashMap<String, String>,
}

impl<'a> GroupNameCache<'a> {
    pub fn new(directory: &'a dyn GroupDirectory) -> Self {
        Self {
            directory,
            names: HashMap::new(),
        }
    }

    /// Never fails: unresolvable ids map to a sentinel name.
    pub fn resolve(&mut self, group_id: &str) -> String {
        if let Some(name) = self.names.get(group_id) {
            return name.clone();
        }

        let name = match self.directory.group_display_name(group_id) {
            Ok(Some(name)) => name,
            Ok(None) => {
                debug!("Group {} not found", group_id);
                unknown_group(group_id)
            }
            Err(e) => {
                warn!("Failed to resolve group {}: {}", group_id, e);
                format!("Error Resolving ({})", group_id)
            }
        };

        self.names.insert(group_id.to_string(), name.clone());
        name
    }

    /// Distinct group ids looked up so far.
    pub fn resolved_count(&self) -> usize {
        self.names.len()
    }
}

fn unknown_group(group_id: &str) -> String {
    format!("Unknown Group ({})", group_id)
}
