use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub storage_root: Option<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub graph_base_url: Option<String>,
    pub login_base_url: Option<String>,
    pub request_timeout_sec: Option<u64>,

    // Feature configs
    pub fetch: Option<FetchConfig>,
    pub sync: Option<SyncConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct FetchConfig {
    pub max_retries: Option<u32>,
    pub retry_delay_secs: Option<u64>,
}

/// Defaults for `inventory` when the matching CLI flag is not given.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SyncConfig {
    pub include_content: Option<bool>,
    pub include_assignments: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_file() {
        let config: FileConfig = toml::from_str(
            r#"
            storage_root = "/var/lib/inventory"
            tenant_id = "contoso.onmicrosoft.com"
            client_id = "11111111-2222-3333-4444-555555555555"
            request_timeout_sec = 30

            [fetch]
            max_retries = 5
            retry_delay_secs = 1

            [sync]
            include_assignments = true
            "#,
        )
        .unwrap();

        assert_eq!(config.storage_root.as_deref(), Some("/var/lib/inventory"));
        assert_eq!(config.request_timeout_sec, Some(30));
        let fetch = config.fetch.unwrap();
        assert_eq!(fetch.max_retries, Some(5));
        assert_eq!(fetch.retry_delay_secs, Some(1));
        let sync = config.sync.unwrap();
        assert_eq!(sync.include_assignments, Some(true));
        assert_eq!(sync.include_content, None);
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let err = FileConfig::load(Path::new("/nonexistent/inventory.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
