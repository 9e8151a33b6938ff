mod file_config;

pub use file_config::{FetchConfig, FileConfig, SyncConfig};

use crate::graph::ClientCredentials;
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/beta";
pub const DEFAULT_LOGIN_BASE_URL: &str = "https://login.microsoftonline.com";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub storage_root: Option<PathBuf>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub access_token: Option<String>,
    pub graph_base_url: Option<String>,
    pub request_timeout_sec: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub storage_root: PathBuf,
    pub graph_base_url: String,
    pub login_base_url: String,
    pub request_timeout_sec: u64,

    // Authentication: client credentials or a pre-issued bearer token
    pub credentials: Option<ClientCredentials>,
    pub access_token: Option<String>,

    // Feature configs (with defaults)
    pub fetch: FetchSettings,
    pub sync: SyncDefaults,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let storage_root = file
            .storage_root
            .map(PathBuf::from)
            .or_else(|| cli.storage_root.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "storage_root must be specified via --storage-root or in config file"
                )
            })?;

        // The store creates the directory on first use, but it must not be a file
        if storage_root.exists() && !storage_root.is_dir() {
            bail!("storage_root is not a directory: {:?}", storage_root);
        }

        let graph_base_url = file
            .graph_base_url
            .or_else(|| cli.graph_base_url.clone())
            .unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let login_base_url = file
            .login_base_url
            .unwrap_or_else(|| DEFAULT_LOGIN_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let request_timeout_sec = file.request_timeout_sec.unwrap_or(cli.request_timeout_sec);
        if request_timeout_sec == 0 {
            bail!("request_timeout_sec must be greater than zero");
        }

        let tenant_id = file.tenant_id.or_else(|| cli.tenant_id.clone());
        let client_id = file.client_id.or_else(|| cli.client_id.clone());
        let client_secret = file.client_secret.or_else(|| cli.client_secret.clone());

        let credentials = match (tenant_id, client_id, client_secret) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => Some(ClientCredentials {
                tenant_id,
                client_id,
                client_secret,
            }),
            (None, None, None) => None,
            _ => bail!("tenant_id, client_id and client_secret must be provided together"),
        };

        // Fetch settings - merge file config with defaults
        let fetch_file = file.fetch.unwrap_or_default();
        let fetch = FetchSettings {
            max_retries: fetch_file.max_retries.unwrap_or(3),
            retry_delay: Duration::from_secs(fetch_file.retry_delay_secs.unwrap_or(5)),
        };
        if fetch.max_retries == 0 {
            bail!("fetch.max_retries must be at least 1");
        }

        let sync_file = file.sync.unwrap_or_default();
        let sync = SyncDefaults {
            include_content: sync_file.include_content.unwrap_or(false),
            include_assignments: sync_file.include_assignments.unwrap_or(false),
        };

        Ok(Self {
            storage_root,
            graph_base_url,
            login_base_url,
            request_timeout_sec,
            credentials,
            access_token: cli.access_token.clone(),
            fetch,
            sync,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_sec)
    }
}

/// Retry budget shared by every API request.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Total attempts per request, first one included.
    pub max_retries: u32,
    /// Fixed pause between attempts.
    pub retry_delay: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncDefaults {
    pub include_content: bool,
    pub include_assignments: bool,
}
