#![allow(dead_code)]

use std::sync::Arc;

use mdm_inventory::config::{AppConfig, CliConfig, FetchConfig, FileConfig};
use mdm_inventory::Session;
use tempfile::TempDir;

use super::constants::*;
use super::transport::ScriptedTransport;

/// A throwaway storage root plus a scripted API.
pub struct TestInventory {
    pub dir: TempDir,
    pub transport: Arc<ScriptedTransport>,
}

impl TestInventory {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            transport: ScriptedTransport::new(),
        }
    }

    /// Absolute URL of an API path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", GRAPH_URL, path)
    }

    fn resolve(&self, cli: CliConfig) -> AppConfig {
        let file = FileConfig {
            login_base_url: Some(LOGIN_URL.to_string()),
            fetch: Some(FetchConfig {
                max_retries: Some(3),
                retry_delay_secs: Some(0),
            }),
            ..Default::default()
        };
        AppConfig::resolve(
            &CliConfig {
                storage_root: Some(self.dir.path().to_path_buf()),
                graph_base_url: Some(GRAPH_URL.to_string()),
                request_timeout_sec: 100,
                ..cli
            },
            Some(file),
        )
        .unwrap()
    }

    /// Config authenticating with a static bearer token.
    pub fn config(&self) -> AppConfig {
        self.resolve(CliConfig {
            access_token: Some(TEST_TOKEN.to_string()),
            ..Default::default()
        })
    }

    /// Config authenticating with client credentials.
    pub fn credentials_config(&self) -> AppConfig {
        self.resolve(CliConfig {
            tenant_id: Some(TENANT_ID.to_string()),
            client_id: Some(CLIENT_ID.to_string()),
            client_secret: Some(CLIENT_SECRET.to_string()),
            ..Default::default()
        })
    }

    pub fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", LOGIN_URL, TENANT_ID)
    }

    pub fn connect(&self) -> Session {
        Session::connect_with_transport(self.config(), self.transport.clone()).unwrap()
    }

    /// Offline session over the same storage root.
    pub fn open(&self) -> Session {
        Session::open(self.config()).unwrap()
    }
}
