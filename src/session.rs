//! The context every command runs in: configuration, the local store and,
//! once connected, the authenticated API client.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::AppConfig;
use crate::graph::{
    HttpTransport, PagedFetcher, ReqwestTransport, RetryPolicy, StaticToken, TokenProvider,
    TokenSource,
};
use crate::inventory_store::FileInventoryStore;
use crate::sync::{InventoryOptions, SyncOrchestrator};

struct Connection {
    fetcher: PagedFetcher,
    /// Set when tokens come from the client-credentials exchange.
    provider: Option<Arc<TokenProvider>>,
}

pub struct Session {
    config: AppConfig,
    store: FileInventoryStore,
    connection: Option<Connection>,
}

impl Session {
    /// Opens the store only. Enough for every command that does not call the API.
    pub fn open(config: AppConfig) -> Result<Self> {
        let store = FileInventoryStore::open(&config.storage_root).with_context(|| {
            format!(
                "Failed to open inventory store at {:?}",
                config.storage_root
            )
        })?;
        Ok(Self {
            config,
            store,
            connection: None,
        })
    }

    /// Opens the store and authenticates against the API.
    pub fn connect(config: AppConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config.request_timeout())
            .context("Failed to create HTTP client")?;
        Self::connect_with_transport(config, Arc::new(transport))
    }

    /// Like `connect`, with a caller-supplied HTTP transport.
    pub fn connect_with_transport(
        config: AppConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self> {
        let mut session = Self::open(config)?;
        session.attach(transport)?;
        Ok(session)
    }

    fn attach(&mut self, transport: Arc<dyn HttpTransport>) -> Result<()> {
        let (tokens, provider): (Arc<dyn TokenSource>, Option<Arc<TokenProvider>>) =
            if let Some(token) = &self.config.access_token {
                (Arc::new(StaticToken::new(token.clone())) as Arc<dyn TokenSource>, None)
            } else if let Some(credentials) = &self.config.credentials {
                let provider = Arc::new(TokenProvider::new(
                    credentials.clone(),
                    &self.config.login_base_url,
                    &self.config.graph_base_url,
                    Arc::clone(&transport),
                ));
                (provider.clone() as Arc<dyn TokenSource>, Some(provider))
            } else {
                bail!(
                    "No credentials configured: provide --access-token or \
                     tenant_id, client_id and client_secret"
                );
            };

        // Fail fast on bad credentials instead of on the first page
        tokens.bearer_token().context("Authentication failed")?;

        let fetcher = PagedFetcher::new(
            transport,
            tokens,
            &self.config.graph_base_url,
            RetryPolicy::new(&self.config.fetch),
        );
        info!("Connected to {}", self.config.graph_base_url);
        self.connection = Some(Connection { fetcher, provider });
        Ok(())
    }

    /// Drops the API client and any cached token. The store stays open.
    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            if let Some(provider) = connection.provider {
                provider.invalidate();
            }
            info!("Disconnected from {}", self.config.graph_base_url);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &FileInventoryStore {
        &self.store
    }

    pub fn fetcher(&self) -> Result<&PagedFetcher> {
        self.connection
            .as_ref()
            .map(|c| &c.fetcher)
            .ok_or_else(|| anyhow!("Session is not connected"))
    }

    /// Expiry of the cached client-credentials token, if there is one.
    pub fn token_expires_at(&self) -> Option<DateTime<Utc>> {
        self.connection
            .as_ref()
            .and_then(|c| c.provider.as_ref())
            .and_then(|p| p.current())
            .map(|t| t.expires_at)
    }

    pub fn orchestrator(&self, options: InventoryOptions) -> Result<SyncOrchestrator<'_>> {
        Ok(SyncOrchestrator::new(self.fetcher()?, &self.store, options))
    }
}
