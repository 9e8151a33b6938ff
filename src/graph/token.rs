//! OAuth2 client-credentials token provider.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::error::{ApiError, ApiResult};
use super::transport::{HttpRequest, HttpTransport};

/// Source of bearer tokens for API requests.
pub trait TokenSource: Send + Sync {
    fn bearer_token(&self) -> ApiResult<String>;
}

/// A pre-issued token, used as-is and never refreshed.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenSource for StaticToken {
    fn bearer_token(&self) -> ApiResult<String> {
        if self.0.trim().is_empty() {
            return Err(ApiError::Auth("Access token is empty".to_string()));
        }
        Ok(self.0.clone())
    }
}

/// App registration used for the client-credentials grant.
#[derive(Clone)]
pub struct ClientCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// A bearer token together with its expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// True if the token outlives `now` by more than `margin`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at - now > margin
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[allow(dead_code)]
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    tenant_id: String,
    client_id: String,
}

/// Acquires and caches tokens through the client-credentials exchange.
pub struct TokenProvider {
    credentials: ClientCredentials,
    token_url: String,
    scope: String,
    transport: Arc<dyn HttpTransport>,
    cache: Mutex<HashMap<CacheKey, AccessToken>>,
    /// Tokens closer than this to expiry are refreshed.
    refresh_margin: Duration,
}

impl TokenProvider {
    /// Creates a provider for `credentials`.
    ///
    /// # Arguments
    /// * `login_base_url` - identity endpoint root, e.g. `https://login.microsoftonline.com`
    /// * `graph_base_url` - API root; its origin determines the requested scope
    pub fn new(
        credentials: ClientCredentials,
        login_base_url: &str,
        graph_base_url: &str,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            login_base_url.trim_end_matches('/'),
            credentials.tenant_id
        );
        let scope = format!("{}/.default", origin_of(graph_base_url));
        Self {
            credentials,
            token_url,
            scope,
            transport,
            cache: Mutex::new(HashMap::new()),
            refresh_margin: Duration::minutes(5),
        }
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey {
            tenant_id: self.credentials.tenant_id.clone(),
            client_id: self.credentials.client_id.clone(),
        }
    }

    /// Returns a token valid for at least the refresh margin.
    ///
    /// A cached token is reused unless `force_refresh` is set.
    pub fn acquire(&self, force_refresh: bool) -> ApiResult<AccessToken> {
        let key = self.cache_key();

        if !force_refresh {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(token) = cache.get(&key) {
                if token.is_fresh_at(Utc::now(), self.refresh_margin) {
                    debug!("Using cached token");
                    return Ok(token.clone());
                }
            }
        }

        let token = self.exchange()?;
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, token.clone());
        Ok(token)
    }

    /// The last token acquired for these credentials, fresh or not.
    pub fn current(&self) -> Option<AccessToken> {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&self.cache_key())
            .cloned()
    }

    /// Drops the cached token, forcing a refresh on next use.
    pub fn invalidate(&self) {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.cache_key());
    }

    fn exchange(&self) -> ApiResult<AccessToken> {
        debug!("Requesting access token from {}", self.token_url);

        let request = HttpRequest::form(
            self.token_url.clone(),
            vec![
                ("grant_type".to_string(), "client_credentials".to_string()),
                ("client_id".to_string(), self.credentials.client_id.clone()),
                (
                    "client_secret".to_string(),
                    self.credentials.client_secret.clone(),
                ),
                ("scope".to_string(), self.scope.clone()),
            ],
        );

        let response = self
            .transport
            .execute(&request)
            .map_err(|e| ApiError::Auth(format!("Token request failed: {}", e)))?;

        if !response.is_success() {
            let detail = match serde_json::from_str::<TokenErrorResponse>(&response.body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {}", err.error, description),
                    None => err.error,
                },
                Err(_) => response.body.trim().to_string(),
            };
            return Err(ApiError::Auth(format!(
                "Token request failed with status {}: {}",
                response.status, detail
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&response.body)
            .map_err(|e| ApiError::Auth(format!("Failed to parse token response: {}", e)))?;

        let expires_at = Duration::try_seconds(parsed.expires_in)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                ApiError::Auth(format!(
                    "Token response has an invalid expires_in: {}",
                    parsed.expires_in
                ))
            })?;
        info!(
            "Acquired access token for tenant {}, expires at {}",
            self.credentials.tenant_id,
            expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        );

        Ok(AccessToken {
            token: parsed.access_token,
            expires_at,
        })
    }
}

impl TokenSource for TokenProvider {
    fn bearer_token(&self) -> ApiResult<String> {
        self.acquire(false).map(|t| t.token)
    }
}

/// `https://graph.microsoft.com/beta` -> `https://graph.microsoft.com`
fn origin_of(url: &str) -> &str {
    let after_scheme = url.find("://").map(|i| i + 3).unwrap_or(0);
    match url[after_scheme..].find('/') {
        Some(i) => &url[..after_scheme + i],
        None => url.trim_end_matches('/'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::transport::{HttpResponse, RequestBody};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedTransport {
        response: HttpResponse,
        calls: AtomicUsize,
        last_form: Mutex<Option<Vec<(String, String)>>>,
    }

    impl FixedTransport {
        fn new(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                response: HttpResponse::new(status, body),
                calls: AtomicUsize::new(0),
                last_form: Mutex::new(None),
            })
        }
    }

    impl HttpTransport for FixedTransport {
        fn execute(&self, request: &HttpRequest) -> ApiResult<HttpResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let RequestBody::Form(fields) = &request.body {
                *self.last_form.lock().unwrap() = Some(fields.clone());
            }
            Ok(self.response.clone())
        }
    }

    fn credentials() -> ClientCredentials {
        ClientCredentials {
            tenant_id: "contoso".to_string(),
            client_id: "app-id".to_string(),
            client_secret: "s3cret".to_string(),
        }
    }

    fn provider(transport: Arc<FixedTransport>) -> TokenProvider {
        TokenProvider::new(
            credentials(),
            "https://login.example.com/",
            "https://graph.example.com/beta",
            transport,
        )
    }

    #[test]
    fn test_token_freshness_margin() {
        let now = Utc::now();
        let token = AccessToken {
            token: "t".to_string(),
            expires_at: now + Duration::minutes(10),
        };
        assert!(token.is_fresh_at(now, Duration::minutes(5)));
        assert!(!token.is_fresh_at(now, Duration::minutes(15)));

        // Exactly at the margin counts as stale
        let token = AccessToken {
            token: "t".to_string(),
            expires_at: now + Duration::minutes(5),
        };
        assert!(!token.is_fresh_at(now, Duration::minutes(5)));
    }

    #[test]
    fn test_acquire_caches_token() {
        let transport =
            FixedTransport::new(200, r#"{"access_token":"abc","expires_in":3600,"scope":"x"}"#);
        let provider = provider(transport.clone());

        let first = provider.acquire(false).unwrap();
        let second = provider.acquire(false).unwrap();

        assert_eq!(first.token, "abc");
        assert_eq!(first, second);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.current(), Some(first));
    }

    #[test]
    fn test_force_refresh_bypasses_cache() {
        let transport = FixedTransport::new(200, r#"{"access_token":"abc","expires_in":3600}"#);
        let provider = provider(transport.clone());

        provider.acquire(false).unwrap();
        provider.acquire(true).unwrap();

        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_short_lived_token_is_refreshed() {
        // Expires within the 5 minute margin, so never reused
        let transport = FixedTransport::new(200, r#"{"access_token":"abc","expires_in":120}"#);
        let provider = provider(transport.clone());

        provider.acquire(false).unwrap();
        provider.acquire(false).unwrap();

        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_exchange_sends_client_credentials_form() {
        let transport = FixedTransport::new(200, r#"{"access_token":"abc","expires_in":3600}"#);
        let provider = provider(transport.clone());
        provider.acquire(false).unwrap();

        let form = transport.last_form.lock().unwrap().clone().unwrap();
        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(get("grant_type"), "client_credentials");
        assert_eq!(get("client_id"), "app-id");
        assert_eq!(get("client_secret"), "s3cret");
        assert_eq!(get("scope"), "https://graph.example.com/.default");
        assert_eq!(
            provider.token_url,
            "https://login.example.com/contoso/oauth2/v2.0/token"
        );
    }

    #[test]
    fn test_error_response_surfaces_provider_description() {
        let transport = FixedTransport::new(
            401,
            r#"{"error":"invalid_client","error_description":"AADSTS7000215: Invalid client secret."}"#,
        );
        let provider = provider(transport.clone());

        let err = provider.acquire(false).unwrap_err();
        assert!(err.is_auth());
        let message = err.to_string();
        assert!(message.contains("401"));
        assert!(message.contains("invalid_client"));
        assert!(message.contains("AADSTS7000215"));
        // No retry on auth failures
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert!(provider.current().is_none());
    }

    #[test]
    fn test_out_of_range_expiry_is_auth_error() {
        let transport = FixedTransport::new(
            200,
            r#"{"access_token":"abc","expires_in":9223372036854775807}"#,
        );
        let provider = provider(transport);

        let err = provider.acquire(false).unwrap_err();
        assert!(err.is_auth());
        assert!(err.to_string().contains("expires_in"));
        assert!(provider.current().is_none());
    }

    #[test]
    fn test_invalidate_drops_cached_token() {
        let transport = FixedTransport::new(200, r#"{"access_token":"abc","expires_in":3600}"#);
        let provider = provider(transport.clone());
        provider.acquire(false).unwrap();
        provider.invalidate();
        assert!(provider.current().is_none());
    }

    #[test]
    fn test_static_token() {
        assert_eq!(StaticToken::new("tok").bearer_token().unwrap(), "tok");
        assert!(StaticToken::new(" ").bearer_token().unwrap_err().is_auth());
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let debug = format!("{:?}", credentials());
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_origin_of() {
        assert_eq!(
            origin_of("https://graph.microsoft.com/beta"),
            "https://graph.microsoft.com"
        );
        assert_eq!(
            origin_of("https://graph.microsoft.com/"),
            "https://graph.microsoft.com"
        );
        assert_eq!(origin_of("http://localhost:8080"), "http://localhost:8080");
    }
}
