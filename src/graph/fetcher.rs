//! Authenticated page-following fetcher.
//!
//! `fetch_all` follows continuation links until the collection is exhausted,
//! retrying each page with a fixed delay. `fetch_one` wraps a single call and
//! never retries client errors.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::error::{describe_error_body, ApiError, ApiResult};
use super::retry_policy::RetryPolicy;
use super::token::TokenSource;
use super::transport::{HttpMethod, HttpRequest, HttpTransport};

/// Keys that may carry the next page link, depending on API version.
pub const CONTINUATION_KEYS: [&str; 3] = ["@odata.nextLink", "odata.nextLink", "nextLink"];

pub struct PagedFetcher {
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<dyn TokenSource>,
    base_url: String,
    policy: RetryPolicy,
}

impl PagedFetcher {
    /// Create a new PagedFetcher.
    ///
    /// # Arguments
    /// * `base_url` - API root that relative paths are appended to
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        tokens: Arc<dyn TokenSource>,
        base_url: &str,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            tokens,
            base_url: base_url.trim_end_matches('/').to_string(),
            policy,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URLs pass through, relative paths get the API root prepended.
    pub fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("https://") || path.starts_with("http://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// Fetches every page of a collection and returns the concatenated items.
    pub fn fetch_all(&self, path: &str) -> ApiResult<Vec<Value>> {
        let mut url = self.resolve_url(path);
        let mut items = Vec::new();
        let mut pages = 0usize;

        loop {
            debug!("Fetching page {}: {}", pages + 1, url);
            let page = self.fetch_page(&url)?;
            pages += 1;

            let Value::Object(mut body) = page else {
                return Err(ApiError::InvalidResponse {
                    url,
                    message: "expected a JSON object".to_string(),
                });
            };

            match body.remove("value") {
                Some(Value::Array(values)) => items.extend(values),
                Some(Value::Null) | None => {}
                Some(_) => {
                    return Err(ApiError::InvalidResponse {
                        url,
                        message: "`value` is not an array".to_string(),
                    })
                }
            }

            let Some(next) = continuation_link(&body).map(|link| self.resolve_url(&link)) else {
                break;
            };
            if next == url {
                warn!("Page {} links back to itself, stopping at {}", pages, url);
                break;
            }
            url = next;
        }

        info!(
            "Fetched {} item(s) from {} in {} page(s)",
            items.len(),
            path,
            pages
        );
        Ok(items)
    }

    /// One page with the full retry budget; any request failure is retried.
    fn fetch_page(&self, url: &str) -> ApiResult<Value> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send(HttpMethod::Get, url, None) {
                Ok(value) => return Ok(value),
                // Auth failures are never transient
                Err(e @ ApiError::Auth(_)) => return Err(e),
                Err(e @ ApiError::InvalidResponse { .. }) => return Err(e),
                Err(e) if self.policy.has_attempts_left(attempt) => {
                    warn!(
                        "Page request failed (attempt {}/{}): {}; retrying in {:?}",
                        attempt, self.policy.max_attempts, e, self.policy.delay
                    );
                    self.policy.wait();
                }
                Err(e) => {
                    return Err(ApiError::Fetch {
                        url: url.to_string(),
                        attempts: attempt,
                        message: e.to_string(),
                    })
                }
            }
        }
    }

    /// Performs a single request. Client errors fail immediately; server and
    /// network errors are retried within the policy budget.
    pub fn fetch_one(
        &self,
        path: &str,
        method: HttpMethod,
        body: Option<&Value>,
    ) -> ApiResult<Value> {
        let url = self.resolve_url(path);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send(method, &url, body) {
                Ok(value) => return Ok(value),
                Err(e) if self.policy.should_retry(&e, attempt) => {
                    warn!(
                        "{:?} {} failed (attempt {}/{}): {}; retrying in {:?}",
                        method, url, attempt, self.policy.max_attempts, e, self.policy.delay
                    );
                    self.policy.wait();
                }
                Err(e) if e.is_transient() => {
                    return Err(ApiError::Fetch {
                        url,
                        attempts: attempt,
                        message: e.to_string(),
                    })
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn send(&self, method: HttpMethod, url: &str, body: Option<&Value>) -> ApiResult<Value> {
        let token = self.tokens.bearer_token()?;
        let mut request = HttpRequest::new(method, url).with_bearer(token);
        if let Some(body) = body {
            request = request.with_json(body.clone());
        }

        let response = self.transport.execute(&request)?;
        if !response.is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status: response.status,
                message: describe_error_body(&response.body),
            });
        }
        response.json(url)
    }
}

/// First continuation link found, probing every known key in order.
pub fn continuation_link(body: &serde_json::Map<String, Value>) -> Option<String> {
    CONTINUATION_KEYS
        .iter()
        .find_map(|key| body.get(*key).and_then(|v| v.as_str()))
        .filter(|link| !link.is_empty())
        .map(str::to_string)
}
