//! Client for the device-management cloud API.
//!
//! - `token`: client-credentials token acquisition and caching
//! - `fetcher`: page-following GETs and single calls with bounded retries
//! - `transport`: the blocking HTTP seam both of them go through

mod error;
mod fetcher;
mod retry_policy;
mod token;
mod transport;

pub use error::{ApiError, ApiResult};
pub use fetcher::{continuation_link, PagedFetcher, CONTINUATION_KEYS};
pub use retry_policy::RetryPolicy;
pub use token::{AccessToken, ClientCredentials, StaticToken, TokenProvider, TokenSource};
pub use transport::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, RequestBody,
};
