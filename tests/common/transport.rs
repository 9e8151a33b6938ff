#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use mdm_inventory::graph::{ApiResult, HttpRequest, HttpResponse, HttpTransport};

/// Answers requests by exact URL.
///
/// One-shot responses queued with `enqueue` are served first, in order; after
/// that the URL's `respond` response is served on every call. Unknown URLs
/// get a 404 with an OData error body.
#[derive(Default)]
pub struct ScriptedTransport {
    queued: Mutex<HashMap<String, VecDeque<HttpResponse>>>,
    sticky: Mutex<HashMap<String, HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, response: HttpResponse) {
        self.sticky
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    pub fn enqueue(&self, url: &str, response: HttpResponse) {
        self.queued
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .count()
    }

    pub fn requests_containing(&self, fragment: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.contains(fragment))
            .count()
    }
}

impl HttpTransport for ScriptedTransport {
    fn execute(&self, request: &HttpRequest) -> ApiResult<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(queue) = self.queued.lock().unwrap().get_mut(&request.url) {
            if let Some(response) = queue.pop_front() {
                return Ok(response);
            }
        }
        if let Some(response) = self.sticky.lock().unwrap().get(&request.url) {
            return Ok(response.clone());
        }
        Ok(HttpResponse::new(
            404,
            r#"{"error":{"code":"ResourceNotFound","message":"No scripted response"}}"#,
        ))
    }
}
