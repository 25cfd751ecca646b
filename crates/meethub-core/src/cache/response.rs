//! Read-through cache for idempotent GET responses.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use tracing::debug;

use super::TtlCache;
use crate::clock::Clock;

/// GET responses are served from cache for 5 minutes.
pub const RESPONSE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Body of a successful response, replayed as a 200 on a cache hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub body: String,
}

/// Build the cache key for a request.
///
/// Format is `"{METHOD}:{URL}"`, suffixed with `"?k1=v1&k2=v2"` when there are
/// query parameters. Parameters are sorted by key so insertion order does not
/// matter. `url` must not carry its own query string.
pub fn cache_key(method: &Method, url: &str, params: &[(String, String)]) -> String {
    let mut key = format!("{}:{}", method.as_str(), url);
    if params.is_empty() {
        return key;
    }

    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    key.push('?');
    key.push_str(&joined);
    key
}

pub struct ResponseCache {
    inner: TtlCache<CachedResponse>,
}

impl ResponseCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: TtlCache::with_clock(ttl, clock),
        }
    }

    pub fn lookup(&self, key: &str) -> Option<CachedResponse> {
        let hit = self.inner.get(key);
        debug!(key, hit = hit.is_some(), "Response cache lookup");
        hit
    }

    pub fn store(&self, key: impl Into<String>, body: String) {
        self.inner.insert(key, CachedResponse { body });
    }

    pub fn remove(&self, key: &str) {
        self.inner.remove(key);
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
