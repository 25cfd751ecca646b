//! API client for communicating with the meethub REST backend.
//!
//! Every request goes through the same pipeline:
//!
//! 1. The resolved URL must share the base URL's origin; anything else is `InvalidUrl`
//! 2. GET requests are looked up in the response cache and served from it on a hit
//! 3. A bearer token is attached unless the path is an auth endpoint
//! 4. A 401 waits for the shared token refresh and is retried once with the new token
//! 5. Successful GET responses are stored in the cache for 5 minutes

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode, Url};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use super::{ApiError, ApiRequest, ApiResponse};
use crate::auth::{
    HttpTokenRefresher, KeyValueStorage, MemoryStorage, RefreshCoordinator, TokenRefresher,
    TokenStore,
};
use crate::cache::{cache_key, ResponseCache, TtlCache, RESPONSE_CACHE_TTL};
use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::events::{SessionEvent, SessionEvents};
use crate::models::{
    ApiEnvelope, AppConfig, AuthPayload, CurrentUser, LoginRequest, RegisterRequest,
};

// ============================================================================
// Constants
// ============================================================================

const LOGIN_PATH: &str = "auth/login";
const REGISTER_PATH: &str = "auth/register";
const REFRESH_PATH: &str = "auth/refresh";
const APP_CONFIG_PATH: &str = "config";

/// Paths that never carry a bearer token and never trigger a refresh.
/// Matched by substring so any base path prefix works.
const AUTH_ENDPOINTS: [&str; 3] = ["/auth/login", "/auth/register", "/auth/refresh"];

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// The app config object is cached for 1 hour.
const APP_CONFIG_TTL: Duration = Duration::from_secs(60 * 60);

const APP_CONFIG_CACHE_KEY: &str = "app-config";

fn is_auth_endpoint(url: &Url) -> bool {
    let path = url.path();
    AUTH_ENDPOINTS.iter().any(|endpoint| path.contains(endpoint))
}

/// Resolved request target: URL without query, plus every query pair
struct Target {
    url: Url,
    params: Vec<(String, String)>,
}

// ============================================================================
// Builder
// ============================================================================

pub struct ApiClientBuilder {
    base_url: String,
    timeout: Duration,
    response_cache_ttl: Duration,
    app_config_ttl: Duration,
    storage: Option<Arc<dyn KeyValueStorage>>,
    clock: Arc<dyn Clock>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    events: Option<SessionEvents>,
}

impl ApiClientBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            response_cache_ttl: RESPONSE_CACHE_TTL,
            app_config_ttl: APP_CONFIG_TTL,
            storage: None,
            clock: Arc::new(SystemClock),
            refresher: None,
            events: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn response_cache_ttl(mut self, ttl: Duration) -> Self {
        self.response_cache_ttl = ttl;
        self
    }

    pub fn app_config_ttl(mut self, ttl: Duration) -> Self {
        self.app_config_ttl = ttl;
        self
    }

    /// Where the session is persisted; defaults to memory
    pub fn storage(mut self, storage: Arc<dyn KeyValueStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the HTTP refresh call, e.g. for a backend with a different refresh flow
    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn events(mut self, events: SessionEvents) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<ApiClient, ApiError> {
        let base_url = parse_base_url(&self.base_url)?;

        let http = Client::builder().timeout(self.timeout).build()?;

        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let tokens = Arc::new(TokenStore::with_clock(storage, self.clock.clone()));
        let events = self.events.unwrap_or_default();

        let refresher = match self.refresher {
            Some(refresher) => refresher,
            None => {
                let url = base_url
                    .join(REFRESH_PATH)
                    .map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
                Arc::new(HttpTokenRefresher::new(http.clone(), url))
            }
        };
        let coordinator = RefreshCoordinator::new(tokens.clone(), refresher, events.clone());

        Ok(ApiClient {
            http,
            base_url,
            tokens,
            refresher: coordinator,
            cache: Arc::new(ResponseCache::new(self.response_cache_ttl, self.clock.clone())),
            app_config: Arc::new(TtlCache::with_clock(self.app_config_ttl, self.clock)),
            events,
        })
    }
}

/// Base URLs are treated as directories so relative paths append to them
fn parse_base_url(raw: &str) -> Result<Url, ApiError> {
    let mut url = Url::parse(raw).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", raw, e)))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

// ============================================================================
// Client
// ============================================================================

/// API client for the meethub backend.
/// Clone is cheap - all state is shared, so clones see the same session and caches.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    tokens: Arc<TokenStore>,
    refresher: RefreshCoordinator,
    cache: Arc<ResponseCache>,
    app_config: Arc<TtlCache<AppConfig>>,
    events: SessionEvents,
}

impl ApiClient {
    pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder::new(base_url)
    }

    /// Build a client from the loaded configuration, opening its session storage
    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        let storage = config.open_storage()?;
        Self::builder(config.api_base_url.clone())
            .timeout(config.request_timeout())
            .response_cache_ttl(config.response_cache_ttl())
            .app_config_ttl(config.app_config_ttl())
            .storage(storage)
            .build()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn events(&self) -> &SessionEvents {
        &self.events
    }

    pub fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.refresher
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_authenticated()
    }

    pub fn current_user(&self) -> Option<CurrentUser> {
        self.tokens.current_user()
    }

    /// Drop every cached GET response
    pub fn invalidate_cache(&self) {
        self.cache.clear();
    }

    pub fn cached_response_count(&self) -> usize {
        self.cache.len()
    }

    // ===== Pipeline =====

    /// Send a request through the cache, auth and refresh stages
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let target = self.resolve(&request)?;

        let key = (request.method == Method::GET)
            .then(|| cache_key(&request.method, target.url.as_str(), &target.params));

        if let Some(key) = key.as_deref() {
            if let Some(cached) = self.cache.lookup(key) {
                return Ok(ApiResponse::cached(cached.body));
            }
        }

        let response = self.send_authorized(&request, &target).await?;

        if let Some(key) = key {
            self.cache.store(key, response.body.clone());
        }
        Ok(response)
    }

    fn resolve(&self, request: &ApiRequest) -> Result<Target, ApiError> {
        let mut url = self
            .base_url
            .join(request.path.trim_start_matches('/'))
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", request.path, e)))?;

        // The bearer token and the refresh flow belong to the backend only
        if url.origin() != self.base_url.origin() {
            return Err(ApiError::InvalidUrl(format!(
                "{} is outside {}",
                request.path, self.base_url
            )));
        }

        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        params.extend(request.query.iter().cloned());
        url.set_query(None);
        url.set_fragment(None);

        Ok(Target { url, params })
    }

    async fn send_authorized(
        &self,
        request: &ApiRequest,
        target: &Target,
    ) -> Result<ApiResponse, ApiError> {
        if is_auth_endpoint(&target.url) {
            let response = self.dispatch(request, target, None).await?;
            return Self::check_auth_response(response);
        }

        let token = self.tokens.access_token();
        let response = self.dispatch(request, target, token.as_deref()).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Self::check_response(response);
        }

        debug!(url = %target.url, "Request unauthorized, waiting for a fresh token");
        let fresh = match self.refresher.fresh_access_token(token.as_deref()).await {
            Ok(fresh) => fresh,
            Err(e) => {
                // The session is gone, and so is everything cached for it
                self.cache.clear();
                return Err(e.into());
            }
        };

        // Exactly one retry; a second 401 surfaces as Unauthorized
        let retried = self.dispatch(request, target, Some(&fresh)).await?;
        Self::check_response(retried)
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        target: &Target,
        token: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        let mut builder = self
            .http
            .request(request.method.clone(), target.url.clone());
        if !target.params.is_empty() {
            builder = builder.query(&target.params);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(method = %request.method, url = %target.url, status = status.as_u16(), "Response received");

        Ok(ApiResponse {
            status,
            body,
            from_cache: false,
        })
    }

    /// Check if response is successful, converting the status to an error if not.
    fn check_response(response: ApiResponse) -> Result<ApiResponse, ApiError> {
        if response.status.is_success() {
            Ok(response)
        } else {
            Err(ApiError::from_status(response.status, &response.body))
        }
    }

    /// Auth endpoints report validation failures in the envelope message;
    /// surface that message so it can be shown next to the form.
    fn check_auth_response(response: ApiResponse) -> Result<ApiResponse, ApiError> {
        if response.status.is_success() {
            return Ok(response);
        }
        match serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&response.body) {
            Ok(ApiEnvelope {
                message: Some(message),
                errors,
                ..
            }) => Err(ApiError::Rejected { message, errors }),
            _ => Err(ApiError::from_status(response.status, &response.body)),
        }
    }

    // ===== Typed helpers =====

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(ApiRequest::post(path).json(body)?).await?.json()
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(ApiRequest::put(path).json(body)?).await?.json()
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(path)).await?;
        Ok(())
    }

    // ===== Session =====

    /// Log in and persist the returned session
    pub async fn login(&self, email: &str, password: &str) -> Result<CurrentUser, ApiError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.start_session(ApiRequest::post(LOGIN_PATH).json(&body)?)
            .await
    }

    /// Create an account; the backend signs the new user in
    pub async fn register(&self, request: &RegisterRequest) -> Result<CurrentUser, ApiError> {
        self.start_session(ApiRequest::post(REGISTER_PATH).json(request)?)
            .await
    }

    async fn start_session(&self, request: ApiRequest) -> Result<CurrentUser, ApiError> {
        let response = self.send(request).await?;
        let envelope: ApiEnvelope<AuthPayload> = response.json()?;
        let payload = envelope
            .into_data()
            .map_err(|(message, errors)| ApiError::Rejected { message, errors })?;

        // Responses cached for a previous user must not leak into this session
        self.cache.clear();
        self.tokens.set_session(&payload.tokens, &payload.user)?;

        info!(user_id = %payload.user.id, role = %payload.user.role, "Logged in");
        self.events.send(SessionEvent::LoggedIn {
            user_id: payload.user.id.clone(),
        });
        Ok(payload.user)
    }

    /// End the session locally
    pub fn logout(&self) {
        self.tokens.clear_auth();
        self.cache.clear();
        info!("Logged out");
        self.events.send(SessionEvent::LoggedOut);
    }

    // ===== App config =====

    /// Fetch the backend app config, cached for an hour
    pub async fn app_config(&self) -> Result<AppConfig, ApiError> {
        if let Some(config) = self.app_config.get(APP_CONFIG_CACHE_KEY) {
            return Ok(config);
        }
        let config: AppConfig = self.get_json(APP_CONFIG_PATH).await?;
        self.app_config.insert(APP_CONFIG_CACHE_KEY, config.clone());
        Ok(config)
    }
}
