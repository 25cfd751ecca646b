//! Single-flight access token refresh.
//!
//! When several requests fail with 401 at about the same time, only the first
//! one starts a refresh call. The others wait on the same shared future and
//! all of them receive the new access token (or the same error) when it
//! resolves. The refresh itself runs on a spawned task, so it completes even
//! if every waiting request is dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{Client, Url};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::TokenStore;
use crate::api::error::truncate_body;
use crate::events::{SessionEvent, SessionEvents};
use crate::models::{ApiEnvelope, RefreshPayload, RefreshRequest};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("No refresh token stored")]
    MissingRefreshToken,

    #[error("Refresh rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Network error during refresh: {0}")]
    Network(String),

    #[error("Invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error("Failed to store refreshed tokens: {0}")]
    Storage(String),

    #[error("Refresh task failed: {0}")]
    TaskFailed(String),
}

/// Performs the refresh network call.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshPayload, RefreshError>;
}

type SharedRefresh = Shared<BoxFuture<'static, Result<String, RefreshError>>>;

enum RefreshState {
    Idle,
    Refreshing(SharedRefresh),
}

/// Outcome of checking the refresh state for a rejected request
enum Acquired {
    /// A newer token than the rejected one is already stored
    Current(String),
    Wait(SharedRefresh),
}

struct Inner {
    state: Mutex<RefreshState>,
    tokens: Arc<TokenStore>,
    refresher: Arc<dyn TokenRefresher>,
    events: SessionEvents,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forced logout: clear the session and notify subscribers once
    fn expire_session(&self, error: &RefreshError) {
        warn!(error = %error, "Token refresh failed, ending session");
        self.tokens.clear_auth();
        self.events.send(SessionEvent::SessionExpired {
            reason: error.to_string(),
        });
    }

    async fn run_refresh(self: Arc<Self>, refresh_token: String) -> Result<String, RefreshError> {
        let _reset = ResetOnDrop(Arc::clone(&self));
        info!("Refreshing access token");

        let result = match self.refresher.refresh(&refresh_token).await {
            Ok(payload) => self.store(payload),
            Err(e) => Err(e),
        };

        match result {
            Ok(access_token) => {
                self.events.send(SessionEvent::TokensRefreshed);
                Ok(access_token)
            }
            Err(e) => {
                self.expire_session(&e);
                Err(e)
            }
        }
    }

    fn store(&self, payload: RefreshPayload) -> Result<String, RefreshError> {
        self.tokens
            .set_tokens(&payload.tokens)
            .map_err(|e| RefreshError::Storage(e.to_string()))?;
        if let Some(user) = payload.user {
            self.tokens
                .set_current_user(&user)
                .map_err(|e| RefreshError::Storage(e.to_string()))?;
        }
        debug!("Refreshed tokens stored");
        Ok(payload.tokens.access_token)
    }
}

/// Returns the coordinator to `Idle` when the refresh task finishes, panics included
struct ResetOnDrop(Arc<Inner>);

impl Drop for ResetOnDrop {
    fn drop(&mut self) {
        // A panicking refresher ends the session like any other failure,
        // before the next caller can see `Idle` and start over with the old tokens
        if std::thread::panicking() {
            self.0
                .expire_session(&RefreshError::TaskFailed("refresher panicked".to_string()));
        }
        *self.0.lock_state() = RefreshState::Idle;
    }
}

/// Coordinates token refreshes for one `TokenStore`.
///
/// Construct once and share by cloning; clones share the same state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        tokens: Arc<TokenStore>,
        refresher: Arc<dyn TokenRefresher>,
        events: SessionEvents,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RefreshState::Idle),
                tokens,
                refresher,
                events,
            }),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.inner.lock_state(), RefreshState::Refreshing(_))
    }

    /// Get an access token newer than `rejected`, the token a request was
    /// sent with when it came back 401.
    ///
    /// Joins the in-flight refresh if there is one, starts one otherwise.
    /// If the stored token already differs from `rejected`, a refresh finished
    /// after that request went out and the stored token is returned as is.
    pub async fn fresh_access_token(&self, rejected: Option<&str>) -> Result<String, RefreshError> {
        match self.acquire(rejected)? {
            Acquired::Current(token) => Ok(token),
            Acquired::Wait(refresh) => refresh.await,
        }
    }

    fn acquire(&self, rejected: Option<&str>) -> Result<Acquired, RefreshError> {
        let mut state = self.inner.lock_state();
        if let RefreshState::Refreshing(refresh) = &*state {
            debug!("Refresh already in flight, waiting for new token");
            return Ok(Acquired::Wait(refresh.clone()));
        }

        let current = self.inner.tokens.access_token();
        if let Some(current) = current.as_deref() {
            if rejected != Some(current) {
                debug!("Access token was refreshed after the request was sent");
                return Ok(Acquired::Current(current.to_string()));
            }
        }

        let Some(refresh_token) = self.inner.tokens.refresh_token() else {
            let error = RefreshError::MissingRefreshToken;
            // Only a live session can expire; stragglers after a logout just fail.
            // The state lock is still held so concurrent callers see the cleared session.
            if current.is_some() {
                self.inner.expire_session(&error);
            }
            return Err(error);
        };

        let refresh = self.spawn_refresh(refresh_token);
        *state = RefreshState::Refreshing(refresh.clone());
        Ok(Acquired::Wait(refresh))
    }

    fn spawn_refresh(&self, refresh_token: String) -> SharedRefresh {
        let handle = tokio::spawn(Arc::clone(&self.inner).run_refresh(refresh_token));
        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(RefreshError::TaskFailed(e.to_string())),
            }
        }
        .boxed()
        .shared()
    }
}

/// Refreshes tokens by POSTing the refresh token to the backend.
pub struct HttpTokenRefresher {
    client: Client,
    url: Url,
}

impl HttpTokenRefresher {
    pub fn new(client: Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshPayload, RefreshError> {
        let body = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                message: truncate_body(&text),
            });
        }

        let envelope: ApiEnvelope<RefreshPayload> = serde_json::from_str(&text)
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;
        envelope.into_data().map_err(|(message, _)| RefreshError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}
