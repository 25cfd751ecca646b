use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, warn};

use super::storage::{KeyValueStorage, StorageError};
use crate::clock::{Clock, SystemClock};
use crate::models::{CurrentUser, Tokens};

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const TOKEN_EXPIRES_AT_KEY: &str = "tokenExpiresAt";
pub const CURRENT_USER_KEY: &str = "currentUser";

/// Every key the store writes, cleared together on logout
const ALL_KEYS: [&str; 4] = [
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    TOKEN_EXPIRES_AT_KEY,
    CURRENT_USER_KEY,
];

/// Persisted session: access/refresh tokens, their expiry and the current user.
///
/// Reads never fail. A broken or unavailable storage backend is logged and
/// treated as "no session", leaving the app in an unauthenticated state.
pub struct TokenStore {
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock))
    }

    pub fn with_clock(storage: Arc<dyn KeyValueStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(key, error = %e, "Failed to read session storage");
                None
            }
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.read(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(REFRESH_TOKEN_KEY)
    }

    pub fn current_user(&self) -> Option<CurrentUser> {
        let raw = self.read(CURRENT_USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Stored current user is not valid JSON");
                None
            }
        }
    }

    /// Absolute expiry of the access token, if one was recorded
    pub fn token_expires_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.read(TOKEN_EXPIRES_AT_KEY)?;
        let millis: i64 = match raw.parse() {
            Ok(millis) => millis,
            Err(_) => {
                warn!(value = %raw, "Stored token expiry is not a number");
                return None;
            }
        };
        Utc.timestamp_millis_opt(millis).single()
    }

    /// Persist a new token pair with `tokenExpiresAt = now + expires_in`
    pub fn set_tokens(&self, tokens: &Tokens) -> Result<(), StorageError> {
        let expires_at = self
            .clock
            .now_millis()
            .saturating_add(tokens.expires_in.saturating_mul(1000));

        self.storage.set(ACCESS_TOKEN_KEY, &tokens.access_token)?;
        self.storage.set(REFRESH_TOKEN_KEY, &tokens.refresh_token)?;
        self.storage
            .set(TOKEN_EXPIRES_AT_KEY, &expires_at.to_string())?;
        debug!(expires_at, "Session tokens stored");
        Ok(())
    }

    pub fn set_current_user(&self, user: &CurrentUser) -> Result<(), StorageError> {
        let json = serde_json::to_string(user)?;
        self.storage.set(CURRENT_USER_KEY, &json)
    }

    /// Store a complete session as issued by login or register.
    /// A failed write clears whatever was written so the store never holds half a session.
    pub fn set_session(&self, tokens: &Tokens, user: &CurrentUser) -> Result<(), StorageError> {
        let result = self
            .set_tokens(tokens)
            .and_then(|_| self.set_current_user(user));
        if result.is_err() {
            self.clear_auth();
        }
        result
    }

    /// Remove every session key. Safe to call when nothing is stored.
    pub fn clear_auth(&self) {
        for key in ALL_KEYS {
            if let Err(e) = self.storage.remove(key) {
                warn!(key, error = %e, "Failed to remove session key");
            }
        }
        debug!("Session cleared");
    }

    /// True when an access token is stored.
    ///
    /// Expiry is not checked: a stale token still counts until a request
    /// fails with 401 and the refresh flow runs.
    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    /// True when the recorded expiry has passed. `false` when no expiry is stored.
    pub fn is_access_token_expired(&self) -> bool {
        self.token_expires_at()
            .map(|expires_at| self.clock.now() >= expires_at)
            .unwrap_or(false)
    }
}
