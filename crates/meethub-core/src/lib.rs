//! Core library for the meethub meeting support platform client.
//!
//! This crate provides the session and request layer shared by every
//! meethub frontend:
//!
//! - `cache`: TTL cache used for HTTP responses and the app config
//! - `auth`: persisted token store, storage backends, single-flight token refresh
//! - `api`: the request pipeline (`ApiClient`) with bearer auth, 401 retry and GET caching
//! - `guard`: role-based route authorization
//! - `events`: session lifecycle notifications (login, logout, expiry)

pub mod api;
pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod events;
pub mod guard;
pub mod models;

pub use api::{ApiClient, ApiClientBuilder, ApiError, ApiRequest, ApiResponse};
pub use auth::{
    FileStorage, KeyValueStorage, KeyringStorage, MemoryStorage, RefreshCoordinator,
    RefreshError, StorageError, TokenRefresher, TokenStore,
};
pub use cache::{ResponseCache, TtlCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClientConfig, ConfigError, StorageBackend};
pub use events::{SessionEvent, SessionEvents};
pub use guard::{GuardDecision, RouteGuard, RouteRule};
pub use models::{AppConfig, CurrentUser, RegisterRequest, Role, Tokens};
