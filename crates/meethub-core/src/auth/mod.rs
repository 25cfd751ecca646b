//! Authentication module for managing the persisted session.
//!
//! This module provides:
//! - `TokenStore`: access/refresh tokens and the current user, persisted as a unit
//! - `KeyValueStorage` backends: `FileStorage`, `KeyringStorage`, `MemoryStorage`
//! - `RefreshCoordinator`: single-flight token refresh shared by all requests

pub mod credentials;
pub mod refresh;
pub mod storage;
pub mod token_store;

pub use credentials::KeyringStorage;
pub use refresh::{HttpTokenRefresher, RefreshCoordinator, RefreshError, TokenRefresher};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError};
pub use token_store::TokenStore;
