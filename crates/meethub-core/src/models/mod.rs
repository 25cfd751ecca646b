//! Data models for the meethub backend.
//!
//! This module contains the wire types exchanged with the REST backend:
//!
//! - `CurrentUser`, `Role`: the signed-in user and their platform role
//! - `Tokens`, `ApiEnvelope`, `AuthPayload`: auth endpoint request/response shapes
//! - `AppConfig`: application configuration served by the backend
//!
//! With the `ts` feature enabled these types also derive TypeScript
//! definitions for the web frontend.

pub mod app_config;
pub mod session;
pub mod user;

pub use app_config::AppConfig;
pub use session::{
    ApiEnvelope, AuthPayload, LoginRequest, RefreshPayload, RefreshRequest, RegisterRequest,
    Tokens,
};
pub use user::{CurrentUser, ParseRoleError, Role};
