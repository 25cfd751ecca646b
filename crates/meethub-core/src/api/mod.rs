//! Meethub REST API client.
//!
//! `ApiClient` is the single entry point for backend calls. Requests are
//! described as `ApiRequest` values so the pipeline can replay them after a
//! token refresh.

pub mod client;
pub mod error;
pub mod request;

pub use client::{ApiClient, ApiClientBuilder};
pub use error::ApiError;
pub use request::{ApiRequest, ApiResponse};
