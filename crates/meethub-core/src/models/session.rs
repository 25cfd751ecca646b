// Allow dead code: API response structs have fields for completeness
#![allow(dead_code)]

use serde::{Deserialize, Serialize};

use super::CurrentUser;

/// Token pair issued by login, register and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of the access token in seconds
    pub expires_in: i64,
}

/// Common response wrapper used by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub errors: Option<serde_json::Value>,
}

impl<T> ApiEnvelope<T> {
    /// Unwrap the payload of a successful envelope.
    /// Returns the server message (or a default) when `success` is false or data is missing.
    pub fn into_data(self) -> Result<T, (String, Option<serde_json::Value>)> {
        let message = self
            .message
            .unwrap_or_else(|| "Request was not successful".to_string());
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err((format!("{} (response had no data)", message), self.errors)),
            (false, _) => Err((message, self.errors)),
        }
    }
}

/// Payload of login and register responses
#[derive(Debug, Clone, Deserialize)]
pub struct AuthPayload {
    pub user: CurrentUser,
    pub tokens: Tokens,
}

/// Payload of refresh responses. Some backends also echo the user.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshPayload {
    pub tokens: Tokens,
    #[serde(default)]
    pub user: Option<CurrentUser>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub display_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}
