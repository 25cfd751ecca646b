use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use super::ApiError;

/// An outbound request, relative to the client's base URL.
///
/// The request is kept as plain data so the pipeline can rebuild it with a
/// new bearer token when it has to be retried after a refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set a JSON body
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
    /// Served from the response cache without a network call
    pub from_cache: bool,
}

impl ApiResponse {
    /// Synthesized 200 for a cache hit
    pub fn cached(body: String) -> Self {
        Self {
            status: StatusCode::OK,
            body,
            from_cache: true,
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_query_and_body() {
        let request = ApiRequest::post("/meetings")
            .query("notify", "true")
            .json(&serde_json::json!({"title": "Sprint review"}))
            .unwrap();

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.query, vec![("notify".to_string(), "true".to_string())]);
        assert_eq!(request.body.unwrap()["title"], "Sprint review");
    }

    #[test]
    fn test_cached_response_is_ok() {
        let response = ApiResponse::cached(r#"{"id": 3}"#.to_string());
        assert_eq!(response.status, StatusCode::OK);
        assert!(response.from_cache);

        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["id"], 3);
    }

    #[test]
    fn test_json_parse_error_is_invalid_response() {
        let response = ApiResponse::cached("<html>".to_string());
        let result: Result<serde_json::Value, _> = response.json();
        assert!(matches!(result, Err(ApiError::InvalidResponse(_))));
    }
}
