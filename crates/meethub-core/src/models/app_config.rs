use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Application configuration served by the backend at `/config`.
///
/// Only a handful of fields are interpreted; everything else is kept in
/// `extra` so frontends can read settings this crate does not know about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub video_provider: Option<String>,
    #[serde(default)]
    pub features: HashMap<String, bool>,
    #[serde(flatten)]
    #[cfg_attr(feature = "ts", ts(skip))]
    pub extra: HashMap<String, serde_json::Value>,
}

impl AppConfig {
    /// Whether a feature flag is enabled; unknown flags are off
    pub fn feature_enabled(&self, name: &str) -> bool {
        self.features.get(name).copied().unwrap_or(false)
    }
}
