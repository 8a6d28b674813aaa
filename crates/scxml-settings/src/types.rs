//! Settings type definitions.
//!
//! All types use camelCase JSON field names and `#[serde(default)]`, so a
//! settings file only needs the keys it overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "api": { "host": "http://scxml.internal:8002" },
///   "stream": { "retryMs": 2000 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Where the REST API lives.
    pub api: ApiSettings,
    /// Change-stream transport behavior.
    pub stream: StreamSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl ClientSettings {
    /// Base URL every resource path is appended to, without a trailing slash.
    pub fn api_url(&self) -> String {
        self.api.url()
    }

    /// Reject settings no command can work with.
    pub fn validate(&self) -> Result<()> {
        if self.api.host.trim().is_empty() {
            return Err(SettingsError::InvalidValue("api.host must not be empty".into()));
        }
        Ok(())
    }
}

/// REST API location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSettings {
    /// Scheme, host and port of the service.
    pub host: String,
    /// Path prefix of the API on that host.
    pub base_path: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: "http://localhost:8002".to_string(),
            base_path: "/api/v1".to_string(),
        }
    }
}

impl ApiSettings {
    /// `host` joined with `base_path`.
    pub fn url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        let path = self.base_path.trim_matches('/');
        if path.is_empty() {
            host.to_string()
        } else {
            format!("{host}/{path}")
        }
    }
}

/// Change-stream transport settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamSettings {
    /// Reconnect when the server closes a change stream cleanly.
    pub reconnect: bool,
    /// Reconnect delay until the server sends a `retry:` hint.
    pub retry_ms: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            reconnect: true,
            retry_ms: 3000,
        }
    }
}

impl StreamSettings {
    /// `retry_ms` as a duration.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_ms)
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` wins when set.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}
