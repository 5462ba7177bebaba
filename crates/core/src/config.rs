//! Client configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional file,
//! then `PORTAL_`-prefixed environment variables (`PORTAL_API__BASE_URL`).

use crate::error::CoreResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Top-level client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PortalConfig {
    /// Backend connection settings
    pub api: ApiConfig,

    /// Session and token handling
    pub auth: AuthConfig,
}

/// Backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the REST backend
    pub base_url: String,

    /// Request timeout in seconds (0 disables the timeout)
    pub timeout_secs: u64,

    /// User agent sent with every request
    pub user_agent: String,
}

/// Session and token handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuthConfig {
    /// Identity-provider client whose roles decide the user's role
    pub client_id: String,

    /// Where to send the user when the session cannot be recovered
    pub login_path: String,

    /// Where to send a signed-in user who lacks admin rights
    pub dashboard_path: String,

    /// Refresh-token exchange endpoint
    pub refresh: RefreshEndpoint,

    /// Storage keys for the persisted session
    pub keys: StorageKeys,
}

/// Refresh-token exchange endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RefreshEndpoint {
    /// HTTP method, `POST` sends the token in a JSON body, `GET` appends it to the path
    pub method: String,

    /// Path relative to the base URL
    pub path: String,
}

/// Storage keys for the persisted session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageKeys {
    pub access_token: String,
    pub refresh_token: String,
    pub role: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000".to_string(),
            timeout_secs: 30,
            user_agent: concat!("portal-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: "hire-hunt-client".to_string(),
            login_path: "/login".to_string(),
            dashboard_path: "/dashboard".to_string(),
            refresh: RefreshEndpoint::default(),
            keys: StorageKeys::default(),
        }
    }
}

impl Default for RefreshEndpoint {
    fn default() -> Self {
        Self {
            method: "POST".to_string(),
            path: "/api/auth/refresh-token".to_string(),
        }
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            access_token: "token".to_string(),
            refresh_token: "refreshToken".to_string(),
            role: "userRole".to_string(),
        }
    }
}

impl PortalConfig {
    /// Load configuration from an optional file plus the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value fails to parse
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        let defaults = config::Config::try_from(&Self::default())?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("PORTAL")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialize fine but cannot work
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value
    pub fn validate(&self) -> CoreResult<()> {
        Url::parse(&self.api.base_url).map_err(|e| {
            crate::CoreError::invalid_config(format!("api.base_url {:?}: {e}", self.api.base_url))
        })?;

        if !matches!(self.auth.refresh.method.as_str(), "GET" | "POST") {
            return Err(crate::CoreError::invalid_config(format!(
                "auth.refresh.method must be GET or POST, got {}",
                self.auth.refresh.method
            )));
        }

        if !self.auth.refresh.path.starts_with('/') {
            return Err(crate::CoreError::invalid_config(
                "auth.refresh.path must start with '/'",
            ));
        }

        Ok(())
    }

    /// Write the configuration as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
