//! Owner of the persisted session
//!
//! Writers are limited to the login flow, logout and the refresh coordinator.
//! Everything else reads through [`TokenStore::get`] or [`crate::SessionGate`].

use crate::config::StorageKeys;
use crate::storage::KeyValueStore;
use crate::types::{Role, Session};
use std::sync::Arc;
use tracing::{debug, warn};

/// Session holder backed by persistent storage
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn KeyValueStore>,
    keys: StorageKeys,
}

impl TokenStore {
    /// Create a store using the given backend and key scheme
    pub fn new(storage: Arc<dyn KeyValueStore>, keys: StorageKeys) -> Self {
        Self { storage, keys }
    }

    /// Create a store with the default key scheme
    pub fn with_default_keys(storage: Arc<dyn KeyValueStore>) -> Self {
        Self::new(storage, StorageKeys::default())
    }

    /// Key scheme in use
    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    /// Read the current session
    pub fn get(&self) -> Session {
        let role = self.storage.get(&self.keys.role).and_then(|raw| {
            raw.parse::<Role>()
                .inspect_err(|e| warn!("Ignoring stored role: {e}"))
                .ok()
        });

        Session {
            access_token: self.non_empty(&self.keys.access_token),
            refresh_token: self.non_empty(&self.keys.refresh_token),
            role,
        }
    }

    /// Current access token, if any
    pub fn access_token(&self) -> Option<String> {
        self.non_empty(&self.keys.access_token)
    }

    /// Current refresh token, if any
    pub fn refresh_token(&self) -> Option<String> {
        self.non_empty(&self.keys.refresh_token)
    }

    /// Overwrite the access token and whichever optional fields are provided
    pub fn set(&self, access_token: &str, refresh_token: Option<&str>, role: Option<Role>) {
        self.storage.set(&self.keys.access_token, access_token);
        if let Some(refresh_token) = refresh_token {
            self.storage.set(&self.keys.refresh_token, refresh_token);
        }
        if let Some(role) = role {
            self.storage.set(&self.keys.role, role.as_str());
        }
        debug!(
            refresh_rotated = refresh_token.is_some(),
            role = role.map(Role::as_str),
            "Session tokens updated"
        );
    }

    /// Wipe every session field
    pub fn clear(&self) {
        self.storage.remove(&self.keys.access_token);
        self.storage.remove(&self.keys.refresh_token);
        self.storage.remove(&self.keys.role);
        debug!("Session cleared");
    }

    fn non_empty(&self, key: &str) -> Option<String> {
        self.storage.get(key).filter(|value| !value.is_empty())
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}
