//! Unverified decoding of compact JWT payloads
//!
//! The client never sees the signing key. Claims read here are hints for the
//! UI (expiry, role); the server re-checks authorization on every request.

use crate::error::DecodeError;
use crate::types::Role;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use std::collections::HashMap;

/// Roles granted at one level of the identity provider
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct RoleList {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Claims the client cares about
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user ID)
    #[serde(default)]
    pub sub: Option<String>,
    /// Expiration time (as UTC timestamp)
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub realm_access: Option<RoleList>,
    #[serde(default)]
    pub resource_access: HashMap<String, RoleList>,
}

impl Claims {
    /// Roles of `client_id` followed by realm roles
    pub fn roles(&self, client_id: &str) -> Vec<&str> {
        let client = self
            .resource_access
            .get(client_id)
            .map(|access| access.roles.as_slice())
            .unwrap_or_default();
        let realm = self
            .realm_access
            .as_ref()
            .map(|access| access.roles.as_slice())
            .unwrap_or_default();

        client.iter().chain(realm).map(String::as_str).collect()
    }

    /// Highest role granted to `client_id` or at realm level
    pub fn role(&self, client_id: &str) -> Role {
        Role::highest(self.roles(client_id))
    }

    /// Role from the token, or `None` when it carries no role list for
    /// `client_id` or the realm
    pub fn granted_role(&self, client_id: &str) -> Option<Role> {
        let has_roles =
            self.realm_access.is_some() || self.resource_access.contains_key(client_id);
        has_roles.then(|| self.role(client_id))
    }

    /// Whether the token is expired at `now` (epoch seconds).
    ///
    /// Tokens without an `exp` claim never expire from the client's view.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp.is_some_and(|exp| exp <= now)
    }
}

/// Decode the payload segment of `token`
pub fn decode(token: &str) -> Result<Claims, DecodeError> {
    let payload = token
        .split('.')
        .nth(1)
        .filter(|segment| !segment.is_empty())
        .ok_or(DecodeError::MissingSegment)?;

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| DecodeError::InvalidEncoding(e.to_string()))?;

    serde_json::from_slice(&bytes).map_err(|e| DecodeError::InvalidJson(e.to_string()))
}
